//! ffmpeg-backed media combining.
//!
//! Implements the engine's [`MediaCombiner`] contract by shelling out to a
//! local `ffmpeg` binary: clips are written to a temp directory, combined
//! through a filter graph, and the output is read back into memory. The
//! argument builders are pure functions so the command construction is
//! testable without ffmpeg installed.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result, bail, ensure};
use async_trait::async_trait;
use clipflow_engine::collab::MediaCombiner;
use tokio::process::Command;
use tracing::debug;

/// Media combiner that invokes `ffmpeg` as a subprocess.
#[derive(Debug, Clone)]
pub struct FfmpegCombiner {
    binary: PathBuf,
}

impl Default for FfmpegCombiner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegCombiner {
    /// Use the `ffmpeg` binary found on `PATH`.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
        }
    }

    /// Use an explicit ffmpeg binary path.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    async fn run_ffmpeg(&self, args: &[String]) -> Result<()> {
        debug!(binary = %self.binary.display(), ?args, "invoking ffmpeg");
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("failed to launch {}; is ffmpeg installed?", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("ffmpeg exited with {}: {}", output.status, stderr.trim());
        }
        Ok(())
    }
}

#[async_trait]
impl MediaCombiner for FfmpegCombiner {
    async fn combine(&self, clips: &[Vec<u8>]) -> Result<Vec<u8>> {
        ensure!(!clips.is_empty(), "no clips to combine");
        if clips.len() == 1 {
            return Ok(clips[0].clone());
        }

        let workdir = tempfile::tempdir().context("failed to create temp dir")?;
        let mut input_paths = Vec::with_capacity(clips.len());
        for (index, clip) in clips.iter().enumerate() {
            let path = workdir.path().join(format!("input{index}.mp4"));
            tokio::fs::write(&path, clip)
                .await
                .with_context(|| format!("failed to write clip {index}"))?;
            input_paths.push(path);
        }
        let output_path = workdir.path().join("output.mp4");

        let args = concat_args(&input_paths, &output_path);
        self.run_ffmpeg(&args).await?;

        tokio::fs::read(&output_path).await.context("failed to read merged video")
    }

    async fn overlay_audio(&self, video: &[u8], audio: &[u8]) -> Result<Vec<u8>> {
        let workdir = tempfile::tempdir().context("failed to create temp dir")?;
        let video_path = workdir.path().join("input.mp4");
        let audio_path = workdir.path().join("audio.mp3");
        let output_path = workdir.path().join("output.mp4");

        tokio::fs::write(&video_path, video).await.context("failed to write video input")?;
        tokio::fs::write(&audio_path, audio).await.context("failed to write audio input")?;

        let args = overlay_args(&video_path, &audio_path, &output_path);
        self.run_ffmpeg(&args).await?;

        tokio::fs::read(&output_path).await.context("failed to read mixed video")
    }
}

/// Filter graph concatenating `input_count` clips with their audio tracks.
fn concat_filter(input_count: usize) -> String {
    let mut filter = String::new();
    for index in 0..input_count {
        filter.push_str(&format!("[{index}:v][{index}:a]"));
    }
    filter.push_str(&format!("concat=n={input_count}:v=1:a=1[v][a]"));
    filter
}

/// Full ffmpeg argument list for concatenating clips.
fn concat_args(inputs: &[PathBuf], output: &Path) -> Vec<String> {
    let mut args = Vec::new();
    for input in inputs {
        args.push("-i".to_string());
        args.push(input.display().to_string());
    }
    args.extend([
        "-filter_complex".to_string(),
        concat_filter(inputs.len()),
        "-map".to_string(),
        "[v]".to_string(),
        "-map".to_string(),
        "[a]".to_string(),
        "-y".to_string(),
        output.display().to_string(),
    ]);
    args
}

/// Full ffmpeg argument list for overlaying an audio track onto a video.
///
/// The audio input loops (`-stream_loop -1`) to cover videos longer than
/// the track, and `-shortest` truncates audio longer than the video. The
/// video stream is copied, not re-encoded.
fn overlay_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
    vec![
        "-i".to_string(),
        video.display().to_string(),
        "-stream_loop".to_string(),
        "-1".to_string(),
        "-i".to_string(),
        audio.display().to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "1:a:0".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-shortest".to_string(),
        "-y".to_string(),
        output.display().to_string(),
    ]
}
