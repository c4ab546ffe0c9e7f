//! Workflow runner: walks a workflow's ordered steps, dispatches each to
//! its handler, accumulates results keyed by step id, and reports the
//! final value.
//!
//! Control flow is a single linear pipeline: the first step failure aborts
//! the whole run with an error naming the failing step. There is no
//! branching, no retry, and no partial-result return. Steps execute
//! strictly sequentially because later steps may reference earlier
//! results; the only suspension points are collaborator calls, and
//! dropping the `generate` future cancels whichever call is in flight.

use std::sync::Arc;

use tracing::debug;

use crate::collab::{MediaCombiner, UrlFetcher};
use crate::error::{EngineError, StepError};
use crate::model::{FunctionType, Workflow, WorkflowStep};
use crate::provider::ProviderRegistry;
use crate::resolve::interpolate;
use crate::value::{StepValue, ValueMap};

/// Outcome of a successful workflow run.
#[derive(Debug)]
pub struct RunOutcome {
    /// Result of the last step, or `None` for a zero-step workflow.
    pub value: Option<StepValue>,
    /// The workflow's `output` label, passed through verbatim.
    pub output: Option<String>,
}

/// Executes workflows against a set of collaborators.
///
/// The engine holds no mutable state of its own; the results map lives for
/// one `generate` call. Multiple runs may execute concurrently as long as
/// the collaborators are safe for concurrent use.
pub struct WorkflowEngine {
    providers: ProviderRegistry,
    combiner: Arc<dyn MediaCombiner>,
    fetcher: Arc<dyn UrlFetcher>,
}

/// Reject empty and duplicate step identifiers before execution begins.
///
/// Duplicate ids would make a later result silently overwrite an earlier
/// one, so they are a validation error rather than last-write-wins.
pub fn validate_steps(steps: &[WorkflowStep]) -> Result<(), EngineError> {
    let mut seen = std::collections::HashSet::new();
    for step in steps {
        if step.id.is_empty() {
            return Err(EngineError::EmptyStepId);
        }
        if !seen.insert(step.id.as_str()) {
            return Err(EngineError::DuplicateStepId(step.id.clone()));
        }
    }
    Ok(())
}

impl WorkflowEngine {
    /// Create an engine from a provider registry and media collaborators.
    pub fn new(providers: ProviderRegistry, combiner: Arc<dyn MediaCombiner>, fetcher: Arc<dyn UrlFetcher>) -> Self {
        Self {
            providers,
            combiner,
            fetcher,
        }
    }

    /// Execute a workflow with the provided inputs.
    ///
    /// Steps run strictly in order; each step's result is stored under its
    /// id and becomes referenceable by later steps. The first failure
    /// aborts the run with an [`EngineError::Step`] naming the step.
    pub async fn generate(&self, workflow: Option<&Workflow>, inputs: &ValueMap) -> Result<RunOutcome, EngineError> {
        let workflow = workflow.ok_or(EngineError::MissingWorkflow)?;
        validate_steps(&workflow.steps)?;

        let mut results = ValueMap::new();
        for step in &workflow.steps {
            debug!(step_id = %step.id, function_type = %step.function_type.as_tag(), "executing workflow step");
            let value = self
                .dispatch(step, inputs, &results)
                .await
                .map_err(|source| EngineError::Step {
                    step_id: step.id.clone(),
                    source,
                })?;
            results.insert(step.id.clone(), value);
        }

        let value = workflow.steps.last().and_then(|last| results.shift_remove(&last.id));
        Ok(RunOutcome {
            value,
            output: workflow.output.clone(),
        })
    }

    /// Select and invoke the handler for one step.
    async fn dispatch(&self, step: &WorkflowStep, inputs: &ValueMap, results: &ValueMap) -> Result<StepValue, StepError> {
        match &step.function_type {
            FunctionType::TextsToText => self.process_texts_to_text(step, inputs, results),
            FunctionType::TextToImage => self.process_text_to_image(step, inputs, results).await,
            FunctionType::TextAndImageToImage => self.process_text_and_image_to_image(step, inputs, results).await,
            FunctionType::TextAndImagesToVideo => self.process_video_generation(step, inputs, results, true).await,
            FunctionType::TextAndImageToVideo => self.process_video_generation(step, inputs, results, false).await,
            FunctionType::VideosToVideo => self.process_videos_to_video(step, inputs, results).await,
            FunctionType::VideoAndAudioToVideo => self.process_video_and_audio(step, inputs, results).await,
            FunctionType::Unknown(tag) => Err(StepError::UnsupportedFunctionType(tag.clone())),
        }
    }

    fn process_texts_to_text(&self, step: &WorkflowStep, inputs: &ValueMap, results: &ValueMap) -> Result<StepValue, StepError> {
        let prompt = required("prompt", &step.prompt)?;
        Ok(StepValue::Text(interpolate(prompt, inputs, results)))
    }

    async fn process_text_to_image(&self, step: &WorkflowStep, inputs: &ValueMap, results: &ValueMap) -> Result<StepValue, StepError> {
        let prompt = interpolate(required("prompt", &step.prompt)?, inputs, results);
        let generator = self.providers.image_for(step.provider.as_deref())?;
        let artifact = generator.generate(&prompt).await.map_err(StepError::Collaborator)?;
        Ok(artifact.into())
    }

    async fn process_text_and_image_to_image(
        &self,
        step: &WorkflowStep,
        inputs: &ValueMap,
        results: &ValueMap,
    ) -> Result<StepValue, StepError> {
        let prompt = interpolate(required("prompt", &step.prompt)?, inputs, results);
        let image = interpolate(required("image", &step.image)?, inputs, results);
        let generator = self.providers.image_for(step.provider.as_deref())?;
        let artifact = generator.edit(&prompt, &image).await.map_err(StepError::Collaborator)?;
        Ok(artifact.into())
    }

    /// Video generation with a start frame and, when `with_last_frame`, an
    /// end frame as well.
    async fn process_video_generation(
        &self,
        step: &WorkflowStep,
        inputs: &ValueMap,
        results: &ValueMap,
        with_last_frame: bool,
    ) -> Result<StepValue, StepError> {
        let prompt = interpolate(required("prompt", &step.prompt)?, inputs, results);
        let first = interpolate(required("first_image", &step.first_image)?, inputs, results);
        let last = if with_last_frame {
            Some(interpolate(required("last_image", &step.last_image)?, inputs, results))
        } else {
            None
        };

        let generator = self.providers.video_for(step.provider.as_deref())?;
        let artifact = generator
            .generate(&prompt, &first, last.as_deref())
            .await
            .map_err(StepError::Collaborator)?;
        Ok(artifact.into())
    }

    async fn process_videos_to_video(&self, step: &WorkflowStep, inputs: &ValueMap, results: &ValueMap) -> Result<StepValue, StepError> {
        if step.videos.is_empty() {
            return Err(StepError::MissingField("videos"));
        }

        let mut clips = Vec::with_capacity(step.videos.len());
        for reference in &step.videos {
            clips.push(self.resolve_media(reference, inputs, results).await?);
        }

        let merged = self.combiner.combine(&clips).await.map_err(StepError::Collaborator)?;
        Ok(StepValue::Bytes(merged))
    }

    async fn process_video_and_audio(&self, step: &WorkflowStep, inputs: &ValueMap, results: &ValueMap) -> Result<StepValue, StepError> {
        let video_ref = required("video", &step.video)?;
        let audio_ref = required("audio", &step.audio)?;

        let video = self.resolve_media(video_ref, inputs, results).await?;
        let audio = self.resolve_media(audio_ref, inputs, results).await?;

        let mixed = self.combiner.overlay_audio(&video, &audio).await.map_err(StepError::Collaborator)?;
        Ok(StepValue::Bytes(mixed))
    }

    /// Resolve a media reference to a byte buffer.
    ///
    /// The reference is interpolated, then looked up first in `results`,
    /// then in `inputs`. Byte values are used directly; string values are
    /// treated as URLs and downloaded.
    async fn resolve_media(&self, reference: &str, inputs: &ValueMap, results: &ValueMap) -> Result<Vec<u8>, StepError> {
        let name = interpolate(reference, inputs, results);
        let value = results
            .get(&name)
            .or_else(|| inputs.get(&name))
            .ok_or_else(|| StepError::ReferenceNotFound(name.clone()))?;

        match value {
            StepValue::Bytes(bytes) => Ok(bytes.clone()),
            StepValue::Url(url) => self.fetcher.download(url).await.map_err(StepError::Collaborator),
            StepValue::Text(url) => self.fetcher.download(url).await.map_err(StepError::Collaborator),
            StepValue::Json(_) => Err(StepError::TypeMismatch(name)),
        }
    }
}

fn required<'a>(field: &'static str, value: &'a Option<String>) -> Result<&'a str, StepError> {
    match value.as_deref() {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(StepError::MissingField(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{ImageGenerator, MediaArtifact, VideoGenerator};
    use crate::provider::{DEFAULT_IMAGE_PROVIDER, DEFAULT_VIDEO_PROVIDER};
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Joins clips with a `|` separator so merge order is observable.
    struct JoiningCombiner;

    #[async_trait]
    impl MediaCombiner for JoiningCombiner {
        async fn combine(&self, clips: &[Vec<u8>]) -> Result<Vec<u8>> {
            let mut merged = Vec::new();
            for (index, clip) in clips.iter().enumerate() {
                if index > 0 {
                    merged.push(b'|');
                }
                merged.extend_from_slice(clip);
            }
            Ok(merged)
        }

        async fn overlay_audio(&self, video: &[u8], audio: &[u8]) -> Result<Vec<u8>> {
            let mut mixed = video.to_vec();
            mixed.push(b'+');
            mixed.extend_from_slice(audio);
            Ok(mixed)
        }
    }

    /// Serves canned byte buffers for known URLs, fails for anything else.
    #[derive(Default)]
    struct MapFetcher {
        by_url: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl UrlFetcher for MapFetcher {
        async fn download(&self, url: &str) -> Result<Vec<u8>> {
            match self.by_url.get(url) {
                Some(bytes) => Ok(bytes.clone()),
                None => bail!("no fixture for url {url}"),
            }
        }
    }

    struct FixedImage;

    #[async_trait]
    impl ImageGenerator for FixedImage {
        async fn generate(&self, _prompt: &str) -> Result<MediaArtifact> {
            Ok(MediaArtifact::Url("https://cdn.example/generated.png".into()))
        }

        async fn edit(&self, _prompt: &str, _image: &str) -> Result<MediaArtifact> {
            Ok(MediaArtifact::Bytes(b"edited".to_vec()))
        }
    }

    /// Records generate calls so tests can assert on resolved arguments.
    #[derive(Default)]
    struct RecordingVideo {
        calls: Mutex<Vec<(String, String, Option<String>)>>,
    }

    #[async_trait]
    impl VideoGenerator for RecordingVideo {
        async fn generate(&self, prompt: &str, first_frame: &str, last_frame: Option<&str>) -> Result<MediaArtifact> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), first_frame.to_string(), last_frame.map(str::to_string)));
            Ok(MediaArtifact::Bytes(b"clip".to_vec()))
        }
    }

    fn engine_with(fetcher: MapFetcher) -> WorkflowEngine {
        let mut registry = ProviderRegistry::new();
        registry.register_image(DEFAULT_IMAGE_PROVIDER, Arc::new(FixedImage));
        registry.register_video(DEFAULT_VIDEO_PROVIDER, Arc::new(RecordingVideo::default()));
        WorkflowEngine::new(registry, Arc::new(JoiningCombiner), Arc::new(fetcher))
    }

    fn engine() -> WorkflowEngine {
        engine_with(MapFetcher::default())
    }

    fn step(id: &str, function_type: FunctionType) -> WorkflowStep {
        WorkflowStep {
            id: id.to_string(),
            function_type,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_workflow_is_rejected_before_any_step() {
        let err = engine().generate(None, &ValueMap::new()).await.expect_err("must fail");
        assert!(matches!(err, EngineError::MissingWorkflow));
    }

    #[tokio::test]
    async fn zero_steps_yield_no_value_and_no_error() {
        let workflow = Workflow::new(vec![]);
        let outcome = engine().generate(Some(&workflow), &ValueMap::new()).await.expect("run");
        assert!(outcome.value.is_none());
    }

    #[tokio::test]
    async fn texts_to_text_returns_the_literal_prompt() {
        let workflow = Workflow::new(vec![WorkflowStep {
            prompt: Some("hello".into()),
            ..step("s1", FunctionType::TextsToText)
        }]);
        let outcome = engine().generate(Some(&workflow), &ValueMap::new()).await.expect("run");
        assert_eq!(outcome.value, Some(StepValue::Text("hello".into())));
    }

    #[tokio::test]
    async fn later_steps_see_earlier_results_and_inputs() {
        let workflow = Workflow::new(vec![
            WorkflowStep {
                prompt: Some("a ${animal}".into()),
                ..step("subject", FunctionType::TextsToText)
            },
            WorkflowStep {
                prompt: Some("paint ${subject} at dusk".into()),
                ..step("scene", FunctionType::TextsToText)
            },
        ]);
        let mut inputs = ValueMap::new();
        inputs.insert("animal".into(), StepValue::Text("heron".into()));

        let outcome = engine().generate(Some(&workflow), &inputs).await.expect("run");
        assert_eq!(outcome.value, Some(StepValue::Text("paint a heron at dusk".into())));
    }

    #[tokio::test]
    async fn forward_references_stay_verbatim() {
        let workflow = Workflow::new(vec![
            WorkflowStep {
                prompt: Some("before ${later}".into()),
                ..step("early", FunctionType::TextsToText)
            },
            WorkflowStep {
                prompt: Some("done".into()),
                ..step("later", FunctionType::TextsToText)
            },
        ]);
        let outcome = engine().generate(Some(&workflow), &ValueMap::new()).await.expect("run");
        // Only the last step's value is reported; the early step kept the
        // placeholder because "later" had not run yet.
        assert_eq!(outcome.value, Some(StepValue::Text("done".into())));
    }

    #[tokio::test]
    async fn missing_prompt_fails_with_the_step_id() {
        let workflow = Workflow::new(vec![step("s1", FunctionType::TextsToText)]);
        let err = engine().generate(Some(&workflow), &ValueMap::new()).await.expect_err("must fail");
        match err {
            EngineError::Step { step_id, source } => {
                assert_eq!(step_id, "s1");
                assert!(matches!(source, StepError::MissingField("prompt")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unrecognized_function_type_aborts_the_run() {
        let workflow = Workflow::new(vec![step("s1", FunctionType::Unknown("make_coffee".into()))]);
        let err = engine().generate(Some(&workflow), &ValueMap::new()).await.expect_err("must fail");
        match err {
            EngineError::Step { step_id, source } => {
                assert_eq!(step_id, "s1");
                match source {
                    StepError::UnsupportedFunctionType(tag) => assert_eq!(tag, "make_coffee"),
                    other => panic!("unexpected step error: {other}"),
                }
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn duplicate_step_ids_are_rejected_before_execution() {
        let workflow = Workflow::new(vec![
            WorkflowStep {
                prompt: Some("one".into()),
                ..step("dup", FunctionType::TextsToText)
            },
            WorkflowStep {
                prompt: Some("two".into()),
                ..step("dup", FunctionType::TextsToText)
            },
        ]);
        let err = engine().generate(Some(&workflow), &ValueMap::new()).await.expect_err("must fail");
        assert!(matches!(err, EngineError::DuplicateStepId(id) if id == "dup"));
    }

    #[tokio::test]
    async fn empty_step_id_is_a_validation_error() {
        let workflow = Workflow::new(vec![WorkflowStep {
            prompt: Some("x".into()),
            ..step("", FunctionType::TextsToText)
        }]);
        let err = engine().generate(Some(&workflow), &ValueMap::new()).await.expect_err("must fail");
        assert!(matches!(err, EngineError::EmptyStepId));
    }

    #[tokio::test]
    async fn videos_merge_in_list_order() {
        let workflow = Workflow::new(vec![
            WorkflowStep {
                videos: vec!["clip1".into()],
                ..step("step1", FunctionType::VideosToVideo)
            },
            WorkflowStep {
                videos: vec!["clip2".into()],
                ..step("step2", FunctionType::VideosToVideo)
            },
            WorkflowStep {
                videos: vec!["step1".into(), "step2".into()],
                ..step("merge", FunctionType::VideosToVideo)
            },
        ]);

        let mut inputs = ValueMap::new();
        inputs.insert("clip1".into(), StepValue::Bytes(b"red".to_vec()));
        inputs.insert("clip2".into(), StepValue::Bytes(b"green".to_vec()));

        let outcome = engine().generate(Some(&workflow), &inputs).await.expect("run");
        assert_eq!(outcome.value, Some(StepValue::Bytes(b"red|green".to_vec())));
    }

    #[tokio::test]
    async fn video_reference_urls_are_downloaded() {
        let mut fetcher = MapFetcher::default();
        fetcher.by_url.insert("https://cdn.example/a.mp4".into(), b"remote".to_vec());

        let workflow = Workflow::new(vec![WorkflowStep {
            videos: vec!["clip".into()],
            ..step("merge", FunctionType::VideosToVideo)
        }]);
        let mut inputs = ValueMap::new();
        inputs.insert("clip".into(), StepValue::Url("https://cdn.example/a.mp4".into()));

        let outcome = engine_with(fetcher).generate(Some(&workflow), &inputs).await.expect("run");
        assert_eq!(outcome.value, Some(StepValue::Bytes(b"remote".to_vec())));
    }

    #[tokio::test]
    async fn unresolved_video_reference_names_the_step() {
        let workflow = Workflow::new(vec![WorkflowStep {
            videos: vec!["nowhere".into()],
            ..step("merge", FunctionType::VideosToVideo)
        }]);
        let err = engine().generate(Some(&workflow), &ValueMap::new()).await.expect_err("must fail");
        match err {
            EngineError::Step { step_id, source } => {
                assert_eq!(step_id, "merge");
                assert!(matches!(source, StepError::ReferenceNotFound(name) if name == "nowhere"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn structured_values_are_a_type_mismatch() {
        let workflow = Workflow::new(vec![WorkflowStep {
            videos: vec!["meta".into()],
            ..step("merge", FunctionType::VideosToVideo)
        }]);
        let mut inputs = ValueMap::new();
        inputs.insert("meta".into(), StepValue::Json(json!({"fps": 24})));

        let err = engine().generate(Some(&workflow), &inputs).await.expect_err("must fail");
        match err {
            EngineError::Step { source, .. } => {
                assert!(matches!(source, StepError::TypeMismatch(name) if name == "meta"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn audio_overlay_feeds_both_buffers_to_the_combiner() {
        let workflow = Workflow::new(vec![WorkflowStep {
            video: Some("track".into()),
            audio: Some("music".into()),
            ..step("mix", FunctionType::VideoAndAudioToVideo)
        }]);
        let mut inputs = ValueMap::new();
        inputs.insert("track".into(), StepValue::Bytes(b"video".to_vec()));
        inputs.insert("music".into(), StepValue::Bytes(b"audio".to_vec()));

        let outcome = engine().generate(Some(&workflow), &inputs).await.expect("run");
        assert_eq!(outcome.value, Some(StepValue::Bytes(b"video+audio".to_vec())));
    }

    #[tokio::test]
    async fn video_generation_resolves_frames_through_templates() {
        let recorder = Arc::new(RecordingVideo::default());
        let mut registry = ProviderRegistry::new();
        registry.register_video(DEFAULT_VIDEO_PROVIDER, recorder.clone());
        let engine = WorkflowEngine::new(registry, Arc::new(JoiningCombiner), Arc::new(MapFetcher::default()));

        let workflow = Workflow::new(vec![WorkflowStep {
            prompt: Some("a clip of ${subject}".into()),
            first_image: Some("${start}".into()),
            last_image: Some("${end}".into()),
            ..step("clip", FunctionType::TextAndImagesToVideo)
        }]);
        let mut inputs = ValueMap::new();
        inputs.insert("subject".into(), StepValue::Text("a cat".into()));
        inputs.insert("start".into(), StepValue::Url("https://cdn.example/first.png".into()));
        inputs.insert("end".into(), StepValue::Url("https://cdn.example/last.png".into()));

        engine.generate(Some(&workflow), &inputs).await.expect("run");

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "a clip of a cat");
        assert_eq!(calls[0].1, "https://cdn.example/first.png");
        assert_eq!(calls[0].2.as_deref(), Some("https://cdn.example/last.png"));
    }

    #[tokio::test]
    async fn start_frame_only_generation_omits_the_last_frame() {
        let recorder = Arc::new(RecordingVideo::default());
        let mut registry = ProviderRegistry::new();
        registry.register_video(DEFAULT_VIDEO_PROVIDER, recorder.clone());
        let engine = WorkflowEngine::new(registry, Arc::new(JoiningCombiner), Arc::new(MapFetcher::default()));

        let workflow = Workflow::new(vec![WorkflowStep {
            prompt: Some("pan across the bay".into()),
            first_image: Some("https://cdn.example/first.png".into()),
            ..step("clip", FunctionType::TextAndImageToVideo)
        }]);
        engine.generate(Some(&workflow), &ValueMap::new()).await.expect("run");

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls[0].2, None);
    }

    #[tokio::test]
    async fn missing_last_image_is_reported_for_two_frame_generation() {
        let workflow = Workflow::new(vec![WorkflowStep {
            prompt: Some("p".into()),
            first_image: Some("f".into()),
            ..step("clip", FunctionType::TextAndImagesToVideo)
        }]);
        let err = engine().generate(Some(&workflow), &ValueMap::new()).await.expect_err("must fail");
        match err {
            EngineError::Step { source, .. } => assert!(matches!(source, StepError::MissingField("last_image"))),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unknown_provider_fails_the_step() {
        let workflow = Workflow::new(vec![WorkflowStep {
            prompt: Some("p".into()),
            provider: Some("betamax-9000".into()),
            ..step("img", FunctionType::TextToImage)
        }]);
        let err = engine().generate(Some(&workflow), &ValueMap::new()).await.expect_err("must fail");
        match err {
            EngineError::Step { source, .. } => {
                assert!(matches!(source, StepError::UnsupportedProvider(id) if id == "betamax-9000"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn image_steps_route_through_the_registry() {
        let workflow = Workflow::new(vec![
            WorkflowStep {
                prompt: Some("a poster".into()),
                ..step("img", FunctionType::TextToImage)
            },
            WorkflowStep {
                prompt: Some("make it warmer".into()),
                image: Some("${img}".into()),
                ..step("edit", FunctionType::TextAndImageToImage)
            },
        ]);
        let outcome = engine().generate(Some(&workflow), &ValueMap::new()).await.expect("run");
        assert_eq!(outcome.value, Some(StepValue::Bytes(b"edited".to_vec())));
    }

    #[tokio::test]
    async fn output_label_passes_through_verbatim() {
        let mut workflow = Workflow::new(vec![WorkflowStep {
            prompt: Some("hello".into()),
            ..step("s1", FunctionType::TextsToText)
        }]);
        workflow.output = Some("${s1}".into());

        let outcome = engine().generate(Some(&workflow), &ValueMap::new()).await.expect("run");
        assert_eq!(outcome.output.as_deref(), Some("${s1}"));
    }
}
