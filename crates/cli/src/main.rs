use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clipflow_engine::{StepValue, ValueMap, WorkflowEngine, parse_workflow_file, validate_steps};
use clipflow_media::FfmpegCombiner;
use clipflow_providers::Gateway;
use tracing::info;

#[derive(Parser)]
#[command(name = "clipflow", about = "Generative media workflow runner", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a workflow file.
    Run {
        /// Workflow definition (YAML or JSON).
        file: PathBuf,
        /// Caller input as KEY=VALUE, or KEY=@PATH to read bytes from a file.
        #[arg(long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,
        /// Where to write a byte-valued final result.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Upload a byte-valued final result to object storage and print its URL.
        #[arg(long)]
        upload: bool,
    },
    /// Parse and validate a workflow file without executing it.
    Validate {
        /// Workflow definition (YAML or JSON).
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            file,
            inputs,
            out,
            upload,
        } => run(file, inputs, out, upload).await,
        Command::Validate { file } => validate(file),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn run(file: PathBuf, raw_inputs: Vec<String>, out: Option<PathBuf>, upload: bool) -> Result<()> {
    let workflow = parse_workflow_file(&file)?;
    let inputs = parse_inputs(&raw_inputs).await?;

    let gateway = Gateway::from_env()?;
    let store = gateway.store.clone();
    let engine = WorkflowEngine::new(gateway.registry, Arc::new(FfmpegCombiner::new()), gateway.fetcher);

    let outcome = engine.generate(Some(&workflow), &inputs).await?;
    if let Some(label) = outcome.output.as_deref() {
        info!(output = label, "workflow completed");
    }

    match outcome.value {
        None => {
            info!("workflow produced no result");
            Ok(())
        }
        Some(StepValue::Text(text)) => {
            println!("{text}");
            Ok(())
        }
        Some(StepValue::Url(url)) => {
            println!("{url}");
            Ok(())
        }
        Some(StepValue::Json(value)) => {
            println!("{value}");
            Ok(())
        }
        Some(StepValue::Bytes(bytes)) => {
            if upload {
                let store = store.context(
                    "object storage is not configured; set CLIPFLOW_GCS_BUCKET/GOOGLE_OAUTH_TOKEN or CLIPFLOW_S3_BUCKET with AWS credentials",
                )?;
                let url = store.upload(&bytes, None).await?;
                println!("{url}");
                return Ok(());
            }
            let path = out.context("final result is binary; pass --out PATH or --upload")?;
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), size = bytes.len(), "wrote final result");
            Ok(())
        }
    }
}

fn validate(file: PathBuf) -> Result<()> {
    let workflow = parse_workflow_file(&file)?;
    validate_steps(&workflow.steps)?;
    println!("ok: {} steps", workflow.steps.len());
    Ok(())
}

/// Parse `KEY=VALUE` pairs into engine inputs.
///
/// A value of the form `@PATH` is read from disk as bytes, everything else
/// is passed through as text.
async fn parse_inputs(pairs: &[String]) -> Result<ValueMap> {
    let mut inputs = ValueMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("invalid input '{pair}': expected KEY=VALUE");
        };
        if key.is_empty() {
            bail!("invalid input '{pair}': empty key");
        }
        let value = match value.strip_prefix('@') {
            Some(path) => {
                let bytes = tokio::fs::read(path).await.with_context(|| format!("failed to read input file {path}"))?;
                StepValue::Bytes(bytes)
            }
            None => StepValue::Text(value.to_string()),
        };
        inputs.insert(key.to_string(), value);
    }
    Ok(inputs)
}
