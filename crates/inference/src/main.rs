use anyhow::Context;
use inference::{
    DirectorySource, FramePipeline, FrameService, InferenceConfig, LabelSet,
    backend::ort::OrtEngine, logging::init_observability,
};
use std::io::{self, Write};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = InferenceConfig::from_env()?;

    let _telemetry = init_observability(&config)?;

    tracing::info!(config = ?config, "Loaded configuration");

    let labels = LabelSet::from_file(&config.labels_path)
        .with_context(|| format!("Failed to read labels from {}", config.labels_path.display()))?;

    tracing::info!("Loading inference model");
    let pipeline = FramePipeline::<OrtEngine>::load(&config.model_path, labels, config.pipeline)?;

    let source = DirectorySource::open(&config.frame_dir, config.frame_interval)
        .with_context(|| format!("Failed to open frame directory {}", config.frame_dir.display()))?;

    // Inference is blocking; keep it off the runtime that drives the exporters.
    let stats = tokio::task::spawn_blocking(move || {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        FrameService::new(&pipeline).run(source, |report| {
            match serde_json::to_string(&report) {
                Ok(line) => {
                    if let Err(e) = writeln!(out, "{line}") {
                        tracing::error!(error = %e, "Failed to write report");
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to serialize report"),
            }
        })
    })
    .await?;

    tracing::info!(?stats, "Detector finished");
    Ok(())
}
