use crate::config::InferenceConfig;
use common::{TelemetryConfig, TelemetryGuard};

const SERVICE_NAME: &str = "detector";

/// Install logging, exporting traces and metrics when an OTLP endpoint is set.
///
/// The returned guard must be held for the life of the process.
pub fn init_observability(config: &InferenceConfig) -> anyhow::Result<Option<TelemetryGuard>> {
    match telemetry_config(config) {
        Some(telemetry) => Ok(Some(TelemetryGuard::init(&telemetry)?)),
        None => {
            common::setup_logging(config.environment)?;
            Ok(None)
        }
    }
}

fn telemetry_config(config: &InferenceConfig) -> Option<TelemetryConfig> {
    let endpoint = config.otel_endpoint.as_deref()?;

    let mut telemetry = TelemetryConfig::new(SERVICE_NAME, endpoint, config.environment)
        .with_attribute("model.path", config.model_path.display().to_string())
        .with_attribute(
            "model.tensor_layout",
            config.pipeline.codec.layout.to_string(),
        );
    telemetry.metric_interval = config.metric_interval;
    telemetry.trace_sample_ratio = config.trace_sample_ratio;
    Some(telemetry)
}
