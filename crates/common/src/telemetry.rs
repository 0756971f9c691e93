use crate::Environment;
use anyhow::{Context, bail};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::attribute::{SERVICE_NAME, SERVICE_VERSION};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_METRIC_INTERVAL: Duration = Duration::from_secs(10);

/// Where and how often a process exports traces and metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub endpoint: String,
    pub environment: Environment,
    /// Period of the metric reader; per-frame counters are aggregated over it.
    pub metric_interval: Duration,
    /// Fraction of root spans kept, within `0..=1`.
    pub trace_sample_ratio: f64,
    /// Extra resource attributes, e.g. the model a detector is serving.
    pub attributes: Vec<(String, String)>,
}

impl TelemetryConfig {
    pub fn new(service_name: &str, endpoint: &str, environment: Environment) -> Self {
        Self {
            service_name: service_name.to_string(),
            endpoint: endpoint.to_string(),
            environment,
            metric_interval: DEFAULT_METRIC_INTERVAL,
            trace_sample_ratio: 1.0,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.push((key.to_string(), value.into()));
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.metric_interval.is_zero() {
            bail!("metric export interval must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.trace_sample_ratio) {
            bail!(
                "trace sample ratio must be within 0..=1, got {}",
                self.trace_sample_ratio
            );
        }
        Ok(())
    }

    fn resource(&self) -> Resource {
        let mut attributes = vec![
            KeyValue::new(SERVICE_NAME, self.service_name.clone()),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
            KeyValue::new("deployment.environment", self.environment.as_str()),
        ];
        attributes.extend(
            self.attributes
                .iter()
                .map(|(key, value)| KeyValue::new(key.clone(), value.clone())),
        );

        Resource::builder().with_attributes(attributes).build()
    }

    fn sampler(&self) -> Sampler {
        let root = if self.trace_sample_ratio >= 1.0 {
            Sampler::AlwaysOn
        } else {
            Sampler::TraceIdRatioBased(self.trace_sample_ratio)
        };
        Sampler::ParentBased(Box::new(root))
    }
}

/// Owns the OTLP trace and metric providers for a process.
///
/// Pipeline counters and spans are recorded through the global `opentelemetry`
/// API regardless; without a guard they go to the no-op providers.
///
/// ```ignore
/// let config = TelemetryConfig::new("detector", "http://localhost:4317", Environment::Production);
/// let _telemetry = TelemetryGuard::init(&config)?;
/// // providers are flushed and shut down when the guard drops
/// ```
pub struct TelemetryGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl TelemetryGuard {
    /// Install OTLP exporters and the tracing subscriber.
    ///
    /// Replaces [`crate::setup_logging`]: the subscriber installed here carries
    /// a tracing-opentelemetry layer bound to this service's tracer.
    pub fn init(config: &TelemetryConfig) -> anyhow::Result<Self> {
        config.validate()?;
        global::set_text_map_propagator(TraceContextPropagator::new());

        let resource = config.resource();

        let span_exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&config.endpoint)
            .build()
            .context("Failed to build OTLP span exporter")?;
        let tracer_provider = SdkTracerProvider::builder()
            .with_resource(resource.clone())
            .with_sampler(config.sampler())
            .with_batch_exporter(span_exporter)
            .build();
        global::set_tracer_provider(tracer_provider.clone());

        let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(&config.endpoint)
            .build()
            .context("Failed to build OTLP metric exporter")?;
        let meter_provider = SdkMeterProvider::builder()
            .with_resource(resource)
            .with_reader(
                PeriodicReader::builder(metric_exporter)
                    .with_interval(config.metric_interval)
                    .build(),
            )
            .build();
        global::set_meter_provider(meter_provider.clone());

        let otel_layer = tracing_opentelemetry::layer()
            .with_tracer(global::tracer(config.service_name.clone()));
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let registry = tracing_subscriber::registry()
            .with(env_filter)
            .with(otel_layer);

        match config.environment {
            Environment::Production => registry
                .with(tracing_subscriber::fmt::layer().json().with_level(true))
                .try_init()?,
            Environment::Development => registry
                .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
                .try_init()?,
        }

        tracing::info!(
            service = %config.service_name,
            endpoint = %config.endpoint,
            metric_interval_ms = config.metric_interval.as_millis() as u64,
            trace_sample_ratio = config.trace_sample_ratio,
            "Telemetry export enabled"
        );

        Ok(Self {
            tracer_provider,
            meter_provider,
        })
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.meter_provider.shutdown() {
            eprintln!("Meter provider shutdown failed: {e:?}");
        }
        if let Err(e) = self.tracer_provider.shutdown() {
            eprintln!("Tracer provider shutdown failed: {e:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TelemetryConfig {
        TelemetryConfig::new("detector", "http://localhost:4317", Environment::Development)
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert_eq!(config.metric_interval, DEFAULT_METRIC_INTERVAL);
        assert_eq!(config.trace_sample_ratio, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut bad = config();
        bad.metric_interval = Duration::ZERO;
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.trace_sample_ratio = 1.5;
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.trace_sample_ratio = f64::NAN;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_resource_carries_service_attributes() {
        let resource = config()
            .with_attribute("model.path", "models/ssd.onnx")
            .resource();

        assert_eq!(
            resource.get(&SERVICE_NAME.into()),
            Some("detector".into())
        );
        assert_eq!(
            resource.get(&"deployment.environment".into()),
            Some("development".into())
        );
        assert_eq!(
            resource.get(&"model.path".into()),
            Some("models/ssd.onnx".into())
        );
    }
}
