use crate::model::OutputLayout;
use crate::pipeline::PipelineConfig;
use crate::processing::post::{BoxPermutation, DecoderConfig};
use common::{parse_env, parse_env_or};
use preprocess::{ChannelScale, CodecConfig, TensorLayout};
use std::path::PathBuf;
use std::time::Duration;

pub use common::Environment;

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub environment: Environment,
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub frame_dir: PathBuf,
    /// Pause between frames read from `frame_dir`; zero reads as fast as possible.
    pub frame_interval: Duration,
    pub pipeline: PipelineConfig,
    pub otel_endpoint: Option<String>,
    pub metric_interval: Duration,
    /// Fraction of frame traces exported, within `0..=1`.
    pub trace_sample_ratio: f64,
}

impl InferenceConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Unset variables take their default; a variable that is set but does
    /// not parse is an error.
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();

        let model_path = parse_env_or("MODEL_PATH", PathBuf::from("models/model.onnx"))?;
        let labels_path = parse_env_or("LABELS_PATH", PathBuf::from("models/labels.txt"))?;
        let frame_dir = parse_env_or("FRAME_DIR", PathBuf::from("frames"))?;
        let frame_interval = Duration::from_millis(parse_env_or("FRAME_INTERVAL_MS", 0u64)?);

        let decoder_defaults = DecoderConfig::default();
        let decoder = DecoderConfig {
            confidence_threshold: parse_env_or(
                "CONFIDENCE_THRESHOLD",
                decoder_defaults.confidence_threshold,
            )?,
            permutation: parse_env_or("BOX_PERMUTATION", BoxPermutation::default())?,
            nms_iou_threshold: parse_env("NMS_IOU_THRESHOLD")?,
        };
        decoder.validate()?;

        let codec = CodecConfig {
            layout: parse_env_or("TENSOR_LAYOUT", TensorLayout::default())?,
            scale: parse_env_or("CHANNEL_SCALE", ChannelScale::default())?,
        };

        let output_defaults = OutputLayout::default();
        let outputs = OutputLayout {
            boxes: parse_env_or("OUTPUT_BOXES", output_defaults.boxes)?,
            classes: parse_env_or("OUTPUT_CLASSES", output_defaults.classes)?,
            scores: parse_env_or("OUTPUT_SCORES", output_defaults.scores)?,
        };

        let metric_interval = Duration::from_millis(parse_env_or(
            "OTEL_METRIC_INTERVAL_MS",
            common::telemetry::DEFAULT_METRIC_INTERVAL.as_millis() as u64,
        )?);
        if metric_interval.is_zero() {
            anyhow::bail!("OTEL_METRIC_INTERVAL_MS must be greater than zero");
        }
        let trace_sample_ratio: f64 = parse_env_or("OTEL_TRACE_SAMPLE_RATIO", 1.0)?;
        if !(0.0..=1.0).contains(&trace_sample_ratio) {
            anyhow::bail!("OTEL_TRACE_SAMPLE_RATIO must be within 0..=1, got {trace_sample_ratio}");
        }

        Ok(Self {
            environment,
            model_path,
            labels_path,
            frame_dir,
            frame_interval,
            pipeline: PipelineConfig {
                decoder,
                codec,
                outputs,
            },
            otel_endpoint: parse_env("OTEL_ENDPOINT")?,
            metric_interval,
            trace_sample_ratio,
        })
    }
}
