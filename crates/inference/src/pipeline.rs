use crate::backend::InferenceEngine;
use crate::error::{ConfigError, PipelineError};
use crate::labels::LabelSet;
use crate::model::{Model, ModelShapes, OutputLayout};
use crate::processing::post::{DecoderConfig, DetectionDecoder, DetectionResult};
use common::{span, span_debug};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use preprocess::{CodecConfig, TensorCodec};
use std::path::Path;
use std::sync::{Mutex, PoisonError, TryLockError};
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineConfig {
    pub decoder: DecoderConfig,
    pub codec: CodecConfig,
    pub outputs: OutputLayout,
}

/// Result of a single-flight submission.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Completed(DetectionResult),
    /// Another frame held the model; nothing was done with this one.
    Dropped,
}

struct PipelineMetrics {
    duration: Histogram<f64>,
    frames: Counter<u64>,
    dropped: Counter<u64>,
    detections: Counter<u64>,
}

impl PipelineMetrics {
    fn init(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.005, 0.01, 0.02, 0.03, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0,
        ];

        Self {
            duration: meter
                .f64_histogram("pipeline_duration_seconds")
                .with_description("Time to process a single frame (encode + infer + decode)")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
            frames: meter
                .u64_counter("pipeline_frames_total")
                .with_description("Total frames processed")
                .build(),
            dropped: meter
                .u64_counter("pipeline_frames_dropped_total")
                .with_description("Frames dropped because an inference was in flight")
                .build(),
            detections: meter
                .u64_counter("pipeline_detections_total")
                .with_description("Total detections produced")
                .build(),
        }
    }
}

/// Frame bytes in, detections out, one forward pass at a time.
pub struct FramePipeline<E> {
    model: Mutex<Model<E>>,
    shapes: ModelShapes,
    labels: LabelSet,
    codec: TensorCodec,
    decoder: DetectionDecoder,
    metrics: PipelineMetrics,
}

impl<E: InferenceEngine> FramePipeline<E> {
    pub fn load(
        path: &Path,
        labels: LabelSet,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let model = Model::load(path, config.codec.layout, config.outputs)?;
        Self::new(model, labels, config)
    }

    pub fn new(
        model: Model<E>,
        labels: LabelSet,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let decoder = DetectionDecoder::new(config.decoder)?;
        let shapes = model.shapes().clone();

        if shapes.layout != config.codec.layout {
            return Err(ConfigError::LayoutMismatch {
                model: shapes.layout,
                codec: config.codec.layout,
            }
            .into());
        }

        tracing::info!(
            input_side = shapes.input_side,
            labels = labels.len(),
            threshold = config.decoder.confidence_threshold,
            permutation = %config.decoder.permutation,
            nms = ?config.decoder.nms_iou_threshold,
            "Frame pipeline ready"
        );

        Ok(Self {
            model: Mutex::new(model),
            shapes,
            labels,
            codec: TensorCodec::new(config.codec),
            decoder,
            metrics: PipelineMetrics::init("pipeline"),
        })
    }

    pub fn input_side(&self) -> u32 {
        self.shapes.input_side
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn shapes(&self) -> &ModelShapes {
        &self.shapes
    }

    /// Encode, infer and decode one frame, waiting for the model if busy.
    pub fn process(&self, frame: &[u8]) -> Result<DetectionResult, PipelineError> {
        // A panic inside a previous forward pass leaves no partial state in
        // the model wrapper, so a poisoned lock is still usable.
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        self.run_locked(&mut model, frame)
    }

    /// Like [`process`](Self::process), but drops the frame instead of
    /// waiting when another forward pass is in flight.
    pub fn submit(&self, frame: &[u8]) -> Result<FrameOutcome, PipelineError> {
        let mut model = match self.model.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                self.metrics.dropped.add(1, &[]);
                tracing::trace!("Model busy, frame dropped");
                return Ok(FrameOutcome::Dropped);
            }
        };

        self.run_locked(&mut model, frame)
            .map(FrameOutcome::Completed)
    }

    fn run_locked(
        &self,
        model: &mut Model<E>,
        frame: &[u8],
    ) -> Result<DetectionResult, PipelineError> {
        let _span = span!("process_frame", bytes = frame.len());
        let start = Instant::now();

        let result = self.encode_infer_decode(model, frame);

        self.metrics
            .duration
            .record(start.elapsed().as_secs_f64(), &[]);
        match &result {
            Ok(detections) => {
                self.metrics.frames.add(1, &[KeyValue::new("status", "ok")]);
                self.metrics.detections.add(detections.len() as u64, &[]);
            }
            Err(e) => {
                self.metrics
                    .frames
                    .add(1, &[KeyValue::new("status", "error")]);
                tracing::debug!(error = %e, kind = ?e.kind(), "Frame failed");
            }
        }

        result
    }

    fn encode_infer_decode(
        &self,
        model: &mut Model<E>,
        frame: &[u8],
    ) -> Result<DetectionResult, PipelineError> {
        let input = {
            let _span = span_debug!("encode");
            self.codec.encode(frame, self.shapes.input_side)?
        };

        let raw = {
            let _span = span!("model_inference");
            model.run(&input)?
        };

        let result = self.decoder.decode(&raw, &self.labels)?;
        tracing::trace!(detections = result.len(), "Frame decoded");
        Ok(result)
    }
}
