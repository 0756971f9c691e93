//! Object detection over camera frames.
//!
//! A [`FramePipeline`] owns one loaded [`Model`] and turns compressed frames
//! into [`DetectionResult`]s: the frame is encoded by
//! [`preprocess::TensorCodec`], run through an [`InferenceEngine`] and decoded
//! by a [`DetectionDecoder`]. At most one forward pass runs per model.

pub mod backend;
pub mod config;
pub mod error;
pub mod labels;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod processing;
pub mod service;

pub use backend::{InferenceEngine, OutputTensors, Shape};
pub use config::InferenceConfig;
pub use error::{ConfigError, EngineError, ErrorKind, LabelIndexError, PipelineError};
pub use labels::LabelSet;
pub use model::{Model, ModelShapes, OutputLayout, RawOutputTensors};
pub use pipeline::{FrameOutcome, FramePipeline, PipelineConfig};
pub use processing::post::{
    BoundingBox, BoxPermutation, DecoderConfig, Detection, DetectionDecoder, DetectionResult,
};
pub use service::{DirectorySource, Frame, FrameReport, FrameService, FrameStatus, ServiceStats};
