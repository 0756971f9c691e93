use preprocess::{CodecError, TensorLayout};
use serde::Serialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to load model from {}: {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("Unsupported model signature: {0}")]
    Signature(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

impl EngineError {
    pub fn model_load(path: &Path, reason: impl Into<String>) -> Self {
        EngineError::ModelLoad {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn inference(reason: impl Display) -> Self {
        EngineError::Inference(reason.to_string())
    }
}

/// A class index from the model that does not address the label set.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Class index {index} out of bounds for {len} labels")]
pub struct LabelIndexError {
    pub index: f32,
    pub len: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Box permutation {0:?} is not a permutation of [0, 1, 2, 3]")]
    InvalidPermutation(Vec<usize>),

    #[error("Confidence threshold must be within 0..=1, got {0}")]
    InvalidThreshold(f32),

    #[error("NMS IoU threshold must be within (0, 1], got {0}")]
    InvalidIouThreshold(f32),

    #[error("Codec layout {codec} does not match model input layout {model}")]
    LayoutMismatch {
        model: TensorLayout,
        codec: TensorLayout,
    },
}

/// Coarse error categories surfaced to pipeline callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Frame bytes are not a decodable image.
    Decode,
    /// Target dimensions are unusable.
    Resize,
    /// Model file missing, unreadable, or with an unsupported signature.
    ModelLoad,
    /// Input shape mismatch or backend failure during a forward pass.
    Inference,
    /// Class index outside the label set.
    LabelIndex,
    /// Invalid decoder or pipeline configuration.
    Config,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    LabelIndex(#[from] LabelIndexError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Codec(CodecError::Decode(_)) => ErrorKind::Decode,
            PipelineError::Codec(CodecError::Resize { .. }) => ErrorKind::Resize,
            PipelineError::Engine(EngineError::ModelLoad { .. })
            | PipelineError::Engine(EngineError::Signature(_)) => ErrorKind::ModelLoad,
            PipelineError::Engine(EngineError::Inference(_)) => ErrorKind::Inference,
            PipelineError::LabelIndex(_) => ErrorKind::LabelIndex,
            PipelineError::Config(_) => ErrorKind::Config,
        }
    }
}
