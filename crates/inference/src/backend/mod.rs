use crate::error::EngineError;
use ndarray::ArrayD;
use preprocess::InputTensor;
use std::fmt;
use std::path::Path;

#[cfg(feature = "ort-backend")]
pub mod ort;

/// Dimensions of a model tensor as reported by the backend.
///
/// Negative entries are dynamic axes whose size is only known per call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<i64>);

impl Shape {
    pub fn new(dims: Vec<i64>) -> Self {
        Self(dims)
    }

    pub fn dims(&self) -> &[i64] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Size of axis `axis`, or `None` when the axis is missing or dynamic.
    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.0
            .get(axis)
            .and_then(|&d| usize::try_from(d).ok())
    }

    /// `true` when axis `axis` is either dynamic or exactly `size`.
    pub fn accepts(&self, axis: usize, size: usize) -> bool {
        match self.0.get(axis) {
            Some(&d) if d < 0 => true,
            Some(&d) => d as usize == size,
            None => false,
        }
    }
}

impl From<Vec<i64>> for Shape {
    fn from(dims: Vec<i64>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.iter().map(|&d| d as i64).collect())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Every output tensor of one forward pass, in the model's output order.
pub type OutputTensors = Vec<ArrayD<f32>>;

/// A model-execution backend.
///
/// Implementations wrap one loaded model. `run` takes `&mut self`, so a
/// single instance never executes two forward passes at once; sharing one
/// between threads requires an external lock (see
/// [`crate::pipeline::FramePipeline`]).
pub trait InferenceEngine {
    fn load(path: &Path) -> Result<Self, EngineError>
    where
        Self: Sized;

    fn input_shape(&self, index: usize) -> Result<Shape, EngineError>;

    fn output_shape(&self, index: usize) -> Result<Shape, EngineError>;

    /// One synchronous forward pass.
    fn run(&mut self, input: &InputTensor) -> Result<OutputTensors, EngineError>;
}
