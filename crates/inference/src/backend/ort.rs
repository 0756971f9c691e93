use super::{InferenceEngine, OutputTensors, Shape};
use crate::error::EngineError;
use ort::{
    session::{Outlet, Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use preprocess::InputTensor;
use std::fmt::Display;
use std::path::Path;

const INTRA_THREADS: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    #[cfg(feature = "cuda")]
    Cuda,
}

/// ONNX Runtime backend.
pub struct OrtEngine {
    session: Session,
    input_name: String,
    output_count: usize,
}

impl OrtEngine {
    /// Load model with specified execution provider
    pub fn load_with_provider(
        path: &Path,
        provider: ExecutionProvider,
    ) -> Result<Self, EngineError> {
        if !path.is_file() {
            return Err(EngineError::model_load(path, "model file not found"));
        }

        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let mut builder = Session::builder()
            .map_err(load_error(path))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_error(path))?
            .with_intra_threads(INTRA_THREADS)
            .map_err(load_error(path))?;

        match provider {
            #[cfg(feature = "cuda")]
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = builder
                    .with_execution_providers([
                        ort::execution_providers::CUDAExecutionProvider::default()
                            .with_device_id(0)
                            .build()
                            .error_on_failure(),
                    ])
                    .map_err(load_error(path))?;
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder.commit_from_file(path).map_err(load_error(path))?;

        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .ok_or_else(|| EngineError::Signature("model declares no inputs".into()))?;
        let output_count = session.outputs().len();

        tracing::info!(
            path = %path.display(),
            input_name = %input_name,
            output_count,
            "Model loaded"
        );

        Ok(Self {
            session,
            input_name,
            output_count,
        })
    }
}

impl InferenceEngine for OrtEngine {
    fn load(path: &Path) -> Result<Self, EngineError> {
        #[cfg(feature = "cuda")]
        let provider = ExecutionProvider::Cuda;
        #[cfg(not(feature = "cuda"))]
        let provider = ExecutionProvider::Cpu;

        Self::load_with_provider(path, provider)
    }

    fn input_shape(&self, index: usize) -> Result<Shape, EngineError> {
        outlet_shape(self.session.inputs(), index, "input")
    }

    fn output_shape(&self, index: usize) -> Result<Shape, EngineError> {
        outlet_shape(self.session.outputs(), index, "output")
    }

    fn run(&mut self, input: &InputTensor) -> Result<OutputTensors, EngineError> {
        let tensor = TensorRef::from_array_view(input.view()).map_err(EngineError::inference)?;
        let input_name = self.input_name.clone();

        let outputs = self
            .session
            .run(ort::inputs![input_name => tensor])
            .map_err(EngineError::inference)?;

        let mut tensors = Vec::with_capacity(self.output_count);
        for index in 0..self.output_count {
            let value = &outputs[index];
            // Class outputs are often int64; everything downstream is f32.
            let array = match value.try_extract_array::<f32>() {
                Ok(view) => view.into_owned(),
                Err(_) => value
                    .try_extract_array::<i64>()
                    .map_err(EngineError::inference)?
                    .mapv(|v| v as f32),
            };
            tensors.push(array);
        }

        Ok(tensors)
    }
}

fn outlet_shape(outlets: &[Outlet], index: usize, role: &str) -> Result<Shape, EngineError> {
    let outlet = outlets.get(index).ok_or_else(|| {
        EngineError::Signature(format!(
            "{role} {index} requested but model has {} {role}s",
            outlets.len()
        ))
    })?;

    let dims = outlet.dtype().tensor_shape().ok_or_else(|| {
        EngineError::Signature(format!("{role} '{}' is not a tensor", outlet.name()))
    })?;

    Ok(Shape::new(dims.iter().copied().collect()))
}

fn load_error<E: Display>(path: &Path) -> impl Fn(E) -> EngineError + '_ {
    move |e| EngineError::model_load(path, e.to_string())
}
