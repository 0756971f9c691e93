use crate::backend::{InferenceEngine, OutputTensors, Shape};
use crate::error::EngineError;
use ndarray::{Array1, Array2, ArrayD};
use preprocess::{InputTensor, TensorLayout, tensor::CHANNELS};
use std::path::Path;

/// Number of coordinates per box.
pub const BOX_SIZE: usize = 4;

/// Which model output holds which tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
    pub boxes: usize,
    pub classes: usize,
    pub scores: usize,
}

impl Default for OutputLayout {
    /// SSD-style detectors: locations, classes, scores (then a count, unused).
    fn default() -> Self {
        Self {
            boxes: 0,
            classes: 1,
            scores: 2,
        }
    }
}

/// Tensor geometry of a loaded model, queried once at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelShapes {
    pub input_side: u32,
    pub layout: TensorLayout,
    /// Candidate boxes per forward pass (N).
    pub box_count: usize,
    pub box_size: usize,
    /// Trailing width of the class tensor; the class index is column 0.
    pub class_width: usize,
}

impl ModelShapes {
    pub fn query<E: InferenceEngine>(
        engine: &E,
        layout: TensorLayout,
        outputs: OutputLayout,
    ) -> Result<Self, EngineError> {
        let input = engine.input_shape(0)?;
        let input_side = input_side(&input, layout)?;

        let boxes = engine.output_shape(outputs.boxes)?;
        let (box_count, box_size) = box_dims(&boxes)?;

        let classes = engine.output_shape(outputs.classes)?;
        let (class_count, class_width) = class_dims(&classes)?;

        let scores = engine.output_shape(outputs.scores)?;
        let score_count = score_dims(&scores)?;

        if class_count != box_count || score_count != box_count {
            return Err(EngineError::Signature(format!(
                "output box counts disagree: boxes {boxes}, classes {classes}, scores {scores}"
            )));
        }

        Ok(Self {
            input_side,
            layout,
            box_count,
            box_size,
            class_width,
        })
    }

    pub fn input_dims(&self) -> [usize; 4] {
        self.layout.shape(self.input_side as usize)
    }
}

fn fixed(shape: &Shape, axis: usize, what: &str) -> Result<usize, EngineError> {
    shape.dim(axis).filter(|&d| d > 0).ok_or_else(|| {
        EngineError::Signature(format!("{what} axis {axis} of {shape} is not a fixed size"))
    })
}

/// Candidate-count axis; a fixed 0 is a model that never detects anything.
fn count(shape: &Shape, axis: usize, what: &str) -> Result<usize, EngineError> {
    shape.dim(axis).ok_or_else(|| {
        EngineError::Signature(format!("{what} axis {axis} of {shape} is not a fixed size"))
    })
}

fn check_batch(shape: &Shape, what: &str) -> Result<(), EngineError> {
    if shape.accepts(0, 1) {
        Ok(())
    } else {
        Err(EngineError::Signature(format!(
            "{what} {shape} must have a batch of one"
        )))
    }
}

fn input_side(shape: &Shape, layout: TensorLayout) -> Result<u32, EngineError> {
    if shape.rank() != 4 {
        return Err(EngineError::Signature(format!(
            "input {shape} must be rank 4 ({layout})"
        )));
    }
    check_batch(shape, "input")?;

    let (h_axis, w_axis, c_axis) = match layout {
        TensorLayout::Nhwc => (1, 2, 3),
        TensorLayout::Nchw => (2, 3, 1),
    };
    let height = fixed(shape, h_axis, "input")?;
    let width = fixed(shape, w_axis, "input")?;
    let channels = fixed(shape, c_axis, "input")?;

    if height != width {
        return Err(EngineError::Signature(format!(
            "input {shape} is not square ({width}x{height})"
        )));
    }
    if channels != CHANNELS {
        return Err(EngineError::Signature(format!(
            "input {shape} has {channels} channels, expected {CHANNELS} ({layout})"
        )));
    }

    u32::try_from(width)
        .map_err(|_| EngineError::Signature(format!("input side {width} is too large")))
}

/// `[1, N, 4]` or `[N, 4]`.
fn box_dims(shape: &Shape) -> Result<(usize, usize), EngineError> {
    let offset = match shape.rank() {
        3 => {
            check_batch(shape, "boxes")?;
            1
        }
        2 => 0,
        _ => {
            return Err(EngineError::Signature(format!(
                "boxes {shape} must be [1, N, 4] or [N, 4]"
            )));
        }
    };
    let n = count(shape, offset, "boxes")?;
    let size = fixed(shape, offset + 1, "boxes")?;
    if size != BOX_SIZE {
        return Err(EngineError::Signature(format!(
            "boxes {shape} carry {size} coordinates, expected {BOX_SIZE}"
        )));
    }
    Ok((n, size))
}

/// `[N]`, `[1, N]` or `[1, N, K]`.
fn class_dims(shape: &Shape) -> Result<(usize, usize), EngineError> {
    match shape.rank() {
        1 => Ok((count(shape, 0, "classes")?, 1)),
        2 => {
            check_batch(shape, "classes")?;
            Ok((count(shape, 1, "classes")?, 1))
        }
        3 => {
            check_batch(shape, "classes")?;
            Ok((count(shape, 1, "classes")?, fixed(shape, 2, "classes")?))
        }
        _ => Err(EngineError::Signature(format!(
            "classes {shape} must be [N], [1, N] or [1, N, K]"
        ))),
    }
}

/// `[N]` or `[1, N]`.
fn score_dims(shape: &Shape) -> Result<usize, EngineError> {
    match shape.rank() {
        1 => count(shape, 0, "scores"),
        2 => {
            check_batch(shape, "scores")?;
            count(shape, 1, "scores")
        }
        _ => Err(EngineError::Signature(format!(
            "scores {shape} must be [N] or [1, N]"
        ))),
    }
}

/// Box, class and score tensors of one forward pass, index-aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutputTensors {
    boxes: Array2<f32>,
    classes: Array1<f32>,
    scores: Array1<f32>,
}

impl RawOutputTensors {
    pub fn new(
        boxes: Array2<f32>,
        classes: Array1<f32>,
        scores: Array1<f32>,
    ) -> Result<Self, EngineError> {
        let n = boxes.nrows();
        if boxes.ncols() != BOX_SIZE {
            return Err(EngineError::inference(format!(
                "boxes have {} coordinates, expected {BOX_SIZE}",
                boxes.ncols()
            )));
        }
        if classes.len() != n || scores.len() != n {
            return Err(EngineError::inference(format!(
                "parallel outputs disagree: {n} boxes, {} classes, {} scores",
                classes.len(),
                scores.len()
            )));
        }
        Ok(Self {
            boxes,
            classes,
            scores,
        })
    }

    pub fn empty() -> Self {
        Self {
            boxes: Array2::zeros((0, BOX_SIZE)),
            classes: Array1::zeros(0),
            scores: Array1::zeros(0),
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn boxes(&self) -> &Array2<f32> {
        &self.boxes
    }

    pub fn classes(&self) -> &Array1<f32> {
        &self.classes
    }

    pub fn scores(&self) -> &Array1<f32> {
        &self.scores
    }

    /// The four raw box components of candidate `index`, in model order.
    pub fn box_at(&self, index: usize) -> [f32; BOX_SIZE] {
        let row = self.boxes.row(index);
        [row[0], row[1], row[2], row[3]]
    }
}

/// A loaded model together with its load-time shapes.
pub struct Model<E> {
    engine: E,
    shapes: ModelShapes,
    outputs: OutputLayout,
}

impl<E: InferenceEngine> Model<E> {
    pub fn load(
        path: &Path,
        layout: TensorLayout,
        outputs: OutputLayout,
    ) -> Result<Self, EngineError> {
        let engine = E::load(path)?;
        Self::new(engine, layout, outputs)
    }

    pub fn new(
        engine: E,
        layout: TensorLayout,
        outputs: OutputLayout,
    ) -> Result<Self, EngineError> {
        let shapes = ModelShapes::query(&engine, layout, outputs)?;

        tracing::info!(
            input_side = shapes.input_side,
            layout = %shapes.layout,
            box_count = shapes.box_count,
            class_width = shapes.class_width,
            "Model shapes resolved"
        );

        Ok(Self {
            engine,
            shapes,
            outputs,
        })
    }

    pub fn shapes(&self) -> &ModelShapes {
        &self.shapes
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Validate `input`, run one forward pass and split the outputs.
    pub fn run(&mut self, input: &InputTensor) -> Result<RawOutputTensors, EngineError> {
        let expected = self.shapes.input_dims();
        if input.layout() != self.shapes.layout || input.shape() != expected {
            return Err(EngineError::inference(format!(
                "input tensor {:?} ({}) does not match model input {:?} ({})",
                input.shape(),
                input.layout(),
                expected,
                self.shapes.layout
            )));
        }

        let outputs = self.engine.run(input)?;
        self.split(outputs)
    }

    fn split(&self, outputs: OutputTensors) -> Result<RawOutputTensors, EngineError> {
        let n = self.shapes.box_count;

        let boxes = flatten(&outputs, self.outputs.boxes, n * BOX_SIZE, "boxes")?;
        let classes = flatten(
            &outputs,
            self.outputs.classes,
            n * self.shapes.class_width,
            "classes",
        )?;
        let scores = flatten(&outputs, self.outputs.scores, n, "scores")?;

        let boxes = Array2::from_shape_vec((n, BOX_SIZE), boxes).map_err(EngineError::inference)?;
        let classes: Array1<f32> = classes
            .into_iter()
            .step_by(self.shapes.class_width)
            .collect();

        RawOutputTensors::new(boxes, classes, Array1::from_vec(scores))
    }
}

fn flatten(
    outputs: &[ArrayD<f32>],
    index: usize,
    expected: usize,
    what: &str,
) -> Result<Vec<f32>, EngineError> {
    let tensor = outputs.get(index).ok_or_else(|| {
        EngineError::inference(format!(
            "{what} output {index} missing, backend returned {} outputs",
            outputs.len()
        ))
    })?;

    if tensor.len() != expected {
        return Err(EngineError::inference(format!(
            "{what} output {index} has {} values, expected {expected} (shape {:?})",
            tensor.len(),
            tensor.shape()
        )));
    }

    Ok(tensor.iter().copied().collect())
}
