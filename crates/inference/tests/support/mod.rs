#![allow(dead_code)]

use image::{ImageFormat, Rgb, RgbImage};
use inference::{
    EngineError, FramePipeline, InferenceEngine, LabelSet, Model, OutputLayout, OutputTensors,
    PipelineConfig, Shape,
};
use ndarray::{ArrayD, IxDyn};
use preprocess::{InputTensor, TensorLayout};
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

pub const SIDE: usize = 16;

/// Counts overlapping forward passes across every engine sharing it.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Deterministic engine returning the same SSD-style outputs on every call.
pub struct StubEngine {
    layout: TensorLayout,
    boxes: Vec<[f32; 4]>,
    classes: Vec<f32>,
    scores: Vec<f32>,
    delay: Duration,
    probe: Arc<ConcurrencyProbe>,
    entered: Option<Sender<()>>,
    panic_once: Arc<AtomicBool>,
    captured: Arc<Mutex<Option<Vec<f32>>>>,
}

impl StubEngine {
    pub fn new(boxes: Vec<[f32; 4]>, classes: Vec<f32>, scores: Vec<f32>) -> Self {
        Self {
            layout: TensorLayout::Nhwc,
            boxes,
            classes,
            scores,
            delay: Duration::ZERO,
            probe: Arc::default(),
            entered: None,
            panic_once: Arc::default(),
            captured: Arc::default(),
        }
    }

    /// Three candidates: cat 0.9, dog 0.3, cat 0.5, boxes in `[y1, x1, y2, x2]`.
    pub fn cat_dog() -> Self {
        Self::new(
            vec![
                [0.1, 0.2, 0.3, 0.4],
                [0.0, 0.0, 1.0, 1.0],
                [0.5, 0.6, 0.7, 0.8],
            ],
            vec![0.0, 1.0, 0.0],
            vec![0.9, 0.3, 0.5],
        )
    }

    pub fn with_layout(mut self, layout: TensorLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_probe(mut self, probe: Arc<ConcurrencyProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Signal `entered` at the start of every forward pass.
    pub fn with_entered(mut self, entered: Sender<()>) -> Self {
        self.entered = Some(entered);
        self
    }

    pub fn panicking_once(self) -> Self {
        self.panic_once.store(true, Ordering::SeqCst);
        self
    }

    /// Record the values of every input tensor into `captured`.
    pub fn with_capture(mut self, captured: Arc<Mutex<Option<Vec<f32>>>>) -> Self {
        self.captured = captured;
        self
    }

    fn n(&self) -> i64 {
        self.scores.len() as i64
    }
}

impl InferenceEngine for StubEngine {
    fn load(path: &Path) -> Result<Self, EngineError> {
        Err(EngineError::model_load(path, "stub engine has no file format"))
    }

    fn input_shape(&self, _index: usize) -> Result<Shape, EngineError> {
        Ok(Shape::from(&self.layout.shape(SIDE)[..]))
    }

    fn output_shape(&self, index: usize) -> Result<Shape, EngineError> {
        match index {
            0 => Ok(Shape::new(vec![1, self.n(), 4])),
            1 | 2 => Ok(Shape::new(vec![1, self.n()])),
            _ => Err(EngineError::Signature(format!("no output {index}"))),
        }
    }

    fn run(&mut self, input: &InputTensor) -> Result<OutputTensors, EngineError> {
        let active = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_active.fetch_max(active, Ordering::SeqCst);
        self.probe.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(entered) = &self.entered {
            let _ = entered.send(());
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        self.probe.active.fetch_sub(1, Ordering::SeqCst);

        if self.panic_once.swap(false, Ordering::SeqCst) {
            panic!("stub engine crashed mid-inference");
        }

        if let Ok(mut captured) = self.captured.lock() {
            *captured = Some(input.view().iter().copied().collect());
        }

        let n = self.scores.len();
        let flat: Vec<f32> = self.boxes.iter().flatten().copied().collect();
        Ok(vec![
            ArrayD::from_shape_vec(IxDyn(&[1, n, 4]), flat).map_err(EngineError::inference)?,
            ArrayD::from_shape_vec(IxDyn(&[1, n]), self.classes.clone())
                .map_err(EngineError::inference)?,
            ArrayD::from_shape_vec(IxDyn(&[1, n]), self.scores.clone())
                .map_err(EngineError::inference)?,
        ])
    }
}

pub fn labels(names: &[&str]) -> LabelSet {
    names.iter().copied().collect()
}

pub fn pipeline(engine: StubEngine, labels: LabelSet) -> FramePipeline<StubEngine> {
    pipeline_with(engine, labels, PipelineConfig::default())
}

pub fn pipeline_with(
    engine: StubEngine,
    labels: LabelSet,
    config: PipelineConfig,
) -> FramePipeline<StubEngine> {
    let model = Model::new(engine, config.codec.layout, OutputLayout::default()).unwrap();
    FramePipeline::new(model, labels, config).unwrap()
}

/// PNG-encoded solid colour frame.
pub fn png_frame(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(rgb));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}
