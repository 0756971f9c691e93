use super::nms;
use crate::error::{ConfigError, LabelIndexError};
use crate::labels::LabelSet;
use crate::model::{BOX_SIZE, RawOutputTensors};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Reorders the four raw box components into `[x1, y1, x2, y2]`.
///
/// `order[k]` is the raw component index that becomes output component `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxPermutation([usize; BOX_SIZE]);

impl BoxPermutation {
    pub const IDENTITY: Self = Self([0, 1, 2, 3]);

    /// SSD models emit `[y1, x1, y2, x2]`.
    pub const YXYX: Self = Self([1, 0, 3, 2]);

    pub fn new(order: [usize; BOX_SIZE]) -> Result<Self, ConfigError> {
        let mut seen = [false; BOX_SIZE];
        for &i in &order {
            if i >= BOX_SIZE || seen[i] {
                return Err(ConfigError::InvalidPermutation(order.to_vec()));
            }
            seen[i] = true;
        }
        Ok(Self(order))
    }

    pub fn order(&self) -> [usize; BOX_SIZE] {
        self.0
    }

    #[inline]
    pub fn apply(&self, raw: [f32; BOX_SIZE]) -> [f32; BOX_SIZE] {
        self.0.map(|i| raw[i])
    }
}

impl Default for BoxPermutation {
    fn default() -> Self {
        Self::YXYX
    }
}

impl FromStr for BoxPermutation {
    type Err = ConfigError;

    /// Comma-separated indices, e.g. `1,0,3,2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed: Vec<usize> = s
            .split(',')
            .map(|part| part.trim().parse::<usize>())
            .collect::<Result<_, _>>()
            .map_err(|_| ConfigError::InvalidPermutation(Vec::new()))?;

        let order: [usize; BOX_SIZE] = parsed
            .clone()
            .try_into()
            .map_err(|_| ConfigError::InvalidPermutation(parsed))?;
        Self::new(order)
    }
}

impl fmt::Display for BoxPermutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a},{b},{c},{d}")
    }
}

/// Axis-aligned box in the model's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn from_corners([x1, y1, x2, y2]: [f32; BOX_SIZE]) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union; 0 when either box is degenerate.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Scale a normalized box to a `width x height` pixel grid.
    pub fn to_pixels(&self, width: u32, height: u32) -> BoundingBox {
        let (w, h) = (width as f32, height as f32);
        BoundingBox {
            x1: self.x1 * w,
            y1: self.y1 * h,
            x2: self.x2 * w,
            y2: self.y2 * h,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    label: String,
    score: f32,
    #[serde(rename = "box")]
    bbox: BoundingBox,
}

impl Detection {
    pub(crate) fn new(label: String, score: f32, bbox: BoundingBox) -> Self {
        Self { label, score, bbox }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bbox
    }
}

/// Outcome of decoding one frame, in model output order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detections", rename_all = "snake_case")]
pub enum DetectionResult {
    Empty,
    Detections(Vec<Detection>),
}

impl DetectionResult {
    pub fn from_detections(detections: Vec<Detection>) -> Self {
        if detections.is_empty() {
            DetectionResult::Empty
        } else {
            DetectionResult::Detections(detections)
        }
    }

    pub fn detections(&self) -> &[Detection] {
        match self {
            DetectionResult::Empty => &[],
            DetectionResult::Detections(detections) => detections,
        }
    }

    pub fn len(&self) -> usize {
        self.detections().len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecoderConfig {
    /// Inclusive lower bound on score.
    pub confidence_threshold: f32,
    pub permutation: BoxPermutation,
    /// Class-aware NMS; `None` keeps every candidate above threshold.
    pub nms_iou_threshold: Option<f32>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            permutation: BoxPermutation::default(),
            nms_iou_threshold: None,
        }
    }
}

impl DecoderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        if let Some(iou) = self.nms_iou_threshold
            && !(iou > 0.0 && iou <= 1.0)
        {
            return Err(ConfigError::InvalidIouThreshold(iou));
        }
        Ok(())
    }
}

/// Turns raw model outputs into labeled detections.
#[derive(Debug, Clone)]
pub struct DetectionDecoder {
    config: DecoderConfig,
}

impl DetectionDecoder {
    pub fn new(config: DecoderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    #[tracing::instrument(skip_all, fields(candidates = raw.len()))]
    pub fn decode(
        &self,
        raw: &RawOutputTensors,
        labels: &LabelSet,
    ) -> Result<DetectionResult, LabelIndexError> {
        let threshold = self.config.confidence_threshold;
        let mut detections = Vec::new();

        for (i, (&score, &class_id)) in raw.scores().iter().zip(raw.classes()).enumerate() {
            // NaN fails this comparison and is skipped with the rest.
            if !(score >= threshold) {
                continue;
            }

            let label = labels.get(class_id)?;
            let bbox = BoundingBox::from_corners(self.config.permutation.apply(raw.box_at(i)));
            detections.push(Detection::new(label.to_owned(), score, bbox));
        }

        if let Some(iou) = self.config.nms_iou_threshold {
            let before = detections.len();
            detections = nms::suppress(detections, iou);
            tracing::trace!(before, after = detections.len(), "NMS applied");
        }

        Ok(DetectionResult::from_detections(detections))
    }
}
