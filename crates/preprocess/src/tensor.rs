use ndarray::{Array, ArrayViewD, IxDyn};
use std::fmt;
use std::str::FromStr;

/// Number of colour channels fed to the model.
pub const CHANNELS: usize = 3;

/// Memory layout of the encoded input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
    /// `[1, side, side, 3]`, channels interleaved per pixel.
    #[default]
    Nhwc,
    /// `[1, 3, side, side]`, one plane per channel.
    Nchw,
}

impl TensorLayout {
    /// Shape of a single-image tensor with the given side length.
    pub fn shape(&self, side: usize) -> [usize; 4] {
        match self {
            TensorLayout::Nhwc => [1, side, side, CHANNELS],
            TensorLayout::Nchw => [1, CHANNELS, side, side],
        }
    }
}

impl FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nhwc" => Ok(TensorLayout::Nhwc),
            "nchw" => Ok(TensorLayout::Nchw),
            other => Err(format!("unknown tensor layout '{other}' (expected nhwc or nchw)")),
        }
    }
}

impl fmt::Display for TensorLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorLayout::Nhwc => f.write_str("nhwc"),
            TensorLayout::Nchw => f.write_str("nchw"),
        }
    }
}

/// Value range written into the tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelScale {
    /// Channel bytes as floats, 0.0..=255.0.
    #[default]
    Raw,
    /// Channel bytes divided by 255, 0.0..=1.0.
    UnitRange,
}

impl ChannelScale {
    #[inline]
    pub fn apply(&self, value: f32) -> f32 {
        match self {
            ChannelScale::Raw => value,
            ChannelScale::UnitRange => value / 255.0,
        }
    }
}

impl FromStr for ChannelScale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(ChannelScale::Raw),
            "unit" | "unit_range" => Ok(ChannelScale::UnitRange),
            other => Err(format!("unknown channel scale '{other}' (expected raw or unit)")),
        }
    }
}

/// Pack an RGB triple into `0x00RRGGBB`.
#[inline]
pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Extract `[r, g, b]` from a packed `0x??RRGGBB` pixel.
///
/// Red is bits 16-23, green bits 8-15, blue bits 0-7. Anything above bit 23
/// (an alpha byte, for instance) is ignored.
#[inline]
pub fn unpack_rgb(packed: u32) -> [f32; CHANNELS] {
    [
        ((packed >> 16) & 0xFF) as f32,
        ((packed >> 8) & 0xFF) as f32,
        (packed & 0xFF) as f32,
    ]
}

/// Encoded model input for one frame.
#[derive(Debug, Clone)]
pub struct InputTensor {
    data: Array<f32, IxDyn>,
    layout: TensorLayout,
}

impl InputTensor {
    pub fn new(data: Array<f32, IxDyn>, layout: TensorLayout) -> Self {
        Self { data, layout }
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn view(&self) -> ArrayViewD<'_, f32> {
        self.data.view()
    }

    /// Contiguous row-major values, if the tensor is in standard layout.
    pub fn as_slice(&self) -> Option<&[f32]> {
        self.data.as_slice()
    }

    pub fn into_array(self) -> Array<f32, IxDyn> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_rgb_bit_layout() {
        assert_eq!(unpack_rgb(0x00FF0000), [255.0, 0.0, 0.0]);
        assert_eq!(unpack_rgb(0x0000FF00), [0.0, 255.0, 0.0]);
        assert_eq!(unpack_rgb(0x000000FF), [0.0, 0.0, 255.0]);
        assert_eq!(unpack_rgb(0x00123456), [18.0, 52.0, 86.0]);
    }

    #[test]
    fn test_unpack_ignores_alpha_byte() {
        assert_eq!(unpack_rgb(0xFF102030), [16.0, 32.0, 48.0]);
    }

    #[test]
    fn test_pack_matches_unpack() {
        let packed = pack_rgb(1, 2, 3);
        assert_eq!(packed, 0x00010203);
        assert_eq!(unpack_rgb(packed), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_layout_shapes() {
        assert_eq!(TensorLayout::Nhwc.shape(300), [1, 300, 300, 3]);
        assert_eq!(TensorLayout::Nchw.shape(640), [1, 3, 640, 640]);
    }

    #[test]
    fn test_layout_and_scale_parsing() {
        assert_eq!("NCHW".parse::<TensorLayout>().unwrap(), TensorLayout::Nchw);
        assert_eq!("nhwc".parse::<TensorLayout>().unwrap(), TensorLayout::Nhwc);
        assert!("hwc".parse::<TensorLayout>().is_err());

        assert_eq!("raw".parse::<ChannelScale>().unwrap(), ChannelScale::Raw);
        assert_eq!(
            "unit".parse::<ChannelScale>().unwrap(),
            ChannelScale::UnitRange
        );
        assert!("imagenet".parse::<ChannelScale>().is_err());
    }

    #[test]
    fn test_channel_scale_apply() {
        assert_eq!(ChannelScale::Raw.apply(128.0), 128.0);
        assert!((ChannelScale::UnitRange.apply(255.0) - 1.0).abs() < 1e-6);
    }
}
