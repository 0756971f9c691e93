use crate::error::CodecError;
use crate::tensor::{CHANNELS, ChannelScale, InputTensor, TensorLayout, pack_rgb, unpack_rgb};
use common::span;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use image::RgbImage;
use ndarray::{Array, IxDyn};
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecConfig {
    pub layout: TensorLayout,
    pub scale: ChannelScale,
}

/// Turns compressed frame bytes into the model's input tensor.
///
/// Frames are expected to be JPEG (PNG is accepted as well). Resampling is
/// bilinear and stretches to a `side x side` square without letterboxing, so
/// box coordinates normalized against the model input map directly back onto
/// the original frame.
///
/// The codec holds no per-frame state; one instance can encode frames from
/// several threads at once.
#[derive(Debug, Clone, Default)]
pub struct TensorCodec {
    config: CodecConfig,
}

impl TensorCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> CodecConfig {
        self.config
    }

    /// Decode `raw` and encode it as a `target_side x target_side` tensor.
    pub fn encode(&self, raw: &[u8], target_side: u32) -> Result<InputTensor, CodecError> {
        let _s = span!("encode_frame");

        check_side(target_side)?;

        let decoded = image::load_from_memory(raw)?.into_rgb8();

        tracing::trace!(
            compressed_bytes = raw.len(),
            width = decoded.width(),
            height = decoded.height(),
            target_side,
            "Decoded frame"
        );

        self.encode_pixels(&decoded, target_side)
    }

    /// Encode an already decoded pixel grid.
    pub fn encode_pixels(
        &self,
        image: &RgbImage,
        target_side: u32,
    ) -> Result<InputTensor, CodecError> {
        check_side(target_side)?;

        if image.width() == 0 || image.height() == 0 {
            return Err(CodecError::resize(target_side, "source frame has no pixels"));
        }

        let pixels = resize_square(image, target_side)?;
        let input = self.pack(&pixels, target_side)?;

        Ok(input)
    }

    fn pack(&self, pixels: &[u8], side: u32) -> Result<InputTensor, CodecError> {
        let _s = common::span_debug!("pack_tensor");

        let side_len = side as usize;
        let spatial = side_len * side_len;
        let layout = self.config.layout;
        let scale = self.config.scale;

        let mut output = vec![0.0f32; CHANNELS * spatial];

        for (i, px) in pixels.chunks_exact(CHANNELS).enumerate() {
            let channels = unpack_rgb(pack_rgb(px[0], px[1], px[2]));
            for (c, value) in channels.into_iter().enumerate() {
                let idx = match layout {
                    TensorLayout::Nhwc => i * CHANNELS + c,
                    TensorLayout::Nchw => c * spatial + i,
                };
                output[idx] = scale.apply(value);
            }
        }

        let data = Array::from_shape_vec(IxDyn(&layout.shape(side_len)), output)
            .map_err(|e| CodecError::resize(side, e.to_string()))?;

        Ok(InputTensor::new(data, layout))
    }
}

fn check_side(target_side: u32) -> Result<(), CodecError> {
    if target_side == 0 {
        return Err(CodecError::resize(target_side, "target side must be positive"));
    }
    Ok(())
}

/// Bilinear resample to `side x side`. Frames already at the target size are
/// passed through untouched.
fn resize_square(image: &RgbImage, side: u32) -> Result<Cow<'_, [u8]>, CodecError> {
    if image.width() == side && image.height() == side {
        return Ok(Cow::Borrowed(image.as_raw().as_slice()));
    }

    let _s = common::span_debug!("resize_frame");

    let src = ImageRef::new(image.width(), image.height(), image.as_raw(), PixelType::U8x3)
        .map_err(|e| CodecError::resize(side, e.to_string()))?;

    let mut resized = Image::new(side, side, PixelType::U8x3);

    Resizer::new()
        .resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )
        .map_err(|e| CodecError::resize(side, e.to_string()))?;

    Ok(Cow::Owned(resized.buffer().to_vec()))
}
