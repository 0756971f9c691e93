use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Frame decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Invalid resize to {width}x{height}: {reason}")]
    Resize {
        width: u32,
        height: u32,
        reason: String,
    },
}

impl CodecError {
    pub(crate) fn resize(side: u32, reason: impl Into<String>) -> Self {
        CodecError::Resize {
            width: side,
            height: side,
            reason: reason.into(),
        }
    }
}
