//! Frame preprocessing: compressed camera frame to model input tensor.

pub mod codec;
pub mod error;
pub mod tensor;

pub use codec::{CodecConfig, TensorCodec};
pub use error::CodecError;
pub use tensor::{ChannelScale, InputTensor, TensorLayout, pack_rgb, unpack_rgb};
