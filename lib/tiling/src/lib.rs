//! Conversion between dense matrices and accelerator memory images.
//!
//! Inputs are written tile by tile as packed 8-bit integers. Results are read back row-major as packed floats.

mod decoder;
mod encoder;
mod image;

pub use decoder::{DecodeError, DecodedMatrix, ResultDecoder, decode, encode_result};
pub use encoder::{LayoutError, TileDecoder, TileEncoder, TileLayout, encode};
pub use image::{DecodedInput, InputImage};
