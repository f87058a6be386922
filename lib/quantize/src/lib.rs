mod dtype;
pub mod npy;
mod tensor;

pub use dtype::{DataType, FpType, IntType, bf16_to_f32};
pub use tensor::{Matrix, ShapeError};
