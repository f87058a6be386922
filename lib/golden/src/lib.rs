//! Reference product and elementwise comparison against hardware results.

mod compare;
mod reference;

pub use compare::{
    ComparisonReport, DEFAULT_MAX_REPORTED, Mismatch, Tolerance, Verdict, compare,
};
pub use reference::{GoldenError, matmul};
