use quantize::Matrix;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GoldenError {
    #[error("cannot multiply {lhs:?} by {rhs:?}: inner dimensions differ")]
    InnerDimMismatch {
        lhs: (usize, usize),
        rhs: (usize, usize),
    },
}

/// Reference product `a @ b`.
///
/// Operands are widened to f32 first and products are accumulated in f32, in ascending `k`.
pub fn matmul(a: &Matrix<i8>, b: &Matrix<i8>) -> Result<Matrix<f32>, GoldenError> {
    if a.cols() != b.rows() {
        return Err(GoldenError::InnerDimMismatch {
            lhs: a.shape(),
            rhs: b.shape(),
        });
    }

    let a = a.to_f32();
    let b = b.to_f32();
    let inner = a.cols();
    let product = Matrix::from_fn(a.rows(), b.cols(), |r, c| {
        let row = a.row(r);
        (0..inner).fold(0.0f32, |acc, k| acc + row[k] * b.as_slice()[k * b.cols() + c])
    });

    tracing::debug!(shape = ?product.shape(), "computed golden product");
    Ok(product)
}
