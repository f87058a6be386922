use core::fmt;

use thiserror::Error;


#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("{rows}x{cols} matrix cannot hold {len} elements")]
    Length { rows: usize, cols: usize, len: usize },
    #[error("cannot reshape {from:?} into {to:?}")]
    Reshape {
        from: (usize, usize),
        to: (usize, usize),
    },
}

/// Dense row-major matrix.
///
/// Every stage of the pipeline builds one of these and hands it to the next one, so it is a plain value with
/// no interior sharing.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T> Matrix<T> {
    /// Create a matrix from row-major data.
    pub fn new(rows: usize, cols: usize, data: Vec<T>) -> Result<Self, ShapeError> {
        if data.len() != rows * cols {
            return Err(ShapeError::Length {
                rows,
                cols,
                len: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let data = (0..rows * cols).map(|i| f(i / cols, i % cols)).collect();
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col)
        } else {
            None
        }
    }

    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Reinterpret the same row-major data with a different shape.
    pub fn reshape(self, rows: usize, cols: usize) -> Result<Self, ShapeError> {
        if rows * cols != self.data.len() {
            return Err(ShapeError::Reshape {
                from: self.shape(),
                to: (rows, cols),
            });
        }
        Ok(Self {
            rows,
            cols,
            data: self.data,
        })
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Matrix<U> {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Iterate the `tile_dim x tile_dim` block at tile-grid position `(tile_row, tile_col)` in row-major order.
    ///
    /// Panics if the tile reaches past the matrix edge.
    pub fn tile(
        &self,
        tile_row: usize,
        tile_col: usize,
        tile_dim: usize,
    ) -> impl Iterator<Item = &T> + '_ {
        let start_row = tile_row * tile_dim;
        let start_col = tile_col * tile_dim;
        assert!(start_row + tile_dim <= self.rows && start_col + tile_dim <= self.cols);

        (start_row..start_row + tile_dim)
            .flat_map(move |r| &self.data[r * self.cols + start_col..r * self.cols + start_col + tile_dim])
    }
}

impl<T: Clone> Matrix<T> {
    pub fn transpose(&self) -> Self {
        Self::from_fn(self.cols, self.rows, |r, c| self.data[c * self.cols + r].clone())
    }
}

impl<T: Clone + Default> Matrix<T> {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::default(); rows * cols],
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) {
        assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col] = value;
    }
}

impl Matrix<i8> {
    pub fn identity(dim: usize) -> Self {
        Self::from_fn(dim, dim, |r, c| (r == c) as i8)
    }

    pub fn to_f32(&self) -> Matrix<f32> {
        self.map(|&v| v as f32)
    }
}

impl fmt::Display for Matrix<i8> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.rows {
            for v in self.row(r) {
                write!(f, "{v:4}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Display for Matrix<f32> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.rows {
            for v in self.row(r) {
                write!(f, "{v:8.2}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
