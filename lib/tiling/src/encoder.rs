use std::borrow::Cow;

use memory::{MemoryWord, WORD_BITS, non_blank, parse_lines};
use quantize::{DataType, IntType, Matrix};
use thiserror::Error;

use crate::DecodeError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("tile dimension must be non-zero")]
    ZeroTile,
    #[error("{rows}x{cols} matrix is not a whole number of {tile_dim}x{tile_dim} tiles")]
    DimensionMismatch {
        rows: usize,
        cols: usize,
        tile_dim: usize,
    },
    #[error("a {tile_dim}x{tile_dim} tile does not fill whole words of {per_word} elements")]
    PartialWord { tile_dim: usize, per_word: usize },
    #[error("{0} elements cannot be packed into 64-bit memory words")]
    UnsupportedElement(DataType),
}

/// Tile-major layout of an integer matrix in accelerator memory.
///
/// The matrix is cut into `tile_dim x tile_dim` tiles visited row-major over the tile grid. Each tile is
/// flattened row-major and packed into consecutive words, `64 / width` elements per word with the first element
/// in the least significant field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    tile_dim: usize,
    elem: IntType,
}

impl TileLayout {
    pub fn new(tile_dim: usize, elem: IntType) -> Result<Self, LayoutError> {
        if tile_dim == 0 {
            return Err(LayoutError::ZeroTile);
        }
        // The field has to hold every i8 and divide a word evenly.
        if !elem.signed || !(8..=32).contains(&elem.width) || WORD_BITS % elem.size_in_bits() != 0 {
            return Err(LayoutError::UnsupportedElement(elem.into()));
        }

        let layout = Self { tile_dim, elem };
        let per_word = layout.elements_per_word();
        if (tile_dim * tile_dim) % per_word != 0 {
            return Err(LayoutError::PartialWord { tile_dim, per_word });
        }
        Ok(layout)
    }

    /// Signed 8-bit elements, eight per word.
    pub fn int8(tile_dim: usize) -> Result<Self, LayoutError> {
        Self::new(tile_dim, IntType::I8)
    }

    pub fn tile_dim(&self) -> usize {
        self.tile_dim
    }

    pub fn elements_per_word(&self) -> usize {
        MemoryWord::fields_per_word(self.elem.size_in_bits())
    }

    pub fn check(&self, rows: usize, cols: usize) -> Result<(), LayoutError> {
        if rows % self.tile_dim != 0 || cols % self.tile_dim != 0 {
            return Err(LayoutError::DimensionMismatch {
                rows,
                cols,
                tile_dim: self.tile_dim,
            });
        }
        Ok(())
    }

    /// Number of words a `rows x cols` matrix occupies.
    pub fn words_for(&self, rows: usize, cols: usize) -> usize {
        rows * cols / self.elements_per_word()
    }

    /// Visit `(row, col)` of a `rows x cols` matrix in storage order.
    fn storage_order(&self, rows: usize, cols: usize) -> impl Iterator<Item = (usize, usize)> + use<> {
        let t = self.tile_dim;
        (0..rows / t)
            .flat_map(move |tr| (0..cols / t).map(move |tc| (tr, tc)))
            .flat_map(move |(tr, tc)| (0..t * t).map(move |i| (tr * t + i / t, tc * t + i % t)))
    }
}

/// Serializes one matrix into memory words.
///
/// Construction validates the matrix against the layout, so encoding itself cannot fail.
pub struct TileEncoder<'a> {
    layout: TileLayout,
    matrix: Cow<'a, Matrix<i8>>,
}

impl<'a> TileEncoder<'a> {
    /// Prepare `matrix` (or its transpose) for encoding.
    pub fn new(
        matrix: &'a Matrix<i8>,
        layout: TileLayout,
        transpose: bool,
    ) -> Result<Self, LayoutError> {
        let matrix = if transpose {
            Cow::Owned(matrix.transpose())
        } else {
            Cow::Borrowed(matrix)
        };
        layout.check(matrix.rows(), matrix.cols())?;
        Ok(Self { layout, matrix })
    }

    pub fn word_count(&self) -> usize {
        self.layout.words_for(self.matrix.rows(), self.matrix.cols())
    }

    pub fn words(&self) -> Vec<MemoryWord> {
        let t = self.layout.tile_dim;
        let per_word = self.layout.elements_per_word();
        let width = self.layout.elem.size_in_bits();
        let mut words = Vec::with_capacity(self.word_count());

        for tile_row in 0..self.matrix.rows() / t {
            for tile_col in 0..self.matrix.cols() / t {
                let fields: Vec<u32> = self
                    .matrix
                    .tile(tile_row, tile_col, t)
                    .map(|&v| self.layout.elem.bits_from_i64(v as i64))
                    .collect();
                words.extend(
                    fields
                        .chunks(per_word)
                        .map(|chunk| MemoryWord::pack(chunk, width)),
                );
            }
        }

        words
    }

    pub fn encode(&self) -> Vec<String> {
        self.words().into_iter().map(MemoryWord::to_hex_line).collect()
    }
}

/// Encode `matrix` as signed 8-bit words with square tiles of `tile_dim`.
pub fn encode(
    matrix: &Matrix<i8>,
    tile_dim: usize,
    transpose: bool,
) -> Result<Vec<String>, LayoutError> {
    Ok(TileEncoder::new(matrix, TileLayout::int8(tile_dim)?, transpose)?.encode())
}

/// Inverse of [`TileEncoder`]: rebuilds a matrix from its memory words.
pub struct TileDecoder {
    layout: TileLayout,
    rows: usize,
    cols: usize,
    transpose: bool,
}

impl TileDecoder {
    /// `rows x cols` is the shape of the matrix handed to the encoder. With `transpose`, the words are taken to
    /// hold its transpose and the result is transposed back.
    pub fn new(
        layout: TileLayout,
        rows: usize,
        cols: usize,
        transpose: bool,
    ) -> Result<Self, LayoutError> {
        let (stored_rows, stored_cols) = if transpose { (cols, rows) } else { (rows, cols) };
        layout.check(stored_rows, stored_cols)?;
        Ok(Self {
            layout,
            rows,
            cols,
            transpose,
        })
    }

    pub fn word_count(&self) -> usize {
        self.layout.words_for(self.rows, self.cols)
    }

    /// Parse and decode memory lines. Blank lines are ignored; malformed ones are skipped, which then shows up as
    /// a count mismatch.
    pub fn decode<S: AsRef<str>>(&self, lines: &[S]) -> Result<Matrix<i8>, DecodeError> {
        let lines = non_blank(lines);
        if lines.is_empty() {
            return Err(DecodeError::SourceUnavailable);
        }
        self.decode_words(&parse_lines(&lines).words)
    }

    pub fn decode_words(&self, words: &[MemoryWord]) -> Result<Matrix<i8>, DecodeError> {
        let width = self.layout.elem.size_in_bits();
        let per_word = self.layout.elements_per_word();
        let expected = self.rows * self.cols;
        let actual = words.len() * per_word;
        if actual != expected {
            return Err(DecodeError::ElementCountMismatch { expected, actual });
        }

        let (stored_rows, stored_cols) = if self.transpose {
            (self.cols, self.rows)
        } else {
            (self.rows, self.cols)
        };
        let mut stored = Matrix::zeros(stored_rows, stored_cols);
        let fields = words.iter().flat_map(|word| word.unpack(width));
        for ((r, c), bits) in self.layout.storage_order(stored_rows, stored_cols).zip(fields) {
            let value = self.layout.elem.convert_bits_to_i64(bits);
            stored.set(r, c, value.clamp(i8::MIN as i64, i8::MAX as i64) as i8);
        }

        Ok(if self.transpose {
            stored.transpose()
        } else {
            stored
        })
    }
}
