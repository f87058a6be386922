use memory::{MalformedLine, MemoryWord, WORD_BITS, non_blank, parse_lines};
use quantize::{FpType, Matrix};
use thiserror::Error;

use crate::LayoutError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("no memory lines to decode")]
    SourceUnavailable,
    #[error("decoded {actual} elements, expected {expected}")]
    ElementCountMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// A decoded result matrix, with the lines that had to be skipped to produce it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMatrix {
    pub matrix: Matrix<f32>,
    pub skipped: Vec<MalformedLine>,
}

/// Reads a row-major result image of floating-point elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultDecoder {
    elem: FpType,
}

impl Default for ResultDecoder {
    fn default() -> Self {
        Self { elem: FpType::BF16 }
    }
}

impl ResultDecoder {
    pub fn new(elem: FpType) -> Result<Self, LayoutError> {
        let width = elem.size_in_bits();
        if elem.exponent > 8 || elem.mantissa > 23 || width == 0 || WORD_BITS % width != 0 {
            return Err(LayoutError::UnsupportedElement(elem.into()));
        }
        Ok(Self { elem })
    }

    pub fn elements_per_word(&self) -> usize {
        MemoryWord::fields_per_word(self.elem.size_in_bits())
    }

    /// Widen every field of every word, lowest field first.
    pub fn decode_words(&self, words: &[MemoryWord]) -> Vec<f32> {
        let width = self.elem.size_in_bits();
        words
            .iter()
            .flat_map(|word| word.unpack(width))
            .map(|bits| self.elem.convert_bits_to_f32(bits))
            .collect()
    }

    /// Decode `lines` into a `matrix_dim x matrix_dim` matrix.
    ///
    /// Blank lines are ignored and malformed ones skipped. A line count that disagrees with `matrix_dim` only
    /// warns; the element count left after skipping must still come out exact.
    pub fn decode<S: AsRef<str>>(
        &self,
        lines: &[S],
        matrix_dim: usize,
    ) -> Result<DecodedMatrix, DecodeError> {
        let lines = non_blank(lines);
        if lines.is_empty() {
            return Err(DecodeError::SourceUnavailable);
        }

        let expected = matrix_dim * matrix_dim;
        let expected_lines = expected.div_ceil(self.elements_per_word());
        if lines.len() != expected_lines {
            tracing::warn!(
                "expected {expected_lines} lines for a {matrix_dim}x{matrix_dim} result, found {}",
                lines.len()
            );
        }

        let image = parse_lines(&lines);
        let values = self.decode_words(&image.words);
        let actual = values.len();
        let matrix = Matrix::new(matrix_dim, matrix_dim, values)
            .map_err(|_| DecodeError::ElementCountMismatch { expected, actual })?;
        tracing::debug!(
            matrix_dim,
            skipped = image.skipped.len(),
            "decoded result image"
        );

        Ok(DecodedMatrix {
            matrix,
            skipped: image.skipped,
        })
    }
}

/// Decode a BF16 result image into a `matrix_dim x matrix_dim` matrix.
pub fn decode<S: AsRef<str>>(lines: &[S], matrix_dim: usize) -> Result<DecodedMatrix, DecodeError> {
    ResultDecoder::default().decode(lines, matrix_dim)
}

/// Write `matrix` row-major as a result image, narrowing each element to `elem` with round-to-nearest-even.
///
/// A trailing partial word is padded with zero fields.
pub fn encode_result(matrix: &Matrix<f32>, elem: FpType) -> Result<Vec<String>, LayoutError> {
    let decoder = ResultDecoder::new(elem)?;
    let width = elem.size_in_bits();

    let fields = matrix
        .as_slice()
        .iter()
        .map(|&v| elem.bits_from_f32(v))
        .collect::<Option<Vec<u32>>>()
        .ok_or(LayoutError::UnsupportedElement(elem.into()))?;

    Ok(fields
        .chunks(decoder.elements_per_word())
        .map(|chunk| MemoryWord::pack(chunk, width).to_hex_line())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_lines(dim: usize) -> Vec<String> {
        let m = Matrix::from_fn(dim, dim, |r, c| (r * dim + c) as f32);
        encode_result(&m, FpType::BF16).unwrap()
    }

    #[test]
    fn fields_fill_columns_lowest_first() {
        let lines = ["41f0418041003f80"];
        let decoded = ResultDecoder::default().decode_words(&[lines[0].parse().unwrap()]);
        assert_eq!(decoded, vec![1.0, 8.0, 16.0, 30.0]);
    }

    #[test]
    fn result_image_round_trips_small_integers() {
        let dim = 8;
        let lines = ramp_lines(dim);
        assert_eq!(lines.len(), 16);
        assert_eq!(lines[0], "404040003f800000");

        let decoded = decode(&lines, dim).unwrap();
        assert!(decoded.skipped.is_empty());
        assert_eq!(decoded.matrix.get(0, 3), Some(&3.0));
        assert_eq!(decoded.matrix.get(7, 7), Some(&63.0));
    }

    #[test]
    fn narrowing_rounds_to_nearest_even() {
        let m = Matrix::new(1, 4, vec![1.00390625, 1.01171875, -2.0, 0.0]).unwrap();
        let lines = encode_result(&m, FpType::BF16).unwrap();
        // 1 + 2^-8 ties down to 1.0, 1 + 3*2^-8 ties up to 1 + 2^-6.
        assert_eq!(lines, vec!["0000c0003f823f80"]);
    }

    #[test]
    fn empty_input_is_source_unavailable() {
        let lines: [&str; 0] = [];
        assert_eq!(decode(&lines, 16), Err(DecodeError::SourceUnavailable));
        assert_eq!(decode(&["", "   "], 16), Err(DecodeError::SourceUnavailable));
    }

    #[test]
    fn blank_lines_between_words_are_ignored() {
        let mut lines = ramp_lines(4);
        lines.insert(2, String::new());
        lines.push("  ".to_string());

        let decoded = decode(&lines, 4).unwrap();
        assert!(decoded.skipped.is_empty());
        assert_eq!(decoded.matrix.get(3, 3), Some(&15.0));
    }

    #[test]
    fn corrupted_line_fails_the_element_count() {
        let mut lines = ramp_lines(16);
        assert_eq!(lines.len(), 64);
        lines[10] = "zz00000000000000".to_string();

        let err = decode(&lines, 16).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ElementCountMismatch {
                expected: 256,
                actual: 252
            }
        );
    }

    #[test]
    fn extra_lines_warn_then_fail_the_count() {
        let mut lines = ramp_lines(4);
        lines.push("0000000000000000".to_string());
        assert!(matches!(
            decode(&lines, 4),
            Err(DecodeError::ElementCountMismatch {
                expected: 16,
                actual: 20
            })
        ));
    }

    #[test]
    fn wider_output_types_are_rejected_or_supported() {
        assert!(ResultDecoder::new(FpType::F16).is_ok());
        assert_eq!(ResultDecoder::new(FpType::F32).unwrap().elements_per_word(), 2);
        assert!(matches!(
            ResultDecoder::new(FpType {
                sign: true,
                exponent: 11,
                mantissa: 52
            }),
            Err(LayoutError::UnsupportedElement(_))
        ));
    }
}
