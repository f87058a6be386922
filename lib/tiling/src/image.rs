use memory::MalformedLine;
use quantize::Matrix;

use crate::{DecodeError, LayoutError, TileDecoder, TileEncoder, TileLayout};

/// The two operands as the accelerator loads them: A transposed, then B as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputImage {
    layout: TileLayout,
}

/// Operands recovered from an input image.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedInput {
    pub a: Matrix<i8>,
    pub b: Matrix<i8>,
    pub skipped: Vec<MalformedLine>,
}

impl InputImage {
    pub fn new(layout: TileLayout) -> Self {
        Self { layout }
    }

    pub fn encode(&self, a: &Matrix<i8>, b: &Matrix<i8>) -> Result<Vec<String>, LayoutError> {
        let mut lines = TileEncoder::new(a, self.layout, true)?.encode();
        lines.extend(TileEncoder::new(b, self.layout, false)?.encode());
        Ok(lines)
    }

    /// Split `lines` back into A (`a_shape`) and B (`b_shape`).
    ///
    /// Blank lines are dropped first. The split then happens on line boundaries, so a malformed line in one operand
    /// never shifts the other.
    pub fn decode<S: AsRef<str>>(
        &self,
        lines: &[S],
        a_shape: (usize, usize),
        b_shape: (usize, usize),
    ) -> Result<DecodedInput, DecodeError> {
        let lines = memory::non_blank(lines);
        if lines.is_empty() {
            return Err(DecodeError::SourceUnavailable);
        }

        let a_decoder = TileDecoder::new(self.layout, a_shape.0, a_shape.1, true)?;
        let b_decoder = TileDecoder::new(self.layout, b_shape.0, b_shape.1, false)?;
        let a_lines = a_decoder.word_count();
        let expected_lines = a_lines + b_decoder.word_count();
        if lines.len() != expected_lines {
            tracing::warn!(
                "expected {expected_lines} lines in the input image, found {}",
                lines.len()
            );
        }

        let (a_part, b_part) = lines.split_at(a_lines.min(lines.len()));
        let a_image = memory::parse_lines(a_part);
        let b_image = memory::parse_lines(b_part);

        let a = a_decoder.decode_words(&a_image.words)?;
        let b = b_decoder.decode_words(&b_image.words)?;

        let skipped = a_image
            .skipped
            .into_iter()
            .chain(b_image.skipped.into_iter().map(|mut m| {
                m.line += a_lines;
                m
            }))
            .collect();

        Ok(DecodedInput { a, b, skipped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operands() -> (Matrix<i8>, Matrix<i8>) {
        let a = Matrix::from_fn(16, 8, |r, c| (r as i8) - (c as i8));
        let b = Matrix::from_fn(8, 16, |r, c| ((r * 16 + c) % 251) as i8);
        (a, b)
    }

    #[test]
    fn a_is_stored_transposed_ahead_of_b() {
        let (a, b) = operands();
        let image = InputImage::new(TileLayout::int8(8).unwrap());
        let lines = image.encode(&a, &b).unwrap();

        assert_eq!(lines.len(), 32);
        let a_lines = crate::encode(&a, 8, true).unwrap();
        let b_lines = crate::encode(&b, 8, false).unwrap();
        assert_eq!(lines[..16], a_lines[..]);
        assert_eq!(lines[16..], b_lines[..]);
    }

    #[test]
    fn decode_splits_the_operands() {
        let (a, b) = operands();
        let image = InputImage::new(TileLayout::int8(8).unwrap());
        let lines = image.encode(&a, &b).unwrap();

        let decoded = image.decode(&lines, a.shape(), b.shape()).unwrap();
        assert_eq!(decoded.a, a);
        assert_eq!(decoded.b, b);
        assert!(decoded.skipped.is_empty());
    }

    #[test]
    fn corrupted_line_is_reported_against_its_operand() {
        let (a, b) = operands();
        let image = InputImage::new(TileLayout::int8(8).unwrap());
        let mut lines = image.encode(&a, &b).unwrap();
        lines[20] = "garbage".to_string();

        let err = image.decode(&lines, a.shape(), b.shape()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ElementCountMismatch {
                expected: 128,
                actual: 120
            }
        );
    }

    #[test]
    fn blank_lines_do_not_shift_the_split() {
        let (a, b) = operands();
        let image = InputImage::new(TileLayout::int8(8).unwrap());
        let mut lines = image.encode(&a, &b).unwrap();
        lines.insert(16, "   ".to_string());
        lines.insert(0, String::new());

        let decoded = image.decode(&lines, a.shape(), b.shape()).unwrap();
        assert_eq!((decoded.a, decoded.b), (a, b));
        assert_eq!(
            image.decode(&["", ""], (8, 8), (8, 8)),
            Err(DecodeError::SourceUnavailable)
        );
    }

    #[test]
    fn operand_shapes_are_checked_against_the_layout() {
        let image = InputImage::new(TileLayout::int8(8).unwrap());
        let lines = vec!["0000000000000000"; 4];
        assert!(matches!(
            image.decode(&lines, (12, 8), (8, 8)),
            Err(DecodeError::Layout(LayoutError::DimensionMismatch { .. }))
        ));
    }
}
