use core::fmt;
use core::str::FromStr;

use thiserror::Error;

/// Width of one accelerator memory word.
pub const WORD_BITS: u8 = 64;

/// Hex digits in one text line of a memory image.
pub const HEX_DIGITS: usize = WORD_BITS as usize / 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseWordError {
    #[error("empty line")]
    Empty,
    #[error("{0} hex digits do not fit in a 64-bit word")]
    TooLong(usize),
    #[error("invalid hex digit {0:?}")]
    InvalidDigit(char),
}

/// One 64-bit word of accelerator memory.
///
/// A word holds `64 / width` fields of `width` bits each. Field `i` occupies bits `[width * i, width * (i + 1))`,
/// so field 0 is the least significant one and is written rightmost in the hex line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MemoryWord(pub u64);

impl MemoryWord {
    /// Number of `width`-bit fields per word.
    pub const fn fields_per_word(width: u8) -> usize {
        assert!(width > 0 && WORD_BITS % width == 0);
        (WORD_BITS / width) as usize
    }

    const fn field_mask(width: u8) -> u64 {
        if width >= 64 {
            u64::MAX
        } else {
            (1u64 << width) - 1
        }
    }

    /// Pack fields, first field into the least significant bits.
    ///
    /// Bits above `width` in each field are dropped. Missing trailing fields are zero.
    pub fn pack(fields: &[u32], width: u8) -> Self {
        let per_word = Self::fields_per_word(width);
        assert!(fields.len() <= per_word, "{} fields do not fit in one word", fields.len());

        let word = fields
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, &field)| {
                acc | (field as u64 & Self::field_mask(width)) << (width as usize * i)
            });
        Self(word)
    }

    pub fn field(self, index: usize, width: u8) -> u32 {
        assert!(index < Self::fields_per_word(width));
        ((self.0 >> (width as usize * index)) & Self::field_mask(width)) as u32
    }

    /// Iterate fields from the least significant one.
    pub fn unpack(self, width: u8) -> impl Iterator<Item = u32> {
        (0..Self::fields_per_word(width)).map(move |i| self.field(i, width))
    }

    /// Format as one memory image line.
    pub fn to_hex_line(self) -> String {
        self.to_string()
    }

    /// Parse one memory image line.
    ///
    /// Surrounding whitespace is ignored. The remainder must be 1 to 16 hex digits; signs and `0x` prefixes are
    /// rejected.
    pub fn parse_hex_line(line: &str) -> Result<Self, ParseWordError> {
        let digits = line.trim();
        if digits.is_empty() {
            return Err(ParseWordError::Empty);
        }
        if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(ParseWordError::InvalidDigit(bad));
        }
        if digits.len() > HEX_DIGITS {
            return Err(ParseWordError::TooLong(digits.len()));
        }
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| ParseWordError::TooLong(digits.len()))
    }
}

impl fmt::Display for MemoryWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for MemoryWord {
    type Err = ParseWordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex_line(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_fields_fill_from_the_right() {
        // c0 = 1 ... c7 = 8, with c0 ending up as the rightmost byte.
        let word = MemoryWord::pack(&[1, 2, 3, 4, 5, 6, 7, 8], 8);
        assert_eq!(word.to_hex_line(), "0807060504030201");
    }

    #[test]
    fn negative_bytes_are_twos_complement() {
        let word = MemoryWord::pack(&[0xFF, 0xF6, 0, 0, 0, 0, 0, 0x80], 8);
        assert_eq!(word.to_hex_line(), "800000000000f6ff");
        assert_eq!(word.field(1, 8), 0xF6);
    }

    #[test]
    fn half_word_fields_unpack_lowest_first() {
        let word = MemoryWord::parse_hex_line("41f0418041003f80").unwrap();
        let fields: Vec<u32> = word.unpack(16).collect();
        assert_eq!(fields, vec![0x3F80, 0x4100, 0x4180, 0x41F0]);
        assert_eq!(MemoryWord::pack(&fields, 16), word);
    }

    #[test]
    fn hex_lines_are_zero_padded_lowercase() {
        assert_eq!(MemoryWord(0xAB).to_hex_line(), "00000000000000ab");
        assert_eq!(MemoryWord(u64::MAX).to_hex_line(), "ffffffffffffffff");
        assert_eq!(MemoryWord::default().to_hex_line().len(), HEX_DIGITS);
    }

    #[test]
    fn partial_pack_leaves_upper_fields_zero() {
        let word = MemoryWord::pack(&[0x1_FFFF], 16);
        assert_eq!(word, MemoryWord(0xFFFF));
    }

    #[test]
    fn parse_accepts_short_and_padded_lines() {
        assert_eq!(MemoryWord::parse_hex_line("  3f80\r"), Ok(MemoryWord(0x3F80)));
        assert_eq!("ABCDEF".parse::<MemoryWord>(), Ok(MemoryWord(0xABCDEF)));
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert_eq!(MemoryWord::parse_hex_line(""), Err(ParseWordError::Empty));
        assert_eq!(
            MemoryWord::parse_hex_line("0x3f80"),
            Err(ParseWordError::InvalidDigit('x'))
        );
        assert_eq!(
            MemoryWord::parse_hex_line("+3f80"),
            Err(ParseWordError::InvalidDigit('+'))
        );
        assert_eq!(
            MemoryWord::parse_hex_line("zz00000000000000"),
            Err(ParseWordError::InvalidDigit('z'))
        );
        assert_eq!(
            MemoryWord::parse_hex_line("00000000000000000"),
            Err(ParseWordError::TooLong(17))
        );
    }

    #[test]
    #[should_panic]
    fn width_must_divide_the_word() {
        MemoryWord::fields_per_word(12);
    }
}
