//! Accelerator memory words and the text images they are exchanged in.
//!
//! An image is a text file with one 64-bit word per line, written as 16 lowercase hex digits.

mod image;
mod word;

pub use image::{
    ImageError, MalformedLine, ParsedImage, non_blank, parse_lines, read_lines, write_lines,
};
pub use word::{HEX_DIGITS, MemoryWord, ParseWordError, WORD_BITS};
