use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::word::{MemoryWord, ParseWordError};

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("memory image {} not found", .path.display())]
    SourceUnavailable { path: PathBuf },
    #[error("I/O error on memory image {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ImageError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            ImageError::SourceUnavailable {
                path: path.to_path_buf(),
            }
        } else {
            ImageError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// A line that could not be parsed as a memory word. `line` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {reason} in {text:?}")]
pub struct MalformedLine {
    pub line: usize,
    pub text: String,
    pub reason: ParseWordError,
}

/// Words parsed out of a memory image, plus the lines that were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedImage {
    pub words: Vec<MemoryWord>,
    pub skipped: Vec<MalformedLine>,
}

/// Trim every line and drop the blank ones.
pub fn non_blank<S: AsRef<str>>(lines: &[S]) -> Vec<&str> {
    lines
        .iter()
        .map(|line| line.as_ref().trim())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Read the non-blank lines of a memory image, trimmed.
pub fn read_lines(path: &Path) -> Result<Vec<String>, ImageError> {
    let file = File::open(path).map_err(|e| ImageError::from_io(path, e))?;
    let raw = BufReader::new(file)
        .lines()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ImageError::from_io(path, e))?;
    let lines: Vec<String> = non_blank(&raw).into_iter().map(str::to_string).collect();
    tracing::debug!(path = %path.display(), lines = lines.len(), "read memory image");
    Ok(lines)
}

/// Write one line per entry, each terminated by a newline.
pub fn write_lines<S: AsRef<str>>(path: &Path, lines: &[S]) -> Result<(), ImageError> {
    let file = File::create(path).map_err(|e| ImageError::from_io(path, e))?;
    let mut writer = BufWriter::new(file);
    for line in lines {
        writeln!(writer, "{}", line.as_ref()).map_err(|e| ImageError::from_io(path, e))?;
    }
    writer.flush().map_err(|e| ImageError::from_io(path, e))?;
    tracing::debug!(path = %path.display(), lines = lines.len(), "wrote memory image");
    Ok(())
}

/// Parse every line into a word. Malformed lines are logged, recorded and skipped.
pub fn parse_lines<S: AsRef<str>>(lines: &[S]) -> ParsedImage {
    let mut image = ParsedImage {
        words: Vec::with_capacity(lines.len()),
        skipped: Vec::new(),
    };

    for (i, line) in lines.iter().enumerate() {
        let text = line.as_ref();
        match MemoryWord::parse_hex_line(text) {
            Ok(word) => image.words.push(word),
            Err(reason) => {
                let malformed = MalformedLine {
                    line: i + 1,
                    text: text.to_string(),
                    reason,
                };
                tracing::warn!("skipping malformed memory line: {malformed}");
                image.skipped.push(malformed);
            }
        }
    }

    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_round_trip_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input_mem.csv");
        let lines = vec!["0807060504030201", "00000000000000ff"];

        write_lines(&path, &lines).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "0807060504030201\n00000000000000ff\n");
        assert_eq!(read_lines(&path).unwrap(), lines);
    }

    #[test]
    fn blank_lines_and_padding_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result_mem.csv");
        std::fs::write(&path, "  3f80 \n\n\r\n41000000\r\n").unwrap();

        assert_eq!(read_lines(&path).unwrap(), vec!["3f80", "41000000"]);
        assert!(non_blank(&["", "   ", "\t"]).is_empty());
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result_mem.csv");

        let err = read_lines(&path).unwrap_err();
        assert!(matches!(err, ImageError::SourceUnavailable { path: p } if p == path));
    }

    #[test]
    fn malformed_lines_are_skipped_and_recorded() {
        let parsed = parse_lines(&["0000000000003f80", "not-hex", "0000000000004000"]);

        assert_eq!(parsed.words, vec![MemoryWord(0x3F80), MemoryWord(0x4000)]);
        assert_eq!(
            parsed.skipped,
            vec![MalformedLine {
                line: 2,
                text: "not-hex".to_string(),
                reason: ParseWordError::InvalidDigit('n'),
            }]
        );
    }
}
