//! NumPy `.npy` (v1.0) snapshots of dense matrices.
//!
//! Layout: `\x93NUMPY` | major(1) | minor(1) | header_len(u16 LE) | header | data. The header is a Python dict
//! literal padded with spaces so that the data starts on a 64-byte boundary.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;

use crate::Matrix;

const NUMPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

#[derive(Debug, Error)]
pub enum NpyError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid magic: got {0:?}")]
    InvalidMagic(Vec<u8>),
    #[error("unsupported npy version {0}.{1}")]
    UnsupportedVersion(u8, u8),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("dtype mismatch: expected '{expected}', found '{actual}'")]
    DtypeMismatch {
        expected: &'static str,
        actual: String,
    },
    #[error("expected a 2-D array, found shape {0:?}")]
    NotAMatrix(Vec<usize>),
}

/// Element types that can be stored in a snapshot.
pub trait NpyElement: Copy {
    /// NumPy `descr` string for this type.
    const DESCR: &'static str;
    const SIZE: usize;

    fn write_le(self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
}

impl NpyElement for i8 {
    const DESCR: &'static str = "|i1";
    const SIZE: usize = 1;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] as i8
    }
}

impl NpyElement for f32 {
    const DESCR: &'static str = "<f4";
    const SIZE: usize = 4;

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

pub fn write<T: NpyElement, W: Write>(writer: &mut W, matrix: &Matrix<T>) -> Result<(), NpyError> {
    let (rows, cols) = matrix.shape();
    let header_dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': ({rows}, {cols}), }}",
        T::DESCR
    );

    let prefix_len = NUMPY_MAGIC.len() + 2 + 2;
    let unpadded = prefix_len + header_dict.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    let padded_header = format!("{header_dict}{}\n", " ".repeat(padding));

    let mut data = Vec::with_capacity(matrix.len() * T::SIZE);
    for &v in matrix.as_slice() {
        v.write_le(&mut data);
    }

    writer.write_all(NUMPY_MAGIC)?;
    writer.write_all(&[1u8, 0u8])?;
    writer.write_all(&(padded_header.len() as u16).to_le_bytes())?;
    writer.write_all(padded_header.as_bytes())?;
    writer.write_all(&data)?;
    Ok(())
}

pub fn read<T: NpyElement, R: Read>(reader: &mut R) -> Result<Matrix<T>, NpyError> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != NUMPY_MAGIC {
        return Err(NpyError::InvalidMagic(magic.to_vec()));
    }

    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    let header_len = match version[0] {
        1 => {
            let mut buf = [0u8; 2];
            reader.read_exact(&mut buf)?;
            u16::from_le_bytes(buf) as usize
        }
        2 => {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf)?;
            u32::from_le_bytes(buf) as usize
        }
        major => return Err(NpyError::UnsupportedVersion(major, version[1])),
    };

    let mut header_bytes = vec![0u8; header_len];
    reader.read_exact(&mut header_bytes)?;
    let header = std::str::from_utf8(&header_bytes)
        .map_err(|e| NpyError::InvalidHeader(format!("invalid header UTF-8: {e}")))?
        .trim();

    let descr = quoted_value(header, "descr")?;
    if descr != T::DESCR {
        return Err(NpyError::DtypeMismatch {
            expected: T::DESCR,
            actual: descr.to_string(),
        });
    }
    if header.contains("'fortran_order': True") {
        return Err(NpyError::InvalidHeader(
            "fortran order is not supported".into(),
        ));
    }

    let shape = parse_shape(header)?;
    if shape.len() != 2 {
        return Err(NpyError::NotAMatrix(shape));
    }
    let (rows, cols) = (shape[0], shape[1]);

    let byte_len = rows
        .checked_mul(cols)
        .and_then(|len| len.checked_mul(T::SIZE))
        .ok_or_else(|| NpyError::InvalidHeader(format!("shape ({rows}, {cols}) is too large")))?;
    let mut data = vec![0u8; byte_len];
    reader.read_exact(&mut data)?;
    let elements = data.chunks_exact(T::SIZE).map(T::read_le).collect();

    Matrix::new(rows, cols, elements).map_err(|e| NpyError::InvalidHeader(e.to_string()))
}

/// Save a matrix snapshot. The file handle is closed before returning, including on error.
pub fn write_matrix<T: NpyElement>(path: &Path, matrix: &Matrix<T>) -> Result<(), NpyError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write(&mut writer, matrix)?;
    writer.flush()?;
    Ok(())
}

pub fn read_matrix<T: NpyElement>(path: &Path) -> Result<Matrix<T>, NpyError> {
    let mut reader = BufReader::new(File::open(path)?);
    read(&mut reader)
}

fn quoted_value<'a>(header: &'a str, key: &str) -> Result<&'a str, NpyError> {
    let pattern = format!("'{key}'");
    let key_start = header
        .find(&pattern)
        .ok_or_else(|| NpyError::InvalidHeader(format!("missing {key}")))?;
    let after = &header[key_start + pattern.len()..];
    let q1 = after
        .find('\'')
        .ok_or_else(|| NpyError::InvalidHeader(format!("bad {key} format")))?;
    let value = &after[q1 + 1..];
    let q2 = value
        .find('\'')
        .ok_or_else(|| NpyError::InvalidHeader(format!("unterminated {key}")))?;
    Ok(&value[..q2])
}

fn parse_shape(header: &str) -> Result<Vec<usize>, NpyError> {
    let shape_start = header
        .find("'shape'")
        .ok_or_else(|| NpyError::InvalidHeader("missing shape".into()))?;
    let after = &header[shape_start..];
    let paren_start = after
        .find('(')
        .ok_or_else(|| NpyError::InvalidHeader("bad shape format".into()))?;
    let paren_end = after
        .find(')')
        .ok_or_else(|| NpyError::InvalidHeader("unterminated shape".into()))?;
    after[paren_start + 1..paren_end]
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse::<usize>()
                .map_err(|e| NpyError::InvalidHeader(format!("bad shape dim: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn signed_ramp() -> Matrix<i8> {
        Matrix::from_fn(4, 6, |r, c| (r as i8 - 2) * 10 + c as i8)
    }

    #[test]
    fn header_is_64_byte_aligned() {
        let mut buf = Vec::new();
        write(&mut buf, &signed_ramp()).unwrap();

        assert_eq!(&buf[..6], NUMPY_MAGIC);
        let header_len = u16::from_le_bytes([buf[8], buf[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);
        assert_eq!(buf.len(), 10 + header_len + 24);
        assert_eq!(buf[10 + header_len - 1], b'\n');
    }

    #[test]
    fn int8_snapshot_reads_back() {
        let m = signed_ramp();
        let mut buf = Vec::new();
        write(&mut buf, &m).unwrap();

        let back: Matrix<i8> = read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn f32_snapshot_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("golden.npy");
        let m = Matrix::from_fn(2, 3, |r, c| r as f32 * 0.5 - c as f32);

        write_matrix(&path, &m).unwrap();
        let back: Matrix<f32> = read_matrix(&path).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn rejects_wrong_dtype() {
        let mut buf = Vec::new();
        write(&mut buf, &signed_ramp()).unwrap();

        let err = read::<f32, _>(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, NpyError::DtypeMismatch { expected: "<f4", .. }));
    }

    #[test]
    fn rejects_bad_magic_and_truncated_data() {
        let err = read::<i8, _>(&mut Cursor::new(b"NOTNUMPYDATA".to_vec())).unwrap_err();
        assert!(matches!(err, NpyError::InvalidMagic(_)));

        let mut buf = Vec::new();
        write(&mut buf, &signed_ramp()).unwrap();
        buf.truncate(buf.len() - 1);
        let err = read::<i8, _>(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, NpyError::Io(_)));
    }

    fn raw_snapshot(header: &str, data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(NUMPY_MAGIC);
        buf.extend_from_slice(&[1, 0]);
        buf.extend_from_slice(&(header.len() as u16).to_le_bytes());
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(data);
        buf
    }

    #[test]
    fn rejects_vectors() {
        let buf = raw_snapshot("{'descr': '|i1', 'fortran_order': False, 'shape': (3,), }", &[1, 2, 3]);

        let err = read::<i8, _>(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, NpyError::NotAMatrix(shape) if shape == vec![3]));
    }

    #[test]
    fn rejects_shapes_whose_size_overflows() {
        let header = format!(
            "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
            usize::MAX / 2,
            3
        );
        let err = read::<f32, _>(&mut Cursor::new(raw_snapshot(&header, &[]))).unwrap_err();
        assert!(matches!(err, NpyError::InvalidHeader(msg) if msg.contains("too large")));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_matrix::<i8>(&dir.path().join("matrix_a.npy")).unwrap_err();
        assert!(matches!(err, NpyError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
    }
}
