// Little-endian scalar, UTF-8 string, and shape codecs for single-value metadata files.
use std::fs;
use std::path::Path;

use crate::core::error::{Error, ErrorKind};

pub fn int32_to_bytes(value: i32) -> [u8; 4] {
    value.to_le_bytes()
}

pub fn bytes_to_int32(buf: &[u8]) -> Result<i32, Error> {
    Ok(i32::from_le_bytes(exact::<4>(buf, "int32")?))
}

pub fn int64_to_bytes(value: i64) -> [u8; 8] {
    value.to_le_bytes()
}

pub fn bytes_to_int64(buf: &[u8]) -> Result<i64, Error> {
    Ok(i64::from_le_bytes(exact::<8>(buf, "int64")?))
}

pub fn bytes_to_str(buf: &[u8]) -> Result<&str, Error> {
    std::str::from_utf8(buf).map_err(|err| {
        Error::new(ErrorKind::Format)
            .with_message("metadata is not valid UTF-8")
            .with_source(err)
    })
}

pub fn shape_to_bytes(shape: &[u64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(shape.len() * 8);
    for dim in shape {
        buf.extend_from_slice(&dim.to_le_bytes());
    }
    buf
}

pub fn bytes_to_shape(buf: &[u8]) -> Result<Vec<u64>, Error> {
    if buf.len() % 8 != 0 {
        return Err(Error::new(ErrorKind::Format)
            .with_message(format!("shape length {} is not a multiple of 8", buf.len())));
    }
    Ok(buf
        .chunks_exact(8)
        .map(|chunk| {
            let mut out = [0u8; 8];
            out.copy_from_slice(chunk);
            u64::from_le_bytes(out)
        })
        .collect())
}

pub fn write_int32(path: &Path, value: i32) -> Result<(), Error> {
    write_file(path, &int32_to_bytes(value))
}

pub fn read_int32(path: &Path) -> Result<i32, Error> {
    let buf = read_file(path)?;
    bytes_to_int32(&buf).map_err(|err| err.with_path(path))
}

pub fn write_int64(path: &Path, value: i64) -> Result<(), Error> {
    write_file(path, &int64_to_bytes(value))
}

pub fn read_int64(path: &Path) -> Result<i64, Error> {
    let buf = read_file(path)?;
    bytes_to_int64(&buf).map_err(|err| err.with_path(path))
}

pub fn write_str(path: &Path, value: &str) -> Result<(), Error> {
    write_file(path, value.as_bytes())
}

pub fn read_str(path: &Path) -> Result<String, Error> {
    let buf = read_file(path)?;
    bytes_to_str(&buf)
        .map(str::to_string)
        .map_err(|err| err.with_path(path))
}

pub fn write_shape(path: &Path, shape: &[u64]) -> Result<(), Error> {
    write_file(path, &shape_to_bytes(shape))
}

pub fn read_shape(path: &Path) -> Result<Vec<u64>, Error> {
    let buf = read_file(path)?;
    bytes_to_shape(&buf).map_err(|err| err.with_path(path))
}

fn write_file(path: &Path, buf: &[u8]) -> Result<(), Error> {
    fs::write(path, buf).map_err(|err| Error::io(err, path))
}

fn read_file(path: &Path) -> Result<Vec<u8>, Error> {
    fs::read(path).map_err(|err| Error::io(err, path))
}

fn exact<const N: usize>(buf: &[u8], what: &str) -> Result<[u8; N], Error> {
    if buf.len() != N {
        return Err(Error::new(ErrorKind::Format)
            .with_message(format!("expected {N} bytes for {what}, found {}", buf.len())));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(buf);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{
        bytes_to_int32, bytes_to_shape, read_int32, read_int64, read_shape, read_str,
        shape_to_bytes, write_int32, write_int64, write_shape, write_str,
    };
    use crate::core::error::ErrorKind;

    #[test]
    fn int32_is_little_endian() {
        assert_eq!(super::int32_to_bytes(1), [1, 0, 0, 0]);
        assert_eq!(bytes_to_int32(&[17, 0, 0, 0]).expect("decode"), 17);
    }

    #[test]
    fn truncated_int_is_a_format_error() {
        let err = bytes_to_int32(&[1, 0]).expect_err("short buffer");
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn shape_bytes_are_u64_per_dimension() {
        let buf = shape_to_bytes(&[3, 2]);
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[0..8], &3u64.to_le_bytes());
        assert_eq!(bytes_to_shape(&buf).expect("decode"), vec![3, 2]);
        assert!(bytes_to_shape(&[]).expect("empty").is_empty());
    }

    #[test]
    fn metadata_files_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let int_path = dir.path().join("flag.ninja");
        let str_path = dir.path().join("dtype.ninja");
        let long_path = dir.path().join("count.ninja");
        let shape_path = dir.path().join("shape.ninja");

        write_int32(&int_path, 1).expect("write int");
        write_int64(&long_path, -5_000_000_000).expect("write int64");
        write_str(&str_path, "float32").expect("write str");
        write_shape(&shape_path, &[7, 1]).expect("write shape");

        assert_eq!(read_int32(&int_path).expect("read int"), 1);
        assert_eq!(read_int64(&long_path).expect("read int64"), -5_000_000_000);
        assert_eq!(read_str(&str_path).expect("read str"), "float32");
        assert_eq!(read_shape(&shape_path).expect("read shape"), vec![7, 1]);
    }

    #[test]
    fn missing_file_reports_not_found_with_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing.ninja");
        let err = read_str(&path).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.path(), Some(path.as_path()));
    }
}
