//! Purpose: Offline consistency scan of a store directory.
//! Exports: `ValidationReport`, `ValidationStatus`, `ValidationIssue`, `validate_store`.
//! Role: Diagnostics for stores left inconsistent by an interrupted write.
//! Invariants: Validation only reads files; it never maps or modifies a store.
//! Invariants: A store that fails to open still yields a report when its type tag is readable.
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::codec;
use crate::core::dtype::DType;
use crate::core::error::Error;
use crate::core::format::{
    DATA_FILE, DTYPE_FILE, SHAPE_FILE, SHAPES_ARE_FLAT_FILE, StoreKeys, StoreKind,
};
use crate::core::open::detect_kind;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Ok,
    Corrupt,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
    pub index: Option<u64>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ValidationReport {
    pub path: PathBuf,
    pub kind: StoreKind,
    pub status: ValidationStatus,
    pub issues: Vec<ValidationIssue>,
    pub issue_count: usize,
}

impl ValidationReport {
    pub fn ok(path: PathBuf, kind: StoreKind) -> Self {
        Self {
            path,
            kind,
            status: ValidationStatus::Ok,
            issues: Vec::new(),
            issue_count: 0,
        }
    }

    pub fn set_issues(mut self, issues: Vec<ValidationIssue>) -> Self {
        self.issue_count = issues.len();
        self.issues = issues;
        self.status = if self.issue_count == 0 {
            ValidationStatus::Ok
        } else {
            ValidationStatus::Corrupt
        };
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ValidationStatus::Ok
    }
}

pub fn validate_store(dir: impl AsRef<Path>) -> Result<ValidationReport, Error> {
    validate_store_with_keys(dir, &StoreKeys::default())
}

/// Scans the store in `dir`. Fails only when the type tag itself cannot be read.
pub fn validate_store_with_keys(
    dir: impl AsRef<Path>,
    keys: &StoreKeys,
) -> Result<ValidationReport, Error> {
    let dir = dir.as_ref();
    let kind = detect_kind(dir)?;
    let mut issues = Vec::new();
    match kind {
        StoreKind::Numpy => {
            if let Err(issue) = read_dense(dir) {
                issues.push(issue);
            }
        }
        StoreKind::Ragged => scan_ragged(dir, keys, &mut issues),
        StoreKind::String => scan_strings(dir, keys, &mut issues),
    }
    for issue in &issues {
        tracing::warn!(
            dir = %dir.display(),
            code = %issue.code,
            index = ?issue.index,
            "{}",
            issue.message
        );
    }
    Ok(ValidationReport::ok(dir.to_path_buf(), kind).set_issues(issues))
}

fn issue(code: &str, message: impl Into<String>, index: Option<u64>) -> ValidationIssue {
    ValidationIssue {
        code: code.to_string(),
        message: message.into(),
        index,
    }
}

/// Metadata and raw bytes of one dense array directory.
struct Dense {
    dtype: DType,
    shape: Vec<u64>,
    bytes: Vec<u8>,
}

impl Dense {
    fn byte_len(&self) -> Option<u64> {
        self.shape
            .iter()
            .try_fold(self.dtype.size() as u64, |bytes, &dim| bytes.checked_mul(dim))
    }

    fn int64_values(&self, dir: &Path) -> Result<Vec<i64>, ValidationIssue> {
        if self.dtype != DType::Int64 {
            return Err(issue(
                "index_dtype",
                format!("{} holds {}, expected int64", dir.display(), self.dtype),
                None,
            ));
        }
        Ok(self
            .bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut out = [0u8; 8];
                out.copy_from_slice(chunk);
                i64::from_le_bytes(out)
            })
            .collect())
    }
}

fn read_dense(dir: &Path) -> Result<Dense, ValidationIssue> {
    let missing = |err: Error| issue("missing_metadata", err.to_string(), None);
    let dtype_path = dir.join(DTYPE_FILE);
    let dtype_name = codec::read_str(&dtype_path).map_err(missing)?;
    let dtype = DType::from_name(&dtype_name, &dtype_path).map_err(missing)?;
    let shape = codec::read_shape(&dir.join(SHAPE_FILE)).map_err(missing)?;
    let data_path = dir.join(DATA_FILE);
    let bytes = fs::read(&data_path).map_err(|err| missing(Error::io(err, &data_path)))?;
    let dense = Dense {
        dtype,
        shape,
        bytes,
    };
    let Some(expected) = dense.byte_len() else {
        return Err(issue(
            "data_length",
            format!("{} declares shape {:?}, which overflows", dir.display(), dense.shape),
            None,
        ));
    };
    if dense.bytes.len() as u64 != expected {
        return Err(issue(
            "data_length",
            format!(
                "{} holds {} bytes, shape {:?} of {dtype} requires {expected}",
                data_path.display(),
                dense.bytes.len(),
                dense.shape
            ),
            None,
        ));
    }
    Ok(dense)
}

fn read_index(dir: &Path, issues: &mut Vec<ValidationIssue>) -> Option<Vec<i64>> {
    match read_dense(dir).and_then(|dense| dense.int64_values(dir)) {
        Ok(values) => Some(values),
        Err(found) => {
            issues.push(found);
            None
        }
    }
}

/// Checks that spans are non-negative, contiguous from zero, and end at `total`.
fn scan_spans(starts: &[i64], ends: &[i64], total: Option<u64>, issues: &mut Vec<ValidationIssue>) {
    if starts.len() != ends.len() {
        issues.push(issue(
            "index_length",
            format!("starts holds {} offsets, ends holds {}", starts.len(), ends.len()),
            None,
        ));
    }
    let mut expected_start = 0i64;
    for (i, (&start, &end)) in starts.iter().zip(ends).enumerate() {
        if start != expected_start {
            issues.push(issue(
                "span_gap",
                format!("element starts at {start}, previous element ended at {expected_start}"),
                Some(i as u64),
            ));
        }
        if end < start {
            issues.push(issue(
                "span_inverted",
                format!("span {start}..{end} ends before it starts"),
                Some(i as u64),
            ));
        }
        expected_start = end;
    }
    let last_end = ends.last().copied().unwrap_or(0);
    if let Some(total) = total {
        if last_end != total as i64 {
            issues.push(issue(
                "buffer_length",
                format!("buffer holds {total} elements, index arrays end at {last_end}"),
                None,
            ));
        }
    }
}

fn scan_ragged(dir: &Path, keys: &StoreKeys, issues: &mut Vec<ValidationIssue>) {
    let starts = read_index(&dir.join(&keys.starts), issues);
    let ends = read_index(&dir.join(&keys.ends), issues);
    let flattened = read_index(&dir.join(&keys.flattened_shapes), issues);

    // The buffer is checked by size only; its shape.ninja is rewritten last on extend.
    let total = match (codec::read_str(&dir.join(DTYPE_FILE)), fs::metadata(dir.join(DATA_FILE))) {
        (Ok(name), Ok(meta)) => match DType::from_name(&name, dir) {
            Ok(dtype) if meta.len() % dtype.size() as u64 == 0 => {
                Some(meta.len() / dtype.size() as u64)
            }
            Ok(dtype) => {
                issues.push(issue(
                    "data_length",
                    format!("buffer of {} bytes is not a whole number of {dtype}", meta.len()),
                    None,
                ));
                None
            }
            Err(err) => {
                issues.push(issue("missing_metadata", err.to_string(), None));
                None
            }
        },
        (Err(err), _) => {
            issues.push(issue("missing_metadata", err.to_string(), None));
            None
        }
        (_, Err(err)) => {
            let err = Error::io(err, dir.join(DATA_FILE));
            issues.push(issue("missing_metadata", err.to_string(), None));
            None
        }
    };

    let (Some(starts), Some(ends)) = (starts, ends) else {
        return;
    };
    scan_spans(&starts, &ends, total, issues);

    if let Some(flattened) = &flattened {
        if flattened.len() != starts.len() {
            issues.push(issue(
                "index_length",
                format!(
                    "flattened_shapes holds {} entries, starts holds {}",
                    flattened.len(),
                    starts.len()
                ),
                None,
            ));
        }
        for (i, ((&start, &end), &count)) in starts.iter().zip(&ends).zip(flattened).enumerate() {
            if end.checked_sub(start) != Some(count) {
                issues.push(issue(
                    "flattened_length",
                    format!("span {start}..{end} disagrees with flattened length {count}"),
                    Some(i as u64),
                ));
            }
        }
    }

    let shapes = match read_shapes(dir, keys, issues) {
        Some(shapes) => shapes,
        None => return,
    };
    if shapes.len() != starts.len() {
        issues.push(issue(
            "index_length",
            format!("shape table holds {} entries, starts holds {}", shapes.len(), starts.len()),
            None,
        ));
    }
    for (i, (shape, (&start, &end))) in shapes.iter().zip(starts.iter().zip(&ends)).enumerate() {
        let count = end.checked_sub(start);
        let fits = match count {
            Some(count) if shape.as_slice() == [0] => count <= 1,
            Some(count) => shape_count(shape) == Some(count),
            None => false,
        };
        if !fits {
            issues.push(issue(
                "shape_mismatch",
                format!("shape {shape:?} does not describe span {start}..{end}"),
                Some(i as u64),
            ));
        }
    }
}

/// Element count of a stored shape; `None` for negative or overflowing dimensions.
fn shape_count(shape: &[i64]) -> Option<i64> {
    shape.iter().try_fold(1i64, |count, &dim| {
        if dim < 0 {
            None
        } else {
            count.checked_mul(dim)
        }
    })
}

fn read_shapes(
    dir: &Path,
    keys: &StoreKeys,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Vec<Vec<i64>>> {
    let flat = match codec::read_int32(&dir.join(SHAPES_ARE_FLAT_FILE)) {
        Ok(flag) => flag != 0,
        Err(err) => {
            issues.push(issue("missing_metadata", err.to_string(), None));
            return None;
        }
    };
    let shapes_dir = dir.join(&keys.shapes);
    if flat {
        let dense = match read_dense(&shapes_dir) {
            Ok(dense) => dense,
            Err(found) => {
                issues.push(found);
                return None;
            }
        };
        if dense.shape.get(1..) != Some(&[1u64][..]) {
            issues.push(issue(
                "shape_table",
                format!("flat shape table has shape {:?}, expected (n, 1)", dense.shape),
                None,
            ));
            return None;
        }
        let values = match dense.int64_values(&shapes_dir) {
            Ok(values) => values,
            Err(found) => {
                issues.push(found);
                return None;
            }
        };
        return Some(values.into_iter().map(|dim| vec![dim]).collect());
    }

    // Nested tables are scanned recursively before being read back.
    let before = issues.len();
    scan_ragged(&shapes_dir, &StoreKeys::default(), issues);
    for nested in &mut issues[before..] {
        nested.code = format!("shapes.{}", nested.code);
    }
    if issues.len() > before {
        return None;
    }
    let starts = read_index(&shapes_dir.join("starts"), issues)?;
    let ends = read_index(&shapes_dir.join("ends"), issues)?;
    let data = read_dense(&shapes_dir)
        .and_then(|dense| dense.int64_values(&shapes_dir))
        .map_err(|found| issues.push(found))
        .ok()?;
    Some(
        starts
            .iter()
            .zip(&ends)
            .map(|(&start, &end)| data[start as usize..end as usize].to_vec())
            .collect(),
    )
}

fn scan_strings(dir: &Path, keys: &StoreKeys, issues: &mut Vec<ValidationIssue>) {
    let starts = read_index(&dir.join(&keys.starts), issues);
    let ends = read_index(&dir.join(&keys.ends), issues);
    let data_path = dir.join(DATA_FILE);
    let data = match fs::read(&data_path) {
        Ok(data) => Some(data),
        Err(err) => {
            issues.push(issue("missing_metadata", Error::io(err, &data_path).to_string(), None));
            None
        }
    };
    let (Some(starts), Some(ends)) = (starts, ends) else {
        return;
    };
    let before = issues.len();
    scan_spans(&starts, &ends, data.as_ref().map(|data| data.len() as u64), issues);
    let Some(data) = data else {
        return;
    };
    if issues.len() > before {
        return;
    }
    for (i, (&start, &end)) in starts.iter().zip(&ends).enumerate() {
        if std::str::from_utf8(&data[start as usize..end as usize]).is_err() {
            issues.push(issue("invalid_utf8", "stored string is not valid UTF-8", Some(i as u64)));
        }
    }
}
