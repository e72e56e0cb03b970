//! Purpose: Centralize on-disk file names and store type tags.
//! Exports: file name constants, `StoreKind`, `StoreKeys`, `StoreInfo`.
//! Role: Shared layout policy for every store opener and writer.
//! Invariants: File names and tag strings are part of the on-disk format; never rename.
//! Invariants: `type.ninja` is written last on creation, so its presence marks a complete store.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::codec;
use crate::core::dtype::{DType, MemoryOrder};
use crate::core::error::{Error, ErrorKind};

pub const TYPE_FILE: &str = "type.ninja";
pub const DTYPE_FILE: &str = "dtype.ninja";
pub const SHAPE_FILE: &str = "shape.ninja";
pub const ORDER_FILE: &str = "order.ninja";
pub const DATA_FILE: &str = "data.ninja";
pub const SHAPES_ARE_FLAT_FILE: &str = "shapes_are_flat.ninja";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Numpy,
    Ragged,
    String,
}

impl StoreKind {
    pub fn tag(self) -> &'static str {
        match self {
            StoreKind::Numpy => "numpy",
            StoreKind::Ragged => "ragged",
            StoreKind::String => "string",
        }
    }

    pub fn from_tag(tag: &str, dir: &Path) -> Result<Self, Error> {
        match tag {
            "numpy" => Ok(StoreKind::Numpy),
            "ragged" => Ok(StoreKind::Ragged),
            "string" => Ok(StoreKind::String),
            other => Err(Error::new(ErrorKind::UnknownTypeTag)
                .with_message(format!("unknown store type \"{other}\""))
                .with_path(dir)),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Reads the type tag of `dir`, or `None` when `type.ninja` is absent.
pub fn read_store_kind(dir: &Path) -> Result<Option<StoreKind>, Error> {
    let path = dir.join(TYPE_FILE);
    match fs::metadata(&path) {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(Error::io(err, &path)),
    }
    let tag = codec::read_str(&path)?;
    StoreKind::from_tag(&tag, dir).map(Some)
}

/// Names of the index sub-directories inside a ragged or string store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoreKeys {
    pub starts: String,
    pub ends: String,
    pub shapes: String,
    pub flattened_shapes: String,
}

impl StoreKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_starts(mut self, key: impl Into<String>) -> Self {
        self.starts = key.into();
        self
    }

    pub fn with_ends(mut self, key: impl Into<String>) -> Self {
        self.ends = key.into();
        self
    }

    pub fn with_shapes(mut self, key: impl Into<String>) -> Self {
        self.shapes = key.into();
        self
    }

    pub fn with_flattened_shapes(mut self, key: impl Into<String>) -> Self {
        self.flattened_shapes = key.into();
        self
    }
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self {
            starts: "starts".to_string(),
            ends: "ends".to_string(),
            shapes: "shapes".to_string(),
            flattened_shapes: "flattened_shapes".to_string(),
        }
    }
}

/// Summary of an opened store, as reported by `info()`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoreInfo {
    pub path: PathBuf,
    pub kind: StoreKind,
    pub dtype: Option<DType>,
    pub len: usize,
    pub shape: Option<Vec<u64>>,
    pub order: Option<MemoryOrder>,
    pub data_bytes: u64,
    pub shapes_are_flat: Option<bool>,
}
