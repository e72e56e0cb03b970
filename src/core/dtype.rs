// Element types, dtype names, and memory order tags as persisted in metadata files.
use std::fmt;
use std::path::Path;

use bytemuck::Pod;
use serde::Serialize;

use crate::core::error::{Error, ErrorKind};

#[cfg(not(target_endian = "little"))]
compile_error!("data files are little-endian and are mapped without byte swapping");

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl DType {
    pub fn name(self) -> &'static str {
        match self {
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::UInt8 => "uint8",
            DType::UInt16 => "uint16",
            DType::UInt32 => "uint32",
            DType::UInt64 => "uint64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }

    pub fn size(self) -> usize {
        match self {
            DType::Int8 | DType::UInt8 => 1,
            DType::Int16 | DType::UInt16 => 2,
            DType::Int32 | DType::UInt32 | DType::Float32 => 4,
            DType::Int64 | DType::UInt64 | DType::Float64 => 8,
        }
    }

    pub fn from_name(name: &str, path: &Path) -> Result<Self, Error> {
        let dtype = match name {
            "int8" => DType::Int8,
            "int16" => DType::Int16,
            "int32" => DType::Int32,
            "int64" => DType::Int64,
            "uint8" => DType::UInt8,
            "uint16" => DType::UInt16,
            "uint32" => DType::UInt32,
            "uint64" => DType::UInt64,
            "float32" => DType::Float32,
            "float64" => DType::Float64,
            other => {
                return Err(Error::new(ErrorKind::Format)
                    .with_message(format!("unsupported dtype \"{other}\""))
                    .with_path(path));
            }
        };
        Ok(dtype)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub enum MemoryOrder {
    #[default]
    #[serde(rename = "C")]
    RowMajor,
    #[serde(rename = "F")]
    ColumnMajor,
}

impl MemoryOrder {
    pub fn tag(self) -> &'static str {
        match self {
            MemoryOrder::RowMajor => "C",
            MemoryOrder::ColumnMajor => "F",
        }
    }

    pub fn from_tag(tag: &str, path: &Path) -> Result<Self, Error> {
        match tag {
            "C" => Ok(MemoryOrder::RowMajor),
            "F" => Ok(MemoryOrder::ColumnMajor),
            other => Err(Error::new(ErrorKind::Format)
                .with_message(format!("unknown memory order \"{other}\""))
                .with_path(path)),
        }
    }
}

/// Scalar types that can be stored in a mapped buffer.
///
/// Values are read and written as their in-memory representation, which is
/// the little-endian on-disk layout on every supported target.
pub trait Element: Pod + fmt::Debug + PartialEq + Send + Sync + 'static {
    const DTYPE: DType;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;
            }
        )*
    };
}

impl_element! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
}

#[cfg(test)]
mod tests {
    use super::{DType, Element, MemoryOrder};
    use crate::core::error::ErrorKind;
    use std::path::Path;

    #[test]
    fn dtype_names_match_element_types() {
        assert_eq!(<i64 as Element>::DTYPE.name(), "int64");
        assert_eq!(<u8 as Element>::DTYPE.name(), "uint8");
        assert_eq!(<f32 as Element>::DTYPE.name(), "float32");
        assert_eq!(<f64 as Element>::DTYPE.size(), 8);
    }

    #[test]
    fn dtype_names_parse_back() {
        let path = Path::new("dtype.ninja");
        for dtype in [DType::Int8, DType::UInt16, DType::Int32, DType::Float64] {
            assert_eq!(DType::from_name(dtype.name(), path).expect("parse"), dtype);
        }
        let err = DType::from_name("complex128", path).expect_err("unsupported");
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn order_tags() {
        let path = Path::new("order.ninja");
        assert_eq!(MemoryOrder::from_tag("C", path).expect("C"), MemoryOrder::RowMajor);
        assert_eq!(MemoryOrder::from_tag("F", path).expect("F"), MemoryOrder::ColumnMajor);
        assert_eq!(MemoryOrder::ColumnMajor.tag(), "F");
        assert!(MemoryOrder::from_tag("K", path).is_err());
    }
}
