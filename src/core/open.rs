// Open any store directory by dispatching on its `type.ninja` tag.
use std::path::Path;

use ndarray::ArrayD;

use crate::core::dtype::Element;
use crate::core::error::{Error, ErrorKind};
use crate::core::fixed::FixedArrayStore;
use crate::core::format::{StoreInfo, StoreKind, TYPE_FILE, read_store_kind};
use crate::core::ragged::{RaggedArrayStore, Sample};
use crate::core::read::StoreRead;
use crate::core::region::AccessMode;
use crate::core::strings::StringArrayStore;

/// A store of any kind, as found on disk.
pub enum AnyStore<T: Element> {
    Numpy(FixedArrayStore<T>),
    Ragged(RaggedArrayStore<T>),
    String(StringArrayStore),
}

impl<T: Element> AnyStore<T> {
    pub fn kind(&self) -> StoreKind {
        match self {
            AnyStore::Numpy(_) => StoreKind::Numpy,
            AnyStore::Ragged(_) => StoreKind::Ragged,
            AnyStore::String(_) => StoreKind::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AnyStore::Numpy(store) => store.len(),
            AnyStore::Ragged(store) => store.len(),
            AnyStore::String(store) => store.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn info(&self) -> StoreInfo {
        match self {
            AnyStore::Numpy(store) => store.info(),
            AnyStore::Ragged(store) => store.info(),
            AnyStore::String(store) => store.info(),
        }
    }

    pub fn as_numpy(&self) -> Option<&FixedArrayStore<T>> {
        match self {
            AnyStore::Numpy(store) => Some(store),
            _ => None,
        }
    }

    pub fn as_ragged(&self) -> Option<&RaggedArrayStore<T>> {
        match self {
            AnyStore::Ragged(store) => Some(store),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&StringArrayStore> {
        match self {
            AnyStore::String(store) => Some(store),
            _ => None,
        }
    }
}

/// One element read from an `AnyStore`, tagged by the kind of store it came from.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyElement<T> {
    Numpy(ArrayD<T>),
    Ragged(Sample<T>),
    String(String),
}

impl<T: Element> AnyElement<T> {
    /// Numeric values in row-major order; `None` for strings.
    pub fn to_vec(&self) -> Option<Vec<T>> {
        match self {
            AnyElement::Numpy(array) => Some(array.iter().copied().collect()),
            AnyElement::Ragged(sample) => Some(sample.to_vec()),
            AnyElement::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnyElement::String(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl<T: Element> StoreRead for AnyStore<T> {
    type Item = AnyElement<T>;

    fn len(&self) -> usize {
        AnyStore::len(self)
    }

    fn get(&self, index: usize) -> Result<AnyElement<T>, Error> {
        match self {
            AnyStore::Numpy(store) => store.get(index).map(AnyElement::Numpy),
            AnyStore::Ragged(store) => store.get(index).map(AnyElement::Ragged),
            AnyStore::String(store) => store.get(index).map(AnyElement::String),
        }
    }
}

/// Reads the type tag of an existing store.
pub fn detect_kind(dir: impl AsRef<Path>) -> Result<StoreKind, Error> {
    let dir = dir.as_ref();
    read_store_kind(dir)?.ok_or_else(|| {
        Error::new(ErrorKind::Format)
            .with_message(format!("{TYPE_FILE} is missing"))
            .with_path(dir)
    })
}

/// Opens the store in `dir` with the opener its type tag names.
///
/// `T` is the element type for numeric stores; it is ignored for string stores.
pub fn open_existing<T: Element>(
    dir: impl AsRef<Path>,
    mode: AccessMode,
) -> Result<AnyStore<T>, Error> {
    let dir = dir.as_ref();
    let store = match detect_kind(dir)? {
        StoreKind::Numpy => AnyStore::Numpy(FixedArrayStore::open(dir, mode)?),
        StoreKind::Ragged => AnyStore::Ragged(RaggedArrayStore::open(dir, mode)?),
        StoreKind::String => AnyStore::String(StringArrayStore::open(dir, mode)?),
    };
    Ok(store)
}
