//! Purpose: Persist a growable sequence of UTF-8 strings in one byte-addressed mapped file.
//! Exports: `StringArrayStore`.
//! Role: Ragged layout specialized to bytes; no dtype, shape, or shape table files.
//! Invariants: `data.ninja` holds exactly ends[n-1] bytes and every span is valid UTF-8.
//! Invariants: Read-only stores never open any file for writing.
use std::ops::{Range, RangeBounds};
use std::path::{Path, PathBuf};

use crate::core::codec;
use crate::core::error::{Error, ErrorKind};
use crate::core::fixed::{self, FixedArrayStore};
use crate::core::format::{DATA_FILE, StoreInfo, StoreKeys, StoreKind, TYPE_FILE, read_store_kind};
use crate::core::read::{StoreRead, resolve_range};
use crate::core::region::{AccessMode, MappedFile};

struct StringColumns {
    data: MappedFile,
    starts: FixedArrayStore<i64>,
    ends: FixedArrayStore<i64>,
}

impl StringColumns {
    // Data first, then offsets, then the type tag.
    fn create(dir: &Path, keys: &StoreKeys, strings: &[String]) -> Result<Self, Error> {
        fixed::create_dir(dir)?;
        let (bytes, starts, ends) = pack(strings, 0);
        let data = MappedFile::create(dir.join(DATA_FILE), &bytes)?;
        let starts = FixedArrayStore::from_slice(dir.join(&keys.starts), &starts)?;
        let ends = FixedArrayStore::from_slice(dir.join(&keys.ends), &ends)?;
        codec::write_str(&dir.join(TYPE_FILE), StoreKind::String.tag())?;
        tracing::debug!(
            dir = %dir.display(),
            len = strings.len(),
            bytes = bytes.len(),
            "created string store"
        );
        Ok(Self { data, starts, ends })
    }

    fn open(dir: &Path, keys: &StoreKeys, mode: AccessMode) -> Result<Self, Error> {
        let columns = Self {
            data: MappedFile::open(dir.join(DATA_FILE), mode)?,
            starts: FixedArrayStore::open(dir.join(&keys.starts), mode)?,
            ends: FixedArrayStore::open(dir.join(&keys.ends), mode)?,
        };
        if columns.starts.shape().len() != 1 || columns.ends.shape().len() != 1 {
            return Err(Error::new(ErrorKind::Format)
                .with_message("string offsets must be one-dimensional")
                .with_path(dir));
        }
        let n = columns.starts.len();
        if columns.ends.len() != n {
            return Err(Error::new(ErrorKind::Format)
                .with_message(format!(
                    "starts holds {n} offsets, ends holds {}",
                    columns.ends.len()
                ))
                .with_path(dir));
        }
        let expected = match n {
            0 => 0,
            _ => columns.ends.value(n - 1)?,
        };
        if expected != columns.data.len() as i64 {
            return Err(Error::new(ErrorKind::Format)
                .with_message(format!(
                    "data file holds {} bytes, offsets end at {expected}",
                    columns.data.len()
                ))
                .with_path(dir));
        }
        Ok(columns)
    }

    fn len(&self) -> usize {
        self.starts.len()
    }

    fn locate(&self, index: usize, dir: &Path) -> Result<Range<usize>, Error> {
        if index >= self.len() {
            return Err(Error::out_of_range(index as u64, self.len()).with_path(dir));
        }
        let start = self.starts.value(index)?;
        let end = self.ends.value(index)?;
        if start < 0 || start > end || end > self.data.len() as i64 {
            return Err(Error::new(ErrorKind::Format)
                .with_message(format!(
                    "span {start}..{end} lies outside data file of {} bytes",
                    self.data.len()
                ))
                .with_path(dir)
                .with_index(index as u64));
        }
        Ok(start as usize..end as usize)
    }

    fn append(&mut self, strings: &[String]) -> Result<(), Error> {
        let (bytes, starts, ends) = pack(strings, self.data.len() as i64);
        self.data.append(&bytes)?;
        self.starts.extend_from_slice(&starts)?;
        self.ends.extend_from_slice(&ends)
    }

    fn flush(&self) -> Result<(), Error> {
        self.data.flush()?;
        self.starts.flush()?;
        self.ends.flush()
    }
}

fn pack(strings: &[String], base: i64) -> (Vec<u8>, Vec<i64>, Vec<i64>) {
    let mut bytes = Vec::new();
    let mut starts = Vec::with_capacity(strings.len());
    let mut ends = Vec::with_capacity(strings.len());
    for value in strings {
        starts.push(base + bytes.len() as i64);
        bytes.extend_from_slice(value.as_bytes());
        ends.push(base + bytes.len() as i64);
    }
    (bytes, starts, ends)
}

/// A growable sequence of strings.
pub struct StringArrayStore {
    dir: PathBuf,
    mode: AccessMode,
    keys: StoreKeys,
    columns: Option<StringColumns>,
}

impl StringArrayStore {
    pub fn from_strings<S: AsRef<str>>(
        dir: impl AsRef<Path>,
        strings: impl IntoIterator<Item = S>,
    ) -> Result<Self, Error> {
        Self::from_strings_with_keys(dir, StoreKeys::default(), strings)
    }

    pub fn from_strings_with_keys<S: AsRef<str>>(
        dir: impl AsRef<Path>,
        keys: StoreKeys,
        strings: impl IntoIterator<Item = S>,
    ) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        let strings = owned(strings);
        let columns = if strings.is_empty() {
            fixed::create_dir(&dir)?;
            None
        } else {
            Some(StringColumns::create(&dir, &keys, &strings)?)
        };
        Ok(Self {
            dir,
            mode: AccessMode::ReadWrite,
            keys,
            columns,
        })
    }

    pub fn open(dir: impl AsRef<Path>, mode: AccessMode) -> Result<Self, Error> {
        Self::open_with_keys(dir, StoreKeys::default(), mode)
    }

    pub fn open_with_keys(
        dir: impl AsRef<Path>,
        keys: StoreKeys,
        mode: AccessMode,
    ) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        let columns = match read_store_kind(&dir)? {
            None if mode.is_writable() => {
                fixed::create_dir(&dir)?;
                None
            }
            None if dir.is_dir() => None,
            None => {
                return Err(Error::new(ErrorKind::NotFound)
                    .with_message("store directory does not exist")
                    .with_path(&dir));
            }
            Some(StoreKind::String) => Some(StringColumns::open(&dir, &keys, mode)?),
            Some(other) => {
                return Err(Error::new(ErrorKind::Format)
                    .with_message(format!("directory holds a {other} store, not a string store"))
                    .with_path(&dir));
            }
        };
        tracing::debug!(
            dir = %dir.display(),
            initialized = columns.is_some(),
            read_only = !mode.is_writable(),
            "opened string store"
        );
        Ok(Self {
            dir,
            mode,
            keys,
            columns,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn keys(&self) -> &StoreKeys {
        &self.keys
    }

    pub fn is_initialized(&self) -> bool {
        self.columns.is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.as_ref().map_or(0, StringColumns::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<String, Error> {
        self.get_str(index).map(str::to_string)
    }

    /// Borrows string `index` straight from the mapping.
    pub fn get_str(&self, index: usize) -> Result<&str, Error> {
        let columns = self.populated(index)?;
        let span = columns.locate(index, &self.dir)?;
        std::str::from_utf8(&columns.data.bytes()[span]).map_err(|err| {
            Error::new(ErrorKind::Format)
                .with_message("stored string is not valid UTF-8")
                .with_path(&self.dir)
                .with_index(index as u64)
                .with_source(err)
        })
    }

    /// Overwrites string `index` with a value of the same encoded length.
    pub fn set(&mut self, index: usize, value: &str) -> Result<(), Error> {
        if !self.mode.is_writable() {
            return Err(Error::read_only(&self.dir));
        }
        let span = self.populated(index)?.locate(index, &self.dir)?;
        self.check_span(index, &span, value)?;
        self.write_span(index, span, value)
    }

    pub fn set_range<S: AsRef<str>>(
        &mut self,
        range: impl RangeBounds<usize>,
        values: impl IntoIterator<Item = S>,
    ) -> Result<(), Error> {
        if !self.mode.is_writable() {
            return Err(Error::read_only(&self.dir));
        }
        let indices = resolve_range(range, self.len());
        let values = owned(values);
        if values.len() != indices.len() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "{} values supplied for {} strings",
                    values.len(),
                    indices.len()
                ))
                .with_path(&self.dir));
        }
        let mut spans = Vec::with_capacity(values.len());
        for (index, value) in indices.clone().zip(&values) {
            let span = self.populated(index)?.locate(index, &self.dir)?;
            self.check_span(index, &span, value)?;
            spans.push(span);
        }
        for ((index, span), value) in indices.zip(spans).zip(&values) {
            self.write_span(index, span, value)?;
        }
        Ok(())
    }

    /// Appends strings. On an uninitialized store this creates it.
    pub fn extend<S: AsRef<str>>(
        &mut self,
        strings: impl IntoIterator<Item = S>,
    ) -> Result<(), Error> {
        if !self.mode.is_writable() {
            return Err(Error::read_only(&self.dir));
        }
        let strings = owned(strings);
        if strings.is_empty() {
            return Ok(());
        }
        if let Some(columns) = self.columns.as_mut() {
            columns.append(&strings)?;
        } else {
            self.columns = Some(StringColumns::create(&self.dir, &self.keys, &strings)?);
        }
        tracing::debug!(
            dir = %self.dir.display(),
            added = strings.len(),
            len = self.len(),
            "extended string store"
        );
        Ok(())
    }

    pub fn append(&mut self, value: &str) -> Result<(), Error> {
        self.extend([value])
    }

    pub fn flush(&self) -> Result<(), Error> {
        match &self.columns {
            Some(columns) => columns.flush(),
            None => Ok(()),
        }
    }

    pub fn info(&self) -> StoreInfo {
        StoreInfo {
            path: self.dir.clone(),
            kind: StoreKind::String,
            dtype: None,
            len: self.len(),
            shape: None,
            order: None,
            data_bytes: self
                .columns
                .as_ref()
                .map_or(0, |columns| columns.data.len() as u64),
            shapes_are_flat: None,
        }
    }

    fn populated(&self, index: usize) -> Result<&StringColumns, Error> {
        self.columns.as_ref().ok_or_else(|| {
            Error::out_of_range(index as u64, 0)
                .with_message("store is empty")
                .with_path(&self.dir)
        })
    }

    fn check_span(&self, index: usize, span: &Range<usize>, value: &str) -> Result<(), Error> {
        if value.len() != span.len() {
            return Err(Error::new(ErrorKind::ShapeMismatch)
                .with_message(format!(
                    "new value is {} bytes, stored string is {} bytes",
                    value.len(),
                    span.len()
                ))
                .with_path(&self.dir)
                .with_index(index as u64));
        }
        Ok(())
    }

    fn write_span(&mut self, index: usize, span: Range<usize>, value: &str) -> Result<(), Error> {
        let dir = &self.dir;
        let columns = self.columns.as_mut().ok_or_else(|| {
            Error::out_of_range(index as u64, 0).with_path(dir)
        })?;
        columns.data.bytes_mut()?[span].copy_from_slice(value.as_bytes());
        Ok(())
    }
}

impl StoreRead for StringArrayStore {
    type Item = String;

    fn len(&self) -> usize {
        StringArrayStore::len(self)
    }

    fn get(&self, index: usize) -> Result<String, Error> {
        self.get_str(index).map(str::to_string)
    }
}

fn owned<S: AsRef<str>>(strings: impl IntoIterator<Item = S>) -> Vec<String> {
    strings
        .into_iter()
        .map(|value| value.as_ref().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::StringArrayStore;
    use crate::core::error::ErrorKind;
    use crate::core::read::StoreRead;
    use crate::core::region::AccessMode;

    const WORDS: [&str; 5] = ["Torba", "Boiler", "a", "", "popo"];

    #[test]
    fn strings_read_back_and_set_in_place() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = StringArrayStore::from_strings(dir.path(), WORDS).expect("create");
        assert_eq!(store.len(), 5);
        assert_eq!(store.get_many(&[0, 1]).expect("many"), vec!["Torba", "Boiler"]);
        assert_eq!(store.get(3).expect("empty string"), "");

        store.set(2, "b").expect("set");
        assert_eq!(store.get(2).expect("get"), "b");
        assert_eq!(store.get_str(4).expect("get"), "popo");
    }

    #[test]
    fn set_with_different_byte_length_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = StringArrayStore::from_strings(dir.path(), WORDS).expect("create");
        let err = store.set(0, "Torbas").expect_err("longer value");
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        // Same character count, more bytes.
        let err = store.set(2, "ä").expect_err("multi-byte");
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        assert_eq!(store.get_range(..).expect("all"), WORDS.to_vec());
    }

    #[test]
    fn extend_and_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = StringArrayStore::from_strings(dir.path(), ["one", "two"]).expect("create");
        store.extend(["three", "four"]).expect("extend");
        store.append("five").expect("append");
        drop(store);

        let store = StringArrayStore::open(dir.path(), AccessMode::ReadOnly).expect("open");
        assert_eq!(store.len(), 5);
        assert_eq!(store.get_signed(-1).expect("last"), "five");
        assert_eq!(store.get_range(1..3).expect("range"), vec!["two", "three"]);
    }

    #[test]
    fn set_range_writes_nothing_on_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store =
            StringArrayStore::from_strings(dir.path(), ["ab", "cd", "ef"]).expect("create");
        let err = store.set_range(0..2, ["xy", "z"]).expect_err("short value");
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        assert_eq!(store.get(0).expect("get"), "ab");

        store.set_range(1.., ["CD", "EF"]).expect("set range");
        assert_eq!(store.get_range(..).expect("all"), vec!["ab", "CD", "EF"]);
    }

    #[test]
    fn uninitialized_store_grows_on_first_extend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("strings");
        let mut store = StringArrayStore::open(&path, AccessMode::ReadWrite).expect("open");
        assert!(!store.is_initialized());
        assert_eq!(store.get(0).expect_err("empty").kind(), ErrorKind::IndexOutOfRange);

        store.append("first").expect("append");
        assert_eq!(store.get(0).expect("get"), "first");
        assert!(path.join("type.ninja").exists());
    }

    #[test]
    fn empty_input_creates_an_uninitialized_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store =
            StringArrayStore::from_strings(dir.path(), Vec::<String>::new()).expect("create");
        assert!(!store.is_initialized());
        assert!(!dir.path().join("type.ninja").exists());

        store.extend(["late", "words"]).expect("extend");
        assert_eq!(store.get_range(..).expect("all"), vec!["late", "words"]);
    }

    #[test]
    fn read_only_mode_rejects_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        StringArrayStore::from_strings(dir.path(), WORDS).expect("create");
        let mut store = StringArrayStore::open(dir.path(), AccessMode::ReadOnly).expect("open");
        assert_eq!(store.set(2, "b").expect_err("set").kind(), ErrorKind::Permission);
        assert_eq!(store.append("x").expect_err("append").kind(), ErrorKind::Permission);
        assert_eq!(store.get(2).expect("get"), "a");
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn opening_a_ragged_directory_is_a_format_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        crate::core::ragged::RaggedArrayStore::<i64>::from_elements(dir.path(), vec![vec![1i64]])
            .expect("create");
        let err = StringArrayStore::open(dir.path(), AccessMode::ReadOnly)
            .err()
            .expect("wrong kind");
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}
