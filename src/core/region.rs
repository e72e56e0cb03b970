// Data file creation/opening, memory mapping, and append-then-remap growth.
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytemuck::Pod;
use fs2::FileExt;
use memmap2::{Mmap, MmapMut};

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AccessMode {
    ReadOnly,
    #[default]
    ReadWrite,
}

impl AccessMode {
    pub fn is_writable(self) -> bool {
        self == AccessMode::ReadWrite
    }
}

enum Mapping {
    // Zero-length files cannot be mapped.
    Empty,
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

/// One data file together with its current memory map.
///
/// Growth closes the map, appends to the file, and maps it again, so any
/// slice borrowed from the old map must be dropped first. The borrow checker
/// enforces this because growth takes `&mut self`.
pub struct MappedFile {
    path: PathBuf,
    file: File,
    mode: AccessMode,
    mapping: Mapping,
}

impl MappedFile {
    pub fn create(path: impl AsRef<Path>, bytes: &[u8]) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let mut file = create_file(&path)?;
        file.write_all(bytes)
            .map_err(|err| Error::io(err, &path))?;
        file.flush().map_err(|err| Error::io(err, &path))?;
        Self::mapped(path, file, AccessMode::ReadWrite)
    }

    pub fn create_zeroed(path: impl AsRef<Path>, len: u64) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = create_file(&path)?;
        file.set_len(len).map_err(|err| Error::io(err, &path))?;
        Self::mapped(path, file, AccessMode::ReadWrite)
    }

    pub fn open(path: impl AsRef<Path>, mode: AccessMode) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(mode.is_writable())
            .open(&path)
            .map_err(|err| Error::io(err, &path))?;
        Self::mapped(path, file, mode)
    }

    fn mapped(path: PathBuf, file: File, mode: AccessMode) -> Result<Self, Error> {
        let mut mapped = Self {
            path,
            file,
            mode,
            mapping: Mapping::Empty,
        };
        mapped.remap()?;
        Ok(mapped)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.mapping {
            Mapping::Empty => &[],
            Mapping::ReadOnly(map) => &map[..],
            Mapping::ReadWrite(map) => &map[..],
        }
    }

    pub fn bytes_mut(&mut self) -> Result<&mut [u8], Error> {
        match &mut self.mapping {
            Mapping::Empty => Ok(&mut []),
            Mapping::ReadOnly(_) => Err(Error::read_only(&self.path)),
            Mapping::ReadWrite(map) => Ok(&mut map[..]),
        }
    }

    pub fn typed<T: Pod>(&self) -> Result<&[T], Error> {
        let bytes = self.bytes();
        if bytes.is_empty() {
            return Ok(&[]);
        }
        bytemuck::try_cast_slice(bytes).map_err(|err| {
            Error::new(ErrorKind::Format)
                .with_message(format!("data buffer cannot be viewed as elements: {err:?}"))
                .with_path(&self.path)
        })
    }

    pub fn typed_mut<T: Pod>(&mut self) -> Result<&mut [T], Error> {
        let path = self.path.clone();
        let bytes = self.bytes_mut()?;
        if bytes.is_empty() {
            return Ok(&mut []);
        }
        bytemuck::try_cast_slice_mut(bytes).map_err(|err| {
            Error::new(ErrorKind::Format)
                .with_message(format!("data buffer cannot be viewed as elements: {err:?}"))
                .with_path(path)
        })
    }

    /// Appends `bytes` at the end of the file and remaps it.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if !self.mode.is_writable() {
            return Err(Error::read_only(&self.path));
        }
        if bytes.is_empty() {
            return Ok(());
        }
        self.mapping = Mapping::Empty;
        {
            let _lock = append_lock(&self.file, &self.path)?;
            let mut file = &self.file;
            file.seek(SeekFrom::End(0))
                .map_err(|err| Error::io(err, &self.path))?;
            file.write_all(bytes)
                .map_err(|err| Error::io(err, &self.path))?;
            file.flush().map_err(|err| Error::io(err, &self.path))?;
        }
        self.remap()
    }

    /// Replaces the whole file content and remaps it.
    pub fn rewrite(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if !self.mode.is_writable() {
            return Err(Error::read_only(&self.path));
        }
        self.mapping = Mapping::Empty;
        {
            let _lock = append_lock(&self.file, &self.path)?;
            let mut file = &self.file;
            file.set_len(0).map_err(|err| Error::io(err, &self.path))?;
            file.seek(SeekFrom::Start(0))
                .map_err(|err| Error::io(err, &self.path))?;
            file.write_all(bytes)
                .map_err(|err| Error::io(err, &self.path))?;
            file.flush().map_err(|err| Error::io(err, &self.path))?;
        }
        self.remap()
    }

    pub fn flush(&self) -> Result<(), Error> {
        match &self.mapping {
            Mapping::ReadWrite(map) => map.flush().map_err(|err| Error::io(err, &self.path)),
            _ => Ok(()),
        }
    }

    fn remap(&mut self) -> Result<(), Error> {
        let len = self
            .file
            .metadata()
            .map(|meta| meta.len())
            .map_err(|err| Error::io(err, &self.path))?;
        if len == 0 {
            self.mapping = Mapping::Empty;
            return Ok(());
        }
        self.mapping = match self.mode {
            AccessMode::ReadOnly => {
                let map =
                    unsafe { Mmap::map(&self.file).map_err(|err| Error::io(err, &self.path))? };
                Mapping::ReadOnly(map)
            }
            AccessMode::ReadWrite => {
                let map = unsafe {
                    MmapMut::map_mut(&self.file).map_err(|err| Error::io(err, &self.path))?
                };
                Mapping::ReadWrite(map)
            }
        };
        tracing::debug!(path = %self.path.display(), len, "mapped data file");
        Ok(())
    }
}

fn create_file(path: &Path) -> Result<File, Error> {
    OpenOptions::new()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|err| Error::io(err, path))
}

struct AppendLock<'a> {
    file: &'a File,
}

impl<'a> Drop for AppendLock<'a> {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn append_lock<'a>(file: &'a File, path: &Path) -> Result<AppendLock<'a>, Error> {
    file.lock_exclusive().map_err(|err| Error::io(err, path))?;
    Ok(AppendLock { file })
}

#[cfg(test)]
mod tests {
    use super::{AccessMode, MappedFile};
    use crate::core::error::ErrorKind;

    #[test]
    fn create_append_and_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.ninja");
        let mut mapped = MappedFile::create(&path, &[1, 2, 3]).expect("create");
        assert_eq!(mapped.bytes(), &[1, 2, 3]);

        mapped.append(&[4, 5]).expect("append");
        assert_eq!(mapped.bytes(), &[1, 2, 3, 4, 5]);

        let reopened = MappedFile::open(&path, AccessMode::ReadOnly).expect("open");
        assert_eq!(reopened.bytes(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn empty_file_maps_to_empty_slice_and_grows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.ninja");
        let mut mapped = MappedFile::create(&path, &[]).expect("create");
        assert!(mapped.is_empty());
        assert!(mapped.typed::<i64>().expect("typed").is_empty());

        mapped.append(&7i64.to_le_bytes()).expect("append");
        assert_eq!(mapped.typed::<i64>().expect("typed"), &[7]);
    }

    #[test]
    fn zeroed_file_is_writable_through_map() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.ninja");
        let mut mapped = MappedFile::create_zeroed(&path, 16).expect("create");
        mapped.typed_mut::<i32>().expect("typed")[2] = -9;
        mapped.flush().expect("flush");
        drop(mapped);

        let reopened = MappedFile::open(&path, AccessMode::ReadOnly).expect("open");
        assert_eq!(reopened.typed::<i32>().expect("typed"), &[0, 0, -9, 0]);
    }

    #[test]
    fn read_only_map_rejects_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.ninja");
        MappedFile::create(&path, &[1, 2]).expect("create");

        let mut mapped = MappedFile::open(&path, AccessMode::ReadOnly).expect("open");
        let err = mapped.bytes_mut().expect_err("read-only");
        assert_eq!(err.kind(), ErrorKind::Permission);
        let err = mapped.append(&[3]).expect_err("read-only");
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert_eq!(mapped.bytes(), &[1, 2]);
    }

    #[test]
    fn rewrite_replaces_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.ninja");
        let mut mapped = MappedFile::create(&path, &[1, 2, 3, 4]).expect("create");
        mapped.rewrite(&[9, 8]).expect("rewrite");
        assert_eq!(mapped.bytes(), &[9, 8]);
    }

    #[test]
    fn misaligned_length_is_a_format_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.ninja");
        let mapped = MappedFile::create(&path, &[1, 2, 3]).expect("create");
        let err = mapped.typed::<i64>().expect_err("3 bytes are not an i64");
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}
