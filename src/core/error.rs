// Store error taxonomy shared by every store kind, plus OS error classification.
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::PathBuf;

use libc::{EACCES, EPERM, EROFS};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    NotFound,
    Permission,
    Format,
    ShapeMismatch,
    IndexOutOfRange,
    UnknownTypeTag,
    Io,
}

impl ErrorKind {
    pub fn describe(self) -> &'static str {
        match self {
            ErrorKind::Internal => "internal error",
            ErrorKind::Usage => "invalid usage",
            ErrorKind::NotFound => "not found",
            ErrorKind::Permission => "permission denied",
            ErrorKind::Format => "malformed store",
            ErrorKind::ShapeMismatch => "shape mismatch",
            ErrorKind::IndexOutOfRange => "index out of range",
            ErrorKind::UnknownTypeTag => "unknown store type",
            ErrorKind::Io => "i/o error",
        }
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    path: Option<PathBuf>,
    index: Option<u64>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            path: None,
            index: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        self.path.as_deref()
    }

    pub fn index(&self) -> Option<u64> {
        self.index
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub(crate) fn io(err: io::Error, path: impl Into<PathBuf>) -> Self {
        Error::new(io_error_kind(&err))
            .with_path(path)
            .with_source(err)
    }

    pub(crate) fn read_only(path: impl Into<PathBuf>) -> Self {
        Error::new(ErrorKind::Permission)
            .with_message("store was opened read-only")
            .with_path(path)
    }

    pub(crate) fn out_of_range(index: u64, len: usize) -> Self {
        Error::new(ErrorKind::IndexOutOfRange)
            .with_message(format!("index out of range for store of length {len}"))
            .with_index(index)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.describe())?;
        if let Some(index) = self.index {
            write!(f, " at index {index}")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        match &self.path {
            Some(path) => write!(f, " [{}]", path.display()),
            None => Ok(()),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub(crate) fn io_error_kind(err: &io::Error) -> ErrorKind {
    if let Some(EACCES | EPERM | EROFS) = err.raw_os_error() {
        return ErrorKind::Permission;
    }
    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, io_error_kind};

    #[test]
    fn os_errors_map_to_expected_kinds() {
        let err = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(io_error_kind(&err), ErrorKind::Permission);

        let err = std::io::Error::from_raw_os_error(libc::EPERM);
        assert_eq!(io_error_kind(&err), ErrorKind::Permission);

        let err = std::io::Error::from_raw_os_error(libc::EROFS);
        assert_eq!(io_error_kind(&err), ErrorKind::Permission);

        let err = std::io::Error::from_raw_os_error(libc::ENOENT);
        assert_eq!(io_error_kind(&err), ErrorKind::NotFound);

        let err = std::io::Error::from_raw_os_error(libc::EBADF);
        assert_eq!(io_error_kind(&err), ErrorKind::Io);
    }

    #[test]
    fn display_includes_context() {
        let err = Error::new(ErrorKind::IndexOutOfRange)
            .with_message("empty store")
            .with_path("/tmp/store")
            .with_index(3);
        let text = err.to_string();
        assert_eq!(text, "index out of range at index 3: empty store [/tmp/store]");
    }
}
