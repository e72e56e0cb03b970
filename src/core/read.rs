// Element-wise read access shared by store kinds, plus post-read transforms.
use std::ops::{Bound, Range, RangeBounds};

use crate::core::error::{Error, ErrorKind};

/// Random access to the elements of a store.
///
/// Implementors return owned values, so callers never hold views into a
/// mapping that a later `extend` replaces.
pub trait StoreRead {
    type Item;

    fn len(&self) -> usize;

    fn get(&self, index: usize) -> Result<Self::Item, Error>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Like `get`, but negative indices count back from the end.
    fn get_signed(&self, index: isize) -> Result<Self::Item, Error> {
        let resolved = resolve_signed(index, self.len())?;
        self.get(resolved)
    }

    /// Returns one result per index of `range`, in order. Bounds past the end are clamped.
    fn get_range(&self, range: impl RangeBounds<usize>) -> Result<Vec<Self::Item>, Error>
    where
        Self: Sized,
    {
        resolve_range(range, self.len())
            .map(|index| self.get(index))
            .collect()
    }

    fn get_many(&self, indices: &[usize]) -> Result<Vec<Self::Item>, Error> {
        indices.iter().map(|&index| self.get(index)).collect()
    }

    /// Wraps the store so every read is passed through `transform`.
    fn with_transform<F, R>(&self, transform: F) -> Transformed<'_, Self, F>
    where
        Self: Sized,
        F: Fn(Self::Item) -> R,
    {
        Transformed {
            store: self,
            transform,
        }
    }
}

/// Read-side view applying a transform to an owned copy of each element.
pub struct Transformed<'a, S, F> {
    store: &'a S,
    transform: F,
}

impl<'a, S, F, R> StoreRead for Transformed<'a, S, F>
where
    S: StoreRead,
    F: Fn(S::Item) -> R,
{
    type Item = R;

    fn len(&self) -> usize {
        self.store.len()
    }

    fn get(&self, index: usize) -> Result<R, Error> {
        let value = self.store.get(index)?;
        Ok((self.transform)(value))
    }
}

pub(crate) fn resolve_signed(index: isize, len: usize) -> Result<usize, Error> {
    let resolved = if index < 0 {
        len.checked_sub(index.unsigned_abs())
    } else {
        Some(index as usize)
    };
    match resolved {
        Some(resolved) if resolved < len => Ok(resolved),
        _ => Err(Error::new(ErrorKind::IndexOutOfRange)
            .with_message(format!("index {index} out of range for store of length {len}"))),
    }
}

pub(crate) fn resolve_range(range: impl RangeBounds<usize>, len: usize) -> Range<usize> {
    let start = match range.start_bound() {
        Bound::Included(&start) => start,
        Bound::Excluded(&start) => start.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&end) => end.saturating_add(1),
        Bound::Excluded(&end) => end,
        Bound::Unbounded => len,
    };
    let end = end.min(len);
    start.min(end)..end
}
