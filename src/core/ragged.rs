//! Purpose: Persist a sequence of arrays of arbitrary shape and rank in one flat buffer.
//! Exports: `RaggedArrayStore`, `Sample`, `ShapeTable`, `InPlaceTransformed`.
//! Role: Core store; the shape table reuses `FixedArrayStore` or, for mixed ranks, itself.
//! Invariants: starts, ends, flattened_shapes and shapes have equal length n.
//! Invariants: The buffer holds exactly ends[n-1] elements; spans are contiguous and gap-free.
//! Invariants: `shapes_are_flat` is fixed at creation and never changes.
//! Invariants: Rank-0 elements are stored with shape [0] and exactly one value.
use std::ops::{Range, RangeBounds};
use std::path::{Path, PathBuf};

use ndarray::{Array, Array2, ArrayD, ArrayViewD, ArrayViewMutD, Dimension, IxDyn};

use crate::core::codec;
use crate::core::dtype::{DType, Element};
use crate::core::error::{Error, ErrorKind};
use crate::core::fixed::{self, FixedArrayStore};
use crate::core::format::{
    SHAPES_ARE_FLAT_FILE, StoreInfo, StoreKeys, StoreKind, TYPE_FILE, read_store_kind,
};
use crate::core::read::{StoreRead, resolve_range};
use crate::core::region::AccessMode;

/// One element read back from a ragged store.
#[derive(Clone, Debug, PartialEq)]
pub enum Sample<T> {
    Scalar(T),
    Array(ArrayD<T>),
}

impl<T: Element> Sample<T> {
    pub fn as_scalar(&self) -> Option<T> {
        match self {
            Sample::Scalar(value) => Some(*value),
            Sample::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayD<T>> {
        match self {
            Sample::Scalar(_) => None,
            Sample::Array(array) => Some(array),
        }
    }

    /// Converts to an array; a scalar becomes a zero-dimensional array.
    pub fn into_array(self) -> ArrayD<T> {
        match self {
            Sample::Scalar(value) => ArrayD::from_elem(IxDyn(&[]), value),
            Sample::Array(array) => array,
        }
    }

    pub fn ndim(&self) -> usize {
        match self {
            Sample::Scalar(_) => 0,
            Sample::Array(array) => array.ndim(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Sample::Scalar(_) => &[],
            Sample::Array(array) => array.shape(),
        }
    }

    /// Number of values, i.e. the flattened length.
    pub fn len(&self) -> usize {
        match self {
            Sample::Scalar(_) => 1,
            Sample::Array(array) => array.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values in row-major order.
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            Sample::Scalar(value) => vec![*value],
            Sample::Array(array) => array.iter().copied().collect(),
        }
    }

    fn stored_shape(&self) -> Vec<u64> {
        match self {
            Sample::Array(array) if array.ndim() > 0 => {
                array.shape().iter().map(|&dim| dim as u64).collect()
            }
            _ => vec![0],
        }
    }
}

impl<T> From<T> for Sample<T> {
    fn from(value: T) -> Self {
        Sample::Scalar(value)
    }
}

impl<T> From<Vec<T>> for Sample<T> {
    fn from(values: Vec<T>) -> Self {
        Sample::Array(Array::from(values).into_dyn())
    }
}

impl<T, D: Dimension> From<Array<T, D>> for Sample<T> {
    fn from(array: Array<T, D>) -> Self {
        Sample::Array(array.into_dyn())
    }
}

/// A batch of samples raveled into one buffer, with per-sample counts and shapes.
struct PackedBatch<T> {
    buffer: Vec<T>,
    counts: Vec<i64>,
    shapes: Vec<Vec<u64>>,
}

impl<T: Element> PackedBatch<T> {
    fn pack(samples: &[Sample<T>]) -> Self {
        let mut batch = PackedBatch {
            buffer: Vec::new(),
            counts: Vec::with_capacity(samples.len()),
            shapes: Vec::with_capacity(samples.len()),
        };
        for sample in samples {
            let values = sample.to_vec();
            batch.counts.push(values.len() as i64);
            batch.shapes.push(sample.stored_shape());
            batch.buffer.extend(values);
        }
        batch
    }

    fn len(&self) -> usize {
        self.counts.len()
    }

    /// Start and end offsets of every sample, relative to `base`.
    fn spans(&self, base: i64) -> (Vec<i64>, Vec<i64>) {
        let mut starts = Vec::with_capacity(self.len());
        let mut ends = Vec::with_capacity(self.len());
        let mut offset = base;
        for count in &self.counts {
            starts.push(offset);
            offset += count;
            ends.push(offset);
        }
        (starts, ends)
    }

    fn shapes_are_flat(&self) -> bool {
        self.shapes.iter().all(|shape| shape.len() <= 1)
    }
}

/// Per-element shapes of a ragged store.
///
/// `Flat` is an (n, 1) table used when every element has rank <= 1. `Nested`
/// stores each shape as an integer sequence in another ragged store.
pub enum ShapeTable {
    Flat(FixedArrayStore<i64>),
    Nested(Box<RaggedArrayStore<i64>>),
}

impl ShapeTable {
    fn create(dir: &Path, shapes: &[Vec<u64>], flat: bool) -> Result<Self, Error> {
        if flat {
            let rows = flat_rows(shapes, dir)?;
            let table = FixedArrayStore::from_array(dir, &rows)?;
            return Ok(ShapeTable::Flat(table));
        }
        let samples = shape_samples(shapes);
        let nested = RaggedArrayStore::<i64>::create_packed(
            dir,
            StoreKeys::default(),
            PackedBatch::pack(&samples),
        )?;
        Ok(ShapeTable::Nested(Box::new(nested)))
    }

    fn open(dir: &Path, flat: bool, mode: AccessMode) -> Result<Self, Error> {
        if flat {
            let table = FixedArrayStore::<i64>::open(dir, mode)?;
            if table.element_shape() != [1] {
                return Err(Error::new(ErrorKind::Format)
                    .with_message(format!(
                        "flat shape table has shape {:?}, expected (n, 1)",
                        table.shape()
                    ))
                    .with_path(dir));
            }
            return Ok(ShapeTable::Flat(table));
        }
        let nested = RaggedArrayStore::<i64>::open(dir, mode)?;
        if !nested.is_initialized() {
            return Err(Error::new(ErrorKind::Format)
                .with_message("nested shape table is missing")
                .with_path(dir));
        }
        Ok(ShapeTable::Nested(Box::new(nested)))
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, ShapeTable::Flat(_))
    }

    pub fn len(&self) -> usize {
        match self {
            ShapeTable::Flat(table) => table.len(),
            ShapeTable::Nested(table) => table.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored shape of element `index`; rank-0 elements report `[0]`.
    pub fn shape(&self, index: usize) -> Result<Vec<u64>, Error> {
        let (dims, dir) = match self {
            ShapeTable::Flat(table) => {
                // One column, so row i is value i in either order.
                let dim = table.as_slice()?.get(index).copied().ok_or_else(|| {
                    Error::out_of_range(index as u64, table.len()).with_path(table.dir())
                })?;
                (vec![dim], table.dir())
            }
            ShapeTable::Nested(table) => (table.get(index)?.to_vec(), table.dir()),
        };
        dims.into_iter()
            .map(|dim| {
                u64::try_from(dim).map_err(|_| {
                    Error::new(ErrorKind::Format)
                        .with_message(format!("negative dimension {dim} in shape table"))
                        .with_path(dir)
                        .with_index(index as u64)
                })
            })
            .collect()
    }

    fn check_accepts(&self, shapes: &[Vec<u64>]) -> Result<(), Error> {
        if let ShapeTable::Flat(table) = self {
            if let Some(position) = shapes.iter().position(|shape| shape.len() > 1) {
                return Err(Error::new(ErrorKind::ShapeMismatch)
                    .with_message(format!(
                        "store was created with flat shapes, cannot append element of rank {}",
                        shapes[position].len()
                    ))
                    .with_path(table.dir()));
            }
        }
        Ok(())
    }

    fn extend(&mut self, shapes: &[Vec<u64>]) -> Result<(), Error> {
        match self {
            ShapeTable::Flat(table) => {
                let rows = flat_rows(shapes, table.dir())?;
                table.extend(rows.into_dyn().view())
            }
            ShapeTable::Nested(table) => table.extend(shape_samples(shapes)),
        }
    }

    fn flush(&self) -> Result<(), Error> {
        match self {
            ShapeTable::Flat(table) => table.flush(),
            ShapeTable::Nested(table) => table.flush(),
        }
    }
}

fn flat_rows(shapes: &[Vec<u64>], dir: &Path) -> Result<Array2<i64>, Error> {
    let dims: Vec<i64> = shapes.iter().map(|shape| shape[0] as i64).collect();
    Array2::from_shape_vec((shapes.len(), 1), dims).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("cannot build shape table rows")
            .with_path(dir)
            .with_source(err)
    })
}

fn shape_samples(shapes: &[Vec<u64>]) -> Vec<Sample<i64>> {
    shapes
        .iter()
        .map(|shape| Sample::from(shape.iter().map(|&dim| dim as i64).collect::<Vec<_>>()))
        .collect()
}

struct Columns<T: Element> {
    buffer: FixedArrayStore<T>,
    starts: FixedArrayStore<i64>,
    ends: FixedArrayStore<i64>,
    flattened_shapes: FixedArrayStore<i64>,
    shapes: ShapeTable,
}

impl<T: Element> Columns<T> {
    fn open(dir: &Path, keys: &StoreKeys, mode: AccessMode) -> Result<Self, Error> {
        let flat = codec::read_int32(&dir.join(SHAPES_ARE_FLAT_FILE))? != 0;
        let columns = Columns {
            buffer: FixedArrayStore::open(dir, mode)?,
            starts: FixedArrayStore::open(dir.join(&keys.starts), mode)?,
            ends: FixedArrayStore::open(dir.join(&keys.ends), mode)?,
            flattened_shapes: FixedArrayStore::open(dir.join(&keys.flattened_shapes), mode)?,
            shapes: ShapeTable::open(&dir.join(&keys.shapes), flat, mode)?,
        };
        columns.check_consistency(dir)?;
        Ok(columns)
    }

    fn check_consistency(&self, dir: &Path) -> Result<(), Error> {
        for (name, rank) in [
            ("buffer", self.buffer.shape().len()),
            ("starts", self.starts.shape().len()),
            ("ends", self.ends.shape().len()),
            ("flattened_shapes", self.flattened_shapes.shape().len()),
        ] {
            if rank != 1 {
                return Err(Error::new(ErrorKind::Format)
                    .with_message(format!("{name} must be one-dimensional"))
                    .with_path(dir));
            }
        }
        let n = self.starts.len();
        if self.ends.len() != n || self.flattened_shapes.len() != n || self.shapes.len() != n {
            return Err(Error::new(ErrorKind::Format)
                .with_message(format!(
                    "index arrays disagree in length: \
                     starts {n}, ends {}, flattened_shapes {}, shapes {}",
                    self.ends.len(),
                    self.flattened_shapes.len(),
                    self.shapes.len()
                ))
                .with_path(dir));
        }
        let expected = match n {
            0 => 0,
            _ => self.ends.value(n - 1)?,
        };
        if expected != self.buffer.len() as i64 {
            return Err(Error::new(ErrorKind::Format)
                .with_message(format!(
                    "buffer holds {} elements, index arrays end at {expected}",
                    self.buffer.len()
                ))
                .with_path(dir));
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.starts.len()
    }

    /// Buffer span and stored shape of element `index`.
    fn locate(&self, index: usize, dir: &Path) -> Result<(Range<usize>, Vec<u64>), Error> {
        if index >= self.len() {
            return Err(Error::out_of_range(index as u64, self.len()).with_path(dir));
        }
        let start = self.starts.value(index)?;
        let end = self.ends.value(index)?;
        let buffer_len = self.buffer.len() as i64;
        if start < 0 || start > end || end > buffer_len {
            return Err(Error::new(ErrorKind::Format)
                .with_message(format!(
                    "span {start}..{end} lies outside buffer of {buffer_len} elements"
                ))
                .with_path(dir)
                .with_index(index as u64));
        }
        let shape = self.shapes.shape(index)?;
        Ok((start as usize..end as usize, shape))
    }

    fn append(&mut self, batch: PackedBatch<T>) -> Result<(), Error> {
        self.shapes.check_accepts(&batch.shapes)?;
        let base = self.buffer.len() as i64;
        let (starts, ends) = batch.spans(base);
        self.buffer.extend_from_slice(&batch.buffer)?;
        self.starts.extend_from_slice(&starts)?;
        self.ends.extend_from_slice(&ends)?;
        self.flattened_shapes.extend_from_slice(&batch.counts)?;
        self.shapes.extend(&batch.shapes)
    }

    fn flush(&self) -> Result<(), Error> {
        self.buffer.flush()?;
        self.starts.flush()?;
        self.ends.flush()?;
        self.flattened_shapes.flush()?;
        self.shapes.flush()
    }
}

/// A growable store of arrays with heterogeneous shapes.
///
/// A store opened on an empty directory is uninitialized: it has length 0 and
/// the first non-empty `extend` creates every file, fixing the shape mode.
pub struct RaggedArrayStore<T: Element> {
    dir: PathBuf,
    mode: AccessMode,
    keys: StoreKeys,
    columns: Option<Columns<T>>,
}

impl<T: Element> RaggedArrayStore<T> {
    pub fn from_elements<S>(
        dir: impl AsRef<Path>,
        elements: impl IntoIterator<Item = S>,
    ) -> Result<Self, Error>
    where
        S: Into<Sample<T>>,
    {
        Self::from_elements_with_keys(dir, StoreKeys::default(), elements)
    }

    pub fn from_elements_with_keys<S>(
        dir: impl AsRef<Path>,
        keys: StoreKeys,
        elements: impl IntoIterator<Item = S>,
    ) -> Result<Self, Error>
    where
        S: Into<Sample<T>>,
    {
        let samples: Vec<Sample<T>> = elements.into_iter().map(Into::into).collect();
        Self::create_packed(dir.as_ref(), keys, PackedBatch::pack(&samples))
    }

    // An empty batch leaves the store uninitialized so the first real
    // elements still decide the shape mode.
    fn create_packed(dir: &Path, keys: StoreKeys, batch: PackedBatch<T>) -> Result<Self, Error> {
        let columns = if batch.len() == 0 {
            fixed::create_dir(dir)?;
            None
        } else {
            Some(Columns::create(dir, &keys, batch)?)
        };
        Ok(Self {
            dir: dir.to_path_buf(),
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
            None => {
                if mode.is_writable() {
                    fixed::create_dir(&dir)?;
                } else if !dir.is_dir() {
                    return Err(Error::new(ErrorKind::NotFound)
                        .with_message("store directory does not exist")
                        .with_path(&dir));
                }
                None
            }
            Some(StoreKind::Ragged) => Some(Columns::open(&dir, &keys, mode)?),
            Some(other) => {
                return Err(Error::new(ErrorKind::Format)
                    .with_message(format!("directory holds a {other} store, not a ragged store"))
                    .with_path(&dir));
            }
        };
        tracing::debug!(
            dir = %dir.display(),
            initialized = columns.is_some(),
            len = columns.as_ref().map_or(0, Columns::len),
            "opened ragged store"
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

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    pub fn is_initialized(&self) -> bool {
        self.columns.is_some()
    }

    /// `None` until the first batch fixes the shape mode.
    pub fn shapes_are_flat(&self) -> Option<bool> {
        self.columns.as_ref().map(|columns| columns.shapes.is_flat())
    }

    pub fn shape_table(&self) -> Option<&ShapeTable> {
        self.columns.as_ref().map(|columns| &columns.shapes)
    }

    pub fn len(&self) -> usize {
        self.columns.as_ref().map_or(0, Columns::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an owned copy of element `index`.
    pub fn get(&self, index: usize) -> Result<Sample<T>, Error> {
        self.sample(index)
    }

    /// Stored shape of element `index`.
    pub fn element_shape(&self, index: usize) -> Result<Vec<u64>, Error> {
        let (_, shape) = self.populated(index)?.locate(index, &self.dir)?;
        Ok(shape)
    }

    /// Zero-copy view of element `index`. Scalars are viewed as zero-dimensional arrays.
    pub fn view(&self, index: usize) -> Result<ArrayViewD<'_, T>, Error> {
        let columns = self.populated(index)?;
        let (span, shape) = columns.locate(index, &self.dir)?;
        let values = &columns.buffer.as_slice()?[span];
        let dims = view_dims(&shape, values.len());
        ArrayViewD::from_shape(IxDyn(&dims), values)
            .map_err(|err| self.shape_error(index, &shape, err))
    }

    pub fn view_mut(&mut self, index: usize) -> Result<ArrayViewMutD<'_, T>, Error> {
        if !self.mode.is_writable() {
            return Err(Error::read_only(&self.dir));
        }
        let (span, shape) = self.populated(index)?.locate(index, &self.dir)?;
        let dims = view_dims(&shape, span.len());
        let dir = self.dir.clone();
        let columns = self.populated_mut(index)?;
        let values = &mut columns.buffer.as_mut_slice()?[span];
        ArrayViewMutD::from_shape(IxDyn(&dims), values).map_err(|err| {
            Error::new(ErrorKind::Format)
                .with_message(format!("stored shape {shape:?} does not fit the element span"))
                .with_path(dir)
                .with_index(index as u64)
                .with_source(err)
        })
    }

    /// Overwrites element `index` in place. The flattened length must match;
    /// the stored shape is left unchanged.
    pub fn set(&mut self, index: usize, value: impl Into<Sample<T>>) -> Result<(), Error> {
        if !self.mode.is_writable() {
            return Err(Error::read_only(&self.dir));
        }
        let value = value.into();
        let (span, _) = self.populated(index)?.locate(index, &self.dir)?;
        self.check_span(index, &span, &value)?;
        self.write_span(index, span, &value)
    }

    /// Overwrites every element of `range` in place. Nothing is written unless
    /// all values fit their spans.
    pub fn set_range<S>(
        &mut self,
        range: impl RangeBounds<usize>,
        values: impl IntoIterator<Item = S>,
    ) -> Result<(), Error>
    where
        S: Into<Sample<T>>,
    {
        if !self.mode.is_writable() {
            return Err(Error::read_only(&self.dir));
        }
        let indices = resolve_range(range, self.len());
        let values: Vec<Sample<T>> = values.into_iter().map(Into::into).collect();
        if values.len() != indices.len() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "{} values supplied for {} elements",
                    values.len(),
                    indices.len()
                ))
                .with_path(&self.dir));
        }
        let mut spans = Vec::with_capacity(values.len());
        for (index, value) in indices.clone().zip(&values) {
            let (span, _) = self.populated(index)?.locate(index, &self.dir)?;
            self.check_span(index, &span, value)?;
            spans.push(span);
        }
        for ((index, span), value) in indices.zip(spans).zip(&values) {
            self.write_span(index, span, value)?;
        }
        Ok(())
    }

    /// Appends elements. On an uninitialized store this creates it.
    pub fn extend<S>(&mut self, elements: impl IntoIterator<Item = S>) -> Result<(), Error>
    where
        S: Into<Sample<T>>,
    {
        if !self.mode.is_writable() {
            return Err(Error::read_only(&self.dir));
        }
        let samples: Vec<Sample<T>> = elements.into_iter().map(Into::into).collect();
        if samples.is_empty() {
            return Ok(());
        }
        let batch = PackedBatch::pack(&samples);
        let added = batch.len();
        if let Some(columns) = self.columns.as_mut() {
            columns.append(batch)?;
        } else {
            self.columns = Some(Columns::create(&self.dir, &self.keys, batch)?);
        }
        tracing::debug!(
            dir = %self.dir.display(),
            added,
            len = self.len(),
            "extended ragged store"
        );
        Ok(())
    }

    pub fn append(&mut self, element: impl Into<Sample<T>>) -> Result<(), Error> {
        self.extend([element.into()])
    }

    /// Applies `transform` to a mutable view of each element read through the
    /// returned handle. The transform works on the mapping itself, so changes
    /// it makes are persisted.
    pub fn with_transform_in_place<F, R>(&mut self, transform: F) -> InPlaceTransformed<'_, T, F>
    where
        F: FnMut(ArrayViewMutD<'_, T>) -> R,
    {
        InPlaceTransformed {
            store: self,
            transform,
        }
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
            kind: StoreKind::Ragged,
            dtype: Some(T::DTYPE),
            len: self.len(),
            shape: None,
            order: None,
            data_bytes: self
                .columns
                .as_ref()
                .map_or(0, |columns| (columns.buffer.len() * T::DTYPE.size()) as u64),
            shapes_are_flat: self.shapes_are_flat(),
        }
    }

    fn sample(&self, index: usize) -> Result<Sample<T>, Error> {
        let columns = self.populated(index)?;
        let (span, shape) = columns.locate(index, &self.dir)?;
        let values = &columns.buffer.as_slice()?[span];
        // Applies to nested tables too: a `[0]` shape over one value is always a scalar.
        if shape == [0] && values.len() == 1 {
            return Ok(Sample::Scalar(values[0]));
        }
        let dims: Vec<usize> = shape.iter().map(|&dim| dim as usize).collect();
        ArrayD::from_shape_vec(IxDyn(&dims), values.to_vec())
            .map(Sample::Array)
            .map_err(|err| self.shape_error(index, &shape, err))
    }

    fn populated(&self, index: usize) -> Result<&Columns<T>, Error> {
        self.columns.as_ref().ok_or_else(|| {
            Error::out_of_range(index as u64, 0)
                .with_message("store is empty")
                .with_path(&self.dir)
        })
    }

    fn populated_mut(&mut self, index: usize) -> Result<&mut Columns<T>, Error> {
        let dir = &self.dir;
        self.columns.as_mut().ok_or_else(|| {
            Error::out_of_range(index as u64, 0)
                .with_message("store is empty")
                .with_path(dir)
        })
    }

    fn check_span(
        &self,
        index: usize,
        span: &Range<usize>,
        value: &Sample<T>,
    ) -> Result<(), Error> {
        if value.len() != span.len() {
            return Err(Error::new(ErrorKind::ShapeMismatch)
                .with_message(format!(
                    "value holds {} elements, stored element holds {}",
                    value.len(),
                    span.len()
                ))
                .with_path(&self.dir)
                .with_index(index as u64));
        }
        Ok(())
    }

    fn write_span(
        &mut self,
        index: usize,
        span: Range<usize>,
        value: &Sample<T>,
    ) -> Result<(), Error> {
        let columns = self.populated_mut(index)?;
        columns.buffer.as_mut_slice()?[span].copy_from_slice(&value.to_vec());
        Ok(())
    }

    fn shape_error(&self, index: usize, shape: &[u64], err: ndarray::ShapeError) -> Error {
        Error::new(ErrorKind::Format)
            .with_message(format!("stored shape {shape:?} does not fit the element span"))
            .with_path(&self.dir)
            .with_index(index as u64)
            .with_source(err)
    }
}

impl<T: Element> Columns<T> {
    // Index arrays and shape table first, then the buffer, then the type tag.
    fn create(dir: &Path, keys: &StoreKeys, batch: PackedBatch<T>) -> Result<Self, Error> {
        fixed::create_dir(dir)?;
        let (starts, ends) = batch.spans(0);
        let flat = batch.shapes_are_flat();
        let starts = FixedArrayStore::from_slice(dir.join(&keys.starts), &starts)?;
        let ends = FixedArrayStore::from_slice(dir.join(&keys.ends), &ends)?;
        codec::write_int32(&dir.join(SHAPES_ARE_FLAT_FILE), i32::from(flat))?;
        let shapes = ShapeTable::create(&dir.join(&keys.shapes), &batch.shapes, flat)?;
        let flattened_shapes =
            FixedArrayStore::from_slice(dir.join(&keys.flattened_shapes), &batch.counts)?;
        let buffer = FixedArrayStore::from_slice(dir, &batch.buffer)?;
        codec::write_str(&dir.join(TYPE_FILE), StoreKind::Ragged.tag())?;
        tracing::debug!(
            dir = %dir.display(),
            dtype = T::DTYPE.name(),
            len = batch.len(),
            shapes_are_flat = flat,
            "created ragged store"
        );
        Ok(Columns {
            buffer,
            starts,
            ends,
            flattened_shapes,
            shapes,
        })
    }
}

/// Handle returned by `RaggedArrayStore::with_transform_in_place`.
pub struct InPlaceTransformed<'a, T: Element, F> {
    store: &'a mut RaggedArrayStore<T>,
    transform: F,
}

impl<'a, T: Element, F> InPlaceTransformed<'a, T, F> {
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn get<R>(&mut self, index: usize) -> Result<R, Error>
    where
        F: FnMut(ArrayViewMutD<'_, T>) -> R,
    {
        let view = self.store.view_mut(index)?;
        Ok((self.transform)(view))
    }
}

impl<T: Element> StoreRead for RaggedArrayStore<T> {
    type Item = Sample<T>;

    fn len(&self) -> usize {
        RaggedArrayStore::len(self)
    }

    fn get(&self, index: usize) -> Result<Sample<T>, Error> {
        self.sample(index)
    }
}

fn view_dims(shape: &[u64], count: usize) -> Vec<usize> {
    if shape == [0] && count == 1 {
        return Vec::new();
    }
    shape.iter().map(|&dim| dim as usize).collect()
}
