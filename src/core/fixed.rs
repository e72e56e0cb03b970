//! Purpose: Persist a dense sequence of equal-shape arrays as one mapped data file.
//! Exports: `FixedArrayStore`.
//! Role: Leaf storage used directly and as the index/shape columns of ragged stores.
//! Invariants: `data.ninja` holds exactly product(shape) elements in the declared order.
//! Invariants: Growth only changes the leading dimension; trailing dimensions are fixed.
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use ndarray::{
    ArrayBase, ArrayD, ArrayView1, ArrayViewD, ArrayViewMutD, Axis, Data, Dimension, IxDyn,
    ShapeBuilder,
};

use crate::core::codec;
use crate::core::dtype::{DType, Element, MemoryOrder};
use crate::core::error::{Error, ErrorKind};
use crate::core::format::{
    DATA_FILE, DTYPE_FILE, ORDER_FILE, SHAPE_FILE, StoreInfo, StoreKind, TYPE_FILE,
};
use crate::core::read::StoreRead;
use crate::core::region::{AccessMode, MappedFile};

pub struct FixedArrayStore<T: Element> {
    dir: PathBuf,
    shape: Vec<u64>,
    order: MemoryOrder,
    data: MappedFile,
    _element: PhantomData<T>,
}

impl<T: Element> FixedArrayStore<T> {
    /// Creates a zero-filled store with the given shape.
    pub fn create(
        dir: impl AsRef<Path>,
        shape: &[u64],
        order: MemoryOrder,
    ) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        check_rank(shape, &dir)?;
        create_dir(&dir)?;
        let bytes = byte_len(shape, T::DTYPE.size()).ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("shape {shape:?} is too large to allocate"))
                .with_path(&dir)
        })?;
        let data = MappedFile::create_zeroed(dir.join(DATA_FILE), bytes as u64)?;
        write_metadata(&dir, T::DTYPE, shape, order)?;
        Ok(Self::assemble(dir, shape.to_vec(), order, data))
    }

    /// Creates a store holding a copy of `array`, keeping its memory order when
    /// it is column-major.
    pub fn from_array<S, D>(dir: impl AsRef<Path>, array: &ArrayBase<S, D>) -> Result<Self, Error>
    where
        S: Data<Elem = T>,
        D: Dimension,
    {
        let dir = dir.as_ref().to_path_buf();
        let shape: Vec<u64> = array.shape().iter().map(|&dim| dim as u64).collect();
        check_rank(&shape, &dir)?;
        let order = if !array.is_standard_layout() && array.t().is_standard_layout() {
            MemoryOrder::ColumnMajor
        } else {
            MemoryOrder::RowMajor
        };
        let bytes = match order {
            MemoryOrder::RowMajor => element_bytes(array.iter()),
            MemoryOrder::ColumnMajor => element_bytes(array.t().iter()),
        };
        Self::write_new(dir, shape, order, &bytes)
    }

    /// Creates a one-dimensional store from `values`.
    pub fn from_slice(dir: impl AsRef<Path>, values: &[T]) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        let shape = vec![values.len() as u64];
        Self::write_new(dir, shape, MemoryOrder::RowMajor, bytemuck::cast_slice(values))
    }

    fn write_new(
        dir: PathBuf,
        shape: Vec<u64>,
        order: MemoryOrder,
        bytes: &[u8],
    ) -> Result<Self, Error> {
        create_dir(&dir)?;
        let data = MappedFile::create(dir.join(DATA_FILE), bytes)?;
        write_metadata(&dir, T::DTYPE, &shape, order)?;
        tracing::debug!(
            dir = %dir.display(),
            dtype = T::DTYPE.name(),
            ?shape,
            "created fixed store"
        );
        Ok(Self::assemble(dir, shape, order, data))
    }

    /// Opens an existing store from its metadata alone.
    pub fn open(dir: impl AsRef<Path>, mode: AccessMode) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        let dtype_path = dir.join(DTYPE_FILE);
        let dtype_name = codec::read_str(&dtype_path).map_err(|err| missing_metadata(err, &dir))?;
        let dtype = DType::from_name(&dtype_name, &dtype_path)?;
        if dtype != T::DTYPE {
            return Err(Error::new(ErrorKind::Format)
                .with_message(format!("store holds {dtype}, requested {}", T::DTYPE))
                .with_path(&dir));
        }
        let shape =
            codec::read_shape(&dir.join(SHAPE_FILE)).map_err(|err| missing_metadata(err, &dir))?;
        if shape.is_empty() {
            return Err(Error::new(ErrorKind::Format)
                .with_message("stored shape has no dimensions")
                .with_path(&dir));
        }
        let order_path = dir.join(ORDER_FILE);
        let order_tag = codec::read_str(&order_path).map_err(|err| missing_metadata(err, &dir))?;
        let order = MemoryOrder::from_tag(&order_tag, &order_path)?;

        let data = MappedFile::open(dir.join(DATA_FILE), mode)
            .map_err(|err| missing_metadata(err, &dir))?;
        let expected = byte_len(&shape, T::DTYPE.size()).ok_or_else(|| {
            Error::new(ErrorKind::Format)
                .with_message(format!("stored shape {shape:?} overflows the address space"))
                .with_path(&dir)
        })?;
        if data.len() != expected {
            return Err(Error::new(ErrorKind::Format)
                .with_message(format!(
                    "data file holds {} bytes, shape {:?} requires {expected}",
                    data.len(),
                    shape
                ))
                .with_path(&dir));
        }
        Ok(Self::assemble(dir, shape, order, data))
    }

    fn assemble(dir: PathBuf, shape: Vec<u64>, order: MemoryOrder, data: MappedFile) -> Self {
        Self {
            dir,
            shape,
            order,
            data,
            _element: PhantomData,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn order(&self) -> MemoryOrder {
        self.order
    }

    pub fn mode(&self) -> AccessMode {
        self.data.mode()
    }

    pub fn len(&self) -> usize {
        self.shape[0] as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shape of one element, i.e. every dimension but the leading one.
    pub fn element_shape(&self) -> &[u64] {
        &self.shape[1..]
    }

    /// All elements in storage order.
    pub fn as_slice(&self) -> Result<&[T], Error> {
        self.data.typed()
    }

    pub fn as_mut_slice(&mut self) -> Result<&mut [T], Error> {
        if !self.mode().is_writable() {
            return Err(Error::read_only(&self.dir));
        }
        self.data.typed_mut()
    }

    pub fn view(&self) -> Result<ArrayViewD<'_, T>, Error> {
        let shape = self.ndarray_shape();
        let order = self.order;
        let values = self.as_slice()?;
        let view = match order {
            MemoryOrder::RowMajor => ArrayViewD::from_shape(shape, values),
            MemoryOrder::ColumnMajor => ArrayViewD::from_shape(shape.f(), values),
        };
        view.map_err(|err| Error::new(ErrorKind::Format).with_source(err).with_path(&self.dir))
    }

    pub fn view_mut(&mut self) -> Result<ArrayViewMutD<'_, T>, Error> {
        let shape = self.ndarray_shape();
        let order = self.order;
        let dir = self.dir.clone();
        let values = self.data.typed_mut()?;
        let view = match order {
            MemoryOrder::RowMajor => ArrayViewMutD::from_shape(shape, values),
            MemoryOrder::ColumnMajor => ArrayViewMutD::from_shape(shape.f(), values),
        };
        view.map_err(|err| Error::new(ErrorKind::Format).with_source(err).with_path(dir))
    }

    /// Returns a copy of element `index`.
    pub fn get(&self, index: usize) -> Result<ArrayD<T>, Error> {
        self.check_index(index)?;
        Ok(self.view()?.index_axis(Axis(0), index).to_owned())
    }

    /// Returns the scalar at `index` of a one-dimensional store.
    pub fn value(&self, index: usize) -> Result<T, Error> {
        if self.shape.len() != 1 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("scalar access requires a one-dimensional store")
                .with_path(&self.dir));
        }
        self.check_index(index)?;
        Ok(self.as_slice()?[index])
    }

    pub fn set(&mut self, index: usize, element: ArrayViewD<'_, T>) -> Result<(), Error> {
        if !self.mode().is_writable() {
            return Err(Error::read_only(&self.dir));
        }
        self.check_index(index)?;
        if element.shape() != self.element_dims().as_slice() {
            return Err(Error::new(ErrorKind::ShapeMismatch)
                .with_message(format!(
                    "element shape {:?} does not match store element shape {:?}",
                    element.shape(),
                    self.element_shape()
                ))
                .with_index(index as u64));
        }
        self.view_mut()?
            .index_axis_mut(Axis(0), index)
            .assign(&element);
        Ok(())
    }

    /// Appends a batch whose trailing dimensions match the store's.
    pub fn extend(&mut self, batch: ArrayViewD<'_, T>) -> Result<(), Error> {
        if !self.mode().is_writable() {
            return Err(Error::read_only(&self.dir));
        }
        if batch.ndim() != self.shape.len()
            || &batch.shape()[1..] != self.element_dims().as_slice()
        {
            return Err(Error::new(ErrorKind::ShapeMismatch)
                .with_message(format!(
                    "trying to append samples with shape {:?}, expected trailing shape {:?}",
                    &batch.shape()[1.min(batch.ndim())..],
                    self.element_shape()
                ))
                .with_path(&self.dir));
        }
        let added = batch.len_of(Axis(0));
        if added == 0 {
            return Ok(());
        }

        match self.order {
            MemoryOrder::RowMajor => {
                let bytes = element_bytes(batch.iter());
                self.data.append(&bytes)?;
            }
            MemoryOrder::ColumnMajor => {
                // The leading axis varies fastest, so every column grows.
                let merged = ndarray::concatenate(Axis(0), &[self.view()?, batch.view()])
                    .map_err(|err| Error::new(ErrorKind::ShapeMismatch).with_source(err))?;
                let bytes = element_bytes(merged.t().iter());
                self.data.rewrite(&bytes)?;
            }
        }

        self.shape[0] += added as u64;
        codec::write_shape(&self.dir.join(SHAPE_FILE), &self.shape)?;
        tracing::debug!(
            dir = %self.dir.display(),
            added,
            len = self.shape[0],
            "extended fixed store"
        );
        Ok(())
    }

    /// Appends one element, adding the leading axis.
    pub fn append(&mut self, element: ArrayViewD<'_, T>) -> Result<(), Error> {
        self.extend(element.insert_axis(Axis(0)))
    }

    /// Appends scalars to a one-dimensional store.
    pub fn extend_from_slice(&mut self, values: &[T]) -> Result<(), Error> {
        self.extend(ArrayView1::from(values).into_dyn())
    }

    pub fn flush(&self) -> Result<(), Error> {
        self.data.flush()
    }

    pub fn info(&self) -> StoreInfo {
        StoreInfo {
            path: self.dir.clone(),
            kind: StoreKind::Numpy,
            dtype: Some(T::DTYPE),
            len: self.len(),
            shape: Some(self.shape.clone()),
            order: Some(self.order),
            data_bytes: self.data.len() as u64,
            shapes_are_flat: None,
        }
    }

    fn ndarray_shape(&self) -> IxDyn {
        let dims: Vec<usize> = self.shape.iter().map(|&dim| dim as usize).collect();
        IxDyn(&dims)
    }

    fn element_dims(&self) -> Vec<usize> {
        self.shape[1..].iter().map(|&dim| dim as usize).collect()
    }

    fn check_index(&self, index: usize) -> Result<(), Error> {
        if index >= self.len() {
            return Err(Error::out_of_range(index as u64, self.len()).with_path(&self.dir));
        }
        Ok(())
    }
}

pub(crate) fn element_bytes<'a, T: Element>(values: impl Iterator<Item = &'a T>) -> Vec<u8> {
    let mut bytes = Vec::new();
    for value in values {
        bytes.extend_from_slice(bytemuck::bytes_of(value));
    }
    bytes
}

/// Elements are sub-arrays along the leading axis, returned as owned copies.
impl<T: Element> StoreRead for FixedArrayStore<T> {
    type Item = ArrayD<T>;

    fn len(&self) -> usize {
        FixedArrayStore::len(self)
    }

    fn get(&self, index: usize) -> Result<ArrayD<T>, Error> {
        FixedArrayStore::get(self, index)
    }
}

pub(crate) fn create_dir(dir: &Path) -> Result<(), Error> {
    fs::create_dir_all(dir).map_err(|err| Error::io(err, dir))
}

fn write_metadata(
    dir: &Path,
    dtype: DType,
    shape: &[u64],
    order: MemoryOrder,
) -> Result<(), Error> {
    codec::write_str(&dir.join(DTYPE_FILE), dtype.name())?;
    codec::write_shape(&dir.join(SHAPE_FILE), shape)?;
    codec::write_str(&dir.join(ORDER_FILE), order.tag())?;
    codec::write_str(&dir.join(TYPE_FILE), StoreKind::Numpy.tag())
}

/// Size in bytes of an array of `shape`, or `None` when it overflows `usize`.
fn byte_len(shape: &[u64], item_size: usize) -> Option<usize> {
    shape.iter().try_fold(item_size, |bytes, &dim| {
        usize::try_from(dim).ok().and_then(|dim| bytes.checked_mul(dim))
    })
}

fn check_rank(shape: &[u64], dir: &Path) -> Result<(), Error> {
    if shape.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("store shape must have at least one dimension")
            .with_path(dir));
    }
    Ok(())
}

fn missing_metadata(err: Error, dir: &Path) -> Error {
    if err.kind() == ErrorKind::NotFound {
        return Error::new(ErrorKind::Format)
            .with_message("store metadata is missing")
            .with_path(dir)
            .with_source(err);
    }
    err
}
