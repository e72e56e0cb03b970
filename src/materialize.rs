//! Purpose: Build stores from lazy or random-access sources in bounded batches.
//! Exports: `Materialize`, `MaterializeOptions`, `BatchMaterializer`.
//! Role: Construction pipeline shared by every store kind.
//! Invariants: At most `batch_size` samples are buffered at a time.
//! Invariants: The first flush creates the store and later flushes extend it.
//! Invariants: An empty source creates nothing.
use std::mem;
use std::path::Path;

use ndarray::{ArrayD, ArrayViewD, Axis};

use crate::core::dtype::Element;
use crate::core::error::{Error, ErrorKind};
use crate::core::fixed::FixedArrayStore;
use crate::core::ragged::{RaggedArrayStore, Sample};
use crate::core::strings::StringArrayStore;
use crate::parallel::{CollectorOptions, IndexedSource, ParallelBatchCollector};

/// Store kinds that can be created from, and grown by, a batch of samples.
pub trait Materialize: Sized {
    type Item: Send;

    fn create_from_batch(dir: &Path, batch: Vec<Self::Item>) -> Result<Self, Error>;

    fn extend_from_batch(&mut self, batch: Vec<Self::Item>) -> Result<(), Error>;
}

impl<T: Element> Materialize for RaggedArrayStore<T> {
    type Item = Sample<T>;

    fn create_from_batch(dir: &Path, batch: Vec<Sample<T>>) -> Result<Self, Error> {
        RaggedArrayStore::from_elements(dir, batch)
    }

    fn extend_from_batch(&mut self, batch: Vec<Sample<T>>) -> Result<(), Error> {
        self.extend(batch)
    }
}

impl Materialize for StringArrayStore {
    type Item = String;

    fn create_from_batch(dir: &Path, batch: Vec<String>) -> Result<Self, Error> {
        StringArrayStore::from_strings(dir, batch)
    }

    fn extend_from_batch(&mut self, batch: Vec<String>) -> Result<(), Error> {
        self.extend(batch)
    }
}

/// Equal-shape samples are stacked along a new leading axis.
impl<T: Element> Materialize for FixedArrayStore<T> {
    type Item = ArrayD<T>;

    fn create_from_batch(dir: &Path, batch: Vec<ArrayD<T>>) -> Result<Self, Error> {
        let stacked = stack_samples(&batch)?;
        FixedArrayStore::from_array(dir, &stacked)
    }

    fn extend_from_batch(&mut self, batch: Vec<ArrayD<T>>) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }
        let stacked = stack_samples(&batch)?;
        self.extend(stacked.view())
    }
}

fn stack_samples<T: Element>(batch: &[ArrayD<T>]) -> Result<ArrayD<T>, Error> {
    let views: Vec<ArrayViewD<'_, T>> = batch.iter().map(|sample| sample.view()).collect();
    ndarray::stack(Axis(0), &views).map_err(|err| {
        Error::new(ErrorKind::ShapeMismatch)
            .with_message("samples in a batch must share one shape")
            .with_source(err)
    })
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MaterializeOptions {
    pub batch_size: usize,
    pub workers: usize,
}

impl MaterializeOptions {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            workers: 1,
        }
    }

    /// Worker pool size used by `from_indexable`.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self::new(1024)
    }
}

pub struct BatchMaterializer<'p> {
    options: MaterializeOptions,
    progress: Option<Box<dyn FnMut(u64) + 'p>>,
}

impl<'p> BatchMaterializer<'p> {
    pub fn new(options: MaterializeOptions) -> Self {
        Self {
            options,
            progress: None,
        }
    }

    /// Called with the running sample count after every sample.
    pub fn with_progress(mut self, progress: impl FnMut(u64) + 'p) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn from_samples<S, I>(
        &mut self,
        dir: impl AsRef<Path>,
        samples: I,
    ) -> Result<Option<S>, Error>
    where
        S: Materialize,
        I: IntoIterator<Item = S::Item>,
    {
        self.try_from_samples(dir, samples.into_iter().map(Ok))
    }

    /// Like `from_samples`, for sources whose samples can fail; the first error stops the build.
    pub fn try_from_samples<S, I>(
        &mut self,
        dir: impl AsRef<Path>,
        samples: I,
    ) -> Result<Option<S>, Error>
    where
        S: Materialize,
        I: IntoIterator<Item = Result<S::Item, Error>>,
    {
        let dir = dir.as_ref();
        self.check_options()?;
        let mut store = None;
        let mut batch = Vec::with_capacity(self.options.batch_size);
        let mut seen = 0u64;
        for sample in samples {
            batch.push(sample?);
            seen += 1;
            self.report(seen);
            if batch.len() == self.options.batch_size {
                flush(dir, &mut store, mem::take(&mut batch), seen)?;
            }
        }
        if !batch.is_empty() {
            flush(dir, &mut store, batch, seen)?;
        }
        Ok(store)
    }

    /// Fetches `source` in batches through a worker pool and flushes each batch.
    pub fn from_indexable<S, Src>(
        &mut self,
        dir: impl AsRef<Path>,
        source: Src,
    ) -> Result<Option<S>, Error>
    where
        S: Materialize,
        Src: IndexedSource<Item = S::Item>,
    {
        let dir = dir.as_ref();
        self.check_options()?;
        let options =
            CollectorOptions::new(self.options.batch_size).with_workers(self.options.workers);
        let collector = ParallelBatchCollector::new(source, options)?;
        let mut store = None;
        let mut seen = 0u64;
        for batch in collector.batches() {
            let batch = batch?;
            for _ in 0..batch.len() {
                seen += 1;
                self.report(seen);
            }
            flush(dir, &mut store, batch, seen)?;
        }
        Ok(store)
    }

    fn check_options(&self) -> Result<(), Error> {
        if self.options.batch_size == 0 {
            return Err(Error::new(ErrorKind::Usage).with_message("batch size must be at least 1"));
        }
        Ok(())
    }

    fn report(&mut self, seen: u64) {
        if let Some(progress) = self.progress.as_mut() {
            progress(seen);
        }
    }
}

fn flush<S: Materialize>(
    dir: &Path,
    store: &mut Option<S>,
    batch: Vec<S::Item>,
    seen: u64,
) -> Result<(), Error> {
    let flushed = batch.len();
    if let Some(existing) = store.as_mut() {
        existing.extend_from_batch(batch)?;
    } else {
        *store = Some(S::create_from_batch(dir, batch)?);
    }
    tracing::info!(dir = %dir.display(), flushed, total = seen, "flushed batch");
    Ok(())
}

impl<T: Element> RaggedArrayStore<T> {
    /// Builds a store from a lazy sequence, writing `batch_size` samples at a time.
    pub fn from_generator<I>(
        dir: impl AsRef<Path>,
        samples: I,
        batch_size: usize,
    ) -> Result<Option<Self>, Error>
    where
        I: IntoIterator,
        I::Item: Into<Sample<T>>,
    {
        BatchMaterializer::new(MaterializeOptions::new(batch_size))
            .from_samples(dir, samples.into_iter().map(Into::into))
    }

    pub fn from_indexable<Src>(
        dir: impl AsRef<Path>,
        source: Src,
        options: MaterializeOptions,
    ) -> Result<Option<Self>, Error>
    where
        Src: IndexedSource<Item = Sample<T>>,
    {
        BatchMaterializer::new(options).from_indexable(dir, source)
    }
}

impl StringArrayStore {
    pub fn from_generator<I>(
        dir: impl AsRef<Path>,
        strings: I,
        batch_size: usize,
    ) -> Result<Option<Self>, Error>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        BatchMaterializer::new(MaterializeOptions::new(batch_size))
            .from_samples(dir, strings.into_iter().map(Into::into))
    }

    pub fn from_indexable<Src>(
        dir: impl AsRef<Path>,
        source: Src,
        options: MaterializeOptions,
    ) -> Result<Option<Self>, Error>
    where
        Src: IndexedSource<Item = String>,
    {
        BatchMaterializer::new(options).from_indexable(dir, source)
    }
}
