//! Purpose: Fetch consecutive fixed-size batches from an indexed source with a worker pool.
//! Exports: `Fetch`, `IndexedSource`, `FnSource`, `StoreSource`, `CollectorOptions`,
//! `ParallelBatchCollector`, `BatchProgress`, `Batches`, `from_fn`.
//! Role: Feeds `BatchMaterializer::from_indexable` and any caller that wants ordered batches.
//! Invariants: Items within a batch keep index order regardless of worker count.
//! Invariants: A batch completes before the next starts; there is no cross-batch pipelining.
//! Invariants: Once exhausted or failed, the collector yields nothing more and drops its pool.
use std::marker::PhantomData;
use std::ops::Range;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::core::error::{Error, ErrorKind};
use crate::core::read::StoreRead;

/// Result of fetching one index from a source of unknown length.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Fetch<T> {
    Item(T),
    Exhausted,
}

/// A source addressable by integer index, safe to fetch from several workers at once.
pub trait IndexedSource: Sync {
    type Item: Send;

    fn fetch(&self, index: usize) -> Result<Fetch<Self::Item>, Error>;

    /// Known number of items, if any. Without it the collector relies on `Fetch::Exhausted`.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

/// Source backed by a callable; `None` marks the end of the sequence.
pub struct FnSource<F, T> {
    fetch: F,
    len: Option<usize>,
    _item: PhantomData<fn() -> T>,
}

pub fn from_fn<F, T>(fetch: F) -> FnSource<F, T>
where
    F: Fn(usize) -> Option<T> + Sync,
    T: Send,
{
    FnSource {
        fetch,
        len: None,
        _item: PhantomData,
    }
}

impl<F, T> FnSource<F, T> {
    pub fn with_len(mut self, len: usize) -> Self {
        self.len = Some(len);
        self
    }
}

impl<F, T> IndexedSource for FnSource<F, T>
where
    F: Fn(usize) -> Option<T> + Sync,
    T: Send,
{
    type Item = T;

    fn fetch(&self, index: usize) -> Result<Fetch<T>, Error> {
        Ok(match (self.fetch)(index) {
            Some(item) => Fetch::Item(item),
            None => Fetch::Exhausted,
        })
    }

    fn len_hint(&self) -> Option<usize> {
        self.len
    }
}

impl<T: Clone + Send + Sync> IndexedSource for Vec<T> {
    type Item = T;

    fn fetch(&self, index: usize) -> Result<Fetch<T>, Error> {
        self.as_slice().fetch(index)
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl<T: Clone + Send + Sync> IndexedSource for &[T] {
    type Item = T;

    fn fetch(&self, index: usize) -> Result<Fetch<T>, Error> {
        Ok(match self.get(index) {
            Some(item) => Fetch::Item(item.clone()),
            None => Fetch::Exhausted,
        })
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.len())
    }
}

/// Reads elements of an opened store as a source.
pub struct StoreSource<'a, S> {
    store: &'a S,
}

impl<'a, S> StoreSource<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }
}

impl<'a, S> IndexedSource for StoreSource<'a, S>
where
    S: StoreRead + Sync,
    S::Item: Send,
{
    type Item = S::Item;

    fn fetch(&self, index: usize) -> Result<Fetch<S::Item>, Error> {
        if index >= self.store.len() {
            return Ok(Fetch::Exhausted);
        }
        self.store.get(index).map(Fetch::Item)
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.store.len())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CollectorOptions {
    pub batch_size: usize,
    pub workers: usize,
}

impl CollectorOptions {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            workers: 1,
        }
    }

    /// Pool size; 0 or 1 fetches on the calling thread.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Called after every yielded batch with the batches collected so far and the
/// expected total, when the source length is known.
pub type BatchProgress = Box<dyn FnMut(usize, Option<usize>) + Send>;

pub struct ParallelBatchCollector<S: IndexedSource> {
    source: S,
    batch_size: usize,
    pool: Option<ThreadPool>,
    len: Option<usize>,
    batch_num: usize,
    exhausted: bool,
    progress: Option<BatchProgress>,
}

impl<S: IndexedSource> ParallelBatchCollector<S> {
    pub fn new(source: S, options: CollectorOptions) -> Result<Self, Error> {
        if options.batch_size == 0 {
            return Err(Error::new(ErrorKind::Usage).with_message("batch size must be at least 1"));
        }
        let pool = if options.workers > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(options.workers)
                .thread_name(|index| format!("ninja-collector-{index}"))
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start worker pool")
                        .with_source(err)
                })?;
            Some(pool)
        } else {
            None
        };
        let len = source.len_hint();
        tracing::debug!(
            batch_size = options.batch_size,
            workers = options.workers,
            ?len,
            "started batch collector"
        );
        Ok(Self {
            source,
            batch_size: options.batch_size,
            pool,
            len,
            batch_num: 0,
            exhausted: false,
            progress: None,
        })
    }

    pub fn with_progress(
        mut self,
        progress: impl FnMut(usize, Option<usize>) + Send + 'static,
    ) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Number of batches the source will produce, when its length is known.
    pub fn num_batches(&self) -> Option<usize> {
        self.len.map(|len| len.div_ceil(self.batch_size))
    }

    pub fn batches_collected(&self) -> usize {
        self.batch_num
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetches the next batch, or `None` once the source is exhausted.
    pub fn collect_batch(&mut self) -> Result<Option<Vec<S::Item>>, Error> {
        if self.exhausted {
            return Ok(None);
        }
        let start = self.batch_num * self.batch_size;
        let mut end = start + self.batch_size;
        if let Some(len) = self.len {
            if start >= len {
                self.finish();
                return Ok(None);
            }
            end = end.min(len);
        }

        let fetched = match self.fetch_range(start..end) {
            Ok(fetched) => fetched,
            Err(err) => {
                self.finish();
                return Err(err);
            }
        };
        self.batch_num += 1;

        let mut batch = Vec::with_capacity(fetched.len());
        let mut reached_end = false;
        for fetch in fetched {
            match fetch {
                Fetch::Item(item) => batch.push(item),
                Fetch::Exhausted => reached_end = true,
            }
        }
        if reached_end || self.len.is_some_and(|len| end >= len) {
            self.finish();
        }
        if batch.is_empty() {
            return Ok(None);
        }
        let total = self.num_batches();
        if let Some(progress) = self.progress.as_mut() {
            progress(self.batch_num, total);
        }
        Ok(Some(batch))
    }

    pub fn batches(self) -> Batches<S> {
        Batches { collector: self }
    }

    fn fetch_range(&self, range: Range<usize>) -> Result<Vec<Fetch<S::Item>>, Error> {
        let source = &self.source;
        match &self.pool {
            Some(pool) => pool.install(|| {
                range
                    .into_par_iter()
                    .map(|index| source.fetch(index))
                    .collect()
            }),
            None => range.map(|index| source.fetch(index)).collect(),
        }
    }

    fn finish(&mut self) {
        self.exhausted = true;
        self.pool = None;
        tracing::debug!(batches = self.batch_num, "batch collector exhausted");
    }
}

/// Forward-only sequence of batches; ends after the first error.
pub struct Batches<S: IndexedSource> {
    collector: ParallelBatchCollector<S>,
}

impl<S: IndexedSource> Iterator for Batches<S> {
    type Item = Result<Vec<S::Item>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.collector.collect_batch().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::{CollectorOptions, Fetch, IndexedSource, ParallelBatchCollector, from_fn};
    use crate::core::error::{Error, ErrorKind};
    use std::sync::{Arc, Mutex};

    fn collect_all<S: IndexedSource>(source: S, options: CollectorOptions) -> Vec<Vec<S::Item>> {
        ParallelBatchCollector::new(source, options)
            .expect("collector")
            .batches()
            .collect::<Result<Vec<_>, Error>>()
            .expect("batches")
    }

    #[test]
    fn known_length_stops_after_ceil_batches() {
        let source: Vec<u32> = (0..10).collect();
        let mut collector =
            ParallelBatchCollector::new(source, CollectorOptions::new(4)).expect("collector");
        assert_eq!(collector.num_batches(), Some(3));
        assert_eq!(collector.collect_batch().expect("batch"), Some(vec![0, 1, 2, 3]));
        assert_eq!(collector.collect_batch().expect("batch"), Some(vec![4, 5, 6, 7]));
        assert_eq!(collector.collect_batch().expect("batch"), Some(vec![8, 9]));
        assert!(collector.is_exhausted());
        assert_eq!(collector.collect_batch().expect("done"), None);
    }

    #[test]
    fn unknown_length_stops_at_first_exhausted() {
        let source = from_fn(|index| (index < 7).then(|| index * 10));
        let batches = collect_all(source, CollectorOptions::new(3));
        assert_eq!(batches, vec![vec![0, 10, 20], vec![30, 40, 50], vec![60]]);
    }

    #[test]
    fn exact_multiple_ends_without_empty_batch() {
        let source = from_fn(|index| (index < 6).then_some(index));
        let batches = collect_all(source, CollectorOptions::new(3));
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn pool_size_does_not_change_output() {
        let make = || from_fn(|index| (index < 103).then(|| index as u64 * index as u64));
        let sequential = collect_all(make(), CollectorOptions::new(8));
        let pooled = collect_all(make(), CollectorOptions::new(8).with_workers(4));
        assert_eq!(sequential.len(), pooled.len());
        assert_eq!(sequential, pooled);
        let flat: Vec<u64> = pooled.into_iter().flatten().collect();
        assert_eq!(flat.len(), 103);
        assert_eq!(flat[102], 102 * 102);
    }

    #[test]
    fn with_len_bounds_a_callable() {
        let source = from_fn(|index| Some(index)).with_len(5);
        let batches = collect_all(source, CollectorOptions::new(2).with_workers(2));
        assert_eq!(batches, vec![vec![0, 1], vec![2, 3], vec![4]]);
    }

    #[test]
    fn progress_reports_each_yielded_batch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let source = from_fn(|index| (index < 7).then_some(index));
        let batches = ParallelBatchCollector::new(source, CollectorOptions::new(3))
            .expect("collector")
            .with_progress(move |done, total| sink.lock().expect("lock").push((done, total)))
            .batches()
            .count();
        assert_eq!(batches, 3);
        assert_eq!(*seen.lock().expect("lock"), vec![(1, None), (2, None), (3, None)]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let collector = ParallelBatchCollector::new(vec![0u8; 5], CollectorOptions::new(2))
            .expect("collector")
            .with_progress(move |done, total| sink.lock().expect("lock").push((done, total)));
        assert_eq!(collector.batches().count(), 3);
        assert_eq!(*seen.lock().expect("lock"), vec![(1, Some(3)), (2, Some(3)), (3, Some(3))]);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = ParallelBatchCollector::new(vec![1u8], CollectorOptions::new(0))
            .err()
            .expect("usage error");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    struct Failing;

    impl IndexedSource for Failing {
        type Item = u8;

        fn fetch(&self, index: usize) -> Result<Fetch<u8>, Error> {
            if index == 4 {
                return Err(Error::new(ErrorKind::Io).with_message("source failed"));
            }
            Ok(Fetch::Item(index as u8))
        }
    }

    #[test]
    fn fetch_errors_end_the_sequence() {
        let collector =
            ParallelBatchCollector::new(Failing, CollectorOptions::new(3).with_workers(2))
                .expect("collector");
        let mut batches = collector.batches();
        assert_eq!(batches.next().map(|batch| batch.expect("first")), Some(vec![0, 1, 2]));
        let err = batches.next().expect("second").expect_err("failure");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(batches.next().is_none());
    }
}
