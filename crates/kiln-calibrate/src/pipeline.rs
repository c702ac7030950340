//! Batch pipeline: iterates the dataset into device-staged batches
//!
//! A single cursor advances `batch_size` samples per call. Exhaustion is
//! signaled with `None` and is the only termination condition; a read or
//! shape failure aborts the whole calibration run instead of skipping the
//! sample. The cursor resets only by rebuilding the pipeline.

use std::sync::mpsc;
use std::thread::JoinHandle;

use tracing::debug;

use crate::batch::{CalibrationBatch, DeviceBuffer};
use crate::dataset::CalibrationDataset;
use crate::error::CalibrationError;

/// Anything that can feed calibration batches to the controller.
///
/// Implemented by [`BatchPipeline`] and its prefetching wrapper so the
/// controller does not care whether staging happens inline or one batch
/// ahead.
pub trait BatchSource: Send {
    /// Samples per full batch.
    fn batch_size(&self) -> usize;

    /// Stage and return the next batch, or `None` once exhausted.
    ///
    /// After the first `None`, every further call returns `None`.
    fn next_batch(&mut self) -> Result<Option<CalibrationBatch>, CalibrationError>;
}

/// Single-cursor batch iterator over a [`CalibrationDataset`].
#[derive(Debug)]
pub struct BatchPipeline {
    dataset: CalibrationDataset,
    batch_size: usize,
    sample_bytes: usize,
    cursor: usize,
}

impl BatchPipeline {
    /// Create a pipeline over `dataset`.
    ///
    /// `sample_bytes` is the declared input tensor byte size; every
    /// sample file must match it exactly.
    pub fn new(
        dataset: CalibrationDataset,
        batch_size: usize,
        sample_bytes: usize,
    ) -> Result<Self, CalibrationError> {
        if batch_size == 0 {
            return Err(CalibrationError::Config(
                "batch size must be positive".into(),
            ));
        }
        if sample_bytes == 0 {
            return Err(CalibrationError::Config(
                "input tensor byte size must be positive".into(),
            ));
        }
        Ok(Self {
            dataset,
            batch_size,
            sample_bytes,
            cursor: 0,
        })
    }

    /// Total number of batches this pipeline will yield: ⌈L/B⌉.
    pub fn total_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Move staging onto a background worker, one batch ahead.
    pub fn with_prefetch(self) -> PrefetchPipeline {
        PrefetchPipeline::spawn(self)
    }
}

impl BatchSource for BatchPipeline {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn next_batch(&mut self) -> Result<Option<CalibrationBatch>, CalibrationError> {
        if self.cursor >= self.dataset.len() {
            return Ok(None);
        }

        let take = self.batch_size.min(self.dataset.len() - self.cursor);
        let mut buffer = DeviceBuffer::allocate(take, self.sample_bytes);

        for slot in 0..take {
            let path = self.dataset.sample(self.cursor + slot);
            let bytes = std::fs::read(path).map_err(|source| CalibrationError::SampleRead {
                path: path.to_path_buf(),
                source,
            })?;
            if bytes.len() != self.sample_bytes {
                return Err(CalibrationError::SampleShape {
                    path: path.to_path_buf(),
                    expected: self.sample_bytes,
                    actual: bytes.len(),
                });
            }
            buffer.write_sample(slot, &bytes);
        }

        self.cursor += take;
        debug!(
            staged = take,
            cursor = self.cursor,
            total = self.dataset.len(),
            "staged calibration batch"
        );
        Ok(Some(CalibrationBatch::new(buffer, take)))
    }
}

/// Wrapper that stages one batch ahead on a background worker.
///
/// Pure latency optimization: the consumer sees exactly the sequence the
/// inner pipeline would have produced, including its first error, and
/// never waits on more than one in-flight batch.
pub struct PrefetchPipeline {
    batch_size: usize,
    // Taken (and dropped) before join so a worker parked on the bounded
    // channel unblocks.
    rx: Option<mpsc::Receiver<Result<Option<CalibrationBatch>, CalibrationError>>>,
    worker: Option<JoinHandle<()>>,
    done: bool,
}

impl PrefetchPipeline {
    fn spawn(mut inner: BatchPipeline) -> Self {
        let batch_size = inner.batch_size;
        // Capacity 1: the worker runs at most one batch ahead.
        let (tx, rx) = mpsc::sync_channel(1);
        let worker = std::thread::spawn(move || loop {
            let item = inner.next_batch();
            let stop = !matches!(item, Ok(Some(_)));
            if tx.send(item).is_err() || stop {
                break;
            }
        });
        Self {
            batch_size,
            rx: Some(rx),
            worker: Some(worker),
            done: false,
        }
    }
}

impl BatchSource for PrefetchPipeline {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn next_batch(&mut self) -> Result<Option<CalibrationBatch>, CalibrationError> {
        if self.done {
            return Ok(None);
        }
        let Some(rx) = self.rx.as_ref() else {
            return Ok(None);
        };
        match rx.recv() {
            Ok(Ok(Some(batch))) => Ok(Some(batch)),
            Ok(terminal) => {
                self.done = true;
                terminal
            }
            // Worker gone; treat like exhaustion.
            Err(_) => {
                self.done = true;
                Ok(None)
            }
        }
    }
}

impl Drop for PrefetchPipeline {
    fn drop(&mut self) {
        // Closing the channel unblocks a worker parked on the bounded
        // send; only then is the join safe.
        self.rx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SAMPLE_BYTES: usize = 8;

    fn write_dataset(count: usize) -> (TempDir, CalibrationDataset) {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..count {
            fs::write(
                dir.path().join(format!("{i:03}.bin")),
                vec![i as u8; SAMPLE_BYTES],
            )
            .unwrap();
        }
        let dataset = CalibrationDataset::from_dir(dir.path()).unwrap();
        (dir, dataset)
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let (_dir, dataset) = write_dataset(1);
        assert!(matches!(
            BatchPipeline::new(dataset, 0, SAMPLE_BYTES),
            Err(CalibrationError::Config(_))
        ));
    }

    #[test]
    fn test_ten_samples_batch_four_yields_4_4_2() {
        let (_dir, dataset) = write_dataset(10);
        let mut pipeline = BatchPipeline::new(dataset, 4, SAMPLE_BYTES).unwrap();
        assert_eq!(pipeline.total_batches(), 3);

        let sizes: Vec<usize> = std::iter::from_fn(|| {
            pipeline.next_batch().unwrap().map(|b| b.sample_count())
        })
        .collect();
        assert_eq!(sizes, vec![4, 4, 2]);

        // Terminal state is idempotent, not an error.
        assert!(pipeline.next_batch().unwrap().is_none());
        assert!(pipeline.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_exact_division_final_batch_full() {
        let (_dir, dataset) = write_dataset(8);
        let mut pipeline = BatchPipeline::new(dataset, 4, SAMPLE_BYTES).unwrap();
        let sizes: Vec<usize> = std::iter::from_fn(|| {
            pipeline.next_batch().unwrap().map(|b| b.sample_count())
        })
        .collect();
        assert_eq!(sizes, vec![4, 4]);
    }

    #[test]
    fn test_samples_in_dataset_order() {
        let (_dir, dataset) = write_dataset(5);
        let mut pipeline = BatchPipeline::new(dataset, 2, SAMPLE_BYTES).unwrap();

        let first = pipeline.next_batch().unwrap().unwrap();
        assert_eq!(first.sample(0), &[0u8; SAMPLE_BYTES]);
        assert_eq!(first.sample(1), &[1u8; SAMPLE_BYTES]);

        let second = pipeline.next_batch().unwrap().unwrap();
        assert_eq!(second.sample(0), &[2u8; SAMPLE_BYTES]);
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("000.bin"), vec![0u8; SAMPLE_BYTES]).unwrap();
        fs::write(dir.path().join("001.bin"), vec![0u8; SAMPLE_BYTES - 1]).unwrap();
        let dataset = CalibrationDataset::from_dir(dir.path()).unwrap();

        let mut pipeline = BatchPipeline::new(dataset, 4, SAMPLE_BYTES).unwrap();
        let err = pipeline.next_batch().unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::SampleShape {
                expected: SAMPLE_BYTES,
                actual,
                ..
            } if actual == SAMPLE_BYTES - 1
        ));
    }

    #[test]
    fn test_unreadable_sample_is_fatal() {
        let dataset =
            CalibrationDataset::from_files(vec![PathBuf::from("/nonexistent/kiln.bin")]).unwrap();
        let mut pipeline = BatchPipeline::new(dataset, 1, SAMPLE_BYTES).unwrap();
        assert!(matches!(
            pipeline.next_batch().unwrap_err(),
            CalibrationError::SampleRead { .. }
        ));
    }

    #[test]
    fn test_prefetch_matches_inline_sequence() {
        let (_dir, dataset) = write_dataset(10);
        let mut inline = BatchPipeline::new(dataset.clone(), 4, SAMPLE_BYTES).unwrap();
        let mut prefetched = BatchPipeline::new(dataset, 4, SAMPLE_BYTES)
            .unwrap()
            .with_prefetch();

        loop {
            let a = inline.next_batch().unwrap();
            let b = prefetched.next_batch().unwrap();
            match (a, b) {
                (Some(a), Some(b)) => {
                    assert_eq!(a.sample_count(), b.sample_count());
                    assert_eq!(a.buffer().as_bytes(), b.buffer().as_bytes());
                }
                (None, None) => break,
                _ => panic!("prefetch diverged from inline pipeline"),
            }
        }
        // Terminal state idempotent through the wrapper too.
        assert!(prefetched.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_prefetch_propagates_error() {
        let dataset =
            CalibrationDataset::from_files(vec![PathBuf::from("/nonexistent/kiln.bin")]).unwrap();
        let mut prefetched = BatchPipeline::new(dataset, 1, SAMPLE_BYTES)
            .unwrap()
            .with_prefetch();
        assert!(prefetched.next_batch().is_err());
        // After the error the source reports exhaustion rather than failing again.
        assert!(prefetched.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_prefetch_drop_mid_stream() {
        let (_dir, dataset) = write_dataset(10);
        let mut prefetched = BatchPipeline::new(dataset, 2, SAMPLE_BYTES)
            .unwrap()
            .with_prefetch();
        let _ = prefetched.next_batch().unwrap();
        // Dropping with batches outstanding must not hang.
        drop(prefetched);
    }
}
