//! Calibration controller: the external quantization-callback contract
//!
//! The native builder drives calibration through a fixed callback
//! protocol: ask the batch size, probe the cache, pull batches until
//! exhaustion, then hand back the computed parameter blob for
//! persistence. [`Int8Calibrator`] is that contract;
//! [`CalibrationController`] is the production implementation, composing
//! the batch pipeline and the fingerprinted cache.
//!
//! The controller is deliberately defensive about cache hits: some
//! builder generations skip `get_batch` entirely after a successful cache
//! read, others still probe. It therefore always remains able to serve
//! batches, whatever the builder decides.

use tracing::{debug, info, warn};

use crate::batch::CalibrationBatch;
use crate::cache::{CalibrationCache, Fingerprint};
use crate::dataset::CalibrationDataset;
use crate::error::CalibrationError;
use crate::pipeline::{BatchPipeline, BatchSource};
use crate::settings::{CalibrationAlgorithm, CalibrationSettings};

/// Interface-identity pair the newest builder generation negotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: &'static str,
    pub major: u32,
    pub minor: u32,
}

/// Identity this controller reports during interface negotiation.
pub const CALIBRATOR_INTERFACE: InterfaceInfo = InterfaceInfo {
    name: "int8-calibrator",
    major: 1,
    minor: 0,
};

/// The quantization-callback contract consumed by the native builder.
///
/// Calls arrive synchronously and sequentially within one build pass;
/// implementations need no internal locking.
pub trait Int8Calibrator {
    /// Samples per batch; fixed for the lifetime of the calibrator.
    fn batch_size(&self) -> usize;

    /// Stage the next batch for the given input tensor names.
    ///
    /// `None` signals that calibration passes are finished and the
    /// builder should compute parameters from the observed statistics.
    fn get_batch(
        &mut self,
        tensor_names: &[&str],
    ) -> Result<Option<&CalibrationBatch>, CalibrationError>;

    /// Previously computed parameter blob, if a valid one exists.
    ///
    /// The returned slice stays valid until the next call on the
    /// calibrator; the native side copies out of it.
    fn read_calibration_cache(&mut self) -> Option<&[u8]>;

    /// Persist the parameter blob the builder just computed.
    fn write_calibration_cache(&mut self, payload: &[u8]);

    /// Algorithm the builder should run; fixed at construction.
    fn algorithm(&self) -> CalibrationAlgorithm;

    /// Interface identity, queried only by generations that negotiate it.
    fn interface_info(&self) -> InterfaceInfo;
}

/// Production calibrator: pipeline-fed batches plus a fingerprinted cache.
pub struct CalibrationController {
    batch_size: usize,
    algorithm: CalibrationAlgorithm,
    source: Box<dyn BatchSource>,
    cache: CalibrationCache,
    // Most recent staged batch; the native side borrows it between calls.
    current: Option<CalibrationBatch>,
    // Cache bytes retained after a read so the borrow in
    // `read_calibration_cache` has somewhere to live.
    cache_bytes: Option<Vec<u8>>,
}

impl CalibrationController {
    /// Build a controller over an explicit dataset.
    ///
    /// `sample_bytes` is the declared input tensor byte size.
    pub fn new(
        dataset: CalibrationDataset,
        settings: &CalibrationSettings,
        sample_bytes: usize,
    ) -> Result<Self, CalibrationError> {
        let fingerprint = Fingerprint::compute(settings.algorithm, settings.batch_size, &dataset);
        let cache = CalibrationCache::new(&settings.cache_path, fingerprint);

        let pipeline = BatchPipeline::new(dataset, settings.batch_size, sample_bytes)?;
        let source: Box<dyn BatchSource> = if settings.prefetch {
            Box::new(pipeline.with_prefetch())
        } else {
            Box::new(pipeline)
        };

        info!(
            algorithm = %settings.algorithm,
            batch_size = settings.batch_size,
            fingerprint = %fingerprint,
            "calibration controller ready"
        );

        Ok(Self {
            batch_size: settings.batch_size,
            algorithm: settings.algorithm,
            source,
            cache,
            current: None,
            cache_bytes: None,
        })
    }

    /// Build a controller by scanning `settings.data_path` for samples.
    pub fn from_settings(
        settings: &CalibrationSettings,
        sample_bytes: usize,
    ) -> Result<Self, CalibrationError> {
        let dataset = CalibrationDataset::from_dir(&settings.data_path)?;
        Self::new(dataset, settings, sample_bytes)
    }

    /// Fingerprint guarding this controller's cache entry.
    pub fn fingerprint(&self) -> &Fingerprint {
        self.cache.fingerprint()
    }
}

impl Int8Calibrator for CalibrationController {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn get_batch(
        &mut self,
        tensor_names: &[&str],
    ) -> Result<Option<&CalibrationBatch>, CalibrationError> {
        debug!(bindings = tensor_names.len(), "builder requested batch");
        self.current = self.source.next_batch()?;
        Ok(self.current.as_ref())
    }

    fn read_calibration_cache(&mut self) -> Option<&[u8]> {
        self.cache_bytes = self.cache.load();
        self.cache_bytes.as_deref()
    }

    fn write_calibration_cache(&mut self, payload: &[u8]) {
        // The contract gives no way to report a failed write, and a
        // failed write must not fail an otherwise successful calibration:
        // the cache only exists to skip work next time.
        if let Err(e) = self.cache.save(payload) {
            warn!(
                path = %self.cache.path().display(),
                error = %e,
                "failed to persist calibration cache"
            );
        }
    }

    fn algorithm(&self) -> CalibrationAlgorithm {
        self.algorithm
    }

    fn interface_info(&self) -> InterfaceInfo {
        CALIBRATOR_INTERFACE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE_BYTES: usize = 4;

    fn setup(count: usize, batch_size: usize) -> (TempDir, CalibrationController) {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        fs::create_dir(&data).unwrap();
        for i in 0..count {
            fs::write(data.join(format!("{i:03}.bin")), vec![i as u8; SAMPLE_BYTES]).unwrap();
        }
        let settings =
            CalibrationSettings::new(&data, dir.path().join("calib.cache")).with_batch_size(batch_size);
        let controller = CalibrationController::from_settings(&settings, SAMPLE_BYTES).unwrap();
        (dir, controller)
    }

    #[test]
    fn test_batch_size_invariant_across_calls() {
        let (_dir, mut controller) = setup(10, 4);
        assert_eq!(controller.batch_size(), 4);
        let _ = controller.get_batch(&["input"]).unwrap();
        let _ = controller.get_batch(&["input"]).unwrap();
        assert_eq!(controller.batch_size(), 4);
    }

    #[test]
    fn test_drains_then_signals_completion() {
        let (_dir, mut controller) = setup(10, 4);
        let mut sizes = Vec::new();
        while let Some(batch) = controller.get_batch(&["input"]).unwrap() {
            sizes.push(batch.sample_count());
        }
        assert_eq!(sizes, vec![4, 4, 2]);
        assert!(controller.get_batch(&["input"]).unwrap().is_none());
    }

    #[test]
    fn test_cold_cache_reads_none_then_writes() {
        let (_dir, mut controller) = setup(4, 2);
        assert!(controller.read_calibration_cache().is_none());

        controller.write_calibration_cache(b"computed-params");
        assert_eq!(
            controller.read_calibration_cache(),
            Some(b"computed-params".as_slice())
        );
    }

    #[test]
    fn test_serves_batches_despite_cache_hit() {
        let (_dir, mut controller) = setup(4, 2);
        controller.write_calibration_cache(b"params");
        assert!(controller.read_calibration_cache().is_some());

        // A builder that calibrates anyway must still get real batches.
        let batch = controller.get_batch(&["input"]).unwrap().unwrap();
        assert_eq!(batch.sample_count(), 2);
    }

    #[test]
    fn test_unwritable_cache_does_not_fail_run() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        fs::create_dir(&data).unwrap();
        fs::write(data.join("000.bin"), vec![0u8; SAMPLE_BYTES]).unwrap();

        let settings = CalibrationSettings::new(&data, "/nonexistent/dir/calib.cache");
        let mut controller = CalibrationController::from_settings(&settings, SAMPLE_BYTES).unwrap();

        assert!(controller.read_calibration_cache().is_none());
        // Swallowed with a warning; the calibration result is unaffected.
        controller.write_calibration_cache(b"params");
        assert!(controller.read_calibration_cache().is_none());
    }

    #[test]
    fn test_cache_keyed_by_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        fs::create_dir(&data).unwrap();
        for i in 0..4 {
            fs::write(data.join(format!("{i:03}.bin")), vec![0u8; SAMPLE_BYTES]).unwrap();
        }
        let cache_path = dir.path().join("calib.cache");

        let entropy = CalibrationSettings::new(&data, &cache_path).with_batch_size(2);
        let mut writer = CalibrationController::from_settings(&entropy, SAMPLE_BYTES).unwrap();
        writer.write_calibration_cache(b"entropy-params");

        // Same path, different algorithm: must read as a miss.
        let minmax = entropy.clone().with_algorithm(CalibrationAlgorithm::MinMax);
        let mut reader = CalibrationController::from_settings(&minmax, SAMPLE_BYTES).unwrap();
        assert!(reader.read_calibration_cache().is_none());
    }

    #[test]
    fn test_interface_identity_is_fixed() {
        let (_dir, controller) = setup(2, 1);
        let info = controller.interface_info();
        assert_eq!(info, CALIBRATOR_INTERFACE);
        assert_eq!(info.name, "int8-calibrator");
        assert_eq!((info.major, info.minor), (1, 0));
    }

    #[test]
    fn test_prefetch_controller_equivalent() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        fs::create_dir(&data).unwrap();
        for i in 0..6 {
            fs::write(data.join(format!("{i:03}.bin")), vec![i as u8; SAMPLE_BYTES]).unwrap();
        }
        let settings = CalibrationSettings::new(&data, dir.path().join("calib.cache"))
            .with_batch_size(4)
            .with_prefetch(true);
        let mut controller = CalibrationController::from_settings(&settings, SAMPLE_BYTES).unwrap();

        let mut sizes = Vec::new();
        while let Some(batch) = controller.get_batch(&["input"]).unwrap() {
            sizes.push(batch.sample_count());
        }
        assert_eq!(sizes, vec![4, 2]);
    }
}
