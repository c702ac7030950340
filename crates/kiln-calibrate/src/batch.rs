//! Device-staged calibration batches
//!
//! The real accelerator library consumes device-resident buffers; this
//! core owns the staging step. [`DeviceBuffer`] stands in for one
//! device-addressable allocation sized exactly to its contents, and
//! [`CalibrationBatch`] groups the staged samples of one pipeline step.

/// One device-addressable staging buffer.
///
/// Sized exactly at allocation; `write_sample` fills consecutive
/// sample-sized slots, mirroring how samples are copied into a single
/// contiguous device allocation before calibration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceBuffer {
    data: Vec<u8>,
    sample_bytes: usize,
}

impl DeviceBuffer {
    /// Allocate a buffer for `sample_count` samples of `sample_bytes` each.
    pub fn allocate(sample_count: usize, sample_bytes: usize) -> Self {
        Self {
            data: vec![0u8; sample_count * sample_bytes],
            sample_bytes,
        }
    }

    /// Copy one sample into slot `index`.
    ///
    /// `sample` must be exactly `sample_bytes` long; the pipeline
    /// validates sizes before staging.
    pub fn write_sample(&mut self, index: usize, sample: &[u8]) {
        debug_assert_eq!(sample.len(), self.sample_bytes);
        let start = index * self.sample_bytes;
        self.data[start..start + sample.len()].copy_from_slice(sample);
    }

    /// Bytes of one sample slot.
    pub fn sample_bytes(&self) -> usize {
        self.sample_bytes
    }

    /// Total buffer size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a zero-sized buffer.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The staged contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// The staged samples of one calibration step.
///
/// Owns its device buffer; a batch is replaced wholesale on the next
/// pipeline step, never mutated in place by the consumer.
#[derive(Debug, Clone)]
pub struct CalibrationBatch {
    buffer: DeviceBuffer,
    sample_count: usize,
}

impl CalibrationBatch {
    pub fn new(buffer: DeviceBuffer, sample_count: usize) -> Self {
        Self {
            buffer,
            sample_count,
        }
    }

    /// Number of samples staged in this batch.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// The staged device buffer (single input binding).
    pub fn buffer(&self) -> &DeviceBuffer {
        &self.buffer
    }

    /// Raw bytes of sample `index` within the batch.
    pub fn sample(&self, index: usize) -> &[u8] {
        let size = self.buffer.sample_bytes();
        &self.buffer.as_bytes()[index * size..(index + 1) * size]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_layout() {
        let mut buffer = DeviceBuffer::allocate(2, 3);
        buffer.write_sample(0, &[1, 2, 3]);
        buffer.write_sample(1, &[4, 5, 6]);

        let batch = CalibrationBatch::new(buffer, 2);
        assert_eq!(batch.sample_count(), 2);
        assert_eq!(batch.buffer().as_bytes(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(batch.sample(1), &[4, 5, 6]);
    }

    #[test]
    fn test_buffer_sized_exactly() {
        let buffer = DeviceBuffer::allocate(3, 16);
        assert_eq!(buffer.len(), 48);
        assert_eq!(buffer.sample_bytes(), 16);
    }
}
