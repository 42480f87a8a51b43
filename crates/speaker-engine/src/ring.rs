//! Bounded sample FIFO between the pacer and the frame encoder.
//!
//! The pacer writes variable-size bursts; the encoder drains fixed-size
//! frames. Capacity is explicit and overflow drops the oldest samples so
//! latency stays bounded when the drain side falls behind.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::{EngineError, Result};

/// Minimum spacing between overflow warnings.
const OVERFLOW_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Single-owner bounded FIFO of `f32` samples.
///
/// ## Data model
/// Samples are stored verbatim; `read_into` returns exactly the bits that were
/// written, in write order.
#[derive(Debug)]
pub struct RingBuffer {
    queue: VecDeque<f32>,
    capacity: usize,
    dropped: u64,
    last_overflow_log: Option<Instant>,
}

impl RingBuffer {
    /// Create an empty buffer holding at most `capacity` samples (min 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
            last_overflow_log: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Samples discarded by the drop-oldest policy since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Append one sample, evicting the oldest when full.
    pub fn write(&mut self, sample: f32) {
        if self.queue.len() >= self.capacity {
            self.queue.pop_front();
            self.dropped += 1;
            self.log_overflow();
        }
        self.queue.push_back(sample);
    }

    /// Append every sample of `samples` in order.
    pub fn write_slice(&mut self, samples: &[f32]) {
        for &s in samples {
            self.write(s);
        }
    }

    /// Drain exactly `count` samples into `dest[offset..offset + count]`.
    ///
    /// Nothing is drained if fewer than `count` samples are buffered or if
    /// `dest` is too short.
    pub fn read_into(&mut self, dest: &mut [f32], count: usize, offset: usize) -> Result<()> {
        if self.queue.len() < count {
            return Err(EngineError::Underflow {
                requested: count,
                available: self.queue.len(),
            });
        }
        let needed = offset.saturating_add(count);
        if dest.len() < needed {
            return Err(EngineError::Destination {
                needed,
                len: dest.len(),
            });
        }

        for (slot, sample) in dest[offset..needed].iter_mut().zip(self.queue.drain(..count)) {
            *slot = sample;
        }
        Ok(())
    }

    /// Discard all buffered samples. The drop counter is kept.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    fn log_overflow(&mut self) {
        let now = Instant::now();
        let due = self
            .last_overflow_log
            .is_none_or(|last| now.duration_since(last) >= OVERFLOW_LOG_INTERVAL);
        if due {
            self.last_overflow_log = Some(now);
            tracing::warn!(
                capacity_samples = self.capacity,
                dropped_samples = self.dropped,
                "ring buffer overflow; dropping oldest samples"
            );
        }
    }
}
