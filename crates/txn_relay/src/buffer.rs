//! Bounded transaction buffer and flush scheduling.
//!
//! [`TransactionBuffer`] is a pure, single-threaded core: it owns the
//! pending records, enforces the capacity bound by evicting the oldest
//! quarter, and decides when a batch is due (size- or time-triggered). It
//! performs no locking and no I/O of its own; [`Relay`](crate::Relay)
//! drives it under a mutex and hands triggered batches to the sender after
//! the lock is released.
//!
//! The handoff is always a whole-buffer swap: a triggered [`accept`] or an
//! explicit [`take_batch`] drains everything and resets the flush clock, so
//! no record can appear in two batches and none is retained past a trigger.
//!
//! [`accept`]: TransactionBuffer::accept
//! [`take_batch`]: TransactionBuffer::take_batch

use crate::record::TransactionRecord;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Overflow eviction divisor: at capacity, the oldest
/// `max_buffer_size / EVICT_DIVISOR` records are dropped (at least one).
/// The quarter is a tuning choice, not a correctness requirement.
const EVICT_DIVISOR: usize = 4;

/// Configuration for buffering and flush scheduling.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Hard capacity; reaching it triggers oldest-quarter eviction.
    pub max_buffer_size: usize,
    /// Size trigger: a batch is due once this many records are pending.
    pub batch_size: usize,
    /// Time trigger: a batch is due once this much time has passed since
    /// the last handoff. Evaluated at the next insertion, not by a timer.
    pub flush_interval: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 1000,
            batch_size: 100,
            flush_interval: Duration::from_secs(30),
        }
    }
}

/// Counters for buffer activity.
///
/// Plain `u64`: the buffer is only ever touched under the relay's lock, so
/// atomics would buy nothing.
#[derive(Debug, Default, Clone)]
pub struct BufferMetrics {
    /// Records appended to the buffer.
    pub accepted: u64,
    /// Records lost to overflow eviction.
    pub evicted: u64,
    /// Batches handed off.
    pub batches: u64,
}

/// Ordered, capacity-bounded collection of pending records.
pub struct TransactionBuffer {
    pending: VecDeque<TransactionRecord>,
    config: BufferConfig,
    metrics: BufferMetrics,
    last_flush: Instant,
}

impl TransactionBuffer {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            pending: VecDeque::with_capacity(config.batch_size.min(config.max_buffer_size)),
            config,
            metrics: BufferMetrics::default(),
            last_flush: Instant::now(),
        }
    }

    /// Accepts one record and returns the whole buffer as a batch if a
    /// flush trigger fired.
    ///
    /// Steps, in order: evict the oldest quarter when at capacity, append,
    /// evaluate the size/time trigger. All three happen in one call so the
    /// caller's lock makes them atomic with respect to other producers.
    /// Never blocks: overload is resolved by eviction, not backpressure.
    pub fn accept(&mut self, record: TransactionRecord) -> Option<Vec<TransactionRecord>> {
        if self.pending.len() >= self.config.max_buffer_size {
            let n = (self.config.max_buffer_size / EVICT_DIVISOR)
                .max(1)
                .min(self.pending.len());
            self.pending.drain(..n);
            self.metrics.evicted += n as u64;
        }

        self.pending.push_back(record);
        self.metrics.accepted += 1;

        if self.trigger_due() {
            self.take_batch()
        } else {
            None
        }
    }

    fn trigger_due(&self) -> bool {
        self.pending.len() >= self.config.batch_size
            || self.last_flush.elapsed() >= self.config.flush_interval
    }

    /// Whole-buffer swap. Returns `None`, with no state change, when empty.
    pub fn take_batch(&mut self) -> Option<Vec<TransactionRecord>> {
        if self.pending.is_empty() {
            return None;
        }
        self.last_flush = Instant::now();
        self.metrics.batches += 1;
        Some(self.pending.drain(..).collect())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn metrics(&self) -> &BufferMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TransactionRecord;

    fn record(name: &str) -> TransactionRecord {
        TransactionRecord::builder(name, "GET").duration_ms(10.0).build()
    }

    fn quiet_config(max: usize, batch: usize) -> BufferConfig {
        BufferConfig {
            max_buffer_size: max,
            batch_size: batch,
            flush_interval: Duration::from_secs(3600),
        }
    }

    #[tokio::test]
    async fn test_size_trigger_returns_ordered_batch() {
        let mut buffer = TransactionBuffer::new(quiet_config(100, 2));

        assert!(buffer.accept(record("a")).is_none());
        let batch = buffer.accept(record("b")).expect("size trigger");

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].endpoint, "a");
        assert_eq!(batch[1].endpoint, "b");
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_overflow_evicts_oldest_quarter() {
        // Capacity 8: the 9th insertion evicts the oldest 2 first.
        let mut buffer = TransactionBuffer::new(quiet_config(8, 100));

        for i in 0..9 {
            assert!(buffer.accept(record(&format!("t{}", i))).is_none());
        }

        assert_eq!(buffer.len(), 7);
        assert_eq!(buffer.metrics().evicted, 2);

        let batch = buffer.take_batch().unwrap();
        assert_eq!(batch[0].endpoint, "t2");
        assert_eq!(batch[6].endpoint, "t8");
    }

    #[tokio::test]
    async fn test_eviction_count_is_at_least_one() {
        // Capacity 3: 3 / 4 rounds to zero, but reaching capacity must
        // still free a slot.
        let mut buffer = TransactionBuffer::new(quiet_config(3, 100));

        for i in 0..4 {
            buffer.accept(record(&format!("t{}", i)));
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.metrics().evicted, 1);
    }

    #[tokio::test]
    async fn test_capacity_never_exceeded() {
        let max = 12;
        let mut buffer = TransactionBuffer::new(quiet_config(max, 1000));

        for i in 0..(max * 3) {
            buffer.accept(record(&format!("t{}", i)));
            assert!(buffer.len() <= max);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_trigger() {
        let mut buffer = TransactionBuffer::new(BufferConfig {
            max_buffer_size: 100,
            batch_size: 100,
            flush_interval: Duration::from_secs(30),
        });

        assert!(buffer.accept(record("early")).is_none());

        tokio::time::advance(Duration::from_secs(31)).await;

        let batch = buffer.accept(record("late")).expect("time trigger");
        assert_eq!(batch.len(), 2);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_take_batch_on_empty_is_noop() {
        let mut buffer = TransactionBuffer::new(BufferConfig::default());

        assert!(buffer.take_batch().is_none());
        assert_eq!(buffer.metrics().batches, 0);
    }
}
