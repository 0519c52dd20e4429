//! Public relay surface: `track` and `flush`.
//!
//! One [`Relay`] is created at process start and shared by reference
//! (`Arc<Relay>`) across request-handling contexts. `track` never performs
//! I/O and never returns an error; its only synchronization is a short
//! exclusive window over the in-memory buffer. Triggered batches are sent
//! on spawned tasks, capped by a semaphore and gated by the circuit
//! breaker, and every downstream failure terminates inside the relay as a
//! log line. The host's request path cannot be blocked or crashed by
//! telemetry.

use crate::breaker::CircuitBreaker;
use crate::buffer::{BufferMetrics, TransactionBuffer};
use crate::config::RelayConfig;
use crate::exporter::{ExportError, HttpExporter, TransactionExporterBoxed};
use crate::record::TransactionRecord;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Thread-safe counters for relay activity.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    tracked: AtomicU64,
    filtered: AtomicU64,
    batches_exported: AtomicU64,
    records_exported: AtomicU64,
    export_errors: AtomicU64,
    batches_dropped: AtomicU64,
}

impl RelayMetrics {
    /// Records accepted into the buffer.
    pub fn tracked(&self) -> u64 {
        self.tracked.load(Ordering::Relaxed)
    }

    /// Records skipped by the minimum-duration filter.
    pub fn filtered(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    pub fn batches_exported(&self) -> u64 {
        self.batches_exported.load(Ordering::Relaxed)
    }

    pub fn records_exported(&self) -> u64 {
        self.records_exported.load(Ordering::Relaxed)
    }

    pub fn export_errors(&self) -> u64 {
        self.export_errors.load(Ordering::Relaxed)
    }

    /// Whole batches lost to the breaker gate, the flush-slot cap, or a
    /// missing runtime.
    pub fn batches_dropped(&self) -> u64 {
        self.batches_dropped.load(Ordering::Relaxed)
    }

    fn record_success(&self, record_count: u64) {
        self.batches_exported.fetch_add(1, Ordering::Relaxed);
        self.records_exported.fetch_add(record_count, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.export_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_drop(&self) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Buffered transaction relay.
///
/// Composes the bounded buffer, the flush scheduler, the capped sender
/// pool, and the circuit breaker behind two operations: [`track`] and
/// [`flush`].
///
/// [`track`]: Relay::track
/// [`flush`]: Relay::flush
pub struct Relay {
    config: RelayConfig,
    buffer: Mutex<TransactionBuffer>,
    breaker: Arc<Mutex<CircuitBreaker>>,
    flush_slots: Arc<Semaphore>,
    exporter: Arc<dyn TransactionExporterBoxed>,
    metrics: Arc<RelayMetrics>,
}

impl Relay {
    pub fn new(config: RelayConfig, exporter: Arc<dyn TransactionExporterBoxed>) -> Self {
        Self {
            buffer: Mutex::new(TransactionBuffer::new(config.buffer_config())),
            breaker: Arc::new(Mutex::new(CircuitBreaker::new(config.circuit_breaker.clone()))),
            flush_slots: Arc::new(Semaphore::new(config.max_pending_flushes)),
            exporter,
            metrics: Arc::new(RelayMetrics::default()),
            config,
        }
    }

    /// Wires a relay over the HTTPS exporter described by `config`.
    pub fn over_http(config: RelayConfig) -> Result<Self, ExportError> {
        let exporter = Arc::new(HttpExporter::new(&config)?);
        Ok(Self::new(config, exporter))
    }

    /// Records one completed transaction.
    ///
    /// Non-blocking and infallible from the host's point of view. Records
    /// below the minimum-duration threshold are silently skipped; everything
    /// else is buffered, and a triggered batch is launched off this call's
    /// path.
    pub fn track(&self, record: TransactionRecord) {
        if !self.config.enabled {
            return;
        }
        if record.duration_ms < self.config.min_duration_ms {
            self.metrics.filtered.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.metrics.tracked.fetch_add(1, Ordering::Relaxed);

        // Lock held for in-memory mutation only; the send happens after
        // release.
        let triggered = self.buffer.lock().accept(record);
        if let Some(batch) = triggered {
            self.spawn_flush(batch);
        }
    }

    /// Forced synchronous drain: swaps the buffer and sends inline,
    /// blocking the caller until the network call resolves or times out.
    /// Intended for process-shutdown hooks. No-op when the buffer is
    /// empty.
    pub async fn flush(&self) {
        if !self.config.enabled {
            return;
        }
        let batch = self.buffer.lock().take_batch();
        let Some(batch) = batch else { return };

        // A forced drain is deliberate, so it bypasses the breaker gate and
        // the flush-slot cap; it consumes no spawned-task slot. The outcome
        // still feeds the breaker.
        let count = batch.len() as u64;
        match self.exporter.export_boxed(batch).await {
            Ok(()) => {
                self.breaker.lock().record_success();
                self.metrics.record_success(count);
            }
            Err(e) => {
                self.breaker.lock().record_failure();
                self.metrics.record_error();
                warn!(records = count, error = %e, "forced flush failed");
            }
        }
    }

    /// Launches a batch send off the caller's path.
    ///
    /// The batch is already removed from the buffer, so every refusal here
    /// is a deliberate data-loss path: breaker open, no free flush slot, or
    /// no async runtime to spawn onto. Refused batches are dropped, not
    /// queued.
    fn spawn_flush(&self, batch: Vec<TransactionRecord>) {
        if self.breaker.lock().is_open() {
            self.metrics.record_drop();
            debug!(records = batch.len(), "circuit open, batch dropped");
            return;
        }

        let permit = match Arc::clone(&self.flush_slots).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.metrics.record_drop();
                debug!(records = batch.len(), "flush slots exhausted, batch dropped");
                return;
            }
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.metrics.record_drop();
            debug!(records = batch.len(), "no async runtime, batch dropped");
            return;
        };

        let exporter = Arc::clone(&self.exporter);
        let breaker = Arc::clone(&self.breaker);
        let metrics = Arc::clone(&self.metrics);
        let count = batch.len() as u64;

        handle.spawn(async move {
            // The permit rides in this task; dropping it releases the
            // flush slot on every exit path, panics included.
            let _permit = permit;
            match exporter.export_boxed(batch).await {
                Ok(()) => {
                    breaker.lock().record_success();
                    metrics.record_success(count);
                }
                Err(e) => {
                    breaker.lock().record_failure();
                    metrics.record_error();
                    debug!(records = count, error = %e, "batch export failed");
                }
            }
        });
    }

    /// The configuration this relay was built with. Hosts use it to align
    /// record building (e.g. the span duration floor) with the relay.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Number of records currently buffered.
    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Snapshot of the buffer-side counters.
    pub fn buffer_metrics(&self) -> BufferMetrics {
        self.buffer.lock().metrics().clone()
    }
}
