//! Batch transport: the exporter trait and its backends.
//!
//! [`TransactionExporter`] is the seam between the relay and the network:
//! one call, one batch, one attempt. Resilience (suppression after
//! sustained failure, the concurrency cap, retry by accumulating a new
//! batch) lives in the relay, never in an exporter.

use crate::config::RelayConfig;
use crate::record::TransactionRecord;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Transport-level connect timeout for a single send.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Cap on the whole request (connect, write, read) for a single send.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Error types for batch export operations.
#[derive(Debug, Error, Clone)]
pub enum ExportError {
    /// Transport-layer error (connection refused, DNS, TLS).
    #[error("transport error: {0}")]
    Transport(String),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Collector answered with a non-2xx status. The body is not
    /// interpreted.
    #[error("collector responded with status {0}")]
    Status(u16),
    /// Export operation timed out.
    #[error("export timed out")]
    Timeout,
}

/// Trait for sending one batch of transactions to a backend.
///
/// Uses native async fn in traits. The `impl Future` return type is not
/// object-safe; for dynamic dispatch use [`TransactionExporterBoxed`].
pub trait TransactionExporter: Send + Sync {
    /// Sends one batch. Exactly one attempt: implementations must not
    /// retry.
    fn export(
        &self,
        batch: Vec<TransactionRecord>,
    ) -> impl Future<Output = Result<(), ExportError>> + Send;

    /// Returns the exporter name for diagnostics.
    fn name(&self) -> &str;
}

/// Object-safe version of [`TransactionExporter`] for dynamic dispatch.
pub trait TransactionExporterBoxed: Send + Sync {
    /// Sends one batch (boxed future for object safety).
    fn export_boxed(
        &self,
        batch: Vec<TransactionRecord>,
    ) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>>;

    /// Returns the exporter name for diagnostics.
    fn name(&self) -> &str;
}

/// Blanket implementation: any `TransactionExporter` can be used boxed.
impl<T: TransactionExporter> TransactionExporterBoxed for T {
    fn export_boxed(
        &self,
        batch: Vec<TransactionRecord>,
    ) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>> {
        Box::pin(self.export(batch))
    }

    fn name(&self) -> &str {
        TransactionExporter::name(self)
    }
}

/// Wire envelope for a batched POST.
#[derive(Serialize)]
struct BatchEnvelope<'a> {
    transactions: &'a [TransactionRecord],
}

/// HTTPS exporter that POSTs batches to the collector endpoint.
pub struct HttpExporter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpExporter {
    /// Builds the client with bounded timeouts. Fails only if the TLS
    /// backend cannot initialize.
    pub fn new(config: &RelayConfig) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(!config.verify_tls)
            .user_agent(concat!("txn-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExportError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

impl TransactionExporter for HttpExporter {
    async fn export(&self, batch: Vec<TransactionRecord>) -> Result<(), ExportError> {
        let body = serde_json::to_vec(&BatchEnvelope {
            transactions: &batch,
        })
        .map_err(|e| ExportError::Serialization(e.to_string()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("X-Api-Key", &self.api_key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExportError::Timeout
                } else {
                    ExportError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ExportError::Status(status.as_u16()))
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Exporter that discards all batches (for benchmarking and demos).
pub struct NullExporter;

impl NullExporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionExporter for NullExporter {
    async fn export(&self, _batch: Vec<TransactionRecord>) -> Result<(), ExportError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Test exporter that records every batch for verification.
#[cfg(test)]
pub(crate) struct RecordingExporter {
    batches: std::sync::Mutex<Vec<Vec<TransactionRecord>>>,
}

#[cfg(test)]
impl RecordingExporter {
    pub fn new() -> Self {
        Self {
            batches: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn record_count(&self) -> usize {
        self.batches.lock().unwrap().iter().map(Vec::len).sum()
    }

    pub fn batches(&self) -> Vec<Vec<TransactionRecord>> {
        self.batches.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl TransactionExporter for RecordingExporter {
    async fn export(&self, batch: Vec<TransactionRecord>) -> Result<(), ExportError> {
        self.batches.lock().unwrap().push(batch);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Test exporter that always fails, counting attempts.
#[cfg(test)]
pub(crate) struct FailingExporter {
    attempts: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl FailingExporter {
    pub fn new() -> Self {
        Self {
            attempts: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl TransactionExporter for FailingExporter {
    async fn export(&self, _batch: Vec<TransactionRecord>) -> Result<(), ExportError> {
        self.attempts
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Err(ExportError::Transport("simulated failure".into()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TransactionRecord;

    #[test]
    fn test_envelope_shape() {
        let batch = vec![
            TransactionRecord::builder("users/show", "GET")
                .duration_ms(42.0)
                .build(),
        ];
        let json = serde_json::to_value(&BatchEnvelope {
            transactions: &batch,
        })
        .unwrap();

        let transactions = json["transactions"].as_array().unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0]["endpoint"], "users/show");
    }

    #[test]
    fn test_http_exporter_builds_from_config() {
        let config = RelayConfig {
            api_key: "k-123".into(),
            verify_tls: false,
            ..RelayConfig::default()
        };
        let exporter = HttpExporter::new(&config).unwrap();
        assert_eq!(TransactionExporter::name(&exporter), "http");
    }

    #[tokio::test]
    async fn test_null_exporter() {
        let exporter = NullExporter::new();
        let batch = vec![
            TransactionRecord::builder("users/show", "GET").build();
            100
        ];
        exporter.export(batch).await.unwrap();
    }

    #[tokio::test]
    async fn test_boxed_dispatch() {
        use std::sync::Arc;

        let exporter: Arc<dyn TransactionExporterBoxed> = Arc::new(RecordingExporter::new());
        exporter.export_boxed(Vec::new()).await.unwrap();
        assert_eq!(exporter.name(), "recording");
    }
}
