//! Buffered transaction telemetry relay.
//!
//! Hosts call [`Relay::track`] once per completed unit of work (for example
//! one HTTP request); the relay buffers records in bounded memory, batches
//! them, and ships them to a remote collector on spawned sender tasks.
//!
//! The central contract is that telemetry never degrades the host:
//! [`Relay::track`] does no I/O, nothing in the crate propagates an error
//! or a panic back into the request path, and overload is resolved by
//! documented, bounded data loss (oldest-record eviction, whole-batch
//! drops) instead of blocking. Sustained collector failure trips a circuit
//! breaker that suppresses sends for a cooldown window.
//!
//! ```no_run
//! use std::sync::Arc;
//! use txn_relay::{Relay, RelayConfig, TransactionRecord};
//!
//! # async fn example() {
//! let relay = Arc::new(Relay::over_http(RelayConfig::default()).unwrap());
//!
//! relay.track(
//!     TransactionRecord::builder("users/show", "GET")
//!         .duration_ms(42.0)
//!         .status_code(200)
//!         .build(),
//! );
//!
//! // At process shutdown:
//! relay.flush().await;
//! # }
//! ```

pub mod breaker;
pub mod buffer;
pub mod config;
pub mod exporter;
pub mod record;
pub mod relay;

// Re-export main types
pub use breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use buffer::{BufferConfig, BufferMetrics, TransactionBuffer};
pub use config::RelayConfig;
pub use exporter::{
    ExportError, HttpExporter, NullExporter, TransactionExporter, TransactionExporterBoxed,
};
pub use record::{
    Metadata, MetadataValue, RecordBuilder, SpanRecord, TransactionRecord, MAX_METADATA_ENTRIES,
    MAX_SPANS,
};
pub use relay::{Relay, RelayMetrics};
