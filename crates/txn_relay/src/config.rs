//! Read-only configuration consumed by the relay.
//!
//! The host owns config loading (file format, environment overrides,
//! reload policy); the relay only reads a populated [`RelayConfig`]. Every
//! field has a default, so a host can deserialize a partial mapping.

use crate::breaker::CircuitBreakerConfig;
use crate::buffer::BufferConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Master switch; when false, `track` and `flush` are no-ops.
    pub enabled: bool,
    /// Collector endpoint for batched transactions.
    pub endpoint: String,
    /// Opaque credential sent in the api-key header.
    pub api_key: String,
    /// Verify the collector's TLS certificate.
    pub verify_tls: bool,
    /// Transactions faster than this are silently skipped, not buffered.
    pub min_duration_ms: u64,
    /// Spans shorter than this are dropped by the record builder.
    pub min_span_duration_ms: f64,
    /// Size trigger for the flush scheduler.
    pub batch_size: usize,
    /// Time trigger for the flush scheduler, in seconds.
    pub flush_interval_secs: u64,
    /// Hard capacity of the pending buffer.
    pub max_buffer_size: usize,
    /// Cap on concurrently in-flight sends.
    pub max_pending_flushes: usize,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://localhost:8443/v1/transactions".to_string(),
            api_key: String::new(),
            verify_tls: true,
            min_duration_ms: 0,
            min_span_duration_ms: 0.0,
            batch_size: 100,
            flush_interval_secs: 30,
            max_buffer_size: 1000,
            max_pending_flushes: 3,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl RelayConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// The buffer-side slice of this configuration.
    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig {
            max_buffer_size: self.max_buffer_size,
            batch_size: self.batch_size,
            flush_interval: self.flush_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_pending_flushes, 3);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.cooldown_secs, 60);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: RelayConfig = serde_json::from_str(
            r#"{"batch_size": 2, "api_key": "k-123", "circuit_breaker": {"cooldown_secs": 10}}"#,
        )
        .unwrap();

        assert_eq!(config.batch_size, 2);
        assert_eq!(config.api_key, "k-123");
        assert_eq!(config.circuit_breaker.cooldown_secs, 10);
        // Untouched fields keep their defaults.
        assert_eq!(config.max_buffer_size, 1000);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }
}
