//! End-to-end relay demo against a simulated flaky collector.
//!
//! Spawns a handful of producer tasks that track synthetic transactions
//! through a shared [`Relay`] while the "collector" fails a configurable
//! fraction of sends. Watch the circuit breaker open and recover, the
//! flush-slot cap refuse batches under load, and the final forced drain on
//! shutdown.
//!
//! ```bash
//! RUST_LOG=txn_relay=debug cargo run -p txn_relay --bin demo
//! ```

use anyhow::Result;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use txn_relay::{
    ExportError, Relay, RelayConfig, SpanRecord, TransactionExporter, TransactionRecord,
};

/// A simulated collector backend that fails a fraction of sends and takes
/// a little while to answer.
struct FlakyCollector {
    failure_rate: f64,
    latency: Duration,
    attempts: AtomicU64,
    accepted_records: AtomicU64,
}

impl FlakyCollector {
    fn new(failure_rate: f64, latency: Duration) -> Self {
        Self {
            failure_rate,
            latency,
            attempts: AtomicU64::new(0),
            accepted_records: AtomicU64::new(0),
        }
    }
}

impl TransactionExporter for FlakyCollector {
    fn export(
        &self,
        batch: Vec<TransactionRecord>,
    ) -> impl Future<Output = Result<(), ExportError>> + Send {
        let fail = rand::random::<f64>() < self.failure_rate;
        async move {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(self.latency).await;
            if fail {
                Err(ExportError::Status(503))
            } else {
                self.accepted_records
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    fn name(&self) -> &str {
        "flaky-collector"
    }
}

fn synthetic_record(producer: usize, seq: u64, min_span_ms: f64) -> TransactionRecord {
    let endpoints = ["users/show", "users/index", "orders/create", "search"];
    let endpoint = endpoints[seq as usize % endpoints.len()];
    let duration = 5.0 + rand::random::<f64>() * 200.0;

    TransactionRecord::builder(endpoint, "GET")
        .duration_ms(duration)
        .status_code(200)
        .db_time_ms(duration * 0.4)
        .request_id(format!("p{}-{}", producer, seq))
        .min_span_duration_ms(min_span_ms)
        .span(SpanRecord::new("sql", "SELECT", duration * 0.4, 1.0))
        .build()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "txn_relay=debug".into()),
        )
        .init();

    let collector = Arc::new(FlakyCollector::new(0.3, Duration::from_millis(20)));
    let relay = Arc::new(Relay::new(
        RelayConfig {
            batch_size: 25,
            flush_interval_secs: 2,
            min_span_duration_ms: 0.5,
            ..RelayConfig::default()
        },
        Arc::clone(&collector) as Arc<dyn txn_relay::TransactionExporterBoxed>,
    ));

    println!("producing 4 x 500 transactions against a 30%-flaky collector...");

    let mut producers = Vec::new();
    for producer_id in 0..4 {
        let relay = Arc::clone(&relay);
        producers.push(tokio::spawn(async move {
            let min_span_ms = relay.config().min_span_duration_ms;
            for seq in 0..500u64 {
                relay.track(synthetic_record(producer_id, seq, min_span_ms));
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }));
    }

    for producer in producers {
        producer.await?;
    }

    // Give in-flight sends a moment, then force-drain the remainder.
    tokio::time::sleep(Duration::from_millis(200)).await;
    relay.flush().await;

    let metrics = relay.metrics();
    let buffer = relay.buffer_metrics();
    println!("\n=== relay ===");
    println!("tracked:           {}", metrics.tracked());
    println!("batches exported:  {}", metrics.batches_exported());
    println!("records exported:  {}", metrics.records_exported());
    println!("export errors:     {}", metrics.export_errors());
    println!("batches dropped:   {}", metrics.batches_dropped());
    println!("records evicted:   {}", buffer.evicted);
    println!("\n=== collector ===");
    println!("send attempts:     {}", collector.attempts.load(Ordering::Relaxed));
    println!(
        "records accepted:  {}",
        collector.accepted_records.load(Ordering::Relaxed)
    );

    Ok(())
}
