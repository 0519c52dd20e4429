//! Transaction record data model and builder.
//!
//! A [`TransactionRecord`] describes one completed unit of host work (for
//! example one HTTP request) together with optional timing breakdowns and a
//! bounded list of [`SpanRecord`] sub-operations. Records are built once via
//! [`RecordBuilder`], are immutable afterwards, and serialize straight into
//! the wire form: absent optional fields are omitted entirely, never sent
//! as `null`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Hard cap on spans attached to one transaction.
pub const MAX_SPANS: usize = 128;

/// Hard cap on metadata entries per record and per span.
pub const MAX_METADATA_ENTRIES: usize = 64;

/// A scalar metadata value.
///
/// Serializes untagged, so `{"shard": 3, "cached": true}` comes out as
/// plain JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        // JSON has no NaN or infinity; serde_json would emit null, which
        // the wire form never carries.
        Self::Float(if v.is_finite() { v } else { 0.0 })
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// String-keyed scalar metadata attached to records and spans.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A timed sub-operation nested inside a transaction, e.g. one query.
#[derive(Debug, Clone, Serialize)]
pub struct SpanRecord {
    /// Span category, e.g. `"sql"` or `"cache"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Operation name, e.g. `"SELECT users"`.
    pub name: String,
    /// Rounded to 2 decimals at construction.
    pub duration_ms: f64,
    /// Start offset relative to the transaction start, rounded to 2 decimals.
    pub offset_ms: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl SpanRecord {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        duration_ms: f64,
        offset_ms: f64,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            duration_ms: round2(duration_ms),
            offset_ms: round2(offset_ms),
            metadata: Metadata::new(),
        }
    }

    /// Attaches one metadata entry; entries beyond the cap are ignored.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        if self.metadata.len() < MAX_METADATA_ENTRIES {
            self.metadata.insert(key.into(), value.into());
        }
        self
    }
}

/// One completed unit of host work.
///
/// Created once at `track()` time and immutable thereafter; owned by the
/// buffer until it is handed off in a batch or evicted.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    /// Logical operation name, e.g. `"users/show"`.
    pub endpoint: String,
    pub method: String,
    pub duration_ms: u64,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<SpanRecord>,
    /// UTC instant at creation; RFC3339 on the wire.
    pub timestamp: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn builder(endpoint: impl Into<String>, method: impl Into<String>) -> RecordBuilder {
        RecordBuilder::new(endpoint, method)
    }
}

/// Best-effort record construction: malformed input never errors.
///
/// Durations arrive as `f64` because host instrumentation usually hands
/// over values derived from float seconds; they are coerced to non-negative
/// whole milliseconds (NaN, infinities and negatives clamp to 0).
#[derive(Debug)]
pub struct RecordBuilder {
    endpoint: String,
    method: String,
    duration_ms: u64,
    status_code: u16,
    db_time_ms: Option<u64>,
    view_time_ms: Option<u64>,
    request_id: Option<String>,
    metadata: Metadata,
    spans: Vec<SpanRecord>,
    min_span_duration_ms: f64,
}

impl RecordBuilder {
    pub fn new(endpoint: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            duration_ms: 0,
            status_code: 200,
            db_time_ms: None,
            view_time_ms: None,
            request_id: None,
            metadata: Metadata::new(),
            spans: Vec::new(),
            min_span_duration_ms: 0.0,
        }
    }

    pub fn duration_ms(mut self, ms: f64) -> Self {
        self.duration_ms = clamp_ms(ms);
        self
    }

    pub fn status_code(mut self, code: u16) -> Self {
        self.status_code = code;
        self
    }

    pub fn db_time_ms(mut self, ms: f64) -> Self {
        self.db_time_ms = Some(clamp_ms(ms));
        self
    }

    pub fn view_time_ms(mut self, ms: f64) -> Self {
        self.view_time_ms = Some(clamp_ms(ms));
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Attaches one metadata entry; entries beyond the cap are ignored.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        if self.metadata.len() < MAX_METADATA_ENTRIES {
            self.metadata.insert(key.into(), value.into());
        }
        self
    }

    /// Spans with a duration below this are discarded at insertion.
    pub fn min_span_duration_ms(mut self, ms: f64) -> Self {
        self.min_span_duration_ms = ms;
        self
    }

    /// Attaches a span.
    ///
    /// Filtering happens here, at insertion, never retroactively: spans
    /// below the minimum duration and spans beyond [`MAX_SPANS`] are
    /// silently dropped.
    pub fn span(mut self, span: SpanRecord) -> Self {
        if span.duration_ms < self.min_span_duration_ms {
            return self;
        }
        if self.spans.len() < MAX_SPANS {
            self.spans.push(span);
        }
        self
    }

    pub fn build(self) -> TransactionRecord {
        TransactionRecord {
            endpoint: self.endpoint,
            method: self.method,
            duration_ms: self.duration_ms,
            status_code: self.status_code,
            db_time_ms: self.db_time_ms,
            view_time_ms: self.view_time_ms,
            request_id: self.request_id,
            metadata: self.metadata,
            spans: self.spans,
            timestamp: Utc::now(),
        }
    }
}

/// Coerces a float duration to non-negative whole milliseconds.
fn clamp_ms(ms: f64) -> u64 {
    if ms.is_finite() && ms > 0.0 {
        ms.round() as u64
    } else {
        0
    }
}

fn round2(v: f64) -> f64 {
    if v.is_finite() {
        (v * 100.0).round() / 100.0
    } else {
        0.0
    }
}
