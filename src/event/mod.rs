//! Event model and decoding
//!
//! A replayed [`Event`] pairs an opaque payload with the event-time extracted
//! from a configurable attribute and a partition key derived from the payload
//! bytes. The paced buffer later wraps it into a [`ScheduledEvent`] carrying
//! the wall-clock instant at which it should be emitted; neither is mutated
//! after construction.

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::time::Instant;

use crate::error::{Result, RestreamError};

/// Timestamp format used by datasets exported from relational stores,
/// e.g. `2018-01-04 06:30:00`
const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One historical event read from the source
#[derive(Debug, Clone)]
pub struct Event {
    /// Event-time parsed from the payload
    pub timestamp: DateTime<Utc>,
    /// Raw record bytes, retained verbatim
    pub payload: Bytes,
    /// Stable partition key derived from the payload bytes
    pub partition_key: String,
}

/// An event annotated with the wall-clock instant at which it should be
/// emitted. Created by the paced buffer; immutable after.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub event: Event,
    pub scheduled_at: Instant,
}

/// Derive a stable partition key from payload bytes.
///
/// CRC32 keeps the key deterministic across processes so a re-run of the same
/// dataset shards identically.
pub fn partition_key(payload: &[u8]) -> String {
    crc32fast::hash(payload).to_string()
}

/// Parses one decompressed record into an [`Event`]
#[derive(Debug, Clone)]
pub struct EventDecoder {
    timestamp_attribute: String,
}

impl EventDecoder {
    /// Create a decoder extracting event-time from the named payload attribute
    pub fn new(timestamp_attribute: impl Into<String>) -> Self {
        Self {
            timestamp_attribute: timestamp_attribute.into(),
        }
    }

    /// The payload attribute this decoder reads event-time from
    pub fn timestamp_attribute(&self) -> &str {
        &self.timestamp_attribute
    }

    /// Extract only the event-time from a record, without building an event.
    ///
    /// Used for seek skipping, where the payload of a discarded record never
    /// needs to be materialized.
    pub fn extract_timestamp(&self, record: &str) -> Result<DateTime<Utc>> {
        let value: Value = serde_json::from_str(record)
            .map_err(|e| RestreamError::decode(format!("invalid JSON record: {e}")))?;
        let field = value.get(&self.timestamp_attribute).ok_or_else(|| {
            RestreamError::decode(format!(
                "missing timestamp attribute `{}`",
                self.timestamp_attribute
            ))
        })?;
        parse_timestamp(field, &self.timestamp_attribute)
    }

    /// Decode one record line into an [`Event`]
    pub fn decode(&self, record: &str) -> Result<Event> {
        let timestamp = self.extract_timestamp(record)?;
        let payload = Bytes::copy_from_slice(record.as_bytes());
        let partition_key = partition_key(&payload);
        Ok(Event {
            timestamp,
            payload,
            partition_key,
        })
    }
}

/// Parse a timestamp value as RFC 3339, `%Y-%m-%d %H:%M:%S` (assumed UTC),
/// or integer epoch milliseconds.
fn parse_timestamp(value: &Value, attribute: &str) -> Result<DateTime<Utc>> {
    match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(raw, NAIVE_TIMESTAMP_FORMAT).map(|naive| naive.and_utc())
            })
            .map_err(|_| {
                RestreamError::decode(format!(
                    "timestamp attribute `{attribute}` has unsupported format: {raw:?}"
                ))
            }),
        Value::Number(num) => num
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or_else(|| {
                RestreamError::decode(format!(
                    "timestamp attribute `{attribute}` is not a valid epoch-millisecond value: {num}"
                ))
            }),
        other => Err(RestreamError::decode(format!(
            "timestamp attribute `{attribute}` is neither string nor number: {other}"
        ))),
    }
}
