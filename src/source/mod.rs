//! Event sourcing from blob storage
//!
//! The [`BlobStore`] trait is the storage capability boundary: anything that
//! can list keys under a prefix and serve a decompressed byte stream per
//! object can feed a replay. [`EventSource`] turns an ordered object listing
//! into a lazy, one-pass sequence of [`Event`]s, skipping malformed records
//! and unreadable objects with a logged warning rather than failing the run.

mod compression;
mod fs;

pub use compression::ObjectCodec;
pub use fs::FsBlobStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use crate::error::Result;
use crate::event::{Event, EventDecoder};

/// Handle to one listed source object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHandle {
    /// Object key within the bucket
    pub key: String,
}

/// Blob store capability: list objects under a prefix in their natural order
/// and open one as a decompressing byte stream.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// List object handles whose key starts with `prefix`, in the listing's
    /// natural (lexicographic) order.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectHandle>>;

    /// Open one object as a buffered, already-decompressed byte stream
    async fn open(&self, handle: &ObjectHandle) -> Result<Box<dyn AsyncBufRead + Send + Unpin>>;
}

/// Lazy, finite, one-pass sequence of events read from a blob store.
///
/// Objects are consumed in listing order and never reordered; within an
/// object, records are newline-delimited. Re-reading requires reopening.
pub struct EventSource {
    store: Arc<dyn BlobStore>,
    decoder: EventDecoder,
    handles: VecDeque<ObjectHandle>,
    current: Option<Box<dyn AsyncBufRead + Send + Unpin>>,
    current_key: String,
    seek_to: Option<DateTime<Utc>>,
}

impl EventSource {
    /// List the bucket and prepare a sequence over every matching object.
    ///
    /// A listing failure is a source access error and aborts the replay
    /// before it starts; an empty listing is not an error here (the driver
    /// reports the zero-events outcome).
    pub async fn open(
        store: Arc<dyn BlobStore>,
        prefix: &str,
        decoder: EventDecoder,
    ) -> Result<Self> {
        let handles = store.list(prefix).await?;
        debug!(prefix = %prefix, objects = handles.len(), "opened event source");
        Ok(Self {
            store,
            decoder,
            handles: handles.into(),
            current: None,
            current_key: String::new(),
            seek_to: None,
        })
    }

    /// Discard events with `timestamp < to` without materializing their
    /// payloads. Must be called before the first `next()`.
    pub fn seek(&mut self, to: DateTime<Utc>) {
        self.seek_to = Some(to);
    }

    /// Produce the next event, or `None` at the end of the last object.
    ///
    /// Malformed records are skipped with a warning; an object that cannot be
    /// opened or read is abandoned with a warning and the next object is
    /// attempted.
    pub async fn next(&mut self) -> Result<Option<Event>> {
        loop {
            if self.current.is_none() {
                let Some(handle) = self.handles.pop_front() else {
                    return Ok(None);
                };
                match self.store.open(&handle).await {
                    Ok(reader) => {
                        self.current = Some(reader);
                        self.current_key = handle.key;
                    }
                    Err(err) => {
                        warn!(object = %handle.key, error = %err, "skipping unreadable object");
                        continue;
                    }
                }
            }

            let Some(reader) = self.current.as_mut() else {
                continue;
            };

            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!(object = %self.current_key, "object exhausted");
                    self.current = None;
                    continue;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        object = %self.current_key,
                        error = %err,
                        "read failed mid-object, moving to next object"
                    );
                    self.current = None;
                    continue;
                }
            }

            let record = line.trim();
            if record.is_empty() {
                continue;
            }

            // Seek skip: only the timestamp is parsed for records that will
            // be discarded. Once one record passes the threshold the source
            // order guarantees all later records do too.
            if let Some(seek_to) = self.seek_to {
                match self.decoder.extract_timestamp(record) {
                    Ok(timestamp) if timestamp < seek_to => continue,
                    Ok(_) => self.seek_to = None,
                    Err(err) => {
                        warn!(object = %self.current_key, error = %err, "skipping malformed record");
                        continue;
                    }
                }
            }

            match self.decoder.decode(record) {
                Ok(event) => return Ok(Some(event)),
                Err(err) => {
                    warn!(object = %self.current_key, error = %err, "skipping malformed record");
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    async fn collect(source: &mut EventSource) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = source.next().await.unwrap() {
            events.push(event);
        }
        events
    }

    fn write_gzip(path: &std::path::Path, contents: &str) {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(contents.as_bytes()).unwrap();
        std::fs::write(path, encoder.finish().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_reads_objects_in_key_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("part-001.json"),
            "{\"ts\":\"2018-01-04T00:00:00Z\",\"n\":1}\n{\"ts\":\"2018-01-04T00:00:10Z\",\"n\":2}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("part-000.json"),
            "{\"ts\":\"2018-01-03T00:00:00Z\",\"n\":0}\n",
        )
        .unwrap();

        let store = Arc::new(FsBlobStore::new(dir.path()));
        let mut source = EventSource::open(store, "", EventDecoder::new("ts"))
            .await
            .unwrap();

        let events = collect(&mut source).await;
        assert_eq!(events.len(), 3);
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_skips_malformed_records() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("events.json"),
            "{\"ts\":\"2018-01-04T00:00:00Z\"}\nnot json\n{\"other\":1}\n{\"ts\":\"2018-01-04T00:01:00Z\"}\n",
        )
        .unwrap();

        let store = Arc::new(FsBlobStore::new(dir.path()));
        let mut source = EventSource::open(store, "", EventDecoder::new("ts"))
            .await
            .unwrap();

        let events = collect(&mut source).await;
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_object_is_fatal_for_that_object_only() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a-corrupt.json.gz"), "not gzip").unwrap();
        write_gzip(
            &dir.path().join("b-good.json.gz"),
            "{\"ts\":\"2018-01-04T00:00:00Z\"}\n",
        );

        let store = Arc::new(FsBlobStore::new(dir.path()));
        let mut source = EventSource::open(store, "", EventDecoder::new("ts"))
            .await
            .unwrap();

        let events = collect(&mut source).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_seek_discards_earlier_events() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("events.json"),
            "{\"ts\":\"2018-01-04T00:00:00Z\",\"n\":1}\n\
             {\"ts\":\"2018-01-04T00:01:00Z\",\"n\":2}\n\
             {\"ts\":\"2018-01-04T00:02:00Z\",\"n\":3}\n",
        )
        .unwrap();

        let store = Arc::new(FsBlobStore::new(dir.path()));
        let mut source = EventSource::open(store, "", EventDecoder::new("ts"))
            .await
            .unwrap();
        source.seek(
            DateTime::parse_from_rfc3339("2018-01-04T00:01:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );

        let events = collect(&mut source).await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].timestamp.to_rfc3339(),
            "2018-01-04T00:01:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_empty_bucket_yields_no_events() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FsBlobStore::new(dir.path()));
        let mut source = EventSource::open(store, "", EventDecoder::new("ts"))
            .await
            .unwrap();
        assert!(source.next().await.unwrap().is_none());
        // terminal state is idempotent
        assert!(source.next().await.unwrap().is_none());
    }
}
