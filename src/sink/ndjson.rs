//! Newline-delimited JSON sink
//!
//! Writes each record payload as one line to a file or stdout. With
//! aggregation enabled, multiple payloads are packed into a single
//! JSON-array record before being written, trading per-record overhead for
//! latency the same way a batching stream producer would.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::debug;

use super::{Completion, SinkAck, StreamSink};
use crate::error::{Result, RestreamError};

/// Number of payloads packed into one aggregated record
const AGGREGATE_BATCH_SIZE: usize = 500;

struct NdjsonState {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    batch: Vec<Bytes>,
}

/// Sink writing newline-delimited records to a file or stdout
pub struct NdjsonSink {
    state: Mutex<NdjsonState>,
    aggregate: bool,
    closed: AtomicBool,
}

impl NdjsonSink {
    /// Create a sink for the given destination: `-` writes to stdout,
    /// anything else is created (or truncated) as a file.
    pub async fn create(destination: &str, aggregate: bool) -> Result<Self> {
        let writer: Box<dyn AsyncWrite + Send + Unpin> = if destination == "-" {
            Box::new(tokio::io::stdout())
        } else {
            let file = tokio::fs::File::create(destination).await.map_err(|e| {
                RestreamError::sink_submission(format!(
                    "cannot create destination {destination}: {e}"
                ))
            })?;
            Box::new(BufWriter::new(file))
        };
        Ok(Self::from_writer(writer, aggregate))
    }

    /// Create a sink over an arbitrary writer
    pub fn from_writer(writer: Box<dyn AsyncWrite + Send + Unpin>, aggregate: bool) -> Self {
        Self {
            state: Mutex::new(NdjsonState {
                writer,
                batch: Vec::new(),
            }),
            aggregate,
            closed: AtomicBool::new(false),
        }
    }

    async fn write_batch(state: &mut NdjsonState) -> Result<()> {
        if state.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut state.batch);
        let mut record = Vec::with_capacity(batch.iter().map(Bytes::len).sum::<usize>() + batch.len() + 2);
        record.push(b'[');
        for (i, payload) in batch.iter().enumerate() {
            if i > 0 {
                record.push(b',');
            }
            record.extend_from_slice(payload);
        }
        record.push(b']');
        record.push(b'\n');
        state
            .writer
            .write_all(&record)
            .await
            .map_err(|e| RestreamError::sink_submission(format!("write failed: {e}")))?;
        debug!(events = batch.len(), "wrote aggregated record");
        Ok(())
    }
}

#[async_trait]
impl StreamSink for NdjsonSink {
    async fn submit(&self, _partition_key: &str, payload: Bytes) -> Result<Completion> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RestreamError::sink_submission("sink is closed"));
        }

        let mut state = self.state.lock().await;
        if self.aggregate {
            state.batch.push(payload);
            if state.batch.len() >= AGGREGATE_BATCH_SIZE {
                Self::write_batch(&mut state).await?;
            }
        } else {
            state
                .writer
                .write_all(&payload)
                .await
                .map_err(|e| RestreamError::sink_submission(format!("write failed: {e}")))?;
            state
                .writer
                .write_all(b"\n")
                .await
                .map_err(|e| RestreamError::sink_submission(format!("write failed: {e}")))?;
        }

        // Writes are acknowledged as soon as they reach the writer; there is
        // no asynchronous delivery phase for a local destination.
        Ok(Completion::resolved(SinkAck::now()))
    }

    async fn flush(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::write_batch(&mut state).await?;
        state
            .writer
            .flush()
            .await
            .map_err(|e| RestreamError::sink_submission(format!("flush failed: {e}")))
    }

    async fn close(&self) -> Result<()> {
        self.flush().await?;
        self.closed.store(true, Ordering::Release);
        let mut state = self.state.lock().await;
        state
            .writer
            .shutdown()
            .await
            .map_err(|e| RestreamError::sink_submission(format!("close failed: {e}")))
    }
}
