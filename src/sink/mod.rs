//! Stream sink capability
//!
//! The sink is the downstream boundary of the replay pipeline: it accepts a
//! (partition key, payload) pair and acknowledges it asynchronously through a
//! [`Completion`] handle. Completions may resolve in any order; the
//! backpressure gate and watermark tracker are both built around that.
//!
//! A [`Completion`] is cheaply clonable so several observers can await the
//! same acknowledgement. A sink that drops its [`CompletionSender`] without
//! resolving it produces an error completion rather than a hang, so a lost
//! acknowledgement can never leak a backpressure slot.

mod memory;
mod ndjson;

pub use memory::{AckMode, InMemorySink};
pub use ndjson::NdjsonSink;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::error::Result;

/// Successful acknowledgement of one emission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkAck {
    /// Wall-clock time at which the sink confirmed the emission
    pub completed_at: DateTime<Utc>,
}

impl SinkAck {
    /// An acknowledgement timestamped now
    pub fn now() -> Self {
        Self {
            completed_at: Utc::now(),
        }
    }
}

/// Asynchronous failure reported through a completion handle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sink completion failed: {message}")]
pub struct CompletionError {
    pub message: String,
}

impl CompletionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Outcome of one asynchronous emission
pub type CompletionResult = std::result::Result<SinkAck, CompletionError>;

/// Clonable handle resolving once the sink acknowledges (or rejects) one
/// emission.
#[derive(Clone)]
pub struct Completion {
    inner: Shared<BoxFuture<'static, CompletionResult>>,
}

impl Completion {
    /// Create a sender/handle pair for an emission the sink resolves later
    pub fn channel() -> (CompletionSender, Completion) {
        let (tx, rx) = oneshot::channel();
        let inner = async move {
            match rx.await {
                Ok(result) => result,
                // Sender dropped without resolving: surface as a failure so
                // observers are released rather than stuck.
                Err(_) => Err(CompletionError::new("completion dropped before resolving")),
            }
        }
        .boxed()
        .shared();
        (CompletionSender { tx }, Completion { inner })
    }

    /// A completion that already succeeded, for synchronous sinks
    pub fn resolved(ack: SinkAck) -> Self {
        Self {
            inner: async move { Ok(ack) }.boxed().shared(),
        }
    }

    /// A completion that already failed
    pub fn failed(error: CompletionError) -> Self {
        Self {
            inner: async move { Err(error) }.boxed().shared(),
        }
    }

    /// Await the acknowledgement. Safe to call from any number of clones.
    pub async fn wait(&self) -> CompletionResult {
        self.inner.clone().await
    }

    /// The result, if already resolved
    pub fn peek(&self) -> Option<CompletionResult> {
        self.inner.peek().cloned()
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("resolved", &self.inner.peek().is_some())
            .finish()
    }
}

/// Single-assignment resolver for a [`Completion`]
#[derive(Debug)]
pub struct CompletionSender {
    tx: oneshot::Sender<CompletionResult>,
}

impl CompletionSender {
    /// Resolve the completion as acknowledged now
    pub fn succeed(self) {
        let _ = self.tx.send(Ok(SinkAck::now()));
    }

    /// Resolve the completion as failed
    pub fn fail(self, message: impl Into<String>) {
        let _ = self.tx.send(Err(CompletionError::new(message)));
    }
}

/// Stream sink capability
///
/// `submit` hands over one record and returns its completion handle;
/// rejection at submission time is a synchronous error and the record is
/// considered dropped by the caller. `flush` blocks until every previously
/// submitted record has completed (successfully or not); `close` releases
/// the sink's resources.
#[async_trait]
pub trait StreamSink: Send + Sync {
    /// Submit one record for asynchronous delivery
    async fn submit(&self, partition_key: &str, payload: Bytes) -> Result<Completion>;

    /// Wait for all previously submitted records to complete
    async fn flush(&self) -> Result<()>;

    /// Release the sink's resources
    async fn close(&self) -> Result<()>;
}
