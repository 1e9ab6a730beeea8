//! In-memory stream sink
//!
//! Records every submission and either acknowledges it immediately or leaves
//! the completion to be resolved by the caller. The manual mode is what makes
//! out-of-order and failing acknowledgements reproducible in tests; the
//! immediate mode doubles as a trivial reference implementation of the sink
//! capability.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{Completion, CompletionSender, SinkAck, StreamSink};
use crate::error::{Result, RestreamError};

/// How submissions are acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Every submission resolves successfully at submit time
    Immediate,
    /// Completions stay pending until resolved via [`InMemorySink::complete`]
    /// or [`InMemorySink::fail`]
    Manual,
}

/// In-memory sink capturing submissions for inspection
pub struct InMemorySink {
    mode: AckMode,
    records: Mutex<Vec<(String, Bytes)>>,
    pending: Mutex<HashMap<usize, CompletionSender>>,
    completions: Mutex<Vec<Completion>>,
    closed: AtomicBool,
    flush_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl InMemorySink {
    /// Sink that acknowledges every submission immediately
    pub fn immediate() -> Self {
        Self::new(AckMode::Immediate)
    }

    /// Sink whose completions are resolved manually by the test
    pub fn manual() -> Self {
        Self::new(AckMode::Manual)
    }

    fn new(mode: AckMode) -> Self {
        Self {
            mode,
            records: Mutex::new(Vec::new()),
            pending: Mutex::new(HashMap::new()),
            completions: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            flush_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Snapshot of all submitted records, in submission order
    pub fn records(&self) -> Vec<(String, Bytes)> {
        self.records.lock().clone()
    }

    /// Number of submissions so far
    pub fn submitted(&self) -> usize {
        self.records.lock().len()
    }

    /// Number of completions still unresolved (manual mode)
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Resolve the completion of the record at `index` as successful.
    /// Returns false if it was already resolved or never existed.
    pub fn complete(&self, index: usize) -> bool {
        match self.pending.lock().remove(&index) {
            Some(sender) => {
                sender.succeed();
                true
            }
            None => false,
        }
    }

    /// Resolve the completion of the record at `index` as failed
    pub fn fail(&self, index: usize, message: impl Into<String>) -> bool {
        match self.pending.lock().remove(&index) {
            Some(sender) => {
                sender.fail(message);
                true
            }
            None => false,
        }
    }

    /// How many times `flush` was invoked
    pub fn flush_calls(&self) -> usize {
        self.flush_calls.load(Ordering::Acquire)
    }

    /// How many times `close` was invoked
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl StreamSink for InMemorySink {
    async fn submit(&self, partition_key: &str, payload: Bytes) -> Result<Completion> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RestreamError::sink_submission("sink is closed"));
        }

        let index = {
            let mut records = self.records.lock();
            records.push((partition_key.to_string(), payload));
            records.len() - 1
        };

        let completion = match self.mode {
            AckMode::Immediate => Completion::resolved(SinkAck::now()),
            AckMode::Manual => {
                let (sender, completion) = Completion::channel();
                self.pending.lock().insert(index, sender);
                completion
            }
        };

        self.completions.lock().push(completion.clone());
        Ok(completion)
    }

    async fn flush(&self) -> Result<()> {
        self.flush_calls.fetch_add(1, Ordering::AcqRel);
        let completions: Vec<Completion> = self.completions.lock().clone();
        for completion in completions {
            // flush waits for resolution, success or failure alike
            let _ = completion.wait().await;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::AcqRel);
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
