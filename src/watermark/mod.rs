//! Watermark tracking
//!
//! Tracks the event-time frontier of the replay: the smallest event timestamp
//! that is still unacknowledged by the sink, or the latest acknowledged
//! timestamp once nothing is outstanding. A background task periodically
//! emits the frontier into the stream as a synthetic watermark record so
//! downstream consumers can advance their own event-time clocks even when the
//! replayed data is sparse.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::sink::{Completion, StreamSink};

/// Partition key used for synthetic watermark records
pub const WATERMARK_PARTITION_KEY: &str = "watermark";

struct TrackerState {
    /// Outstanding (timestamp millis, sequence) pairs; the sequence
    /// disambiguates events sharing a timestamp.
    outstanding: BTreeSet<(i64, u64)>,
    next_seq: u64,
    /// Largest acknowledged timestamp, the frontier once nothing is in flight
    last_completed: Option<i64>,
    /// Last watermark handed out, never regressed past
    emitted: Option<i64>,
}

/// Tracks unacknowledged event timestamps and derives the replay watermark.
///
/// Cheaply clonable; the driver tracks emissions while the periodic emitter
/// task reads the frontier.
#[derive(Clone)]
pub struct WatermarkTracker {
    state: Arc<Mutex<TrackerState>>,
    stop: watch::Sender<bool>,
}

impl WatermarkTracker {
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(TrackerState {
                outstanding: BTreeSet::new(),
                next_seq: 0,
                last_completed: None,
                emitted: None,
            })),
            stop,
        }
    }

    /// Register one emission: its timestamp holds the watermark back until
    /// `completion` resolves. Failed completions release the timestamp too;
    /// a record the sink has rejected can no longer be delivered and must not
    /// pin the frontier forever.
    pub fn track(&self, timestamp: DateTime<Utc>, completion: Completion) {
        let entry = {
            let mut state = self.state.lock();
            let entry = (timestamp.timestamp_millis(), state.next_seq);
            state.next_seq += 1;
            state.outstanding.insert(entry);
            entry
        };

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let acknowledged = completion.wait().await.is_ok();
            let mut state = state.lock();
            state.outstanding.remove(&entry);
            // only acknowledged timestamps carry the frontier; a failed
            // record just stops holding it back
            if acknowledged {
                state.last_completed = Some(match state.last_completed {
                    Some(last) => last.max(entry.0),
                    None => entry.0,
                });
            }
        });
    }

    /// Current event-time frontier: the minimum outstanding timestamp, or the
    /// latest acknowledged one when nothing is in flight. `None` until the
    /// first emission has been tracked. The returned value never regresses.
    pub fn min_watermark(&self) -> Option<DateTime<Utc>> {
        let mut state = self.state.lock();
        let candidate = match state.outstanding.first() {
            Some(&(millis, _)) => millis,
            None => match state.last_completed {
                Some(millis) => millis,
                // nothing acknowledged yet; hold whatever was last emitted
                None => state.emitted?,
            },
        };

        let millis = match state.emitted {
            Some(prev) if candidate < prev => {
                warn!(
                    candidate = candidate,
                    previous = prev,
                    "watermark regression detected, holding previous value"
                );
                prev
            }
            _ => {
                state.emitted = Some(candidate);
                candidate
            }
        };
        Utc.timestamp_millis_opt(millis).single()
    }

    /// Number of tracked emissions still unacknowledged
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    /// Whether at least one tracked emission has been acknowledged
    pub fn has_completed(&self) -> bool {
        self.state.lock().last_completed.is_some()
    }

    /// Spawn the periodic emitter: every `period`, the current frontier is
    /// written to `sink` as a synthetic record carrying the timestamp under
    /// `timestamp_attribute`. Nothing is emitted before the first
    /// acknowledgement or while the frontier has not advanced since the last
    /// emission. Runs until [`WatermarkTracker::interrupt`].
    pub fn start_emitter(
        &self,
        sink: Arc<dyn StreamSink>,
        period: std::time::Duration,
        timestamp_attribute: &str,
    ) -> tokio::task::JoinHandle<()> {
        let tracker = self.clone();
        let mut stop = self.stop.subscribe();
        let attribute = timestamp_attribute.to_string();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick fires immediately and would emit before any
            // event has been tracked
            ticker.tick().await;
            let mut last_published: Option<DateTime<Utc>> = None;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tracker.emit_watermark(sink.as_ref(), &attribute, &mut last_published).await;
                    }
                    _ = async { let _ = stop.wait_for(|stopped| *stopped).await; } => {
                        debug!("watermark emitter stopped");
                        return;
                    }
                }
            }
        })
    }

    async fn emit_watermark(
        &self,
        sink: &dyn StreamSink,
        attribute: &str,
        last_published: &mut Option<DateTime<Utc>>,
    ) {
        if !self.has_completed() {
            return;
        }
        let Some(watermark) = self.min_watermark() else {
            return;
        };
        if last_published.is_some_and(|previous| watermark <= previous) {
            return;
        }
        let mut record = serde_json::Map::new();
        record.insert(
            attribute.to_string(),
            serde_json::Value::String(watermark.to_rfc3339()),
        );
        record.insert("watermark".to_string(), serde_json::Value::Bool(true));
        let payload = bytes::Bytes::from(serde_json::Value::Object(record).to_string());
        match sink.submit(WATERMARK_PARTITION_KEY, payload).await {
            Ok(_completion) => {
                *last_published = Some(watermark);
                info!(watermark = %watermark, "emitted watermark");
            }
            Err(err) => {
                warn!(error = %err, "failed to emit watermark");
            }
        }
    }

    /// Stop the periodic emitter. Tracking state stays readable.
    pub fn interrupt(&self) {
        let _ = self.stop.send(true);
    }
}

impl Default for WatermarkTracker {
    fn default() -> Self {
        Self::new()
    }
}
