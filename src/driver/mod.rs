//! Replay driver
//!
//! The single control loop of the pipeline: takes scheduled events off the
//! buffer, sleeps until each one's emission instant, submits it to the sink,
//! and registers the completion with the backpressure gate and the watermark
//! tracker. Emission order equals read order; pacing sleeps are local to this
//! loop and never stall the producer or the sink.
//!
//! Shutdown is cooperative through a watch channel: a raised signal unblocks
//! the take, the pacing sleep, and the gate acquisition, and the finalization
//! sequence (interrupt buffer and tracker, flush and close the sink) runs on
//! every exit path.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::backpressure::BackpressureGate;
use crate::buffer::PacedEventBuffer;
use crate::error::Result;
use crate::sink::StreamSink;
use crate::watermark::WatermarkTracker;

/// Final accounting of one replay run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Events successfully submitted to the sink
    pub events_emitted: u64,
    /// Events rejected synchronously at submission
    pub events_dropped: u64,
    /// Asynchronous completion failures observed by the gate
    pub sink_errors: u64,
    /// Wall-clock duration of the replay loop
    pub elapsed: Duration,
}

/// Coordinates buffer, gate, tracker and sink for one replay run
pub struct ReplayDriver {
    buffer: PacedEventBuffer,
    gate: Arc<BackpressureGate>,
    tracker: Option<WatermarkTracker>,
    sink: Arc<dyn StreamSink>,
    statistics_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl ReplayDriver {
    pub fn new(
        buffer: PacedEventBuffer,
        gate: Arc<BackpressureGate>,
        tracker: Option<WatermarkTracker>,
        sink: Arc<dyn StreamSink>,
        statistics_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            buffer,
            gate,
            tracker,
            sink,
            statistics_interval,
            shutdown,
        }
    }

    /// Run the replay to completion (or interruption) and finalize.
    ///
    /// Finalization runs regardless of how the loop exits: the buffer and
    /// watermark emitter are interrupted, then the sink is flushed (waiting
    /// for every outstanding completion) and closed.
    pub async fn run(mut self) -> Result<ReplayStats> {
        let outcome = self.run_loop().await;
        let finalize_result = self.finalize().await;
        let mut stats = outcome?;
        finalize_result?;
        // every watcher has resolved after the finalize drain
        stats.sink_errors = self.gate.error_count();
        Ok(stats)
    }

    async fn run_loop(&mut self) -> Result<ReplayStats> {
        let mut stats = ReplayStats::default();

        if self.buffer.peek().await.is_none() {
            warn!("no events found, nothing to replay");
            return Ok(stats);
        }

        let started = Instant::now();
        let mut interval_started = started;
        let mut interval_events: u64 = 0;
        let mut max_lag = Duration::ZERO;

        loop {
            let Some(scheduled) = self.take_or_shutdown().await else {
                break;
            };

            let now = Instant::now();
            if scheduled.scheduled_at > now {
                // pacing sleep, local to this loop
                if !self.sleep_or_shutdown(scheduled.scheduled_at).await {
                    break;
                }
            } else {
                max_lag = max_lag.max(now - scheduled.scheduled_at);
            }

            let event = scheduled.event;
            match self.sink.submit(&event.partition_key, event.payload).await {
                Ok(completion) => {
                    if let Some(tracker) = &self.tracker {
                        tracker.track(event.timestamp, completion.clone());
                    }
                    if !self.acquire_or_shutdown(completion).await {
                        break;
                    }
                    stats.events_emitted += 1;
                    interval_events += 1;
                }
                Err(err) => {
                    error!(error = %err, "sink rejected event, dropping");
                    stats.events_dropped += 1;
                }
            }

            let now = Instant::now();
            if now - interval_started >= self.statistics_interval {
                let seconds = (now - interval_started).as_secs_f64();
                let watermark = self
                    .tracker
                    .as_ref()
                    .and_then(WatermarkTracker::min_watermark)
                    .map(|w| w.to_rfc3339())
                    .unwrap_or_default();
                info!(
                    events_per_second = interval_events as f64 / seconds,
                    events_emitted = stats.events_emitted,
                    buffer_fill = self.buffer.fill_level(),
                    max_lag_ms = max_lag.as_millis() as u64,
                    in_flight = self.gate.in_flight(),
                    watermark = %watermark,
                    "replay progress"
                );
                interval_started = now;
                interval_events = 0;
                max_lag = Duration::ZERO;
            }
        }

        stats.elapsed = started.elapsed();
        info!(
            events_emitted = stats.events_emitted,
            events_dropped = stats.events_dropped,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "replay loop finished"
        );
        Ok(stats)
    }

    async fn finalize(&mut self) -> Result<()> {
        self.buffer.interrupt();
        if let Some(tracker) = &self.tracker {
            tracker.interrupt();
        }
        self.sink.flush().await?;
        self.gate.drain().await;
        self.sink.close().await?;
        info!("replay finalized");
        Ok(())
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn take_or_shutdown(&mut self) -> Option<crate::event::ScheduledEvent> {
        if self.is_shutdown() {
            return None;
        }
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            event = self.buffer.take() => event,
            _ = shutdown.wait_for(|stop| *stop) => None,
        }
    }

    /// Returns false if shutdown was raised during the sleep
    async fn sleep_or_shutdown(&mut self, until: Instant) -> bool {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep_until(until) => true,
            _ = shutdown.wait_for(|stop| *stop) => false,
        }
    }

    /// Returns false if shutdown was raised while waiting for a slot
    async fn acquire_or_shutdown(&mut self, completion: crate::sink::Completion) -> bool {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = self.gate.acquire(completion) => true,
            _ = shutdown.wait_for(|stop| *stop) => false,
        }
    }
}
