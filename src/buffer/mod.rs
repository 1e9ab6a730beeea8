//! Paced event buffer
//!
//! Decouples decode cost from pacing: a background task pulls events from the
//! source, stamps each with the wall-clock instant it should be emitted, and
//! pushes it into a bounded queue. The producer stalls when the queue is full
//! (the memory bound, independent of emission backpressure); the driver
//! blocks on [`PacedEventBuffer::take`] when it is empty.
//!
//! Single producer, single consumer: the queue needs no locking discipline
//! beyond its mutex and two wakeup signals.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::event::ScheduledEvent;
use crate::source::EventSource;

/// Maps event-time onto wall-clock emission instants.
///
/// The epoch is fixed when the first event is read:
/// `scheduled_at(e) = epoch + (e.timestamp - first_timestamp) / speedup`.
struct PacingClock {
    epoch: Instant,
    first_timestamp_millis: i64,
    speedup: f64,
    last_scheduled: Instant,
}

impl PacingClock {
    fn new(first: DateTime<Utc>, speedup: f64) -> Self {
        let epoch = Instant::now();
        Self {
            epoch,
            first_timestamp_millis: first.timestamp_millis(),
            speedup,
            last_scheduled: epoch,
        }
    }

    /// Compute the emission instant for an event timestamp.
    ///
    /// Source order is expected to be timestamp order; a timestamp that would
    /// schedule before its predecessor is clamped forward and reported, never
    /// silently reordered.
    fn schedule(&mut self, timestamp: DateTime<Utc>) -> Instant {
        let delta_millis = (timestamp.timestamp_millis() - self.first_timestamp_millis) as f64;
        let scheduled = if delta_millis < 0.0 {
            warn!(
                timestamp = %timestamp,
                "event-time earlier than first event, source order violated"
            );
            self.epoch
        } else {
            self.epoch + Duration::from_secs_f64(delta_millis / self.speedup / 1000.0)
        };

        if scheduled < self.last_scheduled {
            warn!(
                timestamp = %timestamp,
                "non-monotonic scheduled time, clamping to previous"
            );
            self.last_scheduled
        } else {
            self.last_scheduled = scheduled;
            scheduled
        }
    }
}

struct BufferShared {
    queue: Mutex<VecDeque<ScheduledEvent>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
    producer_done: AtomicBool,
    interrupted: AtomicBool,
}

impl BufferShared {
    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }
}

/// Bounded queue of scheduled events filled by a background production task
pub struct PacedEventBuffer {
    shared: Arc<BufferShared>,
    producer: Mutex<Option<JoinHandle<()>>>,
}

impl PacedEventBuffer {
    /// Start buffering: spawns the background task that drains `source`,
    /// computes scheduled times at `speedup`, and fills a queue of at most
    /// `capacity` events.
    pub fn start(source: EventSource, speedup: f64, capacity: usize) -> Self {
        let shared = Arc::new(BufferShared {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
            producer_done: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
        });

        let producer = tokio::spawn(produce(source, speedup, Arc::clone(&shared)));

        Self {
            shared,
            producer: Mutex::new(Some(producer)),
        }
    }

    /// Remove and return the next event, waiting until one is available.
    ///
    /// Returns `None` once the source is exhausted and the queue has drained,
    /// or immediately after an interrupt; the terminal state is idempotent.
    pub async fn take(&self) -> Option<ScheduledEvent> {
        loop {
            let notified = self.shared.not_empty.notified();
            if self.shared.is_interrupted() {
                return None;
            }
            {
                let mut queue = self.shared.queue.lock();
                if let Some(event) = queue.pop_front() {
                    self.shared.not_full.notify_one();
                    return Some(event);
                }
            }
            if self.shared.producer_done.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Return a copy of the head event without removing it, waiting until the
    /// first event is buffered. `None` only in the terminal state; the driver
    /// uses this to detect an empty dataset before entering its loop.
    pub async fn peek(&self) -> Option<ScheduledEvent> {
        loop {
            let notified = self.shared.not_empty.notified();
            if self.shared.is_interrupted() {
                return None;
            }
            {
                let queue = self.shared.queue.lock();
                if let Some(event) = queue.front() {
                    return Some(event.clone());
                }
            }
            if self.shared.producer_done.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Queue occupancy as a fraction of capacity, for observability only
    pub fn fill_level(&self) -> f64 {
        self.shared.queue.lock().len() as f64 / self.shared.capacity as f64
    }

    /// Stop the production task and unblock any waiting `take`/`peek`
    /// immediately. After interruption no further events are produced.
    pub fn interrupt(&self) {
        self.shared.interrupted.store(true, Ordering::Release);
        self.shared.not_empty.notify_one();
        self.shared.not_full.notify_one();
        if let Some(handle) = self.producer.lock().take() {
            handle.abort();
        }
    }
}

/// Background production loop: decode, schedule, enqueue.
async fn produce(mut source: EventSource, speedup: f64, shared: Arc<BufferShared>) {
    let mut clock: Option<PacingClock> = None;
    let mut produced: u64 = 0;

    loop {
        if shared.is_interrupted() {
            break;
        }

        let event = match source.next().await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "event source failed, ending production");
                break;
            }
        };

        let clock = clock.get_or_insert_with(|| PacingClock::new(event.timestamp, speedup));
        let scheduled_at = clock.schedule(event.timestamp);

        if !enqueue(&shared, ScheduledEvent { event, scheduled_at }).await {
            break;
        }
        produced += 1;
    }

    shared.producer_done.store(true, Ordering::Release);
    shared.not_empty.notify_one();
    debug!(events = produced, "event production finished");
}

/// Push one event, stalling while the queue is at capacity.
/// Returns false if interrupted while waiting.
async fn enqueue(shared: &BufferShared, event: ScheduledEvent) -> bool {
    let mut slot = Some(event);
    loop {
        let notified = shared.not_full.notified();
        {
            let mut queue = shared.queue.lock();
            if queue.len() < shared.capacity {
                if let Some(event) = slot.take() {
                    queue.push_back(event);
                }
                shared.not_empty.notify_one();
                return true;
            }
        }
        if shared.is_interrupted() {
            return false;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventDecoder;
    use crate::source::FsBlobStore;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn source_with_events(dir: &TempDir, lines: &str) -> EventSource {
        std::fs::write(dir.path().join("events.json"), lines).unwrap();
        let store = Arc::new(FsBlobStore::new(dir.path()));
        EventSource::open(store, "", EventDecoder::new("ts"))
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedules_events_delta_over_speedup_apart() {
        let dir = TempDir::new().unwrap();
        let source = source_with_events(
            &dir,
            "{\"ts\":\"2018-01-04T00:00:00Z\"}\n\
             {\"ts\":\"2018-01-04T00:00:10Z\"}\n\
             {\"ts\":\"2018-01-04T00:00:20Z\"}\n",
        )
        .await;

        let buffer = PacedEventBuffer::start(source, 10.0, 16);
        let first = buffer.take().await.unwrap();
        let second = buffer.take().await.unwrap();
        let third = buffer.take().await.unwrap();

        assert_eq!(second.scheduled_at - first.scheduled_at, Duration::from_secs(1));
        assert_eq!(third.scheduled_at - second.scheduled_at, Duration::from_secs(1));
        assert!(buffer.take().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_times_are_monotonic() {
        let dir = TempDir::new().unwrap();
        // second event is out of order; its schedule must not regress
        let source = source_with_events(
            &dir,
            "{\"ts\":\"2018-01-04T00:01:00Z\"}\n\
             {\"ts\":\"2018-01-04T00:00:00Z\"}\n\
             {\"ts\":\"2018-01-04T00:02:00Z\"}\n",
        )
        .await;

        let buffer = PacedEventBuffer::start(source, 60.0, 16);
        let mut previous: Option<Instant> = None;
        while let Some(event) = buffer.take().await {
            if let Some(prev) = previous {
                assert!(event.scheduled_at >= prev);
            }
            previous = Some(event.scheduled_at);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_peek_does_not_consume() {
        let dir = TempDir::new().unwrap();
        let source = source_with_events(&dir, "{\"ts\":\"2018-01-04T00:00:00Z\"}\n").await;
        let buffer = PacedEventBuffer::start(source, 1.0, 16);

        let peeked = buffer.peek().await.unwrap();
        let taken = buffer.take().await.unwrap();
        assert_eq!(peeked.event.payload, taken.event.payload);
        assert!(buffer.peek().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_after_exhaustion_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let source = source_with_events(&dir, "{\"ts\":\"2018-01-04T00:00:00Z\"}\n").await;
        let buffer = PacedEventBuffer::start(source, 1.0, 16);

        assert!(buffer.take().await.is_some());
        assert!(buffer.take().await.is_none());
        assert!(buffer.take().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_source_reports_exhaustion() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FsBlobStore::new(dir.path()));
        let source = EventSource::open(store, "", EventDecoder::new("ts"))
            .await
            .unwrap();
        let buffer = PacedEventBuffer::start(source, 1.0, 16);

        assert!(buffer.peek().await.is_none());
        assert!(buffer.take().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_unblocks_take() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FsBlobStore::new(dir.path()));
        // no files: producer finishes immediately, so force the blocked-take
        // path with an interrupt before the producer is observed
        let source = EventSource::open(store, "", EventDecoder::new("ts"))
            .await
            .unwrap();
        let buffer = Arc::new(PacedEventBuffer::start(source, 1.0, 16));

        buffer.interrupt();
        assert!(buffer.take().await.is_none());
        assert!(buffer.peek().await.is_none());
        assert_eq!(buffer.fill_level(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_producer_stalls_at_capacity() {
        let dir = TempDir::new().unwrap();
        let source = source_with_events(
            &dir,
            "{\"ts\":\"2018-01-04T00:00:00Z\"}\n\
             {\"ts\":\"2018-01-04T00:00:01Z\"}\n\
             {\"ts\":\"2018-01-04T00:00:02Z\"}\n",
        )
        .await;

        let buffer = PacedEventBuffer::start(source, 1.0, 2);
        // give the producer a chance to fill up
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(buffer.fill_level() <= 1.0);

        let mut count = 0;
        while buffer.take().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
    }
}
