#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Restream
//!
//! Restream replays historical, timestamped events from blob storage into a
//! live stream at a configurable speedup, preserving the relative timing of
//! the original data.
//!
//! ## How it works
//!
//! Objects under a bucket prefix are read in key order, decompressed, and
//! decoded line by line into events carrying an event-time timestamp. A
//! background task schedules each event at
//! `replay_start + (event_time - first_event_time) / speedup` and feeds a
//! bounded buffer; the driver loop sleeps until each event's scheduled
//! instant and submits it to the sink. A semaphore caps unacknowledged
//! emissions, and a watermark tracker periodically publishes the event-time
//! frontier so downstream consumers can close their windows.
//!
//! ## Quick Start
//!
//! ```bash
//! # Replay ./data at 6480x (one day of data in ~13 seconds) to stdout
//! $ ./restream --bucket ./data --timestamp-attribute dropoff_datetime
//!
//! # Replay into a file at real time, skipping everything before a cutoff
//! $ ./restream --bucket ./data --stream out.ndjson --speedup 1 \
//!       --seek 2018-01-04T12:00:00Z
//! ```
//!
//! ## Library Usage
//!
//! The pipeline pieces compose directly:
//!
//! ```no_run
//! use restream::backpressure::BackpressureGate;
//! use restream::buffer::PacedEventBuffer;
//! use restream::driver::ReplayDriver;
//! use restream::event::EventDecoder;
//! use restream::sink::{NdjsonSink, StreamSink};
//! use restream::source::{EventSource, FsBlobStore};
//! use restream::watermark::WatermarkTracker;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::sync::watch;
//!
//! # async fn run() -> restream::Result<()> {
//! let store = Arc::new(FsBlobStore::new("./data"));
//! let source = EventSource::open(store, "", EventDecoder::new("timestamp")).await?;
//! let buffer = PacedEventBuffer::start(source, 6480.0, 10_000);
//! let sink: Arc<dyn StreamSink> = Arc::new(NdjsonSink::create("-", false).await?);
//! let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! let driver = ReplayDriver::new(
//!     buffer,
//!     Arc::new(BackpressureGate::new(10_000)),
//!     Some(WatermarkTracker::new()),
//!     sink,
//!     Duration::from_secs(60),
//!     shutdown_rx,
//! );
//! let stats = driver.run().await?;
//! println!("replayed {} events", stats.events_emitted);
//! # Ok(())
//! # }
//! ```

pub mod backpressure;
pub mod buffer;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod sink;
pub mod source;
pub mod watermark;

pub use config::{ReplayArgs, ReplayConfig};
pub use driver::{ReplayDriver, ReplayStats};
pub use error::{RestreamError, Result};
pub use event::{Event, EventDecoder, ScheduledEvent};
