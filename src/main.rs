//! Restream - paced historical event replay
//!
//! Replays timestamped events from blob storage into a live stream at a
//! configurable speedup.

use clap::Parser;
use restream::backpressure::{BackpressureGate, ErrorCallback};
use restream::buffer::PacedEventBuffer;
use restream::config::{merge_config_with_args, ConfigFile};
use restream::driver::ReplayDriver;
use restream::event::EventDecoder;
use restream::sink::{NdjsonSink, StreamSink};
use restream::source::{EventSource, FsBlobStore};
use restream::watermark::WatermarkTracker;
use restream::{ReplayArgs, ReplayConfig, Result, RestreamError};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    if let Err(e) = run() {
        eprintln!("Restream failed: {e}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> Result<()> {
    let mut args = ReplayArgs::parse();

    if args.generate_config {
        println!("{}", ConfigFile::generate_example());
        return Ok(());
    }

    let config_file = if let Some(ref path) = args.config {
        match ConfigFile::load(path) {
            Ok(config) => {
                eprintln!("Loaded configuration from {path:?}");
                Some(config)
            }
            Err(e) => {
                eprintln!("Error loading configuration file: {e}");
                return Err(e);
            }
        }
    } else {
        ConfigFile::load_default()
    };

    if let Some(ref config) = config_file {
        args = merge_config_with_args(args, config);
    }

    let log_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    if config_file.is_some() {
        info!("Configuration loaded from file");
    }

    let config = match ReplayConfig::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| RestreamError::config(format!("failed to create runtime: {e}")))?;

    runtime.block_on(run_replay(config))
}

async fn run_replay(config: ReplayConfig) -> Result<()> {
    info!(
        bucket = %config.bucket,
        prefix = %config.prefix,
        stream = %config.stream,
        speedup = config.speedup,
        timestamp_attribute = %config.timestamp_attribute,
        "starting replay"
    );

    let store = Arc::new(FsBlobStore::new(config.bucket.as_str()));
    let decoder = EventDecoder::new(&config.timestamp_attribute);
    let mut source = EventSource::open(store, &config.prefix, decoder).await?;
    if let Some(seek_to) = config.seek_to {
        info!(seek_to = %seek_to, "seeking past earlier events");
        source.seek(seek_to);
    }

    let buffer = PacedEventBuffer::start(source, config.speedup, config.buffer_capacity);

    let sink: Arc<dyn StreamSink> =
        Arc::new(NdjsonSink::create(&config.stream, config.aggregate).await?);

    let on_error: ErrorCallback = Arc::new(|err| {
        warn!(error = %err, "sink completion failed");
    });
    let gate = Arc::new(BackpressureGate::with_error_callback(
        config.max_outstanding,
        on_error,
    ));

    let tracker = if config.suppress_watermark {
        None
    } else {
        let tracker = WatermarkTracker::new();
        let _emitter = tracker.start_emitter(
            Arc::clone(&sink),
            config.watermark_interval,
            &config.timestamp_attribute,
        );
        Some(tracker)
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let interrupted = shutdown_rx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let driver = ReplayDriver::new(
        buffer,
        gate,
        tracker,
        sink,
        config.statistics_interval,
        shutdown_rx,
    );

    let stats = driver.run().await?;

    // an interrupted run that never got to emit is a clean shutdown, not an
    // empty dataset
    if stats.events_emitted == 0 && stats.events_dropped == 0 && !*interrupted.borrow() {
        return Err(RestreamError::source_access(format!(
            "no events found in bucket {:?} under prefix {:?}",
            config.bucket, config.prefix
        )));
    }

    info!(
        events_emitted = stats.events_emitted,
        events_dropped = stats.events_dropped,
        sink_errors = stats.sink_errors,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "replay complete"
    );
    Ok(())
}
