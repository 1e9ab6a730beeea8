//! Command-line arguments for the restream binary
//!
//! This module defines the CLI arguments structure using clap.

use clap::Parser;
use std::path::PathBuf;

use super::defaults::*;

/// Command-line arguments for the restream binary
#[derive(Parser, Debug, Clone)]
#[command(name = "restream")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Replays historical event datasets into live streams with event-time pacing")]
pub struct ReplayArgs {
    /// Path to configuration file (TOML format).
    /// If not specified, looks for restream.toml in the current directory,
    /// /etc/restream/, or ~/.config/restream/
    #[arg(short, long, env = "RESTREAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Generate example configuration file and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Bucket containing the raw event data (a directory for the built-in
    /// filesystem store)
    #[arg(long, env = "RESTREAM_BUCKET", default_value = DEFAULT_BUCKET)]
    pub bucket: String,

    /// Prefix of the objects containing the raw event data
    #[arg(long, env = "RESTREAM_PREFIX", default_value = DEFAULT_PREFIX)]
    pub prefix: String,

    /// Destination stream the events are sent to ("-" for stdout, otherwise
    /// a file path)
    #[arg(long, env = "RESTREAM_STREAM", default_value = DEFAULT_STREAM)]
    pub stream: String,

    /// Speedup factor for replaying events (1.0 = real-time, larger values
    /// compress elapsed time)
    #[arg(long, env = "RESTREAM_SPEEDUP", default_value_t = DEFAULT_SPEEDUP)]
    pub speedup: f64,

    /// Name of the payload attribute that carries event-time
    #[arg(long, env = "RESTREAM_TIMESTAMP_ATTRIBUTE", default_value = DEFAULT_TIMESTAMP_ATTRIBUTE)]
    pub timestamp_attribute: String,

    /// Aggregate multiple events into a single sink record
    #[arg(long, env = "RESTREAM_AGGREGATE")]
    pub aggregate: bool,

    /// Start replaying events at the given timestamp (RFC 3339)
    #[arg(long, env = "RESTREAM_SEEK")]
    pub seek: Option<String>,

    /// Print statistics every this many milliseconds
    #[arg(long, env = "RESTREAM_STATISTICS_INTERVAL_MS", default_value_t = DEFAULT_STATISTICS_INTERVAL_MS)]
    pub statistics_interval_ms: u64,

    /// Don't ingest watermarks into the stream
    #[arg(long, env = "RESTREAM_NO_WATERMARK")]
    pub no_watermark: bool,

    /// Emit a watermark record every this many milliseconds
    #[arg(long, env = "RESTREAM_WATERMARK_INTERVAL_MS", default_value_t = DEFAULT_WATERMARK_INTERVAL_MS)]
    pub watermark_interval_ms: u64,

    /// Paced-buffer capacity in events. Bounds decode-ahead memory use;
    /// the producer task stalls when the buffer is full.
    #[arg(long, env = "RESTREAM_BUFFER_CAPACITY", default_value_t = DEFAULT_BUFFER_CAPACITY)]
    pub buffer_capacity: usize,

    /// Maximum outstanding unacknowledged emissions before the replay loop
    /// stalls on sink backpressure
    #[arg(long, env = "RESTREAM_MAX_OUTSTANDING", default_value_t = DEFAULT_MAX_OUTSTANDING)]
    pub max_outstanding: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RESTREAM_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,
}
