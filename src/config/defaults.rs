//! Default constants for restream configuration
//!
//! These constants define the default values used throughout the
//! configuration system when no explicit value is provided.

/// Default source bucket (a local directory for the filesystem store)
pub const DEFAULT_BUCKET: &str = "./data";

/// Default object-name prefix (empty matches every object in the bucket)
pub const DEFAULT_PREFIX: &str = "";

/// Default destination stream ("-" writes newline-delimited records to stdout)
pub const DEFAULT_STREAM: &str = "-";

/// Default speedup factor: one day of event-time replayed in ~13 seconds
pub const DEFAULT_SPEEDUP: f64 = 6480.0;

/// Default payload attribute carrying event-time
pub const DEFAULT_TIMESTAMP_ATTRIBUTE: &str = "timestamp";

/// Default interval between statistics log lines, in milliseconds
pub const DEFAULT_STATISTICS_INTERVAL_MS: u64 = 60_000;

/// Default interval between watermark emissions, in milliseconds
pub const DEFAULT_WATERMARK_INTERVAL_MS: u64 = 60_000;

/// Default paced-buffer capacity, in events
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// Default cap on outstanding unacknowledged emissions
pub const DEFAULT_MAX_OUTSTANDING: usize = 10_000;

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";
