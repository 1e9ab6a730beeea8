//! Configuration for restream
//!
//! The configuration surface is accepted at process start from three layers:
//! CLI arguments (clap, env-var backed), an optional TOML configuration file,
//! and built-in defaults. [`merge_config_with_args`] folds file values into
//! the parsed arguments where the CLI is still at its default, then
//! [`ReplayConfig::from_args`] produces the validated runtime configuration.

mod args;
mod defaults;
mod file;

pub use args::ReplayArgs;
pub use defaults::*;
pub use file::ConfigFile;

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::{Result, RestreamError};

/// Validated runtime configuration for a replay run
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Bucket containing the raw event data
    pub bucket: String,
    /// Prefix of the objects containing the raw event data
    pub prefix: String,
    /// Destination stream identity ("-" for stdout)
    pub stream: String,
    /// Speedup factor (> 0; 1.0 = real-time)
    pub speedup: f64,
    /// Payload attribute carrying event-time
    pub timestamp_attribute: String,
    /// Aggregate multiple events per sink record (delegated to the sink)
    pub aggregate: bool,
    /// Skip events before this instant
    pub seek_to: Option<DateTime<Utc>>,
    /// Interval between statistics log lines
    pub statistics_interval: Duration,
    /// Disable the watermark tracker entirely
    pub suppress_watermark: bool,
    /// Interval between watermark emissions
    pub watermark_interval: Duration,
    /// Paced-buffer capacity in events
    pub buffer_capacity: usize,
    /// Cap on outstanding unacknowledged emissions
    pub max_outstanding: usize,
    /// Log level
    pub log_level: String,
}

impl ReplayConfig {
    /// Build a validated configuration from parsed CLI arguments
    pub fn from_args(args: ReplayArgs) -> Result<Self> {
        let seek_to = match args.seek {
            Some(ref raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        RestreamError::config(format!("invalid --seek timestamp {raw:?}: {e}"))
                    })?,
            ),
            None => None,
        };

        let config = Self {
            bucket: args.bucket,
            prefix: args.prefix,
            stream: args.stream,
            speedup: args.speedup,
            timestamp_attribute: args.timestamp_attribute,
            aggregate: args.aggregate,
            seek_to,
            statistics_interval: Duration::from_millis(args.statistics_interval_ms),
            suppress_watermark: args.no_watermark,
            watermark_interval: Duration::from_millis(args.watermark_interval_ms),
            buffer_capacity: args.buffer_capacity,
            max_outstanding: args.max_outstanding,
            log_level: args.log_level,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, returning the first violation found
    pub fn validate(&self) -> Result<()> {
        if !(self.speedup.is_finite() && self.speedup > 0.0) {
            return Err(RestreamError::config(format!(
                "speedup must be a positive finite number, got {}",
                self.speedup
            )));
        }
        if self.buffer_capacity == 0 {
            return Err(RestreamError::config("buffer capacity must be at least 1"));
        }
        if self.max_outstanding == 0 {
            return Err(RestreamError::config("max outstanding must be at least 1"));
        }
        if self.statistics_interval.is_zero() {
            return Err(RestreamError::config(
                "statistics interval must be positive",
            ));
        }
        if self.watermark_interval.is_zero() {
            return Err(RestreamError::config("watermark interval must be positive"));
        }
        Ok(())
    }
}

/// Merge configuration file values with CLI arguments.
/// CLI arguments take precedence over config file values.
/// Only applies config file values where CLI uses defaults.
pub fn merge_config_with_args(mut args: ReplayArgs, config: &ConfigFile) -> ReplayArgs {
    macro_rules! apply_if_default {
        ($field:ident, $config_val:expr, $default:expr) => {
            if let Some(val) = $config_val {
                if args.$field == $default {
                    args.$field = val;
                }
            }
        };
    }

    macro_rules! apply_if_default_string {
        ($field:ident, $config_val:expr, $default:expr) => {
            if let Some(ref val) = $config_val {
                if args.$field == $default {
                    args.$field = val.clone();
                }
            }
        };
    }

    // Source section
    apply_if_default_string!(bucket, config.source.bucket, DEFAULT_BUCKET);
    apply_if_default_string!(prefix, config.source.prefix, DEFAULT_PREFIX);
    apply_if_default_string!(
        timestamp_attribute,
        config.source.timestamp_attribute,
        DEFAULT_TIMESTAMP_ATTRIBUTE
    );
    if args.seek.is_none() {
        if let Some(ref seek) = config.source.seek {
            args.seek = Some(seek.clone());
        }
    }

    // Replay section
    apply_if_default!(speedup, config.replay.speedup, DEFAULT_SPEEDUP);
    apply_if_default!(
        buffer_capacity,
        config.replay.buffer_capacity,
        DEFAULT_BUFFER_CAPACITY
    );
    apply_if_default!(
        statistics_interval_ms,
        config.replay.statistics_interval_ms,
        DEFAULT_STATISTICS_INTERVAL_MS
    );
    apply_if_default_string!(log_level, config.replay.log_level, DEFAULT_LOG_LEVEL);

    // Sink section
    apply_if_default_string!(stream, config.sink.stream, DEFAULT_STREAM);
    if let Some(val) = config.sink.aggregate {
        if !args.aggregate {
            args.aggregate = val;
        }
    }
    apply_if_default!(
        max_outstanding,
        config.sink.max_outstanding,
        DEFAULT_MAX_OUTSTANDING
    );

    // Watermark section
    if let Some(enabled) = config.watermark.enabled {
        if !args.no_watermark {
            args.no_watermark = !enabled;
        }
    }
    apply_if_default!(
        watermark_interval_ms,
        config.watermark.interval_ms,
        DEFAULT_WATERMARK_INTERVAL_MS
    );

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_args() -> ReplayArgs {
        ReplayArgs {
            config: None,
            generate_config: false,
            bucket: DEFAULT_BUCKET.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            stream: DEFAULT_STREAM.to_string(),
            speedup: DEFAULT_SPEEDUP,
            timestamp_attribute: DEFAULT_TIMESTAMP_ATTRIBUTE.to_string(),
            aggregate: false,
            seek: None,
            statistics_interval_ms: DEFAULT_STATISTICS_INTERVAL_MS,
            no_watermark: false,
            watermark_interval_ms: DEFAULT_WATERMARK_INTERVAL_MS,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_outstanding: DEFAULT_MAX_OUTSTANDING,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    #[test]
    fn test_from_args_defaults_validate() {
        let config = ReplayConfig::from_args(default_args()).unwrap();
        assert_eq!(config.speedup, DEFAULT_SPEEDUP);
        assert_eq!(config.buffer_capacity, DEFAULT_BUFFER_CAPACITY);
        assert!(config.seek_to.is_none());
    }

    #[test]
    fn test_invalid_speedup_rejected() {
        let mut args = default_args();
        args.speedup = 0.0;
        assert!(ReplayConfig::from_args(args).is_err());

        let mut args = default_args();
        args.speedup = -1.0;
        assert!(ReplayConfig::from_args(args).is_err());

        let mut args = default_args();
        args.speedup = f64::NAN;
        assert!(ReplayConfig::from_args(args).is_err());
    }

    #[test]
    fn test_seek_parsing() {
        let mut args = default_args();
        args.seek = Some("2018-01-04T00:00:00Z".to_string());
        let config = ReplayConfig::from_args(args).unwrap();
        let seek = config.seek_to.unwrap();
        assert_eq!(seek.to_rfc3339(), "2018-01-04T00:00:00+00:00");

        let mut args = default_args();
        args.seek = Some("not a timestamp".to_string());
        assert!(ReplayConfig::from_args(args).is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut args = default_args();
        args.buffer_capacity = 0;
        assert!(ReplayConfig::from_args(args).is_err());

        let mut args = default_args();
        args.max_outstanding = 0;
        assert!(ReplayConfig::from_args(args).is_err());
    }

    #[test]
    fn test_merge_with_empty_config() {
        let args = default_args();
        let merged = merge_config_with_args(args.clone(), &ConfigFile::default());
        assert_eq!(merged.bucket, args.bucket);
        assert_eq!(merged.speedup, args.speedup);
        assert_eq!(merged.no_watermark, args.no_watermark);
    }

    #[test]
    fn test_merge_applies_file_values() {
        let mut config = ConfigFile::default();
        config.source.bucket = Some("/var/data".to_string());
        config.source.timestamp_attribute = Some("dropoff_datetime".to_string());
        config.replay.speedup = Some(10.0);
        config.watermark.enabled = Some(false);

        let merged = merge_config_with_args(default_args(), &config);
        assert_eq!(merged.bucket, "/var/data");
        assert_eq!(merged.timestamp_attribute, "dropoff_datetime");
        assert_eq!(merged.speedup, 10.0);
        assert!(merged.no_watermark);
    }

    #[test]
    fn test_cli_takes_precedence_over_config() {
        let mut args = default_args();
        args.bucket = "/cli/bucket".to_string();
        args.speedup = 2.0;

        let mut config = ConfigFile::default();
        config.source.bucket = Some("/file/bucket".to_string());
        config.replay.speedup = Some(10.0);

        let merged = merge_config_with_args(args, &config);
        assert_eq!(merged.bucket, "/cli/bucket");
        assert_eq!(merged.speedup, 2.0);
    }

    #[test]
    fn test_merge_seek_option() {
        let mut config = ConfigFile::default();
        config.source.seek = Some("2018-01-04T00:00:00Z".to_string());

        let merged = merge_config_with_args(default_args(), &config);
        assert_eq!(merged.seek.as_deref(), Some("2018-01-04T00:00:00Z"));

        let mut args = default_args();
        args.seek = Some("2019-01-01T00:00:00Z".to_string());
        let merged = merge_config_with_args(args, &config);
        assert_eq!(merged.seek.as_deref(), Some("2019-01-01T00:00:00Z"));
    }
}
