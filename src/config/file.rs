//! Configuration file support for restream
//!
//! This module provides TOML configuration file parsing and merging with CLI
//! arguments.
//!
//! ## Priority Order
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values
//!
//! ## Example Configuration
//!
//! ```toml
//! # restream.toml
//!
//! [source]
//! bucket = "./data/taxi-trips"
//! prefix = "2018/"
//! timestamp_attribute = "dropoff_datetime"
//! # seek = "2018-01-04T00:00:00Z"
//!
//! [replay]
//! speedup = 6480.0
//! buffer_capacity = 10000
//! statistics_interval_ms = 60000
//!
//! [sink]
//! stream = "-"
//! aggregate = false
//! max_outstanding = 10000
//!
//! [watermark]
//! enabled = true
//! interval_ms = 60000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, RestreamError};

/// Root configuration structure for the TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Source (blob store) configuration
    pub source: SourceSection,

    /// Replay pacing configuration
    pub replay: ReplaySection,

    /// Sink configuration
    pub sink: SinkSection,

    /// Watermark configuration
    pub watermark: WatermarkSection,
}

/// Source section of the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub timestamp_attribute: Option<String>,
    pub seek: Option<String>,
}

/// Replay section of the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySection {
    pub speedup: Option<f64>,
    pub buffer_capacity: Option<usize>,
    pub statistics_interval_ms: Option<u64>,
    pub log_level: Option<String>,
}

/// Sink section of the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSection {
    pub stream: Option<String>,
    pub aggregate: Option<bool>,
    pub max_outstanding: Option<usize>,
}

/// Watermark section of the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkSection {
    pub enabled: Option<bool>,
    pub interval_ms: Option<u64>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RestreamError::config(format!("cannot read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            RestreamError::config(format!("invalid config file {}: {}", path.display(), e))
        })
    }

    /// Load configuration from default locations, if a file exists there.
    ///
    /// Searched in order: `./restream.toml`, `/etc/restream/restream.toml`,
    /// `~/.config/restream/restream.toml`.
    pub fn load_default() -> Option<Self> {
        for path in Self::default_locations() {
            if path.is_file() {
                match Self::load(&path) {
                    Ok(config) => {
                        tracing::debug!(path = %path.display(), "loaded configuration file");
                        return Some(config);
                    }
                    Err(e) => {
                        eprintln!("Warning: skipping config file {}: {}", path.display(), e);
                    }
                }
            }
        }
        None
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![
            PathBuf::from("restream.toml"),
            PathBuf::from("/etc/restream/restream.toml"),
        ];
        if let Some(home) = std::env::var_os("HOME") {
            locations.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("restream")
                    .join("restream.toml"),
            );
        }
        locations
    }

    /// Generate an example configuration file with defaults and comments
    pub fn generate_example() -> String {
        r#"# restream configuration file
#
# All values are optional; command-line arguments and RESTREAM_* environment
# variables take precedence over this file.

[source]
# Bucket containing the raw event data (a directory for the filesystem store)
bucket = "./data"
# Only replay objects whose key starts with this prefix
prefix = ""
# Payload attribute that carries event-time
timestamp_attribute = "timestamp"
# Skip events before this instant (RFC 3339)
# seek = "2018-01-04T00:00:00Z"

[replay]
# Ratio by which elapsed event-time is compressed into wall-clock time
speedup = 6480.0
# Paced-buffer capacity in events
buffer_capacity = 10000
# Print a statistics line every this many milliseconds
statistics_interval_ms = 60000
# log_level = "info"

[sink]
# Destination stream: "-" for stdout, otherwise a file path
stream = "-"
# Aggregate multiple events into a single sink record
aggregate = false
# Cap on outstanding unacknowledged emissions
max_outstanding = 10000

[watermark]
# Emit periodic watermark records to the stream
enabled = true
interval_ms = 60000
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_parses() {
        let config: ConfigFile = toml::from_str("").unwrap();
        assert!(config.source.bucket.is_none());
        assert!(config.replay.speedup.is_none());
    }

    #[test]
    fn test_partial_config_parses() {
        let toml = r#"
            [source]
            bucket = "/var/data/trips"
            timestamp_attribute = "dropoff_datetime"

            [replay]
            speedup = 10.0
        "#;
        let config: ConfigFile = toml::from_str(toml).unwrap();
        assert_eq!(config.source.bucket.as_deref(), Some("/var/data/trips"));
        assert_eq!(
            config.source.timestamp_attribute.as_deref(),
            Some("dropoff_datetime")
        );
        assert_eq!(config.replay.speedup, Some(10.0));
        assert!(config.sink.stream.is_none());
    }

    #[test]
    fn test_example_config_parses() {
        let example = ConfigFile::generate_example();
        let config: ConfigFile = toml::from_str(&example).unwrap();
        assert_eq!(config.replay.speedup, Some(6480.0));
        assert_eq!(config.watermark.enabled, Some(true));
    }
}
