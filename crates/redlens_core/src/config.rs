use crate::EngineError;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;

/// INFO fields shown in the filtered details view when no custom filter
/// set is configured.
const DEFAULT_DETAIL_FILTERS: &[&str] = &[
    "aof_enabled",
    "bgrewriteaof_in_progress",
    "bgsave_in_progress",
    "changes_since_last_save",
    "db.*",
    "last_save_time",
    "multiplexing_api",
    "total_commands_processed",
    "total_connections_received",
    "uptime_in_days",
    "uptime_in_seconds",
    "redis_version",
];

/// Engine configuration.
///
/// Constructed once by the host and passed into the engine components;
/// never read from ambient global state during a request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Batch size passed as `COUNT` to SCAN/HSCAN/SSCAN/ZSCAN.
    pub scan_count: u32,

    /// Byte page size for string value pagination (GETRANGE).
    pub string_pagination: u64,

    /// Number of slowlog entries requested per stats snapshot.
    pub slowlog_len: u32,

    /// Maximum rendered length of a slowlog command, ellipsis included.
    pub slowlog_text_limit: usize,

    /// Keyspaces with more keys than this are sampled instead of
    /// enumerated eagerly.
    pub sampling_threshold: u64,

    /// Number of RANDOMKEY probes when sampling a large keyspace.
    pub sampling_size: u32,

    /// Socket connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,

    /// Socket read/write timeout in milliseconds.
    pub response_timeout_ms: Option<u64>,

    /// Regex patterns selecting which INFO fields appear in the filtered
    /// details view.
    pub detail_filters: Vec<String>,

    /// INFO fields rendered as durations (value is in seconds).
    pub detail_seconds_keys: Vec<String>,

    /// INFO fields rendered as timestamps (value is a unix epoch).
    pub detail_timestamp_keys: Vec<String>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            scan_count: 1000,
            string_pagination: 10_000,
            slowlog_len: 10,
            slowlog_text_limit: 255,
            sampling_threshold: 1000,
            sampling_size: 200,
            connect_timeout_ms: None,
            response_timeout_ms: None,
            detail_filters: DEFAULT_DETAIL_FILTERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            detail_seconds_keys: vec!["uptime_in_seconds".to_string()],
            detail_timestamp_keys: vec!["last_save_time".to_string()],
        }
    }
}

impl BoardConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_ms.map(Duration::from_millis)
    }

    /// Compile the detail filter patterns.
    ///
    /// Patterns are anchored on both ends so `db.*` matches `db0` but a
    /// plain field name only matches itself.
    pub fn compiled_detail_filters(&self) -> Result<Vec<Regex>, EngineError> {
        self.detail_filters
            .iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                    EngineError::InvalidConfig(format!(
                        "bad detail filter pattern '{}': {}",
                        pattern, e
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = BoardConfig::default();
        assert_eq!(config.scan_count, 1000);
        assert_eq!(config.string_pagination, 10_000);
        assert_eq!(config.slowlog_len, 10);
        assert_eq!(config.sampling_threshold, 1000);
        assert!(config.connect_timeout().is_none());
    }

    #[test]
    fn detail_filters_are_anchored() {
        let config = BoardConfig::default();
        let filters = config.compiled_detail_filters().unwrap();

        let matches = |field: &str| filters.iter().any(|re| re.is_match(field));
        assert!(matches("db0"));
        assert!(matches("redis_version"));
        assert!(!matches("redis_version_extra"));
        assert!(!matches("used_memory_human"));
    }

    #[test]
    fn bad_filter_pattern_is_a_config_error() {
        let config = BoardConfig {
            detail_filters: vec!["(unclosed".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.compiled_detail_filters(),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: BoardConfig = serde_json::from_str(r#"{"scan_count": 50}"#).unwrap();
        assert_eq!(config.scan_count, 50);
        assert_eq!(config.string_pagination, 10_000);
    }
}
