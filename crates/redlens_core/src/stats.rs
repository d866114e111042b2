use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Reachability of a server at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    Up,
    /// Connection-level failure: refused, timed out, dropped.
    Down(String),
    /// Protocol-level failure: auth rejected, command refused.
    Error(String),
}

impl ServerStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down(cause) => write!(f, "DOWN: {}", cause),
            Self::Error(cause) => write!(f, "ERROR: {}", cause),
        }
    }
}

/// One entry from `SLOWLOG GET`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowlogEntry {
    pub id: i64,
    /// Unix timestamp of command start.
    pub timestamp: i64,
    /// Execution time in microseconds.
    pub duration_us: i64,
    /// Command and arguments joined for display.
    pub command: String,
}

/// CPU fields from INFO plus derived utilization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuStats {
    pub sys: f64,
    pub sys_children: f64,
    pub user: f64,
    pub user_children: f64,
    /// `total_cpu_seconds / uptime_seconds`; zero when uptime is zero.
    pub utilization: f64,
}

/// Keyspace counters from an INFO `dbN` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub keys: u64,
    pub expires: u64,
    pub avg_ttl: u64,
}

/// One snapshot of a server, computed once per request.
///
/// All derived fields are filled at collection time; nothing here updates
/// incrementally. Staleness beyond the owning request is expected.
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub status: ServerStatus,
    /// Raw INFO fields in server order.
    pub info: IndexMap<String, String>,
    /// Slowlog entries, duration descending.
    pub slowlog: Vec<SlowlogEntry>,
    /// Total ring-buffer length from `SLOWLOG LEN`.
    pub slowlog_total: u64,
    /// Human summary: `"used (peak: X)"` or `"n/a"`.
    pub memory: String,
    pub cpu: Option<CpuStats>,
    pub databases: BTreeMap<u32, DatabaseStats>,
    /// Number of databases the server is configured with.
    pub database_count: u32,
    /// True when `maxmemory-policy` ends in `-lfu` (FREQ replaces IDLETIME).
    pub has_frequency: bool,
}

impl ServerStats {
    /// Empty snapshot for a server that could not be queried.
    pub fn unavailable(status: ServerStatus) -> Self {
        Self {
            status,
            info: IndexMap::new(),
            slowlog: Vec::new(),
            slowlog_total: 0,
            memory: "n/a".to_string(),
            cpu: None,
            databases: BTreeMap::new(),
            database_count: 0,
            has_frequency: false,
        }
    }

    pub fn is_up(&self) -> bool {
        self.status.is_up()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        assert_eq!(ServerStatus::Up.to_string(), "UP");
        assert_eq!(
            ServerStatus::Down("Connection refused".into()).to_string(),
            "DOWN: Connection refused"
        );
        assert_eq!(
            ServerStatus::Error("NOAUTH Authentication required.".into()).to_string(),
            "ERROR: NOAUTH Authentication required."
        );
    }

    #[test]
    fn unavailable_snapshot_is_empty() {
        let stats = ServerStats::unavailable(ServerStatus::Down("timed out".into()));
        assert!(!stats.is_up());
        assert_eq!(stats.memory, "n/a");
        assert!(stats.info.is_empty());
        assert!(stats.slowlog.is_empty());
        assert!(stats.databases.is_empty());
    }
}
