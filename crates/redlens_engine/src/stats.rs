use std::collections::BTreeMap;

use indexmap::IndexMap;
use redis::ConnectionLike;
use redlens_core::{
    BoardConfig, CpuStats, DatabaseStats, EngineError, ServerStats, ServerStatus, ServerTarget,
    SlowlogEntry,
};

use crate::connection::{RedisHandle, is_connection_error, with_server};
use crate::convert::{value_to_i64, value_to_string};
use crate::decode::decode_backslash;

/// Takes one snapshot of a server: INFO, slowlog, derived views.
///
/// Redis-recoverable failures never escape: the snapshot carries a
/// `Down`/`Error` status instead. Only contract violations (using a closed
/// handle) surface as errors.
pub struct StatsCollector<'a> {
    config: &'a BoardConfig,
}

impl<'a> StatsCollector<'a> {
    pub fn new(config: &'a BoardConfig) -> Self {
        Self { config }
    }

    /// Open a connection to `target`, collect, release. Never fails: an
    /// unreachable server yields a `Down` snapshot, a rejected one `Error`.
    pub fn collect_target(&self, target: &ServerTarget) -> ServerStats {
        match with_server(target, self.config, |handle| self.collect(handle)) {
            Ok(stats) => stats,
            Err(EngineError::ConnectionFailed(cause)) => {
                ServerStats::unavailable(ServerStatus::Down(cause))
            }
            Err(error) => ServerStats::unavailable(ServerStatus::Error(error.to_string())),
        }
    }

    /// Collect over an existing handle.
    pub fn collect<C: ConnectionLike>(
        &self,
        handle: &mut RedisHandle<C>,
    ) -> Result<ServerStats, EngineError> {
        let conn = handle.conn()?;

        match self.try_collect(conn) {
            Ok(stats) => Ok(stats),
            Err(error) if is_connection_error(&error) => {
                log::warn!("server unreachable while collecting stats: {}", error);
                Ok(ServerStats::unavailable(ServerStatus::Down(
                    error.to_string(),
                )))
            }
            Err(error) => {
                log::warn!("server rejected stats commands: {}", error);
                Ok(ServerStats::unavailable(ServerStatus::Error(
                    error.to_string(),
                )))
            }
        }
    }

    fn try_collect<C: ConnectionLike>(&self, conn: &mut C) -> redis::RedisResult<ServerStats> {
        redis::cmd("PING").query::<String>(conn)?;

        let raw_info: String = redis::cmd("INFO").query(conn)?;
        let raw_slowlog: Vec<Vec<redis::Value>> = redis::cmd("SLOWLOG")
            .arg("GET")
            .arg(self.config.slowlog_len)
            .query(conn)?;
        let slowlog_total: u64 = redis::cmd("SLOWLOG").arg("LEN").query(conn)?;

        let info = parse_info(&raw_info);
        let databases = parse_databases(&info);

        let has_frequency = fetch_config_value(conn, "maxmemory-policy")
            .map(|policy| policy.ends_with("-lfu"))
            .unwrap_or(false);
        let database_count = fetch_config_value(conn, "databases")
            .and_then(|count| count.parse::<u32>().ok())
            .unwrap_or_else(|| fallback_database_count(&databases));

        let mut slowlog = parse_slowlog(raw_slowlog);
        slowlog.sort_by(|a, b| b.duration_us.cmp(&a.duration_us));

        Ok(ServerStats {
            status: ServerStatus::Up,
            memory: derive_memory(&info),
            cpu: Some(derive_cpu(&info)),
            slowlog,
            slowlog_total,
            databases,
            database_count,
            has_frequency,
            info,
        })
    }
}

/// Flatten INFO output into field order as sent by the server, dropping
/// section headers.
fn parse_info(raw: &str) -> IndexMap<String, String> {
    let mut info = IndexMap::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once(':') {
            info.insert(key.to_string(), value.to_string());
        }
    }

    info
}

/// Parse every `dbN` INFO field into per-database keyspace counters.
fn parse_databases(info: &IndexMap<String, String>) -> BTreeMap<u32, DatabaseStats> {
    let mut databases = BTreeMap::new();

    for (key, value) in info {
        let Some(digits) = key.strip_prefix("db") else {
            continue;
        };
        let Ok(db_index) = digits.parse::<u32>() else {
            continue;
        };

        let mut stats = DatabaseStats::default();
        for field in value.split(',') {
            let Some((name, value)) = field.split_once('=') else {
                continue;
            };

            match name {
                "keys" => stats.keys = value.parse().unwrap_or(0),
                "expires" => stats.expires = value.parse().unwrap_or(0),
                "avg_ttl" => stats.avg_ttl = value.parse().unwrap_or(0),
                _ => {}
            }
        }

        databases.insert(db_index, stats);
    }

    databases
}

fn fallback_database_count(databases: &BTreeMap<u32, DatabaseStats>) -> u32 {
    databases
        .keys()
        .next_back()
        .map(|max| max + 1)
        .unwrap_or(1)
}

/// Best-effort CONFIG GET; managed servers often disable CONFIG entirely.
fn fetch_config_value<C: ConnectionLike>(conn: &mut C, parameter: &str) -> Option<String> {
    let values: Vec<String> = match redis::cmd("CONFIG").arg("GET").arg(parameter).query(conn) {
        Ok(values) => values,
        Err(error) => {
            log::debug!("CONFIG GET {} unavailable: {}", parameter, error);
            return None;
        }
    };

    if values.len() < 2 {
        return None;
    }

    Some(values[1].clone())
}

fn derive_memory(info: &IndexMap<String, String>) -> String {
    match info.get("used_memory_human") {
        Some(used) => {
            let peak = info
                .get("used_memory_peak_human")
                .map(String::as_str)
                .unwrap_or("n/a");
            format!("{} (peak: {})", used, peak)
        }
        None => "n/a".to_string(),
    }
}

fn derive_cpu(info: &IndexMap<String, String>) -> CpuStats {
    let field = |name: &str| -> f64 {
        info.get(name)
            .and_then(|value| value.parse().ok())
            .unwrap_or(0.0)
    };

    let sys = field("used_cpu_sys");
    let sys_children = field("used_cpu_sys_children");
    let user = field("used_cpu_user");
    let user_children = field("used_cpu_user_children");

    let uptime: u64 = info
        .get("uptime_in_seconds")
        .and_then(|value| value.parse().ok())
        .unwrap_or(0);

    let total = sys + sys_children + user + user_children;
    let utilization = if uptime == 0 {
        0.0
    } else {
        total / uptime as f64
    };

    CpuStats {
        sys,
        sys_children,
        user,
        user_children,
        utilization,
    }
}

/// Each SLOWLOG GET entry is `[id, start_time, duration_us, argv, ...]`;
/// entries that don't fit the shape are skipped.
fn parse_slowlog(raw: Vec<Vec<redis::Value>>) -> Vec<SlowlogEntry> {
    let mut entries = Vec::with_capacity(raw.len());

    for entry in raw {
        if entry.len() < 4 {
            continue;
        }

        let id = value_to_i64(&entry[0]).unwrap_or(0);
        let timestamp = value_to_i64(&entry[1]).unwrap_or(0);
        let duration_us = value_to_i64(&entry[2]).unwrap_or(0);

        let command = match &entry[3] {
            redis::Value::Array(args) => args
                .iter()
                .map(|arg| match arg {
                    redis::Value::BulkString(data) => decode_backslash(data),
                    other => value_to_string(other).unwrap_or_default(),
                })
                .collect::<Vec<_>>()
                .join(" "),
            other => value_to_string(other).unwrap_or_default(),
        };

        entries.push(SlowlogEntry {
            id,
            timestamp,
            duration_us,
            command,
        });
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::Value;

    fn info_fixture() -> IndexMap<String, String> {
        parse_info(
            "# Server\r\n\
             redis_version:7.2.0\r\n\
             uptime_in_seconds:200\r\n\
             # Memory\r\n\
             used_memory_human:1.05M\r\n\
             used_memory_peak_human:1.25M\r\n\
             # CPU\r\n\
             used_cpu_sys:1.5\r\n\
             used_cpu_sys_children:0.5\r\n\
             used_cpu_user:2.0\r\n\
             used_cpu_user_children:0.0\r\n\
             # Keyspace\r\n\
             db0:keys=5,expires=1,avg_ttl=360\r\n\
             db3:keys=2,expires=0,avg_ttl=0\r\n",
        )
    }

    #[test]
    fn info_parses_in_order_without_sections() {
        let info = info_fixture();
        assert_eq!(info.get("redis_version").map(String::as_str), Some("7.2.0"));
        assert!(!info.contains_key("# Server"));
        assert_eq!(info.keys().next().map(String::as_str), Some("redis_version"));
    }

    #[test]
    fn databases_parse_counts() {
        let databases = parse_databases(&info_fixture());
        assert_eq!(databases.len(), 2);
        assert_eq!(databases[&0].keys, 5);
        assert_eq!(databases[&0].expires, 1);
        assert_eq!(databases[&0].avg_ttl, 360);
        assert_eq!(databases[&3].keys, 2);
        assert_eq!(fallback_database_count(&databases), 4);
    }

    #[test]
    fn memory_summary_pairs_used_and_peak() {
        assert_eq!(derive_memory(&info_fixture()), "1.05M (peak: 1.25M)");
        assert_eq!(derive_memory(&IndexMap::new()), "n/a");
    }

    #[test]
    fn cpu_utilization_totals_fields() {
        let cpu = derive_cpu(&info_fixture());
        assert_eq!(cpu.sys, 1.5);
        assert_eq!(cpu.user, 2.0);
        assert!((cpu.utilization - 4.0 / 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cpu_utilization_zero_uptime_is_zero() {
        let mut info = info_fixture();
        info.insert("uptime_in_seconds".into(), "0".into());
        let cpu = derive_cpu(&info);
        assert_eq!(cpu.utilization, 0.0);
    }

    #[test]
    fn slowlog_entries_parse_and_skip_malformed() {
        let raw = vec![
            vec![
                Value::Int(7),
                Value::Int(1_700_000_000),
                Value::Int(500),
                Value::Array(vec![
                    Value::BulkString(b"GET".to_vec()),
                    Value::BulkString(b"str".to_vec()),
                ]),
            ],
            vec![Value::Int(8)],
        ];

        let entries = parse_slowlog(raw);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, 7);
        assert_eq!(entries[0].duration_us, 500);
        assert_eq!(entries[0].command, "GET str");
    }
}
