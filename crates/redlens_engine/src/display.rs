use regex::Regex;
use redlens_core::{
    BoardConfig, EngineError, KeyInfo, KeyTtl, KeyType, KeyUsage, ServerStats, Table,
    truncate_string_safe,
};

use crate::decode::ValueDecoder;

/// Maximum rendered length of a key name in the keys table.
const KEY_NAME_DISPLAY_LIMIT: usize = 200;

/// Assembles collected stats and scan pages into renderable tables.
///
/// Pure transformation: no network, no state. Column sets are fixed per
/// data type.
pub struct TabularFormatter<'a> {
    config: &'a BoardConfig,
    detail_filters: Vec<Regex>,
}

impl<'a> TabularFormatter<'a> {
    pub fn new(config: &'a BoardConfig) -> Result<Self, EngineError> {
        Ok(Self {
            detail_filters: config.compiled_detail_filters()?,
            config,
        })
    }

    /// Classified keys, one row per key.
    pub fn keys_table(
        &self,
        stats: &ServerStats,
        decoder: &dyn ValueDecoder,
        keys: &[KeyInfo],
    ) -> Table {
        let usage_column = if stats.has_frequency {
            "frequency"
        } else {
            "idletime"
        };

        let mut table = Table::new(["name", "type", "encoding", "ttl", usage_column, "length"])
            .with_title(format!("Keys ({})", keys.len()));

        for key in keys {
            let name = truncate_string_safe(&decoder.key(&key.name), KEY_NAME_DISPLAY_LIMIT);

            if let Some(error) = &key.error {
                table.push_row([
                    name,
                    "error".to_string(),
                    truncate_string_safe(error, KEY_NAME_DISPLAY_LIMIT),
                    "-".to_string(),
                    "-".to_string(),
                    "n/a".to_string(),
                ]);
                continue;
            }

            let ttl = match key.ttl {
                KeyTtl::Persistent => "-".to_string(),
                KeyTtl::Missing => "not found".to_string(),
                KeyTtl::Expires(seconds) => format_duration_secs(seconds),
            };

            let usage = match key.usage {
                Some(KeyUsage::Idletime(seconds)) => format_duration_secs(seconds),
                Some(KeyUsage::Frequency(count)) => count.to_string(),
                None => "-".to_string(),
            };

            let length = if key.length < 0 {
                "n/a".to_string()
            } else {
                key.length.to_string()
            };

            table.push_row([
                name,
                key.key_type.as_str().to_string(),
                key.encoding.clone().unwrap_or_else(|| "-".to_string()),
                ttl,
                usage,
                length,
            ]);
        }

        table
    }

    /// Decoded value rows under the column set of the key's type.
    pub fn value_table(&self, key_type: KeyType, rows: &[(String, String)]) -> Table {
        let columns = match key_type {
            KeyType::ZSet => ["score", "member"],
            KeyType::List | KeyType::Set => ["position", "value"],
            KeyType::Hash => ["field", "value"],
            KeyType::String => ["offset", "value"],
            KeyType::Stream | KeyType::Unsupported => ["field", "value"],
        };

        let mut table = Table::new(columns);
        for (first, second) in rows {
            table.push_row([first.clone(), second.clone()]);
        }
        table
    }

    /// Slowlog entries, duration descending, command text truncated.
    pub fn slowlog_table(&self, stats: &ServerStats) -> Table {
        let mut table = Table::new(["duration", "command"])
            .with_title(format!("Total: {} items", stats.slowlog_total));

        for entry in &stats.slowlog {
            table.push_row([
                format!("{:.1}ms", entry.duration_us as f64 / 1000.0),
                truncate_string_safe(&entry.command, self.config.slowlog_text_limit),
            ]);
        }

        table
    }

    /// CPU fields plus derived utilization; empty when the server is not up.
    pub fn cpu_table(&self, stats: &ServerStats) -> Table {
        let mut table = Table::new(["field", "value"]);

        let Some(cpu) = stats.cpu.filter(|_| stats.is_up()) else {
            return table;
        };

        table.push_row(["sys", &cpu.sys.to_string()]);
        table.push_row(["sys children", &cpu.sys_children.to_string()]);
        table.push_row(["user", &cpu.user.to_string()]);
        table.push_row(["user children", &cpu.user_children.to_string()]);
        table.push_row(["utilization", &format!("{:.3}%", cpu.utilization)]);

        table
    }

    /// INFO fields matching the configured filters, unit-converted.
    pub fn details_table(&self, stats: &ServerStats) -> Table {
        let mut table = Table::new(["field", "value"]);

        for (field, value) in &stats.info {
            if !self.detail_filters.iter().any(|re| re.is_match(field)) {
                continue;
            }

            let rendered = if self.config.detail_seconds_keys.iter().any(|k| k == field) {
                value
                    .parse::<u64>()
                    .map(format_duration_secs)
                    .unwrap_or_else(|_| value.clone())
            } else if self.config.detail_timestamp_keys.iter().any(|k| k == field) {
                value
                    .parse::<i64>()
                    .ok()
                    .and_then(format_timestamp)
                    .unwrap_or_else(|| value.clone())
            } else {
                value.clone()
            };

            table.push_row([field.replace('_', " "), rendered]);
        }

        table
    }

    /// Grouped overview blocks: key churn, memory breakdown, command and
    /// network throughput, clients, one block per database.
    pub fn summary_tables(&self, stats: &ServerStats) -> Vec<Table> {
        let get = |field: &str| -> String {
            stats
                .info
                .get(field)
                .cloned()
                .unwrap_or_else(|| "?".to_string())
        };
        let human = |field: &str| bytes_to_human(&get(field));

        let mut tables = Vec::new();

        let mut keys = Table::new(["field", "value"]).with_title("keys");
        keys.push_row(["expired", &get("expired_keys")]);
        keys.push_row(["evicted", &get("evicted_keys")]);
        keys.push_row(["hits", &get("keyspace_hits")]);
        keys.push_row(["misses", &get("keyspace_misses")]);
        tables.push(keys);

        let mut memory = Table::new(["field", "value"]).with_title("memory");
        memory.push_row(["used", &get("used_memory_human")]);
        memory.push_row(["peak", &get("used_memory_peak_human")]);
        memory.push_row(["max", &get("maxmemory_human")]);
        memory.push_row(["rss", &get("used_memory_rss_human")]);
        memory.push_row(["lua", &get("used_memory_lua_human")]);
        memory.push_row(["scripts", &get("used_memory_scripts_human")]);
        memory.push_row(["system", &get("total_system_memory_human")]);
        tables.push(memory);

        let mut commands = Table::new(["field", "value"]).with_title("commands");
        commands.push_row(["per second", &get("instantaneous_ops_per_sec")]);
        commands.push_row(["errors", &get("total_error_replies")]);
        commands.push_row(["total", &get("total_commands_processed")]);
        tables.push(commands);

        let mut input = Table::new(["field", "value"]).with_title("input");
        input.push_row(["current", &human("instantaneous_input_kbps")]);
        input.push_row(["total", &human("total_net_input_bytes")]);
        input.push_row(["repl", &human("instantaneous_input_repl_kbps")]);
        input.push_row(["repl total", &human("total_net_repl_input_bytes")]);
        tables.push(input);

        let mut output = Table::new(["field", "value"]).with_title("output");
        output.push_row(["current", &human("instantaneous_output_kbps")]);
        output.push_row(["total", &human("total_net_output_bytes")]);
        output.push_row(["repl", &human("instantaneous_output_repl_kbps")]);
        output.push_row(["repl total", &human("total_net_repl_output_bytes")]);
        tables.push(output);

        let mut clients = Table::new(["field", "value"]).with_title("clients");
        clients.push_row(["current", &get("connected_clients")]);
        clients.push_row(["blocked", &get("blocked_clients")]);
        clients.push_row(["tracked", &get("tracking_clients")]);
        clients.push_row(["rejected", &get("rejected_connections")]);
        clients.push_row(["timeout", &get("clients_in_timeout_table")]);
        clients.push_row(["max", &get("maxclients")]);
        clients.push_row(["total", &get("total_connections_received")]);
        tables.push(clients);

        for (index, db_stats) in &stats.databases {
            let mut table = Table::new(["field", "value"]).with_title(format!("db{}", index));
            table.push_row(["keys", &db_stats.keys.to_string()]);
            table.push_row(["expires", &db_stats.expires.to_string()]);
            table.push_row(["avg ttl", &db_stats.avg_ttl.to_string()]);
            tables.push(table);
        }

        tables
    }
}

/// Integer byte counts rendered as B/K/M/G/T; anything unparsable passes
/// through unchanged.
pub fn bytes_to_human(value: &str) -> String {
    let Ok(n) = value.parse::<i64>() else {
        return value.to_string();
    };

    const KIB: f64 = 1024.0;
    let n_f = n as f64;

    if n < 1024 {
        format!("{}B", n)
    } else if n < 1_048_576 {
        format!("{:.2}K", n_f / KIB)
    } else if n < 1_073_741_824 {
        format!("{:.2}M", n_f / KIB / KIB)
    } else if n < 1_099_511_627_776 {
        format!("{:.2}G", n_f / KIB / KIB / KIB)
    } else {
        format!("{:.2}T", n_f / KIB / KIB / KIB / KIB)
    }
}

/// Compact duration rendering: `1d 2h 3m 4s`, omitting leading zero units.
fn format_duration_secs(total: u64) -> String {
    if total == 0 {
        return "0s".to_string();
    }

    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 || !parts.is_empty() {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 || !parts.is_empty() {
        parts.push(format!("{}m", minutes));
    }
    parts.push(format!("{}s", seconds));

    parts.join(" ")
}

fn format_timestamp(epoch: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(epoch, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Utf8BackslashDecoder;
    use redlens_core::{ServerStatus, SlowlogEntry};

    fn up_stats() -> ServerStats {
        let mut stats = ServerStats::unavailable(ServerStatus::Up);
        stats.slowlog_total = 3;
        stats.slowlog = vec![
            SlowlogEntry {
                id: 2,
                timestamp: 0,
                duration_us: 9999,
                command: "EVAL busyloop".into(),
            },
            SlowlogEntry {
                id: 0,
                timestamp: 0,
                duration_us: 500,
                command: "GET str".into(),
            },
            SlowlogEntry {
                id: 1,
                timestamp: 0,
                duration_us: 10,
                command: "PING".into(),
            },
        ];
        stats
    }

    #[test]
    fn slowlog_rows_duration_descending() {
        let config = BoardConfig::default();
        let formatter = TabularFormatter::new(&config).unwrap();
        let table = formatter.slowlog_table(&up_stats());

        assert_eq!(table.title.as_deref(), Some("Total: 3 items"));
        let durations: Vec<&str> = table.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(durations, vec!["10.0ms", "0.5ms", "0.0ms"]);
    }

    #[test]
    fn slowlog_commands_truncated() {
        let config = BoardConfig::default();
        let formatter = TabularFormatter::new(&config).unwrap();
        let mut stats = up_stats();
        stats.slowlog[0].command = "x".repeat(400);

        let table = formatter.slowlog_table(&stats);
        assert_eq!(table.rows[0][1].len(), 255);
        assert!(table.rows[0][1].ends_with("..."));
    }

    #[test]
    fn cpu_table_renders_utilization() {
        let config = BoardConfig::default();
        let formatter = TabularFormatter::new(&config).unwrap();
        let mut stats = up_stats();
        stats.cpu = Some(redlens_core::CpuStats {
            sys: 1.5,
            sys_children: 0.5,
            user: 2.0,
            user_children: 0.0,
            utilization: 0.0,
        });

        let table = formatter.cpu_table(&stats);
        assert_eq!(table.rows.last().map(|r| r[1].as_str()), Some("0.000%"));
    }

    #[test]
    fn cpu_table_empty_when_down() {
        let config = BoardConfig::default();
        let formatter = TabularFormatter::new(&config).unwrap();
        let stats = ServerStats::unavailable(ServerStatus::Down("refused".into()));
        assert!(formatter.cpu_table(&stats).is_empty());
    }

    #[test]
    fn keys_table_rows() {
        let config = BoardConfig::default();
        let formatter = TabularFormatter::new(&config).unwrap();
        let stats = up_stats();

        let keys = vec![
            KeyInfo {
                name: b"str".to_vec(),
                key_type: KeyType::String,
                encoding: Some("embstr".into()),
                ttl: KeyTtl::Persistent,
                usage: Some(KeyUsage::Idletime(90)),
                length: 3,
                error: None,
            },
            KeyInfo::failed(b"broken".to_vec(), "WRONGTYPE"),
        ];

        let table = formatter.keys_table(&stats, &Utf8BackslashDecoder, &keys);
        assert_eq!(table.columns[4], "idletime");
        assert_eq!(
            table.rows[0],
            vec!["str", "string", "embstr", "-", "1m 30s", "3"]
        );
        assert_eq!(table.rows[1][1], "error");
        assert_eq!(table.rows[1][5], "n/a");
    }

    #[test]
    fn keys_table_usage_column_follows_policy() {
        let config = BoardConfig::default();
        let formatter = TabularFormatter::new(&config).unwrap();
        let mut stats = up_stats();
        stats.has_frequency = true;

        let table = formatter.keys_table(&stats, &Utf8BackslashDecoder, &[]);
        assert_eq!(table.columns[4], "frequency");
    }

    #[test]
    fn details_table_converts_units() {
        let config = BoardConfig::default();
        let formatter = TabularFormatter::new(&config).unwrap();
        let mut stats = up_stats();
        stats.info.insert("uptime_in_seconds".into(), "90061".into());
        stats.info.insert("last_save_time".into(), "0".into());
        stats.info.insert("used_memory_human".into(), "1.05M".into());

        let table = formatter.details_table(&stats);
        let row = |field: &str| {
            table
                .rows
                .iter()
                .find(|r| r[0] == field)
                .map(|r| r[1].clone())
        };

        assert_eq!(row("uptime in seconds").as_deref(), Some("1d 1h 1m 1s"));
        assert_eq!(
            row("last save time").as_deref(),
            Some("1970-01-01 00:00:00")
        );
        // not in the default filter set
        assert_eq!(row("used memory human"), None);
    }

    #[test]
    fn value_table_columns_per_type() {
        let config = BoardConfig::default();
        let formatter = TabularFormatter::new(&config).unwrap();

        let table = formatter.value_table(KeyType::ZSet, &[]);
        assert_eq!(table.columns, vec!["score", "member"]);
        let table = formatter.value_table(KeyType::List, &[]);
        assert_eq!(table.columns, vec!["position", "value"]);
        let table = formatter.value_table(KeyType::Hash, &[]);
        assert_eq!(table.columns, vec!["field", "value"]);
    }

    #[test]
    fn bytes_to_human_ranges() {
        assert_eq!(bytes_to_human("512"), "512B");
        assert_eq!(bytes_to_human("2048"), "2.00K");
        assert_eq!(bytes_to_human("1048576"), "1.00M");
        assert_eq!(bytes_to_human("1073741824"), "1.00G");
        assert_eq!(bytes_to_human("0.00"), "0.00");
        assert_eq!(bytes_to_human("?"), "?");
    }

    #[test]
    fn duration_rendering() {
        assert_eq!(format_duration_secs(0), "0s");
        assert_eq!(format_duration_secs(59), "59s");
        assert_eq!(format_duration_secs(3661), "1h 1m 1s");
        assert_eq!(format_duration_secs(90061), "1d 1h 1m 1s");
    }
}
