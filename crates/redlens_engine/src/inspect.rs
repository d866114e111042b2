use redis::ConnectionLike;
use redlens_core::{
    BoardConfig, DatabaseInfo, EngineError, KeyInfo, ScanResult, ServerStats, ServerStatus,
    ServerTarget,
};

use crate::classify::KeyClassifier;
use crate::connection::RedisHandle;
use crate::decode::{Utf8BackslashDecoder, ValueDecoder, decode_page};
use crate::scan::ScanEngine;
use crate::stats::StatsCollector;

/// One inspection request, as handed over by the hosting layer.
#[derive(Debug, Clone, Default)]
pub struct InspectRequest {
    /// Database to browse; `None` asks for the server overview.
    pub db: Option<u32>,
    /// Resumption token from a previous page, as received on the wire.
    pub cursor: Option<String>,
    /// Key to inspect; implies a value page. Defaults to database 0 when
    /// no database is given.
    pub key: Option<Vec<u8>>,
    /// Glob pattern forwarded to SCAN MATCH.
    pub pattern: Option<String>,
    /// Restrict keyspace scans to one type.
    pub type_filter: Option<redlens_core::KeyType>,
    /// Running item count, used to number set members across pages.
    pub count: u64,
}

impl InspectRequest {
    pub fn overview() -> Self {
        Self::default()
    }

    pub fn keys(db: u32) -> Self {
        Self {
            db: Some(db),
            ..Self::default()
        }
    }

    pub fn value(db: u32, key: impl Into<Vec<u8>>) -> Self {
        Self {
            db: Some(db),
            key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }
}

/// What an inspection produced.
#[derive(Debug, Clone)]
pub enum InspectOutcome {
    /// Server snapshot plus the database list. The only outcome for
    /// unreachable servers (empty database list).
    Overview {
        stats: ServerStats,
        databases: Vec<DatabaseInfo>,
    },
    /// One page of keys in one database.
    Keys {
        stats: ServerStats,
        database: DatabaseInfo,
    },
    /// One decoded page of a single key's value.
    Value {
        stats: ServerStats,
        key: KeyInfo,
        page: ScanResult<Vec<(String, String)>>,
    },
}

/// Engine front door: runs the stats-then-browse control flow over one
/// scoped connection per request.
pub struct Inspector<D: ValueDecoder = Utf8BackslashDecoder> {
    config: BoardConfig,
    decoder: D,
}

impl Inspector<Utf8BackslashDecoder> {
    pub fn new(config: BoardConfig) -> Self {
        Self {
            config,
            decoder: Utf8BackslashDecoder,
        }
    }
}

impl<D: ValueDecoder> Inspector<D> {
    pub fn with_decoder(config: BoardConfig, decoder: D) -> Self {
        Self { config, decoder }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// Inspect `target`, opening a connection for the duration of this
    /// request and releasing it on every exit path. An unreachable server
    /// is not an error: it comes back as an `Overview` with a `Down` or
    /// `Error` status.
    pub fn inspect(
        &self,
        target: &ServerTarget,
        request: &InspectRequest,
    ) -> Result<InspectOutcome, EngineError> {
        let mut handle = match RedisHandle::open(target, &self.config) {
            Ok(handle) => handle,
            Err(error) => {
                log::warn!("cannot reach {}: {}", target.display(), error);
                return Ok(InspectOutcome::Overview {
                    stats: ServerStats::unavailable(status_from_open_error(error)),
                    databases: Vec::new(),
                });
            }
        };

        let outcome = self.inspect_with_handle(&mut handle, request);
        let closed = handle.close();
        let outcome = outcome?;
        closed?;
        Ok(outcome)
    }

    /// Same control flow over a caller-provided handle.
    pub fn inspect_with_handle<C: ConnectionLike>(
        &self,
        handle: &mut RedisHandle<C>,
        request: &InspectRequest,
    ) -> Result<InspectOutcome, EngineError> {
        let cursor = parse_cursor(request.cursor.as_deref())?;

        let collector = StatsCollector::new(&self.config);
        let stats = collector.collect(handle)?;

        if !stats.is_up() {
            return Ok(InspectOutcome::Overview {
                stats,
                databases: Vec::new(),
            });
        }

        let classifier = KeyClassifier::for_server(&stats);
        let scanner = ScanEngine::new(&self.config);

        match (&request.key, request.db) {
            (Some(key), db) => {
                self.value_outcome(handle, &scanner, &classifier, stats, db.unwrap_or(0), key, cursor, request.count)
            }
            (None, Some(db)) => {
                let scan = scanner.scan(
                    handle,
                    db,
                    cursor,
                    request.pattern.as_deref(),
                    request.type_filter,
                    &classifier,
                )?;
                let db_stats = stats.databases.get(&db).copied().unwrap_or_default();
                Ok(InspectOutcome::Keys {
                    database: DatabaseInfo::new(db, db_stats).with_scan(scan),
                    stats,
                })
            }
            (None, None) => self.overview_outcome(handle, &scanner, &classifier, stats),
        }
    }

    /// Database list with per-database counters. Small keyspaces get an
    /// eager first page, large ones a random sample; empty ones nothing.
    fn overview_outcome<C: ConnectionLike>(
        &self,
        handle: &mut RedisHandle<C>,
        scanner: &ScanEngine<'_>,
        classifier: &KeyClassifier,
        stats: ServerStats,
    ) -> Result<InspectOutcome, EngineError> {
        let count = stats
            .database_count
            .max(stats.databases.keys().next_back().map(|m| m + 1).unwrap_or(0));

        let mut databases = Vec::with_capacity(count as usize);
        for index in 0..count {
            let db_stats = stats.databases.get(&index).copied().unwrap_or_default();
            let mut database = DatabaseInfo::new(index, db_stats);

            if db_stats.keys > 0 {
                let scan = if db_stats.keys <= self.config.sampling_threshold {
                    scanner.scan(handle, index, 0, None, None, classifier)?
                } else {
                    scanner.sample(handle, index, classifier)?
                };
                database = database.with_scan(scan);
            }

            databases.push(database);
        }

        Ok(InspectOutcome::Overview { stats, databases })
    }

    #[allow(clippy::too_many_arguments)]
    fn value_outcome<C: ConnectionLike>(
        &self,
        handle: &mut RedisHandle<C>,
        scanner: &ScanEngine<'_>,
        classifier: &KeyClassifier,
        stats: ServerStats,
        db: u32,
        key: &[u8],
        cursor: u64,
        count: u64,
    ) -> Result<InspectOutcome, EngineError> {
        let batch = [key.to_vec()];
        let mut infos = classifier.classify(handle, db, &batch)?;
        let key_info = infos
            .pop()
            .ok_or_else(|| EngineError::command_failed("classification returned no rows"))?;

        let raw = scanner.value_page(handle, db, key, cursor)?;
        let decoded = decode_page(&self.decoder, key, &raw.data, count);

        Ok(InspectOutcome::Value {
            stats,
            key: key_info,
            page: ScanResult::new(raw.cursor, raw.count, raw.total, decoded),
        })
    }
}

fn status_from_open_error(error: EngineError) -> ServerStatus {
    match error {
        EngineError::ConnectionFailed(cause) => ServerStatus::Down(cause),
        other => ServerStatus::Error(other.to_string()),
    }
}

fn parse_cursor(cursor: Option<&str>) -> Result<u64, EngineError> {
    match cursor {
        None => Ok(0),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| EngineError::InvalidCursor(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_parsing() {
        assert_eq!(parse_cursor(None).unwrap(), 0);
        assert_eq!(parse_cursor(Some("17")).unwrap(), 17);
        assert!(matches!(
            parse_cursor(Some("not-a-cursor")),
            Err(EngineError::InvalidCursor(_))
        ));
    }

    #[test]
    fn open_failures_map_to_status() {
        let status =
            status_from_open_error(EngineError::ConnectionFailed("Connection refused".into()));
        assert_eq!(status, ServerStatus::Down("Connection refused".into()));

        let status = status_from_open_error(EngineError::CommandFailed(
            "Authentication failed. Check credentials.".into(),
        ));
        assert!(matches!(status, ServerStatus::Error(_)));
    }
}
