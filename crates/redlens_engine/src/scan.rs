use std::collections::HashSet;

use redis::ConnectionLike;
use redlens_core::{BoardConfig, EngineError, KeyInfo, KeyType, ScanResult};

use crate::classify::KeyClassifier;
use crate::connection::{RedisHandle, command_error};
use crate::convert::{into_pairs, value_to_bytes, value_to_f64};

/// One raw (undecoded) page of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValuePage {
    String { offset: u64, bytes: Vec<u8> },
    List { offset: u64, items: Vec<Vec<u8>> },
    Hash { entries: Vec<(Vec<u8>, Vec<u8>)> },
    Set { members: Vec<Vec<u8>> },
    ZSet { entries: Vec<(Vec<u8>, f64)> },
    Error { message: String },
}

/// Cursor-based enumeration of keyspaces and of large values.
///
/// Scans are weakly consistent: a full cursor cycle visits every key (or
/// element) present for the whole scan at least once, while entries added
/// or removed mid-scan may show up zero or more times. That is the
/// guarantee SCAN gives and it is not tightened here.
pub struct ScanEngine<'a> {
    config: &'a BoardConfig,
}

impl<'a> ScanEngine<'a> {
    pub fn new(config: &'a BoardConfig) -> Self {
        Self { config }
    }

    /// One page of keyspace enumeration, classified.
    pub fn scan<C: ConnectionLike>(
        &self,
        handle: &mut RedisHandle<C>,
        db: u32,
        cursor: u64,
        pattern: Option<&str>,
        type_filter: Option<KeyType>,
        classifier: &KeyClassifier,
    ) -> Result<ScanResult<Vec<KeyInfo>>, EngineError> {
        handle.select(db)?;

        let conn = handle.conn()?;
        let total: u64 = redis::cmd("DBSIZE")
            .query(conn)
            .map_err(|e| command_error(&e))?;

        let mut command = redis::cmd("SCAN");
        command.arg(cursor);

        if let Some(pattern) = pattern
            && !pattern.is_empty()
        {
            command.arg("MATCH").arg(pattern);
        }

        command.arg("COUNT").arg(self.config.scan_count);

        if let Some(key_type) = type_filter {
            command.arg("TYPE").arg(key_type.as_str());
        }

        let (next_cursor, keys): (u64, Vec<Vec<u8>>) =
            command.query(conn).map_err(|e| command_error(&e))?;

        let infos = classifier.classify(handle, db, &keys)?;

        Ok(ScanResult::new(next_cursor, keys.len(), total, infos))
    }

    /// Random sample of a keyspace too large to enumerate eagerly: one
    /// pipelined burst of RANDOMKEY probes, deduplicated, classified.
    pub fn sample<C: ConnectionLike>(
        &self,
        handle: &mut RedisHandle<C>,
        db: u32,
        classifier: &KeyClassifier,
    ) -> Result<ScanResult<Vec<KeyInfo>>, EngineError> {
        handle.select(db)?;

        let conn = handle.conn()?;
        let total: u64 = redis::cmd("DBSIZE")
            .query(conn)
            .map_err(|e| command_error(&e))?;

        let mut pipe = redis::pipe();
        for _ in 0..self.config.sampling_size {
            pipe.cmd("RANDOMKEY");
        }
        let replies: Vec<redis::Value> = pipe.query(conn).map_err(|e| command_error(&e))?;

        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for reply in &replies {
            if let Some(key) = value_to_bytes(reply)
                && seen.insert(key.clone())
            {
                keys.push(key);
            }
        }

        let infos = classifier.classify(handle, db, &keys)?;

        Ok(ScanResult::new(0, keys.len(), total, infos))
    }

    /// One bounded page of a value, dispatched on the key's current type.
    ///
    /// The returned total is the value's full length from its length
    /// query, so callers can render progress; the cursor is an offset for
    /// lists and strings and the native scan token for hash/set/zset.
    pub fn value_page<C: ConnectionLike>(
        &self,
        handle: &mut RedisHandle<C>,
        db: u32,
        key: &[u8],
        cursor: u64,
    ) -> Result<ScanResult<ValuePage>, EngineError> {
        handle.select(db)?;
        let conn = handle.conn()?;

        let type_name: String = redis::cmd("TYPE")
            .arg(key)
            .query(conn)
            .map_err(|e| command_error(&e))?;

        if type_name.eq_ignore_ascii_case("none") {
            return Ok(ScanResult::new(
                0,
                0,
                0,
                ValuePage::Error {
                    message: "key not found".to_string(),
                },
            ));
        }

        match KeyType::parse(&type_name) {
            KeyType::String => self.string_page(conn, key, cursor),
            KeyType::List => self.list_page(conn, key, cursor),
            KeyType::Hash => self.hash_page(conn, key, cursor),
            KeyType::Set => self.set_page(conn, key, cursor),
            KeyType::ZSet => self.zset_page(conn, key, cursor),
            KeyType::Stream | KeyType::Unsupported => Ok(ScanResult::new(
                0,
                1,
                0,
                ValuePage::Error {
                    message: format!("Unsupported type '{}' for key", type_name),
                },
            )),
        }
    }

    fn string_page<C: ConnectionLike>(
        &self,
        conn: &mut C,
        key: &[u8],
        cursor: u64,
    ) -> Result<ScanResult<ValuePage>, EngineError> {
        let total: u64 = redis::cmd("STRLEN")
            .arg(key)
            .query(conn)
            .map_err(|e| command_error(&e))?;

        let page = self.config.string_pagination.max(1);
        let end = cursor + page - 1;
        let bytes: Vec<u8> = redis::cmd("GETRANGE")
            .arg(key)
            .arg(cursor)
            .arg(end)
            .query(conn)
            .map_err(|e| command_error(&e))?;

        let fetched = bytes.len() as u64;
        let next = cursor + fetched;
        let next_cursor = if fetched < page || next >= total {
            0
        } else {
            next
        };

        Ok(ScanResult::new(
            next_cursor,
            bytes.len(),
            total,
            ValuePage::String {
                offset: cursor,
                bytes,
            },
        ))
    }

    fn list_page<C: ConnectionLike>(
        &self,
        conn: &mut C,
        key: &[u8],
        cursor: u64,
    ) -> Result<ScanResult<ValuePage>, EngineError> {
        let total: u64 = redis::cmd("LLEN")
            .arg(key)
            .query(conn)
            .map_err(|e| command_error(&e))?;

        let count = (self.config.scan_count as u64).max(1);
        let end = cursor + count - 1;
        let items: Vec<Vec<u8>> = redis::cmd("LRANGE")
            .arg(key)
            .arg(cursor)
            .arg(end)
            .query(conn)
            .map_err(|e| command_error(&e))?;

        let fetched = items.len() as u64;
        let next = cursor + fetched;
        let next_cursor = if fetched < count || next >= total {
            0
        } else {
            next
        };

        Ok(ScanResult::new(
            next_cursor,
            items.len(),
            total,
            ValuePage::List {
                offset: cursor,
                items,
            },
        ))
    }

    fn hash_page<C: ConnectionLike>(
        &self,
        conn: &mut C,
        key: &[u8],
        cursor: u64,
    ) -> Result<ScanResult<ValuePage>, EngineError> {
        let total: u64 = redis::cmd("HLEN")
            .arg(key)
            .query(conn)
            .map_err(|e| command_error(&e))?;

        let (next_cursor, flat): (u64, Vec<redis::Value>) = redis::cmd("HSCAN")
            .arg(key)
            .arg(cursor)
            .arg("COUNT")
            .arg(self.config.scan_count)
            .query(conn)
            .map_err(|e| command_error(&e))?;

        let entries: Vec<(Vec<u8>, Vec<u8>)> = into_pairs(flat)
            .into_iter()
            .filter_map(|(field, value)| {
                Some((value_to_bytes(&field)?, value_to_bytes(&value)?))
            })
            .collect();

        Ok(ScanResult::new(
            next_cursor,
            entries.len(),
            total,
            ValuePage::Hash { entries },
        ))
    }

    fn set_page<C: ConnectionLike>(
        &self,
        conn: &mut C,
        key: &[u8],
        cursor: u64,
    ) -> Result<ScanResult<ValuePage>, EngineError> {
        let total: u64 = redis::cmd("SCARD")
            .arg(key)
            .query(conn)
            .map_err(|e| command_error(&e))?;

        let (next_cursor, members): (u64, Vec<Vec<u8>>) = redis::cmd("SSCAN")
            .arg(key)
            .arg(cursor)
            .arg("COUNT")
            .arg(self.config.scan_count)
            .query(conn)
            .map_err(|e| command_error(&e))?;

        Ok(ScanResult::new(
            next_cursor,
            members.len(),
            total,
            ValuePage::Set { members },
        ))
    }

    fn zset_page<C: ConnectionLike>(
        &self,
        conn: &mut C,
        key: &[u8],
        cursor: u64,
    ) -> Result<ScanResult<ValuePage>, EngineError> {
        let total: u64 = redis::cmd("ZCARD")
            .arg(key)
            .query(conn)
            .map_err(|e| command_error(&e))?;

        let (next_cursor, flat): (u64, Vec<redis::Value>) = redis::cmd("ZSCAN")
            .arg(key)
            .arg(cursor)
            .arg("COUNT")
            .arg(self.config.scan_count)
            .query(conn)
            .map_err(|e| command_error(&e))?;

        let entries: Vec<(Vec<u8>, f64)> = into_pairs(flat)
            .into_iter()
            .filter_map(|(member, score)| {
                Some((value_to_bytes(&member)?, value_to_f64(&score)?))
            })
            .collect();

        Ok(ScanResult::new(
            next_cursor,
            entries.len(),
            total,
            ValuePage::ZSet { entries },
        ))
    }
}
