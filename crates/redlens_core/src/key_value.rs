use serde::{Deserialize, Serialize};

use crate::stats::DatabaseStats;

/// Redis value types the engine knows how to page and decode.
///
/// A closed set: anything the server reports outside it (streams excepted)
/// lands on `Unsupported` explicitly instead of falling through a lookup
/// table at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    String,
    List,
    Hash,
    Set,
    ZSet,
    Stream,
    Unsupported,
}

impl KeyType {
    /// Parse the reply of a `TYPE` command.
    ///
    /// `none` (missing key) parses to `Unsupported`; callers that care about
    /// the distinction check the raw reply first.
    pub fn parse(type_name: &str) -> Self {
        match type_name.trim().to_ascii_lowercase().as_str() {
            "string" => Self::String,
            "list" => Self::List,
            "hash" => Self::Hash,
            "set" => Self::Set,
            "zset" => Self::ZSet,
            "stream" => Self::Stream,
            _ => Self::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::List => "list",
            Self::Hash => "hash",
            Self::Set => "set",
            Self::ZSet => "zset",
            Self::Stream => "stream",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Expiry state of a key.
///
/// Wire rule: TTL `-1` means no expiry, `-2` means the key is gone. Both
/// are kept distinct from a real zero-second duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyTtl {
    Persistent,
    Expires(u64),
    Missing,
}

impl KeyTtl {
    pub fn from_wire(ttl: i64) -> Self {
        match ttl {
            -1 => Self::Persistent,
            ttl if ttl < 0 => Self::Missing,
            ttl => Self::Expires(ttl as u64),
        }
    }
}

/// Eviction-policy-dependent usage metric; exactly one applies per server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyUsage {
    /// Seconds since the key was last touched (non-LFU policies).
    Idletime(u64),
    /// Access frequency counter (`maxmemory-policy` ending in `-lfu`).
    Frequency(u64),
}

/// Classified metadata for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyInfo {
    /// Original key bytes; may not be valid UTF-8.
    pub name: Vec<u8>,
    pub key_type: KeyType,
    /// Internal storage representation reported by `OBJECT ENCODING`.
    pub encoding: Option<String>,
    pub ttl: KeyTtl,
    pub usage: Option<KeyUsage>,
    /// Element or byte count; `-1` sentinel for unsupported types.
    pub length: i64,
    /// Localized per-key query failure; the batch it came from succeeded.
    pub error: Option<String>,
}

impl KeyInfo {
    /// A key that vanished between listing and inspection.
    pub fn not_found(name: Vec<u8>) -> Self {
        Self {
            name,
            key_type: KeyType::Unsupported,
            encoding: None,
            ttl: KeyTtl::Missing,
            usage: None,
            length: 0,
            error: None,
        }
    }

    /// A key whose metadata queries failed; renders as an error row.
    pub fn failed(name: Vec<u8>, message: impl Into<String>) -> Self {
        Self {
            name,
            key_type: KeyType::Unsupported,
            encoding: None,
            ttl: KeyTtl::Missing,
            usage: None,
            length: -1,
            error: Some(message.into()),
        }
    }
}

/// One page of an incremental enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult<T> {
    /// Resumption token; `0` means the scan is complete.
    pub cursor: u64,
    /// Items returned in this page.
    pub count: usize,
    /// Best-effort total (DBSIZE or the value's full length).
    pub total: u64,
    pub data: T,
}

impl<T> ScanResult<T> {
    pub fn new(cursor: u64, count: usize, total: u64, data: T) -> Self {
        Self {
            cursor,
            count,
            total,
            data,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.cursor == 0
    }
}

/// Per-database summary, optionally carrying the page being browsed.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseInfo {
    pub index: u32,
    pub stats: DatabaseStats,
    pub scan: Option<ScanResult<Vec<KeyInfo>>>,
}

impl DatabaseInfo {
    pub fn new(index: u32, stats: DatabaseStats) -> Self {
        Self {
            index,
            stats,
            scan: None,
        }
    }

    pub fn with_scan(mut self, scan: ScanResult<Vec<KeyInfo>>) -> Self {
        self.scan = Some(scan);
        self
    }
}
