//! Scripted in-memory Redis connection.
//!
//! Implements `redis::ConnectionLike` over a deterministic keyspace model
//! so engine components run unmodified against it: commands arrive as
//! packed RESP, get parsed, executed against BTree-backed databases and
//! answered with `redis::Value` replies. Failure modes and per-command
//! faults are injectable.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use redis::{ConnectionLike, ErrorKind, RedisError, RedisResult, Value};

use crate::resp;

#[derive(Debug, Clone, PartialEq)]
pub enum FakeValue {
    String(Vec<u8>),
    List(Vec<Vec<u8>>),
    Hash(BTreeMap<Vec<u8>, Vec<u8>>),
    Set(BTreeSet<Vec<u8>>),
    ZSet(Vec<(Vec<u8>, f64)>),
    /// Arbitrary type name for exercising unsupported-type paths.
    Other { type_name: String },
}

impl FakeValue {
    fn type_name(&self) -> &str {
        match self {
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Hash(_) => "hash",
            Self::Set(_) => "set",
            Self::ZSet(_) => "zset",
            Self::Other { type_name } => type_name,
        }
    }

    fn encoding(&self) -> &'static str {
        match self {
            Self::String(bytes) if bytes.len() <= 44 => "embstr",
            Self::String(_) => "raw",
            Self::List(_) => "listpack",
            Self::Hash(entries) if entries.len() <= 128 => "listpack",
            Self::Hash(_) => "hashtable",
            Self::Set(_) => "listpack",
            Self::ZSet(_) => "listpack",
            Self::Other { .. } => "unknown",
        }
    }
}

#[derive(Debug, Default)]
struct FakeDb {
    keys: BTreeMap<Vec<u8>, FakeValue>,
    ttls: HashMap<Vec<u8>, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeSlowlogEntry {
    pub id: i64,
    pub timestamp: i64,
    pub duration_us: i64,
    pub command: Vec<Vec<u8>>,
}

/// Connection-level failure injected into every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    ConnectionRefused,
    AuthRequired,
}

pub struct FakeRedis {
    dbs: BTreeMap<u32, FakeDb>,
    active_db: u32,
    info_fields: Vec<(String, String)>,
    slowlog: Vec<FakeSlowlogEntry>,
    maxmemory_policy: String,
    database_count: u32,
    idletime_secs: i64,
    frequency: i64,
    randomkey_counter: usize,
    fail_mode: Option<FailMode>,
    fail_commands: HashMap<String, String>,
    /// Every command executed, in order, for assertions on round trips.
    pub commands: Vec<Vec<Vec<u8>>>,
}

impl Default for FakeRedis {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRedis {
    pub fn new() -> Self {
        let info_fields = [
            ("redis_version", "7.2.0"),
            ("uptime_in_seconds", "3600"),
            ("connected_clients", "1"),
            ("used_memory_human", "1.05M"),
            ("used_memory_peak_human", "1.25M"),
            ("used_cpu_sys", "1.50"),
            ("used_cpu_sys_children", "0.10"),
            ("used_cpu_user", "2.25"),
            ("used_cpu_user_children", "0.05"),
            ("expired_keys", "0"),
            ("evicted_keys", "0"),
            ("keyspace_hits", "0"),
            ("keyspace_misses", "0"),
            ("last_save_time", "1700000000"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            dbs: BTreeMap::new(),
            active_db: 0,
            info_fields,
            slowlog: Vec::new(),
            maxmemory_policy: "noeviction".to_string(),
            database_count: 16,
            idletime_secs: 0,
            frequency: 0,
            randomkey_counter: 0,
            fail_mode: None,
            fail_commands: HashMap::new(),
            commands: Vec::new(),
        }
    }

    // -- Seeding --

    pub fn set(&mut self, db: u32, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.db_mut(db)
            .keys
            .insert(key.into(), FakeValue::String(value.into()));
    }

    pub fn rpush(&mut self, db: u32, key: impl Into<Vec<u8>>, item: impl Into<Vec<u8>>) {
        let entry = self
            .db_mut(db)
            .keys
            .entry(key.into())
            .or_insert_with(|| FakeValue::List(Vec::new()));
        if let FakeValue::List(items) = entry {
            items.push(item.into());
        }
    }

    pub fn sadd(&mut self, db: u32, key: impl Into<Vec<u8>>, member: impl Into<Vec<u8>>) {
        let entry = self
            .db_mut(db)
            .keys
            .entry(key.into())
            .or_insert_with(|| FakeValue::Set(BTreeSet::new()));
        if let FakeValue::Set(members) = entry {
            members.insert(member.into());
        }
    }

    pub fn hset(
        &mut self,
        db: u32,
        key: impl Into<Vec<u8>>,
        field: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) {
        let entry = self
            .db_mut(db)
            .keys
            .entry(key.into())
            .or_insert_with(|| FakeValue::Hash(BTreeMap::new()));
        if let FakeValue::Hash(entries) = entry {
            entries.insert(field.into(), value.into());
        }
    }

    pub fn zadd(&mut self, db: u32, key: impl Into<Vec<u8>>, score: f64, member: impl Into<Vec<u8>>) {
        let entry = self
            .db_mut(db)
            .keys
            .entry(key.into())
            .or_insert_with(|| FakeValue::ZSet(Vec::new()));
        if let FakeValue::ZSet(entries) = entry {
            entries.push((member.into(), score));
        }
    }

    pub fn seed_other(&mut self, db: u32, key: impl Into<Vec<u8>>, type_name: impl Into<String>) {
        self.db_mut(db).keys.insert(
            key.into(),
            FakeValue::Other {
                type_name: type_name.into(),
            },
        );
    }

    pub fn expire(&mut self, db: u32, key: impl Into<Vec<u8>>, seconds: i64) {
        self.db_mut(db).ttls.insert(key.into(), seconds);
    }

    pub fn remove(&mut self, db: u32, key: &[u8]) {
        self.db_mut(db).keys.remove(key);
    }

    // -- Server behavior knobs --

    pub fn set_info_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.info_fields.iter_mut().find(|(k, _)| *k == name) {
            entry.1 = value;
        } else {
            self.info_fields.push((name, value));
        }
    }

    pub fn push_slowlog(&mut self, id: i64, timestamp: i64, duration_us: i64, command: &[&str]) {
        self.slowlog.push(FakeSlowlogEntry {
            id,
            timestamp,
            duration_us,
            command: command.iter().map(|arg| arg.as_bytes().to_vec()).collect(),
        });
    }

    pub fn set_maxmemory_policy(&mut self, policy: impl Into<String>) {
        self.maxmemory_policy = policy.into();
    }

    pub fn set_database_count(&mut self, count: u32) {
        self.database_count = count;
    }

    pub fn set_idletime(&mut self, seconds: i64) {
        self.idletime_secs = seconds;
    }

    pub fn set_frequency(&mut self, frequency: i64) {
        self.frequency = frequency;
    }

    pub fn fail_with(&mut self, mode: FailMode) {
        self.fail_mode = Some(mode);
    }

    /// Make every invocation of one command fail with a server error.
    pub fn fail_command(&mut self, name: &str, message: &str) {
        self.fail_commands
            .insert(name.to_ascii_uppercase(), message.to_string());
    }

    pub fn clear_failures(&mut self) {
        self.fail_mode = None;
        self.fail_commands.clear();
    }

    /// How many times a command was executed (SELECT counting, etc).
    pub fn command_count(&self, name: &str) -> usize {
        self.commands
            .iter()
            .filter(|args| {
                args.first()
                    .map(|cmd| cmd.eq_ignore_ascii_case(name.as_bytes()))
                    .unwrap_or(false)
            })
            .count()
    }

    // -- Execution --

    fn db_mut(&mut self, db: u32) -> &mut FakeDb {
        self.dbs.entry(db).or_default()
    }

    fn current(&self) -> Option<&FakeDb> {
        self.dbs.get(&self.active_db)
    }

    fn lookup(&self, key: &[u8]) -> Option<&FakeValue> {
        self.current().and_then(|db| db.keys.get(key))
    }

    fn execute(&mut self, args: &[Vec<u8>]) -> RedisResult<Value> {
        self.commands.push(args.to_vec());

        match self.fail_mode {
            Some(FailMode::ConnectionRefused) => {
                return Err(RedisError::from(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "Connection refused (os error 111)",
                )));
            }
            Some(FailMode::AuthRequired) => {
                return Err(RedisError::from((
                    ErrorKind::AuthenticationFailed,
                    "NOAUTH Authentication required.",
                )));
            }
            None => {}
        }

        let name = String::from_utf8_lossy(args.first().map(Vec::as_slice).unwrap_or_default())
            .to_ascii_uppercase();

        if let Some(message) = self.fail_commands.get(&name) {
            return Err(response_error(message.clone()));
        }

        match name.as_str() {
            "PING" => Ok(Value::SimpleString("PONG".to_string())),
            "ECHO" => Ok(Value::BulkString(arg_bytes(args, 1))),
            "AUTH" => Ok(Value::Okay),
            "SELECT" => {
                self.active_db = arg_u32(args, 1)?;
                Ok(Value::Okay)
            }
            "INFO" => Ok(Value::BulkString(self.render_info().into_bytes())),
            "DBSIZE" => Ok(Value::Int(
                self.current().map(|db| db.keys.len() as i64).unwrap_or(0),
            )),
            "EXISTS" => Ok(Value::Int(i64::from(self.lookup(&arg_bytes(args, 1)).is_some()))),
            "TYPE" => {
                let type_name = self
                    .lookup(&arg_bytes(args, 1))
                    .map(|value| value.type_name().to_string())
                    .unwrap_or_else(|| "none".to_string());
                Ok(Value::SimpleString(type_name))
            }
            "TTL" => {
                let key = arg_bytes(args, 1);
                if self.lookup(&key).is_none() {
                    return Ok(Value::Int(-2));
                }
                let ttl = self
                    .current()
                    .and_then(|db| db.ttls.get(&key).copied())
                    .unwrap_or(-1);
                Ok(Value::Int(ttl))
            }
            "OBJECT" => self.execute_object(args),
            "STRLEN" => self.typed_len(args, |value| match value {
                FakeValue::String(bytes) => Some(bytes.len() as i64),
                _ => None,
            }),
            "LLEN" => self.typed_len(args, |value| match value {
                FakeValue::List(items) => Some(items.len() as i64),
                _ => None,
            }),
            "HLEN" => self.typed_len(args, |value| match value {
                FakeValue::Hash(entries) => Some(entries.len() as i64),
                _ => None,
            }),
            "SCARD" => self.typed_len(args, |value| match value {
                FakeValue::Set(members) => Some(members.len() as i64),
                _ => None,
            }),
            "ZCARD" => self.typed_len(args, |value| match value {
                FakeValue::ZSet(entries) => Some(entries.len() as i64),
                _ => None,
            }),
            "GETRANGE" => self.execute_getrange(args),
            "LRANGE" => self.execute_lrange(args),
            "SCAN" => self.execute_scan(args),
            "HSCAN" => self.execute_hscan(args),
            "SSCAN" => self.execute_sscan(args),
            "ZSCAN" => self.execute_zscan(args),
            "SLOWLOG" => self.execute_slowlog(args),
            "CONFIG" => self.execute_config(args),
            "RANDOMKEY" => self.execute_randomkey(),
            other => Err(response_error(format!("unknown command '{}'", other))),
        }
    }

    fn execute_object(&self, args: &[Vec<u8>]) -> RedisResult<Value> {
        let subcommand = String::from_utf8_lossy(&arg_bytes(args, 1)).to_ascii_uppercase();
        let key = arg_bytes(args, 2);

        let Some(value) = self.lookup(&key) else {
            return Err(response_error("no such key".to_string()));
        };

        match subcommand.as_str() {
            "ENCODING" => Ok(Value::BulkString(value.encoding().as_bytes().to_vec())),
            "IDLETIME" => {
                if self.maxmemory_policy.ends_with("-lfu") {
                    Err(response_error(
                        "An LFU maxmemory policy is selected, idle time not tracked".to_string(),
                    ))
                } else {
                    Ok(Value::Int(self.idletime_secs))
                }
            }
            "FREQ" => {
                if self.maxmemory_policy.ends_with("-lfu") {
                    Ok(Value::Int(self.frequency))
                } else {
                    Err(response_error(
                        "An LFU maxmemory policy is not selected, access frequency not tracked"
                            .to_string(),
                    ))
                }
            }
            other => Err(response_error(format!("Unknown OBJECT subcommand '{}'", other))),
        }
    }

    fn typed_len(
        &self,
        args: &[Vec<u8>],
        len: impl Fn(&FakeValue) -> Option<i64>,
    ) -> RedisResult<Value> {
        match self.lookup(&arg_bytes(args, 1)) {
            None => Ok(Value::Int(0)),
            Some(value) => match len(value) {
                Some(length) => Ok(Value::Int(length)),
                None => Err(wrong_type()),
            },
        }
    }

    fn execute_getrange(&self, args: &[Vec<u8>]) -> RedisResult<Value> {
        let key = arg_bytes(args, 1);
        let start = arg_i64(args, 2)?;
        let end = arg_i64(args, 3)?;

        let bytes = match self.lookup(&key) {
            None => return Ok(Value::BulkString(Vec::new())),
            Some(FakeValue::String(bytes)) => bytes,
            Some(_) => return Err(wrong_type()),
        };

        let (start, end) = clamp_range(start, end, bytes.len());
        if start > end || bytes.is_empty() {
            return Ok(Value::BulkString(Vec::new()));
        }

        Ok(Value::BulkString(bytes[start..=end].to_vec()))
    }

    fn execute_lrange(&self, args: &[Vec<u8>]) -> RedisResult<Value> {
        let key = arg_bytes(args, 1);
        let start = arg_i64(args, 2)?;
        let end = arg_i64(args, 3)?;

        let items = match self.lookup(&key) {
            None => return Ok(Value::Array(Vec::new())),
            Some(FakeValue::List(items)) => items,
            Some(_) => return Err(wrong_type()),
        };

        let (start, end) = clamp_range(start, end, items.len());
        if start > end || items.is_empty() {
            return Ok(Value::Array(Vec::new()));
        }

        Ok(Value::Array(
            items[start..=end]
                .iter()
                .map(|item| Value::BulkString(item.clone()))
                .collect(),
        ))
    }

    fn execute_scan(&self, args: &[Vec<u8>]) -> RedisResult<Value> {
        let cursor = arg_u64(args, 1)? as usize;
        let options = ScanOptions::parse(args.get(2..).unwrap_or_default())?;

        let all: Vec<(&Vec<u8>, &FakeValue)> = self
            .current()
            .map(|db| db.keys.iter().collect())
            .unwrap_or_default();

        let end = (cursor + options.count).min(all.len());
        let next = if end >= all.len() { 0 } else { end as u64 };

        let keys: Vec<Value> = all
            .get(cursor..end)
            .unwrap_or_default()
            .iter()
            .filter(|(key, value)| {
                options.matches(key) && options.type_allows(value.type_name())
            })
            .map(|(key, _)| Value::BulkString((*key).clone()))
            .collect();

        Ok(scan_reply(next, keys))
    }

    fn execute_hscan(&self, args: &[Vec<u8>]) -> RedisResult<Value> {
        let key = arg_bytes(args, 1);
        let cursor = arg_u64(args, 2)? as usize;
        let options = ScanOptions::parse(args.get(3..).unwrap_or_default())?;

        let entries: Vec<(&Vec<u8>, &Vec<u8>)> = match self.lookup(&key) {
            None => Vec::new(),
            Some(FakeValue::Hash(entries)) => entries.iter().collect(),
            Some(_) => return Err(wrong_type()),
        };

        let end = (cursor + options.count).min(entries.len());
        let next = if end >= entries.len() { 0 } else { end as u64 };

        let mut flat = Vec::new();
        for (field, value) in entries.get(cursor..end).unwrap_or_default() {
            flat.push(Value::BulkString((*field).clone()));
            flat.push(Value::BulkString((*value).clone()));
        }

        Ok(scan_reply(next, flat))
    }

    fn execute_sscan(&self, args: &[Vec<u8>]) -> RedisResult<Value> {
        let key = arg_bytes(args, 1);
        let cursor = arg_u64(args, 2)? as usize;
        let options = ScanOptions::parse(args.get(3..).unwrap_or_default())?;

        let members: Vec<&Vec<u8>> = match self.lookup(&key) {
            None => Vec::new(),
            Some(FakeValue::Set(members)) => members.iter().collect(),
            Some(_) => return Err(wrong_type()),
        };

        let end = (cursor + options.count).min(members.len());
        let next = if end >= members.len() { 0 } else { end as u64 };

        let page: Vec<Value> = members
            .get(cursor..end)
            .unwrap_or_default()
            .iter()
            .map(|member| Value::BulkString((*member).clone()))
            .collect();

        Ok(scan_reply(next, page))
    }

    fn execute_zscan(&self, args: &[Vec<u8>]) -> RedisResult<Value> {
        let key = arg_bytes(args, 1);
        let cursor = arg_u64(args, 2)? as usize;
        let options = ScanOptions::parse(args.get(3..).unwrap_or_default())?;

        let mut entries: Vec<(&Vec<u8>, f64)> = match self.lookup(&key) {
            None => Vec::new(),
            Some(FakeValue::ZSet(entries)) => {
                entries.iter().map(|(member, score)| (member, *score)).collect()
            }
            Some(_) => return Err(wrong_type()),
        };
        entries.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });

        let end = (cursor + options.count).min(entries.len());
        let next = if end >= entries.len() { 0 } else { end as u64 };

        let mut flat = Vec::new();
        for (member, score) in entries.get(cursor..end).unwrap_or_default() {
            flat.push(Value::BulkString((*member).clone()));
            flat.push(Value::BulkString(score.to_string().into_bytes()));
        }

        Ok(scan_reply(next, flat))
    }

    fn execute_slowlog(&self, args: &[Vec<u8>]) -> RedisResult<Value> {
        let subcommand = String::from_utf8_lossy(&arg_bytes(args, 1)).to_ascii_uppercase();

        match subcommand.as_str() {
            "LEN" => Ok(Value::Int(self.slowlog.len() as i64)),
            "GET" => {
                let count = args
                    .get(2)
                    .and_then(|raw| String::from_utf8_lossy(raw).parse::<usize>().ok())
                    .unwrap_or(10);

                let entries: Vec<Value> = self
                    .slowlog
                    .iter()
                    .take(count)
                    .map(|entry| {
                        Value::Array(vec![
                            Value::Int(entry.id),
                            Value::Int(entry.timestamp),
                            Value::Int(entry.duration_us),
                            Value::Array(
                                entry
                                    .command
                                    .iter()
                                    .map(|arg| Value::BulkString(arg.clone()))
                                    .collect(),
                            ),
                            Value::BulkString(b"127.0.0.1:0".to_vec()),
                            Value::BulkString(Vec::new()),
                        ])
                    })
                    .collect();

                Ok(Value::Array(entries))
            }
            other => Err(response_error(format!("Unknown SLOWLOG subcommand '{}'", other))),
        }
    }

    fn execute_config(&self, args: &[Vec<u8>]) -> RedisResult<Value> {
        let subcommand = String::from_utf8_lossy(&arg_bytes(args, 1)).to_ascii_uppercase();
        if subcommand != "GET" {
            return Err(response_error(format!(
                "Unknown CONFIG subcommand '{}'",
                subcommand
            )));
        }

        let parameter = String::from_utf8_lossy(&arg_bytes(args, 2)).to_ascii_lowercase();
        let value = match parameter.as_str() {
            "maxmemory-policy" => Some(self.maxmemory_policy.clone()),
            "databases" => Some(self.database_count.to_string()),
            _ => None,
        };

        match value {
            Some(value) => Ok(Value::Array(vec![
                Value::BulkString(parameter.into_bytes()),
                Value::BulkString(value.into_bytes()),
            ])),
            None => Ok(Value::Array(Vec::new())),
        }
    }

    fn execute_randomkey(&mut self) -> RedisResult<Value> {
        let keys: Vec<Vec<u8>> = self
            .current()
            .map(|db| db.keys.keys().cloned().collect())
            .unwrap_or_default();

        if keys.is_empty() {
            return Ok(Value::Nil);
        }

        let key = keys[self.randomkey_counter % keys.len()].clone();
        self.randomkey_counter += 1;
        Ok(Value::BulkString(key))
    }

    fn render_info(&self) -> String {
        let mut out = String::from("# Server\r\n");
        for (field, value) in &self.info_fields {
            out.push_str(&format!("{}:{}\r\n", field, value));
        }

        out.push_str("# Keyspace\r\n");
        for (index, db) in &self.dbs {
            if db.keys.is_empty() {
                continue;
            }
            out.push_str(&format!(
                "db{}:keys={},expires={},avg_ttl=0\r\n",
                index,
                db.keys.len(),
                db.ttls.len()
            ));
        }

        out
    }
}

impl ConnectionLike for FakeRedis {
    fn req_packed_command(&mut self, cmd: &[u8]) -> RedisResult<Value> {
        let commands = resp::parse_commands(cmd).map_err(client_error)?;
        let args = commands
            .first()
            .ok_or_else(|| client_error("empty request".to_string()))?;
        self.execute(args)
    }

    fn req_packed_commands(
        &mut self,
        cmd: &[u8],
        offset: usize,
        count: usize,
    ) -> RedisResult<Vec<Value>> {
        let commands = resp::parse_commands(cmd).map_err(client_error)?;

        let mut replies = Vec::with_capacity(commands.len());
        for args in &commands {
            replies.push(self.execute(args)?);
        }

        Ok(replies.into_iter().skip(offset).take(count).collect())
    }

    fn get_db(&self) -> i64 {
        self.active_db as i64
    }

    fn check_connection(&mut self) -> bool {
        self.fail_mode.is_none()
    }

    fn is_open(&self) -> bool {
        true
    }
}

struct ScanOptions {
    pattern: Option<Vec<u8>>,
    count: usize,
    type_filter: Option<String>,
}

impl ScanOptions {
    fn parse(args: &[Vec<u8>]) -> RedisResult<Self> {
        let mut options = Self {
            pattern: None,
            count: 10,
            type_filter: None,
        };

        let mut iter = args.iter();
        while let Some(option) = iter.next() {
            let value = iter
                .next()
                .ok_or_else(|| response_error("syntax error".to_string()))?;

            match String::from_utf8_lossy(option).to_ascii_uppercase().as_str() {
                "MATCH" => options.pattern = Some(value.clone()),
                "COUNT" => {
                    options.count = String::from_utf8_lossy(value)
                        .parse()
                        .map_err(|_| response_error("value is not an integer".to_string()))?;
                }
                "TYPE" => {
                    options.type_filter = Some(String::from_utf8_lossy(value).to_string())
                }
                _ => return Err(response_error("syntax error".to_string())),
            }
        }

        Ok(options)
    }

    fn matches(&self, key: &[u8]) -> bool {
        match &self.pattern {
            None => true,
            Some(pattern) => glob_match(pattern, key),
        }
    }

    fn type_allows(&self, type_name: &str) -> bool {
        match &self.type_filter {
            None => true,
            Some(filter) => filter.eq_ignore_ascii_case(type_name),
        }
    }
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some(b'*') => {
            glob_match(&pattern[1..], text)
                || (!text.is_empty() && glob_match(pattern, &text[1..]))
        }
        Some(b'?') => !text.is_empty() && glob_match(&pattern[1..], &text[1..]),
        Some(byte) => text.first() == Some(byte) && glob_match(&pattern[1..], &text[1..]),
    }
}

fn scan_reply(next_cursor: u64, page: Vec<Value>) -> Value {
    Value::Array(vec![
        Value::BulkString(next_cursor.to_string().into_bytes()),
        Value::Array(page),
    ])
}

/// Resolve a Redis inclusive range against a collection length; a result
/// with `start > end` means the selection is empty.
fn clamp_range(start: i64, end: i64, len: usize) -> (usize, usize) {
    if len == 0 {
        return (1, 0);
    }

    let len = len as i64;
    let resolve = |index: i64| if index < 0 { len + index } else { index };

    let start = resolve(start).clamp(0, len);
    let end = resolve(end).clamp(-1, len - 1);
    if end < 0 || start > end {
        return (1, 0);
    }

    (start as usize, end as usize)
}

fn arg_bytes(args: &[Vec<u8>], index: usize) -> Vec<u8> {
    args.get(index).cloned().unwrap_or_default()
}

fn arg_i64(args: &[Vec<u8>], index: usize) -> RedisResult<i64> {
    String::from_utf8_lossy(&arg_bytes(args, index))
        .parse()
        .map_err(|_| response_error("value is not an integer or out of range".to_string()))
}

fn arg_u64(args: &[Vec<u8>], index: usize) -> RedisResult<u64> {
    String::from_utf8_lossy(&arg_bytes(args, index))
        .parse()
        .map_err(|_| response_error("invalid cursor".to_string()))
}

fn arg_u32(args: &[Vec<u8>], index: usize) -> RedisResult<u32> {
    String::from_utf8_lossy(&arg_bytes(args, index))
        .parse()
        .map_err(|_| response_error("DB index is out of range".to_string()))
}

fn wrong_type() -> RedisError {
    response_error("WRONGTYPE Operation against a key holding the wrong kind of value".to_string())
}

fn response_error(message: String) -> RedisError {
    RedisError::from((
        ErrorKind::ResponseError,
        "An error was signalled by the server",
        message,
    ))
}

fn client_error(message: String) -> RedisError {
    RedisError::from((ErrorKind::ClientError, "invalid packed command", message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec(fake: &mut FakeRedis, args: &[&str]) -> RedisResult<Value> {
        let args: Vec<Vec<u8>> = args.iter().map(|a| a.as_bytes().to_vec()).collect();
        fake.execute(&args)
    }

    #[test]
    fn type_and_ttl() {
        let mut fake = FakeRedis::new();
        fake.set(0, "str", "bar");
        fake.expire(0, "str", 90);

        assert_eq!(
            exec(&mut fake, &["TYPE", "str"]).unwrap(),
            Value::SimpleString("string".into())
        );
        assert_eq!(exec(&mut fake, &["TTL", "str"]).unwrap(), Value::Int(90));
        assert_eq!(exec(&mut fake, &["TTL", "gone"]).unwrap(), Value::Int(-2));
        assert_eq!(
            exec(&mut fake, &["TYPE", "gone"]).unwrap(),
            Value::SimpleString("none".into())
        );
    }

    #[test]
    fn getrange_clamps() {
        let mut fake = FakeRedis::new();
        fake.set(0, "blob", "0123456789");

        assert_eq!(
            exec(&mut fake, &["GETRANGE", "blob", "0", "3"]).unwrap(),
            Value::BulkString(b"0123".to_vec())
        );
        assert_eq!(
            exec(&mut fake, &["GETRANGE", "blob", "8", "100"]).unwrap(),
            Value::BulkString(b"89".to_vec())
        );
        assert_eq!(
            exec(&mut fake, &["GETRANGE", "blob", "20", "30"]).unwrap(),
            Value::BulkString(Vec::new())
        );
    }

    #[test]
    fn scan_pages_cycle_to_zero() {
        let mut fake = FakeRedis::new();
        for i in 0..5 {
            fake.set(0, format!("key{}", i).into_bytes(), "v");
        }

        let reply = exec(&mut fake, &["SCAN", "0", "COUNT", "3"]).unwrap();
        let Value::Array(parts) = reply else {
            panic!("expected array");
        };
        assert_eq!(parts[0], Value::BulkString(b"3".to_vec()));

        let reply = exec(&mut fake, &["SCAN", "3", "COUNT", "3"]).unwrap();
        let Value::Array(parts) = reply else {
            panic!("expected array");
        };
        assert_eq!(parts[0], Value::BulkString(b"0".to_vec()));
    }

    #[test]
    fn pipeline_round_trip_through_connection_like() {
        let mut fake = FakeRedis::new();
        fake.set(0, "str", "bar");

        let mut pipe = redis::pipe();
        pipe.cmd("TYPE").arg("str");
        pipe.cmd("STRLEN").arg("str");
        let (type_name, length): (String, i64) = pipe.query(&mut fake).unwrap();

        assert_eq!(type_name, "string");
        assert_eq!(length, 3);
    }

    #[test]
    fn glob_patterns() {
        assert!(glob_match(b"*", b"anything"));
        assert!(glob_match(b"key*", b"key42"));
        assert!(glob_match(b"k?y", b"key"));
        assert!(!glob_match(b"key*", b"other"));
        assert!(!glob_match(b"k?y", b"kY"));
    }

    #[test]
    fn object_freq_requires_lfu() {
        let mut fake = FakeRedis::new();
        fake.set(0, "k", "v");

        assert!(exec(&mut fake, &["OBJECT", "FREQ", "k"]).is_err());
        assert!(exec(&mut fake, &["OBJECT", "IDLETIME", "k"]).is_ok());

        fake.set_maxmemory_policy("allkeys-lfu");
        assert!(exec(&mut fake, &["OBJECT", "FREQ", "k"]).is_ok());
        assert!(exec(&mut fake, &["OBJECT", "IDLETIME", "k"]).is_err());
    }
}
