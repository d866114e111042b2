use redis::ConnectionLike;
use redlens_core::{EngineError, KeyInfo, KeyTtl, KeyType, KeyUsage, ServerStats};

use crate::connection::{RedisHandle, command_error, is_connection_error};
use crate::convert::{value_to_i64, value_to_string};

/// Sentinel returned for types without a length query.
const NO_LENGTH: i64 = -1;

/// Replies per key in the metadata round trip: encoding, ttl, usage, length.
const METADATA_STRIDE: usize = 4;

/// Which per-key usage metric the server can answer.
///
/// OBJECT FREQ only works under an `-lfu` eviction policy and OBJECT
/// IDLETIME only outside one, so the probe is chosen once per server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UsageProbe {
    Idletime,
    Frequency,
}

impl UsageProbe {
    fn command_arg(self) -> &'static str {
        match self {
            Self::Idletime => "IDLETIME",
            Self::Frequency => "FREQ",
        }
    }

    fn usage(self, value: i64) -> KeyUsage {
        let value = value.max(0) as u64;
        match self {
            Self::Idletime => KeyUsage::Idletime(value),
            Self::Frequency => KeyUsage::Frequency(value),
        }
    }
}

/// Determines type, encoding, TTL, usage metric and length for batches of
/// keys in pipelined round trips.
pub struct KeyClassifier {
    usage: UsageProbe,
}

impl KeyClassifier {
    pub fn new(has_frequency: bool) -> Self {
        Self {
            usage: if has_frequency {
                UsageProbe::Frequency
            } else {
                UsageProbe::Idletime
            },
        }
    }

    pub fn for_server(stats: &ServerStats) -> Self {
        Self::new(stats.has_frequency)
    }

    /// Classify a batch of keys with two pipelined round trips: TYPE for
    /// the whole batch, then encoding/TTL/usage/length for every key.
    ///
    /// Keys already gone at the TYPE probe come back as "not found" rows.
    /// A protocol error anywhere in the second pipeline (typically a key
    /// deleted or retyped between the probes) degrades to per-key
    /// classification so one bad key yields one error-marked row instead
    /// of aborting the batch.
    pub fn classify<C: ConnectionLike>(
        &self,
        handle: &mut RedisHandle<C>,
        db: u32,
        keys: &[Vec<u8>],
    ) -> Result<Vec<KeyInfo>, EngineError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        handle.select(db)?;
        let conn = handle.conn()?;

        match self.classify_batch(conn, keys) {
            Ok(infos) => Ok(infos),
            Err(error) if is_connection_error(&error) => Err(command_error(&error)),
            Err(error) => {
                log::warn!(
                    "pipelined classification failed ({}), retrying keys one by one",
                    error
                );
                self.classify_each(conn, keys)
            }
        }
    }

    fn classify_batch<C: ConnectionLike>(
        &self,
        conn: &mut C,
        keys: &[Vec<u8>],
    ) -> redis::RedisResult<Vec<KeyInfo>> {
        let types = self.probe_types(conn, keys)?;

        let mut pipe = redis::pipe();
        for (key, probe) in keys.iter().zip(&types) {
            match probe {
                Some(key_type) => {
                    // OBJECT refuses missing keys, hence the TYPE probe first.
                    pipe.cmd("OBJECT").arg("ENCODING").arg(key.as_slice());
                    pipe.cmd("TTL").arg(key.as_slice());
                    pipe.cmd("OBJECT")
                        .arg(self.usage.command_arg())
                        .arg(key.as_slice());
                    add_length_command(&mut pipe, *key_type, key);
                }
                None => {
                    // Placeholders keep the reply stride aligned.
                    for _ in 0..METADATA_STRIDE {
                        pipe.cmd("ECHO").arg("-1");
                    }
                }
            }
        }

        let replies: Vec<redis::Value> = pipe.query(conn)?;

        let mut infos = Vec::with_capacity(keys.len());
        for (index, (key, probe)) in keys.iter().zip(types).enumerate() {
            let base = index * METADATA_STRIDE;

            let Some(key_type) = probe else {
                infos.push(KeyInfo::not_found(key.clone()));
                continue;
            };

            let encoding = replies.get(base).and_then(value_to_string);
            let ttl = replies.get(base + 1).and_then(value_to_i64).unwrap_or(-2);
            let usage = replies.get(base + 2).and_then(value_to_i64);
            let length = replies
                .get(base + 3)
                .and_then(value_to_i64)
                .unwrap_or(NO_LENGTH);

            infos.push(KeyInfo {
                name: key.clone(),
                key_type,
                encoding,
                ttl: KeyTtl::from_wire(ttl),
                usage: usage.map(|value| self.usage.usage(value)),
                length,
                error: None,
            });
        }

        Ok(infos)
    }

    /// TYPE for the whole batch; `None` marks a key that no longer exists.
    fn probe_types<C: ConnectionLike>(
        &self,
        conn: &mut C,
        keys: &[Vec<u8>],
    ) -> redis::RedisResult<Vec<Option<KeyType>>> {
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("TYPE").arg(key.as_slice());
        }

        let replies: Vec<redis::Value> = pipe.query(conn)?;

        let types = replies
            .iter()
            .map(|reply| {
                let type_name = value_to_string(reply).unwrap_or_default();
                if type_name.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(KeyType::parse(&type_name))
                }
            })
            .collect();

        Ok(types)
    }

    /// Degraded path: one key at a time, localizing failures to rows.
    fn classify_each<C: ConnectionLike>(
        &self,
        conn: &mut C,
        keys: &[Vec<u8>],
    ) -> Result<Vec<KeyInfo>, EngineError> {
        let mut infos = Vec::with_capacity(keys.len());

        for key in keys {
            let info = match self.classify_batch(conn, std::slice::from_ref(key)) {
                Ok(mut batch) => batch
                    .pop()
                    .unwrap_or_else(|| KeyInfo::failed(key.clone(), "empty classification reply")),
                Err(error) if is_connection_error(&error) => return Err(command_error(&error)),
                Err(error) => KeyInfo::failed(key.clone(), error.to_string()),
            };
            infos.push(info);
        }

        Ok(infos)
    }
}

/// Type-specific length query. Types with no O(1) length (streams,
/// module types) get an ECHO placeholder that parses to the -1 sentinel,
/// keeping the pipeline reply aligned.
fn add_length_command(pipe: &mut redis::Pipeline, key_type: KeyType, key: &[u8]) {
    match key_type {
        KeyType::String => pipe.cmd("STRLEN").arg(key),
        KeyType::Hash => pipe.cmd("HLEN").arg(key),
        KeyType::List => pipe.cmd("LLEN").arg(key),
        KeyType::Set => pipe.cmd("SCARD").arg(key),
        // ZCARD over ZCOUNT -inf +inf: O(1) and equivalent while no
        // score-range filtering exists.
        KeyType::ZSet => pipe.cmd("ZCARD").arg(key),
        KeyType::Stream | KeyType::Unsupported => pipe.cmd("ECHO").arg("-1"),
    };
}
