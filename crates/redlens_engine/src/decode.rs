use std::cmp::Ordering;

use redlens_core::DecodeError;

use crate::scan::ValuePage;

/// Decode bytes as UTF-8, rendering undecodable sequences as `\xNN`
/// escapes instead of failing or dropping data. Total for any input.
pub fn decode_backslash(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;

    while !rest.is_empty() {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                break;
            }
            Err(error) => {
                let valid_len = error.valid_up_to();
                // valid_up_to guarantees this prefix is well-formed
                out.push_str(&String::from_utf8_lossy(&rest[..valid_len]));

                let invalid_len = error.error_len().unwrap_or(rest.len() - valid_len);
                for byte in &rest[valid_len..valid_len + invalid_len] {
                    out.push_str(&format!("\\x{byte:02x}"));
                }

                rest = &rest[valid_len + invalid_len..];
            }
        }
    }

    out
}

/// Converts raw Redis payloads into display text.
///
/// `key` must be total: key names render no matter what bytes they hold.
/// `value` may reject a malformed payload; the engine substitutes a
/// placeholder for that value and carries on.
pub trait ValueDecoder {
    fn key(&self, key: &[u8]) -> String {
        decode_backslash(key)
    }

    fn value(&self, key: &[u8], value: &[u8]) -> Result<String, DecodeError>;
}

/// Default decoder: UTF-8 with backslash escapes. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8BackslashDecoder;

impl ValueDecoder for Utf8BackslashDecoder {
    fn value(&self, _key: &[u8], value: &[u8]) -> Result<String, DecodeError> {
        Ok(decode_backslash(value))
    }
}

/// Decoder for values written as JSON documents. Re-serializes compactly;
/// rejects payloads that don't parse.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl ValueDecoder for JsonDecoder {
    fn value(&self, _key: &[u8], value: &[u8]) -> Result<String, DecodeError> {
        let parsed: serde_json::Value = serde_json::from_slice(value)
            .map_err(|e| DecodeError::new(format!("invalid JSON payload: {e}")))?;
        Ok(parsed.to_string())
    }
}

fn decode_or_placeholder(decoder: &dyn ValueDecoder, key: &[u8], raw: &[u8]) -> String {
    match decoder.value(key, raw) {
        Ok(text) => text,
        Err(error) => {
            log::warn!(
                "failed to decode value of key {}: {}",
                decode_backslash(key),
                error
            );
            format!("<decode error: {}>", error)
        }
    }
}

/// Assemble one fetched page into display rows.
///
/// Hash and set rows are sorted by their decoded field/member for stable
/// output; zset rows are ordered by score ascending. Ordering is
/// page-local. `start` numbers set members across pages (lists and strings
/// carry their own offset).
pub fn decode_page(
    decoder: &dyn ValueDecoder,
    key: &[u8],
    page: &ValuePage,
    start: u64,
) -> Vec<(String, String)> {
    match page {
        ValuePage::String { offset, bytes } => vec![(
            offset.to_string(),
            decode_or_placeholder(decoder, key, bytes),
        )],
        ValuePage::List { offset, items } => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                (
                    (offset + i as u64).to_string(),
                    decode_or_placeholder(decoder, key, item),
                )
            })
            .collect(),
        ValuePage::Hash { entries } => {
            let mut rows: Vec<(String, String)> = entries
                .iter()
                .map(|(field, value)| {
                    (
                        decoder.key(field),
                        decode_or_placeholder(decoder, key, value),
                    )
                })
                .collect();
            rows.sort();
            rows
        }
        ValuePage::Set { members } => {
            let mut decoded: Vec<String> = members
                .iter()
                .map(|member| decode_or_placeholder(decoder, key, member))
                .collect();
            decoded.sort();
            decoded
                .into_iter()
                .enumerate()
                .map(|(i, member)| ((start + i as u64).to_string(), member))
                .collect()
        }
        ValuePage::ZSet { entries } => {
            let mut rows: Vec<(f64, String)> = entries
                .iter()
                .map(|(member, score)| (*score, decode_or_placeholder(decoder, key, member)))
                .collect();
            rows.sort_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.1.cmp(&b.1))
            });
            rows.into_iter()
                .map(|(score, member)| (score.to_string(), member))
                .collect()
        }
        ValuePage::Error { message } => vec![("ERROR".to_string(), message.clone())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_valid_utf8_unchanged() {
        assert_eq!(decode_backslash(b"hello"), "hello");
        assert_eq!(decode_backslash("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn decode_invalid_bytes_escaped() {
        assert_eq!(decode_backslash(b"a\xffb"), "a\\xffb");
        assert_eq!(decode_backslash(b"\xf0\x28"), "\\xf0(");
    }

    #[test]
    fn decode_never_fails_for_any_byte() {
        let all: Vec<u8> = (0u8..=255).collect();
        let decoded = decode_backslash(&all);
        assert!(decoded.contains("\\xff"));
        assert!(decoded.contains('a'));

        for byte in 0u8..=255 {
            let _ = decode_backslash(&[byte, byte, byte]);
        }
    }

    #[test]
    fn json_decoder_rejects_garbage() {
        let decoder = JsonDecoder;
        assert_eq!(
            decoder.value(b"k", br#"{"a": 1}"#).unwrap(),
            r#"{"a":1}"#
        );
        assert!(decoder.value(b"k", b"\x80\x81").is_err());
    }

    #[test]
    fn decode_page_substitutes_placeholder_on_failure() {
        let page = ValuePage::List {
            offset: 0,
            items: vec![b"not-json".to_vec()],
        };
        let rows = decode_page(&JsonDecoder, b"k", &page, 0);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].1.starts_with("<decode error:"));
    }

    #[test]
    fn hash_rows_sorted_by_field() {
        let page = ValuePage::Hash {
            entries: vec![
                (b"zulu".to_vec(), b"1".to_vec()),
                (b"alpha".to_vec(), b"2".to_vec()),
            ],
        };
        let rows = decode_page(&Utf8BackslashDecoder, b"h", &page, 0);
        assert_eq!(rows[0].0, "alpha");
        assert_eq!(rows[1].0, "zulu");
    }

    #[test]
    fn set_rows_numbered_from_start() {
        let page = ValuePage::Set {
            members: vec![b"foo".to_vec(), b"bar".to_vec()],
        };
        let rows = decode_page(&Utf8BackslashDecoder, b"s", &page, 10);
        assert_eq!(rows[0], ("10".to_string(), "bar".to_string()));
        assert_eq!(rows[1], ("11".to_string(), "foo".to_string()));
    }

    #[test]
    fn zset_rows_score_ascending() {
        let page = ValuePage::ZSet {
            entries: vec![(b"b".to_vec(), 2.0), (b"foo".to_vec(), 1.0)],
        };
        let rows = decode_page(&Utf8BackslashDecoder, b"z", &page, 0);
        assert_eq!(rows[0], ("1".to_string(), "foo".to_string()));
        assert_eq!(rows[1], ("2".to_string(), "b".to_string()));
    }
}
