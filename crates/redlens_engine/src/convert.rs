//! Small helpers for picking apart raw `redis::Value` replies where the
//! typed conversions of the client crate don't fit (heterogeneous arrays,
//! pipelined batches).

use redis::Value;

pub(crate) fn value_to_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::BulkString(data) => Some(data.clone()),
        Value::SimpleString(s) => Some(s.clone().into_bytes()),
        Value::Nil => None,
        _ => None,
    }
}

pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(data) => Some(String::from_utf8_lossy(data).to_string()),
        Value::SimpleString(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Nil => None,
        other => Some(format!("{other:?}")),
    }
}

pub(crate) fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::BulkString(data) => String::from_utf8_lossy(data).parse().ok(),
        Value::SimpleString(s) => s.parse().ok(),
        _ => None,
    }
}

pub(crate) fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Double(f) => Some(*f),
        Value::Int(i) => Some(*i as f64),
        Value::BulkString(data) => String::from_utf8_lossy(data).parse().ok(),
        Value::SimpleString(s) => s.parse().ok(),
        _ => None,
    }
}

/// Chunk a flat `[a, b, a, b, ...]` reply into pairs, dropping a dangling
/// trailing element.
pub(crate) fn into_pairs(values: Vec<Value>) -> Vec<(Value, Value)> {
    let mut pairs = Vec::with_capacity(values.len() / 2);
    let mut iter = values.into_iter();
    while let (Some(first), Some(second)) = (iter.next(), iter.next()) {
        pairs.push((first, second));
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_from_bulk_and_simple() {
        assert_eq!(
            value_to_bytes(&Value::BulkString(b"abc".to_vec())),
            Some(b"abc".to_vec())
        );
        assert_eq!(
            value_to_bytes(&Value::SimpleString("ok".into())),
            Some(b"ok".to_vec())
        );
        assert_eq!(value_to_bytes(&Value::Nil), None);
    }

    #[test]
    fn numbers_parse_from_bulk_strings() {
        assert_eq!(value_to_i64(&Value::BulkString(b"-1".to_vec())), Some(-1));
        assert_eq!(value_to_i64(&Value::Int(42)), Some(42));
        assert_eq!(value_to_f64(&Value::BulkString(b"1.5".to_vec())), Some(1.5));
    }

    #[test]
    fn pairs_drop_dangling_element() {
        let values = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
        let pairs = into_pairs(values);
        assert_eq!(pairs.len(), 1);
    }
}
