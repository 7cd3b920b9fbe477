//! Snapshot and stored-entry encoding.
//!
//! Snapshots are JSON arrays. Stores that keep bytes (LMDB, Redis) prefix them
//! with the write time: `[cached_at millis: 8 bytes LE][snapshot]`.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use vantage_core::{CacheError, CacheKey};

use crate::traits::CacheEntry;

/// Length of the timestamp header in a stored entry.
pub const HEADER_LEN: usize = 8;

/// Encode a snapshot for storage.
pub fn encode_snapshot<T: Serialize>(key: &CacheKey, snapshot: &[T]) -> Result<Vec<u8>, CacheError> {
    serde_json::to_vec(snapshot).map_err(|e| CacheError::Serialization {
        reason: format!("{}: {}", key, e),
    })
}

/// Decode a stored snapshot. Anything that is not a sequence of `T` is malformed.
pub fn decode_snapshot<T: DeserializeOwned>(
    key: &CacheKey,
    payload: &[u8],
) -> Result<Vec<T>, CacheError> {
    serde_json::from_slice(payload).map_err(|e| CacheError::Malformed {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Prefix a payload with its write time.
pub fn encode_entry(cached_at: DateTime<Utc>, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&cached_at.timestamp_millis().to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

/// Split a stored value into its write time and payload.
pub fn decode_entry(key: &CacheKey, bytes: &[u8]) -> Result<CacheEntry, CacheError> {
    let malformed = |reason: &str| CacheError::Malformed {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if bytes.len() < HEADER_LEN {
        return Err(malformed("entry shorter than timestamp header"));
    }

    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&bytes[..HEADER_LEN]);
    let cached_at = DateTime::from_timestamp_millis(i64::from_le_bytes(header))
        .ok_or_else(|| malformed("timestamp out of range"))?;

    Ok(CacheEntry::new(bytes[HEADER_LEN..].to_vec(), cached_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: String,
        name: String,
    }

    fn key() -> CacheKey {
        CacheKey::parse("dashboards:u1").expect("valid key")
    }

    #[test]
    fn test_snapshot_is_a_json_array() {
        let rows = vec![Row {
            id: "d1".into(),
            name: "Sales".into(),
        }];
        let bytes = encode_snapshot(&key(), &rows).expect("encode should succeed");
        assert_eq!(bytes, br#"[{"id":"d1","name":"Sales"}]"#.to_vec());

        let decoded: Vec<Row> = decode_snapshot(&key(), &bytes).expect("decode should succeed");
        assert_eq!(decoded, rows);
    }

    #[test]
    fn test_non_sequence_is_malformed() {
        let err = decode_snapshot::<Row>(&key(), br#"{"id":"d1","name":"Sales"}"#)
            .expect_err("object is not a sequence");
        assert!(matches!(err, CacheError::Malformed { .. }));

        assert!(decode_snapshot::<Row>(&key(), b"not json").is_err());
        assert!(decode_snapshot::<Row>(&key(), br#"[{"id":1}]"#).is_err());
    }

    #[test]
    fn test_empty_snapshot_is_valid() {
        let decoded: Vec<Row> = decode_snapshot(&key(), b"[]").expect("empty array decodes");
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_entry_header() {
        let cached_at = DateTime::from_timestamp_millis(1_700_000_000_123).expect("valid timestamp");
        let bytes = encode_entry(cached_at, b"[]");
        assert_eq!(bytes.len(), HEADER_LEN + 2);

        let entry = decode_entry(&key(), &bytes).expect("decode should succeed");
        assert_eq!(entry.cached_at, cached_at);
        assert_eq!(entry.payload, b"[]".to_vec());
    }

    #[test]
    fn test_truncated_entry_is_malformed() {
        let err = decode_entry(&key(), &[1, 2, 3]).expect_err("too short");
        assert!(matches!(err, CacheError::Malformed { .. }));
    }
}
