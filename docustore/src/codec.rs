//! Marshals [`Record`], [`Content`], and [`KeyEntry`] to and from the
//! length-prefixed bytestrings the engine stores.
//!
//! Grounded on the teacher's `codec::bytes_codec::BytesCodec`, which
//! prefixes every encoded value with an 8-byte big-endian length so a
//! reader can validate a blob's shape before decoding its body. We encode
//! the body with `bincode` (already in the teacher's dependency set)
//! rather than JSON, since these blobs are internal and never hand-edited.

use crate::document::{Content, KeyEntry, Record};
use crate::error::{CResult, Error};
use byteorder::{BigEndian, ByteOrder};
use serde::{de::DeserializeOwned, Serialize};

const LEN_PREFIX: usize = 8;

fn marshal<T: Serialize>(value: &T) -> CResult<Vec<u8>> {
    let body = bincode::serialize(value).map_err(|e| Error::codec(e.to_string()))?;
    let mut out = Vec::with_capacity(LEN_PREFIX + body.len());
    let mut len_buf = [0u8; LEN_PREFIX];
    BigEndian::write_u64(&mut len_buf, body.len() as u64);
    out.extend_from_slice(&len_buf);
    out.extend_from_slice(&body);
    Ok(out)
}

fn unmarshal<T: DeserializeOwned>(blob: &[u8], what: &str) -> CResult<T> {
    if blob.len() < LEN_PREFIX {
        return Err(Error::integrity(format!("{what} blob shorter than length prefix")));
    }
    let len = BigEndian::read_u64(&blob[..LEN_PREFIX]) as usize;
    let body = &blob[LEN_PREFIX..];
    if body.len() != len {
        return Err(Error::integrity(format!(
            "{what} blob length mismatch: prefix says {len}, body is {}",
            body.len()
        )));
    }
    bincode::deserialize(body).map_err(|e| Error::integrity(format!("corrupt {what}: {e}")))
}

pub fn marshal_record(record: &Record) -> CResult<Vec<u8>> {
    marshal(record)
}

pub fn unmarshal_record(blob: &[u8]) -> CResult<Record> {
    unmarshal(blob, "record")
}

pub fn marshal_content(content: &Content) -> CResult<Vec<u8>> {
    marshal(content)
}

pub fn unmarshal_content(blob: &[u8]) -> CResult<Content> {
    unmarshal(blob, "content")
}

pub fn marshal_key_entry(entry: &KeyEntry) -> CResult<Vec<u8>> {
    marshal(entry)
}

pub fn unmarshal_key_entry(blob: &[u8]) -> CResult<KeyEntry> {
    unmarshal(blob, "key entry")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{KeyKind, Payload};
    use std::collections::{BTreeMap, BTreeSet};

    #[test]
    fn record_round_trips() {
        let mut keys = BTreeMap::new();
        keys.insert("uniq".to_string(), KeyKind::Unique);
        let record = Record {
            revision: 3,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            keys,
        };
        let blob = marshal_record(&record).unwrap();
        assert_eq!(unmarshal_record(&blob).unwrap(), record);
    }

    #[test]
    fn content_round_trips() {
        let content = Content {
            headers: BTreeMap::from([("k".to_string(), "v".to_string())]),
            payload: Payload::from_string("hello"),
        };
        let blob = marshal_content(&content).unwrap();
        assert_eq!(unmarshal_content(&blob).unwrap(), content);
    }

    #[test]
    fn corrupted_blob_is_an_integrity_error() {
        let record = Record {
            revision: 1,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            keys: BTreeMap::new(),
        };
        let mut blob = marshal_record(&record).unwrap();
        blob.truncate(blob.len() - 2);
        let err = unmarshal_record(&blob).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn key_entry_round_trips() {
        let entry =
            KeyEntry { kind: KeyKind::Shared, docs: BTreeSet::from(["a".into(), "b".into()]) };
        let blob = marshal_key_entry(&entry).unwrap();
        assert_eq!(unmarshal_key_entry(&blob).unwrap(), entry);
    }
}
