//! Encodes/decodes a caller's structured payload into the `{tag, bytes}`
//! shape [`Payload`] carries, so `Content` never needs to know the
//! concrete payload type.
//!
//! The distilled spec names Protocol Buffers as the reference payload
//! codec, but that's an artifact of the original Go implementation having
//! one handy, not a requirement of the shape itself — the `{tag, bytes}`
//! split is exactly a `serde_json` value plus a type tag. We use `tag =
//! "json"` for typed payloads, reserving `"string"` for
//! [`Payload::from_string`].

use crate::document::Payload;
use crate::error::{CResult, Error};
use serde::{de::DeserializeOwned, Serialize};

const JSON_TAG: &str = "json";

/// Encodes a typed value under the `"json"` tag.
pub fn encode<T: Serialize>(value: &T) -> CResult<Payload> {
    let bytes = serde_json::to_vec(value).map_err(|e| Error::codec(e.to_string()))?;
    Ok(Payload { tag: JSON_TAG.to_string(), bytes })
}

/// Decodes a payload previously produced by [`encode`]. Fails with
/// `Integrity` if the tag doesn't match or the bytes don't deserialize to
/// `T` — a schema mismatch is a corrupted-on-disk condition, not a
/// retryable one.
pub fn decode<T: DeserializeOwned>(payload: &Payload) -> CResult<T> {
    if payload.tag != JSON_TAG {
        return Err(Error::integrity(format!(
            "payload tagged {:?}, expected {:?}",
            payload.tag, JSON_TAG
        )));
    }
    serde_json::from_slice(&payload.bytes)
        .map_err(|e| Error::integrity(format!("payload does not match requested type: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Widget {
        name: String,
        count: u32,
    }

    #[test]
    fn round_trips_typed_payload() {
        let widget = Widget { name: "bolt".to_string(), count: 12 };
        let payload = encode(&widget).unwrap();
        let decoded: Widget = decode(&payload).unwrap();
        assert_eq!(decoded, widget);
    }

    #[test]
    fn string_helper_uses_string_tag() {
        let payload = Payload::from_string("hi");
        assert_eq!(payload.tag, "string");
        assert_eq!(payload.as_str(), Some("hi"));
    }

    #[test]
    fn decode_rejects_mismatched_tag() {
        let payload = Payload::from_string("hi");
        let err = decode::<Widget>(&payload).unwrap_err();
        assert!(err.is_integrity());
    }
}
