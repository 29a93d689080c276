//! The user-visible [`Document`] type and its persisted halves, [`Record`]
//! and [`Content`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A named index carried by a document: `Unique` (at most one document per
/// name within a namespace) or `Shared` (many documents per name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    Unique,
    Shared,
}

pub type KeyMap = BTreeMap<String, KeyKind>;
pub type Headers = BTreeMap<String, String>;

/// A typed, opaque payload: a type tag plus its encoded bytes. See
/// [`crate::payload`] for the codec that produces these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub tag: String,
    #[serde(with = "serde_bytes")]
    pub bytes: Vec<u8>,
}

impl Payload {
    /// Wraps a plain string under the well-known `"string"` tag.
    pub fn from_string(value: impl Into<String>) -> Self {
        Payload { tag: "string".to_string(), bytes: value.into().into_bytes() }
    }

    pub fn as_str(&self) -> Option<&str> {
        if self.tag == "string" {
            std::str::from_utf8(&self.bytes).ok()
        } else {
            None
        }
    }
}

/// The persisted metadata envelope for a document, stored in the `records`
/// bucket. A record's presence is the authoritative indicator that its
/// document exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub revision: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub keys: KeyMap,
}

impl Record {
    pub fn exists(&self) -> bool {
        self.revision > 0
    }
}

/// The persisted headers + payload for a document, stored in the `content`
/// bucket. Present iff the corresponding record is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub headers: Headers,
    pub payload: Payload,
}

/// The user-visible document: a record's metadata plus its content, joined
/// by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub revision: u64,
    pub keys: KeyMap,
    pub headers: Headers,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub content: Payload,
}

impl Document {
    /// Constructs a brand-new, not-yet-saved document: revision 0, epoch
    /// timestamps (overwritten by the engine on save).
    pub fn new(id: impl Into<String>, content: Payload) -> Self {
        let epoch = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH;
        Document {
            id: id.into(),
            revision: 0,
            keys: KeyMap::new(),
            headers: Headers::new(),
            created_at: epoch,
            updated_at: epoch,
            content,
        }
    }

    pub fn with_unique_key(mut self, name: impl Into<String>) -> Self {
        self.keys.insert(name.into(), KeyKind::Unique);
        self
    }

    pub fn with_shared_key(mut self, name: impl Into<String>) -> Self {
        self.keys.insert(name.into(), KeyKind::Shared);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub(crate) fn into_parts(self) -> (String, Record, Content) {
        let record = Record {
            revision: self.revision,
            created_at: self.created_at,
            updated_at: self.updated_at,
            keys: self.keys,
        };
        let content = Content { headers: self.headers, payload: self.content };
        (self.id, record, content)
    }

    pub(crate) fn from_parts(id: String, record: Record, content: Content) -> Self {
        Document {
            id,
            revision: record.revision,
            keys: record.keys,
            headers: content.headers,
            created_at: record.created_at,
            updated_at: record.updated_at,
            content: content.payload,
        }
    }
}

/// The set of document ids currently claiming a given key name, and the
/// kind they claim it under. Invariant: if `kind = Unique`, `docs` has
/// exactly one member. An entry whose `docs` becomes empty is not
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub kind: KeyKind,
    pub docs: BTreeSet<String>,
}
