//! A typed, indexed document store built atop an embedded ordered
//! key/value engine.
//!
//! Documents are identified by a string id scoped to a dotted namespace,
//! carry an opaque typed payload, and participate in an optimistic
//! concurrency protocol through a per-document revision counter. Secondary
//! indexing is exposed via unique and shared named keys; [`Filter`]s
//! compose conditions over those keys, and the [`planner`] picks the
//! cheapest available index for a given filter.
//!
//! ```no_run
//! use docustore::{Db, Document, Payload};
//!
//! let db = Db::open_in_memory();
//! let doc = Document::new("doc-1", Payload::from_string("hello")).with_unique_key("slug:hello");
//! db.save(doc).unwrap();
//! ```

pub mod cancel;
pub mod codec;
pub mod db;
pub mod document;
pub mod engine;
pub mod error;
pub mod filter;
pub mod keycode;
pub mod keys;
pub mod namespace;
pub mod planner;
pub mod payload;
pub mod tx;

pub use cancel::Cancel;
pub use db::{Db, DbConfig};
pub use document::{Document, Headers, KeyKind, KeyMap, Payload};
pub use error::{Error, Operation, CResult};
pub use filter::{has_id, has_keys, has_unique_key, has_unique_key_in, is_one_of, Condition, Filter};
