//! Namespace resolution: maps a dotted namespace path to the key prefixes
//! for its three buckets (`records`, `content`, `keys`) over the flat
//! engine, using [`crate::keycode`].
//!
//! A real nested-bucket K/V engine (the reference shape this spec assumes)
//! tracks bucket existence intrinsically: a bucket either has a header or
//! it doesn't. A flat engine has no such notion, so existence is tracked
//! with small marker keys — one for the namespace itself and one per child
//! bucket — which is also what lets [`Namespace::open`] distinguish "never
//! created" from "created but missing a child bucket" (an integrity
//! violation).

use crate::engine::Engine;
use crate::error::{CResult, Error};

const ROOT: &[u8] = b"docustore";
const BUCKETS: [&str; 3] = ["records", "content", "keys"];

#[derive(Debug, Clone)]
pub struct Namespace {
    segments: Vec<String>,
}

impl Namespace {
    pub fn root() -> Self {
        Namespace { segments: Vec::new() }
    }

    pub fn new(path: &str) -> Self {
        let segments =
            if path.is_empty() { Vec::new() } else { path.split('.').map(String::from).collect() };
        Namespace { segments }
    }

    /// Derives a child namespace handle, concatenating with `.`.
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Namespace { segments }
    }

    pub fn path(&self) -> String {
        self.segments.join(".")
    }

    fn segment_bytes(&self) -> Vec<&[u8]> {
        let mut out = vec![ROOT];
        out.extend(self.segments.iter().map(|s| s.as_bytes()));
        out
    }

    fn marker_key(&self) -> Vec<u8> {
        let mut segs = self.segment_bytes();
        segs.push(b"\0ns");
        crate::keycode::encode(&segs)
    }

    // Markers live under a `\0bucket` segment of their own rather than
    // inside the bucket's own prefix, so a prefix scan over `records` (say)
    // never turns up the marker alongside the actual record keys.
    fn bucket_marker_key(&self, bucket: &str) -> Vec<u8> {
        let mut segs = self.segment_bytes();
        segs.push(b"\0bucket");
        segs.push(bucket.as_bytes());
        crate::keycode::encode(&segs)
    }

    fn bucket_prefix(&self, bucket: &str) -> Vec<u8> {
        let mut segs = self.segment_bytes();
        segs.push(bucket.as_bytes());
        crate::keycode::encode_prefix(&segs)
    }

    pub fn record_key(&self, id: &str) -> Vec<u8> {
        let mut segs = self.segment_bytes();
        segs.push(b"records");
        segs.push(id.as_bytes());
        crate::keycode::encode(&segs)
    }

    pub fn content_key(&self, id: &str) -> Vec<u8> {
        let mut segs = self.segment_bytes();
        segs.push(b"content");
        segs.push(id.as_bytes());
        crate::keycode::encode(&segs)
    }

    pub fn key_entry_key(&self, name: &str) -> Vec<u8> {
        let mut segs = self.segment_bytes();
        segs.push(b"keys");
        segs.push(name.as_bytes());
        crate::keycode::encode(&segs)
    }

    pub fn records_prefix(&self) -> Vec<u8> {
        self.bucket_prefix("records")
    }

    pub fn content_prefix(&self) -> Vec<u8> {
        self.bucket_prefix("content")
    }

    pub fn keys_prefix(&self) -> Vec<u8> {
        self.bucket_prefix("keys")
    }

    fn whole_prefix(&self) -> Vec<u8> {
        crate::keycode::encode_prefix(&self.segment_bytes())
    }

    /// Resolves this namespace, returning `Ok(None)` if it was never
    /// created. Fails with `Integrity` if the namespace marker is present
    /// but a child bucket marker is missing.
    pub fn open<E: Engine>(&self, engine: &mut E) -> CResult<Option<()>> {
        if self.segments.is_empty() {
            // The root namespace always exists; it has no marker of its own.
            return Ok(Some(()));
        }
        if engine.get(&self.marker_key())?.is_none() {
            return Ok(None);
        }
        for bucket in BUCKETS {
            if engine.get(&self.bucket_marker_key(bucket))?.is_none() {
                return Err(Error::integrity(format!(
                    "namespace {:?} is missing its {bucket:?} bucket",
                    self.path()
                )));
            }
        }
        Ok(Some(()))
    }

    /// Creates every marker this namespace needs, idempotently.
    pub fn create<E: Engine>(&self, engine: &mut E) -> CResult<()> {
        if self.segments.is_empty() {
            return Ok(());
        }
        engine.put(&self.marker_key(), Vec::new())?;
        for bucket in BUCKETS {
            engine.put(&self.bucket_marker_key(bucket), Vec::new())?;
        }
        Ok(())
    }

    /// Resolves the namespace, creating it (and every ancestor) if absent.
    pub fn open_or_create<E: Engine>(&self, engine: &mut E) -> CResult<()> {
        match self.open(engine)? {
            Some(()) => Ok(()),
            None => self.create(engine),
        }
    }

    /// Removes the namespace marker, its bucket markers, and every key
    /// underneath. Deleting a namespace that was never created is not an
    /// error.
    pub fn delete<E: Engine>(&self, engine: &mut E) -> CResult<()> {
        if self.segments.is_empty() {
            // Deleting the root means clearing every bucket but keeping the
            // (marker-less) root itself addressable.
            let keys: Vec<Vec<u8>> =
                engine.scan_prefix(ROOT).map(|r| r.map(|(k, _)| k)).collect::<CResult<_>>()?;
            for key in keys {
                engine.delete(&key)?;
            }
            return Ok(());
        }
        let prefix = self.whole_prefix();
        let keys: Vec<Vec<u8>> =
            engine.scan_prefix(&prefix).map(|r| r.map(|(k, _)| k)).collect::<CResult<_>>()?;
        for key in keys {
            engine.delete(&key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryEngine;

    #[test]
    fn open_reports_absent_namespace() {
        let mut engine = MemoryEngine::new();
        let ns = Namespace::new("a.b");
        assert_eq!(ns.open(&mut engine).unwrap(), None);
    }

    #[test]
    fn create_then_open_succeeds() {
        let mut engine = MemoryEngine::new();
        let ns = Namespace::new("a.b");
        ns.create(&mut engine).unwrap();
        assert_eq!(ns.open(&mut engine).unwrap(), Some(()));
    }

    #[test]
    fn missing_child_bucket_is_integrity_error() {
        let mut engine = MemoryEngine::new();
        let ns = Namespace::new("a");
        engine.put(&ns.marker_key(), Vec::new()).unwrap();
        // Don't create the child bucket markers.
        let err = ns.open(&mut engine).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn delete_removes_everything_under_the_namespace() {
        let mut engine = MemoryEngine::new();
        let ns = Namespace::new("a.b");
        ns.create(&mut engine).unwrap();
        engine.put(&ns.record_key("doc-1"), vec![1]).unwrap();
        engine.put(&ns.content_key("doc-1"), vec![2]).unwrap();

        ns.delete(&mut engine).unwrap();
        assert_eq!(ns.open(&mut engine).unwrap(), None);
        assert_eq!(engine.get(&ns.record_key("doc-1")).unwrap(), None);
    }

    #[test]
    fn deleting_an_absent_namespace_is_not_an_error() {
        let mut engine = MemoryEngine::new();
        let ns = Namespace::new("nope");
        ns.delete(&mut engine).unwrap();
    }

    #[test]
    fn child_namespace_concatenates_with_dot() {
        let ns = Namespace::new("a").child("b");
        assert_eq!(ns.path(), "a.b");
    }
}
