//! Read and write transactions over a namespace.
//!
//! A [`ReadTx`] only fetches. A [`WriteTx`] buffers its writes in a
//! [`StagingEngine`] overlay and only applies them to the underlying
//! engine on an explicit [`WriteTx::commit`]; dropping it without
//! committing discards the overlay, which is the whole of "rollback" here
//! since nothing was ever written through to the real engine.

use crate::cancel::Cancel;
use crate::codec::{marshal_content, marshal_record, unmarshal_record};
use crate::document::{Content, Document, Record};
use crate::engine::{Engine, ScanItem};
use crate::error::{CResult, Error, Operation};
use crate::filter::{optimize, Condition};
use crate::namespace::Namespace;
use crate::planner::{self, strategies};
use std::collections::BTreeMap;
use std::ops::{Bound, RangeBounds};

fn cloned_bound(bound: Bound<&Vec<u8>>) -> Bound<Vec<u8>> {
    match bound {
        Bound::Included(v) => Bound::Included(v.clone()),
        Bound::Excluded(v) => Bound::Excluded(v.clone()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// An overlay over `&mut E` that buffers writes in memory until
/// [`commit`](Self::commit) applies them. Reads see the overlay first, so a
/// transaction observes its own uncommitted writes.
pub(crate) struct StagingEngine<'e, E: Engine> {
    inner: &'e mut E,
    overlay: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'e, E: Engine> StagingEngine<'e, E> {
    fn new(inner: &'e mut E) -> Self {
        Self { inner, overlay: BTreeMap::new() }
    }

    fn writes_pending(&self) -> usize {
        self.overlay.len()
    }

    /// Applies every buffered write to the underlying engine, in key order,
    /// then flushes it.
    fn commit(self) -> CResult<()> {
        for (key, value) in self.overlay {
            match value {
                Some(v) => self.inner.put(&key, v)?,
                None => self.inner.delete(&key)?,
            }
        }
        self.inner.flush()
    }
}

pub(crate) struct StagingScanIterator {
    items: std::vec::IntoIter<ScanItem>,
}

impl Iterator for StagingScanIterator {
    type Item = ScanItem;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next()
    }
}

impl DoubleEndedIterator for StagingScanIterator {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.items.next_back()
    }
}

impl<'e, E: Engine> Engine for StagingEngine<'e, E> {
    type ScanIterator<'a> = StagingScanIterator where Self: Sized + 'a;

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> CResult<()> {
        self.overlay.insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        match self.overlay.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.inner.get(key),
        }
    }

    fn delete(&mut self, key: &[u8]) -> CResult<()> {
        self.overlay.insert(key.to_vec(), None);
        Ok(())
    }

    fn scan(&mut self, range: impl RangeBounds<Vec<u8>>) -> Self::ScanIterator<'_> {
        let start = cloned_bound(range.start_bound());
        let end = cloned_bound(range.end_bound());

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        let items: Vec<ScanItem> = self.inner.scan((start.clone(), end.clone())).collect();
        for item in items {
            match item {
                Ok((k, v)) => {
                    merged.insert(k, v);
                }
                Err(e) => return StagingScanIterator { items: vec![Err(e)].into_iter() },
            }
        }
        for (k, v) in self.overlay.range((start, end)) {
            match v {
                Some(value) => {
                    merged.insert(k.clone(), value.clone());
                }
                None => {
                    merged.remove(k);
                }
            }
        }
        StagingScanIterator { items: merged.into_iter().map(Ok).collect::<Vec<_>>().into_iter() }
    }

    fn flush(&mut self) -> CResult<()> {
        // Only `commit` persists anything; an uncommitted transaction has
        // nothing to flush through to the underlying engine yet.
        Ok(())
    }
}

fn load_existing<E: Engine>(engine: &mut E, ns: &Namespace, id: &str) -> CResult<Option<Record>> {
    match engine.get(&ns.record_key(id))? {
        Some(blob) => Ok(Some(unmarshal_record(&blob)?)),
        None => Ok(None),
    }
}

/// Logs the first error that aborts a transaction: `warn!` for the
/// expected, caller-retryable outcomes (optimistic lock, duplicate key),
/// `error!` for everything else (integrity, engine, codec, cancellation).
/// Passes `result` through unchanged either way.
fn trace_abort<R>(ns: &Namespace, operation: &str, result: CResult<R>) -> CResult<R> {
    if let Err(err) = &result {
        if err.is_expected() {
            tracing::warn!(namespace = %ns.path(), operation, error = %err, "transaction aborted");
        } else {
            tracing::error!(namespace = %ns.path(), operation, error = %err, "transaction aborted");
        }
    }
    result
}

/// A read-only transaction: only [`fetch`](Self::fetch) and its
/// conveniences are available.
pub struct ReadTx<'e, E: Engine> {
    pub(crate) engine: &'e mut E,
    pub(crate) ns: Namespace,
    pub(crate) cancel: Cancel,
}

impl<'e, E: Engine> ReadTx<'e, E> {
    pub fn cancel_handle(&self) -> Cancel {
        self.cancel.clone()
    }

    /// Derives a handle onto a child namespace, sharing this transaction's
    /// engine borrow.
    pub fn namespace(&mut self, name: &str) -> ReadTx<'_, E> {
        ReadTx { engine: self.engine, ns: self.ns.child(name), cancel: self.cancel.clone() }
    }

    pub fn fetch(
        &mut self,
        conditions: Vec<Condition>,
        cb: impl FnMut(Document) -> CResult<bool>,
    ) -> CResult<()> {
        self.cancel.check()?;
        let plan = planner::plan(optimize(conditions));
        trace_abort(&self.ns, "fetch", strategies::fetch(self.engine, &self.ns, &plan, cb))
    }

    pub fn load(&mut self, id: &str) -> CResult<Option<Document>> {
        let mut found = None;
        self.fetch(vec![crate::filter::has_id(id)], |doc| {
            found = Some(doc);
            Ok(false)
        })?;
        Ok(found)
    }

    pub fn load_many(&mut self, ids: &[String]) -> CResult<Vec<Document>> {
        let mut found = Vec::new();
        self.fetch(vec![crate::filter::is_one_of(ids.iter().cloned())], |doc| {
            found.push(doc);
            Ok(true)
        })?;
        Ok(found)
    }

    pub fn load_by_unique_key(&mut self, key: &str) -> CResult<Option<Document>> {
        self.load_where(vec![crate::filter::has_unique_key(key)])
    }

    pub fn load_where(&mut self, conditions: Vec<Condition>) -> CResult<Option<Document>> {
        let mut found = None;
        self.fetch(conditions, |doc| {
            found = Some(doc);
            Ok(false)
        })?;
        Ok(found)
    }

    pub fn load_many_where(&mut self, conditions: Vec<Condition>) -> CResult<Vec<Document>> {
        let mut found = Vec::new();
        self.fetch(conditions, |doc| {
            found.push(doc);
            Ok(true)
        })?;
        Ok(found)
    }
}

/// A read/write transaction: fetches plus `save`, `delete`, `delete_where`,
/// and `delete_namespace`. Writes are buffered and only reach the
/// underlying engine on [`commit`](Self::commit).
pub struct WriteTx<'e, E: Engine> {
    // `None` only after `commit` has consumed it; every other method can
    // rely on it being present since they all take `self` by reference.
    engine: Option<StagingEngine<'e, E>>,
    pub(crate) ns: Namespace,
    pub(crate) cancel: Cancel,
}

impl<'e, E: Engine> WriteTx<'e, E> {
    pub(crate) fn new(engine: &'e mut E, ns: Namespace, cancel: Cancel) -> Self {
        WriteTx { engine: Some(StagingEngine::new(engine)), ns, cancel }
    }

    fn engine_mut(&mut self) -> &mut StagingEngine<'e, E> {
        self.engine.as_mut().expect("write transaction used after commit")
    }

    pub fn cancel_handle(&self) -> Cancel {
        self.cancel.clone()
    }

    pub fn fetch(
        &mut self,
        conditions: Vec<Condition>,
        cb: impl FnMut(Document) -> CResult<bool>,
    ) -> CResult<()> {
        self.cancel.check()?;
        let ns = self.ns.clone();
        let plan = planner::plan(optimize(conditions));
        trace_abort(&ns, "fetch", strategies::fetch(self.engine_mut(), &ns, &plan, cb))
    }

    pub fn load(&mut self, id: &str) -> CResult<Option<Document>> {
        let mut found = None;
        self.fetch(vec![crate::filter::has_id(id)], |doc| {
            found = Some(doc);
            Ok(false)
        })?;
        Ok(found)
    }

    /// Saves `doc`, optimistically: `doc.revision` must equal the currently
    /// persisted revision (0 if absent). On success `doc` is updated in
    /// place with its new revision and timestamps.
    pub fn save(&mut self, doc: &mut Document) -> CResult<()> {
        self.cancel.check()?;
        let ns = self.ns.clone();
        trace_abort(&ns, "save", self.write_doc(doc, false))
    }

    /// Identical to [`save`](Self::save) but skips the revision check.
    pub fn force_save(&mut self, doc: &mut Document) -> CResult<()> {
        self.cancel.check()?;
        let ns = self.ns.clone();
        trace_abort(&ns, "force_save", self.write_doc(doc, true))
    }

    fn write_doc(&mut self, doc: &mut Document, force: bool) -> CResult<()> {
        let ns = self.ns.clone();
        let existing = load_existing(self.engine_mut(), &ns, &doc.id)?;

        if !force {
            let actual_rev = existing.as_ref().map_or(0, |r| r.revision);
            if doc.revision != actual_rev {
                return Err(Error::OptimisticLock {
                    doc_id: doc.id.clone(),
                    given_rev: doc.revision,
                    actual_rev,
                    operation: Operation::Save,
                });
            }
        }

        let now = chrono::Utc::now();
        let (revision, created_at) = match &existing {
            Some(record) => (record.revision + 1, record.created_at),
            None => (1, now),
        };

        crate::keys::update_keys(
            self.engine_mut(),
            &ns,
            &doc.id,
            existing.as_ref().map(|r| &r.keys),
            Some(&doc.keys),
        )?;

        let record = Record { revision, created_at, updated_at: now, keys: doc.keys.clone() };
        let content = Content { headers: doc.headers.clone(), payload: doc.content.clone() };
        self.engine_mut().put(&ns.record_key(&doc.id), marshal_record(&record)?)?;
        self.engine_mut().put(&ns.content_key(&doc.id), marshal_content(&content)?)?;

        doc.revision = revision;
        doc.created_at = created_at;
        doc.updated_at = now;
        Ok(())
    }

    /// Deletes `doc`, optimistically. A revision of 0 against an
    /// already-absent document succeeds silently.
    pub fn delete(&mut self, doc: &Document) -> CResult<()> {
        self.cancel.check()?;
        let ns = self.ns.clone();
        trace_abort(&ns, "delete", self.delete_checked(&doc.id, Some(doc.revision)))
    }

    /// Identical to [`delete`](Self::delete) but skips the revision check.
    pub fn force_delete(&mut self, doc: &Document) -> CResult<()> {
        self.cancel.check()?;
        let ns = self.ns.clone();
        trace_abort(&ns, "force_delete", self.delete_checked(&doc.id, None))
    }

    fn delete_checked(&mut self, id: &str, given_rev: Option<u64>) -> CResult<()> {
        let ns = self.ns.clone();
        let existing = load_existing(self.engine_mut(), &ns, id)?;

        if let Some(given_rev) = given_rev {
            let actual_rev = existing.as_ref().map_or(0, |r| r.revision);
            if given_rev != actual_rev {
                return Err(Error::OptimisticLock {
                    doc_id: id.to_string(),
                    given_rev,
                    actual_rev,
                    operation: Operation::Delete,
                });
            }
        }

        let Some(record) = existing else { return Ok(()) };
        self.engine_mut().delete(&ns.record_key(id))?;
        self.engine_mut().delete(&ns.content_key(id))?;
        crate::keys::update_keys(self.engine_mut(), &ns, id, Some(&record.keys), None)?;
        Ok(())
    }

    /// Deletes every document matching `conditions` (an empty list matches
    /// everything). If `cb` is given, it's invoked with each deleted id; an
    /// error from it aborts the remaining deletions.
    pub fn delete_where(
        &mut self,
        conditions: Vec<Condition>,
        cb: Option<impl FnMut(&str) -> CResult<()>>,
    ) -> CResult<usize> {
        self.cancel.check()?;
        let ns = self.ns.clone();
        let plan = planner::plan(optimize(conditions));
        trace_abort(&ns, "delete_where", strategies::delete_where(self.engine_mut(), &ns, &plan, cb))
    }

    /// Removes this namespace wholesale: its leaf bucket and everything
    /// beneath it, with no per-document key or content traversal.
    pub fn delete_namespace(&mut self) -> CResult<()> {
        self.cancel.check()?;
        let ns = self.ns.clone();
        let result = ns.delete(self.engine_mut());
        trace_abort(&ns, "delete_namespace", result)
    }

    /// Applies every buffered write to the underlying engine. Consumes the
    /// transaction: there is nothing left to do with it afterwards.
    pub fn commit(mut self) -> CResult<()> {
        let ns = self.ns.clone();
        let result = self.engine.take().expect("write transaction used after commit").commit();
        trace_abort(&ns, "commit", result)
    }
}

impl<'e, E: Engine> Drop for WriteTx<'e, E> {
    fn drop(&mut self) {
        if let Some(engine) = &self.engine {
            if engine.writes_pending() > 0 {
                tracing::debug!(
                    namespace = %self.ns.path(),
                    writes = engine.writes_pending(),
                    "write transaction dropped without commit; changes discarded"
                );
            }
        }
    }
}
