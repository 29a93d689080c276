//! The public entry point: `Db<E>` opens a store over an [`Engine`] and
//! exposes both one-shot convenience methods and scoped `read`/`write`
//! transactions.
//!
//! Grounded on the teacher's `MVCC<E> { engine: Arc<Mutex<E>> }` wrapper:
//! a `Db` is cheap to clone and safe to share across threads, with the
//! underlying engine serialized behind a single mutex (the single-writer
//! discipline the spec requires).

use crate::cancel::Cancel;
use crate::document::Document;
use crate::engine::disk::LogEngine;
use crate::engine::memory::MemoryEngine;
use crate::engine::Engine;
use crate::error::CResult;
use crate::filter::{has_id, Condition};
use crate::namespace::Namespace;
use crate::tx::{ReadTx, WriteTx};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// An opened document store, scoped to one namespace. Cloning shares the
/// same underlying engine; a namespace derived via [`Db::namespace`] is a
/// distinct handle over the same engine, so closing it has no effect on
/// its parent.
pub struct Db<E: Engine> {
    engine: Arc<Mutex<E>>,
    ns: Namespace,
}

impl<E: Engine> Clone for Db<E> {
    fn clone(&self) -> Self {
        Db { engine: Arc::clone(&self.engine), ns: self.ns.clone() }
    }
}

impl<E: Engine> Db<E> {
    /// Wraps an already-constructed engine, rooted at the top-level
    /// namespace.
    pub fn new(engine: E) -> CResult<Self> {
        let mut engine = engine;
        Namespace::root().open_or_create(&mut engine)?;
        Ok(Db { engine: Arc::new(Mutex::new(engine)), ns: Namespace::root() })
    }

    /// Runs `f` against a read-only transaction.
    pub fn read<R>(&self, f: impl FnOnce(&mut ReadTx<'_, E>) -> CResult<R>) -> CResult<R> {
        self.read_with_cancel(Cancel::new(), f)
    }

    pub fn read_with_cancel<R>(
        &self,
        cancel: Cancel,
        f: impl FnOnce(&mut ReadTx<'_, E>) -> CResult<R>,
    ) -> CResult<R> {
        let mut guard = self.engine.lock();
        let mut tx = ReadTx { engine: &mut *guard, ns: self.ns.clone(), cancel };
        f(&mut tx)
    }

    /// Runs `f` against a write transaction, committing on `Ok` and
    /// discarding buffered writes on `Err`.
    pub fn write<R>(&self, f: impl FnOnce(&mut WriteTx<'_, E>) -> CResult<R>) -> CResult<R> {
        self.write_with_cancel(Cancel::new(), f)
    }

    pub fn write_with_cancel<R>(
        &self,
        cancel: Cancel,
        f: impl FnOnce(&mut WriteTx<'_, E>) -> CResult<R>,
    ) -> CResult<R> {
        let mut guard = self.engine.lock();
        let mut tx = WriteTx::new(&mut *guard, self.ns.clone(), cancel);
        let result = f(&mut tx)?;
        tx.commit()?;
        Ok(result)
    }

    pub fn load(&self, id: &str) -> CResult<Option<Document>> {
        self.read(|tx| tx.load(id))
    }

    pub fn load_many(&self, ids: &[String]) -> CResult<Vec<Document>> {
        self.read(|tx| tx.load_many(ids))
    }

    pub fn load_by_unique_key(&self, key: &str) -> CResult<Option<Document>> {
        self.read(|tx| tx.load_by_unique_key(key))
    }

    pub fn load_where(&self, conditions: Vec<Condition>) -> CResult<Option<Document>> {
        self.read(|tx| tx.load_where(conditions))
    }

    pub fn load_many_where(&self, conditions: Vec<Condition>) -> CResult<Vec<Document>> {
        self.read(|tx| tx.load_many_where(conditions))
    }

    pub fn fetch_all(&self, cb: impl FnMut(Document) -> CResult<bool>) -> CResult<()> {
        self.read(|tx| tx.fetch(Vec::new(), cb))
    }

    pub fn fetch_where(
        &self,
        conditions: Vec<Condition>,
        cb: impl FnMut(Document) -> CResult<bool>,
    ) -> CResult<()> {
        self.read(|tx| tx.fetch(conditions, cb))
    }

    /// Saves `doc`, optimistically, returning the document with its
    /// updated revision and timestamps.
    pub fn save(&self, mut doc: Document) -> CResult<Document> {
        self.write(|tx| tx.save(&mut doc))?;
        Ok(doc)
    }

    pub fn force_save(&self, mut doc: Document) -> CResult<Document> {
        self.write(|tx| tx.force_save(&mut doc))?;
        Ok(doc)
    }

    pub fn delete(&self, doc: &Document) -> CResult<()> {
        self.write(|tx| tx.delete(doc))
    }

    pub fn force_delete(&self, doc: &Document) -> CResult<()> {
        self.write(|tx| tx.force_delete(doc))
    }

    pub fn delete_by_id(&self, id: &str) -> CResult<()> {
        self.write(|tx| tx.delete_where(vec![has_id(id)], None::<fn(&str) -> CResult<()>>))
            .map(|_| ())
    }

    pub fn delete_where(&self, conditions: Vec<Condition>) -> CResult<usize> {
        self.write(|tx| tx.delete_where(conditions, None::<fn(&str) -> CResult<()>>))
    }

    /// Derives a handle onto a child namespace, creating it if absent. The
    /// derived handle shares this one's underlying engine.
    pub fn namespace(&self, name: &str) -> CResult<Db<E>> {
        let ns = self.ns.child(name);
        {
            let mut guard = self.engine.lock();
            ns.open_or_create(&mut *guard)?;
        }
        Ok(Db { engine: Arc::clone(&self.engine), ns })
    }

    /// Removes this namespace wholesale.
    pub fn delete_namespace(&self) -> CResult<()> {
        self.write(|tx| tx.delete_namespace())
    }

    /// Flushes the underlying engine. The `Db` may continue to be used
    /// afterwards; this is a checkpoint, not a teardown.
    pub fn close(&self) -> CResult<()> {
        self.engine.lock().flush()
    }
}

impl Db<MemoryEngine> {
    /// Opens an ephemeral, in-memory store.
    pub fn open_in_memory() -> Self {
        Db::new(MemoryEngine::new()).expect("opening an in-memory store cannot fail")
    }
}

impl Db<LogEngine> {
    /// Opens (creating if absent) a persistent, on-disk store at `path`.
    pub fn open(path: impl AsRef<Path>) -> CResult<Self> {
        Db::new(LogEngine::open(path)?)
    }
}

/// Selects which [`Engine`] backs a [`Db`]. `Db<E>` is generic over its
/// engine, so there is no single concrete type a config can hand back;
/// [`DbConfig::open_with`] instead dispatches to whichever of two
/// continuations matches the selected backend.
#[derive(Debug, Clone, Default)]
pub enum DbConfig {
    /// An ephemeral, in-memory store. The default.
    #[default]
    Memory,
    /// A persistent, on-disk store rooted at the given path, created if
    /// absent.
    OnDisk(std::path::PathBuf),
}

impl DbConfig {
    /// Opens the store this config selects and runs the matching
    /// continuation against it.
    pub fn open_with<R>(
        &self,
        on_memory: impl FnOnce(Db<MemoryEngine>) -> CResult<R>,
        on_disk: impl FnOnce(Db<LogEngine>) -> CResult<R>,
    ) -> CResult<R> {
        match self {
            DbConfig::Memory => on_memory(Db::open_in_memory()),
            DbConfig::OnDisk(path) => on_disk(Db::open(path)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Payload;
    use crate::filter::has_unique_key;

    fn doc(id: &str) -> Document {
        Document::new(id, Payload::from_string(id))
    }

    #[test]
    fn save_then_load_round_trips() {
        let db = Db::open_in_memory();
        let saved = db.save(doc("a")).unwrap();
        assert_eq!(saved.revision, 1);
        let loaded = db.load("a").unwrap().unwrap();
        assert_eq!(loaded.content.as_str(), Some("a"));
    }

    #[test]
    fn save_increments_revision_and_preserves_created_at() {
        let db = Db::open_in_memory();
        let mut saved = db.save(doc("a")).unwrap();
        let created_at = saved.created_at;
        saved.content = Payload::from_string("updated");
        let saved = db.save(saved).unwrap();
        assert_eq!(saved.revision, 2);
        assert_eq!(saved.created_at, created_at);
    }

    #[test]
    fn stale_revision_on_save_is_an_optimistic_lock() {
        let db = Db::open_in_memory();
        let saved = db.save(doc("a")).unwrap();
        let stale = doc("a"); // revision 0, but "a" already exists at revision 1
        let err = db.save(stale).unwrap_err();
        assert!(err.is_optimistic_lock());
        assert_eq!(saved.revision, 1);
    }

    #[test]
    fn duplicate_unique_key_is_rejected() {
        let db = Db::open_in_memory();
        db.save(doc("a").with_unique_key("slug")).unwrap();
        let err = db.save(doc("b").with_unique_key("slug")).unwrap_err();
        assert!(err.is_duplicate_key());
    }

    #[test]
    fn delete_frees_the_unique_key_for_reuse() {
        let db = Db::open_in_memory();
        let a = db.save(doc("a").with_unique_key("slug")).unwrap();
        db.delete(&a).unwrap();
        db.save(doc("b").with_unique_key("slug")).unwrap();
        assert!(db.load_by_unique_key("slug").unwrap().is_some());
    }

    #[test]
    fn delete_where_removes_matching_documents_and_reports_count() {
        let db = Db::open_in_memory();
        db.save(doc("a").with_shared_key("tag")).unwrap();
        db.save(doc("b").with_shared_key("tag")).unwrap();
        db.save(doc("c")).unwrap();
        let deleted = db.delete_where(vec![crate::filter::has_keys(["tag"])]).unwrap();
        assert_eq!(deleted, 2);
        assert!(db.load("a").unwrap().is_none());
        assert!(db.load("c").unwrap().is_some());
    }

    #[test]
    fn namespace_isolates_documents() {
        let db = Db::open_in_memory();
        let a = db.namespace("a").unwrap();
        let b = db.namespace("b").unwrap();
        a.save(doc("x")).unwrap();
        assert!(a.load("x").unwrap().is_some());
        assert!(b.load("x").unwrap().is_none());
    }

    #[test]
    fn write_transaction_rolls_back_on_error() {
        let db = Db::open_in_memory();
        let result: CResult<()> = db.write(|tx| {
            let mut d = doc("a");
            tx.save(&mut d)?;
            Err(crate::error::Error::codec("simulated failure"))
        });
        assert!(result.is_err());
        assert!(db.load("a").unwrap().is_none());
    }

    #[test]
    fn load_by_unique_key_finds_the_claiming_document() {
        let db = Db::open_in_memory();
        db.save(doc("a").with_unique_key("slug:a")).unwrap();
        let found = db.load_by_unique_key("slug:a").unwrap().unwrap();
        assert_eq!(found.id, "a");
        assert!(db.load_where(vec![has_unique_key("slug:missing")]).unwrap().is_none());
    }

    #[test]
    fn db_config_defaults_to_memory() {
        assert!(matches!(DbConfig::default(), DbConfig::Memory));
    }

    #[test]
    fn db_config_memory_opens_an_in_memory_store() {
        let found = DbConfig::Memory
            .open_with(|db| db.save(doc("a")).map(|_| true), |_| Ok(false))
            .unwrap();
        assert!(found);
    }

    #[test]
    fn db_config_on_disk_opens_and_persists_to_the_given_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.docustore");
        let config = DbConfig::OnDisk(path.clone());

        config.open_with(|_| panic!("expected on-disk backend"), |db| db.save(doc("a"))).unwrap();

        let reopened = DbConfig::OnDisk(path);
        let found = reopened
            .open_with(
                |_| panic!("expected on-disk backend"),
                |db| Ok(db.load("a").unwrap().is_some()),
            )
            .unwrap();
        assert!(found);
    }
}
