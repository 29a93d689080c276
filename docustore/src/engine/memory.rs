//! An in-memory ordered engine, backed by a `BTreeMap`.
//!
//! Grounded on the teacher's `kv::storage::memory::Memory`: no
//! persistence, no locking, used for the default `Db::open_in_memory` and
//! by every unit test in this crate.

use crate::engine::{Engine, ScanItem};
use crate::error::CResult;
use std::collections::BTreeMap;
use std::ops::RangeBounds;

#[derive(Default)]
pub struct MemoryEngine {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self { data: BTreeMap::new() }
    }
}

impl Engine for MemoryEngine {
    type ScanIterator<'a> = MemoryScanIterator<'a>;

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> CResult<()> {
        self.data.insert(key.to_vec(), value);
        Ok(())
    }

    fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn delete(&mut self, key: &[u8]) -> CResult<()> {
        self.data.remove(key);
        Ok(())
    }

    fn scan(&mut self, range: impl RangeBounds<Vec<u8>>) -> Self::ScanIterator<'_> {
        MemoryScanIterator { inner: self.data.range(range) }
    }

    fn flush(&mut self) -> CResult<()> {
        Ok(())
    }
}

pub struct MemoryScanIterator<'a> {
    inner: std::collections::btree_map::Range<'a, Vec<u8>, Vec<u8>>,
}

impl<'a> MemoryScanIterator<'a> {
    fn map(item: (&Vec<u8>, &Vec<u8>)) -> <Self as Iterator>::Item {
        let (key, value) = item;
        Ok((key.clone(), value.clone()))
    }
}

impl<'a> Iterator for MemoryScanIterator<'a> {
    type Item = ScanItem;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(Self::map)
    }
}

impl<'a> DoubleEndedIterator for MemoryScanIterator<'a> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(Self::map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::conformance::document_store_conformance;

    document_store_conformance!(MemoryEngine::new());
}
