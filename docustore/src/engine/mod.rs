//! The flat, ordered key/value engine the whole document store is built on.
//!
//! Everything above this module (namespaces, records, the key index, the
//! filter planner) is written against the [`Engine`] trait only; it never
//! assumes a particular backing implementation. Two implementations ship
//! with this crate: [`memory::MemoryEngine`] for tests and ephemeral
//! stores, and [`disk::LogEngine`] for persistence.

pub mod disk;
pub mod memory;

use crate::error::CResult;
use std::ops::{Bound, RangeBounds};

pub type ScanItem = CResult<(Vec<u8>, Vec<u8>)>;

/// An ordered key/value engine: keys and values are arbitrary byte strings,
/// stored and scanned in lexicographical key order.
///
/// Only single-threaded use is assumed; callers (the transaction layer)
/// serialize access with a mutex. This mirrors the single-writer discipline
/// the document store's transaction layer already enforces.
pub trait Engine: Send {
    type ScanIterator<'a>: DoubleEndedIterator<Item = ScanItem> + 'a
    where
        Self: Sized + 'a;

    /// Sets a value for a key, replacing any existing value.
    fn put(&mut self, key: &[u8], value: Vec<u8>) -> CResult<()>;

    /// Gets a value for a key, if it exists.
    fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>>;

    /// Deletes a key, or does nothing if it does not exist.
    fn delete(&mut self, key: &[u8]) -> CResult<()>;

    /// Iterates over an ordered range of key/value pairs.
    fn scan(&mut self, range: impl RangeBounds<Vec<u8>>) -> Self::ScanIterator<'_>
    where
        Self: Sized;

    /// Flushes buffered writes to the underlying storage medium.
    fn flush(&mut self) -> CResult<()>;

    /// Iterates over all key/value pairs whose key starts with `prefix`.
    fn scan_prefix(&mut self, prefix: &[u8]) -> Self::ScanIterator<'_>
    where
        Self: Sized,
    {
        let start = Bound::Included(prefix.to_vec());
        let end = match prefix.iter().rposition(|b| *b != 0xff) {
            Some(i) => Bound::Excluded(
                prefix.iter().take(i).copied().chain(std::iter::once(prefix[i] + 1)).collect(),
            ),
            None => Bound::Unbounded,
        };
        self.scan((start, end))
    }
}

#[cfg(test)]
pub(crate) mod conformance {
    //! Shared conformance suite run against every `Engine` implementation,
    //! generalizing the teacher's per-engine `test_engine!` macro into one
    //! macro usable from both `memory` and `disk`.
    macro_rules! document_store_conformance {
        ($setup:expr) => {
            use crate::engine::Engine;

            #[test]
            fn point_ops() -> crate::error::CResult<()> {
                let mut e = $setup;
                assert_eq!(e.get(b"a")?, None);
                e.put(b"a", vec![1])?;
                assert_eq!(e.get(b"a")?, Some(vec![1]));
                e.put(b"a", vec![2])?;
                assert_eq!(e.get(b"a")?, Some(vec![2]));
                e.delete(b"a")?;
                assert_eq!(e.get(b"a")?, None);
                e.delete(b"a")?;
                assert_eq!(e.get(b"a")?, None);
                Ok(())
            }

            #[test]
            fn point_ops_empty_value() -> crate::error::CResult<()> {
                let mut e = $setup;
                e.put(b"a", vec![])?;
                assert_eq!(e.get(b"a")?, Some(vec![]));
                Ok(())
            }

            #[test]
            fn scan_is_ordered() -> crate::error::CResult<()> {
                let mut e = $setup;
                e.put(b"b", vec![2])?;
                e.put(b"a", vec![1])?;
                e.put(b"c", vec![3])?;
                let got: Vec<_> = e.scan(..).collect::<crate::error::CResult<Vec<_>>>()?;
                assert_eq!(
                    got,
                    vec![
                        (b"a".to_vec(), vec![1]),
                        (b"b".to_vec(), vec![2]),
                        (b"c".to_vec(), vec![3]),
                    ]
                );
                Ok(())
            }

            #[test]
            fn scan_prefix() -> crate::error::CResult<()> {
                let mut e = $setup;
                e.put(b"ns.a", vec![1])?;
                e.put(b"ns.b", vec![2])?;
                e.put(b"other.a", vec![3])?;
                let got: Vec<_> =
                    e.scan_prefix(b"ns.").collect::<crate::error::CResult<Vec<_>>>()?;
                assert_eq!(
                    got,
                    vec![(b"ns.a".to_vec(), vec![1]), (b"ns.b".to_vec(), vec![2]),]
                );
                Ok(())
            }

            #[test]
            fn delete_is_idempotent() -> crate::error::CResult<()> {
                let mut e = $setup;
                e.put(b"k", vec![9])?;
                e.delete(b"k")?;
                e.delete(b"k")?;
                assert_eq!(e.get(b"k")?, None);
                Ok(())
            }

            /// Runs random puts/deletes/scans against the engine and a
            /// `BTreeMap` reference model, checking both agree throughout.
            #[test]
            fn random_ops_match_a_btreemap_model() -> crate::error::CResult<()> {
                use rand::Rng;

                let mut e = $setup;
                let mut model: std::collections::BTreeMap<Vec<u8>, Vec<u8>> =
                    std::collections::BTreeMap::new();

                let seed: u64 = rand::thread_rng().gen();
                let mut rng: rand::rngs::StdRng = rand::SeedableRng::seed_from_u64(seed);

                let random_key = |rng: &mut rand::rngs::StdRng| -> Vec<u8> {
                    vec![rng.gen_range(0..8)]
                };
                let random_value = |rng: &mut rand::rngs::StdRng| -> Vec<u8> {
                    (0..rng.gen_range(0..4)).map(|_| rng.gen()).collect()
                };

                for _ in 0..500 {
                    match rng.gen_range(0..3) {
                        0 => {
                            let key = random_key(&mut rng);
                            let value = random_value(&mut rng);
                            e.put(&key, value.clone())?;
                            model.insert(key, value);
                        }
                        1 => {
                            let key = random_key(&mut rng);
                            e.delete(&key)?;
                            model.remove(&key);
                        }
                        _ => {
                            let key = random_key(&mut rng);
                            assert_eq!(e.get(&key)?, model.get(&key).cloned(), "seed {seed}");
                        }
                    }
                }

                let got: Vec<_> = e.scan(..).collect::<crate::error::CResult<Vec<_>>>()?;
                let want: Vec<_> = model.into_iter().collect();
                assert_eq!(got, want, "seed {seed}");
                Ok(())
            }
        };
    }

    pub(crate) use document_store_conformance;
}
