//! Key-index maintenance: keeps the inverted `keys` bucket consistent with
//! each document's key map as it changes.

use crate::codec::{marshal_key_entry, unmarshal_key_entry};
use crate::document::{KeyEntry, KeyKind, KeyMap};
use crate::engine::Engine;
use crate::error::{CResult, Error};
use crate::namespace::Namespace;

pub(crate) fn load_entry<E: Engine>(
    engine: &mut E,
    ns: &Namespace,
    name: &str,
) -> CResult<Option<KeyEntry>> {
    match engine.get(&ns.key_entry_key(name))? {
        Some(blob) => Ok(Some(unmarshal_key_entry(&blob)?)),
        None => Ok(None),
    }
}

fn store_entry<E: Engine>(
    engine: &mut E,
    ns: &Namespace,
    name: &str,
    entry: &KeyEntry,
) -> CResult<()> {
    if entry.docs.is_empty() {
        engine.delete(&ns.key_entry_key(name))
    } else {
        engine.put(&ns.key_entry_key(name), marshal_key_entry(entry)?)
    }
}

/// Rewrites the inverted key index to reflect `before -> after` for
/// `doc_id`. `before`/`after` are `None` when the document did not exist /
/// no longer exists, respectively.
///
/// Two passes over the symmetric difference, in the order the spec
/// mandates: every removal happens before any addition is considered, so a
/// key name being moved between two documents in the same save (freed by
/// one key's removal, claimed by another's addition) behaves as "removal
/// first" would imply, not as an unspecified interleaving.
pub fn update_keys<E: Engine>(
    engine: &mut E,
    ns: &Namespace,
    doc_id: &str,
    before: Option<&KeyMap>,
    after: Option<&KeyMap>,
) -> CResult<()> {
    let empty = KeyMap::new();
    let before = before.unwrap_or(&empty);
    let after = after.unwrap_or(&empty);

    // Removal pass: keys present before but absent after.
    for name in before.keys() {
        if after.contains_key(name) {
            continue;
        }
        if let Some(mut entry) = load_entry(engine, ns, name)? {
            entry.docs.remove(doc_id);
            store_entry(engine, ns, name, &entry)?;
        }
    }

    // Addition/upgrade pass: keys that are new, or whose kind changed.
    for (name, &kind) in after.iter() {
        if before.get(name) == Some(&kind) {
            continue;
        }
        let mut entry = load_entry(engine, ns, name)?
            .unwrap_or(KeyEntry { kind, docs: Default::default() });
        let mut other = entry.docs.clone();
        other.remove(doc_id);

        if other.is_empty() {
            entry.kind = kind;
            entry.docs = std::iter::once(doc_id.to_string()).collect();
        } else if entry.kind == KeyKind::Shared && kind == KeyKind::Shared {
            entry.docs.insert(doc_id.to_string());
        } else {
            let conflicting_doc_id = other.iter().next().cloned().unwrap();
            return Err(Error::DuplicateKey {
                doc_id: doc_id.to_string(),
                conflicting_doc_id,
                key_name: name.clone(),
            });
        }
        store_entry(engine, ns, name, &entry)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryEngine;

    fn setup() -> (MemoryEngine, Namespace) {
        let mut engine = MemoryEngine::new();
        let ns = Namespace::new("t");
        ns.create(&mut engine).unwrap();
        (engine, ns)
    }

    #[test]
    fn first_claim_of_a_unique_key_succeeds() {
        let (mut engine, ns) = setup();
        let after = KeyMap::from([("u".to_string(), KeyKind::Unique)]);
        update_keys(&mut engine, &ns, "doc-1", None, Some(&after)).unwrap();
        let entry = load_entry(&mut engine, &ns, "u").unwrap().unwrap();
        assert_eq!(entry.kind, KeyKind::Unique);
        assert_eq!(entry.docs, ["doc-1".to_string()].into());
    }

    #[test]
    fn second_claim_of_a_unique_key_conflicts() {
        let (mut engine, ns) = setup();
        let after = KeyMap::from([("u".to_string(), KeyKind::Unique)]);
        update_keys(&mut engine, &ns, "doc-1", None, Some(&after)).unwrap();
        let err = update_keys(&mut engine, &ns, "doc-2", None, Some(&after)).unwrap_err();
        match err {
            Error::DuplicateKey { doc_id, conflicting_doc_id, key_name } => {
                assert_eq!(doc_id, "doc-2");
                assert_eq!(conflicting_doc_id, "doc-1");
                assert_eq!(key_name, "u");
            }
            other => panic!("expected DuplicateKey, got {other:?}"),
        }
    }

    #[test]
    fn shared_keys_accumulate() {
        let (mut engine, ns) = setup();
        let after = KeyMap::from([("s".to_string(), KeyKind::Shared)]);
        update_keys(&mut engine, &ns, "doc-1", None, Some(&after)).unwrap();
        update_keys(&mut engine, &ns, "doc-2", None, Some(&after)).unwrap();
        let entry = load_entry(&mut engine, &ns, "s").unwrap().unwrap();
        assert_eq!(entry.docs.len(), 2);
    }

    #[test]
    fn claiming_shared_while_unique_is_held_conflicts() {
        let (mut engine, ns) = setup();
        let unique = KeyMap::from([("k".to_string(), KeyKind::Unique)]);
        update_keys(&mut engine, &ns, "doc-1", None, Some(&unique)).unwrap();
        let shared = KeyMap::from([("k".to_string(), KeyKind::Shared)]);
        let err = update_keys(&mut engine, &ns, "doc-2", None, Some(&shared)).unwrap_err();
        assert!(err.is_duplicate_key());
    }

    #[test]
    fn removing_the_only_holder_deletes_the_entry() {
        let (mut engine, ns) = setup();
        let before = KeyMap::from([("u".to_string(), KeyKind::Unique)]);
        update_keys(&mut engine, &ns, "doc-1", None, Some(&before)).unwrap();
        update_keys(&mut engine, &ns, "doc-1", Some(&before), None).unwrap();
        assert_eq!(load_entry(&mut engine, &ns, "u").unwrap(), None);
    }

    #[test]
    fn freed_unique_key_can_be_reclaimed() {
        let (mut engine, ns) = setup();
        let key = KeyMap::from([("u".to_string(), KeyKind::Unique)]);
        update_keys(&mut engine, &ns, "doc-1", None, Some(&key)).unwrap();
        update_keys(&mut engine, &ns, "doc-1", Some(&key), None).unwrap();
        update_keys(&mut engine, &ns, "doc-2", None, Some(&key)).unwrap();
        let entry = load_entry(&mut engine, &ns, "u").unwrap().unwrap();
        assert_eq!(entry.docs, ["doc-2".to_string()].into());
    }
}
