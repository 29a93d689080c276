//! Bodies of the four execution strategies: turning a [`super::Plan`] into
//! an ordered stream of candidate `(id, Record)` pairs, then `fetch`/
//! `delete_where` on top of that stream.

use super::{Plan, Strategy};
use crate::codec::{unmarshal_content, unmarshal_record};
use crate::document::{Document, KeyKind, Record};
use crate::engine::Engine;
use crate::error::{CResult, Error};
use crate::keycode;
use crate::keys;
use crate::namespace::Namespace;
use std::collections::BTreeSet;

fn decode_id(prefix: &[u8], key: &[u8]) -> CResult<String> {
    let suffix = key
        .strip_prefix(prefix)
        .ok_or_else(|| Error::integrity("scanned key fell outside its own bucket prefix"))?;
    String::from_utf8(keycode::decode_segment(suffix))
        .map_err(|e| Error::integrity(format!("document id is not valid UTF-8: {e}")))
}

/// Materializes the candidate `(id, record)` pairs a strategy selects,
/// before any residual condition is checked. Collected eagerly rather than
/// streamed, since `delete_where` mutates the engine mid-iteration and an
/// engine's scan iterator borrows it.
fn candidates<E: Engine>(
    engine: &mut E,
    ns: &Namespace,
    strategy: &Strategy,
) -> CResult<Vec<(String, Record)>> {
    match strategy {
        Strategy::Noop => Ok(Vec::new()),

        Strategy::ScanRecords => {
            let prefix = ns.records_prefix();
            let items: Vec<_> = engine.scan_prefix(&prefix).collect::<CResult<Vec<_>>>()?;
            items
                .into_iter()
                .map(|(key, value)| {
                    let id = decode_id(&prefix, &key)?;
                    let record = unmarshal_record(&value)?;
                    Ok((id, record))
                })
                .collect()
        }

        Strategy::UseIdFirst(ids) => {
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(blob) = engine.get(&ns.record_key(id))? {
                    out.push((id.clone(), unmarshal_record(&blob)?));
                }
            }
            Ok(out)
        }

        Strategy::UseUniqueKeyFirst(names) => {
            let mut out = Vec::with_capacity(names.len());
            for name in names {
                let Some(entry) = keys::load_entry(engine, ns, name)? else { continue };
                if entry.kind != KeyKind::Unique {
                    continue;
                }
                let Some(id) = entry.docs.iter().next() else { continue };
                if let Some(blob) = engine.get(&ns.record_key(id))? {
                    out.push((id.clone(), unmarshal_record(&blob)?));
                }
            }
            Ok(out)
        }

        Strategy::UseKeysFirst(names) => {
            let mut running: Option<BTreeSet<String>> = None;
            for name in names {
                let docs = keys::load_entry(engine, ns, name)?.map(|e| e.docs).unwrap_or_default();
                running = Some(match running {
                    None => docs,
                    Some(acc) => acc.intersection(&docs).cloned().collect(),
                });
                if running.as_ref().is_some_and(|r| r.is_empty()) {
                    break;
                }
            }
            let mut out = Vec::new();
            for id in running.unwrap_or_default() {
                if let Some(blob) = engine.get(&ns.record_key(&id))? {
                    out.push((id.clone(), unmarshal_record(&blob)?));
                }
            }
            Ok(out)
        }
    }
}

/// Runs `plan` against `ns`, invoking `cb` with each matching document in
/// strategy order. Iteration stops as soon as `cb` returns `Ok(false)` or
/// an error.
pub fn fetch<E: Engine>(
    engine: &mut E,
    ns: &Namespace,
    plan: &Plan,
    mut cb: impl FnMut(Document) -> CResult<bool>,
) -> CResult<()> {
    tracing::debug!(strategy = ?plan.strategy, namespace = %ns.path(), "selected fetch strategy");
    for (id, record) in candidates(engine, ns, &plan.strategy)? {
        if !plan.residual.matches(&id, &record) {
            continue;
        }
        let content_blob = engine
            .get(&ns.content_key(&id))?
            .ok_or_else(|| Error::integrity(format!("record {id:?} has no content")))?;
        let content = unmarshal_content(&content_blob)?;
        let keep_going = cb(Document::from_parts(id, record, content))?;
        if !keep_going {
            break;
        }
    }
    Ok(())
}

/// Deletes every document `plan` selects, removing its record, content, and
/// key-index contributions. Returns the number of documents deleted. If
/// `cb` is given, it is called with each deleted id; an error from it
/// aborts the remaining deletions.
pub fn delete_where<E: Engine>(
    engine: &mut E,
    ns: &Namespace,
    plan: &Plan,
    mut cb: Option<impl FnMut(&str) -> CResult<()>>,
) -> CResult<usize> {
    tracing::debug!(strategy = ?plan.strategy, namespace = %ns.path(), "selected delete strategy");
    let mut deleted = 0;
    for (id, record) in candidates(engine, ns, &plan.strategy)? {
        if !plan.residual.matches(&id, &record) {
            continue;
        }
        engine.delete(&ns.record_key(&id))?;
        engine.delete(&ns.content_key(&id))?;
        keys::update_keys(engine, ns, &id, Some(&record.keys), None)?;
        if let Some(cb) = cb.as_mut() {
            cb(&id)?;
        }
        deleted += 1;
    }
    Ok(deleted)
}
