//! Strategy selection: given an optimized [`Filter`], picks one of four
//! execution strategies and extracts the conditions left to re-check
//! in-memory against each candidate record.
//!
//! Grounded on the same cost-estimation idea the teacher's `mvcc` scan
//! planning does informally (prefer a point lookup to a full scan whenever
//! a narrower key range is known) but made explicit here since there are
//! several candidate indexes to choose between, not just one.

pub(crate) mod strategies;

use crate::filter::{Condition, Filter, IdSet, NameSet};

pub use strategies::{delete_where, fetch};

/// The iteration source chosen for a query, carrying whatever set drives
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// The filter is infeasible; no record can match.
    Noop,
    /// No condition is more selective than a full scan.
    ScanRecords,
    UseIdFirst(IdSet),
    UseUniqueKeyFirst(NameSet),
    UseKeysFirst(NameSet),
}

/// A chosen strategy plus the conditions it doesn't already account for,
/// which must still be checked against each candidate record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub strategy: Strategy,
    pub residual: Filter,
}

fn condition_size(condition: &Condition) -> usize {
    match condition {
        Condition::IsOneOf(ids) => ids.len(),
        Condition::HasUniqueKeyIn(names) => names.len(),
        Condition::HasKeys(names) => names.len(),
    }
}

/// Chooses a strategy for an already-[`optimize`](crate::filter::optimize)d
/// filter.
///
/// Selectivity is approximated by the cardinality of each condition's set;
/// a full scan is the baseline and any present condition beats it, since a
/// scan's cost is unbounded by comparison. Among several conditions, the
/// smallest set wins; ties favor the first condition in canonical order
/// (`IsOneOf > HasUniqueKeyIn > HasKeys`), since only a strictly smaller
/// set displaces the current choice.
pub fn plan(filter: Filter) -> Plan {
    match filter {
        Filter::All => Plan { strategy: Strategy::ScanRecords, residual: Filter::All },
        Filter::Conditions(conds) if conds.is_empty() => {
            Plan { strategy: Strategy::Noop, residual: Filter::none() }
        }
        Filter::Conditions(mut conds) => {
            let mut best_idx = 0;
            let mut best_size = condition_size(&conds[0]);
            for (i, c) in conds.iter().enumerate().skip(1) {
                let size = condition_size(c);
                if size < best_size {
                    best_size = size;
                    best_idx = i;
                }
            }
            let chosen = conds.remove(best_idx);
            let residual = if conds.is_empty() { Filter::All } else { Filter::Conditions(conds) };
            let strategy = match chosen {
                Condition::IsOneOf(ids) => Strategy::UseIdFirst(ids),
                Condition::HasUniqueKeyIn(names) => Strategy::UseUniqueKeyFirst(names),
                Condition::HasKeys(names) => Strategy::UseKeysFirst(names),
            };
            Plan { strategy, residual }
        }
    }
}
