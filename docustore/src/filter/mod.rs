//! The filter algebra: three primitive [`Condition`]s, a [`Filter`]
//! conjunction over them, a [`Visitor`] protocol used for both record-level
//! matching and strategy selectivity measurement, and the [`optimize`]
//! pass that flattens a conjunction to canonical form.
//!
//! Conditions are a closed sum of three variants; per the design notes
//! this is modeled as a tagged enum with a small dispatch table rather
//! than trait-object inheritance.

pub mod optimize;

use crate::document::Record;
use std::collections::BTreeSet;

pub type IdSet = BTreeSet<String>;
pub type NameSet = BTreeSet<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Matches iff the document id is in the set.
    IsOneOf(IdSet),
    /// Matches iff some key in the document is `Unique` and its name is in
    /// the set.
    HasUniqueKeyIn(NameSet),
    /// Matches iff every name in the set appears as a key of the document,
    /// regardless of kind.
    HasKeys(NameSet),
}

/// Dispatch target for [`Condition::accept`]. Implemented once for
/// record-level matching ([`RecordMatcher`]) and once for strategy
/// selectivity measurement (`crate::planner::Selectivity`).
pub trait Visitor {
    fn is_one_of(&mut self, ids: &IdSet) -> bool;
    fn has_unique_key_in(&mut self, names: &NameSet) -> bool;
    fn has_keys(&mut self, names: &NameSet) -> bool;
}

impl Condition {
    pub fn accept(&self, visitor: &mut dyn Visitor) -> bool {
        match self {
            Condition::IsOneOf(ids) => visitor.is_one_of(ids),
            Condition::HasUniqueKeyIn(names) => visitor.has_unique_key_in(names),
            Condition::HasKeys(names) => visitor.has_keys(names),
        }
    }
}

/// A conjunction of conditions. `All` matches every document (the
/// distilled spec's "nil"/"none" filter); `Conditions(vec![])` — an empty,
/// *non*-`All` filter — matches no document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    Conditions(Vec<Condition>),
}

impl Filter {
    pub fn none() -> Self {
        Filter::Conditions(Vec::new())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Filter::Conditions(c) if c.is_empty())
    }

    pub fn matches(&self, id: &str, record: &Record) -> bool {
        match self {
            Filter::All => true,
            Filter::Conditions(conds) if conds.is_empty() => false,
            Filter::Conditions(conds) => {
                let mut matcher = RecordMatcher { id, record };
                conds.iter().all(|c| c.accept(&mut matcher))
            }
        }
    }
}

struct RecordMatcher<'a> {
    id: &'a str,
    record: &'a Record,
}

impl<'a> Visitor for RecordMatcher<'a> {
    fn is_one_of(&mut self, ids: &IdSet) -> bool {
        ids.contains(self.id)
    }

    fn has_unique_key_in(&mut self, names: &NameSet) -> bool {
        use crate::document::KeyKind;
        // Iterate whichever set is smaller.
        if names.len() <= self.record.keys.len() {
            names.iter().any(|name| self.record.keys.get(name) == Some(&KeyKind::Unique))
        } else {
            self.record
                .keys
                .iter()
                .any(|(name, kind)| *kind == KeyKind::Unique && names.contains(name))
        }
    }

    fn has_keys(&mut self, names: &NameSet) -> bool {
        names.iter().all(|name| self.record.keys.contains_key(name))
    }
}

pub use optimize::optimize;

/// Matches documents whose id is in `ids`.
pub fn is_one_of(ids: impl IntoIterator<Item = impl Into<String>>) -> Condition {
    Condition::IsOneOf(ids.into_iter().map(Into::into).collect())
}

/// Matches the single document with this id. A convenience over
/// [`is_one_of`] for the common single-id case.
pub fn has_id(id: impl Into<String>) -> Condition {
    Condition::IsOneOf(std::iter::once(id.into()).collect())
}

/// Matches documents holding `name` as a unique key.
pub fn has_unique_key(name: impl Into<String>) -> Condition {
    Condition::HasUniqueKeyIn(std::iter::once(name.into()).collect())
}

/// Matches documents holding any of `names` as a unique key.
pub fn has_unique_key_in(names: impl IntoIterator<Item = impl Into<String>>) -> Condition {
    Condition::HasUniqueKeyIn(names.into_iter().map(Into::into).collect())
}

/// Matches documents carrying every name in `names` as a key, regardless
/// of kind.
pub fn has_keys(names: impl IntoIterator<Item = impl Into<String>>) -> Condition {
    Condition::HasKeys(names.into_iter().map(Into::into).collect())
}
