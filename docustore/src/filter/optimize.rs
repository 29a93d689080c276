//! Flattens a conjunction of [`Condition`]s to canonical form: at most one
//! `IsOneOf`, one `HasUniqueKeyIn`, one `HasKeys`.

use super::{Condition, Filter, IdSet, NameSet};

/// Optimizes a list of conditions into canonical form.
///
/// - Multiple `IsOneOf` intersect; an empty result is infeasible and short
///   circuits to the "matches nothing" filter.
/// - Multiple `HasUniqueKeyIn` likewise intersect and short-circuit on
///   empty.
/// - Multiple `HasKeys` union (a document must satisfy every one, so it
///   must carry the union of required names). An empty `HasKeys` set is
///   vacuously true rather than infeasible, unlike the other two: it
///   simply contributes no required names.
/// - Each caller-supplied set is consumed by value, so the first
///   occurrence of a condition kind reuses it directly and only the
///   second (and later) occurrence's intersect/union allocates a fresh
///   set — Rust's ownership already gives us the copy-on-write the
///   original implementation has to arrange by hand.
pub fn optimize(conditions: Vec<Condition>) -> Filter {
    let mut ids: Option<IdSet> = None;
    let mut unique_keys: Option<NameSet> = None;
    let mut key_union: NameSet = NameSet::new();

    for condition in conditions {
        match condition {
            Condition::IsOneOf(set) => {
                let merged = match ids.take() {
                    None => set,
                    Some(existing) => existing.intersection(&set).cloned().collect(),
                };
                if merged.is_empty() {
                    return Filter::none();
                }
                ids = Some(merged);
            }
            Condition::HasUniqueKeyIn(set) => {
                let merged = match unique_keys.take() {
                    None => set,
                    Some(existing) => existing.intersection(&set).cloned().collect(),
                };
                if merged.is_empty() {
                    return Filter::none();
                }
                unique_keys = Some(merged);
            }
            Condition::HasKeys(set) => {
                key_union.extend(set);
            }
        }
    }

    let mut result = Vec::with_capacity(3);
    if let Some(ids) = ids {
        result.push(Condition::IsOneOf(ids));
    }
    if let Some(unique_keys) = unique_keys {
        result.push(Condition::HasUniqueKeyIn(unique_keys));
    }
    if !key_union.is_empty() {
        result.push(Condition::HasKeys(key_union));
    }

    if result.is_empty() {
        Filter::All
    } else {
        Filter::Conditions(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_conditions_optimizes_to_all() {
        assert_eq!(optimize(vec![]), Filter::All);
    }

    #[test]
    fn empty_has_keys_is_vacuously_true() {
        let f = optimize(vec![Condition::HasKeys(NameSet::new())]);
        assert_eq!(f, Filter::All);
    }

    #[test]
    fn empty_is_one_of_is_infeasible() {
        let f = optimize(vec![Condition::IsOneOf(IdSet::new())]);
        assert!(f.is_none());
    }

    #[test]
    fn disjoint_is_one_of_intersection_is_infeasible() {
        let f = optimize(vec![
            Condition::IsOneOf(["a".to_string()].into()),
            Condition::IsOneOf(["b".to_string()].into()),
        ]);
        assert!(f.is_none());
    }

    #[test]
    fn repeated_is_one_of_intersects() {
        let f = optimize(vec![
            Condition::IsOneOf(["a".to_string(), "b".to_string()].into()),
            Condition::IsOneOf(["b".to_string(), "c".to_string()].into()),
        ]);
        assert_eq!(f, Filter::Conditions(vec![Condition::IsOneOf(["b".to_string()].into())]));
    }

    #[test]
    fn repeated_has_keys_unions() {
        let f = optimize(vec![
            Condition::HasKeys(["a".to_string()].into()),
            Condition::HasKeys(["b".to_string()].into()),
        ]);
        assert_eq!(
            f,
            Filter::Conditions(vec![Condition::HasKeys(["a".to_string(), "b".to_string()].into())])
        );
    }

    #[test]
    fn mixed_conditions_flatten_to_one_of_each() {
        let f = optimize(vec![
            Condition::IsOneOf(["a".to_string()].into()),
            Condition::HasUniqueKeyIn(["u".to_string()].into()),
            Condition::HasKeys(["k".to_string()].into()),
        ]);
        assert_eq!(
            f,
            Filter::Conditions(vec![
                Condition::IsOneOf(["a".to_string()].into()),
                Condition::HasUniqueKeyIn(["u".to_string()].into()),
                Condition::HasKeys(["k".to_string()].into()),
            ])
        );
    }
}
