//! Strict-prerequisite gating: a unit opens only once every unit before it
//! in the ordering is complete. The first unit is always open.
//!
//! Works for sections within a campaign and for campaigns within the catalog.
//! Nothing here is cached; recompute from the current state on every query.

use std::collections::BTreeSet;

/// Whether `unit` is accessible given an ordering and the completed set.
///
/// Units absent from `ordered` are locked. If `ordered` contains duplicates,
/// the first occurrence decides the position.
///
/// # Examples
///
/// ```
/// # use std::collections::BTreeSet;
/// # use raccoon_core::unlock::is_unlocked;
/// let order = ["a", "b", "c"];
/// let done = BTreeSet::from(["a"]);
/// assert!(is_unlocked(&"b", &order, &done));
/// assert!(!is_unlocked(&"c", &order, &done));
/// ```
#[must_use]
pub fn is_unlocked<T: Ord>(unit: &T, ordered: &[T], completed: &BTreeSet<T>) -> bool {
    match ordered.iter().position(|u| u == unit) {
        Some(index) => ordered[..index].iter().all(|u| completed.contains(u)),
        None => false,
    }
}

/// Units that are currently accessible, in order.
///
/// Equivalent to calling `is_unlocked` for each unit, in one pass: the prefix
/// of completed units plus the first incomplete one.
#[must_use]
pub fn unlocked_units<T: Ord + Clone>(ordered: &[T], completed: &BTreeSet<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for unit in ordered {
        if out.contains(unit) {
            continue;
        }
        out.push(unit.clone());
        if !completed.contains(unit) {
            break;
        }
    }
    out
}
