//! Minimal branch set needed to evaluate a group of calculations.

use std::collections::BTreeSet;

use crate::calculation::{Selection, Variable, WeightCalculation};

/// Union of the branches declared by `variables` and `selections`.
///
/// The result is a sorted set, so registration order never changes it.
pub fn resolve_branches(variables: &[Variable], selections: &[Selection]) -> BTreeSet<String> {
    variables
        .iter()
        .flat_map(|v| v.branches())
        .chain(selections.iter().flat_map(|s| s.branches()))
        .cloned()
        .collect()
}

/// [`resolve_branches`] plus the branches the weight calculation reads.
pub fn resolve_with_weight(
    variables: &[Variable],
    selections: &[Selection],
    weight: &WeightCalculation,
) -> BTreeSet<String> {
    let mut branches = resolve_branches(variables, selections);
    branches.extend(weight.branches().iter().cloned());
    branches
}
