use ilm_limiter_core::IndexSnapshot;

/// An index in walk order, with the cumulative size up to and including it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedIndex {
    pub snapshot: IndexSnapshot,
    pub running_total: u64,
    /// Set once the running total has exceeded the limit. Stays set for every
    /// older index after it.
    pub over_limit: bool,
}

/// Orders `indices` newest first and flags every index from the first one
/// that pushes the cumulative size above `limit_bytes`.
///
/// Reaching the limit exactly does not flag an index. Indices with the same
/// lifecycle date are ordered by name.
pub fn plan_phase(limit_bytes: u64, mut indices: Vec<IndexSnapshot>) -> Vec<PlannedIndex> {
    indices.sort_by(|a, b| {
        b.lifecycle_date
            .cmp(&a.lifecycle_date)
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut running_total = 0u64;
    indices
        .into_iter()
        .map(|snapshot| {
            running_total = running_total.saturating_add(snapshot.size_bytes);
            PlannedIndex {
                snapshot,
                running_total,
                over_limit: running_total > limit_bytes,
            }
        })
        .collect()
}
