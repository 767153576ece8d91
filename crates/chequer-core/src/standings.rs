//! Ranking of entries.

use std::collections::HashMap;

use chequer_proto::Entry;

/// Re-rank `entries` in place.
///
/// Orders by completed laps, most first. The sort is stable, so entries on the
/// same lap keep their previous relative order. Afterwards `position` is the
/// 1-based index and `position_in_class` is dense within each class.
pub fn rank(entries: &mut [Entry]) {
    entries.sort_by(|a, b| b.completed_laps.cmp(&a.completed_laps));
    assign_positions(entries);
}

/// Assign dense overall and class positions from the current slice order.
pub fn assign_positions(entries: &mut [Entry]) {
    let mut class_counts: HashMap<String, u32> = HashMap::new();

    for (i, entry) in entries.iter_mut().enumerate() {
        entry.position = i as u32 + 1;

        let count = class_counts.entry(entry.identity.class.clone()).or_insert(0);
        *count += 1;
        entry.position_in_class = *count;
    }
}
