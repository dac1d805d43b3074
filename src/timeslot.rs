//! Slot-index to clock-time translation for presentation surfaces and
//! test fixtures.

use crate::model::{SlotMask, SLOT_MINUTES};

/// Format the clock time at a slot boundary (`edge` slots past 00:00).
fn clock(edge: usize) -> String {
    let total = edge * SLOT_MINUTES;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Human range for slots `[start, end)`.
fn range_label(start: usize, end: usize) -> String {
    format!("{}-{}", clock(start), clock(end))
}

/// One `"HH:MM-HH:MM"` entry per free slot, ascending by index.
pub fn to_time_ranges(mask: &SlotMask) -> Vec<String> {
    mask.free_indices()
        .into_iter()
        .map(|i| range_label(i, i + 1))
        .collect()
}

/// Merge runs of consecutive slot indices into single ranges.
///
/// Input must be ascending and unique; `[0, 1, 2, 5, 6]` becomes
/// `["00:00-00:15", "00:25-00:35"]`. Empty input yields empty output.
pub fn merge_contiguous(indices: &[usize]) -> Vec<String> {
    let mut merged = Vec::new();
    let Some((&first, rest)) = indices.split_first() else {
        return merged;
    };
    let mut run_start = first;
    let mut prev = first;
    for &idx in rest {
        if idx == prev + 1 {
            prev = idx;
        } else {
            merged.push(range_label(run_start, prev + 1));
            run_start = idx;
            prev = idx;
        }
    }
    merged.push(range_label(run_start, prev + 1));
    merged
}

/// Contiguous free ranges of a mask, merged and formatted.
pub fn merged_free_ranges(mask: &SlotMask) -> Vec<String> {
    merge_contiguous(&mask.free_indices())
}
