//! Alignment of independently-sourced, sorted interval datasets.
//!
//! Both algorithms require their inputs sorted ascending by
//! [`GenomicKey`](crate::types::GenomicKey); upstream tools (modkit and
//! friends) emit sorted BED files, so the two-pointer merge runs in linear
//! time over inputs that are mostly aligned already.

use crate::data::Keyed;
use crate::error::AlignmentError;
use std::cmp::Ordering;

/// Synchronized two-pointer intersection of two sorted sequences.
///
/// Returns parallel index lists of equal length: positions where both
/// sequences carry the same key, in ascending order. Equal keys record both
/// cursors and advance both; otherwise the cursor at the smaller key
/// advances.
pub fn find_overlapping_indexes<A: Keyed, B: Keyed>(
    left: &[A],
    right: &[B],
) -> (Vec<usize>, Vec<usize>) {
    let capacity = left.len().min(right.len());
    let mut left_indexes = Vec::with_capacity(capacity);
    let mut right_indexes = Vec::with_capacity(capacity);

    let mut i = 0;
    let mut j = 0;
    while i < left.len() && j < right.len() {
        match left[i].key().cmp(&right[j].key()) {
            Ordering::Equal => {
                left_indexes.push(i);
                right_indexes.push(j);
                i += 1;
                j += 1;
            }
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
        }
    }

    (left_indexes, right_indexes)
}

/// For each allow-list entry, binary-searches `records` for an exact key
/// match and collects the matching index, in allow-list order.
///
/// Finding nothing at all across the whole allow-list is a configuration
/// error (the allow-list and the dataset share no sites), not a per-row
/// skip.
pub fn find_indexes_in_cpg_list<A: Keyed, B: Keyed>(
    cpgs: &[A],
    records: &[B],
) -> Result<Vec<usize>, AlignmentError> {
    let mut matches = Vec::with_capacity(cpgs.len());

    for cpg in cpgs {
        let target = cpg.key();
        if let Ok(index) = records.binary_search_by(|record| record.key().cmp(&target)) {
            matches.push(index);
        }
    }
    // A repeated allow-list entry hits the same record again; with sorted
    // inputs the repeats are adjacent, so collapse them here rather than
    // hand a duplicate index to the subsetting step.
    matches.dedup();

    if matches.is_empty() {
        return Err(AlignmentError::NoOverlap {
            left: "CpG allow-list",
            right: "dataset",
        });
    }
    Ok(matches)
}
