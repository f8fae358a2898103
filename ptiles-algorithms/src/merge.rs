use std::collections::BTreeMap;

use log::debug;
use ptiles_core::grid::BlockKey;

use crate::partition::Partition;

/// Offsets of the 8-connected neighbors of a block, in the order in which they are tried as merge targets
pub const NEIGHBOR_ORDER: [(i64, i64); 8] = [
    (0, 1),
    (1, 0),
    (0, -1),
    (-1, 0),
    (-1, 1),
    (1, 1),
    (1, -1),
    (-1, -1),
];

/// Outcome of `merge_small_blocks`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// `(donor, receiver)` for every block that was merged into a neighbor
    pub merged: Vec<(BlockKey, BlockKey)>,
    /// Undersized blocks that had no neighbor to merge into. They are kept as they are
    pub unmerged: Vec<BlockKey>,
}

/// Returns the first neighbor of `key` whose count in `counts` reaches `threshold`
fn merge_target(
    key: &BlockKey,
    counts: &BTreeMap<BlockKey, usize>,
    threshold: usize,
) -> Option<BlockKey> {
    NEIGHBOR_ORDER
        .iter()
        .map(|(dx, dy)| key.neighbor(*dx, *dy))
        .find(|neighbor| {
            counts
                .get(neighbor)
                .map_or(false, |count| *count >= threshold)
        })
}

/// Merges every block with fewer than `threshold` points into a neighboring block that has at least
/// `threshold` points. Blocks are visited once, in key order, and all decisions are based on the point counts
/// before merging: a block that grows past the threshold by receiving points does not become a merge target
/// later in the same pass, and receivers are never re-evaluated. The donor block is removed from `partition`
pub fn merge_small_blocks(partition: &mut Partition, threshold: usize) -> MergeReport {
    let original_counts = partition.point_counts();
    let mut report = MergeReport::default();
    for (key, count) in original_counts.iter() {
        if *count >= threshold {
            continue;
        }
        match merge_target(key, &original_counts, threshold) {
            Some(target) => {
                // Targets are never undersized, so they were never removed as donors
                if let Some(donated) = partition.blocks.remove(key) {
                    partition.blocks.entry(target).or_default().extend(donated);
                }
                debug!("Merged block {} ({} points) into block {}", key, count, target);
                report.merged.push((*key, target));
            }
            None => {
                debug!(
                    "Block {} has only {} points but no neighbor to merge into",
                    key, count
                );
                report.unmerged.push(*key);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_partition(blocks: &[((i64, i64), usize)]) -> Partition {
        let mut next_index = 0;
        blocks
            .iter()
            .map(|((x, y), count)| {
                let indices = (next_index..next_index + count).collect::<Vec<_>>();
                next_index += count;
                (BlockKey::new(*x, *y), indices)
            })
            .collect()
    }

    fn sorted_indices(partition: &Partition) -> Vec<usize> {
        let mut indices = partition
            .blocks()
            .values()
            .flatten()
            .copied()
            .collect::<Vec<_>>();
        indices.sort_unstable();
        indices
    }

    #[test]
    fn test_small_block_merges_into_first_neighbor() {
        // (1, 1) is small. Its neighbors (1, 2) and (2, 1) both qualify, (0, 1) in +y comes first
        let mut partition = make_partition(&[((1, 1), 3), ((1, 2), 20), ((2, 1), 30)]);
        let before = sorted_indices(&partition);

        let report = merge_small_blocks(&mut partition, 10);
        assert_eq!(
            report.merged,
            vec![(BlockKey::new(1, 1), BlockKey::new(1, 2))]
        );
        assert!(report.unmerged.is_empty());
        assert_eq!(partition.len(), 2);
        assert_eq!(partition.get(&BlockKey::new(1, 2)).map(Vec::len), Some(23));
        assert_eq!(sorted_indices(&partition), before);
    }

    #[test]
    fn test_isolated_small_block_is_kept() {
        let mut partition = make_partition(&[((0, 0), 3), ((5, 5), 30)]);
        let report = merge_small_blocks(&mut partition, 10);
        assert!(report.merged.is_empty());
        assert_eq!(report.unmerged, vec![BlockKey::new(0, 0)]);
        assert_eq!(partition.len(), 2);
    }

    #[test]
    fn test_decisions_use_original_counts() {
        // Both small blocks skip their small neighbor and end up in (1, 0)
        let mut partition = make_partition(&[((0, 0), 4), ((0, 1), 6), ((1, 0), 10)]);
        let report = merge_small_blocks(&mut partition, 10);
        assert_eq!(
            report.merged,
            vec![
                (BlockKey::new(0, 0), BlockKey::new(1, 0)),
                (BlockKey::new(0, 1), BlockKey::new(1, 0)),
            ]
        );
        assert_eq!(partition.len(), 1);
        assert_eq!(partition.get(&BlockKey::new(1, 0)).map(Vec::len), Some(20));
    }

    #[test]
    fn test_no_block_reaches_threshold() {
        let mut partition = make_partition(&[((-1, 0), 5), ((0, 0), 8), ((1, 0), 2)]);
        let report = merge_small_blocks(&mut partition, 10);
        assert!(report.merged.is_empty());
        assert_eq!(report.unmerged.len(), 3);
        assert_eq!(partition.total_points(), 15);
    }

    #[test]
    fn test_zero_threshold_merges_nothing() {
        let mut partition = make_partition(&[((0, 0), 1), ((0, 1), 1)]);
        let report = merge_small_blocks(&mut partition, 0);
        assert_eq!(report, MergeReport::default());
        assert_eq!(partition.len(), 2);
    }
}
