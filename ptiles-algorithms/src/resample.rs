use std::collections::BTreeMap;

use log::debug;
use ptiles_core::{cloud::PointCloud, grid::BlockKey, math::AABB};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use rayon::prelude::*;

use crate::partition::{Block, Partition};

/// Creates the random number generator for the block `key`. Every block gets its own deterministic stream,
/// so results do not depend on the order in which blocks are processed
pub fn block_rng(seed: u64, key: BlockKey) -> StdRng {
    let stream = ((key.x as u64) << 32) ^ (key.y as u64 & 0xffff_ffff);
    StdRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9e37_79b9_7f4a_7c15))
}

type SubCell = (i64, i64, i64);

/// Equalizes the point density within one block. The block is subdivided into cubic sub-cells of edge length
/// `grid_size`, and every sub-cell with fewer points than the (floored) average sub-cell count is padded up to
/// that average by repeating its own points. Sub-cells at or above the average are kept as they are, so the
/// result contains every input index at least once and no index that was not in `block`.
///
/// This only approximates an even density: it never removes points from dense sub-cells.
pub fn resample_block<R: Rng + ?Sized>(
    cloud: &PointCloud,
    block: &[usize],
    grid_size: f64,
    rng: &mut R,
) -> Block {
    let block_bounds = match AABB::from_positions(block.iter().map(|index| cloud.position(*index))) {
        Some(bounds) => bounds,
        None => return vec![],
    };
    let block_min = block_bounds.min();

    let mut sub_cells = BTreeMap::<SubCell, Vec<usize>>::new();
    for index in block {
        let local = cloud.position(*index) - block_min.coords;
        let cell = (
            (local.x / grid_size).floor() as i64,
            (local.y / grid_size).floor() as i64,
            (local.z / grid_size).floor() as i64,
        );
        sub_cells.entry(cell).or_default().push(*index);
    }
    let average = block.len() / sub_cells.len();

    let mut resampled = Vec::with_capacity(sub_cells.len() * average.max(1) + block.len());
    for members in sub_cells.values() {
        resampled.extend_from_slice(members);
        if members.len() >= average {
            continue;
        }
        let missing = average - members.len();
        let repeats = (average + members.len() - 1) / members.len() - 1;
        let mut pool = members.repeat(repeats);
        pool.shuffle(rng);
        pool.truncate(missing);
        resampled.extend(pool);
    }
    resampled
}

/// Resamples all blocks of `partition` in parallel, see `resample_block`
pub fn resample_partition(
    cloud: &PointCloud,
    partition: Partition,
    grid_size: f64,
    seed: u64,
) -> Partition {
    let input_points = partition.total_points();
    let resampled = partition
        .into_blocks()
        .into_par_iter()
        .map(|(key, block)| {
            let mut rng = block_rng(seed, key);
            (key, resample_block(cloud, &block, grid_size, &mut rng))
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect::<Partition>();
    debug!(
        "Resampled {} blocks from {} to {} points",
        resampled.len(),
        input_points,
        resampled.total_points()
    );
    resampled
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use ptiles_core::{
        cloud::FeatureSchema,
        grid::{GridSpec, OffsetPass},
        nalgebra::Vector3,
    };

    use super::*;
    use crate::{partition::partition, test_utils::random_cloud};

    fn cloud_from_positions(positions: &[[f64; 3]]) -> PointCloud {
        let mut cloud = PointCloud::new(FeatureSchema::default());
        for [x, y, z] in positions {
            cloud
                .push(Vector3::new(*x, *y, *z), 0, &[])
                .expect("Schema has no extra features");
        }
        cloud
    }

    #[test]
    fn test_sparse_sub_cell_is_padded_to_average() {
        // Sub-cell (0, 0, 0) holds 5 points, sub-cell (1, 0, 0) holds 1 point. The average is 3
        let cloud = cloud_from_positions(&[
            [0.1, 0.1, 0.1],
            [0.2, 0.1, 0.1],
            [0.3, 0.1, 0.1],
            [0.4, 0.1, 0.1],
            [0.5, 0.1, 0.1],
            [1.5, 0.1, 0.1],
        ]);
        let block = (0..6).collect::<Vec<_>>();
        let mut rng = StdRng::seed_from_u64(0);
        let mut resampled = resample_block(&cloud, &block, 1.0, &mut rng);
        resampled.sort_unstable();
        assert_eq!(resampled, vec![0, 1, 2, 3, 4, 5, 5, 5]);
    }

    #[test]
    fn test_uniform_block_is_unchanged() {
        let cloud = cloud_from_positions(&[[0.5, 0.5, 0.5], [1.5, 0.5, 0.5], [0.5, 1.5, 0.5]]);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(resample_block(&cloud, &[0, 1, 2], 1.0, &mut rng), vec![0, 2, 1]);
        assert!(resample_block(&cloud, &[], 1.0, &mut rng).is_empty());
    }

    #[test]
    fn test_resampling_only_duplicates() {
        let cloud = random_cloud(2000, 20.0, 3);
        let grid = GridSpec::new(10.0, &cloud.bounds().expect("Cloud is not empty"))
            .expect("Block size is valid");
        let blocks = partition(&cloud, &grid, OffsetPass::Zero);
        let resampled = resample_partition(&cloud, blocks.clone(), 0.5, 42);

        assert_eq!(resampled.len(), blocks.len());
        for (key, block) in blocks.iter() {
            let output = resampled.get(key).expect("Block is kept");
            assert!(output.len() >= block.len());
            let input_set = block.iter().collect::<HashSet<_>>();
            let output_set = output.iter().collect::<HashSet<_>>();
            assert_eq!(input_set, output_set);
        }
    }

    #[test]
    fn test_resampling_is_deterministic() {
        let cloud = random_cloud(500, 20.0, 4);
        let grid = GridSpec::new(10.0, &cloud.bounds().expect("Cloud is not empty"))
            .expect("Block size is valid");
        let blocks = partition(&cloud, &grid, OffsetPass::Half);
        assert_eq!(
            resample_partition(&cloud, blocks.clone(), 1.0, 7),
            resample_partition(&cloud, blocks, 1.0, 7)
        );
    }
}
