use std::collections::BTreeMap;

use ptiles_core::{
    cloud::PointCloud,
    grid::{BlockKey, GridSpec, OffsetPass},
};

/// Point indices of a single block
pub type Block = Vec<usize>;

/// Blocks of one source cloud in one `OffsetPass`, ordered by their keys. Cells without points have no block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub(crate) blocks: BTreeMap<BlockKey, Block>,
}

impl Partition {
    pub fn blocks(&self) -> &BTreeMap<BlockKey, Block> {
        &self.blocks
    }

    pub fn into_blocks(self) -> BTreeMap<BlockKey, Block> {
        self.blocks
    }

    pub fn get(&self, key: &BlockKey) -> Option<&Block> {
        self.blocks.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BlockKey, &Block)> {
        self.blocks.iter()
    }

    /// Number of (non-empty) blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of points in each block
    pub fn point_counts(&self) -> BTreeMap<BlockKey, usize> {
        self.blocks
            .iter()
            .map(|(key, block)| (*key, block.len()))
            .collect()
    }

    /// Total number of point indices over all blocks. After resampling this can exceed the size of the cloud
    pub fn total_points(&self) -> usize {
        self.blocks.values().map(Vec::len).sum()
    }
}

impl FromIterator<(BlockKey, Block)> for Partition {
    fn from_iter<T: IntoIterator<Item = (BlockKey, Block)>>(iter: T) -> Self {
        Self {
            blocks: iter.into_iter().collect(),
        }
    }
}

/// Groups all points of `cloud` into the blocks of `grid` for the given `pass`. Every point ends up in exactly
/// one block, and the indices within each block are increasing
/// ```
/// # use ptiles_core::{cloud::*, grid::*, nalgebra::Vector3};
/// # use ptiles_algorithms::partition::partition;
/// let mut cloud = PointCloud::new(FeatureSchema::default());
/// for x in [1.0, 4.0, 12.0] {
///     cloud.push(Vector3::new(x, 0.0, 0.0), 0, &[]).unwrap();
/// }
/// let grid = GridSpec::new(10.0, &cloud.bounds().unwrap()).unwrap();
/// let blocks = partition(&cloud, &grid, OffsetPass::Zero);
/// assert_eq!(blocks.get(&BlockKey::new(0, 0)), Some(&vec![0, 1]));
/// assert_eq!(blocks.get(&BlockKey::new(1, 0)), Some(&vec![2]));
/// ```
pub fn partition(cloud: &PointCloud, grid: &GridSpec, pass: OffsetPass) -> Partition {
    let mut blocks = BTreeMap::<BlockKey, Block>::new();
    for (index, position) in cloud.positions().iter().enumerate() {
        blocks
            .entry(grid.key_of(position, pass))
            .or_default()
            .push(index);
    }
    Partition { blocks }
}
