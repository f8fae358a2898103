use anyhow::{ensure, Result};
use log::{debug, warn};
use ptiles_core::{
    classes::ClassMap,
    cloud::PointCloud,
    math::AABB,
    nalgebra::Vector3,
    tile::Tile,
};
use rand::{seq::SliceRandom, Rng};

/// Destination for full batches of tiles
pub trait TileSink {
    fn write_batch(&mut self, batch: &[Tile]) -> Result<()>;
}

impl<S: TileSink + ?Sized> TileSink for &mut S {
    fn write_batch(&mut self, batch: &[Tile]) -> Result<()> {
        (**self).write_batch(batch)
    }
}

/// Keeps all batches in memory
impl TileSink for Vec<Vec<Tile>> {
    fn write_batch(&mut self, batch: &[Tile]) -> Result<()> {
        self.push(batch.to_vec());
        Ok(())
    }
}

/// Buffers tiles and hands them to a `TileSink` in batches of a fixed size. The last batch, which may be
/// smaller, is written by `finish`
pub struct TileBatcher<S: TileSink> {
    sink: S,
    batch_size: usize,
    buffer: Vec<Tile>,
    tiles_written: usize,
    batches_written: usize,
}

impl<S: TileSink> TileBatcher<S> {
    /// Creates a new `TileBatcher` that writes batches of `batch_size` tiles to `sink`
    ///
    /// # Panics
    ///
    /// If `batch_size` is zero
    pub fn new(sink: S, batch_size: usize) -> Self {
        assert!(batch_size > 0, "Batch size must not be zero");
        Self {
            sink,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            tiles_written: 0,
            batches_written: 0,
        }
    }

    pub fn push(&mut self, tile: Tile) -> Result<()> {
        self.buffer.push(tile);
        if self.buffer.len() == self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.sink.write_batch(&self.buffer)?;
        self.tiles_written += self.buffer.len();
        self.batches_written += 1;
        self.buffer.clear();
        Ok(())
    }

    /// Writes the remaining tiles and returns the sink
    pub fn finish(mut self) -> Result<S> {
        self.flush()?;
        Ok(self.sink)
    }

    /// Number of tiles that have been handed to the sink so far
    pub fn tiles_written(&self) -> usize {
        self.tiles_written
    }

    pub fn batches_written(&self) -> usize {
        self.batches_written
    }
}

/// Returns the label index of every point in `cloud`. Classification codes that are not part of `classes`
/// get the `background` label
pub fn label_points(cloud: &PointCloud, classes: &ClassMap, background: u8) -> Vec<u8> {
    let mut unknown = 0;
    let labels = cloud
        .classifications()
        .iter()
        .map(|code| {
            classes.label_of(*code).unwrap_or_else(|| {
                unknown += 1;
                background
            })
        })
        .collect();
    if unknown > 0 {
        warn!(
            "{} points have classification codes outside of the class map and are labeled as background",
            unknown
        );
    }
    labels
}

/// The center of the horizontal bounding box of all points in `block`, at the height of the lowest point
pub fn block_bottom_center(cloud: &PointCloud, block: &[usize]) -> Option<Vector3<f64>> {
    let bounds = AABB::from_positions(block.iter().map(|index| cloud.position(*index)))?;
    let center = bounds.center();
    Some(Vector3::new(center.x, center.y, bounds.min().z))
}

/// Cuts one block into tiles of at most `max_point` points. The block is shuffled and split into the
/// smallest number of runs that fit into a tile, all of equal length except for the last one. `labels` must
/// hold the label of every point in `cloud`, see `label_points`
pub fn cut_block<R: Rng + ?Sized>(
    cloud: &PointCloud,
    labels: &[u8],
    block: &[usize],
    max_point: usize,
    rng: &mut R,
) -> Result<Vec<Tile>> {
    ensure!(max_point > 0, "Tile capacity must not be zero");
    ensure!(
        labels.len() == cloud.len(),
        "Expected {} labels but got {}",
        cloud.len(),
        labels.len()
    );
    let center = match block_bottom_center(cloud, block) {
        Some(center) => center,
        None => return Ok(vec![]),
    };

    let mut shuffled = block.to_vec();
    shuffled.shuffle(rng);

    let num_tiles = (shuffled.len() + max_point - 1) / max_point;
    let run_length = (shuffled.len() + num_tiles - 1) / num_tiles;
    let num_features = cloud.schema().tile_feature_count();
    let mut features = vec![0.0; num_features];
    let mut unnormalized = vec![0.0; num_features];

    let tiles = shuffled
        .chunks(run_length)
        .map(|run| -> Result<Tile> {
            let mut tile = Tile::new(max_point, num_features, center);
            for index in run {
                cloud.write_features(*index, &center, &mut features);
                cloud.write_features(*index, &Vector3::zeros(), &mut unnormalized);
                tile.push(*index as u64, labels[*index], &features, &unnormalized)?;
            }
            Ok(tile)
        })
        .collect::<Result<Vec<_>>>()?;
    debug!(
        "Cut block of {} points at {:?} into {} tiles",
        block.len(),
        center,
        tiles.len()
    );
    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use ptiles_core::cloud::FeatureSchema;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::test_utils::{random_cloud, test_classes};

    #[test]
    fn test_batcher_flushes_full_and_final_batches() -> Result<()> {
        let mut batches: Vec<Vec<Tile>> = vec![];
        let mut batcher = TileBatcher::new(&mut batches, 3);
        for idx in 0..7 {
            batcher.push(Tile::new(2, 3, Vector3::new(idx as f64, 0.0, 0.0)))?;
        }
        assert_eq!(batcher.batches_written(), 2);
        assert_eq!(batcher.tiles_written(), 6);
        batcher.finish()?;

        assert_eq!(
            batches.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![3, 3, 1]
        );
        assert_eq!(batches[2][0].block_center.x, 6.0);
        Ok(())
    }

    #[test]
    fn test_finish_without_remainder() -> Result<()> {
        let mut batcher = TileBatcher::new(Vec::<Vec<Tile>>::new(), 2);
        batcher.push(Tile::new(1, 3, Vector3::zeros()))?;
        batcher.push(Tile::new(1, 3, Vector3::zeros()))?;
        let batches = batcher.finish()?;
        assert_eq!(batches.len(), 1);
        Ok(())
    }

    #[test]
    fn test_cut_block_splits_evenly() -> Result<()> {
        let cloud = random_cloud(600, 10.0, 5);
        let labels = label_points(&cloud, &test_classes(), 0);
        let block = (0..cloud.len()).collect::<Vec<_>>();
        let mut rng = StdRng::seed_from_u64(0);
        let tiles = cut_block(&cloud, &labels, &block, 256, &mut rng)?;

        // 600 points need 3 tiles, 200 points each
        assert_eq!(tiles.len(), 3);
        let mut seen = vec![false; cloud.len()];
        for tile in &tiles {
            assert_eq!(tile.count, 200);
            assert_eq!(tile.capacity(), 256);
            assert!(tile.label_seg[200..].iter().all(|l| *l == u8::MAX));
            assert!(tile.indices[200..].iter().all(|i| *i == 0));
            for (slot, index) in tile.valid_indices().iter().enumerate() {
                let index = *index as usize;
                assert!(!seen[index]);
                seen[index] = true;
                assert_eq!(tile.label_seg[slot], labels[index]);
                let position = cloud.position(index);
                assert_approx_eq!(tile.unnormalized_data[[slot, 0]], position.x as f32);
                assert_approx_eq!(
                    tile.data[[slot, 2]],
                    (position.z - tile.block_center.z) as f32
                );
                assert!(tile.data[[slot, 2]] >= 0.0);
            }
        }
        assert!(seen.iter().all(|s| *s));
        Ok(())
    }

    #[test]
    fn test_cut_block_last_run_takes_remainder() -> Result<()> {
        let cloud = random_cloud(10, 10.0, 6);
        let labels = vec![0; cloud.len()];
        let block = (0..10).collect::<Vec<_>>();
        let mut rng = StdRng::seed_from_u64(0);
        let tiles = cut_block(&cloud, &labels, &block, 4, &mut rng)?;
        assert_eq!(
            tiles.iter().map(|t| t.count).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );
        assert!(cut_block(&cloud, &labels, &[], 4, &mut rng)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_unknown_codes_get_background_label() -> Result<()> {
        let mut cloud = PointCloud::new(FeatureSchema::default());
        cloud.push(Vector3::zeros(), 2, &[])?;
        cloud.push(Vector3::zeros(), 17, &[])?;
        assert_eq!(label_points(&cloud, &test_classes(), 1), vec![2, 1]);
        Ok(())
    }
}
