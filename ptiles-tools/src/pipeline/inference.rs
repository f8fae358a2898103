use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, info};
use ptiles_algorithms::aggregation::{predict_tile, SegmentationModel};
use ptiles_core::{config::InferenceConfig, util::CancellationToken};
use ptiles_io::{
    dataset::{prediction_path, Dataset},
    tiles::{read_tiles, write_predictions},
};
use rand::{rngs::StdRng, SeedableRng};

use super::export::{run_per_file, BatchSummary};

/// Runs `model` on every tile of the tile file at `tile_path` and writes the predictions next to it. Returns
/// the path of the prediction file
pub fn predict_file<M: SegmentationModel + ?Sized>(
    tile_path: &Path,
    model: &M,
    config: &InferenceConfig,
) -> Result<PathBuf> {
    let tiles = read_tiles(tile_path)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let predictions = tiles
        .iter()
        .map(|tile| predict_tile(tile, model, config.sample_point_num, config.repeats, &mut rng))
        .collect::<Result<Vec<_>>>()?;
    let path = prediction_path(tile_path);
    write_predictions(&path, &predictions)?;
    debug!("Wrote predictions for {} tiles to {}", predictions.len(), path.display());
    Ok(path)
}

/// Predicts all tiles of `dataset`, writing one prediction file per tile file. Tile files are processed in
/// parallel; a failing file is logged and skipped
pub fn predict_dataset<M: SegmentationModel + Sync + ?Sized>(
    dataset: &Dataset,
    model: &M,
    config: &InferenceConfig,
    cancel: &CancellationToken,
) -> Result<BatchSummary> {
    config.validate()?;
    let tile_files = dataset
        .sources()
        .iter()
        .flat_map(|source| dataset.tile_files(source))
        .collect::<Vec<_>>();
    info!("Predicting {} tile files", tile_files.len());
    Ok(run_per_file(&tile_files, cancel, |path| {
        predict_file(path, model, config).map(|written| vec![written])
    }))
}
