//! Tile files and prediction files. Both are archives of stacked per-tile arrays: a file with `N` tiles of
//! capacity `P` and `F` features per point holds
//!
//! | array | type | shape |
//! |---|---|---|
//! | `data` | `f32` | `[N, P, F]` |
//! | `unnormalized_data` | `f32` | `[N, P, F]` |
//! | `data_num` | `i32` | `[N]` |
//! | `label_seg` | `u8` | `[N, P]` |
//! | `indices_split_to_full` | `u64` | `[N, P]` |
//! | `block_center` | `f64` | `[N, 3]` |
//!
//! Prediction files hold `data_num`, `indices_split_to_full`, the predicted labels in `label_seg` and the
//! matching `confidence` (`f32`, `[N, P]`).
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use ptiles_core::{
    nalgebra::Vector3,
    ndarray::Array2,
    tile::{Prediction, PredictionTile, Tile},
};

use crate::archive::{read_archive_file, write_archive_file, Archive, ArrayData};

pub const DATA: &str = "data";
pub const UNNORMALIZED_DATA: &str = "unnormalized_data";
pub const DATA_NUM: &str = "data_num";
pub const LABEL_SEG: &str = "label_seg";
pub const INDICES_SPLIT_TO_FULL: &str = "indices_split_to_full";
pub const BLOCK_CENTER: &str = "block_center";
pub const CONFIDENCE: &str = "confidence";

fn common_shape<I: Iterator<Item = (usize, usize)>>(mut shapes: I) -> Result<(usize, usize)> {
    let first = match shapes.next() {
        Some(shape) => shape,
        None => return Ok((0, 0)),
    };
    for shape in shapes {
        ensure!(
            shape == first,
            "All tiles of one file must have the same shape, found {:?} and {:?}",
            first,
            shape
        );
    }
    Ok(first)
}

fn data_num(counts: impl Iterator<Item = usize>) -> Result<ArrayData> {
    let counts = counts
        .map(|count| i32::try_from(count).context("Tile point count exceeds i32"))
        .collect::<Result<Vec<_>>>()?;
    Ok(ArrayData::I32(counts))
}

fn counts_from_data_num(data_num: Vec<i32>, capacity: usize) -> Result<Vec<usize>> {
    data_num
        .into_iter()
        .map(|count| {
            let count = usize::try_from(count).context("Negative tile point count")?;
            ensure!(
                count <= capacity,
                "Tile point count {} exceeds tile capacity {}",
                count,
                capacity
            );
            Ok(count)
        })
        .collect()
}

fn check_shape(name: &str, shape: &[usize], expected: &[usize]) -> Result<()> {
    if shape != expected {
        bail!(
            "Array '{}' has shape {:?}, expected {:?}",
            name,
            shape,
            expected
        );
    }
    Ok(())
}

/// Stacks `tiles` into an `Archive`. All tiles must have the same capacity and feature count
pub fn tiles_to_archive(tiles: &[Tile]) -> Result<Archive> {
    let (capacity, num_features) =
        common_shape(tiles.iter().map(|t| (t.capacity(), t.num_features())))?;
    let n = tiles.len();

    let mut archive = Archive::new();
    archive.insert(
        DATA,
        vec![n, capacity, num_features],
        ArrayData::F32(tiles.iter().flat_map(|t| t.data.iter().copied()).collect()),
    )?;
    archive.insert(
        UNNORMALIZED_DATA,
        vec![n, capacity, num_features],
        ArrayData::F32(
            tiles
                .iter()
                .flat_map(|t| t.unnormalized_data.iter().copied())
                .collect(),
        ),
    )?;
    archive.insert(DATA_NUM, vec![n], data_num(tiles.iter().map(|t| t.count))?)?;
    archive.insert(
        LABEL_SEG,
        vec![n, capacity],
        ArrayData::U8(tiles.iter().flat_map(|t| t.label_seg.iter().copied()).collect()),
    )?;
    archive.insert(
        INDICES_SPLIT_TO_FULL,
        vec![n, capacity],
        ArrayData::U64(tiles.iter().flat_map(|t| t.indices.iter().copied()).collect()),
    )?;
    archive.insert(
        BLOCK_CENTER,
        vec![n, 3],
        ArrayData::F64(
            tiles
                .iter()
                .flat_map(|t| t.block_center.iter().copied())
                .collect(),
        ),
    )?;
    Ok(archive)
}

/// Splits the stacked arrays of `archive` back into tiles
pub fn tiles_from_archive(mut archive: Archive) -> Result<Vec<Tile>> {
    let (shape, data) = archive.take_f32(DATA)?;
    ensure!(shape.len() == 3, "Array '{}' must have 3 dimensions", DATA);
    let (n, capacity, num_features) = (shape[0], shape[1], shape[2]);

    let (shape, unnormalized_data) = archive.take_f32(UNNORMALIZED_DATA)?;
    check_shape(UNNORMALIZED_DATA, &shape, &[n, capacity, num_features])?;
    let (shape, counts) = archive.take_i32(DATA_NUM)?;
    check_shape(DATA_NUM, &shape, &[n])?;
    let counts = counts_from_data_num(counts, capacity)?;
    let (shape, labels) = archive.take_u8(LABEL_SEG)?;
    check_shape(LABEL_SEG, &shape, &[n, capacity])?;
    let (shape, indices) = archive.take_u64(INDICES_SPLIT_TO_FULL)?;
    check_shape(INDICES_SPLIT_TO_FULL, &shape, &[n, capacity])?;
    let (shape, centers) = archive.take_f64(BLOCK_CENTER)?;
    check_shape(BLOCK_CENTER, &shape, &[n, 3])?;

    let tile_values = capacity * num_features;
    (0..n)
        .map(|tile_idx| -> Result<Tile> {
            let values = tile_idx * tile_values..(tile_idx + 1) * tile_values;
            let slots = tile_idx * capacity..(tile_idx + 1) * capacity;
            Ok(Tile {
                data: Array2::from_shape_vec((capacity, num_features), data[values.clone()].to_vec())?,
                unnormalized_data: Array2::from_shape_vec(
                    (capacity, num_features),
                    unnormalized_data[values].to_vec(),
                )?,
                label_seg: labels[slots.clone()].to_vec(),
                indices: indices[slots].to_vec(),
                count: counts[tile_idx],
                block_center: Vector3::from_column_slice(&centers[tile_idx * 3..tile_idx * 3 + 3]),
            })
        })
        .collect()
}

/// Writes `tiles` to a new tile file at `path`
pub fn write_tiles<P: AsRef<Path>>(path: P, tiles: &[Tile]) -> Result<()> {
    write_archive_file(path, &tiles_to_archive(tiles)?)
}

/// Reads all tiles from the tile file at `path`
pub fn read_tiles<P: AsRef<Path>>(path: P) -> Result<Vec<Tile>> {
    let path = path.as_ref();
    tiles_from_archive(read_archive_file(path)?)
        .with_context(|| format!("Invalid tile file {}", path.display()))
}

pub fn predictions_to_archive(predictions: &[PredictionTile]) -> Result<Archive> {
    let (capacity, _) = common_shape(predictions.iter().map(|p| (p.predictions.len(), 0)))?;
    let n = predictions.len();

    let mut archive = Archive::new();
    archive.insert(
        DATA_NUM,
        vec![n],
        data_num(predictions.iter().map(|p| p.count))?,
    )?;
    archive.insert(
        LABEL_SEG,
        vec![n, capacity],
        ArrayData::U8(
            predictions
                .iter()
                .flat_map(|p| p.predictions.iter().map(|prediction| prediction.label))
                .collect(),
        ),
    )?;
    archive.insert(
        CONFIDENCE,
        vec![n, capacity],
        ArrayData::F32(
            predictions
                .iter()
                .flat_map(|p| p.predictions.iter().map(|prediction| prediction.confidence))
                .collect(),
        ),
    )?;
    archive.insert(
        INDICES_SPLIT_TO_FULL,
        vec![n, capacity],
        ArrayData::U64(
            predictions
                .iter()
                .flat_map(|p| p.indices.iter().copied())
                .collect(),
        ),
    )?;
    Ok(archive)
}

pub fn predictions_from_archive(mut archive: Archive) -> Result<Vec<PredictionTile>> {
    let (shape, labels) = archive.take_u8(LABEL_SEG)?;
    ensure!(shape.len() == 2, "Array '{}' must have 2 dimensions", LABEL_SEG);
    let (n, capacity) = (shape[0], shape[1]);

    let (shape, confidences) = archive.take_f32(CONFIDENCE)?;
    check_shape(CONFIDENCE, &shape, &[n, capacity])?;
    let (shape, counts) = archive.take_i32(DATA_NUM)?;
    check_shape(DATA_NUM, &shape, &[n])?;
    let counts = counts_from_data_num(counts, capacity)?;
    let (shape, indices) = archive.take_u64(INDICES_SPLIT_TO_FULL)?;
    check_shape(INDICES_SPLIT_TO_FULL, &shape, &[n, capacity])?;

    Ok((0..n)
        .map(|tile_idx| {
            let slots = tile_idx * capacity..(tile_idx + 1) * capacity;
            PredictionTile {
                predictions: labels[slots.clone()]
                    .iter()
                    .zip(&confidences[slots.clone()])
                    .map(|(label, confidence)| Prediction::new(*label, *confidence))
                    .collect(),
                indices: indices[slots].to_vec(),
                count: counts[tile_idx],
            }
        })
        .collect())
}

/// Writes `predictions` to a new prediction file at `path`
pub fn write_predictions<P: AsRef<Path>>(path: P, predictions: &[PredictionTile]) -> Result<()> {
    write_archive_file(path, &predictions_to_archive(predictions)?)
}

pub fn read_predictions<P: AsRef<Path>>(path: P) -> Result<Vec<PredictionTile>> {
    let path = path.as_ref();
    predictions_from_archive(read_archive_file(path)?)
        .with_context(|| format!("Invalid prediction file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use scopeguard::defer;

    use super::*;

    fn random_tiles(count: usize, capacity: usize, num_features: usize) -> Result<Vec<Tile>> {
        let mut rng = StdRng::seed_from_u64(7);
        (0..count)
            .map(|tile_idx| -> Result<Tile> {
                let mut tile = Tile::new(
                    capacity,
                    num_features,
                    Vector3::new(tile_idx as f64, 2.0, -1.0),
                );
                for _ in 0..rng.gen_range(1..=capacity) {
                    let features = (0..num_features).map(|_| rng.gen()).collect::<Vec<f32>>();
                    let unnormalized = features.iter().map(|f| f + 100.0).collect::<Vec<_>>();
                    tile.push(rng.gen_range(0..1000), rng.gen_range(0..5), &features, &unnormalized)?;
                }
                Ok(tile)
            })
            .collect()
    }

    #[test]
    fn test_tile_file_io() -> Result<()> {
        let path = std::env::temp_dir().join("ptiles_test_tile_file_io.ptile");
        defer! {
            std::fs::remove_file(&path).expect("Could not remove test file");
        }
        let tiles = random_tiles(5, 16, 4)?;
        write_tiles(&path, &tiles)?;
        let read = read_tiles(&path)?;
        assert_eq!(read, tiles);
        Ok(())
    }

    #[test]
    fn test_mixed_tile_shapes_are_rejected() -> Result<()> {
        let mut tiles = random_tiles(1, 16, 4)?;
        tiles.extend(random_tiles(1, 8, 4)?);
        assert!(tiles_to_archive(&tiles).is_err());
        Ok(())
    }

    #[test]
    fn test_count_beyond_capacity_is_rejected() -> Result<()> {
        let mut archive = tiles_to_archive(&random_tiles(2, 4, 3)?)?;
        archive.take(DATA_NUM)?;
        archive.insert(DATA_NUM, vec![2], ArrayData::I32(vec![1, 5]))?;
        assert!(tiles_from_archive(archive).is_err());
        Ok(())
    }

    #[test]
    fn test_prediction_archive() -> Result<()> {
        let tile = &random_tiles(1, 4, 3)?[0];
        let mut predictions = PredictionTile::for_tile(tile);
        predictions.predictions[0] = Prediction::new(2, 0.75);

        let parsed = predictions_from_archive(predictions_to_archive(&[predictions.clone()])?)?;
        assert_eq!(parsed, vec![predictions]);
        Ok(())
    }
}
