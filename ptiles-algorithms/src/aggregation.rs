use anyhow::{bail, ensure, Result};
use log::warn;
use ptiles_core::{
    classes::{ClassMap, LABEL_PADDING},
    ndarray::{s, Array3, ArrayView3},
    tile::{Prediction, PredictionTile, Tile},
};
use rand::{seq::SliceRandom, Rng};
use rayon::prelude::*;

/// A semantic segmentation model that maps a batch of points to per-point class probabilities
pub trait SegmentationModel {
    /// Runs the model on a batch of shape `[N, P, F]` (samples, points per sample, features per point) and
    /// returns class probabilities of shape `[N, P, C]`
    fn infer(&self, batch: ArrayView3<f32>) -> Result<Array3<f32>>;
}

/// Number of samples of `sample_point_num` points that are needed to cover all `count` points of a tile
pub fn default_repeats(count: usize, sample_point_num: usize) -> usize {
    ((count + sample_point_num - 1) / sample_point_num).max(1)
}

/// Draws `sample_point_num * repeats` slot indices from `0..count`. The indices are repeated as often as
/// necessary to fill all slots, truncated, and then shuffled. If the slots are at least `count`, every index
/// is drawn at least once
pub fn sample_indices<R: Rng + ?Sized>(
    count: usize,
    sample_point_num: usize,
    repeats: usize,
    rng: &mut R,
) -> Vec<usize> {
    if count == 0 {
        return vec![];
    }
    let total = sample_point_num * repeats;
    let mut samples = (0..count).cycle().take(total).collect::<Vec<_>>();
    samples.shuffle(rng);
    samples
}

/// Index and value of the largest probability. NaN values never win
fn arg_max<'a, I: IntoIterator<Item = &'a f32>>(probabilities: I) -> Option<(usize, f32)> {
    probabilities
        .into_iter()
        .copied()
        .enumerate()
        .fold(None, |best, (idx, p)| match best {
            Some((_, best_p)) if !(p > best_p) => best,
            _ if p.is_nan() => best,
            _ => Some((idx, p)),
        })
}

/// Predicts the labels of all points in `tile`. The model sees `repeats` samples of `sample_point_num`
/// points (see `sample_indices`), and every point keeps the most confident prediction over all samples it
/// appeared in. Points that were never sampled keep `Prediction::NONE`
pub fn predict_tile<M: SegmentationModel + ?Sized, R: Rng + ?Sized>(
    tile: &Tile,
    model: &M,
    sample_point_num: usize,
    repeats: Option<usize>,
    rng: &mut R,
) -> Result<PredictionTile> {
    ensure!(sample_point_num > 0, "Sample size must not be zero");
    let mut predictions = PredictionTile::for_tile(tile);
    if tile.count == 0 {
        return Ok(predictions);
    }
    let repeats = repeats.unwrap_or_else(|| default_repeats(tile.count, sample_point_num));
    let samples = sample_indices(tile.count, sample_point_num, repeats, rng);

    let num_features = tile.num_features();
    let mut batch = Array3::<f32>::zeros((repeats, sample_point_num, num_features));
    for (sample_idx, slot) in samples.iter().enumerate() {
        batch
            .slice_mut(s![sample_idx / sample_point_num, sample_idx % sample_point_num, ..])
            .assign(&tile.data.row(*slot));
    }

    let probabilities = model.infer(batch.view())?;
    let shape = probabilities.shape();
    if shape[0] != repeats || shape[1] != sample_point_num {
        bail!(
            "Model returned probabilities of shape {:?} for a batch of shape {:?}",
            shape,
            batch.shape()
        );
    }
    if shape[2] == 0 || shape[2] > LABEL_PADDING as usize {
        bail!("Model returned {} classes", shape[2]);
    }

    for (sample_idx, slot) in samples.iter().enumerate() {
        let point_probabilities =
            probabilities.slice(s![sample_idx / sample_point_num, sample_idx % sample_point_num, ..]);
        if let Some((label, confidence)) = arg_max(point_probabilities.iter()) {
            let prediction = Prediction::new(label as u8, confidence);
            if prediction.beats(&predictions.predictions[*slot]) {
                predictions.predictions[*slot] = prediction;
            }
        }
    }
    Ok(predictions)
}

/// The best prediction for every point of one source cloud, indexed by the global point index. The
/// accumulator grows to `1 + <largest index seen>`. Fusing is commutative, associative and idempotent: a
/// stored prediction is only replaced by one that `beats` it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeAccumulator {
    predictions: Vec<Prediction>,
}

impl MergeAccumulator {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    /// Returns the prediction for the point at `index`. Points that no tile covered get `Prediction::NONE`
    pub fn get(&self, index: usize) -> Prediction {
        self.predictions
            .get(index)
            .copied()
            .unwrap_or(Prediction::NONE)
    }

    fn grow_to(&mut self, len: usize) {
        if self.predictions.len() < len {
            self.predictions.resize(len, Prediction::NONE);
        }
    }

    /// Fuses a single prediction for the point at `index`
    pub fn fuse(&mut self, index: usize, prediction: Prediction) {
        self.grow_to(index + 1);
        if prediction.beats(&self.predictions[index]) {
            self.predictions[index] = prediction;
        }
    }

    /// Fuses the predictions of all valid slots of `tile`
    pub fn fuse_tile(&mut self, tile: &PredictionTile) {
        for (index, prediction) in tile.valid_predictions() {
            self.fuse(index as usize, *prediction);
        }
    }

    /// Combines two partial accumulators into one
    pub fn combine(mut self, other: MergeAccumulator) -> MergeAccumulator {
        if other.len() > self.len() {
            return other.combine(self);
        }
        for (own, theirs) in self.predictions.iter_mut().zip(other.predictions) {
            if theirs.beats(own) {
                *own = theirs;
            }
        }
        self
    }

    /// Number of points that received a prediction
    pub fn covered(&self) -> usize {
        self.predictions.iter().filter(|p| !p.is_none()).count()
    }

    /// Predicted label indices for a cloud of `num_points` points, `LABEL_PADDING` for uncovered points
    pub fn labels(&self, num_points: usize) -> Result<Vec<u8>> {
        ensure!(
            self.len() <= num_points,
            "Predictions reference point {} but the cloud has only {} points",
            self.len() - 1,
            num_points
        );
        Ok((0..num_points).map(|index| self.get(index).label).collect())
    }

    /// Raw classification codes for a cloud of `num_points` points. Uncovered points and labels outside of
    /// `classes` get `unclassified_code`
    pub fn classification_codes(
        &self,
        num_points: usize,
        classes: &ClassMap,
        unclassified_code: u8,
    ) -> Result<Vec<u8>> {
        let mut unknown_labels = 0;
        let codes = self
            .labels(num_points)?
            .into_iter()
            .map(|label| {
                if label == LABEL_PADDING {
                    return unclassified_code;
                }
                classes.code_of(label).unwrap_or_else(|| {
                    unknown_labels += 1;
                    unclassified_code
                })
            })
            .collect();
        if unknown_labels > 0 {
            warn!(
                "{} points were predicted with labels outside of the class map",
                unknown_labels
            );
        }
        Ok(codes)
    }
}

/// Fuses all `tiles` into one accumulator, in parallel
pub fn fuse_parallel(tiles: &[PredictionTile]) -> MergeAccumulator {
    tiles
        .par_iter()
        .fold(MergeAccumulator::new, |mut accumulator, tile| {
            accumulator.fuse_tile(tile);
            accumulator
        })
        .reduce(MergeAccumulator::new, MergeAccumulator::combine)
}
