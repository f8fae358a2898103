use anyhow::{bail, ensure, Result};
use nalgebra::Vector3;
use ndarray::Array2;

use crate::classes::LABEL_PADDING;

/// Fixed-capacity buffer of points that forms one training or inference unit. Slots at and beyond `count`
/// are padding: zero features, `LABEL_PADDING` labels and a zero index
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    /// Features of all slots, positions relative to the block bottom center
    pub data: Array2<f32>,
    /// Features of all slots with positions in source coordinates
    pub unnormalized_data: Array2<f32>,
    pub label_seg: Vec<u8>,
    /// Global index of the source point of each slot
    pub indices: Vec<u64>,
    pub count: usize,
    pub block_center: Vector3<f64>,
}

impl Tile {
    pub fn new(max_point: usize, num_features: usize, block_center: Vector3<f64>) -> Self {
        Self {
            data: Array2::zeros((max_point, num_features)),
            unnormalized_data: Array2::zeros((max_point, num_features)),
            label_seg: vec![LABEL_PADDING; max_point],
            indices: vec![0; max_point],
            count: 0,
            block_center,
        }
    }

    /// Maximum number of points this tile can hold
    pub fn capacity(&self) -> usize {
        self.label_seg.len()
    }

    pub fn num_features(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    /// Appends one point to this tile
    pub fn push(
        &mut self,
        index: u64,
        label: u8,
        features: &[f32],
        unnormalized_features: &[f32],
    ) -> Result<()> {
        if self.is_full() {
            bail!("Tile is full ({} points)", self.capacity());
        }
        ensure!(
            features.len() == self.num_features() && unnormalized_features.len() == self.num_features(),
            "Expected {} features per point",
            self.num_features()
        );
        let slot = self.count;
        for (dst, src) in self.data.row_mut(slot).iter_mut().zip(features) {
            *dst = *src;
        }
        for (dst, src) in self
            .unnormalized_data
            .row_mut(slot)
            .iter_mut()
            .zip(unnormalized_features)
        {
            *dst = *src;
        }
        self.label_seg[slot] = label;
        self.indices[slot] = index;
        self.count += 1;
        Ok(())
    }

    /// Global indices of all real (non-padding) points
    pub fn valid_indices(&self) -> &[u64] {
        &self.indices[..self.count]
    }

    pub fn valid_labels(&self) -> &[u8] {
        &self.label_seg[..self.count]
    }

    /// Returns true if every real point of this tile carries the `background` label
    pub fn is_background_only(&self, background: u8) -> bool {
        self.valid_labels().iter().all(|label| *label == background)
    }
}

/// The best class vote for a single point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: u8,
    pub confidence: f32,
}

impl Prediction {
    /// Placeholder for a point that has not received any vote yet
    pub const NONE: Prediction = Prediction {
        label: LABEL_PADDING,
        confidence: 0.0,
    };

    pub fn new(label: u8, confidence: f32) -> Self {
        Self { label, confidence }
    }

    pub fn is_none(&self) -> bool {
        self.label == LABEL_PADDING
    }

    /// Returns true if this prediction should replace `other`. A prediction wins on strictly greater
    /// confidence; on equal confidence the lower label wins, so that the outcome of fusing several votes
    /// does not depend on their order
    /// ```
    /// # use ptiles_core::tile::Prediction;
    /// assert!(Prediction::new(3, 0.9).beats(&Prediction::new(1, 0.6)));
    /// assert!(!Prediction::new(3, 0.6).beats(&Prediction::new(1, 0.6)));
    /// assert!(Prediction::new(0, 0.6).beats(&Prediction::new(1, 0.6)));
    /// ```
    pub fn beats(&self, other: &Prediction) -> bool {
        self.confidence > other.confidence
            || (self.confidence == other.confidence && self.label < other.label)
    }
}

impl Default for Prediction {
    fn default() -> Self {
        Prediction::NONE
    }
}

/// Per-slot predictions of one tile together with the tile's index map
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionTile {
    pub predictions: Vec<Prediction>,
    pub indices: Vec<u64>,
    pub count: usize,
}

impl PredictionTile {
    /// Creates a `PredictionTile` for `tile` with no votes yet
    pub fn for_tile(tile: &Tile) -> Self {
        Self {
            predictions: vec![Prediction::NONE; tile.capacity()],
            indices: tile.indices.clone(),
            count: tile.count,
        }
    }

    /// Iterates over `(global index, prediction)` for all real slots
    pub fn valid_predictions(&self) -> impl Iterator<Item = (u64, &Prediction)> + '_ {
        self.indices[..self.count]
            .iter()
            .copied()
            .zip(self.predictions[..self.count].iter())
    }
}
