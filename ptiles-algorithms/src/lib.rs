#![warn(clippy::all)]
//! Algorithms that turn a point cloud into tiles and tile predictions back into a labeled point cloud.
//!
//! Export runs [partition](crate::partition) → [merge](crate::merge) → [resample](crate::resample) →
//! [batching](crate::batching) → [segregation](crate::segregation) per source cloud and `OffsetPass`. The way
//! back is covered by [aggregation](crate::aggregation), and [metrics](crate::metrics) scores the result
//! against the ground truth.

// Prediction of tiles through a segmentation model and confidence-based fusion of overlapping predictions.
pub mod aggregation;
// Cutting blocks into fixed-size tiles and writing them in batches.
pub mod batching;
// Merging blocks that hold too few points into one of their neighbors.
pub mod merge;
// Precision, recall and F1 score per class.
pub mod metrics;
// Grouping points into the blocks of a horizontal grid.
pub mod partition;
// Density equalization within a block.
pub mod resample;
// Dropping tiles that only hold background points.
pub mod segregation;

#[cfg(test)]
pub(crate) mod test_utils;
