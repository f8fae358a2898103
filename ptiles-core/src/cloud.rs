use anyhow::{bail, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::math::AABB;

/// An extra per-point scalar feature (e.g. intensity or return number) that is fed into the model next
/// to the position. Values are normalized linearly by dividing through the declared `max`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraFeature {
    pub name: String,
    pub max: f32,
}

impl ExtraFeature {
    pub fn new<S: Into<String>>(name: S, max: f32) -> Self {
        Self {
            name: name.into(),
            max,
        }
    }

    /// Normalizes `value` into roughly `[0; 1]`. A declared maximum of zero leaves the value untouched
    /// ```
    /// # use ptiles_core::cloud::ExtraFeature;
    /// let intensity = ExtraFeature::new("intensity", 200.0);
    /// assert_eq!(intensity.normalize(50.0), 0.25);
    /// ```
    pub fn normalize(&self, value: f32) -> f32 {
        if self.max == 0.0 {
            value
        } else {
            value / self.max
        }
    }
}

/// Ordered set of the extra features carried by every point. The order of this schema is the order of the
/// feature columns in a tile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    features: Vec<ExtraFeature>,
}

impl FeatureSchema {
    pub fn new(features: Vec<ExtraFeature>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtraFeature> {
        self.features.iter()
    }

    pub fn get(&self, feature: usize) -> Option<&ExtraFeature> {
        self.features.get(feature)
    }

    /// Returns the column index of the feature with the given `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f.name == name)
    }

    /// Number of values per point in a tile: the position followed by all extra features
    pub fn tile_feature_count(&self) -> usize {
        3 + self.features.len()
    }
}

/// A whole source point cloud in memory. Points are stored attribute-by-attribute and addressed by their
/// index, which is the permanent identity of a point throughout tiling and re-assembly. A `PointCloud` is
/// never mutated once it has been read
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    positions: Vec<Vector3<f64>>,
    classifications: Vec<u8>,
    extra: Vec<Vec<f32>>,
    schema: FeatureSchema,
}

impl PointCloud {
    pub fn new(schema: FeatureSchema) -> Self {
        Self::with_capacity(0, schema)
    }

    pub fn with_capacity(capacity: usize, schema: FeatureSchema) -> Self {
        let extra = (0..schema.len())
            .map(|_| Vec::with_capacity(capacity))
            .collect();
        Self {
            positions: Vec::with_capacity(capacity),
            classifications: Vec::with_capacity(capacity),
            extra,
            schema,
        }
    }

    /// Appends a point. `extra` must hold one raw value per feature of the schema, in schema order
    pub fn push(&mut self, position: Vector3<f64>, classification: u8, extra: &[f32]) -> Result<()> {
        if extra.len() != self.schema.len() {
            bail!(
                "Point has {} extra feature values, but the feature schema declares {}",
                extra.len(),
                self.schema.len()
            );
        }
        self.positions.push(position);
        self.classifications.push(classification);
        for (column, value) in self.extra.iter_mut().zip(extra) {
            column.push(*value);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    pub fn position(&self, index: usize) -> &Vector3<f64> {
        &self.positions[index]
    }

    pub fn classifications(&self) -> &[u8] {
        &self.classifications
    }

    pub fn classification(&self, index: usize) -> u8 {
        self.classifications[index]
    }

    /// Raw value of the extra `feature` of the point at `index`
    pub fn extra(&self, index: usize, feature: usize) -> f32 {
        self.extra[feature][index]
    }

    pub fn bounds(&self) -> Option<AABB<f64>> {
        AABB::from_positions(self.positions.iter())
    }

    /// Writes the tile feature vector of the point at `index` into `out`: the position relative to `origin`,
    /// followed by all normalized extra features. `out` must hold `schema().tile_feature_count()` values
    pub fn write_features(&self, index: usize, origin: &Vector3<f64>, out: &mut [f32]) {
        let local = self.positions[index] - origin;
        out[0] = local.x as f32;
        out[1] = local.y as f32;
        out[2] = local.z as f32;
        for (feature_idx, feature) in self.schema.iter().enumerate() {
            out[3 + feature_idx] = feature.normalize(self.extra[feature_idx][index]);
        }
    }
}
