use std::{fmt::Display, str::FromStr};

use anyhow::{anyhow, Result};
use nalgebra::{Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::{error::PipelineError, math::AABB};

/// Smallest vertical block extent. Planar clouds have a z-range of zero, which would otherwise produce
/// degenerate blocks
pub const MIN_Z_EXTENT: f64 = 1.0;

/// Integer coordinate of a block in the horizontal grid. Keys are ordered by `x`, then `y`, which is the scan
/// order used when merging blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockKey {
    pub x: i64,
    pub y: i64,
}

impl BlockKey {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Returns the key of the block that is `dx` blocks in x and `dy` blocks in y away from this one
    pub fn neighbor(&self, dx: i64, dy: i64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl Display for BlockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One of the two grid partitionings of a source cloud. Both cover the same points but with block boundaries
/// shifted by half a block in x, so every point is seen by two independent tiles during inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetPass {
    Zero,
    Half,
}

impl OffsetPass {
    pub const ALL: [OffsetPass; 2] = [OffsetPass::Zero, OffsetPass::Half];

    /// Shift that is added to the horizontal position of every point before computing its block key
    pub fn origin_shift(&self, block_size: f64) -> Vector2<f64> {
        match self {
            OffsetPass::Zero => Vector2::zeros(),
            OffsetPass::Half => Vector2::new(block_size / 2.0, 0.0),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OffsetPass::Zero => "zero",
            OffsetPass::Half => "half",
        }
    }
}

impl Display for OffsetPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OffsetPass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zero" => Ok(OffsetPass::Zero),
            "half" => Ok(OffsetPass::Half),
            _ => Err(anyhow!("Unknown offset pass '{}'", s)),
        }
    }
}

/// Block grid of one source cloud. The grid origin is the minimum of the cloud's bounds. Blocks are columns:
/// keys only depend on x and y, and the vertical extent is reported for logging but never splits a block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    block_size: f64,
    origin: Point3<f64>,
    z_extent: f64,
}

impl GridSpec {
    /// Creates the grid for a cloud with the given `bounds`. The vertical block extent is twice the z-range of
    /// the cloud, but never less than `MIN_Z_EXTENT`
    /// ```
    /// # use ptiles_core::{grid::*, math::AABB};
    /// # use nalgebra::Point3;
    /// let planar = AABB::from_min_max(Point3::new(0.0, 0.0, 4.0), Point3::new(30.0, 30.0, 4.0));
    /// let grid = GridSpec::new(10.0, &planar).unwrap();
    /// assert_eq!(grid.block_extent().z, MIN_Z_EXTENT);
    /// ```
    pub fn new(block_size: f64, bounds: &AABB<f64>) -> Result<Self> {
        if !(block_size.is_finite() && block_size > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "Block size must be a positive number, but was {}",
                block_size
            ))
            .into());
        }
        let z_range = bounds.extent().z;
        Ok(Self {
            block_size,
            origin: *bounds.min(),
            z_extent: f64::max(2.0 * z_range, MIN_Z_EXTENT),
        })
    }

    pub fn block_size(&self) -> f64 {
        self.block_size
    }

    pub fn origin(&self) -> &Point3<f64> {
        &self.origin
    }

    /// Size of a single block in all three dimensions. The z component is informational, every block spans
    /// the full height of the cloud
    pub fn block_extent(&self) -> Vector3<f64> {
        Vector3::new(self.block_size, self.block_size, self.z_extent)
    }

    /// Computes the key of the block that contains `position` in the given `pass`. The z coordinate is
    /// ignored
    pub fn key_of(&self, position: &Vector3<f64>, pass: OffsetPass) -> BlockKey {
        let shift = pass.origin_shift(self.block_size);
        let local_x = position.x - self.origin.x + shift.x;
        let local_y = position.y - self.origin.y + shift.y;
        BlockKey::new(
            (local_x / self.block_size).floor() as i64,
            (local_y / self.block_size).floor() as i64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_of_in_both_passes() -> Result<()> {
        let bounds = AABB::from_min_max(Point3::new(100.0, 200.0, 0.0), Point3::new(130.0, 230.0, 5.0));
        let grid = GridSpec::new(10.0, &bounds)?;
        let position = Vector3::new(107.0, 219.0, 1.0);
        assert_eq!(grid.key_of(&position, OffsetPass::Zero), BlockKey::new(0, 1));
        assert_eq!(grid.key_of(&position, OffsetPass::Half), BlockKey::new(1, 1));
        assert_eq!(grid.block_extent(), Vector3::new(10.0, 10.0, 10.0));
        Ok(())
    }

    #[test]
    fn test_key_ignores_height() -> Result<()> {
        let bounds = AABB::from_min_max(Point3::new(0.0, 0.0, 0.0), Point3::new(20.0, 20.0, 1.0));
        let grid = GridSpec::new(10.0, &bounds)?;
        let low = Vector3::new(5.0, 5.0, 0.0);
        let high = Vector3::new(5.0, 5.0, 100.0 * grid.block_extent().z);
        for pass in OffsetPass::ALL {
            assert_eq!(grid.key_of(&low, pass), grid.key_of(&high, pass));
        }
        Ok(())
    }

    #[test]
    fn test_invalid_block_size() {
        let bounds = AABB::from_min_max(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        assert!(GridSpec::new(0.0, &bounds).is_err());
        assert!(GridSpec::new(f64::NAN, &bounds).is_err());
    }

    #[test]
    fn test_offset_pass_names() -> Result<()> {
        for pass in OffsetPass::ALL {
            assert_eq!(pass.to_string().parse::<OffsetPass>()?, pass);
        }
        assert!("quarter".parse::<OffsetPass>().is_err());
        Ok(())
    }
}
