use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use anyhow::{anyhow, Context, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    classes::ClassMap,
    cloud::FeatureSchema,
    config::ExportConfig,
    grid::OffsetPass,
};

/// Identifier of a single tile within one source file. Displayed as `<pass>_<number>`, e.g. `half_000017`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub pass: OffsetPass,
    pub number: u32,
}

impl TileId {
    pub fn new(pass: OffsetPass, number: u32) -> Self {
        Self { pass, number }
    }
}

impl Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{:06}", self.pass, self.number)
    }
}

impl FromStr for TileId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (pass, number) = s
            .split_once('_')
            .ok_or_else(|| anyhow!("Tile id '{}' is not of the form <pass>_<number>", s))?;
        Ok(Self {
            pass: pass.parse()?,
            number: number
                .parse()
                .with_context(|| format!("Invalid tile number in tile id '{}'", s))?,
        })
    }
}

impl Serialize for TileId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TileId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let id = String::deserialize(deserializer)?;
        id.parse().map_err(serde::de::Error::custom)
    }
}

/// The retained tiles of one source file, as parallel lists of tile ids and block centers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileTiles {
    pub idxs: Vec<TileId>,
    pub block_center: Vec<[f64; 3]>,
}

impl FileTiles {
    pub fn push(&mut self, id: TileId, block_center: &Vector3<f64>) {
        self.idxs.push(id);
        self.block_center
            .push([block_center.x, block_center.y, block_center.z]);
    }

    pub fn len(&self) -> usize {
        self.idxs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idxs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileId, Vector3<f64>)> + '_ {
        self.idxs
            .iter()
            .zip(self.block_center.iter())
            .map(|(id, center)| (*id, Vector3::new(center[0], center[1], center[2])))
    }
}

/// Index of all retained tiles of an exported dataset, keyed by source file name. This is the only way
/// tiles are addressed when predictions are re-assembled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub files: BTreeMap<String, FileTiles>,
    pub num_classes: usize,
    pub classes: ClassMap,
    pub max_point: usize,
    pub num_extra_dim: usize,
    pub extra_features: FeatureSchema,
    pub block_size: f64,
}

impl DatasetMetadata {
    /// Creates empty metadata describing tiles exported with `config`
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            files: BTreeMap::new(),
            num_classes: config.classes.num_classes(),
            classes: config.classes.clone(),
            max_point: config.max_point,
            num_extra_dim: config.extra_features.len(),
            extra_features: config.extra_features.clone(),
            block_size: config.block_size,
        }
    }

    /// Total number of retained tiles over all source files
    pub fn tile_count(&self) -> usize {
        self.files.values().map(FileTiles::len).sum()
    }
}
