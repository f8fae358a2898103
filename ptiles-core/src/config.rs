use std::{collections::HashSet, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    classes::ClassMap,
    cloud::{ExtraFeature, FeatureSchema},
    error::PipelineError,
    grid::OffsetPass,
};

/// Column layout of delimited text point clouds, see `ptiles_io::ascii` for the format literals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceFormat {
    pub format: String,
    pub delimiter: String,
    /// Extension of source files, without the leading dot
    pub extension: String,
}

impl Default for SourceFormat {
    fn default() -> Self {
        Self {
            format: "xyzic".into(),
            delimiter: " ".into(),
            extension: "txt".into(),
        }
    }
}

/// Parameters of the tiling export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Horizontal edge length of a block
    pub block_size: f64,
    /// Capacity of a tile
    pub max_point: usize,
    /// Edge length of the sub-cells used for density resampling
    pub grid_size: f64,
    /// Number of tiles per batch file
    pub batch_size: usize,
    pub classes: ClassMap,
    /// Label index of the background class. Tiles holding only this label are dropped
    pub background_label: u8,
    pub extra_features: FeatureSchema,
    pub passes: Vec<OffsetPass>,
    pub seed: u64,
    pub source: SourceFormat,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            block_size: 10.0,
            max_point: 8192,
            grid_size: 0.25,
            batch_size: 256,
            classes: ClassMap::default(),
            background_label: 0,
            extra_features: FeatureSchema::new(vec![ExtraFeature::new("intensity", 65535.0)]),
            passes: OffsetPass::ALL.to_vec(),
            seed: 0,
            source: SourceFormat::default(),
        }
    }
}

impl ExportConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Blocks with fewer points than this are merged into a neighboring block
    pub fn merge_threshold(&self) -> usize {
        self.max_point / 10
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(PipelineError::InvalidConfig(msg).into()) };
        if !(self.block_size.is_finite() && self.block_size > 0.0) {
            return invalid(format!("block_size must be positive, but was {}", self.block_size));
        }
        if !(self.grid_size.is_finite() && self.grid_size > 0.0) {
            return invalid(format!("grid_size must be positive, but was {}", self.grid_size));
        }
        if self.max_point == 0 {
            return invalid("max_point must not be zero".into());
        }
        if self.batch_size == 0 {
            return invalid("batch_size must not be zero".into());
        }
        if self.background_label as usize >= self.classes.num_classes() {
            return invalid(format!(
                "background_label {} is out of range for {} classes",
                self.background_label,
                self.classes.num_classes()
            ));
        }
        if self.passes.is_empty() {
            return invalid("At least one offset pass is required".into());
        }
        let mut seen = HashSet::new();
        if let Some(pass) = self.passes.iter().find(|pass| !seen.insert(**pass)) {
            return invalid(format!("Offset pass {} is listed more than once", pass));
        }
        Ok(())
    }
}

/// Parameters for running the model over tiles and for writing the re-assembled clouds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Number of points the model consumes per sample
    pub sample_point_num: usize,
    /// Number of samples drawn from one tile. If unset, enough samples are drawn to see every point of the
    /// tile at least once
    pub repeats: Option<usize>,
    /// Classification code written for points no retained tile covered
    pub unclassified_code: u8,
    pub seed: u64,
    pub source: SourceFormat,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            sample_point_num: 2048,
            repeats: None,
            unclassified_code: 1,
            seed: 0,
            source: SourceFormat::default(),
        }
    }
}

impl InferenceConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_point_num == 0 {
            return Err(
                PipelineError::InvalidConfig("sample_point_num must not be zero".into()).into(),
            );
        }
        if self.repeats == Some(0) {
            return Err(PipelineError::InvalidConfig("repeats must not be zero".into()).into());
        }
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)
        .with_context(|| format!("Could not open configuration file {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Could not parse configuration file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() -> Result<()> {
        let config: ExportConfig =
            serde_json::from_str(r#"{ "block_size": 5.0, "classes": [1, 2, 6], "passes": ["half"] }"#)?;
        config.validate()?;
        assert_eq!(config.block_size, 5.0);
        assert_eq!(config.max_point, 8192);
        assert_eq!(config.merge_threshold(), 819);
        assert_eq!(config.passes, vec![OffsetPass::Half]);
        assert_eq!(config.classes.num_classes(), 3);
        Ok(())
    }

    #[test]
    fn test_validate_rejects_background_out_of_range() -> Result<()> {
        let config = ExportConfig {
            classes: ClassMap::new(vec![1, 2])?,
            background_label: 2,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.downcast_ref::<PipelineError>().is_some());
        Ok(())
    }

    #[test]
    fn test_validate_rejects_repeated_passes() -> Result<()> {
        let config: ExportConfig = serde_json::from_str(r#"{ "passes": ["zero", "half", "zero"] }"#)?;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidConfig(_))
        ));
        Ok(())
    }

    #[test]
    fn test_inference_defaults() {
        let config = InferenceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.repeats, None);
    }
}
