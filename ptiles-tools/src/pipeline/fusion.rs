use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{error, info, warn};
use ptiles_algorithms::{aggregation::fuse_parallel, metrics::ConfusionCounts};
use ptiles_core::{
    classes::{ClassMap, LABEL_PADDING},
    cloud::FeatureSchema,
    config::InferenceConfig,
    util::CancellationToken,
};
use ptiles_io::{
    ascii::{output_format, read_cloud, write_cloud},
    dataset::{find_source_file, Dataset},
};

/// Classes and features of the tiles in a dataset, which are needed to interpret predictions
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetClasses {
    pub classes: ClassMap,
    pub extra_features: FeatureSchema,
}

impl DatasetClasses {
    /// Takes classes and features from the metadata of a segregated dataset, or from `fallback` for a
    /// batched one
    pub fn of(dataset: &Dataset, fallback: &DatasetClasses) -> Self {
        match dataset {
            Dataset::Segregated { metadata, .. } => Self {
                classes: metadata.classes.clone(),
                extra_features: metadata.extra_features.clone(),
            },
            Dataset::Batched { .. } => fallback.clone(),
        }
    }
}

/// Outcome of `fuse_dataset`
#[derive(Debug, Clone, PartialEq)]
pub struct FusionSummary {
    /// Labeled clouds that were written
    pub written: Vec<PathBuf>,
    /// Sources that failed and were skipped
    pub failed: Vec<String>,
    pub cancelled: bool,
    /// Predicted against ground truth labels over all written clouds
    pub counts: ConfusionCounts,
}

/// Fuses all predictions of `source` and writes the labeled cloud to `output_dir`. Returns the path of the
/// written cloud and the confusion counts against the classification stored in the source cloud
pub fn fuse_source(
    dataset: &Dataset,
    source: &str,
    source_dir: &Path,
    output_dir: &Path,
    classes: &DatasetClasses,
    config: &InferenceConfig,
) -> Result<(PathBuf, ConfusionCounts)> {
    let predictions = dataset.load_predictions(source)?;
    if predictions.is_empty() {
        warn!("{}: no predictions found, all points stay unclassified", source);
    }
    let accumulator = fuse_parallel(&predictions);

    let source_path = find_source_file(source_dir, source, &config.source.extension)?;
    let cloud = read_cloud(&source_path, &config.source, &classes.extra_features)?;
    let codes = accumulator
        .classification_codes(cloud.len(), &classes.classes, config.unclassified_code)
        .with_context(|| format!("Predictions do not match source cloud {}", source))?;
    let file_name = source_path
        .file_name()
        .with_context(|| format!("Invalid source file name {}", source_path.display()))?;
    let output_path = output_dir.join(file_name);
    write_cloud(&output_path, &cloud, &codes, &config.source.delimiter)?;

    let truth = cloud
        .classifications()
        .iter()
        .map(|code| classes.classes.label_of(*code).unwrap_or(LABEL_PADDING))
        .collect::<Vec<_>>();
    let mut counts = ConfusionCounts::new(classes.classes.num_classes());
    counts.accumulate(&accumulator.labels(cloud.len())?, &truth)?;

    info!(
        "{}: {} of {} points covered by predictions, written to {}",
        source,
        accumulator.covered(),
        cloud.len(),
        output_path.display()
    );
    Ok((output_path, counts))
}

/// Re-assembles the predictions of all sources in `dataset` into labeled clouds in `output_dir`. The
/// source clouds are read from `source_dir`. Output columns are given by `output_format`
pub fn fuse_dataset<P: AsRef<Path>, Q: AsRef<Path>>(
    dataset: &Dataset,
    source_dir: P,
    output_dir: Q,
    classes: &DatasetClasses,
    config: &InferenceConfig,
    cancel: &CancellationToken,
) -> Result<FusionSummary> {
    config.validate()?;
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Could not create output directory {}", output_dir.display()))?;
    info!(
        "Writing labeled clouds with columns '{}'",
        output_format(&classes.extra_features)
    );

    let mut summary = FusionSummary {
        written: vec![],
        failed: vec![],
        cancelled: false,
        counts: ConfusionCounts::new(classes.classes.num_classes()),
    };
    for source in dataset.sources() {
        if cancel.is_cancelled() {
            warn!("Fusion was cancelled before {}", source);
            summary.cancelled = true;
            break;
        }
        match fuse_source(
            dataset,
            &source,
            source_dir.as_ref(),
            output_dir,
            classes,
            config,
        ) {
            Ok((path, counts)) => {
                summary.written.push(path);
                summary.counts.merge(&counts);
            }
            Err(why) => {
                error!("Skipping {}: {:?}", source, why);
                summary.failed.push(source);
            }
        }
    }
    Ok(summary)
}
