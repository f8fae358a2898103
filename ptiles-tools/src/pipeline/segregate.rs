use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use ptiles_algorithms::segregation::segregate_tiles;
use ptiles_core::{
    config::ExportConfig,
    grid::OffsetPass,
    meta::{DatasetMetadata, FileTiles},
    util::CancellationToken,
};
use ptiles_io::{
    dataset::{ensure_output_empty, tile_file_name, write_metadata, BatchFile, Dataset},
    tiles::{read_tiles, write_tiles},
};

use super::export::{export_directory, remove_files, BatchSummary};

/// Outcome of `segregate_dataset`
#[derive(Debug, Clone, PartialEq)]
pub struct SegregationSummary {
    pub metadata: DatasetMetadata,
    /// Number of background-only tiles that were dropped
    pub dropped: usize,
    /// Sources whose batch files could not be read
    pub failed: Vec<String>,
}

impl SegregationSummary {
    pub fn retained(&self) -> usize {
        self.metadata.tile_count()
    }
}

/// Writes one file per retained tile of `source` to `output_dir`, reading the batch files one at a time.
/// Every written tile file is recorded in `written`
fn write_source_tiles(
    source: &str,
    batch_files: &[&BatchFile],
    output_dir: &Path,
    background: u8,
    written: &mut Vec<PathBuf>,
) -> Result<(FileTiles, usize)> {
    let mut file_tiles = FileTiles::default();
    let mut dropped = 0;
    for pass in OffsetPass::ALL {
        let mut next_number = 0;
        for batch_file in batch_files.iter().filter(|f| f.pass == pass) {
            let tiles = read_tiles(&batch_file.path)?;
            let segregated = segregate_tiles(tiles, pass, background, next_number);
            next_number += segregated.seen() as u32;
            dropped += segregated.dropped;
            segregated.index_into(&mut file_tiles);
            for (id, tile) in segregated.retained {
                let path = output_dir.join(tile_file_name(source, id));
                write_tiles(&path, &[tile])?;
                written.push(path);
            }
        }
    }
    Ok((file_tiles, dropped))
}

/// Segregates all batch files of `source`. If any of them cannot be read, the tile files already written
/// for `source` are removed again so that the dataset holds no tiles the metadata does not index
fn segregate_source(
    source: &str,
    batch_files: &[&BatchFile],
    output_dir: &Path,
    background: u8,
) -> Result<(Option<FileTiles>, usize)> {
    let mut written = vec![];
    match write_source_tiles(source, batch_files, output_dir, background, &mut written) {
        Ok((file_tiles, dropped)) if file_tiles.is_empty() => Ok((None, dropped)),
        Ok((file_tiles, dropped)) => Ok((Some(file_tiles), dropped)),
        Err(why) => {
            remove_files(&written);
            Err(why)
        }
    }
}

/// Splits the batch files in `batch_dir` into one file per tile in `output_dir`, dropping all tiles that
/// only hold the background label, and writes the dataset metadata that indexes the retained tiles. If
/// `remove_batches` is set, the batch files are deleted afterwards
pub fn segregate_dataset<P: AsRef<Path>, Q: AsRef<Path>>(
    batch_dir: P,
    output_dir: Q,
    config: &ExportConfig,
    remove_batches: bool,
) -> Result<SegregationSummary> {
    let output_dir = output_dir.as_ref();
    let files = match Dataset::open(batch_dir.as_ref())? {
        Dataset::Batched { files, .. } => files,
        Dataset::Segregated { root, .. } => {
            bail!("Dataset in {} is already segregated", root.display())
        }
    };
    ensure_output_empty(output_dir)?;

    let mut by_source = BTreeMap::<&str, Vec<&BatchFile>>::new();
    for file in &files {
        by_source.entry(file.source.as_str()).or_default().push(file);
    }

    let mut metadata = DatasetMetadata::from_config(config);
    let mut dropped = 0;
    let mut failed = vec![];
    for (source, batch_files) in by_source {
        match segregate_source(source, &batch_files, output_dir, config.background_label) {
            Ok((file_tiles, source_dropped)) => {
                dropped += source_dropped;
                match file_tiles {
                    Some(file_tiles) => {
                        info!(
                            "{}: retained {} tiles, dropped {}",
                            source,
                            file_tiles.len(),
                            source_dropped
                        );
                        metadata.files.insert(source.to_owned(), file_tiles);
                    }
                    None => info!("{}: no tiles retained", source),
                }
            }
            Err(why) => {
                error!("Skipping tiles of {}: {:?}", source, why);
                failed.push(source.to_owned());
            }
        }
    }
    write_metadata(output_dir, &metadata)?;

    if remove_batches {
        for file in &files {
            fs::remove_file(&file.path)
                .with_context(|| format!("Could not remove batch file {}", file.path.display()))?;
        }
    }

    Ok(SegregationSummary {
        metadata,
        dropped,
        failed,
    })
}

/// Name of the directory below the output directory that holds the batch files during an export
pub const BATCH_DIR_NAME: &str = "batches";

/// Exports all source files in `input_dir` and segregates the resulting batches into a dataset in
/// `output_dir`. Batch files are written to `output_dir/batches` and removed afterwards unless
/// `keep_batches` is set. Nothing is segregated if the export was cancelled
pub fn export_dataset<P: AsRef<Path>, Q: AsRef<Path>>(
    input_dir: P,
    output_dir: Q,
    config: &ExportConfig,
    keep_batches: bool,
    cancel: &CancellationToken,
) -> Result<(BatchSummary, Option<SegregationSummary>)> {
    let output_dir = output_dir.as_ref();
    ensure_output_empty(output_dir)?;
    let batch_dir = output_dir.join(BATCH_DIR_NAME);
    let export = export_directory(input_dir, &batch_dir, config, cancel)?;
    if !export.cancelled.is_empty() {
        return Ok((export, None));
    }
    if export.written.is_empty() {
        warn!("No tiles were exported");
        return Ok((export, None));
    }

    let segregation = segregate_dataset(&batch_dir, output_dir, config, !keep_batches)?;
    if !keep_batches {
        // Leftovers of failed sources keep the directory alive
        if let Err(why) = fs::remove_dir(&batch_dir) {
            warn!(
                "Could not remove batch directory {}: {}",
                batch_dir.display(),
                why
            );
        }
    }
    info!(
        "Retained {} tiles of {} sources, dropped {} background tiles",
        segregation.retained(),
        segregation.metadata.files.len(),
        segregation.dropped
    );
    Ok((export, Some(segregation)))
}
