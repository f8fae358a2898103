use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Result;
use log::{debug, error, info, warn};
use ptiles_algorithms::{
    batching::{cut_block, label_points, TileBatcher, TileSink},
    merge::merge_small_blocks,
    partition::partition,
    resample::{block_rng, resample_partition},
};
use ptiles_core::{
    cloud::PointCloud,
    config::ExportConfig,
    grid::{GridSpec, OffsetPass},
    tile::Tile,
    util::CancellationToken,
};
use ptiles_io::{
    ascii::read_cloud,
    dataset::{batch_file_name, ensure_output_empty, find_source_files, source_name},
    tiles::write_tiles,
};
use rayon::prelude::*;

/// Writes every batch into its own batch file `<source>_<pass>_<batch>.ptile`
pub struct BatchFileSink {
    dir: PathBuf,
    source: String,
    pass: OffsetPass,
    files: Vec<PathBuf>,
}

impl BatchFileSink {
    pub fn new<P: AsRef<Path>>(dir: P, source: &str, pass: OffsetPass) -> Self {
        Self {
            dir: dir.as_ref().to_owned(),
            source: source.to_owned(),
            pass,
            files: vec![],
        }
    }

    /// All files written so far
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn into_files(self) -> Vec<PathBuf> {
        self.files
    }
}

impl TileSink for BatchFileSink {
    fn write_batch(&mut self, batch: &[Tile]) -> Result<()> {
        let path = self.dir.join(batch_file_name(
            &self.source,
            self.pass,
            self.files.len() as u32,
        ));
        write_tiles(&path, batch)?;
        debug!("Wrote {} tiles to {}", batch.len(), path.display());
        self.files.push(path);
        Ok(())
    }
}

/// Seed for all random decisions of one pass
fn pass_seed(seed: u64, pass: OffsetPass) -> u64 {
    match pass {
        OffsetPass::Zero => seed,
        OffsetPass::Half => seed ^ 0x5bd1_e995,
    }
}

/// Partitions `cloud` in the given `pass`, merges and resamples its blocks, cuts them into tiles and hands
/// them to `sink` in batches. Returns the number of tiles
pub fn tile_cloud<S: TileSink>(
    cloud: &PointCloud,
    config: &ExportConfig,
    pass: OffsetPass,
    sink: S,
) -> Result<(usize, S)> {
    let bounds = match cloud.bounds() {
        Some(bounds) => bounds,
        None => return Ok((0, sink)),
    };
    let grid = GridSpec::new(config.block_size, &bounds)?;
    let extent = grid.block_extent();
    debug!(
        "Pass {}: blocks of {} x {} x {}",
        pass, extent.x, extent.y, extent.z
    );
    let seed = pass_seed(config.seed, pass);

    let mut blocks = partition(cloud, &grid, pass);
    let block_count = blocks.len();
    let report = merge_small_blocks(&mut blocks, config.merge_threshold());
    if !report.unmerged.is_empty() {
        debug!(
            "{} blocks stay below {} points in pass {}",
            report.unmerged.len(),
            config.merge_threshold(),
            pass
        );
    }
    let blocks = resample_partition(cloud, blocks, config.grid_size, seed);
    info!(
        "Pass {}: {} blocks, {} after merging, {} points after resampling",
        pass,
        block_count,
        blocks.len(),
        blocks.total_points()
    );

    let labels = label_points(cloud, &config.classes, config.background_label);
    let mut batcher = TileBatcher::new(sink, config.batch_size);
    let mut tile_count = 0;
    for (key, block) in blocks.iter() {
        let mut rng = block_rng(seed, *key);
        for tile in cut_block(cloud, &labels, block, config.max_point, &mut rng)? {
            batcher.push(tile)?;
            tile_count += 1;
        }
    }
    Ok((tile_count, batcher.finish()?))
}

/// Removes `files`, logging the ones that could not be removed
pub(crate) fn remove_files(files: &[PathBuf]) {
    for file in files {
        if let Err(why) = fs::remove_file(file) {
            warn!("Could not remove {}: {}", file.display(), why);
        }
    }
}

/// Tiles the source cloud at `path` in all configured passes and writes the batch files to `output_dir`.
/// Returns the paths of all written batch files. If tiling fails, the batch files already written for
/// this source are removed
pub fn export_file<P: AsRef<Path>, Q: AsRef<Path>>(
    path: P,
    config: &ExportConfig,
    output_dir: Q,
) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    let source = source_name(path)?;
    let cloud = read_cloud(path, &config.source, &config.extra_features)?;
    if cloud.is_empty() {
        warn!("Source cloud {} holds no points", path.display());
    }

    let mut files = vec![];
    for pass in config.passes.iter().copied() {
        let mut sink = BatchFileSink::new(output_dir.as_ref(), &source, pass);
        let tiled = tile_cloud(&cloud, config, pass, &mut sink).map(|(count, _)| count);
        let batch_count = sink.files().len();
        files.extend(sink.into_files());
        match tiled {
            Ok(tile_count) => info!(
                "{}: {} tiles in {} batch files for pass {}",
                source, tile_count, batch_count, pass
            ),
            Err(why) => {
                remove_files(&files);
                return Err(why);
            }
        }
    }
    Ok(files)
}

/// Outcome of a batch job over a directory of source files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Source files that were processed successfully
    pub processed: Vec<PathBuf>,
    /// Source files that failed and were skipped
    pub failed: Vec<PathBuf>,
    /// Source files that were not touched because the job was cancelled
    pub cancelled: Vec<PathBuf>,
    /// All files written by the job
    pub written: Vec<PathBuf>,
}

impl BatchSummary {
    pub(crate) fn record(&mut self, source: PathBuf, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Done(written) => {
                self.processed.push(source);
                self.written.extend(written);
            }
            FileOutcome::Failed => self.failed.push(source),
            FileOutcome::Cancelled => self.cancelled.push(source),
        }
    }

    pub(crate) fn sort(&mut self) {
        self.processed.sort();
        self.failed.sort();
        self.cancelled.sort();
        self.written.sort();
    }
}

pub(crate) enum FileOutcome {
    Done(Vec<PathBuf>),
    Failed,
    Cancelled,
}

/// Runs `job` for every file in parallel. Failing files are logged and skipped, and once `cancel` is
/// triggered no new file is started
pub(crate) fn run_per_file<F>(files: &[PathBuf], cancel: &CancellationToken, job: F) -> BatchSummary
where
    F: Fn(&Path) -> Result<Vec<PathBuf>> + Sync,
{
    let outcomes = files
        .par_iter()
        .map(|file| {
            if cancel.is_cancelled() {
                return (file.clone(), FileOutcome::Cancelled);
            }
            match job(file) {
                Ok(written) => (file.clone(), FileOutcome::Done(written)),
                Err(why) => {
                    error!("Skipping {}: {:?}", file.display(), why);
                    (file.clone(), FileOutcome::Failed)
                }
            }
        })
        .collect::<Vec<_>>();
    let mut summary = BatchSummary::default();
    for (file, outcome) in outcomes {
        summary.record(file, outcome);
    }
    summary.sort();
    summary
}

/// Exports all source files in `input_dir` into batch files in `output_dir`. The configuration, the
/// output directory and the presence of source files are checked before any file is touched, and fail the
/// whole run. After that, a failing source file is logged and skipped
pub fn export_directory<P: AsRef<Path>, Q: AsRef<Path>>(
    input_dir: P,
    output_dir: Q,
    config: &ExportConfig,
    cancel: &CancellationToken,
) -> Result<BatchSummary> {
    config.validate()?;
    ensure_output_empty(output_dir.as_ref())?;
    let files = find_source_files(input_dir, &config.source.extension)?;
    info!("Exporting {} source files", files.len());

    let output_dir = output_dir.as_ref();
    let summary = run_per_file(&files, cancel, |file| export_file(file, config, output_dir));
    if !summary.cancelled.is_empty() {
        warn!(
            "Export was cancelled, {} source files were not processed",
            summary.cancelled.len()
        );
    }
    Ok(summary)
}
