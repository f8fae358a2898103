//! Discovery and naming of the files that make up an exported dataset
use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use log::warn;
use ptiles_core::{
    error::PipelineError,
    grid::OffsetPass,
    meta::{DatasetMetadata, TileId},
    tile::{PredictionTile, Tile},
};

use crate::tiles::{read_predictions, read_tiles};

/// Extension of tile files
pub const TILE_EXTENSION: &str = "ptile";
/// Suffix of prediction files, replacing the `.ptile` of the matching tile file
pub const PREDICTION_SUFFIX: &str = ".pred.ptile";
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Name of the `batch`-th batch file of `source` in the given `pass`
/// ```
/// # use ptiles_core::grid::OffsetPass;
/// # use ptiles_io::dataset::batch_file_name;
/// assert_eq!(batch_file_name("scan_01", OffsetPass::Half, 3), "scan_01_half_00003.ptile");
/// ```
pub fn batch_file_name(source: &str, pass: OffsetPass, batch: u32) -> String {
    format!("{}_{}_{:05}.{}", source, pass, batch, TILE_EXTENSION)
}

/// Name of the file that holds the single tile `id` of `source`
pub fn tile_file_name(source: &str, id: TileId) -> String {
    format!("{}_{}.{}", source, id, TILE_EXTENSION)
}

/// Path of the prediction file that belongs to the tile file at `tile_path`
pub fn prediction_path(tile_path: &Path) -> PathBuf {
    let stem = tile_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    tile_path.with_file_name(format!("{}{}", stem, PREDICTION_SUFFIX))
}

fn is_prediction_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| name.ends_with(PREDICTION_SUFFIX))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case(extension))
}

/// Name of a source cloud, which is its file name without the extension
pub fn source_name(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("Invalid source file name {}", path.display()))
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Could not read directory {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

/// Returns all files in `dir` with the given `extension`, sorted by name. Fails with
/// `PipelineError::NoInputFiles` if there are none
pub fn find_source_files<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let files = sorted_entries(dir)?
        .into_iter()
        .filter(|path| path.is_file() && has_extension(path, extension))
        .collect::<Vec<_>>();
    if files.is_empty() {
        return Err(PipelineError::NoInputFiles {
            directory: dir.to_owned(),
            extension: extension.to_owned(),
        }
        .into());
    }
    Ok(files)
}

/// Returns the file in `dir` that holds the source cloud `source`. The extension is matched the same way
/// as in `find_source_files`, ignoring its case
pub fn find_source_file<P: AsRef<Path>>(dir: P, source: &str, extension: &str) -> Result<PathBuf> {
    let dir = dir.as_ref();
    sorted_entries(dir)?
        .into_iter()
        .find(|path| {
            path.is_file()
                && has_extension(path, extension)
                && path.file_stem().and_then(|stem| stem.to_str()) == Some(source)
        })
        .ok_or_else(|| {
            anyhow!(
                "No source file {}.{} in {}",
                source,
                extension,
                dir.display()
            )
        })
}

/// Makes sure that `dir` exists and holds no exported data yet. Fails with `PipelineError::OutputNotEmpty` if
/// it contains tile files or dataset metadata
pub fn ensure_output_empty<P: AsRef<Path>>(dir: P) -> Result<()> {
    let dir = dir.as_ref();
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Could not create output directory {}", dir.display()))?;
        return Ok(());
    }
    let has_exported_data = sorted_entries(dir)?.iter().any(|path| {
        has_extension(path, TILE_EXTENSION)
            || path.file_name().map_or(false, |name| name == METADATA_FILE_NAME)
    });
    if has_exported_data {
        return Err(PipelineError::OutputNotEmpty(dir.to_owned()).into());
    }
    Ok(())
}

pub fn read_metadata<P: AsRef<Path>>(dir: P) -> Result<DatasetMetadata> {
    let path = dir.as_ref().join(METADATA_FILE_NAME);
    let file = File::open(&path)
        .with_context(|| format!("Could not open dataset metadata {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Could not parse dataset metadata {}", path.display()))
}

pub fn write_metadata<P: AsRef<Path>>(dir: P, metadata: &DatasetMetadata) -> Result<()> {
    let path = dir.as_ref().join(METADATA_FILE_NAME);
    let mut writer = BufWriter::new(
        File::create(&path)
            .with_context(|| format!("Could not create dataset metadata {}", path.display()))?,
    );
    serde_json::to_writer_pretty(&mut writer, metadata)?;
    writer.flush()?;
    Ok(())
}

/// A batch file, identified by its name `<source>_<pass>_<batch>.ptile`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BatchFile {
    pub source: String,
    pub pass: OffsetPass,
    pub batch: u32,
    pub path: PathBuf,
}

impl BatchFile {
    /// Parses the name of the file at `path`. Returns `None` if it is not a batch file
    pub fn from_path(path: &Path) -> Option<Self> {
        if !has_extension(path, TILE_EXTENSION) || is_prediction_file(path) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let mut parts = stem.rsplitn(3, '_');
        let batch = parts.next()?.parse().ok()?;
        let pass = parts.next()?.parse().ok()?;
        let source = parts.next()?;
        Some(Self {
            source: source.to_owned(),
            pass,
            batch,
            path: path.to_owned(),
        })
    }
}

/// The tiles of an exported dataset, either as batch files straight out of the export or as one file per
/// retained tile after segregation
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    Batched { root: PathBuf, files: Vec<BatchFile> },
    Segregated { root: PathBuf, metadata: DatasetMetadata },
}

impl Dataset {
    /// Opens the dataset in `root`. A directory with a metadata file is a segregated dataset, otherwise all
    /// batch files in it are used
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_owned();
        if root.join(METADATA_FILE_NAME).is_file() {
            let metadata = read_metadata(&root)?;
            return Ok(Dataset::Segregated { root, metadata });
        }
        let mut files = sorted_entries(&root)?
            .iter()
            .filter_map(|path| BatchFile::from_path(path))
            .collect::<Vec<_>>();
        if files.is_empty() {
            return Err(PipelineError::NoInputFiles {
                directory: root,
                extension: TILE_EXTENSION.to_owned(),
            }
            .into());
        }
        files.sort();
        Ok(Dataset::Batched { root, files })
    }

    pub fn root(&self) -> &Path {
        match self {
            Dataset::Batched { root, .. } | Dataset::Segregated { root, .. } => root,
        }
    }

    /// Names of all source clouds that have tiles in this dataset, sorted
    pub fn sources(&self) -> Vec<String> {
        match self {
            Dataset::Batched { files, .. } => files
                .iter()
                .map(|f| f.source.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            Dataset::Segregated { metadata, .. } => metadata.files.keys().cloned().collect(),
        }
    }

    /// Paths of all tile files of `source`
    pub fn tile_files(&self, source: &str) -> Vec<PathBuf> {
        match self {
            Dataset::Batched { files, .. } => files
                .iter()
                .filter(|f| f.source == source)
                .map(|f| f.path.clone())
                .collect(),
            Dataset::Segregated { root, metadata } => metadata
                .files
                .get(source)
                .map(|tiles| {
                    tiles
                        .idxs
                        .iter()
                        .map(|id| root.join(tile_file_name(source, *id)))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Reads all tiles of `source`
    pub fn load_tiles(&self, source: &str) -> Result<Vec<Tile>> {
        let mut tiles = vec![];
        for path in self.tile_files(source) {
            tiles.extend(read_tiles(&path)?);
        }
        Ok(tiles)
    }

    /// Reads the predictions for all tiles of `source`. Tile files without a prediction file are skipped
    /// with a warning
    pub fn load_predictions(&self, source: &str) -> Result<Vec<PredictionTile>> {
        let mut predictions = vec![];
        for tile_path in self.tile_files(source) {
            let path = prediction_path(&tile_path);
            if !path.is_file() {
                warn!("No predictions for tile file {}", tile_path.display());
                continue;
            }
            predictions.extend(read_predictions(&path)?);
        }
        Ok(predictions)
    }
}
