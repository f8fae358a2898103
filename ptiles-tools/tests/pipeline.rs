use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Result;
use assert_approx_eq::assert_approx_eq;
use ptiles_algorithms::{aggregation::SegmentationModel, partition::partition};
use ptiles_core::{
    classes::ClassMap,
    cloud::PointCloud,
    config::{ExportConfig, InferenceConfig},
    error::PipelineError,
    grid::{GridSpec, OffsetPass},
    meta::TileId,
    nalgebra::Vector3,
    ndarray::{Array3, ArrayView3, Axis},
    tile::{Prediction, PredictionTile, Tile},
    util::CancellationToken,
};
use ptiles_io::{
    ascii::{read_cloud, write_cloud},
    dataset::{batch_file_name, prediction_path, tile_file_name, Dataset, METADATA_FILE_NAME},
    tiles::{read_tiles, write_predictions, write_tiles},
};
use ptiles_tools::pipeline::{
    export_dataset, fuse_dataset, predict_dataset, segregate_dataset, tile_cloud, BatchFileSink,
    DatasetClasses, BATCH_DIR_NAME,
};
use scopeguard::defer;

fn test_dir(name: &str) -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(name);
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn export_config() -> Result<ExportConfig> {
    Ok(ExportConfig {
        block_size: 10.0,
        max_point: 256,
        batch_size: 4,
        classes: ClassMap::new(vec![0, 1, 2, 3])?,
        ..Default::default()
    })
}

/// 1000 points on a 40m x 40m lattice. The classification of a point is its column modulo 4
fn lattice_cloud(config: &ExportConfig) -> Result<PointCloud> {
    let mut cloud = PointCloud::new(config.extra_features.clone());
    for i in 0..1000_usize {
        let column = i % 40;
        let row = i / 40;
        cloud.push(
            Vector3::new(column as f64 + 0.5, row as f64 * 1.6 + 0.25, (i % 7) as f64 * 0.1),
            (column % 4) as u8,
            &[(i % 256) as f32],
        )?;
    }
    Ok(cloud)
}

fn write_source(dir: &Path, name: &str, cloud: &PointCloud, config: &ExportConfig) -> Result<PathBuf> {
    let path = dir.join(format!("{}.{}", name, config.source.extension));
    write_cloud(&path, cloud, cloud.classifications(), &config.source.delimiter)?;
    Ok(path)
}

/// Names of all tile files in `dir`
fn tile_file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = vec![];
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "ptile") {
            names.push(path.file_name().unwrap().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Predicts label 1 for every point
struct ConstantModel;

impl SegmentationModel for ConstantModel {
    fn infer(&self, batch: ArrayView3<f32>) -> Result<Array3<f32>> {
        let mut probabilities = Array3::from_elem((batch.len_of(Axis(0)), batch.len_of(Axis(1)), 4), 0.1);
        probabilities.index_axis_mut(Axis(2), 1).fill(0.7);
        Ok(probabilities)
    }
}

#[test]
fn test_tiles_of_one_pass_cover_every_point() -> Result<()> {
    let config = export_config()?;
    let cloud = lattice_cloud(&config)?;
    let bounds = cloud.bounds().expect("Cloud is not empty");
    let grid = GridSpec::new(config.block_size, &bounds)?;
    assert_eq!(partition(&cloud, &grid, OffsetPass::Zero).len(), 16);

    let (tile_count, batches) = tile_cloud(&cloud, &config, OffsetPass::Zero, Vec::<Vec<Tile>>::new())?;
    assert_eq!(tile_count, 16);
    let indices = batches
        .iter()
        .flatten()
        .flat_map(|tile| tile.valid_indices().iter().copied())
        .collect::<HashSet<_>>();
    assert_eq!(indices.len(), 1000);
    Ok(())
}

#[test]
fn test_export_predict_and_merge() -> Result<()> {
    let root = test_dir("ptiles_test_export_predict_and_merge")?;
    defer! {
        fs::remove_dir_all(&root).ok();
    }
    let source_dir = root.join("source");
    let dataset_dir = root.join("dataset");
    let labeled_dir = root.join("labeled");
    fs::create_dir_all(&source_dir)?;

    let config = export_config()?;
    let cloud = lattice_cloud(&config)?;
    write_source(&source_dir, "scan_01", &cloud, &config)?;

    let (export, segregation) =
        export_dataset(&source_dir, &dataset_dir, &config, false, &CancellationToken::new())?;
    assert_eq!(export.processed.len(), 1);
    assert!(export.failed.is_empty());
    let segregation = segregation.expect("Export was not cancelled");
    assert_eq!(segregation.dropped, 0);
    assert!(dataset_dir.join(METADATA_FILE_NAME).is_file());
    assert!(!dataset_dir.join(BATCH_DIR_NAME).exists());

    let dataset = Dataset::open(&dataset_dir)?;
    assert!(matches!(dataset, Dataset::Segregated { .. }));
    assert_eq!(dataset.sources(), vec!["scan_01".to_owned()]);
    let metadata = &segregation.metadata;
    let zero_pass_indices = metadata.files["scan_01"]
        .idxs
        .iter()
        .filter(|id| id.pass == OffsetPass::Zero)
        .map(|id| read_tiles(dataset_dir.join(tile_file_name("scan_01", *id))))
        .collect::<Result<Vec<_>>>()?
        .iter()
        .flatten()
        .flat_map(|tile| tile.valid_indices().to_vec())
        .collect::<HashSet<_>>();
    assert_eq!(zero_pass_indices.len(), 1000);

    let inference_config = InferenceConfig {
        sample_point_num: 64,
        ..Default::default()
    };
    let predicted = predict_dataset(&dataset, &ConstantModel, &inference_config, &CancellationToken::new())?;
    assert!(predicted.failed.is_empty());
    assert_eq!(predicted.written.len(), metadata.tile_count());

    let classes = DatasetClasses::of(
        &dataset,
        &DatasetClasses {
            classes: ClassMap::default(),
            extra_features: Default::default(),
        },
    );
    assert_eq!(classes.classes, config.classes);
    let summary = fuse_dataset(
        &dataset,
        &source_dir,
        &labeled_dir,
        &classes,
        &inference_config,
        &CancellationToken::new(),
    )?;
    assert_eq!(summary.written.len(), 1);

    let labeled = read_cloud(&summary.written[0], &config.source, &config.extra_features)?;
    assert_eq!(labeled.len(), 1000);
    assert!(labeled.classifications().iter().all(|code| *code == 1));
    assert_eq!(labeled.position(42), cloud.position(42));
    assert_approx_eq!(summary.counts.accuracy(), 0.25);
    Ok(())
}

#[test]
fn test_fusion_keeps_the_most_confident_prediction() -> Result<()> {
    let root = test_dir("ptiles_test_fusion_keeps_the_most_confident_prediction")?;
    defer! {
        fs::remove_dir_all(&root).ok();
    }
    let source_dir = root.join("source");
    let dataset_dir = root.join("dataset");
    fs::create_dir_all(&source_dir)?;
    fs::create_dir_all(&dataset_dir)?;

    let config = export_config()?;
    let mut cloud = PointCloud::new(config.extra_features.clone());
    for i in 0..50 {
        cloud.push(Vector3::new(i as f64, 0.0, 0.0), 0, &[1.0])?;
    }
    write_source(&source_dir, "scan", &cloud, &config)?;

    let num_features = config.extra_features.tile_feature_count();
    let mut whole = Tile::new(64, num_features, Vector3::zeros());
    for index in 0..50 {
        whole.push(index, 0, &vec![0.0; num_features], &vec![0.0; num_features])?;
    }
    let mut single = Tile::new(64, num_features, Vector3::zeros());
    single.push(42, 0, &vec![0.0; num_features], &vec![0.0; num_features])?;

    let mut whole_predictions = PredictionTile::for_tile(&whole);
    for slot in 0..50 {
        whole_predictions.predictions[slot] = Prediction::new(3, 0.6);
    }
    let mut single_predictions = PredictionTile::for_tile(&single);
    single_predictions.predictions[0] = Prediction::new(2, 0.9);

    for (pass, tile, predictions) in [
        (OffsetPass::Zero, whole, whole_predictions),
        (OffsetPass::Half, single, single_predictions),
    ] {
        let path = dataset_dir.join(batch_file_name("scan", pass, 0));
        write_tiles(&path, &[tile])?;
        write_predictions(prediction_path(&path), &[predictions])?;
    }

    let dataset = Dataset::open(&dataset_dir)?;
    assert!(matches!(dataset, Dataset::Batched { .. }));
    let classes = DatasetClasses {
        classes: config.classes.clone(),
        extra_features: config.extra_features.clone(),
    };
    let summary = fuse_dataset(
        &dataset,
        &source_dir,
        root.join("labeled"),
        &classes,
        &InferenceConfig::default(),
        &CancellationToken::new(),
    )?;

    let labeled = read_cloud(&summary.written[0], &config.source, &config.extra_features)?;
    assert_eq!(labeled.classification(42), 2);
    assert_eq!(labeled.classification(41), 3);
    assert_eq!(summary.counts.class(0).support(), 50);
    Ok(())
}

#[test]
fn test_background_only_tiles_are_dropped() -> Result<()> {
    let root = test_dir("ptiles_test_background_only_tiles_are_dropped")?;
    defer! {
        fs::remove_dir_all(&root).ok();
    }
    let source_dir = root.join("source");
    let dataset_dir = root.join("dataset");
    fs::create_dir_all(&source_dir)?;

    let config = ExportConfig {
        max_point: 64,
        ..export_config()?
    };
    // Two clusters far apart, one holding only background points
    let mut cloud = PointCloud::new(config.extra_features.clone());
    for i in 0..100 {
        let offset = (i % 10) as f64 * 0.4;
        let row = (i / 10) as f64 * 0.4;
        cloud.push(Vector3::new(offset, row, 0.0), 0, &[0.0])?;
        cloud.push(Vector3::new(40.0 + offset, row, 0.0), 2, &[0.0])?;
    }
    write_source(&source_dir, "clusters", &cloud, &config)?;

    let (_, segregation) =
        export_dataset(&source_dir, &dataset_dir, &config, false, &CancellationToken::new())?;
    let segregation = segregation.expect("Export was not cancelled");
    assert!(segregation.dropped >= 2);

    let dataset = Dataset::open(&dataset_dir)?;
    let tile_files = dataset.tile_files("clusters");
    assert_eq!(tile_files.len(), segregation.retained());
    let tile_file_count = fs::read_dir(&dataset_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().map_or(false, |ext| ext == "ptile"))
        .count();
    assert_eq!(tile_file_count, tile_files.len());
    for tile in dataset.load_tiles("clusters")?.iter() {
        assert!(!tile.is_background_only(config.background_label));
        assert!(tile.valid_indices().iter().all(|index| index % 2 == 1));
    }
    Ok(())
}

#[test]
fn test_output_with_exported_data_is_rejected() -> Result<()> {
    let root = test_dir("ptiles_test_output_with_exported_data_is_rejected")?;
    defer! {
        fs::remove_dir_all(&root).ok();
    }
    let source_dir = root.join("source");
    let dataset_dir = root.join("dataset");
    fs::create_dir_all(&source_dir)?;
    fs::create_dir_all(&dataset_dir)?;
    fs::write(dataset_dir.join(METADATA_FILE_NAME), "{}")?;

    let config = export_config()?;
    write_source(&source_dir, "scan", &lattice_cloud(&config)?, &config)?;

    let err = export_dataset(&source_dir, &dataset_dir, &config, false, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::OutputNotEmpty(_))
    ));
    assert!(!dataset_dir.join(BATCH_DIR_NAME).exists());
    Ok(())
}

#[test]
fn test_missing_sources_are_rejected() -> Result<()> {
    let root = test_dir("ptiles_test_missing_sources_are_rejected")?;
    defer! {
        fs::remove_dir_all(&root).ok();
    }
    let err = export_dataset(
        &root,
        root.join("dataset"),
        &export_config()?,
        false,
        &CancellationToken::new(),
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::NoInputFiles { .. })
    ));
    Ok(())
}

#[test]
fn test_cancelled_export_writes_nothing() -> Result<()> {
    let root = test_dir("ptiles_test_cancelled_export_writes_nothing")?;
    defer! {
        fs::remove_dir_all(&root).ok();
    }
    let source_dir = root.join("source");
    let dataset_dir = root.join("dataset");
    fs::create_dir_all(&source_dir)?;

    let config = export_config()?;
    let cloud = lattice_cloud(&config)?;
    write_source(&source_dir, "scan_a", &cloud, &config)?;
    write_source(&source_dir, "scan_b", &cloud, &config)?;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let (export, segregation) = export_dataset(&source_dir, &dataset_dir, &config, false, &cancel)?;
    assert_eq!(export.cancelled.len(), 2);
    assert!(export.written.is_empty());
    assert!(segregation.is_none());
    assert!(!dataset_dir.join(METADATA_FILE_NAME).exists());
    Ok(())
}

#[test]
fn test_source_failing_during_export_leaves_no_tiles() -> Result<()> {
    let root = test_dir("ptiles_test_source_failing_during_export_leaves_no_tiles")?;
    defer! {
        fs::remove_dir_all(&root).ok();
    }
    let source_dir = root.join("source");
    let dataset_dir = root.join("dataset");
    let batch_dir = dataset_dir.join(BATCH_DIR_NAME);
    fs::create_dir_all(&source_dir)?;

    let config = export_config()?;
    let cloud = lattice_cloud(&config)?;
    write_source(&source_dir, "scan_a", &cloud, &config)?;
    let failing = write_source(&source_dir, "scan_b", &cloud, &config)?;

    // A directory in place of the temporary file makes the first half pass batch of scan_b unwritable,
    // after all of its zero pass batches were written
    let blocked = format!("{}.tmp", batch_file_name("scan_b", OffsetPass::Half, 0));
    fs::create_dir_all(batch_dir.join(blocked))?;

    let (export, segregation) =
        export_dataset(&source_dir, &dataset_dir, &config, false, &CancellationToken::new())?;
    assert_eq!(export.failed, vec![failing]);
    assert_eq!(export.processed.len(), 1);
    let segregation = segregation.expect("Export was not cancelled");
    assert!(segregation.failed.is_empty());
    assert_eq!(
        segregation.metadata.files.keys().collect::<Vec<_>>(),
        vec!["scan_a"]
    );

    assert!(tile_file_names(&batch_dir)?.is_empty());
    let tile_files = tile_file_names(&dataset_dir)?;
    assert_eq!(tile_files.len(), segregation.retained());
    assert!(tile_files.iter().all(|name| name.starts_with("scan_a_")));
    Ok(())
}

#[test]
fn test_unreadable_batches_leave_no_tiles() -> Result<()> {
    let root = test_dir("ptiles_test_unreadable_batches_leave_no_tiles")?;
    defer! {
        fs::remove_dir_all(&root).ok();
    }
    let batch_dir = root.join("batches");
    let dataset_dir = root.join("dataset");
    fs::create_dir_all(&batch_dir)?;

    let config = export_config()?;
    let cloud = lattice_cloud(&config)?;
    for source in ["scan_a", "scan_b"] {
        tile_cloud(
            &cloud,
            &config,
            OffsetPass::Zero,
            BatchFileSink::new(&batch_dir, source, OffsetPass::Zero),
        )?;
    }
    // Zero pass tiles of scan_b are segregated before its broken half pass batch is read
    fs::write(
        batch_dir.join(batch_file_name("scan_b", OffsetPass::Half, 0)),
        "not a tile archive",
    )?;

    let segregation = segregate_dataset(&batch_dir, &dataset_dir, &config, false)?;
    assert_eq!(segregation.failed, vec!["scan_b".to_owned()]);
    assert_eq!(
        segregation.metadata.files.keys().collect::<Vec<_>>(),
        vec!["scan_a"]
    );
    let tile_files = tile_file_names(&dataset_dir)?;
    assert_eq!(tile_files.len(), segregation.retained());
    assert!(tile_files.iter().all(|name| name.starts_with("scan_a_")));
    // Tiles are numbered across all batch files of a pass
    assert!(tile_files.contains(&tile_file_name("scan_a", TileId::new(OffsetPass::Zero, 15))));
    Ok(())
}
