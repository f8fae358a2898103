use std::{path::PathBuf, time::Instant};

use anyhow::{anyhow, Result};
use clap::{App, Arg};
use log::info;
use ptiles_algorithms::metrics::MetricsTable;
use ptiles_core::{
    config::{ExportConfig, InferenceConfig},
    util::CancellationToken,
};
use ptiles_io::dataset::Dataset;
use ptiles_tools::pipeline::{fuse_dataset, DatasetClasses};

struct Args {
    pub dataset_dir: PathBuf,
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub config: InferenceConfig,
    pub export_config: ExportConfig,
}

fn get_args() -> Result<Args> {
    let matches = App::new("ptiles merge")
        .version("0.1")
        .about("Puts tile predictions back together into labeled point clouds")
        .arg(
            Arg::with_name("INPUT")
                .short("i")
                .long("input")
                .takes_value(true)
                .value_name("INPUT")
                .help("Directory of the tile dataset with prediction files")
                .required(true),
        )
        .arg(
            Arg::with_name("SOURCE")
                .short("s")
                .long("source")
                .takes_value(true)
                .value_name("SOURCE")
                .help("Directory with the source point clouds the dataset was exported from")
                .required(true),
        )
        .arg(
            Arg::with_name("OUTPUT")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("OUTPUT")
                .help("Output directory for the labeled point clouds")
                .required(true),
        )
        .arg(
            Arg::with_name("CONFIG")
                .short("c")
                .long("config")
                .takes_value(true)
                .value_name("CONFIG")
                .help("JSON file with the inference configuration"),
        )
        .arg(
            Arg::with_name("EXPORT_CONFIG")
                .short("e")
                .long("export-config")
                .takes_value(true)
                .value_name("EXPORT_CONFIG")
                .help("JSON file with the export configuration. Only used for datasets without metadata"),
        )
        .get_matches();

    let path_of = |name: &str| {
        matches
            .value_of(name)
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("Missing argument {}", name))
    };
    let config = match matches.value_of("CONFIG") {
        Some(path) => InferenceConfig::from_json_file(path)?,
        None => InferenceConfig::default(),
    };
    let export_config = match matches.value_of("EXPORT_CONFIG") {
        Some(path) => ExportConfig::from_json_file(path)?,
        None => ExportConfig::default(),
    };

    Ok(Args {
        dataset_dir: path_of("INPUT")?,
        source_dir: path_of("SOURCE")?,
        output_dir: path_of("OUTPUT")?,
        config,
        export_config,
    })
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = get_args()?;

    let t_start = Instant::now();
    let dataset = Dataset::open(&args.dataset_dir)?;
    let classes = DatasetClasses::of(
        &dataset,
        &DatasetClasses {
            classes: args.export_config.classes.clone(),
            extra_features: args.export_config.extra_features.clone(),
        },
    );
    let summary = fuse_dataset(
        &dataset,
        &args.source_dir,
        &args.output_dir,
        &classes,
        &args.config,
        &CancellationToken::new(),
    )?;

    println!(
        "Wrote {} labeled clouds, {} sources failed",
        summary.written.len(),
        summary.failed.len()
    );
    for failed in &summary.failed {
        println!("\tfailed: {}", failed);
    }
    let table = MetricsTable::new(&summary.counts, |label| {
        match classes.classes.code_of(label as u8) {
            Some(code) => format!("class {}", code),
            None => format!("label {}", label),
        }
    });
    println!("{}", table);
    info!("Took {:.2}s", t_start.elapsed().as_secs_f64());
    Ok(())
}
