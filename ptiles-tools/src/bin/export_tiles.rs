use std::{path::PathBuf, time::Instant};

use anyhow::{anyhow, Result};
use clap::{value_t, App, Arg};
use log::info;
use ptiles_core::{config::ExportConfig, util::CancellationToken};
use ptiles_tools::pipeline::export_dataset;

struct Args {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub config: ExportConfig,
    pub keep_batches: bool,
}

fn get_args() -> Result<Args> {
    let matches = App::new("ptiles export")
        .version("0.1")
        .about("Cuts all point clouds in a directory into fixed-size tiles")
        .arg(
            Arg::with_name("INPUT")
                .short("i")
                .long("input")
                .takes_value(true)
                .value_name("INPUT")
                .help("Directory with the source point clouds")
                .required(true),
        )
        .arg(
            Arg::with_name("OUTPUT")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("OUTPUT")
                .help("Output directory for the tile dataset. Must not contain exported data yet")
                .required(true),
        )
        .arg(
            Arg::with_name("CONFIG")
                .short("c")
                .long("config")
                .takes_value(true)
                .value_name("CONFIG")
                .help("JSON file with the export configuration. Unset values use their defaults"),
        )
        .arg(
            Arg::with_name("BLOCK_SIZE")
                .long("block-size")
                .takes_value(true)
                .help("Overrides the horizontal block size"),
        )
        .arg(
            Arg::with_name("MAX_POINT")
                .long("max-point")
                .takes_value(true)
                .help("Overrides the number of points per tile"),
        )
        .arg(
            Arg::with_name("KEEP_BATCHES")
                .long("keep-batches")
                .help("Keep the intermediate batch files"),
        )
        .get_matches();

    let input_dir = matches
        .value_of("INPUT")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("Missing input directory"))?;
    let output_dir = matches
        .value_of("OUTPUT")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("Missing output directory"))?;
    let mut config = match matches.value_of("CONFIG") {
        Some(path) => ExportConfig::from_json_file(path)?,
        None => ExportConfig::default(),
    };
    if matches.is_present("BLOCK_SIZE") {
        config.block_size = value_t!(matches, "BLOCK_SIZE", f64)?;
    }
    if matches.is_present("MAX_POINT") {
        config.max_point = value_t!(matches, "MAX_POINT", usize)?;
    }
    config.validate()?;

    Ok(Args {
        input_dir,
        output_dir,
        config,
        keep_batches: matches.is_present("KEEP_BATCHES"),
    })
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = get_args()?;

    let t_start = Instant::now();
    let (export, segregation) = export_dataset(
        &args.input_dir,
        &args.output_dir,
        &args.config,
        args.keep_batches,
        &CancellationToken::new(),
    )?;

    println!(
        "Exported {} source files, {} failed",
        export.processed.len(),
        export.failed.len()
    );
    for failed in &export.failed {
        println!("\tfailed: {}", failed.display());
    }
    if let Some(segregation) = segregation {
        println!(
            "Retained {} tiles, dropped {} background-only tiles",
            segregation.retained(),
            segregation.dropped
        );
    }
    info!("Took {:.2}s", t_start.elapsed().as_secs_f64());
    Ok(())
}
