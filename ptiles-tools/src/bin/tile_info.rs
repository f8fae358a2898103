use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{App, Arg};
use ptiles_io::dataset::{prediction_path, Dataset};

struct Args {
    pub input_dir: PathBuf,
    pub detailed: bool,
}

fn get_args() -> Result<Args> {
    let matches = App::new("ptiles info")
        .version("0.1")
        .about("Prints information about a tile dataset")
        .arg(
            Arg::with_name("INPUT")
                .short("i")
                .takes_value(true)
                .value_name("INPUT")
                .help("Directory of the tile dataset")
                .required(true),
        )
        .arg(
            Arg::with_name("DETAILED")
                .short("d")
                .long("detailed")
                .help("Read all tiles and print point counts per source"),
        )
        .get_matches();

    let input_dir = matches
        .value_of("INPUT")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("Missing input directory"))?;
    Ok(Args {
        input_dir,
        detailed: matches.is_present("DETAILED"),
    })
}

fn print_point_counts(dataset: &Dataset, source: &str) -> Result<()> {
    let tiles = dataset.load_tiles(source)?;
    let counts = tiles.iter().map(|tile| tile.count).collect::<Vec<_>>();
    let total = counts.iter().sum::<usize>();
    if let (Some(min), Some(max)) = (counts.iter().min(), counts.iter().max()) {
        println!(
            "\t\tpoints: {} total, {} to {} per tile, {:.1} on average",
            total,
            min,
            max,
            total as f64 / counts.len() as f64
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = get_args()?;
    let dataset = Dataset::open(&args.input_dir)?;

    println!("ptiles info report for {}", dataset.root().display());
    match &dataset {
        Dataset::Batched { files, .. } => {
            println!("Batched dataset with {} batch files", files.len());
        }
        Dataset::Segregated { metadata, .. } => {
            println!("Segregated dataset with {} tiles", metadata.tile_count());
            println!("\tClasses:         {:?}", metadata.classes.codes());
            println!("\tPoints per tile: {}", metadata.max_point);
            println!("\tBlock size:      {}", metadata.block_size);
            let features = metadata
                .extra_features
                .iter()
                .map(|feature| feature.name.as_str())
                .collect::<Vec<_>>();
            println!("\tExtra features:  {:?}", features);
        }
    }

    for source in dataset.sources() {
        let files = dataset.tile_files(&source);
        let predicted = files
            .iter()
            .filter(|path| prediction_path(path).is_file())
            .count();
        println!(
            "\t{}: {} tile files, {} with predictions",
            source,
            files.len(),
            predicted
        );
        if args.detailed {
            print_point_counts(&dataset, &source)?;
        }
    }
    Ok(())
}
