use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use sentinel_aoi_etl::config::{run_config_toml, RunConfig};
use sentinel_aoi_etl::element84::{EarthSearch, Provider};
use sentinel_aoi_etl::footprint::{add_footprint, describe_catalog, discover_aois, footprint_path};
use sentinel_aoi_etl::logging::init_logging;
use sentinel_aoi_etl::pipeline::Pipeline;
use sentinel_aoi_etl::publish::{publish, SystemRunner};
use sentinel_aoi_etl::raster::split::DEFAULT_SQUARE_SIZE;
use sentinel_aoi_etl::raster::split_into_tiles;
use sentinel_aoi_etl::shp::convert_shapefiles;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sentinel-aoi-etl")]
#[command(about = "Sentinel-2 imagery extraction for areas of interest", long_about = None)]
struct Args {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search, download and process imagery for areas of interest
    Run {
        /// AOI names; every footprint in the footprints directory when empty
        names: Vec<String>,

        /// Run configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Skip the true color image
        #[arg(long)]
        no_tci: bool,

        /// Output directory
        #[arg(long)]
        output: Option<PathBuf>,

        /// Keep downloaded and cropped rasters
        #[arg(long)]
        keep_intermediate: bool,
    },
    /// Write the configuration template
    Template { path: PathBuf },
    /// Split an image into square tiles
    Split {
        image: PathBuf,
        out_dir: PathBuf,
        #[arg(long, default_value_t = DEFAULT_SQUARE_SIZE)]
        size: u32,
    },
    /// Add a rectangular footprint to a footprint catalog
    AddFootprint {
        catalog: PathBuf,
        #[arg(long)]
        name: String,
        /// Top left and bottom right corners: lng1,lat1,lng2,lat2
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        bbox: Vec<f64>,
    },
    /// Write a GeoJSON footprint next to each shapefile that has none
    ConvertShapefiles {
        /// A shapefile or a directory searched recursively
        path: PathBuf,
    },
    /// Print the feature properties and labels of a GeoJSON file
    Inspect { geojson: PathBuf },
    /// Version the output directory with dvc and push it
    Publish {
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
}

async fn run(
    names: Vec<String>,
    config: Option<PathBuf>,
    no_tci: bool,
    output: Option<PathBuf>,
    keep_intermediate: bool,
) -> Result<()> {
    let mut config = match config {
        Some(path) => RunConfig::read(&path)
            .with_context(|| format!("Unable to read configuration {}", path.display()))?,
        None => RunConfig::default(),
    };
    if no_tci {
        config.tci = false;
    }
    if let Some(output) = output {
        config.output_dir = output;
    }
    config.keep_intermediate |= keep_intermediate;
    config.validate()?;
    let window = config.search_window(chrono::Utc::now().date_naive())?;

    let aois = if names.is_empty() {
        discover_aois(&config.footprints_dir)?
    } else {
        names
            .iter()
            .map(|name| footprint_path(&config.footprints_dir, name))
            .collect()
    };
    if aois.is_empty() {
        return Err(anyhow!(
            "No footprints found in {}",
            config.footprints_dir.display()
        ));
    }
    info!(
        aois = aois.len(),
        start = %window.start,
        end = %window.end,
        "Starting run"
    );

    let catalog = EarthSearch::new(
        config.catalog_url.clone(),
        &config.collection,
        &config.bands,
        config.search_limit,
    );
    let provider = Provider::connect(config.aws_profile.as_deref()).await;
    let pipeline = Pipeline::new(catalog, provider, config, window);
    let report = pipeline.run_batch(&aois).await?;
    for failure in report.failures.iter() {
        warn!(aoi = %failure.aoi.display(), "Not processed: {}", failure.reason);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    match args.command {
        Commands::Run {
            names,
            config,
            no_tci,
            output,
            keep_intermediate,
        } => run(names, config, no_tci, output, keep_intermediate).await?,
        Commands::Template { path } => {
            RunConfig::from_template(&run_config_toml()).write(&path)?;
            info!(path = %path.display(), "Wrote configuration template");
        }
        Commands::Split {
            image,
            out_dir,
            size,
        } => {
            split_into_tiles(&image, &out_dir, size)?;
        }
        Commands::AddFootprint { catalog, name, bbox } => {
            let [lng_1, lat_1, lng_2, lat_2] = bbox[..] else {
                return Err(anyhow!("--bbox takes four values"));
            };
            let id = add_footprint(&catalog, &name, (lng_1, lat_1, lng_2, lat_2))?;
            info!(id, name = %name, "Added footprint");
        }
        Commands::ConvertShapefiles { path } => {
            let written = convert_shapefiles(&path)?;
            info!(converted = written.len(), "Converted shapefiles");
        }
        Commands::Inspect { geojson } => {
            let summary = describe_catalog(&geojson)?;
            for properties in summary.properties.iter() {
                println!("{}", serde_json::to_string(properties)?);
            }
            println!("Labels: {:?}", summary.labels);
        }
        Commands::Publish { data_dir } => {
            let today = chrono::Local::now().date_naive();
            let branch = publish(&data_dir, &SystemRunner, today).await?;
            info!(branch = %branch, "Published");
        }
    }

    Ok(())
}
