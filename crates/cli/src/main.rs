//! SeepWatch CLI - pipeline leak detection from Sentinel-2 imagery

mod settings;
mod summary;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use seepwatch_algorithms::anomaly::{candidates_to_geojson, ClusterParams};
use seepwatch_algorithms::components::Connectivity;
use seepwatch_algorithms::pipeline::{BandSource, Detection, DetectionParams, LeakDetector, SceneBands};
use seepwatch_algorithms::vector::load_aoi;
use seepwatch_cloud::blocking::{cancel_on_interrupt, IngestorBlocking};
use seepwatch_cloud::{CatalogClient, Fetcher, HttpTransport, Ingestor};
use seepwatch_core::io::{read_geotiff, write_geotiff, GeoTiffOptions};
use seepwatch_core::{CancelFlag, Raster};

use settings::Settings;
use summary::DetectSummary;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "seepwatch")]
#[command(author, version, about = "Pipeline leak detection from satellite imagery", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download imagery of the pipeline corridor around a date
    Ingest {
        /// Pipeline geometry (GeoJSON lines or polygons)
        #[arg(short, long)]
        geometry: PathBuf,
        /// Target acquisition date (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,
        /// Output directory (defaults to the data directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare two scenes and rank leak candidates inside the corridor
    Detect {
        /// Baseline imagery: multi-band GeoTIFF or <scene>_green.tif
        baseline: PathBuf,
        /// Current imagery: multi-band GeoTIFF or <scene>_green.tif
        current: PathBuf,
        /// Pipeline geometry (GeoJSON lines or polygons)
        #[arg(short, long)]
        geometry: PathBuf,
        /// Directory for index rasters, change raster, candidates and summary
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 1-based green band in multi-band files
        #[arg(long, default_value = "3")]
        green_band: usize,
        /// 1-based near-infrared band in multi-band files
        #[arg(long, default_value = "8")]
        nir_band: usize,
        /// Maximum number of candidates reported
        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,
        /// Change regions smaller than this many pixels are dropped as noise
        #[arg(long, default_value = "10")]
        min_region_pixels: usize,
        /// Pixel adjacency for change regions
        #[arg(short, long, value_enum, default_value = "eight")]
        connectivity: ConnectivityArg,
    },
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ConnectivityArg {
    Four,
    Eight,
}

impl From<ConnectivityArg> for Connectivity {
    fn from(c: ConnectivityArg) -> Self {
        match c {
            ConnectivityArg::Four => Connectivity::Four,
            ConnectivityArg::Eight => Connectivity::Eight,
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = match std::env::var("SEEPWATCH_LOG") {
        Ok(s) => s
            .parse::<Level>()
            .with_context(|| format!("Invalid SEEPWATCH_LOG level: {s}"))?,
        Err(_) if verbose => Level::DEBUG,
        Err(_) => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn load_scene(path: &Path, green_band: usize, nir_band: usize) -> Result<SceneBands> {
    let pb = spinner(&format!("Reading {}...", path.display()));
    let source = BandSource::resolve(path, green_band, nir_band)
        .with_context(|| format!("Cannot use {} as imagery", path.display()))?;
    let scene = SceneBands::load(&source)
        .with_context(|| format!("Failed to read bands of {}", path.display()))?;
    pb.finish_and_clear();
    info!("{}: {} x {}", scene.id, scene.green.cols(), scene.green.rows());
    Ok(scene)
}

fn write_raster<T: seepwatch_core::RasterElement>(
    raster: &Raster<T>,
    path: &Path,
    options: GeoTiffOptions,
) -> Result<()> {
    write_geotiff(raster, path, Some(options))
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn write_outputs(detection: &Detection, dir: &Path) -> Result<()> {
    let pb = spinner("Writing outputs...");
    std::fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;

    let nan = GeoTiffOptions { nan_nodata: true };
    write_raster(detection.baseline_index.raster(), &dir.join("baseline_ndwi.tif"), nan.clone())?;
    write_raster(detection.current_index.raster(), &dir.join("current_ndwi.tif"), nan)?;
    write_raster(
        detection.change_mask.classes(),
        &dir.join("change.tif"),
        GeoTiffOptions::default(),
    )?;

    let fc = candidates_to_geojson(&detection.candidates, detection.change_mask.classes().crs());
    let geojson_path = dir.join("candidates.geojson");
    std::fs::write(&geojson_path, fc.to_string())
        .with_context(|| format!("Failed to write {}", geojson_path.display()))?;

    let summary_path = dir.join("summary.json");
    let summary = serde_json::to_string_pretty(&DetectSummary::new(detection))
        .context("Failed to serialize summary")?;
    std::fs::write(&summary_path, summary)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    pb.finish_and_clear();
    Ok(())
}

fn print_detection(detection: &Detection) {
    let stats = &detection.stats;
    println!("Baseline: {}", detection.baseline_id);
    println!("Current:  {}", detection.current_id);
    println!("Pixel size: {:.2} m", detection.pixel_size_m);
    println!(
        "Changed pixels: {} (gained {}, lost {}) of {} valid",
        stats.total_changed_pixels, stats.gained_pixels, stats.lost_pixels, stats.valid_pixels
    );
    if let (Some(mean), Some(std)) = (stats.mean_change, stats.std_change) {
        println!("NDWI change: mean {:.4}, std {:.4}", mean, std);
    }

    if detection.candidates.is_empty() {
        println!("\nNo leak candidates.");
    } else {
        println!("\nLeak candidates:");
        for (i, c) in detection.candidates.iter().enumerate() {
            println!(
                "  {:>2}. area {:>9.1} m²  confidence {:.2}  centroid ({:.2}, {:.2})",
                i + 1,
                c.area_m2,
                c.confidence,
                c.centroid.0,
                c.centroid.1
            );
        }
    }
    if !detection.losses.is_empty() {
        let lost: f64 = detection.losses.iter().map(|l| l.area_m2).sum();
        println!(
            "\nWater lost in {} region(s), {:.1} m² in total",
            detection.losses.len(),
            lost
        );
    }
}

// ─── Commands ───────────────────────────────────────────────────────────

fn run_ingest(
    settings: &Settings,
    cancel: &CancelFlag,
    geometry: &Path,
    date: NaiveDate,
    output: Option<PathBuf>,
) -> Result<()> {
    let aoi = load_aoi(geometry, &settings.buffer())
        .with_context(|| format!("Failed to load geometry {}", geometry.display()))?;
    info!("Corridor area: {:.0} m²", aoi.area_m2());

    let catalog = CatalogClient::sentinel2(
        settings.stac_client(cancel),
        settings.stac_api_url.as_deref(),
    )
    .context("Failed to set up catalog search")?;
    let transport = HttpTransport::new(settings.request_timeout(), settings.max_retries)
        .context("Failed to set up downloads")?
        .with_cancel(cancel.clone());
    let fetcher = Fetcher::new(Arc::new(transport), settings.fetch(output));
    let output_dir = fetcher.output_dir().to_path_buf();
    let ingestor = IngestorBlocking::new(
        Ingestor::new(catalog, fetcher, settings.ingest()).with_cancel(cancel.clone()),
    )
    .context("Failed to start downloads")?;

    let start = Instant::now();
    let pb = spinner("Searching and downloading imagery...");
    let result = ingestor.ingest(&aoi, date);
    pb.finish_and_clear();
    let report = result.context("Imagery ingestion failed")?;

    println!(
        "Downloaded {} of {} asset(s) into {} ({} attempt(s))",
        report.outcome.obtained(),
        report.outcome.requested,
        output_dir.display(),
        report.attempts
    );
    for file in &report.outcome.files {
        println!("  {} {:<8} {}", file.scene_id, file.name, file.path.display());
    }
    println!("  Processing time: {:.2?}", start.elapsed());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_detect(
    settings: &Settings,
    cancel: &CancelFlag,
    baseline: &Path,
    current: &Path,
    geometry: &Path,
    output: Option<PathBuf>,
    green_band: usize,
    nir_band: usize,
    top_k: usize,
    min_region_pixels: usize,
    connectivity: ConnectivityArg,
) -> Result<()> {
    let aoi = load_aoi(geometry, &settings.buffer())
        .with_context(|| format!("Failed to load geometry {}", geometry.display()))?;
    let scenes = [
        load_scene(baseline, green_band, nir_band)?,
        load_scene(current, green_band, nir_band)?,
    ];

    let connectivity = Connectivity::from(connectivity);
    let params = DetectionParams {
        water_threshold: settings.ndwi_threshold,
        change: seepwatch_algorithms::imagery::ChangeParams {
            connectivity,
            ..settings.change(min_region_pixels)
        },
        cluster: ClusterParams { connectivity },
        rank: settings.rank(top_k),
    };

    let start = Instant::now();
    let detection = LeakDetector::new(aoi, params)
        .with_cancel(cancel.clone())
        .run(&scenes)
        .context("Leak detection failed")?;
    let elapsed = start.elapsed();

    print_detection(&detection);
    if let Some(dir) = output {
        write_outputs(&detection, &dir)?;
        println!("\nOutputs saved to: {}", dir.display());
    }
    println!("  Processing time: {:.2?}", elapsed);
    Ok(())
}

fn run_info(input: &Path) -> Result<()> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(input, None)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    pb.finish_and_clear();

    let (rows, cols) = raster.shape();
    let bounds = raster.bounds();
    let stats = raster.statistics();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
    println!("Cell size: {}", raster.cell_size());
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    match raster.crs() {
        Some(crs) => println!("CRS: {}", crs),
        None => println!("CRS: unknown"),
    }
    if let Some(nodata) = raster.nodata() {
        println!("NoData: {}", nodata);
    }
    println!("\nStatistics:");
    if let Some(min) = stats.min {
        println!("  Min: {:.4}", min);
    }
    if let Some(max) = stats.max {
        println!("  Max: {:.4}", max);
    }
    if let Some(mean) = stats.mean {
        println!("  Mean: {:.4}", mean);
    }
    if !raster.is_empty() {
        println!(
            "  Valid cells: {} ({:.1}%)",
            stats.valid_count,
            100.0 * stats.valid_count as f64 / raster.len() as f64
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let cancel = CancelFlag::new();
    if !matches!(cli.command, Commands::Info { .. }) {
        cancel_on_interrupt(cancel.clone()).context("Failed to install Ctrl-C handler")?;
    }

    match cli.command {
        Commands::Ingest {
            geometry,
            date,
            output,
        } => run_ingest(&cli.settings, &cancel, &geometry, date, output),

        Commands::Detect {
            baseline,
            current,
            geometry,
            output,
            green_band,
            nir_band,
            top_k,
            min_region_pixels,
            connectivity,
        } => {
            if top_k == 0 {
                bail!("--top-k must be at least 1");
            }
            run_detect(
                &cli.settings,
                &cancel,
                &baseline,
                &current,
                &geometry,
                output,
                green_band,
                nir_band,
                top_k,
                min_region_pixels,
                connectivity,
            )
        }

        Commands::Info { input } => run_info(&input),
    }
}
