use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use panoplan_core::annotation::{AnnotationStore, ImageAnnotationSet, ImageIndex, OpeningStatistics, SurfaceId};
use panoplan_core::calibration::Calibration;
use panoplan_core::config::{PlanConfig, ViewerSettings};
use panoplan_core::csv_export::{export_openings_csv, export_rooms_csv, CsvExportConfig};
use panoplan_core::detector::{detect_and_import, CandidatePolygon, StaticCandidates};
use panoplan_core::export::{export_project, import_project, load_project, save_project, to_json, ImportedProject};
use panoplan_core::floor_plan::{project_floor_plan, FloorPlanOutcome};
use panoplan_core::shape::{measure_all_surfaces, measure_surface, RoomMeasurement};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod raster;

#[derive(Debug, Parser)]
#[command(name = "panoplan")]
#[command(about = "Measure rooms and draw floor plans from panorama annotations")]
pub struct Cli {
    /// JSON configuration file (defaults come from PANOPLAN_* variables)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print per-image statistics and room measurements.
    Summary {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the room measurement of one surface, or all surfaces of an image.
    Measure {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        image: ImageIndex,
        #[arg(long)]
        surface: Option<SurfaceId>,
    },
    /// Draw the top-down floor plan of an image.
    FloorPlan {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        image: ImageIndex,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = PlanFormat::Svg)]
        format: PlanFormat,
        #[arg(long, value_name = "PX")]
        canvas_size: Option<u32>,
        #[arg(long, value_name = "PX")]
        margin: Option<u32>,
    },
    /// Turn candidate polygons into a room with openings and write a project file.
    Detect {
        #[arg(value_name = "CANDIDATES")]
        candidates: PathBuf,
        #[arg(long, default_value_t = 0)]
        image: ImageIndex,
        /// Image file name recorded in the project
        #[arg(long)]
        name: Option<String>,
        /// Image size used when no room candidate survives, e.g. 1024x768
        #[arg(long, value_name = "WxH", value_parser = parse_frame)]
        frame: Option<(f64, f64)>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Write rooms or openings as CSV.
    ExportCsv {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_enum)]
        kind: CsvKind,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PlanFormat {
    Svg,
    Png,
}

impl PlanFormat {
    fn extension(self) -> &'static str {
        match self {
            PlanFormat::Svg => "svg",
            PlanFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CsvKind {
    Rooms,
    Openings,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageSummary {
    image: ImageIndex,
    name: Option<String>,
    points: usize,
    lines: usize,
    surfaces: usize,
    openings: OpeningStatistics,
    rooms: Vec<RoomMeasurement>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryOutput {
    calibrated: bool,
    scale: f64,
    unit: &'static str,
    images: Vec<ImageSummary>,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_tracing();

    let config = match &cli.config {
        Some(path) => PlanConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PlanConfig::from_env().context("invalid PANOPLAN_* environment")?,
    };

    match cli.command {
        Commands::Summary { file } => run_summary(&file, &config),
        Commands::Measure { file, image, surface } => run_measure(&file, image, surface, &config),
        Commands::FloorPlan { file, image, output, format, canvas_size, margin } => {
            let mut config = config;
            if let Some(size) = canvas_size {
                config = config.with_canvas_size(size);
            }
            if let Some(margin) = margin {
                config = config.with_canvas_margin(margin);
            }
            run_floor_plan(&file, image, output.as_deref(), format, &config)
        }
        Commands::Detect { candidates, image, name, frame, output } => {
            run_detect(&candidates, image, name, frame, output.as_deref(), &config)
        }
        Commands::ExportCsv { file, kind, output } => run_export_csv(&file, kind, output.as_deref(), &config),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second `run` in the same process keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn open_project(file: &Path) -> Result<ImportedProject> {
    ensure_file_exists(file)?;
    let export = load_project(file).with_context(|| format!("failed to read project {}", file.display()))?;
    Ok(import_project(&export))
}

fn image_set(store: &AnnotationStore, image: ImageIndex) -> Result<&ImageAnnotationSet> {
    store.set(image).with_context(|| format!("image {image} has no annotations"))
}

fn print_json<S: Serialize>(value: &S) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_summary(file: &Path, config: &PlanConfig) -> Result<()> {
    let project = open_project(file)?;
    let calibration = &project.calibration;

    let images = project
        .store
        .sets()
        .map(|set| {
            let statistics = set.statistics();
            ImageSummary {
                image: set.image_index(),
                name: project.store.image_name(set.image_index()).map(str::to_string),
                points: statistics.point_count,
                lines: statistics.line_count,
                surfaces: statistics.surface_count,
                openings: set.opening_statistics(),
                rooms: measure_all_surfaces(set, config.rectangle_tolerance, calibration),
            }
        })
        .collect();

    print_json(&SummaryOutput {
        calibrated: calibration.is_calibrated(),
        scale: calibration.scale(),
        unit: calibration.unit(),
        images,
    })
}

fn run_measure(file: &Path, image: ImageIndex, surface: Option<SurfaceId>, config: &PlanConfig) -> Result<()> {
    let project = open_project(file)?;
    let set = image_set(&project.store, image)?;

    match surface {
        Some(id) => {
            let measurement = measure_surface(set, id, config.rectangle_tolerance, &project.calibration)
                .with_context(|| format!("failed to measure surface {id} of image {image}"))?;
            print_json(&measurement)
        }
        None => print_json(&measure_all_surfaces(set, config.rectangle_tolerance, &project.calibration)),
    }
}

fn run_floor_plan(
    file: &Path,
    image: ImageIndex,
    output: Option<&Path>,
    format: PlanFormat,
    config: &PlanConfig,
) -> Result<()> {
    let project = open_project(file)?;
    let empty = ImageAnnotationSet::new(image);
    let set = project.store.set(image).unwrap_or(&empty);

    let mut options = config.floor_plan.clone();
    if options.margin.saturating_mul(2) >= options.width.min(options.height) {
        anyhow::bail!("margin {} leaves no room on a {}x{} canvas", options.margin, options.width, options.height);
    }
    if let Some(name) = project.store.image_name(image) {
        options = options.with_title_from_image_name(name);
    }

    let scene = match project_floor_plan(set, &project.calibration, &options) {
        FloorPlanOutcome::Drawn(scene) => scene,
        FloorPlanOutcome::NothingToDraw(reason) => {
            eprintln!("warning: nothing to draw for image {image}: {reason}");
            return Ok(());
        }
    };

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_plan_output(file, image, format));
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    match format {
        PlanFormat::Svg => fs::write(&output, scene.to_svg())
            .with_context(|| format!("failed to write floor plan to {}", output.display()))?,
        PlanFormat::Png => raster::render_png(&scene)
            .save(&output)
            .with_context(|| format!("failed to write image to {}", output.display()))?,
    }
    info!(image, elements = scene.elements.len(), path = %output.display(), "floor plan written");

    println!("{}", output.display());
    Ok(())
}

fn run_detect(
    candidates: &Path,
    image: ImageIndex,
    name: Option<String>,
    frame: Option<(f64, f64)>,
    output: Option<&Path>,
    config: &PlanConfig,
) -> Result<()> {
    ensure_file_exists(candidates)?;
    let json = fs::read_to_string(candidates)?;
    let polygons: Vec<CandidatePolygon> =
        serde_json::from_str(&json).context("failed to parse candidate polygons")?;
    let source = StaticCandidates::new().with_candidates(image, polygons);

    let mut store = AnnotationStore::new();
    store.register_image(image, name.unwrap_or_else(|| format!("Image_{image}")));
    let imported = detect_and_import(&source, store.set_mut(image), &config.detector, frame)?
        .context("no room outline found and no --frame given")?;
    info!(surface = imported.surface_id, openings = imported.opening_ids.len(), "layout detected");

    let export = export_project(&store, &Calibration::new(), &ViewerSettings::default())?;
    match output {
        Some(path) => {
            save_project(path, &export).with_context(|| format!("failed to write {}", path.display()))?;
            println!("{}", path.display());
        }
        None => println!("{}", to_json(&export)?),
    }
    Ok(())
}

fn run_export_csv(file: &Path, kind: CsvKind, output: Option<&Path>, config: &PlanConfig) -> Result<()> {
    let project = open_project(file)?;
    let csv_config = CsvExportConfig { rectangle_tolerance: config.rectangle_tolerance, ..Default::default() };

    let mut buffer = Vec::new();
    match kind {
        CsvKind::Rooms => export_rooms_csv(&mut buffer, &project.store, &project.calibration, &csv_config)?,
        CsvKind::Openings => export_openings_csv(&mut buffer, &project.store, &project.calibration, &csv_config)?,
    }

    match output {
        Some(path) => {
            fs::write(path, &buffer).with_context(|| format!("failed to write {}", path.display()))?;
            println!("{}", path.display());
        }
        None => std::io::stdout().write_all(&buffer)?,
    }
    Ok(())
}

fn parse_frame(value: &str) -> std::result::Result<(f64, f64), String> {
    let (width, height) = value.split_once(['x', 'X']).ok_or_else(|| format!("expected WxH, got {value}"))?;
    let parse = |s: &str| s.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0);
    match (parse(width), parse(height)) {
        (Some(w), Some(h)) => Ok((w, h)),
        _ => Err(format!("invalid frame size: {value}")),
    }
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_plan_output(file: &Path, image: ImageIndex, format: PlanFormat) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("project");

    file.with_file_name(format!("{stem}-image-{image}-floor-plan.{}", format.extension()))
}
