//! fiducam CLI: one-shot detection, multi-camera sessions and marker rendering.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use fiducam::aruco::{render_marker, MarkerDictionary};
use fiducam::detect::{detect_image_file, DetectOptions};
use fiducam::pipeline::{
    DetectionState, DirectorySink, DisplaySink, LoopPhase, NullSink, Session, SessionConfig,
};
use log::LevelFilter;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "fiducam")]
#[command(about = "Find barcodes and square fiducial markers in images and camera streams")]
#[command(version)]
struct Cli {
    /// Log verbosity (off, error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect barcodes, symbols and markers in a single image.
    Detect(DetectArgs),

    /// Run acquisition loops for every camera in a session config.
    Run(RunArgs),

    /// Write a marker of the original ArUco dictionary as PNG.
    RenderMarker {
        /// Marker id (0..1024).
        id: u32,
        /// Output PNG path.
        out: PathBuf,
        /// Side of one marker cell in pixels.
        #[arg(long, default_value = "20")]
        cell_px: u32,
        /// White margin around the marker, in cells.
        #[arg(long, default_value = "1")]
        quiet_cells: u32,
    },

    /// Write the default session config as JSON.
    DefaultConfig {
        /// Output JSON path.
        out: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct DetectArgs {
    /// Path to the input image.
    image: PathBuf,

    /// Run the gradient barcode locator.
    #[arg(long)]
    barcode: bool,

    /// Decode 1D/2D symbols.
    #[arg(long)]
    symbols: bool,

    /// Detect fiducial markers.
    #[arg(long)]
    markers: bool,

    /// Resize to this width before marker detection.
    #[arg(long)]
    working_width: Option<u32>,

    /// Mirror the image before marker detection.
    #[arg(long)]
    flip: bool,

    /// Write the annotated image here.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write the detection report (JSON) here instead of stdout.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Session config (JSON).
    config: PathBuf,

    /// Write annotated frames of each camera under DIR/<camera>/.
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Stop all cameras after this many seconds.
    #[arg(long)]
    duration_secs: Option<u64>,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level)?;

    match cli.command {
        Commands::Detect(args) => run_detect(&args),
        Commands::Run(args) => run_session(&args),
        Commands::RenderMarker {
            id,
            out,
            cell_px,
            quiet_cells,
        } => run_render_marker(id, &out, cell_px, quiet_cells),
        Commands::DefaultConfig { out } => {
            SessionConfig::default().write_json(&out)?;
            log::info!("default config written to {}", out.display());
            Ok(())
        }
    }
}

#[cfg(feature = "tracing")]
fn init_logging(_level: LevelFilter) -> CliResult<()> {
    fiducam::core::init_tracing(false);
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(level: LevelFilter) -> CliResult<()> {
    fiducam::core::init_with_level(level)?;
    Ok(())
}

// ── detect ─────────────────────────────────────────────────────────────

fn run_detect(args: &DetectArgs) -> CliResult<()> {
    let any = args.barcode || args.symbols || args.markers;
    let mut opts = if any {
        DetectOptions {
            locator: args.barcode.then(Default::default),
            symbols: args.symbols.then(Default::default),
            markers: args.markers.then(Default::default),
            ..Default::default()
        }
    } else {
        DetectOptions::all()
    };
    if let Some(markers) = opts.markers.as_mut() {
        markers.working_width = args.working_width;
        markers.flip_horizontal = args.flip;
    }

    log::info!("loading image: {}", args.image.display());
    let (report, annotated) = detect_image_file(&args.image, &opts)?;

    let json = serde_json::to_string_pretty(&report)?;
    match &args.report {
        Some(path) => {
            std::fs::write(path, &json)?;
            log::info!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }

    if let Some(out) = &args.out {
        annotated.to_rgb_image().save(out)?;
        log::info!("annotated image written to {}", out.display());
    }
    Ok(())
}

// ── run ────────────────────────────────────────────────────────────────

/// Logs a line whenever a camera's payload or marker id changes, then hands
/// the frame on.
struct ChangeLogger {
    inner: Box<dyn DisplaySink>,
    last: Option<(String, i64)>,
}

impl DisplaySink for ChangeLogger {
    fn publish(&mut self, camera: &str, frame: fiducam::Frame, state: &DetectionState) {
        let key = (state.last_payload.clone(), state.last_marker_id);
        if self.last.as_ref() != Some(&key) {
            log::info!(
                "{camera}: payload '{}' ({}), marker {}",
                state.last_payload,
                state.last_symbology,
                state.last_marker_id
            );
            self.last = Some(key);
        }
        self.inner.publish(camera, frame, state);
    }
}

fn run_session(args: &RunArgs) -> CliResult<()> {
    let config = SessionConfig::load_json(&args.config)?;
    let frames_dir = args.frames_dir.clone();

    let session = Session::start(&config, |cam| {
        let inner: Box<dyn DisplaySink> = match &frames_dir {
            Some(dir) => Box::new(DirectorySink::new(dir.join(&cam.id))),
            None => Box::new(NullSink),
        };
        Box::new(ChangeLogger { inner, last: None })
    })?;

    let deadline = args.duration_secs.map(|s| Instant::now() + Duration::from_secs(s));
    while !session.loops().iter().all(|l| l.phase() == LoopPhase::Stopped) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::info!("duration elapsed, stopping");
            session.stop_all();
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    let store = session.store().clone();
    for (camera, stats) in session.join() {
        let state = store.get(&camera);
        println!(
            "{camera}: {} frame(s), {} transient, {} unexpected; payload '{}' ({}), marker {}",
            stats.frames,
            stats.transient_errors,
            stats.unexpected_errors,
            state.last_payload,
            state.last_symbology,
            state.last_marker_id
        );
    }
    Ok(())
}

// ── render-marker ──────────────────────────────────────────────────────

fn run_render_marker(id: u32, out: &Path, cell_px: u32, quiet_cells: u32) -> CliResult<()> {
    let dict = MarkerDictionary::ArucoOriginal.dictionary();
    let img = render_marker(&dict, id, cell_px, quiet_cells).ok_or_else(|| -> CliError {
        format!("marker id {id} is outside the {} dictionary ({} ids)", dict.name, dict.len()).into()
    })?;
    img.save(out)?;
    log::info!("marker {id} written to {}", out.display());
    Ok(())
}
