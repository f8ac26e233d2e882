//! Command-line entry points: capture calibration pairs, solve the rig,
//! run the live loop.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use stereo_calib::{CalibrationStore, Calibrator, ChessboardGeometry};
use stereo_core::{CaptureConfig, SegmenterConfig, StereoMatchConfig, SupervisorConfig};
use stereo_pipeline::{
    CommandGrabber, DepthSegmenter, DualCapture, FrameGrabber, PipelineSupervisor, PngSink,
    StereoEngine, SyntheticGrabber, TerminalKeys,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Stereo depth pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct CameraArgs {
    /// Left camera id.
    #[arg(long, default_value_t = 0)]
    left_cam: u32,

    /// Right camera id.
    #[arg(long, default_value_t = 1)]
    right_cam: u32,

    /// Capture frame width in pixels.
    #[arg(long, default_value_t = 840)]
    width: usize,

    /// Capture frame height in pixels.
    #[arg(long, default_value_t = 820)]
    height: usize,

    /// Still-capture command invoked per frame.
    #[arg(long, default_value = "rpicam-still")]
    capture_cmd: String,

    /// Arguments for the capture command; `{camera}` and `{output}` are
    /// substituted.
    #[arg(
        long,
        default_values_t = [
            "--camera".to_string(),
            "{camera}".to_string(),
            "--output".to_string(),
            "{output}".to_string(),
            "--nopreview".to_string(),
        ]
    )]
    capture_arg: Vec<String>,

    /// Use deterministic synthetic frames instead of real cameras.
    #[arg(long)]
    synthetic: bool,

    /// Per-frame acquisition timeout, seconds.
    #[arg(long, default_value_t = 5)]
    timeout: u64,
}

impl CameraArgs {
    fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            left_camera: self.left_cam,
            right_camera: self.right_cam,
            image_size: (self.width, self.height),
            capture_timeout: Duration::from_secs(self.timeout),
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture calibration image pairs into a folder.
    Capture {
        /// Number of pairs to capture.
        #[arg(long, default_value_t = 15)]
        pairs: usize,

        /// Destination folder for `left_NN.png` / `right_NN.png`.
        #[arg(long, default_value = "image")]
        folder: PathBuf,

        #[command(flatten)]
        camera: CameraArgs,
    },

    /// Solve the stereo calibration from captured pairs.
    Calibrate {
        /// Number of pairs to read from the folder.
        #[arg(long, default_value_t = 15)]
        pairs: usize,

        /// Folder holding the captured pairs.
        #[arg(long, default_value = "image")]
        folder: PathBuf,

        /// Output directory for the calibration artifacts.
        #[arg(long, default_value = "data")]
        data: PathBuf,

        /// Checkerboard rows (squares).
        #[arg(long, default_value_t = 7)]
        rows: usize,

        /// Checkerboard columns (squares).
        #[arg(long, default_value_t = 10)]
        cols: usize,

        /// Physical square size in metres.
        #[arg(long, default_value_t = 0.024)]
        square_size: f64,

        /// Calibration image width in pixels.
        #[arg(long, default_value_t = 840)]
        width: usize,

        /// Calibration image height in pixels.
        #[arg(long, default_value_t = 820)]
        height: usize,
    },

    /// Run the live capture→compute→display loop.
    Run {
        /// Directory holding the calibration artifacts.
        #[arg(long, default_value = "data")]
        data: PathBuf,

        /// Output directory for the live view and snapshots.
        #[arg(long, default_value = "out")]
        out: PathBuf,

        #[command(flatten)]
        camera: CameraArgs,
    },
}

fn main() {
    env_logger::init();
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    match Cli::parse().command {
        Command::Capture {
            pairs,
            folder,
            camera,
        } => capture(pairs, &folder, &camera),
        Command::Calibrate {
            pairs,
            folder,
            data,
            rows,
            cols,
            square_size,
            width,
            height,
        } => calibrate(pairs, &folder, &data, rows, cols, square_size, (width, height)),
        Command::Run { data, out, camera } => run(&data, &out, &camera),
    }
}

fn supervisor() -> Result<PipelineSupervisor> {
    let supervisor = PipelineSupervisor::new(SupervisorConfig::default())?;
    let reaped = supervisor
        .reap_orphans()
        .context("camera device could not be reclaimed")?;
    if reaped > 0 {
        log::warn!("reclaimed {reaped} orphaned capture process(es) from a previous run");
    }
    Ok(supervisor)
}

fn capture(pairs: usize, folder: &PathBuf, camera: &CameraArgs) -> Result<()> {
    let supervisor = supervisor()?;
    if camera.synthetic {
        let grabber = SyntheticGrabber::uniform((camera.width, camera.height));
        capture_with(grabber, pairs, folder, camera)
    } else {
        let grabber = CommandGrabber::new(
            camera.capture_cmd.clone(),
            camera.capture_arg.clone(),
            supervisor.registry(),
            std::env::temp_dir().join("stereodepth"),
        );
        capture_with(grabber, pairs, folder, camera)
    }
}

fn capture_with<G: FrameGrabber>(
    grabber: G,
    pairs: usize,
    folder: &PathBuf,
    camera: &CameraArgs,
) -> Result<()> {
    let mut capture = DualCapture::new(grabber, camera.capture_config())?;
    capture
        .capture_images(pairs, folder)
        .context("capturing calibration pairs")?;
    log::info!("{pairs} pairs written to {}", folder.display());
    Ok(())
}

fn calibrate(
    pairs: usize,
    folder: &PathBuf,
    data: &PathBuf,
    rows: usize,
    cols: usize,
    square_size: f64,
    image_size: (usize, usize),
) -> Result<()> {
    let geometry = ChessboardGeometry::new(rows, cols, square_size)?;
    let mut calibrator = Calibrator::new(geometry, image_size);
    let store = calibrator
        .calibration_process(pairs, folder, data)
        .context("stereo calibration failed")?;
    println!(
        "calibration complete: mean reprojection error {:.4} px, baseline {:.4} m",
        store.params().mean_reproj_error,
        store.params().baseline()
    );
    Ok(())
}

fn run(data: &PathBuf, out: &PathBuf, camera: &CameraArgs) -> Result<()> {
    let supervisor = supervisor()?;
    supervisor.install_interrupt_handler()?;

    let store = CalibrationStore::load_data(data)
        .context("no usable calibration; run `stereodepth calibrate` first")?;

    if camera.synthetic {
        let grabber = SyntheticGrabber::uniform((camera.width, camera.height));
        run_with(&supervisor, store, grabber, out, camera)
    } else {
        let grabber = CommandGrabber::new(
            camera.capture_cmd.clone(),
            camera.capture_arg.clone(),
            supervisor.registry(),
            std::env::temp_dir().join("stereodepth"),
        );
        run_with(&supervisor, store, grabber, out, camera)
    }
}

fn run_with<G: FrameGrabber + 'static>(
    supervisor: &PipelineSupervisor,
    store: CalibrationStore,
    grabber: G,
    out: &PathBuf,
    camera: &CameraArgs,
) -> Result<()> {
    let capture = DualCapture::new(grabber, camera.capture_config())?;
    let segmenter = DepthSegmenter::new(SegmenterConfig::default())?;
    let engine = StereoEngine::new(capture, Some(store), StereoMatchConfig::default(), segmenter)?;
    let sink = PngSink::new(out)?;
    supervisor.process_and_display(engine, sink, TerminalKeys)?;
    log::info!("pipeline stopped cleanly");
    Ok(())
}
