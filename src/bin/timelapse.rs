//! timelapse - periodic still capture from a network camera
//!
//! This binary:
//! 1. Loads configuration (file + environment) and applies CLI overrides
//! 2. Resolves the camera id to an RTSP URL (or uses the synthetic source in test mode)
//! 3. Runs a capture session in continuous, intermittent, or snapshot mode
//! 4. Stops cleanly on Ctrl-C, releasing the stream

use anyhow::{anyhow, Result};
use clap::Parser;

use timelapse_capture::{
    CameraRegistry, CaptureMode, CaptureSession, ConnectionTarget, CredentialStore,
    ImageDirectorySink, RtspSource, Shutdown, SnapshotOutcome, StreamSource, SyntheticSource,
    ThreadSleeper, TimelapseConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Time lapse recording with network cameras")]
struct Args {
    /// Camera id from the camera registry, optionally with a stream variant ("garden.highres").
    camera: String,
    /// Location (e.g. "garden") or portrayed object (e.g. "sprouting plant"). Names the output directory.
    label: String,
    /// Use the synthetic test source instead of the camera.
    #[arg(short, long)]
    test: bool,
    /// Capture a single image and exit.
    #[arg(short, long)]
    snapshot: bool,
    /// Interval between image captures in seconds. Default: 600
    #[arg(short, long, value_name = "SECS")]
    interval: Option<u64>,
    /// Number of frames to flush after connecting. Default: 0
    #[arg(short, long, value_name = "FRAMES")]
    flush: Option<u32>,
    /// Restart the camera connection on every capture cycle.
    #[arg(short = 'r', long)]
    restart_every_cycle: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = TimelapseConfig::load()?;
    cfg.apply_overrides(args.interval, args.flush)?;

    let shutdown = Shutdown::new();
    shutdown
        .install_signal_handler()
        .expect("error setting Ctrl-C handler");

    let sink = ImageDirectorySink::new(&cfg.output_root, &args.label)?;
    log::info!("writing images to {}", sink.directory().display());

    let outcome = if args.test {
        let target = ConnectionTarget::new(format!("stub://{}", args.camera));
        let source = SyntheticSource::new(cfg.synthetic.clone());
        run(target, source, sink, &cfg, &args, &shutdown)
    } else {
        let registry = CameraRegistry::load(&cfg.cameras_path)?;
        let credentials = CredentialStore::load(&cfg.credentials_path)?;
        let target = registry.resolve(&args.camera, &credentials)?;
        run(target, RtspSource::default(), sink, &cfg, &args, &shutdown)
    };

    match outcome {
        Some(SnapshotOutcome::Aborted { attempts }) => Err(anyhow!(
            "no frame captured from '{}' after {} attempts",
            args.camera,
            attempts
        )),
        Some(SnapshotOutcome::Interrupted) => {
            log::warn!("snapshot interrupted before a frame was captured");
            Ok(())
        }
        Some(SnapshotOutcome::Captured) | None => Ok(()),
    }
}

fn run<S: StreamSource>(
    target: ConnectionTarget,
    source: S,
    sink: ImageDirectorySink,
    cfg: &TimelapseConfig,
    args: &Args,
    shutdown: &Shutdown,
) -> Option<SnapshotOutcome> {
    let mut session = CaptureSession::new(
        target,
        source,
        sink,
        cfg.capture.clone(),
        ThreadSleeper::new(shutdown.clone()),
    )
    .with_shutdown(shutdown.clone());

    if args.snapshot {
        return Some(session.snapshot_capture());
    }

    let mode = if args.restart_every_cycle {
        CaptureMode::Intermittent
    } else {
        CaptureMode::Continuous
    };
    session.start_capture(mode);
    None
}
