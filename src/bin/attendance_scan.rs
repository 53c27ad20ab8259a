//! attendance_scan - mount one scan session on a local camera
//!
//! This binary:
//! 1. Loads scanner configuration (file named by SCANNER_CONFIG, env overrides)
//! 2. Acquires the configured camera, preferring the rear-facing one
//! 3. Decodes QR codes continuously and submits tokens through the gate
//! 4. Reports each verdict on the terminal
//! 5. Ends on a successful scan, Ctrl-C, or end of stream, releasing the camera

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use attendance_scanner::ui::Ui;
use attendance_scanner::{
    open_camera, Destination, HttpValidator, Navigator, QrDecoder, ScanSession, ScannerConfig,
    ScriptedDecoder, SessionCapabilities,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Scan an attendance QR code and submit it to the attendance endpoint"
)]
struct Args {
    /// Path to a JSON config file.
    #[arg(long, env = "SCANNER_CONFIG")]
    config: Option<PathBuf>,

    /// Camera device: auto, /dev/videoN, file://<image>, or stub://<name>.
    #[arg(long)]
    device: Option<String>,

    /// Decoder backend: rqrr or scripted.
    #[arg(long, default_value = default_decoder())]
    decoder: String,

    /// Payload the scripted decoder reports on every frame.
    #[arg(long)]
    token: Option<String>,

    /// Output style: auto, plain, or pretty.
    #[arg(long)]
    ui: Option<String>,
}

const fn default_decoder() -> &'static str {
    if cfg!(feature = "decode-rqrr") {
        "rqrr"
    } else {
        "scripted"
    }
}

/// Stands in for the dashboard router: records where the student was sent.
struct ExitNavigator;

impl Navigator for ExitNavigator {
    fn go_to(&mut self, destination: &Destination) {
        log::info!("navigating to {}", destination);
        println!("{}", destination);
    }
}

fn build_decoder(args: &Args) -> Result<Box<dyn QrDecoder>> {
    match args.decoder.as_str() {
        #[cfg(feature = "decode-rqrr")]
        "rqrr" => Ok(Box::new(attendance_scanner::RqrrDecoder::new())),
        "scripted" => Ok(Box::new(match args.token.as_deref() {
            Some(token) => ScriptedDecoder::repeating(token),
            None => ScriptedDecoder::default(),
        })),
        other => anyhow::bail!("unknown decoder '{}'", other),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = ScannerConfig::load_from(args.config.as_deref())?;
    if let Some(device) = args.device.clone() {
        cfg.camera.device = device;
    }
    let ui = Ui::from_args(args.ui.as_deref(), std::io::stderr().is_terminal());

    let camera = open_camera(&cfg.camera)?;
    let decoder = build_decoder(&args)?;
    let validator = HttpValidator::new(&cfg)?;
    log::info!("attendance endpoint: {}", validator.endpoint());

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .context("install Ctrl-C handler")?;
    }

    let mut session = ScanSession::new(
        &cfg,
        SessionCapabilities {
            camera,
            decoder,
            validator: Arc::new(validator),
            sink: Box::new(ui.sink()),
            navigator: Box::new(ExitNavigator),
        },
    );

    let started = {
        let _stage = ui.stage("Acquiring camera");
        session.start()
    };
    if let Err(err) = started {
        if let Some(message) = session.camera_error_message() {
            ui.camera_unavailable(message);
            log::debug!("camera error: {:#}", err);
            session.teardown();
            std::process::exit(2);
        }
        return Err(err);
    }

    let stats = {
        let _stage = ui.stage("Scanning for attendance code");
        session.run(&stop)?
    };
    let navigated = session.has_navigated();
    session.teardown();

    log::info!(
        "session ended: {} submitted, {} dropped, {} succeeded, {} failed",
        stats.submitted,
        stats.dropped,
        stats.succeeded,
        stats.failed
    );
    if !navigated {
        std::process::exit(1);
    }
    Ok(())
}
