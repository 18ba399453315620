//! ktm_kiosk - terminal front-end for the KTM scan kiosk
//!
//! This binary:
//! 1. Loads configuration (file, environment, flags)
//! 2. Opens the camera (alerting and staying idle on failure)
//! 3. Runs the scan session, fed by operator commands on stdin
//! 4. Releases the camera on `quit`, EOF or Ctrl-C

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use ktm_kiosk::config::{ConfigOverrides, KioskConfig};
use ktm_kiosk::console::{self, HELP};
use ktm_kiosk::session::{Event, Session, CAMERA_UNAVAILABLE};
use ktm_kiosk::ui::{TerminalPresenter, Ui};
use ktm_kiosk::{open_camera, HttpRecognizer, HttpSubmitter, Presenter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Scan student cards and record lab computer rentals")]
struct Args {
    /// Path to a TOML (or .json) configuration file.
    #[arg(long, env = "KTM_CONFIG")]
    config: Option<PathBuf>,

    /// Camera URI: /dev/videoN, http(s)://... or stub://name.
    #[arg(long)]
    camera: Option<String>,

    /// Base URL of the scan/submit service.
    #[arg(long)]
    api_base: Option<String>,

    /// Write the overlay layer to this PNG after every render.
    #[arg(long)]
    overlay_out: Option<PathBuf>,

    /// Output style: auto, plain or pretty.
    #[arg(long)]
    ui: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let overrides = ConfigOverrides {
        camera: args.camera,
        api_base: args.api_base,
        overlay_path: args.overlay_out,
    };
    let cfg = KioskConfig::load_with_overrides(args.config.as_deref(), &overrides)?;

    let ui = Ui::from_args(args.ui.as_deref(), std::io::stderr().is_terminal());
    let mut presenter = TerminalPresenter::new(ui, cfg.overlay_path.clone(), cfg.stations.clone());

    let camera = match open_camera(&cfg.camera) {
        Ok(camera) => {
            log::info!("camera ready: {}", camera.describe());
            Some(camera)
        }
        Err(err) => {
            log::error!("error accessing camera {}: {:#}", cfg.camera.uri, err);
            presenter.alert(CAMERA_UNAVAILABLE);
            None
        }
    };

    let recognizer = HttpRecognizer::new(&cfg.api);
    let submitter = HttpSubmitter::new(&cfg.api);
    log::info!(
        "scan endpoint {}, submit endpoint {}",
        recognizer.url(),
        submitter.url()
    );

    let session = Session::new(
        &cfg,
        camera,
        Arc::new(recognizer),
        Arc::new(submitter),
        presenter,
    );

    let ctrlc_events = session.sender();
    ctrlc::set_handler(move || {
        let _ = ctrlc_events.send(Event::Shutdown);
    })?;

    let input_events = session.sender();
    std::thread::Builder::new()
        .name("ktm-console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            if let Err(err) = console::forward_commands(stdin.lock(), &input_events) {
                log::error!("{:#}", err);
                let _ = input_events.send(Event::Shutdown);
            }
        })?;

    eprintln!("{HELP}");
    session.run();
    Ok(())
}
