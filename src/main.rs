//! lab_panel: runs the camera/stage panel core against simulated drivers.
//!
//! Cools the camera to the configured setpoint, captures one spectrum once the
//! temperature holds, and keeps the stage poll running until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use lab_panel::camera::AcquiredSpectrum;
use lab_panel::config::{PanelMode, Settings, DEFAULT_CONFIG_PATH};
use lab_panel::hardware::mock::{SimulatedCamera, SimulatedStage};
use lab_panel::hardware::{SharedCamera, SharedStage};
use lab_panel::{logging, AppResult, LabPanel};

#[derive(Parser, Debug)]
#[command(name = "lab_panel", version, about = "Cooled camera and stage control panel")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override `application.mode`
    #[arg(long, value_enum)]
    mode: Option<PanelMode>,

    /// Print every status change as a JSON line
    #[arg(long)]
    json_status: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(mode) = cli.mode {
        settings.application.mode = mode;
    }
    logging::init_from_config(&settings).context("failed to initialise logging")?;

    info!(
        name = %settings.application.name,
        mode = ?settings.application.mode,
        "starting with simulated hardware"
    );

    let mode = settings.application.mode;
    let camera: Option<SharedCamera> = mode
        .includes_camera()
        .then(|| Arc::new(Mutex::new(SimulatedCamera::new())) as SharedCamera);
    let stage: Option<SharedStage> = mode
        .includes_stage()
        .then(|| Arc::new(Mutex::new(SimulatedStage::new())) as SharedStage);

    let mut panel = LabPanel::new(&settings, camera, stage)?;

    let mut status_rx = panel.subscribe();
    let json_status = cli.json_status;
    let status_task = tokio::spawn(async move {
        let mut last_message = String::new();
        while status_rx.changed().await.is_ok() {
            let snapshot = status_rx.borrow_and_update().clone();
            if json_status {
                match serde_json::to_string(&snapshot) {
                    Ok(line) => println!("{line}"),
                    Err(err) => warn!(error = %err, "status serialization failed"),
                }
            } else if snapshot.message != last_message {
                info!(message = %snapshot.message, temperature = ?snapshot.temperature, "status");
                last_message = snapshot.message;
            }
        }
    });

    let mut interrupted = false;
    if mode.includes_camera() {
        let target = settings.camera.target_temperature;
        panel.camera()?.start_cooling(target).await?;

        tokio::select! {
            result = acquire_when_stabilized(&mut panel) => match result {
                Ok(Some(spectrum)) => info!(
                    points = spectrum.spectrum.len(),
                    peak = spectrum.spectrum.iter().copied().max().unwrap_or_default(),
                    "spectrum captured"
                ),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "acquisition did not complete"),
            },
            _ = tokio::signal::ctrl_c() => interrupted = true,
        }
    }

    if !interrupted {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
    }
    info!("interrupted");

    panel.shutdown().await?;
    status_task.abort();
    Ok(())
}

/// Wait for the cooling gate, then capture one spectrum.
async fn acquire_when_stabilized(panel: &mut LabPanel) -> AppResult<Option<AcquiredSpectrum>> {
    let mut status_rx = panel.subscribe();
    while !status_rx.borrow_and_update().acquisition_allowed {
        if status_rx.changed().await.is_err() {
            return Ok(None);
        }
    }
    let handle = panel.camera()?.acquire()?;
    handle.await?.map(Some)
}
