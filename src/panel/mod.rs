//! Panel runtime
//!
//! Wires the coordinators to their drivers and runs the two periodic activities
//! on the tokio scheduler:
//!
//! - cooling poll (default every 3000 ms) until the camera stabilizes
//! - stage poll (default every 100 ms): jog edges, then position refresh
//!
//! Acquisitions run in their own task. A single `watch` channel carries the
//! shutdown signal to every loop.

pub mod camera;
pub mod stage;

pub use camera::{run_cooling_loop, CameraPanel};
pub use stage::{run_stage_loop, StagePanel};

use tokio::sync::watch;
use tracing::{error, info};

use crate::config::Settings;
use crate::error::{AppResult, DaqError};
use crate::hardware::{SharedCamera, SharedStage};
use crate::status::{StatusBoard, StatusSnapshot};

/// Both device panels plus the shared status surface.
pub struct LabPanel {
    status: StatusBoard,
    shutdown_tx: watch::Sender<bool>,
    camera: Option<CameraPanel>,
    stage: Option<StagePanel>,
}

impl LabPanel {
    /// Build the panel for the devices given. A `None` device is simply absent.
    ///
    /// The stage poll starts immediately; the cooling poll starts with
    /// [`CameraPanel::start_cooling`]. Must be called from within a tokio runtime.
    pub fn new(
        settings: &Settings,
        camera: Option<SharedCamera>,
        stage: Option<SharedStage>,
    ) -> AppResult<Self> {
        let status = StatusBoard::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let camera = camera.map(|driver| {
            CameraPanel::new(driver, &settings.camera, status.clone(), shutdown_rx.clone())
        });
        let stage = stage
            .map(|driver| {
                StagePanel::new(driver, &settings.stage, status.clone(), shutdown_rx.clone())
            })
            .transpose()?;

        info!(
            camera = camera.is_some(),
            stage = stage.is_some(),
            "panel started"
        );

        Ok(Self {
            status,
            shutdown_tx,
            camera,
            stage,
        })
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    pub fn camera(&mut self) -> AppResult<&mut CameraPanel> {
        self.camera
            .as_mut()
            .ok_or_else(|| DaqError::Configuration("camera is not part of this panel".into()))
    }

    pub fn stage(&mut self) -> AppResult<&mut StagePanel> {
        self.stage
            .as_mut()
            .ok_or_else(|| DaqError::Configuration("stage is not part of this panel".into()))
    }

    /// Signal every loop to stop, then wait for them.
    ///
    /// Keeps going past individual failures and reports them together.
    pub async fn shutdown(mut self) -> AppResult<()> {
        self.shutdown_tx.send_replace(true);
        let mut errors = Vec::new();

        if let Some(stage) = self.stage.as_mut() {
            if let Err(err) = stage.shutdown().await {
                error!(error = %err, "stage shutdown failed");
                errors.push(err);
            }
        }
        if let Some(camera) = self.camera.as_mut() {
            if let Err(err) = camera.shutdown().await {
                error!(error = %err, "camera shutdown failed");
                errors.push(err);
            }
        }

        if errors.is_empty() {
            info!("panel shut down");
            Ok(())
        } else {
            Err(DaqError::ShutdownFailed(errors))
        }
    }
}
