//! Camera side of the panel: cooling loop and background acquisitions.

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::camera::{
    AcquiredSpectrum, AcquisitionGate, AcquisitionSequencer, CoolingController, CoolingPhase,
    PollOutcome, TemperatureState,
};
use crate::config::{CameraConfig, PollErrorPolicy};
use crate::error::{AppResult, DaqError};
use crate::hardware::SharedCamera;
use crate::status::StatusBoard;

/// Owns the cooling controller, the acquisition sequencer and the cooling poll task.
pub struct CameraPanel {
    cooling: Arc<Mutex<CoolingController>>,
    sequencer: Arc<AcquisitionSequencer>,
    gate: AcquisitionGate,
    status: StatusBoard,
    on_poll_error: PollErrorPolicy,
    shutdown: watch::Receiver<bool>,
    cooling_task: Option<JoinHandle<()>>,
}

impl CameraPanel {
    pub fn new(
        camera: SharedCamera,
        config: &CameraConfig,
        status: StatusBoard,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let gate = AcquisitionGate::new();
        let cooling = CoolingController::new(
            Arc::clone(&camera),
            status.clone(),
            gate.clone(),
            config.cooling_poll_interval(),
        );
        let sequencer =
            AcquisitionSequencer::new(camera, gate.clone(), config.acquisition_parameters());

        Self {
            cooling: Arc::new(Mutex::new(cooling)),
            sequencer: Arc::new(sequencer),
            gate,
            status,
            on_poll_error: config.on_poll_error,
            shutdown,
            cooling_task: None,
        }
    }

    /// Enable the cooler and start the cooling poll loop.
    pub async fn start_cooling(&mut self, target: i32) -> AppResult<()> {
        self.cooling.lock().await.start_cooling(target).await?;
        self.spawn_cooling_loop();
        Ok(())
    }

    /// Restart the cooling poll after it stopped on a read error.
    ///
    /// The cooler is not touched; polling continues the cycle already in
    /// progress. A no-op while the loop is running or once stabilized.
    pub async fn resume_polling(&mut self) -> AppResult<()> {
        match self.cooling.lock().await.phase() {
            CoolingPhase::Idle => {
                return Err(DaqError::InvalidInput(
                    "cooling has not been started".into(),
                ))
            }
            CoolingPhase::Stabilized => return Ok(()),
            CoolingPhase::Cooling => {}
        }
        if self.is_cooling_loop_running() {
            return Ok(());
        }

        info!("resuming cooling poll");
        self.spawn_cooling_loop();
        Ok(())
    }

    fn spawn_cooling_loop(&mut self) {
        let handle = tokio::spawn(run_cooling_loop(
            Arc::clone(&self.cooling),
            self.on_poll_error,
            self.shutdown.clone(),
        ));
        self.cooling_task = Some(handle);
    }

    pub fn acquisition_allowed(&self) -> bool {
        self.gate.is_open()
    }

    pub async fn cooling_phase(&self) -> CoolingPhase {
        self.cooling.lock().await.phase()
    }

    pub async fn temperature_state(&self) -> Option<TemperatureState> {
        self.cooling.lock().await.state()
    }

    /// Whether the cooling poll loop is still running.
    pub fn is_cooling_loop_running(&self) -> bool {
        self.cooling_task
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Start an acquisition in its own task.
    ///
    /// Rejected synchronously with [`DaqError::NotStabilized`] while the gate is
    /// closed. The exposure blocks only the spawned task, never the stage poll.
    pub fn acquire(&self) -> AppResult<JoinHandle<AppResult<AcquiredSpectrum>>> {
        if !self.gate.is_open() {
            return Err(DaqError::NotStabilized);
        }

        let sequencer = Arc::clone(&self.sequencer);
        let status = self.status.clone();
        Ok(tokio::spawn(async move {
            status.set_message("acquiring...");
            let result = sequencer.acquire().await;
            match &result {
                Ok(spectrum) => status.set_message(format!(
                    "acquisition complete ({} points)",
                    spectrum.spectrum.len()
                )),
                Err(err) => status.set_message(format!("acquisition failed: {err}")),
            }
            result
        }))
    }

    /// Wait for the cooling loop to finish. The shutdown signal must already be sent.
    pub async fn shutdown(&mut self) -> AppResult<()> {
        if let Some(handle) = self.cooling_task.take() {
            handle.await?;
        }
        Ok(())
    }
}

/// Poll immediately, then once per interval, until stabilized or shut down.
///
/// Shutdown is only observed while waiting between polls, so a driver call is
/// never abandoned half way and the cooler keeps its programmed setpoint.
pub async fn run_cooling_loop(
    cooling: Arc<Mutex<CoolingController>>,
    on_error: PollErrorPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = cooling.lock().await.poll_interval();
    let mut polls: u64 = 0;

    loop {
        if *shutdown.borrow() {
            info!(polls, "cooling loop stopped by shutdown");
            return;
        }

        polls += 1;
        let outcome = cooling.lock().await.poll().await;
        match outcome {
            Ok(PollOutcome::Stabilized(_)) => {
                info!(polls, "cooling loop finished");
                return;
            }
            Ok(PollOutcome::Cooling(_)) => {}
            Err(err) => match on_error {
                PollErrorPolicy::KeepPolling => {
                    warn!(polls, error = %err, "temperature poll failed, polling again");
                }
                PollErrorPolicy::Stop => {
                    error!(polls, error = %err, "temperature poll failed, cooling loop stopped");
                    return;
                }
            },
        }

        tokio::select! {
            _ = sleep(interval) => {}
            _ = shutdown.changed() => {
                info!(polls, "cooling loop stopped by shutdown");
                return;
            }
        }
    }
}
