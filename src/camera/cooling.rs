//! Cooling state machine
//!
//! `Idle --start_cooling--> Cooling --poll (stabilized)--> Stabilized`
//!
//! Starting writes the setpoint and switches the cooler on exactly once. Each
//! poll reads the sensor and publishes the reading; the first stabilized reading
//! opens the acquisition gate and ends the cycle. There is no limit on how long
//! `Cooling` may last.

use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{AcquisitionGate, TemperatureState};
use crate::error::{AppResult, DaqError};
use crate::hardware::{CameraDriver, SharedCamera, TemperatureReading};
use crate::status::{StatusBoard, MSG_COOLING, MSG_STABILIZED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoolingPhase {
    /// Cooler not yet enabled; the enable control is available.
    Idle,
    Cooling,
    Stabilized,
}

/// Result of one successful poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Not there yet; poll again after the interval.
    Cooling(TemperatureReading),
    /// Gate opened; stop polling.
    Stabilized(TemperatureReading),
}

impl PollOutcome {
    pub fn is_stabilized(&self) -> bool {
        matches!(self, PollOutcome::Stabilized(_))
    }
}

pub struct CoolingController {
    camera: SharedCamera,
    status: StatusBoard,
    gate: AcquisitionGate,
    poll_interval: Duration,
    phase: CoolingPhase,
    setpoint: Option<i32>,
    state: Option<TemperatureState>,
    last_reading: Option<TemperatureReading>,
}

impl CoolingController {
    pub fn new(
        camera: SharedCamera,
        status: StatusBoard,
        gate: AcquisitionGate,
        poll_interval: Duration,
    ) -> Self {
        Self {
            camera,
            status,
            gate,
            poll_interval,
            phase: CoolingPhase::Idle,
            setpoint: None,
            state: None,
            last_reading: None,
        }
    }

    pub fn phase(&self) -> CoolingPhase {
        self.phase
    }

    /// Temperature state of the current cycle, once the first poll succeeded.
    pub fn state(&self) -> Option<TemperatureState> {
        self.state
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn gate(&self) -> &AcquisitionGate {
        &self.gate
    }

    /// Whether the cooler-enable control may be used.
    pub fn can_enable_cooler(&self) -> bool {
        self.phase == CoolingPhase::Idle
    }

    /// Program the setpoint and switch the cooler on.
    ///
    /// The enable control is withdrawn before any driver call so a second
    /// request cannot slip in while the first is in flight. If the camera
    /// rejects either command the control becomes available again.
    pub async fn start_cooling(&mut self, target: i32) -> AppResult<()> {
        if !self.can_enable_cooler() {
            return Err(DaqError::CoolerAlreadyEnabled);
        }

        self.phase = CoolingPhase::Cooling;
        self.setpoint = Some(target);
        self.state = None;
        self.last_reading = None;
        self.gate.set(false);
        self.status.update(|s| {
            s.cooler_enable_available = false;
            s.acquisition_allowed = false;
            s.setpoint = Some(target);
        });

        let result = {
            let mut camera = self.camera.lock().await;
            match camera.set_temperature_target(target).await {
                Ok(()) => camera.enable_cooler().await,
                Err(err) => Err(err),
            }
        };

        if let Err(err) = result {
            warn!(target, error = %err, "failed to enable cooler");
            self.phase = CoolingPhase::Idle;
            self.status.update(|s| {
                s.cooler_enable_available = true;
                s.message = format!("cooler enable failed: {err}");
            });
            return Err(err.into());
        }

        info!(target, "cooler enabled");
        Ok(())
    }

    /// Read the sensor once and publish the outcome.
    ///
    /// A read failure is published on the status surface before it is returned,
    /// so the panel never keeps showing a stale message.
    pub async fn poll(&mut self) -> AppResult<PollOutcome> {
        let setpoint = match (self.phase, self.setpoint) {
            (CoolingPhase::Idle, _) | (_, None) => {
                return Err(DaqError::InvalidInput(
                    "cooling has not been started".into(),
                ))
            }
            (CoolingPhase::Stabilized, Some(_)) => {
                if let Some(reading) = self.last_reading {
                    return Ok(PollOutcome::Stabilized(reading));
                }
                return Err(DaqError::InvalidInput("cooling cycle has no reading".into()));
            }
            (CoolingPhase::Cooling, Some(setpoint)) => setpoint,
        };

        let reading = match self.camera.lock().await.get_temperature().await {
            Ok(reading) => reading,
            Err(err) => {
                warn!(error = %err, "temperature read failed");
                self.status
                    .set_message(format!("temperature read failed: {err}"));
                return Err(err.into());
            }
        };

        let stabilized = reading.status.is_stabilized();
        self.last_reading = Some(reading);
        self.state = Some(TemperatureState {
            current_reading: reading.celsius,
            setpoint,
            stabilized,
        });

        if stabilized {
            self.phase = CoolingPhase::Stabilized;
            self.gate.set(true);
            self.status.update(|s| {
                s.message = MSG_STABILIZED.to_string();
                s.temperature = Some(reading.celsius);
                s.acquisition_allowed = true;
            });
            info!(celsius = reading.celsius, setpoint, "temperature stabilized");
            Ok(PollOutcome::Stabilized(reading))
        } else {
            self.status.update(|s| {
                s.message = MSG_COOLING.to_string();
                s.temperature = Some(reading.celsius);
            });
            debug!(celsius = reading.celsius, status = ?reading.status, "cooling");
            Ok(PollOutcome::Cooling(reading))
        }
    }
}
