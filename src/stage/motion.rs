//! Coordinate bookkeeping and absolute moves.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{AppResult, DaqError};
use crate::hardware::{PulseVector, SharedStage, StageDriver};

/// Stage position in micrometers.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AxisPosition {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Point `fraction` of the way from `self` to `other`.
    pub fn lerp(self, other: Self, fraction: f64) -> Self {
        Self {
            x: self.x + (other.x - self.x) * fraction,
            y: self.y + (other.y - self.y) * fraction,
            z: self.z + (other.z - self.z) * fraction,
        }
    }
}

/// Conversion between driver pulses and micrometers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageCalibration {
    um_per_pulse: f64,
}

impl StageCalibration {
    /// Fails unless `um_per_pulse` is finite and strictly positive.
    pub fn new(um_per_pulse: f64) -> AppResult<Self> {
        if !um_per_pulse.is_finite() || um_per_pulse <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "um_per_pulse must be a positive number, got {um_per_pulse}"
            )));
        }
        Ok(Self { um_per_pulse })
    }

    pub fn um_per_pulse(&self) -> f64 {
        self.um_per_pulse
    }

    /// Nearest whole pulse count for `micrometers`.
    ///
    /// Fails with `InvalidInput` when the count is not finite or does not fit
    /// the driver's `i64` pulse range.
    pub fn to_pulses(&self, micrometers: f64) -> AppResult<i64> {
        let pulses = (micrometers / self.um_per_pulse).round();
        // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
        if !pulses.is_finite() || pulses < i64::MIN as f64 || pulses >= i64::MAX as f64 {
            return Err(DaqError::InvalidInput(format!(
                "{micrometers} um is outside the stage pulse range"
            )));
        }
        Ok(pulses as i64)
    }

    pub fn to_micrometers(&self, pulses: i64) -> f64 {
        pulses as f64 * self.um_per_pulse
    }

    pub fn position_to_pulses(&self, position: AxisPosition) -> AppResult<PulseVector> {
        Ok([
            self.to_pulses(position.x)?,
            self.to_pulses(position.y)?,
            self.to_pulses(position.z)?,
        ])
    }

    pub fn pulses_to_position(&self, pulses: PulseVector) -> AxisPosition {
        AxisPosition::new(
            self.to_micrometers(pulses[0]),
            self.to_micrometers(pulses[1]),
            self.to_micrometers(pulses[2]),
        )
    }
}

impl Default for StageCalibration {
    fn default() -> Self {
        Self { um_per_pulse: 0.01 }
    }
}

/// Immediate halt of the stage, independent of the poll schedule.
///
/// Cloneable so the presentation layer can hold one without owning the move
/// controller or the poll task.
#[derive(Clone)]
pub struct EmergencyStop {
    stage: SharedStage,
}

impl EmergencyStop {
    pub fn new(stage: SharedStage) -> Self {
        Self { stage }
    }

    /// Send the stop command now.
    ///
    /// Waits at most for the single stage command already in flight; no
    /// controller state is consulted, so it is attempted whatever state the
    /// rest of the panel is in.
    pub async fn trigger(&self) -> AppResult<()> {
        let mut stage = self.stage.lock().await;
        match stage.emergency_stop().await {
            Ok(()) => {
                info!("emergency stop sent");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "emergency stop failed");
                Err(err.into())
            }
        }
    }
}

/// Tracks start/current/goal coordinates and issues absolute moves.
pub struct StageMoveController {
    stage: SharedStage,
    calibration: StageCalibration,
    start: AxisPosition,
    current: AxisPosition,
    goal: AxisPosition,
}

impl StageMoveController {
    pub fn new(stage: SharedStage, calibration: StageCalibration) -> Self {
        Self {
            stage,
            calibration,
            start: AxisPosition::default(),
            current: AxisPosition::default(),
            goal: AxisPosition::default(),
        }
    }

    pub fn start(&self) -> AxisPosition {
        self.start
    }

    pub fn current(&self) -> AxisPosition {
        self.current
    }

    pub fn goal(&self) -> AxisPosition {
        self.goal
    }

    pub fn calibration(&self) -> StageCalibration {
        self.calibration
    }

    /// Read the driver's pulse position and update `current`.
    pub async fn refresh_current_position(&mut self) -> AppResult<AxisPosition> {
        let pulses = self.stage.lock().await.get_position().await?;
        self.current = self.calibration.pulses_to_position(pulses);
        Ok(self.current)
    }

    pub fn set_start(&mut self) -> AxisPosition {
        self.start = self.current;
        debug!(start = ?self.start, "start set");
        self.start
    }

    pub fn set_goal(&mut self) -> AxisPosition {
        self.goal = self.current;
        debug!(goal = ?self.goal, "goal set");
        self.goal
    }

    /// Absolute linear move to `(x, y, z)` micrometers.
    ///
    /// Returns once the driver accepted the command; arrival shows up in later
    /// position refreshes.
    pub async fn move_to(&mut self, x: f64, y: f64, z: f64) -> AppResult<PulseVector> {
        for (axis, value) in [("x", x), ("y", y), ("z", z)] {
            if !value.is_finite() {
                return Err(DaqError::InvalidInput(format!(
                    "{axis} target must be a finite number, got {value}"
                )));
            }
        }

        let pulses = self
            .calibration
            .position_to_pulses(AxisPosition::new(x, y, z))?;
        self.stage.lock().await.move_linear(pulses).await?;
        info!(x, y, z, ?pulses, "linear move accepted");
        Ok(pulses)
    }

    /// Like [`move_to`](Self::move_to), parsing the three text entries of the panel.
    pub async fn move_to_input(&mut self, x: &str, y: &str, z: &str) -> AppResult<PulseVector> {
        let x = parse_coordinate("x", x)?;
        let y = parse_coordinate("y", y)?;
        let z = parse_coordinate("z", z)?;
        self.move_to(x, y, z).await
    }

    pub async fn move_to_start(&mut self) -> AppResult<PulseVector> {
        let AxisPosition { x, y, z } = self.start;
        self.move_to(x, y, z).await
    }

    pub async fn move_to_goal(&mut self) -> AppResult<PulseVector> {
        let AxisPosition { x, y, z } = self.goal;
        self.move_to(x, y, z).await
    }

    /// Move to step `current_step` of `num_steps` equal steps from start to goal.
    ///
    /// Step 0 is the start, step `num_steps` is the goal.
    pub async fn step(&mut self, current_step: u32, num_steps: u32) -> AppResult<PulseVector> {
        if num_steps == 0 {
            return Err(DaqError::InvalidInput(
                "number of steps must be at least 1".into(),
            ));
        }
        if current_step > num_steps {
            return Err(DaqError::InvalidInput(format!(
                "step {current_step} is beyond the last step {num_steps}"
            )));
        }

        let fraction = f64::from(current_step) / f64::from(num_steps);
        let AxisPosition { x, y, z } = self.start.lerp(self.goal, fraction);
        self.move_to(x, y, z).await
    }
}

fn parse_coordinate(axis: &str, text: &str) -> AppResult<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| DaqError::InvalidInput(format!("{axis} entry '{text}' is not a number")))
}
