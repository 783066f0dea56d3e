//! Simulated Hardware Implementations
//!
//! Drivers that behave like the real camera and stage closely enough to run the
//! whole panel without hardware. Every call is appended to a [`CallLog`] so tests
//! can assert on the exact command sequence a coordinator produced.
//!
//! All waiting uses `tokio::time::sleep`, never `std::thread::sleep`, so tests can
//! run on a paused clock.
//!
//! # Available Simulations
//!
//! - `SimulatedCamera` - cooler that ramps toward the setpoint, then holds
//! - `SimulatedStage` - pulse-position stage with jog integration and linear moves

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};
use tracing::trace;

use super::{
    CameraDriver, DriverError, DriverResult, PulseVector, RawFrame, StageDriver,
    TemperatureReading, TemperatureStatus, DRV_SUCCESS,
};
use crate::camera::{AcquisitionMode, ReadMode, TriggerMode};
use crate::stage::DirectionVector;

// =============================================================================
// Shared helpers
// =============================================================================

/// Append-only record of driver calls, shared between a simulated driver and the test.
#[derive(Debug)]
pub struct CallLog<T> {
    calls: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for CallLog<T> {
    fn clone(&self) -> Self {
        Self {
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<T> Default for CallLog<T> {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> CallLog<T> {
    fn record(&self, call: T) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }

    /// Copy of every call so far, oldest first.
    pub fn calls(&self) -> Vec<T> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count(&self, predicate: impl Fn(&T) -> bool) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|c| predicate(c))
            .count()
    }

    pub fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

/// Makes the next `n` driver calls fail with a communication error.
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    remaining: Arc<AtomicU32>,
}

impl FaultSwitch {
    pub fn fail_next(&self, n: u32) {
        self.remaining.store(n, Ordering::SeqCst);
    }

    fn check(&self, operation: &str) -> DriverResult<()> {
        let tripped = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(DriverError::Communication(format!(
                "simulated link failure during {operation}"
            )))
        } else {
            Ok(())
        }
    }
}

// =============================================================================
// SimulatedCamera
// =============================================================================

/// Every call a [`SimulatedCamera`] received.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraCall {
    SetTemperatureTarget(i32),
    EnableCooler,
    GetTemperature,
    SetAcquisitionMode(AcquisitionMode),
    SetReadMode(ReadMode),
    SetTriggerMode(TriggerMode),
    GetDetectorGeometry,
    SetExposureTime(f32),
    SetFilterMode(i32),
    AcquireSingleFrame,
}

/// Camera operation selector for [`SimulatedCamera::fail_on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraOp {
    SetAcquisitionMode,
    SetReadMode,
    SetTriggerMode,
    GetDetectorGeometry,
    SetExposureTime,
    SetFilterMode,
    AcquireSingleFrame,
}

/// Simulated cooled camera
///
/// While the cooler is on, each temperature read moves the sensor
/// `cooling_step` degrees toward the setpoint. Once there it reports
/// `NotStabilized` for `settle_reads` reads, then `Stabilized`.
/// A scripted sequence of readings, if given, takes precedence.
pub struct SimulatedCamera {
    temperature: i32,
    target: i32,
    cooler_on: bool,
    cooling_step: i32,
    settle_reads: u32,
    reads_at_target: u32,
    script: VecDeque<TemperatureReading>,
    detector: (u32, u32),
    exposure_s: f32,
    failing_op: Option<CameraOp>,
    frame_code: u32,
    faults: FaultSwitch,
    log: CallLog<CameraCall>,
}

impl SimulatedCamera {
    /// Camera at room temperature (20 °C) with a 1024 x 1 detector.
    pub fn new() -> Self {
        Self {
            temperature: 20,
            target: 20,
            cooler_on: false,
            cooling_step: 10,
            settle_reads: 1,
            reads_at_target: 0,
            script: VecDeque::new(),
            detector: (1024, 1),
            exposure_s: 0.0,
            failing_op: None,
            frame_code: DRV_SUCCESS,
            faults: FaultSwitch::default(),
            log: CallLog::default(),
        }
    }

    /// Degrees per read and number of unstable reads at the setpoint.
    pub fn with_cooling_rate(mut self, cooling_step: i32, settle_reads: u32) -> Self {
        self.cooling_step = cooling_step.max(1);
        self.settle_reads = settle_reads;
        self
    }

    /// Fixed readings returned by the next temperature reads, in order.
    pub fn with_temperature_script(mut self, readings: Vec<TemperatureReading>) -> Self {
        self.script = readings.into();
        self
    }

    pub fn with_detector(mut self, width: u32, height: u32) -> Self {
        self.detector = (width, height);
        self
    }

    /// Return a non-success status from one acquisition step.
    pub fn fail_on(mut self, op: CameraOp) -> Self {
        self.failing_op = Some(op);
        self
    }

    /// Result code reported alongside the spectrum.
    pub fn with_frame_code(mut self, code: u32) -> Self {
        self.frame_code = code;
        self
    }

    pub fn call_log(&self) -> CallLog<CameraCall> {
        self.log.clone()
    }

    pub fn fault_switch(&self) -> FaultSwitch {
        self.faults.clone()
    }

    fn begin(&self, call: CameraCall, operation: &'static str) -> DriverResult<()> {
        trace!(?call, "simulated camera call");
        self.log.record(call);
        self.faults.check(operation)
    }

    fn status_for(&self, op: CameraOp, operation: &'static str) -> DriverResult<()> {
        if self.failing_op == Some(op) {
            Err(DriverError::Status {
                operation,
                code: 20013,
            })
        } else {
            Ok(())
        }
    }

    fn simulate_reading(&mut self) -> TemperatureReading {
        if !self.cooler_on {
            return TemperatureReading {
                status: TemperatureStatus::Off,
                celsius: self.temperature,
            };
        }

        let gap = self.target - self.temperature;
        if gap != 0 {
            self.temperature += gap.signum() * gap.abs().min(self.cooling_step);
        }

        let status = if self.temperature != self.target {
            TemperatureStatus::NotReached
        } else if self.reads_at_target < self.settle_reads {
            self.reads_at_target += 1;
            TemperatureStatus::NotStabilized
        } else {
            TemperatureStatus::Stabilized
        };

        TemperatureReading {
            status,
            celsius: self.temperature,
        }
    }

    fn synthetic_spectrum(&self) -> Vec<i32> {
        let width = self.detector.0 as usize;
        let center = width as f64 / 2.0;
        let sigma = (width as f64 / 20.0).max(1.0);
        (0..width)
            .map(|i| {
                let d = (i as f64 - center) / sigma;
                (100.0 + 4000.0 * (-0.5 * d * d).exp()) as i32
            })
            .collect()
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraDriver for SimulatedCamera {
    async fn set_temperature_target(&mut self, celsius: i32) -> DriverResult<()> {
        self.begin(CameraCall::SetTemperatureTarget(celsius), "SetTemperature")?;
        self.target = celsius;
        self.reads_at_target = 0;
        Ok(())
    }

    async fn enable_cooler(&mut self) -> DriverResult<()> {
        self.begin(CameraCall::EnableCooler, "CoolerON")?;
        self.cooler_on = true;
        Ok(())
    }

    async fn get_temperature(&mut self) -> DriverResult<TemperatureReading> {
        self.begin(CameraCall::GetTemperature, "GetTemperature")?;
        if let Some(reading) = self.script.pop_front() {
            return Ok(reading);
        }
        Ok(self.simulate_reading())
    }

    async fn set_acquisition_mode(&mut self, mode: AcquisitionMode) -> DriverResult<()> {
        self.begin(CameraCall::SetAcquisitionMode(mode), "SetAcquisitionMode")?;
        self.status_for(CameraOp::SetAcquisitionMode, "SetAcquisitionMode")
    }

    async fn set_read_mode(&mut self, mode: ReadMode) -> DriverResult<()> {
        self.begin(CameraCall::SetReadMode(mode), "SetReadMode")?;
        self.status_for(CameraOp::SetReadMode, "SetReadMode")
    }

    async fn set_trigger_mode(&mut self, mode: TriggerMode) -> DriverResult<()> {
        self.begin(CameraCall::SetTriggerMode(mode), "SetTriggerMode")?;
        self.status_for(CameraOp::SetTriggerMode, "SetTriggerMode")
    }

    async fn get_detector_geometry(&mut self) -> DriverResult<(u32, u32)> {
        self.begin(CameraCall::GetDetectorGeometry, "GetDetector")?;
        self.status_for(CameraOp::GetDetectorGeometry, "GetDetector")?;
        Ok(self.detector)
    }

    async fn set_exposure_time(&mut self, seconds: f32) -> DriverResult<()> {
        self.begin(CameraCall::SetExposureTime(seconds), "SetExposureTime")?;
        self.status_for(CameraOp::SetExposureTime, "SetExposureTime")?;
        self.exposure_s = seconds;
        Ok(())
    }

    async fn set_filter_mode(&mut self, mode: i32) -> DriverResult<()> {
        self.begin(CameraCall::SetFilterMode(mode), "SetFilterMode")?;
        self.status_for(CameraOp::SetFilterMode, "SetFilterMode")
    }

    async fn acquire_single_frame(&mut self) -> DriverResult<RawFrame> {
        self.begin(CameraCall::AcquireSingleFrame, "acquire")?;
        self.status_for(CameraOp::AcquireSingleFrame, "acquire")?;

        // Blocks for the exposure like the SDK call does.
        sleep(Duration::from_secs_f32(self.exposure_s.max(0.0))).await;

        Ok(RawFrame {
            code: self.frame_code,
            spectrum: self.synthetic_spectrum(),
        })
    }
}

// =============================================================================
// SimulatedStage
// =============================================================================

/// Every call a [`SimulatedStage`] received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageCall {
    JogStart(DirectionVector),
    JogStop(DirectionVector),
    EmergencyStop,
    MoveLinear(PulseVector),
    GetPosition,
}

/// Simulated three-axis stage
///
/// Linear moves arrive instantly. While a jog is active, each position read
/// advances the jogged axes by `jog_pulses_per_read`.
pub struct SimulatedStage {
    position: PulseVector,
    jog_velocity: [i8; 3],
    jog_pulses_per_read: i64,
    command_latency: Duration,
    faults: FaultSwitch,
    log: CallLog<StageCall>,
}

impl SimulatedStage {
    /// Stage at the origin.
    pub fn new() -> Self {
        Self::with_position([0, 0, 0])
    }

    pub fn with_position(position: PulseVector) -> Self {
        Self {
            position,
            jog_velocity: [0; 3],
            jog_pulses_per_read: 100,
            command_latency: Duration::ZERO,
            faults: FaultSwitch::default(),
            log: CallLog::default(),
        }
    }

    pub fn with_jog_speed(mut self, pulses_per_read: i64) -> Self {
        self.jog_pulses_per_read = pulses_per_read;
        self
    }

    /// Time the controller takes to accept each command.
    pub fn with_command_latency(mut self, latency: Duration) -> Self {
        self.command_latency = latency;
        self
    }

    pub fn call_log(&self) -> CallLog<StageCall> {
        self.log.clone()
    }

    pub fn fault_switch(&self) -> FaultSwitch {
        self.faults.clone()
    }

    /// Shorthand for `fault_switch().fail_next(n)`.
    pub fn fail_next_commands(&self, n: u32) {
        self.faults.fail_next(n);
    }

    async fn begin(&self, call: StageCall, operation: &'static str) -> DriverResult<()> {
        trace!(?call, "simulated stage call");
        self.log.record(call);
        if !self.command_latency.is_zero() {
            sleep(self.command_latency).await;
        }
        self.faults.check(operation)
    }
}

impl Default for SimulatedStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageDriver for SimulatedStage {
    async fn jog_start(&mut self, direction: DirectionVector) -> DriverResult<()> {
        self.begin(StageCall::JogStart(direction), "jog").await?;
        for (velocity, component) in self.jog_velocity.iter_mut().zip(direction.as_array()) {
            if component != 0 {
                *velocity = component;
            }
        }
        Ok(())
    }

    async fn jog_stop(&mut self, axes: DirectionVector) -> DriverResult<()> {
        self.begin(StageCall::JogStop(axes), "stop_each").await?;
        for (velocity, component) in self.jog_velocity.iter_mut().zip(axes.as_array()) {
            if component != 0 {
                *velocity = 0;
            }
        }
        Ok(())
    }

    async fn emergency_stop(&mut self) -> DriverResult<()> {
        self.begin(StageCall::EmergencyStop, "stop_emergency").await?;
        self.jog_velocity = [0; 3];
        Ok(())
    }

    async fn move_linear(&mut self, target: PulseVector) -> DriverResult<()> {
        self.begin(StageCall::MoveLinear(target), "move_linear").await?;
        self.jog_velocity = [0; 3];
        self.position = target;
        Ok(())
    }

    async fn get_position(&mut self) -> DriverResult<PulseVector> {
        self.begin(StageCall::GetPosition, "get_pos").await?;
        for (pos, velocity) in self.position.iter_mut().zip(self.jog_velocity) {
            *pos += i64::from(velocity) * self.jog_pulses_per_read;
        }
        Ok(self.position)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_camera_cools_then_stabilizes() {
        let mut camera = SimulatedCamera::new().with_cooling_rate(50, 1);
        camera.set_temperature_target(-80).await.unwrap();

        let off = camera.get_temperature().await.unwrap();
        assert_eq!(off.status, TemperatureStatus::Off);

        camera.enable_cooler().await.unwrap();
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(camera.get_temperature().await.unwrap());
        }

        assert_eq!(seen[0].celsius, -30);
        assert_eq!(seen[0].status, TemperatureStatus::NotReached);
        assert_eq!(seen[1].celsius, -80);
        assert_eq!(seen[1].status, TemperatureStatus::NotStabilized);
        assert_eq!(seen[2].status, TemperatureStatus::Stabilized);
        assert_eq!(seen[4].celsius, -80);
    }

    #[tokio::test]
    async fn test_camera_script_takes_precedence() {
        let reading = TemperatureReading {
            status: TemperatureStatus::Drift,
            celsius: -75,
        };
        let mut camera = SimulatedCamera::new().with_temperature_script(vec![reading]);
        assert_eq!(camera.get_temperature().await.unwrap(), reading);
        assert_eq!(
            camera.get_temperature().await.unwrap().status,
            TemperatureStatus::Off
        );
    }

    #[tokio::test]
    async fn test_fault_switch_fails_exact_count() {
        let mut camera = SimulatedCamera::new();
        camera.fault_switch().fail_next(2);

        assert!(camera.get_temperature().await.is_err());
        assert!(camera.get_temperature().await.is_err());
        assert!(camera.get_temperature().await.is_ok());
        assert_eq!(camera.call_log().count(|c| *c == CameraCall::GetTemperature), 3);
    }

    #[tokio::test]
    async fn test_stage_jog_integrates_until_stopped() {
        let mut stage = SimulatedStage::new().with_jog_speed(10);
        stage.jog_start(DirectionVector::new(1, -1, 0)).await.unwrap();

        assert_eq!(stage.get_position().await.unwrap(), [10, -10, 0]);
        assert_eq!(stage.get_position().await.unwrap(), [20, -20, 0]);

        stage.jog_stop(DirectionVector::new(1, 0, 0)).await.unwrap();
        assert_eq!(stage.get_position().await.unwrap(), [20, -30, 0]);

        stage.emergency_stop().await.unwrap();
        assert_eq!(stage.get_position().await.unwrap(), [20, -30, 0]);
    }

    #[tokio::test]
    async fn test_stage_linear_move_is_recorded() {
        let mut stage = SimulatedStage::with_position([5, 5, 5]);
        let log = stage.call_log();

        stage.move_linear([100, 200, 300]).await.unwrap();
        assert_eq!(stage.get_position().await.unwrap(), [100, 200, 300]);
        assert_eq!(
            log.calls(),
            vec![StageCall::MoveLinear([100, 200, 300]), StageCall::GetPosition]
        );
    }
}
