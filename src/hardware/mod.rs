//! Device capability traits
//!
//! The camera and the stage are reached through vendor SDKs whose wire protocols are
//! out of scope for this crate. Each device is instead described by one small async
//! capability trait listing exactly the operations the coordinators need:
//!
//! - [`CameraDriver`] - cooling, acquisition setup and single-frame capture
//! - [`StageDriver`] - jog, linear move, emergency stop and position readback
//!
//! Both traits are object safe and `Send + Sync` so a driver can be shared as
//! [`SharedCamera`] / [`SharedStage`]. The surrounding `tokio::sync::Mutex` is what
//! makes every device a single-writer resource: only one command is ever in flight
//! to a given device.
//!
//! [`mock`] provides simulated implementations that record every call.

pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::camera::{AcquisitionMode, ReadMode, TriggerMode};
use crate::stage::DirectionVector;

/// Result type returned by every driver call.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Camera handle shared between the cooling loop and the acquisition task.
pub type SharedCamera = Arc<Mutex<dyn CameraDriver>>;

/// Stage handle shared between the stage poll task, user actions and the emergency stop.
pub type SharedStage = Arc<Mutex<dyn StageDriver>>;

/// Status code the camera SDK returns for a successful call.
pub const DRV_SUCCESS: u32 = 20002;

/// Errors reported by a device driver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The link to the device failed (port closed, timeout, garbled reply).
    #[error("communication failure: {0}")]
    Communication(String),

    /// The device answered with a non-success status code.
    #[error("{operation} returned status {code}")]
    Status {
        /// SDK function that failed
        operation: &'static str,
        /// Status code it returned
        code: u32,
    },
}

/// Cooling state as classified by the camera driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureStatus {
    /// Cooler is switched off.
    Off,
    /// Still travelling toward the setpoint.
    NotReached,
    /// Setpoint reached but not yet holding.
    NotStabilized,
    /// Was stabilized, then drifted away.
    Drift,
    /// Holding at the setpoint.
    Stabilized,
}

impl TemperatureStatus {
    /// Map a raw SDK status code onto a cooling state.
    ///
    /// Returns `None` for codes that are not temperature codes at all.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            20034 => Some(TemperatureStatus::Off),
            20035 => Some(TemperatureStatus::NotStabilized),
            20036 => Some(TemperatureStatus::Stabilized),
            20037 => Some(TemperatureStatus::NotReached),
            20040 => Some(TemperatureStatus::Drift),
            _ => None,
        }
    }

    /// SDK status code for this state.
    pub fn code(self) -> u32 {
        match self {
            TemperatureStatus::Off => 20034,
            TemperatureStatus::NotStabilized => 20035,
            TemperatureStatus::Stabilized => 20036,
            TemperatureStatus::NotReached => 20037,
            TemperatureStatus::Drift => 20040,
        }
    }

    /// Only `Stabilized` opens the acquisition gate; `Drift` does not.
    pub fn is_stabilized(self) -> bool {
        self == TemperatureStatus::Stabilized
    }
}

/// One temperature read from the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureReading {
    /// Driver's classification of the cooling state
    pub status: TemperatureStatus,
    /// Sensor temperature in °C
    pub celsius: i32,
}

/// Raw result of a single-frame acquisition, exactly as the driver handed it over.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// SDK result code for the acquisition call
    pub code: u32,
    /// Spectrum counts, one per detector column
    pub spectrum: Vec<i32>,
}

/// Pulse counts for the x, y and z axes.
pub type PulseVector = [i64; 3];

/// Capability: cooled spectroscopy camera
///
/// Every method maps to exactly one SDK call. Implementations take `&mut self`;
/// callers serialize access through [`SharedCamera`].
#[async_trait]
pub trait CameraDriver: Send + Sync {
    /// Program the cooling setpoint in °C. Does not switch the cooler on.
    async fn set_temperature_target(&mut self, celsius: i32) -> DriverResult<()>;

    /// Switch the cooler on.
    async fn enable_cooler(&mut self) -> DriverResult<()>;

    /// Current sensor temperature and cooling state.
    async fn get_temperature(&mut self) -> DriverResult<TemperatureReading>;

    /// Acquisition mode for the next capture.
    async fn set_acquisition_mode(&mut self, mode: AcquisitionMode) -> DriverResult<()>;

    /// Readout mode for the next capture.
    async fn set_read_mode(&mut self, mode: ReadMode) -> DriverResult<()>;

    /// Trigger source for the next capture.
    async fn set_trigger_mode(&mut self, mode: TriggerMode) -> DriverResult<()>;

    /// Detector size in pixels as `(width, height)`
    async fn get_detector_geometry(&mut self) -> DriverResult<(u32, u32)>;

    /// Exposure time in seconds
    async fn set_exposure_time(&mut self, seconds: f32) -> DriverResult<()>;

    /// SDK filter mode number (2 is cosmic ray removal)
    async fn set_filter_mode(&mut self, mode: i32) -> DriverResult<()>;

    /// Capture one frame. Blocks the caller for the exposure duration.
    async fn acquire_single_frame(&mut self) -> DriverResult<RawFrame>;
}

/// Capability: multi-axis motorized stage
///
/// Positions and targets are in driver pulses. Conversion to physical units
/// is the job of [`crate::stage::StageCalibration`].
#[async_trait]
pub trait StageDriver: Send + Sync {
    /// Start continuous motion along `direction` until a matching stop.
    async fn jog_start(&mut self, direction: DirectionVector) -> DriverResult<()>;

    /// Stop jogging on every axis whose component in `axes` is non-zero.
    async fn jog_stop(&mut self, axes: DirectionVector) -> DriverResult<()>;

    /// Halt all motion immediately.
    async fn emergency_stop(&mut self) -> DriverResult<()>;

    /// Start a combined linear move to absolute pulse targets.
    ///
    /// Returns once the controller accepted the command, not when motion ends.
    async fn move_linear(&mut self, target: PulseVector) -> DriverResult<()>;

    /// Current absolute position in pulses.
    async fn get_position(&mut self) -> DriverResult<PulseVector>;
}
