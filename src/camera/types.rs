//! Camera data model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionMode {
    SingleScan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadMode {
    FullVerticalBinning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode {
    Internal,
}

/// Temperature bookkeeping for one cooling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TemperatureState {
    /// Latest reading in °C
    pub current_reading: i32,
    pub setpoint: i32,
    pub stabilized: bool,
}

/// Settings applied before every single-frame capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionParameters {
    pub mode: AcquisitionMode,
    pub read_mode: ReadMode,
    pub trigger_mode: TriggerMode,
    pub exposure_seconds: f32,
    pub filter_mode: i32,
}

impl AcquisitionParameters {
    pub fn new(exposure_seconds: f32, filter_mode: i32) -> Self {
        Self {
            mode: AcquisitionMode::SingleScan,
            read_mode: ReadMode::FullVerticalBinning,
            trigger_mode: TriggerMode::Internal,
            exposure_seconds,
            filter_mode,
        }
    }
}

impl Default for AcquisitionParameters {
    fn default() -> Self {
        Self::new(2.0, 2)
    }
}

/// Steps of the acquisition sequence, in the order they are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AcquisitionStep {
    SetAcquisitionMode,
    SetReadMode,
    SetTriggerMode,
    GetDetectorGeometry,
    SetExposureTime,
    SetFilterMode,
    AcquireSingleFrame,
}

impl fmt::Display for AcquisitionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcquisitionStep::SetAcquisitionMode => "set acquisition mode",
            AcquisitionStep::SetReadMode => "set read mode",
            AcquisitionStep::SetTriggerMode => "set trigger mode",
            AcquisitionStep::GetDetectorGeometry => "detector geometry query",
            AcquisitionStep::SetExposureTime => "set exposure time",
            AcquisitionStep::SetFilterMode => "set filter mode",
            AcquisitionStep::AcquireSingleFrame => "single-frame acquisition",
        };
        f.write_str(name)
    }
}

/// Output of a successful acquisition. The spectrum is passed through unvalidated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquiredSpectrum {
    pub spectrum: Vec<i32>,
    /// Driver result code of the frame acquisition
    pub code: u32,
    pub detector_width: u32,
    pub detector_height: u32,
    pub parameters: AcquisitionParameters,
}

/// The `acquisition_allowed` flag shared by cooling and acquisition.
///
/// Only the cooling controller opens or closes it.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionGate {
    open: Arc<AtomicBool>,
}

impl AcquisitionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub(crate) fn set(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }
}
