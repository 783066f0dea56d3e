//! Single-frame acquisition sequence.

use tracing::{info, warn};

use super::types::{AcquiredSpectrum, AcquisitionGate, AcquisitionParameters, AcquisitionStep};
use crate::error::{AppResult, DaqError};
use crate::hardware::{CameraDriver, DriverResult, SharedCamera, DRV_SUCCESS};

/// Configures the camera and captures one frame, once cooling has finished.
///
/// The camera is held for the whole sequence, so no other command can be
/// interleaved between the setup steps and the capture.
pub struct AcquisitionSequencer {
    camera: SharedCamera,
    gate: AcquisitionGate,
    parameters: AcquisitionParameters,
}

impl AcquisitionSequencer {
    pub fn new(camera: SharedCamera, gate: AcquisitionGate, parameters: AcquisitionParameters) -> Self {
        Self {
            camera,
            gate,
            parameters,
        }
    }

    pub fn parameters(&self) -> AcquisitionParameters {
        self.parameters
    }

    pub fn is_allowed(&self) -> bool {
        self.gate.is_open()
    }

    /// Run the full sequence and return the raw spectrum.
    ///
    /// Fails with [`DaqError::NotStabilized`] and no driver traffic while the gate
    /// is closed. Any failing step voids the whole sequence; nothing is retried.
    pub async fn acquire(&self) -> AppResult<AcquiredSpectrum> {
        if !self.gate.is_open() {
            return Err(DaqError::NotStabilized);
        }

        let p = self.parameters;
        let mut camera = self.camera.lock().await;

        checked(
            AcquisitionStep::SetAcquisitionMode,
            camera.set_acquisition_mode(p.mode).await,
        )?;
        checked(
            AcquisitionStep::SetReadMode,
            camera.set_read_mode(p.read_mode).await,
        )?;
        checked(
            AcquisitionStep::SetTriggerMode,
            camera.set_trigger_mode(p.trigger_mode).await,
        )?;
        let (width, height) = checked(
            AcquisitionStep::GetDetectorGeometry,
            camera.get_detector_geometry().await,
        )?;
        checked(
            AcquisitionStep::SetExposureTime,
            camera.set_exposure_time(p.exposure_seconds).await,
        )?;
        checked(
            AcquisitionStep::SetFilterMode,
            camera.set_filter_mode(p.filter_mode).await,
        )?;
        let frame = checked(
            AcquisitionStep::AcquireSingleFrame,
            camera.acquire_single_frame().await,
        )?;

        if frame.code != DRV_SUCCESS {
            warn!(code = frame.code, "frame acquisition returned non-success code");
            return Err(DaqError::AcquisitionFailed {
                step: AcquisitionStep::AcquireSingleFrame,
                reason: format!("status {}", frame.code),
            });
        }

        info!(
            width,
            height,
            points = frame.spectrum.len(),
            exposure_s = p.exposure_seconds,
            "spectrum acquired"
        );

        Ok(AcquiredSpectrum {
            spectrum: frame.spectrum,
            code: frame.code,
            detector_width: width,
            detector_height: height,
            parameters: p,
        })
    }
}

fn checked<T>(step: AcquisitionStep, result: DriverResult<T>) -> AppResult<T> {
    result.map_err(|err| {
        warn!(%step, error = %err, "acquisition step failed");
        DaqError::AcquisitionFailed {
            step,
            reason: err.to_string(),
        }
    })
}
