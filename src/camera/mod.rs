//! Cooled camera coordination: the cooling state machine and the acquisition
//! sequence it gates.

pub mod acquisition;
pub mod cooling;
pub mod types;

pub use acquisition::AcquisitionSequencer;
pub use cooling::{CoolingController, CoolingPhase, PollOutcome};
pub use types::{
    AcquiredSpectrum, AcquisitionGate, AcquisitionMode, AcquisitionParameters, AcquisitionStep,
    ReadMode, TemperatureState, TriggerMode,
};
