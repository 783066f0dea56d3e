//! Core library for the lab_panel application.
//!
//! Coordinates a cooled spectroscopy camera and a three-axis motorized stage:
//!
//! - [`camera`] - cooling state machine and the acquisition sequence it gates
//! - [`stage`] - edge-triggered jog control, coordinate bookkeeping, moves, emergency stop
//! - [`hardware`] - driver capability traits and simulated drivers
//! - [`panel`] - the polling runtime tying controllers, drivers and status together
//! - [`status`] - read-only status surface for any presentation layer
//!
//! Nothing here renders UI or knows a vendor wire protocol.

pub mod camera;
pub mod config;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod panel;
pub mod stage;
pub mod status;

pub use config::Settings;
pub use error::{AppResult, DaqError};
pub use panel::LabPanel;
