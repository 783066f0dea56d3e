//! Configuration System using Figment
//!
//! Settings are loaded from:
//! 1. a TOML file (default: `config/lab_panel.toml`)
//! 2. environment variables prefixed with `LABPANEL_`, with `__` between nested keys
//!
//! Every field has a default, so a missing file yields a usable configuration.
//!
//! ```text
//! LABPANEL_APPLICATION__LOG_LEVEL=debug
//! LABPANEL_CAMERA__TARGET_TEMPERATURE=-60
//! LABPANEL_STAGE__POLL_FPS=20
//! ```
//!
//! # Example
//!
//! ```no_run
//! use lab_panel::config::Settings;
//!
//! let settings = Settings::load_from("config/lab_panel.toml")?;
//! println!("Cooling to {} °C", settings.camera.target_temperature);
//! # Ok::<(), lab_panel::error::DaqError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::camera::AcquisitionParameters;
use crate::error::{AppResult, DaqError};
use crate::stage::StageCalibration;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/lab_panel.toml";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "LABPANEL_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub application: ApplicationConfig,
    pub camera: CameraConfig,
    pub stage: StageConfig,
}

/// Which devices the panel drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PanelMode {
    Camera,
    Stage,
    #[default]
    Both,
}

impl PanelMode {
    pub fn includes_camera(self) -> bool {
        matches!(self, PanelMode::Camera | PanelMode::Both)
    }

    pub fn includes_stage(self) -> bool {
        matches!(self, PanelMode::Stage | PanelMode::Both)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    pub mode: PanelMode,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Lab Panel".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            mode: PanelMode::Both,
        }
    }
}

/// What the cooling loop does after a failed temperature read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollErrorPolicy {
    #[default]
    KeepPolling,
    Stop,
}

/// Camera configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Cooling setpoint in °C
    pub target_temperature: i32,
    /// Interval between temperature polls in milliseconds
    pub cooling_poll_ms: u64,
    pub exposure_seconds: f32,
    pub filter_mode: i32,
    pub on_poll_error: PollErrorPolicy,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            target_temperature: -80,
            cooling_poll_ms: 3000,
            exposure_seconds: 2.0,
            filter_mode: 2,
            on_poll_error: PollErrorPolicy::KeepPolling,
        }
    }
}

impl CameraConfig {
    pub fn cooling_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cooling_poll_ms)
    }

    pub fn acquisition_parameters(&self) -> AcquisitionParameters {
        AcquisitionParameters::new(self.exposure_seconds, self.filter_mode)
    }
}

/// Stage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Jog/position polls per second
    pub poll_fps: u32,
    /// Micrometers travelled per driver pulse
    pub um_per_pulse: f64,
    /// Send an emergency stop when the panel shuts down
    pub stop_on_shutdown: bool,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            poll_fps: 10,
            um_per_pulse: 0.01,
            stop_on_shutdown: true,
        }
    }
}

impl StageConfig {
    /// Tick period, `1000 / poll_fps` whole milliseconds.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.poll_fps.max(1)))
    }

    pub fn calibration(&self) -> AppResult<StageCalibration> {
        StageCalibration::new(self.um_per_pulse)
    }
}

impl Settings {
    /// Load from [`DEFAULT_CONFIG_PATH`]
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path, apply environment overrides, and validate.
    ///
    /// A missing file is not an error; defaults fill every gap.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings: Self = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate semantic constraints that parsing cannot express.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.camera.cooling_poll_ms == 0 {
            return Err(DaqError::Configuration(
                "camera.cooling_poll_ms must be greater than 0".into(),
            ));
        }

        if !self.camera.exposure_seconds.is_finite() || self.camera.exposure_seconds <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "camera.exposure_seconds must be positive, got {}",
                self.camera.exposure_seconds
            )));
        }

        if self.stage.poll_fps == 0 || self.stage.poll_fps > 1000 {
            return Err(DaqError::Configuration(format!(
                "stage.poll_fps must be between 1 and 1000, got {}",
                self.stage.poll_fps
            )));
        }

        self.stage.calibration()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.camera.target_temperature, -80);
        assert_eq!(settings.camera.cooling_poll_interval(), Duration::from_millis(3000));
        assert_eq!(settings.stage.poll_interval(), Duration::from_millis(100));
        assert_eq!(settings.application.mode, PanelMode::Both);
    }

    #[test]
    fn test_load_from_toml_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "panel.toml",
                r#"
[application]
log_level = "debug"
mode = "stage"

[camera]
target_temperature = -65

[stage]
poll_fps = 20
um_per_pulse = 0.05
"#,
            )?;

            let settings = Settings::load_from("panel.toml").map_err(|e| e.to_string())?;
            assert_eq!(settings.application.log_level, "debug");
            assert_eq!(settings.application.mode, PanelMode::Stage);
            assert_eq!(settings.camera.target_temperature, -65);
            assert_eq!(settings.camera.cooling_poll_ms, 3000);
            assert_eq!(settings.stage.poll_interval(), Duration::from_millis(50));
            assert_eq!(settings.stage.um_per_pulse, 0.05);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        figment::Jail::expect_with(|_jail| {
            let settings = Settings::load_from("absent.toml").map_err(|e| e.to_string())?;
            assert_eq!(settings, Settings::default());
            Ok(())
        });
    }

    #[test]
    fn test_invalid_file_value_is_reported() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("panel.toml", "[stage]\npoll_fps = 0\n")?;
            let result = Settings::load_from("panel.toml");
            assert!(matches!(result, Err(DaqError::Configuration(_))));
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "panel.toml",
                r#"
[camera]
target_temperature = -70
"#,
            )?;
            jail.set_env("LABPANEL_CAMERA__TARGET_TEMPERATURE", "-55");
            jail.set_env("LABPANEL_APPLICATION__LOG_FORMAT", "json");

            let settings = Settings::load_from("panel.toml").map_err(|e| e.to_string())?;
            assert_eq!(settings.camera.target_temperature, -55);
            assert_eq!(settings.application.log_format, LogFormat::Json);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_log_level() {
        let mut settings = Settings::default();
        settings.application.log_level = "invalid".into();
        assert!(matches!(
            settings.validate(),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_stage_values() {
        let mut settings = Settings::default();
        settings.stage.poll_fps = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.stage.um_per_pulse = 0.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_panel_mode_selection() {
        assert!(PanelMode::Both.includes_camera() && PanelMode::Both.includes_stage());
        assert!(!PanelMode::Camera.includes_stage());
        assert!(!PanelMode::Stage.includes_camera());
    }
}
