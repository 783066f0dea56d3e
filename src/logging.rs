//! Tracing initialisation.
//!
//! `RUST_LOG` takes precedence when set; otherwise the level comes from
//! `application.log_level`. The output format follows `application.log_format`.
//!
//! ```bash
//! RUST_LOG=lab_panel::stage=debug lab_panel
//! LABPANEL_APPLICATION__LOG_LEVEL=trace lab_panel
//! ```

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, Settings};
use crate::error::{AppResult, DaqError};

/// Build the filter: `RUST_LOG` if present, else the configured level.
pub fn env_filter(settings: &Settings) -> AppResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&settings.application.log_level).map_err(|e| {
            DaqError::Configuration(format!(
                "invalid log level '{}': {e}",
                settings.application.log_level
            ))
        }),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_from_config(settings: &Settings) -> AppResult<()> {
    let filter = env_filter(settings)?;
    let builder = fmt().with_env_filter(filter).with_target(true);

    let result = match settings.application.log_format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| DaqError::Configuration(format!("failed to initialise tracing: {e}")))
}
