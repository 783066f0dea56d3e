//! Status surface for the presentation layer.
//!
//! Everything a UI may show is published as one [`StatusSnapshot`] through a
//! `tokio::sync::watch` channel. Controllers write, any number of observers read;
//! observers never get a handle that can change state.
//!
//! # Example
//!
//! ```rust,ignore
//! let board = StatusBoard::new();
//! let mut rx = board.subscribe();
//! tokio::spawn(async move {
//!     while rx.changed().await.is_ok() {
//!         println!("{}", rx.borrow().message);
//!     }
//! });
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use crate::stage::AxisPosition;

/// Message shown before any device has reported.
pub const MSG_INITIALIZING: &str = "initializing...";
/// Message shown while the camera is still cooling.
pub const MSG_COOLING: &str = "cooling...";
/// Message shown once the camera holds its setpoint.
pub const MSG_STABILIZED: &str = "temperature stabilized";

/// Read-only view of the panel state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub message: String,
    /// Latest camera temperature in °C
    pub temperature: Option<i32>,
    /// Cooling setpoint in °C, once cooling started
    pub setpoint: Option<i32>,
    pub start: AxisPosition,
    pub current: AxisPosition,
    pub goal: AxisPosition,
    pub acquisition_allowed: bool,
    /// Whether the "Cooler ON" control should be enabled
    pub cooler_enable_available: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            message: MSG_INITIALIZING.to_string(),
            temperature: None,
            setpoint: None,
            start: AxisPosition::default(),
            current: AxisPosition::default(),
            goal: AxisPosition::default(),
            acquisition_allowed: false,
            cooler_enable_available: true,
            updated_at: Utc::now(),
        }
    }
}

/// Writer side of the status channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    sender: Arc<watch::Sender<StatusSnapshot>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(StatusSnapshot::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.sender.subscribe()
    }

    /// Clone of the current snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.sender.borrow().clone()
    }

    /// Apply `f` to the snapshot and notify observers.
    ///
    /// Works with zero observers; the value is kept for later subscribers.
    pub fn update(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        self.sender.send_modify(|snapshot| {
            f(snapshot);
            snapshot.updated_at = Utc::now();
        });
    }

    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| s.message = message);
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot() {
        let board = StatusBoard::new();
        let snap = board.snapshot();
        assert_eq!(snap.message, MSG_INITIALIZING);
        assert!(!snap.acquisition_allowed);
        assert!(snap.cooler_enable_available);
        assert_eq!(snap.temperature, None);
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let board = StatusBoard::new();
        let mut rx = board.subscribe();

        board.update(|s| {
            s.message = MSG_COOLING.into();
            s.temperature = Some(-40);
        });

        rx.changed().await.unwrap();
        let seen = rx.borrow().clone();
        assert_eq!(seen.message, MSG_COOLING);
        assert_eq!(seen.temperature, Some(-40));
    }

    #[test]
    fn test_update_without_subscribers_is_kept() {
        let board = StatusBoard::new();
        board.set_message(MSG_STABILIZED);
        assert_eq!(board.snapshot().message, MSG_STABILIZED);
    }
}
