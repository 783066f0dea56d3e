//! Edge-triggered jog control.
//!
//! Jogging is continuous motion that lasts while a control is held. The stage
//! driver wants discrete start/stop commands, so every tick compares each
//! control's pressed state with the previous tick and only talks to the driver
//! on a transition.

use tracing::{debug, warn};

use super::direction::{Direction, DIRECTION_COUNT};
use crate::error::{AppResult, DaqError};
use crate::hardware::{SharedStage, StageDriver};

/// Transition of a jog control between two consecutive ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// released → pressed
    Rising,
    /// pressed → released
    Falling,
}

/// Previous/current pressed pair for one control.
///
/// The pair is immutable; [`ButtonEdgeState::advance`] produces the next one.
/// At most one edge is visible per tick, so a press and release that both happen
/// between two ticks go unnoticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonEdgeState {
    pressed_previous: bool,
    pressed_now: bool,
}

impl ButtonEdgeState {
    pub fn advance(self, pressed: bool) -> Self {
        Self {
            pressed_previous: self.pressed_now,
            pressed_now: pressed,
        }
    }

    pub fn edge(self) -> Option<Edge> {
        match i8::from(self.pressed_now) - i8::from(self.pressed_previous) {
            1 => Some(Edge::Rising),
            -1 => Some(Edge::Falling),
            _ => None,
        }
    }

    pub fn is_pressed(self) -> bool {
        self.pressed_now
    }
}

/// A command the jog controller sent to the stage during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JogCommand {
    Start(Direction),
    Stop(Direction),
}

/// Turns sampled button state into `jog_start` / `jog_stop` driver calls.
pub struct StageJogController {
    stage: SharedStage,
    states: [ButtonEdgeState; DIRECTION_COUNT],
}

impl StageJogController {
    pub fn new(stage: SharedStage) -> Self {
        Self {
            stage,
            states: [ButtonEdgeState::default(); DIRECTION_COUNT],
        }
    }

    /// Process one tick of sampled button state, indexed by [`Direction::index`].
    ///
    /// Every direction is advanced even when a driver call fails, so a failed
    /// start is not retried on the following tick. Failures are reported together
    /// once all ten directions have been handled.
    pub async fn tick(&mut self, pressed: [bool; DIRECTION_COUNT]) -> AppResult<Vec<JogCommand>> {
        let mut issued = Vec::new();
        let mut failures = Vec::new();

        for direction in Direction::ALL {
            let i = direction.index();
            let state = self.states[i].advance(pressed[i]);
            self.states[i] = state;

            let Some(edge) = state.edge() else {
                continue;
            };

            // Lock per command so an emergency stop can slip in between.
            let result = {
                let mut stage = self.stage.lock().await;
                match edge {
                    Edge::Rising => stage.jog_start(direction.vector()).await,
                    Edge::Falling => stage.jog_stop(direction.vector().magnitude()).await,
                }
            };

            match result {
                Ok(()) => {
                    let command = match edge {
                        Edge::Rising => JogCommand::Start(direction),
                        Edge::Falling => JogCommand::Stop(direction),
                    };
                    debug!(?direction, ?edge, "jog command sent");
                    issued.push(command);
                }
                Err(err) => {
                    warn!(?direction, ?edge, error = %err, "jog command failed");
                    failures.push(format!("{direction}: {err}"));
                }
            }
        }

        if failures.is_empty() {
            Ok(issued)
        } else {
            Err(DaqError::DriverCommunication(format!(
                "jog failed for {}",
                failures.join("; ")
            )))
        }
    }

    /// Directions whose control was pressed at the last tick.
    pub fn held(&self) -> Vec<Direction> {
        Direction::ALL
            .into_iter()
            .filter(|d| self.states[d.index()].is_pressed())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{SimulatedStage, StageCall};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn pressed(direction: Direction) -> [bool; DIRECTION_COUNT] {
        let mut out = [false; DIRECTION_COUNT];
        out[direction.index()] = true;
        out
    }

    #[test]
    fn test_edge_detection() {
        let s = ButtonEdgeState::default();
        assert_eq!(s.edge(), None);
        let s = s.advance(true);
        assert_eq!(s.edge(), Some(Edge::Rising));
        let s = s.advance(true);
        assert_eq!(s.edge(), None);
        let s = s.advance(false);
        assert_eq!(s.edge(), Some(Edge::Falling));
        let s = s.advance(false);
        assert_eq!(s.edge(), None);
    }

    #[tokio::test]
    async fn test_north_press_release_sequence() {
        let stage = SimulatedStage::new();
        let log = stage.call_log();
        let mut jog = StageJogController::new(Arc::new(Mutex::new(stage)));

        let idle = [false; DIRECTION_COUNT];
        let north = pressed(Direction::North);

        assert!(jog.tick(idle).await.unwrap().is_empty());
        assert_eq!(
            jog.tick(north).await.unwrap(),
            vec![JogCommand::Start(Direction::North)]
        );
        assert!(jog.tick(north).await.unwrap().is_empty());
        assert_eq!(
            jog.tick(idle).await.unwrap(),
            vec![JogCommand::Stop(Direction::North)]
        );

        assert_eq!(
            log.calls(),
            vec![
                StageCall::JogStart(Direction::North.vector()),
                StageCall::JogStop(Direction::North.vector().magnitude()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_start_still_advances_state() {
        let stage = SimulatedStage::new();
        let log = stage.call_log();
        stage.fail_next_commands(1);
        let mut jog = StageJogController::new(Arc::new(Mutex::new(stage)));

        let east = pressed(Direction::East);
        assert!(matches!(
            jog.tick(east).await,
            Err(DaqError::DriverCommunication(_))
        ));
        // No second start while the control stays held.
        assert!(jog.tick(east).await.unwrap().is_empty());
        assert_eq!(jog.held(), vec![Direction::East]);
        assert_eq!(log.calls(), vec![StageCall::JogStart(Direction::East.vector())]);
    }
}
