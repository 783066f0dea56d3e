//! Motorized stage coordination: jog edge detection, coordinate bookkeeping,
//! absolute moves and emergency stop.

pub mod buttons;
pub mod direction;
pub mod jog;
pub mod motion;

pub use buttons::JogButtons;
pub use direction::{Direction, DirectionVector, DIRECTION_COUNT};
pub use jog::{ButtonEdgeState, Edge, JogCommand, StageJogController};
pub use motion::{AxisPosition, EmergencyStop, StageCalibration, StageMoveController};
