//! Pressed/released state of the jog controls.
//!
//! The presentation layer writes here from its event handlers (mouse down/up on a
//! jog button); the stage poll samples all ten flags once per tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::direction::{Direction, DIRECTION_COUNT};

/// Cloneable handle to the shared button flags.
#[derive(Debug, Clone, Default)]
pub struct JogButtons {
    pressed: Arc<[AtomicBool; DIRECTION_COUNT]>,
}

impl JogButtons {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, direction: Direction) {
        self.set(direction, true);
    }

    pub fn release(&self, direction: Direction) {
        self.set(direction, false);
    }

    pub fn set(&self, direction: Direction, pressed: bool) {
        self.pressed[direction.index()].store(pressed, Ordering::SeqCst);
    }

    pub fn is_pressed(&self, direction: Direction) -> bool {
        self.pressed[direction.index()].load(Ordering::SeqCst)
    }

    /// Read all ten flags, indexed by [`Direction::index`].
    pub fn snapshot(&self) -> [bool; DIRECTION_COUNT] {
        let mut out = [false; DIRECTION_COUNT];
        for direction in Direction::ALL {
            out[direction.index()] = self.is_pressed(direction);
        }
        out
    }
}
