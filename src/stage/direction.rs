//! Jog directions
//!
//! The panel has exactly ten jog controls: the eight compass directions in the
//! x/y plane plus up and down along z. The table is fixed at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit step over the three stage axes; every component is -1, 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectionVector {
    pub x: i8,
    pub y: i8,
    pub z: i8,
}

impl DirectionVector {
    pub const fn new(x: i8, y: i8, z: i8) -> Self {
        Self { x, y, z }
    }

    /// Per-axis absolute value.
    ///
    /// Used for jog stop so that releasing one of two opposing jogs on the same
    /// axis addresses the axis rather than a signed direction.
    pub const fn magnitude(self) -> Self {
        Self {
            x: self.x.abs(),
            y: self.y.abs(),
            z: self.z.abs(),
        }
    }

    pub const fn as_array(self) -> [i8; 3] {
        [self.x, self.y, self.z]
    }
}

impl fmt::Display for DirectionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.x, self.y, self.z)
    }
}

/// One of the ten jog controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    NorthWest,
    North,
    NorthEast,
    West,
    East,
    SouthWest,
    South,
    SouthEast,
    Up,
    Down,
}

/// Number of jog controls on the panel.
pub const DIRECTION_COUNT: usize = 10;

impl Direction {
    /// All directions in panel order; the index of a direction in this array is
    /// its [`Direction::index`].
    pub const ALL: [Direction; DIRECTION_COUNT] = [
        Direction::NorthWest,
        Direction::North,
        Direction::NorthEast,
        Direction::West,
        Direction::East,
        Direction::SouthWest,
        Direction::South,
        Direction::SouthEast,
        Direction::Up,
        Direction::Down,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn vector(self) -> DirectionVector {
        match self {
            Direction::NorthWest => DirectionVector::new(-1, 1, 0),
            Direction::North => DirectionVector::new(0, 1, 0),
            Direction::NorthEast => DirectionVector::new(1, 1, 0),
            Direction::West => DirectionVector::new(-1, 0, 0),
            Direction::East => DirectionVector::new(1, 0, 0),
            Direction::SouthWest => DirectionVector::new(-1, -1, 0),
            Direction::South => DirectionVector::new(0, -1, 0),
            Direction::SouthEast => DirectionVector::new(1, -1, 0),
            Direction::Up => DirectionVector::new(0, 0, 1),
            Direction::Down => DirectionVector::new(0, 0, -1),
        }
    }

    /// Panel label
    pub const fn label(self) -> &'static str {
        match self {
            Direction::NorthWest => "↖",
            Direction::North => "↑",
            Direction::NorthEast => "↗",
            Direction::West => "←",
            Direction::East => "→",
            Direction::SouthWest => "↙",
            Direction::South => "↓",
            Direction::SouthEast => "↘",
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_is_exhaustive_and_unique() {
        let vectors: HashSet<_> = Direction::ALL.iter().map(|d| d.vector()).collect();
        assert_eq!(vectors.len(), DIRECTION_COUNT);
        for (i, direction) in Direction::ALL.iter().enumerate() {
            assert_eq!(direction.index(), i);
            let v = direction.vector();
            assert_ne!(v, DirectionVector::new(0, 0, 0));
            assert!(v.as_array().iter().all(|c| (-1..=1).contains(c)));
        }
    }

    #[test]
    fn test_planar_and_vertical_split() {
        let planar = Direction::ALL.iter().filter(|d| d.vector().z == 0).count();
        assert_eq!(planar, 8);
        assert_eq!(Direction::Up.vector(), DirectionVector::new(0, 0, 1));
        assert_eq!(Direction::Down.vector(), DirectionVector::new(0, 0, -1));
    }

    #[test]
    fn test_magnitude_drops_sign() {
        assert_eq!(
            Direction::SouthWest.vector().magnitude(),
            DirectionVector::new(1, 1, 0)
        );
        assert_eq!(
            Direction::West.vector().magnitude(),
            Direction::East.vector().magnitude()
        );
    }
}
