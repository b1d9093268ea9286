// Core value types shared across the mirror.
//
// Spatial conventions follow the isometric scene: X and Z span the ground
// plane, Y is up. Logical coordinates are relative to the lattice corner;
// world coordinates have the grid's centering offset applied (see
// `city::Stage::place`).
//
// Entity ids come from the server (`skyline_protocol::types`) and are
// re-exported here so sim code has one place to import them from. Visual ids
// are the only ids the mirror mints itself.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use skyline_protocol::types::{BuildingId, PersonId, TenantId, WireId};

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A world-space position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldPos {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl WorldPos {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for WorldPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// A vector on the ground plane. Used both for per-frame velocity and for
/// the per-axis travel odometer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaneVec {
    pub x: f64,
    pub z: f64,
}

impl PlaneVec {
    pub const ZERO: PlaneVec = PlaneVec { x: 0.0, z: 0.0 };

    pub const fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.z == 0.0
    }
}

/// A cell of the city lattice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LatticeCoord {
    pub row: u32,
    pub col: u32,
}

impl LatticeCoord {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for LatticeCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.row, self.col)
    }
}

// ---------------------------------------------------------------------------
// Visual identity
// ---------------------------------------------------------------------------

/// Handle of one object on the render surface. Allocated monotonically by
/// the grid's stage and never reused within a grid's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VisualId(pub u64);

impl fmt::Display for VisualId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "visual#{}", self.0)
    }
}

/// 24-bit RGB color, as used by the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color(pub u32);

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0)
    }
}
