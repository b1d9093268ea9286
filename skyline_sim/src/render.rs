// The render surface contract.
//
// The core never draws. It describes what should be on screen through the
// `RenderSurface` trait: add an object with a shape at a position, remove
// it, move it, flash a status cue on it, redraw a chart. A real client maps
// these onto its scene graph and chart library; the core never reads
// anything back, so the surface is a write-only sink.
//
// `SceneObject` is the core-side record of one visual: its id, its shape,
// and the last position the core placed it at. Tenants and persons each own
// one. Only `city::Stage` writes `SceneObject::position`.
//
// Two implementations ship with the crate:
// - `RecordingSurface`: keeps the live object set plus an op log. Used by the
//   tests and by the replay tool's summary.
// - `NullSurface`: discards everything (benchmarks, headless runs).
//
// See also: `city.rs` for `Stage`, the only caller of `add`/`remove`/
// `move_to`; `series.rs` for `ChartFrame`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::series::ChartFrame;
use crate::types::{Color, VisualId, WorldPos};

/// Geometry and color of one visual.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// A tenant floor: square footprint, fixed height.
    Box { side: f64, height: f64, color: Color },
    /// A person.
    Sphere { radius: f64, color: Color },
    /// The road surface under the whole lattice.
    Plane { width: f64, depth: f64, color: Color },
}

impl Shape {
    /// Vertical extent of the shape, used for stacking.
    pub fn height(&self) -> f64 {
        match *self {
            Shape::Box { height, .. } => height,
            Shape::Sphere { radius, .. } => 2.0 * radius,
            Shape::Plane { .. } => 0.0,
        }
    }

    pub fn color(&self) -> Color {
        match *self {
            Shape::Box { color, .. } | Shape::Sphere { color, .. } | Shape::Plane { color, .. } => {
                color
            }
        }
    }
}

/// Additive highlight shown when a person's employment changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCue {
    LostJob,
    FoundJob,
    OpenedFirm,
}

/// A visual owned by a tenant, person, or the road.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneObject {
    pub id: VisualId,
    pub shape: Shape,
    pub position: WorldPos,
}

/// Write-only sink for everything the core wants on screen.
pub trait RenderSurface {
    fn add(&mut self, id: VisualId, shape: &Shape, position: WorldPos);
    fn remove(&mut self, id: VisualId);
    fn move_to(&mut self, id: VisualId, position: WorldPos);
    fn pulse(&mut self, id: VisualId, cue: StatusCue);
    fn draw_chart(&mut self, name: &str, frame: &ChartFrame);
}

/// Discards all output.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSurface;

impl RenderSurface for NullSurface {
    fn add(&mut self, _id: VisualId, _shape: &Shape, _position: WorldPos) {}
    fn remove(&mut self, _id: VisualId) {}
    fn move_to(&mut self, _id: VisualId, _position: WorldPos) {}
    fn pulse(&mut self, _id: VisualId, _cue: StatusCue) {}
    fn draw_chart(&mut self, _name: &str, _frame: &ChartFrame) {}
}

/// One call made against a `RecordingSurface`. Moves are not logged (there
/// is one per wandering person per frame); the live set tracks them instead.
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceOp {
    Add { id: VisualId, shape: Shape, position: WorldPos },
    Remove { id: VisualId },
    Pulse { id: VisualId, cue: StatusCue },
    Chart { name: String, samples: usize },
}

/// Keeps the live object set and a log of structural operations.
#[derive(Clone, Debug, Default)]
pub struct RecordingSurface {
    pub live: BTreeMap<VisualId, (Shape, WorldPos)>,
    pub ops: Vec<SurfaceOp>,
    pub charts: BTreeMap<String, ChartFrame>,
    /// Removes for ids that were not live. Should stay zero.
    pub stray_removes: usize,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn position(&self, id: VisualId) -> Option<WorldPos> {
        self.live.get(&id).map(|(_, p)| *p)
    }

    pub fn is_live(&self, id: VisualId) -> bool {
        self.live.contains_key(&id)
    }

    /// Number of `Add` ops recorded for the given id.
    pub fn adds_of(&self, id: VisualId) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, SurfaceOp::Add { id: i, .. } if *i == id))
            .count()
    }
}

impl RenderSurface for RecordingSurface {
    fn add(&mut self, id: VisualId, shape: &Shape, position: WorldPos) {
        self.live.insert(id, (*shape, position));
        self.ops.push(SurfaceOp::Add {
            id,
            shape: *shape,
            position,
        });
    }

    fn remove(&mut self, id: VisualId) {
        if self.live.remove(&id).is_none() {
            self.stray_removes += 1;
        }
        self.ops.push(SurfaceOp::Remove { id });
    }

    fn move_to(&mut self, id: VisualId, position: WorldPos) {
        if let Some(entry) = self.live.get_mut(&id) {
            entry.1 = position;
        }
    }

    fn pulse(&mut self, id: VisualId, cue: StatusCue) {
        self.ops.push(SurfaceOp::Pulse { id, cue });
    }

    fn draw_chart(&mut self, name: &str, frame: &ChartFrame) {
        self.charts.insert(name.to_owned(), frame.clone());
        self.ops.push(SurfaceOp::Chart {
            name: name.to_owned(),
            samples: frame.path.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_surface_tracks_live_set() {
        let mut surface = RecordingSurface::new();
        let shape = Shape::Sphere {
            radius: 0.2,
            color: Color(0xff4444),
        };
        surface.add(VisualId(1), &shape, WorldPos::new(0.0, 0.2, 0.0));
        surface.move_to(VisualId(1), WorldPos::new(0.1, 0.2, 0.0));
        assert_eq!(surface.position(VisualId(1)), Some(WorldPos::new(0.1, 0.2, 0.0)));

        surface.remove(VisualId(1));
        surface.remove(VisualId(1));
        assert_eq!(surface.live_count(), 0);
        assert_eq!(surface.stray_removes, 1);
        assert_eq!(surface.adds_of(VisualId(1)), 1);
    }

    #[test]
    fn shape_height_drives_stacking() {
        let floor = Shape::Box {
            side: 1.0,
            height: 0.5,
            color: Color(0xffff44),
        };
        assert_eq!(floor.height(), 0.5);
        assert_eq!(floor.color(), Color(0xffff44));
    }
}
