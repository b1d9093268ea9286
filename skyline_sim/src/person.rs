// Persons: residents that walk across the city and come back.
//
// A `Person` is one resident from the server's population. Its sphere color
// is picked from a fixed palette by `race % 4` when the person is created and
// never changes. Employment changes show up as a `StatusCue` pulse on the
// visual instead.
//
// ## Lifecycle
//
//   Pending  --place + wander-->  Wandering  --odometer past span-->  Exited
//      ^                                                                |
//      +------------------- jittered re-entry timer --------------------+
//
// A person never places itself. `City::place_person` picks the entry point
// and calls `wander`, and `City::update` does the exit test over the whole
// population. This file only advances position and odometer.
//
// The odometer accumulates `|velocity|` per axis since the last `wander`.
// Travel is along one axis, so the other component stays at zero.
//
// A died person is dropped from the population entirely (see
// `City::remove_person`); there is no Dead phase to leak.

use serde::{Deserialize, Serialize};

use skyline_protocol::message::{PersonEvent, PersonRecord};

use crate::render::{SceneObject, StatusCue};
use crate::types::{Color, PersonId, PlaneVec};

/// Sphere colors indexed by `race % 4`.
pub const PERSON_PALETTE: [Color; 4] = [
    Color(0x555555),
    Color(0xff4444),
    Color(0xffff44),
    Color(0x44ffff),
];

pub fn appearance_for(race: u32) -> Color {
    PERSON_PALETTE[(race % 4) as usize]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmploymentStatus {
    Unemployed,
    Employed,
    /// Owns a firm.
    Owner,
}

impl EmploymentStatus {
    pub fn from_record(record: &PersonRecord) -> Self {
        if record.firm_owner {
            Self::Owner
        } else if record.employed.is_employed() {
            Self::Employed
        } else {
            Self::Unemployed
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersonPhase {
    /// Created, not yet on screen. Waiting for an entry timer.
    Pending,
    Wandering,
    /// Walked off the grid. Waiting for a re-entry timer.
    Exited,
}

#[derive(Clone, Debug)]
pub struct Person {
    pub id: PersonId,
    pub race: u32,
    status: EmploymentStatus,
    phase: PersonPhase,
    pub visual: SceneObject,
    velocity: PlaneVec,
    odometer: PlaneVec,
    radius: f64,
}

impl Person {
    /// Build a pending person around an unplaced visual.
    pub fn new(record: &PersonRecord, visual: SceneObject, radius: f64) -> Self {
        Self {
            id: record.id.clone(),
            race: record.race,
            status: EmploymentStatus::from_record(record),
            phase: PersonPhase::Pending,
            visual,
            velocity: PlaneVec::ZERO,
            odometer: PlaneVec::ZERO,
            radius,
        }
    }

    pub fn status(&self) -> EmploymentStatus {
        self.status
    }

    pub fn phase(&self) -> PersonPhase {
        self.phase
    }

    pub fn velocity(&self) -> PlaneVec {
        self.velocity
    }

    pub fn odometer(&self) -> PlaneVec {
        self.odometer
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn color(&self) -> Color {
        self.visual.shape.color()
    }

    pub fn is_wandering(&self) -> bool {
        self.phase == PersonPhase::Wandering
    }

    /// True while the person is off screen waiting to be placed.
    pub fn awaiting_entry(&self) -> bool {
        matches!(self.phase, PersonPhase::Pending | PersonPhase::Exited)
    }

    /// Start walking. The caller has already placed the visual at an entry
    /// point.
    pub fn wander(&mut self, velocity: PlaneVec) {
        self.odometer = PlaneVec::ZERO;
        self.velocity = velocity;
        self.phase = PersonPhase::Wandering;
    }

    /// Advance one frame.
    pub fn update(&mut self) {
        self.visual.position.x += self.velocity.x;
        self.visual.position.z += self.velocity.z;
        self.odometer.x += self.velocity.x.abs();
        self.odometer.z += self.velocity.z.abs();
    }

    pub fn stop(&mut self) {
        self.velocity = PlaneVec::ZERO;
    }

    pub(crate) fn mark_exited(&mut self) {
        self.phase = PersonPhase::Exited;
    }

    /// Apply an employment event. Returns the cue to flash, or `None` for
    /// events that are not employment changes.
    pub fn apply_event(&mut self, event: PersonEvent) -> Option<StatusCue> {
        let (status, cue) = match event {
            PersonEvent::Fired => (EmploymentStatus::Unemployed, StatusCue::LostJob),
            PersonEvent::Hired => (EmploymentStatus::Employed, StatusCue::FoundJob),
            PersonEvent::StartedFirm => (EmploymentStatus::Owner, StatusCue::OpenedFirm),
            PersonEvent::Died => return None,
        };
        self.status = status;
        Some(cue)
    }
}
