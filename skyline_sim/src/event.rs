// Scheduler and narrative events.
//
// The mirror runs on a virtual clock measured in milliseconds. Everything
// that would be a free-running timer in a browser client (the 30 fps frame
// ticker, each exited person's jittered re-entry) is instead a
// `ScheduledEvent` in one priority queue owned by the reconciler. The queue
// is ordered by `(due_ms, sequence)`, so events due at the same instant fire
// in the order they were scheduled. Tests advance the clock explicitly and
// never sleep.
//
// This file defines two related but distinct concepts:
// - `ScheduledEvent`: internal timers in the queue that drive the mirror.
// - `MirrorEvent`: narrative output describing what a step did, for logs,
//   the replay summary, and test assertions.
//
// See also: `reconciler.rs` for the step loop that drains the queue.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::building::TenantCategory;
use crate::person::EmploymentStatus;
use crate::types::{BuildingId, PersonId, TenantId};

// ---------------------------------------------------------------------------
// Internal scheduled events (priority queue)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// Virtual time at which the event fires.
    pub due_ms: u64,
    /// Tiebreak within one instant; lower fires first.
    pub sequence: u64,
    pub kind: ScheduledEventKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduledEventKind {
    /// Advance every wandering person by one frame. Reschedules itself.
    FrameTick,
    /// Place a person at a random boundary entry point. `generation` ties
    /// the timer to the grid that scheduled it; a re-setup invalidates it.
    PersonEntry { person_id: PersonId, generation: u64 },
}

// Min-heap on (due_ms, sequence): reverse the ordering for BinaryHeap.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.due_ms == other.due_ms && self.sequence == other.sequence
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due_ms
            .cmp(&self.due_ms)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Priority queue of pending timers, earliest first.
#[derive(Clone, Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    next_sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due_ms: u64, kind: ScheduledEventKind) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(ScheduledEvent {
            due_ms,
            sequence,
            kind,
        });
    }

    pub fn peek_due(&self) -> Option<u64> {
        self.heap.peek().map(|e| e.due_ms)
    }

    /// Pop the next event if it is due at or before `now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<ScheduledEvent> {
        if self.heap.peek().is_some_and(|e| e.due_ms <= now_ms) {
            self.heap.pop()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pending entry timers for one person (any generation).
    pub fn pending_entries_for(&self, person_id: &PersonId) -> usize {
        self.heap
            .iter()
            .filter(|e| {
                matches!(&e.kind, ScheduledEventKind::PersonEntry { person_id: p, .. } if p == person_id)
            })
            .count()
    }
}

// ---------------------------------------------------------------------------
// Narrative events (output)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MirrorEvent {
    pub time_ms: u64,
    pub kind: MirrorEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MirrorEventKind {
    /// A `setup` rebuilt the grid.
    Bootstrapped { buildings: usize, population: usize },
    TenantAdded {
        building: BuildingId,
        tenant: TenantId,
        category: TenantCategory,
    },
    /// The building was full; the tenant was dropped.
    TenantRejected { building: BuildingId, tenant: TenantId },
    TenantRemoved { building: BuildingId, tenant: TenantId },
    PersonEntered { person: PersonId },
    PersonExited { person: PersonId, reentry_at_ms: u64 },
    PersonStatusChanged { person: PersonId, status: EmploymentStatus },
    PersonDied { person: PersonId },
    ChartRedrawn { metric: String, samples: usize },
    /// An inbound event could not be applied (malformed payload).
    Ignored { channel: String, reason: String },
}
