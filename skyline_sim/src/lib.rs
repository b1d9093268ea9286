// skyline_sim: the state core of the city mirror.
//
// The economy runs on a remote server. This crate keeps a faithful local
// mirror of it as an animated city: a lattice of buildings whose tenant
// stacks grow and shrink, residents who walk across the grid and come back,
// and rolling chart buffers for the server's aggregate statistics. It never
// decides anything about the economy; it only reflects the events it is fed.
//
// Module overview:
// - `reconciler.rs`: EventReconciler, the single entry point. Owns the clock,
//                    routes inbound messages, drains the scheduler.
// - `city.rs`:       City (the grid) and Stage (surface + world offset).
// - `building.rs`:   Building, the bounded tenant stack at one lattice site.
// - `person.rs`:     Person, a resident with velocity and travel odometer.
// - `series.rs`:     SlidingWindowSeries + SeriesRegistry for charts.
// - `event.rs`:      EventQueue (virtual-time scheduler) + narrative MirrorEvents.
// - `render.rs`:     RenderSurface trait, shapes, Recording/Null surfaces.
// - `config.rs`:     MirrorConfig, every tunable in one immutable struct.
// - `types.rs`:      Positions, lattice coords, visual ids, colors, wire ids.
// - `prng`:          Re-exported from `skyline_prng`.
//
// The crate has no rendering, transport, or wall-clock dependency. Time is a
// `u64` of virtual milliseconds advanced by the caller, randomness comes
// from a seeded PRNG, and collections that are iterated use `BTreeMap`, so
// the same inputs always produce the same scene.

pub mod building;
pub mod city;
pub mod config;
pub mod event;
pub mod person;
pub use skyline_prng as prng;
pub mod reconciler;
pub mod render;
pub mod series;
pub mod types;

pub use config::{ConfigError, MirrorConfig};
pub use reconciler::{EventReconciler, StepResult, TimedMessage};
pub use render::{NullSurface, RecordingSurface, RenderSurface};
