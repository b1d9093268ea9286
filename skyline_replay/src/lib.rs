// skyline_replay: drive the city mirror from a recorded or piped event log.
//
// The simulation server writes its events as `channel:json` lines. This
// crate reads such a log and feeds it through `skyline_sim`'s
// `EventReconciler`, either in virtual time (deterministic, as fast as the
// CPU allows) or live against the wall clock at the configured frame rate.
// At the end it reports what the mirror saw and can dump the chart buffers
// to CSV.
//
// Module overview:
// - `replay.rs`: ReplayConfig, the virtual and live drivers, ReplaySummary.
//                Live mode uses a reader thread and an `mpsc` channel into
//                the single-threaded mirror, waking on `recv_timeout`.
// - `csv.rs`:    Chart buffer export, one column per metric.
//
// The binary (`main.rs`) parses arguments by hand and installs a `tracing`
// subscriber; everything it does is available through the library API.

pub mod csv;
pub mod replay;

pub use replay::{ReplayConfig, ReplayError, ReplaySummary, run_live, run_virtual};
