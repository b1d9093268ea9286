// Drivers that feed a `channel:json` event log through the mirror.
//
// Two modes:
//
// - **Virtual** (`run_virtual`): the whole log is available up front (a
//   recorded `simulation.log`). Line `n` is applied at virtual time
//   `n * gap_ms`, with the mirror's clock stepped to that instant first so
//   frame ticks and entry timers interleave as they would live. After the
//   last line the clock runs on for `drain_ms` so pending entries fire and
//   walkers finish crossing. Deterministic for a given seed; never sleeps.
//
// - **Live** (`run_live`): the log is a stream (a pipe from the server). A
//   reader thread splits lines and sends them over an `mpsc` channel; the
//   main thread owns the mirror and waits with `recv_timeout` set to the
//   frame interval. Every wake-up, whether a line arrived or the timeout
//   fired, steps the mirror's clock to the wall-clock time elapsed since
//   start, so frames keep ticking when the server is quiet. Lines are
//   applied as soon as they are received. When the stream closes, the
//   mirror is drained in virtual time like the virtual mode.
//
// Lines that do not split into a frame are counted and skipped. Frames that
// do not decode are handled by the reconciler (an `Ignored` event).
//
// See also: `skyline_sim::reconciler` for the stepping rules, `csv.rs` for
// the chart export.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use skyline_protocol::framing::{Frame, FrameError, FrameReader};
use skyline_sim::event::{MirrorEvent, MirrorEventKind};
use skyline_sim::{ConfigError, EventReconciler, RenderSurface};

/// Timing knobs for a replay run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Virtual time between consecutive log lines (virtual mode only).
    pub gap_ms: u64,
    /// Virtual time to keep running after the log ends.
    pub drain_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            gap_ms: 100,
            drain_ms: 6_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("cannot read `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid mirror config: {0}")]
    Config(#[from] ConfigError),
    #[error("log reader thread panicked")]
    ReaderPanicked,
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// What a replay did, for printing at the end of a run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplaySummary {
    /// Lines split into frames.
    pub frames: usize,
    /// Lines that could not be split.
    pub bad_lines: usize,
    pub end_ms: u64,
    /// Narrative events seen, by kind.
    pub events: BTreeMap<&'static str, usize>,
    pub population: usize,
    pub wandering: usize,
    pub tenants: usize,
    /// Charts holding at least one sample.
    pub charts: usize,
}

impl ReplaySummary {
    pub fn count(&self, label: &str) -> usize {
        self.events.get(label).copied().unwrap_or(0)
    }

    fn record(&mut self, events: &[MirrorEvent]) {
        for event in events {
            *self.events.entry(event_label(&event.kind)).or_default() += 1;
        }
    }

    fn snapshot<S: RenderSurface>(&mut self, mirror: &EventReconciler<S>) {
        let city = mirror.city();
        self.end_ms = mirror.now_ms();
        self.population = city.population_len();
        self.wandering = city.wandering_count();
        self.tenants = city.buildings().iter().map(|b| b.len()).sum();
        self.charts = mirror.series().iter().filter(|s| !s.is_empty()).count();
    }
}

impl fmt::Display for ReplaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "replayed {} frames ({} bad lines) to t={}ms",
            self.frames, self.bad_lines, self.end_ms
        )?;
        writeln!(
            f,
            "population {} ({} on screen), {} tenants, {} charts",
            self.population, self.wandering, self.tenants, self.charts
        )?;
        for (label, n) in &self.events {
            writeln!(f, "  {label:<22} {n}")?;
        }
        Ok(())
    }
}

/// Stable short name for a narrative event kind.
pub fn event_label(kind: &MirrorEventKind) -> &'static str {
    match kind {
        MirrorEventKind::Bootstrapped { .. } => "bootstrapped",
        MirrorEventKind::TenantAdded { .. } => "tenant_added",
        MirrorEventKind::TenantRejected { .. } => "tenant_rejected",
        MirrorEventKind::TenantRemoved { .. } => "tenant_removed",
        MirrorEventKind::PersonEntered { .. } => "person_entered",
        MirrorEventKind::PersonExited { .. } => "person_exited",
        MirrorEventKind::PersonStatusChanged { .. } => "person_status_changed",
        MirrorEventKind::PersonDied { .. } => "person_died",
        MirrorEventKind::ChartRedrawn { .. } => "chart_redrawn",
        MirrorEventKind::Ignored { .. } => "ignored",
    }
}

fn ingest<S: RenderSurface>(
    mirror: &mut EventReconciler<S>,
    summary: &mut ReplaySummary,
    item: Result<Frame, FrameError>,
) {
    match item {
        Ok(frame) => {
            summary.frames += 1;
            let events = mirror.apply_frame(&frame);
            summary.record(&events);
        }
        Err(err) => {
            warn!(error = %err, "skipping unreadable line");
            summary.bad_lines += 1;
        }
    }
}

fn drain<S: RenderSurface>(
    mirror: &mut EventReconciler<S>,
    summary: &mut ReplaySummary,
    drain_ms: u64,
) {
    let target = mirror.now_ms() + drain_ms;
    let result = mirror.advance_to(target);
    summary.record(&result.events);
    summary.snapshot(mirror);
}

// ---------------------------------------------------------------------------
// Virtual mode
// ---------------------------------------------------------------------------

/// Replay a complete log in virtual time.
pub fn run_virtual<R: BufRead, S: RenderSurface>(
    input: R,
    mirror: &mut EventReconciler<S>,
    config: &ReplayConfig,
) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    for (line, item) in FrameReader::new(input).enumerate() {
        let at = line as u64 * config.gap_ms;
        let result = mirror.advance_to(at);
        summary.record(&result.events);
        ingest(mirror, &mut summary, item);
    }
    drain(mirror, &mut summary, config.drain_ms);
    info!(frames = summary.frames, end_ms = summary.end_ms, "virtual replay finished");
    summary
}

// ---------------------------------------------------------------------------
// Live mode
// ---------------------------------------------------------------------------

/// Replay a stream as it arrives, ticking frames in real time.
pub fn run_live<R, S>(
    input: R,
    mirror: &mut EventReconciler<S>,
    config: &ReplayConfig,
) -> Result<ReplaySummary, ReplayError>
where
    R: BufRead + Send + 'static,
    S: RenderSurface,
{
    let (tx, rx): (Sender<Result<Frame, FrameError>>, Receiver<Result<Frame, FrameError>>) =
        mpsc::channel();
    let reader = thread::spawn(move || {
        for item in FrameReader::new(input) {
            if tx.send(item).is_err() {
                break;
            }
        }
        debug!("log stream closed");
    });

    let frame_interval = Duration::from_millis(mirror.config().frame_interval_ms());
    let base_ms = mirror.now_ms();
    let start = Instant::now();
    let mut summary = ReplaySummary::default();
    loop {
        let received = rx.recv_timeout(frame_interval);
        let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let result = mirror.advance_to(base_ms.saturating_add(elapsed));
        summary.record(&result.events);
        match received {
            Ok(item) => {
                ingest(mirror, &mut summary, item);
                // Apply anything else that queued up while we were busy.
                while let Ok(item) = rx.try_recv() {
                    ingest(mirror, &mut summary, item);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    reader.join().map_err(|_| ReplayError::ReaderPanicked)?;

    drain(mirror, &mut summary, config.drain_ms);
    info!(frames = summary.frames, end_ms = summary.end_ms, "live replay finished");
    Ok(summary)
}
