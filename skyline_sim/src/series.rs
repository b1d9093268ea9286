// Sliding-window chart buffers.
//
// Each chart the client knows about has one `SlidingWindowSeries`: a bounded
// FIFO of `(time, value)` samples. Appending concatenates the new samples and
// then evicts from the front until the buffer is back under capacity (51 by
// default, about fifty ticks of history).
//
// After every non-empty append the series produces a `ChartFrame`: the full
// post-eviction path plus the x domain `[first.time, last.time]` and the y
// domain `[min, max]` over the *visible* window only. The axes therefore
// rescale as old extremes scroll out; that is the intended behavior. Domains
// are computed from the buffer on demand, never cached, so a frame can't be
// built from stale bounds.
//
// Samples are kept in arrival order. Out-of-order timestamps are not sorted
// or rejected; the x domain then simply reflects first and last as stored.
//
// `SeriesRegistry` holds the series by name. Graph events for names that were
// not registered from the config are ignored, so the server can add charts
// without breaking older clients.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use skyline_protocol::message::Sample;

/// Everything a chart needs to redraw itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartFrame {
    /// Every retained sample, oldest first.
    pub path: Vec<Sample>,
    pub x_domain: (i64, i64),
    pub y_domain: (f64, f64),
    /// Duration of the smoothed transition to this frame.
    pub transition_ms: u64,
}

impl ChartFrame {
    /// Evenly spaced y-axis tick labels across the y domain.
    pub fn y_tick_labels(&self, count: usize) -> Vec<String> {
        let (lo, hi) = self.y_domain;
        match count {
            0 => Vec::new(),
            1 => vec![human_format(lo)],
            _ => (0..count)
                .map(|i| {
                    let t = i as f64 / (count - 1) as f64;
                    human_format(lo + t * (hi - lo))
                })
                .collect(),
        }
    }
}

/// A bounded, oldest-evicted sample buffer backing one chart.
#[derive(Clone, Debug)]
pub struct SlidingWindowSeries {
    name: String,
    capacity: usize,
    transition_ms: u64,
    samples: VecDeque<Sample>,
}

impl SlidingWindowSeries {
    pub fn new(name: impl Into<String>, capacity: usize, transition_ms: u64) -> Self {
        Self {
            name: name.into(),
            capacity,
            transition_ms,
            samples: VecDeque::with_capacity(capacity + 1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Append a batch, evict down to capacity, and describe the redraw.
    /// Returns `None` only when the buffer is still empty afterwards.
    pub fn append(&mut self, batch: &[Sample]) -> Option<ChartFrame> {
        self.samples.extend(batch.iter().copied());
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        self.frame()
    }

    pub fn x_domain(&self) -> Option<(i64, i64)> {
        Some((self.samples.front()?.time, self.samples.back()?.time))
    }

    /// Min and max over the current window. NaN values are skipped; a window
    /// of only NaNs has no domain.
    pub fn y_domain(&self) -> Option<(f64, f64)> {
        self.samples
            .iter()
            .map(|s| s.value)
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Build a redraw frame from the current buffer.
    pub fn frame(&self) -> Option<ChartFrame> {
        let x_domain = self.x_domain()?;
        let y_domain = self.y_domain().unwrap_or((0.0, 0.0));
        Some(ChartFrame {
            path: self.samples.iter().copied().collect(),
            x_domain,
            y_domain,
            transition_ms: self.transition_ms,
        })
    }
}

/// All chart buffers, keyed by metric name.
#[derive(Clone, Debug, Default)]
pub struct SeriesRegistry {
    series: BTreeMap<String, SlidingWindowSeries>,
}

impl SeriesRegistry {
    pub fn new<I, S>(names: I, capacity: usize, transition_ms: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let series = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                (name.clone(), SlidingWindowSeries::new(name, capacity, transition_ms))
            })
            .collect();
        Self { series }
    }

    pub fn get(&self, name: &str) -> Option<&SlidingWindowSeries> {
        self.series.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlidingWindowSeries> {
        self.series.values()
    }

    /// Route samples to a named series. Unknown names are a silent no-op.
    pub fn append(&mut self, name: &str, batch: &[Sample]) -> Option<ChartFrame> {
        self.series.get_mut(name)?.append(batch)
    }
}

/// Compact axis label: `1.2B`, `3.4M`, `5.6k`, `7.8`, or scientific for
/// magnitudes below 0.01.
pub fn human_format(v: f64) -> String {
    let a = v.abs();
    if a >= 0.9995e9 {
        format!("{:.1}B", v / 1e9)
    } else if a >= 0.9995e6 {
        format!("{:.1}M", v / 1e6)
    } else if a >= 0.9995e3 {
        format!("{:.1}k", v / 1e3)
    } else if a < 0.9995e-2 {
        format!("{v:.1e}")
    } else {
        format!("{v:.1}")
    }
}
