// Data-driven mirror configuration.
//
// Every tunable the mirror reads lives in `MirrorConfig`: lattice size and
// spacing, building capacity, tenant and person visual dimensions, frame
// rate, re-entry jitter, chart buffer size, and the list of chart names the
// client knows about. It is loaded from JSON (or taken from `Default`) once,
// handed to `EventReconciler::new`, and never mutated afterwards. No other
// module hard-codes these numbers.
//
// `from_json()` validates after parsing. Validation only rejects values that
// would make the mirror meaningless (an empty lattice, zero capacity, a zero
// frame rate, non-finite sizes); it does not second-guess aesthetics.
//
// See also: `reconciler.rs` which owns the config, `city.rs` for the lattice
// geometry derived from it, `series.rs` for the chart buffers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chart names the client registers at startup.
pub const DEFAULT_METRICS: [&str; 18] = [
    "mean_wage",
    "mean_equip_price",
    "mean_material_price",
    "mean_consumer_good_price",
    "mean_healthcare_price",
    "mean_equip_profit",
    "mean_material_profit",
    "mean_consumer_good_profit",
    "mean_healthcare_profit",
    "mean_quality_of_life",
    "mean_cash",
    "n_sick",
    "n_deaths",
    "n_population",
    "n_firms",
    "n_bankruptcies",
    "welfare",
    "tax_rate",
];

/// Top-level mirror configuration. Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Lattice rows (Z direction).
    pub rows: u32,
    /// Lattice columns (X direction).
    pub cols: u32,
    /// Side of one building footprint.
    pub cell_side: f64,
    /// Street margin on each side of a footprint.
    pub margin: f64,
    /// Added to the centering offset so tall stacks stay in frame.
    pub centering_nudge: (f64, f64),

    /// Maximum tenants per building.
    pub max_tenants: usize,
    /// Footprint side of a tenant box.
    pub tenant_side: f64,
    /// Height of one tenant box; the stack grows by this per tenant.
    pub tenant_unit_height: f64,

    /// Radius of a person's sphere. Also pads the exit test and biases lanes.
    pub person_radius: f64,
    /// Distance a wandering person covers per frame.
    pub person_speed: f64,

    /// Frame ticker rate.
    pub frames_per_second: u32,
    /// Re-entry delay is drawn uniformly from `[0, reentry_jitter_ms]`.
    pub reentry_jitter_ms: u64,

    /// Samples retained per chart.
    pub series_capacity: usize,
    /// Duration of the smoothed chart redraw.
    pub chart_transition_ms: u64,
    /// Charts the client knows about. Graph events for other names are ignored.
    pub metrics: Vec<String>,

    /// Seed for the scene PRNG.
    pub seed: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            rows: 6,
            cols: 6,
            cell_side: 1.0,
            margin: 0.5,
            centering_nudge: (3.0, 3.0),
            max_tenants: 10,
            tenant_side: 1.0,
            tenant_unit_height: 0.5,
            person_radius: 0.2,
            person_speed: 0.1,
            frames_per_second: 30,
            reentry_jitter_ms: 5000,
            series_capacity: 51,
            chart_transition_ms: 500,
            metrics: DEFAULT_METRICS.iter().map(|s| (*s).to_owned()).collect(),
            seed: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("lattice must have at least one row and one column (got {rows}x{cols})")]
    EmptyLattice { rows: u32, cols: u32 },
    #[error("`{field}` must be at least 1")]
    ZeroCount { field: &'static str },
    #[error("`{field}` must be a finite, non-negative number (got {value})")]
    BadLength { field: &'static str, value: f64 },
    #[error("`{field}` must be a finite, positive number (got {value})")]
    NonPositive { field: &'static str, value: f64 },
}

impl MirrorConfig {
    /// Parse and validate a config from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(ConfigError::EmptyLattice {
                rows: self.rows,
                cols: self.cols,
            });
        }
        for (field, count) in [
            ("max_tenants", self.max_tenants),
            ("series_capacity", self.series_capacity),
            ("frames_per_second", self.frames_per_second as usize),
        ] {
            if count == 0 {
                return Err(ConfigError::ZeroCount { field });
            }
        }
        for (field, value) in [
            ("cell_side", self.cell_side),
            ("tenant_side", self.tenant_side),
            ("tenant_unit_height", self.tenant_unit_height),
            ("person_radius", self.person_radius),
            ("person_speed", self.person_speed),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        for (field, value) in [
            ("margin", self.margin),
            ("centering_nudge.0", self.centering_nudge.0.abs()),
            ("centering_nudge.1", self.centering_nudge.1.abs()),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::BadLength { field, value });
            }
        }
        Ok(())
    }

    /// Milliseconds between frame ticks (integer division, at least 1).
    pub fn frame_interval_ms(&self) -> u64 {
        (1000 / u64::from(self.frames_per_second.max(1))).max(1)
    }

    /// Footprint plus street margin on both sides.
    pub fn full_side(&self) -> f64 {
        self.cell_side + 2.0 * self.margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MirrorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.frame_interval_ms(), 33);
        assert_eq!(config.full_side(), 2.0);
        assert_eq!(config.metrics.len(), 18);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config = MirrorConfig::from_json(r#"{"rows": 2, "cols": 3, "max_tenants": 4}"#).unwrap();
        assert_eq!((config.rows, config.cols), (2, 3));
        assert_eq!(config.max_tenants, 4);
        assert_eq!(config.series_capacity, 51);
        assert_eq!(config.reentry_jitter_ms, 5000);
    }

    #[test]
    fn rejects_empty_lattice() {
        let err = MirrorConfig::from_json(r#"{"rows": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyLattice { rows: 0, cols: 6 }));
    }

    #[test]
    fn rejects_zero_capacity_and_bad_sizes() {
        assert!(matches!(
            MirrorConfig::from_json(r#"{"max_tenants": 0}"#),
            Err(ConfigError::ZeroCount { field: "max_tenants" })
        ));
        assert!(matches!(
            MirrorConfig::from_json(r#"{"person_speed": 0.0}"#),
            Err(ConfigError::NonPositive { field: "person_speed", .. })
        ));
        assert!(matches!(
            MirrorConfig::from_json(r#"{"margin": -1.0}"#),
            Err(ConfigError::BadLength { field: "margin", .. })
        ));
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(
            MirrorConfig::from_json("{rows: 2"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn full_json_roundtrip() {
        let config = MirrorConfig {
            seed: 99,
            metrics: vec!["welfare".into()],
            ..MirrorConfig::default()
        };
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert_eq!(MirrorConfig::from_json(&json).unwrap(), config);
    }
}
