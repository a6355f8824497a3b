//! Planner Configuration
//!
//! Business constants used by the pattern solver and the planner. Everything that used to be an
//! inlined magic number (waste band, cut caps, corrugate multipliers) lives here so it can be
//! audited and overridden from a YAML file.

use std::{fmt, fs, path::Path, str::FromStr, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::orders::Layer;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading the configuration file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse config YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// A value failed validation
    #[error("Invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,

        /// Why the value was rejected
        reason: &'static str,
    },
}

/// Flute (corrugate) type of a fluted layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum CorrugateType {
    /// C flute
    C,

    /// B flute
    B,

    /// E flute
    E,
}

impl fmt::Display for CorrugateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrugateType::C => f.write_str("C"),
            CorrugateType::B => f.write_str("B"),
            CorrugateType::E => f.write_str("E"),
        }
    }
}

/// Error returned when parsing an unknown corrugate type.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown corrugate type `{0}`, expected one of C, B, E")]
pub struct UnknownCorrugateType(pub String);

impl FromStr for CorrugateType {
    type Err = UnknownCorrugateType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "C" | "c" => Ok(CorrugateType::C),
            "B" | "b" => Ok(CorrugateType::B),
            "E" | "e" => Ok(CorrugateType::E),
            other => Err(UnknownCorrugateType(other.to_string())),
        }
    }
}

/// Length multipliers for each flute type.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CorrugateMultipliers {
    /// C flute multiplier
    pub c: f64,

    /// B flute multiplier
    pub b: f64,

    /// E flute multiplier (unconfirmed business value)
    pub e: f64,
}

impl Default for CorrugateMultipliers {
    fn default() -> Self {
        Self {
            c: 1.45,
            b: 1.35,
            e: 1.25,
        }
    }
}

impl CorrugateMultipliers {
    /// Multiplier for a single flute type.
    pub fn for_type(&self, corrugate: CorrugateType) -> f64 {
        match corrugate {
            CorrugateType::C => self.c,
            CorrugateType::B => self.b,
            CorrugateType::E => self.e,
        }
    }
}

/// The flute types of the two fluted slots (`c` and `b`) for one planning run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FluteTypes {
    /// Flute type used in the `c` slot
    pub c: Option<CorrugateType>,

    /// Flute type used in the `b` slot
    pub b: Option<CorrugateType>,
}

impl FluteTypes {
    /// Create flute types for the `c` and `b` slots.
    pub fn new(c: Option<CorrugateType>, b: Option<CorrugateType>) -> Self {
        Self { c, b }
    }

    /// The board-level multiplier applied to order length.
    ///
    /// Precedence is C in the `c` slot, then B in the `b` slot, then E in either slot, else 1.0.
    pub fn board_multiplier(&self, multipliers: &CorrugateMultipliers) -> f64 {
        if self.c == Some(CorrugateType::C) {
            multipliers.c
        } else if self.b == Some(CorrugateType::B) {
            multipliers.b
        } else if self.c == Some(CorrugateType::E) || self.b == Some(CorrugateType::E) {
            multipliers.e
        } else {
            1.0
        }
    }

    /// Own multiplier of a layer: the slot's flute multiplier for `c`/`b`, 1.0 for liners.
    ///
    /// A fluted slot without a flute type is consumed like a liner.
    pub fn layer_multiplier(&self, layer: Layer, multipliers: &CorrugateMultipliers) -> f64 {
        let flute = match layer {
            Layer::C => self.c,
            Layer::B => self.b,
            Layer::Front | Layer::Middle | Layer::Back => None,
        };

        flute.map_or(1.0, |corrugate| multipliers.for_type(corrugate))
    }

    /// Convert the per-cut demand reported by the solver into the length drawn from one layer.
    ///
    /// `layer_demand = demand_per_cut / board_multiplier * layer_multiplier`. For liners this is
    /// `demand_per_cut / board_multiplier`; a `c` slot of type C takes the full demand; an E flute in
    /// the `c` slot next to a B flute takes `demand / 1.35 * 1.25`, and the `b` slot mirrors this
    /// against the C factor.
    pub fn layer_demand(
        &self,
        layer: Layer,
        demand_per_cut: f64,
        multipliers: &CorrugateMultipliers,
    ) -> f64 {
        let board = self.board_multiplier(multipliers);

        if board <= 0.0 {
            return 0.0;
        }

        demand_per_cut / board * self.layer_multiplier(layer, multipliers)
    }
}

impl fmt::Display for FluteTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |t: Option<CorrugateType>| t.map_or_else(|| "-".to_string(), |t| t.to_string());

        write!(f, "c={} b={}", show(self.c), show(self.b))
    }
}

/// Planner and solver configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Smallest acceptable trim (waste band lower edge)
    pub min_trim: f64,

    /// Largest acceptable trim (waste band upper edge)
    pub max_trim: f64,

    /// Maximum number of parallel cuts of a single order
    pub max_cuts: u32,

    /// Order `type`/`component_type` value that triggers the restricted cut cap
    pub restricted_type_marker: String,

    /// Cut cap applied to orders carrying the restricted marker
    pub restricted_max_cuts: u32,

    /// Length that must remain consumable on the roll after a pattern
    pub min_remaining_length: f64,

    /// Flute multipliers
    pub multipliers: CorrugateMultipliers,

    /// Converts order length units into roll length units
    pub length_unit_factor: f64,

    /// Cut bound and big-M used when no order has a positive width
    pub default_big_m: f64,

    /// Time budget for a single solve, in seconds
    ///
    /// HiGHS stops itself at this limit. The bundled microlp backend cannot be interrupted, so the
    /// budget is only checked once its solve returns: a stalled solve still blocks, and a solve that
    /// finishes late is rejected with [`SolverError::TimeLimitExceeded`].
    ///
    /// [`SolverError::TimeLimitExceeded`]: crate::solvers::SolverError::TimeLimitExceeded
    pub solve_time_limit_secs: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            min_trim: 1.0,
            max_trim: 5.0,
            max_cuts: 6,
            restricted_type_marker: "X".to_string(),
            restricted_max_cuts: 5,
            min_remaining_length: 100.0,
            multipliers: CorrugateMultipliers::default(),
            length_unit_factor: 1.0,
            default_big_m: 1000.0,
            solve_time_limit_secs: 30.0,
        }
    }
}

impl PlannerConfig {
    /// Load configuration from a YAML file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed or fails validation.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;

        Self::from_yaml_str(&contents)
    }

    /// Parse configuration from a YAML string. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the YAML cannot be parsed or fails validation.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_norway::from_str(contents)?;

        config.validate()?;

        Ok(config)
    }

    /// Check internal consistency of the configured values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first inconsistent field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_trim >= 0.0 && self.min_trim <= self.max_trim) {
            return Err(ConfigError::Invalid {
                field: "min_trim",
                reason: "must be non-negative and not above max_trim",
            });
        }

        if self.restricted_max_cuts > self.max_cuts {
            return Err(ConfigError::Invalid {
                field: "restricted_max_cuts",
                reason: "must not exceed max_cuts",
            });
        }

        if !(self.length_unit_factor.is_finite() && self.length_unit_factor > 0.0) {
            return Err(ConfigError::Invalid {
                field: "length_unit_factor",
                reason: "must be a positive number",
            });
        }

        if !(self.default_big_m >= 1.0) {
            return Err(ConfigError::Invalid {
                field: "default_big_m",
                reason: "must be at least 1",
            });
        }

        if !(self.solve_time_limit_secs.is_finite() && self.solve_time_limit_secs > 0.0) {
            return Err(ConfigError::Invalid {
                field: "solve_time_limit_secs",
                reason: "must be a positive number of seconds",
            });
        }

        Ok(())
    }

    /// Solve time budget as a [`Duration`].
    pub fn solve_time_limit(&self) -> Duration {
        Duration::from_secs_f64(self.solve_time_limit_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use testresult::TestResult;

    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn board_multiplier_follows_c_then_b_then_e_precedence() {
        let m = CorrugateMultipliers::default();

        let cases = [
            (Some(CorrugateType::C), Some(CorrugateType::B), 1.45),
            (Some(CorrugateType::E), Some(CorrugateType::B), 1.35),
            (None, Some(CorrugateType::B), 1.35),
            (Some(CorrugateType::E), None, 1.25),
            (None, Some(CorrugateType::E), 1.25),
            (None, None, 1.0),
        ];

        for (c, b, expected) in cases {
            let flutes = FluteTypes::new(c, b);
            assert!(
                close(flutes.board_multiplier(&m), expected),
                "c={c:?} b={b:?} expected {expected}"
            );
        }
    }

    #[test]
    fn liner_layers_divide_by_board_multiplier() {
        let m = CorrugateMultipliers::default();
        let flutes = FluteTypes::new(Some(CorrugateType::C), Some(CorrugateType::B));

        for layer in [Layer::Front, Layer::Middle, Layer::Back] {
            assert!(close(flutes.layer_demand(layer, 145.0, &m), 100.0));
        }
    }

    #[test]
    fn c_flute_takes_full_demand() {
        let m = CorrugateMultipliers::default();
        let flutes = FluteTypes::new(Some(CorrugateType::C), Some(CorrugateType::B));

        assert!(close(flutes.layer_demand(Layer::C, 290.0, &m), 290.0));
    }

    #[test]
    fn e_flute_in_c_slot_is_cross_adjusted_against_b() {
        let m = CorrugateMultipliers::default();

        let with_b = FluteTypes::new(Some(CorrugateType::E), Some(CorrugateType::B));
        assert!(close(
            with_b.layer_demand(Layer::C, 270.0, &m),
            270.0 / 1.35 * 1.25
        ));

        let alone = FluteTypes::new(Some(CorrugateType::E), None);
        assert!(close(alone.layer_demand(Layer::C, 270.0, &m), 270.0));
    }

    #[test]
    fn b_slot_mirrors_against_c_factor() {
        let m = CorrugateMultipliers::default();

        let b_with_c = FluteTypes::new(Some(CorrugateType::C), Some(CorrugateType::B));
        assert!(close(
            b_with_c.layer_demand(Layer::B, 290.0, &m),
            290.0 / 1.45 * 1.35
        ));

        let e_with_c = FluteTypes::new(Some(CorrugateType::C), Some(CorrugateType::E));
        assert!(close(
            e_with_c.layer_demand(Layer::B, 290.0, &m),
            290.0 / 1.45 * 1.25
        ));

        let b_alone = FluteTypes::new(None, Some(CorrugateType::B));
        assert!(close(b_alone.layer_demand(Layer::B, 135.0, &m), 135.0));
    }

    #[test]
    fn corrugate_type_parses_case_insensitively() -> TestResult {
        assert_eq!("c".parse::<CorrugateType>()?, CorrugateType::C);
        assert_eq!(" B ".parse::<CorrugateType>()?, CorrugateType::B);
        assert_eq!(
            "Z".parse::<CorrugateType>(),
            Err(UnknownCorrugateType("Z".to_string()))
        );

        Ok(())
    }

    #[test]
    fn yaml_overrides_keep_remaining_defaults() -> TestResult {
        let config = PlannerConfig::from_yaml_str("max_trim: 8\nmultipliers:\n  e: 1.3\n")?;

        assert!(close(config.max_trim, 8.0));
        assert!(close(config.min_trim, 1.0));
        assert!(close(config.multipliers.e, 1.3));
        assert!(close(config.multipliers.c, 1.45));
        assert_eq!(config.max_cuts, 6);

        Ok(())
    }

    #[test]
    fn invalid_waste_band_is_rejected() {
        let result = PlannerConfig::from_yaml_str("min_trim: 6\nmax_trim: 5\n");

        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "min_trim",
                ..
            })
        ));
    }

    #[test]
    fn loads_from_file() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "restricted_max_cuts: 4")?;

        let config = PlannerConfig::from_yaml_file(file.path())?;

        assert_eq!(config.restricted_max_cuts, 4);

        Ok(())
    }
}
