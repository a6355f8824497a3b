//! Pattern Solvers
//!
//! A pattern solver picks the next order to slit from a roll and how many parallel cuts to make
//! across the roll's width.

use std::{fmt, time::Duration};

use good_lp::ResolutionError;
use thiserror::Error;

use crate::{config::FluteTypes, orders::Order};

pub mod milp;

/// Solver Errors
#[derive(Debug, Error)]
pub enum SolverError {
    /// No order selection satisfies the constraints for the current roll state.
    #[error("Infeasible: {0}")]
    Infeasible(&'static str),

    /// The roll width or length cannot be planned against.
    #[error("SolverError: invalid roll {field} {value}")]
    InvalidRoll {
        /// Which roll dimension is invalid
        field: &'static str,

        /// Supplied value
        value: f64,
    },

    /// The solve ran past its time budget.
    #[error("SolverError: solve took {elapsed:?}, exceeding the {limit:?} budget")]
    TimeLimitExceeded {
        /// Configured budget
        limit: Duration,

        /// Time the solve actually took
        elapsed: Duration,
    },

    /// Wrapped solver resolution error
    #[error("SolverError: {0}")]
    Resolution(ResolutionError),

    /// Internal solver invariant was violated (this is a bug).
    #[error("SolverError: solver invariant violated: {message}")]
    InvariantViolation {
        /// What invariant was violated
        message: &'static str,
    },
}

impl From<ResolutionError> for SolverError {
    fn from(error: ResolutionError) -> Self {
        match error {
            ResolutionError::Infeasible => SolverError::Infeasible(
                "no order selection satisfies the waste band and length constraints",
            ),
            other => SolverError::Resolution(other),
        }
    }
}

impl SolverError {
    /// Status category of this error.
    pub fn status(&self) -> PatternStatus {
        match self {
            SolverError::Infeasible(_) => PatternStatus::Infeasible,
            SolverError::InvalidRoll { .. }
            | SolverError::TimeLimitExceeded { .. }
            | SolverError::Resolution(_)
            | SolverError::InvariantViolation { .. } => PatternStatus::SolverError,
        }
    }
}

/// Status of a pattern solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternStatus {
    /// A pattern was found.
    Optimal,

    /// No feasible pattern exists for the current roll state.
    Infeasible,

    /// The solver failed to run.
    SolverError,
}

impl fmt::Display for PatternStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternStatus::Optimal => f.write_str("Optimal"),
            PatternStatus::Infeasible => f.write_str("Infeasible"),
            PatternStatus::SolverError => f.write_str("SolverError"),
        }
    }
}

/// The physical roll being planned against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollWidthRequest {
    /// Roll width
    pub roll_width: f64,

    /// Remaining usable roll length
    pub roll_length: f64,
}

impl RollWidthRequest {
    /// Create a request.
    pub fn new(roll_width: f64, roll_length: f64) -> Self {
        Self {
            roll_width,
            roll_length,
        }
    }
}

/// Result of one successful pattern solve.
#[derive(Debug, Clone, PartialEq)]
pub struct CutPattern {
    /// Position of the selected order in the candidate slice
    pub order_index: usize,

    /// Selected order id
    pub selected_order_id: String,

    /// Width of the selected order
    pub order_width: f64,

    /// Number of parallel cuts across the roll width
    pub cuts: u32,

    /// Unused roll width: `roll_width - order_width * cuts`
    pub trim: f64,

    /// Material length of the whole order, in roll length units, with the board multiplier applied
    pub total_order_length: f64,

    /// Material length consumed per cut (0 when `cuts` is 0)
    pub demand_per_cut: f64,
}

impl CutPattern {
    /// Status of a successful solve.
    pub fn status(&self) -> PatternStatus {
        PatternStatus::Optimal
    }
}

/// Trait for solving single-pattern problems
pub trait PatternSolver {
    /// Pick one order and a cut count for the given roll and candidates.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Infeasible`] when no candidate fits the constraints (including an
    /// empty candidate list) and other [`SolverError`] variants when the solver fails.
    fn solve(
        &self,
        request: &RollWidthRequest,
        orders: &[Order],
        flutes: FluteTypes,
    ) -> Result<CutPattern, SolverError>;
}
