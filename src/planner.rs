//! Cutting Planner
//!
//! Drives the greedy planning loop for one roll: solve a single pattern against the remaining
//! backlog, charge each material layer of the chosen order to stock, shorten the roll, drop the
//! order and repeat until the backlog is empty or no pattern is feasible.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::{
    allocator::{AllocationTrace, RollAllocator, UsedRolls},
    config::{FluteTypes, PlannerConfig},
    orders::{MaterialLayers, Order, OrderError, validate_backlog},
    solvers::{PatternSolver, RollWidthRequest, SolverError, milp::MILPPatternSolver},
    stock::{RollRef, RollStock},
};

pub mod progress;

pub use progress::{NoopProgress, ProgressEvent, ProgressObserver};

/// Errors that abort a plan
#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    /// The backlog contains a malformed order.
    #[error("Invalid order: {0}")]
    InvalidOrder(#[from] OrderError),

    /// Two independently planned reports charged the same physical roll.
    #[error("Roll {0} was charged by more than one plan")]
    RollConflict(RollRef),
}

/// Cooperative cancellation flag shared between a running plan and whoever wants to stop it.
///
/// Checked between iterations only; a solve that already started runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Inputs of one planning run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    /// Width of the roll being slit
    pub roll_width: f64,

    /// Usable length of the roll at the start
    pub roll_length: f64,

    /// Width label used to look rolls up in stock
    pub stock_width: String,

    /// Flute types of the board
    pub flutes: FluteTypes,

    /// Only the first `max_records` orders of the backlog are planned
    pub max_records: Option<usize>,
}

impl PlanRequest {
    /// Create a request. Stock is looked up under the roll width printed without decimals when
    /// it is whole (`100.0` becomes `"100"`).
    pub fn new(roll_width: f64, roll_length: f64) -> Self {
        Self {
            roll_width,
            roll_length,
            stock_width: roll_width.to_string(),
            flutes: FluteTypes::default(),
            max_records: None,
        }
    }

    /// Set the flute types.
    #[must_use]
    pub fn with_flutes(mut self, flutes: FluteTypes) -> Self {
        self.flutes = flutes;
        self
    }

    /// Cap the number of backlog orders considered.
    #[must_use]
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    /// Look stock up under a different width label.
    #[must_use]
    pub fn with_stock_width(mut self, stock_width: impl Into<String>) -> Self {
        self.stock_width = stock_width.into();
        self
    }
}

/// Material drawn for one layer of an accepted pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerUsage {
    /// Paper material code
    pub material: String,

    /// Length the layer needed, after the flute conversion
    pub required: f64,

    /// Which rolls covered it
    pub trace: AllocationTrace,
}

/// One accepted pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternRecord {
    /// Width of the slit roll
    pub roll_width: f64,

    /// Width label the rolls were drawn under
    pub stock_width: String,

    /// Roll length remaining before this pattern
    pub roll_length: f64,

    /// The order produced by this pattern
    pub order: Order,

    /// Parallel cuts across the roll
    pub cuts: u32,

    /// Unused roll width
    pub trim: f64,

    /// Material length of the whole order, with the board multiplier applied
    pub total_order_length: f64,

    /// Material length consumed per cut
    pub demand_per_cut: f64,

    /// Flute types the pattern was planned with
    pub flutes: FluteTypes,

    /// Per-layer material usage
    pub layers: MaterialLayers<LayerUsage>,
}

impl PatternRecord {
    /// Whether any layer could not be covered from stock.
    pub fn has_shortfall(&self) -> bool {
        self.layers.iter().any(|(_, usage)| usage.trace.is_shortfall())
    }

    /// Sheets per cut (`quantity / cuts`), `None` when there are no cuts.
    pub fn quantity_per_cut(&self) -> Option<f64> {
        (self.cuts > 0).then(|| f64::from(self.order.quantity) / f64::from(self.cuts))
    }

    /// Physical rolls this pattern drew from.
    pub fn rolls_touched(&self) -> impl Iterator<Item = RollRef> + '_ {
        self.layers.iter().flat_map(move |(_, usage)| {
            usage
                .trace
                .usages()
                .iter()
                .map(move |roll| RollRef::new(&self.stock_width, &usage.material, &roll.roll_id))
        })
    }
}

/// Why the planning loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Every order was planned.
    Exhausted,

    /// No order fits the remaining roll.
    Infeasible(String),

    /// The solver failed.
    SolverError(String),

    /// Cancellation was requested.
    Cancelled,
}

impl StopReason {
    fn from_solver_error(error: &SolverError) -> Self {
        match error {
            SolverError::Infeasible(_) => StopReason::Infeasible(error.to_string()),
            _ => StopReason::SolverError(error.to_string()),
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Exhausted => f.write_str("backlog exhausted"),
            StopReason::Infeasible(message) | StopReason::SolverError(message) => {
                f.write_str(message)
            }
            StopReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A backlog order that no pattern consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct UnprocessedOrder {
    /// Width of the roll the order was planned against
    pub roll_width: f64,

    /// The order
    pub order: Order,

    /// Why the loop stopped before reaching it
    pub reason: StopReason,
}

/// Result of a planning run: accepted patterns in order, then everything left over.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanReport {
    /// Accepted patterns, in the order they were solved
    pub records: Vec<PatternRecord>,

    /// Orders still in the backlog when the loop stopped
    pub unprocessed: Vec<UnprocessedOrder>,

    /// Why the loop stopped
    pub stop: StopReason,
}

impl PlanReport {
    /// Physical rolls charged by any accepted pattern.
    pub fn rolls_touched(&self) -> FxHashSet<RollRef> {
        self.records
            .iter()
            .flat_map(PatternRecord::rolls_touched)
            .collect()
    }

    /// Combine with a report planned independently against its own copy of the stock.
    ///
    /// The combined stop reason is the first one that isn't [`StopReason::Exhausted`].
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::RollConflict`] naming a roll both reports charged.
    pub fn merge(mut self, other: PlanReport) -> Result<PlanReport, PlanError> {
        let ours = self.rolls_touched();

        let conflict = other
            .rolls_touched()
            .into_iter()
            .filter(|roll| ours.contains(roll))
            .min();

        if let Some(roll) = conflict {
            return Err(PlanError::RollConflict(roll));
        }

        if self.stop == StopReason::Exhausted {
            self.stop = other.stop;
        }

        self.records.extend(other.records);
        self.unprocessed.extend(other.unprocessed);

        Ok(self)
    }
}

/// Greedy single-roll planner.
#[derive(Debug, Clone)]
pub struct CuttingPlanner<S = MILPPatternSolver> {
    config: PlannerConfig,
    solver: S,
}

impl CuttingPlanner<MILPPatternSolver> {
    /// Create a planner backed by the MILP pattern solver.
    pub fn new(config: PlannerConfig) -> Self {
        let solver = MILPPatternSolver::new(config.clone());

        Self { config, solver }
    }
}

impl<S: PatternSolver> CuttingPlanner<S> {
    /// Create a planner with a custom pattern solver.
    pub fn with_solver(config: PlannerConfig, solver: S) -> Self {
        Self { config, solver }
    }

    /// Plan the backlog against one roll, drawing layers from `stock`.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::InvalidOrder`] when the backlog is malformed. Solver and stock
    /// failures are reported inside the [`PlanReport`].
    pub fn plan(
        &self,
        request: &PlanRequest,
        orders: &[Order],
        stock: &mut RollStock,
    ) -> Result<PlanReport, PlanError> {
        self.plan_with(
            request,
            orders,
            stock,
            &mut NoopProgress,
            &CancellationToken::new(),
        )
    }

    /// Plan with progress reporting and cooperative cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::InvalidOrder`] when the backlog is malformed.
    pub fn plan_with<P: ProgressObserver + ?Sized>(
        &self,
        request: &PlanRequest,
        orders: &[Order],
        stock: &mut RollStock,
        progress: &mut P,
        cancel: &CancellationToken,
    ) -> Result<PlanReport, PlanError> {
        let span = info_span!(
            "plan",
            roll_width = request.roll_width,
            roll_length = request.roll_length,
            flutes = %request.flutes,
        );
        let _enter = span.enter();

        progress.on_progress(&ProgressEvent::Started);

        let limit = request.max_records.unwrap_or(orders.len());
        let mut remaining: Vec<Order> = orders.iter().take(limit).cloned().collect();

        validate_backlog(&remaining)?;

        let total = remaining.len();
        progress.on_progress(&ProgressEvent::Loaded { orders: total });

        let mut allocator = RollAllocator::new();
        let mut used = UsedRolls::new();
        let mut records = Vec::new();
        let mut roll_length = request.roll_length;
        let mut iteration = 0;

        let stop = loop {
            if remaining.is_empty() {
                break StopReason::Exhausted;
            }

            if cancel.is_cancelled() {
                info!(accepted = records.len(), "plan cancelled");
                break StopReason::Cancelled;
            }

            iteration += 1;
            progress.on_progress(&ProgressEvent::Iteration {
                current: iteration,
                total,
            });

            let roll = RollWidthRequest::new(request.roll_width, roll_length);

            let pattern = match self.solver.solve(&roll, &remaining, request.flutes) {
                Ok(pattern) => pattern,
                Err(error) => {
                    debug!(%error, iteration, "no further pattern");
                    break StopReason::from_solver_error(&error);
                }
            };

            if pattern.order_index >= remaining.len() {
                warn!(index = pattern.order_index, "solver selected an unknown order");
                break StopReason::SolverError(
                    SolverError::InvariantViolation {
                        message: "selected order index out of range",
                    }
                    .to_string(),
                );
            }

            let order = remaining.remove(pattern.order_index);

            used.clear();

            let layers = order.material_spec().map(|layer, material| {
                let required =
                    request
                        .flutes
                        .layer_demand(layer, pattern.demand_per_cut, &self.config.multipliers);

                let trace = allocator.allocate(
                    stock,
                    &request.stock_width,
                    material,
                    required,
                    &mut used,
                    Some(&order.id),
                );

                LayerUsage {
                    material: material.clone(),
                    required,
                    trace,
                }
            });

            info!(
                order = %order.id,
                cuts = pattern.cuts,
                trim = pattern.trim,
                demand_per_cut = pattern.demand_per_cut,
                roll_length,
                "accepted pattern"
            );

            records.push(PatternRecord {
                roll_width: request.roll_width,
                stock_width: request.stock_width.clone(),
                roll_length,
                order,
                cuts: pattern.cuts,
                trim: pattern.trim,
                total_order_length: pattern.total_order_length,
                demand_per_cut: pattern.demand_per_cut,
                flutes: request.flutes,
                layers,
            });

            roll_length = (roll_length - pattern.demand_per_cut).max(0.0);
        };

        if stop != StopReason::Exhausted {
            progress.on_progress(&ProgressEvent::Stopped(stop.clone()));
        }

        let unprocessed = remaining
            .into_iter()
            .map(|order| UnprocessedOrder {
                roll_width: request.roll_width,
                order,
                reason: stop.clone(),
            })
            .collect();

        progress.on_progress(&ProgressEvent::Finished {
            patterns: records.len(),
        });

        Ok(PlanReport {
            records,
            unprocessed,
            stop,
        })
    }
}
