//! MILP Pattern Solver
//!
//! Builds one mixed-integer model per call: a binary `select[j]` per candidate order, an integer
//! `cuts` count, and a linearised `cut_width[j] = cuts * select[j]`. The objective minimises trim
//! (`roll_width - Σ width[j] * cut_width[j]`), subject to the waste band, the cut caps and the
//! remaining-length floor in [`PlannerConfig`].

use std::time::Instant;

use good_lp::{Expression, Solution, SolverModel, Variable, variable};
use num_traits::ToPrimitive;
use smallvec::SmallVec;
use tracing::debug;

#[cfg(feature = "solver-highs")]
use good_lp::solvers::{WithTimeLimit, highs::highs as default_solver};
#[cfg(all(not(feature = "solver-highs"), feature = "solver-microlp"))]
use good_lp::solvers::microlp::microlp as default_solver;

use crate::{
    config::{FluteTypes, PlannerConfig},
    orders::Order,
    solvers::{
        CutPattern, PatternSolver, RollWidthRequest, SolverError,
        milp::state::{ModelState, RecordedConstraint},
    },
};

pub mod observer;
pub mod state;

pub use observer::{MILPObserver, NoopObserver, VariableRole};
pub use state::ConstraintRelation;

/// Binary threshold for determining truthiness
pub const BINARY_THRESHOLD: f64 = 0.5;

type VariableList = SmallVec<[Variable; 16]>;

/// Pattern solver backed by a `good_lp` mixed-integer model
///
/// With the `solver-highs` feature the solve time limit is enforced inside the solver. With microlp
/// it is checked after the solve returns, so a single slow solve is not interrupted; its late
/// result is discarded as [`SolverError::TimeLimitExceeded`].
#[derive(Debug, Clone, Default)]
pub struct MILPPatternSolver {
    config: PlannerConfig,
}

impl MILPPatternSolver {
    /// Create a solver with the given business constants.
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Solve while reporting the model's variables and constraints to `observer`.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Infeasible`] for an empty candidate list or an infeasible model,
    /// [`SolverError::InvalidRoll`] for unusable roll dimensions, and other [`SolverError`]
    /// variants when the underlying solver fails or overruns its time budget.
    pub fn solve_with_observer<O: MILPObserver + ?Sized>(
        &self,
        request: &RollWidthRequest,
        orders: &[Order],
        flutes: FluteTypes,
        observer: &mut O,
    ) -> Result<CutPattern, SolverError> {
        // Nothing to choose from, don't build a model.
        if orders.is_empty() {
            return Err(SolverError::Infeasible("no candidate orders"));
        }

        validate_request(request)?;

        let config = &self.config;
        let roll_width = request.roll_width;

        let cut_bound = cut_upper_bound(roll_width, orders, config.default_big_m);
        let big_m = cut_bound.max(1.0);
        let board_multiplier = flutes.board_multiplier(&config.multipliers);

        // Material length of each candidate, in roll length units.
        let order_lengths: SmallVec<[f64; 16]> = orders
            .iter()
            .map(|order| {
                order.length
                    * config.length_unit_factor
                    * f64::from(order.quantity)
                    * board_multiplier
            })
            .collect();

        debug!(
            roll_width,
            roll_length = request.roll_length,
            candidates = orders.len(),
            cut_bound,
            board_multiplier,
            "building pattern model"
        );

        let mut state = ModelState::new();

        let select: VariableList = (0..orders.len())
            .map(|j| {
                state.add_variable(
                    variable().binary(),
                    VariableRole::Select(j),
                    &mut *observer,
                )
            })
            .collect();

        let cuts = state.add_variable(
            variable().integer().min(0.0).max(cut_bound),
            VariableRole::Cuts,
            &mut *observer,
        );

        let cut_width: VariableList = (0..orders.len())
            .map(|j| {
                state.add_variable(
                    variable().min(0.0).max(cut_bound),
                    VariableRole::CutWidth(j),
                    &mut *observer,
                )
            })
            .collect();

        // Exactly one order is slit from this roll.
        let select_sum: Expression = select.iter().copied().map(Expression::from).sum();
        state.add_eq("select_one", None, select_sum, 1.0);

        let max_cuts = f64::from(config.max_cuts);
        let restricted_max_cuts = f64::from(config.restricted_max_cuts);

        let mut total_cut_width = Expression::from(0.0);
        let mut total_order_length = Expression::from(0.0);
        let mut objective = Expression::from(0.0);

        for (j, order) in orders.iter().enumerate() {
            let (Some(&s), Some(&cw), Some(&length)) =
                (select.get(j), cut_width.get(j), order_lengths.get(j))
            else {
                return Err(SolverError::InvariantViolation {
                    message: "decision variable missing for candidate order",
                });
            };

            // cut_width[j] = cuts * select[j]
            state.add_leq(
                "big_m_select",
                Some(j),
                Expression::from(cw) - big_m * s,
                0.0,
            );
            state.add_leq(
                "big_m_cuts",
                Some(j),
                Expression::from(cw) - Expression::from(cuts),
                0.0,
            );
            state.add_geq(
                "big_m_lower",
                Some(j),
                Expression::from(cw) - Expression::from(cuts) - big_m * s,
                -big_m,
            );

            state.add_leq("max_cuts", Some(j), Expression::from(cw), max_cuts);

            if order.is_restricted(&config.restricted_type_marker) {
                // cuts <= restricted cap whenever this order is selected
                state.add_leq(
                    "restricted_cuts",
                    Some(j),
                    Expression::from(cuts) + big_m * s,
                    restricted_max_cuts + big_m,
                );
            }

            total_cut_width += order.width * cw;
            total_order_length += length * s;
            objective += (-order.width) * cw;
        }

        // Waste band: roll_width - max_trim <= total_cut_width <= roll_width - min_trim
        state.add_geq(
            "trim_max",
            None,
            total_cut_width.clone(),
            roll_width - config.max_trim,
        );
        state.add_leq(
            "trim_min",
            None,
            total_cut_width.clone(),
            roll_width - config.min_trim,
        );
        state.add_leq("fits_width", None, total_cut_width, roll_width);

        state.add_geq(
            "remaining_length",
            None,
            request.roll_length * cuts - total_order_length,
            config.min_remaining_length,
        );

        observer.on_objective(&objective);

        let constraint_count = state.constraint_count();
        let (pb, constraints) = state.into_parts();

        for constraint in &constraints {
            observer.on_constraint(
                constraint.name,
                constraint.order_idx,
                &constraint.lhs,
                constraint.relation,
                constraint.rhs,
            );
        }

        let model = pb.minimise(objective).using(default_solver);

        #[cfg(feature = "solver-highs")]
        let model = model.with_time_limit(config.solve_time_limit_secs);

        let model = apply_recorded_constraints(model, constraints);

        let started = Instant::now();
        let outcome = model.solve();
        let elapsed = started.elapsed();

        observer.on_solved(elapsed);

        debug!(constraint_count, ?elapsed, ok = outcome.is_ok(), "pattern model solved");

        let solution = outcome?;

        let limit = config.solve_time_limit();

        // microlp can't be interrupted; reject late results instead.
        if elapsed > limit {
            return Err(SolverError::TimeLimitExceeded { limit, elapsed });
        }

        let order_index = select
            .iter()
            .position(|&s| solution.value(s) > BINARY_THRESHOLD)
            .ok_or(SolverError::InvariantViolation {
                message: "no order selected in solved model",
            })?;

        let order = orders.get(order_index).ok_or(SolverError::InvariantViolation {
            message: "selected order index out of range",
        })?;

        let total_order_length =
            order_lengths
                .get(order_index)
                .copied()
                .ok_or(SolverError::InvariantViolation {
                    message: "order length missing for selected order",
                })?;

        let cuts = solution
            .value(cuts)
            .round()
            .to_u32()
            .ok_or(SolverError::InvariantViolation {
                message: "cut count is not a non-negative integer",
            })?;

        let demand_per_cut = if cuts == 0 {
            0.0
        } else {
            total_order_length / f64::from(cuts)
        };

        Ok(CutPattern {
            order_index,
            selected_order_id: order.id.clone(),
            order_width: order.width,
            cuts,
            trim: roll_width - order.width * f64::from(cuts),
            total_order_length,
            demand_per_cut,
        })
    }
}

impl PatternSolver for MILPPatternSolver {
    fn solve(
        &self,
        request: &RollWidthRequest,
        orders: &[Order],
        flutes: FluteTypes,
    ) -> Result<CutPattern, SolverError> {
        self.solve_with_observer(request, orders, flutes, &mut NoopObserver)
    }
}

fn validate_request(request: &RollWidthRequest) -> Result<(), SolverError> {
    if !(request.roll_width.is_finite() && request.roll_width > 0.0) {
        return Err(SolverError::InvalidRoll {
            field: "width",
            value: request.roll_width,
        });
    }

    if !(request.roll_length.is_finite() && request.roll_length >= 0.0) {
        return Err(SolverError::InvalidRoll {
            field: "length",
            value: request.roll_length,
        });
    }

    Ok(())
}

/// Upper bound on `cuts`: how many of the narrowest positive-width order fit across the roll.
fn cut_upper_bound(roll_width: f64, orders: &[Order], fallback: f64) -> f64 {
    orders
        .iter()
        .map(|order| order.width)
        .filter(|width| *width > 0.0)
        .min_by(f64::total_cmp)
        .map_or(fallback, |narrowest| (roll_width / narrowest).floor())
}

fn apply_recorded_constraints<S: SolverModel>(
    mut model: S,
    constraints: Vec<RecordedConstraint>,
) -> S {
    for constraint in constraints {
        model = match constraint.relation {
            ConstraintRelation::Eq => model.with(constraint.lhs.eq(constraint.rhs)),
            ConstraintRelation::Leq => model.with(constraint.lhs.leq(constraint.rhs)),
            ConstraintRelation::Geq => model.with(constraint.lhs.geq(constraint.rhs)),
        };
    }

    model
}
