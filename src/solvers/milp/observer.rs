//! MILP Observer

use std::time::Duration;

use good_lp::{Expression, Variable};

use crate::solvers::milp::state::ConstraintRelation;

/// Role of a decision variable in the pattern model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableRole {
    /// Binary choice of candidate order `n`
    Select(usize),

    /// Integer number of parallel cuts
    Cuts,

    /// Linearised `cuts * select[n]`
    CutWidth(usize),
}

/// Observer trait for capturing the pattern model as it's built.
///
/// The solver stays the only place the model is constructed; observers passively record variables,
/// constraints and the objective for logging, rendering or tests.
pub trait MILPObserver {
    /// Called when a decision variable is created.
    fn on_variable(&mut self, role: VariableRole, var: Variable);

    /// Called when a constraint is added to the model.
    ///
    /// # Parameters
    ///
    /// - `name`: Constraint family (e.g. `"select_one"`, `"big_m_lower"`, `"trim_max"`)
    /// - `order_idx`: Candidate order the constraint belongs to, if any
    /// - `lhs`, `relation`, `rhs`: The linear constraint itself
    fn on_constraint(
        &mut self,
        name: &str,
        order_idx: Option<usize>,
        lhs: &Expression,
        relation: ConstraintRelation,
        rhs: f64,
    );

    /// Called once with the objective expression.
    fn on_objective(&mut self, _objective: &Expression) {}

    /// Called after the solver returns, successfully or not.
    fn on_solved(&mut self, _elapsed: Duration) {}
}

/// No-op observer for unobserved solves.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl MILPObserver for NoopObserver {
    fn on_variable(&mut self, _: VariableRole, _: Variable) {}

    fn on_constraint(
        &mut self,
        _: &str,
        _: Option<usize>,
        _: &Expression,
        _: ConstraintRelation,
        _: f64,
    ) {
    }
}
