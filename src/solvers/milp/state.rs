//! MILP Model State

use std::fmt;

use good_lp::{Expression, ProblemVariables, Variable, VariableDefinition};

use crate::solvers::milp::observer::{MILPObserver, VariableRole};

/// Relation operator for a linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintRelation {
    /// Equality (`lhs == rhs`)
    Eq,

    /// Less than or equal (`lhs <= rhs`)
    Leq,

    /// Greater than or equal (`lhs >= rhs`)
    Geq,
}

impl fmt::Display for ConstraintRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintRelation::Eq => f.write_str("="),
            ConstraintRelation::Leq => f.write_str("<="),
            ConstraintRelation::Geq => f.write_str(">="),
        }
    }
}

/// Linear constraint recorded during model construction.
#[derive(Debug, Clone)]
pub(crate) struct RecordedConstraint {
    /// Constraint family name (e.g. `"big_m_select"`)
    pub(crate) name: &'static str,

    /// Candidate order the constraint belongs to, if any
    pub(crate) order_idx: Option<usize>,

    /// Left-hand side expression
    pub(crate) lhs: Expression,

    /// Relation operator
    pub(crate) relation: ConstraintRelation,

    /// Right-hand side scalar
    pub(crate) rhs: f64,
}

/// Builder state for the pattern model's variables and constraints
pub(crate) struct ModelState {
    pb: ProblemVariables,
    constraints: Vec<RecordedConstraint>,
}

impl fmt::Debug for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelState")
            .field("pb", &"<ProblemVariables>")
            .field(
                "constraints",
                &format!("[{} constraints]", self.constraints.len()),
            )
            .finish()
    }
}

impl ModelState {
    pub(crate) fn new() -> Self {
        Self {
            pb: ProblemVariables::new(),
            constraints: Vec::new(),
        }
    }

    /// Add a decision variable and tell the observer about it.
    pub(crate) fn add_variable<O: MILPObserver + ?Sized>(
        &mut self,
        definition: VariableDefinition,
        role: VariableRole,
        observer: &mut O,
    ) -> Variable {
        let var = self.pb.add(definition);

        observer.on_variable(role, var);

        var
    }

    /// Record an equality constraint.
    pub(crate) fn add_eq(
        &mut self,
        name: &'static str,
        order_idx: Option<usize>,
        lhs: Expression,
        rhs: f64,
    ) {
        self.record(name, order_idx, lhs, ConstraintRelation::Eq, rhs);
    }

    /// Record a less-than-or-equal constraint.
    pub(crate) fn add_leq(
        &mut self,
        name: &'static str,
        order_idx: Option<usize>,
        lhs: Expression,
        rhs: f64,
    ) {
        self.record(name, order_idx, lhs, ConstraintRelation::Leq, rhs);
    }

    /// Record a greater-than-or-equal constraint.
    pub(crate) fn add_geq(
        &mut self,
        name: &'static str,
        order_idx: Option<usize>,
        lhs: Expression,
        rhs: f64,
    ) {
        self.record(name, order_idx, lhs, ConstraintRelation::Geq, rhs);
    }

    fn record(
        &mut self,
        name: &'static str,
        order_idx: Option<usize>,
        lhs: Expression,
        relation: ConstraintRelation,
        rhs: f64,
    ) {
        self.constraints.push(RecordedConstraint {
            name,
            order_idx,
            lhs,
            relation,
            rhs,
        });
    }

    /// Number of recorded constraints.
    pub(crate) fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Extract the problem variables and all recorded constraints.
    pub(crate) fn into_parts(self) -> (ProblemVariables, Vec<RecordedConstraint>) {
        (self.pb, self.constraints)
    }
}
