//! Slitplan prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    allocator::{AllocationTrace, RollAllocator, RollUsage, UsedRolls},
    config::{ConfigError, CorrugateMultipliers, CorrugateType, FluteTypes, PlannerConfig},
    fixtures::{Fixture, FixtureError},
    orders::{Layer, MaterialLayers, MaterialSpec, Order, OrderError},
    planner::{
        CancellationToken, CuttingPlanner, LayerUsage, NoopProgress, PatternRecord, PlanError,
        PlanReport, PlanRequest, ProgressEvent, ProgressObserver, StopReason, UnprocessedOrder,
    },
    report::{ReportError, TableOptions, write_table},
    solvers::{
        CutPattern, PatternSolver, PatternStatus, RollWidthRequest, SolverError,
        milp::{MILPObserver, MILPPatternSolver, NoopObserver},
    },
    stock::{PhysicalRoll, RollRef, RollStock, StockError, StockRecord},
    suggestions::{
        BatchOptions, BatchReport, Factory, Suggestion, SuggestionOutcome, SuggestionRun,
    },
};
