//! Planner Progress

use std::fmt;

use crate::planner::StopReason;

/// Human-readable status emitted while a plan runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Planning started.
    Started,

    /// The backlog was validated and is ready to plan.
    Loaded {
        /// Orders that will be planned
        orders: usize,
    },

    /// A pattern solve is about to run.
    Iteration {
        /// 1-based iteration number
        current: usize,

        /// Number of orders in the backlog at the start, an upper bound on iterations
        total: usize,
    },

    /// The loop stopped before the backlog was exhausted.
    Stopped(StopReason),

    /// Planning finished.
    Finished {
        /// Accepted patterns
        patterns: usize,
    },
}

impl ProgressEvent {
    /// Rough completion estimate, in percent.
    ///
    /// Start is 5, loading 20, iterations spread over 50 to 95 and the end is 100.
    pub fn percent(&self) -> u8 {
        match self {
            ProgressEvent::Started => 5,
            ProgressEvent::Loaded { .. } => 20,
            ProgressEvent::Iteration { current, total } => {
                if *total == 0 {
                    return 50;
                }

                let step = current.saturating_mul(45) / total;

                u8::try_from(step).map_or(95, |step| step.saturating_add(50).min(95))
            }
            ProgressEvent::Stopped(_) => 95,
            ProgressEvent::Finished { .. } => 100,
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Started => f.write_str("Starting calculation"),
            ProgressEvent::Loaded { orders } => write!(f, "Loaded {orders} orders"),
            ProgressEvent::Iteration { current, total } => {
                write!(f, "Iteration {current}/{total}")
            }
            ProgressEvent::Stopped(reason) => write!(f, "Stopped: {reason}"),
            ProgressEvent::Finished { patterns } => {
                write!(f, "Finished with {patterns} patterns")
            }
        }
    }
}

/// Receives planner progress. Purely observational: the planner never reads anything back.
pub trait ProgressObserver {
    /// Called for every progress event.
    fn on_progress(&mut self, event: &ProgressEvent);
}

impl<F: FnMut(&ProgressEvent)> ProgressObserver for F {
    fn on_progress(&mut self, event: &ProgressEvent) {
        self(event);
    }
}

/// Progress observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {
    fn on_progress(&mut self, _event: &ProgressEvent) {}
}
