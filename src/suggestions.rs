//! Suggestions
//!
//! A suggestion pairs a stock width with a material spec taken from the backlog. Batch runs plan
//! every suggestion in turn, each against a fresh copy of the stock, so a whole backlog can be
//! planned without picking widths by hand.

use std::{fmt, str::FromStr};

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    config::{CorrugateType, FluteTypes},
    orders::{MaterialSpec, Order, validate_backlog},
    planner::{
        CancellationToken, CuttingPlanner, PatternRecord, PlanError, PlanRequest, ProgressObserver,
        StopReason, UnprocessedOrder,
    },
    solvers::PatternSolver,
    stock::{RollStock, numeric_width},
};

/// Error returned when parsing an unknown factory.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown factory `{0}`, expected 1 to 5")]
pub struct UnknownFactory(pub String);

/// Production site. Each site only plans orders whose number carries its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Factory {
    /// Factory 1
    One,

    /// Factory 2
    Two,

    /// Factory 3
    Three,

    /// Factory 4
    Four,

    /// Factory 5
    Five,
}

impl Factory {
    /// Factory number.
    pub fn number(self) -> u32 {
        match self {
            Factory::One => 1,
            Factory::Two => 2,
            Factory::Three => 3,
            Factory::Four => 4,
            Factory::Five => 5,
        }
    }

    /// Whether an order number belongs to this factory.
    ///
    /// Factories 1 and 2 share orders numbered `1218…`; factories 3 to 5 take orders whose first
    /// digit is the factory number.
    pub fn accepts(self, order_id: &str) -> bool {
        let id = order_id.trim();

        match self {
            Factory::One | Factory::Two => prefix_value(id, 4) == Some(1218),
            Factory::Three | Factory::Four | Factory::Five => {
                prefix_value(id, 1) == Some(self.number())
            }
        }
    }
}

fn prefix_value(id: &str, chars: usize) -> Option<u32> {
    let prefix: String = id.chars().take(chars).collect();

    prefix.parse().ok()
}

impl fmt::Display for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl FromStr for Factory {
    type Err = UnknownFactory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(Factory::One),
            "2" => Ok(Factory::Two),
            "3" => Ok(Factory::Three),
            "4" => Ok(Factory::Four),
            "5" => Ok(Factory::Five),
            other => Err(UnknownFactory(other.to_string())),
        }
    }
}

/// Keep only the orders a factory can produce; `None` keeps everything.
pub fn filter_by_factory(orders: &[Order], factory: Option<Factory>) -> Vec<Order> {
    orders
        .iter()
        .filter(|order| factory.is_none_or(|factory| factory.accepts(&order.id)))
        .cloned()
        .collect()
}

/// A stock width to try for one material spec.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    /// Width label as stocked
    pub width: String,

    /// Material spec of the orders to plan
    pub spec: MaterialSpec,

    /// Backlog orders sharing the material spec
    pub order_count: usize,
}

impl Suggestion {
    /// Flute types implied by the material spec: C when the `c` slot is filled, B when the `b` slot is.
    pub fn flutes(&self) -> FluteTypes {
        FluteTypes::new(
            self.spec.c.as_ref().map(|_| CorrugateType::C),
            self.spec.b.as_ref().map(|_| CorrugateType::B),
        )
    }

    /// Length the stock can sustain for this spec at this width.
    ///
    /// For each material: the shortest roll times how many full sets of rolls the layers using it
    /// can draw. The minimum over materials wins. `None` when the width lacks any material.
    pub fn effective_length(&self, stock: &RollStock) -> Option<f64> {
        let usage = self.spec.material_usage();

        if usage.is_empty() {
            return None;
        }

        usage
            .iter()
            .map(|&(material, layers)| {
                let rolls = stock.rolls(&self.width, material);

                let shortest = rolls
                    .iter()
                    .map(|roll| roll.length)
                    .min_by(f64::total_cmp)?;

                let sets = rolls.len() / layers.max(1);

                u32::try_from(sets)
                    .ok()
                    .map(|sets| shortest * f64::from(sets))
            })
            .try_fold(f64::INFINITY, |acc, length| length.map(|length| acc.min(length)))
    }
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "width {} ({})", self.width, self.spec)
    }
}

/// Group the backlog by material spec, most common first, and pair each spec with every stock
/// width that carries all of its materials. Widths are listed in numeric order.
pub fn generate(orders: &[Order], stock: &RollStock) -> Vec<Suggestion> {
    let mut index: FxHashMap<MaterialSpec, usize> = FxHashMap::default();
    let mut specs: Vec<(MaterialSpec, usize)> = Vec::new();

    for order in orders {
        let spec = order.material_spec();

        if spec.is_empty() {
            continue;
        }

        if let Some(entry) = index.get(&spec).and_then(|&idx| specs.get_mut(idx)) {
            entry.1 += 1;
        } else {
            index.insert(spec.clone(), specs.len());
            specs.push((spec, 1));
        }
    }

    // Stable: ties keep first-seen order.
    specs.sort_by(|a, b| b.1.cmp(&a.1));

    let widths = stock.widths();
    let mut suggestions = Vec::new();

    for (spec, order_count) in specs {
        let materials: Vec<&str> = spec
            .material_usage()
            .iter()
            .map(|&(material, _)| material)
            .collect();

        for width in &widths {
            if stock.has_materials(width, materials.iter().copied()) {
                suggestions.push(Suggestion {
                    width: (*width).to_string(),
                    spec: spec.clone(),
                    order_count,
                });
            }
        }
    }

    debug!(count = suggestions.len(), "generated suggestions");

    suggestions
}

/// What happened to one suggestion in a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum SuggestionOutcome {
    /// The suggestion was planned.
    Planned {
        /// Accepted patterns
        patterns: usize,

        /// Why its loop stopped
        stop: StopReason,
    },

    /// The width label is not a number.
    InvalidWidth,

    /// The width lacks one of the materials.
    NoStock,

    /// No unplanned order matches the material spec.
    NoOrders,
}

/// One suggestion and its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionRun {
    /// The suggestion
    pub suggestion: Suggestion,

    /// The outcome
    pub outcome: SuggestionOutcome,
}

/// Settings shared by every suggestion in a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchOptions {
    /// Roll length each suggestion is planned with
    pub roll_length: f64,

    /// Backlog cap per suggestion
    pub max_records: Option<usize>,
}

/// Result of a batch run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchReport {
    /// Per-suggestion outcomes, in run order
    pub runs: Vec<SuggestionRun>,

    /// Accepted patterns of every suggestion, sorted by roll width
    pub records: Vec<PatternRecord>,

    /// Orders no suggestion managed to plan, with the last reason seen
    pub unprocessed: Vec<UnprocessedOrder>,

    /// Whether the batch stopped early on cancellation
    pub cancelled: bool,
}

/// Plan every suggestion in order.
///
/// Orders accepted by an earlier suggestion are not offered to later ones. Each suggestion plans
/// against its own copy of `stock`, so `stock` itself is never modified. A solver failure only ends
/// that suggestion.
///
/// # Errors
///
/// Returns [`PlanError::InvalidOrder`] if the backlog is malformed.
pub fn run_all<S: PatternSolver, P: ProgressObserver + ?Sized>(
    planner: &CuttingPlanner<S>,
    suggestions: &[Suggestion],
    orders: &[Order],
    stock: &RollStock,
    options: BatchOptions,
    progress: &mut P,
    cancel: &CancellationToken,
) -> Result<BatchReport, PlanError> {
    validate_backlog(orders)?;

    let mut report = BatchReport::default();
    let mut processed: FxHashSet<String> = FxHashSet::default();
    let mut unplanned: FxHashMap<String, UnprocessedOrder> = FxHashMap::default();

    for (idx, suggestion) in suggestions.iter().enumerate() {
        if cancel.is_cancelled() {
            info!(completed = idx, "batch cancelled");
            report.cancelled = true;
            break;
        }

        info!(
            run = idx + 1,
            of = suggestions.len(),
            %suggestion,
            "running suggestion"
        );

        let outcome = run_one(
            planner,
            suggestion,
            orders,
            stock,
            options,
            &mut processed,
            &mut unplanned,
            &mut report.records,
            progress,
            cancel,
        )?;

        if matches!(
            outcome,
            SuggestionOutcome::Planned {
                stop: StopReason::Cancelled,
                ..
            }
        ) {
            report.cancelled = true;
        }

        report.runs.push(SuggestionRun {
            suggestion: suggestion.clone(),
            outcome,
        });
    }

    report
        .records
        .sort_by_key(|record| numeric_width(&record.stock_width));

    // Backlog order is kept for leftovers.
    report.unprocessed = orders
        .iter()
        .filter_map(|order| unplanned.remove(&order.id))
        .filter(|order| !processed.contains(&order.order.id))
        .collect();

    Ok(report)
}

#[expect(
    clippy::too_many_arguments,
    reason = "batch state is threaded through explicitly"
)]
fn run_one<S: PatternSolver, P: ProgressObserver + ?Sized>(
    planner: &CuttingPlanner<S>,
    suggestion: &Suggestion,
    orders: &[Order],
    stock: &RollStock,
    options: BatchOptions,
    processed: &mut FxHashSet<String>,
    unplanned: &mut FxHashMap<String, UnprocessedOrder>,
    records: &mut Vec<PatternRecord>,
    progress: &mut P,
    cancel: &CancellationToken,
) -> Result<SuggestionOutcome, PlanError> {
    let Ok(roll_width) = suggestion.width.trim().parse::<f64>() else {
        warn!(width = %suggestion.width, "skipping suggestion with invalid width");
        return Ok(SuggestionOutcome::InvalidWidth);
    };

    let Some(effective_length) = suggestion.effective_length(stock) else {
        warn!(%suggestion, "skipping suggestion without stock for every material");
        return Ok(SuggestionOutcome::NoStock);
    };

    let candidates: Vec<Order> = orders
        .iter()
        .filter(|order| !processed.contains(&order.id))
        .filter(|order| order.material_spec() == suggestion.spec)
        .cloned()
        .collect();

    if candidates.is_empty() {
        debug!(%suggestion, "no orders left for suggestion");
        return Ok(SuggestionOutcome::NoOrders);
    }

    debug!(effective_length, candidates = candidates.len(), "planning suggestion");

    let mut request = PlanRequest::new(roll_width, options.roll_length)
        .with_stock_width(suggestion.width.clone())
        .with_flutes(suggestion.flutes());

    request.max_records = options.max_records;

    let mut working = stock.clone();

    let plan = planner.plan_with(&request, &candidates, &mut working, progress, cancel)?;

    for record in &plan.records {
        processed.insert(record.order.id.clone());
        unplanned.remove(&record.order.id);
    }

    for leftover in plan.unprocessed {
        unplanned.insert(leftover.order.id.clone(), leftover);
    }

    let patterns = plan.records.len();
    records.extend(plan.records);

    Ok(SuggestionOutcome::Planned {
        patterns,
        stop: plan.stop,
    })
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::{config::PlannerConfig, orders::MaterialLayers, planner::NoopProgress};

    use super::*;

    fn spec(front: &str, c: Option<&str>) -> MaterialSpec {
        MaterialLayers {
            front: Some(front.to_string()),
            c: c.map(str::to_string),
            ..MaterialLayers::default()
        }
    }

    fn order(id: &str, width: f64, spec: &MaterialSpec) -> Order {
        Order::new(id, width, 100.0, 1).with_layers(spec.clone())
    }

    #[test]
    fn factories_filter_by_order_prefix() {
        let orders = [
            Order::new("1218001", 10.0, 1.0, 1),
            Order::new("3001", 10.0, 1.0, 1),
            Order::new("4001", 10.0, 1.0, 1),
            Order::new("A001", 10.0, 1.0, 1),
        ];

        let ids = |factory| -> Vec<String> {
            filter_by_factory(&orders, factory)
                .into_iter()
                .map(|order| order.id)
                .collect()
        };

        assert_eq!(ids(Some(Factory::One)), vec!["1218001"]);
        assert_eq!(ids(Some(Factory::Two)), vec!["1218001"]);
        assert_eq!(ids(Some(Factory::Three)), vec!["3001"]);
        assert_eq!(ids(Some(Factory::Four)), vec!["4001"]);
        assert!(ids(Some(Factory::Five)).is_empty());
        assert_eq!(ids(None).len(), 4);
    }

    #[test]
    fn factory_parses_from_number() -> TestResult {
        assert_eq!("3".parse::<Factory>()?, Factory::Three);
        assert_eq!(
            "9".parse::<Factory>(),
            Err(UnknownFactory("9".to_string()))
        );

        Ok(())
    }

    #[test]
    fn suggestions_follow_spec_frequency_then_numeric_width() -> TestResult {
        let common = spec("KA125", Some("CA105"));
        let rare = spec("KI125", None);

        let orders = [
            order("1", 10.0, &rare),
            order("2", 10.0, &common),
            order("3", 10.0, &common),
        ];

        let stock = RollStock::new()
            .with_roll("120", "KA125", "R1", 1000.0)?
            .with_roll("120", "CA105", "R2", 1000.0)?
            .with_roll("95", "KA125", "R3", 1000.0)?
            .with_roll("95", "CA105", "R4", 1000.0)?
            .with_roll("95", "KI125", "R5", 1000.0)?
            .with_roll("60", "KA125", "R6", 1000.0)?;

        let got: Vec<(String, usize)> = generate(&orders, &stock)
            .into_iter()
            .map(|s| (s.width, s.order_count))
            .collect();

        assert_eq!(
            got,
            vec![
                ("95".to_string(), 2),
                ("120".to_string(), 2),
                ("95".to_string(), 1),
            ]
        );

        Ok(())
    }

    #[test]
    fn effective_length_counts_full_roll_sets() -> TestResult {
        // KA125 is used by two layers and has three rolls: one full set of 800.
        let suggestion = Suggestion {
            width: "100".to_string(),
            spec: MaterialLayers {
                front: Some("KA125".to_string()),
                c: Some("CA105".to_string()),
                back: Some("KA125".to_string()),
                ..MaterialLayers::default()
            },
            order_count: 1,
        };

        let stock = RollStock::new()
            .with_roll("100", "KA125", "R1", 800.0)?
            .with_roll("100", "KA125", "R2", 900.0)?
            .with_roll("100", "KA125", "R3", 1000.0)?
            .with_roll("100", "CA105", "R4", 700.0)?
            .with_roll("100", "CA105", "R5", 750.0)?;

        assert_eq!(suggestion.effective_length(&stock), Some(800.0));

        let missing = RollStock::new().with_roll("100", "KA125", "R1", 800.0)?;
        assert_eq!(suggestion.effective_length(&missing), None);

        Ok(())
    }

    #[test]
    fn flutes_follow_filled_slots() {
        let suggestion = Suggestion {
            width: "100".to_string(),
            spec: spec("KA125", Some("CA105")),
            order_count: 1,
        };

        assert_eq!(
            suggestion.flutes(),
            FluteTypes::new(Some(CorrugateType::C), None)
        );
    }

    #[test]
    fn batch_excludes_orders_planned_by_earlier_suggestions() -> TestResult {
        let liner = spec("KA125", None);
        let orders = [order("1", 10.0, &liner), order("2", 13.0, &liner)];

        let stock = RollStock::new()
            .with_roll("55", "KA125", "R1", 1000.0)?
            .with_roll("57", "KA125", "R2", 1000.0)?;

        let suggestions = generate(&orders, &stock);
        let planner = CuttingPlanner::new(PlannerConfig::default());

        let report = run_all(
            &planner,
            &suggestions,
            &orders,
            &stock,
            BatchOptions {
                roll_length: 10_000.0,
                max_records: None,
            },
            &mut NoopProgress,
            &CancellationToken::new(),
        )?;

        assert_eq!(report.runs.len(), 2);
        assert_eq!(report.records.len(), 2);
        assert!(report.unprocessed.is_empty());
        assert_eq!(
            report.runs.get(1).map(|run| &run.outcome),
            Some(&SuggestionOutcome::NoOrders)
        );

        // Stock handed to the batch is never touched.
        assert_eq!(stock.remaining("55", "KA125", "R1"), Some(1000.0));

        Ok(())
    }

    #[test]
    fn batch_keeps_going_after_an_infeasible_suggestion() -> TestResult {
        let liner = spec("KA125", None);
        // Nothing fits on 52 (5 * 9 leaves 7, 6 * 9 overflows), but 6 * 9 on 55 leaves 1.
        let orders = [order("1", 9.0, &liner)];

        let stock = RollStock::new()
            .with_roll("52", "KA125", "R1", 1000.0)?
            .with_roll("55", "KA125", "R2", 1000.0)?
            .with_roll("x", "KA125", "R3", 1000.0)?;

        let suggestions = generate(&orders, &stock);
        let planner = CuttingPlanner::new(PlannerConfig::default());
        let cancel = CancellationToken::new();

        let report = run_all(
            &planner,
            &suggestions,
            &orders,
            &stock,
            BatchOptions {
                roll_length: 10_000.0,
                max_records: None,
            },
            &mut NoopProgress,
            &cancel,
        )?;

        let outcomes: Vec<&SuggestionOutcome> =
            report.runs.iter().map(|run| &run.outcome).collect();

        assert_eq!(outcomes.first(), Some(&&SuggestionOutcome::InvalidWidth));
        assert_eq!(report.records.len(), 1);
        assert_eq!(
            report.records.first().map(|record| record.stock_width.as_str()),
            Some("55")
        );
        assert!(report.unprocessed.is_empty());

        Ok(())
    }

    #[test]
    fn cancelled_batch_stops_before_the_next_suggestion() -> TestResult {
        let liner = spec("KA125", None);
        let orders = [order("1", 10.0, &liner)];
        let stock = RollStock::new().with_roll("55", "KA125", "R1", 1000.0)?;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run_all(
            &CuttingPlanner::new(PlannerConfig::default()),
            &generate(&orders, &stock),
            &orders,
            &stock,
            BatchOptions {
                roll_length: 10_000.0,
                max_records: None,
            },
            &mut NoopProgress,
            &cancel,
        )?;

        assert!(report.cancelled);
        assert!(report.runs.is_empty());

        Ok(())
    }
}
