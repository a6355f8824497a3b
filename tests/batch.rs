//! Batch planning over suggestions generated from the `batch` fixture set.

use slitplan::{
    allocator::AllocationTrace,
    config::PlannerConfig,
    fixtures::Fixture,
    planner::{CancellationToken, CuttingPlanner, NoopProgress, StopReason},
    suggestions::{self, BatchOptions, Factory, SuggestionOutcome},
};
use testresult::TestResult;

fn options() -> BatchOptions {
    BatchOptions {
        roll_length: 10_000.0,
        max_records: None,
    }
}

#[test]
fn suggestions_follow_spec_popularity_then_width() -> TestResult {
    let fixture = Fixture::from_set("batch")?;
    let stock = fixture.stock()?;

    let suggestions = suggestions::generate(fixture.orders(), &stock);

    let pairs: Vec<(&str, usize)> = suggestions
        .iter()
        .map(|s| (s.width.as_str(), s.order_count))
        .collect();

    assert_eq!(pairs, [("55", 3), ("60", 3), ("49", 1), ("60", 1)]);

    Ok(())
}

#[test]
fn batch_plans_each_order_once_against_fresh_stock() -> TestResult {
    let fixture = Fixture::from_set("batch")?;
    let stock = fixture.stock()?;
    let planner = CuttingPlanner::new(PlannerConfig::default());

    let suggestions = suggestions::generate(fixture.orders(), &stock);
    let report = suggestions::run_all(
        &planner,
        &suggestions,
        fixture.orders(),
        &stock,
        options(),
        &mut NoopProgress,
        &CancellationToken::new(),
    )?;

    let planned: Vec<(&str, &str, u32)> = report
        .records
        .iter()
        .map(|r| (r.stock_width.as_str(), r.order.id.as_str(), r.cuts))
        .collect();

    assert_eq!(
        planned,
        [
            ("49", "121800020", 4),
            ("55", "300000012", 6),
            ("55", "121800011", 4),
            ("55", "121800010", 5),
        ]
    );

    let outcomes: Vec<bool> = report
        .runs
        .iter()
        .map(|run| matches!(run.outcome, SuggestionOutcome::NoOrders))
        .collect();

    assert_eq!(outcomes, [false, true, false, true]);
    assert!(report.unprocessed.is_empty());
    assert!(!report.cancelled);

    // Planning never touches the caller's stock.
    assert_eq!(stock, fixture.stock()?);

    Ok(())
}

#[test]
fn a_single_liner_roll_cannot_serve_both_liners() -> TestResult {
    let fixture = Fixture::from_set("batch")?;
    let stock = fixture.stock()?;
    let planner = CuttingPlanner::new(PlannerConfig::default());

    let suggestions = suggestions::generate(fixture.orders(), &stock);
    let report = suggestions::run_all(
        &planner,
        &suggestions,
        fixture.orders(),
        &stock,
        options(),
        &mut NoopProgress,
        &CancellationToken::new(),
    )?;

    let fluted = report
        .records
        .iter()
        .find(|r| r.order.id == "121800020")
        .ok_or("fluted order was not planned")?;

    // C flute: 400 * 1.45 = 580 over 4 cuts.
    assert!((fluted.demand_per_cut - 145.0).abs() < 1e-6);
    assert!(fluted.has_shortfall());

    let front = &fluted.layers.front.as_ref().ok_or("front")?.trace;
    let back = &fluted.layers.back.as_ref().ok_or("back")?.trace;
    let c = fluted.layers.c.as_ref().ok_or("c")?;

    assert!(matches!(front, AllocationTrace::Opened(_)));
    assert!(matches!(back, AllocationTrace::Insufficient { .. }));
    assert!((c.required - 145.0).abs() < 1e-6);

    Ok(())
}

#[test]
fn factory_filter_narrows_the_backlog() -> TestResult {
    let fixture = Fixture::from_set("batch")?;
    let stock = fixture.stock()?;
    let planner = CuttingPlanner::new(PlannerConfig::default());

    let orders = suggestions::filter_by_factory(fixture.orders(), Some(Factory::Three));
    let suggestions = suggestions::generate(&orders, &stock);

    assert_eq!(suggestions.len(), 2);

    let report = suggestions::run_all(
        &planner,
        &suggestions,
        &orders,
        &stock,
        options(),
        &mut NoopProgress,
        &CancellationToken::new(),
    )?;

    let ids: Vec<&str> = report.records.iter().map(|r| r.order.id.as_str()).collect();
    assert_eq!(ids, ["300000012"]);

    let first = report.runs.first().ok_or("missing run")?;
    assert!(matches!(
        first.outcome,
        SuggestionOutcome::Planned {
            patterns: 1,
            stop: StopReason::Exhausted
        }
    ));

    Ok(())
}

#[test]
fn cancelled_batch_runs_nothing() -> TestResult {
    let fixture = Fixture::from_set("batch")?;
    let stock = fixture.stock()?;
    let planner = CuttingPlanner::new(PlannerConfig::default());
    let cancel = CancellationToken::new();

    cancel.cancel();

    let suggestions = suggestions::generate(fixture.orders(), &stock);
    let report = suggestions::run_all(
        &planner,
        &suggestions,
        fixture.orders(),
        &stock,
        options(),
        &mut NoopProgress,
        &cancel,
    )?;

    assert!(report.cancelled);
    assert!(report.runs.is_empty());
    assert!(report.records.is_empty());

    Ok(())
}
