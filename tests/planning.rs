//! Planning runs driven by the `basic` fixture set.

use slitplan::{
    allocator::AllocationTrace,
    config::PlannerConfig,
    fixtures::Fixture,
    planner::{
        CancellationToken, CuttingPlanner, PlanError, PlanRequest, ProgressEvent, StopReason,
    },
    stock::RollRef,
};
use testresult::TestResult;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

fn roll_id(trace: &AllocationTrace) -> Option<&str> {
    match trace {
        AllocationTrace::Opened(usage) | AllocationTrace::Continued(usage) => {
            Some(usage.roll_id.as_str())
        }
        _ => None,
    }
}

#[test]
fn basic_set_plans_least_trim_first_and_stops_on_infeasible() -> TestResult {
    let fixture = Fixture::from_set("basic")?;
    let mut stock = fixture.stock()?;

    // The stock row without a roll number is skipped.
    assert_eq!(stock.roll_count(), 3);

    let planner = CuttingPlanner::new(PlannerConfig::default());
    let request = PlanRequest::new(55.0, 10_000.0);

    let report = planner.plan(&request, fixture.orders(), &mut stock)?;

    let ids: Vec<&str> = report.records.iter().map(|r| r.order.id.as_str()).collect();
    assert_eq!(ids, ["121800002", "121800001"]);

    let first = report.records.first().ok_or("missing first record")?;
    let second = report.records.get(1).ok_or("missing second record")?;

    assert_eq!(first.cuts, 4);
    assert!(close(first.trim, 3.0));
    assert!(close(first.demand_per_cut, 150.0));
    assert!(close(first.roll_length, 10_000.0));

    assert_eq!(second.cuts, 5);
    assert!(close(second.trim, 5.0));
    assert!(close(second.demand_per_cut, 20.0));
    assert!(close(second.roll_length, 9_850.0));

    assert!(matches!(report.stop, StopReason::Infeasible(_)));

    let leftover = report.unprocessed.first().ok_or("missing leftover")?;
    assert_eq!(report.unprocessed.len(), 1);
    assert_eq!(leftover.order.id, "121800003");
    assert_eq!(leftover.reason, report.stop);

    Ok(())
}

#[test]
fn layers_of_one_cut_never_share_a_roll() -> TestResult {
    let fixture = Fixture::from_set("basic")?;
    let mut stock = fixture.stock()?;

    let report = CuttingPlanner::new(PlannerConfig::default()).plan(
        &PlanRequest::new(55.0, 10_000.0),
        fixture.orders(),
        &mut stock,
    )?;

    let first = report.records.first().ok_or("missing first record")?;
    let second = report.records.get(1).ok_or("missing second record")?;

    let first_front = &first.layers.front.as_ref().ok_or("front")?.trace;
    let first_back = &first.layers.back.as_ref().ok_or("back")?.trace;

    assert!(matches!(first_front, AllocationTrace::Opened(_)));
    assert_eq!(roll_id(first_front), Some("R1"));
    assert!(matches!(first_back, AllocationTrace::Opened(_)));
    assert_eq!(roll_id(first_back), Some("R2"));

    // The next order continues on the last roll opened and opens the other one for its back liner.
    let second_front = &second.layers.front.as_ref().ok_or("front")?.trace;
    let second_back = &second.layers.back.as_ref().ok_or("back")?.trace;

    assert!(matches!(second_front, AllocationTrace::Continued(_)));
    assert_eq!(roll_id(second_front), Some("R2"));
    assert_eq!(roll_id(second_back), Some("R1"));

    assert!(stock.remaining("55", "KA125", "R1").is_some_and(|l| close(l, 830.0)));
    assert!(stock.remaining("55", "KA125", "R2").is_some_and(|l| close(l, 330.0)));
    assert!(stock.remaining("60", "KA150", "R3").is_some_and(|l| close(l, 800.0)));

    assert!(report.records.iter().all(|record| !record.has_shortfall()));

    Ok(())
}

#[test]
fn strict_waste_band_rejects_wider_trim() -> TestResult {
    let fixture = Fixture::from_set("basic")?;
    let config = fixture.load_config("strict")?;
    let mut stock = fixture.stock()?;

    let report =
        CuttingPlanner::new(config).plan(&PlanRequest::new(55.0, 10_000.0), fixture.orders(), &mut stock)?;

    assert_eq!(report.records.len(), 1);
    assert_eq!(
        report.records.first().map(|r| r.order.id.as_str()),
        Some("121800002")
    );

    let leftovers: Vec<&str> = report
        .unprocessed
        .iter()
        .map(|u| u.order.id.as_str())
        .collect();

    assert_eq!(leftovers, ["121800001", "121800003"]);

    Ok(())
}

#[test]
fn default_config_file_matches_built_in_defaults() -> TestResult {
    let config = Fixture::new().load_config("default")?;

    assert_eq!(config, PlannerConfig::default());

    Ok(())
}

#[test]
fn max_records_limits_the_backlog() -> TestResult {
    let fixture = Fixture::from_set("basic")?;
    let mut stock = fixture.stock()?;

    let report = CuttingPlanner::new(PlannerConfig::default()).plan(
        &PlanRequest::new(55.0, 10_000.0).with_max_records(1),
        fixture.orders(),
        &mut stock,
    )?;

    assert_eq!(report.stop, StopReason::Exhausted);
    assert_eq!(report.records.len(), 1);
    assert!(report.unprocessed.is_empty());

    let only = report.records.first().ok_or("missing record")?;
    assert_eq!(only.order.id, "121800001");
    assert_eq!(only.cuts, 5);

    Ok(())
}

#[test]
fn progress_reports_every_stage() -> TestResult {
    let fixture = Fixture::from_set("basic")?;
    let mut stock = fixture.stock()?;
    let mut events = Vec::new();

    {
        let mut observer = |event: &ProgressEvent| events.push(event.clone());

        CuttingPlanner::new(PlannerConfig::default()).plan_with(
            &PlanRequest::new(55.0, 10_000.0),
            fixture.orders(),
            &mut stock,
            &mut observer,
            &CancellationToken::new(),
        )?;
    }

    assert_eq!(events.first(), Some(&ProgressEvent::Started));
    assert_eq!(events.get(1), Some(&ProgressEvent::Loaded { orders: 3 }));
    assert_eq!(events.last(), Some(&ProgressEvent::Finished { patterns: 2 }));

    let iterations = events
        .iter()
        .filter(|event| matches!(event, ProgressEvent::Iteration { .. }))
        .count();

    assert_eq!(iterations, 3);
    assert!(
        events
            .iter()
            .any(|event| matches!(event, ProgressEvent::Stopped(StopReason::Infeasible(_))))
    );

    Ok(())
}

#[test]
fn independent_plans_on_the_same_rolls_cannot_merge() -> TestResult {
    let fixture = Fixture::from_set("basic")?;
    let planner = CuttingPlanner::new(PlannerConfig::default());
    let request = PlanRequest::new(55.0, 10_000.0);

    let mut left_stock = fixture.stock()?;
    let mut right_stock = fixture.stock()?;

    let left = planner.plan(&request, fixture.orders(), &mut left_stock)?;
    let right = planner.plan(&request, fixture.orders(), &mut right_stock)?;

    assert_eq!(
        left.merge(right),
        Err(PlanError::RollConflict(RollRef::new("55", "KA125", "R1")))
    );

    Ok(())
}
