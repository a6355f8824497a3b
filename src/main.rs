//! Slitplan CLI

use std::{io, path::PathBuf, time::Instant};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use humanize_duration::{Truncate, prelude::DurationExt};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use slitplan::{
    config::{CorrugateType, FluteTypes, PlannerConfig},
    fixtures::Fixture,
    planner::{CancellationToken, CuttingPlanner, PlanRequest, ProgressEvent},
    report::{TableOptions, write_table},
    suggestions::{self, BatchOptions, Factory},
};

/// Log output format.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum LogFormat {
    /// Compact, human-readable logs.
    Compact,

    /// Structured JSON logs.
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "slitplan", about = "Paper roll slitting planner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Plan the backlog against a single roll width
    Plan(PlanArgs),

    /// Plan every (width, material spec) suggestion derived from the backlog and stock
    Batch(BatchArgs),
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// Fixture directory holding `orders/`, `stock/` and `config/`
    #[arg(long, env = "SLITPLAN_FIXTURES", default_value = "./fixtures", global = true)]
    fixtures: PathBuf,

    /// Orders fixture set
    #[arg(short, long, env = "SLITPLAN_ORDERS", default_value = "basic", global = true)]
    orders: String,

    /// Stock fixture set (defaults to the orders set)
    #[arg(short, long, env = "SLITPLAN_STOCK", global = true)]
    stock: Option<String>,

    /// Planner configuration YAML file
    #[arg(long, env = "SLITPLAN_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Usable roll length
    #[arg(long, env = "SLITPLAN_ROLL_LENGTH", default_value_t = 10_000.0, global = true)]
    roll_length: f64,

    /// Only plan the first N orders
    #[arg(short = 'n', long, env = "SLITPLAN_MAX_RECORDS", global = true)]
    max_records: Option<usize>,

    /// List orders that were not planned
    #[arg(long, global = true)]
    show_unprocessed: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG", default_value = "warn", global = true)]
    log_level: String,

    /// Log format (compact, json)
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact, global = true)]
    log_format: LogFormat,
}

#[derive(Debug, Args)]
struct PlanArgs {
    /// Roll width
    #[arg(short, long)]
    width: f64,

    /// Corrugate type of the `c` flute (E, B or C)
    #[arg(long)]
    c_type: Option<CorrugateType>,

    /// Corrugate type of the `b` flute (E, B or C)
    #[arg(long)]
    b_type: Option<CorrugateType>,
}

#[derive(Debug, Args)]
struct BatchArgs {
    /// Only plan orders of this factory (1 to 5)
    #[arg(long)]
    factory: Option<Factory>,
}

/// Load a fixture set, plan it and print the result table.
#[expect(clippy::print_stdout, reason = "CLI output")]
pub fn main() -> Result<()> {
    _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let common = &cli.common;

    init_tracing(common)?;

    let config = match &common.config {
        Some(path) => PlannerConfig::from_yaml_file(path)?,
        None => PlannerConfig::default(),
    };

    let mut fixture = Fixture::with_base_path(&common.fixtures);

    fixture
        .load_orders(&common.orders)?
        .load_stock(common.stock.as_deref().unwrap_or(&common.orders))?;

    let stock = fixture.stock()?;
    let planner = CuttingPlanner::new(config);
    let cancel = CancellationToken::new();
    let mut progress = |event: &ProgressEvent| info!(percent = event.percent(), "{event}");

    let options = TableOptions {
        show_unprocessed: common.show_unprocessed,
    };

    let start = Instant::now();

    let (records, unprocessed) = match &cli.command {
        Commands::Plan(args) => {
            let mut request = PlanRequest::new(args.width, common.roll_length)
                .with_flutes(FluteTypes::new(args.c_type, args.b_type));

            request.max_records = common.max_records;

            let mut stock = stock;
            let report = planner.plan_with(
                &request,
                fixture.orders(),
                &mut stock,
                &mut progress,
                &cancel,
            )?;

            println!("\nStopped: {}", report.stop);

            (report.records, report.unprocessed)
        }
        Commands::Batch(args) => {
            let orders = suggestions::filter_by_factory(fixture.orders(), args.factory);
            let suggestions = suggestions::generate(&orders, &stock);

            println!("\nSuggestions: {}", suggestions.len());

            let report = suggestions::run_all(
                &planner,
                &suggestions,
                &orders,
                &stock,
                BatchOptions {
                    roll_length: common.roll_length,
                    max_records: common.max_records,
                },
                &mut progress,
                &cancel,
            )?;

            (report.records, report.unprocessed)
        }
    };

    let elapsed = start.elapsed();

    let stdout = io::stdout();
    let mut handle = stdout.lock();

    write_table(&mut handle, &records, &unprocessed, options)?;

    println!("Solution: {}", elapsed.human(Truncate::Nano));

    Ok(())
}

fn init_tracing(args: &CommonArgs) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},good_lp=warn", args.log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    match args.log_format {
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_writer(io::stderr),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_writer(io::stderr),
            )
            .try_init()?,
    }

    Ok(())
}
