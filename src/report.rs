//! Plan Report Rendering

use std::{fmt::Write as _, io};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tabled::{
    builder::Builder,
    grid::config::HorizontalLine,
    settings::{
        Alignment, Color, Style, Theme,
        object::{Columns, Rows},
    },
};
use thiserror::Error;

use crate::planner::{PatternRecord, UnprocessedOrder};

/// Errors that can occur when rendering a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Writing to the output failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Formatting a cell failed.
    #[error("Format error")]
    Fmt(#[from] std::fmt::Error),
}

/// Rendering switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableOptions {
    /// Also list orders no pattern consumed
    pub show_unprocessed: bool,
}

/// Index of the lowest-trim record for each order id. Ties keep the earliest record.
pub fn best_by_order(records: &[PatternRecord]) -> FxHashMap<&str, usize> {
    let mut best: FxHashMap<&str, usize> = FxHashMap::default();

    for (idx, record) in records.iter().enumerate() {
        let id = record.order.id.as_str();

        let better = best
            .get(id)
            .and_then(|&current| records.get(current))
            .is_none_or(|current| record.trim < current.trim);

        if better {
            best.insert(id, idx);
        }
    }

    best
}

/// Render accepted patterns (and optionally leftovers) as a table, followed by a short summary.
///
/// The first column marks the best record of each order with `*` and records whose stock could
/// not cover a layer with `!`.
///
/// # Errors
///
/// Returns a [`ReportError`] if writing fails.
pub fn write_table(
    mut out: impl io::Write,
    records: &[PatternRecord],
    unprocessed: &[UnprocessedOrder],
    options: TableOptions,
) -> Result<(), ReportError> {
    let best = best_by_order(records);

    let mut builder = Builder::default();
    let mut color_ops: SmallVec<[(usize, Color); 16]> = SmallVec::new();

    push_header(&mut builder);

    for (idx, record) in records.iter().enumerate() {
        let is_best = best.get(record.order.id.as_str()) == Some(&idx);
        let row = idx + 1;

        let mut flags = String::new();

        if is_best {
            flags.push('*');
        }

        if record.has_shortfall() {
            flags.push('!');
            color_ops.push((row, Color::FG_YELLOW));
        } else if !is_best {
            color_ops.push((row, color_dark_grey()));
        }

        builder.push_record([
            flags,
            format!("{}", record.roll_width),
            format!("{:.2}", record.roll_length),
            record.order.id.clone(),
            format!("{}", record.order.width),
            record.order.quantity.to_string(),
            record.cuts.to_string(),
            format!("{:.2}", record.trim),
            record
                .quantity_per_cut()
                .map_or_else(|| "N/A".to_string(), |q| format!("{q:.2}")),
            format!("{:.2}", record.demand_per_cut),
            layer_cell(record)?,
        ]);
    }

    let accepted_rows = records.len();

    if options.show_unprocessed {
        for (idx, leftover) in unprocessed.iter().enumerate() {
            let order = &leftover.order;

            builder.push_record([
                "-".to_string(),
                format!("{}", leftover.roll_width),
                String::new(),
                order.id.clone(),
                format!("{}", order.width),
                order.quantity.to_string(),
                "0".to_string(),
                "0".to_string(),
                "N/A".to_string(),
                String::new(),
                leftover.reason.to_string(),
            ]);

            color_ops.push((accepted_rows + idx + 1, Color::FG_RED));
        }
    }

    let mut table = builder.build();
    let mut theme = Theme::from(Style::modern_rounded());
    let separator = HorizontalLine::new(Some('─'), Some('┼'), Some('├'), Some('┤'));

    theme.remove_horizontal_lines();
    theme.insert_horizontal_line(1, separator);

    if options.show_unprocessed && accepted_rows > 0 && !unprocessed.is_empty() {
        theme.insert_horizontal_line(accepted_rows + 1, separator);
    }

    table.with(theme);
    table.modify(Rows::first(), Color::BOLD);
    table.modify(Columns::new(1..3), Alignment::right());
    table.modify(Columns::new(4..10), Alignment::right());

    for (row, color) in color_ops {
        for col in 0..COLUMN_COUNT {
            table.modify((row, col), color.clone());
        }
    }

    let table_str = colorize_borders(&table.to_string());

    writeln!(out, "\n{table_str}")?;

    let total_trim: f64 = records.iter().map(|record| record.trim).sum();
    let shortfalls = records.iter().filter(|r| r.has_shortfall()).count();

    writeln!(out, " Patterns:     {}", records.len())?;
    writeln!(out, " Total trim:   {total_trim:.2}")?;
    writeln!(out, " Shortfalls:   {shortfalls}")?;
    writeln!(out, " Unprocessed:  {}", unprocessed.len())?;
    writeln!(out)?;

    Ok(())
}

const COLUMN_COUNT: usize = 11;

fn push_header(builder: &mut Builder) {
    builder.push_record([
        "",
        "Roll",
        "Length",
        "Order",
        "Width",
        "Qty",
        "Cuts",
        "Trim",
        "Qty/Cut",
        "Demand/Cut",
        "Layers",
    ]);
}

/// One line per filled layer: material, length drawn, and which rolls covered it.
fn layer_cell(record: &PatternRecord) -> Result<String, ReportError> {
    let mut cell = String::new();

    for (idx, (layer, usage)) in record.layers.iter().enumerate() {
        if idx > 0 {
            cell.push('\n');
        }

        write!(
            cell,
            "{layer} {} {:.2} {}",
            usage.material, usage.required, usage.trace
        )?;
    }

    Ok(cell)
}

/// Wraps runs of box-drawing characters in ANSI dark-grey escape codes.
fn colorize_borders(table: &str) -> String {
    let mut out = String::with_capacity(table.len() + 256);
    let mut in_run = false;

    for ch in table.chars() {
        let box_char = ('\u{2500}'..='\u{257F}').contains(&ch);

        if box_char && !in_run {
            out.push_str("\x1b[90m");
            in_run = true;
        } else if !box_char && in_run {
            out.push_str("\x1b[0m");
            in_run = false;
        }

        out.push(ch);
    }

    if in_run {
        out.push_str("\x1b[0m");
    }

    out
}

/// ANSI dark grey foreground.
fn color_dark_grey() -> Color {
    Color::new("\x1b[90m", "\x1b[0m")
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::{
        allocator::{AllocationTrace, RollUsage},
        config::FluteTypes,
        orders::{MaterialLayers, Order},
        planner::{LayerUsage, StopReason},
    };

    use super::*;

    fn record(order_id: &str, roll_width: f64, cuts: u32, trim: f64) -> PatternRecord {
        PatternRecord {
            roll_width,
            stock_width: roll_width.to_string(),
            roll_length: 10_000.0,
            order: Order::new(order_id, 10.0, 100.0, 3),
            cuts,
            trim,
            total_order_length: 100.0,
            demand_per_cut: if cuts == 0 { 0.0 } else { 100.0 / f64::from(cuts) },
            flutes: FluteTypes::default(),
            layers: MaterialLayers {
                front: Some(LayerUsage {
                    material: "KA125".to_string(),
                    required: 20.0,
                    trace: AllocationTrace::Opened(RollUsage {
                        roll_id: "R1".to_string(),
                        before: 1000.0,
                        after: 980.0,
                    }),
                }),
                c: None,
                middle: None,
                b: None,
                back: None,
            },
        }
    }

    #[test]
    fn best_record_is_lowest_trim_per_order() {
        let records = [
            record("A", 55.0, 5, 5.0),
            record("A", 57.0, 5, 2.0),
            record("B", 55.0, 4, 3.0),
            record("A", 60.0, 5, 2.0),
        ];

        let best = best_by_order(&records);

        assert_eq!(best.get("A"), Some(&1));
        assert_eq!(best.get("B"), Some(&2));
    }

    #[test]
    fn table_lists_patterns_layers_and_summary() -> TestResult {
        let records = [record("A", 55.0, 5, 5.0)];
        let mut out = Vec::new();

        write_table(&mut out, &records, &[], TableOptions::default())?;

        let text = String::from_utf8(out)?;

        assert!(text.contains("Demand/Cut"));
        assert!(text.contains("front KA125 20.00"));
        assert!(text.contains("opened new roll: R1"));
        assert!(text.contains("0.60"), "quantity per cut is 3 / 5");
        assert!(text.contains("Patterns:     1"));
        assert!(text.contains("Total trim:   5.00"));

        Ok(())
    }

    #[test]
    fn unprocessed_rows_only_show_on_request() -> TestResult {
        let leftovers = [UnprocessedOrder {
            roll_width: 55.0,
            order: Order::new("Z-404", 7.0, 100.0, 1),
            reason: StopReason::Infeasible("Infeasible: nothing fits".to_string()),
        }];

        let mut hidden = Vec::new();
        write_table(&mut hidden, &[], &leftovers, TableOptions::default())?;
        let hidden = String::from_utf8(hidden)?;

        assert!(!hidden.contains("Z-404"));
        assert!(hidden.contains("Unprocessed:  1"));

        let mut shown = Vec::new();
        write_table(
            &mut shown,
            &[],
            &leftovers,
            TableOptions {
                show_unprocessed: true,
            },
        )?;
        let shown = String::from_utf8(shown)?;

        assert!(shown.contains("Z-404"));
        assert!(shown.contains("N/A"));
        assert!(shown.contains("Infeasible: nothing fits"));

        Ok(())
    }

    #[test]
    fn shortfall_records_are_flagged() -> TestResult {
        let mut short = record("A", 55.0, 5, 5.0);

        if let Some(usage) = short.layers.front.as_mut() {
            usage.trace = AllocationTrace::NoStock;
        }

        let mut out = Vec::new();
        write_table(&mut out, &[short], &[], TableOptions::default())?;
        let text = String::from_utf8(out)?;

        assert!(text.contains("*!"));
        assert!(text.contains("no stock data"));
        assert!(text.contains("Shortfalls:   1"));

        Ok(())
    }
}
