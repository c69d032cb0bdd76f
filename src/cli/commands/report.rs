//! Monthly sums, budget breakdowns and CSV exports.

use std::{fs, path::Path};

use copro_engine::{LedgerService, ReportingService};

use super::budget::budget_id;
use super::keys::percent;
use super::ledger::line_filter;
use super::{money, split_subcommand, unknown_subcommand, usage_error, year_arg, Args};
use crate::cli::context::ShellContext;
use crate::cli::error::CommandResult;
use crate::cli::io;
use crate::cli::output::{print_table, section};
use crate::cli::registry::CommandEntry;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub(crate) fn definitions() -> Vec<CommandEntry> {
    vec![
        CommandEntry::new(
            "report",
            "Monthly revenue/expense and budget breakdown",
            "report monthly <year> | report breakdown <year>",
            cmd_report,
        ),
        CommandEntry::new(
            "export",
            "Export the ledger or a budget as CSV (`-` writes to stdout)",
            "export ledger <file|-> [--journal <code>] [--account <code>] [--from <date> --to <date>] [--search <text>] | export budget <year> <file|->",
            cmd_export,
        ),
    ]
}

fn cmd_report(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let (sub, rest) = split_subcommand(args, "report <monthly|breakdown> <year>")?;
    let args = Args::parse(rest);
    let residence_id = context.residence_id()?;
    match sub.as_str() {
        "monthly" => {
            let year = year_arg(args.get(0, "report monthly <year>")?)?;
            let months = context
                .with_book(|book| Ok(ReportingService::monthly_sums(book, residence_id, year)))?;
            let rows: Vec<Vec<String>> = months
                .iter()
                .map(|month| {
                    vec![
                        MONTHS[(month.month as usize - 1) % 12].to_string(),
                        money(month.revenue),
                        money(month.expense),
                        money(month.net()),
                    ]
                })
                .collect();
            section(format!("Monthly sums {}", year));
            print_table(&["Month", "Revenue", "Expense", "Net"], &rows);
            Ok(())
        }
        "breakdown" => {
            let year = year_arg(args.get(0, "report breakdown <year>")?)?;
            let shares = context.with_book(|book| {
                let budget_id = budget_id(book, residence_id, year)?;
                Ok(ReportingService::category_breakdown(book, residence_id, budget_id)?)
            })?;
            let rows: Vec<Vec<String>> = shares
                .iter()
                .map(|share| {
                    vec![
                        share.category.to_string(),
                        money(share.total),
                        percent(share.ratio),
                    ]
                })
                .collect();
            section(format!("Budget {} by category", year));
            print_table(&["Category", "Total", "Share"], &rows);
            Ok(())
        }
        other => Err(unknown_subcommand("report", other, "monthly, breakdown")),
    }
}

fn cmd_export(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let (sub, rest) = split_subcommand(args, "export <ledger|budget> ...")?;
    let args = Args::parse(rest);
    let residence_id = context.residence_id()?;
    let delimiter = context.config.csv_delimiter_byte();
    match sub.as_str() {
        "ledger" => {
            let target = args.get(0, "export ledger <file|-> [filters]")?;
            let csv = context.with_book(|book| {
                let filter = line_filter(book, residence_id, &args)?;
                let mut lines = LedgerService::list_lines(book, residence_id, &filter, usize::MAX);
                lines.reverse();
                Ok(ReportingService::export_ledger_csv(
                    book,
                    &lines,
                    &book.directory,
                    delimiter,
                )?)
            })?;
            write_export(target, &csv)
        }
        "budget" => {
            const USAGE: &str = "export budget <year> <file|->";
            let year = year_arg(args.get(0, USAGE)?)?;
            let target = args.get(1, USAGE)?;
            let csv = context.with_book(|book| {
                let budget_id = budget_id(book, residence_id, year)?;
                Ok(ReportingService::export_budget_csv(
                    book,
                    residence_id,
                    budget_id,
                    delimiter,
                )?)
            })?;
            write_export(target, &csv)
        }
        other => Err(usage_error(&format!(
            "export <ledger|budget> ... (got `{}`)",
            other
        ))),
    }
}

fn write_export(target: &str, csv: &str) -> CommandResult {
    if target == "-" {
        print!("{}", csv);
        return Ok(());
    }
    let path = Path::new(target);
    fs::write(path, csv)?;
    io::print_success(format!(
        "Exported {} row(s) to {}.",
        csv.lines().count().saturating_sub(1),
        path.display()
    ));
    Ok(())
}
