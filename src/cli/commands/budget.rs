//! Yearly budgets: drafting lines, votes, actuals and variance.

use uuid::Uuid;

use copro_domain::{Book, ChargeCategory, ResidenceId};
use copro_engine::{public_api, BudgetService, CoreError};

use super::keys::key_arg;
use super::{
    money, resolve_id, short_id, split_subcommand, unknown_subcommand, year_arg, Args,
};
use crate::cli::context::ShellContext;
use crate::cli::error::{CommandError, CommandResult};
use crate::cli::io;
use crate::cli::output::{print_table, section};
use crate::cli::registry::CommandEntry;

const USAGE: &str =
    "budget <new|list|line|remove-line|assign|show|vote|activate|refresh|variance|categories> ...";

pub(crate) fn definitions() -> Vec<CommandEntry> {
    vec![CommandEntry::new(
        "budget",
        "Draft, vote and follow yearly budgets",
        "budget new <year> | budget list | budget line <year> <label> <category> <amount> [--key <code>] [--version <n>] | budget remove-line <line id> [--version <n>] | budget assign <line id> <key code|none> | budget show <year> | budget vote <year> | budget activate <year> | budget refresh <year> | budget variance <year> | budget categories",
        cmd_budget,
    )]
}

fn cmd_budget(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let (sub, rest) = split_subcommand(args, USAGE)?;
    let args = Args::parse(rest);
    if sub == "categories" {
        let rows: Vec<Vec<String>> = ChargeCategory::ALL
            .iter()
            .map(|category| vec![category.code().to_string(), category.label().to_string()])
            .collect();
        section("Charge categories");
        print_table(&["Code", "Label"], &rows);
        return Ok(());
    }

    let residence_id = context.residence_id()?;
    match sub.as_str() {
        "new" => {
            let year = year_arg(args.get(0, "budget new <year>")?)?;
            context.mutate(|book| BudgetService::create_budget(book, residence_id, year))?;
            io::print_success(format!("Draft budget {} created.", year));
            Ok(())
        }
        "list" => {
            let rows = context.with_book(|book| {
                Ok(BudgetService::list_budgets(book, residence_id)
                    .into_iter()
                    .map(|budget| {
                        vec![
                            budget.fiscal_year.to_string(),
                            budget.status.to_string(),
                            book.lines_of_budget(budget.id).count().to_string(),
                            money(budget.total_budget),
                            budget.version.to_string(),
                        ]
                    })
                    .collect::<Vec<_>>())
            })?;
            section("Budgets");
            print_table(&["Year", "Status", "Lines", "Total", "Version"], &rows);
            Ok(())
        }
        "line" => handle_line(context, residence_id, &args),
        "remove-line" => {
            const LINE_USAGE: &str = "budget remove-line <line id> [--version <n>]";
            let line_id = budget_line_arg(context, residence_id, args.get(0, LINE_USAGE)?)?;
            let version = version_option(&args)?;
            context.mutate(|book| match version {
                Some(version) => {
                    BudgetService::delete_line_at_version(book, residence_id, line_id, version)
                }
                None => BudgetService::delete_line(book, residence_id, line_id),
            })?;
            io::print_success(format!("Budget line {} removed.", short_id(line_id)));
            Ok(())
        }
        "assign" => {
            const ASSIGN_USAGE: &str = "budget assign <line id> <key code|none>";
            let line_id = budget_line_arg(context, residence_id, args.get(0, ASSIGN_USAGE)?)?;
            let key = args.get(1, ASSIGN_USAGE)?;
            context.mutate(|book| {
                let key_id = if key.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(key_arg(book, residence_id, key)?)
                };
                BudgetService::assign_key(book, residence_id, line_id, key_id)
            })?;
            io::print_success(format!("Key of budget line {} updated.", short_id(line_id)));
            Ok(())
        }
        "show" => handle_show(context, residence_id, &args),
        "vote" => {
            let year = year_arg(args.get(0, "budget vote <year>")?)?;
            let clock = context.clock;
            context.mutate(|book| {
                let budget_id = budget_id(book, residence_id, year)?;
                BudgetService::vote(book, residence_id, budget_id, &clock)
            })?;
            io::print_success(format!("Budget {} voted.", year));
            Ok(())
        }
        "activate" => {
            let year = year_arg(args.get(0, "budget activate <year>")?)?;
            context.mutate(|book| {
                let budget_id = budget_id(book, residence_id, year)?;
                BudgetService::activate(book, residence_id, budget_id)
            })?;
            io::print_success(format!("Budget {} is now active.", year));
            Ok(())
        }
        "refresh" => {
            let year = year_arg(args.get(0, "budget refresh <year>")?)?;
            context.mutate(|book| {
                let budget_id = budget_id(book, residence_id, year)?;
                BudgetService::refresh_actuals(book, residence_id, budget_id)
            })?;
            io::print_success(format!("Actual amounts of budget {} refreshed.", year));
            Ok(())
        }
        "variance" => {
            let year = year_arg(args.get(0, "budget variance <year>")?)?;
            let variances = context.with_book(|book| {
                let budget_id = budget_id(book, residence_id, year)?;
                Ok(BudgetService::variance(book, residence_id, budget_id)?)
            })?;
            let rows: Vec<Vec<String>> = variances
                .iter()
                .map(|variance| {
                    vec![
                        variance.category.to_string(),
                        money(variance.budgeted),
                        money(variance.actual),
                        money(variance.remaining),
                        if variance.is_over_budget() { "over" } else { "" }.to_string(),
                    ]
                })
                .collect();
            section(format!("Budget {} variance", year));
            print_table(&["Category", "Budgeted", "Actual", "Remaining", ""], &rows);
            let over = variances.iter().filter(|variance| variance.is_over_budget()).count();
            if over > 0 {
                io::print_warning(format!("{} category(ies) over budget.", over));
            }
            Ok(())
        }
        other => Err(unknown_subcommand(
            "budget",
            other,
            "new, list, line, remove-line, assign, show, vote, activate, refresh, variance, categories",
        )),
    }
}

fn handle_line(context: &mut ShellContext, residence_id: ResidenceId, args: &Args<'_>) -> CommandResult {
    const LINE_USAGE: &str =
        "budget line <year> <label> <category> <amount> [--key <code>] [--version <n>]";
    let year = year_arg(args.get(0, LINE_USAGE)?)?;
    let label = args.get(1, LINE_USAGE)?;
    let category = args.get(2, LINE_USAGE)?;
    let amount = args.get(3, LINE_USAGE)?;
    let key = args.option("key");
    let version = version_option(args)?;

    let line_id = context.mutate(|book| {
        let line_id = match version {
            Some(version) => {
                let budget_id = budget_id(book, residence_id, year)?;
                BudgetService::add_line_at_version(
                    book,
                    residence_id,
                    budget_id,
                    version,
                    label,
                    public_api::parse_category(category)?,
                    copro_domain::parse_amount(amount)?,
                )?
            }
            None => public_api::api_add_budget_line(book, residence_id, year, label, category, amount)?,
        };
        if let Some(code) = key {
            let key_id = key_arg(book, residence_id, code)?;
            BudgetService::assign_key(book, residence_id, line_id, Some(key_id))?;
        }
        Ok(line_id)
    })?;
    io::print_success(format!("Budget line {} added to {}.", short_id(line_id), year));
    Ok(())
}

fn handle_show(context: &mut ShellContext, residence_id: ResidenceId, args: &Args<'_>) -> CommandResult {
    let year = year_arg(args.get(0, "budget show <year>")?)?;
    let (header, rows) = context.with_book(|book| {
        let budget = BudgetService::find_by_year(book, residence_id, year)
            .ok_or_else(|| CoreError::NotFound {
                entity: "Budget",
                id: year.to_string(),
            })?;
        let header = format!(
            "Budget {} [{}] total {} (version {})",
            budget.fiscal_year,
            budget.status,
            money(budget.total_budget),
            budget.version
        );
        let mut rows = Vec::new();
        for group in BudgetService::group_by_category(book, residence_id, budget.id)? {
            for line in &group.lines {
                let key = line
                    .distribution_key_id
                    .and_then(|key_id| book.key(key_id))
                    .map(|key| key.code.clone())
                    .unwrap_or_default();
                rows.push(vec![
                    short_id(line.id),
                    group.category.to_string(),
                    line.label.clone(),
                    money(line.budgeted_amount),
                    line.actual_amount.map(money).unwrap_or_default(),
                    key,
                ]);
            }
            rows.push(vec![
                String::new(),
                format!("Total {}", group.category),
                String::new(),
                money(group.category_total),
                String::new(),
                String::new(),
            ]);
        }
        Ok((header, rows))
    })?;
    section(header);
    print_table(&["Id", "Category", "Label", "Budgeted", "Actual", "Key"], &rows);
    Ok(())
}

pub(crate) fn budget_id(book: &Book, residence_id: ResidenceId, year: i32) -> Result<Uuid, CoreError> {
    BudgetService::find_by_year(book, residence_id, year)
        .map(|budget| budget.id)
        .ok_or_else(|| CoreError::NotFound {
            entity: "Budget",
            id: year.to_string(),
        })
}

fn budget_line_arg(
    context: &ShellContext,
    residence_id: ResidenceId,
    text: &str,
) -> Result<Uuid, CommandError> {
    let ids = context.with_book(|book| {
        Ok(book
            .budget_lines
            .iter()
            .filter(|line| {
                book.budget(line.budget_id)
                    .map_or(false, |budget| budget.residence_id == residence_id)
            })
            .map(|line| line.id)
            .collect::<Vec<_>>())
    })?;
    resolve_id(ids, text, "Budget line")
}

fn version_option(args: &Args<'_>) -> Result<Option<u64>, CommandError> {
    args.option("version")
        .map(|text| {
            text.parse::<u64>().map_err(|_| {
                CommandError::InvalidArguments(format!("`{}` is not a budget version", text))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_option_is_optional_and_numeric() {
        assert_eq!(version_option(&Args::parse(&[])).expect("absent"), None);
        assert_eq!(
            version_option(&Args::parse(&["--version", "3"])).expect("numeric"),
            Some(3)
        );
        assert!(version_option(&Args::parse(&["--version", "three"])).is_err());
    }
}
