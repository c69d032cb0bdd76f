//! Works fund (fonds de travaux) of the active residence.

use copro_engine::{public_api, WorksFundService};

use super::keys::percent;
use super::{amount_arg, money, split_subcommand, unknown_subcommand, Args};
use crate::cli::context::ShellContext;
use crate::cli::error::CommandResult;
use crate::cli::io;
use crate::cli::output::section;
use crate::cli::registry::CommandEntry;

pub(crate) fn definitions() -> Vec<CommandEntry> {
    vec![CommandEntry::new(
        "fund",
        "Works fund contributions and legal minimum",
        "fund init [percentage] | fund minimum <percentage> | fund contribute <amount> | fund status",
        cmd_fund,
    )]
}

fn cmd_fund(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let (sub, rest) = split_subcommand(args, "fund <init|minimum|contribute|status> ...")?;
    let args = Args::parse(rest);
    let residence_id = context.residence_id()?;
    match sub.as_str() {
        "init" => {
            let percentage = match args.opt(0) {
                Some(text) => amount_arg(text)?,
                None => context.config.works_fund_minimum_percentage,
            };
            let minimum = context.mutate(|book| {
                WorksFundService::get_or_create(book, residence_id, percentage)
                    .map(|fund| fund.minimum_percentage)
            })?;
            io::print_success(format!("Works fund ready (minimum {}% of the budget).", minimum));
            Ok(())
        }
        "minimum" => {
            let percentage = amount_arg(args.get(0, "fund minimum <percentage>")?)?;
            context.mutate(|book| {
                WorksFundService::set_minimum_percentage(book, residence_id, percentage)
            })?;
            io::print_success(format!("Works fund minimum set to {}%.", percentage));
            Ok(())
        }
        "contribute" => {
            let amount = args.get(0, "fund contribute <amount>")?;
            let ctx = context.caller()?;
            let clock = context.clock;
            let balance =
                context.mutate(|book| public_api::api_contribute(book, &ctx, &clock, amount))?;
            io::print_success(format!("Contribution recorded. Balance: {}", money(balance)));
            Ok(())
        }
        "status" => {
            let status = context.with_book(|book| Ok(WorksFundService::status(book, residence_id)?))?;
            section("Works fund");
            io::print_info(format!("Balance: {}", money(status.balance)));
            io::print_info(format!("Minimum: {}% of the voted budget", status.minimum_percentage));
            match status.reference_fiscal_year {
                Some(year) => io::print_info(format!(
                    "Reference budget {}: {}",
                    year,
                    money(status.reference_budget_total)
                )),
                None => io::print_info("No voted budget yet."),
            }
            io::print_info(format!("Required: {}", money(status.required_minimum)));
            io::print_info(format!("Progress: {}", percent(status.progress)));
            if status.below_minimum {
                io::print_warning("The works fund is below the legal minimum.");
            }
            Ok(())
        }
        other => Err(unknown_subcommand("fund", other, "init, minimum, contribute, status")),
    }
}
