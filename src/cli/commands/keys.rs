//! Distribution keys (tantièmes) and per-lot shares.

use rust_decimal::Decimal;
use uuid::Uuid;

use copro_domain::{Book, ReferenceDirectory, ResidenceId, ShareAllocation};
use copro_engine::{public_api, CoreError, DistributionService};

use super::{amount_arg, lot_arg, money, split_subcommand, unknown_subcommand, Args};
use crate::cli::context::ShellContext;
use crate::cli::error::{CommandError, CommandResult};
use crate::cli::io;
use crate::cli::output::{print_table, section};
use crate::cli::registry::CommandEntry;

pub(crate) fn definitions() -> Vec<CommandEntry> {
    vec![CommandEntry::new(
        "key",
        "Manage distribution keys and lot shares",
        "key add <code> <name> [--description <text>] | key list | key show <code> | key share <code> <lot> <shares> | key unshare <code> <lot> | key allocate <code> <amount> | key usage <code> | key delete <code>",
        cmd_key,
    )]
}

fn cmd_key(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let (sub, rest) = split_subcommand(
        args,
        "key <add|list|show|share|unshare|allocate|usage|delete> ...",
    )?;
    let args = Args::parse(rest);
    let residence_id = context.residence_id()?;
    match sub.as_str() {
        "add" => {
            const USAGE: &str = "key add <code> <name> [--description <text>]";
            let code = args.get(0, USAGE)?;
            let name = args.get(1, USAGE)?;
            let description = args.option("description").map(str::to_string);
            context.mutate(|book| {
                DistributionService::create_key(book, residence_id, code, name, description)
            })?;
            io::print_success(format!("Distribution key {} created.", code.to_uppercase()));
            Ok(())
        }
        "list" => {
            let rows = context.with_book(|book| {
                DistributionService::list_keys(book, residence_id)
                    .into_iter()
                    .map(|key| {
                        Ok(vec![
                            key.code.clone(),
                            key.name.clone(),
                            DistributionService::shares_of(book, key.id).len().to_string(),
                            DistributionService::total_shares(book, key.id)?.to_string(),
                        ])
                    })
                    .collect::<Result<Vec<_>, CommandError>>()
            })?;
            section("Distribution keys");
            print_table(&["Code", "Name", "Lots", "Total shares"], &rows);
            Ok(())
        }
        "show" => {
            let code = args.get(0, "key show <code>")?;
            let (rows, total) = context.with_book(|book| {
                let key_id = key_arg(book, residence_id, code)?;
                let percentages = DistributionService::percentages(book, key_id)?;
                let rows = allocation_rows(book, &percentages, false);
                Ok((rows, DistributionService::total_shares(book, key_id)?))
            })?;
            section(format!("Key {}", code.to_uppercase()));
            print_table(&["Lot", "Shares", "Percentage"], &rows);
            io::print_info(format!("Total shares: {}", total));
            Ok(())
        }
        "share" => {
            const USAGE: &str = "key share <code> <lot> <shares>";
            let code = args.get(0, USAGE)?;
            let lot = args.get(1, USAGE)?;
            let shares = args.get(2, USAGE)?;
            context.mutate(|book| {
                let lot_id = book
                    .directory
                    .lot_by_number(residence_id, lot)
                    .ok_or_else(|| CoreError::NotFound {
                        entity: "Lot",
                        id: lot.to_string(),
                    })?;
                public_api::api_set_share(book, residence_id, code, lot_id, shares)
            })?;
            io::print_success(format!(
                "Lot {} holds {} shares under {}.",
                lot,
                shares,
                code.to_uppercase()
            ));
            Ok(())
        }
        "unshare" => {
            const USAGE: &str = "key unshare <code> <lot>";
            let code = args.get(0, USAGE)?;
            let lot = args.get(1, USAGE)?;
            let (key_id, lot_id) = context.with_book(|book| {
                Ok((
                    key_arg(book, residence_id, code)?,
                    lot_arg(book, residence_id, lot)?,
                ))
            })?;
            let removed = context.mutate(|book| {
                DistributionService::remove_share(book, residence_id, key_id, lot_id)
            })?;
            if removed {
                io::print_success(format!("Lot {} removed from {}.", lot, code.to_uppercase()));
            } else {
                io::print_warning(format!("Lot {} had no shares under {}.", lot, code.to_uppercase()));
            }
            Ok(())
        }
        "allocate" => {
            const USAGE: &str = "key allocate <code> <amount>";
            let code = args.get(0, USAGE)?;
            let amount = amount_arg(args.get(1, USAGE)?)?;
            let rows = context.with_book(|book| {
                let key_id = key_arg(book, residence_id, code)?;
                let allocations =
                    DistributionService::allocate(book, residence_id, key_id, amount)?;
                Ok(allocation_rows(book, &allocations, true))
            })?;
            section(format!("Allocation of {} by {}", money(amount), code.to_uppercase()));
            print_table(&["Lot", "Shares", "Percentage", "Amount"], &rows);
            Ok(())
        }
        "usage" => {
            let code = args.get(0, "key usage <code>")?;
            let usage = context.with_book(|book| {
                let key_id = key_arg(book, residence_id, code)?;
                Ok(DistributionService::usage(book, key_id))
            })?;
            if usage.is_used() {
                io::print_info(format!(
                    "{} is used by {} budget line(s) and {} regularization(s).",
                    code.to_uppercase(),
                    usage.budget_lines.len(),
                    usage.regularizations.len()
                ));
            } else {
                io::print_info(format!("{} is not used.", code.to_uppercase()));
            }
            Ok(())
        }
        "delete" => {
            let code = args.get(0, "key delete <code>")?;
            let key_id = context.with_book(|book| Ok(key_arg(book, residence_id, code)?))?;
            if !context.confirm(&format!("Delete distribution key {}?", code.to_uppercase()))? {
                io::print_info("Deletion cancelled.");
                return Ok(());
            }
            context.mutate(|book| DistributionService::delete_key(book, residence_id, key_id))?;
            io::print_success(format!("Distribution key {} deleted.", code.to_uppercase()));
            Ok(())
        }
        other => Err(unknown_subcommand(
            "key",
            other,
            "add, list, show, share, unshare, allocate, usage, delete",
        )),
    }
}

pub(crate) fn key_arg(book: &Book, residence_id: ResidenceId, code: &str) -> Result<Uuid, CoreError> {
    DistributionService::find_key_by_code(book, residence_id, code)
        .map(|key| key.id)
        .ok_or_else(|| CoreError::NotFound {
            entity: "Distribution key",
            id: code.trim().to_string(),
        })
}

/// Renders a `[0, 1]` ratio as a percentage with two decimals.
pub(crate) fn percent(ratio: Decimal) -> String {
    format!("{:.2}%", (ratio * Decimal::ONE_HUNDRED).round_dp(2))
}

fn allocation_rows(book: &Book, allocations: &[ShareAllocation], with_amount: bool) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = allocations
        .iter()
        .map(|allocation| {
            let mut row = vec![
                book.directory.lot(allocation.lot_id).to_string(),
                allocation.shares.to_string(),
                percent(allocation.percentage),
            ];
            if with_amount {
                row.push(money(allocation.amount));
            }
            row
        })
        .collect();
    rows.sort_by(|a, b| a[0].cmp(&b[0]));
    rows
}
