//! Annual charge regularizations per lease.

use uuid::Uuid;

use copro_domain::{Book, LotId, ReferenceDirectory, ResidenceId};
use copro_engine::{CoreError, NewRegularization, RegularizationService};

use super::budget::budget_id;
use super::directory::lease_arg;
use super::{
    amount_arg, date_arg, lot_arg, money, resolve_id, short_id, split_subcommand,
    unknown_subcommand, year_arg, Args,
};
use crate::cli::context::ShellContext;
use crate::cli::error::{CommandError, CommandResult};
use crate::cli::io;
use crate::cli::output::{print_table, section};
use crate::cli::registry::CommandEntry;

const NEW_USAGE: &str =
    "reg new <tenant> <period start> <period end> <provisions> <actual charges> [--lot <number>]";
const FROM_BUDGET_USAGE: &str = "reg from-budget <tenant> <year> <provisions> [--lot <number>]";

pub(crate) fn definitions() -> Vec<CommandEntry> {
    vec![CommandEntry::new(
        "reg",
        "Compute and follow charge regularizations",
        "reg new <tenant> <start> <end> <provisions> <actual> [--lot <number>] | reg from-budget <tenant> <year> <provisions> [--lot <number>] | reg charges <lot> <year> | reg send <id> | reg paid <id> | reg list | reg notice <id> [--json]",
        cmd_reg,
    )]
}

fn cmd_reg(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let (sub, rest) = split_subcommand(
        args,
        "reg <new|from-budget|charges|send|paid|list|notice> ...",
    )?;
    let args = Args::parse(rest);
    match sub.as_str() {
        "new" => handle_new(context, &args),
        "from-budget" => handle_from_budget(context, &args),
        "charges" => {
            const USAGE: &str = "reg charges <lot> <year>";
            let residence_id = context.residence_id()?;
            let lot = args.get(0, USAGE)?;
            let year = year_arg(args.get(1, USAGE)?)?;
            let charges = context.with_book(|book| {
                let lot_id = lot_arg(book, residence_id, lot)?;
                let budget_id = budget_id(book, residence_id, year)?;
                Ok(RegularizationService::compute_charges(
                    book,
                    residence_id,
                    lot_id,
                    budget_id,
                )?)
            })?;
            io::print_info(format!(
                "Charges of lot {} for {}: {} ({} key(s)).",
                lot,
                year,
                money(charges.amount),
                charges.key_ids.len()
            ));
            Ok(())
        }
        "send" => {
            let id = regularization_arg(context, args.get(0, "reg send <id>")?)?;
            let residence_id = context.residence_id()?;
            let clock = context.clock;
            context.mutate(|book| RegularizationService::send(book, residence_id, id, &clock))?;
            io::print_success(format!("Regularization {} sent.", short_id(id)));
            Ok(())
        }
        "paid" => {
            let id = regularization_arg(context, args.get(0, "reg paid <id>")?)?;
            let residence_id = context.residence_id()?;
            let clock = context.clock;
            context
                .mutate(|book| RegularizationService::mark_paid(book, residence_id, id, &clock))?;
            io::print_success(format!("Regularization {} marked as paid.", short_id(id)));
            Ok(())
        }
        "list" => {
            let residence_id = context.residence_id()?;
            let rows = context.with_book(|book| {
                Ok(RegularizationService::list(book, residence_id)
                    .into_iter()
                    .map(|reg| {
                        vec![
                            short_id(reg.id),
                            book.directory.tenant(reg.lease_id).to_string(),
                            reg.lot_id
                                .map(|lot| book.directory.lot(lot).to_string())
                                .unwrap_or_default(),
                            format!("{} .. {}", reg.period_start, reg.period_end),
                            money(reg.provisions_total),
                            money(reg.actual_charges),
                            money(reg.balance),
                            reg.status.to_string(),
                        ]
                    })
                    .collect::<Vec<_>>())
            })?;
            section("Regularizations");
            print_table(
                &["Id", "Tenant", "Lot", "Period", "Provisions", "Actual", "Balance", "Status"],
                &rows,
            );
            Ok(())
        }
        "notice" => {
            let id = regularization_arg(context, args.get(0, "reg notice <id> [--json]")?)?;
            let residence_id = context.residence_id()?;
            let notice = context.with_book(|book| {
                Ok(RegularizationService::notice(
                    book,
                    residence_id,
                    id,
                    &book.directory,
                )?)
            })?;
            if args.flag("json") {
                let json = serde_json::to_string_pretty(&notice)
                    .map_err(|err| CommandError::Message(err.to_string()))?;
                println!("{}", json);
                return Ok(());
            }
            section(format!("Regularization notice {}", short_id(id)));
            io::print_info(format!("To: {}", notice.recipient));
            io::print_info(format!("Lot: {}", notice.lot));
            io::print_info(format!(
                "Period: {} to {}",
                notice.period_start, notice.period_end
            ));
            io::print_info(format!("Provisions paid: {}", money(notice.provisions_total)));
            io::print_info(format!("Actual charges: {}", money(notice.actual_charges)));
            io::print_info(format!("{}: {}", notice.direction, money(notice.amount)));
            if let Some(sent_at) = notice.sent_at {
                io::print_info(format!("Sent: {}", sent_at.format("%Y-%m-%d")));
            }
            Ok(())
        }
        other => Err(unknown_subcommand(
            "reg",
            other,
            "new, from-budget, charges, send, paid, list, notice",
        )),
    }
}

fn handle_new(context: &mut ShellContext, args: &Args<'_>) -> CommandResult {
    let tenant = args.get(0, NEW_USAGE)?;
    let period_start = date_arg(args.get(1, NEW_USAGE)?)?;
    let period_end = date_arg(args.get(2, NEW_USAGE)?)?;
    let provisions_total = amount_arg(args.get(3, NEW_USAGE)?)?;
    let actual_charges = amount_arg(args.get(4, NEW_USAGE)?)?;
    let ctx = context.caller()?;
    let (lease_id, lot_id) = context.with_book(|book| {
        let lease_id = lease_arg(book, ctx.residence_id, tenant)?;
        let lot_id = lease_lot(book, ctx.residence_id, lease_id, args.option("lot"))?;
        Ok((lease_id, lot_id))
    })?;
    let clock = context.clock;
    let id = context.mutate(|book| {
        RegularizationService::create(
            book,
            &ctx,
            &clock,
            NewRegularization {
                lease_id,
                lot_id,
                period_start,
                period_end,
                provisions_total,
                actual_charges,
            },
        )
    })?;
    report_created(context, id)
}

fn handle_from_budget(context: &mut ShellContext, args: &Args<'_>) -> CommandResult {
    let tenant = args.get(0, FROM_BUDGET_USAGE)?;
    let year = year_arg(args.get(1, FROM_BUDGET_USAGE)?)?;
    let provisions_total = amount_arg(args.get(2, FROM_BUDGET_USAGE)?)?;
    let ctx = context.caller()?;
    let (lease_id, lot_id, budget_id) = context.with_book(|book| {
        let lease_id = lease_arg(book, ctx.residence_id, tenant)?;
        let lot_id = lease_lot(book, ctx.residence_id, lease_id, args.option("lot"))?
            .ok_or_else(|| {
                CommandError::InvalidArguments(format!(
                    "lease of `{}` has no lot; pass --lot <number>",
                    tenant
                ))
            })?;
        Ok((lease_id, lot_id, budget_id(book, ctx.residence_id, year)?))
    })?;
    let clock = context.clock;
    let id = context.mutate(|book| {
        RegularizationService::create_from_budget(
            book,
            &ctx,
            &clock,
            lease_id,
            lot_id,
            budget_id,
            provisions_total,
        )
    })?;
    report_created(context, id)
}

fn report_created(context: &ShellContext, id: Uuid) -> CommandResult {
    let (balance, direction) = context.with_book(|book| {
        let reg = book.regularization(id).ok_or_else(|| CoreError::not_found("Regularization", id))?;
        Ok((reg.balance, reg.direction()))
    })?;
    io::print_success(format!(
        "Regularization {} created: balance {} ({}).",
        short_id(id),
        money(balance),
        direction
    ));
    Ok(())
}

/// Lot given with `--lot`, else the lot attached to the lease.
fn lease_lot(
    book: &Book,
    residence_id: ResidenceId,
    lease_id: Uuid,
    lot: Option<&str>,
) -> Result<Option<LotId>, CommandError> {
    match lot {
        Some(number) => Ok(Some(lot_arg(book, residence_id, number)?)),
        None => Ok(book
            .directory
            .leases
            .get(&lease_id)
            .and_then(|lease| lease.lot_id)),
    }
}

fn regularization_arg(context: &ShellContext, text: &str) -> Result<Uuid, CommandError> {
    let residence_id = context.residence_id()?;
    let ids = context.with_book(|book| {
        Ok(RegularizationService::list(book, residence_id)
            .into_iter()
            .map(|reg| reg.id)
            .collect::<Vec<_>>())
    })?;
    resolve_id(ids, text, "Regularization")
}
