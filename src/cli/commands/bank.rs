//! Bank accounts, imported movements and their reconciliation with the ledger.

use rust_decimal::Decimal;
use uuid::Uuid;

use copro_domain::{masked_iban, ResidenceId};
use copro_engine::ReconciliationService;

use super::{
    amount_arg, date_arg, money, resolve_id, short_id, split_subcommand, unknown_subcommand,
    usage_error, Args,
};
use crate::cli::context::ShellContext;
use crate::cli::error::{CommandError, CommandResult};
use crate::cli::io;
use crate::cli::output::{print_table, section};
use crate::cli::registry::CommandEntry;

pub(crate) fn definitions() -> Vec<CommandEntry> {
    vec![CommandEntry::new(
        "bank",
        "Bank accounts and reconciliation",
        "bank add <label> <iban> <bic> [--opening <amount>] | bank list | bank main <account> | bank txn <account> <date> <label> <amount> [--counterparty <name>] | bank pending | bank reconcile <movement id>... | bank candidates <movement id> [--window <days>] | bank match <movement id> <line id>",
        cmd_bank,
    )]
}

fn cmd_bank(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let (sub, rest) = split_subcommand(
        args,
        "bank <add|list|main|txn|pending|reconcile|candidates|match> ...",
    )?;
    let args = Args::parse(rest);
    let residence_id = context.residence_id()?;
    match sub.as_str() {
        "add" => {
            const USAGE: &str = "bank add <label> <iban> <bic> [--opening <amount>]";
            let label = args.get(0, USAGE)?;
            let iban = args.get(1, USAGE)?;
            let bic = args.get(2, USAGE)?;
            let opening = match args.option("opening") {
                Some(text) => amount_arg(text)?,
                None => Decimal::ZERO,
            };
            let clock = context.clock;
            context.mutate(|book| {
                ReconciliationService::create_bank_account(
                    book,
                    residence_id,
                    label,
                    iban,
                    bic,
                    opening,
                    &clock,
                )
            })?;
            io::print_success(format!("Bank account `{}` added.", label));
            Ok(())
        }
        "list" => {
            let rows = context.with_book(|book| {
                Ok(ReconciliationService::list_accounts(book, residence_id)
                    .into_iter()
                    .map(|account| {
                        vec![
                            if account.is_main { "*" } else { "" }.to_string(),
                            short_id(account.id),
                            account.label.clone(),
                            masked_iban(&account.iban),
                            account.bic.clone(),
                            money(account.balance),
                        ]
                    })
                    .collect::<Vec<_>>())
            })?;
            section("Bank accounts");
            print_table(&["Main", "Id", "Label", "IBAN", "BIC", "Balance"], &rows);
            Ok(())
        }
        "main" => {
            let account_id = account_arg(context, residence_id, args.get(0, "bank main <account>")?)?;
            context.mutate(|book| ReconciliationService::set_main(book, residence_id, account_id))?;
            io::print_success("Main bank account updated.");
            Ok(())
        }
        "txn" => {
            const USAGE: &str =
                "bank txn <account> <date> <label> <amount> [--counterparty <name>]";
            let account_id = account_arg(context, residence_id, args.get(0, USAGE)?)?;
            let date = date_arg(args.get(1, USAGE)?)?;
            let label = args.get(2, USAGE)?;
            let amount = amount_arg(args.get(3, USAGE)?)?;
            let counterparty = args.option("counterparty").map(str::to_string);
            let id = context.mutate(|book| {
                ReconciliationService::record_transaction(
                    book,
                    residence_id,
                    account_id,
                    date,
                    label,
                    counterparty,
                    amount,
                )
            })?;
            io::print_success(format!("Bank movement {} recorded.", short_id(id)));
            Ok(())
        }
        "pending" => {
            let rows = context.with_book(|book| {
                Ok(ReconciliationService::list_pending(book, residence_id)
                    .into_iter()
                    .map(|txn| {
                        vec![
                            short_id(txn.id),
                            txn.date.to_string(),
                            txn.label.clone(),
                            txn.counterparty.clone().unwrap_or_default(),
                            money(txn.amount),
                        ]
                    })
                    .collect::<Vec<_>>())
            })?;
            section("Unreconciled bank movements");
            print_table(&["Id", "Date", "Label", "Counterparty", "Amount"], &rows);
            Ok(())
        }
        "reconcile" => {
            if args.positional.is_empty() {
                return Err(usage_error("bank reconcile <movement id>..."));
            }
            let shell: &ShellContext = context;
            let ids = args
                .positional
                .iter()
                .map(|text| movement_arg(shell, residence_id, text))
                .collect::<Result<Vec<_>, _>>()?;
            let clock = context.clock;
            let changed = context
                .mutate(|book| ReconciliationService::reconcile(book, residence_id, &ids, &clock))?;
            io::print_success(format!("{} movement(s) reconciled.", changed));
            Ok(())
        }
        "candidates" => {
            const USAGE: &str = "bank candidates <movement id> [--window <days>]";
            let txn_id = movement_arg(context, residence_id, args.get(0, USAGE)?)?;
            let window = match args.option("window") {
                Some(text) => text.parse::<i64>().map_err(|_| usage_error(USAGE))?,
                None => context.config.reconciliation_window_days,
            };
            let candidates = context.with_book(|book| {
                Ok(ReconciliationService::candidates(book, residence_id, txn_id, window)?)
            })?;
            let rows: Vec<Vec<String>> = candidates
                .iter()
                .map(|candidate| {
                    vec![
                        short_id(candidate.line_id),
                        candidate.date.to_string(),
                        candidate.label.clone(),
                        money(candidate.amount),
                        candidate.days_apart.to_string(),
                    ]
                })
                .collect();
            section(format!("Ledger lines matching {} (±{} days)", short_id(txn_id), window));
            print_table(&["Line", "Date", "Label", "Amount", "Days apart"], &rows);
            Ok(())
        }
        "match" => {
            const USAGE: &str = "bank match <movement id> <line id>";
            let txn_id = movement_arg(context, residence_id, args.get(0, USAGE)?)?;
            let line_text = args.get(1, USAGE)?;
            let line_ids = context.with_book(|book| {
                Ok(book
                    .lines
                    .iter()
                    .filter(|line| line.residence_id == residence_id)
                    .map(|line| line.id)
                    .collect::<Vec<_>>())
            })?;
            let line_id = resolve_id(line_ids, line_text, "Ledger line")?;
            let clock = context.clock;
            context.mutate(|book| {
                ReconciliationService::confirm_match(book, residence_id, txn_id, line_id, &clock)
            })?;
            io::print_success(format!(
                "Movement {} matched with line {}.",
                short_id(txn_id),
                short_id(line_id)
            ));
            Ok(())
        }
        other => Err(unknown_subcommand(
            "bank",
            other,
            "add, list, main, txn, pending, reconcile, candidates, match",
        )),
    }
}

/// Bank account by label (case-insensitive) or id prefix.
fn account_arg(
    context: &ShellContext,
    residence_id: ResidenceId,
    text: &str,
) -> Result<Uuid, CommandError> {
    let (by_label, ids) = context.with_book(|book| {
        let accounts = ReconciliationService::list_accounts(book, residence_id);
        let by_label = accounts
            .iter()
            .find(|account| account.label.eq_ignore_ascii_case(text.trim()))
            .map(|account| account.id);
        Ok((by_label, accounts.iter().map(|account| account.id).collect::<Vec<_>>()))
    })?;
    match by_label {
        Some(id) => Ok(id),
        None => resolve_id(ids, text, "Bank account"),
    }
}

fn movement_arg(
    context: &ShellContext,
    residence_id: ResidenceId,
    text: &str,
) -> Result<Uuid, CommandError> {
    let ids = context.with_book(|book| {
        Ok(book
            .bank_transactions
            .iter()
            .filter(|txn| {
                book.bank_account(txn.bank_account_id)
                    .map_or(false, |account| account.residence_id == residence_id)
            })
            .map(|txn| txn.id)
            .collect::<Vec<_>>())
    })?;
    resolve_id(ids, text, "Bank movement")
}
