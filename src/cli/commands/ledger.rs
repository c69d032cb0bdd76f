//! Chart of accounts, journals, postings and ledger listings.

use rust_decimal::Decimal;
use uuid::Uuid;

use copro_domain::{
    AccountKind, Book, DateRange, LedgerLine, ReferenceDirectory, ResidenceId, Scope,
};
use copro_engine::{
    public_api::{self, ApiLineInput},
    Clock, CoreError, LedgerService, LineFilter, NewLine,
};

use super::{
    date_arg, money, resolve_id, short_id, split_subcommand, unknown_subcommand, usage_error,
    Args,
};
use crate::cli::context::ShellContext;
use crate::cli::error::{CommandError, CommandResult};
use crate::cli::io;
use crate::cli::output::{print_table, section};
use crate::cli::registry::CommandEntry;

const POST_USAGE: &str = "post <journal> <account> <date> <label> <debit> <credit> [--lot <number>] [--ref <reference>] [--category <category>] [--key <idempotency key>]";
const ENTRY_USAGE: &str =
    "entry <journal> <date> <label> <account> <debit> <credit> <account> <debit> <credit> [...]";
const LINES_USAGE: &str = "lines [--journal <code>] [--account <code>] [--from <date> --to <date>] [--search <text>] [--limit <n>]";

pub(crate) fn definitions() -> Vec<CommandEntry> {
    vec![
        CommandEntry::new(
            "account",
            "Manage the chart of accounts",
            "account add <code> <name> <asset|liability|revenue|expense|equity> [--global] | account rename <code> <name> | account list | account balance <code>",
            cmd_account,
        ),
        CommandEntry::new(
            "journal",
            "Manage accounting journals",
            "journal add <code> <name> [--global] | journal list",
            cmd_journal,
        ),
        CommandEntry::new("post", "Post a single ledger line", POST_USAGE, cmd_post),
        CommandEntry::new("entry", "Post a balanced multi-line entry", ENTRY_USAGE, cmd_entry),
        CommandEntry::new(
            "reverse",
            "Reverse a posted line",
            "reverse <line id> [date]",
            cmd_reverse,
        ),
        CommandEntry::new("lines", "List ledger lines, newest first", LINES_USAGE, cmd_lines),
    ]
}

fn cmd_account(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let (sub, rest) = split_subcommand(args, "account <add|rename|list|balance> ...")?;
    let args = Args::parse(rest);
    let residence_id = context.residence_id()?;
    match sub.as_str() {
        "add" => {
            const USAGE: &str = "account add <code> <name> <kind> [--global]";
            let code = args.get(0, USAGE)?;
            let name = args.get(1, USAGE)?;
            let kind = args
                .get(2, USAGE)?
                .parse::<AccountKind>()
                .map_err(CommandError::InvalidArguments)?;
            let scope = if args.flag("global") {
                Scope::Global
            } else {
                Scope::Residence(residence_id)
            };
            context.mutate(|book| LedgerService::create_account(book, scope, code, name, kind))?;
            io::print_success(format!("Account {} `{}` created ({}).", code, name, scope));
            Ok(())
        }
        "rename" => {
            const USAGE: &str = "account rename <code> <name>";
            let code = args.get(0, USAGE)?;
            let name = args.get(1, USAGE)?;
            let ctx = context.caller()?;
            context.mutate(|book| {
                let id = account_id(book, residence_id, code)?;
                LedgerService::rename_account(book, &ctx, id, name)
            })?;
            io::print_success(format!("Account {} renamed to `{}`.", code, name));
            Ok(())
        }
        "list" => {
            let rows = context.with_book(|book| {
                Ok(LedgerService::accessible_accounts(book, residence_id)
                    .into_iter()
                    .map(|account| {
                        vec![
                            account.code.clone(),
                            account.name.clone(),
                            account.kind.to_string(),
                            account.scope.residence_id().map_or("global", |_| "residence").to_string(),
                        ]
                    })
                    .collect::<Vec<_>>())
            })?;
            section("Accounts");
            print_table(&["Code", "Name", "Kind", "Scope"], &rows);
            Ok(())
        }
        "balance" => {
            let code = args.get(0, "account balance <code>")?;
            let balance = context.with_book(|book| {
                let id = account_id(book, residence_id, code)?;
                Ok(LedgerService::account_balance(book, residence_id, id)?)
            })?;
            io::print_info(format!("Balance of {}: {}", code, money(balance)));
            Ok(())
        }
        other => Err(unknown_subcommand("account", other, "add, rename, list, balance")),
    }
}

fn cmd_journal(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let (sub, rest) = split_subcommand(args, "journal <add|list> ...")?;
    let args = Args::parse(rest);
    let residence_id = context.residence_id()?;
    match sub.as_str() {
        "add" => {
            const USAGE: &str = "journal add <code> <name> [--global]";
            let code = args.get(0, USAGE)?;
            let name = args.get(1, USAGE)?;
            let scope = if args.flag("global") {
                Scope::Global
            } else {
                Scope::Residence(residence_id)
            };
            context.mutate(|book| LedgerService::create_journal(book, scope, code, name))?;
            io::print_success(format!("Journal {} `{}` created.", code, name));
            Ok(())
        }
        "list" => {
            let rows = context.with_book(|book| {
                Ok(LedgerService::accessible_journals(book, residence_id)
                    .into_iter()
                    .map(|journal| vec![journal.code.clone(), journal.name.clone()])
                    .collect::<Vec<_>>())
            })?;
            section("Journals");
            print_table(&["Code", "Name"], &rows);
            Ok(())
        }
        other => Err(unknown_subcommand("journal", other, "add, list")),
    }
}

fn cmd_post(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let args = Args::parse(args);
    if args.positional.len() != 6 {
        return Err(usage_error(POST_USAGE));
    }
    let ctx = context.caller()?;
    let clock = context.clock;
    let id = context.mutate(|book| {
        let lot_id = args
            .option("lot")
            .map(|number| {
                book.directory
                    .lot_by_number(ctx.residence_id, number)
                    .ok_or_else(|| CoreError::NotFound {
                        entity: "Lot",
                        id: number.to_string(),
                    })
            })
            .transpose()?;
        public_api::api_post_line(
            book,
            &ctx,
            &clock,
            ApiLineInput {
                journal_code: args.positional[0],
                account_code: args.positional[1],
                date: args.positional[2],
                label: args.positional[3],
                debit: args.positional[4],
                credit: args.positional[5],
                reference: args.option("ref"),
                category: args.option("category"),
                lot_id,
                idempotency_key: args.option("key"),
            },
        )
    })?;
    io::print_success(format!("Line {} posted.", short_id(id)));
    Ok(())
}

fn cmd_entry(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let args = Args::parse(args);
    let positional = &args.positional;
    if positional.len() < 9 || (positional.len() - 3) % 3 != 0 {
        return Err(usage_error(ENTRY_USAGE));
    }
    let ctx = context.caller()?;
    let clock = context.clock;
    let date = date_arg(positional[1])?;
    let label = positional[2];
    let mut amounts = Vec::new();
    for chunk in positional[3..].chunks(3) {
        amounts.push((
            chunk[0],
            public_api::parse_optional_amount(chunk[1])?,
            public_api::parse_optional_amount(chunk[2])?,
        ));
    }

    let posted = context.mutate(|book| {
        let journal_id = LedgerService::find_journal_by_code(book, ctx.residence_id, positional[0])
            .map(|journal| journal.id)
            .ok_or_else(|| CoreError::NotFound {
                entity: "Journal",
                id: positional[0].to_string(),
            })?;
        let mut lines = Vec::with_capacity(amounts.len());
        for (code, debit, credit) in &amounts {
            let account_id = LedgerService::find_account_by_code(book, ctx.residence_id, code)
                .map(|account| account.id)
                .ok_or_else(|| CoreError::NotFound {
                    entity: "Account",
                    id: code.to_string(),
                })?;
            let mut line = NewLine::debit(journal_id, account_id, date, label, *debit);
            line.credit = *credit;
            lines.push(line);
        }
        LedgerService::post_entry(book, &ctx, &clock, lines)
    })?;
    io::print_success(format!("Entry of {} lines posted.", posted.len()));
    Ok(())
}

fn cmd_reverse(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let args = Args::parse(args);
    let target = args.get(0, "reverse <line id> [date]")?;
    let ctx = context.caller()?;
    let clock = context.clock;
    let date = match args.opt(1) {
        Some(text) => date_arg(text)?,
        None => clock.today(),
    };
    let ids = context.with_book(|book| {
        Ok(book
            .lines
            .iter()
            .filter(|line| line.residence_id == ctx.residence_id)
            .map(|line| line.id)
            .collect::<Vec<_>>())
    })?;
    let line_id = resolve_id(ids, target, "Ledger line")?;
    if !context.confirm(&format!("Reverse line {}?", short_id(line_id)))? {
        io::print_info("Reversal cancelled.");
        return Ok(());
    }
    let reversal =
        context.mutate(|book| LedgerService::reverse_line(book, &ctx, &clock, line_id, date))?;
    io::print_success(format!(
        "Line {} reversed by {}.",
        short_id(line_id),
        short_id(reversal.id)
    ));
    Ok(())
}

fn cmd_lines(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let args = Args::parse(args);
    let residence_id = context.residence_id()?;
    let limit = match args.option("limit") {
        Some(text) => text
            .parse::<usize>()
            .map_err(|_| usage_error(LINES_USAGE))?,
        None => context.config.page_size,
    };
    let (rows, totals) = context.with_book(|book| {
        let filter = line_filter(book, residence_id, &args)?;
        let lines = LedgerService::list_lines(book, residence_id, &filter, limit);
        let totals = LedgerService::totals(lines.iter().copied());
        let rows = lines
            .iter()
            .map(|line| line_row(book, line))
            .collect::<Vec<_>>();
        Ok((rows, totals))
    })?;
    section("Ledger lines");
    print_table(
        &["Id", "Date", "Journal", "Account", "Label", "Lot", "Debit", "Credit"],
        &rows,
    );
    io::print_info(format!(
        "Total debit {}  Total credit {}",
        money(totals.total_debit),
        money(totals.total_credit)
    ));
    Ok(())
}

/// Builds a line filter from `--journal/--account/--from/--to/--search` options.
pub(crate) fn line_filter(
    book: &Book,
    residence_id: ResidenceId,
    args: &Args<'_>,
) -> Result<LineFilter, CommandError> {
    let journal_id = match args.option("journal") {
        Some(code) => Some(
            LedgerService::find_journal_by_code(book, residence_id, code)
                .map(|journal| journal.id)
                .ok_or_else(|| CoreError::NotFound {
                    entity: "Journal",
                    id: code.to_string(),
                })?,
        ),
        None => None,
    };
    let account_id = match args.option("account") {
        Some(code) => Some(account_id(book, residence_id, code)?),
        None => None,
    };
    let range = match (args.option("from"), args.option("to")) {
        (Some(from), Some(to)) => Some(
            DateRange::new(date_arg(from)?, date_arg(to)?)
                .map_err(|err| CommandError::InvalidArguments(err.to_string()))?,
        ),
        (None, None) => None,
        _ => {
            return Err(CommandError::InvalidArguments(
                "--from and --to must be given together".into(),
            ))
        }
    };
    Ok(LineFilter {
        journal_id,
        account_id,
        range,
        search: args.option("search").map(str::to_string),
    })
}

pub(crate) fn account_id(
    book: &Book,
    residence_id: ResidenceId,
    code: &str,
) -> Result<Uuid, CoreError> {
    LedgerService::find_account_by_code(book, residence_id, code)
        .map(|account| account.id)
        .ok_or_else(|| CoreError::NotFound {
            entity: "Account",
            id: code.to_string(),
        })
}

fn line_row(book: &Book, line: &LedgerLine) -> Vec<String> {
    let journal = book
        .journal(line.journal_id)
        .map(|journal| journal.code.clone())
        .unwrap_or_default();
    let account = book
        .account(line.account_id)
        .map(|account| account.code.clone())
        .unwrap_or_default();
    let lot = line
        .lot_id
        .map(|lot| book.directory.lot(lot).to_string())
        .unwrap_or_default();
    let amount = |value: Decimal| {
        if value.is_zero() {
            String::new()
        } else {
            money(value)
        }
    };
    vec![
        short_id(line.id),
        line.date.to_string(),
        journal,
        account,
        line.label.clone(),
        lot,
        amount(line.debit),
        amount(line.credit),
    ]
}
