use rust_decimal_macros::dec;
use tempfile::TempDir;

use copro_domain::{BudgetStatus, RegularizationStatus};
use copro_engine::{BookStorage, CoreError};

use super::context::{CliMode, ShellContext};
use super::error::{CommandError, LoopControl};
use super::shell::handle_line;

fn shell() -> (TempDir, ShellContext) {
    let home = TempDir::new().expect("temp home");
    let context =
        ShellContext::with_home(CliMode::Script, home.path().to_path_buf()).expect("shell context");
    (home, context)
}

fn run(context: &mut ShellContext, lines: &[&str]) {
    for line in lines {
        match handle_line(context, line) {
            Ok(LoopControl::Continue) => {}
            Ok(LoopControl::Exit) => panic!("unexpected exit on `{line}`"),
            Err(err) => panic!("`{line}` failed: {err}"),
        }
    }
}

const SETUP: &[&str] = &[
    "book new Demo",
    "residence add \"Les Tilleuls\"",
    "lot add A1",
    "lot add B2",
    "lease add Dupont --lot A1",
    "account add 606 Fournitures expense",
    "account add 512 Banque asset",
    "journal add ACH Achats",
    "post ACH 606 2024-03-01 \"Facture EDF\" 120,00 0 --lot A1 --category energy",
];

#[test]
fn commands_need_a_loaded_book() {
    let (_home, mut context) = shell();
    let err = handle_line(&mut context, "lot list").expect_err("no book");
    assert!(matches!(err, CommandError::BookNotLoaded));
}

#[test]
fn comments_blank_lines_and_unknown_commands_keep_the_shell_running() {
    let (_home, mut context) = shell();
    run(&mut context, &["# a comment", "   ", "frobnicate"]);
    assert!(context.running);
    assert!(matches!(
        handle_line(&mut context, "exit"),
        Ok(LoopControl::Exit)
    ));
    assert!(!context.running);
}

#[test]
fn posting_through_the_shell_records_a_tagged_line() {
    let (_home, mut context) = shell();
    run(&mut context, SETUP);

    let line = context
        .with_book(|book| Ok(book.lines[0].clone()))
        .expect("line");
    assert_eq!(line.debit, dec!(120.00));
    assert!(line.credit.is_zero());
    assert!(line.lot_id.is_some());
    assert_eq!(line.label, "Facture EDF");
}

#[test]
fn failed_posting_leaves_the_book_untouched() {
    let (_home, mut context) = shell();
    run(&mut context, SETUP);

    let err = handle_line(&mut context, "post XXX 606 2024-03-02 Test 10 0").expect_err("journal");
    assert!(matches!(
        err,
        CommandError::Core(CoreError::NotFound { entity: "Journal", .. })
    ));
    let err = handle_line(&mut context, "post ACH 606 2024-03-02 Test 10 10").expect_err("sides");
    assert!(matches!(err, CommandError::Core(CoreError::Validation(_))));

    let count = context.with_book(|book| Ok(book.lines.len())).expect("count");
    assert_eq!(count, 1);
}

#[test]
fn balanced_entries_and_reversals() {
    let (_home, mut context) = shell();
    run(&mut context, SETUP);
    run(
        &mut context,
        &["entry ACH 2024-03-05 \"Facture eau\" 606 80 0 512 0 80"],
    );
    let first = context
        .with_book(|book| Ok(book.lines[0].id.simple().to_string()))
        .expect("id");
    run(&mut context, &[&format!("reverse {} 2024-03-31", &first[..8])]);

    let (count, reversed) = context
        .with_book(|book| {
            Ok((
                book.lines.len(),
                book.lines.iter().filter(|line| line.is_reversal()).count(),
            ))
        })
        .expect("lines");
    assert_eq!(count, 4);
    assert_eq!(reversed, 1);

    let err = handle_line(&mut context, "entry ACH 2024-03-05 Bad 606 80 0 512 0 70")
        .expect_err("unbalanced");
    assert!(matches!(err, CommandError::Core(_)));
}

#[test]
fn budget_regularization_flow() {
    let (_home, mut context) = shell();
    run(&mut context, SETUP);
    run(
        &mut context,
        &[
            "key add TG \"Tantiemes generaux\"",
            "key share TG A1 600",
            "key share TG B2 400",
            "budget new 2024",
            "budget line 2024 Electricite energy 1000 --key TG",
            "budget vote 2024",
            "budget refresh 2024",
            "reg from-budget Dupont 2024 500",
        ],
    );

    let (status, actual, reg) = context
        .with_book(|book| {
            Ok((
                book.budgets[0].status,
                book.budget_lines[0].actual_amount,
                book.regularizations[0].clone(),
            ))
        })
        .expect("state");
    assert_eq!(status, BudgetStatus::Voted);
    assert_eq!(actual, Some(dec!(120.00)));
    assert_eq!(reg.actual_charges, dec!(72.00));
    assert_eq!(reg.balance, dec!(428.00));

    let short = reg.id.simple().to_string();
    run(
        &mut context,
        &[&format!("reg send {}", &short[..8]), &format!("reg paid {}", &short[..8])],
    );
    let status = context
        .with_book(|book| Ok(book.regularizations[0].status))
        .expect("status");
    assert_eq!(status, RegularizationStatus::Paid);

    let err = handle_line(&mut context, "key delete TG").expect_err("key in use");
    assert!(matches!(err, CommandError::Core(CoreError::InUse { .. })));
}

#[test]
fn bank_movements_are_matched_with_ledger_lines() {
    let (_home, mut context) = shell();
    run(&mut context, SETUP);
    run(
        &mut context,
        &[
            "bank add Courant FR7630006000011234567890189 BNPAFRPP --opening 1000",
            "bank txn Courant 2024-03-02 \"Prelevement EDF\" -120",
        ],
    );
    let (txn, line) = context
        .with_book(|book| {
            Ok((
                book.bank_transactions[0].id.simple().to_string(),
                book.lines[0].id.simple().to_string(),
            ))
        })
        .expect("ids");
    run(
        &mut context,
        &[
            &format!("bank candidates {}", &txn[..8]),
            &format!("bank match {} {}", &txn[..8], &line[..8]),
        ],
    );
    let reconciled = context
        .with_book(|book| Ok(book.bank_transactions[0].is_reconciled))
        .expect("state");
    assert!(reconciled);
}

#[test]
fn works_fund_contributions_accumulate() {
    let (_home, mut context) = shell();
    run(&mut context, SETUP);
    run(
        &mut context,
        &["fund init", "fund contribute 150", "fund contribute 50,50", "fund status"],
    );
    let balance = context
        .with_book(|book| Ok(book.works_funds[0].balance))
        .expect("fund");
    assert_eq!(balance, dec!(200.50));

    let err = handle_line(&mut context, "fund minimum 2").expect_err("below legal minimum");
    assert!(matches!(err, CommandError::Core(CoreError::Validation(_))));
    let err = handle_line(&mut context, "fund init 3").expect_err("existing fund, low floor");
    assert!(matches!(err, CommandError::Core(CoreError::Validation(_))));
}

#[test]
fn saved_books_load_in_a_new_session() {
    let (home, mut context) = shell();
    run(&mut context, SETUP);
    run(&mut context, &["book save", "book backup before-vote"]);
    assert_eq!(context.storage.list_books().expect("books").len(), 1);
    assert_eq!(context.config.last_opened_book.as_deref(), Some("Demo"));

    let mut fresh = ShellContext::with_home(CliMode::Script, home.path().to_path_buf())
        .expect("second session");
    assert!(fresh.book.is_none());
    run(&mut fresh, &["book load Demo"]);
    let (lines, revision) = fresh
        .with_book(|book| Ok((book.lines.len(), book.revision)))
        .expect("loaded");
    assert_eq!(lines, 1);
    assert_eq!(revision, 1);
    assert!(fresh.residence.is_some());
}

#[test]
fn exports_write_csv_files() {
    let (home, mut context) = shell();
    run(&mut context, SETUP);
    let target = home.path().join("ledger.csv");
    run(
        &mut context,
        &[&format!("export ledger \"{}\"", target.display())],
    );
    let csv = std::fs::read_to_string(&target).expect("export");
    let mut lines = csv.lines();
    assert!(lines.next().expect("header").starts_with("Date;"));
    let row = lines.next().expect("row");
    assert!(row.contains("Facture EDF"));
    assert!(row.contains("120,00"));
}

#[test]
fn config_changes_are_persisted() {
    let (home, mut context) = shell();
    run(&mut context, &["config set page_size 20", "config backup tuned"]);
    let reloaded = copro_config::ConfigManager::with_base_dir(home.path().to_path_buf())
        .expect("manager")
        .load()
        .expect("config");
    assert_eq!(reloaded.page_size, 20);

    let err = handle_line(&mut context, "config set page_size 0").expect_err("invalid");
    assert!(matches!(err, CommandError::Config(_)));
    assert_eq!(context.config.page_size, 20);
}
