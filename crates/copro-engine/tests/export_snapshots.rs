use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

use copro_domain::{AccountKind, Book, ChargeCategory, DirectorySnapshot, LotEntry, Scope};
use copro_engine::{
    BudgetService, CallerContext, FixedClock, LedgerService, NewLine, ReportingService,
};

fn clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap())
}

#[test]
fn ledger_export_uses_semicolons_and_comma_decimals() {
    let mut book = Book::new("Export");
    let ctx = CallerContext::new(Uuid::new_v4(), Uuid::new_v4());
    let journal =
        LedgerService::create_journal(&mut book, Scope::Global, "ACH", "Achats").expect("journal");
    let expense = LedgerService::create_account(
        &mut book,
        Scope::Global,
        "606",
        "Fournitures",
        AccountKind::Expense,
    )
    .expect("expense");
    let supplier = LedgerService::create_account(
        &mut book,
        Scope::Residence(ctx.residence_id),
        "401",
        "Fournisseurs",
        AccountKind::Liability,
    )
    .expect("supplier");

    let known_lot = Uuid::new_v4();
    let mut directory = DirectorySnapshot::default();
    directory.lots.insert(
        known_lot,
        LotEntry {
            residence_id: ctx.residence_id,
            number: "A12".into(),
        },
    );

    let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
    let debit = LedgerService::post_line(
        &mut book,
        &ctx,
        &clock(),
        NewLine::debit(journal, expense, date, "Entretien ascenseur", dec!(150)).with_lot(known_lot),
    )
    .expect("debit");
    let credit = LedgerService::post_line(
        &mut book,
        &ctx,
        &clock(),
        NewLine::credit(journal, supplier, date, "Facture; mars", dec!(150))
            .with_lot(Uuid::new_v4()),
    )
    .expect("credit");

    let csv = ReportingService::export_ledger_csv(&book, &[&debit, &credit], &directory, b';')
        .expect("export");
    insta::assert_snapshot!(csv.trim_end(), @r###"
    Date;Journal code;Account code;Label;Lot number;Debit;Credit
    2025-03-10;ACH;606;Entretien ascenseur;A12;150,00;
    2025-03-10;ACH;401;"Facture; mars";unknown;;150,00
    "###);
}

#[test]
fn budget_export_lists_lines_by_category() {
    let mut book = Book::new("Export");
    let residence = Uuid::new_v4();
    let budget = BudgetService::create_budget(&mut book, residence, 2025).expect("budget");
    let heating = BudgetService::add_line(
        &mut book,
        residence,
        budget,
        "Chauffage",
        ChargeCategory::Energy,
        dec!(2000),
    )
    .expect("heating");
    BudgetService::add_line(
        &mut book,
        residence,
        budget,
        "Espaces verts",
        ChargeCategory::Maintenance,
        dec!(1000),
    )
    .expect("garden");
    book.budget_lines
        .iter_mut()
        .find(|line| line.id == heating)
        .expect("heating line")
        .actual_amount = Some(dec!(1850.40));

    let csv = ReportingService::export_budget_csv(&book, residence, budget, b';').expect("export");
    insta::assert_snapshot!(csv.trim_end(), @r###"
    Category;Label;Budgeted;Actual
    Entretien;Espaces verts;1000,00;
    Énergie;Chauffage;2000,00;1850,40
    "###);
}
