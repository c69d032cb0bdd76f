use copro_core::{
    domain::{AccountKind, ChargeCategory, Scope},
    engine::{
        public_api, BudgetService, CallerContext, FixedClock, LedgerService, LineFilter, NewLine,
    },
    init,
};
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

#[test]
fn book_posting_and_budget_smoke() {
    init();

    let mut book = public_api::api_create_book("SmokeTest");
    let residence_id = Uuid::new_v4();
    book.directory
        .residences
        .insert(residence_id, "Les Tilleuls".into());
    let ctx = CallerContext::new(residence_id, Uuid::new_v4());
    let clock = FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());

    let account = LedgerService::create_account(
        &mut book,
        Scope::Global,
        "615",
        "Entretien",
        AccountKind::Expense,
    )
    .unwrap();
    let journal = LedgerService::create_journal(
        &mut book,
        Scope::Residence(residence_id),
        "ACH",
        "Achats",
    )
    .unwrap();
    let date = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
    LedgerService::post_line(
        &mut book,
        &ctx,
        &clock,
        NewLine::debit(journal, account, date, "Jardinier", dec!(240))
            .with_category(ChargeCategory::Maintenance),
    )
    .unwrap();

    let budget = BudgetService::create_budget(&mut book, residence_id, 2024).unwrap();
    BudgetService::add_line(
        &mut book,
        residence_id,
        budget,
        "Espaces verts",
        ChargeCategory::Maintenance,
        dec!(1000),
    )
    .unwrap();

    let variance = BudgetService::variance(&book, residence_id, budget).unwrap();
    assert_eq!(variance.len(), 1);
    assert_eq!(variance[0].remaining, dec!(760));

    let lines = LedgerService::list_lines(&book, residence_id, &LineFilter::default(), 10);
    assert_eq!(lines.len(), 1);
}
