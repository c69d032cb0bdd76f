use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use copro_domain::{
    AccountKind, BalanceDirection, Book, BudgetStatus, ChargeCategory, DirectorySnapshot,
    EmptyDirectory, LeaseEntry, LotShare, RegularizationStatus, Scope, MAX_AMOUNT,
    UNKNOWN_REFERENCE,
};

use crate::{
    budget_service::BudgetService,
    context::CallerContext,
    distribution_service::DistributionService,
    error::ErrorKind,
    integrity::IntegrityService,
    ledger_service::{LedgerService, LineFilter, NewLine, DEFAULT_PAGE_SIZE},
    public_api::{api_post_line, parse_optional_amount, ApiLineInput},
    reconciliation_service::ReconciliationService,
    regularization_service::{NewRegularization, RegularizationService},
    reporting::ReportingService,
    shared::SharedBook,
    storage::book_warnings,
    time::FixedClock,
    works_fund_service::WorksFundService,
    CoreError,
};

const IBAN_MAIN: &str = "FR7630006000011234567890189";
const IBAN_SAVINGS: &str = "FR1420041010050500013M02606";

fn clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap())
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

struct Fixture {
    book: Book,
    ctx: CallerContext,
    journal: Uuid,
    expense: Uuid,
    supplier: Uuid,
}

fn fixture() -> Fixture {
    let mut book = Book::new("Résidence Les Tilleuls");
    let ctx = CallerContext::new(Uuid::new_v4(), Uuid::new_v4());
    let journal = LedgerService::create_journal(&mut book, Scope::Global, "ach", "Achats")
        .expect("create journal");
    let expense = LedgerService::create_account(
        &mut book,
        Scope::Global,
        "606",
        "Fournitures",
        AccountKind::Expense,
    )
    .expect("create expense account");
    let supplier = LedgerService::create_account(
        &mut book,
        Scope::Residence(ctx.residence_id),
        "401",
        "Fournisseurs",
        AccountKind::Liability,
    )
    .expect("create supplier account");
    Fixture {
        book,
        ctx,
        journal,
        expense,
        supplier,
    }
}

#[test]
fn posted_line_is_listed_first_and_totalled() {
    let mut fx = fixture();
    LedgerService::post_line(
        &mut fx.book,
        &fx.ctx,
        &clock(),
        NewLine::debit(fx.journal, fx.expense, date(2025, 1, 5), "Ampoules", dec!(50)),
    )
    .expect("post older line");
    let posted = LedgerService::post_line(
        &mut fx.book,
        &fx.ctx,
        &clock(),
        NewLine::debit(fx.journal, fx.expense, date(2025, 3, 10), "Entretien", dec!(150)),
    )
    .expect("post line");

    let lines = LedgerService::list_lines(
        &fx.book,
        fx.ctx.residence_id,
        &LineFilter::default(),
        DEFAULT_PAGE_SIZE,
    );
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].id, posted.id);
    assert_eq!(lines[0].created_by, fx.ctx.user_id);

    let totals = LedgerService::totals(lines.into_iter().take(1));
    assert_eq!(totals.total_debit, dec!(150));
    assert_eq!(totals.total_credit, dec!(0));
}

#[test]
fn post_line_rejects_invalid_sides() {
    let mut fx = fixture();
    let base = NewLine::debit(fx.journal, fx.expense, date(2025, 1, 1), "x", dec!(0));
    let cases = [
        (dec!(0), dec!(0)),
        (dec!(-5), dec!(0)),
        (dec!(0), dec!(-5)),
        (dec!(10), dec!(10)),
        (dec!(1.005), dec!(0)),
    ];
    for (debit, credit) in cases {
        let err = LedgerService::post_line(
            &mut fx.book,
            &fx.ctx,
            &clock(),
            NewLine {
                debit,
                credit,
                ..base.clone()
            },
        )
        .expect_err("invalid sides must be rejected");
        assert_eq!(err.kind(), ErrorKind::Validation, "{debit}/{credit}");
    }
    assert!(fx.book.lines.is_empty());
}

#[test]
fn post_line_rejects_accounts_of_another_residence() {
    let mut fx = fixture();
    let other = CallerContext::new(Uuid::new_v4(), fx.ctx.user_id);
    let err = LedgerService::post_line(
        &mut fx.book,
        &other,
        &clock(),
        NewLine::credit(fx.journal, fx.supplier, date(2025, 1, 1), "Facture", dec!(20)),
    )
    .expect_err("supplier account is private to the first residence");
    assert!(matches!(err, CoreError::NotFound { entity: "Account", .. }));
    assert_eq!(err.user_message(), "not found");
    assert!(fx.book.lines.is_empty());

    let err = LedgerService::post_line(
        &mut fx.book,
        &fx.ctx,
        &clock(),
        NewLine::debit(Uuid::new_v4(), fx.expense, date(2025, 1, 1), "x", dec!(1)),
    )
    .expect_err("unknown journal");
    assert!(matches!(err, CoreError::NotFound { entity: "Journal", .. }));
}

#[test]
fn idempotency_key_prevents_double_posting() {
    let mut fx = fixture();
    let input = NewLine::debit(fx.journal, fx.expense, date(2025, 2, 1), "Gaz", dec!(80))
        .with_idempotency_key("import-42");
    let first = LedgerService::post_line(&mut fx.book, &fx.ctx, &clock(), input.clone())
        .expect("first post");
    let retried =
        LedgerService::post_line(&mut fx.book, &fx.ctx, &clock(), input).expect("retry");
    assert_eq!(first.id, retried.id);
    assert_eq!(fx.book.lines.len(), 1);
}

#[test]
fn entries_must_balance_and_post_atomically() {
    let mut fx = fixture();
    let unbalanced = vec![
        NewLine::debit(fx.journal, fx.expense, date(2025, 4, 1), "Facture", dec!(120)),
        NewLine::credit(fx.journal, fx.supplier, date(2025, 4, 1), "Facture", dec!(100)),
    ];
    let err = LedgerService::post_entry(&mut fx.book, &fx.ctx, &clock(), unbalanced)
        .expect_err("unbalanced entry");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(fx.book.lines.is_empty());

    let balanced = vec![
        NewLine::debit(fx.journal, fx.expense, date(2025, 4, 1), "Facture", dec!(120)),
        NewLine::credit(fx.journal, fx.supplier, date(2025, 4, 1), "Facture", dec!(120)),
    ];
    let lines = LedgerService::post_entry(&mut fx.book, &fx.ctx, &clock(), balanced)
        .expect("balanced entry");
    assert_eq!(lines.len(), 2);
    assert!(LedgerService::totals(&fx.book.lines).is_balanced());
}

#[test]
fn entry_retries_need_a_key_on_every_line() {
    let mut fx = fixture();
    let partly_keyed = vec![
        NewLine::debit(fx.journal, fx.expense, date(2025, 4, 2), "Facture", dec!(50))
            .with_idempotency_key("inv-7-debit"),
        NewLine::credit(fx.journal, fx.supplier, date(2025, 4, 2), "Facture", dec!(50)),
    ];
    let err = LedgerService::post_entry(&mut fx.book, &fx.ctx, &clock(), partly_keyed)
        .expect_err("mixed keys");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(fx.book.lines.is_empty());

    let keyed = vec![
        NewLine::debit(fx.journal, fx.expense, date(2025, 4, 2), "Facture", dec!(50))
            .with_idempotency_key("inv-7-debit"),
        NewLine::credit(fx.journal, fx.supplier, date(2025, 4, 2), "Facture", dec!(50))
            .with_idempotency_key("inv-7-credit"),
    ];
    let first = LedgerService::post_entry(&mut fx.book, &fx.ctx, &clock(), keyed.clone())
        .expect("first post");
    let retried =
        LedgerService::post_entry(&mut fx.book, &fx.ctx, &clock(), keyed).expect("retry");
    assert_eq!(
        first.iter().map(|line| line.id).collect::<Vec<_>>(),
        retried.iter().map(|line| line.id).collect::<Vec<_>>()
    );
    assert_eq!(fx.book.lines.len(), 2);
}

#[test]
fn lines_are_reversed_at_most_once() {
    let mut fx = fixture();
    let line = LedgerService::post_line(
        &mut fx.book,
        &fx.ctx,
        &clock(),
        NewLine::debit(fx.journal, fx.expense, date(2025, 5, 2), "Erreur", dec!(99)),
    )
    .expect("post line");
    let reversal =
        LedgerService::reverse_line(&mut fx.book, &fx.ctx, &clock(), line.id, date(2025, 5, 3))
            .expect("reverse line");
    assert_eq!(reversal.credit, dec!(99));
    assert_eq!(reversal.debit, dec!(0));
    assert_eq!(reversal.reverses, Some(line.id));
    assert_eq!(
        LedgerService::account_balance(&fx.book, fx.ctx.residence_id, fx.expense)
            .expect("balance"),
        Decimal::ZERO
    );

    let again =
        LedgerService::reverse_line(&mut fx.book, &fx.ctx, &clock(), line.id, date(2025, 5, 4));
    assert!(matches!(again, Err(CoreError::Conflict(_))));
    let nested =
        LedgerService::reverse_line(&mut fx.book, &fx.ctx, &clock(), reversal.id, date(2025, 5, 4));
    assert!(matches!(nested, Err(CoreError::Conflict(_))));
}

#[test]
fn listing_filters_by_text_and_caps_results() {
    let mut fx = fixture();
    for day in 1..=5 {
        LedgerService::post_line(
            &mut fx.book,
            &fx.ctx,
            &clock(),
            NewLine::debit(fx.journal, fx.expense, date(2025, 1, day), "Nettoyage", dec!(10)),
        )
        .expect("post expense");
    }
    LedgerService::post_line(
        &mut fx.book,
        &fx.ctx,
        &clock(),
        NewLine::credit(fx.journal, fx.supplier, date(2025, 1, 6), "Facture", dec!(50))
            .with_reference("F-2025-001"),
    )
    .expect("post supplier");

    let by_code = LineFilter {
        search: Some("401".into()),
        ..LineFilter::default()
    };
    let found = LedgerService::list_lines(&fx.book, fx.ctx.residence_id, &by_code, 10);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].account_id, fx.supplier);

    let by_reference = LineFilter {
        search: Some("f-2025".into()),
        ..LineFilter::default()
    };
    assert_eq!(
        LedgerService::list_lines(&fx.book, fx.ctx.residence_id, &by_reference, 10).len(),
        1
    );

    let capped = LedgerService::list_lines(&fx.book, fx.ctx.residence_id, &LineFilter::default(), 3);
    assert_eq!(capped.len(), 3);
    assert_eq!(capped[0].date, date(2025, 1, 6));
    assert!(LedgerService::list_lines(&fx.book, Uuid::new_v4(), &LineFilter::default(), 10)
        .is_empty());
}

#[test]
fn account_codes_are_unique_per_scope() {
    let mut fx = fixture();
    let err = LedgerService::create_account(
        &mut fx.book,
        Scope::Global,
        "606",
        "Doublon",
        AccountKind::Expense,
    )
    .expect_err("duplicate global code");
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.user_message().contains("already exists"));

    let local = LedgerService::create_account(
        &mut fx.book,
        Scope::Residence(fx.ctx.residence_id),
        "606",
        "Fournitures locales",
        AccountKind::Expense,
    )
    .expect("same code in a residence scope");
    let resolved = LedgerService::find_account_by_code(&fx.book, fx.ctx.residence_id, "606")
        .expect("resolve code");
    assert_eq!(resolved.id, local);

    LedgerService::rename_account(&mut fx.book, &fx.ctx, local, "Petites fournitures")
        .expect("rename");
    assert_eq!(fx.book.account(local).unwrap().name, "Petites fournitures");
}

#[test]
fn key_percentages_follow_shares() {
    let mut book = Book::new("Keys");
    let residence = Uuid::new_v4();
    let (l1, l2) = (Uuid::new_v4(), Uuid::new_v4());
    let key = DistributionService::create_key(&mut book, residence, "gen", "Charges générales", None)
        .expect("create key");
    assert_eq!(book.key(key).unwrap().code, "GEN");

    assert_eq!(DistributionService::percentage(&book, key, l1).unwrap(), Decimal::ZERO);

    DistributionService::set_share(&mut book, residence, key, l1, dec!(100)).expect("share l1");
    DistributionService::set_share(&mut book, residence, key, l2, dec!(300)).expect("share l2");
    assert_eq!(DistributionService::percentage(&book, key, l1).unwrap(), dec!(0.25));
    assert_eq!(DistributionService::percentage(&book, key, l2).unwrap(), dec!(0.75));

    DistributionService::set_share(&mut book, residence, key, l2, dec!(100)).expect("upsert l2");
    assert_eq!(book.shares.len(), 2);
    assert_eq!(DistributionService::percentage(&book, key, l2).unwrap(), dec!(0.5));

    let err = DistributionService::set_share(&mut book, residence, key, l1, dec!(-1))
        .expect_err("negative shares");
    assert_eq!(err.kind(), ErrorKind::Validation);

    let duplicate = DistributionService::create_key(&mut book, residence, " Gen ", "Autre", None);
    assert!(matches!(duplicate, Err(CoreError::Conflict(_))));
}

#[test]
fn allocation_sums_exactly_to_amount() {
    let mut book = Book::new("Allocation");
    let residence = Uuid::new_v4();
    let key = DistributionService::create_key(&mut book, residence, "ASC", "Ascenseur", None)
        .expect("create key");
    for shares in [dec!(1), dec!(1), dec!(1)] {
        DistributionService::set_share(&mut book, residence, key, Uuid::new_v4(), shares)
            .expect("share");
    }
    let parts =
        DistributionService::allocate(&book, residence, key, dec!(100)).expect("allocate");
    let total: Decimal = parts.iter().map(|part| part.amount).sum();
    assert_eq!(total, dec!(100));
    assert_eq!(parts[0].amount, dec!(33.34));
}

#[test]
fn oversized_amounts_are_rejected_instead_of_overflowing() {
    let mut book = Book::new("Limits");
    let residence = Uuid::new_v4();
    let key = DistributionService::create_key(&mut book, residence, "BIG", "Grande clé", None)
        .expect("create key");
    let (l1, l2) = (Uuid::new_v4(), Uuid::new_v4());

    let too_many = Decimal::MAX - dec!(1);
    let err = DistributionService::set_share(&mut book, residence, key, l1, too_many)
        .expect_err("shares above the ceiling");
    assert_eq!(err.kind(), ErrorKind::Validation);
    DistributionService::set_share(&mut book, residence, key, l1, MAX_AMOUNT).expect("l1");
    DistributionService::set_share(&mut book, residence, key, l2, MAX_AMOUNT).expect("l2");
    assert_eq!(DistributionService::percentage(&book, key, l1).unwrap(), dec!(0.5));
    let parts =
        DistributionService::allocate(&book, residence, key, MAX_AMOUNT).expect("allocate");
    assert_eq!(parts.iter().map(|part| part.amount).sum::<Decimal>(), MAX_AMOUNT);

    // Rows written by hand into a stored book bypass set_share.
    let mut loaded = Book::new("Hand edited");
    let key = DistributionService::create_key(&mut loaded, residence, "RAW", "Brute", None)
        .expect("create key");
    loaded.shares.push(LotShare::new(key, l1, Decimal::MAX));
    loaded.shares.push(LotShare::new(key, l2, Decimal::MAX));
    let err = DistributionService::percentage(&loaded, key, l1).expect_err("sum overflows");
    assert_eq!(err.kind(), ErrorKind::Validation);

    let budget = BudgetService::create_budget(&mut book, residence, 2025).expect("budget");
    let err = BudgetService::add_line(
        &mut book,
        residence,
        budget,
        "Démesuré",
        ChargeCategory::Other,
        dec!(50_000_000_000_000_000_000_000_000),
    )
    .expect_err("amount above the ceiling");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(book.budget_lines.is_empty());

    book.budgets[0].total_budget = Decimal::MAX;
    let version = book.budgets[0].version;
    let err = BudgetService::add_line(
        &mut book,
        residence,
        budget,
        "Dernière",
        ChargeCategory::Other,
        dec!(1),
    )
    .expect_err("total overflows");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(book.budget_lines.is_empty());
    assert_eq!(book.budgets[0].total_budget, Decimal::MAX);
    assert_eq!(book.budgets[0].version, version);
}

#[test]
fn keys_in_use_cannot_be_deleted() {
    let mut book = Book::new("Usage");
    let residence = Uuid::new_v4();
    let key = DistributionService::create_key(&mut book, residence, "EAU", "Eau", None)
        .expect("create key");
    DistributionService::set_share(&mut book, residence, key, Uuid::new_v4(), dec!(10))
        .expect("share");
    let budget = BudgetService::create_budget(&mut book, residence, 2025).expect("budget");
    let line = BudgetService::add_line(
        &mut book,
        residence,
        budget,
        "Eau froide",
        ChargeCategory::Water,
        dec!(900),
    )
    .expect("line");
    BudgetService::assign_key(&mut book, residence, line, Some(key)).expect("assign key");

    let err = DistributionService::delete_key(&mut book, residence, key).expect_err("in use");
    assert_eq!(err.kind(), ErrorKind::InUse);
    assert_eq!(err.user_message(), "cannot delete: still in use");
    assert!(book.key(key).is_some());

    BudgetService::assign_key(&mut book, residence, line, None).expect("detach key");
    DistributionService::delete_key(&mut book, residence, key).expect("delete unused key");
    assert!(book.key(key).is_none());
    assert!(book.shares.is_empty());
}

#[test]
fn budget_total_tracks_lines() {
    let mut book = Book::new("Budget");
    let residence = Uuid::new_v4();
    let budget = BudgetService::create_budget(&mut book, residence, 2025).expect("budget");
    assert_eq!(book.budget(budget).unwrap().status, BudgetStatus::Draft);

    let maintenance = BudgetService::add_line(
        &mut book,
        residence,
        budget,
        "Entretien",
        ChargeCategory::Maintenance,
        dec!(1000),
    )
    .expect("maintenance line");
    BudgetService::add_line(
        &mut book,
        residence,
        budget,
        "Énergie",
        ChargeCategory::Energy,
        dec!(2000),
    )
    .expect("energy line");
    assert_eq!(book.budget(budget).unwrap().total_budget, dec!(3000));

    BudgetService::delete_line(&mut book, residence, maintenance).expect("delete line");
    assert_eq!(book.budget(budget).unwrap().total_budget, dec!(2000));
    BudgetService::verify_total(&book, budget).expect("no drift");

    let groups = BudgetService::group_by_category(&book, residence, budget).expect("groups");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].category, ChargeCategory::Energy);
    assert_eq!(groups[0].category_total, dec!(2000));

    let duplicate = BudgetService::create_budget(&mut book, residence, 2025);
    assert!(matches!(duplicate, Err(CoreError::Conflict(_))));
}

#[test]
fn stale_budget_versions_are_rejected() {
    let mut book = Book::new("Versions");
    let residence = Uuid::new_v4();
    let budget = BudgetService::create_budget(&mut book, residence, 2026).expect("budget");
    let seen = book.budget(budget).unwrap().version;

    BudgetService::add_line_at_version(
        &mut book,
        residence,
        budget,
        seen,
        "Assurance",
        ChargeCategory::Insurance,
        dec!(400),
    )
    .expect("first writer");
    let err = BudgetService::add_line_at_version(
        &mut book,
        residence,
        budget,
        seen,
        "Ménage",
        ChargeCategory::Cleaning,
        dec!(300),
    )
    .expect_err("second writer read a stale version");
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(book.budget(budget).unwrap().total_budget, dec!(400));
    assert_eq!(book.budget_lines.len(), 1);
}

#[test]
fn drift_is_reported_not_corrected() {
    let mut book = Book::new("Drift");
    let residence = Uuid::new_v4();
    let budget = BudgetService::create_budget(&mut book, residence, 2025).expect("budget");
    BudgetService::add_line(
        &mut book,
        residence,
        budget,
        "Gardien",
        ChargeCategory::Caretaking,
        dec!(500),
    )
    .expect("line");
    book.budget_mut(budget).unwrap().total_budget = dec!(650);

    let err = BudgetService::verify_total(&book, budget).expect_err("drift");
    assert_eq!(err.kind(), ErrorKind::Consistency);
    assert!(IntegrityService::verify(&book).is_err());
    assert_eq!(book.budget(budget).unwrap().total_budget, dec!(650));
}

#[test]
fn actuals_and_variance_come_from_tagged_lines() {
    let mut fx = fixture();
    let residence = fx.ctx.residence_id;
    let budget = BudgetService::create_budget(&mut fx.book, residence, 2025).expect("budget");
    let small = BudgetService::add_line(
        &mut fx.book,
        residence,
        budget,
        "Contrat",
        ChargeCategory::Elevator,
        dec!(100),
    )
    .expect("line");
    let large = BudgetService::add_line(
        &mut fx.book,
        residence,
        budget,
        "Réparations",
        ChargeCategory::Elevator,
        dec!(300),
    )
    .expect("line");
    for (day, amount) in [(3, dec!(150)), (20, dec!(250))] {
        LedgerService::post_line(
            &mut fx.book,
            &fx.ctx,
            &clock(),
            NewLine::debit(fx.journal, fx.expense, date(2025, 2, day), "Ascenseur", amount)
                .with_category(ChargeCategory::Elevator),
        )
        .expect("tagged line");
    }
    LedgerService::post_line(
        &mut fx.book,
        &fx.ctx,
        &clock(),
        NewLine::debit(fx.journal, fx.expense, date(2024, 12, 31), "Ascenseur", dec!(999))
            .with_category(ChargeCategory::Elevator),
    )
    .expect("previous year line");

    BudgetService::refresh_actuals(&mut fx.book, residence, budget).expect("refresh");
    assert_eq!(fx.book.budget_line(small).unwrap().actual_amount, Some(dec!(100)));
    assert_eq!(fx.book.budget_line(large).unwrap().actual_amount, Some(dec!(300)));

    let variance = BudgetService::variance(&fx.book, residence, budget).expect("variance");
    assert_eq!(variance.len(), 1);
    assert_eq!(variance[0].budgeted, dec!(400));
    assert_eq!(variance[0].actual, dec!(400));
    assert_eq!(variance[0].remaining, Decimal::ZERO);
}

#[test]
fn budget_lifecycle_and_latest_voted() {
    let mut book = Book::new("Lifecycle");
    let residence = Uuid::new_v4();
    let y2024 = BudgetService::create_budget(&mut book, residence, 2024).expect("2024");
    let y2025 = BudgetService::create_budget(&mut book, residence, 2025).expect("2025");
    assert!(BudgetService::latest_voted_budget(&book, residence).is_none());

    BudgetService::activate(&mut book, residence, y2024).expect_err("draft cannot be activated");
    BudgetService::vote(&mut book, residence, y2024, &clock()).expect("vote 2024");
    BudgetService::activate(&mut book, residence, y2024).expect("activate 2024");
    assert_eq!(
        BudgetService::latest_voted_budget(&book, residence).unwrap().id,
        y2024
    );

    BudgetService::vote(&mut book, residence, y2025, &clock()).expect("vote 2025");
    let latest = BudgetService::latest_voted_budget(&book, residence).unwrap();
    assert_eq!(latest.id, y2025);
    assert_eq!(latest.voted_at, Some(clock().0));
    assert!(matches!(
        BudgetService::vote(&mut book, residence, y2025, &clock()),
        Err(CoreError::Conflict(_))
    ));
}

#[test]
fn regularization_balance_and_lifecycle() {
    let mut book = Book::new("Regularization");
    let ctx = CallerContext::new(Uuid::new_v4(), Uuid::new_v4());
    let lease = Uuid::new_v4();
    let reg = RegularizationService::create(
        &mut book,
        &ctx,
        &clock(),
        NewRegularization {
            lease_id: lease,
            lot_id: None,
            period_start: date(2024, 1, 1),
            period_end: date(2024, 12, 31),
            provisions_total: dec!(1200),
            actual_charges: dec!(1500),
        },
    )
    .expect("create regularization");

    let stored = book.regularization(reg).unwrap();
    assert_eq!(stored.balance, dec!(-300));
    assert_eq!(stored.direction(), BalanceDirection::AmountOwed);
    assert_eq!(stored.status, RegularizationStatus::Pending);

    RegularizationService::mark_paid(&mut book, ctx.residence_id, reg, &clock())
        .expect_err("cannot skip sent");
    RegularizationService::send(&mut book, ctx.residence_id, reg, &clock()).expect("send");
    let sent = book.regularization(reg).unwrap();
    assert_eq!(sent.status, RegularizationStatus::Sent);
    assert_eq!(sent.sent_at, Some(clock().0));
    assert_eq!(sent.balance, dec!(-300));

    let again = RegularizationService::send(&mut book, ctx.residence_id, reg, &clock());
    assert!(matches!(again, Err(CoreError::Conflict(_))));
    RegularizationService::mark_paid(&mut book, ctx.residence_id, reg, &clock()).expect("paid");
    assert_eq!(
        book.regularization(reg).unwrap().status,
        RegularizationStatus::Paid
    );
}

#[test]
fn regularizations_are_unique_per_lease_and_period() {
    let mut book = Book::new("Unique");
    let ctx = CallerContext::new(Uuid::new_v4(), Uuid::new_v4());
    let input = NewRegularization {
        lease_id: Uuid::new_v4(),
        lot_id: None,
        period_start: date(2024, 1, 1),
        period_end: date(2024, 12, 31),
        provisions_total: dec!(600),
        actual_charges: dec!(450),
    };
    RegularizationService::create(&mut book, &ctx, &clock(), input.clone()).expect("first");
    let duplicate = RegularizationService::create(&mut book, &ctx, &clock(), input.clone());
    assert!(matches!(duplicate, Err(CoreError::Conflict(_))));

    let inverted = RegularizationService::create(
        &mut book,
        &ctx,
        &clock(),
        NewRegularization {
            period_end: date(2023, 12, 31),
            ..input
        },
    );
    assert!(matches!(inverted, Err(CoreError::Validation(_))));
}

#[test]
fn regularization_from_budget_uses_key_percentages() {
    let mut book = Book::new("From budget");
    let ctx = CallerContext::new(Uuid::new_v4(), Uuid::new_v4());
    let residence = ctx.residence_id;
    let (lot_a, lot_b) = (Uuid::new_v4(), Uuid::new_v4());
    let key = DistributionService::create_key(&mut book, residence, "GEN", "Générales", None)
        .expect("key");
    DistributionService::set_share(&mut book, residence, key, lot_a, dec!(250)).expect("share");
    DistributionService::set_share(&mut book, residence, key, lot_b, dec!(750)).expect("share");

    let budget = BudgetService::create_budget(&mut book, residence, 2024).expect("budget");
    let line = BudgetService::add_line(
        &mut book,
        residence,
        budget,
        "Entretien",
        ChargeCategory::Maintenance,
        dec!(4000),
    )
    .expect("line");
    BudgetService::assign_key(&mut book, residence, line, Some(key)).expect("assign key");
    book.budget_lines
        .iter_mut()
        .find(|candidate| candidate.id == line)
        .unwrap()
        .actual_amount = Some(dec!(4200));

    let charges = RegularizationService::compute_charges(&book, residence, lot_a, budget)
        .expect("charges");
    assert_eq!(charges.amount, dec!(1050));
    assert_eq!(charges.key_ids, vec![key]);

    let reg = RegularizationService::create_from_budget(
        &mut book,
        &ctx,
        &clock(),
        Uuid::new_v4(),
        lot_a,
        budget,
        dec!(1200),
    )
    .expect("create from budget");
    let stored = book.regularization(reg).unwrap();
    assert_eq!(stored.balance, dec!(150));
    assert_eq!(stored.period_start, date(2024, 1, 1));
    assert_eq!(stored.period_end, date(2024, 12, 31));

    BudgetService::assign_key(&mut book, residence, line, None).expect("detach");
    let err = DistributionService::delete_key(&mut book, residence, key)
        .expect_err("regularization still records the key");
    assert_eq!(err.kind(), ErrorKind::InUse);
}

#[test]
fn notice_renders_missing_directory_entries_as_unknown() {
    let mut book = Book::new("Notice");
    let ctx = CallerContext::new(Uuid::new_v4(), Uuid::new_v4());
    let lease = Uuid::new_v4();
    let reg = RegularizationService::create(
        &mut book,
        &ctx,
        &clock(),
        NewRegularization {
            lease_id: lease,
            lot_id: Some(Uuid::new_v4()),
            period_start: date(2024, 1, 1),
            period_end: date(2024, 12, 31),
            provisions_total: dec!(900),
            actual_charges: dec!(700),
        },
    )
    .expect("create");

    let notice = RegularizationService::notice(&book, ctx.residence_id, reg, &EmptyDirectory)
        .expect("notice");
    assert_eq!(notice.recipient, UNKNOWN_REFERENCE);
    assert_eq!(notice.lot, UNKNOWN_REFERENCE);
    assert_eq!(notice.direction, BalanceDirection::RefundDue);
    assert_eq!(notice.amount, dec!(200));

    let mut directory = DirectorySnapshot::default();
    directory.leases.insert(
        lease,
        LeaseEntry {
            residence_id: ctx.residence_id,
            tenant: "Mme Durand".into(),
            lot_id: None,
        },
    );
    let notice = RegularizationService::notice(&book, ctx.residence_id, reg, &directory)
        .expect("notice");
    assert_eq!(notice.recipient, "Mme Durand");
}

#[test]
fn first_bank_account_is_main_and_movements_update_balance() {
    let mut book = Book::new("Bank");
    let residence = Uuid::new_v4();
    let main = ReconciliationService::create_bank_account(
        &mut book,
        residence,
        "Compte courant",
        "fr76 3000 6000 0112 3456 7890 189",
        "bnpafrpp",
        dec!(1000),
        &clock(),
    )
    .expect("main account");
    let savings = ReconciliationService::create_bank_account(
        &mut book,
        residence,
        "Livret",
        IBAN_SAVINGS,
        "CCBPFRPPXXX",
        dec!(0),
        &clock(),
    )
    .expect("savings account");
    assert!(book.bank_account(main).unwrap().is_main);
    assert!(!book.bank_account(savings).unwrap().is_main);
    assert_eq!(book.bank_account(main).unwrap().iban, IBAN_MAIN);

    ReconciliationService::set_main(&mut book, residence, savings).expect("set main");
    assert!(!book.bank_account(main).unwrap().is_main);
    assert!(book.bank_account(savings).unwrap().is_main);

    ReconciliationService::record_transaction(
        &mut book,
        residence,
        main,
        date(2025, 3, 1),
        "Appel de fonds",
        Some("M. Martin".into()),
        dec!(450),
    )
    .expect("receipt");
    ReconciliationService::record_transaction(
        &mut book,
        residence,
        main,
        date(2025, 3, 5),
        "Prélèvement EDF",
        None,
        dec!(-120.50),
    )
    .expect("payment");
    assert_eq!(book.bank_account(main).unwrap().balance, dec!(1329.50));

    let zero = ReconciliationService::record_transaction(
        &mut book,
        residence,
        main,
        date(2025, 3, 5),
        "Rien",
        None,
        dec!(0),
    );
    assert!(matches!(zero, Err(CoreError::Validation(_))));

    let bad_iban = ReconciliationService::create_bank_account(
        &mut book,
        residence,
        "Erreur",
        "FR7630006000011234567890188",
        "BNPAFRPP",
        dec!(0),
        &clock(),
    );
    assert!(matches!(bad_iban, Err(CoreError::Validation(_))));
}

#[test]
fn reconcile_is_idempotent_and_scoped() {
    let mut book = Book::new("Reconcile");
    let residence = Uuid::new_v4();
    let account = ReconciliationService::create_bank_account(
        &mut book,
        residence,
        "Compte courant",
        IBAN_MAIN,
        "BNPAFRPP",
        dec!(0),
        &clock(),
    )
    .expect("account");
    let older = ReconciliationService::record_transaction(
        &mut book,
        residence,
        account,
        date(2025, 1, 10),
        "Virement",
        None,
        dec!(300),
    )
    .expect("older");
    let newer = ReconciliationService::record_transaction(
        &mut book,
        residence,
        account,
        date(2025, 2, 10),
        "Virement",
        None,
        dec!(200),
    )
    .expect("newer");

    let pending = ReconciliationService::list_pending(&book, residence);
    assert_eq!(
        pending.iter().map(|txn| txn.id).collect::<Vec<_>>(),
        vec![newer, older]
    );

    let foreign = ReconciliationService::reconcile(&mut book, Uuid::new_v4(), &[older], &clock());
    assert!(matches!(foreign, Err(CoreError::NotFound { .. })));
    let mixed =
        ReconciliationService::reconcile(&mut book, residence, &[older, Uuid::new_v4()], &clock());
    assert!(mixed.is_err());
    assert!(!book.bank_transaction(older).unwrap().is_reconciled);

    assert_eq!(
        ReconciliationService::reconcile(&mut book, residence, &[older], &clock()).expect("first"),
        1
    );
    let stamped = book.bank_transaction(older).unwrap().reconciled_at;
    assert_eq!(
        ReconciliationService::reconcile(&mut book, residence, &[older], &clock())
            .expect("second"),
        0
    );
    let txn = book.bank_transaction(older).unwrap();
    assert!(txn.is_reconciled);
    assert_eq!(txn.reconciled_at, stamped);
    assert_eq!(ReconciliationService::list_pending(&book, residence).len(), 1);
}

#[test]
fn candidates_match_amount_within_window() {
    let mut fx = fixture();
    let residence = fx.ctx.residence_id;
    let account = ReconciliationService::create_bank_account(
        &mut fx.book,
        residence,
        "Compte courant",
        IBAN_MAIN,
        "BNPAFRPP",
        dec!(0),
        &clock(),
    )
    .expect("account");
    let txn = ReconciliationService::record_transaction(
        &mut fx.book,
        residence,
        account,
        date(2025, 3, 10),
        "PRLV FOURNISSEUR",
        None,
        dec!(-150),
    )
    .expect("movement");

    let mut post = |day: u32, amount: Decimal| {
        LedgerService::post_line(
            &mut fx.book,
            &fx.ctx,
            &clock(),
            NewLine::credit(fx.journal, fx.supplier, date(2025, 3, day), "Fournisseur", amount),
        )
        .expect("post")
        .id
    };
    let near = post(9, dec!(150));
    let far = post(14, dec!(150));
    let _outside = post(25, dec!(150));
    let _other_amount = post(10, dec!(151));

    let candidates =
        ReconciliationService::candidates(&fx.book, residence, txn, 5).expect("candidates");
    assert_eq!(
        candidates.iter().map(|c| c.line_id).collect::<Vec<_>>(),
        vec![near, far]
    );

    ReconciliationService::confirm_match(&mut fx.book, residence, txn, near, &clock())
        .expect("confirm");
    let reconciled = fx.book.bank_transaction(txn).unwrap();
    assert!(reconciled.is_reconciled);
    assert!(reconciled
        .reconciled_with
        .as_deref()
        .unwrap()
        .contains(&near.to_string()));
    assert_eq!(fx.book.lines.len(), 4);
}

#[test]
fn works_fund_progress_against_latest_voted_budget() {
    let mut book = Book::new("Fund");
    let ctx = CallerContext::new(Uuid::new_v4(), Uuid::new_v4());
    let residence = ctx.residence_id;
    let budget = BudgetService::create_budget(&mut book, residence, 2025).expect("budget");
    BudgetService::add_line(
        &mut book,
        residence,
        budget,
        "Charges courantes",
        ChargeCategory::Other,
        dec!(100000),
    )
    .expect("line");
    BudgetService::vote(&mut book, residence, budget, &clock()).expect("vote");

    let err = WorksFundService::get_or_create(&mut book, residence, dec!(4.99))
        .expect_err("below legal minimum");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.user_message().contains("legal minimum"));

    WorksFundService::get_or_create(&mut book, residence, dec!(5)).expect("fund");
    let err = WorksFundService::get_or_create(&mut book, residence, dec!(3))
        .expect_err("below legal minimum on an existing fund");
    assert!(err.user_message().contains("legal minimum"));
    assert_eq!(book.works_fund(residence).unwrap().minimum_percentage, dec!(5));
    WorksFundService::contribute(&mut book, residence, ctx.user_id, dec!(3000), &clock())
        .expect("contribute");
    assert!(
        WorksFundService::contribute(&mut book, residence, ctx.user_id, dec!(0), &clock())
            .is_err()
    );

    let status = WorksFundService::status(&book, residence).expect("status");
    assert_eq!(status.required_minimum, dec!(5000));
    assert_eq!(status.progress, dec!(0.6));
    assert!(status.below_minimum);
    assert_eq!(status.reference_fiscal_year, Some(2025));

    let fund = book.works_fund(residence).unwrap();
    assert_eq!(fund.last_contribution_date, Some(date(2025, 6, 1)));
    assert_eq!(fund.contributions.len(), 1);

    assert!(WorksFundService::set_minimum_percentage(&mut book, residence, dec!(3)).is_err());
    WorksFundService::set_minimum_percentage(&mut book, residence, dec!(10)).expect("raise");
    let status = WorksFundService::status(&book, residence).expect("status");
    assert_eq!(status.required_minimum, dec!(10000));
}

#[test]
fn shared_book_rolls_back_failed_transactions() {
    let fx = fixture();
    let (ctx, journal, expense) = (fx.ctx, fx.journal, fx.expense);
    let shared = SharedBook::new(fx.book);

    let result = shared.transact(|book| {
        LedgerService::post_line(
            book,
            &ctx,
            &clock(),
            NewLine::debit(journal, expense, date(2025, 1, 1), "Premier", dec!(10)),
        )?;
        LedgerService::post_line(
            book,
            &ctx,
            &clock(),
            NewLine::debit(journal, expense, date(2025, 1, 1), "Second", dec!(-10)),
        )
    });
    assert!(result.is_err());
    assert_eq!(shared.read(|book| book.lines.len()).expect("read"), 0);

    let handle = shared.clone();
    std::thread::spawn(move || {
        handle
            .transact(|book| {
                LedgerService::post_line(
                    book,
                    &ctx,
                    &clock(),
                    NewLine::debit(journal, expense, date(2025, 1, 2), "Thread", dec!(5)),
                )
            })
            .expect("post from thread");
    })
    .join()
    .expect("join");
    assert_eq!(shared.snapshot().expect("snapshot").lines.len(), 1);
}

#[test]
fn concurrent_budget_edits_keep_the_total_consistent() {
    let mut book = Book::new("Concurrent");
    let residence = Uuid::new_v4();
    let budget = BudgetService::create_budget(&mut book, residence, 2025).expect("budget");
    let shared = SharedBook::new(book);

    let workers: Vec<_> = (1..=8i64)
        .map(|worker| {
            let handle = shared.clone();
            std::thread::spawn(move || {
                for step in 0..10i64 {
                    handle
                        .transact(|book| {
                            let kept = BudgetService::add_line(
                                book,
                                residence,
                                budget,
                                "Conservée",
                                ChargeCategory::Other,
                                Decimal::new(worker * 100 + step, 0),
                            )?;
                            let dropped = BudgetService::add_line(
                                book,
                                residence,
                                budget,
                                "Retirée",
                                ChargeCategory::Other,
                                Decimal::new(worker * 1000 + step, 0),
                            )?;
                            BudgetService::delete_line(book, residence, dropped)?;
                            Ok(kept)
                        })
                        .expect("transaction");
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("join");
    }

    let expected: Decimal = (1..=8i64)
        .flat_map(|worker| (0..10i64).map(move |step| Decimal::new(worker * 100 + step, 0)))
        .sum();
    let (total, lines) = shared
        .read(|book| {
            BudgetService::verify_total(book, budget).expect("no drift");
            (book.budget(budget).unwrap().total_budget, book.budget_lines.len())
        })
        .expect("read");
    assert_eq!(total, expected);
    assert_eq!(lines, 80);
}

#[test]
fn monthly_sums_split_revenue_and_expense() {
    let mut fx = fixture();
    let revenue = LedgerService::create_account(
        &mut fx.book,
        Scope::Global,
        "702",
        "Appels de fonds",
        AccountKind::Revenue,
    )
    .expect("revenue account");
    for input in [
        NewLine::credit(fx.journal, revenue, date(2025, 3, 1), "Appel T1", dec!(500)),
        NewLine::debit(fx.journal, fx.expense, date(2025, 3, 15), "Entretien", dec!(150)),
        NewLine::credit(fx.journal, fx.supplier, date(2025, 3, 15), "Entretien", dec!(150)),
        NewLine::debit(fx.journal, fx.expense, date(2024, 3, 15), "Ancien", dec!(75)),
    ] {
        LedgerService::post_line(&mut fx.book, &fx.ctx, &clock(), input).expect("post");
    }

    let months = ReportingService::monthly_sums(&fx.book, fx.ctx.residence_id, 2025);
    assert_eq!(months.len(), 12);
    assert_eq!(months[2].revenue, dec!(500));
    assert_eq!(months[2].expense, dec!(150));
    assert_eq!(months[2].net(), dec!(350));
    assert!(months[0].revenue.is_zero() && months[0].expense.is_zero());
}

#[test]
fn text_api_parses_amounts_and_codes() {
    let mut fx = fixture();
    let id = api_post_line(
        &mut fx.book,
        &fx.ctx,
        &clock(),
        ApiLineInput {
            journal_code: "ACH",
            account_code: "606",
            date: "2025-03-10",
            label: "Entretien",
            debit: "150,00",
            credit: "",
            category: Some("entretien"),
            ..ApiLineInput::default()
        },
    )
    .expect("post from text");
    let line = fx.book.line(id).unwrap();
    assert_eq!(line.debit, dec!(150));
    assert_eq!(line.category, Some(ChargeCategory::Maintenance));

    let malformed = api_post_line(
        &mut fx.book,
        &fx.ctx,
        &clock(),
        ApiLineInput {
            journal_code: "ACH",
            account_code: "606",
            date: "2025-03-10",
            label: "Entretien",
            debit: "cent",
            ..ApiLineInput::default()
        },
    );
    assert!(matches!(malformed, Err(CoreError::Validation(_))));

    let unknown = api_post_line(
        &mut fx.book,
        &fx.ctx,
        &clock(),
        ApiLineInput {
            journal_code: "BQ",
            account_code: "606",
            date: "2025-03-10",
            label: "Entretien",
            debit: "1",
            ..ApiLineInput::default()
        },
    );
    assert!(matches!(unknown, Err(CoreError::NotFound { .. })));
    assert_eq!(fx.book.lines.len(), 1);
    assert_eq!(parse_optional_amount("  ").expect("blank"), Decimal::ZERO);
}

#[test]
fn warnings_flag_dangling_references() {
    let mut fx = fixture();
    LedgerService::post_line(
        &mut fx.book,
        &fx.ctx,
        &clock(),
        NewLine::debit(fx.journal, fx.expense, date(2025, 1, 1), "x", dec!(1)),
    )
    .expect("post");
    assert!(book_warnings(&fx.book).is_empty());

    fx.book.accounts.retain(|account| account.id != fx.expense);
    let warnings = book_warnings(&fx.book);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("unknown account"));
}
