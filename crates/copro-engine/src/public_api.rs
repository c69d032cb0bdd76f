//! Stable, public-facing helpers that accept raw text input.
//!
//! Frontends (CLI, forms, imports) hand over what the user typed; these helpers
//! parse it, resolve codes within the caller's residence and call the services.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use copro_domain::{parse_amount, AmountError, Book, ChargeCategory, LedgerTotals, ResidenceId};

use crate::{
    budget_service::BudgetService,
    context::CallerContext,
    distribution_service::DistributionService,
    ledger_service::{LedgerService, LineFilter, NewLine},
    time::Clock,
    works_fund_service::WorksFundService,
    CoreError,
};

/// Listing of ledger lines with the totals displayed under it.
#[derive(Debug, Clone)]
pub struct ApiLedgerView {
    pub line_ids: Vec<Uuid>,
    pub totals: LedgerTotals,
}

/// Text input for a single posting.
#[derive(Debug, Clone, Default)]
pub struct ApiLineInput<'a> {
    pub journal_code: &'a str,
    pub account_code: &'a str,
    pub date: &'a str,
    pub label: &'a str,
    pub debit: &'a str,
    pub credit: &'a str,
    pub reference: Option<&'a str>,
    pub category: Option<&'a str>,
    pub lot_id: Option<Uuid>,
    pub idempotency_key: Option<&'a str>,
}

pub fn api_create_book(name: impl Into<String>) -> Book {
    Book::new(name)
}

/// Parses `YYYY-MM-DD`.
pub fn parse_date(text: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|_| CoreError::Validation(format!("`{}` is not a YYYY-MM-DD date", text.trim())))
}

/// Blank input reads as zero; anything else must be a valid amount.
pub fn parse_optional_amount(text: &str) -> Result<Decimal, CoreError> {
    match parse_amount(text) {
        Ok(value) => Ok(value),
        Err(AmountError::Empty) => Ok(Decimal::ZERO),
        Err(err) => Err(err.into()),
    }
}

pub fn parse_category(text: &str) -> Result<ChargeCategory, CoreError> {
    text.parse::<ChargeCategory>().map_err(CoreError::Validation)
}

/// Posts a line from text fields, resolving journal and account codes.
pub fn api_post_line(
    book: &mut Book,
    ctx: &CallerContext,
    clock: &dyn Clock,
    input: ApiLineInput<'_>,
) -> Result<Uuid, CoreError> {
    let debit = parse_optional_amount(input.debit)?;
    let credit = parse_optional_amount(input.credit)?;
    let date = parse_date(input.date)?;
    let category = input.category.map(parse_category).transpose()?;

    let journal_id = LedgerService::find_journal_by_code(book, ctx.residence_id, input.journal_code)
        .map(|journal| journal.id)
        .ok_or_else(|| code_not_found("Journal", input.journal_code))?;
    let account_id = LedgerService::find_account_by_code(book, ctx.residence_id, input.account_code)
        .map(|account| account.id)
        .ok_or_else(|| code_not_found("Account", input.account_code))?;

    let line = NewLine {
        journal_id,
        account_id,
        lot_id: input.lot_id,
        date,
        label: input.label.to_string(),
        debit,
        credit,
        reference: input.reference.map(str::to_string),
        category,
        idempotency_key: input.idempotency_key.map(str::to_string),
    };
    LedgerService::post_line(book, ctx, clock, line).map(|line| line.id)
}

/// Newest lines of the residence with their totals.
pub fn api_ledger_view(
    book: &Book,
    residence_id: ResidenceId,
    filter: &LineFilter,
    limit: usize,
) -> ApiLedgerView {
    let lines = LedgerService::list_lines(book, residence_id, filter, limit);
    ApiLedgerView {
        line_ids: lines.iter().map(|line| line.id).collect(),
        totals: LedgerService::totals(lines),
    }
}

/// Sets a lot's shares under the key with the given code.
pub fn api_set_share(
    book: &mut Book,
    residence_id: ResidenceId,
    key_code: &str,
    lot_id: Uuid,
    shares: &str,
) -> Result<(), CoreError> {
    let key_id = DistributionService::find_key_by_code(book, residence_id, key_code)
        .map(|key| key.id)
        .ok_or_else(|| code_not_found("Distribution key", key_code))?;
    let shares = shares
        .trim()
        .replace(',', ".")
        .parse::<Decimal>()
        .map_err(|_| CoreError::Validation(format!("`{}` is not a number of shares", shares.trim())))?;
    DistributionService::set_share(book, residence_id, key_id, lot_id, shares)
}

/// Adds a budget line to the budget of `fiscal_year`.
pub fn api_add_budget_line(
    book: &mut Book,
    residence_id: ResidenceId,
    fiscal_year: i32,
    label: &str,
    category: &str,
    amount: &str,
) -> Result<Uuid, CoreError> {
    let category = parse_category(category)?;
    let amount = parse_amount(amount)?;
    let budget_id = BudgetService::find_by_year(book, residence_id, fiscal_year)
        .map(|budget| budget.id)
        .ok_or_else(|| code_not_found("Budget", &fiscal_year.to_string()))?;
    BudgetService::add_line(book, residence_id, budget_id, label, category, amount)
}

pub fn api_contribute(
    book: &mut Book,
    ctx: &CallerContext,
    clock: &dyn Clock,
    amount: &str,
) -> Result<Decimal, CoreError> {
    let amount = parse_amount(amount)?;
    WorksFundService::contribute(book, ctx.residence_id, ctx.user_id, amount, clock)
}

fn code_not_found(entity: &'static str, code: &str) -> CoreError {
    CoreError::NotFound {
        entity,
        id: code.trim().to_string(),
    }
}
