//! Read-only aggregates and CSV exports.

use std::collections::BTreeMap;

use chrono::Datelike;
use rust_decimal::Decimal;
use uuid::Uuid;

use copro_domain::{
    checked_sum, checked_total, format_amount, AccountKind, Book, CategoryShare, LedgerLine,
    MonthlySummary, ReferenceDirectory, ResidenceId, UNKNOWN_REFERENCE,
};

use crate::{budget_service::BudgetService, CoreError};

pub const LEDGER_CSV_HEADER: [&str; 7] = [
    "Date",
    "Journal code",
    "Account code",
    "Label",
    "Lot number",
    "Debit",
    "Credit",
];

pub const BUDGET_CSV_HEADER: [&str; 4] = ["Category", "Label", "Budgeted", "Actual"];

/// Decimal separator used in exports, where `;` delimits fields.
const EXPORT_DECIMAL_SEPARATOR: char = ',';

pub struct ReportingService;

impl ReportingService {
    /// Revenue and expense per month of `year`, January first.
    pub fn monthly_sums(book: &Book, residence_id: ResidenceId, year: i32) -> Vec<MonthlySummary> {
        let mut months: Vec<MonthlySummary> = (1..=12)
            .map(|month| MonthlySummary {
                year,
                month,
                revenue: Decimal::ZERO,
                expense: Decimal::ZERO,
            })
            .collect();
        for line in book
            .lines
            .iter()
            .filter(|line| line.residence_id == residence_id && line.date.year() == year)
        {
            let Some(account) = book.account(line.account_id) else {
                continue;
            };
            let slot = &mut months[line.date.month0() as usize];
            match account.kind {
                AccountKind::Revenue => slot.revenue += line.credit - line.debit,
                AccountKind::Expense => slot.expense += line.debit - line.credit,
                _ => {}
            }
        }
        months
    }

    /// Budgeted total per category with its share of the whole budget.
    pub fn category_breakdown(
        book: &Book,
        residence_id: ResidenceId,
        budget_id: Uuid,
    ) -> Result<Vec<CategoryShare>, CoreError> {
        BudgetService::scoped_budget(book, residence_id, budget_id)?;
        let mut totals = BTreeMap::new();
        for line in book.lines_of_budget(budget_id) {
            let total = totals.entry(line.category).or_insert(Decimal::ZERO);
            *total = checked_total(*total, line.budgeted_amount)?;
        }
        let grand_total = checked_sum(totals.values().copied())?;
        Ok(totals
            .into_iter()
            .map(|(category, total)| CategoryShare {
                category,
                total,
                ratio: if grand_total.is_zero() {
                    Decimal::ZERO
                } else {
                    total / grand_total
                },
            })
            .collect())
    }

    /// Renders ledger lines as delimited text with the ledger export columns.
    pub fn export_ledger_csv(
        book: &Book,
        lines: &[&LedgerLine],
        directory: &dyn ReferenceDirectory,
        delimiter: u8,
    ) -> Result<String, CoreError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(Vec::new());
        writer.write_record(LEDGER_CSV_HEADER)?;
        for line in lines {
            let journal = book
                .journal(line.journal_id)
                .map_or(UNKNOWN_REFERENCE, |journal| journal.code.as_str());
            let account = book
                .account(line.account_id)
                .map_or(UNKNOWN_REFERENCE, |account| account.code.as_str());
            let lot = line
                .lot_id
                .map(|lot_id| directory.lot(lot_id).to_string())
                .unwrap_or_default();
            writer.write_record([
                line.date.to_string().as_str(),
                journal,
                account,
                line.label.as_str(),
                lot.as_str(),
                export_amount(line.debit).as_str(),
                export_amount(line.credit).as_str(),
            ])?;
        }
        finish(writer)
    }

    /// Renders a budget's lines with their budgeted and actual amounts.
    pub fn export_budget_csv(
        book: &Book,
        residence_id: ResidenceId,
        budget_id: Uuid,
        delimiter: u8,
    ) -> Result<String, CoreError> {
        let groups = BudgetService::group_by_category(book, residence_id, budget_id)?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(Vec::new());
        writer.write_record(BUDGET_CSV_HEADER)?;
        for line in groups.iter().flat_map(|group| group.lines.iter()) {
            let actual = line
                .actual_amount
                .map(|amount| format_amount(amount, EXPORT_DECIMAL_SEPARATOR))
                .unwrap_or_default();
            writer.write_record([
                line.category.label(),
                line.label.as_str(),
                format_amount(line.budgeted_amount, EXPORT_DECIMAL_SEPARATOR).as_str(),
                actual.as_str(),
            ])?;
        }
        finish(writer)
    }
}

/// Zero sides stay blank so only the meaningful column is filled.
fn export_amount(amount: Decimal) -> String {
    if amount.is_zero() {
        String::new()
    } else {
        format_amount(amount, EXPORT_DECIMAL_SEPARATOR)
    }
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, CoreError> {
    let bytes = writer
        .into_inner()
        .map_err(|err| CoreError::Serde(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| CoreError::Serde(err.to_string()))
}
