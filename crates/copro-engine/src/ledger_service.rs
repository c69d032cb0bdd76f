//! Chart of accounts, journals and the append-only double-entry ledger.

use std::collections::HashSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use copro_domain::{
    checked_sum, ensure_money_scale, Account, AccountKind, Book, ChargeCategory, DateRange,
    Journal, LedgerLine, LedgerTotals, LotId, ResidenceId, Scope,
};

use crate::{context::CallerContext, time::Clock, CoreError};

/// Default cap on the number of lines returned by a listing.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Caller input for one posting.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLine {
    pub journal_id: Uuid,
    pub account_id: Uuid,
    pub lot_id: Option<LotId>,
    pub date: NaiveDate,
    pub label: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub reference: Option<String>,
    pub category: Option<ChargeCategory>,
    pub idempotency_key: Option<String>,
}

impl NewLine {
    pub fn debit(
        journal_id: Uuid,
        account_id: Uuid,
        date: NaiveDate,
        label: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            journal_id,
            account_id,
            lot_id: None,
            date,
            label: label.into(),
            debit: amount,
            credit: Decimal::ZERO,
            reference: None,
            category: None,
            idempotency_key: None,
        }
    }

    pub fn credit(
        journal_id: Uuid,
        account_id: Uuid,
        date: NaiveDate,
        label: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            debit: Decimal::ZERO,
            credit: amount,
            ..Self::debit(journal_id, account_id, date, label, Decimal::ZERO)
        }
    }

    pub fn with_lot(mut self, lot_id: LotId) -> Self {
        self.lot_id = Some(lot_id);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_category(mut self, category: ChargeCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Optional criteria for [`LedgerService::list_lines`].
#[derive(Debug, Clone, Default)]
pub struct LineFilter {
    pub journal_id: Option<Uuid>,
    pub account_id: Option<Uuid>,
    pub range: Option<DateRange>,
    /// Case-insensitive text matched against label, reference and account code.
    pub search: Option<String>,
}

pub struct LedgerService;

impl LedgerService {
    /// Adds a chart-of-accounts entry. Codes are unique within a scope.
    pub fn create_account(
        book: &mut Book,
        scope: Scope,
        code: &str,
        name: &str,
        kind: AccountKind,
    ) -> Result<Uuid, CoreError> {
        let code = required("account code", code)?;
        let name = required("account name", name)?;
        if book
            .accounts
            .iter()
            .any(|account| account.scope == scope && account.code.eq_ignore_ascii_case(&code))
        {
            return Err(CoreError::Conflict(format!(
                "account code `{code}` already exists"
            )));
        }
        let account = Account::new(scope, code, name, kind);
        let id = account.id;
        info!(account_id = %id, code = %account.code, %scope, "account created");
        book.accounts.push(account);
        book.touch();
        Ok(id)
    }

    /// Renames an account. Code and kind stay fixed once created.
    pub fn rename_account(
        book: &mut Book,
        ctx: &CallerContext,
        account_id: Uuid,
        name: &str,
    ) -> Result<(), CoreError> {
        let name = required("account name", name)?;
        let account = book
            .account_mut(account_id)
            .filter(|account| account.scope.is_visible_from(ctx.residence_id))
            .ok_or_else(|| CoreError::not_found("Account", account_id))?;
        account.name = name;
        book.touch();
        Ok(())
    }

    pub fn create_journal(
        book: &mut Book,
        scope: Scope,
        code: &str,
        name: &str,
    ) -> Result<Uuid, CoreError> {
        let code = required("journal code", code)?.to_uppercase();
        let name = required("journal name", name)?;
        if book
            .journals
            .iter()
            .any(|journal| journal.scope == scope && journal.code == code)
        {
            return Err(CoreError::Conflict(format!(
                "journal code `{code}` already exists"
            )));
        }
        let journal = Journal::new(scope, code, name);
        let id = journal.id;
        info!(journal_id = %id, code = %journal.code, %scope, "journal created");
        book.journals.push(journal);
        book.touch();
        Ok(id)
    }

    /// Accounts usable from `residence_id`: global ones plus the residence's own.
    pub fn accessible_accounts(book: &Book, residence_id: ResidenceId) -> Vec<&Account> {
        let mut accounts: Vec<_> = book
            .accounts
            .iter()
            .filter(|account| account.scope.is_visible_from(residence_id))
            .collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        accounts
    }

    pub fn accessible_journals(book: &Book, residence_id: ResidenceId) -> Vec<&Journal> {
        let mut journals: Vec<_> = book
            .journals
            .iter()
            .filter(|journal| journal.scope.is_visible_from(residence_id))
            .collect();
        journals.sort_by(|a, b| a.code.cmp(&b.code));
        journals
    }

    /// Looks an account up by code, preferring the residence's own over a global one.
    pub fn find_account_by_code<'a>(
        book: &'a Book,
        residence_id: ResidenceId,
        code: &str,
    ) -> Option<&'a Account> {
        let code = code.trim();
        let mut matches = book.accounts.iter().filter(|account| {
            account.scope.is_visible_from(residence_id) && account.code.eq_ignore_ascii_case(code)
        });
        let first = matches.next()?;
        if first.scope == Scope::Global {
            Some(matches.next().unwrap_or(first))
        } else {
            Some(first)
        }
    }

    pub fn find_journal_by_code<'a>(
        book: &'a Book,
        residence_id: ResidenceId,
        code: &str,
    ) -> Option<&'a Journal> {
        let code = code.trim().to_uppercase();
        let mut matches = book
            .journals
            .iter()
            .filter(|journal| journal.scope.is_visible_from(residence_id) && journal.code == code);
        let first = matches.next()?;
        if first.scope == Scope::Global {
            Some(matches.next().unwrap_or(first))
        } else {
            Some(first)
        }
    }

    /// Posts a single line into the caller's residence.
    ///
    /// A line already posted with the same idempotency key is returned as is.
    pub fn post_line(
        book: &mut Book,
        ctx: &CallerContext,
        clock: &dyn Clock,
        input: NewLine,
    ) -> Result<LedgerLine, CoreError> {
        if let Some(existing) = input
            .idempotency_key
            .as_deref()
            .and_then(|key| Self::line_by_idempotency_key(book, ctx.residence_id, key))
        {
            return Ok(existing.clone());
        }
        let line = Self::prepare(book, ctx, clock, input)?;
        info!(
            line_id = %line.id,
            residence_id = %line.residence_id,
            debit = %line.debit,
            credit = %line.credit,
            "ledger line posted"
        );
        book.lines.push(line.clone());
        book.touch();
        Ok(line)
    }

    /// Posts a balanced multi-line entry. Either every line is written or none.
    pub fn post_entry(
        book: &mut Book,
        ctx: &CallerContext,
        clock: &dyn Clock,
        inputs: Vec<NewLine>,
    ) -> Result<Vec<LedgerLine>, CoreError> {
        if inputs.len() < 2 {
            return Err(CoreError::Validation(
                "an entry needs at least two lines".into(),
            ));
        }

        let keys: Vec<&str> = inputs
            .iter()
            .filter_map(|input| input.idempotency_key.as_deref())
            .collect();
        if !keys.is_empty() && keys.len() != inputs.len() {
            return Err(CoreError::Validation(
                "either every line of an entry carries an idempotency key or none does".into(),
            ));
        }
        let unique: HashSet<&str> = keys.iter().copied().collect();
        if unique.len() != keys.len() {
            return Err(CoreError::Validation(
                "idempotency keys must be unique within an entry".into(),
            ));
        }
        if !keys.is_empty() {
            let existing: Vec<LedgerLine> = keys
                .iter()
                .filter_map(|key| Self::line_by_idempotency_key(book, ctx.residence_id, key))
                .cloned()
                .collect();
            if existing.len() == inputs.len() {
                return Ok(existing);
            }
            if !existing.is_empty() {
                return Err(CoreError::Conflict(
                    "entry was partially posted under the same idempotency keys".into(),
                ));
            }
        }

        let lines = inputs
            .into_iter()
            .map(|input| Self::prepare(book, ctx, clock, input))
            .collect::<Result<Vec<_>, _>>()?;
        let totals = LedgerTotals::of(&lines);
        if !totals.is_balanced() {
            return Err(CoreError::Validation(format!(
                "entry is not balanced: debit {} / credit {}",
                totals.total_debit, totals.total_credit
            )));
        }

        info!(
            residence_id = %ctx.residence_id,
            lines = lines.len(),
            amount = %totals.total_debit,
            "ledger entry posted"
        );
        book.lines.extend(lines.iter().cloned());
        book.touch();
        Ok(lines)
    }

    /// Appends a line cancelling `line_id`. A line is reversed at most once.
    pub fn reverse_line(
        book: &mut Book,
        ctx: &CallerContext,
        clock: &dyn Clock,
        line_id: Uuid,
        date: NaiveDate,
    ) -> Result<LedgerLine, CoreError> {
        let original = book
            .line(line_id)
            .filter(|line| line.residence_id == ctx.residence_id)
            .ok_or_else(|| CoreError::not_found("Ledger line", line_id))?;
        if original.is_reversal() {
            return Err(CoreError::Conflict(
                "a reversing line cannot itself be reversed".into(),
            ));
        }
        if book.lines.iter().any(|line| line.reverses == Some(line_id)) {
            return Err(CoreError::Conflict("line has already been reversed".into()));
        }

        let reversal = LedgerLine {
            id: Uuid::new_v4(),
            date,
            label: format!("Reversal: {}", original.label),
            debit: original.credit,
            credit: original.debit,
            reverses: Some(line_id),
            idempotency_key: None,
            created_by: ctx.user_id,
            created_at: clock.now(),
            ..original.clone()
        };
        info!(line_id = %reversal.id, reverses = %line_id, "ledger line reversed");
        book.lines.push(reversal.clone());
        book.touch();
        Ok(reversal)
    }

    /// Lines of a residence, newest first, capped at `limit` after filtering.
    pub fn list_lines<'a>(
        book: &'a Book,
        residence_id: ResidenceId,
        filter: &LineFilter,
        limit: usize,
    ) -> Vec<&'a LedgerLine> {
        let needle = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|needle| !needle.is_empty())
            .map(str::to_lowercase);

        let mut lines: Vec<&LedgerLine> = book
            .lines
            .iter()
            .filter(|line| line.residence_id == residence_id)
            .filter(|line| filter.journal_id.map_or(true, |id| line.journal_id == id))
            .filter(|line| filter.account_id.map_or(true, |id| line.account_id == id))
            .filter(|line| filter.range.map_or(true, |range| range.contains(line.date)))
            .filter(|line| match needle.as_deref() {
                None => true,
                Some(needle) => {
                    line.matches_text(needle)
                        || book
                            .account(line.account_id)
                            .map(|account| account.code.to_lowercase().contains(needle))
                            .unwrap_or(false)
                }
            })
            .collect();
        lines.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        lines.truncate(limit);
        lines
    }

    pub fn totals<'a, I>(lines: I) -> LedgerTotals
    where
        I: IntoIterator<Item = &'a LedgerLine>,
    {
        LedgerTotals::of(lines)
    }

    /// Σdebit − Σcredit of the residence's lines on `account_id`.
    pub fn account_balance(
        book: &Book,
        residence_id: ResidenceId,
        account_id: Uuid,
    ) -> Result<Decimal, CoreError> {
        book.account(account_id)
            .filter(|account| account.scope.is_visible_from(residence_id))
            .ok_or_else(|| CoreError::not_found("Account", account_id))?;
        Ok(checked_sum(
            book.lines
                .iter()
                .filter(|line| line.residence_id == residence_id && line.account_id == account_id)
                .map(LedgerLine::net),
        )?)
    }

    fn line_by_idempotency_key<'a>(
        book: &'a Book,
        residence_id: ResidenceId,
        key: &str,
    ) -> Option<&'a LedgerLine> {
        book.lines.iter().find(|line| {
            line.residence_id == residence_id && line.idempotency_key.as_deref() == Some(key)
        })
    }

    /// Validates an input and builds the line without touching the book.
    fn prepare(
        book: &Book,
        ctx: &CallerContext,
        clock: &dyn Clock,
        input: NewLine,
    ) -> Result<LedgerLine, CoreError> {
        let (debit, credit) = validate_sides(input.debit, input.credit)?;
        let label = required("label", &input.label)?;

        book.journal(input.journal_id)
            .filter(|journal| journal.scope.is_visible_from(ctx.residence_id))
            .ok_or_else(|| CoreError::not_found("Journal", input.journal_id))?;
        book.account(input.account_id)
            .filter(|account| account.scope.is_visible_from(ctx.residence_id))
            .ok_or_else(|| CoreError::not_found("Account", input.account_id))?;

        Ok(LedgerLine {
            id: Uuid::new_v4(),
            residence_id: ctx.residence_id,
            journal_id: input.journal_id,
            account_id: input.account_id,
            lot_id: input.lot_id,
            date: input.date,
            label,
            reference: input
                .reference
                .map(|reference| reference.trim().to_string())
                .filter(|reference| !reference.is_empty()),
            debit,
            credit,
            category: input.category,
            reverses: None,
            idempotency_key: input.idempotency_key,
            created_by: ctx.user_id,
            created_at: clock.now(),
        })
    }
}

/// Exactly one side must be non-zero, neither negative, both at cent precision.
pub(crate) fn validate_sides(
    debit: Decimal,
    credit: Decimal,
) -> Result<(Decimal, Decimal), CoreError> {
    if debit.is_sign_negative() && !debit.is_zero() || credit.is_sign_negative() && !credit.is_zero()
    {
        return Err(CoreError::Validation(
            "debit and credit must not be negative".into(),
        ));
    }
    match (debit.is_zero(), credit.is_zero()) {
        (true, true) => Err(CoreError::Validation(
            "either debit or credit must be non-zero".into(),
        )),
        (false, false) => Err(CoreError::Validation(
            "a line carries either a debit or a credit, not both".into(),
        )),
        _ => Ok((ensure_money_scale(debit)?, ensure_money_scale(credit)?)),
    }
}

pub(crate) fn required(field: &str, value: &str) -> Result<String, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CoreError::Validation(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}
