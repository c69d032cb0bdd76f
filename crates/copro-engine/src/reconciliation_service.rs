//! Bank accounts, statement movements and manual reconciliation against the ledger.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use copro_domain::{
    checked_total, ensure_money_scale, normalize_iban, BankAccount, BankTransaction, Book,
    LedgerLine, ResidenceId,
};

use crate::{ledger_service::required, time::Clock, CoreError};

/// A ledger line proposed for a bank movement, closest dates first.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub line_id: Uuid,
    pub date: NaiveDate,
    pub label: String,
    pub amount: Decimal,
    pub days_apart: i64,
}

pub struct ReconciliationService;

impl ReconciliationService {
    /// Registers a bank account; the residence's first account becomes its main one.
    pub fn create_bank_account(
        book: &mut Book,
        residence_id: ResidenceId,
        label: &str,
        iban: &str,
        bic: &str,
        opening_balance: Decimal,
        clock: &dyn Clock,
    ) -> Result<Uuid, CoreError> {
        let label = required("label", label)?;
        let iban = normalize_iban(iban)?;
        let bic = required("BIC", bic)?.to_uppercase();
        if !(bic.len() == 8 || bic.len() == 11) || !bic.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(CoreError::Validation(format!(
                "BIC `{bic}` must have 8 or 11 letters or digits"
            )));
        }
        if book
            .bank_accounts
            .iter()
            .any(|account| account.residence_id == residence_id && account.iban == iban)
        {
            return Err(CoreError::Conflict(
                "this IBAN is already registered for the residence".into(),
            ));
        }
        let is_main = !book
            .bank_accounts
            .iter()
            .any(|account| account.residence_id == residence_id);
        let account = BankAccount {
            id: Uuid::new_v4(),
            residence_id,
            label,
            iban,
            bic,
            balance: ensure_money_scale(opening_balance)?,
            is_main,
            created_at: clock.now(),
        };
        let id = account.id;
        info!(bank_account_id = %id, %residence_id, is_main, "bank account created");
        book.bank_accounts.push(account);
        book.touch();
        Ok(id)
    }

    pub fn list_accounts(book: &Book, residence_id: ResidenceId) -> Vec<&BankAccount> {
        book.bank_accounts
            .iter()
            .filter(|account| account.residence_id == residence_id)
            .collect()
    }

    /// Makes `account_id` the only main account of its residence.
    pub fn set_main(
        book: &mut Book,
        residence_id: ResidenceId,
        account_id: Uuid,
    ) -> Result<(), CoreError> {
        Self::scoped_account(book, residence_id, account_id)?;
        for account in book
            .bank_accounts
            .iter_mut()
            .filter(|account| account.residence_id == residence_id)
        {
            account.is_main = account.id == account_id;
        }
        info!(bank_account_id = %account_id, "main bank account changed");
        book.touch();
        Ok(())
    }

    /// Imports one statement movement and applies it to the account's balance.
    pub fn record_transaction(
        book: &mut Book,
        residence_id: ResidenceId,
        account_id: Uuid,
        date: NaiveDate,
        label: &str,
        counterparty: Option<String>,
        amount: Decimal,
    ) -> Result<Uuid, CoreError> {
        Self::scoped_account(book, residence_id, account_id)?;
        let label = required("label", label)?;
        if amount.is_zero() {
            return Err(CoreError::Validation("amount must not be zero".into()));
        }
        let amount = ensure_money_scale(amount)?;
        let counterparty = counterparty
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        let txn = BankTransaction::new(account_id, date, label, counterparty, amount);
        let id = txn.id;
        if let Some(account) = book.bank_account_mut(account_id) {
            account.balance = checked_total(account.balance, amount)?;
        }
        info!(bank_transaction_id = %id, bank_account_id = %account_id, %amount, "bank movement recorded");
        book.bank_transactions.push(txn);
        book.touch();
        Ok(id)
    }

    /// Unreconciled movements across all accounts of the residence, newest first.
    pub fn list_pending(book: &Book, residence_id: ResidenceId) -> Vec<&BankTransaction> {
        let mut pending: Vec<_> = book
            .bank_transactions
            .iter()
            .filter(|txn| !txn.is_reconciled && Self::belongs_to(book, residence_id, txn))
            .collect();
        pending.sort_by(|a, b| b.date.cmp(&a.date));
        pending
    }

    /// Marks every id as reconciled. Already reconciled ids are left untouched and
    /// nothing changes unless every id belongs to the residence.
    pub fn reconcile(
        book: &mut Book,
        residence_id: ResidenceId,
        transaction_ids: &[Uuid],
        clock: &dyn Clock,
    ) -> Result<usize, CoreError> {
        for id in transaction_ids {
            Self::scoped_transaction(book, residence_id, *id)?;
        }
        let now = clock.now();
        let mut changed = 0;
        for txn in book
            .bank_transactions
            .iter_mut()
            .filter(|txn| transaction_ids.contains(&txn.id) && !txn.is_reconciled)
        {
            txn.is_reconciled = true;
            txn.reconciled_at = Some(now);
            changed += 1;
        }
        if changed > 0 {
            info!(%residence_id, changed, "bank movements reconciled");
            book.touch();
        }
        Ok(changed)
    }

    /// Ledger lines whose amount equals the movement's and whose date lies within
    /// `window_days`, closest first. Purely advisory.
    pub fn candidates(
        book: &Book,
        residence_id: ResidenceId,
        transaction_id: Uuid,
        window_days: i64,
    ) -> Result<Vec<MatchCandidate>, CoreError> {
        let txn = Self::scoped_transaction(book, residence_id, transaction_id)?;
        let target = txn.amount.abs();
        let mut candidates: Vec<MatchCandidate> = book
            .lines
            .iter()
            .filter(|line| line.residence_id == residence_id && line.amount() == target)
            .filter_map(|line| {
                let days_apart = (line.date - txn.date).num_days().abs();
                (days_apart <= window_days).then(|| MatchCandidate {
                    line_id: line.id,
                    date: line.date,
                    label: line.label.clone(),
                    amount: line.amount(),
                    days_apart,
                })
            })
            .collect();
        candidates.sort_by(|a, b| a.days_apart.cmp(&b.days_apart).then(a.date.cmp(&b.date)));
        Ok(candidates)
    }

    /// Reconciles a movement against a ledger line chosen by the operator.
    pub fn confirm_match(
        book: &mut Book,
        residence_id: ResidenceId,
        transaction_id: Uuid,
        line_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), CoreError> {
        let txn = Self::scoped_transaction(book, residence_id, transaction_id)?;
        if txn.is_reconciled {
            return Err(CoreError::Conflict(
                "bank movement is already reconciled".into(),
            ));
        }
        let descriptor = book
            .line(line_id)
            .filter(|line| line.residence_id == residence_id)
            .map(Self::describe)
            .ok_or_else(|| CoreError::not_found("Ledger line", line_id))?;

        if let Some(txn) = book
            .bank_transactions
            .iter_mut()
            .find(|txn| txn.id == transaction_id)
        {
            txn.is_reconciled = true;
            txn.reconciled_at = Some(clock.now());
            txn.reconciled_with = Some(descriptor);
        }
        info!(bank_transaction_id = %transaction_id, %line_id, "bank movement matched");
        book.touch();
        Ok(())
    }

    fn describe(line: &LedgerLine) -> String {
        match line.reference.as_deref() {
            Some(reference) => format!("{} {} ({reference}) [{}]", line.date, line.label, line.id),
            None => format!("{} {} [{}]", line.date, line.label, line.id),
        }
    }

    fn belongs_to(book: &Book, residence_id: ResidenceId, txn: &BankTransaction) -> bool {
        book.bank_account(txn.bank_account_id)
            .map(|account| account.residence_id == residence_id)
            .unwrap_or(false)
    }

    fn scoped_account<'a>(
        book: &'a Book,
        residence_id: ResidenceId,
        account_id: Uuid,
    ) -> Result<&'a BankAccount, CoreError> {
        book.bank_account(account_id)
            .filter(|account| account.residence_id == residence_id)
            .ok_or_else(|| CoreError::not_found("Bank account", account_id))
    }

    fn scoped_transaction<'a>(
        book: &'a Book,
        residence_id: ResidenceId,
        transaction_id: Uuid,
    ) -> Result<&'a BankTransaction, CoreError> {
        book.bank_transaction(transaction_id)
            .filter(|txn| Self::belongs_to(book, residence_id, txn))
            .ok_or_else(|| CoreError::not_found("Bank transaction", transaction_id))
    }
}
