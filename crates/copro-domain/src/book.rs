//! The `Book` aggregate: every accounting record of the residences managed by one agency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    account::Account,
    bank::{BankAccount, BankTransaction},
    budget::{Budget, BudgetLine},
    common::ResidenceId,
    directory::DirectorySnapshot,
    distribution::{DistributionKey, LotShare},
    journal::Journal,
    ledger_line::LedgerLine,
    regularization::Regularization,
    works_fund::WorksFund,
};

pub const CURRENT_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Book {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub journals: Vec<Journal>,
    #[serde(default)]
    pub lines: Vec<LedgerLine>,
    #[serde(default)]
    pub keys: Vec<DistributionKey>,
    #[serde(default)]
    pub shares: Vec<LotShare>,
    #[serde(default)]
    pub budgets: Vec<Budget>,
    #[serde(default)]
    pub budget_lines: Vec<BudgetLine>,
    #[serde(default)]
    pub regularizations: Vec<Regularization>,
    #[serde(default)]
    pub bank_accounts: Vec<BankAccount>,
    #[serde(default)]
    pub bank_transactions: Vec<BankTransaction>,
    #[serde(default)]
    pub works_funds: Vec<WorksFund>,
    #[serde(default)]
    pub directory: DirectorySnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "Book::schema_version_default")]
    pub schema_version: u8,
    /// Incremented by storage on every successful save.
    #[serde(default)]
    pub revision: u64,
}

impl Book {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            accounts: Vec::new(),
            journals: Vec::new(),
            lines: Vec::new(),
            keys: Vec::new(),
            shares: Vec::new(),
            budgets: Vec::new(),
            budget_lines: Vec::new(),
            regularizations: Vec::new(),
            bank_accounts: Vec::new(),
            bank_transactions: Vec::new(),
            works_funds: Vec::new(),
            directory: DirectorySnapshot::default(),
            created_at: now,
            updated_at: now,
            schema_version: CURRENT_SCHEMA_VERSION,
            revision: 0,
        }
    }

    pub fn account(&self, id: Uuid) -> Option<&Account> {
        self.accounts.iter().find(|account| account.id == id)
    }

    pub fn account_mut(&mut self, id: Uuid) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|account| account.id == id)
    }

    pub fn journal(&self, id: Uuid) -> Option<&Journal> {
        self.journals.iter().find(|journal| journal.id == id)
    }

    pub fn line(&self, id: Uuid) -> Option<&LedgerLine> {
        self.lines.iter().find(|line| line.id == id)
    }

    pub fn key(&self, id: Uuid) -> Option<&DistributionKey> {
        self.keys.iter().find(|key| key.id == id)
    }

    pub fn budget(&self, id: Uuid) -> Option<&Budget> {
        self.budgets.iter().find(|budget| budget.id == id)
    }

    pub fn budget_mut(&mut self, id: Uuid) -> Option<&mut Budget> {
        self.budgets.iter_mut().find(|budget| budget.id == id)
    }

    pub fn budget_line(&self, id: Uuid) -> Option<&BudgetLine> {
        self.budget_lines.iter().find(|line| line.id == id)
    }

    pub fn lines_of_budget(&self, budget_id: Uuid) -> impl Iterator<Item = &BudgetLine> {
        self.budget_lines
            .iter()
            .filter(move |line| line.budget_id == budget_id)
    }

    pub fn regularization(&self, id: Uuid) -> Option<&Regularization> {
        self.regularizations.iter().find(|reg| reg.id == id)
    }

    pub fn regularization_mut(&mut self, id: Uuid) -> Option<&mut Regularization> {
        self.regularizations.iter_mut().find(|reg| reg.id == id)
    }

    pub fn bank_account(&self, id: Uuid) -> Option<&BankAccount> {
        self.bank_accounts.iter().find(|account| account.id == id)
    }

    pub fn bank_account_mut(&mut self, id: Uuid) -> Option<&mut BankAccount> {
        self.bank_accounts.iter_mut().find(|account| account.id == id)
    }

    pub fn bank_transaction(&self, id: Uuid) -> Option<&BankTransaction> {
        self.bank_transactions.iter().find(|txn| txn.id == id)
    }

    pub fn works_fund(&self, residence_id: ResidenceId) -> Option<&WorksFund> {
        self.works_funds
            .iter()
            .find(|fund| fund.residence_id == residence_id)
    }

    pub fn works_fund_mut(&mut self, residence_id: ResidenceId) -> Option<&mut WorksFund> {
        self.works_funds
            .iter_mut()
            .find(|fund| fund.residence_id == residence_id)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn schema_version_default() -> u8 {
        CURRENT_SCHEMA_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_round_trips_through_json_with_defaults() {
        let book = Book::new("Agence Centre");
        let json = serde_json::to_string(&book).unwrap();
        let restored: Book = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, book);

        let minimal = format!(
            r#"{{"id":"{}","name":"Legacy","created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"}}"#,
            Uuid::new_v4()
        );
        let legacy: Book = serde_json::from_str(&minimal).unwrap();
        assert_eq!(legacy.schema_version, CURRENT_SCHEMA_VERSION);
        assert!(legacy.lines.is_empty());
        assert_eq!(legacy.revision, 0);
    }
}
