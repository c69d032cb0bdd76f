//! Book-wide checks for drift between derived figures and their sources.

use std::collections::BTreeMap;

use tracing::warn;

use copro_domain::Book;

use crate::{budget_service::BudgetService, CoreError};

pub struct IntegrityService;

impl IntegrityService {
    /// Every inconsistency found, as human readable descriptions.
    pub fn issues(book: &Book) -> Vec<String> {
        let mut issues = Vec::new();

        for budget in &book.budgets {
            if let Err(err) = BudgetService::verify_total(book, budget.id) {
                issues.push(err.to_string());
            }
        }

        for reg in &book.regularizations {
            if reg.balance != reg.provisions_total - reg.actual_charges {
                issues.push(format!(
                    "regularization {} balance {} differs from provisions {} minus charges {}",
                    reg.id, reg.balance, reg.provisions_total, reg.actual_charges
                ));
            }
        }

        let mut mains: BTreeMap<_, usize> = BTreeMap::new();
        for account in &book.bank_accounts {
            *mains.entry(account.residence_id).or_default() += usize::from(account.is_main);
        }
        for (residence_id, count) in mains {
            if count != 1 {
                issues.push(format!(
                    "residence {residence_id} has {count} main bank accounts"
                ));
            }
        }

        issues
    }

    /// Fails with a consistency error listing every issue. Nothing is corrected.
    pub fn verify(book: &Book) -> Result<(), CoreError> {
        let issues = Self::issues(book);
        if issues.is_empty() {
            return Ok(());
        }
        for issue in &issues {
            warn!(book = %book.name, %issue, "integrity issue");
        }
        Err(CoreError::Consistency(issues.join("; ")))
    }
}
