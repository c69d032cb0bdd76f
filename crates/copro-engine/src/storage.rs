use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use copro_domain::Book;

use crate::CoreError;

/// Describes a persisted backup artifact for a book.
#[derive(Debug, Clone)]
pub struct BookBackupInfo {
    pub book: String,
    pub id: String,
    pub created_at: String,
    pub note: Option<String>,
    pub path: PathBuf,
}

/// Abstraction over persistence backends capable of storing books and backups.
///
/// `save_book` bumps the book's revision and fails with a conflict when the
/// stored copy is newer than the one being saved.
pub trait BookStorage: Send + Sync {
    fn save_book(&self, name: &str, book: &mut Book) -> Result<(), CoreError>;
    fn load_book(&self, name: &str) -> Result<Book, CoreError>;
    fn list_books(&self) -> Result<Vec<String>, CoreError>;
    fn delete_book(&self, name: &str) -> Result<(), CoreError>;
    fn save_book_to_path(&self, book: &Book, path: &Path) -> Result<(), CoreError>;
    fn load_book_from_path(&self, path: &Path) -> Result<Book, CoreError>;
    fn backup_book(
        &self,
        name: &str,
        book: &Book,
        note: Option<&str>,
    ) -> Result<BookBackupInfo, CoreError>;
    fn list_backups(&self, name: &str) -> Result<Vec<BookBackupInfo>, CoreError>;
    fn restore_backup(&self, backup: &BookBackupInfo) -> Result<Book, CoreError>;
}

/// Detects dangling references within a book snapshot.
pub fn book_warnings(book: &Book) -> Vec<String> {
    let account_ids: HashSet<_> = book.accounts.iter().map(|a| a.id).collect();
    let journal_ids: HashSet<_> = book.journals.iter().map(|j| j.id).collect();
    let key_ids: HashSet<_> = book.keys.iter().map(|k| k.id).collect();
    let budget_ids: HashSet<_> = book.budgets.iter().map(|b| b.id).collect();
    let bank_ids: HashSet<_> = book.bank_accounts.iter().map(|b| b.id).collect();
    let line_ids: HashSet<_> = book.lines.iter().map(|l| l.id).collect();
    let mut warnings = Vec::new();

    for line in &book.lines {
        if !account_ids.contains(&line.account_id) {
            warnings.push(format!(
                "ledger line {} references unknown account {}",
                line.id, line.account_id
            ));
        }
        if !journal_ids.contains(&line.journal_id) {
            warnings.push(format!(
                "ledger line {} references unknown journal {}",
                line.id, line.journal_id
            ));
        }
        if let Some(original) = line.reverses {
            if !line_ids.contains(&original) {
                warnings.push(format!(
                    "ledger line {} reverses missing line {}",
                    line.id, original
                ));
            }
        }
    }
    for share in &book.shares {
        if !key_ids.contains(&share.key_id) {
            warnings.push(format!(
                "lot share {} references unknown key {}",
                share.id, share.key_id
            ));
        }
    }
    for line in &book.budget_lines {
        if !budget_ids.contains(&line.budget_id) {
            warnings.push(format!(
                "budget line {} references unknown budget {}",
                line.id, line.budget_id
            ));
        }
        if let Some(key) = line.distribution_key_id {
            if !key_ids.contains(&key) {
                warnings.push(format!(
                    "budget line {} references missing key {}",
                    line.id, key
                ));
            }
        }
    }
    for txn in &book.bank_transactions {
        if !bank_ids.contains(&txn.bank_account_id) {
            warnings.push(format!(
                "bank transaction {} references unknown bank account {}",
                txn.id, txn.bank_account_id
            ));
        }
    }
    warnings
}
