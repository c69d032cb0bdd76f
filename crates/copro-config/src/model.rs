use std::path::PathBuf;

use copro_domain::LEGAL_MINIMUM_PERCENTAGE;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Stores user-configurable preferences for the CLI and the services it drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub locale: String,
    pub currency: String,
    #[serde(default = "Config::default_page_size")]
    pub page_size: usize,
    #[serde(default = "Config::default_reconciliation_window_days")]
    pub reconciliation_window_days: i64,
    #[serde(default = "Config::default_works_fund_minimum_percentage")]
    pub works_fund_minimum_percentage: Decimal,
    #[serde(default = "Config::default_csv_delimiter")]
    pub csv_delimiter: char,
    #[serde(default = "Config::default_backup_retention")]
    pub backup_retention: usize,
    #[serde(default = "Config::default_ui_color_enabled")]
    pub ui_color_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_opened_book: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    /// Optional custom root directory for books. Defaults to `<home>/books`.
    pub default_book_root: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    /// Optional custom root directory for backups. Defaults to `<home>/backups`.
    pub default_backup_root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locale: "fr-FR".into(),
            currency: "EUR".into(),
            page_size: Self::default_page_size(),
            reconciliation_window_days: Self::default_reconciliation_window_days(),
            works_fund_minimum_percentage: Self::default_works_fund_minimum_percentage(),
            csv_delimiter: Self::default_csv_delimiter(),
            backup_retention: Self::default_backup_retention(),
            ui_color_enabled: Self::default_ui_color_enabled(),
            last_opened_book: None,
            default_book_root: None,
            default_backup_root: None,
        }
    }
}

impl Config {
    pub fn default_page_size() -> usize {
        100
    }

    pub fn default_reconciliation_window_days() -> i64 {
        5
    }

    pub fn default_works_fund_minimum_percentage() -> Decimal {
        LEGAL_MINIMUM_PERCENTAGE
    }

    pub fn default_csv_delimiter() -> char {
        ';'
    }

    pub fn default_backup_retention() -> usize {
        5
    }

    pub fn default_ui_color_enabled() -> bool {
        true
    }

    /// Rejects settings the services would refuse later on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".into()));
        }
        if self.reconciliation_window_days < 0 {
            return Err(ConfigError::Invalid(
                "reconciliation_window_days cannot be negative".into(),
            ));
        }
        if self.works_fund_minimum_percentage < LEGAL_MINIMUM_PERCENTAGE {
            return Err(ConfigError::Invalid(format!(
                "works_fund_minimum_percentage must be at least {LEGAL_MINIMUM_PERCENTAGE}"
            )));
        }
        if matches!(self.csv_delimiter, ',' | '.') || !self.csv_delimiter.is_ascii() {
            return Err(ConfigError::Invalid(format!(
                "csv_delimiter `{}` clashes with amounts or is not ASCII",
                self.csv_delimiter
            )));
        }
        if self.backup_retention == 0 {
            return Err(ConfigError::Invalid(
                "backup_retention must keep at least one backup".into(),
            ));
        }
        Ok(())
    }

    /// Delimiter as the byte expected by the CSV writer.
    pub fn csv_delimiter_byte(&self) -> u8 {
        if self.csv_delimiter.is_ascii() {
            self.csv_delimiter as u8
        } else {
            b';'
        }
    }

    pub fn resolve_book_root(&self, home: &std::path::Path) -> PathBuf {
        self.default_book_root
            .clone()
            .unwrap_or_else(|| home.join("books"))
    }

    pub fn resolve_backup_root(&self, home: &std::path::Path) -> PathBuf {
        self.default_backup_root
            .clone()
            .unwrap_or_else(|| home.join("backups"))
    }
}
