//! Ledger postings and their debit/credit totals.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{budget::ChargeCategory, common::*};

/// One append-only posting. Corrections go through reversing lines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerLine {
    pub id: Uuid,
    pub residence_id: ResidenceId,
    pub journal_id: Uuid,
    pub account_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_id: Option<LotId>,
    pub date: NaiveDate,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub debit: Decimal,
    pub credit: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ChargeCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverses: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl LedgerLine {
    /// Which side of the entry carries the amount.
    pub fn side(&self) -> LineSide {
        if self.debit.is_zero() {
            LineSide::Credit
        } else {
            LineSide::Debit
        }
    }

    /// The non-zero amount of the line.
    pub fn amount(&self) -> Decimal {
        match self.side() {
            LineSide::Debit => self.debit,
            LineSide::Credit => self.credit,
        }
    }

    /// Signed effect on the account balance: debit minus credit.
    pub fn net(&self) -> Decimal {
        self.debit - self.credit
    }

    pub fn is_reversal(&self) -> bool {
        self.reverses.is_some()
    }

    /// Case-insensitive match against label and reference.
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.label.to_lowercase().contains(&needle)
            || self
                .reference
                .as_deref()
                .map(|reference| reference.to_lowercase().contains(&needle))
                .unwrap_or(false)
    }
}

impl Identifiable for LedgerLine {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl ResidenceScoped for LedgerLine {
    fn residence_id(&self) -> ResidenceId {
        self.residence_id
    }
}

impl Displayable for LedgerLine {
    fn display_label(&self) -> String {
        format!("{} {} {} {}", self.date, self.label, self.side(), self.amount())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LineSide {
    Debit,
    Credit,
}

impl fmt::Display for LineSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineSide::Debit => f.write_str("D"),
            LineSide::Credit => f.write_str("C"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
/// Debit and credit sums over a set of lines.
pub struct LedgerTotals {
    pub total_debit: Decimal,
    pub total_credit: Decimal,
}

impl LedgerTotals {
    pub fn of<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a LedgerLine>,
    {
        lines.into_iter().fold(Self::default(), |acc, line| Self {
            total_debit: acc.total_debit + line.debit,
            total_credit: acc.total_credit + line.credit,
        })
    }

    pub fn balance(&self) -> Decimal {
        self.total_debit - self.total_credit
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debit == self.total_credit
    }
}
