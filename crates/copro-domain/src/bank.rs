//! Bank accounts held by a residence and the movements reported by the bank.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::*;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BankAccount {
    pub id: Uuid,
    pub residence_id: ResidenceId,
    pub label: String,
    pub iban: String,
    pub bic: String,
    /// Rolling balance: opening balance plus every recorded movement.
    pub balance: Decimal,
    pub is_main: bool,
    pub created_at: DateTime<Utc>,
}

impl Identifiable for BankAccount {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl NamedEntity for BankAccount {
    fn name(&self) -> &str {
        &self.label
    }
}

impl ResidenceScoped for BankAccount {
    fn residence_id(&self) -> ResidenceId {
        self.residence_id
    }
}

impl Displayable for BankAccount {
    fn display_label(&self) -> String {
        let marker = if self.is_main { " (main)" } else { "" };
        format!("{} {}{}", self.label, masked_iban(&self.iban), marker)
    }
}

/// A movement reported on a bank statement. Positive amounts are receipts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BankTransaction {
    pub id: Uuid,
    pub bank_account_id: Uuid,
    pub date: NaiveDate,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
    pub amount: Decimal,
    pub is_reconciled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciled_with: Option<String>,
}

impl BankTransaction {
    pub fn new(
        bank_account_id: Uuid,
        date: NaiveDate,
        label: impl Into<String>,
        counterparty: Option<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            bank_account_id,
            date,
            label: label.into().trim().to_string(),
            counterparty,
            amount,
            is_reconciled: false,
            reconciled_at: None,
            reconciled_with: None,
        }
    }
}

impl Identifiable for BankTransaction {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Displayable for BankTransaction {
    fn display_label(&self) -> String {
        let state = if self.is_reconciled { "reconciled" } else { "pending" };
        format!("{} {} {} [{}]", self.date, self.label, self.amount, state)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IbanError {
    Length(usize),
    Characters,
    Checksum,
}

impl fmt::Display for IbanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IbanError::Length(len) => write!(f, "IBAN must have 15 to 34 characters, got {len}"),
            IbanError::Characters => f.write_str("IBAN must start with a country code and check digits"),
            IbanError::Checksum => f.write_str("IBAN checksum is invalid"),
        }
    }
}

impl std::error::Error for IbanError {}

/// Strips spaces, upper-cases and validates an IBAN with the ISO 13616 mod-97 check.
pub fn normalize_iban(raw: &str) -> Result<String, IbanError> {
    let iban: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if !(15..=34).contains(&iban.len()) {
        return Err(IbanError::Length(iban.len()));
    }
    let bytes = iban.as_bytes();
    let well_formed = bytes[..2].iter().all(u8::is_ascii_uppercase)
        && bytes[2..4].iter().all(u8::is_ascii_digit)
        && bytes.iter().all(u8::is_ascii_alphanumeric);
    if !well_formed {
        return Err(IbanError::Characters);
    }

    let rearranged = iban[4..].chars().chain(iban[..4].chars());
    let mut remainder: u32 = 0;
    for ch in rearranged {
        let value = ch.to_digit(36).ok_or(IbanError::Characters)?;
        remainder = if value >= 10 {
            (remainder * 100 + value) % 97
        } else {
            (remainder * 10 + value) % 97
        };
    }
    if remainder != 1 {
        return Err(IbanError::Checksum);
    }
    Ok(iban)
}

/// Shows only the country code and the last four characters.
pub fn masked_iban(iban: &str) -> String {
    if iban.len() <= 8 {
        return iban.to_string();
    }
    format!("{}…{}", &iban[..4], &iban[iban.len() - 4..])
}
