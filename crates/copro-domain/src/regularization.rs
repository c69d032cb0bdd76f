//! Year-end charge regularization for a lease.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::*;

/// Comparison between provisions collected from a tenant and charges incurred.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Regularization {
    pub id: Uuid,
    pub residence_id: ResidenceId,
    pub lease_id: LeaseId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_id: Option<LotId>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub provisions_total: Decimal,
    pub actual_charges: Decimal,
    /// Always `provisions_total - actual_charges`.
    pub balance: Decimal,
    pub status: RegularizationStatus,
    /// Keys used when the actual charges were computed from a budget.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub distribution_key_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl Regularization {
    pub fn new(
        residence_id: ResidenceId,
        lease_id: LeaseId,
        period_start: NaiveDate,
        period_end: NaiveDate,
        provisions_total: Decimal,
        actual_charges: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            residence_id,
            lease_id,
            lot_id: None,
            period_start,
            period_end,
            provisions_total,
            actual_charges,
            balance: provisions_total - actual_charges,
            status: RegularizationStatus::Pending,
            distribution_key_ids: Vec::new(),
            created_at,
            sent_at: None,
            paid_at: None,
        }
    }

    pub fn direction(&self) -> BalanceDirection {
        BalanceDirection::of(self.balance)
    }

    /// `pending -> sent`, stamping `sent_at`.
    pub fn mark_sent(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(RegularizationStatus::Pending, RegularizationStatus::Sent)?;
        self.sent_at = Some(at);
        Ok(())
    }

    /// `sent -> paid`, stamping `paid_at`.
    pub fn mark_paid(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(RegularizationStatus::Sent, RegularizationStatus::Paid)?;
        self.paid_at = Some(at);
        Ok(())
    }

    fn transition(
        &mut self,
        expected: RegularizationStatus,
        target: RegularizationStatus,
    ) -> Result<(), TransitionError> {
        if self.status != expected {
            return Err(TransitionError {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }
}

impl Identifiable for Regularization {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl ResidenceScoped for Regularization {
    fn residence_id(&self) -> ResidenceId {
        self.residence_id
    }
}

impl Displayable for Regularization {
    fn display_label(&self) -> String {
        format!(
            "{} → {} [{}] {}",
            self.period_start,
            self.period_end,
            self.status,
            self.direction()
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RegularizationStatus {
    Pending,
    Sent,
    Paid,
}

impl fmt::Display for RegularizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RegularizationStatus::Pending => "pending",
            RegularizationStatus::Sent => "sent",
            RegularizationStatus::Paid => "paid",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A refused lifecycle step.
pub struct TransitionError {
    pub from: RegularizationStatus,
    pub to: RegularizationStatus,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot move a {} regularization to {}",
            self.from, self.to
        )
    }
}

impl std::error::Error for TransitionError {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
/// Who owes whom once the balance is known.
pub enum BalanceDirection {
    /// Balance ≥ 0: the tenant paid too much and is refunded.
    RefundDue,
    /// Balance < 0: the tenant owes the difference.
    AmountOwed,
}

impl BalanceDirection {
    pub fn of(balance: Decimal) -> Self {
        if balance.is_sign_negative() && !balance.is_zero() {
            BalanceDirection::AmountOwed
        } else {
            BalanceDirection::RefundDue
        }
    }
}

impl fmt::Display for BalanceDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceDirection::RefundDue => f.write_str("refund due to tenant"),
            BalanceDirection::AmountOwed => f.write_str("amount owed by tenant"),
        }
    }
}

/// Data a notification collaborator needs once a regularization is sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegularizationNotice {
    pub regularization_id: Uuid,
    pub lease_id: LeaseId,
    pub recipient: String,
    pub lot: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub provisions_total: Decimal,
    pub actual_charges: Decimal,
    pub balance: Decimal,
    pub direction: BalanceDirection,
    /// Absolute value of the balance, the figure printed on the notice.
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(provisions: Decimal, actual: Decimal) -> Regularization {
        Regularization::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            provisions,
            actual,
            Utc::now(),
        )
    }

    #[test]
    fn balance_sign_sets_direction() {
        assert_eq!(sample(dec!(1200), dec!(1500)).direction(), BalanceDirection::AmountOwed);
        assert_eq!(sample(dec!(1500), dec!(1200)).direction(), BalanceDirection::RefundDue);
        assert_eq!(sample(dec!(100), dec!(100)).direction(), BalanceDirection::RefundDue);
    }

    #[test]
    fn lifecycle_cannot_skip_states() {
        let mut reg = sample(dec!(10), dec!(5));
        let err = reg.mark_paid(Utc::now()).expect_err("pending cannot be paid");
        assert_eq!(err.from, RegularizationStatus::Pending);

        reg.mark_sent(Utc::now()).unwrap();
        assert!(reg.mark_sent(Utc::now()).is_err());
        reg.mark_paid(Utc::now()).unwrap();
        assert_eq!(reg.status, RegularizationStatus::Paid);
        assert!(reg.paid_at.is_some());
    }
}
