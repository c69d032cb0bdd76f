//! Legally mandated reserve for future major works.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::*;

/// Lowest contribution rate the law allows, as a percentage of the voted budget.
pub const LEGAL_MINIMUM_PERCENTAGE: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// One fund per residence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorksFund {
    pub id: Uuid,
    pub residence_id: ResidenceId,
    pub balance: Decimal,
    pub minimum_percentage: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_contribution_date: Option<NaiveDate>,
    #[serde(default)]
    pub contributions: Vec<WorksFundContribution>,
    pub created_at: DateTime<Utc>,
}

impl WorksFund {
    pub fn new(residence_id: ResidenceId, minimum_percentage: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            residence_id,
            balance: Decimal::ZERO,
            minimum_percentage,
            last_contribution_date: None,
            contributions: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

impl Identifiable for WorksFund {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl ResidenceScoped for WorksFund {
    fn residence_id(&self) -> ResidenceId {
        self.residence_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorksFundContribution {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub recorded_by: UserId,
}

/// `latest_budget_total × minimum_percentage / 100`.
pub fn required_minimum(latest_budget_total: Decimal, minimum_percentage: Decimal) -> Decimal {
    latest_budget_total / Decimal::ONE_HUNDRED * minimum_percentage
}

/// `balance / required_minimum`, or zero when nothing is required.
pub fn funding_progress(balance: Decimal, required_minimum: Decimal) -> Decimal {
    if required_minimum.is_zero() {
        Decimal::ZERO
    } else {
        balance / required_minimum
    }
}

/// Reporting snapshot of a fund against its legal threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorksFundStatus {
    pub residence_id: ResidenceId,
    pub balance: Decimal,
    pub minimum_percentage: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_fiscal_year: Option<i32>,
    pub reference_budget_total: Decimal,
    pub required_minimum: Decimal,
    pub progress: Decimal,
    pub below_minimum: bool,
}
