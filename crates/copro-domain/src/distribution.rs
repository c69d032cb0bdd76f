//! Distribution keys (tantièmes) and the lot shares attached to them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::*;

/// Residence-scoped rule mapping lots to prorata shares.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DistributionKey {
    pub id: Uuid,
    pub residence_id: ResidenceId,
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DistributionKey {
    /// Builds a key; the code is normalized to trimmed upper case.
    pub fn new(
        residence_id: ResidenceId,
        code: &str,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            residence_id,
            code: Self::normalize_code(code),
            name: name.into().trim().to_string(),
            description: description
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
            created_at: Utc::now(),
        }
    }

    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }
}

impl Identifiable for DistributionKey {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl NamedEntity for DistributionKey {
    fn name(&self) -> &str {
        &self.name
    }
}

impl ResidenceScoped for DistributionKey {
    fn residence_id(&self) -> ResidenceId {
        self.residence_id
    }
}

impl Displayable for DistributionKey {
    fn display_label(&self) -> String {
        format!("{} {}", self.code, self.name)
    }
}

/// Weight of one lot under one key. At most one row per (key, lot).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LotShare {
    pub id: Uuid,
    pub key_id: Uuid,
    pub lot_id: LotId,
    pub shares: Decimal,
}

impl LotShare {
    pub fn new(key_id: Uuid, lot_id: LotId, shares: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            key_id,
            lot_id,
            shares,
        }
    }
}

/// A lot's computed portion of a key, optionally applied to an amount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShareAllocation {
    pub lot_id: LotId,
    pub shares: Decimal,
    /// Ratio in `[0, 1]`.
    pub percentage: Decimal,
    pub amount: Decimal,
}
