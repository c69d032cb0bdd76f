//! Annual budgets, their lines and the cost categories they are grouped by.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::*;

/// Annual budget header. `total_budget` caches the sum of its lines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Budget {
    pub id: Uuid,
    pub residence_id: ResidenceId,
    pub fiscal_year: i32,
    pub status: BudgetStatus,
    pub total_budget: Decimal,
    /// Bumped on every mutation of the budget or its lines.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voted_at: Option<DateTime<Utc>>,
}

impl Budget {
    pub fn new(residence_id: ResidenceId, fiscal_year: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            residence_id,
            fiscal_year,
            status: BudgetStatus::Draft,
            total_budget: Decimal::ZERO,
            version: 0,
            created_at: Utc::now(),
            voted_at: None,
        }
    }

    /// Voted and active budgets are the ones legally binding for the year.
    pub fn is_voted(&self) -> bool {
        matches!(self.status, BudgetStatus::Voted | BudgetStatus::Active)
    }
}

impl Identifiable for Budget {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl ResidenceScoped for Budget {
    fn residence_id(&self) -> ResidenceId {
        self.residence_id
    }
}

impl Displayable for Budget {
    fn display_label(&self) -> String {
        format!("Budget {} [{}]", self.fiscal_year, self.status)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
/// Lifecycle of a budget: drafted, voted by the general assembly, then in force.
pub enum BudgetStatus {
    Draft,
    Voted,
    Active,
}

impl BudgetStatus {
    /// Status reachable from `self`, if any.
    pub fn next(self) -> Option<BudgetStatus> {
        match self {
            BudgetStatus::Draft => Some(BudgetStatus::Voted),
            BudgetStatus::Voted => Some(BudgetStatus::Active),
            BudgetStatus::Active => None,
        }
    }
}

impl fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BudgetStatus::Draft => "Draft",
            BudgetStatus::Voted => "Voted",
            BudgetStatus::Active => "Active",
        };
        f.write_str(label)
    }
}

/// One categorized line of a budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetLine {
    pub id: Uuid,
    pub budget_id: Uuid,
    pub label: String,
    pub category: ChargeCategory,
    pub budgeted_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_amount: Option<Decimal>,
    /// Key used to distribute this line's charges across lots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_key_id: Option<Uuid>,
}

impl BudgetLine {
    pub fn new(
        budget_id: Uuid,
        label: impl Into<String>,
        category: ChargeCategory,
        budgeted_amount: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            budget_id,
            label: label.into().trim().to_string(),
            category,
            budgeted_amount,
            actual_amount: None,
            distribution_key_id: None,
        }
    }

    pub fn with_key(mut self, key_id: Uuid) -> Self {
        self.distribution_key_id = Some(key_id);
        self
    }
}

impl Identifiable for BudgetLine {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Cost categories used by co-ownership budgets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChargeCategory {
    Maintenance,
    Energy,
    Water,
    Insurance,
    Elevator,
    Cleaning,
    Caretaking,
    ManagementFees,
    Works,
    Other,
}

impl ChargeCategory {
    pub const ALL: [ChargeCategory; 10] = [
        ChargeCategory::Maintenance,
        ChargeCategory::Energy,
        ChargeCategory::Water,
        ChargeCategory::Insurance,
        ChargeCategory::Elevator,
        ChargeCategory::Cleaning,
        ChargeCategory::Caretaking,
        ChargeCategory::ManagementFees,
        ChargeCategory::Works,
        ChargeCategory::Other,
    ];

    /// Stable machine code used in storage, exports and the CLI.
    pub fn code(self) -> &'static str {
        match self {
            ChargeCategory::Maintenance => "maintenance",
            ChargeCategory::Energy => "energy",
            ChargeCategory::Water => "water",
            ChargeCategory::Insurance => "insurance",
            ChargeCategory::Elevator => "elevator",
            ChargeCategory::Cleaning => "cleaning",
            ChargeCategory::Caretaking => "caretaking",
            ChargeCategory::ManagementFees => "fees",
            ChargeCategory::Works => "works",
            ChargeCategory::Other => "other",
        }
    }

    /// Label used on owner-facing documents.
    pub fn label(self) -> &'static str {
        match self {
            ChargeCategory::Maintenance => "Entretien",
            ChargeCategory::Energy => "Énergie",
            ChargeCategory::Water => "Eau",
            ChargeCategory::Insurance => "Assurance",
            ChargeCategory::Elevator => "Ascenseur",
            ChargeCategory::Cleaning => "Nettoyage",
            ChargeCategory::Caretaking => "Gardiennage",
            ChargeCategory::ManagementFees => "Honoraires",
            ChargeCategory::Works => "Travaux",
            ChargeCategory::Other => "Divers",
        }
    }
}

impl fmt::Display for ChargeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ChargeCategory {
    type Err = String;

    /// Accepts either the machine code or the document label, case-insensitively.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim().to_lowercase();
        ChargeCategory::ALL
            .into_iter()
            .find(|category| category.code() == needle || category.label().to_lowercase() == needle)
            .ok_or_else(|| format!("unknown charge category `{}`", value.trim()))
    }
}

/// Lines of one category with their budgeted total.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryGroup {
    pub category: ChargeCategory,
    pub lines: Vec<BudgetLine>,
    pub category_total: Decimal,
}
