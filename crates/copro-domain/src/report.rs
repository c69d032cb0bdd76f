//! Read-only aggregates consumed by charting and export collaborators.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::budget::ChargeCategory;

/// Revenue and expense sums for one calendar month.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    pub revenue: Decimal,
    pub expense: Decimal,
}

impl MonthlySummary {
    pub fn net(&self) -> Decimal {
        self.revenue - self.expense
    }
}

/// Budgeted versus actual figures for one cost category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryVariance {
    pub category: ChargeCategory,
    pub budgeted: Decimal,
    pub actual: Decimal,
    pub remaining: Decimal,
}

impl CategoryVariance {
    pub fn new(category: ChargeCategory, budgeted: Decimal, actual: Decimal) -> Self {
        Self {
            category,
            budgeted,
            actual,
            remaining: budgeted - actual,
        }
    }

    pub fn is_over_budget(&self) -> bool {
        self.actual > self.budgeted
    }
}

/// Share of one category in a budget total.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryShare {
    pub category: ChargeCategory,
    pub total: Decimal,
    /// Ratio of the budget total, zero for an empty budget.
    pub ratio: Decimal,
}
