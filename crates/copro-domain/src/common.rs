//! Shared traits, identifiers, scopes and date ranges for accounting primitives.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a residence (cost center) supplied by the residence directory.
pub type ResidenceId = Uuid;
/// Identifier of a lot supplied by the lot directory.
pub type LotId = Uuid;
/// Identifier of a lease supplied by the lease directory.
pub type LeaseId = Uuid;
/// Identifier of the user performing a write.
pub type UserId = Uuid;

/// Exposes a stable identifier for entities stored in the book.
pub trait Identifiable {
    fn id(&self) -> Uuid;
}

/// Provides read-only access to an entity's display name.
pub trait NamedEntity {
    fn name(&self) -> &str;
}

/// Converts an entity into a user-facing display label.
pub trait Displayable {
    fn display_label(&self) -> String;
}

/// Entities that live inside exactly one residence.
pub trait ResidenceScoped {
    fn residence_id(&self) -> ResidenceId;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
/// Visibility of a chart-of-accounts entry or journal.
pub enum Scope {
    /// Shared by every residence of the agency (null residence in the source data).
    Global,
    Residence(ResidenceId),
}

impl Scope {
    pub fn from_residence(residence_id: Option<ResidenceId>) -> Self {
        residence_id.map_or(Scope::Global, Scope::Residence)
    }

    pub fn residence_id(&self) -> Option<ResidenceId> {
        match self {
            Scope::Global => None,
            Scope::Residence(id) => Some(*id),
        }
    }

    /// Returns `true` when an entity with this scope may be used by `residence_id`.
    pub fn is_visible_from(&self, residence_id: ResidenceId) -> bool {
        match self {
            Scope::Global => true,
            Scope::Residence(id) => *id == residence_id,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Residence(id) => write!(f, "residence {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
/// Inclusive range of calendar dates used by ledger filters and reports.
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if end < start {
            return Err(DateRangeError::InvalidRange);
        }
        Ok(Self { start, end })
    }

    /// Calendar year `year`, January 1st through December 31st.
    pub fn fiscal_year(year: i32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
        let end = NaiveDate::from_ymd_opt(year, 12, 31)?;
        Some(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Errors that can occur when constructing [`DateRange`] values.
pub enum DateRangeError {
    InvalidRange,
}

impl fmt::Display for DateRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateRangeError::InvalidRange => f.write_str("date range end must not precede start"),
        }
    }
}

impl std::error::Error for DateRangeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_scope_is_visible_everywhere() {
        let residence = Uuid::new_v4();
        assert!(Scope::Global.is_visible_from(residence));
        assert!(Scope::Residence(residence).is_visible_from(residence));
        assert!(!Scope::Residence(Uuid::new_v4()).is_visible_from(residence));
    }

    #[test]
    fn date_range_rejects_inverted_bounds() {
        let start = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(DateRange::new(start, end), Err(DateRangeError::InvalidRange));
        let single = DateRange::new(start, start).expect("single day range");
        assert!(single.contains(start));
    }
}
