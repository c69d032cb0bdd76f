//! References into the external residence / lot / lease directory.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::*;

/// Label rendered for ids the directory no longer knows.
pub const UNKNOWN_REFERENCE: &str = "unknown";

/// Result of resolving a foreign id through the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference<T> {
    Known(T),
    Missing(Uuid),
}

impl<T> Reference<T> {
    pub fn from_lookup(id: Uuid, found: Option<T>) -> Self {
        found.map_or(Reference::Missing(id), Reference::Known)
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Reference::Missing(_))
    }
}

impl<T: fmt::Display> fmt::Display for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Known(value) => write!(f, "{value}"),
            Reference::Missing(_) => f.write_str(UNKNOWN_REFERENCE),
        }
    }
}

/// Read-only view of the directory owned by other modules of the application.
pub trait ReferenceDirectory {
    fn residence_name(&self, residence_id: ResidenceId) -> Option<String>;
    fn lot_number(&self, lot_id: LotId) -> Option<String>;
    fn tenant_name(&self, lease_id: LeaseId) -> Option<String>;

    fn lot(&self, lot_id: LotId) -> Reference<String> {
        Reference::from_lookup(lot_id, self.lot_number(lot_id))
    }

    fn tenant(&self, lease_id: LeaseId) -> Reference<String> {
        Reference::from_lookup(lease_id, self.tenant_name(lease_id))
    }
}

/// Directory that knows nothing; every lookup renders as unknown.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyDirectory;

impl ReferenceDirectory for EmptyDirectory {
    fn residence_name(&self, _residence_id: ResidenceId) -> Option<String> {
        None
    }

    fn lot_number(&self, _lot_id: LotId) -> Option<String> {
        None
    }

    fn tenant_name(&self, _lease_id: LeaseId) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LotEntry {
    pub residence_id: ResidenceId,
    pub number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaseEntry {
    pub residence_id: ResidenceId,
    pub tenant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_id: Option<LotId>,
}

/// Locally cached copy of directory entries, stored with the book for offline use.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectorySnapshot {
    #[serde(default)]
    pub residences: BTreeMap<ResidenceId, String>,
    #[serde(default)]
    pub lots: BTreeMap<LotId, LotEntry>,
    #[serde(default)]
    pub leases: BTreeMap<LeaseId, LeaseEntry>,
}

impl DirectorySnapshot {
    pub fn residence_by_name(&self, name: &str) -> Option<ResidenceId> {
        self.residences
            .iter()
            .find(|(_, label)| label.eq_ignore_ascii_case(name.trim()))
            .map(|(id, _)| *id)
    }

    pub fn lot_by_number(&self, residence_id: ResidenceId, number: &str) -> Option<LotId> {
        self.lots
            .iter()
            .find(|(_, entry)| {
                entry.residence_id == residence_id && entry.number.eq_ignore_ascii_case(number.trim())
            })
            .map(|(id, _)| *id)
    }

    pub fn lease_by_tenant(&self, residence_id: ResidenceId, tenant: &str) -> Option<LeaseId> {
        self.leases
            .iter()
            .find(|(_, entry)| {
                entry.residence_id == residence_id && entry.tenant.eq_ignore_ascii_case(tenant.trim())
            })
            .map(|(id, _)| *id)
    }
}

impl ReferenceDirectory for DirectorySnapshot {
    fn residence_name(&self, residence_id: ResidenceId) -> Option<String> {
        self.residences.get(&residence_id).cloned()
    }

    fn lot_number(&self, lot_id: LotId) -> Option<String> {
        self.lots.get(&lot_id).map(|entry| entry.number.clone())
    }

    fn tenant_name(&self, lease_id: LeaseId) -> Option<String> {
        self.leases.get(&lease_id).map(|entry| entry.tenant.clone())
    }
}
