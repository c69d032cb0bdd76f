use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::*;

/// A named grouping of ledger postings such as "bank" or "purchases".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Journal {
    pub id: Uuid,
    pub scope: Scope,
    pub code: String,
    pub name: String,
}

impl Journal {
    pub fn new(scope: Scope, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope,
            code: code.into().trim().to_uppercase(),
            name: name.into().trim().to_string(),
        }
    }
}

impl Identifiable for Journal {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl NamedEntity for Journal {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Displayable for Journal {
    fn display_label(&self) -> String {
        format!("{} {}", self.code, self.name)
    }
}
