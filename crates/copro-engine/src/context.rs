use copro_domain::{ResidenceId, UserId};

/// Identity supplied by the session collaborator for every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerContext {
    pub residence_id: ResidenceId,
    pub user_id: UserId,
}

impl CallerContext {
    pub fn new(residence_id: ResidenceId, user_id: UserId) -> Self {
        Self {
            residence_id,
            user_id,
        }
    }
}
