use serde::{Deserialize, Serialize};

/// Community (chat server) identifier
pub type TenantId = i64;

/// Member identifier within the chat platform
pub type ParticipantId = i64;

/// An isolated competition instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
}

/// A member as seen when they submit or are awarded points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub username: String,
}

impl Participant {
    pub fn new(id: ParticipantId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}
