use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which prediction window an override applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockCategory {
    Race,
    Sprint,
    Season,
}

impl LockCategory {
    pub const ALL: [LockCategory; 3] = [LockCategory::Race, LockCategory::Sprint, LockCategory::Season];

    pub fn as_str(&self) -> &'static str {
        match self {
            LockCategory::Race => "race",
            LockCategory::Sprint => "sprint",
            LockCategory::Season => "season",
        }
    }

    /// Categories whose deadline moves with each round; reset to AUTO on cache refresh.
    pub fn follows_event(&self) -> bool {
        matches!(self, LockCategory::Race | LockCategory::Sprint)
    }
}

impl fmt::Display for LockCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for LockCategory {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "race" => Ok(LockCategory::Race),
            "sprint" => Ok(LockCategory::Sprint),
            "season" => Ok(LockCategory::Season),
            _ => Err(format!("Unknown lock category: {}", s)),
        }
    }
}

/// Administrative override for a prediction window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockOverride {
    Locked,
    Open,
    /// Follow the deadline
    Auto,
}

impl LockOverride {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockOverride::Locked => "LOCKED",
            LockOverride::Open => "OPEN",
            LockOverride::Auto => "AUTO",
        }
    }
}

impl fmt::Display for LockOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for LockOverride {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "LOCKED" => Ok(LockOverride::Locked),
            "OPEN" => Ok(LockOverride::Open),
            "AUTO" => Ok(LockOverride::Auto),
            _ => Err(format!("Unknown lock state: {}", s)),
        }
    }
}

/// Whether submissions for `category` are accepted at `now`.
///
/// An explicit override always wins. Otherwise race and sprint windows are
/// open strictly before their deadline and closed when no deadline is known;
/// the season window has no deadline and stays closed until opened by hand.
pub fn window_is_open(
    category: LockCategory,
    state: Option<LockOverride>,
    deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    match state.unwrap_or(LockOverride::Auto) {
        LockOverride::Locked => false,
        LockOverride::Open => true,
        LockOverride::Auto => match category {
            LockCategory::Season => false,
            LockCategory::Race | LockCategory::Sprint => deadline.is_some_and(|d| now < d),
        },
    }
}

/// Audit entry for an administrative lock change
#[derive(Debug, Clone, Serialize)]
pub struct LockChange {
    pub tenant_id: i64,
    pub category: LockCategory,
    /// `None` clears the override
    pub state: Option<LockOverride>,
    pub actor: String,
    pub at: DateTime<Utc>,
}
