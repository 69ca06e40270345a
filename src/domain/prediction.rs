use super::tenant::{ParticipantId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered top three, as predicted or as classified
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Podium {
    pub p1: Option<String>,
    pub p2: Option<String>,
    pub p3: Option<String>,
}

impl Podium {
    pub fn new(p1: impl Into<String>, p2: impl Into<String>, p3: impl Into<String>) -> Self {
        Self {
            p1: Some(p1.into()),
            p2: Some(p2.into()),
            p3: Some(p3.into()),
        }
    }

    pub fn slots(&self) -> [Option<&str>; 3] {
        [self.p1.as_deref(), self.p2.as_deref(), self.p3.as_deref()]
    }
}

/// One participant's forecast for one round.
///
/// Fields are filled by separate submissions (main, constructor, sprint), so
/// any of them may be missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub tenant_id: TenantId,
    pub participant_id: ParticipantId,
    pub username: String,
    pub season: i32,
    pub round: i32,
    pub event_name: String,
    pub podium: Podium,
    pub pole: Option<String>,
    pub fastest_lap: Option<String>,
    pub constructor: Option<String>,
    pub sprint_winner: Option<String>,
    pub sprint_pole: Option<String>,
}

/// Which part of a [`Prediction`] a submission writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictionPart {
    Main {
        podium: Podium,
        pole: Option<String>,
        fastest_lap: Option<String>,
    },
    Constructor(String),
    Sprint {
        winner: Option<String>,
        pole: Option<String>,
    },
}

/// Championship forecast, one per participant per season
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonPrediction {
    pub tenant_id: TenantId,
    pub participant_id: ParticipantId,
    pub username: String,
    pub season: i32,
    pub driver_champion: Option<String>,
    pub constructor_champion: Option<String>,
}

/// Free-text claim for a round, confirmed (or not) by a moderator afterwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoldPrediction {
    pub tenant_id: TenantId,
    pub participant_id: ParticipantId,
    pub username: String,
    pub season: i32,
    pub round: i32,
    pub claim: String,
    pub submitted_at: DateTime<Utc>,
    pub confirmed: bool,
}
