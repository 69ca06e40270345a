use super::tenant::{ParticipantId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::AddAssign;

/// Correct-call counters used to break leaderboard ties
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieBreakHits {
    pub perfect_podiums: i32,
    /// Podium slots called in the right position
    pub podium_hits: i32,
    pub pole_hits: i32,
    pub fastest_lap_hits: i32,
    pub constructor_hits: i32,
}

impl AddAssign for TieBreakHits {
    fn add_assign(&mut self, rhs: Self) {
        self.perfect_podiums += rhs.perfect_podiums;
        self.podium_hits += rhs.podium_hits;
        self.pole_hits += rhs.pole_hits;
        self.fastest_lap_hits += rhs.fastest_lap_hits;
        self.constructor_hits += rhs.constructor_hits;
    }
}

/// Points one participant earned for one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventScore {
    pub tenant_id: TenantId,
    pub participant_id: ParticipantId,
    pub username: String,
    pub season: i32,
    pub round: i32,
    pub event_name: String,
    pub points: i32,
    pub hits: TieBreakHits,
}

/// Championship prediction points for one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonScore {
    pub tenant_id: TenantId,
    pub participant_id: ParticipantId,
    pub username: String,
    pub season: i32,
    pub driver_points: i32,
    pub constructor_points: i32,
}

impl SeasonScore {
    pub fn points(&self) -> i32 {
        self.driver_points + self.constructor_points
    }
}

/// Manual points awarded (or removed) by a moderator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub tenant_id: TenantId,
    pub participant_id: ParticipantId,
    pub username: String,
    pub points: i32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Confirmed bold predictions per participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoldTally {
    pub participant_id: ParticipantId,
    pub username: String,
    pub confirmed: i32,
}

/// One ranked line of a tenant's leaderboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub tenant_id: TenantId,
    pub participant_id: ParticipantId,
    pub username: String,
    pub total_points: i32,
    pub hits: TieBreakHits,
    /// Competition rank: rows equal on every key share a rank
    pub rank: i32,
    /// 1-based position in the stored order
    pub position: i32,
}

impl LeaderboardRow {
    /// Descending on every key; `Ordering::Equal` means a full tie.
    pub fn ranking_cmp(&self, other: &Self) -> Ordering {
        let key = |r: &Self| {
            (
                r.total_points,
                r.hits.perfect_podiums,
                r.hits.podium_hits,
                r.hits.pole_hits,
                r.hits.fastest_lap_hits,
                r.hits.constructor_hits,
            )
        };
        key(other).cmp(&key(self))
    }
}
