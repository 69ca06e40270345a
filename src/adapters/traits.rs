use async_trait::async_trait;

use crate::domain::{
    Adjustment, BoldPrediction, BoldTally, Event, EventScore, FinalStandings, LeaderboardRow,
    LockCategory, LockChange, LockOverride, Outcome, Participant, ParticipantId, Prediction,
    PredictionPart, SeasonPrediction, SeasonScore, SprintOutcome, StandingsCategory,
    StandingsLeaders, Tenant, TenantId,
};
use crate::error::Result;
use crate::scoring::LeaderHistory;

/// Season calendar and results provider.
///
/// `Ok(None)` means "not published yet" and is expected around race
/// weekends; `Err` is a failed call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// All rounds of `season`, in round order.
    async fn schedule(&self, season: i32) -> Result<Vec<Event>>;

    async fn outcome(&self, event: &Event) -> Result<Option<Outcome>>;

    async fn sprint_outcome(&self, event: &Event) -> Result<Option<SprintOutcome>>;

    /// Standings leaders after `round`.
    async fn standings_leaders(&self, season: i32, round: i32) -> Result<Option<StandingsLeaders>>;

    /// Final standings, or `None` until the last round is reflected in them.
    async fn final_standings(&self, season: i32) -> Result<Option<FinalStandings>>;
}

/// Persistence for every league entity.
///
/// Each method is a single idempotent statement (or one transaction for
/// `replace_leaderboard`), so a watcher interrupted between two calls can
/// simply redo the sequence on its next pass.
#[async_trait]
pub trait CompetitionStore: Send + Sync {
    // ==================== Tenants ====================

    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<()>;

    async fn list_tenants(&self) -> Result<Vec<Tenant>>;

    // ==================== Locks ====================

    async fn get_lock(&self, tenant: TenantId, category: LockCategory) -> Result<Option<LockOverride>>;

    /// Apply an administrative change and append it to the audit log.
    async fn set_lock(&self, change: &LockChange) -> Result<()>;

    /// Force race and sprint back to AUTO.
    async fn reset_event_locks(&self, tenant: TenantId) -> Result<()>;

    // ==================== Predictions ====================

    /// Partial upsert: fields outside `part` keep their stored values.
    async fn save_prediction_part(
        &self,
        tenant: TenantId,
        participant: &Participant,
        event: &Event,
        part: &PredictionPart,
    ) -> Result<()>;

    async fn list_predictions(&self, tenant: TenantId, season: i32, round: i32) -> Result<Vec<Prediction>>;

    async fn save_season_prediction(&self, prediction: &SeasonPrediction) -> Result<()>;

    async fn list_season_predictions(&self, tenant: TenantId, season: i32) -> Result<Vec<SeasonPrediction>>;

    async fn save_bold_prediction(&self, prediction: &BoldPrediction) -> Result<()>;

    /// Returns false when no such claim exists.
    async fn confirm_bold_prediction(
        &self,
        tenant: TenantId,
        participant: ParticipantId,
        season: i32,
        round: i32,
    ) -> Result<bool>;

    async fn bold_tallies(&self, tenant: TenantId) -> Result<Vec<BoldTally>>;

    // ==================== Outcomes ====================

    /// First writer wins; returns false if the round was already stored.
    async fn insert_outcome(&self, outcome: &Outcome) -> Result<bool>;

    async fn save_sprint_outcome(&self, sprint: &SprintOutcome) -> Result<()>;

    async fn get_outcome(&self, season: i32, round: i32) -> Result<Option<Outcome>>;

    /// Season is the key; re-ingesting overwrites.
    async fn save_final_standings(&self, standings: &FinalStandings) -> Result<()>;

    async fn get_final_standings(&self, season: i32) -> Result<Option<FinalStandings>>;

    /// Append-only; recording the same entrant twice is a no-op.
    async fn record_leader(&self, season: i32, category: StandingsCategory, entrant: &str) -> Result<()>;

    async fn leader_history(&self, season: i32) -> Result<LeaderHistory>;

    // ==================== Scores ====================

    async fn upsert_event_score(&self, score: &EventScore) -> Result<()>;

    async fn upsert_season_score(&self, score: &SeasonScore) -> Result<()>;

    async fn list_event_scores(&self, tenant: TenantId) -> Result<Vec<EventScore>>;

    async fn list_season_scores(&self, tenant: TenantId) -> Result<Vec<SeasonScore>>;

    async fn add_adjustment(&self, adjustment: &Adjustment) -> Result<()>;

    async fn list_adjustments(&self, tenant: TenantId) -> Result<Vec<Adjustment>>;

    // ==================== Scoring markers ====================

    async fn has_event_marker(&self, tenant: TenantId, season: i32, round: i32) -> Result<bool>;

    async fn mark_event_scored(&self, tenant: TenantId, season: i32, round: i32) -> Result<()>;

    async fn has_season_marker(&self, tenant: TenantId, season: i32) -> Result<bool>;

    async fn mark_season_scored(&self, tenant: TenantId, season: i32) -> Result<()>;

    // ==================== Leaderboard ====================

    /// Delete every row for the tenant and insert `rows` in their place.
    async fn replace_leaderboard(&self, tenant: TenantId, rows: &[LeaderboardRow]) -> Result<()>;

    /// Rows in stored order, optionally truncated.
    async fn leaderboard(&self, tenant: TenantId, limit: Option<i64>) -> Result<Vec<LeaderboardRow>>;

    async fn leaderboard_row(&self, tenant: TenantId, participant: ParticipantId) -> Result<Option<LeaderboardRow>>;
}
