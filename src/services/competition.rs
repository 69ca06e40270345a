//! Entry points for the command layer: registration, gated submissions,
//! moderation and leaderboard reads.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, instrument};

use super::{EventCache, LockGate, ScoringMode, ScoringOutcome, ScoringService};
use crate::adapters::CompetitionStore;
use crate::clock::Clock;
use crate::domain::{
    Adjustment, BoldPrediction, Event, LeaderboardRow, LockCategory, LockChange, LockOverride,
    Participant, ParticipantId, Podium, PredictionPart, SeasonPrediction, Tenant, TenantId,
};
use crate::error::{PaddockError, Result};
use crate::leaderboard::LeaderboardAggregator;
use crate::scoring::canonical_driver;

#[derive(Clone)]
pub struct Competition {
    store: Arc<dyn CompetitionStore>,
    cache: Arc<EventCache>,
    gate: LockGate,
    scoring: ScoringService,
    leaderboard: LeaderboardAggregator,
    clock: Clock,
    season: i32,
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PaddockError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn check_podium(podium: &Podium) -> Result<()> {
    let mut seen = HashSet::new();
    for slot in podium.slots().into_iter().flatten() {
        if !seen.insert(canonical_driver(slot)) {
            return Err(PaddockError::Validation(format!(
                "{slot} appears more than once on the podium"
            )));
        }
    }
    Ok(())
}

impl Competition {
    pub fn new(
        store: Arc<dyn CompetitionStore>,
        cache: Arc<EventCache>,
        scoring: ScoringService,
        leaderboard: LeaderboardAggregator,
        clock: Clock,
        season: i32,
    ) -> Self {
        Self {
            gate: LockGate::new(store.clone(), cache.clone()),
            store,
            cache,
            scoring,
            leaderboard,
            clock,
            season,
        }
    }

    pub fn season(&self) -> i32 {
        self.season
    }

    /// Create the tenant, or rename it if it already exists.
    pub async fn register_tenant(&self, id: TenantId, name: &str) -> Result<()> {
        let tenant = Tenant {
            id,
            name: required("tenant name", name)?,
        };
        self.store.upsert_tenant(&tenant).await?;
        info!(tenant = id, name = %tenant.name, "Tenant registered");
        Ok(())
    }

    pub async fn tenants(&self) -> Result<Vec<Tenant>> {
        self.store.list_tenants().await
    }

    pub fn current_event(&self) -> Option<Event> {
        self.cache.event()
    }

    pub async fn is_open(&self, tenant: TenantId, category: LockCategory) -> Result<bool> {
        self.gate.is_open(tenant, category, self.clock.now()).await
    }

    /// Current event, provided `category` is open for `tenant`.
    async fn open_event(&self, tenant: TenantId, category: LockCategory) -> Result<Event> {
        let event = self
            .current_event()
            .ok_or_else(|| PaddockError::Locked("no event is open for predictions".to_string()))?;
        if !self.is_open(tenant, category).await? {
            return Err(PaddockError::Locked(format!(
                "{category} predictions for {} are closed",
                event.name
            )));
        }
        Ok(event)
    }

    // ==================== Submissions ====================

    #[instrument(skip(self, participant, podium), fields(participant = participant.id))]
    pub async fn submit_prediction(
        &self,
        tenant: TenantId,
        participant: &Participant,
        podium: Podium,
        pole: Option<&str>,
        fastest_lap: Option<&str>,
    ) -> Result<Event> {
        check_podium(&podium)?;
        let event = self.open_event(tenant, LockCategory::Race).await?;
        let part = PredictionPart::Main {
            podium,
            pole: optional(pole),
            fastest_lap: optional(fastest_lap),
        };
        self.store
            .save_prediction_part(tenant, participant, &event, &part)
            .await?;
        Ok(event)
    }

    pub async fn submit_constructor_prediction(
        &self,
        tenant: TenantId,
        participant: &Participant,
        constructor: &str,
    ) -> Result<Event> {
        let constructor = required("constructor", constructor)?;
        let event = self.open_event(tenant, LockCategory::Race).await?;
        self.store
            .save_prediction_part(tenant, participant, &event, &PredictionPart::Constructor(constructor))
            .await?;
        Ok(event)
    }

    pub async fn submit_sprint_prediction(
        &self,
        tenant: TenantId,
        participant: &Participant,
        winner: Option<&str>,
        pole: Option<&str>,
    ) -> Result<Event> {
        let event = self.open_event(tenant, LockCategory::Sprint).await?;
        if !event.format.is_sprint() {
            return Err(PaddockError::Validation(format!("{} has no sprint", event.name)));
        }
        let part = PredictionPart::Sprint {
            winner: optional(winner),
            pole: optional(pole),
        };
        self.store
            .save_prediction_part(tenant, participant, &event, &part)
            .await?;
        Ok(event)
    }

    pub async fn submit_season_prediction(
        &self,
        tenant: TenantId,
        participant: &Participant,
        driver_champion: Option<&str>,
        constructor_champion: Option<&str>,
    ) -> Result<()> {
        if !self.is_open(tenant, LockCategory::Season).await? {
            return Err(PaddockError::Locked(format!(
                "{} championship predictions are closed",
                self.season
            )));
        }
        self.store
            .save_season_prediction(&SeasonPrediction {
                tenant_id: tenant,
                participant_id: participant.id,
                username: participant.username.clone(),
                season: self.season,
                driver_champion: optional(driver_champion),
                constructor_champion: optional(constructor_champion),
            })
            .await
    }

    /// Free-text claim for the current round. Resubmitting replaces it.
    pub async fn submit_bold(&self, tenant: TenantId, participant: &Participant, claim: &str) -> Result<Event> {
        let claim = required("bold prediction", claim)?;
        let event = self.open_event(tenant, LockCategory::Race).await?;
        self.store
            .save_bold_prediction(&BoldPrediction {
                tenant_id: tenant,
                participant_id: participant.id,
                username: participant.username.clone(),
                season: event.season,
                round: event.round,
                claim,
                submitted_at: self.clock.now(),
                confirmed: false,
            })
            .await?;
        Ok(event)
    }

    // ==================== Moderation ====================

    /// Set (or with `None`, clear) an override and log who did it.
    pub async fn set_lock(
        &self,
        tenant: TenantId,
        category: LockCategory,
        state: Option<LockOverride>,
        actor: &str,
    ) -> Result<()> {
        let change = LockChange {
            tenant_id: tenant,
            category,
            state,
            actor: actor.to_string(),
            at: self.clock.now(),
        };
        self.store.set_lock(&change).await?;
        info!(
            tenant,
            %category,
            state = state.map(|s| s.as_str()).unwrap_or("unset"),
            actor,
            "Lock changed"
        );
        Ok(())
    }

    pub async fn confirm_bold(&self, tenant: TenantId, participant: ParticipantId, round: i32) -> Result<()> {
        if !self
            .store
            .confirm_bold_prediction(tenant, participant, self.season, round)
            .await?
        {
            return Err(PaddockError::NotFound(format!(
                "bold prediction by {participant} for round {round}"
            )));
        }
        self.leaderboard.recompute(tenant).await?;
        Ok(())
    }

    /// Append to the manual points ledger and rebuild the leaderboard.
    pub async fn add_points(&self, tenant: TenantId, participant: &Participant, points: i32, reason: &str) -> Result<()> {
        self.store
            .add_adjustment(&Adjustment {
                tenant_id: tenant,
                participant_id: participant.id,
                username: participant.username.clone(),
                points,
                reason: reason.to_string(),
                created_at: self.clock.now(),
            })
            .await?;
        self.leaderboard.recompute(tenant).await?;
        Ok(())
    }

    /// Re-score a round regardless of its marker.
    pub async fn trigger_event_scoring(&self, tenant: TenantId, round: i32) -> Result<ScoringOutcome> {
        self.scoring
            .score_event(tenant, self.season, round, ScoringMode::Forced)
            .await
    }

    pub async fn trigger_season_scoring(&self, tenant: TenantId) -> Result<ScoringOutcome> {
        self.scoring
            .score_season(tenant, self.season, ScoringMode::Forced)
            .await
    }

    pub async fn recompute_leaderboard(&self, tenant: TenantId) -> Result<Vec<LeaderboardRow>> {
        self.leaderboard.recompute(tenant).await
    }

    // ==================== Reads ====================

    pub async fn leaderboard_top(&self, tenant: TenantId, n: Option<usize>) -> Result<Vec<LeaderboardRow>> {
        let limit = n.map(|n| i64::try_from(n).unwrap_or(i64::MAX));
        self.store.leaderboard(tenant, limit).await
    }

    pub async fn rank(&self, tenant: TenantId, participant: ParticipantId) -> Result<Option<LeaderboardRow>> {
        self.store.leaderboard_row(tenant, participant).await
    }
}
