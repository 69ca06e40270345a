//! In-process collaborators for offline runs and tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::traits::{CalendarSource, CompetitionStore};
use crate::domain::{
    Adjustment, BoldPrediction, BoldTally, Event, EventScore, FinalStandings, LeaderboardRow,
    LockCategory, LockChange, LockOverride, Outcome, Participant, ParticipantId, Podium,
    Prediction, PredictionPart, SeasonPrediction, SeasonScore, SprintOutcome, StandingsCategory,
    StandingsLeaders, Tenant, TenantId,
};
use crate::error::{PaddockError, Result};
use crate::scoring::LeaderHistory;

type RoundKey = (TenantId, ParticipantId, i32, i32);

#[derive(Default)]
struct StoreState {
    tenants: BTreeMap<TenantId, Tenant>,
    locks: HashMap<(TenantId, LockCategory), Option<LockOverride>>,
    lock_log: Vec<LockChange>,
    predictions: BTreeMap<RoundKey, Prediction>,
    season_predictions: BTreeMap<(TenantId, ParticipantId, i32), SeasonPrediction>,
    bold: BTreeMap<RoundKey, BoldPrediction>,
    outcomes: BTreeMap<(i32, i32), Outcome>,
    standings: BTreeMap<i32, FinalStandings>,
    leaders: Vec<(i32, StandingsCategory, String)>,
    event_scores: BTreeMap<RoundKey, EventScore>,
    season_scores: BTreeMap<(TenantId, ParticipantId, i32), SeasonScore>,
    adjustments: Vec<Adjustment>,
    event_markers: HashSet<(TenantId, i32, i32)>,
    season_markers: HashSet<(TenantId, i32)>,
    leaderboards: HashMap<TenantId, Vec<LeaderboardRow>>,
    failing_tenants: HashSet<TenantId>,
}

/// Map-backed [`CompetitionStore`].
///
/// One mutex guards everything, so every call is atomic and writes are
/// serialized the same way the Postgres store serializes them.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every prediction read for `tenant` fail until cleared.
    pub fn fail_tenant(&self, tenant: TenantId, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing_tenants.insert(tenant);
        } else {
            state.failing_tenants.remove(&tenant);
        }
    }

    /// Audit rows written by `set_lock`, oldest first.
    pub fn lock_log(&self) -> Vec<LockChange> {
        self.state().lock_log.clone()
    }
}

#[async_trait]
impl CompetitionStore for MemoryStore {
    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<()> {
        let mut state = self.state();
        state.tenants.insert(tenant.id, tenant.clone());
        for category in [LockCategory::Race, LockCategory::Sprint] {
            state
                .locks
                .entry((tenant.id, category))
                .or_insert(Some(LockOverride::Auto));
        }
        Ok(())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        Ok(self.state().tenants.values().cloned().collect())
    }

    async fn get_lock(&self, tenant: TenantId, category: LockCategory) -> Result<Option<LockOverride>> {
        Ok(self.state().locks.get(&(tenant, category)).copied().flatten())
    }

    async fn set_lock(&self, change: &LockChange) -> Result<()> {
        let mut state = self.state();
        state
            .locks
            .insert((change.tenant_id, change.category), change.state);
        state.lock_log.push(change.clone());
        Ok(())
    }

    async fn reset_event_locks(&self, tenant: TenantId) -> Result<()> {
        let mut state = self.state();
        for category in LockCategory::ALL.into_iter().filter(LockCategory::follows_event) {
            state.locks.insert((tenant, category), Some(LockOverride::Auto));
        }
        Ok(())
    }

    async fn save_prediction_part(
        &self,
        tenant: TenantId,
        participant: &Participant,
        event: &Event,
        part: &PredictionPart,
    ) -> Result<()> {
        let mut state = self.state();
        let entry = state
            .predictions
            .entry((tenant, participant.id, event.season, event.round))
            .or_insert_with(|| Prediction {
                tenant_id: tenant,
                participant_id: participant.id,
                username: participant.username.clone(),
                season: event.season,
                round: event.round,
                event_name: event.name.clone(),
                podium: Podium::default(),
                pole: None,
                fastest_lap: None,
                constructor: None,
                sprint_winner: None,
                sprint_pole: None,
            });

        entry.username = participant.username.clone();
        match part {
            PredictionPart::Main {
                podium,
                pole,
                fastest_lap,
            } => {
                entry.podium = podium.clone();
                entry.pole = pole.clone();
                entry.fastest_lap = fastest_lap.clone();
            }
            PredictionPart::Constructor(constructor) => {
                entry.constructor = Some(constructor.clone());
            }
            PredictionPart::Sprint { winner, pole } => {
                entry.sprint_winner = winner.clone();
                entry.sprint_pole = pole.clone();
            }
        }
        Ok(())
    }

    async fn list_predictions(&self, tenant: TenantId, season: i32, round: i32) -> Result<Vec<Prediction>> {
        let state = self.state();
        if state.failing_tenants.contains(&tenant) {
            return Err(PaddockError::DataUnavailable(format!(
                "predictions for tenant {tenant}"
            )));
        }
        Ok(state
            .predictions
            .values()
            .filter(|p| p.tenant_id == tenant && p.season == season && p.round == round)
            .cloned()
            .collect())
    }

    async fn save_season_prediction(&self, prediction: &SeasonPrediction) -> Result<()> {
        let mut state = self.state();
        let key = (prediction.tenant_id, prediction.participant_id, prediction.season);
        let merged = match state.season_predictions.get(&key) {
            Some(existing) => SeasonPrediction {
                driver_champion: prediction
                    .driver_champion
                    .clone()
                    .or_else(|| existing.driver_champion.clone()),
                constructor_champion: prediction
                    .constructor_champion
                    .clone()
                    .or_else(|| existing.constructor_champion.clone()),
                ..prediction.clone()
            },
            None => prediction.clone(),
        };
        state.season_predictions.insert(key, merged);
        Ok(())
    }

    async fn list_season_predictions(&self, tenant: TenantId, season: i32) -> Result<Vec<SeasonPrediction>> {
        let state = self.state();
        if state.failing_tenants.contains(&tenant) {
            return Err(PaddockError::DataUnavailable(format!(
                "season predictions for tenant {tenant}"
            )));
        }
        Ok(state
            .season_predictions
            .values()
            .filter(|p| p.tenant_id == tenant && p.season == season)
            .cloned()
            .collect())
    }

    async fn save_bold_prediction(&self, prediction: &BoldPrediction) -> Result<()> {
        let key = (
            prediction.tenant_id,
            prediction.participant_id,
            prediction.season,
            prediction.round,
        );
        let stored = BoldPrediction {
            confirmed: false,
            ..prediction.clone()
        };
        self.state().bold.insert(key, stored);
        Ok(())
    }

    async fn confirm_bold_prediction(
        &self,
        tenant: TenantId,
        participant: ParticipantId,
        season: i32,
        round: i32,
    ) -> Result<bool> {
        match self.state().bold.get_mut(&(tenant, participant, season, round)) {
            Some(claim) => {
                claim.confirmed = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn bold_tallies(&self, tenant: TenantId) -> Result<Vec<BoldTally>> {
        let state = self.state();
        let mut tallies: BTreeMap<ParticipantId, BoldTally> = BTreeMap::new();
        for claim in state
            .bold
            .values()
            .filter(|b| b.tenant_id == tenant && b.confirmed)
        {
            let tally = tallies.entry(claim.participant_id).or_insert_with(|| BoldTally {
                participant_id: claim.participant_id,
                username: claim.username.clone(),
                confirmed: 0,
            });
            tally.confirmed += 1;
        }
        Ok(tallies.into_values().collect())
    }

    async fn insert_outcome(&self, outcome: &Outcome) -> Result<bool> {
        let mut state = self.state();
        let key = (outcome.season, outcome.round);
        if state.outcomes.contains_key(&key) {
            return Ok(false);
        }
        state.outcomes.insert(key, outcome.clone());
        Ok(true)
    }

    async fn save_sprint_outcome(&self, sprint: &SprintOutcome) -> Result<()> {
        let mut state = self.state();
        let outcome = state
            .outcomes
            .get_mut(&(sprint.season, sprint.round))
            .ok_or_else(|| {
                PaddockError::NotFound(format!("outcome for {} round {}", sprint.season, sprint.round))
            })?;
        *outcome = outcome.clone().with_sprint(sprint);
        Ok(())
    }

    async fn get_outcome(&self, season: i32, round: i32) -> Result<Option<Outcome>> {
        Ok(self.state().outcomes.get(&(season, round)).cloned())
    }

    async fn save_final_standings(&self, standings: &FinalStandings) -> Result<()> {
        self.state()
            .standings
            .insert(standings.season, standings.clone());
        Ok(())
    }

    async fn get_final_standings(&self, season: i32) -> Result<Option<FinalStandings>> {
        Ok(self.state().standings.get(&season).cloned())
    }

    async fn record_leader(&self, season: i32, category: StandingsCategory, entrant: &str) -> Result<()> {
        let mut state = self.state();
        let exists = state
            .leaders
            .iter()
            .any(|(s, c, e)| *s == season && *c == category && e == entrant);
        if !exists {
            state.leaders.push((season, category, entrant.to_string()));
        }
        Ok(())
    }

    async fn leader_history(&self, season: i32) -> Result<LeaderHistory> {
        let mut history = LeaderHistory::default();
        for (_, category, entrant) in self.state().leaders.iter().filter(|(s, _, _)| *s == season) {
            history.push(*category, entrant.clone());
        }
        Ok(history)
    }

    async fn upsert_event_score(&self, score: &EventScore) -> Result<()> {
        let key = (score.tenant_id, score.participant_id, score.season, score.round);
        self.state().event_scores.insert(key, score.clone());
        Ok(())
    }

    async fn upsert_season_score(&self, score: &SeasonScore) -> Result<()> {
        let key = (score.tenant_id, score.participant_id, score.season);
        self.state().season_scores.insert(key, score.clone());
        Ok(())
    }

    async fn list_event_scores(&self, tenant: TenantId) -> Result<Vec<EventScore>> {
        Ok(self
            .state()
            .event_scores
            .values()
            .filter(|s| s.tenant_id == tenant)
            .cloned()
            .collect())
    }

    async fn list_season_scores(&self, tenant: TenantId) -> Result<Vec<SeasonScore>> {
        Ok(self
            .state()
            .season_scores
            .values()
            .filter(|s| s.tenant_id == tenant)
            .cloned()
            .collect())
    }

    async fn add_adjustment(&self, adjustment: &Adjustment) -> Result<()> {
        self.state().adjustments.push(adjustment.clone());
        Ok(())
    }

    async fn list_adjustments(&self, tenant: TenantId) -> Result<Vec<Adjustment>> {
        Ok(self
            .state()
            .adjustments
            .iter()
            .filter(|a| a.tenant_id == tenant)
            .cloned()
            .collect())
    }

    async fn has_event_marker(&self, tenant: TenantId, season: i32, round: i32) -> Result<bool> {
        Ok(self.state().event_markers.contains(&(tenant, season, round)))
    }

    async fn mark_event_scored(&self, tenant: TenantId, season: i32, round: i32) -> Result<()> {
        self.state().event_markers.insert((tenant, season, round));
        Ok(())
    }

    async fn has_season_marker(&self, tenant: TenantId, season: i32) -> Result<bool> {
        Ok(self.state().season_markers.contains(&(tenant, season)))
    }

    async fn mark_season_scored(&self, tenant: TenantId, season: i32) -> Result<()> {
        self.state().season_markers.insert((tenant, season));
        Ok(())
    }

    async fn replace_leaderboard(&self, tenant: TenantId, rows: &[LeaderboardRow]) -> Result<()> {
        self.state().leaderboards.insert(tenant, rows.to_vec());
        Ok(())
    }

    async fn leaderboard(&self, tenant: TenantId, limit: Option<i64>) -> Result<Vec<LeaderboardRow>> {
        let state = self.state();
        let rows = state.leaderboards.get(&tenant).map(Vec::as_slice).unwrap_or_default();
        let take = limit
            .map(|n| usize::try_from(n.max(0)).unwrap_or(usize::MAX))
            .unwrap_or(rows.len());
        Ok(rows.iter().take(take).cloned().collect())
    }

    async fn leaderboard_row(&self, tenant: TenantId, participant: ParticipantId) -> Result<Option<LeaderboardRow>> {
        Ok(self
            .state()
            .leaderboards
            .get(&tenant)
            .and_then(|rows| rows.iter().find(|r| r.participant_id == participant))
            .cloned())
    }
}

#[derive(Default)]
struct CalendarState {
    schedule: Vec<Event>,
    outcomes: HashMap<(i32, i32), Outcome>,
    sprints: HashMap<(i32, i32), SprintOutcome>,
    leaders: HashMap<(i32, i32), StandingsLeaders>,
    standings: HashMap<i32, FinalStandings>,
    offline: bool,
    calls: usize,
}

/// Scripted [`CalendarSource`]: returns whatever has been published to it.
#[derive(Default)]
pub struct StaticCalendar {
    state: Mutex<CalendarState>,
}

impl StaticCalendar {
    pub fn new(schedule: Vec<Event>) -> Self {
        let calendar = Self::default();
        calendar.set_schedule(schedule);
        calendar
    }

    fn state(&self) -> MutexGuard<'_, CalendarState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn checked(&self) -> Result<MutexGuard<'_, CalendarState>> {
        let mut state = self.state();
        state.calls += 1;
        if state.offline {
            return Err(PaddockError::DataUnavailable("calendar offline".to_string()));
        }
        Ok(state)
    }

    pub fn set_schedule(&self, schedule: Vec<Event>) {
        self.state().schedule = schedule;
    }

    pub fn publish_outcome(&self, outcome: Outcome) {
        self.state()
            .outcomes
            .insert((outcome.season, outcome.round), outcome);
    }

    pub fn publish_sprint(&self, sprint: SprintOutcome) {
        self.state().sprints.insert((sprint.season, sprint.round), sprint);
    }

    pub fn publish_leaders(&self, leaders: StandingsLeaders) {
        self.state()
            .leaders
            .insert((leaders.season, leaders.round), leaders);
    }

    pub fn publish_standings(&self, standings: FinalStandings) {
        self.state().standings.insert(standings.season, standings);
    }

    /// While offline every call fails with a transient error.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Number of calls made so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.state().calls
    }
}

#[async_trait]
impl CalendarSource for StaticCalendar {
    async fn schedule(&self, season: i32) -> Result<Vec<Event>> {
        Ok(self
            .checked()?
            .schedule
            .iter()
            .filter(|e| e.season == season)
            .cloned()
            .collect())
    }

    async fn outcome(&self, event: &Event) -> Result<Option<Outcome>> {
        Ok(self.checked()?.outcomes.get(&(event.season, event.round)).cloned())
    }

    async fn sprint_outcome(&self, event: &Event) -> Result<Option<SprintOutcome>> {
        Ok(self.checked()?.sprints.get(&(event.season, event.round)).cloned())
    }

    async fn standings_leaders(&self, season: i32, round: i32) -> Result<Option<StandingsLeaders>> {
        Ok(self.checked()?.leaders.get(&(season, round)).cloned())
    }

    async fn final_standings(&self, season: i32) -> Result<Option<FinalStandings>> {
        Ok(self.checked()?.standings.get(&season).cloned())
    }
}
