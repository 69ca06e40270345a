//! Applies the scoring engine to stored predictions, exactly once per tenant.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::adapters::CompetitionStore;
use crate::domain::TenantId;
use crate::error::Result;
use crate::leaderboard::LeaderboardAggregator;
use crate::scoring::{score_event, score_season, ScoringRules};

/// Whether an existing scoring marker should be honoured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    /// Watcher path: skip anything already marked
    Automatic,
    /// Operator override: re-score regardless of the marker
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringOutcome {
    Scored { participants: usize },
    AlreadyScored,
    /// Nothing to score against yet
    NoOutcome,
}

impl fmt::Display for ScoringOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringOutcome::Scored { participants } => write!(f, "scored {participants} participant(s)"),
            ScoringOutcome::AlreadyScored => write!(f, "already scored"),
            ScoringOutcome::NoOutcome => write!(f, "no outcome recorded"),
        }
    }
}

#[derive(Clone)]
pub struct ScoringService {
    store: Arc<dyn CompetitionStore>,
    leaderboard: LeaderboardAggregator,
    rules: ScoringRules,
}

impl ScoringService {
    pub fn new(store: Arc<dyn CompetitionStore>, leaderboard: LeaderboardAggregator, rules: ScoringRules) -> Self {
        Self {
            store,
            leaderboard,
            rules,
        }
    }

    /// Score one round for one tenant: scores, leaderboard, then the marker.
    ///
    /// Each step is idempotent, so a crash before the marker is written just
    /// means the next pass does the same work again.
    #[instrument(skip(self))]
    pub async fn score_event(&self, tenant: TenantId, season: i32, round: i32, mode: ScoringMode) -> Result<ScoringOutcome> {
        if mode == ScoringMode::Automatic && self.store.has_event_marker(tenant, season, round).await? {
            debug!("Round already scored");
            return Ok(ScoringOutcome::AlreadyScored);
        }
        let Some(outcome) = self.store.get_outcome(season, round).await? else {
            return Ok(ScoringOutcome::NoOutcome);
        };

        let predictions = self.store.list_predictions(tenant, season, round).await?;
        for prediction in &predictions {
            let card = score_event(prediction, &outcome, &self.rules);
            debug!(participant = prediction.participant_id, points = card.total(), "Scored prediction");
            self.store
                .upsert_event_score(&card.into_event_score(prediction, &outcome.event_name))
                .await?;
        }

        self.leaderboard.recompute(tenant).await?;
        self.store.mark_event_scored(tenant, season, round).await?;

        info!(participants = predictions.len(), "Round scored");
        Ok(ScoringOutcome::Scored {
            participants: predictions.len(),
        })
    }

    /// Score championship forecasts once final standings are stored.
    #[instrument(skip(self))]
    pub async fn score_season(&self, tenant: TenantId, season: i32, mode: ScoringMode) -> Result<ScoringOutcome> {
        if mode == ScoringMode::Automatic && self.store.has_season_marker(tenant, season).await? {
            debug!("Season already scored");
            return Ok(ScoringOutcome::AlreadyScored);
        }
        let Some(standings) = self.store.get_final_standings(season).await? else {
            return Ok(ScoringOutcome::NoOutcome);
        };

        let history = self.store.leader_history(season).await?;
        let predictions = self.store.list_season_predictions(tenant, season).await?;
        for prediction in &predictions {
            let score = score_season(prediction, &standings, &history);
            self.store.upsert_season_score(&score).await?;
        }

        self.leaderboard.recompute(tenant).await?;
        self.store.mark_season_scored(tenant, season).await?;

        info!(participants = predictions.len(), "Season scored");
        Ok(ScoringOutcome::Scored {
            participants: predictions.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::domain::event::fixtures::{at, event};
    use crate::domain::{
        EventFormat, FinalStandings, Outcome, Participant, Podium, PredictionPart, SeasonPrediction,
        StandingsCategory, Tenant,
    };

    async fn setup() -> (ScoringService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_tenant(&Tenant {
                id: 1,
                name: "grid".to_string(),
            })
            .await
            .unwrap();
        let dyn_store: Arc<dyn CompetitionStore> = store.clone();
        let service = ScoringService::new(
            dyn_store.clone(),
            LeaderboardAggregator::new(dyn_store, 10),
            ScoringRules::default(),
        );
        (service, store)
    }

    fn outcome() -> Outcome {
        Outcome {
            season: 2026,
            round: 5,
            event_name: "Round 5 Grand Prix".to_string(),
            podium: Podium::new("X", "Y", "Z"),
            pole: Some("X".to_string()),
            quali_second: Some("Y".to_string()),
            fastest_lap: Some("Z".to_string()),
            constructor: None,
            is_sprint: false,
            sprint_winner: None,
            sprint_pole: None,
        }
    }

    async fn predict(store: &MemoryStore, participant: i64, podium: Podium) {
        let round = event(5, at(5, 3, 20), EventFormat::Standard);
        let part = PredictionPart::Main {
            podium,
            pole: Some("X".to_string()),
            fastest_lap: Some("Y".to_string()),
        };
        store
            .save_prediction_part(1, &Participant::new(participant, format!("p{participant}")), &round, &part)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_marker_makes_second_pass_a_no_op() {
        let (service, store) = setup().await;
        store.insert_outcome(&outcome()).await.unwrap();
        predict(&store, 1, Podium::new("X", "Y", "Z")).await;

        let first = service.score_event(1, 2026, 5, ScoringMode::Automatic).await.unwrap();
        assert_eq!(first, ScoringOutcome::Scored { participants: 1 });
        let board = store.leaderboard(1, None).await.unwrap();
        assert_eq!(board[0].total_points, 13);

        // A late prediction must not sneak in through an automatic re-run
        predict(&store, 2, Podium::new("X", "Y", "Z")).await;
        let second = service.score_event(1, 2026, 5, ScoringMode::Automatic).await.unwrap();
        assert_eq!(second, ScoringOutcome::AlreadyScored);
        assert_eq!(store.leaderboard(1, None).await.unwrap(), board);
    }

    #[tokio::test]
    async fn test_forced_rescore_ignores_marker() {
        let (service, store) = setup().await;
        store.insert_outcome(&outcome()).await.unwrap();
        predict(&store, 1, Podium::new("X", "Y", "Z")).await;
        service.score_event(1, 2026, 5, ScoringMode::Automatic).await.unwrap();

        predict(&store, 1, Podium::new("Y", "X", "Z")).await;
        service.score_event(1, 2026, 5, ScoringMode::Forced).await.unwrap();

        let row = store.leaderboard_row(1, 1).await.unwrap().unwrap();
        // Right three with one in place (5) plus pole (3)
        assert_eq!(row.total_points, 8);
        assert_eq!(store.list_event_scores(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_outcome_leaves_round_unmarked() {
        let (service, store) = setup().await;
        let result = service.score_event(1, 2026, 5, ScoringMode::Automatic).await.unwrap();
        assert_eq!(result, ScoringOutcome::NoOutcome);
        assert!(!store.has_event_marker(1, 2026, 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_tenant_without_predictions_is_marked() {
        let (service, store) = setup().await;
        store.insert_outcome(&outcome()).await.unwrap();
        let result = service.score_event(1, 2026, 5, ScoringMode::Automatic).await.unwrap();
        assert_eq!(result, ScoringOutcome::Scored { participants: 0 });
        assert!(store.has_event_marker(1, 2026, 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_season_scoring_uses_leader_history() {
        let (service, store) = setup().await;
        store
            .save_final_standings(&FinalStandings {
                season: 2026,
                driver_champion: "NOR".to_string(),
                driver_runner_up: Some("VER".to_string()),
                constructor_champion: "McLaren".to_string(),
                constructor_runner_up: None,
            })
            .await
            .unwrap();
        store.record_leader(2026, StandingsCategory::Drivers, "PIA").await.unwrap();
        store
            .save_season_prediction(&SeasonPrediction {
                tenant_id: 1,
                participant_id: 3,
                username: "p3".to_string(),
                season: 2026,
                driver_champion: Some("PIA".to_string()),
                constructor_champion: Some("mclaren".to_string()),
            })
            .await
            .unwrap();

        service.score_season(1, 2026, ScoringMode::Automatic).await.unwrap();
        let row = store.leaderboard_row(1, 3).await.unwrap().unwrap();
        assert_eq!(row.total_points, 5 + 25);
        assert!(store.has_season_marker(1, 2026).await.unwrap());
        assert_eq!(
            service.score_season(1, 2026, ScoringMode::Automatic).await.unwrap(),
            ScoringOutcome::AlreadyScored
        );
    }
}
