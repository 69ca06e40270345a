use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::traits::CompetitionStore;
use crate::domain::{
    Adjustment, BoldPrediction, BoldTally, Event, EventScore, FinalStandings, LeaderboardRow,
    LockCategory, LockChange, LockOverride, Outcome, Participant, ParticipantId, Podium,
    Prediction, PredictionPart, SeasonPrediction, SeasonScore, SprintOutcome, StandingsCategory,
    Tenant, TenantId, TieBreakHits,
};
use crate::error::{PaddockError, Result};
use crate::scoring::LeaderHistory;

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    /// Serializes writers across clones; reads bypass it
    write_gate: Arc<Mutex<()>>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self::from_pool(pool))
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn podium_from_row(row: &PgRow) -> Podium {
    Podium {
        p1: row.get("p1"),
        p2: row.get("p2"),
        p3: row.get("p3"),
    }
}

fn hits_from_row(row: &PgRow) -> TieBreakHits {
    TieBreakHits {
        perfect_podiums: row.get("perfect_podiums"),
        podium_hits: row.get("podium_hits"),
        pole_hits: row.get("pole_hits"),
        fastest_lap_hits: row.get("fastest_lap_hits"),
        constructor_hits: row.get("constructor_hits"),
    }
}

fn outcome_from_row(row: &PgRow) -> Outcome {
    Outcome {
        season: row.get("season"),
        round: row.get("round"),
        event_name: row.get("event_name"),
        podium: podium_from_row(row),
        pole: row.get("pole"),
        quali_second: row.get("quali_second"),
        fastest_lap: row.get("fastest_lap"),
        constructor: row.get("constructor"),
        is_sprint: row.get("is_sprint"),
        sprint_winner: row.get("sprint_winner"),
        sprint_pole: row.get("sprint_pole"),
    }
}

fn leaderboard_from_row(row: &PgRow) -> LeaderboardRow {
    LeaderboardRow {
        tenant_id: row.get("tenant_id"),
        participant_id: row.get("participant_id"),
        username: row.get("username"),
        total_points: row.get("total_points"),
        hits: hits_from_row(row),
        rank: row.get("rank"),
        position: row.get("position"),
    }
}

fn parse_lock_state(value: Option<String>) -> Result<Option<LockOverride>> {
    value
        .map(|s| LockOverride::try_from(s.as_str()).map_err(PaddockError::Validation))
        .transpose()
}

const LEADERBOARD_COLUMNS: &str = "tenant_id, participant_id, username, total_points, \
     perfect_podiums, podium_hits, pole_hits, fastest_lap_hits, constructor_hits, rank, position";

#[async_trait]
impl CompetitionStore for PostgresStore {
    // ==================== Tenants ====================

    #[instrument(skip(self))]
    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        sqlx::query(
            r#"
            INSERT INTO tenants (id, name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                updated_at = NOW()
            "#,
        )
        .bind(tenant.id)
        .bind(&tenant.name)
        .execute(&self.pool)
        .await?;

        // Race and sprint follow their deadline; season stays unset (closed)
        sqlx::query(
            r#"
            INSERT INTO lock_overrides (tenant_id, category, state)
            VALUES ($1, 'race', 'AUTO'), ($1, 'sprint', 'AUTO')
            ON CONFLICT (tenant_id, category) DO NOTHING
            "#,
        )
        .bind(tenant.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let rows = sqlx::query("SELECT id, name FROM tenants ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|r| Tenant {
                id: r.get("id"),
                name: r.get("name"),
            })
            .collect())
    }

    // ==================== Locks ====================

    async fn get_lock(&self, tenant: TenantId, category: LockCategory) -> Result<Option<LockOverride>> {
        let row = sqlx::query(
            "SELECT state FROM lock_overrides WHERE tenant_id = $1 AND category = $2",
        )
        .bind(tenant)
        .bind(category.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => parse_lock_state(r.get("state")),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn set_lock(&self, change: &LockChange) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        let state = change.state.map(|s| s.as_str());

        sqlx::query(
            r#"
            INSERT INTO lock_overrides (tenant_id, category, state, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, category) DO UPDATE SET
                state = EXCLUDED.state,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(change.tenant_id)
        .bind(change.category.as_str())
        .bind(state)
        .bind(change.at)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO prediction_lock_log (tenant_id, category, state, actor, changed_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(change.tenant_id)
        .bind(change.category.as_str())
        .bind(state)
        .bind(&change.actor)
        .bind(change.at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn reset_event_locks(&self, tenant: TenantId) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        sqlx::query(
            r#"
            INSERT INTO lock_overrides (tenant_id, category, state)
            VALUES ($1, 'race', 'AUTO'), ($1, 'sprint', 'AUTO')
            ON CONFLICT (tenant_id, category) DO UPDATE SET
                state = 'AUTO',
                updated_at = NOW()
            "#,
        )
        .bind(tenant)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== Predictions ====================

    #[instrument(skip(self, event, part), fields(round = event.round))]
    async fn save_prediction_part(
        &self,
        tenant: TenantId,
        participant: &Participant,
        event: &Event,
        part: &PredictionPart,
    ) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        let query = match part {
            PredictionPart::Main {
                podium,
                pole,
                fastest_lap,
            } => sqlx::query(
                r#"
                INSERT INTO predictions
                    (tenant_id, participant_id, username, season, round, event_name,
                     p1, p2, p3, pole, fastest_lap)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (tenant_id, participant_id, season, round) DO UPDATE SET
                    username = EXCLUDED.username,
                    p1 = EXCLUDED.p1,
                    p2 = EXCLUDED.p2,
                    p3 = EXCLUDED.p3,
                    pole = EXCLUDED.pole,
                    fastest_lap = EXCLUDED.fastest_lap,
                    updated_at = NOW()
                "#,
            )
            .bind(tenant)
            .bind(participant.id)
            .bind(&participant.username)
            .bind(event.season)
            .bind(event.round)
            .bind(&event.name)
            .bind(podium.p1.as_deref())
            .bind(podium.p2.as_deref())
            .bind(podium.p3.as_deref())
            .bind(pole.as_deref())
            .bind(fastest_lap.as_deref()),
            PredictionPart::Constructor(constructor) => sqlx::query(
                r#"
                INSERT INTO predictions
                    (tenant_id, participant_id, username, season, round, event_name, constructor)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (tenant_id, participant_id, season, round) DO UPDATE SET
                    username = EXCLUDED.username,
                    constructor = EXCLUDED.constructor,
                    updated_at = NOW()
                "#,
            )
            .bind(tenant)
            .bind(participant.id)
            .bind(&participant.username)
            .bind(event.season)
            .bind(event.round)
            .bind(&event.name)
            .bind(constructor.as_str()),
            PredictionPart::Sprint { winner, pole } => sqlx::query(
                r#"
                INSERT INTO predictions
                    (tenant_id, participant_id, username, season, round, event_name,
                     sprint_winner, sprint_pole)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (tenant_id, participant_id, season, round) DO UPDATE SET
                    username = EXCLUDED.username,
                    sprint_winner = EXCLUDED.sprint_winner,
                    sprint_pole = EXCLUDED.sprint_pole,
                    updated_at = NOW()
                "#,
            )
            .bind(tenant)
            .bind(participant.id)
            .bind(&participant.username)
            .bind(event.season)
            .bind(event.round)
            .bind(&event.name)
            .bind(winner.as_deref())
            .bind(pole.as_deref()),
        };

        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn list_predictions(&self, tenant: TenantId, season: i32, round: i32) -> Result<Vec<Prediction>> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, participant_id, username, season, round, event_name,
                   p1, p2, p3, pole, fastest_lap, constructor, sprint_winner, sprint_pole
            FROM predictions
            WHERE tenant_id = $1 AND season = $2 AND round = $3
            ORDER BY participant_id
            "#,
        )
        .bind(tenant)
        .bind(season)
        .bind(round)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| Prediction {
                tenant_id: r.get("tenant_id"),
                participant_id: r.get("participant_id"),
                username: r.get("username"),
                season: r.get("season"),
                round: r.get("round"),
                event_name: r.get("event_name"),
                podium: podium_from_row(r),
                pole: r.get("pole"),
                fastest_lap: r.get("fastest_lap"),
                constructor: r.get("constructor"),
                sprint_winner: r.get("sprint_winner"),
                sprint_pole: r.get("sprint_pole"),
            })
            .collect())
    }

    #[instrument(skip(self, prediction), fields(tenant = prediction.tenant_id))]
    async fn save_season_prediction(&self, prediction: &SeasonPrediction) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        sqlx::query(
            r#"
            INSERT INTO season_predictions
                (tenant_id, participant_id, username, season, driver_champion, constructor_champion)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, participant_id, season) DO UPDATE SET
                username = EXCLUDED.username,
                driver_champion = COALESCE(EXCLUDED.driver_champion, season_predictions.driver_champion),
                constructor_champion = COALESCE(EXCLUDED.constructor_champion, season_predictions.constructor_champion),
                updated_at = NOW()
            "#,
        )
        .bind(prediction.tenant_id)
        .bind(prediction.participant_id)
        .bind(&prediction.username)
        .bind(prediction.season)
        .bind(prediction.driver_champion.as_deref())
        .bind(prediction.constructor_champion.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_season_predictions(&self, tenant: TenantId, season: i32) -> Result<Vec<SeasonPrediction>> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, participant_id, username, season, driver_champion, constructor_champion
            FROM season_predictions
            WHERE tenant_id = $1 AND season = $2
            ORDER BY participant_id
            "#,
        )
        .bind(tenant)
        .bind(season)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| SeasonPrediction {
                tenant_id: r.get("tenant_id"),
                participant_id: r.get("participant_id"),
                username: r.get("username"),
                season: r.get("season"),
                driver_champion: r.get("driver_champion"),
                constructor_champion: r.get("constructor_champion"),
            })
            .collect())
    }

    async fn save_bold_prediction(&self, prediction: &BoldPrediction) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        sqlx::query(
            r#"
            INSERT INTO bold_predictions
                (tenant_id, participant_id, username, season, round, claim, submitted_at, confirmed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE)
            ON CONFLICT (tenant_id, participant_id, season, round) DO UPDATE SET
                username = EXCLUDED.username,
                claim = EXCLUDED.claim,
                submitted_at = EXCLUDED.submitted_at,
                confirmed = FALSE
            "#,
        )
        .bind(prediction.tenant_id)
        .bind(prediction.participant_id)
        .bind(&prediction.username)
        .bind(prediction.season)
        .bind(prediction.round)
        .bind(&prediction.claim)
        .bind(prediction.submitted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn confirm_bold_prediction(
        &self,
        tenant: TenantId,
        participant: ParticipantId,
        season: i32,
        round: i32,
    ) -> Result<bool> {
        let _guard = self.write_gate.lock().await;
        let result = sqlx::query(
            r#"
            UPDATE bold_predictions SET confirmed = TRUE
            WHERE tenant_id = $1 AND participant_id = $2 AND season = $3 AND round = $4
            "#,
        )
        .bind(tenant)
        .bind(participant)
        .bind(season)
        .bind(round)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn bold_tallies(&self, tenant: TenantId) -> Result<Vec<BoldTally>> {
        let rows = sqlx::query(
            r#"
            SELECT participant_id, MAX(username) AS username, COUNT(*)::INTEGER AS confirmed
            FROM bold_predictions
            WHERE tenant_id = $1 AND confirmed
            GROUP BY participant_id
            "#,
        )
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| BoldTally {
                participant_id: r.get("participant_id"),
                username: r.get("username"),
                confirmed: r.get("confirmed"),
            })
            .collect())
    }

    // ==================== Outcomes ====================

    #[instrument(skip(self, outcome), fields(season = outcome.season, round = outcome.round))]
    async fn insert_outcome(&self, outcome: &Outcome) -> Result<bool> {
        let _guard = self.write_gate.lock().await;
        let result = sqlx::query(
            r#"
            INSERT INTO outcomes
                (season, round, event_name, p1, p2, p3, pole, quali_second, fastest_lap,
                 constructor, is_sprint, sprint_winner, sprint_pole)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (season, round) DO NOTHING
            "#,
        )
        .bind(outcome.season)
        .bind(outcome.round)
        .bind(&outcome.event_name)
        .bind(outcome.podium.p1.as_deref())
        .bind(outcome.podium.p2.as_deref())
        .bind(outcome.podium.p3.as_deref())
        .bind(outcome.pole.as_deref())
        .bind(outcome.quali_second.as_deref())
        .bind(outcome.fastest_lap.as_deref())
        .bind(outcome.constructor.as_deref())
        .bind(outcome.is_sprint)
        .bind(outcome.sprint_winner.as_deref())
        .bind(outcome.sprint_pole.as_deref())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if !inserted {
            debug!("Outcome already stored");
        }
        Ok(inserted)
    }

    #[instrument(skip(self, sprint), fields(season = sprint.season, round = sprint.round))]
    async fn save_sprint_outcome(&self, sprint: &SprintOutcome) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        let result = sqlx::query(
            r#"
            UPDATE outcomes SET is_sprint = TRUE, sprint_winner = $3, sprint_pole = $4
            WHERE season = $1 AND round = $2
            "#,
        )
        .bind(sprint.season)
        .bind(sprint.round)
        .bind(sprint.winner.as_deref())
        .bind(sprint.pole.as_deref())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PaddockError::NotFound(format!(
                "outcome for {} round {}",
                sprint.season, sprint.round
            )));
        }
        Ok(())
    }

    async fn get_outcome(&self, season: i32, round: i32) -> Result<Option<Outcome>> {
        let row = sqlx::query(
            r#"
            SELECT season, round, event_name, p1, p2, p3, pole, quali_second, fastest_lap,
                   constructor, is_sprint, sprint_winner, sprint_pole
            FROM outcomes WHERE season = $1 AND round = $2
            "#,
        )
        .bind(season)
        .bind(round)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(outcome_from_row))
    }

    #[instrument(skip(self, standings), fields(season = standings.season))]
    async fn save_final_standings(&self, standings: &FinalStandings) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        sqlx::query(
            r#"
            INSERT INTO final_standings
                (season, driver_champion, driver_runner_up, constructor_champion, constructor_runner_up)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (season) DO UPDATE SET
                driver_champion = EXCLUDED.driver_champion,
                driver_runner_up = EXCLUDED.driver_runner_up,
                constructor_champion = EXCLUDED.constructor_champion,
                constructor_runner_up = EXCLUDED.constructor_runner_up,
                recorded_at = NOW()
            "#,
        )
        .bind(standings.season)
        .bind(&standings.driver_champion)
        .bind(standings.driver_runner_up.as_deref())
        .bind(&standings.constructor_champion)
        .bind(standings.constructor_runner_up.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_final_standings(&self, season: i32) -> Result<Option<FinalStandings>> {
        let row = sqlx::query(
            r#"
            SELECT season, driver_champion, driver_runner_up, constructor_champion, constructor_runner_up
            FROM final_standings WHERE season = $1
            "#,
        )
        .bind(season)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| FinalStandings {
            season: r.get("season"),
            driver_champion: r.get("driver_champion"),
            driver_runner_up: r.get("driver_runner_up"),
            constructor_champion: r.get("constructor_champion"),
            constructor_runner_up: r.get("constructor_runner_up"),
        }))
    }

    async fn record_leader(&self, season: i32, category: StandingsCategory, entrant: &str) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        sqlx::query(
            r#"
            INSERT INTO leader_history (season, category, entrant)
            VALUES ($1, $2, $3)
            ON CONFLICT (season, category, entrant) DO NOTHING
            "#,
        )
        .bind(season)
        .bind(category.as_str())
        .bind(entrant)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn leader_history(&self, season: i32) -> Result<LeaderHistory> {
        let rows = sqlx::query(
            r#"
            SELECT category, entrant FROM leader_history
            WHERE season = $1
            ORDER BY first_seen_at, entrant
            "#,
        )
        .bind(season)
        .fetch_all(&self.pool)
        .await?;

        let mut history = LeaderHistory::default();
        for row in &rows {
            let category: String = row.get("category");
            let category =
                StandingsCategory::try_from(category.as_str()).map_err(PaddockError::Validation)?;
            history.push(category, row.get::<String, _>("entrant"));
        }
        Ok(history)
    }

    // ==================== Scores ====================

    async fn upsert_event_score(&self, score: &EventScore) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        sqlx::query(
            r#"
            INSERT INTO event_scores
                (tenant_id, participant_id, username, season, round, event_name, points,
                 perfect_podiums, podium_hits, pole_hits, fastest_lap_hits, constructor_hits)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (tenant_id, participant_id, season, round) DO UPDATE SET
                username = EXCLUDED.username,
                event_name = EXCLUDED.event_name,
                points = EXCLUDED.points,
                perfect_podiums = EXCLUDED.perfect_podiums,
                podium_hits = EXCLUDED.podium_hits,
                pole_hits = EXCLUDED.pole_hits,
                fastest_lap_hits = EXCLUDED.fastest_lap_hits,
                constructor_hits = EXCLUDED.constructor_hits,
                scored_at = NOW()
            "#,
        )
        .bind(score.tenant_id)
        .bind(score.participant_id)
        .bind(&score.username)
        .bind(score.season)
        .bind(score.round)
        .bind(&score.event_name)
        .bind(score.points)
        .bind(score.hits.perfect_podiums)
        .bind(score.hits.podium_hits)
        .bind(score.hits.pole_hits)
        .bind(score.hits.fastest_lap_hits)
        .bind(score.hits.constructor_hits)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_season_score(&self, score: &SeasonScore) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        sqlx::query(
            r#"
            INSERT INTO season_scores
                (tenant_id, participant_id, username, season, driver_points, constructor_points)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, participant_id, season) DO UPDATE SET
                username = EXCLUDED.username,
                driver_points = EXCLUDED.driver_points,
                constructor_points = EXCLUDED.constructor_points,
                scored_at = NOW()
            "#,
        )
        .bind(score.tenant_id)
        .bind(score.participant_id)
        .bind(&score.username)
        .bind(score.season)
        .bind(score.driver_points)
        .bind(score.constructor_points)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_event_scores(&self, tenant: TenantId) -> Result<Vec<EventScore>> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, participant_id, username, season, round, event_name, points,
                   perfect_podiums, podium_hits, pole_hits, fastest_lap_hits, constructor_hits
            FROM event_scores
            WHERE tenant_id = $1
            ORDER BY season, round, participant_id
            "#,
        )
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| EventScore {
                tenant_id: r.get("tenant_id"),
                participant_id: r.get("participant_id"),
                username: r.get("username"),
                season: r.get("season"),
                round: r.get("round"),
                event_name: r.get("event_name"),
                points: r.get("points"),
                hits: hits_from_row(r),
            })
            .collect())
    }

    async fn list_season_scores(&self, tenant: TenantId) -> Result<Vec<SeasonScore>> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, participant_id, username, season, driver_points, constructor_points
            FROM season_scores
            WHERE tenant_id = $1
            ORDER BY season, participant_id
            "#,
        )
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| SeasonScore {
                tenant_id: r.get("tenant_id"),
                participant_id: r.get("participant_id"),
                username: r.get("username"),
                season: r.get("season"),
                driver_points: r.get("driver_points"),
                constructor_points: r.get("constructor_points"),
            })
            .collect())
    }

    #[instrument(skip(self, adjustment), fields(tenant = adjustment.tenant_id, points = adjustment.points))]
    async fn add_adjustment(&self, adjustment: &Adjustment) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        sqlx::query(
            r#"
            INSERT INTO adjustments (tenant_id, participant_id, username, points, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(adjustment.tenant_id)
        .bind(adjustment.participant_id)
        .bind(&adjustment.username)
        .bind(adjustment.points)
        .bind(&adjustment.reason)
        .bind(adjustment.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_adjustments(&self, tenant: TenantId) -> Result<Vec<Adjustment>> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, participant_id, username, points, reason, created_at
            FROM adjustments
            WHERE tenant_id = $1
            ORDER BY id
            "#,
        )
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| Adjustment {
                tenant_id: r.get("tenant_id"),
                participant_id: r.get("participant_id"),
                username: r.get("username"),
                points: r.get("points"),
                reason: r.get("reason"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    // ==================== Scoring markers ====================

    async fn has_event_marker(&self, tenant: TenantId, season: i32, round: i32) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM event_markers WHERE tenant_id = $1 AND season = $2 AND round = $3",
        )
        .bind(tenant)
        .bind(season)
        .bind(round)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn mark_event_scored(&self, tenant: TenantId, season: i32, round: i32) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        sqlx::query(
            r#"
            INSERT INTO event_markers (tenant_id, season, round, scored_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, season, round) DO NOTHING
            "#,
        )
        .bind(tenant)
        .bind(season)
        .bind(round)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn has_season_marker(&self, tenant: TenantId, season: i32) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM season_markers WHERE tenant_id = $1 AND season = $2")
            .bind(tenant)
            .bind(season)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn mark_season_scored(&self, tenant: TenantId, season: i32) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        sqlx::query(
            r#"
            INSERT INTO season_markers (tenant_id, season, scored_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (tenant_id, season) DO NOTHING
            "#,
        )
        .bind(tenant)
        .bind(season)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== Leaderboard ====================

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn replace_leaderboard(&self, tenant: TenantId, rows: &[LeaderboardRow]) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM leaderboard WHERE tenant_id = $1")
            .bind(tenant)
            .execute(&mut *tx)
            .await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO leaderboard
                    (tenant_id, participant_id, username, total_points, perfect_podiums,
                     podium_hits, pole_hits, fastest_lap_hits, constructor_hits, rank, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(tenant)
            .bind(row.participant_id)
            .bind(&row.username)
            .bind(row.total_points)
            .bind(row.hits.perfect_podiums)
            .bind(row.hits.podium_hits)
            .bind(row.hits.pole_hits)
            .bind(row.hits.fastest_lap_hits)
            .bind(row.hits.constructor_hits)
            .bind(row.rank)
            .bind(row.position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Leaderboard rebuilt");
        Ok(())
    }

    async fn leaderboard(&self, tenant: TenantId, limit: Option<i64>) -> Result<Vec<LeaderboardRow>> {
        // LIMIT NULL means no limit
        let sql = format!(
            "SELECT {LEADERBOARD_COLUMNS} FROM leaderboard WHERE tenant_id = $1 ORDER BY position LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(leaderboard_from_row).collect())
    }

    async fn leaderboard_row(&self, tenant: TenantId, participant: ParticipantId) -> Result<Option<LeaderboardRow>> {
        let sql = format!(
            "SELECT {LEADERBOARD_COLUMNS} FROM leaderboard WHERE tenant_id = $1 AND participant_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(tenant)
            .bind(participant)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(leaderboard_from_row))
    }
}
