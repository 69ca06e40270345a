//! Fires once after the final round: ingests final standings and scores
//! every tenant's championship predictions.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, instrument, warn};

use super::{Pass, ScoringMode, ScoringOutcome, ScoringService};
use crate::adapters::{CalendarSource, CompetitionStore};
use crate::clock::{Clock, Wake};
use crate::config::WatcherConfig;
use crate::coordination::ShutdownToken;
use crate::error::Result;

pub struct SeasonWatcher {
    calendar: Arc<dyn CalendarSource>,
    store: Arc<dyn CompetitionStore>,
    scoring: ScoringService,
    clock: Clock,
    season: i32,
    cfg: WatcherConfig,
}

impl SeasonWatcher {
    pub fn new(
        calendar: Arc<dyn CalendarSource>,
        store: Arc<dyn CompetitionStore>,
        scoring: ScoringService,
        clock: Clock,
        season: i32,
        cfg: WatcherConfig,
    ) -> Self {
        Self {
            calendar,
            store,
            scoring,
            clock,
            season,
            cfg,
        }
    }

    /// Final round's results time plus the grace period.
    pub async fn season_end(&self) -> Result<Option<DateTime<Utc>>> {
        let schedule = self.calendar.schedule(self.season).await?;
        Ok(schedule
            .iter()
            .map(|e| e.results_at)
            .max()
            .map(|last| last + Duration::hours(self.cfg.season_grace_hours)))
    }

    async fn all_tenants_scored(&self) -> Result<bool> {
        let tenants = self.store.list_tenants().await?;
        for tenant in &tenants {
            if !self.store.has_season_marker(tenant.id, self.season).await? {
                return Ok(false);
            }
        }
        Ok(!tenants.is_empty())
    }

    /// One attempt: fetch standings, store them, score unmarked tenants.
    #[instrument(skip(self), fields(season = self.season))]
    pub async fn ingest_and_score(&self) -> Result<Pass> {
        let Some(standings) = self.calendar.final_standings(self.season).await? else {
            return Ok(Pass::OutcomePending);
        };
        self.store.save_final_standings(&standings).await?;
        info!(
            driver = %standings.driver_champion,
            constructor = %standings.constructor_champion,
            "Final standings ingested"
        );

        let mut failed = 0;
        for tenant in self.store.list_tenants().await? {
            match self
                .scoring
                .score_season(tenant.id, self.season, ScoringMode::Automatic)
                .await
            {
                Ok(ScoringOutcome::Scored { participants }) => {
                    info!(tenant = tenant.id, participants, "Championship predictions scored");
                }
                Ok(ScoringOutcome::AlreadyScored) => {
                    debug!(tenant = tenant.id, "Championship already scored");
                }
                Ok(ScoringOutcome::NoOutcome) => failed += 1,
                Err(e) => {
                    error!(tenant = tenant.id, error = %e, "Championship scoring failed");
                    failed += 1;
                }
            }
        }

        Ok(if failed == 0 {
            Pass::Complete
        } else {
            Pass::TenantsFailed(failed)
        })
    }

    /// Wait for season end, then make a bounded number of attempts.
    ///
    /// Returns after success, after the last attempt, or on shutdown.
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(season = self.season, "Season watcher starting");

        match self.all_tenants_scored().await {
            Ok(true) => {
                info!("Season already scored for every tenant");
                return;
            }
            Ok(false) => {}
            Err(e) if e.is_transient() => warn!(error = %e, "Could not check season markers"),
            Err(e) => error!(error = %e, "Could not check season markers"),
        }

        loop {
            let backoff = match self.season_end().await {
                Ok(Some(end)) => {
                    let wait = end - self.clock.now();
                    if wait <= Duration::zero() {
                        break;
                    }
                    debug!(season_end = %end, "Waiting for season end");
                    wait.min(Duration::seconds(self.cfg.results_idle_secs as i64))
                }
                Ok(None) => {
                    info!("Season has no scheduled rounds yet");
                    Duration::seconds(self.cfg.results_idle_secs as i64)
                }
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Could not derive season end");
                    Duration::seconds(self.cfg.retry_backoff_secs as i64)
                }
                Err(e) => {
                    error!(error = %e, "Could not derive season end");
                    Duration::seconds(self.cfg.backoff_after(&e, self.cfg.retry_backoff_secs) as i64)
                }
            };
            if self.clock.sleep(backoff, &mut shutdown).await == Wake::Shutdown {
                info!("Season watcher stopped");
                return;
            }
        }

        let attempts = self.cfg.season_attempts;
        for attempt in 1..=attempts {
            let backoff = match self.ingest_and_score().await {
                Ok(Pass::Complete) => {
                    info!("Season scoring complete");
                    return;
                }
                Ok(Pass::OutcomePending) => {
                    info!(attempt, attempts, "Final standings not settled yet");
                    self.cfg.season_backoff_secs
                }
                Ok(Pass::TenantsFailed(n)) => {
                    warn!(attempt, attempts, failed = n, "Some tenants failed championship scoring");
                    self.cfg.season_backoff_secs
                }
                Err(e) if e.is_transient() => {
                    warn!(attempt, attempts, error = %e, "Final standings attempt failed");
                    self.cfg.season_backoff_secs
                }
                Err(e) => {
                    error!(attempt, attempts, error = %e, "Final standings attempt failed");
                    self.cfg.backoff_after(&e, self.cfg.season_backoff_secs)
                }
            };

            if attempt < attempts && self.clock.sleep_secs(backoff, &mut shutdown).await == Wake::Shutdown
            {
                info!("Season watcher stopped");
                return;
            }
        }

        warn!(attempts, "Giving up on final standings until next restart");
    }
}
