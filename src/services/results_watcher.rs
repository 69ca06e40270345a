//! Waits for each round's results, ingests them and scores every tenant.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, instrument, warn};

use super::{ScoringMode, ScoringOutcome, ScoringService};
use crate::adapters::{CalendarSource, CompetitionStore};
use crate::clock::{Clock, Wake};
use crate::config::WatcherConfig;
use crate::coordination::ShutdownToken;
use crate::domain::{Event, StandingsCategory, Tenant};
use crate::error::Result;

/// Result of one ingest-and-score pass over a finished round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Every tenant has a marker for the round
    Complete,
    /// The calendar has not published the outcome yet
    OutcomePending,
    /// Some tenants failed and stay unmarked for the next pass
    TenantsFailed(usize),
}

pub struct ResultsWatcher {
    calendar: Arc<dyn CalendarSource>,
    store: Arc<dyn CompetitionStore>,
    scoring: ScoringService,
    clock: Clock,
    season: i32,
    cfg: WatcherConfig,
}

impl ResultsWatcher {
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

    async fn fully_scored(&self, tenants: &[Tenant], event: &Event) -> Result<bool> {
        for tenant in tenants {
            if !self
                .store
                .has_event_marker(tenant.id, event.season, event.round)
                .await?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Earliest round whose results are due but not scored for every tenant,
    /// else the first round whose results are still to come.
    pub async fn next_target(&self) -> Result<Option<Event>> {
        let mut schedule = self.calendar.schedule(self.season).await?;
        schedule.sort_by_key(|e| (e.results_at, e.round));
        let tenants = self.store.list_tenants().await?;
        let now = self.clock.now();

        for event in schedule {
            if event.results_at > now || !self.fully_scored(&tenants, &event).await? {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// Ingest the round's outcome (plus sprint results and standings leaders)
    /// and score every tenant that is not yet marked.
    #[instrument(skip(self, event), fields(round = event.round, event = %event.name))]
    pub async fn ingest_and_score(&self, event: &Event) -> Result<Pass> {
        let outcome = match self.store.get_outcome(event.season, event.round).await? {
            Some(stored) => stored,
            None => {
                info!("Fetching outcome");
                let Some(fetched) = self.calendar.outcome(event).await? else {
                    return Ok(Pass::OutcomePending);
                };
                if self.store.insert_outcome(&fetched).await? {
                    info!(podium = ?fetched.podium.slots(), "Outcome ingested");
                }
                fetched
            }
        };

        if event.format.is_sprint() && !outcome.has_sprint_results() {
            match self.calendar.sprint_outcome(event).await? {
                Some(sprint) => {
                    self.store.save_sprint_outcome(&sprint).await?;
                    info!(winner = ?sprint.winner, pole = ?sprint.pole, "Sprint results back-filled");
                }
                None if self.clock.now() < self.sprint_deadline(event) => {
                    info!("Sprint results not published yet; holding the round back");
                    return Ok(Pass::OutcomePending);
                }
                None => warn!("Sprint results still unavailable; scoring without them"),
            }
        }

        self.capture_leaders(event).await;

        let failed = self.score_tenants(event).await?;
        Ok(if failed == 0 {
            Pass::Complete
        } else {
            Pass::TenantsFailed(failed)
        })
    }

    /// Sprint results get one outcome backoff to show up after the race results are due.
    fn sprint_deadline(&self, event: &Event) -> DateTime<Utc> {
        event.results_at + Duration::seconds(self.cfg.outcome_backoff_secs as i64)
    }

    /// Best effort: a failure here must not hold up scoring.
    async fn capture_leaders(&self, event: &Event) {
        let leaders = match self.calendar.standings_leaders(event.season, event.round).await {
            Ok(Some(leaders)) => leaders,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Could not fetch standings leaders");
                return;
            }
        };

        let entries = [
            (StandingsCategory::Drivers, leaders.driver),
            (StandingsCategory::Constructors, leaders.constructor),
        ];
        for (category, entrant) in entries {
            let Some(entrant) = entrant else { continue };
            if let Err(e) = self.store.record_leader(event.season, category, &entrant).await {
                warn!(%category, %entrant, error = %e, "Could not record standings leader");
            }
        }
    }

    async fn score_tenants(&self, event: &Event) -> Result<usize> {
        let mut failed = 0;
        for tenant in self.store.list_tenants().await? {
            match self
                .scoring
                .score_event(tenant.id, event.season, event.round, ScoringMode::Automatic)
                .await
            {
                Ok(ScoringOutcome::Scored { participants }) => {
                    info!(tenant = tenant.id, round = event.round, participants, "Tenant scored");
                }
                Ok(ScoringOutcome::AlreadyScored) => {
                    debug!(tenant = tenant.id, round = event.round, "Tenant already scored");
                }
                Ok(ScoringOutcome::NoOutcome) => {
                    warn!(tenant = tenant.id, round = event.round, "Outcome vanished before scoring");
                    failed += 1;
                }
                Err(e) => {
                    error!(tenant = tenant.id, round = event.round, error = %e, "Scoring failed");
                    failed += 1;
                }
            }
        }
        Ok(failed)
    }

    /// Run until shutdown. Never returns an error; failures are logged and retried.
    pub async fn run_forever(&self, mut shutdown: ShutdownToken) {
        info!(season = self.season, "Results watcher starting");

        loop {
            let backoff = match self.next_target().await {
                Ok(None) => {
                    info!("No round left to wait for");
                    self.cfg.results_idle_secs
                }
                Ok(Some(event)) => {
                    let wait = event.results_at - self.clock.now();
                    if wait > Duration::zero() {
                        // Wake periodically in case the calendar moves the round
                        let recheck = Duration::seconds(self.cfg.results_recheck_secs as i64);
                        debug!(round = event.round, results_at = %event.results_at, "Waiting for results");
                        if self.clock.sleep(wait.min(recheck), &mut shutdown).await == Wake::Shutdown {
                            break;
                        }
                        continue;
                    }

                    match self.ingest_and_score(&event).await {
                        Ok(Pass::Complete) => continue,
                        Ok(Pass::OutcomePending) => {
                            info!(round = event.round, "Outcome not published yet; backing off");
                            self.cfg.outcome_backoff_secs
                        }
                        Ok(Pass::TenantsFailed(n)) => {
                            warn!(round = event.round, failed = n, "Retrying failed tenants later");
                            self.cfg.scoring_retry_secs
                        }
                        Err(e) if e.is_transient() => {
                            warn!(round = event.round, error = %e, "Results pass failed");
                            self.cfg.retry_backoff_secs
                        }
                        Err(e) => {
                            error!(round = event.round, error = %e, "Results pass failed");
                            self.cfg.backoff_after(&e, self.cfg.retry_backoff_secs)
                        }
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Could not derive next results target");
                    self.cfg.retry_backoff_secs
                }
                Err(e) => {
                    error!(error = %e, "Could not derive next results target");
                    self.cfg.backoff_after(&e, self.cfg.retry_backoff_secs)
                }
            };

            if self.clock.sleep_secs(backoff, &mut shutdown).await == Wake::Shutdown {
                break;
            }
        }

        info!("Results watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryStore, MockCalendarSource, StaticCalendar};
    use crate::coordination::{GracefulShutdown, ShutdownSignal};
    use crate::domain::event::fixtures::{at, event};
    use crate::domain::{
        EventFormat, Outcome, Participant, Podium, PredictionPart, SprintOutcome, StandingsLeaders,
    };
    use crate::error::PaddockError;
    use crate::leaderboard::LeaderboardAggregator;
    use crate::scoring::ScoringRules;

    fn outcome(round: i32) -> Outcome {
        Outcome {
            season: 2026,
            round,
            event_name: format!("Round {round} Grand Prix"),
            podium: Podium::new("X", "Y", "Z"),
            pole: Some("X".to_string()),
            quali_second: Some("Y".to_string()),
            fastest_lap: Some("Z".to_string()),
            constructor: Some("McLaren".to_string()),
            is_sprint: false,
            sprint_winner: None,
            sprint_pole: None,
        }
    }

    async fn store_with_tenants(ids: &[i64]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for &id in ids {
            store
                .upsert_tenant(&Tenant {
                    id,
                    name: format!("server-{id}"),
                })
                .await
                .unwrap();
        }
        store
    }

    fn watcher(calendar: Arc<dyn CalendarSource>, store: Arc<MemoryStore>, clock: Clock) -> ResultsWatcher {
        let dyn_store: Arc<dyn CompetitionStore> = store;
        let scoring = ScoringService::new(
            dyn_store.clone(),
            LeaderboardAggregator::new(dyn_store.clone(), 10),
            ScoringRules::default(),
        );
        ResultsWatcher::new(calendar, dyn_store, scoring, clock, 2026, WatcherConfig::default())
    }

    #[tokio::test]
    async fn test_target_skips_fully_scored_rounds() {
        let store = store_with_tenants(&[1, 2]).await;
        let calendar = Arc::new(StaticCalendar::new(vec![
            event(1, at(3, 8, 4), EventFormat::Standard),
            event(2, at(3, 22, 7), EventFormat::Standard),
            event(3, at(4, 5, 6), EventFormat::Standard),
        ]));
        let w = watcher(calendar, store.clone(), Clock::fixed(at(3, 25, 0), 1.0).unwrap());

        store.mark_event_scored(1, 2026, 1).await.unwrap();
        store.mark_event_scored(2, 2026, 1).await.unwrap();
        store.mark_event_scored(1, 2026, 2).await.unwrap();

        // Round 2 still owes tenant 2
        assert_eq!(w.next_target().await.unwrap().unwrap().round, 2);

        store.mark_event_scored(2, 2026, 2).await.unwrap();
        assert_eq!(w.next_target().await.unwrap().unwrap().round, 3);
    }

    #[tokio::test]
    async fn test_pending_outcome_leaves_tenants_unmarked() {
        let store = store_with_tenants(&[1]).await;
        let round = event(4, at(4, 19, 15), EventFormat::Standard);
        let calendar = Arc::new(StaticCalendar::new(vec![round.clone()]));
        let w = watcher(calendar, store.clone(), Clock::fixed(at(4, 21, 0), 1.0).unwrap());

        assert_eq!(w.ingest_and_score(&round).await.unwrap(), Pass::OutcomePending);
        assert!(!store.has_event_marker(1, 2026, 4).await.unwrap());
    }

    #[tokio::test]
    async fn test_one_failing_tenant_does_not_block_others() {
        let store = store_with_tenants(&[1, 2, 3]).await;
        let round = event(4, at(4, 19, 15), EventFormat::Standard);
        let calendar = Arc::new(StaticCalendar::new(vec![round.clone()]));
        calendar.publish_outcome(outcome(4));
        let w = watcher(calendar, store.clone(), Clock::fixed(at(4, 21, 0), 1.0).unwrap());

        store.fail_tenant(2, true);
        assert_eq!(w.ingest_and_score(&round).await.unwrap(), Pass::TenantsFailed(1));
        assert!(store.has_event_marker(1, 2026, 4).await.unwrap());
        assert!(!store.has_event_marker(2, 2026, 4).await.unwrap());
        assert!(store.has_event_marker(3, 2026, 4).await.unwrap());

        store.fail_tenant(2, false);
        assert_eq!(w.ingest_and_score(&round).await.unwrap(), Pass::Complete);
        assert!(store.has_event_marker(2, 2026, 4).await.unwrap());
    }

    #[tokio::test]
    async fn test_sprint_backfill_and_leader_capture() {
        let store = store_with_tenants(&[1]).await;
        let round = event(6, at(5, 3, 20), EventFormat::Sprint);
        let calendar = Arc::new(StaticCalendar::new(vec![round.clone()]));
        // Outcome already stored by an earlier pass without the sprint
        store.insert_outcome(&outcome(6)).await.unwrap();
        calendar.publish_sprint(SprintOutcome {
            season: 2026,
            round: 6,
            winner: Some("Y".to_string()),
            pole: Some("X".to_string()),
        });
        calendar.publish_leaders(StandingsLeaders {
            season: 2026,
            round: 6,
            driver: Some("PIA".to_string()),
            constructor: Some("McLaren".to_string()),
        });

        let sprint_call = PredictionPart::Sprint {
            winner: Some("Y".to_string()),
            pole: Some("X".to_string()),
        };
        store
            .save_prediction_part(1, &Participant::new(8, "oscar"), &round, &sprint_call)
            .await
            .unwrap();

        let w = watcher(calendar, store.clone(), Clock::fixed(at(5, 5, 0), 1.0).unwrap());
        assert_eq!(w.ingest_and_score(&round).await.unwrap(), Pass::Complete);

        let stored = store.get_outcome(2026, 6).await.unwrap().unwrap();
        assert_eq!(stored.sprint_winner.as_deref(), Some("Y"));
        assert_eq!(store.leaderboard_row(1, 8).await.unwrap().unwrap().total_points, 6);

        let history = store.leader_history(2026).await.unwrap();
        assert_eq!(history.drivers, vec!["PIA".to_string()]);
        assert_eq!(history.constructors, vec!["McLaren".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_sprint_waits_one_backoff() {
        let store = store_with_tenants(&[1]).await;
        let round = event(6, at(5, 3, 20), EventFormat::Sprint);
        let calendar = Arc::new(StaticCalendar::new(vec![round.clone()]));
        calendar.publish_outcome(outcome(6));

        let grace = Duration::seconds(WatcherConfig::default().outcome_backoff_secs as i64);
        let early = watcher(
            calendar.clone(),
            store.clone(),
            Clock::fixed(round.results_at + grace - Duration::minutes(1), 1.0).unwrap(),
        );
        assert_eq!(early.ingest_and_score(&round).await.unwrap(), Pass::OutcomePending);
        assert!(!store.has_event_marker(1, 2026, 6).await.unwrap());
        assert!(store.get_outcome(2026, 6).await.unwrap().is_some());

        let late = watcher(
            calendar,
            store.clone(),
            Clock::fixed(round.results_at + grace + Duration::seconds(1), 1.0).unwrap(),
        );
        assert_eq!(late.ingest_and_score(&round).await.unwrap(), Pass::Complete);
        assert!(store.has_event_marker(1, 2026, 6).await.unwrap());
        let stored = store.get_outcome(2026, 6).await.unwrap().unwrap();
        assert!(stored.sprint_winner.is_none());
    }

    #[tokio::test]
    async fn test_leader_failure_is_not_fatal() {
        let store = store_with_tenants(&[1]).await;
        let round = event(4, at(4, 19, 15), EventFormat::Standard);

        let mut calendar = MockCalendarSource::new();
        calendar.expect_outcome().returning(|_| Ok(Some(outcome(4))));
        calendar
            .expect_standings_leaders()
            .returning(|_, _| Err(PaddockError::DataUnavailable("standings".to_string())));

        let w = watcher(Arc::new(calendar), store.clone(), Clock::fixed(at(4, 21, 0), 1.0).unwrap());
        assert_eq!(w.ingest_and_score(&round).await.unwrap(), Pass::Complete);
        assert!(store.has_event_marker(1, 2026, 4).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_mid_wait_has_no_side_effects() {
        let store = store_with_tenants(&[1]).await;
        let round = event(4, at(4, 19, 15), EventFormat::Standard);
        let calendar = Arc::new(StaticCalendar::new(vec![round]));
        calendar.publish_outcome(outcome(4));

        // Results are due a week after the anchor
        let w = watcher(calendar, store.clone(), Clock::anchored(at(4, 13, 0), 1.0).unwrap());
        let shutdown = GracefulShutdown::new();
        let token = shutdown.token();
        let handle = tokio::spawn(async move { w.run_forever(token).await });

        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        shutdown.request_shutdown(ShutdownSignal::Graceful);
        handle.await.unwrap();

        assert!(store.get_outcome(2026, 4).await.unwrap().is_none());
        assert!(!store.has_event_marker(1, 2026, 4).await.unwrap());
    }
}
