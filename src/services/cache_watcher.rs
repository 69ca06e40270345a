//! Keeps the [`EventCache`] pointed at the round that is open for predictions.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, error, info, instrument, warn};

use super::EventCache;
use crate::adapters::{CalendarSource, CompetitionStore};
use crate::clock::{Clock, Wake};
use crate::config::WatcherConfig;
use crate::coordination::ShutdownToken;
use crate::domain::CurrentEvent;
use crate::error::Result;

pub struct CacheWatcher {
    calendar: Arc<dyn CalendarSource>,
    store: Arc<dyn CompetitionStore>,
    cache: Arc<EventCache>,
    clock: Clock,
    season: i32,
    refresh_lead: Duration,
    cfg: WatcherConfig,
}

impl CacheWatcher {
    pub fn new(
        calendar: Arc<dyn CalendarSource>,
        store: Arc<dyn CompetitionStore>,
        cache: Arc<EventCache>,
        clock: Clock,
        season: i32,
        refresh_lead: Duration,
        cfg: WatcherConfig,
    ) -> Self {
        Self {
            calendar,
            store,
            cache,
            clock,
            season,
            refresh_lead,
            cfg,
        }
    }

    /// Re-derive the current round and swap it into the cache. Writes nothing.
    ///
    /// A calendar error leaves the previous snapshot in place.
    pub async fn load(&self) -> Result<Option<Arc<CurrentEvent>>> {
        let schedule = self.calendar.schedule(self.season).await?;
        let now = self.clock.now();

        match CurrentEvent::select(&schedule, now, self.refresh_lead) {
            Some(snapshot) => {
                info!(
                    round = snapshot.event.round,
                    event = %snapshot.event.name,
                    next_refresh = ?snapshot.next_refresh,
                    "Event cache loaded"
                );
                self.cache.install(snapshot);
            }
            None => {
                info!("No upcoming event; clearing event cache");
                self.cache.clear();
            }
        }

        Ok(self.cache.current())
    }

    /// [`load`](Self::load), then put race and sprint locks back to AUTO for
    /// every tenant if the cache moved on to a different round.
    ///
    /// The first load after startup has nothing to compare against and
    /// leaves the stored overrides alone.
    #[instrument(skip(self), fields(season = self.season))]
    pub async fn refresh(&self) -> Result<Option<Arc<CurrentEvent>>> {
        let previous = self.cache.event().map(|e| (e.season, e.round));
        let current = self.load().await?;
        let installed = current.as_ref().map(|c| (c.event.season, c.event.round));

        match (previous, installed) {
            (Some(before), Some(after)) if before != after => {
                info!(from = ?before, to = ?after, "New round installed; resetting event locks");
                for tenant in self.store.list_tenants().await? {
                    if let Err(e) = self.store.reset_event_locks(tenant.id).await {
                        warn!(tenant = tenant.id, error = %e, "Failed to reset locks");
                    }
                }
            }
            _ => debug!(round = ?installed, "Round unchanged; locks left as they are"),
        }

        Ok(current)
    }

    /// Run until shutdown. Never returns an error; failures are logged and retried.
    pub async fn run_forever(&self, mut shutdown: ShutdownToken) {
        info!(
            poll_secs = self.cfg.cache_poll_secs,
            backoff_secs = self.cfg.retry_backoff_secs,
            "Cache watcher starting"
        );
        let mut loaded = false;

        loop {
            let wait = if !loaded {
                Duration::zero()
            } else {
                match self.cache.next_refresh() {
                    Some(at) => at - self.clock.now(),
                    None => {
                        debug!("No refresh scheduled; polling");
                        Duration::seconds(self.cfg.cache_poll_secs as i64)
                    }
                }
            };
            let overdue = wait <= Duration::zero();

            if !overdue {
                debug!(wait_secs = wait.num_seconds(), "Waiting for next cache refresh");
                if self.clock.sleep(wait, &mut shutdown).await == Wake::Shutdown {
                    break;
                }
            }

            let backoff = match self.refresh().await {
                Ok(_) => {
                    let first = !loaded;
                    loaded = true;
                    // Keep an overdue refresh time from spinning the loop
                    (overdue && !first).then_some(self.cfg.min_refresh_gap_secs)
                }
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Event cache refresh failed; keeping previous snapshot");
                    Some(self.cfg.retry_backoff_secs)
                }
                Err(e) => {
                    error!(error = %e, "Event cache refresh failed; keeping previous snapshot");
                    Some(self.cfg.backoff_after(&e, self.cfg.retry_backoff_secs))
                }
            };

            if let Some(secs) = backoff {
                if self.clock.sleep_secs(secs, &mut shutdown).await == Wake::Shutdown {
                    break;
                }
            }
        }

        info!("Cache watcher stopped");
    }
}
