use std::sync::Arc;
use std::time::Duration;

use paddock::adapters::{CalendarSource, CompetitionStore, ErgastCalendar, PostgresStore};
use paddock::clock::Clock;
use paddock::config::{AppConfig, LoggingConfig};
use paddock::coordination::{install_signal_handlers, GracefulShutdown};
use paddock::domain::CurrentEvent;
use paddock::error::Result;
use paddock::leaderboard::LeaderboardAggregator;
use paddock::scoring::ScoringRules;
use paddock::services::{
    CacheWatcher, Competition, EventCache, ResultsWatcher, ScoringService, SeasonWatcher,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

pub fn init_logging(cfg: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},paddock=debug,sqlx=warn", cfg.level)));

    // `rolling::daily` panics if it cannot create the first file, so check the directory is writable first.
    let file_layer = cfg.dir.as_deref().and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!("Warning: Could not create log directory {log_dir} ({e}), file logging disabled");
            return None;
        }
        let write_test = std::path::Path::new(log_dir).join(".paddock_write_test");
        match std::fs::OpenOptions::new().create(true).append(true).open(&write_test) {
            Ok(_) => {
                let _ = std::fs::remove_file(&write_test);
                let file_appender = tracing_appender::rolling::daily(log_dir, "paddock.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                // Lives as long as the process
                Box::leak(Box::new(guard));
                eprintln!("Logging to: {log_dir}/paddock.log");
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!("Warning: Could not write to log directory {log_dir} ({e}), file logging disabled");
                None
            }
        }
    });

    let (json_layer, plain_layer) = if cfg.json {
        (Some(tracing_subscriber::fmt::layer().json().with_target(true)), None)
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .with(file_layer)
        .init();
}

pub fn init_logging_simple() {
    // Operator commands only want warnings on the console
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

/// Everything the daemon and the operator commands share
pub struct Runtime {
    pub config: AppConfig,
    pub store: Arc<PostgresStore>,
    pub competition: Competition,
    pub scoring: ScoringService,
    calendar: Arc<dyn CalendarSource>,
    cache: Arc<EventCache>,
    clock: Clock,
}

impl Runtime {
    pub async fn connect(config: AppConfig) -> Result<Self> {
        let store = Arc::new(
            PostgresStore::new(&config.database.url, config.database.max_connections).await?,
        );
        let calendar: Arc<dyn CalendarSource> = Arc::new(ErgastCalendar::new(&config.calendar)?);
        let clock = Clock::from_config(&config.clock)?;
        let cache = Arc::new(EventCache::new());

        let dyn_store: Arc<dyn CompetitionStore> = store.clone();
        let leaderboard =
            LeaderboardAggregator::new(dyn_store.clone(), config.scoring.bold_bonus_points);
        let scoring = ScoringService::new(
            dyn_store.clone(),
            leaderboard.clone(),
            ScoringRules::from(&config.scoring),
        );
        let competition = Competition::new(
            dyn_store,
            cache.clone(),
            scoring.clone(),
            leaderboard,
            clock,
            config.season,
        );

        Ok(Self {
            config,
            store,
            competition,
            scoring,
            calendar,
            cache,
            clock,
        })
    }

    pub async fn migrate(&self) -> Result<()> {
        self.store.migrate().await
    }

    fn cache_watcher(&self) -> CacheWatcher {
        CacheWatcher::new(
            self.calendar.clone(),
            self.store.clone(),
            self.cache.clone(),
            self.clock,
            self.config.season,
            chrono::Duration::days(self.config.calendar.refresh_lead_days),
            self.config.watchers.clone(),
        )
    }

    /// Load the current event once without touching any lock state.
    pub async fn load_cache(&self) -> Result<Option<Arc<CurrentEvent>>> {
        self.cache_watcher().load().await
    }

    /// Start the three watchers and block until a shutdown signal arrives.
    pub async fn run_until_shutdown(&self) {
        let shutdown = Arc::new(GracefulShutdown::new());
        install_signal_handlers(shutdown.clone());

        let cache_watcher = self.cache_watcher();
        let results_watcher = ResultsWatcher::new(
            self.calendar.clone(),
            self.store.clone(),
            self.scoring.clone(),
            self.clock,
            self.config.season,
            self.config.watchers.clone(),
        );
        let season_watcher = SeasonWatcher::new(
            self.calendar.clone(),
            self.store.clone(),
            self.scoring.clone(),
            self.clock,
            self.config.season,
            self.config.watchers.clone(),
        );

        let tasks: Vec<(&str, JoinHandle<()>)> = vec![
            ("cache watcher", {
                let token = shutdown.token();
                tokio::spawn(async move { cache_watcher.run_forever(token).await })
            }),
            ("results watcher", {
                let token = shutdown.token();
                tokio::spawn(async move { results_watcher.run_forever(token).await })
            }),
            ("season watcher", {
                let token = shutdown.token();
                tokio::spawn(async move { season_watcher.run(token).await })
            }),
        ];

        info!(
            season = self.config.season,
            multiplier = self.clock.multiplier(),
            "Watchers started"
        );

        let signal = shutdown.token().wait_for_shutdown().await;
        info!(%signal, "Shutting down watchers");

        for (name, handle) in tasks {
            match tokio::time::timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), handle).await {
                Ok(Ok(())) => info!("{name} stopped"),
                Ok(Err(e)) => warn!("{name} task failed: {e}"),
                Err(_) => warn!("{name} did not stop within {SHUTDOWN_TIMEOUT_SECS}s"),
            }
        }
    }
}
