pub mod adapters;
pub mod cli;
pub mod clock;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod leaderboard;
pub mod scoring;
pub mod services;

pub use clock::Clock;
pub use config::AppConfig;
pub use coordination::{GracefulShutdown, ShutdownSignal, ShutdownToken};
pub use error::{PaddockError, Result};
pub use leaderboard::LeaderboardAggregator;
pub use services::{CacheWatcher, Competition, EventCache, ResultsWatcher, SeasonWatcher};
