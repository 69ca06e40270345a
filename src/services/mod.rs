pub mod cache_watcher;
pub mod competition;
pub mod event_cache;
pub mod lock_gate;
pub mod results_watcher;
pub mod scoring_service;
pub mod season_watcher;

pub use cache_watcher::CacheWatcher;
pub use competition::Competition;
pub use event_cache::EventCache;
pub use lock_gate::LockGate;
pub use results_watcher::{Pass, ResultsWatcher};
pub use scoring_service::{ScoringMode, ScoringOutcome, ScoringService};
pub use season_watcher::SeasonWatcher;
