//! Scoring Engine
//!
//! Pure functions from (prediction, outcome) to points. Nothing in here reads
//! the clock or touches storage.

pub mod championship;
pub mod event;
pub mod names;

pub use championship::{score_championship_call, score_season, LeaderHistory};
pub use event::{
    score_constructor, score_event, score_fastest_lap, score_podium, score_pole,
    score_sprint_call, ScoreCard, ScoringRules,
};
pub use names::{canonical_constructor, canonical_driver};
