use serde::{Deserialize, Serialize};
use std::fmt;

use super::prediction::Podium;

/// Authoritative result of one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub season: i32,
    pub round: i32,
    pub event_name: String,
    pub podium: Podium,
    pub pole: Option<String>,
    /// Second fastest qualifier (consolation pole points)
    pub quali_second: Option<String>,
    pub fastest_lap: Option<String>,
    /// Team with the most points on race day
    pub constructor: Option<String>,
    pub is_sprint: bool,
    /// Back-filled separately on sprint weekends; `None` means no sprint was run or it is not in yet
    pub sprint_winner: Option<String>,
    pub sprint_pole: Option<String>,
}

/// Sprint session results, ingested after the main outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprintOutcome {
    pub season: i32,
    pub round: i32,
    pub winner: Option<String>,
    pub pole: Option<String>,
}

impl Outcome {
    pub fn with_sprint(mut self, sprint: &SprintOutcome) -> Self {
        self.is_sprint = true;
        self.sprint_winner = sprint.winner.clone();
        self.sprint_pole = sprint.pole.clone();
        self
    }

    pub fn has_sprint_results(&self) -> bool {
        self.sprint_winner.is_some() || self.sprint_pole.is_some()
    }
}

/// Championship table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandingsCategory {
    Drivers,
    Constructors,
}

impl StandingsCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            StandingsCategory::Drivers => "drivers",
            StandingsCategory::Constructors => "constructors",
        }
    }
}

impl fmt::Display for StandingsCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for StandingsCategory {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "drivers" => Ok(StandingsCategory::Drivers),
            "constructors" => Ok(StandingsCategory::Constructors),
            _ => Err(format!("Unknown standings category: {}", s)),
        }
    }
}

/// Settled end-of-season standings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalStandings {
    pub season: i32,
    pub driver_champion: String,
    pub driver_runner_up: Option<String>,
    pub constructor_champion: String,
    pub constructor_runner_up: Option<String>,
}

/// Standings leaders after a given round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingsLeaders {
    pub season: i32,
    pub round: i32,
    pub driver: Option<String>,
    pub constructor: Option<String>,
}
