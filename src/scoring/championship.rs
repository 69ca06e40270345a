use super::names::{canonical_constructor, canonical_driver, same_entrant};
use crate::domain::{FinalStandings, SeasonPrediction, SeasonScore, StandingsCategory};

pub const CHAMPION_POINTS: i32 = 25;
pub const RUNNER_UP_POINTS: i32 = 15;
pub const FORMER_LEADER_POINTS: i32 = 5;

/// Every entrant that led each standings table at some point in the season
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaderHistory {
    pub drivers: Vec<String>,
    pub constructors: Vec<String>,
}

impl LeaderHistory {
    pub fn push(&mut self, category: StandingsCategory, entrant: impl Into<String>) {
        match category {
            StandingsCategory::Drivers => self.drivers.push(entrant.into()),
            StandingsCategory::Constructors => self.constructors.push(entrant.into()),
        }
    }
}

/// Champion, else runner-up, else any former leader. Stops at the first rung that matches.
pub fn score_championship_call(
    predicted: Option<&str>,
    champion: &str,
    runner_up: Option<&str>,
    former_leaders: &[String],
    canon: fn(&str) -> String,
) -> i32 {
    if same_entrant(predicted, Some(champion), canon) {
        CHAMPION_POINTS
    } else if same_entrant(predicted, runner_up, canon) {
        RUNNER_UP_POINTS
    } else if former_leaders
        .iter()
        .any(|leader| same_entrant(predicted, Some(leader), canon))
    {
        FORMER_LEADER_POINTS
    } else {
        0
    }
}

/// Score one participant's championship forecast against the settled standings.
pub fn score_season(
    prediction: &SeasonPrediction,
    standings: &FinalStandings,
    history: &LeaderHistory,
) -> SeasonScore {
    let driver_points = score_championship_call(
        prediction.driver_champion.as_deref(),
        &standings.driver_champion,
        standings.driver_runner_up.as_deref(),
        &history.drivers,
        canonical_driver,
    );
    let constructor_points = score_championship_call(
        prediction.constructor_champion.as_deref(),
        &standings.constructor_champion,
        standings.constructor_runner_up.as_deref(),
        &history.constructors,
        canonical_constructor,
    );

    SeasonScore {
        tenant_id: prediction.tenant_id,
        participant_id: prediction.participant_id,
        username: prediction.username.clone(),
        season: prediction.season,
        driver_points,
        constructor_points,
    }
}
