use super::names::{canonical_constructor, canonical_driver, same_entrant};
use crate::config::ScoringConfig;
use crate::domain::{EventScore, Outcome, Podium, Prediction, TieBreakHits};
use std::collections::BTreeSet;

pub const PERFECT_PODIUM_POINTS: i32 = 10;
pub const TWO_SLOTS_POINTS: i32 = 7;
pub const RIGHT_THREE_ONE_SLOT_POINTS: i32 = 5;
pub const RIGHT_THREE_POINTS: i32 = 4;
pub const ONE_SLOT_POINTS: i32 = 2;

pub const POLE_POINTS: i32 = 3;
pub const POLE_RUNNER_UP_POINTS: i32 = 1;
pub const FASTEST_LAP_POINTS: i32 = 3;
pub const SPRINT_CALL_POINTS: i32 = 3;

/// Tunable point values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringRules {
    pub constructor_points: i32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            constructor_points: 3,
        }
    }
}

impl From<&ScoringConfig> for ScoringRules {
    fn from(cfg: &ScoringConfig) -> Self {
        Self {
            constructor_points: cfg.constructor_points,
        }
    }
}

/// Per-category points for one prediction against one outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreCard {
    pub podium: i32,
    pub pole: i32,
    pub fastest_lap: i32,
    pub constructor: i32,
    pub sprint_winner: i32,
    pub sprint_pole: i32,
    pub hits: TieBreakHits,
}

impl ScoreCard {
    pub fn total(&self) -> i32 {
        self.podium
            + self.pole
            + self.fastest_lap
            + self.constructor
            + self.sprint_winner
            + self.sprint_pole
    }

    pub fn into_event_score(self, prediction: &Prediction, event_name: &str) -> EventScore {
        EventScore {
            tenant_id: prediction.tenant_id,
            participant_id: prediction.participant_id,
            username: prediction.username.clone(),
            season: prediction.season,
            round: prediction.round,
            event_name: event_name.to_string(),
            points: self.total(),
            hits: self.hits,
        }
    }
}

fn exact_slots(predicted: &Podium, actual: &Podium) -> usize {
    predicted
        .slots()
        .into_iter()
        .zip(actual.slots())
        .filter(|&(p, a)| same_entrant(p, a, canonical_driver))
        .count()
}

fn same_three(predicted: &Podium, actual: &Podium) -> bool {
    let as_set = |podium: &Podium| -> Option<BTreeSet<String>> {
        podium
            .slots()
            .into_iter()
            .map(|slot| slot.map(canonical_driver).filter(|name| !name.is_empty()))
            .collect()
    };
    match (as_set(predicted), as_set(actual)) {
        (Some(p), Some(a)) => p == a,
        _ => false,
    }
}

/// Podium ladder. The first matching rung wins:
/// all three in order, two in the right slot, right three with at least one
/// in the right slot, right three all misplaced, one in the right slot.
pub fn score_podium(predicted: &Podium, actual: &Podium) -> i32 {
    let exact = exact_slots(predicted, actual);
    let same_set = same_three(predicted, actual);

    if exact == 3 {
        return PERFECT_PODIUM_POINTS;
    }
    if exact == 2 {
        return TWO_SLOTS_POINTS;
    }
    if same_set && exact >= 1 {
        return RIGHT_THREE_ONE_SLOT_POINTS;
    }
    if same_set && exact == 0 {
        return RIGHT_THREE_POINTS;
    }
    if exact == 1 {
        return ONE_SLOT_POINTS;
    }
    0
}

pub fn score_pole(predicted: Option<&str>, pole: Option<&str>, quali_second: Option<&str>) -> i32 {
    if same_entrant(predicted, pole, canonical_driver) {
        POLE_POINTS
    } else if same_entrant(predicted, quali_second, canonical_driver) {
        POLE_RUNNER_UP_POINTS
    } else {
        0
    }
}

pub fn score_fastest_lap(predicted: Option<&str>, actual: Option<&str>) -> i32 {
    if same_entrant(predicted, actual, canonical_driver) {
        FASTEST_LAP_POINTS
    } else {
        0
    }
}

pub fn score_constructor(predicted: Option<&str>, actual: Option<&str>, points: i32) -> i32 {
    if same_entrant(predicted, actual, canonical_constructor) {
        points
    } else {
        0
    }
}

/// Sprint winner or sprint pole. No sprint result means no points, never an error.
pub fn score_sprint_call(predicted: Option<&str>, actual: Option<&str>) -> i32 {
    match actual {
        Some(_) if same_entrant(predicted, actual, canonical_driver) => SPRINT_CALL_POINTS,
        _ => 0,
    }
}

/// Score one round for one participant.
pub fn score_event(prediction: &Prediction, outcome: &Outcome, rules: &ScoringRules) -> ScoreCard {
    let exact = exact_slots(&prediction.podium, &outcome.podium) as i32;
    let pole_hit = same_entrant(
        prediction.pole.as_deref(),
        outcome.pole.as_deref(),
        canonical_driver,
    );

    let card = ScoreCard {
        podium: score_podium(&prediction.podium, &outcome.podium),
        pole: score_pole(
            prediction.pole.as_deref(),
            outcome.pole.as_deref(),
            outcome.quali_second.as_deref(),
        ),
        fastest_lap: score_fastest_lap(
            prediction.fastest_lap.as_deref(),
            outcome.fastest_lap.as_deref(),
        ),
        constructor: score_constructor(
            prediction.constructor.as_deref(),
            outcome.constructor.as_deref(),
            rules.constructor_points,
        ),
        sprint_winner: score_sprint_call(
            prediction.sprint_winner.as_deref(),
            outcome.sprint_winner.as_deref(),
        ),
        sprint_pole: score_sprint_call(
            prediction.sprint_pole.as_deref(),
            outcome.sprint_pole.as_deref(),
        ),
        hits: TieBreakHits::default(),
    };

    ScoreCard {
        hits: TieBreakHits {
            perfect_podiums: i32::from(exact == 3),
            podium_hits: exact,
            pole_hits: i32::from(pole_hit),
            fastest_lap_hits: i32::from(card.fastest_lap > 0),
            constructor_hits: i32::from(card.constructor > 0),
        },
        ..card
    }
}
