//! Ergast-compatible calendar client (Jolpica mirror).

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::traits::CalendarSource;
use crate::config::CalendarConfig;
use crate::domain::{
    Event, EventFormat, FinalStandings, Outcome, Podium, SprintOutcome, StandingsLeaders,
};
use crate::error::{PaddockError, Result};

// ==================== API Response Types ====================

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "MRData")]
    mr_data: MrData,
}

#[derive(Debug, Deserialize)]
struct MrData {
    #[serde(rename = "RaceTable")]
    race_table: Option<RaceTable>,
    #[serde(rename = "StandingsTable")]
    standings_table: Option<StandingsTable>,
}

#[derive(Debug, Deserialize)]
struct RaceTable {
    #[serde(rename = "Races", default)]
    races: Vec<Race>,
}

#[derive(Debug, Deserialize)]
struct Session {
    date: String,
    time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    locality: String,
    country: String,
}

#[derive(Debug, Deserialize)]
struct Circuit {
    #[serde(rename = "Location")]
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Race {
    season: String,
    round: String,
    #[serde(rename = "raceName")]
    race_name: String,
    #[serde(rename = "Circuit")]
    circuit: Circuit,
    date: String,
    time: Option<String>,
    #[serde(rename = "Qualifying")]
    qualifying: Option<Session>,
    #[serde(rename = "Sprint")]
    sprint: Option<Session>,
    #[serde(rename = "SprintQualifying", alias = "SprintShootout")]
    sprint_qualifying: Option<Session>,
    #[serde(rename = "Results", default)]
    results: Vec<Classification>,
    #[serde(rename = "QualifyingResults", default)]
    qualifying_results: Vec<Classification>,
    #[serde(rename = "SprintResults", default)]
    sprint_results: Vec<Classification>,
}

#[derive(Debug, Deserialize)]
struct Driver {
    #[serde(rename = "driverId")]
    driver_id: String,
    code: Option<String>,
}

impl Driver {
    /// Three-letter code where the API has one
    fn ident(&self) -> String {
        self.code
            .clone()
            .unwrap_or_else(|| self.driver_id.to_uppercase())
    }
}

#[derive(Debug, Deserialize)]
struct Constructor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct FastestLap {
    rank: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Classification {
    #[serde(default)]
    points: Option<String>,
    #[serde(default)]
    grid: Option<String>,
    #[serde(rename = "Driver")]
    driver: Driver,
    #[serde(rename = "Constructor")]
    constructor: Option<Constructor>,
    #[serde(rename = "FastestLap")]
    fastest_lap: Option<FastestLap>,
}

#[derive(Debug, Deserialize)]
struct StandingsTable {
    #[serde(rename = "StandingsLists", default)]
    lists: Vec<StandingsList>,
}

#[derive(Debug, Deserialize)]
struct StandingsList {
    round: String,
    #[serde(rename = "DriverStandings", default)]
    drivers: Vec<DriverStanding>,
    #[serde(rename = "ConstructorStandings", default)]
    constructors: Vec<ConstructorStanding>,
}

#[derive(Debug, Deserialize)]
struct DriverStanding {
    #[serde(rename = "Driver")]
    driver: Driver,
}

#[derive(Debug, Deserialize)]
struct ConstructorStanding {
    #[serde(rename = "Constructor")]
    constructor: Constructor,
}

// ==================== Conversion ====================

fn parse_number(field: &str, value: &str) -> Result<i32> {
    value
        .parse()
        .map_err(|_| PaddockError::InvalidCalendarData(format!("{field}: {value:?}")))
}

fn session_start(date: &str, time: Option<&str>) -> Result<DateTime<Utc>> {
    match time {
        Some(time) => DateTime::parse_from_rfc3339(&format!("{date}T{time}"))
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| PaddockError::InvalidCalendarData(format!("{date} {time}: {e}"))),
        None => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .ok_or_else(|| PaddockError::InvalidCalendarData(format!("date {date:?}"))),
    }
}

fn optional_start(session: Option<&Session>) -> Result<Option<DateTime<Utc>>> {
    session
        .map(|s| session_start(&s.date, s.time.as_deref()))
        .transpose()
}

fn event_from_race(race: &Race, results_delay: Duration) -> Result<Event> {
    let race_start = session_start(&race.date, race.time.as_deref())?;
    let format = if race.sprint.is_some() {
        EventFormat::Sprint
    } else {
        EventFormat::Standard
    };
    let sprint_lock_at = match format {
        EventFormat::Sprint => optional_start(race.sprint_qualifying.as_ref().or(race.sprint.as_ref()))?,
        EventFormat::Standard => None,
    };

    Ok(Event {
        season: parse_number("season", &race.season)?,
        round: parse_number("round", &race.round)?,
        name: race.race_name.clone(),
        location: race.circuit.location.locality.clone(),
        country: race.circuit.location.country.clone(),
        format,
        lock_at: optional_start(race.qualifying.as_ref())?,
        sprint_lock_at,
        race_start,
        results_at: race_start + results_delay,
    })
}

/// Team with the most race points; a tie goes to the team whose car finished first.
fn winning_constructor(results: &[Classification]) -> Option<String> {
    let mut totals: Vec<(&str, f64)> = Vec::new();
    for result in results {
        let Some(team) = result.constructor.as_ref() else {
            continue;
        };
        let points = result
            .points
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok())
            .unwrap_or(0.0);
        match totals.iter_mut().find(|(name, _)| *name == team.name) {
            Some((_, total)) => *total += points,
            None => totals.push((team.name.as_str(), points)),
        }
    }

    // Strictly greater keeps the earlier finisher on ties
    let mut best: Option<(&str, f64)> = None;
    for (name, total) in totals {
        if best.map_or(true, |(_, top)| total > top) {
            best = Some((name, total));
        }
    }
    best.map(|(name, _)| name.to_string())
}

fn outcome_from_races(event: &Event, race: &Race, qualifying: Option<&Race>) -> Option<Outcome> {
    if race.results.len() < 3 {
        return None;
    }
    let podium = Podium::new(
        race.results[0].driver.ident(),
        race.results[1].driver.ident(),
        race.results[2].driver.ident(),
    );
    let fastest_lap = race
        .results
        .iter()
        .find(|r| {
            r.fastest_lap
                .as_ref()
                .and_then(|f| f.rank.as_deref())
                == Some("1")
        })
        .map(|r| r.driver.ident());
    let grid = qualifying.map(|q| q.qualifying_results.as_slice()).unwrap_or_default();

    Some(Outcome {
        season: event.season,
        round: event.round,
        event_name: event.name.clone(),
        podium,
        pole: grid.first().map(|q| q.driver.ident()),
        quali_second: grid.get(1).map(|q| q.driver.ident()),
        fastest_lap,
        constructor: winning_constructor(&race.results),
        is_sprint: event.format.is_sprint(),
        sprint_winner: None,
        sprint_pole: None,
    })
}

/// Sprint winner plus the driver who started the sprint from the front.
///
/// There is no sprint-qualifying endpoint, so the grid column stands in for it.
fn sprint_from_race(event: &Event, race: &Race) -> Option<SprintOutcome> {
    let winner = race.sprint_results.first()?.driver.ident();
    let pole = race
        .sprint_results
        .iter()
        .find(|r| r.grid.as_deref() == Some("1"))
        .map(|r| r.driver.ident());

    Some(SprintOutcome {
        season: event.season,
        round: event.round,
        winner: Some(winner),
        pole,
    })
}

// ==================== Client ====================

/// HTTP calendar backed by an Ergast-compatible API
pub struct ErgastCalendar {
    http: Client,
    base_url: String,
    results_delay: Duration,
}

impl ErgastCalendar {
    pub fn new(config: &CalendarConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(StdDuration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            results_delay: Duration::hours(config.results_delay_hours),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{}?limit=100", self.base_url, path);
        debug!(%url, "Calendar request");
        let body = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await?;
        Ok(body)
    }

    async fn first_race(&self, path: &str) -> Result<Option<Race>> {
        let envelope: Envelope = self.get(path).await?;
        Ok(envelope
            .mr_data
            .race_table
            .and_then(|t| t.races.into_iter().next()))
    }

    async fn standings(&self, path: &str) -> Result<Option<StandingsList>> {
        let envelope: Envelope = self.get(path).await?;
        Ok(envelope
            .mr_data
            .standings_table
            .and_then(|t| t.lists.into_iter().next()))
    }
}

#[async_trait]
impl CalendarSource for ErgastCalendar {
    #[instrument(skip(self))]
    async fn schedule(&self, season: i32) -> Result<Vec<Event>> {
        let envelope: Envelope = self.get(&format!("{season}.json")).await?;
        let races = envelope
            .mr_data
            .race_table
            .map(|t| t.races)
            .unwrap_or_default();

        let mut events = races
            .iter()
            .map(|race| event_from_race(race, self.results_delay))
            .collect::<Result<Vec<_>>>()?;
        events.sort_by_key(|e| e.round);
        Ok(events)
    }

    #[instrument(skip(self, event), fields(round = event.round))]
    async fn outcome(&self, event: &Event) -> Result<Option<Outcome>> {
        let Some(race) = self
            .first_race(&format!("{}/{}/results.json", event.season, event.round))
            .await?
        else {
            return Ok(None);
        };
        let qualifying = self
            .first_race(&format!("{}/{}/qualifying.json", event.season, event.round))
            .await?;

        Ok(outcome_from_races(event, &race, qualifying.as_ref()))
    }

    #[instrument(skip(self, event), fields(round = event.round))]
    async fn sprint_outcome(&self, event: &Event) -> Result<Option<SprintOutcome>> {
        if !event.format.is_sprint() {
            return Ok(None);
        }
        let Some(race) = self
            .first_race(&format!("{}/{}/sprint.json", event.season, event.round))
            .await?
        else {
            return Ok(None);
        };

        Ok(sprint_from_race(event, &race))
    }

    #[instrument(skip(self))]
    async fn standings_leaders(&self, season: i32, round: i32) -> Result<Option<StandingsLeaders>> {
        let drivers = self
            .standings(&format!("{season}/{round}/driverStandings.json"))
            .await?;
        let constructors = self
            .standings(&format!("{season}/{round}/constructorStandings.json"))
            .await?;

        let driver = drivers.and_then(|l| l.drivers.first().map(|s| s.driver.ident()));
        let constructor = constructors.and_then(|l| l.constructors.first().map(|s| s.constructor.name.clone()));
        if driver.is_none() && constructor.is_none() {
            return Ok(None);
        }

        Ok(Some(StandingsLeaders {
            season,
            round,
            driver,
            constructor,
        }))
    }

    #[instrument(skip(self))]
    async fn final_standings(&self, season: i32) -> Result<Option<FinalStandings>> {
        let Some(last_round) = self.schedule(season).await?.iter().map(|e| e.round).max() else {
            return Ok(None);
        };

        let drivers = self.standings(&format!("{season}/driverStandings.json")).await?;
        let constructors = self
            .standings(&format!("{season}/constructorStandings.json"))
            .await?;
        let (Some(drivers), Some(constructors)) = (drivers, constructors) else {
            return Ok(None);
        };

        let settled = |list: &StandingsList| list.round.parse::<i32>().ok() == Some(last_round);
        if !settled(&drivers) || !settled(&constructors) {
            debug!(last_round, "Standings not settled yet");
            return Ok(None);
        }

        let (Some(driver_champion), Some(constructor_champion)) =
            (drivers.drivers.first(), constructors.constructors.first())
        else {
            return Ok(None);
        };

        Ok(Some(FinalStandings {
            season,
            driver_champion: driver_champion.driver.ident(),
            driver_runner_up: drivers.drivers.get(1).map(|s| s.driver.ident()),
            constructor_champion: constructor_champion.constructor.name.clone(),
            constructor_runner_up: constructors
                .constructors
                .get(1)
                .map(|s| s.constructor.name.clone()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn races(json: &str) -> Vec<Race> {
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        envelope.mr_data.race_table.unwrap().races
    }

    const SCHEDULE: &str = r#"{"MRData": {"RaceTable": {"season": "2026", "Races": [
        {"season": "2026", "round": "6", "raceName": "Miami Grand Prix",
         "Circuit": {"circuitName": "Miami International Autodrome",
                     "Location": {"locality": "Miami", "country": "USA"}},
         "date": "2026-05-03", "time": "20:00:00Z",
         "Qualifying": {"date": "2026-05-02", "time": "20:00:00Z"},
         "Sprint": {"date": "2026-05-02", "time": "16:00:00Z"},
         "SprintQualifying": {"date": "2026-05-01", "time": "20:30:00Z"}},
        {"season": "2026", "round": "7", "raceName": "Emilia Romagna Grand Prix",
         "Circuit": {"circuitName": "Imola",
                     "Location": {"locality": "Imola", "country": "Italy"}},
         "date": "2026-05-17"}
    ]}}}"#;

    #[test]
    fn test_event_deadlines_from_sessions() {
        let races = races(SCHEDULE);
        let miami = event_from_race(&races[0], Duration::hours(12)).unwrap();

        assert_eq!(miami.round, 6);
        assert_eq!(miami.format, EventFormat::Sprint);
        assert_eq!(miami.location, "Miami");
        assert_eq!(miami.lock_at, Some(Utc.with_ymd_and_hms(2026, 5, 2, 20, 0, 0).unwrap()));
        assert_eq!(
            miami.sprint_lock_at,
            Some(Utc.with_ymd_and_hms(2026, 5, 1, 20, 30, 0).unwrap())
        );
        assert_eq!(miami.results_at, Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_event_without_times_starts_at_midnight() {
        let races = races(SCHEDULE);
        let imola = event_from_race(&races[1], Duration::hours(12)).unwrap();

        assert_eq!(imola.format, EventFormat::Standard);
        assert_eq!(imola.lock_at, None);
        assert_eq!(imola.sprint_lock_at, None);
        assert_eq!(imola.race_start, Utc.with_ymd_and_hms(2026, 5, 17, 0, 0, 0).unwrap());
    }

    const RESULTS: &str = r#"{"MRData": {"RaceTable": {"Races": [
        {"season": "2026", "round": "6", "raceName": "Miami Grand Prix",
         "Circuit": {"Location": {"locality": "Miami", "country": "USA"}},
         "date": "2026-05-03", "time": "20:00:00Z",
         "Results": [
            {"points": "25", "grid": "2", "Driver": {"driverId": "norris", "code": "NOR"},
             "Constructor": {"name": "McLaren"}, "FastestLap": {"rank": "3"}},
            {"points": "18", "grid": "1", "Driver": {"driverId": "max_verstappen", "code": "VER"},
             "Constructor": {"name": "Red Bull"}, "FastestLap": {"rank": "1"}},
            {"points": "15", "grid": "4", "Driver": {"driverId": "leclerc", "code": "LEC"},
             "Constructor": {"name": "Ferrari"}},
            {"points": "12", "grid": "3", "Driver": {"driverId": "perez"},
             "Constructor": {"name": "Red Bull"}},
            {"points": "0", "grid": "5", "Driver": {"driverId": "piastri", "code": "PIA"},
             "Constructor": {"name": "McLaren"}}
         ]}
    ]}}}"#;

    #[test]
    fn test_outcome_from_results() {
        let schedule = races(SCHEDULE);
        let event = event_from_race(&schedule[0], Duration::hours(12)).unwrap();
        let results = races(RESULTS);

        let outcome = outcome_from_races(&event, &results[0], None).unwrap();
        assert_eq!(outcome.podium, Podium::new("NOR", "VER", "LEC"));
        assert_eq!(outcome.fastest_lap.as_deref(), Some("VER"));
        // Red Bull 30 beats McLaren 25
        assert_eq!(outcome.constructor.as_deref(), Some("Red Bull"));
        assert_eq!(outcome.pole, None);
        assert!(outcome.is_sprint);
    }

    #[test]
    fn test_constructor_tie_goes_to_earlier_finisher() {
        let mut results = races(RESULTS);
        let race = &mut results[0];
        race.results[3].points = Some("7".to_string());
        race.results[4].points = Some("0".to_string());
        // McLaren 25, Red Bull 25
        assert_eq!(winning_constructor(&race.results).as_deref(), Some("McLaren"));
    }

    #[test]
    fn test_sprint_pole_from_grid() {
        let schedule = races(SCHEDULE);
        let event = event_from_race(&schedule[0], Duration::hours(12)).unwrap();
        let mut results = races(RESULTS);
        let race = &mut results[0];
        race.sprint_results = std::mem::take(&mut race.results);

        let sprint = sprint_from_race(&event, race).unwrap();
        assert_eq!(sprint.winner.as_deref(), Some("NOR"));
        assert_eq!(sprint.pole.as_deref(), Some("VER"));
    }

    #[test]
    fn test_short_classification_is_not_an_outcome() {
        let schedule = races(SCHEDULE);
        let event = event_from_race(&schedule[0], Duration::hours(12)).unwrap();
        let mut results = races(RESULTS);
        results[0].results.truncate(2);
        assert!(outcome_from_races(&event, &results[0], None).is_none());
    }

    #[test]
    fn test_driver_without_code_uses_id() {
        let results = races(RESULTS);
        assert_eq!(results[0].results[3].driver.ident(), "PEREZ");
    }
}
