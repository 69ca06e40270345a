use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Weekend format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventFormat {
    Standard,
    /// Weekend with an additional sprint race and sprint qualifying
    Sprint,
}

impl EventFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventFormat::Standard => "STANDARD",
            EventFormat::Sprint => "SPRINT",
        }
    }

    pub fn is_sprint(&self) -> bool {
        matches!(self, EventFormat::Sprint)
    }
}

impl fmt::Display for EventFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One scheduled round, as published by the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub season: i32,
    /// Round number, unique and increasing within the season
    pub round: i32,
    pub name: String,
    pub location: String,
    pub country: String,
    pub format: EventFormat,
    /// Qualifying start: race predictions close here
    pub lock_at: Option<DateTime<Utc>>,
    /// Sprint qualifying start: sprint predictions close here
    pub sprint_lock_at: Option<DateTime<Utc>>,
    pub race_start: DateTime<Utc>,
    /// When the race outcome is expected to be published
    pub results_at: DateTime<Utc>,
}

/// Cached view of the round currently open for predictions.
///
/// Installed as a whole by the cache watcher; never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentEvent {
    pub event: Event,
    /// When the cache should roll over to the following round
    pub next_refresh: Option<DateTime<Utc>>,
    pub loaded_at: DateTime<Utc>,
}

impl CurrentEvent {
    /// Pick the current round out of a season schedule.
    ///
    /// The current round is the earliest one whose results are still in the
    /// future. The one after it anchors the next refresh, `refresh_lead`
    /// before its race start but never before the current round's results
    /// are due, since selecting earlier would pick the same round again.
    pub fn select(schedule: &[Event], now: DateTime<Utc>, refresh_lead: Duration) -> Option<Self> {
        let mut upcoming: Vec<&Event> = schedule.iter().filter(|e| e.results_at > now).collect();
        upcoming.sort_by_key(|e| (e.results_at, e.round));

        let current = upcoming.first()?;
        let next_refresh = upcoming
            .get(1)
            .map(|next| (next.race_start - refresh_lead).max(current.results_at));

        Some(Self {
            event: (*current).clone(),
            next_refresh,
            loaded_at: now,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{at, event};
    use super::*;

    #[test]
    fn test_select_picks_earliest_unfinished_round() {
        let schedule = vec![
            event(1, at(3, 8, 4), EventFormat::Standard),
            event(2, at(3, 15, 7), EventFormat::Sprint),
            event(3, at(3, 29, 6), EventFormat::Standard),
        ];

        let current = CurrentEvent::select(&schedule, at(3, 10, 0), Duration::days(5)).unwrap();
        assert_eq!(current.event.round, 2);
        assert_eq!(current.next_refresh, Some(at(3, 24, 6)));
    }

    #[test]
    fn test_select_keeps_round_until_results_due() {
        let schedule = vec![
            event(1, at(3, 8, 4), EventFormat::Standard),
            event(2, at(3, 15, 7), EventFormat::Standard),
        ];

        // Race has started but results are not due for another few hours
        let current = CurrentEvent::select(&schedule, at(3, 8, 10), Duration::days(5)).unwrap();
        assert_eq!(current.event.round, 1);
    }

    #[test]
    fn test_refresh_waits_for_current_results() {
        // Back-to-back weekends with a lead longer than the gap between them
        let schedule = vec![
            event(7, at(6, 7, 13), EventFormat::Standard),
            event(8, at(6, 13, 13), EventFormat::Standard),
        ];

        let current = CurrentEvent::select(&schedule, at(6, 1, 0), Duration::days(7)).unwrap();
        assert_eq!(current.event.round, 7);
        assert_eq!(current.next_refresh, Some(current.event.results_at));

        let rolled = CurrentEvent::select(&schedule, at(6, 8, 1), Duration::days(7)).unwrap();
        assert_eq!(rolled.event.round, 8);
    }

    #[test]
    fn test_select_last_round_has_no_refresh() {
        let schedule = vec![event(24, at(12, 6, 13), EventFormat::Standard)];
        let current = CurrentEvent::select(&schedule, at(12, 1, 0), Duration::days(5)).unwrap();
        assert_eq!(current.next_refresh, None);
    }

    #[test]
    fn test_select_none_after_season() {
        let schedule = vec![event(24, at(12, 6, 13), EventFormat::Standard)];
        assert!(CurrentEvent::select(&schedule, at(12, 20, 0), Duration::days(5)).is_none());
    }
}
