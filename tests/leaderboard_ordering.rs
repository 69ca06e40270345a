use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use paddock::adapters::{CompetitionStore, MemoryStore};
use paddock::domain::{
    Adjustment, BoldPrediction, Event, EventFormat, Outcome, Participant, Podium, PredictionPart,
    Tenant,
};
use paddock::leaderboard::LeaderboardAggregator;
use paddock::scoring::ScoringRules;
use paddock::services::{ScoringMode, ScoringOutcome, ScoringService};

const TENANT: i64 = 77;

fn race_day(round: i32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 14, 0, 0).unwrap() + Duration::weeks(round.into())
}

fn event(round: i32) -> Event {
    Event {
        season: 2026,
        round,
        name: format!("Round {round}"),
        location: "Circuit".to_string(),
        country: "Country".to_string(),
        format: EventFormat::Standard,
        lock_at: Some(race_day(round) - Duration::days(1)),
        sprint_lock_at: None,
        race_start: race_day(round),
        results_at: race_day(round) + Duration::hours(12),
    }
}

fn outcome(round: i32) -> Outcome {
    Outcome {
        season: 2026,
        round,
        event_name: format!("Round {round}"),
        podium: Podium::new("A", "B", "C"),
        pole: Some("A".to_string()),
        quali_second: Some("B".to_string()),
        fastest_lap: Some("C".to_string()),
        constructor: None,
        is_sprint: false,
        sprint_winner: None,
        sprint_pole: None,
    }
}

fn main_call(podium: Podium, pole: Option<&str>, fastest_lap: Option<&str>) -> PredictionPart {
    PredictionPart::Main {
        podium,
        pole: pole.map(str::to_string),
        fastest_lap: fastest_lap.map(str::to_string),
    }
}

async fn setup() -> (Arc<MemoryStore>, ScoringService) {
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_tenant(&Tenant {
            id: TENANT,
            name: "Parc Fermé".to_string(),
        })
        .await
        .unwrap();
    let dyn_store: Arc<dyn CompetitionStore> = store.clone();
    let scoring = ScoringService::new(
        dyn_store.clone(),
        LeaderboardAggregator::new(dyn_store, 10),
        ScoringRules::default(),
    );
    (store, scoring)
}

async fn predict(store: &MemoryStore, participant: &Participant, round: i32, part: PredictionPart) {
    store
        .save_prediction_part(TENANT, participant, &event(round), &part)
        .await
        .unwrap();
}

async fn score(store: &MemoryStore, scoring: &ScoringService, round: i32) {
    store.insert_outcome(&outcome(round)).await.unwrap();
    let result = scoring
        .score_event(TENANT, 2026, round, ScoringMode::Automatic)
        .await
        .unwrap();
    assert!(matches!(result, ScoringOutcome::Scored { .. }));
}

#[tokio::test]
async fn every_source_counts_and_ties_break_on_perfect_podiums() {
    let (store, scoring) = setup().await;
    let senna = Participant::new(1, "senna");
    let prost = Participant::new(2, "prost");
    let mansell = Participant::new(3, "mansell");
    let piquet = Participant::new(4, "piquet");

    // Round 1: senna perfect (10), prost two slots + pole + fastest (13), piquet nothing
    predict(&store, &senna, 1, main_call(Podium::new("A", "B", "C"), None, None)).await;
    predict(&store, &prost, 1, main_call(Podium::new("A", "B", "D"), Some("A"), Some("C"))).await;
    predict(&store, &piquet, 1, main_call(Podium::new("D", "E", "F"), None, None)).await;
    score(&store, &scoring, 1).await;

    // Round 2: senna right three misplaced + pole (7), prost one slot (2)
    predict(&store, &senna, 2, main_call(Podium::new("B", "C", "A"), Some("A"), None)).await;
    predict(&store, &prost, 2, main_call(Podium::new("A", "E", "F"), None, None)).await;
    score(&store, &scoring, 2).await;

    store
        .add_adjustment(&Adjustment {
            tenant_id: TENANT,
            participant_id: prost.id,
            username: prost.username.clone(),
            points: 2,
            reason: "steward review".to_string(),
            created_at: race_day(2),
        })
        .await
        .unwrap();
    store
        .save_bold_prediction(&BoldPrediction {
            tenant_id: TENANT,
            participant_id: mansell.id,
            username: mansell.username.clone(),
            season: 2026,
            round: 2,
            claim: "Safety car on lap one".to_string(),
            submitted_at: race_day(2) - Duration::days(2),
            confirmed: false,
        })
        .await
        .unwrap();
    assert!(store
        .confirm_bold_prediction(TENANT, mansell.id, 2026, 2)
        .await
        .unwrap());

    let rows = LeaderboardAggregator::new(store.clone(), 10)
        .recompute(TENANT)
        .await
        .unwrap();
    let table: Vec<_> = rows
        .iter()
        .map(|r| (r.participant_id, r.total_points, r.rank))
        .collect();
    assert_eq!(table, vec![(1, 17, 1), (2, 17, 2), (3, 10, 3), (4, 0, 4)]);

    assert_eq!(store.leaderboard(TENANT, Some(2)).await.unwrap(), rows[..2].to_vec());
    assert_eq!(
        store.leaderboard_row(TENANT, 3).await.unwrap().map(|r| r.position),
        Some(3)
    );
}

#[tokio::test]
async fn identical_records_share_a_rank() {
    let (store, scoring) = setup().await;
    let call = || main_call(Podium::new("A", "C", "B"), Some("B"), None);
    predict(&store, &Participant::new(9, "hunt"), 1, call()).await;
    predict(&store, &Participant::new(3, "lauda"), 1, call()).await;
    predict(&store, &Participant::new(5, "regazzoni"), 1, main_call(Podium::new("A", "B", "C"), None, None)).await;
    score(&store, &scoring, 1).await;

    let ranked: Vec<_> = store
        .leaderboard(TENANT, None)
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.participant_id, r.rank, r.position))
        .collect();
    // 10 for regazzoni; hunt and lauda 5 + 1 each, ordered by id
    assert_eq!(ranked, vec![(5, 1, 1), (3, 2, 2), (9, 2, 3)]);
}
