//! Leaderboard aggregation.
//!
//! The leaderboard is always rebuilt from scratch out of the score tables;
//! it is never patched in place.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::adapters::CompetitionStore;
use crate::domain::{
    Adjustment, BoldTally, EventScore, LeaderboardRow, ParticipantId, SeasonScore, TenantId,
    TieBreakHits,
};
use crate::error::Result;

/// Everything that contributes points to one tenant's leaderboard
#[derive(Debug, Clone, Default)]
pub struct LeaderboardSources {
    pub event_scores: Vec<EventScore>,
    pub season_scores: Vec<SeasonScore>,
    pub adjustments: Vec<Adjustment>,
    pub bold: Vec<BoldTally>,
}

#[derive(Default)]
struct Tally {
    username: String,
    points: i32,
    hits: TieBreakHits,
}

impl Tally {
    fn add(&mut self, username: &str, points: i32) {
        // Last-seen display names can differ across rows; pick one deterministically
        if username > self.username.as_str() {
            self.username = username.to_string();
        }
        self.points += points;
    }
}

/// Group, sum, sort and rank.
///
/// Sorting is stable on participant id, so rows tied on every ranking key
/// come out in the same order on every pass. Tied rows share a competition
/// rank (1, 1, 3).
pub fn aggregate(tenant_id: TenantId, sources: LeaderboardSources, bold_bonus: i32) -> Vec<LeaderboardRow> {
    let mut tallies: BTreeMap<ParticipantId, Tally> = BTreeMap::new();

    for score in &sources.event_scores {
        let tally = tallies.entry(score.participant_id).or_default();
        tally.add(&score.username, score.points);
        tally.hits += score.hits;
    }
    for score in &sources.season_scores {
        tallies
            .entry(score.participant_id)
            .or_default()
            .add(&score.username, score.points());
    }
    for adjustment in &sources.adjustments {
        tallies
            .entry(adjustment.participant_id)
            .or_default()
            .add(&adjustment.username, adjustment.points);
    }
    for bold in &sources.bold {
        tallies
            .entry(bold.participant_id)
            .or_default()
            .add(&bold.username, bold.confirmed * bold_bonus);
    }

    let mut rows: Vec<LeaderboardRow> = tallies
        .into_iter()
        .map(|(participant_id, tally)| LeaderboardRow {
            tenant_id,
            participant_id,
            username: tally.username,
            total_points: tally.points,
            hits: tally.hits,
            rank: 0,
            position: 0,
        })
        .collect();

    rows.sort_by(|a, b| a.ranking_cmp(b).then(a.participant_id.cmp(&b.participant_id)));

    let mut rank = 0;
    for i in 0..rows.len() {
        let position = i as i32 + 1;
        if i == 0 || rows[i - 1].ranking_cmp(&rows[i]).is_ne() {
            rank = position;
        }
        rows[i].rank = rank;
        rows[i].position = position;
    }
    rows
}

/// Rebuilds a tenant's stored leaderboard from its score tables
#[derive(Clone)]
pub struct LeaderboardAggregator {
    store: Arc<dyn CompetitionStore>,
    bold_bonus: i32,
}

impl LeaderboardAggregator {
    pub fn new(store: Arc<dyn CompetitionStore>, bold_bonus: i32) -> Self {
        Self { store, bold_bonus }
    }

    #[instrument(skip(self))]
    pub async fn recompute(&self, tenant: TenantId) -> Result<Vec<LeaderboardRow>> {
        let sources = LeaderboardSources {
            event_scores: self.store.list_event_scores(tenant).await?,
            season_scores: self.store.list_season_scores(tenant).await?,
            adjustments: self.store.list_adjustments(tenant).await?,
            bold: self.store.bold_tallies(tenant).await?,
        };

        let rows = aggregate(tenant, sources, self.bold_bonus);
        self.store.replace_leaderboard(tenant, &rows).await?;
        debug!(participants = rows.len(), "Leaderboard recomputed");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event_score(participant_id: ParticipantId, round: i32, points: i32, hits: TieBreakHits) -> EventScore {
        EventScore {
            tenant_id: 1,
            participant_id,
            username: format!("user{participant_id}"),
            season: 2026,
            round,
            event_name: format!("Round {round}"),
            points,
            hits,
        }
    }

    fn hits(perfect: i32, podium: i32, pole: i32) -> TieBreakHits {
        TieBreakHits {
            perfect_podiums: perfect,
            podium_hits: podium,
            pole_hits: pole,
            ..Default::default()
        }
    }

    #[test]
    fn test_sums_every_source() {
        let sources = LeaderboardSources {
            event_scores: vec![
                event_score(1, 1, 13, hits(1, 3, 1)),
                event_score(1, 2, 4, hits(0, 0, 0)),
            ],
            season_scores: vec![SeasonScore {
                tenant_id: 1,
                participant_id: 1,
                username: "user1".to_string(),
                season: 2026,
                driver_points: 25,
                constructor_points: 5,
            }],
            adjustments: vec![Adjustment {
                tenant_id: 1,
                participant_id: 2,
                username: "user2".to_string(),
                points: -3,
                reason: "late edit".to_string(),
                created_at: Utc::now(),
            }],
            bold: vec![BoldTally {
                participant_id: 1,
                username: "user1".to_string(),
                confirmed: 2,
            }],
        };

        let rows = aggregate(1, sources, 10);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].participant_id, 1);
        assert_eq!(rows[0].total_points, 13 + 4 + 30 + 20);
        assert_eq!(rows[0].hits.perfect_podiums, 1);
        assert_eq!(rows[1].total_points, -3);
        assert_eq!(rows[1].rank, 2);
    }

    #[test]
    fn test_tie_break_ladder() {
        let sources = LeaderboardSources {
            event_scores: vec![
                event_score(1, 1, 20, hits(0, 2, 1)),
                event_score(2, 1, 20, hits(1, 3, 0)),
                event_score(3, 1, 20, hits(0, 2, 2)),
                event_score(4, 1, 25, hits(0, 0, 0)),
            ],
            ..Default::default()
        };

        let order: Vec<_> = aggregate(1, sources, 10)
            .iter()
            .map(|r| r.participant_id)
            .collect();
        assert_eq!(order, vec![4, 2, 3, 1]);
    }

    #[test]
    fn test_full_ties_share_rank() {
        let sources = LeaderboardSources {
            event_scores: vec![
                event_score(7, 1, 10, hits(1, 3, 0)),
                event_score(3, 1, 10, hits(1, 3, 0)),
                event_score(5, 1, 2, hits(0, 1, 0)),
            ],
            ..Default::default()
        };

        let rows = aggregate(1, sources, 10);
        let ranked: Vec<_> = rows
            .iter()
            .map(|r| (r.participant_id, r.rank, r.position))
            .collect();
        assert_eq!(ranked, vec![(3, 1, 1), (7, 1, 2), (5, 3, 3)]);
    }

    #[test]
    fn test_recompute_is_deterministic() {
        let sources = LeaderboardSources {
            event_scores: vec![
                event_score(2, 1, 8, hits(0, 1, 1)),
                event_score(1, 1, 8, hits(0, 1, 1)),
                event_score(3, 2, 12, hits(0, 2, 0)),
            ],
            ..Default::default()
        };

        assert_eq!(aggregate(1, sources.clone(), 10), aggregate(1, sources, 10));
    }
}
