//! Operator commands.
//!
//! `run` and `migrate` are handled by the binary; everything else goes
//! through [`execute`] against a connected [`Competition`].

use clap::{Parser, Subcommand};
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::domain::{
    LeaderboardRow, LockCategory, LockOverride, Participant, ParticipantId, TenantId,
};
use crate::services::{Competition, ScoringMode, ScoringOutcome, ScoringService};

#[derive(Parser, Debug)]
#[command(name = "paddock")]
#[command(version)]
#[command(about = "Race-weekend prediction league: lock gating, results watchers and leaderboards", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and the per-environment overrides
    #[arg(short, long, default_value = "config", env = "PADDOCK_CONFIG_DIR")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply migrations, then run the watchers until Ctrl-C or SIGTERM
    Run,
    /// Apply database migrations and exit
    Migrate,
    /// Register a tenant, or rename an existing one
    Tenant {
        id: TenantId,
        name: String,
    },
    /// Override a prediction window (open, locked, auto, clear)
    Lock {
        #[arg(long)]
        tenant: TenantId,
        /// race, sprint or season
        category: String,
        state: String,
        #[arg(long, default_value = "operator")]
        actor: String,
    },
    /// Show the current event and every tenant's windows
    Status,
    /// Score one round for a tenant
    ScoreEvent {
        #[arg(long)]
        tenant: TenantId,
        #[arg(long)]
        round: i32,
        /// Re-score even if the round is already marked as scored
        #[arg(long)]
        force: bool,
    },
    /// Score the championship predictions for a tenant
    ScoreSeason {
        #[arg(long)]
        tenant: TenantId,
        #[arg(long)]
        force: bool,
    },
    /// Print a tenant's leaderboard
    Leaderboard {
        #[arg(long)]
        tenant: TenantId,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Print one participant's standing
    Rank {
        #[arg(long)]
        tenant: TenantId,
        participant: ParticipantId,
        #[arg(long)]
        json: bool,
    },
    /// Award (or with a negative value, remove) points by hand
    Adjust {
        #[arg(long)]
        tenant: TenantId,
        participant: ParticipantId,
        #[arg(long)]
        username: String,
        #[arg(allow_negative_numbers = true)]
        points: i32,
        #[arg(long, default_value = "manual adjustment")]
        reason: String,
    },
    /// Mark a bold prediction as correct
    ConfirmBold {
        #[arg(long)]
        tenant: TenantId,
        participant: ParticipantId,
        #[arg(long)]
        round: i32,
    },
}

/// Output mode for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct StandingRow {
    #[tabled(rename = "#")]
    pub rank: i32,
    pub participant: ParticipantId,
    pub username: String,
    pub points: i32,
    #[tabled(rename = "perfect")]
    pub perfect_podiums: i32,
    #[tabled(rename = "podium")]
    pub podium_hits: i32,
    #[tabled(rename = "pole")]
    pub pole_hits: i32,
    #[tabled(rename = "fastest")]
    pub fastest_lap_hits: i32,
    #[tabled(rename = "constructor")]
    pub constructor_hits: i32,
}

impl From<&LeaderboardRow> for StandingRow {
    fn from(row: &LeaderboardRow) -> Self {
        Self {
            rank: row.rank,
            participant: row.participant_id,
            username: row.username.clone(),
            points: row.total_points,
            perfect_podiums: row.hits.perfect_podiums,
            podium_hits: row.hits.podium_hits,
            pole_hits: row.hits.pole_hits,
            fastest_lap_hits: row.hits.fastest_lap_hits,
            constructor_hits: row.hits.constructor_hits,
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct WindowRow {
    pub tenant: TenantId,
    pub name: String,
    pub race: &'static str,
    pub sprint: &'static str,
    pub season: &'static str,
}

/// Print a vec of Tabled + Serialize items in the chosen mode.
pub fn print_items<T: Tabled + Serialize>(items: &[T], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if items.is_empty() {
                println!("(no results)");
            } else {
                println!("{}", Table::new(items));
            }
        }
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(items)?),
    }
    Ok(())
}

pub fn print_success(msg: &str) {
    println!("\x1b[32m{msg}\x1b[0m");
}

pub fn print_warn(msg: &str) {
    println!("\x1b[33m{msg}\x1b[0m");
}

/// `clear` removes the override; anything else must be a lock state.
pub fn parse_lock_state(raw: &str) -> anyhow::Result<Option<LockOverride>> {
    if raw.eq_ignore_ascii_case("clear") {
        return Ok(None);
    }
    LockOverride::try_from(raw)
        .map(Some)
        .map_err(anyhow::Error::msg)
}

fn report_scoring(what: &str, outcome: ScoringOutcome) {
    match outcome {
        ScoringOutcome::Scored { .. } => print_success(&format!("{what}: {outcome}")),
        ScoringOutcome::AlreadyScored | ScoringOutcome::NoOutcome => {
            print_warn(&format!("{what}: {outcome}"))
        }
    }
}

fn open_label(open: bool) -> &'static str {
    if open {
        "open"
    } else {
        "closed"
    }
}

/// Current event and per-tenant window state. Expects the event cache to be loaded.
pub async fn show_status(competition: &Competition) -> anyhow::Result<()> {
    match competition.current_event() {
        Some(event) => {
            println!("Season {} round {}: {} ({})", event.season, event.round, event.name, event.format);
            println!("  {}, {}", event.location, event.country);
            let show = |label: &str, at: Option<chrono::DateTime<chrono::Utc>>| {
                let at = at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string());
                println!("  {label:<16}{at}");
            };
            show("race lock", event.lock_at);
            show("sprint lock", event.sprint_lock_at);
            show("race start", Some(event.race_start));
            show("results due", Some(event.results_at));
        }
        None => print_warn(&format!("No upcoming event in season {}", competition.season())),
    }

    let mut rows = Vec::new();
    for tenant in competition.tenants().await? {
        rows.push(WindowRow {
            tenant: tenant.id,
            race: open_label(competition.is_open(tenant.id, LockCategory::Race).await?),
            sprint: open_label(competition.is_open(tenant.id, LockCategory::Sprint).await?),
            season: open_label(competition.is_open(tenant.id, LockCategory::Season).await?),
            name: tenant.name,
        });
    }
    println!();
    print_items(&rows, OutputMode::Table)
}

/// Run an operator command that needs no watcher.
pub async fn execute(
    command: Commands,
    competition: &Competition,
    scoring: &ScoringService,
) -> anyhow::Result<()> {
    match command {
        Commands::Run | Commands::Migrate | Commands::Status => {
            anyhow::bail!("{command:?} is handled by the binary")
        }
        Commands::Tenant { id, name } => {
            competition.register_tenant(id, &name).await?;
            print_success(&format!("Tenant {id} registered as {name}"));
        }
        Commands::Lock {
            tenant,
            category,
            state,
            actor,
        } => {
            let category = LockCategory::try_from(category.as_str()).map_err(anyhow::Error::msg)?;
            let state = parse_lock_state(&state)?;
            competition.set_lock(tenant, category, state, &actor).await?;
            let label = state.map(|s| s.as_str()).unwrap_or("cleared");
            print_success(&format!("{category} lock for tenant {tenant}: {label}"));
        }
        Commands::ScoreEvent {
            tenant,
            round,
            force,
        } => {
            let outcome = if force {
                competition.trigger_event_scoring(tenant, round).await?
            } else {
                scoring
                    .score_event(tenant, competition.season(), round, ScoringMode::Automatic)
                    .await?
            };
            report_scoring(&format!("Round {round}"), outcome);
        }
        Commands::ScoreSeason { tenant, force } => {
            let outcome = if force {
                competition.trigger_season_scoring(tenant).await?
            } else {
                scoring
                    .score_season(tenant, competition.season(), ScoringMode::Automatic)
                    .await?
            };
            report_scoring(&format!("Season {}", competition.season()), outcome);
        }
        Commands::Leaderboard {
            tenant,
            limit,
            json,
        } => {
            let rows: Vec<StandingRow> = competition
                .leaderboard_top(tenant, limit)
                .await?
                .iter()
                .map(StandingRow::from)
                .collect();
            print_items(&rows, OutputMode::from_json_flag(json))?;
        }
        Commands::Rank {
            tenant,
            participant,
            json,
        } => match competition.rank(tenant, participant).await? {
            Some(row) => print_items(&[StandingRow::from(&row)], OutputMode::from_json_flag(json))?,
            None => print_warn(&format!("{participant} is not on tenant {tenant}'s leaderboard")),
        },
        Commands::Adjust {
            tenant,
            participant,
            username,
            points,
            reason,
        } => {
            let participant = Participant::new(participant, username);
            competition
                .add_points(tenant, &participant, points, &reason)
                .await?;
            print_success(&format!("{points:+} points for {} ({reason})", participant.username));
        }
        Commands::ConfirmBold {
            tenant,
            participant,
            round,
        } => {
            competition.confirm_bold(tenant, participant, round).await?;
            print_success(&format!("Bold prediction by {participant} for round {round} confirmed"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lock_state() {
        assert_eq!(parse_lock_state("open").unwrap(), Some(LockOverride::Open));
        assert_eq!(parse_lock_state("CLEAR").unwrap(), None);
        assert!(parse_lock_state("ajar").is_err());
    }

    #[test]
    fn test_adjust_accepts_negative_points() {
        let cli = Cli::try_parse_from([
            "paddock", "adjust", "--tenant", "1", "42", "--username", "lando", "-5",
        ])
        .unwrap();
        match cli.command {
            Commands::Adjust { points, participant, .. } => {
                assert_eq!(points, -5);
                assert_eq!(participant, 42);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_score_event_force_flag() {
        let cli =
            Cli::try_parse_from(["paddock", "score-event", "--tenant", "3", "--round", "5", "--force"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::ScoreEvent { tenant: 3, round: 5, force: true }
        ));
    }
}
