//! Logical clock
//!
//! Every component asks the [`Clock`] for "now" instead of reading the system
//! time. A replay can anchor the clock at an arbitrary instant and run it
//! faster than real time; timed waits are expressed in logical time and the
//! clock converts them into (shorter) real sleeps.

use crate::config::ClockConfig;
use crate::coordination::ShutdownToken;
use crate::error::{PaddockError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
enum ClockMode {
    Real,
    Fixed(DateTime<Utc>),
    Anchored {
        anchor: DateTime<Utc>,
        started: Instant,
    },
}

/// Outcome of a logical sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Elapsed,
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
pub struct Clock {
    mode: ClockMode,
    multiplier: f64,
}

impl Clock {
    /// Wall-clock time, no acceleration.
    pub fn real() -> Self {
        Self {
            mode: ClockMode::Real,
            multiplier: 1.0,
        }
    }

    /// Frozen at `at`. Sleeps are still divided by `multiplier`.
    pub fn fixed(at: DateTime<Utc>, multiplier: f64) -> Result<Self> {
        Ok(Self {
            mode: ClockMode::Fixed(at),
            multiplier: check_multiplier(multiplier)?,
        })
    }

    /// Starts at `anchor` now and advances `multiplier` logical seconds per real second.
    pub fn anchored(anchor: DateTime<Utc>, multiplier: f64) -> Result<Self> {
        Ok(Self {
            mode: ClockMode::Anchored {
                anchor,
                started: Instant::now(),
            },
            multiplier: check_multiplier(multiplier)?,
        })
    }

    pub fn from_config(cfg: &ClockConfig) -> Result<Self> {
        let fixed = cfg.parsed_fixed_now().map_err(PaddockError::InvalidConfig)?;
        let anchor = cfg.parsed_anchor().map_err(PaddockError::InvalidConfig)?;
        check_multiplier(cfg.multiplier)?;

        match (fixed, anchor) {
            (Some(at), _) => Self::fixed(at, cfg.multiplier),
            (None, Some(anchor)) => Self::anchored(anchor, cfg.multiplier),
            (None, None) => {
                if cfg.multiplier != 1.0 {
                    warn!(
                        multiplier = cfg.multiplier,
                        "clock.multiplier ignored without clock.anchor; running on real time"
                    );
                }
                Ok(Self::real())
            }
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self.mode {
            ClockMode::Real => Utc::now(),
            ClockMode::Fixed(at) => at,
            ClockMode::Anchored { anchor, started } => {
                let logical_ms = started.elapsed().as_secs_f64() * self.multiplier * 1000.0;
                anchor + ChronoDuration::milliseconds(logical_ms as i64)
            }
        }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Real duration that corresponds to `logical` on this clock. Negative spans map to zero.
    pub fn real_duration(&self, logical: ChronoDuration) -> Duration {
        match logical.to_std() {
            Ok(d) => Duration::from_secs_f64(d.as_secs_f64() / self.multiplier),
            Err(_) => Duration::ZERO,
        }
    }

    /// Sleep for a logical span, returning early if shutdown is requested.
    pub async fn sleep(&self, logical: ChronoDuration, shutdown: &mut ShutdownToken) -> Wake {
        if shutdown.is_shutdown_requested() {
            return Wake::Shutdown;
        }
        let real = self.real_duration(logical);
        tokio::select! {
            biased;
            _ = shutdown.wait_for_shutdown() => Wake::Shutdown,
            _ = tokio::time::sleep(real) => Wake::Elapsed,
        }
    }

    pub async fn sleep_secs(&self, logical_secs: u64, shutdown: &mut ShutdownToken) -> Wake {
        self.sleep(ChronoDuration::seconds(logical_secs as i64), shutdown)
            .await
    }
}

fn check_multiplier(multiplier: f64) -> Result<f64> {
    if multiplier.is_finite() && multiplier > 0.0 {
        Ok(multiplier)
    } else {
        Err(PaddockError::InvalidConfig(format!(
            "clock multiplier must be positive, got {multiplier}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::{GracefulShutdown, ShutdownSignal};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 26, 8, 0, 0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_anchored_clock_accelerates() {
        let clock = Clock::anchored(t0(), 600.0).unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;

        let drift = (clock.now() - (t0() + ChronoDuration::seconds(600)))
            .num_milliseconds()
            .abs();
        assert!(drift < 50, "drift {drift}ms");
    }

    #[test]
    fn test_fixed_clock_is_frozen() {
        let clock = Clock::fixed(t0(), 1.0).unwrap();
        assert_eq!(clock.now(), t0());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(clock.now(), t0());
    }

    #[test]
    fn test_rejects_bad_multiplier() {
        assert!(Clock::anchored(t0(), 0.0).is_err());
        assert!(Clock::anchored(t0(), -2.0).is_err());
        assert!(Clock::fixed(t0(), f64::NAN).is_err());
    }

    #[test]
    fn test_real_duration_scales() {
        let clock = Clock::anchored(t0(), 600.0).unwrap();
        assert_eq!(
            clock.real_duration(ChronoDuration::hours(1)),
            Duration::from_secs(6)
        );
        assert_eq!(
            clock.real_duration(ChronoDuration::seconds(-30)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_unanchored_config_runs_real_time() {
        let cfg = ClockConfig {
            fixed_now: None,
            anchor: None,
            multiplier: 600.0,
        };
        let clock = Clock::from_config(&cfg).unwrap();
        assert_eq!(clock.multiplier(), 1.0);
        let drift = (clock.now() - Utc::now()).num_seconds().abs();
        assert!(drift <= 1);
    }

    #[test]
    fn test_fixed_now_takes_precedence() {
        let cfg = ClockConfig {
            fixed_now: Some("2026-03-08T04:00:00Z".to_string()),
            anchor: Some("2025-01-01T00:00:00Z".to_string()),
            multiplier: 1.0,
        };
        let clock = Clock::from_config(&cfg).unwrap();
        assert_eq!(clock.now().to_rfc3339(), "2026-03-08T04:00:00+00:00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_returns_on_shutdown() {
        let clock = Clock::anchored(t0(), 1.0).unwrap();
        let shutdown = GracefulShutdown::new();
        let mut token = shutdown.token();

        shutdown.request_shutdown(ShutdownSignal::Graceful);
        let wake = clock.sleep(ChronoDuration::days(30), &mut token).await;
        assert_eq!(wake, Wake::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_elapses_in_scaled_real_time() {
        let clock = Clock::anchored(t0(), 600.0).unwrap();
        let mut token = ShutdownToken::never();
        let before = Instant::now();

        let wake = clock.sleep(ChronoDuration::minutes(10), &mut token).await;
        assert_eq!(wake, Wake::Elapsed);
        let elapsed = before.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_millis(1010));
    }
}
