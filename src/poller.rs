//! The `gator poll` loop.
//!
//! Runs one ingestion cycle immediately, then one per interval tick until a
//! cycle fails with anything other than "no feeds registered". A cycle that
//! overruns the interval is followed straight away by the next one; missed
//! ticks are not replayed.

use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::app::{GatorError, Result};
use crate::ingest::Ingestor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
    Fatal,
}

pub struct Poller {
    ingestor: Ingestor,
    interval: Duration,
    state: PollerState,
    cycles: u64,
}

impl Poller {
    pub fn new(ingestor: Ingestor, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(GatorError::InvalidInterval(
                "interval must be greater than zero".into(),
            ));
        }

        Ok(Self {
            ingestor,
            interval,
            state: PollerState::Idle,
            cycles: 0,
        })
    }

    /// Build a poller from an interval string such as `"1m"` or `"1h30m"`.
    pub fn from_interval(ingestor: Ingestor, interval: Option<&str>) -> Result<Self> {
        let interval = interval.ok_or_else(|| {
            GatorError::InvalidInterval(
                "no interval given on the command line or in [poll] interval".into(),
            )
        })?;
        Self::new(ingestor, parse_interval(interval)?)
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Poll until a fatal error occurs, which is returned.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Collecting feeds every {}", format_interval(self.interval));

        let mut timer = interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // The first tick completes immediately.
            timer.tick().await;

            self.cycles += 1;
            self.state = PollerState::Running;
            let started = Instant::now();

            match self.ingestor.run_cycle().await {
                Ok(report) => {
                    tracing::debug!(
                        cycle = self.cycles,
                        feed = %report.feed_url,
                        inserted = report.inserted,
                        duplicates = report.duplicates,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Cycle complete"
                    );
                }
                Err(e) if !e.is_fatal() => {
                    tracing::warn!(cycle = self.cycles, "{}, waiting for the next tick", e);
                }
                Err(e) => {
                    self.state = PollerState::Fatal;
                    tracing::error!(cycle = self.cycles, error = %e, "Poll cycle failed, stopping");
                    return Err(e);
                }
            }

            self.state = PollerState::Idle;
        }
    }
}

/// Parse an interval such as `"30s"`, `"1m"`, `"1h30m"` or `"500ms"`.
///
/// Units are `ms`, `s`, `m`, `h` and `d`; a bare number means seconds.
pub fn parse_interval(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    let invalid = || {
        GatorError::InvalidInterval(format!(
            "{:?}, use a duration like '30s', '1m' or '1h30m'",
            s
        ))
    };

    if s.is_empty() {
        return Err(invalid());
    }

    let total = if let Ok(secs) = s.parse::<u64>() {
        Duration::from_secs(secs)
    } else {
        let mut total = Duration::ZERO;
        let mut rest = s.as_str();

        while !rest.is_empty() {
            let digits_end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            if digits_end == 0 {
                return Err(invalid());
            }
            let value: u64 = rest[..digits_end].parse().map_err(|_| invalid())?;
            rest = &rest[digits_end..];

            let unit_end = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
            let unit = &rest[..unit_end];
            rest = &rest[unit_end..];

            let part = match unit {
                "ms" => Some(Duration::from_millis(value)),
                "s" => Some(Duration::from_secs(value)),
                "m" => value.checked_mul(60).map(Duration::from_secs),
                "h" => value.checked_mul(3600).map(Duration::from_secs),
                "d" => value.checked_mul(86400).map(Duration::from_secs),
                _ => None,
            }
            .ok_or_else(invalid)?;

            total = total.checked_add(part).ok_or_else(invalid)?;
        }

        total
    };

    if total.is_zero() {
        return Err(GatorError::InvalidInterval(
            "interval must be greater than zero".into(),
        ));
    }

    Ok(total)
}

/// Format an interval for display.
pub fn format_interval(interval: Duration) -> String {
    let secs = interval.as_secs();

    if interval.subsec_nanos() != 0 || secs == 0 {
        format!("{}ms", interval.as_millis())
    } else if secs % 86400 == 0 {
        format!("{}d", secs / 86400)
    } else if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use reqwest::StatusCode;

    use super::*;
    use crate::domain::{Feed, User};
    use crate::fetcher::Fetcher;
    use crate::normalizer::Normalizer;
    use crate::store::{SqliteStore, Store};

    const EMPTY_FEED: &str = "<rss><channel><title>Empty</title></channel></rss>";

    /// Takes `work` per request and fails from request number `fail_on` on.
    struct SlowFetcher {
        work: Duration,
        fail_on: usize,
        starts: Mutex<Vec<Instant>>,
    }

    #[async_trait]
    impl Fetcher for SlowFetcher {
        async fn fetch(&self, url: &str, _deadline: Instant) -> crate::app::Result<Vec<u8>> {
            let call = {
                let mut starts = self.starts.lock().unwrap();
                starts.push(Instant::now());
                starts.len()
            };
            if call >= self.fail_on {
                return Err(GatorError::HttpStatus {
                    url: url.to_string(),
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                });
            }
            tokio::time::sleep(self.work).await;
            Ok(EMPTY_FEED.as_bytes().to_vec())
        }
    }

    fn ingestor(fetcher: Arc<SlowFetcher>, with_feed: bool) -> Ingestor {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        if with_feed {
            let user = User::new("kahya".into());
            store.create_user(&user).unwrap();
            store
                .add_feed(&Feed::new("Feed".into(), "https://example.com/feed.xml".into(), user.id))
                .unwrap();
        }
        Ingestor::new(store, fetcher, Normalizer::new(), Duration::from_secs(30)).unwrap()
    }

    fn slow_fetcher(work: Duration, fail_on: usize) -> Arc<SlowFetcher> {
        Arc::new(SlowFetcher {
            work,
            fail_on,
            starts: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_interval("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_interval("1d").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_interval("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_interval("3600").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_interval("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_interval("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_interval(" 1M ").unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_interval_rejects_invalid() {
        for input in ["", "invalid", "m", "10x", "1.5m", "-1s", "s10"] {
            let err = parse_interval(input).unwrap_err();
            assert!(matches!(err, GatorError::InvalidInterval(_)), "{input:?}");
        }
    }

    #[test]
    fn test_parse_interval_rejects_zero() {
        assert!(matches!(parse_interval("0s"), Err(GatorError::InvalidInterval(_))));
        assert!(matches!(parse_interval("0"), Err(GatorError::InvalidInterval(_))));
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(Duration::from_secs(3600)), "1h");
        assert_eq!(format_interval(Duration::from_secs(1800)), "30m");
        assert_eq!(format_interval(Duration::from_secs(86400)), "1d");
        assert_eq!(format_interval(Duration::from_secs(90)), "90s");
        assert_eq!(format_interval(Duration::from_millis(1500)), "1500ms");
    }

    #[tokio::test]
    async fn test_missing_interval_never_starts() {
        let fetcher = slow_fetcher(Duration::ZERO, usize::MAX);
        let result = Poller::from_interval(ingestor(fetcher.clone(), true), None);
        assert!(matches!(result, Err(GatorError::InvalidInterval(_))));

        let result = Poller::new(ingestor(fetcher.clone(), true), Duration::ZERO);
        assert!(matches!(result, Err(GatorError::InvalidInterval(_))));
        assert!(fetcher.starts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_from_interval_parses_string() {
        let fetcher = slow_fetcher(Duration::ZERO, usize::MAX);
        let poller = Poller::from_interval(ingestor(fetcher, true), Some("1h30m")).unwrap();

        assert_eq!(poller.interval(), Duration::from_secs(5400));
        assert_eq!(poller.state(), PollerState::Idle);
        assert_eq!(poller.cycles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_loop() {
        let fetcher = slow_fetcher(Duration::ZERO, 2);
        let mut poller = Poller::new(ingestor(fetcher.clone(), true), Duration::from_secs(1)).unwrap();
        assert_eq!(poller.state(), PollerState::Idle);

        let err = poller.run().await.unwrap_err();

        assert!(matches!(err, GatorError::HttpStatus { .. }));
        assert_eq!(poller.state(), PollerState::Fatal);
        assert_eq!(poller.cycles(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_runs_immediately() {
        let fetcher = slow_fetcher(Duration::ZERO, 2);
        let mut poller = Poller::new(ingestor(fetcher.clone(), true), Duration::from_secs(60)).unwrap();
        let begin = Instant::now();

        poller.run().await.unwrap_err();

        let starts = fetcher.starts.lock().unwrap().clone();
        assert!(starts[0].duration_since(begin) < Duration::from_millis(5));
        assert!(starts[1] - starts[0] >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_cycle_followed_immediately() {
        let fetcher = slow_fetcher(Duration::from_secs(3), 3);
        let mut poller = Poller::new(ingestor(fetcher.clone(), true), Duration::from_secs(1)).unwrap();

        poller.run().await.unwrap_err();

        let starts = fetcher.starts.lock().unwrap().clone();
        assert_eq!(starts.len(), 3);
        for pair in starts.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_secs(3), "gap {gap:?}");
            assert!(gap < Duration::from_millis(3500), "gap {gap:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_feeds_keeps_polling() {
        let fetcher = slow_fetcher(Duration::ZERO, usize::MAX);
        let mut poller = Poller::new(ingestor(fetcher.clone(), false), Duration::from_secs(1)).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(10), poller.run()).await;

        assert!(result.is_err(), "loop should still be running");
        assert!(poller.cycles() >= 10);
        assert_ne!(poller.state(), PollerState::Fatal);
        assert!(fetcher.starts.lock().unwrap().is_empty());
    }
}
