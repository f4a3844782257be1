//! Per-minute, per-day and minimum-interval guard on upstream model calls
//!
//! Counters live behind a mutex so concurrent handlers cannot lose updates.
//! State is mirrored to a JSON file when a path is configured; the first
//! failed read or write switches the limiter to memory-only for the rest of
//! the process.

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;

use chrono::DateTime;
use chrono::Timelike;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::RateLimitConfig;

const MINUTE_MS: i64 = 60_000;
/// Usage at or above this share of a limit raises a warning flag
const WARNING_THRESHOLD: f64 = 0.8;

/// Persisted counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitState {
    pub requests_today: u32,
    pub requests_this_minute: u32,
    /// UTC day, `YYYY-MM-DD`
    pub current_day: String,
    /// Minutes since the Unix epoch
    pub current_minute: i64,
    /// Milliseconds since the Unix epoch, 0 before the first request
    pub last_request_time: i64,
    /// Accepted request times within the last minute, in milliseconds
    pub request_timestamps: Vec<i64>,
    pub total_requests: u64,
    pub first_request_date: Option<String>,
}

impl RateLimitState {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            requests_today: 0,
            requests_this_minute: 0,
            current_day: day_key(now),
            current_minute: minute_key(now),
            last_request_time: 0,
            request_timestamps: Vec::new(),
            total_requests: 0,
            first_request_date: None,
        }
    }

    /// Roll day and minute counters forward to `now`. Returns whether a
    /// counter was reset.
    fn refresh(&mut self, now: DateTime<Utc>) -> bool {
        let mut reset = false;

        let day = day_key(now);
        if self.current_day != day {
            debug!("New day {day}, resetting daily counter");
            self.current_day = day;
            self.requests_today = 0;
            reset = true;
        }

        let minute = minute_key(now);
        if self.current_minute != minute {
            self.current_minute = minute;
            reset = true;
        }

        let now_ms = now.timestamp_millis();
        self.request_timestamps.retain(|&ts| now_ms - ts < MINUTE_MS);
        self.requests_this_minute =
            u32::try_from(self.request_timestamps.len()).unwrap_or(u32::MAX);

        reset
    }
}

fn day_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

fn minute_key(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    DailyLimitExceeded,
    MinuteLimitExceeded,
}

impl DenialReason {
    pub const fn code(self) -> &'static str {
        match self {
            Self::DailyLimitExceeded => "daily_limit_exceeded",
            Self::MinuteLimitExceeded => "minute_limit_exceeded",
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::DailyLimitExceeded => "Daily request limit reached. Please come back tomorrow.",
            Self::MinuteLimitExceeded => {
                "Too many requests this minute. Please wait a moment and try again."
            }
        }
    }
}

/// When a denied caller may try again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAfter {
    Seconds(u64),
    /// After the UTC day rolls over
    Tomorrow,
}

impl Serialize for RetryAfter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Seconds(secs) => serializer.serialize_u64(*secs),
            Self::Tomorrow => serializer.serialize_str("tomorrow"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Remaining {
    pub today: u32,
    pub this_minute: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub reason: Option<DenialReason>,
    pub retry_after: Option<RetryAfter>,
    pub remaining: Remaining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleDecision {
    pub throttled: bool,
    pub wait_time_ms: u64,
}

/// Outcome of [`RateLimiter::try_acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Counted; carries the quota left afterwards
    Admitted(Remaining),
    Denied {
        reason: DenialReason,
        retry_after: RetryAfter,
    },
    Throttled {
        wait_time_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowUsage {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub percentage: f64,
}

impl WindowUsage {
    fn new(used: u32, limit: u32) -> Self {
        let percentage = if limit == 0 {
            100.0
        } else {
            f64::from(used) / f64::from(limit) * 100.0
        };
        Self {
            used,
            limit,
            remaining: limit.saturating_sub(used),
            percentage,
        }
    }

    pub fn near_limit(&self) -> bool {
        self.percentage >= WARNING_THRESHOLD * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageWarnings {
    pub near_daily_limit: bool,
    pub near_minute_limit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub today: WindowUsage,
    pub this_minute: WindowUsage,
    pub warnings: UsageWarnings,
    pub total_requests: u64,
    pub first_request_date: Option<String>,
    pub current_day: String,
    /// Whether counters survive a restart
    pub persistent: bool,
}

struct Inner {
    state: RateLimitState,
    /// `None` once persistence is disabled or failed
    path: Option<PathBuf>,
}

impl Inner {
    fn save(&mut self) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_state(path, &self.state) {
            warn!(
                "Failed to persist rate-limit state to {}: {e}; continuing in memory only",
                path.display()
            );
            self.path = None;
        }
    }
}

fn write_state(path: &Path, state: &RateLimitState) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(state)?;
    fs::write(path, json)
}

/// Read persisted state. `Ok(None)` when no file exists yet.
pub fn read_state(path: &Path) -> std::io::Result<Option<RateLimitState>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    inner: Mutex<Inner>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::new_at(config, Utc::now())
    }

    pub fn new_at(config: RateLimitConfig, now: DateTime<Utc>) -> Self {
        let mut path = config.state_path.clone();
        let mut state = RateLimitState::fresh(now);

        if let Some(p) = &path {
            match read_state(p) {
                Ok(Some(loaded)) => {
                    info!(
                        "Loaded rate-limit state from {} ({} requests on {})",
                        p.display(),
                        loaded.requests_today,
                        loaded.current_day
                    );
                    state = loaded;
                }
                Ok(None) => debug!("No rate-limit state at {}, starting fresh", p.display()),
                Err(e) => {
                    warn!(
                        "Failed to load rate-limit state from {}: {e}; continuing in memory only",
                        p.display()
                    );
                    path = None;
                }
            }
        }

        Self {
            config,
            inner: Mutex::new(Inner { state, path }),
        }
    }

    /// Memory-only limiter
    pub fn in_memory(mut config: RateLimitConfig) -> Self {
        config.state_path = None;
        Self::new(config)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Counters stay consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Lock and roll counters forward, persisting any reset
    fn refreshed(&self, now: DateTime<Utc>) -> MutexGuard<'_, Inner> {
        let mut inner = self.lock();
        if inner.state.refresh(now) {
            inner.save();
        }
        inner
    }

    fn remaining(&self, state: &RateLimitState) -> Remaining {
        Remaining {
            today: self.config.requests_per_day.saturating_sub(state.requests_today),
            this_minute: self
                .config
                .requests_per_minute
                .saturating_sub(state.requests_this_minute),
        }
    }

    pub fn can_make_request(&self) -> RateLimitDecision {
        self.can_make_request_at(Utc::now())
    }

    pub fn can_make_request_at(&self, now: DateTime<Utc>) -> RateLimitDecision {
        let inner = self.refreshed(now);
        self.decide(&inner.state, now)
    }

    fn decide(&self, state: &RateLimitState, now: DateTime<Utc>) -> RateLimitDecision {
        let remaining = self.remaining(state);

        let denial = if state.requests_today >= self.config.requests_per_day {
            Some((DenialReason::DailyLimitExceeded, RetryAfter::Tomorrow))
        } else if state.requests_this_minute >= self.config.requests_per_minute {
            let to_next_minute = 60 - u64::from(now.second());
            Some((
                DenialReason::MinuteLimitExceeded,
                RetryAfter::Seconds(to_next_minute),
            ))
        } else {
            None
        };

        match denial {
            Some((reason, retry_after)) => {
                debug!("Rate limit denial: {reason:?}");
                RateLimitDecision {
                    allowed: false,
                    reason: Some(reason),
                    retry_after: Some(retry_after),
                    remaining,
                }
            }
            None => RateLimitDecision {
                allowed: true,
                reason: None,
                retry_after: None,
                remaining,
            },
        }
    }

    pub fn should_throttle(&self) -> ThrottleDecision {
        self.should_throttle_at(Utc::now())
    }

    /// Deny a request arriving sooner than the minimum interval after the
    /// last accepted one
    pub fn should_throttle_at(&self, now: DateTime<Utc>) -> ThrottleDecision {
        let inner = self.lock();
        self.throttle(&inner.state, now)
    }

    fn throttle(&self, state: &RateLimitState, now: DateTime<Utc>) -> ThrottleDecision {
        let last = state.last_request_time;
        let min_interval = i64::try_from(self.config.min_interval_ms).unwrap_or(i64::MAX);
        let elapsed = now.timestamp_millis() - last;

        if last > 0 && elapsed < min_interval {
            ThrottleDecision {
                throttled: true,
                wait_time_ms: u64::try_from(min_interval - elapsed.max(0)).unwrap_or(0),
            }
        } else {
            ThrottleDecision {
                throttled: false,
                wait_time_ms: 0,
            }
        }
    }

    pub fn record_request(&self) {
        self.record_request_at(Utc::now());
    }

    /// Count an accepted request
    pub fn record_request_at(&self, now: DateTime<Utc>) {
        let mut inner = self.lock();
        inner.state.refresh(now);
        Self::record(&mut inner, now);
    }

    fn record(inner: &mut Inner, now: DateTime<Utc>) {
        let now_ms = now.timestamp_millis();
        let state = &mut inner.state;
        state.requests_today += 1;
        state.request_timestamps.push(now_ms);
        state.requests_this_minute =
            u32::try_from(state.request_timestamps.len()).unwrap_or(u32::MAX);
        state.last_request_time = now_ms;
        state.total_requests += 1;
        if state.first_request_date.is_none() {
            state.first_request_date = Some(state.current_day.clone());
        }

        inner.save();
    }

    pub fn try_acquire(&self) -> Admission {
        self.try_acquire_at(Utc::now())
    }

    /// Quota check, throttle check and recording under one lock
    pub fn try_acquire_at(&self, now: DateTime<Utc>) -> Admission {
        let mut inner = self.refreshed(now);

        let decision = self.decide(&inner.state, now);
        if let (false, Some(reason), Some(retry_after)) =
            (decision.allowed, decision.reason, decision.retry_after)
        {
            return Admission::Denied {
                reason,
                retry_after,
            };
        }

        let throttle = self.throttle(&inner.state, now);
        if throttle.throttled {
            debug!("Throttled, {}ms until next request", throttle.wait_time_ms);
            return Admission::Throttled {
                wait_time_ms: throttle.wait_time_ms,
            };
        }

        Self::record(&mut inner, now);
        Admission::Admitted(self.remaining(&inner.state))
    }

    /// Stop a failed request admitted at `admitted_at` from throttling the
    /// next one. It still counts toward the minute and daily quotas.
    pub fn release_throttle_at(&self, admitted_at: DateTime<Utc>) {
        let mut inner = self.lock();
        if inner.state.last_request_time == admitted_at.timestamp_millis() {
            debug!("Releasing throttle held by a failed request");
            inner.state.last_request_time = 0;
            inner.save();
        }
    }

    pub fn usage(&self) -> UsageSnapshot {
        self.usage_at(Utc::now())
    }

    pub fn usage_at(&self, now: DateTime<Utc>) -> UsageSnapshot {
        let inner = self.refreshed(now);
        let state = &inner.state;

        let today = WindowUsage::new(state.requests_today, self.config.requests_per_day);
        let this_minute =
            WindowUsage::new(state.requests_this_minute, self.config.requests_per_minute);

        UsageSnapshot {
            warnings: UsageWarnings {
                near_daily_limit: today.near_limit(),
                near_minute_limit: this_minute.near_limit(),
            },
            today,
            this_minute,
            total_requests: state.total_requests,
            first_request_date: state.first_request_date.clone(),
            current_day: state.current_day.clone(),
            persistent: inner.path.is_some(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use chrono::TimeZone;

    use super::*;

    fn config(per_minute: u32, per_day: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: per_minute,
            requests_per_day: per_day,
            min_interval_ms: 1000,
            state_path: None,
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, h, m, s).unwrap()
    }

    #[test]
    fn test_daily_limit_and_rollover() {
        let limiter = RateLimiter::in_memory(config(100, 3));
        let mut now = at(10, 0, 0);
        for _ in 0..3 {
            assert!(limiter.can_make_request_at(now).allowed);
            limiter.record_request_at(now);
            now += Duration::seconds(2);
        }

        let denied = limiter.can_make_request_at(now);
        assert!(!denied.allowed);
        assert_eq!(denied.reason, Some(DenialReason::DailyLimitExceeded));
        assert_eq!(denied.retry_after, Some(RetryAfter::Tomorrow));
        assert_eq!(denied.remaining.today, 0);

        let tomorrow = Utc.with_ymd_and_hms(2024, 9, 3, 0, 0, 1).unwrap();
        let decision = limiter.can_make_request_at(tomorrow);
        assert!(decision.allowed);
        assert_eq!(decision.remaining.today, 3);
        assert_eq!(limiter.usage_at(tomorrow).total_requests, 3);
    }

    #[test]
    fn test_minute_limit_retry_after_next_minute() {
        let limiter = RateLimiter::in_memory(config(2, 100));
        limiter.record_request_at(at(10, 0, 10));
        limiter.record_request_at(at(10, 0, 20));

        let denied = limiter.can_make_request_at(at(10, 0, 45));
        assert_eq!(denied.reason, Some(DenialReason::MinuteLimitExceeded));
        assert_eq!(denied.retry_after, Some(RetryAfter::Seconds(15)));

        // the 10:00:10 request has left the sliding window
        assert!(limiter.can_make_request_at(at(10, 1, 11)).allowed);
    }

    #[test]
    fn test_throttle_min_interval() {
        let limiter = RateLimiter::in_memory(config(100, 100));
        let now = at(9, 0, 0);
        assert!(!limiter.should_throttle_at(now).throttled);

        limiter.record_request_at(now);
        let decision = limiter.should_throttle_at(now + Duration::milliseconds(400));
        assert!(decision.throttled);
        assert_eq!(decision.wait_time_ms, 600);

        assert!(!limiter.should_throttle_at(now + Duration::milliseconds(1000)).throttled);
    }

    #[test]
    fn test_released_request_does_not_throttle_retry() {
        let limiter = RateLimiter::in_memory(config(100, 100));
        let failed_at = at(9, 30, 0);
        assert!(matches!(limiter.try_acquire_at(failed_at), Admission::Admitted(_)));

        limiter.release_throttle_at(failed_at);
        let retry = limiter.try_acquire_at(failed_at + Duration::milliseconds(50));
        assert!(matches!(retry, Admission::Admitted(r) if r.today == 98));

        // a later admission is not released by the stale timestamp
        limiter.release_throttle_at(failed_at);
        assert!(limiter
            .should_throttle_at(failed_at + Duration::milliseconds(100))
            .throttled);
    }

    #[test]
    fn test_try_acquire_checks_quota_then_throttle() {
        let limiter = RateLimiter::in_memory(config(100, 2));
        let now = at(11, 0, 0);

        assert!(matches!(limiter.try_acquire_at(now), Admission::Admitted(r) if r.today == 1));
        assert_eq!(
            limiter.try_acquire_at(now + Duration::milliseconds(200)),
            Admission::Throttled { wait_time_ms: 800 }
        );
        assert!(matches!(
            limiter.try_acquire_at(now + Duration::seconds(2)),
            Admission::Admitted(_)
        ));
        assert_eq!(
            limiter.try_acquire_at(now + Duration::seconds(4)),
            Admission::Denied {
                reason: DenialReason::DailyLimitExceeded,
                retry_after: RetryAfter::Tomorrow,
            }
        );
        assert_eq!(limiter.usage_at(now + Duration::seconds(4)).today.used, 2);
    }

    #[test]
    fn test_usage_warnings() {
        let limiter = RateLimiter::in_memory(config(5, 10));
        let now = at(12, 0, 0);
        for i in 0..4 {
            limiter.record_request_at(now + Duration::seconds(i));
        }

        let usage = limiter.usage_at(now + Duration::seconds(5));
        assert_eq!(usage.today.used, 4);
        assert!(!usage.warnings.near_daily_limit);
        assert!(usage.warnings.near_minute_limit);
        assert_eq!(usage.this_minute.remaining, 1);
        assert_eq!(usage.first_request_date.as_deref(), Some("2024-09-02"));
        assert!(!usage.persistent);
    }

    #[test]
    fn test_state_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("rate_limit.json");
        let mut cfg = config(100, 100);
        cfg.state_path = Some(path.clone());

        let now = at(8, 0, 0);
        let first = RateLimiter::new_at(cfg.clone(), now);
        first.record_request_at(now);
        first.record_request_at(now + Duration::seconds(3));
        assert!(first.usage_at(now).persistent);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("requestsToday"));
        assert!(raw.contains("\"currentDay\": \"2024-09-02\""));

        let second = RateLimiter::new_at(cfg, now + Duration::seconds(4));
        assert_eq!(second.usage_at(now + Duration::seconds(4)).today.used, 2);
    }

    #[test]
    fn test_corrupt_state_falls_back_to_memory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), "not json").unwrap();
        let mut cfg = config(100, 100);
        cfg.state_path = Some(file.path().to_path_buf());

        let limiter = RateLimiter::new(cfg);
        limiter.record_request();

        assert!(!limiter.usage().persistent);
        assert_eq!(fs::read_to_string(file.path()).unwrap(), "not json");
    }

    #[test]
    fn test_write_failure_disables_persistence() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut cfg = config(100, 100);
        // parent is a regular file, so the directory cannot be created
        cfg.state_path = Some(file.path().join("state.json"));

        let limiter = RateLimiter::new(cfg);
        limiter.record_request();

        let usage = limiter.usage();
        assert!(!usage.persistent);
        assert_eq!(usage.today.used, 1);
    }

    #[test]
    fn test_retry_after_serialization() {
        assert_eq!(serde_json::to_value(RetryAfter::Seconds(12)).unwrap(), 12);
        assert_eq!(serde_json::to_value(RetryAfter::Tomorrow).unwrap(), "tomorrow");
    }
}
