use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::logging::LogOptions;

/// When a scheduled query refetches.
///
/// Deserializable from config; durations are given in milliseconds.
///
/// ```
/// use stowage::schedule::ScheduleOptions;
///
/// let options: ScheduleOptions =
///     serde_json::from_str(r#"{"delay_ms": 100, "interval_ms": 1000}"#).unwrap();
/// assert_eq!(options.interval().map(|d| d.as_millis()), Some(1000));
/// assert!(options.cron.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScheduleOptions {
    /// Wait before the first execution.
    pub delay_ms: u64,
    /// Refetch this long after each completed execution. Zero disables it.
    pub interval_ms: Option<u64>,
    /// 5-field cron expression evaluated in `timezone`.
    pub cron: Option<String>,
    pub cron_enabled: bool,
    pub timezone: Tz,
    pub log: LogOptions,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            delay_ms: 0,
            interval_ms: None,
            cron: None,
            cron_enabled: true,
            timezone: Tz::UTC,
            log: LogOptions::default(),
        }
    }
}

impl ScheduleOptions {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = Some(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_cron(mut self, expression: impl Into<String>) -> Self {
        self.cron = Some(expression.into());
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_log(mut self, log: LogOptions) -> Self {
        self.log = log;
        self
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval_ms
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
    }

    /// The cron expression, if one is configured and switched on.
    pub fn active_cron(&self) -> Option<&str> {
        self.cron.as_deref().filter(|_| self.cron_enabled)
    }
}
