use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, TimeZone, Timelike};

use crate::error::CronError;

/// Constraint for one cron field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronRule {
    Any,
    Exact(u32),
}

impl CronRule {
    pub const fn is_exact(self) -> bool {
        matches!(self, Self::Exact(_))
    }

    pub const fn accepts(self, value: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == value,
        }
    }

    fn parse(field: &'static str, token: &str, min: u32, max: u32) -> Result<Self, CronError> {
        if token == "*" || token == "*/1" {
            return Ok(Self::Any);
        }
        if token.contains(['/', '-', ',']) {
            return Err(CronError::Unsupported {
                field,
                value: token.to_owned(),
            });
        }
        let value = token.parse::<u32>().map_err(|_| CronError::Invalid {
            field,
            value: token.to_owned(),
        })?;
        if !(min..=max).contains(&value) {
            return Err(CronError::OutOfRange {
                field,
                value,
                min,
                max,
            });
        }
        Ok(Self::Exact(value))
    }
}

impl fmt::Display for CronRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(value) => write!(f, "{value}"),
        }
    }
}

/// Parsed cron expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronRules {
    pub minute: CronRule,
    pub hour: CronRule,
    pub day_of_month: CronRule,
    pub month: CronRule,
    /// 0 = Sunday.
    pub day_of_week: CronRule,
}

impl CronRules {
    /// Check `date` against every field, in the date's own timezone.
    ///
    /// Day-of-month and day-of-week are only enforced when exact; when both
    /// are exact a date must satisfy both.
    pub fn matches<Tz: TimeZone>(&self, date: &DateTime<Tz>) -> bool {
        self.minute.accepts(date.minute())
            && self.hour.accepts(date.hour())
            && self.month.accepts(date.month())
            && self.day_of_month.accepts(date.day())
            && self
                .day_of_week
                .accepts(date.weekday().num_days_from_sunday())
    }
}

impl FromStr for CronRules {
    type Err = CronError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, day_of_month, month, day_of_week] = fields[..] else {
            return Err(CronError::FieldCount(fields.len()));
        };
        Ok(Self {
            minute: CronRule::parse("minute", minute, 0, 59)?,
            hour: CronRule::parse("hour", hour, 0, 23)?,
            day_of_month: CronRule::parse("day-of-month", day_of_month, 1, 31)?,
            month: CronRule::parse("month", month, 1, 12)?,
            day_of_week: CronRule::parse("day-of-week", day_of_week, 0, 6)?,
        })
    }
}

impl fmt::Display for CronRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month, self.day_of_week
        )
    }
}

/// Parse a 5-field cron expression.
pub fn parse_cron(expression: &str) -> Result<CronRules, CronError> {
    expression.parse()
}
