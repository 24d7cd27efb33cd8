use chrono::{DateTime, Months, TimeZone};

use super::rules::CronRules;

/// How far ahead [`next_execution_after`] searches before giving up.
pub const SEARCH_HORIZON_YEARS: u32 = 5;

const MINUTE: i64 = 60;

/// First whole minute strictly after `from` that satisfies `rules`.
///
/// Candidates advance one minute at a time in absolute time and are judged
/// in `from`'s timezone, so local times skipped by a DST gap never match and
/// the earlier instant of a repeated local time wins. Returns `None` when
/// nothing matches within [`SEARCH_HORIZON_YEARS`].
pub fn next_execution_after<Tz: TimeZone>(
    rules: &CronRules,
    from: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let tz = from.timezone();
    let horizon = from
        .clone()
        .checked_add_months(Months::new(12 * SEARCH_HORIZON_YEARS))?
        .timestamp();

    let mut candidate = from
        .timestamp()
        .div_euclid(MINUTE)
        .checked_add(1)?
        .checked_mul(MINUTE)?;
    while candidate <= horizon {
        let local = DateTime::from_timestamp(candidate, 0)?.with_timezone(&tz);
        if rules.matches(&local) {
            return Some(local);
        }
        candidate += MINUTE;
    }
    None
}
