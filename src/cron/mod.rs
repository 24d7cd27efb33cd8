//! Minimal 5-field cron evaluator (min hour dom month dow).
//!
//! Each field is either `*` or a single number. Ranges, lists and steps are
//! rejected (`*/1` is accepted as another spelling of `*`). The next matching
//! minute is found by stepping forward one minute at a time.

mod next;
mod rules;

pub use next::{next_execution_after, SEARCH_HORIZON_YEARS};
pub use rules::{parse_cron, CronRule, CronRules};
