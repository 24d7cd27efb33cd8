//! Timer-driven refetching of queries.
//!
//! A [`Scheduler`] spawns tokio tasks that refetch a query after an initial
//! delay, on a fixed interval, and at the times a cron expression selects.
//! Every timer belongs to a [`ScheduleHandle`]; dropping the handle cancels
//! them all.

mod clock;
mod options;
mod scheduler;

pub use clock::{Clock, SystemClock, TokioClock};
pub use options::ScheduleOptions;
pub use scheduler::{ScheduleHandle, ScheduleStatus, Scheduler};
