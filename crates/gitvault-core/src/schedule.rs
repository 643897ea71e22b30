//! Cron expression handling for the scheduler.
//!
//! Both classic 5-field (minute resolution) and 6-field (leading seconds
//! field) expressions are accepted. All evaluation happens in UTC no matter
//! what the host time zone is.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;

use crate::error::{Result, VaultError};

/// Parse a 5- or 6-field cron expression. A 5-field expression fires at
/// second zero of each matching minute.
pub fn parse_cron(expression: &str) -> Result<Schedule> {
    let trimmed = expression.trim();
    let field_count = trimmed.split_whitespace().count();
    let candidate = match field_count {
        5 => format!("0 {trimmed}"),
        6 => trimmed.to_string(),
        _ => return Err(VaultError::CronInvalid(expression.to_string())),
    };
    Schedule::from_str(&candidate).map_err(|_| VaultError::CronInvalid(expression.to_string()))
}

/// The next occurrence strictly after `now + 1 ms`, in UTC. `None` when the
/// expression has no future occurrence.
pub fn next_occurrence(schedule: &Schedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&(now + Duration::milliseconds(1))).next()
}
