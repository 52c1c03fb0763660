//! # Clock and Triggers
//!
//! A [`Trigger`] decides when a job fires next. Three forms are accepted when
//! parsing from configuration:
//!
//! - `every <n><unit>` with unit `s`, `m`, `h` or `d` (also `hourly`)
//! - `daily HH:MM`, a fixed UTC wall-clock time
//! - a 5-field cron expression `MIN HOUR DOM MON DOW` (`*`, `*/n`, `a-b`,
//!   `a-b/n`, comma lists, plain numbers), evaluated in UTC
//!
//! The [`Clock`] trait abstracts "now" so jobs and tests can pin time.

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use cron::Schedule;
use thiserror::Error;

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Errors produced while parsing a trigger expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerParseError {
    #[error("empty trigger expression")]
    Empty,
    #[error("invalid interval '{0}', expected e.g. 'every 30m'")]
    InvalidInterval(String),
    #[error("interval must be greater than zero")]
    ZeroInterval,
    #[error("invalid daily time '{0}', expected 'daily HH:MM'")]
    InvalidDailyTime(String),
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },
    #[error("unrecognised trigger expression '{0}'")]
    Unrecognised(String),
}

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Fixed period measured from the previous firing
    Interval(Duration),
    /// Once a day at a fixed UTC time
    DailyAt(NaiveTime),
    Cron(CronSchedule),
}

impl Trigger {
    /// First firing time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Interval(period) => {
                let delta = TimeDelta::from_std(*period).ok()?;
                after.checked_add_signed(delta)
            }
            Trigger::DailyAt(time) => {
                let today = after.date_naive().and_time(*time).and_utc();
                if today > after {
                    Some(today)
                } else {
                    today.checked_add_signed(TimeDelta::days(1))
                }
            }
            Trigger::Cron(schedule) => schedule.next_after(after),
        }
    }
}

impl FromStr for Trigger {
    type Err = TriggerParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let expr = raw.trim();
        if expr.is_empty() {
            return Err(TriggerParseError::Empty);
        }

        let lower = expr.to_ascii_lowercase();
        if lower == "hourly" {
            return Ok(Trigger::Interval(Duration::from_secs(3600)));
        }

        if let Some(rest) = lower.strip_prefix("every ") {
            return parse_interval(rest.trim()).map(Trigger::Interval);
        }

        if let Some(rest) = lower.strip_prefix("daily ") {
            return NaiveTime::parse_from_str(rest.trim(), "%H:%M")
                .map(Trigger::DailyAt)
                .map_err(|_| TriggerParseError::InvalidDailyTime(rest.trim().to_string()));
        }

        if expr.split_whitespace().count() == 5 {
            return expr.parse::<CronSchedule>().map(Trigger::Cron);
        }

        Err(TriggerParseError::Unrecognised(expr.to_string()))
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Interval(period) => {
                let secs = period.as_secs();
                if secs > 0 && secs % 86_400 == 0 {
                    write!(f, "every {}d", secs / 86_400)
                } else if secs > 0 && secs % 3_600 == 0 {
                    write!(f, "every {}h", secs / 3_600)
                } else if secs > 0 && secs % 60 == 0 {
                    write!(f, "every {}m", secs / 60)
                } else if period.subsec_millis() == 0 {
                    write!(f, "every {secs}s")
                } else {
                    write!(f, "every {}ms", period.as_millis())
                }
            }
            Trigger::DailyAt(time) => write!(f, "daily {}", time.format("%H:%M")),
            Trigger::Cron(schedule) => f.write_str(&schedule.source),
        }
    }
}

fn parse_interval(spec: &str) -> Result<Duration, TriggerParseError> {
    let invalid = || TriggerParseError::InvalidInterval(spec.to_string());

    let split = spec
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (digits, unit) = spec.split_at(split);
    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    if amount == 0 {
        return Err(TriggerParseError::ZeroInterval);
    }

    let duration = match unit.trim() {
        "ms" => Duration::from_millis(amount),
        "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount.checked_mul(60).ok_or_else(invalid)?),
        "h" => Duration::from_secs(amount.checked_mul(3_600).ok_or_else(invalid)?),
        "d" => Duration::from_secs(amount.checked_mul(86_400).ok_or_else(invalid)?),
        _ => return Err(invalid()),
    };
    Ok(duration)
}

/// 5-field cron expression evaluated in UTC, backed by [`cron::Schedule`].
///
/// Day of week follows Unix numbering (`0` or `7` is Sunday). When both day
/// fields are restricted, a day must satisfy both.
#[derive(Clone)]
pub struct CronSchedule {
    source: String,
    schedule: Schedule,
}

const WEEKDAY_NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

impl CronSchedule {
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.source).finish()
    }
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for CronSchedule {}

impl FromStr for CronSchedule {
    type Err = TriggerParseError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(TriggerParseError::Unrecognised(expr.to_string()));
        }
        let invalid = |reason: String| TriggerParseError::InvalidCron {
            expr: parts.join(" "),
            reason,
        };

        if parts.iter().any(|field| field.split(',').any(|item| item.ends_with("/0"))) {
            return Err(invalid("step must be greater than zero".to_string()));
        }

        // The cron crate takes seconds first and a trailing year.
        let extended = format!(
            "0 {} {} {} {} {} *",
            parts[0],
            parts[1],
            parts[2],
            parts[3],
            unix_days_of_week(parts[4]).map_err(invalid)?
        );
        let schedule = Schedule::from_str(&extended).map_err(|err| invalid(err.to_string()))?;

        Ok(Self {
            source: parts.join(" "),
            schedule,
        })
    }
}

/// Rewrite numeric day-of-week values as names, which mean the same thing to
/// the cron crate as they do in Unix cron.
fn unix_days_of_week(field: &str) -> Result<String, String> {
    let name = |value: &str| -> Result<&'static str, String> {
        value
            .parse::<usize>()
            .ok()
            .and_then(|day| WEEKDAY_NAMES.get(day).copied())
            .ok_or_else(|| format!("invalid day of week '{value}'"))
    };

    let mut items = Vec::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (item, None),
        };

        let range = if range == "*" || range.chars().all(|c| c.is_ascii_alphabetic()) {
            range.to_string()
        } else if let Some((lo, hi)) = range.split_once('-') {
            format!("{}-{}", name(lo)?, name(hi)?)
        } else {
            name(range)?.to_string()
        };

        items.push(match step {
            Some(step) => format!("{range}/{step}"),
            None => range,
        });
    }
    Ok(items.join(","))
}
