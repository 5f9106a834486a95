//! Five-field cron schedules for `time_scheduled` rules.
//!
//! Format: `minute hour day-of-month month day-of-week`, evaluated in UTC.
//! Each field accepts `*`, a number, a range `a-b`, a step `*/n` or `a-b/n`,
//! and comma-separated lists of those. Day-of-week is `0-6` with Sunday as
//! `0` (`7` is accepted as Sunday too). When both day fields are restricted
//! a time matches if either one does, as in classic cron.

use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc};

use crate::error::CoreError;

/// Upper bound on how far back [`Schedule::latest_occurrence`] will search.
pub const MAX_LOOKBACK_MINUTES: i64 = 7 * 24 * 60;

// ---------------------------------------------------------------------------
// Field parsing
// ---------------------------------------------------------------------------

/// Set of allowed values for one field, as a bitmask over `0..64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet {
    bits: u64,
    restricted: bool,
}

impl FieldSet {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.bits & (1u64 << value) != 0
    }
}

fn parse_value(raw: &str, name: &str, min: u32, max: u32) -> Result<u32, CoreError> {
    let value: u32 = raw.parse().map_err(|_| {
        CoreError::Validation(format!("Invalid {name} value '{raw}' in schedule"))
    })?;
    if value < min || value > max {
        return Err(CoreError::Validation(format!(
            "{name} value {value} out of range {min}-{max}"
        )));
    }
    Ok(value)
}

fn parse_field(raw: &str, name: &str, min: u32, max: u32) -> Result<FieldSet, CoreError> {
    let mut bits = 0u64;
    for part in raw.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step = parse_value(step, name, 1, max.max(1))?;
                (range, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            let lo = parse_value(a, name, min, max)?;
            let hi = parse_value(b, name, min, max)?;
            if lo > hi {
                return Err(CoreError::Validation(format!(
                    "Invalid {name} range '{range}' in schedule"
                )));
            }
            (lo, hi)
        } else {
            let v = parse_value(range, name, min, max)?;
            // `5/15` means "from 5 every 15".
            if part.contains('/') {
                (v, max)
            } else {
                (v, v)
            }
        };

        let mut v = lo;
        while v <= hi {
            bits |= 1u64 << v;
            v += step;
        }
    }
    Ok(FieldSet {
        bits,
        restricted: raw != "*",
    })
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    source: String,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
}

impl Schedule {
    /// Parse a five-field expression.
    pub fn parse(expr: &str) -> Result<Self, CoreError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CoreError::Validation(format!(
                "Schedule '{expr}' must have 5 fields (minute hour day month weekday), got {}",
                fields.len()
            )));
        }

        let mut days_of_week = parse_field(fields[4], "day-of-week", 0, 7)?;
        // Fold 7 onto Sunday.
        if days_of_week.contains(7) {
            days_of_week.bits |= 1;
        }

        Ok(Self {
            source: expr.trim().to_string(),
            minutes: parse_field(fields[0], "minute", 0, 59)?,
            hours: parse_field(fields[1], "hour", 0, 23)?,
            days_of_month: parse_field(fields[2], "day-of-month", 1, 31)?,
            months: parse_field(fields[3], "month", 1, 12)?,
            days_of_week,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the minute containing `at` is an occurrence.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        if !self.minutes.contains(at.minute())
            || !self.hours.contains(at.hour())
            || !self.months.contains(at.month())
        {
            return false;
        }

        let dom = self.days_of_month.contains(at.day());
        let dow = self
            .days_of_week
            .contains(at.weekday().num_days_from_sunday());

        match (self.days_of_month.restricted, self.days_of_week.restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }

    /// The most recent occurrence in the window `(after, until]`, truncated
    /// to the minute.
    ///
    /// Searches at most [`MAX_LOOKBACK_MINUTES`] back from `until`.
    pub fn latest_occurrence(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let mut at = until.duration_trunc(Duration::minutes(1)).ok()?;
        for _ in 0..=MAX_LOOKBACK_MINUTES {
            if at <= after {
                return None;
            }
            if self.matches(at) {
                return Some(at);
            }
            at -= Duration::minutes(1);
        }
        None
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
