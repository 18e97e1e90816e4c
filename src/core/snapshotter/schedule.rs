use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use cron::Schedule;

use crate::Error;
use crate::Result;

/// Cron schedule for periodic full snapshots.
///
/// Accepts standard 5-field expressions (`min hour dom month dow`, Sunday = 0 or 7)
/// as well as 6-field expressions with a leading seconds field.
#[derive(Clone)]
pub struct FullSnapshotSchedule {
    expression: String,
    schedule: Schedule,
}

impl FullSnapshotSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let normalized = match fields.len() {
            5 => format!(
                "0 {} {} {} {} {}",
                fields[0],
                fields[1],
                fields[2],
                fields[3],
                shift_day_of_week(fields[4])
            ),
            6 => fields.join(" "),
            n => {
                return Err(Error::InvalidConfig(format!(
                    "full snapshot schedule {expression:?} has {n} fields, expected 5 or 6"
                )))
            }
        };
        let schedule = Schedule::from_str(&normalized).map_err(|e| {
            Error::InvalidConfig(format!("invalid full snapshot schedule {expression:?}: {e}"))
        })?;
        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `t`
    pub fn next_after(
        &self,
        t: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.schedule.after(&t).next()
    }

    /// Whether a fire time fell in `(since, now]`.
    pub fn missed_since(
        &self,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        self.next_after(since).map(|t| t <= now).unwrap_or(false)
    }
}

impl fmt::Debug for FullSnapshotSchedule {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_tuple("FullSnapshotSchedule").field(&self.expression).finish()
    }
}

/// Standard cron numbers weekdays 0-7 from Sunday; the parser expects 1-7.
fn shift_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            let shifted = match range.split_once('-') {
                Some((start, end)) => match (start.parse::<u8>(), end.parse::<u8>()) {
                    (Ok(0), Ok(7)) => "1-7".to_string(),
                    (Ok(start), Ok(7)) => format!("{}-7,1", start + 1),
                    (Ok(start), Ok(end)) => format!("{}-{}", start + 1, (end % 7) + 1),
                    _ => range.to_string(),
                },
                None => match range.parse::<u8>() {
                    Ok(day) => ((day % 7) + 1).to_string(),
                    Err(_) => range.to_string(),
                },
            };
            match step {
                Some(step) => format!("{shifted}/{step}"),
                None => shifted,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
