use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::{context_error, AssistantError, AssistantResult};

/// The resolved "current moment" used to interpret relative time
/// expressions. All three fields come from the client's clock so that a
/// skewed server clock never shifts the user's "tomorrow".
#[derive(Debug, Clone)]
pub struct TimeAnchor {
    pub now: DateTime<FixedOffset>,
    pub weekday: Weekday,
    pub days_in_month: u32,
}

impl TimeAnchor {
    /// Build an anchor from the client-reported context. Pure; fails with
    /// `InvalidContext` when the pieces disagree with each other.
    pub fn resolve(
        current_datetime: &str,
        weekday: &str,
        days_in_month: u32,
    ) -> AssistantResult<Self> {
        let now = DateTime::parse_from_rfc3339(current_datetime).map_err(|e| {
            AssistantError::InvalidContext(format!(
                "cannot parse timestamp {current_datetime:?}: {e}"
            ))
        })?;
        let weekday = parse_weekday(weekday)?;
        if now.weekday() != weekday {
            return Err(context_error("reported weekday does not match the timestamp"));
        }
        if !(28..=31).contains(&days_in_month) {
            return Err(context_error("days_in_month outside 28..=31"));
        }
        if days_in_month != days_in_month_of(now.date_naive()) {
            return Err(context_error(
                "days_in_month does not match the timestamp's month",
            ));
        }
        Ok(TimeAnchor {
            now,
            weekday,
            days_in_month,
        })
    }

    /// Anchor computed from the local clock in the given timezone. Used by
    /// the CLI chat mode, where this process *is* the client.
    pub fn local(tz: Tz) -> Self {
        let now = Utc::now().with_timezone(&tz).fixed_offset();
        TimeAnchor {
            weekday: now.weekday(),
            days_in_month: days_in_month_of(now.date_naive()),
            now,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    pub fn offset(&self) -> FixedOffset {
        *self.now.offset()
    }
}

fn parse_weekday(name: &str) -> AssistantResult<Weekday> {
    match name.trim().to_lowercase().as_str() {
        "monday" | "mon" => Ok(Weekday::Mon),
        "tuesday" | "tue" => Ok(Weekday::Tue),
        "wednesday" | "wed" => Ok(Weekday::Wed),
        "thursday" | "thu" => Ok(Weekday::Thu),
        "friday" | "fri" => Ok(Weekday::Fri),
        "saturday" | "sat" => Ok(Weekday::Sat),
        "sunday" | "sun" => Ok(Weekday::Sun),
        other => Err(AssistantError::InvalidContext(format!(
            "unknown weekday {other:?}"
        ))),
    }
}

pub fn days_in_month_of(date: NaiveDate) -> u32 {
    let (next_year, next_month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    // First day of the next month always exists.
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap_or_else(|| date.succ_opt().unwrap_or(date));
    first_of_next
        .signed_duration_since(NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date))
        .num_days() as u32
}
