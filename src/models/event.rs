use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{validation_error, AssistantResult};

pub const MAX_TITLE_LEN: usize = 255;

/// A stored calendar event. `owner_id` never crosses the wire; events are
/// only ever listed and mutated through their owner.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(rename = "startDate")]
    pub start_date: DateTime<FixedOffset>,
    /// Minutes. Absent means "unspecified", not zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing, default)]
    pub owner_id: String,
}

impl Event {
    /// Half-open occupancy window. Zero-width when duration is unspecified.
    pub fn window(&self) -> (DateTime<FixedOffset>, DateTime<FixedOffset>) {
        let end = self.start_date + Duration::minutes(self.duration.unwrap_or(0));
        (self.start_date, end)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EventCreate {
    pub title: String,
    #[serde(rename = "startDate")]
    pub start_date: DateTime<FixedOffset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Partial update. Absent fields are left unchanged; unsetting `duration`
/// or `location` requires the explicit clear flag.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct EventPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "startDate", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub clear_duration: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub clear_location: bool,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.start_date.is_none()
            && self.duration.is_none()
            && self.location.is_none()
            && !self.clear_duration
            && !self.clear_location
    }
}

pub fn validate_title(title: &str) -> AssistantResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(validation_error("the event title is empty"));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(validation_error("the event title is longer than 255 characters"));
    }
    Ok(trimmed.to_string())
}

pub fn validate_duration(duration: Option<i64>) -> AssistantResult<Option<i64>> {
    match duration {
        Some(minutes) if minutes <= 0 => {
            Err(validation_error("the duration must be a positive number of minutes"))
        }
        other => Ok(other),
    }
}
