use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveTime, TimeZone, Weekday,
};

use crate::context::TimeAnchor;
use crate::error::{AssistantError, AssistantResult};

/// An absolute start resolved from a raw temporal phrase. The offset is
/// the anchor's; nothing is shifted into UTC behind the user's back.
#[derive(Debug, Clone)]
pub struct NormalizedStart {
    pub start: DateTime<FixedOffset>,
    /// True when the time of day is a default, not something the user said.
    pub time_inferred: bool,
}

/// Resolve a raw temporal phrase against the anchor.
///
/// Deterministic rules, no guessing: a bare time of day that has already
/// passed today is `AmbiguousDate` (never silently rolled forward), and a
/// day-of-month beyond the anchor month's length is rejected, not clamped.
pub fn normalize_start(anchor: &TimeAnchor, phrase: &str) -> AssistantResult<NormalizedStart> {
    let tokens = tokenize(phrase);
    if tokens.is_empty() {
        return Err(AssistantError::UnresolvableDateTime(phrase.to_string()));
    }
    let date = parse_date(anchor, &tokens, phrase)?;
    let time = parse_time(&tokens, phrase)?;
    let default_time = part_of_day_default(&tokens);

    let (date, time, inferred) = match (date, time) {
        (Some(date), Some(time)) => (date, time, false),
        (Some(date), None) => (
            date,
            default_time.unwrap_or_else(default_noon),
            true,
        ),
        (None, Some(time)) => {
            let candidate = at_local(anchor, anchor.today(), time)?;
            if candidate <= anchor.now {
                return Err(AssistantError::AmbiguousDate(format!(
                    "\"{phrase}\" names a time that has already passed today"
                )));
            }
            (anchor.today(), time, false)
        }
        (None, None) => {
            return Err(AssistantError::UnresolvableDateTime(phrase.to_string()));
        }
    };

    Ok(NormalizedStart {
        start: at_local(anchor, date, time)?,
        time_inferred: inferred,
    })
}

/// Resolve a raw temporal phrase into a half-open [from, to) window for
/// queries. No phrase means "the upcoming week".
pub fn normalize_range(
    anchor: &TimeAnchor,
    phrase: Option<&str>,
) -> AssistantResult<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
    let Some(phrase) = phrase.filter(|p| !p.trim().is_empty()) else {
        return Ok((anchor.now, anchor.now + Duration::days(7)));
    };
    let tokens = tokenize(phrase);

    if let Some(range) = parse_named_range(anchor, &tokens)? {
        return Ok(range);
    }
    if let Some(date) = parse_date(anchor, &tokens, phrase)? {
        return day_range(anchor, date);
    }
    if parse_time(&tokens, phrase)?.is_some() {
        return day_range(anchor, anchor.today());
    }
    Err(AssistantError::UnresolvableDateTime(phrase.to_string()))
}

pub fn day_range(
    anchor: &TimeAnchor,
    date: NaiveDate,
) -> AssistantResult<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
    let from = at_local(anchor, date, NaiveTime::MIN)?;
    let next = date
        .succ_opt()
        .ok_or_else(|| AssistantError::UnresolvableDateTime(date.to_string()))?;
    let to = at_local(anchor, next, NaiveTime::MIN)?;
    Ok((from, to))
}

fn tokenize(phrase: &str) -> Vec<String> {
    phrase
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| c == ',' || c == '.' || c == '!' || c == '?')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn default_noon() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).expect("noon is a valid time")
}

fn part_of_day_default(tokens: &[String]) -> Option<NaiveTime> {
    for token in tokens {
        let time = match token.as_str() {
            "morning" => NaiveTime::from_hms_opt(9, 0, 0),
            "afternoon" => NaiveTime::from_hms_opt(15, 0, 0),
            "evening" => NaiveTime::from_hms_opt(19, 0, 0),
            "tonight" => NaiveTime::from_hms_opt(20, 0, 0),
            _ => None,
        };
        if time.is_some() {
            return time;
        }
    }
    None
}

fn at_local(
    anchor: &TimeAnchor,
    date: NaiveDate,
    time: NaiveTime,
) -> AssistantResult<DateTime<FixedOffset>> {
    anchor
        .offset()
        .from_local_datetime(&date.and_time(time))
        .single()
        .ok_or_else(|| AssistantError::UnresolvableDateTime(format!("{date} {time}")))
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn month_from_name(name: &str) -> Option<u32> {
    let months = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    months.iter().position(|m| *m == name).map(|i| i as u32 + 1)
}

fn word_number(lower: &str) -> Option<i64> {
    match lower {
        "one" | "a" | "an" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        "six" => Some(6),
        "seven" => Some(7),
        "eight" => Some(8),
        "nine" => Some(9),
        "ten" => Some(10),
        _ => lower.parse::<i64>().ok(),
    }
}

fn ordinal_day(lower: &str) -> Option<u32> {
    let stripped = lower
        .strip_suffix("st")
        .or_else(|| lower.strip_suffix("nd"))
        .or_else(|| lower.strip_suffix("rd"))
        .or_else(|| lower.strip_suffix("th"))?;
    stripped.parse::<u32>().ok()
}

/// Days until the next occurrence of `target`, counting from the anchor's
/// weekday (Monday-first numbering). `strictly_after` is the "next X"
/// form: on a Thursday, "next Thursday" is seven days out.
fn days_until(anchor: &TimeAnchor, target: Weekday, strictly_after: bool) -> i64 {
    let today = anchor.weekday.num_days_from_monday() as i64;
    let wanted = target.num_days_from_monday() as i64;
    let delta = (wanted - today).rem_euclid(7);
    if delta == 0 && strictly_after {
        7
    } else {
        delta
    }
}

fn parse_date(
    anchor: &TimeAnchor,
    tokens: &[String],
    phrase: &str,
) -> AssistantResult<Option<NaiveDate>> {
    let today = anchor.today();

    for (i, token) in tokens.iter().enumerate() {
        let prev = i.checked_sub(1).map(|p| tokens[p].as_str());
        match token.as_str() {
            "today" | "tonight" => return Ok(Some(today)),
            "tomorrow" => {
                return today
                    .succ_opt()
                    .map(Some)
                    .ok_or_else(|| AssistantError::UnresolvableDateTime(phrase.to_string()));
            }
            "week" if matches!(prev, Some("next")) => {
                return Ok(Some(today + Duration::days(7)));
            }
            _ => {}
        }

        if let Some(weekday) = weekday_from_name(token) {
            let strictly_after = matches!(prev, Some("next"));
            let delta = days_until(anchor, weekday, strictly_after);
            return Ok(Some(today + Duration::days(delta)));
        }

        if let Some(month) = month_from_name(token) {
            let day = tokens
                .get(i + 1)
                .and_then(|t| ordinal_day(t).or_else(|| t.parse::<u32>().ok()))
                .or_else(|| {
                    i.checked_sub(1)
                        .and_then(|p| ordinal_day(&tokens[p]).or_else(|| tokens[p].parse().ok()))
                });
            let Some(day) = day else {
                return Err(AssistantError::AmbiguousDate(format!(
                    "\"{phrase}\" names a month but not a day"
                )));
            };
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
            let date = match this_year {
                Some(date) if date >= today => date,
                // Missing year: next occurrence on or after today.
                _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day).ok_or_else(|| {
                    AssistantError::UnresolvableDateTime(phrase.to_string())
                })?,
            };
            return Ok(Some(date));
        }

        // "in two weeks", "in 3 days", "in a month"
        if token == "in" {
            if let (Some(count), Some(unit)) = (
                tokens.get(i + 1).and_then(|t| word_number(t)),
                tokens.get(i + 2),
            ) {
                let date = match unit.as_str() {
                    "day" | "days" => Some(today + Duration::days(count)),
                    "week" | "weeks" => Some(today + Duration::days(count * 7)),
                    "month" | "months" => today.checked_add_months(Months::new(count as u32)),
                    _ => None,
                };
                if let Some(date) = date {
                    return Ok(Some(date));
                }
            }
        }

        // Day of the anchor's month: "the 31st". Rejected, not clamped,
        // when the month is too short.
        if let Some(day) = ordinal_day(token) {
            if day == 0 || day > anchor.days_in_month {
                return Err(AssistantError::UnresolvableDateTime(format!(
                    "day {day} does not exist this month"
                )));
            }
            let date = NaiveDate::from_ymd_opt(today.year(), today.month(), day)
                .ok_or_else(|| AssistantError::UnresolvableDateTime(phrase.to_string()))?;
            if date < today {
                return Err(AssistantError::AmbiguousDate(format!(
                    "the {token} of this month is already past"
                )));
            }
            return Ok(Some(date));
        }
    }

    Ok(None)
}

fn parse_time(tokens: &[String], phrase: &str) -> AssistantResult<Option<NaiveTime>> {
    for (i, token) in tokens.iter().enumerate() {
        match token.as_str() {
            "noon" => return Ok(Some(default_noon())),
            "midnight" => return Ok(Some(NaiveTime::MIN)),
            _ => {}
        }

        let (base, mut meridiem) = split_meridiem(token);
        if base.is_empty() || !base.chars().all(|c| c.is_ascii_digit() || c == ':') {
            continue;
        }
        if meridiem.is_none() {
            meridiem = tokens.get(i + 1).and_then(|next| match next.as_str() {
                "am" => Some(Meridiem::Am),
                "pm" => Some(Meridiem::Pm),
                _ => None,
            });
        }

        let mut parts = base.splitn(2, ':');
        let hour_part = parts.next().unwrap_or_default();
        if hour_part.is_empty() {
            continue;
        }
        let Ok(mut hour) = hour_part.parse::<u32>() else {
            continue;
        };
        let minute = match parts.next() {
            Some(m) => m
                .parse::<u32>()
                .map_err(|_| AssistantError::UnresolvableDateTime(phrase.to_string()))?,
            None => 0,
        };

        // Plain digits with no meridiem and no colon only read as a time
        // after "at"/"until"/"by"; the 3 in "in 3 days" is not a clock.
        if meridiem.is_none() && !base.contains(':') {
            let prev = i.checked_sub(1).map(|p| tokens[p].as_str());
            if !matches!(prev, Some("at") | Some("until") | Some("by")) {
                continue;
            }
            if hour > 23 {
                continue;
            }
        }

        hour = match meridiem {
            Some(Meridiem::Am) => hour % 12,
            Some(Meridiem::Pm) => hour % 12 + 12,
            // Deterministic tie-break for bare hours: 8..=23 read as
            // written, 1..=7 read as afternoon/evening.
            None => {
                if (1..=7).contains(&hour) && !base.contains(':') {
                    hour + 12
                } else {
                    hour
                }
            }
        };

        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| AssistantError::UnresolvableDateTime(phrase.to_string()))?;
        return Ok(Some(time));
    }
    Ok(None)
}

#[derive(Clone, Copy)]
enum Meridiem {
    Am,
    Pm,
}

fn split_meridiem(token: &str) -> (&str, Option<Meridiem>) {
    if let Some(base) = token.strip_suffix("am") {
        (base, Some(Meridiem::Am))
    } else if let Some(base) = token.strip_suffix("pm") {
        (base, Some(Meridiem::Pm))
    } else {
        (token, None)
    }
}

fn parse_named_range(
    anchor: &TimeAnchor,
    tokens: &[String],
) -> AssistantResult<Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)>> {
    let today = anchor.today();
    for (i, token) in tokens.iter().enumerate() {
        let prev = i.checked_sub(1).map(|p| tokens[p].as_str());
        match token.as_str() {
            "week" => {
                let start = if matches!(prev, Some("next")) {
                    let to_monday = 7 - anchor.weekday.num_days_from_monday() as i64;
                    today + Duration::days(to_monday)
                } else {
                    today
                };
                let from = at_local(anchor, start, NaiveTime::MIN)?;
                return Ok(Some((from, from + Duration::days(7))));
            }
            "weekend" => {
                let delta = days_until(anchor, Weekday::Sat, false);
                let from = at_local(anchor, today + Duration::days(delta), NaiveTime::MIN)?;
                return Ok(Some((from, from + Duration::days(2))));
            }
            "month" if matches!(prev, Some("this") | Some("next")) => {
                let first = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
                    .unwrap_or(today);
                let start = if matches!(prev, Some("next")) {
                    first
                        .checked_add_months(Months::new(1))
                        .unwrap_or(first)
                } else {
                    first
                };
                let end = start.checked_add_months(Months::new(1)).unwrap_or(start);
                return Ok(Some((
                    at_local(anchor, start, NaiveTime::MIN)?,
                    at_local(anchor, end, NaiveTime::MIN)?,
                )));
            }
            _ => {}
        }
    }
    Ok(None)
}
