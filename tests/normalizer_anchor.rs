#![allow(non_snake_case)]

use chrono::{Duration, NaiveDate, Timelike};

use calenBot::context::TimeAnchor;
use calenBot::error::AssistantError;
use calenBot::service::normalizer::{normalize_range, normalize_start};

// Tuesday March 10th 2026, 09:00 in UTC+1. March has 31 days.
fn march_anchor() -> TimeAnchor {
    TimeAnchor::resolve("2026-03-10T09:00:00+01:00", "Tuesday", 31).unwrap()
}

// Wednesday June 10th 2026. June has 30 days.
fn june_anchor() -> TimeAnchor {
    TimeAnchor::resolve("2026-06-10T09:00:00+02:00", "Wednesday", 30).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn tomorrow_without_a_time_defaults_to_midday() {
    let normalized = normalize_start(&march_anchor(), "tomorrow").unwrap();
    assert_eq!(normalized.start.date_naive(), date(2026, 3, 11));
    assert_eq!(normalized.start.hour(), 12);
    assert!(normalized.time_inferred);
}

#[test]
fn explicit_time_is_not_inferred() {
    let normalized = normalize_start(&march_anchor(), "tomorrow at 3pm").unwrap();
    assert_eq!(normalized.start.hour(), 15);
    assert!(!normalized.time_inferred);
}

#[test]
fn bare_weekday_is_the_next_occurrence() {
    // Anchor is a Tuesday; thursday is two days out.
    let normalized = normalize_start(&march_anchor(), "thursday").unwrap();
    assert_eq!(normalized.start.date_naive(), date(2026, 3, 12));
}

#[test]
fn next_weekday_on_that_weekday_is_a_week_out() {
    let normalized = normalize_start(&march_anchor(), "next tuesday").unwrap();
    assert_eq!(normalized.start.date_naive(), date(2026, 3, 17));
}

#[test]
fn part_of_day_words_set_the_default_time() {
    let normalized = normalize_start(&march_anchor(), "tomorrow evening").unwrap();
    assert_eq!(normalized.start.hour(), 19);
    assert!(normalized.time_inferred);

    let normalized = normalize_start(&march_anchor(), "tonight").unwrap();
    assert_eq!(normalized.start.date_naive(), date(2026, 3, 10));
    assert_eq!(normalized.start.hour(), 20);
}

#[test]
fn a_bare_time_already_past_is_ambiguous_not_rolled_forward() {
    // Anchor is 09:00.
    let err = normalize_start(&march_anchor(), "at 8am").unwrap_err();
    assert!(matches!(err, AssistantError::AmbiguousDate(_)));
}

#[test]
fn a_bare_time_still_ahead_lands_today() {
    let normalized = normalize_start(&march_anchor(), "at 10am").unwrap();
    assert_eq!(normalized.start.date_naive(), date(2026, 3, 10));
    assert_eq!(normalized.start.hour(), 10);
}

#[test]
fn small_bare_hours_read_as_afternoon() {
    let normalized = normalize_start(&march_anchor(), "tomorrow at 3").unwrap();
    assert_eq!(normalized.start.hour(), 15);
}

#[test]
fn day_of_month_beyond_the_month_length_is_rejected() {
    assert!(normalize_start(&march_anchor(), "the 31st").is_ok());
    let err = normalize_start(&june_anchor(), "the 31st").unwrap_err();
    assert!(matches!(err, AssistantError::UnresolvableDateTime(_)));
}

#[test]
fn day_of_month_already_past_is_ambiguous() {
    let err = normalize_start(&march_anchor(), "the 5th").unwrap_err();
    assert!(matches!(err, AssistantError::AmbiguousDate(_)));
}

#[test]
fn month_and_day_without_a_year_take_the_next_occurrence() {
    let normalized = normalize_start(&march_anchor(), "june 1 at noon").unwrap();
    assert_eq!(normalized.start.date_naive(), date(2026, 6, 1));

    // January has already passed, so it rolls into next year.
    let normalized = normalize_start(&march_anchor(), "january 5th").unwrap();
    assert_eq!(normalized.start.date_naive(), date(2027, 1, 5));
}

#[test]
fn gibberish_does_not_resolve() {
    let err = normalize_start(&march_anchor(), "whenever works").unwrap_err();
    assert!(matches!(err, AssistantError::UnresolvableDateTime(_)));
}

#[test]
fn default_query_range_is_the_next_seven_days() {
    let anchor = march_anchor();
    let (from, to) = normalize_range(&anchor, None).unwrap();
    assert_eq!(from, anchor.now);
    assert_eq!(to, anchor.now + Duration::days(7));
}

#[test]
fn a_day_phrase_becomes_a_whole_day_window() {
    let (from, to) = normalize_range(&march_anchor(), Some("tomorrow")).unwrap();
    assert_eq!(from.date_naive(), date(2026, 3, 11));
    assert_eq!(from.hour(), 0);
    assert_eq!(to.date_naive(), date(2026, 3, 12));
}

#[test]
fn next_week_starts_on_the_coming_monday() {
    let (from, to) = normalize_range(&march_anchor(), Some("next week")).unwrap();
    assert_eq!(from.date_naive(), date(2026, 3, 16));
    assert_eq!(to.date_naive(), date(2026, 3, 23));
}
