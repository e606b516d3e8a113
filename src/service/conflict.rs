use chrono::{DateTime, Duration, FixedOffset};

use crate::models::event::Event;

/// Events whose occupancy window overlaps a proposed [start, start+duration)
/// window, sorted by start time.
///
/// Windows are half-open, so back-to-back events do not collide. A window
/// with no duration is a point: it conflicts with any window containing
/// that instant, and two points conflict only when they are the same
/// instant.
pub fn find_conflicts(
    existing: &[Event],
    start: DateTime<FixedOffset>,
    duration: Option<i64>,
) -> Vec<Event> {
    let end = start + Duration::minutes(duration.unwrap_or(0));
    let mut hits: Vec<Event> = existing
        .iter()
        .filter(|event| {
            let (s, e) = event.window();
            windows_overlap(start, end, s, e)
        })
        .cloned()
        .collect();
    hits.sort_by_key(|event| event.start_date);
    hits
}

fn windows_overlap(
    a_start: DateTime<FixedOffset>,
    a_end: DateTime<FixedOffset>,
    b_start: DateTime<FixedOffset>,
    b_end: DateTime<FixedOffset>,
) -> bool {
    let a_point = a_start == a_end;
    let b_point = b_start == b_end;
    match (a_point, b_point) {
        (true, true) => a_start == b_start,
        (true, false) => b_start <= a_start && a_start < b_end,
        (false, true) => a_start <= b_start && b_start < a_end,
        (false, false) => a_start < b_end && b_start < a_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 10, hour, min, 0)
            .unwrap()
    }

    fn event(title: &str, start: DateTime<FixedOffset>, duration: Option<i64>) -> Event {
        Event {
            id: title.to_string(),
            title: title.to_string(),
            start_date: start,
            duration,
            location: None,
            owner_id: "u1".to_string(),
        }
    }

    #[test]
    fn back_to_back_is_not_a_conflict() {
        let existing = vec![event("standup", at(9, 0), Some(30))];
        assert!(find_conflicts(&existing, at(9, 30), Some(60)).is_empty());
    }

    #[test]
    fn partial_overlap_is_a_conflict() {
        let existing = vec![event("standup", at(9, 0), Some(45))];
        let hits = find_conflicts(&existing, at(9, 30), Some(60));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "standup");
    }

    #[test]
    fn point_inside_a_window_conflicts() {
        let existing = vec![event("review", at(14, 0), Some(60))];
        assert_eq!(find_conflicts(&existing, at(14, 30), None).len(), 1);
        // A point at the half-open end does not.
        assert!(find_conflicts(&existing, at(15, 0), None).is_empty());
    }

    #[test]
    fn two_points_conflict_only_when_equal() {
        let existing = vec![event("ping", at(11, 0), None)];
        assert_eq!(find_conflicts(&existing, at(11, 0), None).len(), 1);
        assert!(find_conflicts(&existing, at(11, 1), None).is_empty());
    }

    #[test]
    fn hits_come_back_sorted_by_start() {
        let existing = vec![
            event("later", at(10, 30), Some(30)),
            event("earlier", at(10, 0), Some(30)),
        ];
        let hits = find_conflicts(&existing, at(10, 0), Some(60));
        assert_eq!(hits[0].title, "earlier");
        assert_eq!(hits[1].title, "later");
    }
}
