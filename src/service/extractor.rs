use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::context::TimeAnchor;
use crate::error::{AssistantError, AssistantResult};
use crate::openai_client::anchor_block;
use crate::service::openai_service::LlmClient;
use crate::service::routing::{has_time_tokens, route_intent, Intent};

/// Raw, not yet normalized, event fields carved out of one utterance
/// segment. Temporal and duration stay as the user's own words so the
/// normalizer owns all date math.
#[derive(Debug, Clone, Default)]
pub struct RawCandidate {
    pub title: Option<String>,
    pub temporal: Option<String>,
    pub duration_minutes: Option<i64>,
    pub location: Option<String>,
}

/// Reference to existing event(s) for update/delete: title words plus any
/// date words that narrow the search.
#[derive(Debug, Clone, Default)]
pub struct TargetRef {
    pub title: Option<String>,
    pub temporal: Option<String>,
}

/// One utterance, classified and sliced. Ephemeral; lives for a single
/// request. Candidates always has length >= 1 so single and batch flow
/// through the same code.
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    pub action: Intent,
    pub candidates: Vec<RawCandidate>,
    pub target: Option<TargetRef>,
    pub confidence: Option<f32>,
}

#[async_trait]
pub trait CommandExtractor: Send + Sync {
    async fn extract(&self, text: &str, anchor: &TimeAnchor) -> AssistantResult<ParsedCommand>;

    /// Re-extract after a user correction note. The note fixes details of
    /// the original request; it never becomes event content.
    async fn extract_correction(
        &self,
        original_text: &str,
        note: &str,
        anchor: &TimeAnchor,
    ) -> AssistantResult<ParsedCommand>;
}

pub struct RuleExtractor;

#[async_trait]
impl CommandExtractor for RuleExtractor {
    async fn extract(&self, text: &str, _anchor: &TimeAnchor) -> AssistantResult<ParsedCommand> {
        extract_command(text)
    }

    async fn extract_correction(
        &self,
        original_text: &str,
        note: &str,
        _anchor: &TimeAnchor,
    ) -> AssistantResult<ParsedCommand> {
        let mut parsed = extract_command(original_text)?;
        let overlay = scan_slots(note);
        if let Some(first) = parsed.candidates.first_mut() {
            if overlay.temporal.is_some() {
                first.temporal = overlay.temporal;
            }
            if overlay.duration_minutes.is_some() {
                first.duration_minutes = overlay.duration_minutes;
            }
            if overlay.location.is_some() {
                first.location = overlay.location;
            }
        }
        Ok(parsed)
    }
}

pub fn extract_command(text: &str) -> AssistantResult<ParsedCommand> {
    let routed = route_intent(text);
    let body = strip_command_words(&routed.normalized_text);

    match routed.intent {
        Intent::None => Ok(ParsedCommand {
            action: Intent::None,
            candidates: vec![RawCandidate::default()],
            target: None,
            confidence: Some(routed.confidence),
        }),
        Intent::Query => {
            let slots = scan_slots(&body);
            Ok(ParsedCommand {
                action: Intent::Query,
                candidates: vec![RawCandidate {
                    temporal: slots.temporal,
                    ..RawCandidate::default()
                }],
                target: None,
                confidence: Some(routed.confidence),
            })
        }
        Intent::Create => {
            let mut candidates = Vec::new();
            for segment in split_segments(&body) {
                let slots = scan_slots(&segment);
                if slots.title.is_none() {
                    return Err(AssistantError::ExtractionAmbiguous(
                        "no event title".to_string(),
                    ));
                }
                if slots.temporal.is_none() {
                    return Err(AssistantError::ExtractionAmbiguous(
                        "no time expression".to_string(),
                    ));
                }
                candidates.push(slots);
            }
            Ok(ParsedCommand {
                action: Intent::Create,
                candidates,
                target: None,
                confidence: Some(routed.confidence),
            })
        }
        Intent::Delete => {
            let slots = scan_slots(&body);
            if slots.title.is_none() && slots.temporal.is_none() {
                return Err(AssistantError::ExtractionAmbiguous(
                    "no target event reference".to_string(),
                ));
            }
            Ok(ParsedCommand {
                action: Intent::Delete,
                candidates: vec![slots.clone()],
                target: Some(TargetRef {
                    title: slots.title,
                    temporal: slots.temporal,
                }),
                confidence: Some(routed.confidence),
            })
        }
        Intent::Update => {
            let (target_text, change_text) = split_update(&body);
            let target_slots = scan_slots(&target_text);
            if target_slots.title.is_none() && target_slots.temporal.is_none() {
                return Err(AssistantError::ExtractionAmbiguous(
                    "no target event reference".to_string(),
                ));
            }
            let change_slots = match change_text {
                Some(change) => scan_slots(&change),
                None => RawCandidate::default(),
            };
            Ok(ParsedCommand {
                action: Intent::Update,
                candidates: vec![change_slots],
                target: Some(TargetRef {
                    title: target_slots.title,
                    temporal: target_slots.temporal,
                }),
                confidence: Some(routed.confidence),
            })
        }
    }
}

/// Leading politeness and the command verb carry no slot information.
fn strip_command_words(text: &str) -> String {
    let mut remainder = text.trim();
    // Politeness stacks ("can you please ..."), so strip until nothing
    // matches anymore.
    loop {
        let before = remainder;
        for prefix in [
            "hey",
            "please",
            "can you",
            "could you",
            "would you",
            "i want to",
            "i'd like to",
            "i need to",
        ] {
            if let Some(rest) = strip_prefix_ci(remainder, prefix) {
                remainder = rest.trim_start_matches([',', ' ']);
            }
        }
        if remainder == before {
            break;
        }
    }
    let verbs = [
        "add",
        "schedule",
        "create",
        "book",
        "plan",
        "set up",
        "set",
        "put",
        "delete",
        "cancel",
        "remove",
        "clear",
        "scrap",
        "change",
        "move",
        "reschedule",
        "update",
        "shift",
        "push",
        "show me",
        "show",
        "list my",
        "list",
    ];
    for verb in verbs {
        if let Some(rest) = strip_prefix_ci(remainder, verb) {
            remainder = rest.trim_start();
            break;
        }
    }
    remainder.to_string()
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if text.len() >= prefix.len() && text[..prefix.len()].eq_ignore_ascii_case(prefix) {
        let rest = &text[prefix.len()..];
        if rest.is_empty() || rest.starts_with([' ', ',']) {
            return Some(rest);
        }
    }
    None
}

/// Split one utterance into per-event segments. A split happens only where
/// both sides carry their own time expression, so "lunch with Bob and
/// Alice tomorrow" stays one event.
fn split_segments(text: &str) -> Vec<String> {
    let mut segments: Vec<String> = Vec::new();
    let mut current = String::new();
    for piece in text.split([';', ',']).flat_map(|p| p.split(" and ")) {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        if current.is_empty() {
            current = piece.to_string();
        } else if has_time_tokens(&current.to_lowercase()) && has_time_tokens(&piece.to_lowercase())
        {
            segments.push(current);
            current = piece.to_string();
        } else {
            current.push_str(" and ");
            current.push_str(piece);
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    if segments.is_empty() {
        segments.push(String::new());
    }
    segments
}

/// "move my dentist appointment to friday at 3" splits at the "to" that
/// introduces the new value.
fn split_update(text: &str) -> (String, Option<String>) {
    let lower = text.to_lowercase();
    let mut best: Option<usize> = None;
    let mut from = 0;
    while let Some(pos) = lower[from..].find(" to ") {
        let at = from + pos;
        if has_time_tokens(&lower[at + 4..]) {
            best = Some(at);
            break;
        }
        if best.is_none() {
            best = Some(at);
        }
        from = at + 4;
    }
    match best {
        Some(at) if !text[at + 4..].trim().is_empty() => {
            (text[..at].to_string(), Some(text[at + 4..].to_string()))
        }
        _ => (text.to_string(), None),
    }
}

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

const MONTHS: [&str; 12] = [
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

const DAY_WORDS: [&str; 7] = [
    "today",
    "tomorrow",
    "tonight",
    "noon",
    "midnight",
    "week",
    "weekend",
];

const PART_OF_DAY: [&str; 3] = ["morning", "afternoon", "evening"];

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

fn is_ordinal(lower: &str) -> bool {
    let stripped = lower
        .trim_end_matches("st")
        .trim_end_matches("nd")
        .trim_end_matches("rd")
        .trim_end_matches("th");
    stripped != lower && !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit())
}

fn is_clock_token(lower: &str) -> bool {
    let base = lower
        .trim_end_matches("am")
        .trim_end_matches("pm")
        .trim_end_matches('.');
    if base.is_empty() {
        return false;
    }
    let mut parts = base.splitn(2, ':');
    let hour_ok = parts
        .next()
        .map(|h| !h.is_empty() && h.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false);
    let minute_ok = match parts.next() {
        Some(m) => m.len() == 2 && m.chars().all(|c| c.is_ascii_digit()),
        None => true,
    };
    hour_ok && minute_ok
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Keep,
    Temporal,
    Duration,
    LocationHead,
    Location,
}

/// Slot filling over one segment: carve out the temporal span, a duration
/// phrase, a location phrase, and leave the residue as the title.
pub fn scan_slots(segment: &str) -> RawCandidate {
    let originals: Vec<&str> = segment.split_whitespace().collect();
    let lowers: Vec<String> = originals
        .iter()
        .map(|w| w.trim_matches(|c: char| c == ',' || c == '.' || c == '!' || c == '?').to_lowercase())
        .collect();
    let n = originals.len();
    let mut marks = vec![Mark::Keep; n];
    let mut duration_minutes: Option<i64> = None;

    // Duration phrase: "for <n> minutes|hours", "for an hour".
    for i in 0..n {
        if lowers[i] != "for" || i + 2 > n {
            continue;
        }
        let (value, unit_idx) = match lowers.get(i + 1).and_then(|w| word_number(w)) {
            Some(v) => (v, i + 2),
            None => continue,
        };
        let Some(unit) = lowers.get(unit_idx) else {
            continue;
        };
        let minutes = match unit.as_str() {
            "minute" | "minutes" | "min" | "mins" => Some(value),
            "hour" | "hours" | "hr" | "hrs" => Some(value * 60),
            _ => None,
        };
        if let Some(minutes) = minutes {
            duration_minutes = Some(minutes);
            marks[i] = Mark::Duration;
            marks[i + 1] = Mark::Duration;
            marks[unit_idx] = Mark::Duration;
            break;
        }
    }

    // Temporal span.
    for i in 0..n {
        if marks[i] != Mark::Keep {
            continue;
        }
        let lower = lowers[i].as_str();
        let prev = i.checked_sub(1).map(|p| lowers[p].as_str());

        if DAY_WORDS.contains(&lower) || PART_OF_DAY.contains(&lower) {
            marks[i] = Mark::Temporal;
            if matches!(prev, Some("next") | Some("this") | Some("on") | Some("in")) {
                marks[i - 1] = Mark::Temporal;
            }
            continue;
        }
        if WEEKDAYS.contains(&lower) {
            marks[i] = Mark::Temporal;
            if matches!(prev, Some("next") | Some("this") | Some("on")) {
                marks[i - 1] = Mark::Temporal;
            }
            continue;
        }
        if MONTHS.contains(&lower) {
            marks[i] = Mark::Temporal;
            if matches!(prev, Some("on") | Some("of")) {
                marks[i - 1] = Mark::Temporal;
            }
            if let Some(next) = lowers.get(i + 1) {
                if is_ordinal(next) || next.chars().all(|c| c.is_ascii_digit()) && !next.is_empty()
                {
                    marks[i + 1] = Mark::Temporal;
                }
            }
            continue;
        }
        if is_ordinal(lower) {
            marks[i] = Mark::Temporal;
            if matches!(prev, Some("the")) {
                marks[i - 1] = Mark::Temporal;
                if i >= 2 && lowers[i - 2] == "on" {
                    marks[i - 2] = Mark::Temporal;
                }
            }
            continue;
        }
        // "in two weeks", "in 3 days"
        if lower == "in" && i + 2 < n {
            if word_number(&lowers[i + 1]).is_some() {
                let unit = lowers[i + 2].as_str();
                if matches!(unit, "day" | "days" | "week" | "weeks" | "month" | "months") {
                    marks[i] = Mark::Temporal;
                    marks[i + 1] = Mark::Temporal;
                    marks[i + 2] = Mark::Temporal;
                    continue;
                }
            }
        }
        // Clock times, with or without a leading "at".
        let has_meridiem_suffix = lower.ends_with("am") || lower.ends_with("pm");
        let followed_by_meridiem = lowers
            .get(i + 1)
            .map(|w| matches!(w.as_str(), "am" | "pm" | "o'clock" | "oclock"))
            .unwrap_or(false);
        if is_clock_token(lower)
            && (has_meridiem_suffix
                || followed_by_meridiem
                || lower.contains(':')
                || matches!(prev, Some("at") | Some("until") | Some("by")))
        {
            marks[i] = Mark::Temporal;
            if matches!(prev, Some("at") | Some("until") | Some("by")) {
                marks[i - 1] = Mark::Temporal;
            }
            if followed_by_meridiem {
                marks[i + 1] = Mark::Temporal;
            }
            continue;
        }
    }

    // Location: first "at"/"in" still unmarked whose next word is plain.
    for i in 0..n {
        if marks[i] != Mark::Keep || !matches!(lowers[i].as_str(), "at" | "in") {
            continue;
        }
        let Some(next_idx) = (i + 1..n).next() else {
            continue;
        };
        if next_idx >= n || marks[next_idx] != Mark::Keep {
            continue;
        }
        if word_number(&lowers[next_idx]).is_some() {
            continue;
        }
        marks[i] = Mark::LocationHead;
        for mark in marks.iter_mut().take(n).skip(next_idx) {
            if *mark == Mark::Keep {
                *mark = Mark::Location;
            } else {
                break;
            }
        }
        break;
    }

    let collect = |wanted: Mark| -> Vec<&str> {
        (0..n)
            .filter(|&i| marks[i] == wanted)
            .map(|i| originals[i].trim_matches(|c: char| c == ',' || c == '.'))
            .collect()
    };

    let temporal_words = collect(Mark::Temporal);
    let temporal = if temporal_words.is_empty() {
        None
    } else {
        Some(temporal_words.join(" ").to_lowercase())
    };

    let location_words: Vec<&str> = collect(Mark::Location)
        .into_iter()
        .skip_while(|w| matches!(w.to_lowercase().as_str(), "the" | "a" | "an"))
        .collect();
    let location = if location_words.is_empty() {
        None
    } else {
        Some(location_words.join(" "))
    };

    let mut title_words: Vec<&str> = collect(Mark::Keep);
    while let Some(first) = title_words.first() {
        if matches!(first.to_lowercase().as_str(), "a" | "an" | "the" | "my") {
            title_words.remove(0);
        } else {
            break;
        }
    }
    while let Some(last) = title_words.last() {
        if matches!(
            last.to_lowercase().as_str(),
            "on" | "at" | "in" | "for" | "to" | "from" | "and"
        ) {
            title_words.pop();
        } else {
            break;
        }
    }
    let title = if title_words.is_empty() {
        None
    } else {
        Some(title_words.join(" "))
    };

    RawCandidate {
        title,
        temporal,
        duration_minutes,
        location,
    }
}

pub struct OpenAiExtractor {
    llm: Arc<dyn LlmClient>,
    fallback: RuleExtractor,
}

impl OpenAiExtractor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            fallback: RuleExtractor,
        }
    }

    async fn run(
        &self,
        prompt: &str,
        prompt_type: &str,
        anchor: &TimeAnchor,
    ) -> Option<ParsedCommand> {
        let full = format!(
            "{}{}",
            anchor_block(
                &anchor.now.to_rfc3339(),
                &anchor.weekday.to_string(),
                anchor.days_in_month
            ),
            prompt
        );
        match self.llm.generate_prompt(&full, prompt_type).await {
            Ok(payload) => parse_llm_payload(&payload),
            Err(err) => {
                tracing::warn!(error = %err, "extractor LLM call failed, using rule extractor");
                None
            }
        }
    }
}

#[async_trait]
impl CommandExtractor for OpenAiExtractor {
    async fn extract(&self, text: &str, anchor: &TimeAnchor) -> AssistantResult<ParsedCommand> {
        let prompt = format!("User message: \"{}\"", text.trim());
        match self.run(&prompt, "extract", anchor).await {
            Some(parsed) => Ok(parsed),
            None => self.fallback.extract(text, anchor).await,
        }
    }

    async fn extract_correction(
        &self,
        original_text: &str,
        note: &str,
        anchor: &TimeAnchor,
    ) -> AssistantResult<ParsedCommand> {
        let prompt = format!(
            "Original request: \"{original}\"\nCorrection note: \"{note}\"",
            original = original_text.trim(),
            note = note.trim()
        );
        match self.run(&prompt, "extract_correction", anchor).await {
            Some(parsed) => Ok(parsed),
            None => {
                self.fallback
                    .extract_correction(original_text, note, anchor)
                    .await
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct LlmCandidate {
    title: Option<String>,
    temporal: Option<String>,
    duration: Option<i64>,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LlmTarget {
    title: Option<String>,
    temporal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LlmPayload {
    action: String,
    candidates: Vec<LlmCandidate>,
    target: Option<LlmTarget>,
}

fn parse_llm_payload(payload: &str) -> Option<ParsedCommand> {
    let parsed: LlmPayload = serde_json::from_str(payload).ok()?;
    let action = match parsed.action.as_str() {
        "create" => Intent::Create,
        "update" => Intent::Update,
        "delete" => Intent::Delete,
        "query" => Intent::Query,
        "none" => Intent::None,
        _ => return None,
    };
    let mut candidates: Vec<RawCandidate> = parsed
        .candidates
        .into_iter()
        .map(|c| RawCandidate {
            title: c.title.filter(|t| !t.trim().is_empty()),
            temporal: c.temporal.filter(|t| !t.trim().is_empty()),
            duration_minutes: c.duration,
            location: c.location.filter(|l| !l.trim().is_empty()),
        })
        .collect();
    if candidates.is_empty() {
        candidates.push(RawCandidate::default());
    }
    Some(ParsedCommand {
        action,
        candidates,
        target: parsed.target.map(|t| TargetRef {
            title: t.title,
            temporal: t.temporal,
        }),
        confidence: None,
    })
}
