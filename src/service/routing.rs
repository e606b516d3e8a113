/// The action a user utterance asks for. `None` means the message is not a
/// calendar command and gets a plain conversational reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Create,
    Update,
    Delete,
    Query,
    None,
}

#[derive(Debug, Clone)]
pub struct IntentResult {
    pub intent: Intent,
    pub normalized_text: String,
    /// 1.0 for an explicit verb match, lower for implicit phrasing.
    pub confidence: f32,
}

const QUERY_PHRASES: [&str; 9] = [
    "what's on",
    "whats on",
    "what is on",
    "what do i have",
    "do i have anything",
    "show me",
    "list my",
    "what's happening",
    "my schedule",
];

const CREATE_VERBS: [&str; 7] = ["add", "schedule", "create", "book", "plan", "set", "put"];
const DELETE_VERBS: [&str; 5] = ["delete", "cancel", "remove", "clear", "scrap"];
const UPDATE_VERBS: [&str; 6] = ["change", "move", "reschedule", "update", "shift", "push"];
const QUERY_VERBS: [&str; 2] = ["show", "list"];

pub fn route_intent(text: &str) -> IntentResult {
    let normalized = text.trim().to_string();
    if normalized.is_empty() {
        return IntentResult {
            intent: Intent::None,
            normalized_text: normalized,
            confidence: 1.0,
        };
    }

    let lower = normalized.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();

    let has_word = |verbs: &[&str]| words.iter().any(|w| verbs.contains(w));

    if QUERY_PHRASES.iter().any(|p| lower.contains(p)) || has_word(&QUERY_VERBS) {
        return result(Intent::Query, normalized, 1.0);
    }
    if has_word(&DELETE_VERBS) {
        return result(Intent::Delete, normalized, 1.0);
    }
    if has_word(&UPDATE_VERBS) {
        return result(Intent::Update, normalized, 1.0);
    }
    if has_word(&CREATE_VERBS) {
        return result(Intent::Create, normalized, 1.0);
    }

    // A future plan with a time expression is an implicit create, the way
    // people actually talk to a calendar ("lunch with John tomorrow").
    if has_time_tokens(&lower) {
        return result(Intent::Create, normalized, 0.6);
    }

    result(Intent::None, normalized, 1.0)
}

fn result(intent: Intent, normalized_text: String, confidence: f32) -> IntentResult {
    IntentResult {
        intent,
        normalized_text,
        confidence,
    }
}

pub fn has_time_tokens(lower: &str) -> bool {
    let tokens = [
        "today",
        "tomorrow",
        "tonight",
        "morning",
        "afternoon",
        "evening",
        "next ",
        "noon",
        "midnight",
    ];
    if tokens.iter().any(|t| lower.contains(t)) {
        return true;
    }

    let weekdays = [
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
    ];
    if weekdays.iter().any(|d| lower.contains(d)) {
        return true;
    }

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
    if months.iter().any(|m| lower.contains(m)) {
        return true;
    }

    if lower.contains('/') || lower.contains(':') {
        return lower.chars().any(|c| c.is_ascii_digit());
    }

    has_am_pm(lower)
}

fn has_am_pm(lower: &str) -> bool {
    let bytes = lower.as_bytes();
    for i in 0..bytes.len().saturating_sub(1) {
        let first = bytes[i];
        let second = bytes[i + 1];
        if (first == b'a' || first == b'p') && second == b'm' {
            let before = if i == 0 { None } else { Some(bytes[i - 1]) };
            let after = if i + 2 >= bytes.len() {
                None
            } else {
                Some(bytes[i + 2])
            };
            let boundary_before = before.map_or(true, |b| !b.is_ascii_alphabetic());
            let boundary_after = after.map_or(true, |b| !b.is_ascii_alphabetic());
            if boundary_before && boundary_after {
                return true;
            }
        }
    }
    false
}
