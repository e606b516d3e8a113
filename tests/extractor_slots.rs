#![allow(non_snake_case)]

use async_trait::async_trait;
use std::sync::Arc;

use calenBot::context::TimeAnchor;
use calenBot::error::AssistantError;
use calenBot::service::extractor::{
    extract_command, CommandExtractor, OpenAiExtractor, RuleExtractor,
};
use calenBot::service::openai_service::LlmClient;
use calenBot::service::routing::Intent;

fn anchor() -> TimeAnchor {
    TimeAnchor::resolve("2026-03-10T09:00:00+01:00", "Tuesday", 31).unwrap()
}

#[test]
fn create_slots_are_carved_out_of_the_sentence() {
    let parsed = extract_command("Schedule lunch with John tomorrow at noon").unwrap();
    assert_eq!(parsed.action, Intent::Create);
    assert_eq!(parsed.candidates.len(), 1);
    let candidate = &parsed.candidates[0];
    assert_eq!(candidate.title.as_deref(), Some("lunch with John"));
    let temporal = candidate.temporal.as_deref().unwrap();
    assert!(temporal.contains("tomorrow"));
    assert!(temporal.contains("noon"));
}

#[test]
fn stacked_politeness_never_leaks_into_the_title() {
    let parsed = extract_command("can you please add lunch tomorrow at noon").unwrap();
    assert_eq!(parsed.candidates[0].title.as_deref(), Some("lunch"));

    let parsed = extract_command("hey, could you please schedule standup tomorrow at 9am").unwrap();
    assert_eq!(parsed.candidates[0].title.as_deref(), Some("standup"));
}

#[test]
fn duration_phrase_becomes_minutes() {
    let parsed = extract_command("book a design review tomorrow at 3pm for 45 minutes").unwrap();
    assert_eq!(parsed.candidates[0].duration_minutes, Some(45));
    assert_eq!(parsed.candidates[0].title.as_deref(), Some("design review"));

    let parsed = extract_command("book a workshop tomorrow at 9am for two hours").unwrap();
    assert_eq!(parsed.candidates[0].duration_minutes, Some(120));
}

#[test]
fn location_comes_from_the_remaining_at_phrase() {
    let parsed = extract_command("add dinner tomorrow at 7pm at Luigi's").unwrap();
    let candidate = &parsed.candidates[0];
    assert_eq!(candidate.title.as_deref(), Some("dinner"));
    assert_eq!(candidate.location.as_deref(), Some("Luigi's"));
    assert!(candidate.temporal.as_deref().unwrap().contains("7pm"));
}

#[test]
fn batch_create_splits_only_between_timed_segments() {
    let parsed =
        extract_command("add standup tomorrow at 9am and lunch on friday at noon").unwrap();
    assert_eq!(parsed.candidates.len(), 2);
    assert_eq!(parsed.candidates[0].title.as_deref(), Some("standup"));
    assert_eq!(parsed.candidates[1].title.as_deref(), Some("lunch"));

    // "and" inside a single event stays one event.
    let parsed = extract_command("schedule lunch with Bob and Alice tomorrow").unwrap();
    assert_eq!(parsed.candidates.len(), 1);
}

#[test]
fn create_without_a_time_is_ambiguous() {
    let err = extract_command("schedule lunch with John").unwrap_err();
    assert!(matches!(err, AssistantError::ExtractionAmbiguous(_)));
}

#[test]
fn update_splits_target_from_change_at_the_right_to() {
    let parsed = extract_command("move my dentist appointment to friday at 3pm").unwrap();
    assert_eq!(parsed.action, Intent::Update);
    let target = parsed.target.unwrap();
    assert_eq!(target.title.as_deref(), Some("dentist appointment"));
    let change = &parsed.candidates[0];
    let temporal = change.temporal.as_deref().unwrap();
    assert!(temporal.contains("friday"));
    assert!(temporal.contains("3pm"));
}

#[test]
fn delete_keeps_both_title_and_temporal_in_the_target() {
    let parsed = extract_command("cancel my lunch with John tomorrow").unwrap();
    assert_eq!(parsed.action, Intent::Delete);
    let target = parsed.target.unwrap();
    assert_eq!(target.title.as_deref(), Some("lunch with John"));
    assert_eq!(target.temporal.as_deref(), Some("tomorrow"));
}

#[tokio::test]
async fn correction_note_overlays_the_original_slots() {
    let parsed = RuleExtractor
        .extract_correction(
            "add lunch with John tomorrow at noon",
            "make it 2pm",
            &anchor(),
        )
        .await
        .unwrap();
    let candidate = &parsed.candidates[0];
    assert_eq!(candidate.title.as_deref(), Some("lunch with John"));
    assert!(candidate.temporal.as_deref().unwrap().contains("2pm"));
}

struct CannedLlm {
    payload: String,
}

#[async_trait]
impl LlmClient for CannedLlm {
    async fn generate_prompt(
        &self,
        _prompt: &str,
        _prompt_type: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.payload.clone())
    }
}

struct FailingLlm;

#[async_trait]
impl LlmClient for FailingLlm {
    async fn generate_prompt(
        &self,
        _prompt: &str,
        _prompt_type: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        Err("boom".to_string().into())
    }
}

#[tokio::test]
async fn llm_payload_is_parsed_into_a_command() {
    let llm = CannedLlm {
        payload: r#"{"action":"create","candidates":[{"title":"team sync","temporal":"tomorrow at 10am","duration":30,"location":null}],"target":null}"#
            .to_string(),
    };
    let extractor = OpenAiExtractor::new(Arc::new(llm));
    let parsed = extractor.extract("whatever", &anchor()).await.unwrap();
    assert_eq!(parsed.action, Intent::Create);
    assert_eq!(parsed.candidates[0].title.as_deref(), Some("team sync"));
    assert_eq!(parsed.candidates[0].duration_minutes, Some(30));
}

#[tokio::test]
async fn llm_failure_falls_back_to_rules() {
    let extractor = OpenAiExtractor::new(Arc::new(FailingLlm));
    let parsed = extractor
        .extract("schedule lunch with John tomorrow", &anchor())
        .await
        .unwrap();
    assert_eq!(parsed.action, Intent::Create);
    assert_eq!(parsed.candidates[0].title.as_deref(), Some("lunch with John"));
}
