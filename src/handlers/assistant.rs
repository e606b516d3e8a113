use chrono::{Datelike, Utc};
use std::sync::Arc;
use strsim::jaro_winkler;

use crate::context::{days_in_month_of, TimeAnchor};
use crate::error::{AssistantError, AssistantResult};
use crate::handlers::action::{
    describe_start, draft_from_candidate, ActionEngine, ActionKind, ActionPayload, ActionStatus,
    EditRequest, EventDraft, PendingAction, UpdateDraft,
};
use crate::models::event::{validate_duration, Event, EventPatch};
use crate::models::response::{CommandResponse, ConfirmReply, ResponseKind};
use crate::service::event_service::EventStore;
use crate::service::extractor::{CommandExtractor, ParsedCommand, TargetRef};
use crate::service::normalizer;
use crate::service::routing::Intent;

/// Minimum router confidence before a mutating command is acted on instead
/// of clarified.
const MIN_CONFIDENCE: f32 = 0.5;

/// Fuzzy title match threshold for update/delete target lookup.
const TITLE_MATCH_THRESHOLD: f64 = 0.75;

/// What the confirm endpoint was asked to do with the pending proposal.
pub enum ConfirmCommand {
    Confirm,
    Cancel,
    Edit(EditRequest, Option<TimeAnchor>),
}

/// The conversational front door: free text in, a typed reply out. Owns
/// the full pipeline of extraction, normalization, conflict lookup and
/// proposal staging. Nothing here writes to the calendar; only an explicit
/// confirm does.
pub struct AssistantHandler {
    store: Arc<dyn EventStore>,
    extractor: Arc<dyn CommandExtractor>,
    engine: ActionEngine,
}

impl AssistantHandler {
    pub fn new(store: Arc<dyn EventStore>, extractor: Arc<dyn CommandExtractor>) -> Self {
        let engine = ActionEngine::new(Arc::clone(&store), Arc::clone(&extractor));
        Self {
            store,
            extractor,
            engine,
        }
    }

    pub fn engine(&self) -> &ActionEngine {
        &self.engine
    }

    /// Handle one free-text command. Every failure comes back as a
    /// conversational text reply; the pipeline never surfaces a raw error
    /// to the user.
    pub async fn process(&self, owner_id: &str, text: &str, anchor: &TimeAnchor) -> CommandResponse {
        let parsed = match self.extractor.extract(text, anchor).await {
            Ok(parsed) => parsed,
            Err(err) => return degraded_reply(err),
        };

        if parsed.action != Intent::None {
            // A new command always replaces whatever was waiting; nothing
            // is queued behind an unanswered proposal.
            if self.engine.cancel_pending(owner_id).await.is_some() {
                tracing::debug!(owner_id, "new command superseded a pending proposal");
            }
        }

        if parsed.confidence.unwrap_or(1.0) < MIN_CONFIDENCE
            && matches!(parsed.action, Intent::Create | Intent::Update | Intent::Delete)
        {
            return CommandResponse::text(
                "I'm not sure what you'd like me to do with your calendar. Could you say it as an add, move, or delete?",
            );
        }

        let result = match parsed.action {
            Intent::Query => self.handle_query(owner_id, &parsed, anchor).await,
            Intent::Create => self.handle_create(owner_id, text, &parsed, anchor).await,
            Intent::Delete => self.handle_delete(owner_id, text, &parsed, anchor).await,
            Intent::Update => self.handle_update(owner_id, text, &parsed, anchor).await,
            // Not a command: the text comes straight back as a plain reply.
            Intent::None => Ok(CommandResponse::text(text)),
        };

        result.unwrap_or_else(degraded_reply)
    }

    async fn handle_query(
        &self,
        owner_id: &str,
        parsed: &ParsedCommand,
        anchor: &TimeAnchor,
    ) -> AssistantResult<CommandResponse> {
        let temporal = parsed
            .candidates
            .first()
            .and_then(|c| c.temporal.as_deref());
        let range = normalizer::normalize_range(anchor, temporal)?;
        let events = self.store.list(owner_id, Some(range)).await?;
        let message = if events.is_empty() {
            "You have nothing scheduled then.".to_string()
        } else if events.len() == 1 {
            format!(
                "You have one event: \"{}\" on {}.",
                events[0].title,
                describe_start(events[0].start_date)
            )
        } else {
            format!("You have {} events coming up.", events.len())
        };
        Ok(CommandResponse::list(message, events))
    }

    async fn handle_create(
        &self,
        owner_id: &str,
        text: &str,
        parsed: &ParsedCommand,
        anchor: &TimeAnchor,
    ) -> AssistantResult<CommandResponse> {
        let mut drafts = Vec::with_capacity(parsed.candidates.len());
        for candidate in &parsed.candidates {
            let mut draft = draft_from_candidate(anchor, candidate)?;
            draft.conflicts = self
                .engine
                .conflicts_for(owner_id, draft.start_date, draft.duration, None)
                .await?;
            drafts.push(draft);
        }
        let action = self
            .engine
            .propose(owner_id, ActionKind::Create, ActionPayload::Create(drafts), text)
            .await;
        Ok(render_proposal(&action))
    }

    async fn handle_delete(
        &self,
        owner_id: &str,
        text: &str,
        parsed: &ParsedCommand,
        anchor: &TimeAnchor,
    ) -> AssistantResult<CommandResponse> {
        let target = parsed
            .target
            .clone()
            .ok_or_else(|| AssistantError::ExtractionAmbiguous("no target event".to_string()))?;
        let matches = self.find_targets(owner_id, &target, anchor).await?;
        if matches.is_empty() {
            return Ok(CommandResponse::text(not_found_message(&target)));
        }
        let action = self
            .engine
            .propose(
                owner_id,
                ActionKind::Delete,
                ActionPayload::Delete(matches),
                text,
            )
            .await;
        Ok(render_proposal(&action))
    }

    async fn handle_update(
        &self,
        owner_id: &str,
        text: &str,
        parsed: &ParsedCommand,
        anchor: &TimeAnchor,
    ) -> AssistantResult<CommandResponse> {
        let target = parsed
            .target
            .clone()
            .ok_or_else(|| AssistantError::ExtractionAmbiguous("no target event".to_string()))?;
        let change = parsed.candidates.first().cloned().unwrap_or_default();

        let mut patch = EventPatch::default();
        if let Some(temporal) = &change.temporal {
            patch.start_date = Some(normalizer::normalize_start(anchor, temporal)?.start);
        }
        if change.duration_minutes.is_some() {
            patch.duration = validate_duration(change.duration_minutes)?;
        }
        if let Some(location) = &change.location {
            patch.location = Some(location.clone());
        }
        // A title on the change side is a rename only when nothing else
        // changed; "to run for two hours" leaves a stray "run" residue.
        if change.temporal.is_none()
            && change.duration_minutes.is_none()
            && change.location.is_none()
        {
            if let Some(title) = &change.title {
                patch.title = Some(title.clone());
            }
        }
        if patch.is_empty() {
            return Err(AssistantError::ExtractionAmbiguous(
                "no change to apply".to_string(),
            ));
        }

        let matches = self.find_targets(owner_id, &target, anchor).await?;
        if matches.is_empty() {
            return Ok(CommandResponse::text(not_found_message(&target)));
        }

        let mut drafts = Vec::with_capacity(matches.len());
        for event in matches {
            let mut draft = UpdateDraft {
                target: event,
                patch: patch.clone(),
                conflicts: Vec::new(),
            };
            // Any timing change gets checked, including duration-only
            // ones, which widen the window without moving its start.
            if let Some((start, duration)) = draft.patched_window() {
                draft.conflicts = self
                    .engine
                    .conflicts_for(owner_id, start, duration, Some(&draft.target.id))
                    .await?;
            }
            drafts.push(draft);
        }
        let action = self
            .engine
            .propose(owner_id, ActionKind::Update, ActionPayload::Update(drafts), text)
            .await;
        Ok(render_proposal(&action))
    }

    /// Resolve a target reference to stored events. A temporal hint narrows
    /// the search to that window first, then titles are matched fuzzily.
    async fn find_targets(
        &self,
        owner_id: &str,
        target: &TargetRef,
        anchor: &TimeAnchor,
    ) -> AssistantResult<Vec<Event>> {
        let events = match &target.temporal {
            Some(temporal) => {
                let range = normalizer::normalize_range(anchor, Some(temporal))?;
                self.store.list(owner_id, Some(range)).await?
            }
            None => self.store.list(owner_id, None).await?,
        };
        Ok(match_titles(events, target.title.as_deref()))
    }

    /// Resolve the user's verdict on the pending proposal.
    pub async fn confirm(
        &self,
        owner_id: &str,
        command: ConfirmCommand,
    ) -> AssistantResult<ConfirmReply> {
        match command {
            ConfirmCommand::Confirm => {
                let outcome = self.engine.confirm(owner_id).await?;
                Ok(ConfirmReply::message(outcome.message))
            }
            ConfirmCommand::Cancel => {
                self.engine
                    .cancel_pending(owner_id)
                    .await
                    .ok_or(AssistantError::PendingActionExists)?;
                Ok(ConfirmReply::message("Okay, I won't do that."))
            }
            ConfirmCommand::Edit(request, anchor) => {
                if request.note.is_some() && anchor.is_none() {
                    return Err(AssistantError::InvalidContext(
                        "a correction note needs the current date and time context".to_string(),
                    ));
                }
                let anchor = anchor.unwrap_or_else(server_clock_anchor);
                let action = self.engine.edit(owner_id, request, &anchor).await?;
                if action.status == ActionStatus::Cancelled {
                    return Ok(ConfirmReply::message(
                        "That removed everything from the proposal, so there's nothing left to do.",
                    ));
                }
                Ok(ConfirmReply::Proposal(render_proposal(&action)))
            }
        }
    }
}

/// Every pipeline failure becomes a conversational reply. Clarification
/// asks are expected traffic; anything else gets a log line.
fn degraded_reply(err: AssistantError) -> CommandResponse {
    if !err.is_clarification() {
        tracing::warn!(error = %err, "command degraded to a text reply");
    }
    CommandResponse::text(err.user_message())
}

/// Remove/patch edits need no date math, so a missing client context falls
/// back to the server clock. Note edits always require the real anchor.
fn server_clock_anchor() -> TimeAnchor {
    let now = Utc::now().fixed_offset();
    TimeAnchor {
        weekday: now.weekday(),
        days_in_month: days_in_month_of(now.date_naive()),
        now,
    }
}

fn match_titles(events: Vec<Event>, title: Option<&str>) -> Vec<Event> {
    let Some(title) = title else {
        return events;
    };
    let wanted = title.to_lowercase();
    events
        .into_iter()
        .filter(|event| {
            let have = event.title.to_lowercase();
            have.contains(&wanted)
                || wanted.contains(&have)
                || jaro_winkler(&have, &wanted) >= TITLE_MATCH_THRESHOLD
        })
        .collect()
}

fn not_found_message(target: &TargetRef) -> String {
    match (&target.title, &target.temporal) {
        (Some(title), Some(temporal)) => {
            format!("I couldn't find an event like \"{title}\" {temporal}.")
        }
        (Some(title), None) => format!("I couldn't find an event like \"{title}\"."),
        (None, Some(temporal)) => format!("I couldn't find any event {temporal}."),
        (None, None) => "I couldn't find that event.".to_string(),
    }
}

fn describe_draft(draft: &EventDraft) -> String {
    let mut text = format!("\"{}\" on {}", draft.title, describe_start(draft.start_date));
    if let Some(minutes) = draft.duration {
        text.push_str(&format!(" for {minutes} minutes"));
    }
    if let Some(location) = &draft.location {
        text.push_str(&format!(" at {location}"));
    }
    if draft.time_inferred {
        text.push_str(" (I assumed midday since you didn't give a time)");
    }
    text
}

fn conflict_warning(conflicts: &[Event]) -> String {
    if conflicts.is_empty() {
        return String::new();
    }
    let listed: Vec<String> = conflicts
        .iter()
        .take(3)
        .map(|event| format!("\"{}\" on {}", event.title, describe_start(event.start_date)))
        .collect();
    format!(" Heads up: this overlaps with {}.", listed.join(", "))
}

fn describe_patch(patch: &EventPatch) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(title) = &patch.title {
        parts.push(format!("rename it to \"{title}\""));
    }
    if let Some(start) = patch.start_date {
        parts.push(format!("move it to {}", describe_start(start)));
    }
    if patch.clear_duration {
        parts.push("drop its duration".to_string());
    } else if let Some(minutes) = patch.duration {
        parts.push(format!("make it {minutes} minutes"));
    }
    if patch.clear_location {
        parts.push("drop its location".to_string());
    } else if let Some(location) = &patch.location {
        parts.push(format!("set the location to {location}"));
    }
    parts.join(" and ")
}

/// Render a staged proposal as the reply that asks for confirmation. Used
/// both when a proposal is first staged and when an edit re-surfaces it.
pub fn render_proposal(action: &PendingAction) -> CommandResponse {
    match &action.payload {
        ActionPayload::Create(drafts) => {
            if let [draft] = drafts.as_slice() {
                CommandResponse {
                    kind: ResponseKind::Create,
                    message: format!(
                        "Should I add {}?{}",
                        describe_draft(draft),
                        conflict_warning(&draft.conflicts)
                    ),
                    events: None,
                    event: Some(draft.as_create()),
                    update_arguments: None,
                }
            } else {
                let listed: Vec<String> = drafts
                    .iter()
                    .enumerate()
                    .map(|(i, draft)| {
                        format!(
                            "{}) {}{}",
                            i + 1,
                            describe_draft(draft),
                            conflict_warning(&draft.conflicts)
                        )
                    })
                    .collect();
                CommandResponse {
                    kind: ResponseKind::Create,
                    message: format!(
                        "Should I add these {} events? {} Confirm to add all of them.",
                        drafts.len(),
                        listed.join(" ")
                    ),
                    events: None,
                    event: None,
                    update_arguments: None,
                }
            }
        }
        ActionPayload::Update(drafts) => {
            let patch = drafts.first().map(|d| d.patch.clone()).unwrap_or_default();
            let message = if let [draft] = drafts.as_slice() {
                format!(
                    "Should I {} for \"{}\"?{}",
                    describe_patch(&draft.patch),
                    draft.target.title,
                    conflict_warning(&draft.conflicts)
                )
            } else {
                let listed: Vec<String> = drafts
                    .iter()
                    .enumerate()
                    .map(|(i, draft)| {
                        format!(
                            "{}) \"{}\" on {}",
                            i + 1,
                            draft.target.title,
                            describe_start(draft.target.start_date)
                        )
                    })
                    .collect();
                format!(
                    "I found {} matching events: {} Should I {} for all of them? You can also tell me which one.",
                    drafts.len(),
                    listed.join(" "),
                    describe_patch(&patch)
                )
            };
            CommandResponse {
                kind: ResponseKind::Update,
                message,
                events: Some(drafts.iter().map(|d| d.target.clone()).collect()),
                event: None,
                update_arguments: serde_json::to_value(&patch).ok(),
            }
        }
        ActionPayload::Delete(events) => {
            let message = if let [event] = events.as_slice() {
                format!(
                    "Should I delete \"{}\" on {}?",
                    event.title,
                    describe_start(event.start_date)
                )
            } else {
                let listed: Vec<String> = events
                    .iter()
                    .enumerate()
                    .map(|(i, event)| {
                        format!(
                            "{}) \"{}\" on {}",
                            i + 1,
                            event.title,
                            describe_start(event.start_date)
                        )
                    })
                    .collect();
                format!(
                    "I found {} matching events: {} Confirm to delete all of them, or tell me which one.",
                    events.len(),
                    listed.join(" ")
                )
            };
            CommandResponse {
                kind: ResponseKind::Delete,
                message,
                events: Some(events.clone()),
                event: None,
                update_arguments: None,
            }
        }
    }
}
