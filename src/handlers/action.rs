use chrono::{DateTime, FixedOffset, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::context::TimeAnchor;
use crate::error::{validation_error, AssistantError, AssistantResult};
use crate::models::event::{
    validate_duration, validate_title, Event, EventCreate, EventPatch,
};
use crate::service::conflict::find_conflicts;
use crate::service::event_service::EventStore;
use crate::service::extractor::{CommandExtractor, RawCandidate};
use crate::service::normalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Create => write!(f, "create"),
            ActionKind::Update => write!(f, "update"),
            ActionKind::Delete => write!(f, "delete"),
        }
    }
}

/// Lifecycle of a pending action. Proposed and Editing are the only live
/// states; Confirmed and Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Proposed,
    Editing,
    Confirmed,
    Cancelled,
}

/// A normalized event waiting for the user's yes. Conflicts are captured at
/// proposal time and re-checked at commit.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub title: String,
    pub start_date: DateTime<FixedOffset>,
    pub duration: Option<i64>,
    pub location: Option<String>,
    pub time_inferred: bool,
    pub conflicts: Vec<Event>,
}

impl EventDraft {
    pub fn as_create(&self) -> EventCreate {
        EventCreate {
            title: self.title.clone(),
            start_date: self.start_date,
            duration: self.duration,
            location: self.location.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateDraft {
    pub target: Event,
    pub patch: EventPatch,
    pub conflicts: Vec<Event>,
}

impl UpdateDraft {
    /// Occupancy window the patched event would have. `None` when the
    /// patch does not touch timing at all; a duration-only change still
    /// produces a window, anchored at the target's existing start.
    pub fn patched_window(&self) -> Option<(DateTime<FixedOffset>, Option<i64>)> {
        if self.patch.start_date.is_none()
            && self.patch.duration.is_none()
            && !self.patch.clear_duration
        {
            return None;
        }
        let start = self.patch.start_date.unwrap_or(self.target.start_date);
        let duration = if self.patch.clear_duration {
            None
        } else {
            self.patch.duration.or(self.target.duration)
        };
        Some((start, duration))
    }
}

#[derive(Debug, Clone)]
pub enum ActionPayload {
    Create(Vec<EventDraft>),
    Update(Vec<UpdateDraft>),
    Delete(Vec<Event>),
}

impl ActionPayload {
    pub fn len(&self) -> usize {
        match self {
            ActionPayload::Create(items) => items.len(),
            ActionPayload::Update(items) => items.len(),
            ActionPayload::Delete(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// At most one of these exists per session. A new command replaces it
/// wholesale; nothing is ever queued behind it.
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub id: String,
    pub kind: ActionKind,
    pub status: ActionStatus,
    pub owner_id: String,
    pub payload: ActionPayload,
    pub original_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One edit gesture against the pending proposal: drop an item, patch its
/// fields directly, or hand over a free-text correction note.
#[derive(Debug, Clone, Default)]
pub struct EditRequest {
    pub index: Option<usize>,
    pub remove: bool,
    pub patch: Option<EventPatch>,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub label: String,
    pub ok: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub kind: ActionKind,
    pub outcomes: Vec<ItemOutcome>,
    pub late_conflicts: bool,
    pub message: String,
}

/// Turn a raw extracted candidate into a validated, anchored draft.
/// Conflicts are filled in separately, against the owner's calendar.
pub fn draft_from_candidate(
    anchor: &TimeAnchor,
    candidate: &RawCandidate,
) -> AssistantResult<EventDraft> {
    let title = candidate
        .title
        .as_deref()
        .ok_or_else(|| AssistantError::ExtractionAmbiguous("no event title".to_string()))?;
    let temporal = candidate
        .temporal
        .as_deref()
        .ok_or_else(|| AssistantError::ExtractionAmbiguous("no time expression".to_string()))?;
    let normalized = normalizer::normalize_start(anchor, temporal)?;
    Ok(EventDraft {
        title: validate_title(title)?,
        start_date: normalized.start,
        duration: validate_duration(candidate.duration_minutes)?,
        location: candidate.location.clone(),
        time_inferred: normalized.time_inferred,
        conflicts: Vec::new(),
    })
}

pub fn describe_start(start: DateTime<FixedOffset>) -> String {
    start.format("%A %B %-d at %H:%M").to_string()
}

/// Owns the session -> pending-action map and the commit path. Every
/// mutation of a session's proposal happens under the same lock, so a
/// confirm can never race an edit into a half-applied state.
pub struct ActionEngine {
    sessions: Mutex<HashMap<String, PendingAction>>,
    store: Arc<dyn EventStore>,
    extractor: Arc<dyn CommandExtractor>,
}

impl ActionEngine {
    pub fn new(store: Arc<dyn EventStore>, extractor: Arc<dyn CommandExtractor>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            store,
            extractor,
        }
    }

    /// Stage a new proposal, superseding whatever was pending before.
    pub async fn propose(
        &self,
        owner_id: &str,
        kind: ActionKind,
        payload: ActionPayload,
        original_text: &str,
    ) -> PendingAction {
        let now = Utc::now();
        let action = PendingAction {
            id: Uuid::new_v4().to_string(),
            kind,
            status: ActionStatus::Proposed,
            owner_id: owner_id.to_string(),
            payload,
            original_text: original_text.to_string(),
            created_at: now,
            updated_at: now,
        };
        let mut sessions = self.sessions.lock().await;
        if let Some(old) = sessions.insert(owner_id.to_string(), action.clone()) {
            tracing::debug!(action_id = %old.id, "superseded pending action");
        }
        action
    }

    pub async fn cancel_pending(&self, owner_id: &str) -> Option<PendingAction> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(owner_id).map(|mut action| {
            action.status = ActionStatus::Cancelled;
            action
        })
    }

    pub async fn pending(&self, owner_id: &str) -> Option<PendingAction> {
        self.sessions.lock().await.get(owner_id).cloned()
    }

    /// Commit the pending action. Items are dispatched one by one with no
    /// rollback; per-item failures are reported, not retried. The calendar
    /// is re-checked for conflicts that appeared after the proposal.
    pub async fn confirm(&self, owner_id: &str) -> AssistantResult<ConfirmOutcome> {
        let mut sessions = self.sessions.lock().await;
        let mut action = sessions
            .remove(owner_id)
            .ok_or(AssistantError::PendingActionExists)?;
        action.status = ActionStatus::Confirmed;

        let mut outcomes = Vec::new();
        let mut late_conflicts = false;

        match &action.payload {
            ActionPayload::Create(drafts) => {
                for draft in drafts {
                    let fresh = self
                        .conflicts_for(owner_id, draft.start_date, draft.duration, None)
                        .await
                        .unwrap_or_default();
                    let known: Vec<&str> =
                        draft.conflicts.iter().map(|e| e.id.as_str()).collect();
                    if fresh.iter().any(|e| !known.contains(&e.id.as_str())) {
                        late_conflicts = true;
                    }
                    match self.store.create(owner_id, draft.as_create()).await {
                        Ok(event) => outcomes.push(ItemOutcome {
                            label: format!(
                                "\"{}\" on {}",
                                event.title,
                                describe_start(event.start_date)
                            ),
                            ok: true,
                            detail: None,
                        }),
                        Err(err) => outcomes.push(ItemOutcome {
                            label: format!("\"{}\"", draft.title),
                            ok: false,
                            detail: Some(err.user_message()),
                        }),
                    }
                }
            }
            ActionPayload::Update(drafts) => {
                for draft in drafts {
                    if let Some((start, duration)) = draft.patched_window() {
                        let fresh = self
                            .conflicts_for(owner_id, start, duration, Some(&draft.target.id))
                            .await
                            .unwrap_or_default();
                        let known: Vec<&str> =
                            draft.conflicts.iter().map(|e| e.id.as_str()).collect();
                        if fresh.iter().any(|e| !known.contains(&e.id.as_str())) {
                            late_conflicts = true;
                        }
                    }
                    match self
                        .store
                        .update(owner_id, &draft.target.id, &draft.patch)
                        .await
                    {
                        Ok(event) => outcomes.push(ItemOutcome {
                            label: format!(
                                "\"{}\" now on {}",
                                event.title,
                                describe_start(event.start_date)
                            ),
                            ok: true,
                            detail: None,
                        }),
                        Err(err) => outcomes.push(ItemOutcome {
                            label: format!("\"{}\"", draft.target.title),
                            ok: false,
                            detail: Some(err.user_message()),
                        }),
                    }
                }
            }
            ActionPayload::Delete(events) => {
                for event in events {
                    match self.store.delete(owner_id, &event.id).await {
                        Ok(deleted) => outcomes.push(ItemOutcome {
                            label: format!("\"{}\"", deleted.title),
                            ok: true,
                            detail: None,
                        }),
                        Err(err) => outcomes.push(ItemOutcome {
                            label: format!("\"{}\"", event.title),
                            ok: false,
                            detail: Some(err.user_message()),
                        }),
                    }
                }
            }
        }

        let message = summarize(action.kind, &outcomes, late_conflicts);
        Ok(ConfirmOutcome {
            kind: action.kind,
            outcomes,
            late_conflicts,
            message,
        })
    }

    /// Apply one edit gesture and re-surface the proposal. The returned
    /// action is Cancelled when the last item was removed, Proposed
    /// otherwise.
    pub async fn edit(
        &self,
        owner_id: &str,
        request: EditRequest,
        anchor: &TimeAnchor,
    ) -> AssistantResult<PendingAction> {
        let mut sessions = self.sessions.lock().await;
        let result = self
            .apply_edit(&mut sessions, owner_id, request, anchor)
            .await;
        // A rejected edit must not strand the action in Editing; the
        // untouched proposal stays confirmable.
        if result.is_err() {
            if let Some(entry) = sessions.get_mut(owner_id) {
                entry.status = ActionStatus::Proposed;
            }
        }
        result
    }

    async fn apply_edit(
        &self,
        sessions: &mut HashMap<String, PendingAction>,
        owner_id: &str,
        request: EditRequest,
        anchor: &TimeAnchor,
    ) -> AssistantResult<PendingAction> {
        let action = sessions
            .get_mut(owner_id)
            .ok_or(AssistantError::PendingActionExists)?;
        action.status = ActionStatus::Editing;

        let index = request.index.unwrap_or(0);
        if index >= action.payload.len() {
            return Err(validation_error("that item number is not in the proposal"));
        }

        if request.remove {
            match &mut action.payload {
                ActionPayload::Create(items) => {
                    items.remove(index);
                }
                ActionPayload::Update(items) => {
                    items.remove(index);
                }
                ActionPayload::Delete(items) => {
                    items.remove(index);
                }
            }
            if action.payload.is_empty() {
                let mut cancelled = sessions
                    .remove(owner_id)
                    .ok_or(AssistantError::PendingActionExists)?;
                cancelled.status = ActionStatus::Cancelled;
                return Ok(cancelled);
            }
        }

        if let Some(patch) = &request.patch {
            // Borrow of the map entry cannot live across the store await,
            // so the edit is staged on a clone and written back.
            let mut updated = action.clone();
            match &mut updated.payload {
                ActionPayload::Create(items) => {
                    let draft = &mut items[index];
                    if let Some(title) = &patch.title {
                        draft.title = validate_title(title)?;
                    }
                    if let Some(start) = patch.start_date {
                        draft.start_date = start;
                        draft.time_inferred = false;
                    }
                    if patch.clear_duration {
                        draft.duration = None;
                    } else if patch.duration.is_some() {
                        draft.duration = validate_duration(patch.duration)?;
                    }
                    if patch.clear_location {
                        draft.location = None;
                    } else if let Some(location) = &patch.location {
                        draft.location = Some(location.clone());
                    }
                    draft.conflicts = self
                        .conflicts_for(owner_id, draft.start_date, draft.duration, None)
                        .await?;
                }
                ActionPayload::Update(items) => {
                    let draft = &mut items[index];
                    merge_patch(&mut draft.patch, patch);
                    if let Some((start, duration)) = draft.patched_window() {
                        draft.conflicts = self
                            .conflicts_for(owner_id, start, duration, Some(&draft.target.id))
                            .await?;
                    }
                }
                ActionPayload::Delete(_) => {
                    return Err(validation_error(
                        "a delete proposal can only have items removed from it",
                    ));
                }
            }
            let entry = sessions
                .get_mut(owner_id)
                .ok_or(AssistantError::PendingActionExists)?;
            *entry = updated;
        }

        if let Some(note) = &request.note {
            let entry = sessions
                .get_mut(owner_id)
                .ok_or(AssistantError::PendingActionExists)?;
            if entry.kind != ActionKind::Create {
                return Err(validation_error(
                    "a correction note only applies to a create proposal",
                ));
            }
            let original_text = entry.original_text.clone();
            let parsed = self
                .extractor
                .extract_correction(&original_text, note, anchor)
                .await?;
            let mut drafts = Vec::with_capacity(parsed.candidates.len());
            for candidate in &parsed.candidates {
                let mut draft = draft_from_candidate(anchor, candidate)?;
                draft.conflicts = self
                    .conflicts_for(owner_id, draft.start_date, draft.duration, None)
                    .await?;
                drafts.push(draft);
            }
            let entry = sessions
                .get_mut(owner_id)
                .ok_or(AssistantError::PendingActionExists)?;
            entry.payload = ActionPayload::Create(drafts);
        }

        let entry = sessions
            .get_mut(owner_id)
            .ok_or(AssistantError::PendingActionExists)?;
        entry.status = ActionStatus::Proposed;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    pub async fn conflicts_for(
        &self,
        owner_id: &str,
        start: DateTime<FixedOffset>,
        duration: Option<i64>,
        exclude_id: Option<&str>,
    ) -> AssistantResult<Vec<Event>> {
        let mut existing = self.store.list(owner_id, None).await?;
        if let Some(exclude) = exclude_id {
            existing.retain(|event| event.id != exclude);
        }
        Ok(find_conflicts(&existing, start, duration))
    }
}

fn merge_patch(base: &mut EventPatch, overlay: &EventPatch) {
    if overlay.title.is_some() {
        base.title = overlay.title.clone();
    }
    if overlay.start_date.is_some() {
        base.start_date = overlay.start_date;
    }
    if overlay.duration.is_some() {
        base.duration = overlay.duration;
    }
    if overlay.location.is_some() {
        base.location = overlay.location.clone();
    }
    base.clear_duration |= overlay.clear_duration;
    base.clear_location |= overlay.clear_location;
}

fn summarize(kind: ActionKind, outcomes: &[ItemOutcome], late_conflicts: bool) -> String {
    let verb = match kind {
        ActionKind::Create => "Created",
        ActionKind::Update => "Updated",
        ActionKind::Delete => "Deleted",
    };
    let mut lines: Vec<String> = Vec::with_capacity(outcomes.len() + 1);
    for outcome in outcomes {
        if outcome.ok {
            lines.push(format!("{verb} {}.", outcome.label));
        } else {
            let detail = outcome.detail.as_deref().unwrap_or("it failed");
            lines.push(format!("Couldn't {kind} {}: {detail}", outcome.label));
        }
    }
    if late_conflicts {
        lines.push(
            "Note: your calendar changed while you were deciding, and there are new overlaps."
                .to_string(),
        );
    }
    lines.join(" ")
}
