use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{AssistantError, AssistantResult};
use crate::models::event::{validate_duration, validate_title, Event, EventCreate, EventPatch};

/// Calendar persistence, scoped per owner. A caller can never see or touch
/// another owner's events; a wrong-owner lookup is indistinguishable from a
/// missing event.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn list(
        &self,
        owner_id: &str,
        range: Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)>,
    ) -> AssistantResult<Vec<Event>>;

    async fn create(&self, owner_id: &str, draft: EventCreate) -> AssistantResult<Event>;

    async fn update(&self, owner_id: &str, id: &str, patch: &EventPatch) -> AssistantResult<Event>;

    async fn delete(&self, owner_id: &str, id: &str) -> AssistantResult<Event>;
}

#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<HashMap<String, Event>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn list(
        &self,
        owner_id: &str,
        range: Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)>,
    ) -> AssistantResult<Vec<Event>> {
        let events = self
            .events
            .lock()
            .map_err(|_| AssistantError::Store("event store lock poisoned".to_string()))?;
        let mut found: Vec<Event> = events
            .values()
            .filter(|event| event.owner_id == owner_id)
            .filter(|event| match range {
                Some((from, to)) => from <= event.start_date && event.start_date < to,
                None => true,
            })
            .cloned()
            .collect();
        found.sort_by_key(|event| event.start_date);
        Ok(found)
    }

    async fn create(&self, owner_id: &str, draft: EventCreate) -> AssistantResult<Event> {
        let event = Event {
            id: Uuid::new_v4().to_string(),
            title: validate_title(&draft.title)?,
            start_date: draft.start_date,
            duration: validate_duration(draft.duration)?,
            location: draft.location,
            owner_id: owner_id.to_string(),
        };
        let mut events = self
            .events
            .lock()
            .map_err(|_| AssistantError::Store("event store lock poisoned".to_string()))?;
        events.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    async fn update(&self, owner_id: &str, id: &str, patch: &EventPatch) -> AssistantResult<Event> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| AssistantError::Store("event store lock poisoned".to_string()))?;
        let event = events
            .get_mut(id)
            .filter(|event| event.owner_id == owner_id)
            .ok_or_else(|| AssistantError::NotFound(format!("event {id}")))?;

        if let Some(title) = &patch.title {
            event.title = validate_title(title)?;
        }
        if let Some(start) = patch.start_date {
            event.start_date = start;
        }
        if patch.clear_duration {
            event.duration = None;
        } else if patch.duration.is_some() {
            event.duration = validate_duration(patch.duration)?;
        }
        if patch.clear_location {
            event.location = None;
        } else if let Some(location) = &patch.location {
            event.location = Some(location.clone());
        }
        Ok(event.clone())
    }

    async fn delete(&self, owner_id: &str, id: &str) -> AssistantResult<Event> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| AssistantError::Store("event store lock poisoned".to_string()))?;
        match events.get(id) {
            Some(event) if event.owner_id == owner_id => {}
            _ => return Err(AssistantError::NotFound(format!("event {id}"))),
        }
        events
            .remove(id)
            .ok_or_else(|| AssistantError::NotFound(format!("event {id}")))
    }
}
