use serde::{Deserialize, Serialize};

use crate::models::event::{Event, EventCreate};

/// Response to a free-text command. The shape is part of the mobile client
/// contract and must stay stable.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    List,
    Delete,
    Create,
    Update,
    Text,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommandResponse {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Event>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventCreate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_arguments: Option<serde_json::Value>,
}

impl CommandResponse {
    pub fn text(message: impl Into<String>) -> Self {
        CommandResponse {
            kind: ResponseKind::Text,
            message: message.into(),
            events: None,
            event: None,
            update_arguments: None,
        }
    }

    pub fn list(message: impl Into<String>, events: Vec<Event>) -> Self {
        CommandResponse {
            kind: ResponseKind::List,
            message: message.into(),
            events: Some(events),
            event: None,
            update_arguments: None,
        }
    }
}

/// Terminal reply to an explicit confirm or cancel.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConfirmResponse {
    pub message: String,
}

/// Replies from the confirm endpoint: terminal actions answer with a bare
/// message, an edit re-surfaces the refreshed proposal.
#[derive(Debug, Serialize, Clone)]
#[serde(untagged)]
pub enum ConfirmReply {
    Message(ConfirmResponse),
    Proposal(CommandResponse),
}

impl ConfirmReply {
    pub fn message(text: impl Into<String>) -> Self {
        ConfirmReply::Message(ConfirmResponse {
            message: text.into(),
        })
    }
}
