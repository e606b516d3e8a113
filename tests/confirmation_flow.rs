#![allow(non_snake_case)]

use chrono::{DateTime, FixedOffset, TimeZone, Timelike};
use std::sync::Arc;

use calenBot::context::TimeAnchor;
use calenBot::error::AssistantError;
use calenBot::handlers::action::EditRequest;
use calenBot::handlers::assistant::{AssistantHandler, ConfirmCommand};
use calenBot::models::event::{EventCreate, EventPatch};
use calenBot::models::response::{ConfirmReply, ResponseKind};
use calenBot::service::event_service::{EventStore, InMemoryEventStore};
use calenBot::service::extractor::RuleExtractor;

fn anchor() -> TimeAnchor {
    TimeAnchor::resolve("2026-03-10T09:00:00+01:00", "Tuesday", 31).unwrap()
}

fn setup() -> (Arc<InMemoryEventStore>, AssistantHandler) {
    let store = Arc::new(InMemoryEventStore::new());
    let handler = AssistantHandler::new(store.clone(), Arc::new(RuleExtractor));
    (store, handler)
}

fn at(day: u32, hour: u32, min: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(3600)
        .unwrap()
        .with_ymd_and_hms(2026, 3, day, hour, min, 0)
        .unwrap()
}

#[tokio::test]
async fn nothing_is_written_before_confirm() {
    let (store, handler) = setup();
    let response = handler
        .process("u1", "add lunch with John tomorrow at noon", &anchor())
        .await;
    assert_eq!(response.kind, ResponseKind::Create);
    assert!(response.event.is_some());
    assert!(store.list("u1", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn confirm_commits_and_cannot_be_replayed() {
    let (store, handler) = setup();
    handler
        .process("u1", "add lunch with John tomorrow at noon", &anchor())
        .await;

    let reply = handler.confirm("u1", ConfirmCommand::Confirm).await.unwrap();
    match reply {
        ConfirmReply::Message(message) => assert!(message.message.contains("Created")),
        ConfirmReply::Proposal(_) => panic!("confirm should answer with a message"),
    }

    let events = store.list("u1", None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "lunch with John");
    assert_eq!(events[0].start_date, at(11, 12, 0));

    // The pending action was consumed.
    let err = handler.confirm("u1", ConfirmCommand::Confirm).await.unwrap_err();
    assert!(matches!(err, AssistantError::PendingActionExists));
}

#[tokio::test]
async fn cancel_discards_the_proposal() {
    let (store, handler) = setup();
    handler
        .process("u1", "add lunch tomorrow at noon", &anchor())
        .await;
    handler.confirm("u1", ConfirmCommand::Cancel).await.unwrap();
    assert!(store.list("u1", None).await.unwrap().is_empty());
    assert!(handler.confirm("u1", ConfirmCommand::Confirm).await.is_err());
}

#[tokio::test]
async fn confirm_with_nothing_pending_is_conversational() {
    let (_store, handler) = setup();
    let err = handler.confirm("u1", ConfirmCommand::Confirm).await.unwrap_err();
    assert!(matches!(err, AssistantError::PendingActionExists));
    assert!(err.user_message().contains("nothing waiting"));
}

#[tokio::test]
async fn a_new_command_supersedes_the_pending_one() {
    let (store, handler) = setup();
    handler
        .process("u1", "add lunch tomorrow at noon", &anchor())
        .await;
    handler
        .process("u1", "add dinner on friday at 7pm", &anchor())
        .await;
    handler.confirm("u1", ConfirmCommand::Confirm).await.unwrap();

    let events = store.list("u1", None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "dinner");
}

#[tokio::test]
async fn sessions_do_not_see_each_other() {
    let (_store, handler) = setup();
    handler
        .process("u1", "add lunch tomorrow at noon", &anchor())
        .await;
    // u2 has nothing pending, and u1's proposal survives u2's confirm.
    assert!(handler.confirm("u2", ConfirmCommand::Confirm).await.is_err());
    assert!(handler.confirm("u1", ConfirmCommand::Confirm).await.is_ok());
}

#[tokio::test]
async fn edit_patches_the_draft_and_resurfaces_it() {
    let (store, handler) = setup();
    handler
        .process("u1", "add lunch tomorrow at noon", &anchor())
        .await;

    let patch = EventPatch {
        duration: Some(45),
        ..EventPatch::default()
    };
    let reply = handler
        .confirm(
            "u1",
            ConfirmCommand::Edit(
                EditRequest {
                    patch: Some(patch),
                    ..EditRequest::default()
                },
                Some(anchor()),
            ),
        )
        .await
        .unwrap();
    match reply {
        ConfirmReply::Proposal(proposal) => {
            assert_eq!(proposal.kind, ResponseKind::Create);
            assert!(proposal.message.contains("45 minutes"));
        }
        ConfirmReply::Message(_) => panic!("an edit should re-surface the proposal"),
    }

    handler.confirm("u1", ConfirmCommand::Confirm).await.unwrap();
    let events = store.list("u1", None).await.unwrap();
    assert_eq!(events[0].duration, Some(45));
}

#[tokio::test]
async fn removing_the_last_item_cancels_the_action() {
    let (store, handler) = setup();
    handler
        .process("u1", "add lunch tomorrow at noon", &anchor())
        .await;
    let reply = handler
        .confirm(
            "u1",
            ConfirmCommand::Edit(
                EditRequest {
                    remove: true,
                    ..EditRequest::default()
                },
                Some(anchor()),
            ),
        )
        .await
        .unwrap();
    assert!(matches!(reply, ConfirmReply::Message(_)));
    assert!(handler.confirm("u1", ConfirmCommand::Confirm).await.is_err());
    assert!(store.list("u1", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn a_failed_edit_leaves_the_proposal_confirmable() {
    let (store, handler) = setup();
    handler
        .process("u1", "add lunch tomorrow at noon", &anchor())
        .await;

    let err = handler
        .confirm(
            "u1",
            ConfirmCommand::Edit(
                EditRequest {
                    patch: Some(EventPatch {
                        duration: Some(0),
                        ..EventPatch::default()
                    }),
                    ..EditRequest::default()
                },
                Some(anchor()),
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AssistantError::Validation(_)));

    // The untouched proposal is still there and still confirmable.
    handler.confirm("u1", ConfirmCommand::Confirm).await.unwrap();
    let events = store.list("u1", None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].duration, None);
}

#[tokio::test]
async fn stretching_the_duration_of_an_update_rechecks_conflicts() {
    let (store, handler) = setup();
    store
        .create(
            "u1",
            EventCreate {
                title: "standup".to_string(),
                start_date: at(11, 16, 0),
                duration: Some(30),
                location: None,
            },
        )
        .await
        .unwrap();
    store
        .create(
            "u1",
            EventCreate {
                title: "dentist".to_string(),
                start_date: at(12, 15, 0),
                duration: Some(30),
                location: None,
            },
        )
        .await
        .unwrap();

    let response = handler
        .process(
            "u1",
            "move my dentist appointment to tomorrow at 3pm",
            &anchor(),
        )
        .await;
    assert_eq!(response.kind, ResponseKind::Update);
    assert!(!response.message.contains("overlaps"));

    // Stretching to two hours runs into standup at 16:00.
    let reply = handler
        .confirm(
            "u1",
            ConfirmCommand::Edit(
                EditRequest {
                    patch: Some(EventPatch {
                        duration: Some(120),
                        ..EventPatch::default()
                    }),
                    ..EditRequest::default()
                },
                Some(anchor()),
            ),
        )
        .await
        .unwrap();
    match reply {
        ConfirmReply::Proposal(proposal) => {
            assert!(proposal.message.contains("overlaps"));
            assert!(proposal.message.contains("standup"));
        }
        ConfirmReply::Message(_) => panic!("a patch edit should re-surface the proposal"),
    }
}

#[tokio::test]
async fn a_correction_note_reruns_conflict_detection() {
    let (store, handler) = setup();
    store
        .create(
            "u1",
            EventCreate {
                title: "team sync".to_string(),
                start_date: at(11, 12, 0),
                duration: Some(60),
                location: None,
            },
        )
        .await
        .unwrap();

    let response = handler
        .process("u1", "add lunch tomorrow at 3pm", &anchor())
        .await;
    assert!(!response.message.contains("overlaps"));

    let reply = handler
        .confirm(
            "u1",
            ConfirmCommand::Edit(
                EditRequest {
                    note: Some("move it to tomorrow at 12:30pm".to_string()),
                    ..EditRequest::default()
                },
                Some(anchor()),
            ),
        )
        .await
        .unwrap();
    match reply {
        ConfirmReply::Proposal(proposal) => {
            assert!(proposal.message.contains("overlaps"));
            assert!(proposal.message.contains("team sync"));
            let event = proposal.event.unwrap();
            assert_eq!(event.start_date.hour(), 12);
            assert_eq!(event.start_date.minute(), 30);
        }
        ConfirmReply::Message(_) => panic!("a note edit should re-surface the proposal"),
    }
}

#[tokio::test]
async fn a_note_without_context_is_rejected() {
    let (_store, handler) = setup();
    handler
        .process("u1", "add lunch tomorrow at noon", &anchor())
        .await;
    let err = handler
        .confirm(
            "u1",
            ConfirmCommand::Edit(
                EditRequest {
                    note: Some("make it friday".to_string()),
                    ..EditRequest::default()
                },
                None,
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AssistantError::InvalidContext(_)));
}
