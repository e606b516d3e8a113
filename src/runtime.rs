use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::Filter;

use crate::context::TimeAnchor;
use crate::error::AssistantError;
use crate::handlers::action::EditRequest;
use crate::handlers::assistant::{AssistantHandler, ConfirmCommand};
use crate::models::event::EventPatch;

/// Request body for a free-text command. The client reports its own clock;
/// the server never substitutes its own for date resolution.
#[derive(Debug, Deserialize)]
pub struct ProcessBody {
    pub text: String,
    pub current_datetime: String,
    pub weekday: String,
    pub days_in_month: u32,
}

/// Request body for resolving a pending proposal. The clock fields are only
/// required when the edit carries a free-text correction note.
#[derive(Debug, Deserialize)]
pub struct ConfirmBody {
    pub decision: String,
    pub index: Option<usize>,
    pub remove: Option<bool>,
    pub edits: Option<EventPatch>,
    pub note: Option<String>,
    pub current_datetime: Option<String>,
    pub weekday: Option<String>,
    pub days_in_month: Option<u32>,
}

pub async fn run_api(handler: Arc<AssistantHandler>, port: u16) {
    let with_handler = warp::any().map(move || Arc::clone(&handler));

    let assistant = warp::path!("assistant")
        .and(warp::post())
        .and(with_handler.clone())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .and_then(assistant_route);

    let confirm = warp::path!("assistant" / "confirm")
        .and(warp::post())
        .and(with_handler)
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .and_then(confirm_route);

    let routes = confirm.or(assistant);
    tracing::info!(port, "assistant API listening");
    warp::serve(routes).run(([0, 0, 0, 0], port)).await;
}

/// Sessions are keyed by the bearer token; an unauthenticated caller gets a
/// shared anonymous session.
fn owner_from(auth: Option<String>) -> String {
    auth.as_deref()
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .unwrap_or_else(|| "anonymous".to_string())
}

fn message_reply(message: &str, status: StatusCode) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "message": message })),
        status,
    )
}

async fn assistant_route(
    handler: Arc<AssistantHandler>,
    auth: Option<String>,
    body: ProcessBody,
) -> Result<impl warp::Reply, Infallible> {
    let owner = owner_from(auth);
    if body.text.trim().is_empty() {
        return Ok(message_reply("Text cannot be empty", StatusCode::BAD_REQUEST));
    }
    let anchor = match TimeAnchor::resolve(&body.current_datetime, &body.weekday, body.days_in_month)
    {
        Ok(anchor) => anchor,
        Err(err) => {
            tracing::warn!(error = %err, "rejected request context");
            return Ok(message_reply(&err.user_message(), StatusCode::BAD_REQUEST));
        }
    };
    let response = handler.process(&owner, &body.text, &anchor).await;
    Ok(warp::reply::with_status(
        warp::reply::json(&response),
        StatusCode::OK,
    ))
}

async fn confirm_route(
    handler: Arc<AssistantHandler>,
    auth: Option<String>,
    body: ConfirmBody,
) -> Result<impl warp::Reply, Infallible> {
    let owner = owner_from(auth);

    let command = match body.decision.as_str() {
        "confirm" => ConfirmCommand::Confirm,
        "cancel" => ConfirmCommand::Cancel,
        "edit" => {
            let anchor = match (&body.current_datetime, &body.weekday, body.days_in_month) {
                (Some(datetime), Some(weekday), Some(days)) => {
                    match TimeAnchor::resolve(datetime, weekday, days) {
                        Ok(anchor) => Some(anchor),
                        Err(err) => {
                            return Ok(message_reply(
                                &err.user_message(),
                                StatusCode::BAD_REQUEST,
                            ));
                        }
                    }
                }
                _ => None,
            };
            ConfirmCommand::Edit(
                EditRequest {
                    index: body.index,
                    remove: body.remove.unwrap_or(false),
                    patch: body.edits,
                    note: body.note,
                },
                anchor,
            )
        }
        _ => {
            return Ok(message_reply(
                "decision must be confirm, cancel, or edit",
                StatusCode::BAD_REQUEST,
            ));
        }
    };

    match handler.confirm(&owner, command).await {
        Ok(reply) => Ok(warp::reply::with_status(
            warp::reply::json(&reply),
            StatusCode::OK,
        )),
        Err(err @ AssistantError::PendingActionExists) => {
            Ok(message_reply(&err.user_message(), StatusCode::OK))
        }
        Err(err @ (AssistantError::InvalidContext(_) | AssistantError::Validation(_))) => {
            Ok(message_reply(&err.user_message(), StatusCode::BAD_REQUEST))
        }
        Err(err) => {
            tracing::error!(error = %err, "confirm failed");
            Ok(message_reply(
                &err.user_message(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}
