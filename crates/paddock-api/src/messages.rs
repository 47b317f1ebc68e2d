//! Direct-message routes. Every send and read goes through the store's
//! access gate; the real-time fan-out happens after the durable write and
//! never gates its outcome.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

use paddock_types::api::{Claims, MarkReadRequest, SendMessageRequest};
use paddock_types::events::GatewayEvent;
use paddock_types::models::Message;

use crate::auth::AppStateInner;
use crate::convert::message_from_row;
use crate::error::{ApiError, run_blocking};

pub async fn send_message(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = claims.sub;
    let receiver = req.receiver_id;
    let kind = req.kind;
    let body = req.body;

    let db = state.clone();
    let row = run_blocking(move || db.db.send_message(sender, receiver, &body, kind)).await?;

    let message = message_from_row(&row);
    let event = GatewayEvent::MessageCreate {
        id: message.id,
        sender_id: sender,
        sender_username: claims.username.clone(),
        receiver_id: receiver,
        body: message.body.clone(),
        kind,
        timestamp: message.created_at,
    };

    // Deliver to both parties' active sessions. At-most-once: if either
    // session is gone the message is still sent.
    state.dispatcher.send_to_user(receiver, event.clone()).await;
    state.dispatcher.send_to_user(sender, event).await;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_history(
    State(state): State<Arc<AppStateInner>>,
    Path(other_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub;

    let db = state.clone();
    let rows = run_blocking(move || db.db.get_history(viewer, other_id)).await?;

    // Reading the history marked the counterparty's messages as read.
    state
        .dispatcher
        .send_to_user(
            other_id,
            GatewayEvent::MessagesRead {
                reader_id: viewer,
                peer_id: other_id,
            },
        )
        .await;

    let messages: Vec<Message> = rows.iter().map(message_from_row).collect();
    Ok(Json(messages))
}

pub async fn mark_read(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub;
    let other_id = req.other_id;

    let db = state.clone();
    let marked = run_blocking(move || db.db.mark_read(viewer, other_id)).await?;

    if marked > 0 {
        state
            .dispatcher
            .send_to_user(
                other_id,
                GatewayEvent::MessagesRead {
                    reader_id: viewer,
                    peer_id: other_id,
                },
            )
            .await;
    }

    Ok(Json(json!({ "marked": marked })))
}

pub async fn delete_message(
    State(state): State<Arc<AppStateInner>>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = claims.sub;

    let db = state.clone();
    run_blocking(move || db.db.delete_message(actor, message_id)).await?;

    Ok(Json(json!({ "deleted": true })))
}
