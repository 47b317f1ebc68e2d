//! Connection lifecycle routes: request/accept/reject, follow toggle,
//! block/unblock, and the pending + messageable listings.

use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

use paddock_types::api::{
    AcceptConnectionRequest, BlockRequest, Claims, ConnectRequest, FollowRequest, FollowResponse,
    MessageableConnection, PendingConnection, RejectConnectionRequest, UnblockRequest,
};
use paddock_types::events::GatewayEvent;

use crate::auth::AppStateInner;
use crate::convert::{connection_from_row, parse_ts, parse_uuid, peer_from_row};
use crate::error::{ApiError, run_blocking};

pub async fn request_connection(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ConnectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let initiator = claims.sub;
    let recipient = req.recipient_id;
    let connection_type = req.connection_type;

    let db = state.clone();
    let row =
        run_blocking(move || db.db.request_connection(initiator, recipient, connection_type))
            .await?;

    // Fire-and-forget: an offline recipient just misses the nudge.
    state
        .dispatcher
        .send_to_user(
            recipient,
            GatewayEvent::ConnectionRequested {
                connection_id: parse_uuid("connection id", &row.id),
                initiator_id: initiator,
                initiator_username: claims.username.clone(),
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(connection_from_row(&row))))
}

pub async fn accept_connection(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AcceptConnectionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = claims.sub;
    let connection_id = req.connection_id;

    let db = state.clone();
    let row = run_blocking(move || db.db.accept_connection(caller, connection_id)).await?;

    state
        .dispatcher
        .send_to_user(
            parse_uuid("initiator_id", &row.initiator_id),
            GatewayEvent::ConnectionAccepted {
                connection_id,
                recipient_id: caller,
                recipient_username: claims.username.clone(),
            },
        )
        .await;

    Ok(Json(connection_from_row(&row)))
}

pub async fn reject_connection(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RejectConnectionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = claims.sub;
    let connection_id = req.connection_id;

    let db = state.clone();
    let row = run_blocking(move || db.db.reject_connection(caller, connection_id)).await?;

    state
        .dispatcher
        .send_to_user(
            parse_uuid("initiator_id", &row.initiator_id),
            GatewayEvent::ConnectionRejected { connection_id },
        )
        .await;

    Ok(Json(connection_from_row(&row)))
}

pub async fn toggle_follow(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<FollowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let follower = claims.sub;
    let target = req.target_id;

    let db = state.clone();
    let is_following = run_blocking(move || db.db.toggle_follow(follower, target)).await?;

    Ok(Json(FollowResponse { is_following }))
}

pub async fn block_user(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BlockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let blocker = claims.sub;
    let target = req.target_id;
    let reason = req.reason;

    let db = state.clone();
    let row =
        run_blocking(move || db.db.block_user(blocker, target, reason.as_deref())).await?;

    Ok(Json(connection_from_row(&row)))
}

pub async fn unblock_user(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UnblockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = claims.sub;
    let target = req.target_id;

    let db = state.clone();
    run_blocking(move || db.db.unblock_user(caller, target)).await?;

    Ok(Json(json!({ "unblocked": true })))
}

pub async fn pending_requests(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub;

    let db = state.clone();
    let rows = run_blocking(move || db.db.pending_requests(viewer)).await?;

    let list: Vec<PendingConnection> = rows
        .iter()
        .map(|r| PendingConnection {
            connection_id: parse_uuid("connection id", &r.connection.id),
            initiator: peer_from_row(&r.initiator),
            connection_type: r.connection.connection_type,
            requested_at: r
                .connection
                .requested_at
                .as_deref()
                .map(|v| parse_ts("requested_at", v)),
        })
        .collect();

    Ok(Json(list))
}

pub async fn my_connections(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub;

    let db = state.clone();
    let rows = run_blocking(move || db.db.list_messageable(viewer)).await?;

    let list: Vec<MessageableConnection> = rows
        .iter()
        .map(|r| MessageableConnection {
            peer: peer_from_row(&r.peer),
            connection_id: parse_uuid("connection id", &r.connection.id),
            status: r.connection.status,
            last_message: r.last_message.as_ref().map(|m| m.body.clone()),
            last_activity_at: parse_ts("last_activity_at", &r.last_activity_at),
            unread_count: r.unread_count,
        })
        .collect();

    Ok(Json(list))
}
