use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ConnectionStatus, ConnectionType, MessageKind, Role};

// -- JWT Claims --

/// JWT claims shared across paddock-api (REST middleware) and paddock-gateway
/// (WebSocket authentication). Canonical definition lives here in
/// paddock-types to eliminate duplication. The role is baked into the token,
/// so it is fixed for the session's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub token: String,
}

// -- Connections --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectRequest {
    pub recipient_id: Uuid,
    #[serde(default)]
    pub connection_type: ConnectionType,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcceptConnectionRequest {
    pub connection_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RejectConnectionRequest {
    pub connection_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FollowRequest {
    pub target_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct FollowResponse {
    pub is_following: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockRequest {
    pub target_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnblockRequest {
    pub target_id: Uuid,
}

/// A user as seen by their counterparty in lists.
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
}

/// An inbound request awaiting the caller's decision.
#[derive(Debug, Serialize)]
pub struct PendingConnection {
    pub connection_id: Uuid,
    pub initiator: PeerInfo,
    pub connection_type: ConnectionType,
    pub requested_at: Option<DateTime<Utc>>,
}

/// Entry of the canonical "who can I message" list: an accepted
/// driver↔owner connection enriched with message activity.
#[derive(Debug, Serialize)]
pub struct MessageableConnection {
    pub peer: PeerInfo,
    pub connection_id: Uuid,
    pub status: ConnectionStatus,
    pub last_message: Option<String>,
    pub last_activity_at: DateTime<Utc>,
    pub unread_count: u32,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub receiver_id: Uuid,
    pub body: String,
    #[serde(default)]
    pub kind: MessageKind,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkReadRequest {
    pub other_id: Uuid,
}

// -- Conversations --

/// Message-history-driven view: one entry per counterparty the viewer has
/// exchanged messages with and may still message. Distinct from
/// `MessageableConnection`, which is connection-driven.
#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub peer: PeerInfo,
    pub last_message: String,
    pub last_message_kind: MessageKind,
    pub last_message_at: DateTime<Utc>,
    pub unread_count: u32,
}
