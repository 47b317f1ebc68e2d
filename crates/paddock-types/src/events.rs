use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MessageKind;

/// Events sent over the WebSocket gateway.
///
/// Delivery is at-most-once and fire-and-forget: a failed or absent session
/// never affects the durable write that produced the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A user came online or went offline
    PresenceUpdate {
        user_id: Uuid,
        username: String,
        online: bool,
    },

    /// A new direct message was stored; delivered to both parties
    MessageCreate {
        id: Uuid,
        sender_id: Uuid,
        sender_username: String,
        receiver_id: Uuid,
        body: String,
        kind: MessageKind,
        timestamp: DateTime<Utc>,
    },

    /// The counterparty read all messages the recipient had sent them
    MessagesRead { reader_id: Uuid, peer_id: Uuid },

    /// A peer started typing in the direct conversation
    TypingStart { user_id: Uuid, username: String },

    /// A peer stopped typing
    TypingStop { user_id: Uuid },

    /// A connection request arrived; delivered to the recipient
    ConnectionRequested {
        connection_id: Uuid,
        initiator_id: Uuid,
        initiator_username: String,
    },

    /// The recipient accepted; delivered to the initiator
    ConnectionAccepted {
        connection_id: Uuid,
        recipient_id: Uuid,
        recipient_username: String,
    },

    /// The recipient rejected; delivered to the initiator
    ConnectionRejected { connection_id: Uuid },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Indicate typing to a direct-message peer
    StartTyping { peer_id: Uuid },

    /// Indicate typing has stopped
    StopTyping { peer_id: Uuid },
}
