//! Database row types — these map directly to SQLite rows.
//! Distinct from the paddock-types API models to keep the DB layer
//! independent; ids and timestamps stay TEXT here and are parsed at the
//! API edge.

use std::str::FromStr;

use paddock_types::models::{ConnectionStatus, ConnectionType, MessageKind, Role};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub role: Role,
    pub created_at: String,
}

pub struct ProfileRow {
    pub user_id: String,
    pub follower_count: i64,
    pub following_count: i64,
    pub friend_count: i64,
}

pub struct ConnectionRow {
    pub id: String,
    pub initiator_id: String,
    pub recipient_id: String,
    pub status: ConnectionStatus,
    pub connection_type: ConnectionType,
    pub is_following: bool,
    pub blocked_reason: Option<String>,
    pub requested_at: Option<String>,
    pub accepted_at: Option<String>,
    pub blocked_at: Option<String>,
    pub created_at: String,
}

impl ConnectionRow {
    /// The counterparty of `user_id` on this record.
    pub fn other_party(&self, user_id: &str) -> &str {
        if self.initiator_id == user_id {
            &self.recipient_id
        } else {
            &self.initiator_id
        }
    }
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    pub kind: MessageKind,
    pub is_read: bool,
    pub read_at: Option<String>,
    pub deleted_by_sender: bool,
    pub deleted_by_receiver: bool,
    pub created_at: String,
}

/// One entry of the message-history-driven conversation list.
pub struct ConversationEntryRow {
    pub peer: UserRow,
    pub last_message: MessageRow,
    pub unread_count: u32,
}

/// One entry of the connection-driven messageable list.
pub struct MessageableRow {
    pub peer: UserRow,
    pub connection: ConnectionRow,
    pub last_message: Option<MessageRow>,
    /// Last message time, falling back to acceptance time.
    pub last_activity_at: String,
    pub unread_count: u32,
}

pub struct PendingRow {
    pub connection: ConnectionRow,
    pub initiator: UserRow,
}

/// Map a TEXT column onto one of the domain enums, failing the row read on
/// out-of-range values instead of defaulting.
pub(crate) fn parse_enum_col<T>(idx: usize, value: String) -> rusqlite::Result<T>
where
    T: FromStr,
{
    value.parse::<T>().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(paddock_types::models::InvalidEnumValue(value)),
        )
    })
}
