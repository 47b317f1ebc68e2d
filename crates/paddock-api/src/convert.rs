//! Row-to-wire conversions. Ids and timestamps live as TEXT in SQLite;
//! corrupt values are logged and defaulted rather than failing the whole
//! response.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use paddock_db::models::{ConnectionRow, MessageRow, UserRow};
use paddock_types::api::PeerInfo;
use paddock_types::models::{Connection, Message, parse_sqlite_datetime};

pub(crate) fn parse_uuid(field: &str, value: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", field, value, e);
        Uuid::default()
    })
}

pub(crate) fn parse_ts(field: &str, value: &str) -> DateTime<Utc> {
    parse_sqlite_datetime(value).unwrap_or_else(|| {
        warn!("Corrupt {} '{}'", field, value);
        DateTime::default()
    })
}

fn parse_ts_opt(field: &str, value: Option<&str>) -> Option<DateTime<Utc>> {
    value.map(|v| parse_ts(field, v))
}

pub(crate) fn connection_from_row(row: &ConnectionRow) -> Connection {
    Connection {
        id: parse_uuid("connection id", &row.id),
        initiator_id: parse_uuid("initiator_id", &row.initiator_id),
        recipient_id: parse_uuid("recipient_id", &row.recipient_id),
        status: row.status,
        connection_type: row.connection_type,
        is_following: row.is_following,
        blocked_reason: row.blocked_reason.clone(),
        requested_at: parse_ts_opt("requested_at", row.requested_at.as_deref()),
        accepted_at: parse_ts_opt("accepted_at", row.accepted_at.as_deref()),
        blocked_at: parse_ts_opt("blocked_at", row.blocked_at.as_deref()),
        created_at: parse_ts("created_at", &row.created_at),
    }
}

pub(crate) fn message_from_row(row: &MessageRow) -> Message {
    Message {
        id: parse_uuid("message id", &row.id),
        sender_id: parse_uuid("sender_id", &row.sender_id),
        receiver_id: parse_uuid("receiver_id", &row.receiver_id),
        body: row.body.clone(),
        kind: row.kind,
        is_read: row.is_read,
        read_at: parse_ts_opt("read_at", row.read_at.as_deref()),
        created_at: parse_ts("created_at", &row.created_at),
    }
}

pub(crate) fn peer_from_row(row: &UserRow) -> PeerInfo {
    PeerInfo {
        id: parse_uuid("user id", &row.id),
        username: row.username.clone(),
        role: row.role,
    }
}
