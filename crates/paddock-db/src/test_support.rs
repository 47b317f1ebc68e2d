//! Shared helpers for the unit tests in this crate.

use uuid::Uuid;

use crate::Database;
use paddock_types::models::{ConnectionType, Role};

pub(crate) fn user(db: &Database, username: &str, role: Role) -> Uuid {
    let id = Uuid::new_v4();
    db.create_user(&id.to_string(), username, "argon2-hash", role)
        .unwrap();
    id
}

/// Request from `initiator` to `recipient`, accepted by the recipient.
/// Returns the connection id.
pub(crate) fn connect_accepted(db: &Database, initiator: Uuid, recipient: Uuid) -> Uuid {
    let row = db
        .request_connection(initiator, recipient, ConnectionType::Friend)
        .unwrap();
    let id: Uuid = row.id.parse().unwrap();
    db.accept_connection(recipient, id).unwrap();
    id
}
