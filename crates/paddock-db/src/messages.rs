//! Direct-message persistence: gated sends, read state, per-side soft
//! deletes, and the derived conversation list.

use std::collections::HashMap;

use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::connections::parse_id;
use crate::error::StoreError;
use crate::gate::Access;
use crate::models::{ConversationEntryRow, MessageRow, parse_enum_col};
use crate::{Database, now_str};
use paddock_types::models::MessageKind;

const MESSAGE_COLS: &str = "id, sender_id, receiver_id, body, kind, is_read, read_at, \
     deleted_by_sender, deleted_by_receiver, created_at";

impl Database {
    /// Store a message if the gate currently allows the pair. The caller is
    /// responsible for real-time fan-out; a failed broadcast must not undo
    /// or gate the stored message.
    pub fn send_message(
        &self,
        sender: Uuid,
        receiver: Uuid,
        body: &str,
        kind: MessageKind,
    ) -> Result<MessageRow, StoreError> {
        if body.trim().is_empty() {
            return Err(StoreError::InvalidInput("message body is required"));
        }

        if let Access::Denied(reason) = self.check_access(sender, receiver)? {
            return Err(StoreError::MessagingNotAllowed(reason));
        }

        let row = MessageRow {
            id: Uuid::new_v4().to_string(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            body: body.to_string(),
            kind,
            is_read: false,
            read_at: None,
            deleted_by_sender: false,
            deleted_by_receiver: false,
            created_at: now_str(),
        };

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, body, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    row.id,
                    row.sender_id,
                    row.receiver_id,
                    row.body,
                    row.kind.as_str(),
                    row.created_at,
                ],
            )?;
            Ok::<_, StoreError>(())
        })?;

        Ok(row)
    }

    /// Message history between the viewer and `other`, oldest first,
    /// excluding messages the viewer soft-deleted. Gated at read time: once
    /// the relationship is revoked the history is hidden even though the
    /// rows persist. Reading marks everything `other` sent the viewer as
    /// read, so the returned rows reflect the post-read state.
    pub fn get_history(&self, viewer: Uuid, other: Uuid) -> Result<Vec<MessageRow>, StoreError> {
        if let Access::Denied(reason) = self.check_access(viewer, other)? {
            return Err(StoreError::MessagingNotAllowed(reason));
        }

        self.mark_read(viewer, other)?;

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLS} FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2 AND deleted_by_sender = 0)
                    OR (sender_id = ?2 AND receiver_id = ?1 AND deleted_by_receiver = 0)
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map([viewer.to_string(), other.to_string()], map_message_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark everything `other` sent the viewer as read. Idempotent; returns
    /// the number of messages that changed state.
    pub fn mark_read(&self, viewer: Uuid, other: Uuid) -> Result<usize, StoreError> {
        let read_at = now_str();
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1, read_at = ?1
                 WHERE sender_id = ?2 AND receiver_id = ?3 AND is_read = 0",
                rusqlite::params![read_at, other.to_string(), viewer.to_string()],
            )?;
            Ok(changed)
        })
    }

    /// Soft-delete for whichever side the actor is on. The message stays
    /// visible to the other party until they delete it too.
    pub fn delete_message(&self, actor: Uuid, message_id: Uuid) -> Result<(), StoreError> {
        let row = self
            .get_message(message_id)?
            .ok_or(StoreError::MessageNotFound)?;

        let actor_id = actor.to_string();
        let column = if row.sender_id == actor_id {
            "deleted_by_sender"
        } else if row.receiver_id == actor_id {
            "deleted_by_receiver"
        } else {
            return Err(StoreError::Forbidden);
        };

        self.with_conn_mut(|conn| {
            conn.execute(
                &format!("UPDATE messages SET {column} = 1 WHERE id = ?1"),
                [&row.id],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<MessageRow>, StoreError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {MESSAGE_COLS} FROM messages WHERE id = ?1"),
                    [id.to_string()],
                    map_message_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Latest message either way between the viewer and `other` that the
    /// viewer has not deleted.
    pub fn last_message_between(
        &self,
        viewer: Uuid,
        other: Uuid,
    ) -> Result<Option<MessageRow>, StoreError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {MESSAGE_COLS} FROM messages
                         WHERE (sender_id = ?1 AND receiver_id = ?2 AND deleted_by_sender = 0)
                            OR (sender_id = ?2 AND receiver_id = ?1 AND deleted_by_receiver = 0)
                         ORDER BY created_at DESC, rowid DESC
                         LIMIT 1"
                    ),
                    [viewer.to_string(), other.to_string()],
                    map_message_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Unread count from `other` to the viewer, ignoring messages the
    /// viewer already deleted.
    pub fn unread_from(&self, viewer: Uuid, other: Uuid) -> Result<u32, StoreError> {
        self.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE sender_id = ?1 AND receiver_id = ?2
                   AND is_read = 0 AND deleted_by_receiver = 0",
                [other.to_string(), viewer.to_string()],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// The message-history-driven conversation list: every counterparty the
    /// viewer has messages with, re-validated against the gate. Pairs the
    /// gate currently denies are silently excluded — a conversation that
    /// lived under an accepted connection disappears the moment that
    /// connection is revoked, while its rows stay stored. Sorted newest
    /// activity first.
    pub fn list_conversations(&self, viewer: Uuid) -> Result<Vec<ConversationEntryRow>, StoreError> {
        let viewer_id = viewer.to_string();

        let messages: Vec<MessageRow> = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLS} FROM messages
                 WHERE (sender_id = ?1 AND deleted_by_sender = 0)
                    OR (receiver_id = ?1 AND deleted_by_receiver = 0)
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map([&viewer_id], map_message_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok::<_, StoreError>(rows)
        })?;

        // Group by counterparty; the DESC scan means the first message seen
        // per peer is the latest one, and first-seen order is recency order.
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, (MessageRow, u32)> = HashMap::new();
        for message in messages {
            let peer_id = if message.sender_id == viewer_id {
                message.receiver_id.clone()
            } else {
                message.sender_id.clone()
            };
            let unread = u32::from(message.receiver_id == viewer_id && !message.is_read);
            match groups.get_mut(&peer_id) {
                Some((_, count)) => *count += unread,
                None => {
                    order.push(peer_id.clone());
                    groups.insert(peer_id, (message, unread));
                }
            }
        }

        let mut entries = Vec::new();
        for peer_id in order {
            let allowed = match self.check_access(viewer, parse_id(&peer_id)?) {
                Ok(access) => access.is_allowed(),
                // Counterparty no longer in the directory: drop the group.
                Err(StoreError::UserNotFound) => false,
                Err(e) => return Err(e),
            };
            if !allowed {
                continue;
            }
            let Some(peer) = self.get_user_by_id(&peer_id)? else {
                continue;
            };
            let (last_message, unread_count) = groups.remove(&peer_id).expect("grouped above");
            entries.push(ConversationEntryRow {
                peer,
                last_message,
                unread_count,
            });
        }

        Ok(entries)
    }
}

pub(crate) fn map_message_row(row: &rusqlite::Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        body: row.get(3)?,
        kind: parse_enum_col(4, row.get::<_, String>(4)?)?,
        is_read: row.get(5)?,
        read_at: row.get(6)?,
        deleted_by_sender: row.get(7)?,
        deleted_by_receiver: row.get(8)?,
        created_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DenialReason;
    use crate::test_support::{connect_accepted, user};
    use paddock_types::models::{ConnectionType, Role};

    fn connected_driver_owner(db: &Database) -> (Uuid, Uuid) {
        let driver = user(db, "dana", Role::Driver);
        let owner = user(db, "omar", Role::Owner);
        connect_accepted(db, driver, owner);
        (driver, owner)
    }

    #[test]
    fn send_tracks_the_gate_through_every_transition() {
        let db = Database::open_in_memory().unwrap();
        let driver = user(&db, "dana", Role::Driver);
        let owner = user(&db, "omar", Role::Owner);

        // No connection yet
        assert!(matches!(
            db.send_message(driver, owner, "hi", MessageKind::Text),
            Err(StoreError::MessagingNotAllowed(DenialReason::NoConnection))
        ));

        // Pending
        let req = db
            .request_connection(driver, owner, ConnectionType::Friend)
            .unwrap();
        assert!(matches!(
            db.send_message(driver, owner, "hi", MessageKind::Text),
            Err(StoreError::MessagingNotAllowed(DenialReason::PendingApproval))
        ));

        // Accepted: both directions may send
        db.accept_connection(owner, req.id.parse().unwrap()).unwrap();
        assert!(db.send_message(driver, owner, "hi", MessageKind::Text).is_ok());
        assert!(db.send_message(owner, driver, "hello", MessageKind::Text).is_ok());

        // Revoked: new sends fail immediately with the block detail
        db.block_user(owner, driver, None).unwrap();
        assert!(matches!(
            db.send_message(driver, owner, "hi again", MessageKind::Text),
            Err(StoreError::MessagingNotAllowed(DenialReason::Blocked))
        ));
    }

    #[test]
    fn empty_body_is_invalid() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = connected_driver_owner(&db);

        assert!(matches!(
            db.send_message(driver, owner, "   ", MessageKind::Text),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn history_marks_messages_read_and_reflects_it() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = connected_driver_owner(&db);

        db.send_message(driver, owner, "Hi", MessageKind::Text).unwrap();
        assert_eq!(db.unread_from(owner, driver).unwrap(), 1);

        let history = db.get_history(owner, driver).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].is_read);
        assert!(history[0].read_at.is_some());
        assert_eq!(db.unread_from(owner, driver).unwrap(), 0);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = connected_driver_owner(&db);

        db.send_message(driver, owner, "one", MessageKind::Text).unwrap();
        db.send_message(driver, owner, "two", MessageKind::Text).unwrap();

        assert_eq!(db.mark_read(owner, driver).unwrap(), 2);
        assert_eq!(db.mark_read(owner, driver).unwrap(), 0);
        assert_eq!(db.unread_from(owner, driver).unwrap(), 0);
    }

    #[test]
    fn history_is_hidden_once_the_relationship_is_revoked() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = connected_driver_owner(&db);
        db.send_message(driver, owner, "Hi", MessageKind::Text).unwrap();

        db.block_user(owner, driver, None).unwrap();
        assert!(matches!(
            db.get_history(driver, owner),
            Err(StoreError::MessagingNotAllowed(DenialReason::Blocked))
        ));
    }

    #[test]
    fn soft_delete_hides_per_side_only() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = connected_driver_owner(&db);

        let msg = db.send_message(driver, owner, "Hi", MessageKind::Text).unwrap();
        let id: Uuid = msg.id.parse().unwrap();

        db.delete_message(driver, id).unwrap();
        assert!(db.get_history(driver, owner).unwrap().is_empty());
        assert_eq!(db.get_history(owner, driver).unwrap().len(), 1);

        db.delete_message(owner, id).unwrap();
        assert!(db.get_history(owner, driver).unwrap().is_empty());
    }

    #[test]
    fn only_parties_may_delete() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = connected_driver_owner(&db);
        let bystander = user(&db, "vera", Role::Visitor);

        let msg = db.send_message(driver, owner, "Hi", MessageKind::Text).unwrap();
        let id: Uuid = msg.id.parse().unwrap();

        assert!(matches!(
            db.delete_message(bystander, id),
            Err(StoreError::Forbidden)
        ));
        assert!(matches!(
            db.delete_message(driver, Uuid::new_v4()),
            Err(StoreError::MessageNotFound)
        ));
    }

    #[test]
    fn conversations_group_by_peer_with_unread_counts() {
        let db = Database::open_in_memory().unwrap();
        let driver = user(&db, "dana", Role::Driver);
        let owner_a = user(&db, "omar", Role::Owner);
        let owner_b = user(&db, "olga", Role::Owner);
        connect_accepted(&db, driver, owner_a);
        connect_accepted(&db, owner_b, driver);

        db.send_message(owner_a, driver, "first", MessageKind::Text).unwrap();
        db.send_message(owner_a, driver, "second", MessageKind::Text).unwrap();
        db.send_message(driver, owner_b, "hello", MessageKind::Text).unwrap();

        let convs = db.list_conversations(driver).unwrap();
        assert_eq!(convs.len(), 2);
        // Most recent first: the owner_b exchange happened last.
        assert_eq!(convs[0].peer.id, owner_b.to_string());
        assert_eq!(convs[0].unread_count, 0);
        assert_eq!(convs[1].peer.id, owner_a.to_string());
        assert_eq!(convs[1].unread_count, 2);
        assert_eq!(convs[1].last_message.body, "second");
    }

    #[test]
    fn revoking_a_connection_hides_the_conversation_but_keeps_rows() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = connected_driver_owner(&db);

        let msg = db.send_message(driver, owner, "Hi", MessageKind::Text).unwrap();
        assert_eq!(db.list_conversations(driver).unwrap().len(), 1);
        assert_eq!(db.list_conversations(owner).unwrap().len(), 1);

        db.block_user(owner, driver, None).unwrap();
        assert!(db.list_conversations(driver).unwrap().is_empty());
        assert!(db.list_conversations(owner).unwrap().is_empty());

        // The rows themselves persist.
        assert!(db.get_message(msg.id.parse().unwrap()).unwrap().is_some());
    }
}
