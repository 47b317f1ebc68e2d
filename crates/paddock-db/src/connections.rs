//! Connection lifecycle: request → accept/reject, block/unblock, and the
//! follow side-channel. One record exists per unordered user pair (the
//! sorted `user_lo`/`user_hi` key), so every lookup is a single query
//! instead of trying both (initiator, recipient) orders.

use rusqlite::OptionalExtension;
use tracing::warn;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{ConnectionRow, MessageableRow, PendingRow, parse_enum_col};
use crate::queries::CounterField;
use crate::{Database, now_str};
use paddock_types::models::{ConnectionStatus, ConnectionType, is_driver_owner_pair};

const CONNECTION_COLS: &str = "id, initiator_id, recipient_id, status, connection_type, \
     is_following, blocked_reason, requested_at, accepted_at, blocked_at, created_at";

/// The two ids in sorted order, forming the unordered-pair key.
fn pair_key(a: Uuid, b: Uuid) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl Database {
    /// The pair's connection record, if any, regardless of who initiated.
    pub fn connection_between(&self, a: Uuid, b: Uuid) -> Result<Option<ConnectionRow>, StoreError> {
        let (lo, hi) = pair_key(a, b);
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {CONNECTION_COLS} FROM connections
                         WHERE user_lo = ?1 AND user_hi = ?2"
                    ),
                    [&lo, &hi],
                    map_connection_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_connection(&self, id: Uuid) -> Result<Option<ConnectionRow>, StoreError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {CONNECTION_COLS} FROM connections WHERE id = ?1"),
                    [id.to_string()],
                    map_connection_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Create a pending connection request from `initiator` to `recipient`.
    ///
    /// Non-follow types are restricted to driver↔owner pairs. Any existing
    /// record for the pair, whichever side initiated it, fails the request
    /// with the record's current status.
    pub fn request_connection(
        &self,
        initiator: Uuid,
        recipient: Uuid,
        connection_type: ConnectionType,
    ) -> Result<ConnectionRow, StoreError> {
        if initiator == recipient {
            return Err(StoreError::SelfConnection);
        }

        if let Some(existing) = self.connection_between(initiator, recipient)? {
            return Err(StoreError::AlreadyExists {
                status: existing.status,
            });
        }

        let initiator_role = self.user_role(initiator)?.ok_or(StoreError::UserNotFound)?;
        let recipient_role = self.user_role(recipient)?.ok_or(StoreError::UserNotFound)?;
        if connection_type != ConnectionType::Follow
            && !is_driver_owner_pair(initiator_role, recipient_role)
        {
            return Err(StoreError::RoleMismatch);
        }

        let row = ConnectionRow {
            id: Uuid::new_v4().to_string(),
            initiator_id: initiator.to_string(),
            recipient_id: recipient.to_string(),
            status: ConnectionStatus::Pending,
            connection_type,
            is_following: false,
            blocked_reason: None,
            requested_at: Some(now_str()),
            accepted_at: None,
            blocked_at: None,
            created_at: now_str(),
        };
        self.insert_connection(&row)?;
        Ok(row)
    }

    /// Accept a pending request. Only the stored recipient may accept, and
    /// only driver↔owner pairs can become messageable. Friend counters for
    /// both parties are recounted best-effort afterwards; a failure there
    /// never fails the acceptance.
    pub fn accept_connection(
        &self,
        caller: Uuid,
        connection_id: Uuid,
    ) -> Result<ConnectionRow, StoreError> {
        let mut row = self
            .get_connection(connection_id)?
            .ok_or(StoreError::ConnectionNotFound)?;

        if row.recipient_id != caller.to_string() {
            return Err(StoreError::Unauthorized);
        }
        if row.status != ConnectionStatus::Pending {
            return Err(StoreError::InvalidInput("connection is not pending"));
        }

        let initiator: Uuid = parse_id(&row.initiator_id)?;
        let initiator_role = self.user_role(initiator)?.ok_or(StoreError::UserNotFound)?;
        let caller_role = self.user_role(caller)?.ok_or(StoreError::UserNotFound)?;
        if !is_driver_owner_pair(initiator_role, caller_role) {
            return Err(StoreError::RoleMismatch);
        }

        let accepted_at = now_str();
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE connections SET status = 'accepted', accepted_at = ?1 WHERE id = ?2",
                [&accepted_at, &row.id],
            )?;
            Ok::<_, StoreError>(())
        })?;
        row.status = ConnectionStatus::Accepted;
        row.accepted_at = Some(accepted_at);

        for user_id in [&row.initiator_id, &row.recipient_id] {
            if let Err(e) = self.recount_friend_count(user_id) {
                warn!("Friend-count recount failed for {}: {}", user_id, e);
            }
        }

        Ok(row)
    }

    /// Reject a pending request. Only the stored recipient may reject.
    pub fn reject_connection(
        &self,
        caller: Uuid,
        connection_id: Uuid,
    ) -> Result<ConnectionRow, StoreError> {
        let mut row = self
            .get_connection(connection_id)?
            .ok_or(StoreError::ConnectionNotFound)?;

        if row.recipient_id != caller.to_string() {
            return Err(StoreError::Unauthorized);
        }
        if row.status != ConnectionStatus::Pending {
            return Err(StoreError::InvalidInput("connection is not pending"));
        }

        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE connections SET status = 'rejected' WHERE id = ?1",
                [&row.id],
            )?;
            Ok::<_, StoreError>(())
        })?;
        row.status = ConnectionStatus::Rejected;
        Ok(row)
    }

    /// Idempotent follow toggle. Creates an auto-accepted follow-type record
    /// if the pair has none; otherwise flips `is_following` on the existing
    /// record. Returns the new following state. Counter updates on both
    /// profiles are best-effort and floored at zero.
    pub fn toggle_follow(&self, follower: Uuid, target: Uuid) -> Result<bool, StoreError> {
        if follower == target {
            return Err(StoreError::SelfConnection);
        }
        self.user_role(target)?.ok_or(StoreError::UserNotFound)?;

        let is_following = match self.connection_between(follower, target)? {
            None => {
                let row = ConnectionRow {
                    id: Uuid::new_v4().to_string(),
                    initiator_id: follower.to_string(),
                    recipient_id: target.to_string(),
                    status: ConnectionStatus::Accepted,
                    connection_type: ConnectionType::Follow,
                    is_following: true,
                    blocked_reason: None,
                    requested_at: None,
                    accepted_at: Some(now_str()),
                    blocked_at: None,
                    created_at: now_str(),
                };
                self.insert_connection(&row)?;
                true
            }
            Some(existing) => {
                let flipped = !existing.is_following;
                self.with_conn_mut(|conn| {
                    conn.execute(
                        "UPDATE connections SET is_following = ?1 WHERE id = ?2",
                        rusqlite::params![flipped, existing.id],
                    )?;
                    Ok::<_, StoreError>(())
                })?;
                flipped
            }
        };

        let delta = if is_following { 1 } else { -1 };
        let follower_id = follower.to_string();
        let target_id = target.to_string();
        for (user_id, field) in [
            (&follower_id, CounterField::Following),
            (&target_id, CounterField::Follower),
        ] {
            if let Err(e) = self.adjust_counter(user_id, field, delta) {
                warn!("Follow-counter update failed for {}: {}", user_id, e);
            }
        }

        Ok(is_following)
    }

    /// Block `target`, overriding whatever status the pair had. Creates the
    /// record if the pair had none. Either party may block at any time.
    pub fn block_user(
        &self,
        blocker: Uuid,
        target: Uuid,
        reason: Option<&str>,
    ) -> Result<ConnectionRow, StoreError> {
        if blocker == target {
            return Err(StoreError::SelfConnection);
        }
        self.user_role(target)?.ok_or(StoreError::UserNotFound)?;

        let blocked_at = now_str();
        match self.connection_between(blocker, target)? {
            Some(mut existing) => {
                self.with_conn_mut(|conn| {
                    conn.execute(
                        "UPDATE connections
                         SET status = 'blocked', blocked_at = ?1, blocked_reason = ?2
                         WHERE id = ?3",
                        rusqlite::params![blocked_at, reason, existing.id],
                    )?;
                    Ok::<_, StoreError>(())
                })?;
                existing.status = ConnectionStatus::Blocked;
                existing.blocked_at = Some(blocked_at);
                existing.blocked_reason = reason.map(str::to_string);
                Ok(existing)
            }
            None => {
                let row = ConnectionRow {
                    id: Uuid::new_v4().to_string(),
                    initiator_id: blocker.to_string(),
                    recipient_id: target.to_string(),
                    status: ConnectionStatus::Blocked,
                    connection_type: ConnectionType::Friend,
                    is_following: false,
                    blocked_reason: reason.map(str::to_string),
                    requested_at: None,
                    accepted_at: None,
                    blocked_at: Some(blocked_at),
                    created_at: now_str(),
                };
                self.insert_connection(&row)?;
                Ok(row)
            }
        }
    }

    /// Unblock deletes the pair's record outright rather than transitioning
    /// it — re-blocking starts from a clean slate with no history.
    pub fn unblock_user(&self, caller: Uuid, target: Uuid) -> Result<(), StoreError> {
        let row = self
            .connection_between(caller, target)?
            .filter(|r| r.status == ConnectionStatus::Blocked)
            .ok_or(StoreError::ConnectionNotFound)?;

        self.with_conn_mut(|conn| {
            conn.execute("DELETE FROM connections WHERE id = ?1", [&row.id])?;
            Ok::<_, StoreError>(())
        })
    }

    /// Inbound requests awaiting the recipient's decision, newest first.
    pub fn pending_requests(&self, recipient: Uuid) -> Result<Vec<PendingRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.initiator_id, c.recipient_id, c.status, c.connection_type,
                        c.is_following, c.blocked_reason, c.requested_at, c.accepted_at,
                        c.blocked_at, c.created_at,
                        u.id, u.username, u.password, u.role, u.created_at
                 FROM connections c
                 JOIN users u ON u.id = c.initiator_id
                 WHERE c.recipient_id = ?1 AND c.status = 'pending'
                 ORDER BY c.created_at DESC, c.rowid DESC",
            )?;
            let rows = stmt
                .query_map([recipient.to_string()], |row| {
                    Ok(PendingRow {
                        connection: map_connection_row(row)?,
                        initiator: map_user_row_offset(row, 11)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// The canonical "who can I message" list: accepted non-follow
    /// connections whose role pair is driver↔owner, enriched with the last
    /// message and unread count, most recently active first.
    pub fn list_messageable(&self, viewer: Uuid) -> Result<Vec<MessageableRow>, StoreError> {
        let viewer_role = self.user_role(viewer)?.ok_or(StoreError::UserNotFound)?;
        let viewer_id = viewer.to_string();

        let connections: Vec<ConnectionRow> = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONNECTION_COLS} FROM connections
                 WHERE (user_lo = ?1 OR user_hi = ?1)
                   AND status = 'accepted' AND connection_type != 'follow'"
            ))?;
            let rows = stmt
                .query_map([&viewer_id], map_connection_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok::<_, StoreError>(rows)
        })?;

        let mut entries = Vec::new();
        for connection in connections {
            let peer_id = connection.other_party(&viewer_id).to_string();
            let Some(peer) = self.get_user_by_id(&peer_id)? else {
                continue;
            };
            if !is_driver_owner_pair(viewer_role, peer.role) {
                continue;
            }

            let peer_uuid: Uuid = parse_id(&peer.id)?;
            let last_message = self.last_message_between(viewer, peer_uuid)?;
            let unread_count = self.unread_from(viewer, peer_uuid)?;
            let last_activity_at = last_message
                .as_ref()
                .map(|m| m.created_at.clone())
                .or_else(|| connection.accepted_at.clone())
                .unwrap_or_else(|| connection.created_at.clone());

            entries.push(MessageableRow {
                peer,
                connection,
                last_message,
                last_activity_at,
                unread_count,
            });
        }

        entries.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(entries)
    }

    fn insert_connection(&self, row: &ConnectionRow) -> Result<(), StoreError> {
        let initiator: Uuid = parse_id(&row.initiator_id)?;
        let recipient: Uuid = parse_id(&row.recipient_id)?;
        let (lo, hi) = pair_key(initiator, recipient);
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO connections
                     (id, user_lo, user_hi, initiator_id, recipient_id, status,
                      connection_type, is_following, blocked_reason, requested_at,
                      accepted_at, blocked_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    row.id,
                    lo,
                    hi,
                    row.initiator_id,
                    row.recipient_id,
                    row.status.as_str(),
                    row.connection_type.as_str(),
                    row.is_following,
                    row.blocked_reason,
                    row.requested_at,
                    row.accepted_at,
                    row.blocked_at,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
    }
}

pub(crate) fn parse_id(id: &str) -> Result<Uuid, StoreError> {
    id.parse()
        .map_err(|e| StoreError::Db(anyhow::anyhow!("corrupt id '{}': {}", id, e)))
}

pub(crate) fn map_connection_row(row: &rusqlite::Row) -> rusqlite::Result<ConnectionRow> {
    Ok(ConnectionRow {
        id: row.get(0)?,
        initiator_id: row.get(1)?,
        recipient_id: row.get(2)?,
        status: parse_enum_col(3, row.get::<_, String>(3)?)?,
        connection_type: parse_enum_col(4, row.get::<_, String>(4)?)?,
        is_following: row.get(5)?,
        blocked_reason: row.get(6)?,
        requested_at: row.get(7)?,
        accepted_at: row.get(8)?,
        blocked_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn map_user_row_offset(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<crate::models::UserRow> {
    Ok(crate::models::UserRow {
        id: row.get(offset)?,
        username: row.get(offset + 1)?,
        password: row.get(offset + 2)?,
        role: parse_enum_col(offset + 3, row.get::<_, String>(offset + 3)?)?,
        created_at: row.get(offset + 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{connect_accepted, user};
    use paddock_types::models::Role;

    fn driver_owner(db: &Database) -> (Uuid, Uuid) {
        (user(db, "dana", Role::Driver), user(db, "omar", Role::Owner))
    }

    #[test]
    fn request_creates_pending_record() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = driver_owner(&db);

        let row = db
            .request_connection(driver, owner, ConnectionType::Friend)
            .unwrap();
        assert_eq!(row.status, ConnectionStatus::Pending);
        assert!(row.requested_at.is_some());

        let stored = db.connection_between(owner, driver).unwrap().unwrap();
        assert_eq!(stored.id, row.id);
    }

    #[test]
    fn self_connection_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let (driver, _) = driver_owner(&db);

        assert!(matches!(
            db.request_connection(driver, driver, ConnectionType::Friend),
            Err(StoreError::SelfConnection)
        ));
    }

    #[test]
    fn pair_is_unique_regardless_of_direction() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = driver_owner(&db);

        db.request_connection(driver, owner, ConnectionType::Friend)
            .unwrap();

        // Same direction
        assert!(matches!(
            db.request_connection(driver, owner, ConnectionType::Friend),
            Err(StoreError::AlreadyExists {
                status: ConnectionStatus::Pending
            })
        ));
        // Opposite direction
        assert!(matches!(
            db.request_connection(owner, driver, ConnectionType::Colleague),
            Err(StoreError::AlreadyExists {
                status: ConnectionStatus::Pending
            })
        ));
    }

    #[test]
    fn visitor_request_fails_with_role_mismatch_and_leaves_no_record() {
        let db = Database::open_in_memory().unwrap();
        let visitor = user(&db, "vera", Role::Visitor);
        let owner = user(&db, "omar", Role::Owner);

        assert!(matches!(
            db.request_connection(visitor, owner, ConnectionType::Friend),
            Err(StoreError::RoleMismatch)
        ));
        assert!(db.connection_between(visitor, owner).unwrap().is_none());
    }

    #[test]
    fn only_the_recipient_may_accept_or_reject() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = driver_owner(&db);
        let row = db
            .request_connection(driver, owner, ConnectionType::Friend)
            .unwrap();
        let id: Uuid = row.id.parse().unwrap();

        assert!(matches!(
            db.accept_connection(driver, id),
            Err(StoreError::Unauthorized)
        ));
        assert!(matches!(
            db.reject_connection(driver, id),
            Err(StoreError::Unauthorized)
        ));

        let accepted = db.accept_connection(owner, id).unwrap();
        assert_eq!(accepted.status, ConnectionStatus::Accepted);
        assert!(accepted.accepted_at.is_some());
    }

    #[test]
    fn accept_updates_friend_counters_for_both_parties() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = driver_owner(&db);
        connect_accepted(&db, driver, owner);

        for id in [driver, owner] {
            let profile = db.get_profile(&id.to_string()).unwrap().unwrap();
            assert_eq!(profile.friend_count, 1);
        }
    }

    #[test]
    fn accept_requires_a_pending_connection() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = driver_owner(&db);
        let id = connect_accepted(&db, driver, owner);

        assert!(matches!(
            db.accept_connection(owner, id),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn missing_connection_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let (_, owner) = driver_owner(&db);

        assert!(matches!(
            db.accept_connection(owner, Uuid::new_v4()),
            Err(StoreError::ConnectionNotFound)
        ));
    }

    #[test]
    fn toggle_follow_twice_restores_state_and_counters() {
        let db = Database::open_in_memory().unwrap();
        let alice = user(&db, "alice", Role::Owner);
        let bob = user(&db, "bob", Role::Driver);

        assert!(db.toggle_follow(alice, bob).unwrap());
        let alice_profile = db.get_profile(&alice.to_string()).unwrap().unwrap();
        let bob_profile = db.get_profile(&bob.to_string()).unwrap().unwrap();
        assert_eq!(alice_profile.following_count, 1);
        assert_eq!(bob_profile.follower_count, 1);

        assert!(!db.toggle_follow(alice, bob).unwrap());
        let alice_profile = db.get_profile(&alice.to_string()).unwrap().unwrap();
        let bob_profile = db.get_profile(&bob.to_string()).unwrap().unwrap();
        assert_eq!(alice_profile.following_count, 0);
        assert_eq!(bob_profile.follower_count, 0);
    }

    #[test]
    fn counters_never_go_negative() {
        let db = Database::open_in_memory().unwrap();
        let alice = user(&db, "alice", Role::Owner);
        let bob = user(&db, "bob", Role::Driver);

        // Follow, then drain the counter behind the toggle's back, then
        // unfollow: the decrement must floor at zero.
        db.toggle_follow(alice, bob).unwrap();
        db.adjust_counter(&bob.to_string(), CounterField::Follower, -1)
            .unwrap();
        db.toggle_follow(alice, bob).unwrap();

        let bob_profile = db.get_profile(&bob.to_string()).unwrap().unwrap();
        assert_eq!(bob_profile.follower_count, 0);
    }

    #[test]
    fn follow_record_is_auto_accepted_follow_type() {
        let db = Database::open_in_memory().unwrap();
        let alice = user(&db, "alice", Role::Visitor);
        let bob = user(&db, "bob", Role::Driver);

        // Follow has no role restriction
        db.toggle_follow(alice, bob).unwrap();
        let row = db.connection_between(alice, bob).unwrap().unwrap();
        assert_eq!(row.status, ConnectionStatus::Accepted);
        assert_eq!(row.connection_type, ConnectionType::Follow);
        assert!(row.is_following);
    }

    #[test]
    fn block_overrides_any_prior_status() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = driver_owner(&db);
        connect_accepted(&db, driver, owner);

        let row = db.block_user(owner, driver, Some("spam")).unwrap();
        assert_eq!(row.status, ConnectionStatus::Blocked);
        assert_eq!(row.blocked_reason.as_deref(), Some("spam"));
        assert!(row.blocked_at.is_some());
    }

    #[test]
    fn block_creates_record_when_pair_had_none() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = driver_owner(&db);

        let row = db.block_user(driver, owner, None).unwrap();
        assert_eq!(row.status, ConnectionStatus::Blocked);
        assert!(db.connection_between(owner, driver).unwrap().is_some());
    }

    #[test]
    fn unblock_deletes_the_record_so_a_fresh_request_works() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = driver_owner(&db);
        connect_accepted(&db, driver, owner);

        db.block_user(owner, driver, None).unwrap();
        db.unblock_user(owner, driver).unwrap();
        assert!(db.connection_between(driver, owner).unwrap().is_none());

        // Clean slate: the pair can start over.
        let row = db
            .request_connection(driver, owner, ConnectionType::Friend)
            .unwrap();
        assert_eq!(row.status, ConnectionStatus::Pending);
    }

    #[test]
    fn unblock_requires_a_blocked_record() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = driver_owner(&db);

        assert!(matches!(
            db.unblock_user(driver, owner),
            Err(StoreError::ConnectionNotFound)
        ));

        connect_accepted(&db, driver, owner);
        assert!(matches!(
            db.unblock_user(driver, owner),
            Err(StoreError::ConnectionNotFound)
        ));
    }

    #[test]
    fn pending_requests_lists_inbound_only() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = driver_owner(&db);
        let other_driver = user(&db, "dave", Role::Driver);

        db.request_connection(driver, owner, ConnectionType::Friend)
            .unwrap();
        db.request_connection(other_driver, owner, ConnectionType::Colleague)
            .unwrap();

        let inbound = db.pending_requests(owner).unwrap();
        assert_eq!(inbound.len(), 2);
        assert!(db.pending_requests(driver).unwrap().is_empty());
    }

    #[test]
    fn messageable_list_is_driver_owner_accepted_pairs_only() {
        let db = Database::open_in_memory().unwrap();
        let (driver, owner) = driver_owner(&db);
        let other_owner = user(&db, "olga", Role::Owner);

        connect_accepted(&db, driver, owner);
        // Pending request does not show up
        db.request_connection(driver, other_owner, ConnectionType::Friend)
            .unwrap();
        // Follow-only relationship does not show up
        let visitor = user(&db, "vera", Role::Visitor);
        db.toggle_follow(visitor, driver).unwrap();

        let mine = db.list_messageable(driver).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].peer.id, owner.to_string());
        assert_eq!(mine[0].unread_count, 0);
        assert!(mine[0].last_message.is_none());

        assert!(db.list_messageable(visitor).unwrap().is_empty());
    }
}
