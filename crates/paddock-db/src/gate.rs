//! The access gate: single authority for "may A and B exchange messages
//! right now". Messaging is permitted iff the pair's roles are exactly
//! {driver, owner} and an accepted connection exists between them.
//!
//! No side effects and no caching — every call reflects the latest stored
//! connection state, so revoking a connection takes effect immediately.

use uuid::Uuid;

use crate::Database;
use crate::error::{DenialReason, StoreError};
use paddock_types::models::{ConnectionStatus, ConnectionType, is_driver_owner_pair};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied(DenialReason),
}

impl Access {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Access::Allowed)
    }
}

impl Database {
    /// Decide whether `a` and `b` may currently exchange messages.
    ///
    /// Order of the arguments does not matter. A missing user is an error
    /// (`UserNotFound`), not a denial: the caller asked about an identity
    /// the directory has never seen.
    pub fn check_access(&self, a: Uuid, b: Uuid) -> Result<Access, StoreError> {
        let role_a = self.user_role(a)?.ok_or(StoreError::UserNotFound)?;
        let role_b = self.user_role(b)?.ok_or(StoreError::UserNotFound)?;

        if !is_driver_owner_pair(role_a, role_b) {
            return Ok(Access::Denied(DenialReason::RoleMismatch));
        }

        let connection = self.connection_between(a, b)?;
        let denial = match connection {
            None => DenialReason::NoConnection,
            Some(row) => match (row.status, row.connection_type) {
                // A block always wins, whatever kind of record carries it.
                (ConnectionStatus::Blocked, _) => DenialReason::Blocked,
                // Follow is a side-channel for social counters; it never
                // grants messaging even though it is stored as accepted.
                (_, ConnectionType::Follow) => DenialReason::NoConnection,
                (ConnectionStatus::Accepted, _) => return Ok(Access::Allowed),
                (ConnectionStatus::Pending, _) => DenialReason::PendingApproval,
                (ConnectionStatus::Rejected, _) => DenialReason::Rejected,
            },
        };
        Ok(Access::Denied(denial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{connect_accepted, user};
    use paddock_types::models::{ConnectionType, Role};

    #[test]
    fn unknown_user_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        let driver = user(&db, "dana", Role::Driver);
        let ghost = Uuid::new_v4();

        assert!(matches!(
            db.check_access(driver, ghost),
            Err(StoreError::UserNotFound)
        ));
    }

    #[test]
    fn non_driver_owner_pairs_are_denied() {
        let db = Database::open_in_memory().unwrap();
        let driver_a = user(&db, "dana", Role::Driver);
        let driver_b = user(&db, "dave", Role::Driver);
        let visitor = user(&db, "vera", Role::Visitor);
        let owner = user(&db, "omar", Role::Owner);
        let admin = user(&db, "ada", Role::Admin);

        for (a, b) in [(driver_a, driver_b), (visitor, owner), (admin, driver_a)] {
            assert_eq!(
                db.check_access(a, b).unwrap(),
                Access::Denied(DenialReason::RoleMismatch)
            );
        }
    }

    #[test]
    fn denial_reason_tracks_connection_status() {
        let db = Database::open_in_memory().unwrap();
        let driver = user(&db, "dana", Role::Driver);
        let owner = user(&db, "omar", Role::Owner);

        assert_eq!(
            db.check_access(driver, owner).unwrap(),
            Access::Denied(DenialReason::NoConnection)
        );

        let conn = db
            .request_connection(driver, owner, ConnectionType::Friend)
            .unwrap();
        assert_eq!(
            db.check_access(driver, owner).unwrap(),
            Access::Denied(DenialReason::PendingApproval)
        );

        db.reject_connection(owner, conn.id.parse().unwrap()).unwrap();
        assert_eq!(
            db.check_access(driver, owner).unwrap(),
            Access::Denied(DenialReason::Rejected)
        );

        db.block_user(owner, driver, None).unwrap();
        assert_eq!(
            db.check_access(driver, owner).unwrap(),
            Access::Denied(DenialReason::Blocked)
        );
    }

    #[test]
    fn follow_alone_does_not_grant_messaging() {
        let db = Database::open_in_memory().unwrap();
        let driver = user(&db, "dana", Role::Driver);
        let owner = user(&db, "omar", Role::Owner);

        // Auto-accepted follow record, right role pair — still no messaging.
        db.toggle_follow(driver, owner).unwrap();
        assert_eq!(
            db.check_access(driver, owner).unwrap(),
            Access::Denied(DenialReason::NoConnection)
        );
    }

    #[test]
    fn accepted_driver_owner_pair_is_allowed_in_both_orders() {
        let db = Database::open_in_memory().unwrap();
        let driver = user(&db, "dana", Role::Driver);
        let owner = user(&db, "omar", Role::Owner);
        connect_accepted(&db, driver, owner);

        assert!(db.check_access(driver, owner).unwrap().is_allowed());
        assert!(db.check_access(owner, driver).unwrap().is_allowed());
    }
}
