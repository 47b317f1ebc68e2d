//! End-to-end flows over an in-memory database: request → accept → message
//! → read, plus the access-revocation behaviors that span modules.

use paddock_db::{Access, Database, DenialReason, StoreError};
use paddock_types::models::{ConnectionType, MessageKind, Role};
use uuid::Uuid;

fn user(db: &Database, username: &str, role: Role) -> Uuid {
    let id = Uuid::new_v4();
    db.create_user(&id.to_string(), username, "argon2-hash", role)
        .unwrap();
    id
}

#[test]
fn driver_owner_request_accept_message_read_flow() {
    let db = Database::open_in_memory().unwrap();
    let driver = user(&db, "dana", Role::Driver);
    let owner = user(&db, "omar", Role::Owner);

    // Driver requests, owner accepts.
    let request = db
        .request_connection(driver, owner, ConnectionType::Friend)
        .unwrap();
    db.accept_connection(owner, request.id.parse().unwrap())
        .unwrap();

    // Driver sends "Hi".
    let sent = db
        .send_message(driver, owner, "Hi", MessageKind::Text)
        .unwrap();
    assert!(!sent.is_read);
    assert_eq!(db.unread_from(owner, driver).unwrap(), 1);

    // Owner reads the history: one message, now read, unread count zero.
    let history = db.get_history(owner, driver).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].body, "Hi");
    assert!(history[0].is_read);
    assert_eq!(db.unread_from(owner, driver).unwrap(), 0);
}

#[test]
fn send_succeeds_exactly_when_the_gate_allows() {
    let db = Database::open_in_memory().unwrap();
    let driver = user(&db, "dana", Role::Driver);
    let owner = user(&db, "omar", Role::Owner);

    // The property must hold before and after every transition.
    let assert_send_matches_gate = |note: &str| {
        let allowed = db.check_access(driver, owner).unwrap().is_allowed();
        let send = db.send_message(driver, owner, "probe", MessageKind::Text);
        assert_eq!(send.is_ok(), allowed, "send/gate diverged: {note}");
    };

    assert_send_matches_gate("no connection");

    let request = db
        .request_connection(driver, owner, ConnectionType::Friend)
        .unwrap();
    assert_send_matches_gate("pending");

    db.accept_connection(owner, request.id.parse().unwrap())
        .unwrap();
    assert_send_matches_gate("accepted");

    db.block_user(owner, driver, Some("enough"))
        .unwrap();
    assert_send_matches_gate("blocked");

    db.unblock_user(driver, owner).unwrap();
    assert_send_matches_gate("record deleted by unblock");
}

#[test]
fn visitor_cannot_request_a_connection() {
    let db = Database::open_in_memory().unwrap();
    let visitor = user(&db, "vera", Role::Visitor);
    let owner = user(&db, "omar", Role::Owner);

    assert!(matches!(
        db.request_connection(visitor, owner, ConnectionType::Friend),
        Err(StoreError::RoleMismatch)
    ));
    assert!(db.connection_between(visitor, owner).unwrap().is_none());
    assert_eq!(
        db.check_access(visitor, owner).unwrap(),
        Access::Denied(DenialReason::RoleMismatch)
    );
}

#[test]
fn block_after_history_hides_everything_but_keeps_rows() {
    let db = Database::open_in_memory().unwrap();
    let driver = user(&db, "dana", Role::Driver);
    let owner = user(&db, "omar", Role::Owner);

    let request = db
        .request_connection(driver, owner, ConnectionType::Friend)
        .unwrap();
    db.accept_connection(owner, request.id.parse().unwrap())
        .unwrap();

    let sent = db
        .send_message(owner, driver, "about the car", MessageKind::Text)
        .unwrap();

    db.block_user(driver, owner, None).unwrap();

    // New sends fail with the block detail.
    assert!(matches!(
        db.send_message(owner, driver, "hello?", MessageKind::Text),
        Err(StoreError::MessagingNotAllowed(DenialReason::Blocked))
    ));
    // Both conversation lists no longer show the pair.
    assert!(db.list_conversations(driver).unwrap().is_empty());
    assert!(db.list_conversations(owner).unwrap().is_empty());
    // The messageable list is empty too.
    assert!(db.list_messageable(driver).unwrap().is_empty());
    // Yet the message row is still stored.
    assert!(db.get_message(sent.id.parse().unwrap()).unwrap().is_some());
}

#[test]
fn recount_heals_drifted_counters() {
    let db = Database::open_in_memory().unwrap();
    let driver = user(&db, "dana", Role::Driver);
    let owner = user(&db, "omar", Role::Owner);

    let request = db
        .request_connection(driver, owner, ConnectionType::Friend)
        .unwrap();
    db.accept_connection(owner, request.id.parse().unwrap())
        .unwrap();
    db.toggle_follow(driver, owner).unwrap();

    // Simulate counter drift from a crash between writes.
    db.with_conn_mut(|conn| {
        conn.execute("UPDATE profiles SET friend_count = 99, follower_count = 99", [])?;
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();

    let reconciled = db.recount_profiles().unwrap();
    assert_eq!(reconciled, 2);

    let driver_profile = db.get_profile(&driver.to_string()).unwrap().unwrap();
    let owner_profile = db.get_profile(&owner.to_string()).unwrap().unwrap();
    assert_eq!(driver_profile.friend_count, 1);
    assert_eq!(driver_profile.following_count, 1);
    assert_eq!(owner_profile.friend_count, 1);
    assert_eq!(owner_profile.follower_count, 1);
    assert_eq!(owner_profile.following_count, 0);
}

#[test]
fn messageable_list_orders_by_latest_activity() {
    let db = Database::open_in_memory().unwrap();
    let driver = user(&db, "dana", Role::Driver);
    let owner_a = user(&db, "omar", Role::Owner);
    let owner_b = user(&db, "olga", Role::Owner);

    for owner in [owner_a, owner_b] {
        let request = db
            .request_connection(driver, owner, ConnectionType::Friend)
            .unwrap();
        db.accept_connection(owner, request.id.parse().unwrap())
            .unwrap();
    }

    db.send_message(driver, owner_a, "ping", MessageKind::Text)
        .unwrap();
    db.send_message(owner_b, driver, "pong", MessageKind::Text)
        .unwrap();

    let mine = db.list_messageable(driver).unwrap();
    assert_eq!(mine.len(), 2);
    // owner_b's message landed last, so that pair leads.
    assert_eq!(mine[0].peer.id, owner_b.to_string());
    assert_eq!(mine[0].unread_count, 1);
    assert_eq!(mine[1].peer.id, owner_a.to_string());
    assert_eq!(
        mine[1].last_message.as_ref().map(|m| m.body.as_str()),
        Some("ping")
    );
}
