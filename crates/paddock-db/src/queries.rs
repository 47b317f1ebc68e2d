//! User directory and profile-counter queries. Counters are denormalized
//! caches derived from the connections table; `recount_profiles` is the
//! source-of-truth recomputation.

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::Database;
use crate::error::StoreError;
use crate::models::{ProfileRow, UserRow, parse_enum_col};
use paddock_types::models::Role;

#[derive(Clone, Copy)]
pub(crate) enum CounterField {
    Follower,
    Following,
    Friend,
}

impl CounterField {
    fn column(self) -> &'static str {
        match self {
            CounterField::Follower => "follower_count",
            CounterField::Following => "following_count",
            CounterField::Friend => "friend_count",
        }
    }
}

impl Database {
    // -- Users --

    /// Creates the user and seeds an empty profile row for the counters.
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, role) VALUES (?1, ?2, ?3, ?4)",
                (id, username, password_hash, role.as_str()),
            )?;
            conn.execute("INSERT INTO profiles (user_id) VALUES (?1)", [id])?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn user_role(&self, id: Uuid) -> Result<Option<Role>, StoreError> {
        self.with_conn(|conn| {
            let role: Option<String> = conn
                .query_row(
                    "SELECT role FROM users WHERE id = ?1",
                    [id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            match role {
                Some(r) => Ok(Some(parse_enum_col(0, r)?)),
                None => Ok(None),
            }
        })
    }

    // -- Profiles --

    pub fn get_profile(&self, user_id: &str) -> Result<Option<ProfileRow>, StoreError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT user_id, follower_count, following_count, friend_count
                     FROM profiles WHERE user_id = ?1",
                    [user_id],
                    |row| {
                        Ok(ProfileRow {
                            user_id: row.get(0)?,
                            follower_count: row.get(1)?,
                            following_count: row.get(2)?,
                            friend_count: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Bump a single counter, floored at zero. Missing profile rows are a
    /// no-op; the periodic recount heals them.
    pub(crate) fn adjust_counter(
        &self,
        user_id: &str,
        field: CounterField,
        delta: i64,
    ) -> Result<(), StoreError> {
        let col = field.column();
        self.with_conn_mut(|conn| {
            conn.execute(
                &format!("UPDATE profiles SET {col} = MAX(0, {col} + ?1) WHERE user_id = ?2"),
                rusqlite::params![delta, user_id],
            )?;
            Ok(())
        })
    }

    /// Recompute friend_count for one user from the connections table.
    pub(crate) fn recount_friend_count(&self, user_id: &str) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            upsert_counts(conn, user_id)?;
            Ok(())
        })
    }

    /// Recompute all three counters for every user. Returns the number of
    /// users reconciled. Counters drift when a crash lands between a
    /// connection write and its counter write; this heals them.
    pub fn recount_profiles(&self) -> Result<usize, StoreError> {
        self.with_conn_mut(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM users")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            for id in &ids {
                upsert_counts(conn, id)?;
            }
            Ok(ids.len())
        })
    }
}

fn query_user(conn: &Connection, field: &str, value: &str) -> Result<Option<UserRow>, StoreError> {
    let row = conn
        .query_row(
            &format!("SELECT id, username, password, role, created_at FROM users WHERE {field} = ?1"),
            [value],
            map_user_row,
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn map_user_row(row: &rusqlite::Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        role: parse_enum_col(3, row.get::<_, String>(3)?)?,
        created_at: row.get(4)?,
    })
}

fn upsert_counts(conn: &Connection, user_id: &str) -> rusqlite::Result<()> {
    let friends: i64 = conn.query_row(
        "SELECT COUNT(*) FROM connections
         WHERE (initiator_id = ?1 OR recipient_id = ?1)
           AND status = 'accepted' AND connection_type != 'follow'",
        [user_id],
        |row| row.get(0),
    )?;
    let followers: i64 = conn.query_row(
        "SELECT COUNT(*) FROM connections
         WHERE recipient_id = ?1 AND status = 'accepted' AND is_following = 1",
        [user_id],
        |row| row.get(0),
    )?;
    let following: i64 = conn.query_row(
        "SELECT COUNT(*) FROM connections
         WHERE initiator_id = ?1 AND status = 'accepted' AND is_following = 1",
        [user_id],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT INTO profiles (user_id, follower_count, following_count, friend_count)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
             follower_count = excluded.follower_count,
             following_count = excluded.following_count,
             friend_count = excluded.friend_count",
        rusqlite::params![user_id, followers, following, friends],
    )?;
    Ok(())
}
