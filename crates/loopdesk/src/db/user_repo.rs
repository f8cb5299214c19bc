//! User directory: the minimal slice of user data the core needs
//! (display names, roles, notification preferences).

use rusqlite::{params, Row};

use super::{Database, DatabaseError};
use crate::actor::Actor;

/// A raw user row from the database.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub role: String,
    pub notify_on_new_loops: bool,
    pub notify_on_updated_loops: bool,
    pub last_active_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            role: row.get("role")?,
            notify_on_new_loops: row.get("notify_on_new_loops")?,
            notify_on_updated_loops: row.get("notify_on_updated_loops")?,
            last_active_at: row.get("last_active_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Which loop notification an admin subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    NewLoops,
    UpdatedLoops,
}

impl Subscription {
    fn column(&self) -> &'static str {
        match self {
            Subscription::NewLoops => "notify_on_new_loops",
            Subscription::UpdatedLoops => "notify_on_updated_loops",
        }
    }
}

/// Records an authenticated identity. Name and role follow the identity
/// provider; a `None` email keeps the stored address. Notification flags
/// are never touched here.
pub fn upsert(
    db: &Database,
    id: i64,
    name: &str,
    role: &str,
    email: Option<&str>,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO users (id, name, email, role, last_active_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                role = excluded.role,
                email = COALESCE(excluded.email, users.email),
                last_active_at = excluded.last_active_at,
                updated_at = excluded.updated_at",
            params![id, name, email, role, now],
        )?;
        Ok(())
    })
}

/// Makes sure the acting user has a directory row so joins and foreign
/// keys resolve. Keeps any stored email.
pub fn remember(db: &Database, actor: &Actor, now: &str) -> Result<(), DatabaseError> {
    upsert(db, actor.id, &actor.name, actor.role.as_str(), None, now)
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<UserRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM users WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], UserRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Deletes a user. Templates they uploaded keep working with a NULL creator.
pub fn delete(db: &Database, id: i64) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", params![id])?))
}

pub fn set_notification_preferences(
    db: &Database,
    id: i64,
    notify_on_new_loops: bool,
    notify_on_updated_loops: bool,
    now: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.execute(
            "UPDATE users SET notify_on_new_loops = ?2, notify_on_updated_loops = ?3, updated_at = ?4
             WHERE id = ?1",
            params![id, notify_on_new_loops, notify_on_updated_loops, now],
        )?)
    })
}

/// Admins with an email address who opted into the given notification.
pub fn subscribed_admins(
    db: &Database,
    subscription: Subscription,
) -> Result<Vec<UserRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM users
             WHERE role = 'admin' AND {} = 1 AND email IS NOT NULL AND email != ''
             ORDER BY id",
            subscription.column()
        ))?;
        let rows = stmt
            .query_map([], UserRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
