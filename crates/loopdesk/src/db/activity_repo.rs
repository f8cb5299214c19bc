//! Activity log repository. Rows are append-only.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw activity row joined with the actor's directory entry.
#[derive(Debug, Clone)]
pub struct ActivityRow {
    pub id: i64,
    pub user_id: i64,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub user_role: Option<String>,
    pub action_type: String,
    pub description: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub additional_data: Option<String>,
    pub created_at: String,
}

impl ActivityRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            user_name: row.get("user_name")?,
            user_email: row.get("user_email")?,
            user_role: row.get("user_role")?,
            action_type: row.get("action_type")?,
            description: row.get("description")?,
            ip_address: row.get("ip_address")?,
            user_agent: row.get("user_agent")?,
            additional_data: row.get("additional_data")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Values for a new activity row.
#[derive(Debug, Clone)]
pub struct NewActivityRow<'a> {
    pub user_id: i64,
    pub action_type: &'a str,
    pub description: &'a str,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub additional_data: Option<&'a str>,
    pub created_at: &'a str,
}

/// Query filter parameters for activity listing.
///
/// `from_date`/`to_date` are inclusive `YYYY-MM-DD` bounds.
#[derive(Debug, Default, Clone)]
pub struct ActivityFilter {
    pub user_id: Option<i64>,
    pub action_type: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub search: Option<String>,
    pub limit: Option<u32>,
}

/// Activity counters.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ActivityCounts {
    pub total: u64,
    pub today: u64,
    pub week: u64,
    pub logins: u64,
    pub loops_created: u64,
    pub loops_updated: u64,
}

pub fn insert(db: &Database, row: &NewActivityRow<'_>) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO activity_logs (user_id, action_type, description, ip_address, user_agent,
             additional_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.user_id,
                row.action_type,
                row.description,
                row.ip_address,
                row.user_agent,
                row.additional_data,
                row.created_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Newest-first listing.
pub fn query(db: &Database, filter: &ActivityFilter) -> Result<Vec<ActivityRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(user_id) = filter.user_id {
            conditions.push(format!("a.user_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(user_id));
        }
        if let Some(ref action_type) = filter.action_type {
            conditions.push(format!("a.action_type = ?{}", param_values.len() + 1));
            param_values.push(Box::new(action_type.clone()));
        }
        if let Some(ref from_date) = filter.from_date {
            conditions.push(format!(
                "substr(a.created_at, 1, 10) >= ?{}",
                param_values.len() + 1
            ));
            param_values.push(Box::new(from_date.clone()));
        }
        if let Some(ref to_date) = filter.to_date {
            conditions.push(format!(
                "substr(a.created_at, 1, 10) <= ?{}",
                param_values.len() + 1
            ));
            param_values.push(Box::new(to_date.clone()));
        }
        if let Some(ref search) = filter.search {
            let n = param_values.len() + 1;
            conditions.push(format!(
                "(a.description LIKE ?{n} OR u.name LIKE ?{n} OR u.email LIKE ?{n})"
            ));
            param_values.push(Box::new(format!("%{}%", search)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let mut sql = format!(
            "SELECT a.*, u.name AS user_name, u.email AS user_email, u.role AS user_role
             FROM activity_logs a
             LEFT JOIN users u ON u.id = a.user_id
             {}
             ORDER BY a.created_at DESC, a.id DESC",
            where_clause
        );
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT ?{}", param_values.len() + 1));
            param_values.push(Box::new(limit));
        }

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), ActivityRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counters relative to `today` and `week_start` (both `YYYY-MM-DD`).
pub fn counts(
    db: &Database,
    today: &str,
    week_start: &str,
) -> Result<ActivityCounts, DatabaseError> {
    db.with_conn(|conn| {
        let counts = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN substr(created_at, 1, 10) = ?1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN substr(created_at, 1, 10) >= ?2 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN action_type = 'LOGIN' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN action_type = 'LOOP_CREATED' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN action_type = 'LOOP_UPDATED' THEN 1 ELSE 0 END), 0)
             FROM activity_logs",
            params![today, week_start],
            |r| {
                Ok(ActivityCounts {
                    total: r.get(0)?,
                    today: r.get(1)?,
                    week: r.get(2)?,
                    logins: r.get(3)?,
                    loops_created: r.get(4)?,
                    loops_updated: r.get(5)?,
                })
            },
        )?;
        Ok(counts)
    })
}

/// Deletes every row. Returns the number cleared.
pub fn clear_all(db: &Database) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| Ok(conn.execute("DELETE FROM activity_logs", [])?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn entry<'a>(user_id: i64, action: &'a str, desc: &'a str, at: &'a str) -> NewActivityRow<'a> {
        NewActivityRow {
            user_id,
            action_type: action,
            description: desc,
            ip_address: Some("10.0.0.1"),
            user_agent: None,
            additional_data: None,
            created_at: at,
        }
    }

    #[test]
    fn test_insert_and_query_newest_first() {
        let db = test_db();
        let first = insert(&db, &entry(1, "LOGIN", "Signed in", "2026-03-01T08:00:00.000000Z")).unwrap();
        let second =
            insert(&db, &entry(1, "LOOP_CREATED", "Created loop #1", "2026-03-02T08:00:00.000000Z"))
                .unwrap();

        let rows = query(&db, &ActivityFilter::default()).unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![second, first]);
        assert_eq!(rows[1].ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(rows[0].user_name, None);
    }

    #[test]
    fn test_query_filters() {
        let db = test_db();
        insert(&db, &entry(1, "LOGIN", "Signed in", "2026-03-01T08:00:00.000000Z")).unwrap();
        insert(&db, &entry(2, "LOOP_CREATED", "Created loop #7", "2026-03-02T08:00:00.000000Z")).unwrap();
        insert(&db, &entry(2, "LOOP_UPDATED", "Updated loop #7", "2026-03-03T08:00:00.000000Z")).unwrap();

        let by_user = query(
            &db,
            &ActivityFilter {
                user_id: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_user.len(), 2);

        let by_action = query(
            &db,
            &ActivityFilter {
                action_type: Some("LOGIN".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_action.len(), 1);

        let by_range = query(
            &db,
            &ActivityFilter {
                from_date: Some("2026-03-02".to_string()),
                to_date: Some("2026-03-02".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_range.len(), 1);
        assert_eq!(by_range[0].action_type, "LOOP_CREATED");

        let by_search = query(
            &db,
            &ActivityFilter {
                search: Some("loop #7".to_string()),
                limit: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_search.len(), 1);
        assert_eq!(by_search[0].action_type, "LOOP_UPDATED");
    }

    #[test]
    fn test_counts_and_clear() {
        let db = test_db();
        insert(&db, &entry(1, "LOGIN", "a", "2026-02-01T08:00:00.000000Z")).unwrap();
        insert(&db, &entry(1, "LOOP_CREATED", "b", "2026-03-05T08:00:00.000000Z")).unwrap();
        insert(&db, &entry(1, "LOOP_UPDATED", "c", "2026-03-08T08:00:00.000000Z")).unwrap();
        insert(&db, &entry(1, "LOOP_UPDATED", "d", "2026-03-08T09:00:00.000000Z")).unwrap();

        let c = counts(&db, "2026-03-08", "2026-03-01").unwrap();
        assert_eq!(
            c,
            ActivityCounts {
                total: 4,
                today: 2,
                week: 3,
                logins: 1,
                loops_created: 1,
                loops_updated: 2,
            }
        );

        assert_eq!(clear_all(&db).unwrap(), 4);
        assert_eq!(counts(&db, "2026-03-08", "2026-03-01").unwrap().total, 0);
    }
}
