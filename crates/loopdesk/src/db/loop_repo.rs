//! Loop repository: CRUD and aggregate queries for the `loops` table.
//!
//! Mutations return affected-row counts; a zero count means the id did
//! not exist and callers turn that into a not-found result.

use chrono::NaiveDate;
use rusqlite::{params, Row};

use super::{format_date, Database, DatabaseError};
use crate::loops::{LoopFields, LoopQuery, LoopStats, LoopStatus};

const SELECT_LOOP: &str = "SELECT l.id, l.type, l.sale, l.status, l.property_address,
        l.client_name, l.client_email, l.client_phone, l.notes, l.tags,
        l.start_date, l.end_date, l.images, l.archived, l.creator_id,
        u.name AS creator_name, l.created_at, l.updated_at
    FROM loops l
    LEFT JOIN users u ON u.id = l.creator_id";

/// A raw loop row from the database.
#[derive(Debug, Clone)]
pub struct LoopRow {
    pub id: i64,
    pub loop_type: String,
    pub sale: Option<f64>,
    pub status: String,
    pub property_address: String,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub images: Option<String>,
    pub archived: bool,
    pub creator_id: Option<i64>,
    pub creator_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl LoopRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            loop_type: row.get("type")?,
            sale: row.get("sale")?,
            status: row.get("status")?,
            property_address: row.get("property_address")?,
            client_name: row.get("client_name")?,
            client_email: row.get("client_email")?,
            client_phone: row.get("client_phone")?,
            notes: row.get("notes")?,
            tags: row.get("tags")?,
            start_date: row.get("start_date")?,
            end_date: row.get("end_date")?,
            images: row.get("images")?,
            archived: row.get("archived")?,
            creator_id: row.get("creator_id")?,
            creator_name: row.get("creator_name")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a loop and returns its new id.
pub fn insert(
    db: &Database,
    fields: &LoopFields,
    creator_id: i64,
    now: &str,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO loops (type, sale, status, property_address, client_name, client_email,
             client_phone, notes, tags, start_date, end_date, archived, creator_id,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12, ?13, ?13)",
            params![
                fields.loop_type,
                fields.sale,
                fields.status.as_str(),
                fields.property_address,
                fields.client_name,
                fields.client_email,
                fields.client_phone,
                fields.notes,
                fields.tags,
                fields.start_date.map(format_date),
                fields.end_date.map(format_date),
                creator_id,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Overwrites every editable column. Returns the affected count.
pub fn update(
    db: &Database,
    id: i64,
    fields: &LoopFields,
    now: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE loops SET type=?2, sale=?3, status=?4, property_address=?5, client_name=?6,
             client_email=?7, client_phone=?8, notes=?9, tags=?10, start_date=?11,
             end_date=?12, updated_at=?13
             WHERE id=?1",
            params![
                id,
                fields.loop_type,
                fields.sale,
                fields.status.as_str(),
                fields.property_address,
                fields.client_name,
                fields.client_email,
                fields.client_phone,
                fields.notes,
                fields.tags,
                fields.start_date.map(format_date),
                fields.end_date.map(format_date),
                now,
            ],
        )?;
        Ok(affected)
    })
}

pub fn set_archived(
    db: &Database,
    id: i64,
    archived: bool,
    now: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.execute(
            "UPDATE loops SET archived = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, archived, now],
        )?)
    })
}

/// Replaces the image manifest column (`None` stores NULL).
pub fn set_images(
    db: &Database,
    id: i64,
    images: Option<&str>,
    now: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.execute(
            "UPDATE loops SET images = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, images, now],
        )?)
    })
}

pub fn delete(db: &Database, id: i64) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| Ok(conn.execute("DELETE FROM loops WHERE id = ?1", params![id])?))
}

/// Finds a loop by id, joined with the creator's display name.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<LoopRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!("{} WHERE l.id = ?1", SELECT_LOOP))?;
        let mut rows = stmt.query_map(params![id], LoopRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Runs a listing query.
pub fn query(db: &Database, query: &LoopQuery) -> Result<Vec<LoopRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = vec!["l.archived = ?1".to_string()];
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(query.archived)];

        if let Some(ref status) = query.status {
            conditions.push(format!("l.status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.as_str().to_string()));
        }
        if let Some(ref loop_type) = query.loop_type {
            conditions.push(format!("l.type = ?{}", param_values.len() + 1));
            param_values.push(Box::new(loop_type.clone()));
        }
        if let Some(creator_id) = query.creator_id {
            conditions.push(format!("l.creator_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(creator_id));
        }
        if let Some(pattern) = query.search_pattern() {
            let n = param_values.len() + 1;
            conditions.push(format!(
                "(l.property_address LIKE ?{n} ESCAPE '\\' OR l.client_name LIKE ?{n} ESCAPE '\\' OR l.tags LIKE ?{n} ESCAPE '\\')"
            ));
            param_values.push(Box::new(pattern));
        }

        let mut sql = format!(
            "{} WHERE {} {}",
            SELECT_LOOP,
            conditions.join(" AND "),
            query.order_clause()
        );
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT ?{}", param_values.len() + 1));
            param_values.push(Box::new(limit));
        }

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), LoopRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Non-archived loops with an end date in `[from, to]` and an open status,
/// soonest first.
pub fn closing_between(
    db: &Database,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<LoopRow>, DatabaseError> {
    let [open_a, open_b] = LoopStatus::OPEN;
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE l.archived = 0
               AND l.end_date IS NOT NULL
               AND l.end_date BETWEEN ?1 AND ?2
               AND l.status IN (?3, ?4)
             ORDER BY l.end_date ASC, l.id ASC",
            SELECT_LOOP
        ))?;
        let rows = stmt
            .query_map(
                params![
                    format_date(from),
                    format_date(to),
                    open_a.as_str(),
                    open_b.as_str()
                ],
                LoopRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Aggregates over non-archived loops.
pub fn stats(db: &Database) -> Result<LoopStats, DatabaseError> {
    db.with_conn(|conn| {
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status = ?1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = ?2 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = ?3 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(sale), 0.0)
             FROM loops WHERE archived = 0",
            params![
                LoopStatus::PreOffer.as_str(),
                LoopStatus::UnderContract.as_str(),
                LoopStatus::Sold.as_str(),
            ],
            |r| {
                Ok(LoopStats {
                    total: r.get(0)?,
                    active: r.get(1)?,
                    closing: r.get(2)?,
                    closed: r.get(3)?,
                    total_sales: r.get(4)?,
                })
            },
        )?;
        Ok(stats)
    })
}

/// Rewrites legacy status values (`active`, `closing`, ...) to their
/// canonical names. Returns the number of rows touched.
pub fn normalize_legacy_statuses(db: &Database) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let mut total = 0;
        for (legacy, canonical) in [
            ("active", LoopStatus::PreOffer),
            ("closing", LoopStatus::UnderContract),
            ("closed", LoopStatus::Sold),
            ("cancelled", LoopStatus::Terminated),
        ] {
            total += conn.execute(
                "UPDATE loops SET status = ?2 WHERE status = ?1",
                params![legacy, canonical.as_str()],
            )?;
        }
        Ok(total)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loops::{SortField, SortOrder, StatusFilter};

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn fields(address: &str) -> LoopFields {
        LoopFields {
            loop_type: "Purchase".to_string(),
            property_address: address.to_string(),
            ..Default::default()
        }
    }

    const NOW: &str = "2026-03-01T10:00:00.000000Z";

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let mut f = fields("123 Main St");
        f.sale = Some(350000.0);
        f.start_date = NaiveDate::from_ymd_opt(2026, 3, 1);
        let id = insert(&db, &f, 4, NOW).unwrap();

        let row = find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(row.loop_type, "Purchase");
        assert_eq!(row.property_address, "123 Main St");
        assert_eq!(row.sale, Some(350000.0));
        assert_eq!(row.status, "pre-offer");
        assert_eq!(row.start_date.as_deref(), Some("2026-03-01"));
        assert_eq!(row.images, None);
        assert!(!row.archived);
        assert_eq!(row.creator_id, Some(4));
        assert_eq!(row.creator_name, None);
    }

    #[test]
    fn test_find_joins_creator_name() {
        let db = test_db();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, role, created_at, updated_at) VALUES (4, 'Dana Agent', 'agent', ?1, ?1)",
                params![NOW],
            )?;
            Ok(())
        })
        .unwrap();
        let id = insert(&db, &fields("1 Elm"), 4, NOW).unwrap();
        let row = find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(row.creator_name.as_deref(), Some("Dana Agent"));
    }

    #[test]
    fn test_missing_ids_yield_zero_affected() {
        let db = test_db();
        assert!(find_by_id(&db, 99).unwrap().is_none());
        assert_eq!(update(&db, 99, &fields("x"), NOW).unwrap(), 0);
        assert_eq!(set_archived(&db, 99, true, NOW).unwrap(), 0);
        assert_eq!(set_images(&db, 99, None, NOW).unwrap(), 0);
        assert_eq!(delete(&db, 99).unwrap(), 0);
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let db = test_db();
        let first = insert(&db, &fields("a"), 1, NOW).unwrap();
        assert_eq!(delete(&db, first).unwrap(), 1);
        let second = insert(&db, &fields("b"), 1, NOW).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_query_excludes_archived_by_default() {
        let db = test_db();
        let live = insert(&db, &fields("live"), 1, NOW).unwrap();
        let gone = insert(&db, &fields("gone"), 1, NOW).unwrap();
        set_archived(&db, gone, true, NOW).unwrap();

        let rows = query(&db, &LoopQuery::default()).unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![live]);

        let archived = query(
            &db,
            &LoopQuery {
                archived: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(archived.iter().map(|r| r.id).collect::<Vec<_>>(), vec![gone]);
    }

    #[test]
    fn test_query_search_is_case_insensitive_across_columns() {
        let db = test_db();
        let by_address = insert(&db, &fields("42 Ocean Drive"), 1, NOW).unwrap();
        let mut f = fields("9 Pine");
        f.client_name = Some("Oceanic Holdings".to_string());
        let by_client = insert(&db, &f, 1, NOW).unwrap();
        let mut f = fields("10 Pine");
        f.tags = Some("waterfront,ocean-view".to_string());
        let by_tag = insert(&db, &f, 1, NOW).unwrap();
        insert(&db, &fields("1 Desert Rd"), 1, NOW).unwrap();

        let q = LoopQuery {
            search: Some("OCEAN".to_string()),
            sort: SortField::CreatedAt,
            order: SortOrder::Asc,
            ..Default::default()
        };
        let ids: Vec<_> = query(&db, &q).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![by_address, by_client, by_tag]);
    }

    #[test]
    fn test_query_search_treats_wildcards_literally() {
        let db = test_db();
        insert(&db, &fields("100 Main St"), 1, NOW).unwrap();
        let discounted = insert(&db, &fields("Unit 5_B, 100% financed"), 1, NOW).unwrap();

        let q = LoopQuery {
            search: Some("%".to_string()),
            ..Default::default()
        };
        let ids: Vec<_> = query(&db, &q).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![discounted]);

        let q = LoopQuery {
            search: Some("5_b".to_string()),
            ..Default::default()
        };
        assert_eq!(query(&db, &q).unwrap().len(), 1);
    }

    #[test]
    fn test_query_filters_sort_and_limit() {
        let db = test_db();
        let mut cheap = fields("a");
        cheap.sale = Some(100.0);
        cheap.status = LoopStatus::Sold;
        let cheap_id = insert(&db, &cheap, 1, NOW).unwrap();
        let mut pricey = fields("b");
        pricey.sale = Some(900.0);
        pricey.status = LoopStatus::Sold;
        let pricey_id = insert(&db, &pricey, 2, NOW).unwrap();
        let mut other = fields("c");
        other.loop_type = "Listing".to_string();
        insert(&db, &other, 1, NOW).unwrap();

        let q = LoopQuery {
            status: Some(StatusFilter::Is(LoopStatus::Sold)),
            sort: SortField::Sale,
            order: SortOrder::Desc,
            ..Default::default()
        };
        let ids: Vec<_> = query(&db, &q).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![pricey_id, cheap_id]);

        let q = LoopQuery {
            limit: Some(1),
            ..q
        };
        assert_eq!(query(&db, &q).unwrap().len(), 1);

        let q = LoopQuery {
            loop_type: Some("Listing".to_string()),
            ..Default::default()
        };
        assert_eq!(query(&db, &q).unwrap().len(), 1);

        let q = LoopQuery::default().owned_by(2);
        let ids: Vec<_> = query(&db, &q).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![pricey_id]);
    }

    #[test]
    fn test_closing_between() {
        let db = test_db();
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let in_window = |days: i64| Some(today + chrono::Duration::days(days));

        let mut soon = fields("soon");
        soon.end_date = in_window(2);
        let soon_id = insert(&db, &soon, 1, NOW).unwrap();

        let mut today_loop = fields("today");
        today_loop.end_date = in_window(0);
        today_loop.status = LoopStatus::UnderContract;
        let today_id = insert(&db, &today_loop, 1, NOW).unwrap();

        let mut later = fields("later");
        later.end_date = in_window(4);
        insert(&db, &later, 1, NOW).unwrap();

        let mut sold = fields("sold");
        sold.end_date = in_window(1);
        sold.status = LoopStatus::Sold;
        insert(&db, &sold, 1, NOW).unwrap();

        let mut archived = fields("archived");
        archived.end_date = in_window(1);
        let archived_id = insert(&db, &archived, 1, NOW).unwrap();
        set_archived(&db, archived_id, true, NOW).unwrap();

        insert(&db, &fields("no end date"), 1, NOW).unwrap();

        let ids: Vec<_> = closing_between(&db, today, today + chrono::Duration::days(3))
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![today_id, soon_id]);
    }

    #[test]
    fn test_stats_ignore_archived() {
        let db = test_db();
        let mut a = fields("a");
        a.sale = Some(100.0);
        insert(&db, &a, 1, NOW).unwrap();
        let mut b = fields("b");
        b.sale = Some(250.5);
        b.status = LoopStatus::UnderContract;
        insert(&db, &b, 1, NOW).unwrap();
        let mut c = fields("c");
        c.status = LoopStatus::Sold;
        insert(&db, &c, 1, NOW).unwrap();
        let mut d = fields("d");
        d.sale = Some(1000.0);
        let d_id = insert(&db, &d, 1, NOW).unwrap();
        set_archived(&db, d_id, true, NOW).unwrap();

        let stats = stats(&db).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.closing, 1);
        assert_eq!(stats.closed, 1);
        assert!((stats.total_sales - 350.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stats_empty() {
        let stats = stats(&test_db()).unwrap();
        assert_eq!(stats, LoopStats::default());
    }

    #[test]
    fn test_normalize_legacy_statuses() {
        let db = test_db();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO loops (type, status, property_address, created_at, updated_at)
                 VALUES ('Purchase', 'active', 'x', ?1, ?1), ('Purchase', 'closed', 'y', ?1, ?1)",
                params![NOW],
            )?;
            Ok(())
        })
        .unwrap();
        assert_eq!(normalize_legacy_statuses(&db).unwrap(), 2);
        let s = stats(&db).unwrap();
        assert_eq!((s.active, s.closed), (1, 1));
    }
}
