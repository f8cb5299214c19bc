//! Template repository: CRUD for the `document_templates` table.
//!
//! The mapping set lives in one JSON column and is always replaced whole.
//! Deleting a row never touches the stored file; that is the caller's job.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};
use crate::templates::{TemplateCategory, TemplateStats};

const SELECT_TEMPLATE: &str = "SELECT t.id, t.name, t.description, t.category, t.stored_file,
        t.file_name, t.file_type, t.file_size, t.fields_mapped, t.field_mappings,
        t.created_by, u.name AS created_by_name, t.created_at, t.updated_at
    FROM document_templates t
    LEFT JOIN users u ON u.id = t.created_by";

/// A raw template row from the database.
#[derive(Debug, Clone)]
pub struct TemplateRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub stored_file: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub fields_mapped: bool,
    pub field_mappings: Option<String>,
    pub created_by: Option<i64>,
    pub created_by_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TemplateRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            category: row.get("category")?,
            stored_file: row.get("stored_file")?,
            file_name: row.get("file_name")?,
            file_type: row.get("file_type")?,
            file_size: row.get("file_size")?,
            fields_mapped: row.get("fields_mapped")?,
            field_mappings: row.get("field_mappings")?,
            created_by: row.get("created_by")?,
            created_by_name: row.get("created_by_name")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Values for a new template row.
#[derive(Debug, Clone)]
pub struct NewTemplateRow<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub category: TemplateCategory,
    pub stored_file: &'a str,
    pub file_name: &'a str,
    pub file_type: &'a str,
    pub file_size: i64,
    pub created_by: Option<i64>,
}

pub fn insert(db: &Database, row: &NewTemplateRow<'_>, now: &str) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO document_templates (name, description, category, stored_file, file_name,
             file_type, file_size, fields_mapped, field_mappings, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, NULL, ?8, ?9, ?9)",
            params![
                row.name,
                row.description,
                row.category.as_str(),
                row.stored_file,
                row.file_name,
                row.file_type,
                row.file_size,
                row.created_by,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<TemplateRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!("{} WHERE t.id = ?1", SELECT_TEMPLATE))?;
        let mut rows = stmt.query_map(params![id], TemplateRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// All templates, newest first.
pub fn list_all(db: &Database) -> Result<Vec<TemplateRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY t.created_at DESC, t.id DESC",
            SELECT_TEMPLATE
        ))?;
        let rows = stmt
            .query_map([], TemplateRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn list_by_category(
    db: &Database,
    category: TemplateCategory,
) -> Result<Vec<TemplateRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE t.category = ?1 ORDER BY t.created_at DESC, t.id DESC",
            SELECT_TEMPLATE
        ))?;
        let rows = stmt
            .query_map(params![category.as_str()], TemplateRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Replaces the mapping set and stamps the update time.
pub fn update_field_mappings(
    db: &Database,
    id: i64,
    mappings_json: &str,
    fields_mapped: bool,
    now: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.execute(
            "UPDATE document_templates SET field_mappings = ?2, fields_mapped = ?3, updated_at = ?4
             WHERE id = ?1",
            params![id, mappings_json, fields_mapped, now],
        )?)
    })
}

pub fn update_info(
    db: &Database,
    id: i64,
    name: &str,
    description: Option<&str>,
    category: TemplateCategory,
    now: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.execute(
            "UPDATE document_templates SET name = ?2, description = ?3, category = ?4, updated_at = ?5
             WHERE id = ?1",
            params![id, name, description, category.as_str(), now],
        )?)
    })
}

pub fn delete(db: &Database, id: i64) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.execute(
            "DELETE FROM document_templates WHERE id = ?1",
            params![id],
        )?)
    })
}

pub fn stats(db: &Database) -> Result<TemplateStats, DatabaseError> {
    db.with_conn(|conn| {
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN fields_mapped = 1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN category = 'contract' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN category = 'listing' THEN 1 ELSE 0 END), 0)
             FROM document_templates",
            [],
            |r| {
                Ok(TemplateStats {
                    total: r.get(0)?,
                    mapped: r.get(1)?,
                    contracts: r.get(2)?,
                    listings: r.get(3)?,
                })
            },
        )?;
        Ok(stats)
    })
}
