//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order. `ADD COLUMN` migrations are skipped when the
//! column already exists so databases created by older builds upgrade
//! cleanly.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    kind: MigrationKind,
}

enum MigrationKind {
    /// Execute the SQL directly.
    Standard,
    /// ALTER TABLE ADD COLUMN, skipped if the column already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_users_table",
        sql: include_str!("sql/001_create_users.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 2,
        description: "create_loops_table",
        sql: include_str!("sql/002_create_loops.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 3,
        description: "add_images_to_loops",
        sql: include_str!("sql/003_add_loop_images.sql"),
        kind: MigrationKind::AddColumn {
            table: "loops",
            column: "images",
        },
    },
    Migration {
        version: 4,
        description: "create_document_templates_table",
        sql: include_str!("sql/004_create_document_templates.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 5,
        description: "create_activity_logs_table",
        sql: include_str!("sql/005_create_activity_logs.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 6,
        description: "create_indices",
        sql: include_str!("sql/006_create_indices.sql"),
        kind: MigrationKind::Standard,
    },
];

/// Applies every migration newer than the recorded schema version. Each
/// migration and its `_migrations` row commit together.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        apply(conn, migration)?;
    }

    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let failed = |e: rusqlite::Error| DatabaseError::Migration {
        version: migration.version,
        reason: e.to_string(),
    };

    let needed = match &migration.kind {
        MigrationKind::Standard => true,
        MigrationKind::AddColumn { table, column } => !column_exists(conn, table, column)?,
    };

    let tx = conn.unchecked_transaction().map_err(failed)?;
    if needed {
        log::info!("Applying schema v{} ({})", migration.version, migration.description);
        tx.execute_batch(migration.sql).map_err(failed)?;
    } else {
        log::info!(
            "Schema v{} ({}) already present, recording only",
            migration.version,
            migration.description
        );
    }
    tx.execute(
        "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
        rusqlite::params![migration.version, migration.description],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}

/// Checks whether a column exists on a table using `PRAGMA table_info`.
fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("Invalid table name: {}", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .any(|r| r.map(|name| name == column).unwrap_or(false));
    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = fresh();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = fresh();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_column_exists_check() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE test_tbl (id TEXT, name TEXT);")
            .unwrap();

        assert!(column_exists(&conn, "test_tbl", "id").unwrap());
        assert!(column_exists(&conn, "test_tbl", "name").unwrap());
        assert!(!column_exists(&conn, "test_tbl", "missing").unwrap());
    }

    #[test]
    fn test_column_exists_rejects_bad_identifier() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(column_exists(&conn, "loops; DROP TABLE users", "id").is_err());
    }

    #[test]
    fn test_loops_table_has_images_column() {
        let conn = fresh();
        run_all(&conn).unwrap();
        assert!(column_exists(&conn, "loops", "images").unwrap());
    }

    #[test]
    fn test_images_column_skipped_when_present() {
        // A database created before versioned migrations already has the column.
        let conn = fresh();
        conn.execute_batch(
            "CREATE TABLE loops (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                property_address TEXT NOT NULL,
                end_date TEXT,
                archived INTEGER NOT NULL DEFAULT 0,
                creator_id INTEGER,
                images TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .unwrap();
        run_all(&conn).unwrap();
        assert!(column_exists(&conn, "loops", "images").unwrap());
    }

    #[test]
    fn test_template_creator_nulled_on_user_delete() {
        let conn = fresh();
        run_all(&conn).unwrap();
        conn.execute(
            "INSERT INTO users (id, name, role, created_at, updated_at) VALUES (7, 'Ada', 'admin', 'x', 'x')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO document_templates (name, category, stored_file, file_name, file_type, created_by, created_at, updated_at)
             VALUES ('T', 'contract', 'a.pdf', 'a.pdf', 'pdf', 7, 'x', 'x')",
            [],
        )
        .unwrap();
        conn.execute("DELETE FROM users WHERE id = 7", []).unwrap();

        let created_by: Option<i64> = conn
            .query_row("SELECT created_by FROM document_templates", [], |r| r.get(0))
            .unwrap();
        assert_eq!(created_by, None);
    }
}
