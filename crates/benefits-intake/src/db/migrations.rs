//! Versioned schema for the tracking database.
//!
//! Applied versions are listed in `_migrations`. Each pending migration runs
//! in its own transaction together with its ledger row, so a crash never
//! leaves a half-applied version behind.

use rusqlite::{params, Connection};

use super::error::DatabaseError;

/// What a migration does to the schema.
enum Change {
    Sql(&'static str),
    /// `ALTER TABLE .. ADD COLUMN`, which SQLite cannot make conditional.
    /// Skipped when the column is already there.
    AddColumn {
        table: &'static str,
        column: &'static str,
        sql: &'static str,
    },
}

struct Migration {
    version: u32,
    name: &'static str,
    change: Change,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "saved_claims",
        change: Change::Sql(include_str!("sql/001_create_saved_claims.sql")),
    },
    Migration {
        version: 2,
        name: "form_submissions",
        change: Change::Sql(include_str!("sql/002_create_form_submissions.sql")),
    },
    Migration {
        version: 3,
        name: "job_statuses",
        change: Change::Sql(include_str!("sql/003_create_job_statuses.sql")),
    },
    Migration {
        version: 4,
        name: "attempt_upload_provider",
        change: Change::AddColumn {
            table: "form_submission_attempts",
            column: "upload_provider",
            sql: include_str!("sql/004_add_upload_provider_to_attempts.sql"),
        },
    },
];

/// Highest applied version, 0 for an empty database.
pub fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}

/// Brings the schema up to the latest version.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = schema_version(conn)?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        apply(conn, migration)?;
    }
    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let failed = |e: rusqlite::Error| DatabaseError::Migration {
        version: migration.version,
        reason: e.to_string(),
    };

    let tx = conn.unchecked_transaction().map_err(failed)?;
    match &migration.change {
        Change::Sql(sql) => {
            log::info!("Applying schema v{} ({})", migration.version, migration.name);
            tx.execute_batch(sql).map_err(failed)?;
        }
        Change::AddColumn { table, column, sql } => {
            if has_column(&tx, table, column)? {
                log::info!(
                    "Schema v{} ({}): {}.{} already present",
                    migration.version,
                    migration.name,
                    table,
                    column
                );
            } else {
                log::info!("Applying schema v{} ({})", migration.version, migration.name);
                tx.execute_batch(sql).map_err(failed)?;
            }
        }
    }
    tx.execute(
        "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
        params![migration.version, migration.name],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    // PRAGMA arguments cannot be bound, so the name is checked instead.
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("refusing table name '{}'", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name == column))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        conn
    }

    fn latest() -> u32 {
        MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
    }

    #[test]
    fn test_fresh_database_reaches_latest_version() {
        let conn = fresh();
        run_all(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), latest());
        assert!(has_column(&conn, "form_submission_attempts", "upload_provider").unwrap());
    }

    #[test]
    fn test_second_run_applies_nothing() {
        let conn = fresh();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        let rows: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows as usize, MIGRATIONS.len());
    }

    #[test]
    fn test_existing_column_is_not_added_twice() {
        let conn = fresh();
        conn.execute_batch(include_str!("sql/001_create_saved_claims.sql"))
            .unwrap();
        conn.execute_batch(include_str!("sql/002_create_form_submissions.sql"))
            .unwrap();
        conn.execute_batch(include_str!("sql/004_add_upload_provider_to_attempts.sql"))
            .unwrap();

        run_all(&conn).unwrap();

        assert_eq!(schema_version(&conn).unwrap(), latest());
    }

    #[test]
    fn test_resumes_from_recorded_version() {
        let conn = fresh();
        conn.execute_batch(
            "CREATE TABLE _migrations (version INTEGER PRIMARY KEY, name TEXT NOT NULL,
             applied_at TEXT NOT NULL DEFAULT (datetime('now')));",
        )
        .unwrap();
        apply(&conn, &MIGRATIONS[0]).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 1);

        run_all(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), latest());
    }

    #[test]
    fn test_has_column_rejects_odd_table_names() {
        let conn = fresh();
        assert!(has_column(&conn, "saved_claims; DROP TABLE x", "id").is_err());
        assert!(has_column(&conn, "", "id").is_err());
    }
}
