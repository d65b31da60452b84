//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS leads (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            addresses TEXT NOT NULL DEFAULT '{}',
            course_id TEXT,
            funnel_id TEXT,
            funnel_stage_id TEXT,
            last_contact_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_leads_last_contact ON leads(last_contact_at);

        CREATE TABLE IF NOT EXISTS dialing_rules (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            channel TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            simultaneous_channels INTEGER NOT NULL DEFAULT 1,
            start_date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_date TEXT,
            end_time TEXT NOT NULL,
            max_attempts_per_lead INTEGER NOT NULL,
            time_between_calls_secs INTEGER NOT NULL DEFAULT 0,
            redial_intervals TEXT NOT NULL DEFAULT '{}',
            segmentation TEXT,
            channel_plan TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_dialing_rules_enabled ON dialing_rules(enabled);

        CREATE TABLE IF NOT EXISTS reengagement_rules (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            preferred_channel TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            active INTEGER NOT NULL DEFAULT 1,
            trigger_after_secs INTEGER NOT NULL,
            template_ref TEXT NOT NULL DEFAULT '',
            segmentation TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS segment_catalog (
            kind TEXT NOT NULL,
            id TEXT NOT NULL,
            PRIMARY KEY (kind, id)
        );

        CREATE TABLE IF NOT EXISTS attempts (
            id TEXT PRIMARY KEY,
            token TEXT NOT NULL UNIQUE,
            lead_id TEXT NOT NULL,
            rule_id TEXT NOT NULL,
            channel TEXT NOT NULL,
            attempted_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'in-flight',
            sequence INTEGER NOT NULL,
            finalized_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_attempts_lead ON attempts(lead_id);
        CREATE INDEX IF NOT EXISTS idx_attempts_pair ON attempts(lead_id, channel);
        CREATE INDEX IF NOT EXISTS idx_attempts_status ON attempts(status);
    "#,
}];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    Ok(())
}

/// The highest applied migration version (0 = fresh database).
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0)),
        _ => Ok(0),
    }
}

/// Record a migration as applied.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
