//! Embedded schema migrations for the aggregation store.
//!
//! Migrations are plain SQL files compiled in with `include_str!`, keyed by
//! version number and recorded in `schema_version` as they run. The baseline
//! uses CREATE TABLE IF NOT EXISTS throughout, so it is a no-op against a
//! store where the upstream enrichment stage already created `messages` and
//! `extractions`.

use rusqlite::Connection;

const MIGRATIONS: &[(i32, &str)] = &[(1, include_str!("migrations/001_baseline.sql"))];

/// Apply every migration newer than the store's recorded version and return
/// how many ran. A store whose version is ahead of this binary is refused.
pub fn run_migrations(conn: &Connection) -> Result<usize, String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("Could not create schema_version table: {e}"))?;

    let applied = applied_version(conn)?;
    let newest = MIGRATIONS.last().map(|(v, _)| *v).unwrap_or(0);
    if applied > newest {
        return Err(format!(
            "Store schema is at version {applied} but this build of coalesce only \
             knows version {newest}; upgrade coalesce before opening this store."
        ));
    }

    let pending = MIGRATIONS.iter().filter(|(v, _)| *v > applied).count();
    if pending == 0 {
        return Ok(0);
    }

    snapshot_store(conn)?;

    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > applied) {
        conn.execute_batch(sql)
            .map_err(|e| format!("Migration {version} failed: {e}"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [*version],
        )
        .map_err(|e| format!("Could not record migration {version}: {e}"))?;
        log::info!("Applied schema migration {version}");
    }

    Ok(pending)
}

/// Highest recorded migration version, 0 for a fresh store.
fn applied_version(conn: &Connection) -> Result<i32, String> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| format!("Could not read schema version: {e}"))
}

/// Hot-copy the store to `<path>.pre-migration.bak` through SQLite's online
/// backup API. Runs once per upgrade, before the first pending migration;
/// in-memory stores have nothing to snapshot.
fn snapshot_store(conn: &Connection) -> Result<(), String> {
    let store_path: String = conn
        .query_row("PRAGMA database_list", [], |row| row.get(2))
        .map_err(|e| format!("Could not resolve store path: {e}"))?;
    if store_path.is_empty() || store_path == ":memory:" {
        return Ok(());
    }

    let snapshot_path = format!("{store_path}.pre-migration.bak");
    let mut target = Connection::open(&snapshot_path)
        .map_err(|e| format!("Could not open snapshot file {snapshot_path}: {e}"))?;
    rusqlite::backup::Backup::new(conn, &mut target)
        .and_then(|backup| backup.step(-1))
        .map_err(|e| format!("Pre-migration snapshot failed: {e}"))?;

    log::info!("Pre-migration snapshot written to {snapshot_path}");
    Ok(())
}
