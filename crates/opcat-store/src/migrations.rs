//! Schema migrations
//!
//! Migrations are identified by a monotonic integer and expose `up`/`down`
//! over a transaction. Applied ids live in the `schema_migrations`
//! housekeeping table; on open, every pending `up` replays in its own
//! transaction. A file whose newest applied id is unknown to this build
//! refuses to open read-write.

use rusqlite::{Connection, Transaction};

use crate::error::{Result, StoreError};

pub struct Migration {
    pub id: i64,
    pub name: &'static str,
    pub up: fn(&Transaction<'_>) -> rusqlite::Result<()>,
    pub down: fn(&Transaction<'_>) -> rusqlite::Result<()>,
}

/// All migrations this build knows, ascending by id.
pub fn registry() -> &'static [Migration] {
    &MIGRATIONS
}

/// Newest migration id this build can produce.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.id).unwrap_or(0)
}

/// Newest applied id recorded in the file, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<i64> {
    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations')",
        [],
        |row| row.get(0),
    )?;
    if !table_exists {
        return Ok(0);
    }
    let version: Option<i64> =
        conn.query_row("SELECT MAX(id) FROM schema_migrations", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

/// Apply every pending migration up to `target` (default: latest).
pub fn migrate_up(conn: &mut Connection, target: Option<i64>) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (id INTEGER PRIMARY KEY)",
        [],
    )?;
    let current = current_version(conn)?;
    if current > latest_version() {
        return Err(StoreError::Incompatible(format!(
            "schema version {current} is newer than this build supports ({})",
            latest_version()
        )));
    }
    let target = target.unwrap_or_else(latest_version);
    for migration in MIGRATIONS.iter().filter(|m| m.id > current && m.id <= target) {
        tracing::debug!(id = migration.id, name = migration.name, "applying migration");
        let tx = conn.transaction()?;
        (migration.up)(&tx)?;
        tx.execute("INSERT INTO schema_migrations (id) VALUES (?1)", [migration.id])?;
        tx.commit()?;
    }
    Ok(())
}

/// Replay `down` migrations, newest first, until `target` is the newest
/// applied id.
pub fn migrate_down(conn: &mut Connection, target: i64) -> Result<()> {
    let applied: Vec<i64> = {
        let mut stmt =
            conn.prepare("SELECT id FROM schema_migrations WHERE id > ?1 ORDER BY id DESC")?;
        let rows = stmt.query_map([target], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };
    for id in applied {
        let Some(migration) = MIGRATIONS.iter().find(|m| m.id == id) else {
            return Err(StoreError::UnknownMigration(id));
        };
        tracing::debug!(id = migration.id, name = migration.name, "reverting migration");
        let tx = conn.transaction()?;
        (migration.down)(&tx)?;
        tx.execute("DELETE FROM schema_migrations WHERE id = ?1", [id])?;
        tx.commit()?;
    }
    Ok(())
}

static MIGRATIONS: [Migration; 5] = [
    Migration {
        id: 1,
        name: "initial schema",
        up: initial_up,
        down: initial_down,
    },
    Migration {
        id: 2,
        name: "properties table",
        up: properties_up,
        down: properties_down,
    },
    Migration {
        id: 3,
        name: "substitutesfor column",
        up: substitutesfor_up,
        down: substitutesfor_down,
    },
    Migration {
        id: 4,
        name: "deprecated table",
        up: deprecated_up,
        down: deprecated_down,
    },
    Migration {
        id: 5,
        name: "bundle digest column",
        up: digest_up,
        down: digest_down,
    },
];

fn initial_up(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        r#"
        CREATE TABLE operatorbundle (
            name TEXT PRIMARY KEY,
            csv TEXT,
            bundle TEXT,
            bundlepath TEXT,
            version TEXT,
            skiprange TEXT,
            replaces TEXT,
            skips TEXT
        );

        CREATE TABLE package (
            name TEXT PRIMARY KEY,
            default_channel TEXT,
            description TEXT
        );

        CREATE TABLE channel (
            name TEXT NOT NULL,
            package_name TEXT NOT NULL REFERENCES package(name) ON DELETE CASCADE,
            head_operatorbundle_name TEXT NOT NULL,
            PRIMARY KEY (name, package_name)
        );

        CREATE TABLE channel_entry (
            entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
            channel_name TEXT NOT NULL,
            package_name TEXT NOT NULL,
            operatorbundle_name TEXT NOT NULL
                REFERENCES operatorbundle(name) ON DELETE CASCADE,
            replaces INTEGER REFERENCES channel_entry(entry_id) ON DELETE SET NULL,
            depth INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (channel_name, package_name)
                REFERENCES channel(name, package_name) ON DELETE CASCADE
        );

        CREATE TABLE api (
            group_name TEXT NOT NULL,
            version TEXT NOT NULL,
            kind TEXT NOT NULL,
            plural TEXT,
            PRIMARY KEY (group_name, version, kind)
        );

        CREATE TABLE api_provider (
            group_name TEXT NOT NULL,
            version TEXT NOT NULL,
            kind TEXT NOT NULL,
            operatorbundle_name TEXT NOT NULL
                REFERENCES operatorbundle(name) ON DELETE CASCADE,
            operatorbundle_version TEXT,
            operatorbundle_path TEXT
        );

        CREATE TABLE api_requirer (
            group_name TEXT NOT NULL,
            version TEXT NOT NULL,
            kind TEXT NOT NULL,
            operatorbundle_name TEXT NOT NULL
                REFERENCES operatorbundle(name) ON DELETE CASCADE,
            operatorbundle_version TEXT,
            operatorbundle_path TEXT
        );

        CREATE TABLE dependencies (
            type TEXT,
            value TEXT,
            operatorbundle_name TEXT NOT NULL
                REFERENCES operatorbundle(name) ON DELETE CASCADE,
            operatorbundle_version TEXT,
            operatorbundle_path TEXT
        );

        CREATE TABLE related_image (
            image TEXT NOT NULL,
            operatorbundle_name TEXT NOT NULL
                REFERENCES operatorbundle(name) ON DELETE CASCADE
        );

        CREATE INDEX idx_channel_entry_lookup
            ON channel_entry(channel_name, package_name, depth);
        CREATE INDEX idx_channel_entry_bundle
            ON channel_entry(operatorbundle_name);
        CREATE INDEX idx_api_provider_api
            ON api_provider(group_name, version, kind);
        CREATE INDEX idx_api_requirer_api
            ON api_requirer(group_name, version, kind);

        -- interned API rows are garbage collected with their last referrer
        CREATE TRIGGER api_gc_on_provider_delete AFTER DELETE ON api_provider
        WHEN NOT EXISTS (
                SELECT 1 FROM api_provider
                WHERE group_name = old.group_name AND version = old.version AND kind = old.kind)
            AND NOT EXISTS (
                SELECT 1 FROM api_requirer
                WHERE group_name = old.group_name AND version = old.version AND kind = old.kind)
        BEGIN
            DELETE FROM api
            WHERE group_name = old.group_name AND version = old.version AND kind = old.kind;
        END;

        CREATE TRIGGER api_gc_on_requirer_delete AFTER DELETE ON api_requirer
        WHEN NOT EXISTS (
                SELECT 1 FROM api_provider
                WHERE group_name = old.group_name AND version = old.version AND kind = old.kind)
            AND NOT EXISTS (
                SELECT 1 FROM api_requirer
                WHERE group_name = old.group_name AND version = old.version AND kind = old.kind)
        BEGIN
            DELETE FROM api
            WHERE group_name = old.group_name AND version = old.version AND kind = old.kind;
        END;
        "#,
    )
}

fn initial_down(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        r#"
        DROP TRIGGER IF EXISTS api_gc_on_requirer_delete;
        DROP TRIGGER IF EXISTS api_gc_on_provider_delete;
        DROP TABLE IF EXISTS related_image;
        DROP TABLE IF EXISTS dependencies;
        DROP TABLE IF EXISTS api_requirer;
        DROP TABLE IF EXISTS api_provider;
        DROP TABLE IF EXISTS api;
        DROP TABLE IF EXISTS channel_entry;
        DROP TABLE IF EXISTS channel;
        DROP TABLE IF EXISTS package;
        DROP TABLE IF EXISTS operatorbundle;
        "#,
    )
}

fn properties_up(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        r#"
        CREATE TABLE properties (
            type TEXT,
            value TEXT,
            operatorbundle_name TEXT NOT NULL
                REFERENCES operatorbundle(name) ON DELETE CASCADE,
            operatorbundle_version TEXT,
            operatorbundle_path TEXT
        );
        CREATE INDEX idx_properties_bundle ON properties(operatorbundle_name);
        "#,
    )
}

fn properties_down(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch("DROP TABLE IF EXISTS properties;")
}

fn substitutesfor_up(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch("ALTER TABLE operatorbundle ADD COLUMN substitutesfor TEXT DEFAULT '';")
}

fn substitutesfor_down(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch("ALTER TABLE operatorbundle DROP COLUMN substitutesfor;")
}

fn deprecated_up(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    // deliberately no foreign key: a tombstone outlives its bundle
    tx.execute_batch(
        "CREATE TABLE deprecated (operatorbundle_name TEXT PRIMARY KEY);",
    )
}

fn deprecated_down(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch("DROP TABLE IF EXISTS deprecated;")
}

fn digest_up(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch("ALTER TABLE operatorbundle ADD COLUMN digest TEXT DEFAULT '';")
}

fn digest_down(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch("ALTER TABLE operatorbundle DROP COLUMN digest;")
}
