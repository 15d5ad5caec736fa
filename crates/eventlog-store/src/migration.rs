//! Versioned schema migrations for the event tables.
//!
//! Each migration is a static SQL script keyed by a version number. The
//! applied versions are tracked in a `_migrations` table, so running the
//! whole list again only applies what is missing.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

struct Migration {
    version: u32,
    description: &'static str,
    /// May hold several `;`-separated statements.
    sql: &'static str,
}

/// All migrations in order. Append new ones at the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "initial event schema: event_type, trait_type, event and trait tables",
        sql: r#"
            CREATE TABLE event_type (
                id     INTEGER PRIMARY KEY AUTOINCREMENT,
                "desc" TEXT NOT NULL UNIQUE
            );

            CREATE TABLE trait_type (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                "desc"    TEXT NOT NULL,
                data_type INTEGER NOT NULL CHECK(data_type IN (1, 2, 3, 4)),
                CONSTRAINT tt_unique UNIQUE ("desc", data_type)
            );

            CREATE TABLE event (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id    TEXT NOT NULL UNIQUE,
                generated     INTEGER NOT NULL,
                event_type_id INTEGER NOT NULL,
                CONSTRAINT fk_event_type_id FOREIGN KEY (event_type_id) REFERENCES event_type(id)
            );
            CREATE INDEX ix_event_generated ON event(generated);

            CREATE TABLE trait (
                event_id      INTEGER NOT NULL,
                trait_type_id INTEGER NOT NULL,
                t_string      TEXT,
                t_int         INTEGER,
                t_float       REAL,
                t_datetime    INTEGER,
                CONSTRAINT fk_trait_type_id FOREIGN KEY (trait_type_id) REFERENCES trait_type(id),
                CONSTRAINT trait_ibfk_2 FOREIGN KEY (event_id) REFERENCES event(id)
            );
            CREATE INDEX ix_trait_t_int ON trait(t_int);
            CREATE INDEX ix_trait_t_string ON trait(t_string);
            CREATE INDEX ix_trait_t_datetime ON trait(t_datetime);
            CREATE INDEX ix_trait_t_float ON trait(t_float);
        "#,
    },
    Migration {
        version: 2,
        description: "index performance changes: foreign-key column indexes replace per-value trait indexes",
        // SQLite cannot drop a foreign key in place; rebuilding `trait`
        // drops and recreates both of its constraints under the same names.
        sql: r#"
            DROP INDEX ix_trait_t_int;
            DROP INDEX ix_trait_t_string;
            DROP INDEX ix_trait_t_datetime;
            DROP INDEX ix_trait_t_float;

            CREATE TABLE trait_rebuild (
                event_id      INTEGER NOT NULL,
                trait_type_id INTEGER NOT NULL,
                t_string      TEXT,
                t_int         INTEGER,
                t_float       REAL,
                t_datetime    INTEGER,
                CONSTRAINT fk_trait_type_id FOREIGN KEY (trait_type_id) REFERENCES trait_type(id),
                CONSTRAINT trait_ibfk_2 FOREIGN KEY (event_id) REFERENCES event(id),
                CHECK ((t_string IS NOT NULL) + (t_int IS NOT NULL)
                     + (t_float IS NOT NULL) + (t_datetime IS NOT NULL) = 1)
            );
            INSERT INTO trait_rebuild (event_id, trait_type_id, t_string, t_int, t_float, t_datetime)
                SELECT event_id, trait_type_id, t_string, t_int, t_float, t_datetime FROM trait;
            DROP TABLE trait;
            ALTER TABLE trait_rebuild RENAME TO trait;

            CREATE INDEX ix_trait_trait_type ON trait(trait_type_id);
            CREATE INDEX ix_trait_event ON trait(event_id);
            CREATE INDEX ix_trait_type_desc ON trait_type("desc");
            CREATE INDEX ix_trait_type_data_type ON trait_type(data_type);
            CREATE INDEX ix_event_type_desc ON event_type("desc");
        "#,
    },
];

// ── public API ───────────────────────────────────────────────────────

/// Run all pending migrations against `conn`.
///
/// Synchronous; call it through `Database::execute` or `spawn_blocking`.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    ensure_migrations_table(conn)?;

    let current = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        debug!(current_version = current, "event schema is up to date");
        return Ok(());
    }

    info!(
        current_version = current,
        pending = pending.len(),
        "running pending migrations"
    );

    for migration in pending {
        apply(conn, migration)?;
    }

    info!(
        new_version = latest_version(),
        "all migrations applied"
    );
    Ok(())
}

/// Return the latest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to read current version: {e}"),
    })
}

/// The version the schema reaches once every migration has run.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

// ── internals ────────────────────────────────────────────────────────

fn ensure_migrations_table(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        );",
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to create _migrations table: {e}"),
    })
}

/// Apply one migration inside an immediate transaction.
fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    info!(
        version = migration.version,
        description = migration.description,
        "applying migration"
    );

    // `conn.transaction()` needs `&mut Connection`; drive it by hand.
    conn.execute_batch("BEGIN IMMEDIATE;")
        .map_err(|e| StoreError::Migration {
            version: migration.version,
            message: format!("failed to begin transaction: {e}"),
        })?;

    let result = (|| -> StoreResult<()> {
        conn.execute_batch(migration.sql)
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                message: format!("SQL execution failed: {e}"),
            })?;

        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![migration.version, migration.description, now],
        )
        .map_err(|e| StoreError::Migration {
            version: migration.version,
            message: format!("failed to record migration: {e}"),
        })?;

        Ok(())
    })();

    match &result {
        Ok(()) => {
            conn.execute_batch("COMMIT;")
                .map_err(|e| StoreError::Migration {
                    version: migration.version,
                    message: format!("failed to commit: {e}"),
                })?;
            info!(version = migration.version, "migration applied");
        }
        Err(err) => {
            warn!(version = migration.version, %err, "migration failed, rolling back");
            let _ = conn.execute_batch("ROLLBACK;");
        }
    }

    result
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        conn
    }

    fn index_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'ix_%' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[1].version > window[0].version,
                "migration versions must be strictly increasing: {} >= {}",
                window[0].version,
                window[1].version,
            );
        }
    }

    const LATEST_VERSION: u32 = 2;

    #[test]
    fn run_all_on_fresh_db() {
        let conn = setup_conn();
        run_all(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), LATEST_VERSION);
        assert_eq!(latest_version(), LATEST_VERSION);
    }

    #[test]
    fn run_all_is_idempotent() {
        let conn = setup_conn();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), LATEST_VERSION);
    }

    #[test]
    fn legacy_value_indexes_are_replaced() {
        let conn = setup_conn();
        run_all(&conn).unwrap();

        let indexes = index_names(&conn);
        for legacy in [
            "ix_trait_t_int",
            "ix_trait_t_string",
            "ix_trait_t_datetime",
            "ix_trait_t_float",
        ] {
            assert!(!indexes.contains(&legacy.to_string()), "{legacy} still present");
        }
        for wanted in [
            "ix_trait_trait_type",
            "ix_trait_event",
            "ix_trait_type_desc",
            "ix_trait_type_data_type",
            "ix_event_type_desc",
        ] {
            assert!(indexes.contains(&wanted.to_string()), "{wanted} missing");
        }
    }

    #[test]
    fn rebuilt_trait_table_keeps_named_foreign_keys() {
        let conn = setup_conn();
        run_all(&conn).unwrap();

        let sql: String = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'trait'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(sql.contains("trait_ibfk_2"));
        assert!(sql.contains("fk_trait_type_id"));

        let fk_count: i64 = conn
            .query_row("SELECT count(*) FROM pragma_foreign_key_list('trait')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk_count, 2);
    }

    #[test]
    fn v2_preserves_existing_traits() {
        let conn = setup_conn();
        ensure_migrations_table(&conn).unwrap();
        apply(&conn, &MIGRATIONS[0]).unwrap();

        conn.execute_batch(
            "INSERT INTO event_type (\"desc\") VALUES ('compute.instance.create');
             INSERT INTO trait_type (\"desc\", data_type) VALUES ('host', 1);
             INSERT INTO event (message_id, generated, event_type_id) VALUES ('m1', 0, 1);
             INSERT INTO trait (event_id, trait_type_id, t_string) VALUES (1, 1, 'node-1');",
        )
        .unwrap();

        run_all(&conn).unwrap();

        let host: String = conn
            .query_row("SELECT t_string FROM trait WHERE event_id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(host, "node-1");
    }

    #[test]
    fn trait_rows_must_carry_exactly_one_value() {
        let conn = setup_conn();
        run_all(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO event_type (\"desc\") VALUES ('e');
             INSERT INTO trait_type (\"desc\", data_type) VALUES ('t', 2);
             INSERT INTO event (message_id, generated, event_type_id) VALUES ('m', 0, 1);",
        )
        .unwrap();

        let two_values = conn.execute(
            "INSERT INTO trait (event_id, trait_type_id, t_string, t_int) VALUES (1, 1, 'x', 5)",
            [],
        );
        assert!(two_values.is_err());

        let no_value = conn.execute("INSERT INTO trait (event_id, trait_type_id) VALUES (1, 1)", []);
        assert!(no_value.is_err());

        conn.execute("INSERT INTO trait (event_id, trait_type_id, t_int) VALUES (1, 1, 5)", [])
            .unwrap();
    }

    #[test]
    fn trait_type_pairs_are_unique() {
        let conn = setup_conn();
        run_all(&conn).unwrap();

        conn.execute("INSERT INTO trait_type (\"desc\", data_type) VALUES ('foo', 1)", [])
            .unwrap();
        conn.execute("INSERT INTO trait_type (\"desc\", data_type) VALUES ('foo', 2)", [])
            .unwrap();
        let dup = conn.execute("INSERT INTO trait_type (\"desc\", data_type) VALUES ('foo', 1)", []);
        assert!(matches!(dup, Err(ref e) if crate::error::is_unique_violation(e)));
    }
}
