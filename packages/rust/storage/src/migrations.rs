//! SQL migration definitions for the rowpipe record store.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: records keyed by (id, timestamp)",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Canonical records. One row per insert; the pipeline never overwrites.
CREATE TABLE IF NOT EXISTS records (
    id                TEXT    NOT NULL,
    timestamp         INTEGER NOT NULL,
    name              TEXT    NOT NULL,
    category          TEXT    NOT NULL,
    price             REAL    NOT NULL DEFAULT 0,
    stock             INTEGER NOT NULL DEFAULT 0,
    source            TEXT    NOT NULL CHECK (source IN ('file', 'api')),
    source_detail     TEXT    NOT NULL,
    processed_at      TEXT    NOT NULL,
    processor_version TEXT    NOT NULL,
    PRIMARY KEY (id, timestamp)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Tooling updates: updated_at column and source index",
            sql: r#"
ALTER TABLE records ADD COLUMN updated_at TEXT;

CREATE INDEX IF NOT EXISTS idx_records_source ON records(source, source_detail);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
