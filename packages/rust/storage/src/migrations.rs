//! SQL migration definitions for the local document database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

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
            description: "Initial schema: documents with integer revisions",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Entries and leaves share one keyspace, like the remote store
CREATE TABLE IF NOT EXISTS documents (
    id         TEXT PRIMARY KEY,
    rev        INTEGER NOT NULL,
    kind       TEXT NOT NULL,
    body       TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Index documents by kind",
            sql: r#"
CREATE INDEX IF NOT EXISTS idx_documents_kind ON documents(kind);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
