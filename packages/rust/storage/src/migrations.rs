//! SQL migration definitions for the TicketDesk archive index.
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
    vec![Migration {
        version: 1,
        description: "Initial schema: documents, FTS5 index",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Archived complaint documents
CREATE TABLE IF NOT EXISTS documents (
    id            TEXT PRIMARY KEY,
    content       TEXT NOT NULL,
    metadata_json TEXT,
    created_at    TEXT NOT NULL
);

-- Full-text index used for similarity search
CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
    content,
    content=documents,
    content_rowid=rowid,
    tokenize='porter unicode61'
);

-- Triggers to keep FTS in sync with documents table
CREATE TRIGGER IF NOT EXISTS documents_fts_insert AFTER INSERT ON documents BEGIN
    INSERT INTO documents_fts(rowid, content)
    VALUES (new.rowid, new.content);
END;

CREATE TRIGGER IF NOT EXISTS documents_fts_delete AFTER DELETE ON documents BEGIN
    INSERT INTO documents_fts(documents_fts, rowid, content)
    VALUES ('delete', old.rowid, old.content);
END;

CREATE TRIGGER IF NOT EXISTS documents_fts_update AFTER UPDATE ON documents BEGIN
    INSERT INTO documents_fts(documents_fts, rowid, content)
    VALUES ('delete', old.rowid, old.content);
    INSERT INTO documents_fts(rowid, content)
    VALUES (new.rowid, new.content);
END;

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
