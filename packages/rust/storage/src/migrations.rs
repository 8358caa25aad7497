//! SQL migration definitions for the Lorebook database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.
//!
//! The `champions` column names are read verbatim by the publication builder;
//! do not rename them.

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
        description: "Initial schema: champions, harvest_runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Harvested champions, one row per (champion, lang), insert-only
CREATE TABLE IF NOT EXISTS champions (
    champion          TEXT NOT NULL,
    name              TEXT NOT NULL,
    lang              TEXT NOT NULL,
    story             TEXT NOT NULL,
    bio               TEXT NOT NULL,
    race              TEXT NOT NULL,
    title             TEXT NOT NULL,
    role              TEXT NOT NULL,
    region            TEXT NOT NULL,
    quote             TEXT NOT NULL,
    short_bio         TEXT NOT NULL,
    related_champions TEXT NOT NULL,
    UNIQUE(champion, lang)
);

CREATE INDEX IF NOT EXISTS idx_champions_lang ON champions(lang);

-- Harvest run history
CREATE TABLE IF NOT EXISTS harvest_runs (
    id             TEXT PRIMARY KEY,
    started_at     TEXT NOT NULL,
    finished_at    TEXT,
    previous_count INTEGER NOT NULL,
    stats_json     TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
