//! Database migrations.
//!
//! Schema migration definitions for the storage layer, applied additively
//! on open via `execute_batch`.

/// Migration definitions, applied in order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: root entries, nodes, tags",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Obsolete access-reset: zero out access_count on already-obsolete roots",
        up: MIGRATION_V2_UP,
    },
];

/// A single database migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS roots (
    id TEXT PRIMARY KEY,
    prefix TEXT NOT NULL,
    seq INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    level_1 TEXT NOT NULL,
    title TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT,
    links TEXT NOT NULL DEFAULT '[]',
    min_role TEXT NOT NULL DEFAULT 'worker',
    obsolete INTEGER NOT NULL DEFAULT 0,
    favorite INTEGER NOT NULL DEFAULT 0,
    irrelevant INTEGER NOT NULL DEFAULT 0,
    pinned INTEGER NOT NULL DEFAULT 0,
    UNIQUE(prefix, seq)
);

CREATE INDEX IF NOT EXISTS idx_roots_prefix ON roots(prefix);
CREATE INDEX IF NOT EXISTS idx_roots_created ON roots(created_at);
CREATE INDEX IF NOT EXISTS idx_roots_obsolete ON roots(obsolete);
CREATE INDEX IF NOT EXISTS idx_roots_min_role ON roots(min_role);

CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    parent_id TEXT NOT NULL,
    root_id TEXT NOT NULL REFERENCES roots(id) ON DELETE CASCADE,
    depth INTEGER NOT NULL,
    seq INTEGER NOT NULL,
    content TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT,
    favorite INTEGER NOT NULL DEFAULT 0,
    irrelevant INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_nodes_root ON nodes(root_id);
CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id);
CREATE INDEX IF NOT EXISTS idx_nodes_created ON nodes(created_at);

CREATE TABLE IF NOT EXISTS tags (
    owner_id TEXT NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (owner_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags(tag);
CREATE INDEX IF NOT EXISTS idx_tags_owner ON tags(owner_id);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// One-shot: zero out `access_count` on all already-obsolete root entries,
/// undoing older behaviour where obsolete entries kept their prior count.
const MIGRATION_V2_UP: &str = r#"
UPDATE roots SET access_count = 0 WHERE obsolete = 1;

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply every migration with `version > current_version`, in order.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "applying migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}
