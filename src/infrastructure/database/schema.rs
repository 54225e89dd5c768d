//! SQLite schema for the catalog database
//!
//! The full-text index is a standalone FTS5 table with no `content=`
//! linkage and no triggers: the asset store performs matching delete+insert
//! operations inline with every mutation. Trigger-based content-linked
//! indexing corrupted under concurrent writers in the system this replaces,
//! so index maintenance stays explicit and transactional.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS assets (
    id TEXT PRIMARY KEY,
    root_path TEXT NOT NULL,
    path TEXT NOT NULL,
    kind TEXT NOT NULL DEFAULT 'other',
    status TEXT NOT NULL DEFAULT 'unsorted',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    thumbnail_path TEXT,
    UNIQUE(root_path, path)
);

CREATE INDEX IF NOT EXISTS idx_assets_root ON assets(root_path);

CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    color TEXT
);

CREATE TABLE IF NOT EXISTS asset_tags (
    asset_id TEXT NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
    tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (asset_id, tag_id)
);

-- Audit trail. No foreign key on asset_id: history outlives the asset.
CREATE TABLE IF NOT EXISTS history (
    id TEXT PRIMARY KEY,
    asset_id TEXT NOT NULL,
    action TEXT NOT NULL,
    field TEXT,
    old_value TEXT,
    new_value TEXT,
    timestamp INTEGER NOT NULL,
    user_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_history_asset ON history(asset_id);

CREATE VIRTUAL TABLE IF NOT EXISTS assets_fts USING fts5(
    asset_id UNINDEXED,
    path,
    metadata
);
"#;
