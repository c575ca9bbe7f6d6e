//! SQL DDL for the catalog and account tables.
//! SQLite-first; statements are applied one by one at startup.

/// - `data_servers.name` UNIQUE, the natural lookup key
/// - `primary_keys` / `keywords` JSON arrays serialized as text
/// - timestamps RFC3339 text
/// - `users.username` UNIQUE, compared case-insensitively
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS data_servers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    routine TEXT NOT NULL DEFAULT '',
    primary_keys TEXT NOT NULL DEFAULT '[]', -- JSON array
    description TEXT NOT NULL DEFAULT '',
    get_example TEXT NOT NULL DEFAULT '{}',
    post_example TEXT NOT NULL DEFAULT '{}',
    requires_filter INTEGER NOT NULL DEFAULT 0,
    filter_format TEXT NULL,
    keywords TEXT NOT NULL DEFAULT '[]', -- JSON array
    common_errors TEXT NULL,
    consumption_tips TEXT NULL,
    filter_tips TEXT NULL,
    usage_examples TEXT NULL,
    notes TEXT NULL,
    last_documentation_update TEXT NULL, -- RFC3339
    documentation_author TEXT NULL
);

CREATE INDEX IF NOT EXISTS idx_data_servers_routine ON data_servers(routine);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE COLLATE NOCASE,
    base_url TEXT NOT NULL DEFAULT '',
    is_admin INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL -- RFC3339
);
"#;
