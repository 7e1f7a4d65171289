/// SQL DDL for the rolesync database.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS role_delays (
    guild_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('deletion', 'addition')),
    role_id TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    PRIMARY KEY (guild_id, user_id, kind, role_id)
);

CREATE TABLE IF NOT EXISTS guild_settings (
    guild_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (guild_id, key)
);

CREATE TABLE IF NOT EXISTS linked_accounts (
    tag TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    verified INTEGER NOT NULL DEFAULT 0,
    sort_order INTEGER NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_role_delays_expiry ON role_delays(expires_at);
CREATE INDEX IF NOT EXISTS idx_guild_settings_key ON guild_settings(key);
CREATE INDEX IF NOT EXISTS idx_linked_accounts_user ON linked_accounts(user_id, sort_order);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
