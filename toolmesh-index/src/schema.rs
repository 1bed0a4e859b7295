//! Schema bootstrap. Every statement is `IF NOT EXISTS`/idempotent so
//! opening an older store is a no-op migration, per SPEC_FULL §6
//! ("migrations are additive and idempotent").

use sqlx::SqlitePool;

use crate::error::IndexResult;

const CREATE_TOOLS: &str = r#"
CREATE TABLE IF NOT EXISTS tools (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    input_schema TEXT NOT NULL,
    server_key TEXT NOT NULL,
    schema_hash TEXT NOT NULL,
    embedding BLOB,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(name, server_key)
)
"#;

const CREATE_TOOLS_NAME_IDX: &str = "CREATE INDEX IF NOT EXISTS idx_tools_name ON tools(name)";
const CREATE_TOOLS_SERVER_IDX: &str =
    "CREATE INDEX IF NOT EXISTS idx_tools_server_key ON tools(server_key)";

const CREATE_TOOLS_FTS: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS tools_fts USING fts5(
    name,
    description,
    content='tools',
    content_rowid='id'
)
"#;

const CREATE_FTS_INSERT_TRIGGER: &str = r#"
CREATE TRIGGER IF NOT EXISTS tools_ai AFTER INSERT ON tools BEGIN
    INSERT INTO tools_fts(rowid, name, description) VALUES (new.id, new.name, new.description);
END
"#;

const CREATE_FTS_DELETE_TRIGGER: &str = r#"
CREATE TRIGGER IF NOT EXISTS tools_ad AFTER DELETE ON tools BEGIN
    INSERT INTO tools_fts(tools_fts, rowid, name, description)
    VALUES ('delete', old.id, old.name, old.description);
END
"#;

const CREATE_FTS_UPDATE_TRIGGER: &str = r#"
CREATE TRIGGER IF NOT EXISTS tools_au AFTER UPDATE ON tools BEGIN
    INSERT INTO tools_fts(tools_fts, rowid, name, description)
    VALUES ('delete', old.id, old.name, old.description);
    INSERT INTO tools_fts(rowid, name, description) VALUES (new.id, new.name, new.description);
END
"#;

const CREATE_COOCCURRENCES: &str = r#"
CREATE TABLE IF NOT EXISTS tool_cooccurrences (
    tool1_key TEXT NOT NULL,
    tool2_key TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    last_used_at TEXT NOT NULL,
    PRIMARY KEY (tool1_key, tool2_key)
)
"#;

const CREATE_COOCCURRENCE_IDX: &str =
    "CREATE INDEX IF NOT EXISTS idx_cooc_tool1 ON tool_cooccurrences(tool1_key)";

pub async fn ensure_schema(pool: &SqlitePool) -> IndexResult<()> {
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;
    sqlx::query("PRAGMA foreign_keys=ON").execute(pool).await?;

    for stmt in [
        CREATE_TOOLS,
        CREATE_TOOLS_NAME_IDX,
        CREATE_TOOLS_SERVER_IDX,
        CREATE_TOOLS_FTS,
        CREATE_FTS_INSERT_TRIGGER,
        CREATE_FTS_DELETE_TRIGGER,
        CREATE_FTS_UPDATE_TRIGGER,
        CREATE_COOCCURRENCES,
        CREATE_COOCCURRENCE_IDX,
    ] {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}
