//! SQLite schema for the embedded graph backend.
//!
//! Two tables:
//! - `entities`: one row per entity, the full snapshot as JSON plus the
//!   columns candidate scans filter on (layer, confidence)
//! - `terminology`: vocabulary rows served by the `terminology` query

use rusqlite::Connection;

use strata_core::error::StrataResult;

use super::sync::db_error;

/// SQL for the entities table.
pub const CREATE_ENTITIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    layer TEXT NOT NULL,
    confidence REAL NOT NULL,
    snapshot TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)
"#;

/// Index for promotion candidate scans.
pub const CREATE_ENTITIES_LAYER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_entities_layer_confidence ON entities(layer, confidence DESC)
"#;

/// SQL for the terminology table. `name` is stored lowercased.
pub const CREATE_TERMINOLOGY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS terminology (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    coding_system TEXT NOT NULL,
    code TEXT NOT NULL,
    display_name TEXT NOT NULL,
    UNIQUE(name, coding_system, code)
)
"#;

/// Index for terminology lookups by name.
pub const CREATE_TERMINOLOGY_NAME_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_terminology_name ON terminology(name)
"#;

/// Initialize the schema. Idempotent.
pub fn init_schema(conn: &Connection) -> StrataResult<()> {
    for statement in [
        CREATE_ENTITIES_TABLE,
        CREATE_ENTITIES_LAYER_INDEX,
        CREATE_TERMINOLOGY_TABLE,
        CREATE_TERMINOLOGY_NAME_INDEX,
    ] {
        conn.execute(statement, []).map_err(db_error)?;
    }
    Ok(())
}
