//! Row mapping between entity snapshots and SQLite.
//!
//! Plain functions over a borrowed connection; locking is the caller's job.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

use strata_core::error::{StrataError, StrataResult};
use strata_core::traits::{PromotionEnrichment, PropertyRow};
use strata_core::types::{GraphEntity, KnowledgeLayer};

/// Map a rusqlite error into a backend error.
pub(crate) fn db_error(e: rusqlite::Error) -> StrataError {
    StrataError::backend_with_source(format!("sqlite: {}", e), e)
}

fn parse_snapshot(snapshot: &str) -> StrataResult<GraphEntity> {
    Ok(serde_json::from_str(snapshot)?)
}

/// Insert or replace an entity row.
pub fn save_entity(conn: &Connection, entity: &GraphEntity) -> StrataResult<()> {
    let snapshot = serde_json::to_string(entity)?;
    conn.execute(
        r#"
        INSERT INTO entities (id, name, category, layer, confidence, snapshot, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            category = excluded.category,
            layer = excluded.layer,
            confidence = excluded.confidence,
            snapshot = excluded.snapshot,
            updated_at = excluded.updated_at
        "#,
        params![
            entity.id,
            entity.name,
            entity.category.as_str(),
            entity.layer.to_string(),
            entity.confidence,
            snapshot,
            Utc::now().to_rfc3339(),
        ],
    )
    .map_err(db_error)?;
    Ok(())
}

/// Load one entity snapshot.
pub fn load_entity(conn: &Connection, id: &str) -> StrataResult<Option<GraphEntity>> {
    let snapshot: Option<String> = conn
        .query_row(
            "SELECT snapshot FROM entities WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error)?;
    snapshot.as_deref().map(parse_snapshot).transpose()
}

pub fn count_entities(conn: &Connection) -> StrataResult<usize> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))
        .map_err(db_error)?;
    Ok(usize::try_from(count).unwrap_or(0))
}

/// Entities at `layer` with confidence >= `threshold`, highest first.
pub fn load_candidates(
    conn: &Connection,
    layer: KnowledgeLayer,
    threshold: f64,
    limit: usize,
) -> StrataResult<Vec<GraphEntity>> {
    let mut stmt = conn
        .prepare(
            "SELECT snapshot FROM entities WHERE layer = ?1 AND confidence >= ?2 \
             ORDER BY confidence DESC, id ASC LIMIT ?3",
        )
        .map_err(db_error)?;
    let rows = stmt
        .query_map(
            params![
                layer.to_string(),
                threshold,
                i64::try_from(limit).unwrap_or(i64::MAX)
            ],
            |row| row.get::<_, String>(0),
        )
        .map_err(db_error)?;

    let mut candidates = Vec::new();
    for row in rows {
        candidates.push(parse_snapshot(&row.map_err(db_error)?)?);
    }
    Ok(candidates)
}

/// Move an entity from `from` to `to` in one transaction.
///
/// With a versioned id in `enrichment`, the row is re-keyed and the old id is
/// kept in the `previous_id` attribute.
pub fn promote_entity(
    conn: &mut Connection,
    id: &str,
    from: KnowledgeLayer,
    to: KnowledgeLayer,
    enrichment: &PromotionEnrichment,
) -> StrataResult<GraphEntity> {
    let tx = conn.transaction().map_err(db_error)?;

    let mut entity = load_entity(&tx, id)?.ok_or_else(|| StrataError::not_found(id))?;
    if entity.layer != from {
        return Err(StrataError::backend(format!(
            "entity '{}' is at {}, expected {}",
            id, entity.layer, from
        )));
    }

    entity.layer = to;
    entity
        .attributes
        .extend(enrichment.properties.iter().map(|(k, v)| (k.clone(), v.clone())));

    if let Some(new_id) = &enrichment.new_entity_id {
        if load_entity(&tx, new_id)?.is_some() {
            return Err(StrataError::backend(format!(
                "versioned id '{}' already exists",
                new_id
            )));
        }
        tx.execute("DELETE FROM entities WHERE id = ?1", params![id])
            .map_err(db_error)?;
        entity
            .attributes
            .insert("previous_id".to_string(), serde_json::json!(id));
        entity.id = new_id.clone();
    }

    save_entity(&tx, &entity)?;
    tx.commit().map_err(db_error)?;
    Ok(entity)
}

/// Register a vocabulary row. Duplicates are ignored.
pub fn save_terminology(
    conn: &Connection,
    name: &str,
    coding_system: &str,
    code: &str,
    display_name: &str,
) -> StrataResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO terminology (name, coding_system, code, display_name) \
         VALUES (?1, ?2, ?3, ?4)",
        params![name.trim().to_lowercase(), coding_system, code, display_name],
    )
    .map_err(db_error)?;
    Ok(())
}

/// Vocabulary rows whose name contains, or is contained in, `name`.
///
/// Longest names first, so the most specific entry leads.
pub fn find_terminology(conn: &Connection, name: &str) -> StrataResult<Vec<PropertyRow>> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn
        .prepare(
            "SELECT name, coding_system, code, display_name FROM terminology \
             WHERE instr(?1, name) > 0 OR instr(name, ?1) > 0 \
             ORDER BY length(name) DESC, id ASC",
        )
        .map_err(db_error)?;
    let rows = stmt
        .query_map(params![needle], |row| {
            Ok([
                ("name", row.get::<_, String>(0)?),
                ("coding_system", row.get::<_, String>(1)?),
                ("code", row.get::<_, String>(2)?),
                ("display_name", row.get::<_, String>(3)?),
            ])
        })
        .map_err(db_error)?;

    let mut out = Vec::new();
    for row in rows {
        let row: PropertyRow = row
            .map_err(db_error)?
            .into_iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v)))
            .collect::<HashMap<_, _>>();
        out.push(row);
    }
    Ok(out)
}

/// The attribute map of one entity, as a single row.
pub fn entity_attributes(conn: &Connection, id: &str) -> StrataResult<Vec<PropertyRow>> {
    Ok(load_entity(conn, id)?
        .map(|e| vec![e.attributes])
        .unwrap_or_default())
}
