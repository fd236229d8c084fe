//! SQLite-backed project store.
//!
//! # Responsibility
//! - Persist entity records as JSON payloads keyed by entity key.
//! - Keep a shape summary row per diagram shape so `open` can seed
//!   in-use and z-order state without decoding shapes.
//!
//! # Invariants
//! - `save_changes` and `compact` run in one transaction each.
//! - Summary rows follow their entity row (`ON DELETE CASCADE`).
//! - Soft delete is `is_deleted = 1`; only `compact` removes rows.

use super::{
    select_regions, EntityData, EntityRecord, ProjectSnapshot, ShapeBatch, ShapeSummary, Store,
    StoreError, StoreResult, CURRENT_FORMAT_VERSION,
};
use crate::db::{open_db, open_db_in_memory};
use crate::model::shape::Rect;
use crate::model::{EntityCategory, EntityId, EntityState};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const MEMORY_LOCATION: &str = ":memory:";

/// Raw `entities` row before payload decoding.
struct EntityRow {
    key: String,
    category: String,
    diagram_id: Option<String>,
    is_deleted: i64,
    payload: String,
}

/// `Store` implementation writing one SQLite file per project.
pub struct SqliteStore {
    path: Option<PathBuf>,
    conn: Option<Connection>,
}

impl SqliteStore {
    /// Store targeting the project file at `path`. No I/O happens here.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            conn: None,
        }
    }

    /// Private in-memory database that lives until `close` or `erase`.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            conn: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn connection(&self) -> StoreResult<&Connection> {
        self.conn.as_ref().ok_or(StoreError::NotConnected)
    }

    fn connect(&self) -> StoreResult<Connection> {
        let conn = match &self.path {
            Some(path) => open_db(path)?,
            None => open_db_in_memory()?,
        };
        ensure_store_connection_ready(&conn)?;
        Ok(conn)
    }

    /// Opens the file only when it already exists on disk.
    fn connect_existing(&self) -> StoreResult<Option<Connection>> {
        match &self.path {
            Some(path) if path.is_file() => self.connect().map(Some),
            _ => Ok(None),
        }
    }
}

impl Store for SqliteStore {
    fn location(&self) -> String {
        self.path.as_ref().map_or_else(
            || MEMORY_LOCATION.to_string(),
            |path| path.display().to_string(),
        )
    }

    fn exists(&self) -> StoreResult<bool> {
        if let Some(conn) = &self.conn {
            return has_project_row(conn);
        }
        match self.connect_existing()? {
            Some(conn) => has_project_row(&conn),
            None => Ok(false),
        }
    }

    fn create(&mut self) -> StoreResult<()> {
        if self.exists()? {
            return Err(StoreError::ProjectExists(self.location()));
        }
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.connect()?,
        };
        conn.execute(
            "INSERT INTO project_meta (singleton, format_version, created_at, updated_at)
             VALUES (1, ?1, (strftime('%s', 'now') * 1000), (strftime('%s', 'now') * 1000));",
            [CURRENT_FORMAT_VERSION],
        )?;
        info!(
            "event=store_create module=store status=ok location={}",
            self.location()
        );
        self.conn = Some(conn);
        Ok(())
    }

    fn open(&mut self) -> StoreResult<ProjectSnapshot> {
        if self.conn.is_none() {
            self.conn = self.connect_existing()?;
        }
        let location = self.location();
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| StoreError::ProjectNotFound(location.clone()))?;
        if !has_project_row(conn)? {
            return Err(StoreError::ProjectNotFound(location));
        }

        let version = read_format_version(conn)?;
        let records = query_records(
            conn,
            "SELECT entity_key, category, diagram_id, is_deleted, payload
             FROM entities
             WHERE diagram_id IS NULL OR category NOT IN ('shape', 'connection')
             ORDER BY category, entity_key;",
            [],
        )?;
        let shape_summaries = query_shape_summaries(conn)?;
        debug!(
            "event=store_open module=store status=ok records={} summaries={}",
            records.len(),
            shape_summaries.len()
        );
        Ok(ProjectSnapshot {
            version,
            records,
            shape_summaries,
        })
    }

    fn close(&mut self) {
        self.conn = None;
    }

    fn erase(&mut self) -> StoreResult<()> {
        if !self.exists()? {
            return Err(StoreError::ProjectNotFound(self.location()));
        }
        self.conn = None;
        if let Some(path) = &self.path {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn read_version(&self) -> StoreResult<i32> {
        let owned;
        let conn = match &self.conn {
            Some(conn) => conn,
            None => {
                owned = self
                    .connect_existing()?
                    .ok_or_else(|| StoreError::ProjectNotFound(self.location()))?;
                &owned
            }
        };
        if !has_project_row(conn)? {
            return Err(StoreError::ProjectNotFound(self.location()));
        }
        read_format_version(conn)
    }

    fn can_modify_version(&self) -> bool {
        true
    }

    fn load_diagram_shapes(
        &mut self,
        diagram_id: EntityId,
        regions: &[Rect],
    ) -> StoreResult<ShapeBatch> {
        let conn = self.connection()?;
        let records = query_records(
            conn,
            "SELECT entity_key, category, diagram_id, is_deleted, payload
             FROM entities
             WHERE diagram_id = ?1 AND category IN ('shape', 'connection')
             ORDER BY category DESC, entity_key;",
            [diagram_id.to_string()],
        )?;
        Ok(select_regions(records, regions))
    }

    fn save_changes(&mut self, version: i32, records: &[EntityRecord]) -> StoreResult<()> {
        let conn = self.conn.as_mut().ok_or(StoreError::NotConnected)?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE project_meta
             SET format_version = ?1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE singleton = 1;",
            [version],
        )?;

        for record in records {
            let payload = serde_json::to_string(&record.data)?;
            tx.execute(
                "INSERT INTO entities (entity_key, category, diagram_id, is_deleted, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, (strftime('%s', 'now') * 1000))
                 ON CONFLICT(entity_key) DO UPDATE SET
                     category = excluded.category,
                     diagram_id = excluded.diagram_id,
                     is_deleted = excluded.is_deleted,
                     payload = excluded.payload,
                     updated_at = excluded.updated_at;",
                params![
                    record.key,
                    record.category().as_str(),
                    record.diagram_id.map(|id| id.to_string()),
                    i64::from(!record.state.is_active()),
                    payload,
                ],
            )?;

            match (record.shape_summary(), &record.data) {
                (Some(summary), EntityData::Shape(shape)) => {
                    tx.execute(
                        "INSERT INTO shape_summaries (shape_key, diagram_id, z_order, pos_x, pos_y, references_json)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                         ON CONFLICT(shape_key) DO UPDATE SET
                             diagram_id = excluded.diagram_id,
                             z_order = excluded.z_order,
                             pos_x = excluded.pos_x,
                             pos_y = excluded.pos_y,
                             references_json = excluded.references_json;",
                        params![
                            record.key,
                            summary.diagram_id.to_string(),
                            summary.z_order,
                            shape.x,
                            shape.y,
                            serde_json::to_string(&summary.references)?,
                        ],
                    )?;
                }
                _ => {
                    tx.execute(
                        "DELETE FROM shape_summaries WHERE shape_key = ?1;",
                        [&record.key],
                    )?;
                }
            }
        }

        tx.commit()?;
        debug!(
            "event=store_save module=store status=ok records={} version={}",
            records.len(),
            version
        );
        Ok(())
    }

    fn compact(&mut self) -> StoreResult<usize> {
        let conn = self.conn.as_mut().ok_or(StoreError::NotConnected)?;
        let tx = conn.transaction()?;
        let purged = tx.execute("DELETE FROM entities WHERE is_deleted = 1;", [])?;
        tx.commit()?;
        conn.execute_batch("VACUUM;")?;
        Ok(purged)
    }
}

fn has_project_row(conn: &Connection) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM project_meta WHERE singleton = 1);",
        [],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn read_format_version(conn: &Connection) -> StoreResult<i32> {
    conn.query_row(
        "SELECT format_version FROM project_meta WHERE singleton = 1;",
        [],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StoreError::InvalidData("project_meta row missing".to_string()))
}

fn query_records<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StoreResult<Vec<EntityRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok(EntityRow {
            key: row.get(0)?,
            category: row.get(1)?,
            diagram_id: row.get(2)?,
            is_deleted: row.get(3)?,
            payload: row.get(4)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(parse_entity_row(row?)?);
    }
    Ok(records)
}

fn parse_entity_row(row: EntityRow) -> StoreResult<EntityRecord> {
    let category = EntityCategory::parse(&row.category).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "unknown category `{}` for `{}`",
            row.category, row.key
        ))
    })?;
    let data: EntityData = serde_json::from_str(&row.payload)?;
    if data.category() != category {
        return Err(StoreError::InvalidData(format!(
            "payload of `{}` is {} but row says {}",
            row.key,
            data.category(),
            category
        )));
    }
    let diagram_id = row
        .diagram_id
        .as_deref()
        .map(|value| parse_uuid(value, &row.key))
        .transpose()?;

    Ok(EntityRecord {
        key: row.key,
        diagram_id,
        state: parse_state(row.is_deleted),
        data,
    })
}

fn query_shape_summaries(conn: &Connection) -> StoreResult<Vec<ShapeSummary>> {
    let mut stmt = conn.prepare(
        "SELECT s.shape_key, s.diagram_id, s.z_order, s.references_json, e.is_deleted
         FROM shape_summaries s
         JOIN entities e ON e.entity_key = s.shape_key
         ORDER BY s.diagram_id, s.z_order;",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i32>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i64>(4)?,
        ))
    })?;

    let mut summaries = Vec::new();
    for row in rows {
        let (key, diagram_id, z_order, references_json, is_deleted) = row?;
        summaries.push(ShapeSummary {
            id: parse_uuid(&key, &key)?,
            diagram_id: parse_uuid(&diagram_id, &key)?,
            z_order,
            state: parse_state(is_deleted),
            references: serde_json::from_str(&references_json)?,
        });
    }
    Ok(summaries)
}

fn parse_uuid(value: &str, key: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|err| StoreError::InvalidData(format!("invalid uuid `{value}` in `{key}`: {err}")))
}

fn parse_state(is_deleted: i64) -> EntityState {
    if is_deleted == 0 {
        EntityState::Active
    } else {
        EntityState::SoftDeleted
    }
}

fn ensure_store_connection_ready(conn: &Connection) -> StoreResult<()> {
    for table in ["project_meta", "entities", "shape_summaries"] {
        if !table_exists(conn, table)? {
            return Err(StoreError::InvalidData(format!(
                "required table `{table}` is missing"
            )));
        }
    }
    for column in ["entity_key", "category", "diagram_id", "is_deleted", "payload"] {
        if !table_has_column(conn, "entities", column)? {
            return Err(StoreError::InvalidData(format!(
                "required column `entities.{column}` is missing"
            )));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
