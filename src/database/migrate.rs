//! Schema creation and in-place upgrades.
//!
//! Upgrades are detected by introspecting the catalog (`pragma_table_info`,
//! `sqlite_master`) rather than by a stored version number. Every step checks
//! for its target by name before mutating anything, so the whole sequence can
//! run on every start.

use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, info};

use crate::database::error::{MigrationContext, Result};
use crate::database::ident::TableName;
use crate::database::keys::derive_key;
use crate::database::schema::{
    dataset_table_ddl, DIR_TAG_REBUILD, DIR_TAG_TABLE, DIR_TAG_UNIQUE_INDEX,
    FAVORITES_DIR_HASH_INDEX, FAVORITES_TABLE, SCHEMA,
};

/// What a migration step actually changed.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub added_column: bool,
    pub backfilled_rows: usize,
    pub created_unique_index: bool,
    pub rebuilt_table: bool,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        !self.added_column
            && self.backfilled_rows == 0
            && !self.created_unique_index
            && !self.rebuilt_table
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StartupReport {
    pub favorites: MigrationReport,
    pub directory_tags: MigrationReport,
}

/// Structural tables, then both `dir_hash` migrations. Any error here is a
/// `CatalogError::Migration`.
pub fn run_startup(conn: &mut Connection) -> Result<StartupReport> {
    ensure_structural_tables(conn)?;
    let favorites = migrate_favorites_schema(conn)?;
    let directory_tags = migrate_directory_tag_schema(conn)?;
    Ok(StartupReport {
        favorites,
        directory_tags,
    })
}

pub fn ensure_structural_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .during("create structural tables")?;
    Ok(())
}

pub fn ensure_dataset_table(conn: &Connection, table: &TableName) -> Result<()> {
    conn.execute_batch(&dataset_table_ddl(table))?;
    debug!(table = %table, "dataset table ensured");
    Ok(())
}

pub fn migrate_favorites_schema(conn: &mut Connection) -> Result<MigrationReport> {
    let tx = conn.transaction().during("begin favorites migration")?;
    let mut report = MigrationReport::default();

    if !column_exists(&tx, FAVORITES_TABLE, "dir_hash").during("inspect favorites columns")? {
        tx.execute_batch("ALTER TABLE favorites ADD COLUMN dir_hash TEXT")
            .during("add favorites.dir_hash")?;
        report.added_column = true;
    }

    report.backfilled_rows =
        backfill_dir_hash(&tx, FAVORITES_TABLE).during("backfill favorites.dir_hash")?;

    if !index_exists(&tx, FAVORITES_TABLE, FAVORITES_DIR_HASH_INDEX)
        .during("inspect favorites indexes")?
    {
        tx.execute_batch("CREATE UNIQUE INDEX uniq_dir_hash ON favorites (dir_hash)")
            .during("create uniq_dir_hash")?;
        report.created_unique_index = true;
    }

    tx.commit().during("commit favorites migration")?;
    log_report(FAVORITES_TABLE, &report);
    Ok(report)
}

/// Same steps as [`migrate_favorites_schema`] for `dir_tag_map`. A legacy
/// table keyed by `dir_path` is backfilled from that column, then rebuilt
/// without it so new `(dir_hash, tag_id)` rows satisfy its constraints.
pub fn migrate_directory_tag_schema(conn: &mut Connection) -> Result<MigrationReport> {
    let tx = conn.transaction().during("begin dir_tag_map migration")?;
    let mut report = MigrationReport::default();

    if !column_exists(&tx, DIR_TAG_TABLE, "dir_hash").during("inspect dir_tag_map columns")? {
        tx.execute_batch("ALTER TABLE dir_tag_map ADD COLUMN dir_hash TEXT")
            .during("add dir_tag_map.dir_hash")?;
        report.added_column = true;
    }

    if column_exists(&tx, DIR_TAG_TABLE, "dir_path").during("inspect dir_tag_map columns")? {
        report.backfilled_rows =
            backfill_dir_hash(&tx, DIR_TAG_TABLE).during("backfill dir_tag_map.dir_hash")?;
        tx.execute_batch(DIR_TAG_REBUILD)
            .during("rebuild dir_tag_map without dir_path")?;
        report.rebuilt_table = true;
    }

    if !index_exists(&tx, DIR_TAG_TABLE, DIR_TAG_UNIQUE_INDEX)
        .during("inspect dir_tag_map indexes")?
    {
        tx.execute_batch("CREATE UNIQUE INDEX uniq_dir_tag ON dir_tag_map (dir_hash, tag_id)")
            .during("create uniq_dir_tag")?;
        report.created_unique_index = true;
    }

    tx.commit().during("commit dir_tag_map migration")?;
    log_report(DIR_TAG_TABLE, &report);
    Ok(report)
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn index_exists(conn: &Connection, table: &str, index: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 AND name = ?2",
        params![table, index],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// User tables, alphabetical.
pub fn list_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'
         ORDER BY name ASC",
    )?;
    let names = stmt.query_map([], |row| row.get(0))?;
    names.collect()
}

// `table` is always one of the schema constants.
fn backfill_dir_hash(conn: &Connection, table: &str) -> rusqlite::Result<usize> {
    let pending: Vec<(i64, String)> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT rowid, dir_path FROM {table}
             WHERE (dir_hash IS NULL OR dir_hash = '') AND dir_path IS NOT NULL"
        ))?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut update = conn.prepare(&format!("UPDATE {table} SET dir_hash = ?1 WHERE rowid = ?2"))?;
    for (rowid, dir_path) in &pending {
        update.execute(params![derive_key(dir_path), rowid])?;
    }
    Ok(pending.len())
}

fn log_report(table: &str, report: &MigrationReport) {
    if report.is_noop() {
        debug!(table, "schema already current");
    } else {
        info!(
            table,
            added_column = report.added_column,
            backfilled_rows = report.backfilled_rows,
            created_unique_index = report.created_unique_index,
            rebuilt_table = report.rebuilt_table,
            "schema migrated"
        );
    }
}
