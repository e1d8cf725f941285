use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, info};

use crate::database::error::Result;
use crate::database::ident::TableName;
use crate::database::migrate::{self, MigrationReport, StartupReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Dir => "dir",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for EntryKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EntryKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "file" => Ok(EntryKind::File),
            "dir" => Ok(EntryKind::Dir),
            other => Err(FromSqlError::Other(
                format!("unknown entry kind {other:?}").into(),
            )),
        }
    }
}

/// One filesystem entry as stored in a dataset table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalEntry {
    pub path: String,
    pub kind: EntryKind,
    pub size: i64,
    /// Unix seconds.
    pub mtime: i64,
}

impl LocalEntry {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            kind: row.get(1)?,
            size: row.get(2)?,
            mtime: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexBinding {
    pub table_name: String,
    pub display_name: String,
    pub description: String,
    pub created_at: String,
}

impl IndexBinding {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            table_name: row.get(0)?,
            display_name: row.get(1)?,
            description: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    /// Placeholder shown for a dataset table that was never bound.
    pub fn unbound(table_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            display_name: table_name.to_string(),
            description: String::new(),
            created_at: String::new(),
        }
    }
}

/// One page of results plus the total matching row count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Insert alongside whatever the table already holds.
    #[default]
    Append,
    /// Clear the table first, in the same transaction as the inserts.
    Replace,
}

const BINDING_COLUMNS: &str =
    "table_name, display_name, COALESCE(description, ''), COALESCE(created_at, '')";

/// Handle over the catalog database.
///
/// Reads take `&self`. Operations spanning several statements take
/// `&mut self` and run inside a single transaction.
pub struct Catalog {
    pub(super) conn: Connection,
}

impl Catalog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        info!(path = %path.as_ref().display(), "opened catalog");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// Wraps an existing connection, bringing its schema up to date first.
    pub fn with_connection(mut conn: Connection) -> Result<Self> {
        let report = migrate::run_startup(&mut conn)?;
        debug!(?report, "catalog schema ready");
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn migrate(&mut self) -> Result<StartupReport> {
        migrate::run_startup(&mut self.conn)
    }

    pub fn migrate_favorites_schema(&mut self) -> Result<MigrationReport> {
        migrate::migrate_favorites_schema(&mut self.conn)
    }

    pub fn migrate_directory_tag_schema(&mut self) -> Result<MigrationReport> {
        migrate::migrate_directory_tag_schema(&mut self.conn)
    }

    pub fn ensure_dataset_table(&self, table: &str) -> Result<TableName> {
        let table = TableName::parse(table)?;
        migrate::ensure_dataset_table(&self.conn, &table)?;
        Ok(table)
    }

    pub fn load_entries(&mut self, table: &str, entries: &[LocalEntry]) -> Result<usize> {
        self.load_entries_with(table, entries, LoadMode::Append)
    }

    /// Loads every entry or none of them.
    pub fn load_entries_with(
        &mut self,
        table: &str,
        entries: &[LocalEntry],
        mode: LoadMode,
    ) -> Result<usize> {
        let table = TableName::parse(table)?;
        let tx = self.conn.transaction()?;

        {
            if mode == LoadMode::Replace {
                let cleared = tx.execute(&format!("DELETE FROM {}", table.quoted()), [])?;
                debug!(table = %table, cleared, "cleared dataset table before reload");
            }

            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (path, kind, size, mtime) VALUES (?1, ?2, ?3, ?4)",
                table.quoted()
            ))?;

            for entry in entries {
                stmt.execute(params![entry.path, entry.kind, entry.size, entry.mtime])?;
            }
        }

        tx.commit()?;
        info!(table = %table, rows = entries.len(), ?mode, "loaded entries");
        Ok(entries.len())
    }

    pub fn upsert_binding(&self, table: &str, display_name: &str, description: &str) -> Result<()> {
        let table = TableName::parse(table)?;
        self.conn.execute(
            "INSERT INTO local_index_bindings (table_name, display_name, description)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(table_name) DO UPDATE SET
                display_name = excluded.display_name,
                description = excluded.description",
            params![table.as_str(), display_name, description],
        )?;
        Ok(())
    }

    pub fn list_bindings(&self) -> Result<Vec<IndexBinding>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BINDING_COLUMNS} FROM local_index_bindings
             ORDER BY created_at DESC, table_name ASC"
        ))?;
        let bindings = stmt
            .query_map([], IndexBinding::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(bindings)
    }

    pub fn get_binding(&self, table: &str) -> Result<Option<IndexBinding>> {
        let table = TableName::parse(table)?;
        let binding = self
            .conn
            .query_row(
                &format!(
                    "SELECT {BINDING_COLUMNS} FROM local_index_bindings WHERE table_name = ?1"
                ),
                params![table.as_str()],
                IndexBinding::from_row,
            )
            .optional()?;
        Ok(binding)
    }

    /// Every dataset table in the store, with its binding when one exists.
    pub fn list_indexes(&self) -> Result<Vec<IndexBinding>> {
        let mut bindings: HashMap<String, IndexBinding> = self
            .list_bindings()?
            .into_iter()
            .map(|b| (b.table_name.clone(), b))
            .collect();

        let indexes = migrate::list_tables(&self.conn)?
            .into_iter()
            .filter_map(|name| TableName::parse(&name).ok())
            .filter(TableName::is_dataset_table)
            .map(|table| {
                bindings
                    .remove(table.as_str())
                    .unwrap_or_else(|| IndexBinding::unbound(table.as_str()))
            })
            .collect();
        Ok(indexes)
    }
}

/// `LIKE` pattern matching `needle` anywhere, with wildcards escaped. Use with
/// `ESCAPE '\'`.
pub(crate) fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
