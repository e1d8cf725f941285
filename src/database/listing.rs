use rusqlite::params;

use crate::database::error::Result;
use crate::database::ident::TableName;
use crate::database::repo::{contains_pattern, Catalog, LocalEntry, Page};

pub const DEFAULT_ENTRY_LIMIT: i64 = 100;

fn clamp_window(offset: i64, limit: i64) -> (i64, i64) {
    let limit = if limit <= 0 { DEFAULT_ENTRY_LIMIT } else { limit };
    (offset.max(0), limit)
}

impl Catalog {
    pub fn count_entries(&self, table: &str) -> Result<i64> {
        let table = TableName::parse(table)?;
        let total = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.quoted()),
            [],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// A page of entries in insertion order. The total comes from a separate
    /// count, so a concurrent load can make the two disagree.
    pub fn list_entries(&self, table: &str, offset: i64, limit: i64) -> Result<Page<LocalEntry>> {
        let table = TableName::parse(table)?;
        let (offset, limit) = clamp_window(offset, limit);

        let total = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.quoted()),
            [],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT path, kind, size, mtime FROM {} ORDER BY id ASC LIMIT ?1 OFFSET ?2",
            table.quoted()
        ))?;
        let items = stmt
            .query_map(params![limit, offset], LocalEntry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Page { items, total })
    }

    /// Like [`Catalog::list_entries`], restricted to paths containing `query`.
    pub fn search_entries(
        &self,
        table: &str,
        query: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Page<LocalEntry>> {
        let table = TableName::parse(table)?;
        let (offset, limit) = clamp_window(offset, limit);
        let pattern = contains_pattern(query);

        let total = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE path LIKE ?1 ESCAPE '\\'",
                table.quoted()
            ),
            params![pattern],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT path, kind, size, mtime FROM {}
             WHERE path LIKE ?1 ESCAPE '\\'
             ORDER BY id ASC LIMIT ?2 OFFSET ?3",
            table.quoted()
        ))?;
        let items = stmt
            .query_map(params![pattern, limit, offset], LocalEntry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Page { items, total })
    }
}
