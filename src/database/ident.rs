use std::fmt;

use crate::database::error::{CatalogError, Result};
use crate::database::schema::STRUCTURAL_TABLES;

/// Prefix shared by every dataset table.
pub const DATASET_TABLE_PREFIX: &str = "local_index_";

/// A table name that has passed validation.
///
/// Placeholders cannot carry identifiers, so every statement that names a
/// dataset table is built from one of these rather than from a raw string.
/// The catalog's own tables and SQLite's internal ones are never valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName(String);

impl TableName {
    pub fn parse(candidate: &str) -> Result<Self> {
        if is_valid_identifier(candidate) && !is_reserved(candidate) {
            Ok(Self(candidate.to_string()))
        } else {
            Err(CatalogError::InvalidIdentifier(candidate.to_string()))
        }
    }

    /// Table name for a user-facing dataset name, e.g. `photos` becomes
    /// `local_index_photos`.
    pub fn for_dataset(base: &str) -> Result<Self> {
        if !is_valid_identifier(base) {
            return Err(CatalogError::InvalidIdentifier(base.to_string()));
        }
        Self::parse(&format!("{DATASET_TABLE_PREFIX}{base}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for interpolation into SQL.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }

    pub fn is_dataset_table(&self) -> bool {
        self.0.starts_with(DATASET_TABLE_PREFIX)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_valid_identifier(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

// SQLite compares identifiers case-insensitively.
fn is_reserved(candidate: &str) -> bool {
    let lower = candidate.to_ascii_lowercase();
    lower.starts_with("sqlite_") || STRUCTURAL_TABLES.contains(&lower.as_str())
}
