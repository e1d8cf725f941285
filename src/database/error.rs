use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// A dataset name that cannot be used as a table identifier.
    #[error("invalid identifier {0:?}: only ASCII letters, digits and '_' are allowed")]
    InvalidIdentifier(String),

    /// Connectivity or statement failure. Bulk operations report one of these
    /// for the whole batch after rolling back.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Fatal at startup: the schema could not be brought to the expected shape.
    #[error("schema migration failed while trying to {step}: {source}")]
    Migration {
        step: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

/// Attaches a migration step name to a store error, in the spirit of
/// `anyhow::Context`.
pub(crate) trait MigrationContext<T> {
    fn during(self, step: &'static str) -> Result<T>;
}

impl<T> MigrationContext<T> for rusqlite::Result<T> {
    fn during(self, step: &'static str) -> Result<T> {
        self.map_err(|source| CatalogError::Migration { step, source })
    }
}
