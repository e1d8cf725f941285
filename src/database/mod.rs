pub mod error;
pub mod favorites;
pub mod ident;
pub mod keys;
pub mod listing;
pub mod migrate;
pub mod repo;
pub mod schema;

pub use error::{CatalogError, Result};
pub use favorites::{Favorite, FavoriteQuery, Tag};
pub use ident::TableName;
pub use keys::derive_key;
pub use migrate::{MigrationReport, StartupReport};
pub use repo::{Catalog, EntryKind, IndexBinding, LoadMode, LocalEntry, Page};
