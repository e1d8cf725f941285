//! Local directory index and tag/favorites catalog on SQLite.
//!
//! Each indexed directory tree gets its own dataset table. Favorite
//! directories and their tags are keyed by a SHA-256 digest of the path.

pub mod database;
pub mod ingest;
pub mod utils;
