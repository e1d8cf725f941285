use crate::database::ident::TableName;

pub const BINDINGS_TABLE: &str = "local_index_bindings";
pub const TAGS_TABLE: &str = "tags";
pub const FAVORITES_TABLE: &str = "favorites";
pub const DIR_TAG_TABLE: &str = "dir_tag_map";

pub const FAVORITES_DIR_HASH_INDEX: &str = "uniq_dir_hash";
pub const DIR_TAG_UNIQUE_INDEX: &str = "uniq_dir_tag";

/// Tables owned by the catalog itself. None of them is a dataset.
pub const STRUCTURAL_TABLES: &[&str] =
    &[BINDINGS_TABLE, TAGS_TABLE, FAVORITES_TABLE, DIR_TAG_TABLE];

// `dir_hash` uniqueness is not declared inline: the migrator owns the named
// indexes so fresh and upgraded databases end up with the same structure.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS local_index_bindings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        table_name TEXT UNIQUE NOT NULL,
        display_name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL
    );

    CREATE TABLE IF NOT EXISTS favorites (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        dir_path TEXT NOT NULL,
        dir_hash TEXT NOT NULL,
        original_name TEXT NOT NULL,
        favorite_name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS dir_tag_map (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        dir_hash TEXT NOT NULL,
        tag_id INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_dir_tag_tag ON dir_tag_map (tag_id);
";

/// Moves a legacy `dir_tag_map` (keyed by a `dir_path NOT NULL` column) onto
/// the current layout. Expects `dir_hash` to be backfilled already; rows that
/// still have no key cannot be joined and are left behind.
pub const DIR_TAG_REBUILD: &str = "
    CREATE TABLE dir_tag_map_rebuild (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        dir_hash TEXT NOT NULL,
        tag_id INTEGER NOT NULL
    );

    INSERT INTO dir_tag_map_rebuild (dir_hash, tag_id)
        SELECT dir_hash, tag_id FROM dir_tag_map
        WHERE dir_hash IS NOT NULL AND dir_hash <> '' AND tag_id IS NOT NULL
        GROUP BY dir_hash, tag_id
        ORDER BY MIN(rowid);

    DROP TABLE dir_tag_map;
    ALTER TABLE dir_tag_map_rebuild RENAME TO dir_tag_map;

    CREATE INDEX IF NOT EXISTS idx_dir_tag_tag ON dir_tag_map (tag_id);
";

pub fn dataset_table_ddl(table: &TableName) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('file', 'dir')),
            size INTEGER NOT NULL CHECK (size >= 0),
            mtime INTEGER NOT NULL
        )",
        table.quoted()
    )
}
