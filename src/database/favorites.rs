//! Favorite directories and the tags attached to them.
//!
//! Directories are keyed by [`derive_key`] of their path, never by the path
//! itself, in both `favorites` and `dir_tag_map`.

use std::collections::BTreeSet;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::debug;

use crate::database::error::Result;
use crate::database::keys::derive_key;
use crate::database::repo::{contains_pattern, Catalog, Page};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 200;
pub const TAG_SEARCH_LIMIT: i64 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Favorite {
    pub dir_path: String,
    pub dir_hash: String,
    pub original_name: String,
    pub favorite_name: String,
    pub description: String,
    pub created_at: String,
    /// Alphabetical.
    pub tags: Vec<String>,
}

impl Favorite {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            dir_path: row.get(0)?,
            dir_hash: row.get(1)?,
            original_name: row.get(2)?,
            favorite_name: row.get(3)?,
            description: row.get(4)?,
            created_at: row.get(5)?,
            tags: Vec::new(),
        })
    }
}

/// Filter and window for [`Catalog::list_favorites`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteQuery {
    /// Substring matched against names, description and path.
    pub query: Option<String>,
    pub page: i64,
    pub page_size: i64,
    /// A favorite must carry every one of these.
    pub tags: Vec<String>,
}

impl Default for FavoriteQuery {
    fn default() -> Self {
        Self {
            query: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            tags: Vec::new(),
        }
    }
}

impl FavoriteQuery {
    /// `(limit, offset)` after out-of-range values fall back to defaults.
    fn window(&self) -> (i64, i64) {
        let page = if self.page < 1 { 1 } else { self.page };
        let page_size = if self.page_size <= 0 || self.page_size > MAX_PAGE_SIZE {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size
        };
        (page_size, (page - 1).saturating_mul(page_size))
    }
}

const FAVORITE_COLUMNS: &str = "dir_path, dir_hash, original_name, favorite_name, \
     COALESCE(description, ''), COALESCE(created_at, '')";

/// Trimmed, non-empty, deduplicated.
fn normalize_tag_names<I>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn tags_for_hash(conn: &Connection, dir_hash: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT t.name FROM dir_tag_map dt
         JOIN tags t ON dt.tag_id = t.id
         WHERE dt.dir_hash = ?1
         ORDER BY t.name ASC",
    )?;
    let names = stmt.query_map(params![dir_hash], |row| row.get(0))?;
    names.collect()
}

impl Catalog {
    pub fn upsert_tag(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(());
        }
        self.conn.execute(
            "INSERT INTO tags (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
            params![name],
        )?;
        Ok(())
    }

    pub fn list_all_tags(&self) -> Result<Vec<Tag>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM tags ORDER BY name ASC")?;
        let tags = stmt
            .query_map([], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    /// Autocomplete lookup: at most [`TAG_SEARCH_LIMIT`] tags containing
    /// `query`, alphabetical.
    pub fn search_tags(&self, query: &str) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name FROM tags
             WHERE name LIKE ?1 ESCAPE '\\'
             ORDER BY name ASC LIMIT ?2",
        )?;
        let tags = stmt
            .query_map(params![contains_pattern(query), TAG_SEARCH_LIMIT], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    /// Adds `tags` to the directory. Existing associations are kept.
    pub fn set_directory_tags<I>(&mut self, dir_path: &str, tags: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.apply_directory_tags(dir_path, tags, false)
    }

    /// Makes `tags` the directory's exact tag set.
    pub fn replace_directory_tags<I>(&mut self, dir_path: &str, tags: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.apply_directory_tags(dir_path, tags, true)
    }

    fn apply_directory_tags<I>(&mut self, dir_path: &str, tags: I, replace: bool) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let dir_hash = derive_key(dir_path);
        let names = normalize_tag_names(tags);
        let tx = self.conn.transaction()?;

        {
            // Only the unique keys may be skipped; any other constraint failure
            // aborts the batch.
            let mut stmt_tag =
                tx.prepare("INSERT INTO tags (name) VALUES (?1) ON CONFLICT(name) DO NOTHING")?;
            let mut stmt_get_tag_id = tx.prepare("SELECT id FROM tags WHERE name = ?1")?;
            let mut stmt_dir_tag = tx.prepare(
                "INSERT INTO dir_tag_map (dir_hash, tag_id) VALUES (?1, ?2)
                 ON CONFLICT(dir_hash, tag_id) DO NOTHING",
            )?;

            let mut tag_ids = Vec::with_capacity(names.len());
            for name in &names {
                stmt_tag.execute(params![name])?;
                let tag_id: i64 = stmt_get_tag_id.query_row(params![name], |row| row.get(0))?;
                stmt_dir_tag.execute(params![dir_hash, tag_id])?;
                tag_ids.push(tag_id);
            }

            if replace {
                let mut sql = String::from("DELETE FROM dir_tag_map WHERE dir_hash = ?");
                if !tag_ids.is_empty() {
                    let placeholders = vec!["?"; tag_ids.len()].join(", ");
                    sql.push_str(&format!(" AND tag_id NOT IN ({placeholders})"));
                }
                let mut args = vec![Value::Text(dir_hash.clone())];
                args.extend(tag_ids.iter().map(|id| Value::Integer(*id)));
                let removed = tx.execute(&sql, params_from_iter(args.iter()))?;
                debug!(dir_path, removed, "dropped stale directory tags");
            }
        }

        tx.commit()?;
        debug!(dir_path, tags = names.len(), replace, "directory tags updated");
        Ok(())
    }

    /// Inserts the favorite, or updates `favorite_name` and `description` if
    /// the directory is already a favorite.
    pub fn upsert_favorite(
        &self,
        dir_path: &str,
        original_name: &str,
        favorite_name: &str,
        description: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO favorites (dir_path, dir_hash, original_name, favorite_name, description)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(dir_hash) DO UPDATE SET
                favorite_name = excluded.favorite_name,
                description = excluded.description",
            params![
                dir_path,
                derive_key(dir_path),
                original_name,
                favorite_name,
                description
            ],
        )?;
        Ok(())
    }

    pub fn get_favorite(&self, dir_path: &str) -> Result<Option<Favorite>> {
        let dir_hash = derive_key(dir_path);
        let favorite = self
            .conn
            .query_row(
                &format!("SELECT {FAVORITE_COLUMNS} FROM favorites WHERE dir_hash = ?1"),
                params![dir_hash],
                Favorite::from_row,
            )
            .optional()?;

        match favorite {
            Some(mut favorite) => {
                favorite.tags = tags_for_hash(&self.conn, &favorite.dir_hash)?;
                Ok(Some(favorite))
            }
            None => Ok(None),
        }
    }

    pub fn directory_tags(&self, dir_path: &str) -> Result<Vec<String>> {
        Ok(tags_for_hash(&self.conn, &derive_key(dir_path))?)
    }

    /// Removes the favorite and its tag associations. Returns whether a
    /// favorite existed.
    pub fn delete_favorite(&mut self, dir_path: &str) -> Result<bool> {
        let dir_hash = derive_key(dir_path);
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM dir_tag_map WHERE dir_hash = ?1", params![dir_hash])?;
        let removed = tx.execute("DELETE FROM favorites WHERE dir_hash = ?1", params![dir_hash])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Newest first, then by favorite name.
    ///
    /// With `tags`, only favorites carrying all of them match. The total and
    /// the page come from two queries sharing one predicate.
    pub fn list_favorites(&self, query: &FavoriteQuery) -> Result<Page<Favorite>> {
        let (limit, offset) = query.window();

        let mut filter = String::from("1=1");
        let mut args: Vec<Value> = Vec::new();

        if let Some(text) = query.query.as_deref().filter(|q| !q.is_empty()) {
            filter.push_str(
                " AND (favorite_name LIKE ? ESCAPE '\\' OR original_name LIKE ? ESCAPE '\\' \
                 OR description LIKE ? ESCAPE '\\' OR dir_path LIKE ? ESCAPE '\\')",
            );
            let pattern = contains_pattern(text);
            args.extend(std::iter::repeat(Value::Text(pattern)).take(4));
        }

        let tags = normalize_tag_names(&query.tags);
        if !tags.is_empty() {
            let placeholders = vec!["?"; tags.len()].join(", ");
            filter.push_str(&format!(
                " AND dir_hash IN (
                    SELECT dt.dir_hash FROM dir_tag_map dt
                    JOIN tags t ON dt.tag_id = t.id
                    WHERE t.name IN ({placeholders})
                    GROUP BY dt.dir_hash
                    HAVING COUNT(DISTINCT t.name) = ?
                )"
            ));
            args.extend(tags.iter().map(|t| Value::Text(t.clone())));
            args.push(Value::Integer(tags.len() as i64));
        }

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM favorites WHERE {filter}"),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        args.push(Value::Integer(limit));
        args.push(Value::Integer(offset));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FAVORITE_COLUMNS} FROM favorites WHERE {filter}
             ORDER BY created_at DESC, favorite_name ASC, rowid DESC
             LIMIT ? OFFSET ?"
        ))?;
        let mut items = stmt
            .query_map(params_from_iter(args.iter()), Favorite::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for favorite in &mut items {
            favorite.tags = tags_for_hash(&self.conn, &favorite.dir_hash)?;
        }

        Ok(Page { items, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::error::CatalogError;

    fn query_tags(tags: &[&str]) -> FavoriteQuery {
        FavoriteQuery {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..FavoriteQuery::default()
        }
    }

    fn paths(page: &Page<Favorite>) -> Vec<&str> {
        page.items.iter().map(|f| f.dir_path.as_str()).collect()
    }

    #[test]
    fn upsert_favorite_keeps_one_row_with_latest_values() -> Result<()> {
        let catalog = Catalog::open_in_memory()?;
        catalog.upsert_favorite("/music/jazz", "jazz", "Jazz", "first")?;
        catalog.upsert_favorite("/music/jazz", "renamed", "Smooth Jazz", "second")?;

        let page = catalog.list_favorites(&FavoriteQuery::default())?;
        assert_eq!(page.total, 1);
        let favorite = &page.items[0];
        assert_eq!(favorite.favorite_name, "Smooth Jazz");
        assert_eq!(favorite.description, "second");
        assert_eq!(favorite.original_name, "jazz");
        assert_eq!(favorite.dir_hash, derive_key("/music/jazz"));
        Ok(())
    }

    #[test]
    fn tag_filter_is_an_intersection() -> Result<()> {
        let mut catalog = Catalog::open_in_memory()?;
        catalog.upsert_favorite("/p", "p", "P", "")?;
        catalog.upsert_favorite("/q", "q", "Q", "")?;
        catalog.set_directory_tags("/p", ["a", "b"])?;
        catalog.set_directory_tags("/q", ["a", "c"])?;

        let both = catalog.list_favorites(&query_tags(&["a", "b"]))?;
        assert_eq!(paths(&both), ["/p"]);
        assert_eq!(both.total, 1);
        assert_eq!(both.items[0].tags, ["a", "b"]);

        let mismatched = catalog.list_favorites(&query_tags(&["b", "c"]))?;
        assert!(mismatched.items.is_empty());
        assert_eq!(mismatched.total, 0);

        let a_only = catalog.list_favorites(&query_tags(&["a"]))?;
        assert_eq!(a_only.total, 2);

        let unknown = catalog.list_favorites(&query_tags(&["a", "zzz"]))?;
        assert_eq!(unknown.total, 0);
        Ok(())
    }

    #[test]
    fn requested_tags_are_normalized_before_counting() -> Result<()> {
        let mut catalog = Catalog::open_in_memory()?;
        catalog.upsert_favorite("/p", "p", "P", "")?;
        catalog.set_directory_tags("/p", ["a", "b"])?;

        let page = catalog.list_favorites(&query_tags(&[" a", "a ", "", "b"]))?;
        assert_eq!(paths(&page), ["/p"]);
        Ok(())
    }

    #[test]
    fn directory_tags_are_trimmed_and_deduplicated() -> Result<()> {
        let mut catalog = Catalog::open_in_memory()?;
        catalog.set_directory_tags("/p", ["  rock ", "rock", "", "   ", "Rock"])?;

        assert_eq!(catalog.directory_tags("/p")?, ["Rock", "rock"]);
        let names: Vec<String> = catalog.list_all_tags()?.into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["Rock", "rock"]);
        Ok(())
    }

    #[test]
    fn set_directory_tags_is_additive() -> Result<()> {
        let mut catalog = Catalog::open_in_memory()?;
        catalog.set_directory_tags("/p", ["a", "b"])?;
        catalog.set_directory_tags("/p", ["c"])?;
        assert_eq!(catalog.directory_tags("/p")?, ["a", "b", "c"]);
        Ok(())
    }

    #[test]
    fn replace_directory_tags_drops_stale_associations() -> Result<()> {
        let mut catalog = Catalog::open_in_memory()?;
        catalog.set_directory_tags("/p", ["a", "b"])?;
        catalog.set_directory_tags("/other", ["a"])?;

        catalog.replace_directory_tags("/p", ["b", "c"])?;
        assert_eq!(catalog.directory_tags("/p")?, ["b", "c"]);
        assert_eq!(catalog.directory_tags("/other")?, ["a"]);

        catalog.replace_directory_tags("/p", Vec::<String>::new())?;
        assert!(catalog.directory_tags("/p")?.is_empty());
        Ok(())
    }

    #[test]
    fn failed_tag_update_rolls_back_entirely() -> Result<()> {
        let mut catalog = Catalog::open_in_memory()?;
        catalog.connection().execute_batch(
            "CREATE TRIGGER reject_boom BEFORE INSERT ON tags
             WHEN NEW.name = 'boom'
             BEGIN SELECT RAISE(ABORT, 'boom rejected'); END;",
        )?;

        assert!(catalog.set_directory_tags("/p", ["alpha", "boom"]).is_err());
        assert!(catalog.directory_tags("/p")?.is_empty());
        assert!(catalog.list_all_tags()?.is_empty());
        Ok(())
    }

    #[test]
    fn association_constraint_failure_is_reported() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE dir_tag_map (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dir_hash TEXT NOT NULL,
                tag_id INTEGER NOT NULL,
                note TEXT NOT NULL
            );",
        )?;
        let mut catalog = Catalog::with_connection(conn)?;

        let result = catalog.set_directory_tags("/p", ["a"]);
        assert!(matches!(result, Err(CatalogError::Store(_))));
        assert!(catalog.directory_tags("/p")?.is_empty());
        assert!(catalog.list_all_tags()?.is_empty());
        Ok(())
    }

    #[test]
    fn text_query_matches_any_field() -> Result<()> {
        let catalog = Catalog::open_in_memory()?;
        catalog.upsert_favorite("/srv/media/films", "films", "Cinema", "")?;
        catalog.upsert_favorite("/home/me/docs", "docs", "Paperwork", "tax returns")?;
        catalog.upsert_favorite("/home/me/pics", "holiday", "Pictures", "")?;

        let search = |text: &str| {
            catalog.list_favorites(&FavoriteQuery {
                query: Some(text.to_string()),
                ..FavoriteQuery::default()
            })
        };

        assert_eq!(paths(&search("cinema")?), ["/srv/media/films"]);
        assert_eq!(paths(&search("TAX")?), ["/home/me/docs"]);
        assert_eq!(paths(&search("holi")?), ["/home/me/pics"]);
        assert_eq!(search("/home/me")?.total, 2);
        assert_eq!(search("")?.total, 3);
        Ok(())
    }

    #[test]
    fn favorites_page_newest_first_then_by_name() -> Result<()> {
        let catalog = Catalog::open_in_memory()?;
        let saved = [("/c", "charlie"), ("/a", "alpha"), ("/b", "bravo"), ("/old", "zulu")];
        for (path, name) in saved {
            catalog.upsert_favorite(path, name, name, "")?;
        }
        catalog.connection().execute_batch(
            "UPDATE favorites SET created_at = '2030-01-01 00:00:00'
                WHERE dir_path IN ('/a', '/b', '/c');
             UPDATE favorites SET created_at = '2020-01-01 00:00:00' WHERE dir_path = '/old';",
        )?;

        let first = catalog.list_favorites(&FavoriteQuery {
            page_size: 2,
            ..FavoriteQuery::default()
        })?;
        assert_eq!(first.total, 4);
        assert_eq!(paths(&first), ["/a", "/b"]);

        let second = catalog.list_favorites(&FavoriteQuery {
            page: 2,
            page_size: 2,
            ..FavoriteQuery::default()
        })?;
        assert_eq!(paths(&second), ["/c", "/old"]);
        Ok(())
    }

    #[test]
    fn out_of_range_window_falls_back_to_defaults() {
        let window = |page, page_size| {
            FavoriteQuery {
                page,
                page_size,
                ..FavoriteQuery::default()
            }
            .window()
        };
        assert_eq!(window(1, 20), (20, 0));
        assert_eq!(window(3, 200), (200, 400));
        assert_eq!(window(0, 0), (20, 0));
        assert_eq!(window(-4, 201), (20, 0));
        assert_eq!(window(2, -1), (20, 20));
    }

    #[test]
    fn search_tags_is_capped_and_sorted() -> Result<()> {
        let catalog = Catalog::open_in_memory()?;
        for i in (0..30).rev() {
            catalog.upsert_tag(&format!("genre_{i:02}"))?;
        }
        catalog.upsert_tag("unrelated")?;
        catalog.upsert_tag("genre_00")?;

        let hits = catalog.search_tags("genre")?;
        assert_eq!(hits.len(), TAG_SEARCH_LIMIT as usize);
        assert_eq!(hits[0].name, "genre_00");
        assert_eq!(hits[19].name, "genre_19");

        assert_eq!(catalog.list_all_tags()?.len(), 31);
        Ok(())
    }

    #[test]
    fn upsert_tag_ignores_blank_and_duplicate_names() -> Result<()> {
        let catalog = Catalog::open_in_memory()?;
        catalog.upsert_tag("  ")?;
        catalog.upsert_tag(" ambient ")?;
        catalog.upsert_tag("ambient")?;

        let tags = catalog.list_all_tags()?;
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "ambient");
        Ok(())
    }

    #[test]
    fn get_and_delete_favorite() -> Result<()> {
        let mut catalog = Catalog::open_in_memory()?;
        assert_eq!(catalog.get_favorite("/nope")?, None);

        catalog.upsert_favorite("/p", "p", "P", "desc")?;
        catalog.set_directory_tags("/p", ["x"])?;
        let favorite = catalog.get_favorite("/p")?.unwrap();
        assert_eq!(favorite.tags, ["x"]);

        assert!(catalog.delete_favorite("/p")?);
        assert!(!catalog.delete_favorite("/p")?);
        assert_eq!(catalog.get_favorite("/p")?, None);
        assert!(catalog.directory_tags("/p")?.is_empty());
        assert_eq!(catalog.list_all_tags()?.len(), 1);
        Ok(())
    }

    #[test]
    fn trailing_slash_is_a_different_directory() -> Result<()> {
        let catalog = Catalog::open_in_memory()?;
        catalog.upsert_favorite("/music", "music", "A", "")?;
        catalog.upsert_favorite("/music/", "music", "B", "")?;
        assert_eq!(catalog.list_favorites(&FavoriteQuery::default())?.total, 2);
        Ok(())
    }
}
