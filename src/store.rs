use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

use crate::error::Result;

/// The Store owns the SQLite catalog database: images, tags, the
/// image/tag association table and the per-language tag overrides.
///
/// It hands out request-scoped connections; callers open one lazily,
/// run a single engine operation against it and drop it when the
/// request ends. SQLite's single-writer lock serializes concurrent
/// mutations, the busy timeout makes contending writers wait instead
/// of failing immediately.
#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
}

impl Store {
    pub fn new(db_path: impl Into<PathBuf>) -> Store {
        Store {
            db_path: db_path.into(),
        }
    }

    /// Open a new connection with the pragmas every caller relies on.
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        // Override rows cascade away with their tag
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Create any missing tables. Safe to run at every startup.
    pub fn ensure_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        apply_schema(&conn)?;
        Ok(())
    }

    /// Drop and recreate all tables, discarding existing data.
    pub fn reset_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            "DROP TABLE IF EXISTS tagged_images;
             DROP TABLE IF EXISTS tag_overrides;
             DROP TABLE IF EXISTS tags;
             DROP TABLE IF EXISTS images;",
        )?;
        apply_schema(&conn)?;
        Ok(())
    }

    /// Get a count of images known to the catalog.
    pub fn image_count(&self) -> Result<i64> {
        let conn = self.connect()?;
        let count = conn.query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get a count of defined tags.
    pub fn tag_count(&self) -> Result<i64> {
        let conn = self.connect()?;
        let count = conn.query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

/// Initialize the catalog schema on an open connection.
///
/// `used` is a denormalized count of associations; every engine
/// operation that touches `tagged_images` keeps it in step within the
/// same transaction. Overrides are a sparse per-language overlay keyed
/// by `(tag_id, lang)`; absent rows fall back to the base tag.
pub fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS images (
             image_id    INTEGER PRIMARY KEY AUTOINCREMENT,
             fn          TEXT NOT NULL UNIQUE
         );

         CREATE TABLE IF NOT EXISTS tags (
             tag_id      INTEGER PRIMARY KEY AUTOINCREMENT,
             name        TEXT NOT NULL,
             description TEXT,
             used        INTEGER NOT NULL DEFAULT 0,
             lang        TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS tag_overrides (
             tag_id      INTEGER NOT NULL REFERENCES tags(tag_id) ON DELETE CASCADE,
             lang        TEXT NOT NULL,
             name        TEXT,
             description TEXT,
             PRIMARY KEY (tag_id, lang)
         );

         CREATE TABLE IF NOT EXISTS tagged_images (
             image_id    INTEGER NOT NULL REFERENCES images(image_id),
             tag_id      INTEGER NOT NULL REFERENCES tags(tag_id),
             PRIMARY KEY (image_id, tag_id)
         );

         CREATE INDEX IF NOT EXISTS idx_tagged_images_tag_id
             ON tagged_images (tag_id);",
    )
}

/// Open an in-memory catalog with the schema applied. Test helper.
#[cfg(test)]
pub fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("in-memory database");
    conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
    apply_schema(&conn).expect("schema");
    conn
}
