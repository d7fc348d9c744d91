use crate::photoarchive_core::ArchiveError;
use crate::photoarchive_core::photo::{Category, NewCategory, NewPhoto, Photo};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};
use std::path::Path;

const CATEGORY_COLUMNS: &str = "id, name, display_name, color_hex, is_default, position";
const PHOTO_COLUMNS: &str =
    "id, category_id, local_id, original_name, timestamp, is_favorite, file_size, hash";

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Connect to the database at the specified path. Run migrations if necessary.
    pub fn new(path: &Path) -> Result<Self, ArchiveError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, ArchiveError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(mut conn: Connection) -> Result<Self, ArchiveError> {
        conn.pragma_update(None, "journal_mode", "WAL")?; // Use WAL mode for better concurrency
        conn.pragma_update(None, "foreign_keys", "ON")?; // Enable foreign key constraints

        let migrations = Migrations::new(vec![M::up(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                display_name TEXT NOT NULL COLLATE NOCASE UNIQUE,
                color_hex TEXT NOT NULL,
                is_default INTEGER NOT NULL DEFAULT 0,
                position INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS photos (
                id INTEGER PRIMARY KEY,
                category_id INTEGER NOT NULL,
                local_id TEXT UNIQUE NOT NULL,
                original_name TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                file_size INTEGER NOT NULL,
                hash TEXT,
                FOREIGN KEY (category_id) REFERENCES categories(id)
            );
            CREATE INDEX IF NOT EXISTS idx_photos_category_name ON photos (category_id, original_name);
            CREATE INDEX IF NOT EXISTS idx_photos_hash ON photos (hash);
            "#,
        )]);

        migrations.to_latest(&mut conn)?;

        Ok(Database { conn })
    }

    pub fn categories(&self) -> Result<Vec<Category>, ArchiveError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM categories ORDER BY position, id",
            CATEGORY_COLUMNS
        ))?;
        let rows = stmt.query_map([], category_from_row)?;

        let mut categories = Vec::new();
        for row in rows {
            categories.push(row?);
        }
        Ok(categories)
    }

    pub fn category_by_display_name(
        &self,
        display_name: &str,
    ) -> Result<Option<Category>, ArchiveError> {
        // display_name is declared COLLATE NOCASE
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM categories WHERE display_name = ?1",
                    CATEGORY_COLUMNS
                ),
                params![display_name],
                category_from_row,
            )
            .optional()?)
    }

    pub fn category_by_name(&self, name: &str) -> Result<Option<Category>, ArchiveError> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM categories WHERE name = ?1 ORDER BY id LIMIT 1",
                    CATEGORY_COLUMNS
                ),
                params![name],
                category_from_row,
            )
            .optional()?)
    }

    pub fn insert_category(&self, category: &NewCategory) -> Result<Category, ArchiveError> {
        self.conn
            .execute(
                "INSERT INTO categories (name, display_name, color_hex, is_default, position)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    category.name,
                    category.display_name,
                    category.color_hex,
                    category.is_default,
                    category.position,
                ],
            )
            .map_err(|e| unique_violation(e, &category.display_name))?;

        Ok(Category {
            id: self.conn.last_insert_rowid(),
            name: category.name.clone(),
            display_name: category.display_name.clone(),
            color_hex: category.color_hex.clone(),
            is_default: category.is_default,
            position: category.position,
        })
    }

    pub fn update_category(&self, category: &Category) -> Result<(), ArchiveError> {
        let changed = self
            .conn
            .execute(
                "UPDATE categories
                 SET name = ?1, display_name = ?2, color_hex = ?3, is_default = ?4, position = ?5
                 WHERE id = ?6",
                params![
                    category.name,
                    category.display_name,
                    category.color_hex,
                    category.is_default,
                    category.position,
                    category.id,
                ],
            )
            .map_err(|e| unique_violation(e, &category.display_name))?;

        if changed == 0 {
            return Err(ArchiveError::CategoryNotFound(category.id.to_string()));
        }
        Ok(())
    }

    pub fn delete_category(&self, id: i64) -> Result<(), ArchiveError> {
        self.conn
            .execute("DELETE FROM categories WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn photos(&self) -> Result<Vec<Photo>, ArchiveError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM photos ORDER BY id", PHOTO_COLUMNS))?;
        let rows = stmt.query_map([], photo_from_row)?;

        let mut photos = Vec::new();
        for row in rows {
            photos.push(row?);
        }
        Ok(photos)
    }

    pub fn photo_by_id(&self, id: i64) -> Result<Option<Photo>, ArchiveError> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM photos WHERE id = ?1", PHOTO_COLUMNS),
                params![id],
                photo_from_row,
            )
            .optional()?)
    }

    pub fn photo_by_name(
        &self,
        category_id: i64,
        original_name: &str,
    ) -> Result<Option<Photo>, ArchiveError> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM photos WHERE category_id = ?1 AND original_name = ?2 LIMIT 1",
                    PHOTO_COLUMNS
                ),
                params![category_id, original_name],
                photo_from_row,
            )
            .optional()?)
    }

    pub fn photo_by_hash(
        &self,
        category_id: i64,
        hash: &str,
    ) -> Result<Option<Photo>, ArchiveError> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM photos WHERE category_id = ?1 AND hash = ?2 LIMIT 1",
                    PHOTO_COLUMNS
                ),
                params![category_id, hash],
                photo_from_row,
            )
            .optional()?)
    }

    pub fn hash_exists(&self, hash: &str) -> Result<bool, ArchiveError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM photos WHERE hash = ?1",
            params![hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn insert_photo(&self, photo: &NewPhoto) -> Result<Photo, ArchiveError> {
        self.conn.execute(
            "INSERT INTO photos (category_id, local_id, original_name, timestamp, is_favorite, file_size, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                photo.category_id,
                photo.local_id,
                photo.original_name,
                photo.timestamp,
                photo.is_favorite,
                photo.file_size as i64,
                photo.hash,
            ],
        )?;

        Ok(Photo {
            id: self.conn.last_insert_rowid(),
            category_id: photo.category_id,
            local_id: photo.local_id.clone(),
            original_name: photo.original_name.clone(),
            timestamp: photo.timestamp,
            is_favorite: photo.is_favorite,
            file_size: photo.file_size,
            hash: photo.hash.clone(),
        })
    }

    pub fn delete_photo(&self, id: i64) -> Result<(), ArchiveError> {
        self.conn
            .execute("DELETE FROM photos WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Photo count per category id, including empty categories.
    pub fn photo_counts(&self) -> Result<Vec<(Category, i64)>, ArchiveError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.name, c.display_name, c.color_hex, c.is_default, c.position, COUNT(p.id)
             FROM categories c
             LEFT JOIN photos p ON p.category_id = c.id
             GROUP BY c.id
             ORDER BY c.position, c.id",
        )?;
        let rows = stmt.query_map([], |row| Ok((category_from_row(row)?, row.get(6)?)))?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    pub fn photo_count(&self) -> Result<i64, ArchiveError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?)
    }

    pub fn total_photo_size(&self) -> Result<i64, ArchiveError> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(SUM(file_size), 0) FROM photos",
            [],
            |row| row.get(0),
        )?)
    }
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        color_hex: row.get(3)?,
        is_default: row.get(4)?,
        position: row.get(5)?,
    })
}

fn photo_from_row(row: &Row<'_>) -> rusqlite::Result<Photo> {
    let file_size: i64 = row.get(6)?;
    Ok(Photo {
        id: row.get(0)?,
        category_id: row.get(1)?,
        local_id: row.get(2)?,
        original_name: row.get(3)?,
        timestamp: row.get(4)?,
        is_favorite: row.get(5)?,
        file_size: file_size.max(0) as u64,
        hash: row.get(7)?,
    })
}

/// Map a UNIQUE constraint failure on display_name to `DuplicateName`.
fn unique_violation(err: rusqlite::Error, display_name: &str) -> ArchiveError {
    match err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            ArchiveError::DuplicateName(display_name.to_string())
        }
        other => ArchiveError::Database(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_unique_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        db.insert_category(&NewCategory::named("Animals", "#FF0000", 0))
            .unwrap();

        let err = db
            .insert_category(&NewCategory::named("animals", "#00FF00", 1))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::DuplicateName(name) if name == "animals"));

        let found = db.category_by_display_name("ANIMALS").unwrap().unwrap();
        assert_eq!(found.display_name, "Animals");
    }

    #[test]
    fn test_photo_lookup_and_counts() {
        let db = Database::open_in_memory().unwrap();
        let animals = db
            .insert_category(&NewCategory::named("Animals", "#FF0000", 0))
            .unwrap();
        db.insert_category(&NewCategory::named("Empty", "#00FF00", 1))
            .unwrap();

        db.insert_photo(&NewPhoto {
            category_id: animals.id,
            local_id: "one.jpg".into(),
            original_name: "cat.jpg".into(),
            timestamp: 1_700_000_000_000,
            is_favorite: true,
            file_size: 42,
            hash: Some("h1".into()),
        })
        .unwrap();

        assert!(db.photo_by_name(animals.id, "cat.jpg").unwrap().is_some());
        assert!(db.photo_by_name(animals.id, "dog.jpg").unwrap().is_none());
        assert!(db.photo_by_hash(animals.id, "h1").unwrap().is_some());
        assert!(db.hash_exists("h1").unwrap());

        let counts = db.photo_counts().unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].1, 1);
        assert_eq!(counts[1].1, 0);
        assert_eq!(db.total_photo_size().unwrap(), 42);
    }

    #[test]
    fn test_delete_category_with_photos_is_refused() {
        let db = Database::open_in_memory().unwrap();
        let animals = db
            .insert_category(&NewCategory::named("Animals", "#FF0000", 0))
            .unwrap();
        let photo = db
            .insert_photo(&NewPhoto {
                category_id: animals.id,
                local_id: "one.jpg".into(),
                original_name: "cat.jpg".into(),
                timestamp: 0,
                is_favorite: false,
                file_size: 1,
                hash: None,
            })
            .unwrap();

        assert!(db.delete_category(animals.id).is_err());
        db.delete_photo(photo.id).unwrap();
        db.delete_category(animals.id).unwrap();
        assert!(db.categories().unwrap().is_empty());
    }
}
