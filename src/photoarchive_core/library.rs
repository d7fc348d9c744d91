use crate::photoarchive_core::database::Database;
use crate::photoarchive_core::error::{ArchiveError, Result};
use crate::photoarchive_core::photo::{
    Category, NewCategory, NewPhoto, Photo, new_local_id,
};
use crate::photoarchive_core::store::{PhotoStore, next_position};
use crate::photoarchive_core::workers::{file_timestamp_millis, hash_file, is_image};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const DB_FILE_NAME: &str = "library.db";
const PHOTOS_DIR: &str = "photos";
const SCRATCH_DIR: &str = ".scratch";

/// A categorized photo library: a SQLite database plus a directory of photo files.
pub struct Library {
    root: PathBuf,
    db: Database,
}

/// Statistics from adding photos to a library.
#[derive(Debug, Default)]
pub struct AddStats {
    pub photos_added: usize,
    pub duplicates_skipped: usize,
    pub errors: usize,
}

impl Library {
    /// Create a new library at the specified directory.
    /// If a library (including db) already exists, return an error.
    /// If the directory does not exist, it will be created.
    pub fn create(dir: &Path) -> Result<Self> {
        if dir.exists() {
            if dir.join(DB_FILE_NAME).exists() {
                return Err(ArchiveError::LibraryExists(dir.to_path_buf()));
            }
        } else {
            fs::create_dir_all(dir)?;
        }

        fs::create_dir_all(dir.join(PHOTOS_DIR))?;

        let db = Database::new(&dir.join(DB_FILE_NAME))?;
        let mut lib = Library {
            root: dir.to_path_buf(),
            db,
        };
        lib.ensure_uncategorized()?;

        Ok(lib)
    }

    /// Open an existing library.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            return Err(ArchiveError::LibraryNotFound(dir.to_path_buf()));
        }

        let db_path = dir.join(DB_FILE_NAME);
        if !db_path.exists() {
            return Err(ArchiveError::InvalidLibrary(dir.to_path_buf()));
        }

        fs::create_dir_all(dir.join(PHOTOS_DIR))?;
        let db = Database::new(&db_path)?;

        Ok(Library {
            root: dir.to_path_buf(),
            db,
        })
    }

    /// Get the library root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding photo files.
    pub fn photos_dir(&self) -> PathBuf {
        self.root.join(PHOTOS_DIR)
    }

    /// Parent directory for import scratch extraction, on the same filesystem as the library.
    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join(SCRATCH_DIR)
    }

    /// Get a reference to the database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Get a mutable reference to the database.
    pub fn database_mut(&mut self) -> &mut Database {
        &mut self.db
    }

    /// Create a category from a display name.
    pub fn add_category(&mut self, display_name: &str, color_hex: &str) -> Result<Category> {
        if display_name.trim().is_empty() {
            return Err(ArchiveError::Argument(
                "Category name must not be empty".to_string(),
            ));
        }
        let position = next_position(&self.db.categories()?);
        self.db
            .insert_category(&NewCategory::named(display_name.trim(), color_hex, position))
    }

    /// Add image files from a directory into a category (the fallback category if `None`).
    /// Files whose content is already in the library are skipped.
    pub fn add_photos(
        &mut self,
        source_dir: &Path,
        category: Option<&str>,
        favorite: bool,
    ) -> Result<AddStats> {
        if !source_dir.exists() || !source_dir.is_dir() {
            return Err(ArchiveError::NotADirectory(source_dir.to_path_buf()));
        }

        let category = match category {
            Some(name) => self
                .db
                .category_by_display_name(name)?
                .ok_or_else(|| ArchiveError::CategoryNotFound(name.to_string()))?,
            None => self.ensure_uncategorized()?,
        };

        log::info!(
            "Adding photos from {} to category '{}'",
            source_dir.display(),
            category.display_name
        );

        let paths: Vec<PathBuf> = WalkDir::new(source_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| is_image(p))
            .collect();

        let mut stats = AddStats::default();
        for path in paths {
            match self.add_photo(&path, category.id, favorite) {
                Ok(true) => stats.photos_added += 1,
                Ok(false) => stats.duplicates_skipped += 1,
                Err(e) => {
                    log::warn!("Error adding {}: {}", path.display(), e);
                    stats.errors += 1;
                }
            }
        }

        log::info!(
            "Added {} photos ({} duplicates skipped, {} errors)",
            stats.photos_added,
            stats.duplicates_skipped,
            stats.errors
        );
        Ok(stats)
    }

    /// Returns `false` when the file's content is already in the library.
    fn add_photo(&mut self, path: &Path, category_id: i64, favorite: bool) -> Result<bool> {
        let hash = hash_file(path)?;
        if self.db.hash_exists(&hash)? {
            log::debug!("Skipping duplicate (already in library): {}", path.display());
            return Ok(false);
        }

        let metadata = fs::metadata(path)?;
        let original_name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let local_id = new_local_id(&original_name);

        self.store_photo_file(path, &local_id)?;
        let inserted = self.insert_photo(&NewPhoto {
            category_id,
            local_id: local_id.clone(),
            original_name,
            timestamp: file_timestamp_millis(&metadata),
            is_favorite: favorite,
            file_size: metadata.len(),
            hash: Some(hash),
        });
        if let Err(e) = inserted {
            self.discard_photo_file(&local_id)?;
            return Err(e);
        }
        Ok(true)
    }
}

impl PhotoStore for Library {
    fn categories(&self) -> Result<Vec<Category>> {
        self.db.categories()
    }

    fn photos(&self) -> Result<Vec<Photo>> {
        self.db.photos()
    }

    fn find_category_by_display_name(&self, display_name: &str) -> Result<Option<Category>> {
        self.db.category_by_display_name(display_name)
    }

    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        self.db.category_by_name(name)
    }

    fn create_category(&mut self, category: &NewCategory) -> Result<Category> {
        self.db.insert_category(category)
    }

    fn update_category(&mut self, category: &Category) -> Result<()> {
        self.db.update_category(category)
    }

    fn delete_category(&mut self, id: i64) -> Result<()> {
        self.db.delete_category(id)
    }

    fn find_photo(&self, category_id: i64, name: &str) -> Result<Option<Photo>> {
        self.db.photo_by_name(category_id, name)
    }

    fn find_photo_by_hash(&self, category_id: i64, hash: &str) -> Result<Option<Photo>> {
        self.db.photo_by_hash(category_id, hash)
    }

    fn store_photo_file(&mut self, source: &Path, local_id: &str) -> Result<PathBuf> {
        let destination = self.photos_dir().join(local_id);
        fs::copy(source, &destination)?;
        Ok(destination)
    }

    fn discard_photo_file(&mut self, local_id: &str) -> Result<()> {
        let path = self.photos_dir().join(local_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn insert_photo(&mut self, photo: &NewPhoto) -> Result<Photo> {
        self.db.insert_photo(photo)
    }

    fn delete_photo(&mut self, id: i64) -> Result<()> {
        let Some(photo) = self.db.photo_by_id(id)? else {
            return Ok(());
        };
        self.db.delete_photo(id)?;
        if let Err(e) = self.discard_photo_file(&photo.local_id) {
            log::warn!("Failed to remove file for photo {}: {}", id, e);
        }
        Ok(())
    }

    fn photo_path(&self, photo: &Photo) -> PathBuf {
        self.photos_dir().join(&photo.local_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("lib");

        let lib = Library::create(&root).unwrap();
        assert!(root.join(DB_FILE_NAME).exists());
        assert!(lib.photos_dir().exists());

        let categories = lib.categories().unwrap();
        assert_eq!(categories.len(), 1);
        assert!(categories[0].is_default);
        drop(lib);

        assert!(matches!(
            Library::create(&root),
            Err(ArchiveError::LibraryExists(_))
        ));
        let reopened = Library::open(&root).unwrap();
        assert_eq!(reopened.categories().unwrap().len(), 1);
    }

    #[test]
    fn test_open_missing_library() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Library::open(&dir.path().join("nope")),
            Err(ArchiveError::LibraryNotFound(_))
        ));
        assert!(matches!(
            Library::open(dir.path()),
            Err(ArchiveError::InvalidLibrary(_))
        ));
    }

    #[test]
    fn test_add_photos_skips_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut lib = Library::create(&dir.path().join("lib")).unwrap();
        let source = dir.path().join("source");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("a.jpg"), b"first").unwrap();
        fs::write(source.join("b.JPG"), b"first").unwrap();
        fs::write(source.join("c.png"), b"second").unwrap();
        fs::write(source.join("notes.txt"), b"ignored").unwrap();

        lib.add_category("Animals", "#FF0000").unwrap();
        let stats = lib.add_photos(&source, Some("animals"), true).unwrap();
        assert_eq!(stats.photos_added, 2);
        assert_eq!(stats.duplicates_skipped, 1);

        let photos = lib.photos().unwrap();
        assert_eq!(photos.len(), 2);
        assert!(photos.iter().all(|p| p.is_favorite));
        assert!(photos.iter().all(|p| lib.photo_path(p).exists()));

        assert!(matches!(
            lib.add_photos(&source, Some("Plants"), false),
            Err(ArchiveError::CategoryNotFound(_))
        ));
    }
}
