use crate::photoarchive_core::error::{ArchiveError, Result};
use crate::photoarchive_core::photo::{Category, NewCategory, NewPhoto, Photo, UNCATEGORIZED_NAME};
use std::fs;
use std::path::{Path, PathBuf};

/// Create/read/update/delete and name lookup for categories and photos.
pub trait PhotoStore {
    /// All categories ordered by position.
    fn categories(&self) -> Result<Vec<Category>>;

    /// All photos ordered by id.
    fn photos(&self) -> Result<Vec<Photo>>;

    /// Case-insensitive lookup by display name.
    fn find_category_by_display_name(&self, display_name: &str) -> Result<Option<Category>>;

    /// Exact lookup by internal name.
    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>>;

    fn create_category(&mut self, category: &NewCategory) -> Result<Category>;

    fn update_category(&mut self, category: &Category) -> Result<()>;

    /// Fails if the category still has photos.
    fn delete_category(&mut self, id: i64) -> Result<()>;

    /// Photo in `category_id` whose original name matches `name`.
    fn find_photo(&self, category_id: i64, name: &str) -> Result<Option<Photo>>;

    fn find_photo_by_hash(&self, category_id: i64, hash: &str) -> Result<Option<Photo>>;

    /// Copy `source` into permanent storage under `local_id`.
    fn store_photo_file(&mut self, source: &Path, local_id: &str) -> Result<PathBuf>;

    /// Remove a file previously written by [`PhotoStore::store_photo_file`].
    fn discard_photo_file(&mut self, local_id: &str) -> Result<()>;

    fn insert_photo(&mut self, photo: &NewPhoto) -> Result<Photo>;

    /// Delete the photo row and its file.
    fn delete_photo(&mut self, id: i64) -> Result<()>;

    /// Location of a stored photo's bytes.
    fn photo_path(&self, photo: &Photo) -> PathBuf;

    /// The fallback category for photos without one, created on first use.
    fn ensure_uncategorized(&mut self) -> Result<Category> {
        if let Some(category) = self.find_category_by_name(UNCATEGORIZED_NAME)? {
            return Ok(category);
        }
        let position = next_position(&self.categories()?);
        log::info!("Creating fallback category at position {}", position);
        self.create_category(&NewCategory::uncategorized(position))
    }
}

/// Position after the highest one in use.
pub fn next_position(categories: &[Category]) -> i64 {
    categories
        .iter()
        .map(|c| c.position + 1)
        .max()
        .unwrap_or(0)
}

/// In-memory store. Rows live in vectors; photo bytes are copied into `files_dir`.
#[derive(Debug)]
pub struct MemoryStore {
    files_dir: PathBuf,
    categories: Vec<Category>,
    photos: Vec<Photo>,
    next_id: i64,
}

impl MemoryStore {
    pub fn new(files_dir: &Path) -> Result<Self> {
        fs::create_dir_all(files_dir)?;
        Ok(MemoryStore {
            files_dir: files_dir.to_path_buf(),
            categories: Vec::new(),
            photos: Vec::new(),
            next_id: 1,
        })
    }

    /// Ids start at `first_id`, useful when ids must not collide with another store's.
    pub fn with_first_id(mut self, first_id: i64) -> Self {
        self.next_id = first_id;
        self
    }

    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl PhotoStore for MemoryStore {
    fn categories(&self) -> Result<Vec<Category>> {
        let mut categories = self.categories.clone();
        categories.sort_by_key(|c| (c.position, c.id));
        Ok(categories)
    }

    fn photos(&self) -> Result<Vec<Photo>> {
        Ok(self.photos.clone())
    }

    fn find_category_by_display_name(&self, display_name: &str) -> Result<Option<Category>> {
        let wanted = display_name.to_lowercase();
        Ok(self
            .categories
            .iter()
            .find(|c| c.display_name.to_lowercase() == wanted)
            .cloned())
    }

    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        Ok(self.categories.iter().find(|c| c.name == name).cloned())
    }

    fn create_category(&mut self, category: &NewCategory) -> Result<Category> {
        if self
            .find_category_by_display_name(&category.display_name)?
            .is_some()
        {
            return Err(ArchiveError::DuplicateName(category.display_name.clone()));
        }
        let created = Category {
            id: self.allocate_id(),
            name: category.name.clone(),
            display_name: category.display_name.clone(),
            color_hex: category.color_hex.clone(),
            is_default: category.is_default,
            position: category.position,
        };
        self.categories.push(created.clone());
        Ok(created)
    }

    fn update_category(&mut self, category: &Category) -> Result<()> {
        let wanted = category.display_name.to_lowercase();
        if self
            .categories
            .iter()
            .any(|c| c.id != category.id && c.display_name.to_lowercase() == wanted)
        {
            return Err(ArchiveError::DuplicateName(category.display_name.clone()));
        }
        let existing = self
            .categories
            .iter_mut()
            .find(|c| c.id == category.id)
            .ok_or_else(|| ArchiveError::CategoryNotFound(category.id.to_string()))?;
        *existing = category.clone();
        Ok(())
    }

    fn delete_category(&mut self, id: i64) -> Result<()> {
        if self.photos.iter().any(|p| p.category_id == id) {
            return Err(ArchiveError::Other(format!(
                "Category {} still has photos",
                id
            )));
        }
        self.categories.retain(|c| c.id != id);
        Ok(())
    }

    fn find_photo(&self, category_id: i64, name: &str) -> Result<Option<Photo>> {
        Ok(self
            .photos
            .iter()
            .find(|p| p.category_id == category_id && p.original_name == name)
            .cloned())
    }

    fn find_photo_by_hash(&self, category_id: i64, hash: &str) -> Result<Option<Photo>> {
        Ok(self
            .photos
            .iter()
            .find(|p| p.category_id == category_id && p.hash.as_deref() == Some(hash))
            .cloned())
    }

    fn store_photo_file(&mut self, source: &Path, local_id: &str) -> Result<PathBuf> {
        let destination = self.files_dir.join(local_id);
        fs::copy(source, &destination)?;
        Ok(destination)
    }

    fn discard_photo_file(&mut self, local_id: &str) -> Result<()> {
        let path = self.files_dir.join(local_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn insert_photo(&mut self, photo: &NewPhoto) -> Result<Photo> {
        if !self.categories.iter().any(|c| c.id == photo.category_id) {
            return Err(ArchiveError::CategoryNotFound(photo.category_id.to_string()));
        }
        let inserted = Photo {
            id: self.allocate_id(),
            category_id: photo.category_id,
            local_id: photo.local_id.clone(),
            original_name: photo.original_name.clone(),
            timestamp: photo.timestamp,
            is_favorite: photo.is_favorite,
            file_size: photo.file_size,
            hash: photo.hash.clone(),
        };
        self.photos.push(inserted.clone());
        Ok(inserted)
    }

    fn delete_photo(&mut self, id: i64) -> Result<()> {
        let Some(index) = self.photos.iter().position(|p| p.id == id) else {
            return Ok(());
        };
        let photo = self.photos.remove(index);
        self.discard_photo_file(&photo.local_id)
    }

    fn photo_path(&self, photo: &Photo) -> PathBuf {
        self.files_dir.join(&photo.local_id)
    }
}
