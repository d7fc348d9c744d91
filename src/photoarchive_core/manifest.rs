use crate::photoarchive_core::error::{ArchiveError, Result};
use crate::photoarchive_core::photo::{Category, Photo};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use time::OffsetDateTime;

/// Current archive format version. Other versions are rejected.
pub const MANIFEST_VERSION: u32 = 1;

/// Fixed path of the manifest inside an archive.
pub const MANIFEST_PATH: &str = "manifest.json";

/// Fixed subdirectory for photo files inside an archive.
pub const PHOTOS_PREFIX: &str = "photos";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub categories: Vec<CategoryRecord>,
    pub photos: Vec<PhotoRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub color_hex: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub id: i64,
    pub category_id: Option<i64>,
    /// Archive-relative path of the photo's bytes.
    pub file_name: String,
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub file_size: u64,
}

impl CategoryRecord {
    pub fn from_category(category: &Category) -> Self {
        CategoryRecord {
            id: category.id,
            name: category.name.clone(),
            display_name: category.display_name.clone(),
            color_hex: category.color_hex.clone(),
            is_default: category.is_default,
            position: category.position,
        }
    }
}

impl PhotoRecord {
    /// Record for `photo` stored at `photos/<index>.<ext>`.
    pub fn from_photo(photo: &Photo, index: usize, file_size: u64) -> Self {
        PhotoRecord {
            id: photo.id,
            category_id: Some(photo.category_id),
            file_name: archive_photo_path(index, &photo.original_name),
            original_name: photo.original_name.clone(),
            timestamp: photo.timestamp,
            is_favorite: photo.is_favorite,
            file_size,
        }
    }

    /// Name used for duplicate detection: the original name, or the file name's last segment.
    pub fn display_name(&self) -> &str {
        if !self.original_name.is_empty() {
            return &self.original_name;
        }
        self.file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.file_name)
    }

    /// Archive-relative path of the bytes. A bare file name lives under `photos/`.
    pub fn archive_path(&self) -> String {
        if self.file_name.contains('/') {
            self.file_name.clone()
        } else {
            format!("{}/{}", PHOTOS_PREFIX, self.file_name)
        }
    }
}

/// Index-based archive path, keeping the original extension.
pub fn archive_photo_path(index: usize, original_name: &str) -> String {
    match Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
    {
        Some(ext) if !ext.is_empty() => {
            format!("{}/{}.{}", PHOTOS_PREFIX, index, ext.to_lowercase())
        }
        _ => format!("{}/{}", PHOTOS_PREFIX, index),
    }
}

impl Manifest {
    pub fn new(categories: Vec<CategoryRecord>, photos: Vec<PhotoRecord>) -> Self {
        Manifest {
            version: MANIFEST_VERSION,
            created_at: OffsetDateTime::now_utc(),
            categories,
            photos,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse and check a manifest read from an untrusted archive.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(bytes)
            .map_err(|e| ArchiveError::ArchiveCorrupt(format!("unreadable manifest: {}", e)))?;
        manifest.check()?;
        Ok(manifest)
    }

    /// Structural checks: supported version, unique ids, unique display names
    /// (case-insensitive) and photo category references that resolve.
    pub fn check(&self) -> Result<()> {
        if self.version != MANIFEST_VERSION {
            return Err(ArchiveError::ArchiveCorrupt(format!(
                "unsupported manifest version {} (expected {})",
                self.version, MANIFEST_VERSION
            )));
        }

        let mut category_ids = HashSet::new();
        let mut display_names = HashSet::new();
        for category in &self.categories {
            if !category_ids.insert(category.id) {
                return Err(ArchiveError::ArchiveCorrupt(format!(
                    "duplicate category id {}",
                    category.id
                )));
            }
            if category.display_name.trim().is_empty() {
                return Err(ArchiveError::ArchiveCorrupt(format!(
                    "category {} has an empty display name",
                    category.id
                )));
            }
            if !display_names.insert(category.display_name.to_lowercase()) {
                return Err(ArchiveError::DuplicateName(category.display_name.clone()));
            }
        }

        let mut photo_ids = HashSet::new();
        for photo in &self.photos {
            if !photo_ids.insert(photo.id) {
                return Err(ArchiveError::ArchiveCorrupt(format!(
                    "duplicate photo id {}",
                    photo.id
                )));
            }
            if let Some(category_id) = photo.category_id {
                if !category_ids.contains(&category_id) {
                    return Err(ArchiveError::ArchiveCorrupt(format!(
                        "photo {} references unknown category {}",
                        photo.id, category_id
                    )));
                }
            }
        }

        Ok(())
    }
}
