use std::path::Path;

/// Internal name of the fallback category for photos without one.
pub const UNCATEGORIZED_NAME: &str = "uncategorized";

/// Display name given to a freshly created fallback category.
pub const UNCATEGORIZED_DISPLAY_NAME: &str = "Uncategorized";

pub const DEFAULT_COLOR_HEX: &str = "#9E9E9E";

/// A category as stored in a destination library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub color_hex: String,
    pub is_default: bool,
    pub position: i64,
}

/// Fields for a category that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    pub name: String,
    pub display_name: String,
    pub color_hex: String,
    pub is_default: bool,
    pub position: i64,
}

impl NewCategory {
    /// The fallback category used when a photo has no category of its own.
    pub fn uncategorized(position: i64) -> Self {
        NewCategory {
            name: UNCATEGORIZED_NAME.to_string(),
            display_name: UNCATEGORIZED_DISPLAY_NAME.to_string(),
            color_hex: DEFAULT_COLOR_HEX.to_string(),
            is_default: true,
            position,
        }
    }

    /// Category named after its display name, e.g. "Family Trips" -> "family_trips".
    pub fn named(display_name: &str, color_hex: &str, position: i64) -> Self {
        NewCategory {
            name: internal_name(display_name),
            display_name: display_name.to_string(),
            color_hex: color_hex.to_string(),
            is_default: false,
            position,
        }
    }
}

/// A photo as stored in a destination library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    pub id: i64,
    pub category_id: i64,
    /// Storage identifier, also the file name under the library's photo directory.
    pub local_id: String,
    pub original_name: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub is_favorite: bool,
    pub file_size: u64,
    pub hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPhoto {
    pub category_id: i64,
    pub local_id: String,
    pub original_name: String,
    pub timestamp: i64,
    pub is_favorite: bool,
    pub file_size: u64,
    pub hash: Option<String>,
}

/// Lowercased, underscore-separated form of a display name.
pub fn internal_name(display_name: &str) -> String {
    let name: String = display_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        "category".to_string()
    } else {
        name
    }
}

/// Generate a fresh storage identifier, keeping the extension of `original_name`.
pub fn new_local_id(original_name: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    match Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
    {
        Some(ext) if !ext.is_empty() => format!("{}.{}", id, ext.to_lowercase()),
        _ => id,
    }
}
