use std::{fs, io, path::Path, time::SystemTime};

use base64::{Engine, engine::general_purpose};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// Image file extensions accepted by `add` (lowercase).
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp", "heic", "heif", "avif", "dng",
];

/// Calculate the SHA256 hash of a file at the given path and returns it as base64.
pub fn hash_file(path: &Path) -> Result<String, io::Error> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    let hash = hasher.finalize();
    let hash_base64 = general_purpose::STANDARD.encode(hash);

    Ok(hash_base64)
}

/// Determines whether a file is an image based on its extension.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Modification time of a file in milliseconds since the Unix epoch, falling back to now.
pub fn file_timestamp_millis(metadata: &fs::Metadata) -> i64 {
    let modified = metadata.modified().unwrap_or_else(|e| {
        log::warn!("Failed to get modified time: {}. Using current time.", e);
        SystemTime::now()
    });
    millis(OffsetDateTime::from(modified))
}

pub fn millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_hash_file_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        fs::write(&a, b"same bytes").unwrap();
        fs::write(&b, b"same bytes").unwrap();

        let hash = hash_file(&a).unwrap();
        assert_eq!(hash, hash_file(&b).unwrap());
        assert_eq!(hash.len(), 44);
    }

    #[test]
    fn test_is_image() {
        assert!(is_image(Path::new("IMG_0001.JPG")));
        assert!(is_image(Path::new("dir/photo.heic")));
        assert!(!is_image(Path::new("notes.txt")));
        assert!(!is_image(Path::new("README")));
    }

    #[test]
    fn test_millis() {
        assert_eq!(millis(datetime!(1970-01-01 0:00:01 UTC)), 1_000);
        assert_eq!(millis(datetime!(2023-11-14 22:13:20 UTC)), 1_700_000_000_000);
    }
}
