// Library-level export/import tests against the SQLite store
use photoarchive::photoarchive_core::progress::NoopSink;
use photoarchive::photoarchive_core::validate::validate_archive;
use photoarchive::photoarchive_core::{
    ArchiveError, CancelToken, ImportOptions, ImportSummary, Library, Manifest, PhotoStore,
    ProgressReporter, SecurityViolation, Strategy, ValidationLimits, run_export, run_import,
};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn library_with_photos(root: &Path, name: &str, layout: &[(&str, &[&str])]) -> Library {
    let mut lib = Library::create(&root.join(name)).unwrap();
    for (category, files) in layout {
        let source = root.join(format!("{}-{}", name, category));
        fs::create_dir_all(&source).unwrap();
        for file in *files {
            fs::write(source.join(file), format!("{}/{}/{}", name, category, file)).unwrap();
        }
        if lib.database().category_by_display_name(category).unwrap().is_none() {
            lib.add_category(category, "#336699").unwrap();
        }
        lib.add_photos(&source, Some(*category), false).unwrap();
    }
    lib
}

fn counts_by_category(lib: &Library) -> BTreeMap<String, i64> {
    lib.database()
        .photo_counts()
        .unwrap()
        .into_iter()
        .map(|(c, n)| (c.display_name, n))
        .collect()
}

fn export(lib: &Library, archive: &Path) {
    run_export(lib, archive, ProgressReporter::new(NoopSink), &CancelToken::new()).unwrap();
}

fn import(
    lib: &mut Library,
    archive: &Path,
    strategy: Strategy,
) -> Result<ImportSummary, ArchiveError> {
    let options = ImportOptions {
        scratch_parent: Some(lib.scratch_dir()),
        ..ImportOptions::new(strategy)
    };
    run_import(
        lib,
        archive,
        &options,
        ProgressReporter::new(NoopSink),
        &CancelToken::new(),
    )
}

/// Write a zip by hand. Entries are (name, bytes, deflate?).
fn write_zip(path: &Path, entries: &[(&str, Vec<u8>, bool)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, bytes, deflate) in entries {
        let method = if *deflate {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        };
        zip.start_file(*name, SimpleFileOptions::default().compression_method(method))
            .unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

fn manifest_json(photo_file: &str, category_id: Option<i64>) -> Vec<u8> {
    let category = match category_id {
        Some(id) => id.to_string(),
        None => "null".to_string(),
    };
    format!(
        r##"{{"version":1,"createdAt":"2024-05-01T12:00:00Z",
            "categories":[{{"id":1,"name":"animals","displayName":"Animals","colorHex":"#FF0000","isDefault":false,"position":0}}],
            "photos":[{{"id":10,"categoryId":{},"fileName":"{}","originalName":"a.jpg","timestamp":0,"isFavorite":false,"fileSize":3}}]}}"##,
        category, photo_file
    )
    .into_bytes()
}

fn assert_untouched(lib: &Library) {
    assert_eq!(lib.database().photo_count().unwrap(), 0);
    let names: Vec<String> = lib
        .categories()
        .unwrap()
        .into_iter()
        .map(|c| c.display_name)
        .collect();
    assert_eq!(names, vec!["Uncategorized".to_string()]);
    let leftovers = fs::read_dir(lib.scratch_dir())
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[test]
fn test_export_totals_match_validation() {
    let temp = TempDir::new().unwrap();
    let lib = library_with_photos(
        temp.path(),
        "source",
        &[("Animals", &["cat.jpg", "dog.jpg"]), ("Travel", &["paris.png"])],
    );
    let archive = temp.path().join("backup.zip");
    let report = run_export(
        &lib,
        &archive,
        ProgressReporter::new(NoopSink),
        &CancelToken::new(),
    )
    .unwrap();

    let validation = validate_archive(
        &archive,
        &ValidationLimits::default(),
        &ProgressReporter::new(NoopSink),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(validation.entry_count, 3);
    assert_eq!(validation.entry_count, report.photo_count);
    assert_eq!(validation.total_uncompressed_size, report.total_bytes);
    assert_eq!(
        report.total_bytes,
        lib.database().total_photo_size().unwrap() as u64
    );
}

#[test]
fn test_replace_round_trip_reproduces_library() {
    let temp = TempDir::new().unwrap();
    let source = library_with_photos(
        temp.path(),
        "source",
        &[("Animals", &["cat.jpg", "dog.jpg"]), ("Travel", &["paris.png"])],
    );
    let archive = temp.path().join("backup.zip");
    export(&source, &archive);

    let mut destination = library_with_photos(
        temp.path(),
        "destination",
        &[("animals", &["old.jpg"]), ("Work", &["desk.jpg", "pc.jpg"])],
    );
    let old_files: Vec<_> = destination
        .photos()
        .unwrap()
        .iter()
        .map(|p| destination.photo_path(p))
        .collect();

    let summary = import(&mut destination, &archive, Strategy::Replace).unwrap();
    assert_eq!(summary.photos_imported, 3);
    assert_eq!(summary.photos_failed, 0);
    assert_eq!(summary.categories_removed, 1);

    assert_eq!(counts_by_category(&destination), counts_by_category(&source));
    assert!(old_files.iter().all(|p| !p.exists()));

    let mut names: Vec<String> = destination
        .photos()
        .unwrap()
        .into_iter()
        .map(|p| p.original_name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["cat.jpg", "dog.jpg", "paris.png"]);
}

#[test]
fn test_merge_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let source = library_with_photos(temp.path(), "source", &[("Animals", &["cat.jpg"])]);
    let archive = temp.path().join("backup.zip");
    export(&source, &archive);

    let mut destination =
        library_with_photos(temp.path(), "destination", &[("ANIMALS", &["owl.jpg"])]);

    let first = import(&mut destination, &archive, Strategy::Merge).unwrap();
    assert_eq!(first.photos_imported, 1);
    assert_eq!(first.categories_matched, 2);
    assert_eq!(first.categories_imported, 0);
    let after_first = counts_by_category(&destination);
    assert_eq!(after_first.get("ANIMALS"), Some(&2));

    let second = import(&mut destination, &archive, Strategy::Merge).unwrap();
    assert_eq!(second.photos_imported, 0);
    assert_eq!(second.photos_skipped, 1);
    assert_eq!(counts_by_category(&destination), after_first);
}

#[test]
fn test_photo_without_category_lands_in_fallback() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("loose.zip");
    write_zip(
        &archive,
        &[
            ("manifest.json", manifest_json("a.jpg", None), true),
            ("photos/a.jpg", b"abc".to_vec(), false),
        ],
    );

    let mut destination = Library::create(&temp.path().join("destination")).unwrap();
    let summary = import(&mut destination, &archive, Strategy::Merge).unwrap();
    assert_eq!(summary.photos_imported, 1);

    let counts = counts_by_category(&destination);
    assert_eq!(counts.get("Uncategorized"), Some(&1));
    assert_eq!(counts.get("Animals"), Some(&0));
}

#[test]
fn test_traversal_entry_is_rejected_without_writes() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("evil.zip");
    write_zip(
        &archive,
        &[
            ("manifest.json", manifest_json("../../evil.jpg", Some(1)), true),
            ("../../evil.jpg", b"pwn".to_vec(), false),
        ],
    );

    let err = validate_archive(
        &archive,
        &ValidationLimits::default(),
        &ProgressReporter::new(NoopSink),
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ArchiveError::SecurityViolation(SecurityViolation::PathTraversal { .. })
    ));

    let mut destination = Library::create(&temp.path().join("destination")).unwrap();
    let err = import(&mut destination, &archive, Strategy::Merge).unwrap_err();
    assert!(matches!(err, ArchiveError::SecurityViolation(_)));
    assert!(!temp.path().join("evil.jpg").exists());
    assert!(!temp.path().join("destination").join("evil.jpg").exists());
    assert_untouched(&destination);
}

#[test]
fn test_compression_bomb_is_rejected() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("bomb.zip");
    write_zip(
        &archive,
        &[
            ("manifest.json", manifest_json("photos/0.jpg", Some(1)), true),
            ("photos/0.jpg", vec![0u8; 4 * 1024 * 1024], true),
        ],
    );

    let err = validate_archive(
        &archive,
        &ValidationLimits::default(),
        &ProgressReporter::new(NoopSink),
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ArchiveError::SecurityViolation(SecurityViolation::CompressionRatioExceeded { limit: 100, .. })
    ));

    let mut destination = Library::create(&temp.path().join("destination")).unwrap();
    assert!(import(&mut destination, &archive, Strategy::Replace).is_err());
    assert_untouched(&destination);
}

#[test]
fn test_total_size_ceiling() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("big.zip");
    write_zip(
        &archive,
        &[
            ("manifest.json", manifest_json("photos/0.jpg", Some(1)), true),
            ("photos/0.jpg", vec![7u8; 4096], false),
        ],
    );

    let limits = ValidationLimits {
        max_total_uncompressed: 1024,
        ..ValidationLimits::default()
    };
    let err = validate_archive(
        &archive,
        &limits,
        &ProgressReporter::new(NoopSink),
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ArchiveError::SecurityViolation(SecurityViolation::TotalSizeExceeded { limit: 1024 })
    ));
}

#[test]
fn test_corrupt_manifests_abort_before_mutation() {
    let temp = TempDir::new().unwrap();
    let mut destination = Library::create(&temp.path().join("destination")).unwrap();

    let no_manifest = temp.path().join("no-manifest.zip");
    write_zip(&no_manifest, &[("photos/a.jpg", b"abc".to_vec(), false)]);
    assert!(matches!(
        import(&mut destination, &no_manifest, Strategy::Merge),
        Err(ArchiveError::ArchiveCorrupt(_))
    ));

    let dangling = temp.path().join("dangling.zip");
    write_zip(
        &dangling,
        &[
            ("manifest.json", manifest_json("a.jpg", Some(99)), true),
            ("photos/a.jpg", b"abc".to_vec(), false),
        ],
    );
    assert!(matches!(
        import(&mut destination, &dangling, Strategy::Replace),
        Err(ArchiveError::ArchiveCorrupt(_))
    ));

    let mut future = Manifest::new(vec![], vec![]);
    future.version = 2;
    let versioned = temp.path().join("future.zip");
    write_zip(
        &versioned,
        &[("manifest.json", serde_json::to_vec(&future).unwrap(), true)],
    );
    assert!(matches!(
        import(&mut destination, &versioned, Strategy::Merge),
        Err(ArchiveError::ArchiveCorrupt(_))
    ));

    assert_untouched(&destination);
}

#[test]
fn test_missing_photo_bytes_is_partial_failure() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("partial.zip");
    write_zip(
        &archive,
        &[("manifest.json", manifest_json("photos/0.jpg", Some(1)), true)],
    );

    let mut destination = Library::create(&temp.path().join("destination")).unwrap();
    let summary = import(&mut destination, &archive, Strategy::Merge).unwrap();
    assert_eq!(summary.photos_failed, 1);
    assert_eq!(summary.categories_imported, 1);
    assert!(matches!(
        summary.into_result(),
        Err(ArchiveError::PartialImportFailure { failed: 1, total: 1 })
    ));
    assert_eq!(destination.database().photo_count().unwrap(), 0);
}
