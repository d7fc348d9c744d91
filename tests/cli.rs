// E2E tests for the photoarchive CLI commands
use assert_fs::prelude::*;
use predicates::prelude::*;

mod common;
use common::{create_test_photos, photoarchive, setup_test_library};

#[test]
fn test_create_command() {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    let library_dir = temp_dir.child("new_library");

    photoarchive()
        .arg("create")
        .arg(library_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Created library at"));

    library_dir.child("library.db").assert(predicate::path::exists());
    library_dir.child("photos").assert(predicate::path::is_dir());

    // A second create on the same directory is refused
    photoarchive()
        .arg("create")
        .arg(library_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_category_and_list_commands() {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    let library_dir = setup_test_library(&temp_dir, "library");

    photoarchive()
        .arg("category")
        .arg(library_dir.path())
        .arg("Animals")
        .arg("--color")
        .arg("#FF0000")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created category 'Animals'"));

    // Display names are unique regardless of case
    photoarchive()
        .arg("category")
        .arg(library_dir.path())
        .arg("animals")
        .assert()
        .failure();

    photoarchive()
        .arg("list")
        .arg(library_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Animals"))
        .stdout(predicate::str::contains("Uncategorized"))
        .stdout(predicate::str::contains("Total: 0 photos"));
}

#[test]
fn test_add_command_skips_duplicates() {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    let library_dir = setup_test_library(&temp_dir, "library");
    let photos = create_test_photos(&temp_dir, "camera", &["a.jpg", "b.png", "notes.txt"]);

    photoarchive()
        .arg("add")
        .arg(photos.path())
        .arg(library_dir.path())
        .arg("--favorite")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 photos added"));

    photoarchive()
        .arg("add")
        .arg(photos.path())
        .arg(library_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("0 photos added"))
        .stdout(predicate::str::contains("2 duplicates skipped"));

    photoarchive()
        .arg("add")
        .arg(photos.path())
        .arg(library_dir.path())
        .arg("--category")
        .arg("Nope")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Category not found"));
}

#[test]
fn test_export_validate_import_round_trip() {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    let source = setup_test_library(&temp_dir, "source");
    let photos = create_test_photos(&temp_dir, "zoo", &["cat.jpg", "dog.jpg"]);

    photoarchive()
        .arg("category")
        .arg(source.path())
        .arg("Animals")
        .assert()
        .success();
    photoarchive()
        .arg("add")
        .arg(photos.path())
        .arg(source.path())
        .arg("--category")
        .arg("Animals")
        .assert()
        .success();

    let archive = temp_dir.child("backup.zip");
    photoarchive()
        .arg("export")
        .arg(source.path())
        .arg(archive.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("2 photos in 2 categories"));
    archive.assert(predicate::path::is_file());

    photoarchive()
        .arg("validate")
        .arg(archive.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("2 photo entries"));

    let destination = setup_test_library(&temp_dir, "destination");
    photoarchive()
        .arg("import")
        .arg(archive.path())
        .arg(destination.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("2 photos imported"));

    // Importing the same archive again changes nothing
    photoarchive()
        .arg("import")
        .arg(archive.path())
        .arg(destination.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("0 photos imported"))
        .stdout(predicate::str::contains("2 duplicates skipped"));

    photoarchive()
        .arg("import")
        .arg(archive.path())
        .arg(destination.path())
        .arg("--strategy")
        .arg("replace")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 photos imported"));

    photoarchive()
        .arg("list")
        .arg(destination.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 2 photos"));
}

#[test]
fn test_validate_rejects_with_tight_limits() {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    let source = setup_test_library(&temp_dir, "source");
    let photos = create_test_photos(&temp_dir, "pics", &["1.jpg", "2.jpg", "3.jpg"]);
    photoarchive()
        .arg("add")
        .arg(photos.path())
        .arg(source.path())
        .assert()
        .success();

    let archive = temp_dir.child("backup.zip");
    photoarchive()
        .arg("export")
        .arg(source.path())
        .arg(archive.path())
        .assert()
        .success();

    photoarchive()
        .arg("validate")
        .arg(archive.path())
        .arg("--max-entries")
        .arg("2")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Security violation"));

    let destination = setup_test_library(&temp_dir, "destination");
    photoarchive()
        .arg("import")
        .arg(archive.path())
        .arg(destination.path())
        .arg("--max-entries")
        .arg("2")
        .assert()
        .failure();

    photoarchive()
        .arg("list")
        .arg(destination.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 0 photos"));
}

#[test]
fn test_import_rejects_non_archive() {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    let destination = setup_test_library(&temp_dir, "destination");
    let bogus = temp_dir.child("bogus.zip");
    bogus.write_str("this is not a zip file").unwrap();

    photoarchive()
        .arg("import")
        .arg(bogus.path())
        .arg(destination.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Archive is corrupt"));
}
