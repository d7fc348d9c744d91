use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::fixture::ChildPath;
use assert_fs::prelude::*;

pub fn photoarchive() -> Command {
    Command::cargo_bin("photoarchive").unwrap()
}

pub fn setup_test_library(temp_dir: &TempDir, name: &str) -> ChildPath {
    let library_dir = temp_dir.child(name);
    photoarchive()
        .arg("create")
        .arg(library_dir.path())
        .assert()
        .success();
    library_dir
}

/// A directory of small fake images, one per name, each with distinct content.
pub fn create_test_photos(temp_dir: &TempDir, dir_name: &str, names: &[&str]) -> ChildPath {
    let photos = temp_dir.child(dir_name);
    photos.create_dir_all().unwrap();
    for name in names {
        photos
            .child(name)
            .write_binary(format!("{}/{} image bytes", dir_name, name).as_bytes())
            .unwrap();
    }
    photos
}
