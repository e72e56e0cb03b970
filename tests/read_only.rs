// Read-only opening must work on write-protected stores and never modify them.
#![cfg(unix)]

mod common;

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use ninja_store::api::{
    AccessMode, ErrorKind, FixedArrayStore, RaggedArrayStore, Sample, StoreRead, StringArrayStore,
};

fn set_mode_recursive(path: &Path, file_mode: u32, dir_mode: u32) {
    if path.is_dir() {
        for entry in fs::read_dir(path).expect("read_dir") {
            set_mode_recursive(&entry.expect("entry").path(), file_mode, dir_mode);
        }
        fs::set_permissions(path, fs::Permissions::from_mode(dir_mode)).expect("chmod dir");
    } else {
        fs::set_permissions(path, fs::Permissions::from_mode(file_mode)).expect("chmod file");
    }
}

fn snapshot(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files = Vec::new();
    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).expect("read_dir") {
            let entry = entry.expect("entry").path();
            if entry.is_dir() {
                stack.push(entry);
            } else {
                files.push((entry.display().to_string(), fs::read(&entry).expect("read")));
            }
        }
    }
    files.sort();
    files
}

#[test]
fn ragged_store_reads_but_refuses_writes() {
    common::init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ragged");
    RaggedArrayStore::<i32>::from_elements(&path, vec![vec![1i32, 2, 3], vec![4]]).expect("create");
    set_mode_recursive(&path, 0o444, 0o555);
    let before = snapshot(&path);

    let mut store = RaggedArrayStore::<i32>::open(&path, AccessMode::ReadOnly).expect("open");
    assert_eq!(
        store.get_range(..).expect("all"),
        vec![Sample::from(vec![1i32, 2, 3]), Sample::from(vec![4i32])]
    );
    assert_eq!(store.set(1, vec![9i32]).expect_err("set").kind(), ErrorKind::Permission);
    assert_eq!(store.extend(vec![vec![5i32]]).expect_err("extend").kind(), ErrorKind::Permission);
    assert_eq!(store.view_mut(0).err().expect("view_mut").kind(), ErrorKind::Permission);
    drop(store);

    assert_eq!(snapshot(&path), before);
    set_mode_recursive(&path, 0o644, 0o755);
}

#[test]
fn string_store_reads_but_refuses_writes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("strings");
    StringArrayStore::from_strings(&path, ["alpha", "beta"]).expect("create");
    set_mode_recursive(&path, 0o444, 0o555);
    let before = snapshot(&path);

    let mut store = StringArrayStore::open(&path, AccessMode::ReadOnly).expect("open");
    assert_eq!(store.get_str(0).expect("get"), "alpha");
    assert_eq!(store.set(1, "BETA").expect_err("set").kind(), ErrorKind::Permission);
    assert_eq!(
        store.set_range(.., ["x", "y"]).expect_err("set range").kind(),
        ErrorKind::Permission
    );
    assert_eq!(store.append("gamma").expect_err("append").kind(), ErrorKind::Permission);
    assert_eq!(store.len(), 2);
    drop(store);

    assert_eq!(snapshot(&path), before);
    set_mode_recursive(&path, 0o644, 0o755);
}

#[test]
fn fixed_store_reads_but_refuses_writes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("fixed");
    FixedArrayStore::from_slice(&path, &[1.5f64, 2.5]).expect("create");
    set_mode_recursive(&path, 0o444, 0o555);

    let mut store = FixedArrayStore::<f64>::open(&path, AccessMode::ReadOnly).expect("open");
    assert_eq!(store.value(1).expect("value"), 2.5);
    assert_eq!(store.extend_from_slice(&[3.5]).expect_err("extend").kind(), ErrorKind::Permission);
    assert_eq!(store.as_mut_slice().err().expect("slice").kind(), ErrorKind::Permission);
    drop(store);
    set_mode_recursive(&path, 0o644, 0o755);
}

#[test]
fn read_only_open_of_missing_directory_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("missing");
    let err = StringArrayStore::open(&missing, AccessMode::ReadOnly)
        .err()
        .expect("missing");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!missing.exists());
}
