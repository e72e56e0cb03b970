// String store behavior across create, in-place edits, growth, and reopen.
mod common;

use ninja_store::api::{AccessMode, ErrorKind, StoreKeys, StoreRead, StringArrayStore};

#[test]
fn words_round_trip_with_in_place_edit() {
    common::init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = StringArrayStore::from_strings(dir.path(), ["Torba", "Boiler", "a", "", "popo"])
        .expect("create");
    assert_eq!(store.get_many(&[0, 1]).expect("many"), vec!["Torba", "Boiler"]);
    store.set(2, "b").expect("set");
    assert_eq!(store.get(2).expect("get"), "b");
    drop(store);

    let store = StringArrayStore::open(dir.path(), AccessMode::ReadOnly).expect("open");
    assert_eq!(
        store.get_range(..).expect("all"),
        vec!["Torba", "Boiler", "b", "", "popo"]
    );
}

#[test]
fn data_file_is_plain_concatenated_bytes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = StringArrayStore::from_strings(dir.path(), ["ab", "ć"]).expect("create");
    store.append("xyz").expect("append");
    let bytes = std::fs::read(dir.path().join("data.ninja")).expect("read");
    assert_eq!(bytes, "abćxyz".as_bytes());
    assert!(!dir.path().join("dtype.ninja").exists());
    assert_eq!(std::fs::read_to_string(dir.path().join("type.ninja")).expect("type"), "string");
}

#[test]
fn custom_keys_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let keys = StoreKeys::new().with_starts("begin").with_ends("finish");
    StringArrayStore::from_strings_with_keys(dir.path(), keys.clone(), ["left", "right"])
        .expect("create");
    assert!(dir.path().join("begin").is_dir());
    assert!(dir.path().join("finish").is_dir());

    let store =
        StringArrayStore::open_with_keys(dir.path(), keys, AccessMode::ReadOnly).expect("open");
    assert_eq!(store.get(1).expect("get"), "right");
    let err = StringArrayStore::open(dir.path(), AccessMode::ReadOnly)
        .err()
        .expect("default keys do not exist");
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn generator_builds_store_in_batches() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store =
        StringArrayStore::from_generator(dir.path(), (0..11).map(|i| format!("item-{i}")), 4)
            .expect("build")
            .expect("non-empty");
    assert_eq!(store.len(), 11);
    assert_eq!(store.get_str(10).expect("get"), "item-10");
    let shouted = store.with_transform(|value| value.to_uppercase());
    assert_eq!(shouted.get(3).expect("get"), "ITEM-3");
}
