use settings::{FileSettingsStore, SettingsStore, StoredSettings};
use tempfile::TempDir;

#[test]
fn missing_file_loads_defaults() {
    let dir = TempDir::new().unwrap();
    let store = FileSettingsStore::new(dir.path());
    assert_eq!(store.load().unwrap(), StoredSettings::default());
}

#[test]
fn settings_survive_a_new_store() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("nested");
    let store = FileSettingsStore::new(&nested);
    store.set_api_key("secret-key").unwrap();
    store.set_group_id("group-1").unwrap();

    let reopened = FileSettingsStore::new(&nested);
    let loaded = reopened.load().unwrap();
    assert_eq!(loaded.api_key, "secret-key");
    assert_eq!(loaded.group_id.as_deref(), Some("group-1"));
}

#[test]
fn corrupt_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let store = FileSettingsStore::new(dir.path());
    std::fs::write(store.path(), "{not json").unwrap();
    assert!(store.load().is_err());
}
