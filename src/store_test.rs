use super::*;

fn sample_user() -> User {
    User::new("1").with_username("u").with_provider(Provider::Local)
}

// =============================================================================
// MemoryStore
// =============================================================================

#[test]
fn memory_store_get_set_remove() {
    let store = MemoryStore::new();
    assert!(store.get("k").is_none());
    store.set("k", "v").unwrap();
    assert_eq!(store.get("k").as_deref(), Some("v"));
    store.set("k", "w").unwrap();
    assert_eq!(store.get("k").as_deref(), Some("w"));
    store.remove("k").unwrap();
    assert!(store.get("k").is_none());
    assert!(store.is_empty());
}

#[test]
fn memory_store_remove_missing_is_noop() {
    let store = MemoryStore::new();
    store.remove("nothing").unwrap();
    assert!(store.is_empty());
}

// =============================================================================
// FileStore
// =============================================================================

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("session.json");

    let store = FileStore::new(&path);
    store.set(TOKEN_KEY, "T").unwrap();
    drop(store);

    let reopened = FileStore::new(&path);
    assert_eq!(reopened.get(TOKEN_KEY).as_deref(), Some("T"));
}

#[test]
fn file_store_missing_file_reads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("absent.json"));
    assert!(store.get(TOKEN_KEY).is_none());
}

#[test]
fn file_store_corrupt_file_reads_empty_and_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store = FileStore::new(&path);
    assert!(store.get(TOKEN_KEY).is_none());

    store.set(TOKEN_KEY, "fresh").unwrap();
    assert_eq!(store.get(TOKEN_KEY).as_deref(), Some("fresh"));
}

#[test]
fn file_store_sees_writes_from_other_handle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let a = FileStore::new(&path);
    let b = FileStore::new(&path);

    a.set(TOKEN_KEY, "T").unwrap();
    assert_eq!(b.get(TOKEN_KEY).as_deref(), Some("T"));
    b.remove(TOKEN_KEY).unwrap();
    assert!(a.get(TOKEN_KEY).is_none());
}

#[test]
fn file_store_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let store = FileStore::new(&path);
    store.set("k", "v").unwrap();

    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("session.json")]);
}

#[test]
fn file_store_write_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();
    let store = FileStore::new(blocker.join("session.json"));

    assert!(store.set(TOKEN_KEY, "T").is_err());
    assert!(store.remove(TOKEN_KEY).is_err());
    assert!(store.get(TOKEN_KEY).is_none());

    let err = persist_session(&store, "T", &sample_user(), Provider::Local).unwrap_err();
    assert!(matches!(err, StoreError::Io(_)));
    assert!(clear_session(&store).is_err());
}

#[test]
fn file_store_handles_write_concurrently() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let path = path.clone();
            scope.spawn(move || {
                let store = FileStore::new(path);
                for i in 0..20 {
                    store.set(&format!("k{worker}"), &i.to_string()).unwrap();
                }
            });
        }
    });

    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("session.json")]);
}

// =============================================================================
// StoredSession / persist / clear
// =============================================================================

#[test]
fn load_empty_store_is_all_absent() {
    let store = MemoryStore::new();
    assert_eq!(StoredSession::load(&store), StoredSession::default());
}

#[test]
fn load_round_trips_persisted_session() {
    let store = MemoryStore::new();
    persist_session(&store, "T", &sample_user(), Provider::Local).unwrap();

    let loaded = StoredSession::load(&store);
    assert_eq!(loaded.token.as_deref(), Some("T"));
    assert_eq!(loaded.user, Some(sample_user()));
    assert_eq!(loaded.provider, Some(Provider::Local));
}

#[test]
fn load_tolerates_partial_write() {
    let store = MemoryStore::new();
    store.set(TOKEN_KEY, "T").unwrap();

    let loaded = StoredSession::load(&store);
    assert_eq!(loaded.token.as_deref(), Some("T"));
    assert!(loaded.user.is_none());
    assert!(loaded.provider.is_none());
}

#[test]
fn load_ignores_unparseable_user() {
    let store = MemoryStore::new();
    store.set(TOKEN_KEY, "T").unwrap();
    store.set(USER_KEY, "{broken").unwrap();

    let loaded = StoredSession::load(&store);
    assert_eq!(loaded.token.as_deref(), Some("T"));
    assert!(loaded.user.is_none());
}

#[test]
fn load_treats_blank_token_as_absent() {
    let store = MemoryStore::new();
    store.set(TOKEN_KEY, "").unwrap();
    assert!(StoredSession::load(&store).token.is_none());
}

#[test]
fn load_unknown_provider_tag_maps_to_unknown() {
    let store = MemoryStore::new();
    store.set(PROVIDER_KEY, "myspace").unwrap();
    assert_eq!(StoredSession::load(&store).provider, Some(Provider::Unknown));
}

#[test]
fn clear_session_keeps_intended_provider() {
    let store = MemoryStore::new();
    persist_session(&store, "T", &sample_user(), Provider::Google).unwrap();
    store.set(INTENDED_PROVIDER_KEY, "google").unwrap();

    clear_session(&store).unwrap();

    assert!(store.get(TOKEN_KEY).is_none());
    assert!(store.get(USER_KEY).is_none());
    assert!(store.get(PROVIDER_KEY).is_none());
    assert_eq!(store.get(INTENDED_PROVIDER_KEY).as_deref(), Some("google"));
}
