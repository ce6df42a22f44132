use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use tempfile::tempdir;

use super::*;
use crate::lib_test::{ManualClock, test_settings};

const ID: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
const HOUR: Duration = Duration::from_secs(60 * 60);

fn payload() -> TrackerData {
    serde_json::from_value(json!({
        "name": "Artist",
        "eras": {"Era": {"data": {"Leaks": [{"name": "Song", "url": "https://pillows.su/f/abc"}]}}}
    }))
    .unwrap()
}

fn resolved() -> ResolvedUrls {
    ResolvedUrls::from([
        (
            "https://pillows.su/f/abc".to_owned(),
            Some("https://api.pillows.su/api/download/abc".to_owned()),
        ),
        ("https://example.com/a.mp3".to_owned(), None),
    ])
}

fn cache_with(store: Arc<dyn CacheStore>) -> (ResolutionCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at(1_700_000_000_000));
    let cache = ResolutionCache::with_clock(store, clock.clone(), &test_settings());
    (cache, clock)
}

#[test]
fn set_then_get() {
    let (cache, _) = cache_with(Arc::new(MemoryStore::new()));
    cache.set(ID, Some("Unreleased"), &payload(), &resolved());

    let entry = cache.get(ID, Some("Unreleased")).unwrap();
    assert_eq!(ID, entry.tracker_id);
    assert_eq!(Some("Unreleased".to_owned()), entry.tab);
    assert_eq!(payload(), entry.payload);
    assert_eq!(resolved(), entry.resolved_urls);
    assert_eq!(1_700_000_000_000, entry.timestamp);
}

#[rstest]
#[case(None, "tracker_cache_AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA")]
#[case(Some(""), "tracker_cache_AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA_")]
#[case(Some("Released"), "tracker_cache_AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA_Released")]
fn keys(#[case] tab: Option<&str>, #[case] expected: &str) {
    let (cache, _) = cache_with(Arc::new(MemoryStore::new()));
    assert_eq!(expected, cache.key(ID, tab));
}

#[test]
fn no_tab_and_empty_tab_are_separate_entries() {
    let (cache, _) = cache_with(Arc::new(MemoryStore::new()));
    cache.set(ID, None, &payload(), &resolved());

    assert!(cache.get(ID, None).is_some());
    assert!(cache.get(ID, Some("")).is_none());
}

#[test]
fn fresh_entry_survives_a_day() {
    let (cache, clock) = cache_with(Arc::new(MemoryStore::new()));
    cache.set(ID, None, &payload(), &resolved());

    clock.advance(23 * HOUR);
    assert!(cache.get(ID, None).is_some());
    clock.advance(HOUR);
    assert!(cache.get(ID, None).is_some());
}

#[test]
fn expired_entry_is_evicted_on_read() {
    let store = Arc::new(MemoryStore::new());
    let (cache, clock) = cache_with(store.clone());
    cache.set(ID, None, &payload(), &resolved());

    clock.advance(25 * HOUR);
    assert!(cache.get(ID, None).is_none());
    assert_eq!(None, store.get(&cache.key(ID, None)).unwrap());
}

#[test]
fn set_overwrites_and_refreshes_timestamp() {
    let (cache, clock) = cache_with(Arc::new(MemoryStore::new()));
    cache.set(ID, None, &payload(), &resolved());
    clock.advance(20 * HOUR);
    cache.set(ID, None, &payload(), &ResolvedUrls::new());
    clock.advance(20 * HOUR);

    let entry = cache.get(ID, None).unwrap();
    assert!(entry.resolved_urls.is_empty());
}

#[test]
fn corrupt_entry_is_a_miss_and_removed() {
    let store = Arc::new(MemoryStore::new());
    let (cache, _) = cache_with(store.clone());
    let key = cache.key(ID, None);
    store.set(&key, "{not json").unwrap();

    assert!(cache.get(ID, None).is_none());
    assert_eq!(None, store.get(&key).unwrap());
}

#[test]
fn quota_failure_is_ignored() {
    let (cache, _) = cache_with(Arc::new(MemoryStore::with_quota(16)));
    cache.set(ID, None, &payload(), &resolved());

    assert!(cache.get(ID, None).is_none());
}

#[test]
fn lookup_distinguishes_miss_and_unplayable() {
    let (cache, _) = cache_with(Arc::new(MemoryStore::new()));
    cache.set(ID, None, &payload(), &resolved());

    assert_eq!(
        Some(Some("https://api.pillows.su/api/download/abc".to_owned())),
        cache.lookup(ID, None, "https://pillows.su/f/abc")
    );
    assert_eq!(Some(None), cache.lookup(ID, None, "https://example.com/a.mp3"));
    assert_eq!(None, cache.lookup(ID, None, "https://example.com/other.mp3"));
    assert_eq!(None, cache.lookup(ID, Some("Other"), "https://pillows.su/f/abc"));
}

#[test]
fn clear_only_touches_own_prefix() {
    let store = Arc::new(MemoryStore::new());
    let (cache, _) = cache_with(store.clone());
    cache.set(ID, None, &payload(), &resolved());
    cache.set(ID, Some("Released"), &payload(), &resolved());
    store.set("unrelated", "keep me").unwrap();

    assert_eq!(2, cache.clear());
    assert_eq!(vec!["unrelated".to_owned()], store.keys().unwrap());
}

#[test]
fn purge_removes_expired_and_corrupt() {
    let store = Arc::new(MemoryStore::new());
    let (cache, clock) = cache_with(store.clone());
    cache.set(ID, None, &payload(), &resolved());
    clock.advance(25 * HOUR);
    cache.set(ID, Some("Released"), &payload(), &resolved());
    store.set(&cache.key(ID, Some("Broken")), "[]").unwrap();

    assert_eq!(2, cache.purge_expired());
    assert!(cache.get(ID, Some("Released")).is_some());
    assert_eq!(1, store.keys().unwrap().len());
}

#[test]
fn file_store_backed_cache_persists() {
    let dir = tempdir().unwrap();
    let settings = test_settings();
    let first = ResolutionCache::new(
        Arc::new(FileStore::new_from_path(dir.path()).unwrap()),
        &settings,
    );
    first.set(ID, Some("Unreleased"), &payload(), &resolved());

    let second = ResolutionCache::new(
        Arc::new(FileStore::new_from_path(dir.path()).unwrap()),
        &settings,
    );
    assert_eq!(
        resolved(),
        second.get(ID, Some("Unreleased")).unwrap().resolved_urls
    );
}
