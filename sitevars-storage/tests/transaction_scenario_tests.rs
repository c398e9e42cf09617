//! Scenario Tests for Transaction-Aware Invalidation
//!
//! Covers in-transaction isolation, rollback safety, commit propagation,
//! idempotent invalidation and cache-failure tolerance, plus the two
//! end-to-end walkthroughs of the read and write path.

use std::sync::Arc;

use sitevars_core::{
    CacheError, SiteId, SiteVar, SiteVarMap, SitevarsConfig, SitevarsError, StorageError,
};
use sitevars_storage::{
    CacheCalls, InMemoryCache, LmdbSiteCache, MemoryDatabase, SharedCache, SiteVarCache,
    VariableStore,
};

type TestCache = SiteVarCache<MemoryDatabase, InMemoryCache, MemoryDatabase>;

fn setup() -> (TestCache, Arc<MemoryDatabase>, Arc<InMemoryCache>) {
    let db = Arc::new(MemoryDatabase::new());
    let shared = Arc::new(InMemoryCache::new());
    let cache = SiteVarCache::new(
        Arc::clone(&db),
        Arc::clone(&shared),
        Arc::clone(&db),
        SitevarsConfig::default(),
    );
    (cache, db, shared)
}

fn map_of(pairs: &[(&str, &str)]) -> SiteVarMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ============================================================================
// IN-TRANSACTION ISOLATION
// ============================================================================

#[test]
fn test_read_inside_transaction_sees_own_write_without_populating() {
    let (cache, db, shared) = setup();
    let site = SiteId::new_v7();

    let txn = db.begin().expect("begin");
    cache.set_value(site, "x", "1").expect("write");
    let map = cache.get_site_map(site).expect("read");

    assert_eq!(map, map_of(&[("x", "1")]));
    assert_eq!(shared.calls().sets, 0);
    assert!(!shared.contains(&cache.cache_key(site)));

    txn.commit().expect("commit");
}

#[test]
fn test_read_inside_transaction_ignores_warm_entry() {
    let (cache, db, shared) = setup();
    let site = SiteId::new_v7();
    cache.set_value(site, "x", "old").expect("write");
    cache.get_site_map(site).expect("warm");
    shared.reset_calls();

    let txn = db.begin().expect("begin");
    cache.set_value(site, "x", "new").expect("write");

    assert_eq!(
        cache.get_value(site, "x", None).expect("read"),
        Some("new".to_string())
    );
    assert_eq!(shared.calls().total(), 0);

    txn.rollback().expect("rollback");
}

// ============================================================================
// ROLLBACK SAFETY
// ============================================================================

#[test]
fn test_rollback_leaves_cache_and_store_untouched() {
    let (cache, db, shared) = setup();
    let site = SiteId::new_v7();
    cache.set_value(site, "x", "committed").expect("write");
    let before = cache.get_site_map(site).expect("warm");
    shared.reset_calls();

    let txn = db.begin().expect("begin");
    cache.set_value(site, "x", "doomed").expect("write");
    cache.set_value(site, "y", "doomed").expect("write");
    cache.delete(site, "x").expect("delete");
    txn.rollback().expect("rollback");

    assert_eq!(shared.calls().deletes, 0);
    assert_eq!(shared.peek(&cache.cache_key(site)), Some(before.clone()));
    assert_eq!(cache.load_from_store(site).expect("load"), before);
}

#[test]
fn test_dropped_transaction_rolls_back() {
    let (cache, db, shared) = setup();
    let site = SiteId::new_v7();
    cache.get_site_map(site).expect("warm");
    shared.reset_calls();

    {
        let _txn = db.begin().expect("begin");
        cache.set_value(site, "x", "1").expect("write");
    }

    assert_eq!(shared.calls().deletes, 0);
    assert_eq!(db.record_count().expect("count"), 0);
    assert!(cache.get_site_map(site).expect("read").is_empty());
}

#[test]
fn test_atomic_error_discards_deferred_invalidation() {
    let (cache, db, shared) = setup();
    let site = SiteId::new_v7();
    cache.get_site_map(site).expect("warm");
    shared.reset_calls();

    let result: Result<(), SitevarsError> = db.atomic(|| {
        cache.set_value(site, "x", "1")?;
        cache.delete(site, "missing")
    });

    assert!(matches!(
        result,
        Err(SitevarsError::Storage(StorageError::NotFound { .. }))
    ));
    assert_eq!(shared.calls().deletes, 0);
    assert_eq!(db.record_count().expect("count"), 0);
}

#[test]
fn test_savepoint_rollback_keeps_outer_invalidation() {
    let (cache, db, shared) = setup();
    let site_a = SiteId::new_v7();
    let site_b = SiteId::new_v7();
    cache.get_site_map(site_a).expect("warm a");
    cache.get_site_map(site_b).expect("warm b");
    shared.reset_calls();

    let outer = db.begin().expect("begin outer");
    cache.set_value(site_a, "x", "1").expect("write a");
    let inner = db.begin().expect("begin savepoint");
    cache.set_value(site_b, "x", "1").expect("write b");
    inner.rollback().expect("rollback savepoint");
    outer.commit().expect("commit outer");

    assert_eq!(shared.delete_log(), vec![cache.cache_key(site_a).encode()]);
    assert!(cache.get_site_map(site_b).expect("read b").is_empty());
}

// ============================================================================
// COMMIT PROPAGATION
// ============================================================================

#[test]
fn test_commit_invalidates_exactly_once_after_commit() {
    let (cache, db, shared) = setup();
    let site = SiteId::new_v7();
    cache.set_value(site, "x", "old").expect("write");
    cache.get_site_map(site).expect("warm");
    shared.reset_calls();

    let txn = db.begin().expect("begin");
    cache.set_value(site, "x", "new").expect("write");
    assert_eq!(shared.calls().deletes, 0);
    assert!(shared.contains(&cache.cache_key(site)));
    txn.commit().expect("commit");

    assert_eq!(shared.delete_log(), vec![cache.cache_key(site).encode()]);
    assert_eq!(
        cache.get_value(site, "x", None).expect("read"),
        Some("new".to_string())
    );
}

#[test]
fn test_batch_write_in_transaction_invalidates_once() {
    let (cache, db, shared) = setup();
    let site = SiteId::new_v7();
    cache.get_site_map(site).expect("warm");
    shared.reset_calls();

    db.atomic(|| cache.set_many(site, [("a", "1"), ("b", "2")]).map(|_| ()))
        .expect("atomic");

    assert_eq!(shared.calls().deletes, 1);
    assert_eq!(
        cache.get_site_map(site).expect("read"),
        map_of(&[("a", "1"), ("b", "2")])
    );
}

// ============================================================================
// IDEMPOTENT INVALIDATION
// ============================================================================

#[test]
fn test_invalidate_without_entry_is_noop() {
    let (cache, _db, shared) = setup();
    let site = SiteId::new_v7();

    cache.invalidate(site);
    cache.invalidate(site);

    assert_eq!(
        shared.calls(),
        CacheCalls {
            gets: 0,
            sets: 0,
            deletes: 2
        }
    );
    assert!(shared.is_empty());
}

// ============================================================================
// CACHE FAILURES
// ============================================================================

#[test]
fn test_unreachable_cache_never_fails_reads_or_writes() {
    let (cache, _db, shared) = setup();
    let site = SiteId::new_v7();
    shared.fail_with(CacheError::Unavailable {
        reason: "connection refused".to_string(),
    });

    cache.set_value(site, "x", "1").expect("write succeeds");
    assert_eq!(
        cache.get_value(site, "x", None).expect("read succeeds"),
        Some("1".to_string())
    );
    cache.delete(site, "x").expect("delete succeeds");
    cache.invalidate_all().expect("invalidate_all succeeds");

    shared.recover();
    assert!(cache.get_site_map(site).expect("read").is_empty());
}

#[test]
fn test_persistence_error_does_not_invalidate() {
    let (cache, db, shared) = setup();
    let site = SiteId::new_v7();
    cache.set_value(site, "x", "1").expect("write");
    cache.get_site_map(site).expect("warm");
    shared.reset_calls();

    let dup = SiteVar::new(site, "x", "2").expect("valid record");
    let err = cache.create(&dup).expect_err("duplicate");

    assert!(matches!(
        err,
        SitevarsError::Storage(StorageError::UniqueViolation { .. })
    ));
    assert_eq!(shared.calls().deletes, 0);
    assert_eq!(
        db.get_variable(site, "x").expect("get").map(|v| v.value),
        Some("1".to_string())
    );
}

// ============================================================================
// WALKTHROUGHS
// ============================================================================

#[test]
fn test_set_read_delete_with_default() {
    let (cache, _db, _shared) = setup();
    let s1 = SiteId::new_v7();

    cache.set_value(s1, "greeting", "hi").expect("set");
    assert_eq!(
        cache.get_value(s1, "greeting", None).expect("read"),
        Some("hi".to_string())
    );

    cache.delete(s1, "greeting").expect("delete");
    assert_eq!(
        cache.get_value(s1, "greeting", Some("bye")).expect("read"),
        Some("bye".to_string())
    );
}

#[test]
fn test_cache_is_authoritative_until_invalidated() {
    let (cache, db, shared) = setup();
    let s2 = SiteId::new_v7();

    let txn = db.begin().expect("begin");
    cache.set_value(s2, "x", "1").expect("write");
    assert_eq!(cache.get_site_map(s2).expect("read"), map_of(&[("x", "1")]));
    assert_eq!(shared.calls().sets, 0);
    txn.commit().expect("commit");

    // Populate after commit, then change the store behind the cache.
    assert_eq!(cache.get_site_map(s2).expect("read"), map_of(&[("x", "1")]));
    db.raw_set(s2, "x", "2").expect("raw write");

    assert_eq!(cache.get_site_map(s2).expect("read"), map_of(&[("x", "1")]));

    cache.invalidate(s2);
    assert_eq!(cache.get_site_map(s2).expect("read"), map_of(&[("x", "2")]));
}

// ============================================================================
// LMDB BACKEND
// ============================================================================

#[test]
fn test_manager_over_lmdb_cache() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lmdb = Arc::new(LmdbSiteCache::new(dir.path(), 10).expect("open lmdb"));
    let db = Arc::new(MemoryDatabase::new());
    let cache = SiteVarCache::new(
        Arc::clone(&db),
        Arc::clone(&lmdb),
        Arc::clone(&db),
        SitevarsConfig::default(),
    );
    let site = SiteId::new_v7();

    cache.set_value(site, "x", "1").expect("write");
    assert_eq!(cache.get_site_map(site).expect("miss"), map_of(&[("x", "1")]));
    assert_eq!(cache.get_site_map(site).expect("hit"), map_of(&[("x", "1")]));

    let stats = lmdb.stats().expect("stats");
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.sets, 1);

    let txn = db.begin().expect("begin");
    cache.set_value(site, "x", "2").expect("write");
    txn.rollback().expect("rollback");
    assert_eq!(
        lmdb.get(&cache.cache_key(site)).expect("get"),
        Some(map_of(&[("x", "1")]))
    );

    cache.set_value(site, "x", "3").expect("write");
    assert_eq!(lmdb.get(&cache.cache_key(site)).expect("get"), None);
}
