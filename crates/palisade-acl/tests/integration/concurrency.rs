//! Concurrent callers sharing one service.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use palisade_acl::{AceRow, AclConfig, AclRow, Error, MemoryStore};

use crate::common::{ALL, CountingStore, TestHarness, admin, doc, folder, hierarchy_rows};

fn slow_hierarchy() -> CountingStore {
    CountingStore::new(MemoryStore::from_rows(hierarchy_rows()))
        .with_delay(Duration::from_millis(50))
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_misses_read_once() {
    let harness = TestHarness::with_store(slow_hierarchy());

    let target = doc(5);
    let results = join_all((0..10).map(|_| harness.service.read_acl(&target))).await;

    let acls: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    assert!(acls.iter().all(|acl| Arc::ptr_eq(acl, &acls[0])));
    assert_eq!(harness.store.reads_of(&doc(5)), 1);
    assert_eq!(harness.store.reads_of(&folder(2)), 1);
    assert_eq!(harness.store.reads_of(&folder(1)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_batches_share_loads() {
    let harness = TestHarness::with_store(slow_hierarchy());

    let forward = [doc(5), doc(6)];
    let backward = [doc(6), doc(5)];
    let (a, b) = tokio::join!(
        harness.service.read_acls(&forward),
        harness.service.read_acls(&backward),
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(Arc::ptr_eq(&a[&doc(5)], &b[&doc(5)]));
    assert!(Arc::ptr_eq(&a[&doc(6)], &b[&doc(6)]));
    assert_eq!(harness.store.reads_of(&doc(5)), 1);
    assert_eq!(harness.store.reads_of(&doc(6)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_miss_on_absent_identity() {
    let harness = TestHarness::with_store(slow_hierarchy());

    let target = doc(404);
    let results = join_all((0..4).map(|_| harness.service.read_acl(&target))).await;

    for result in results {
        assert_eq!(result.unwrap_err(), Error::not_found(&doc(404)));
    }
    assert_eq!(harness.store.reads_of(&doc(404)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_reaches_every_waiter() {
    let harness = TestHarness::with_store(slow_hierarchy());
    harness.store.set_failing(true);

    let target = doc(5);
    let results = join_all((0..3).map(|_| harness.service.read_acl(&target))).await;
    for result in results {
        assert!(matches!(
            result.unwrap_err(),
            Error::BackingStoreUnavailable { .. }
        ));
    }
    assert_eq!(harness.store.reads_of(&doc(5)), 1);

    // Failures are not cached.
    harness.store.set_failing(false);
    harness.service.read_acl(&doc(5)).await.unwrap();
    assert_eq!(harness.store.reads_of(&doc(5)), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_times_out() {
    let store = CountingStore::new(MemoryStore::from_rows(hierarchy_rows()))
        .with_delay(Duration::from_secs(10));
    let mut config = AclConfig::default();
    config.lookup.store_timeout_ms = 100;
    let harness = TestHarness::with_store_and_config(store, config);

    let (first, second) = (doc(5), doc(5));
    let (a, b) = tokio::join!(
        harness.service.read_acl(&first),
        harness.service.read_acl(&second),
    );
    assert_eq!(a.unwrap_err(), Error::Timeout { millis: 100 });
    assert_eq!(b.unwrap_err(), Error::Timeout { millis: 100 });
    assert_eq!(harness.store.reads_of(&doc(5)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalidation_during_load_is_not_lost() {
    let harness = TestHarness::with_store(slow_hierarchy());

    let target = doc(5);
    let (loaded, ()) = tokio::join!(harness.service.read_acl(&target), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        harness.service.invalidate(&doc(5));
    });
    loaded.unwrap();

    harness.service.read_acl(&doc(5)).await.unwrap();
    assert_eq!(harness.store.reads_of(&doc(5)), 2);
}

#[tokio::test(start_paused = true)]
async fn test_read_after_invalidation_does_not_join_older_load() {
    let harness = TestHarness::with_store(slow_hierarchy());

    let target = folder(1);
    let (before, after) = tokio::join!(harness.service.read_acl(&target), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let denied = AclRow::new(folder(1), admin()).with_entry(AceRow::deny(admin(), ALL));
        harness.store.inner().insert(denied).unwrap();
        harness.service.invalidate(&folder(1));
        harness.service.read_acl(&folder(1)).await
    });

    let (before, after) = (before.unwrap(), after.unwrap());
    assert!(before.is_granted(&[ALL], &[admin()], false).unwrap());
    assert!(!after.is_granted(&[ALL], &[admin()], false).unwrap());
    assert_eq!(harness.store.reads_of(&folder(1)), 2);

    let cached = harness.service.read_acl(&folder(1)).await.unwrap();
    assert!(Arc::ptr_eq(&cached, &after));
}

#[tokio::test(start_paused = true)]
async fn test_ancestor_load_is_shared_with_later_request() {
    let harness = TestHarness::with_store(slow_hierarchy());

    // Doc(5) reaches Folder(1) at 100ms; the direct read claims it at 60ms.
    let target = doc(5);
    let (document, root) = tokio::join!(harness.service.read_acl(&target), async {
        tokio::time::sleep(Duration::from_millis(60)).await;
        harness.service.read_acl(&folder(1)).await
    });

    let (document, root) = (document.unwrap(), root.unwrap());
    assert_eq!(harness.store.reads_of(&folder(1)), 1);
    let ancestor = document.ancestors().last().unwrap();
    assert!(std::ptr::eq(ancestor, Arc::as_ptr(&root)));
}

#[tokio::test(start_paused = true)]
async fn test_ancestor_claim_is_followed_by_later_request() {
    let harness = TestHarness::with_store(slow_hierarchy());

    // Doc(5) claims Folder(1) at 100ms; the direct read follows it at 120ms.
    let target = doc(5);
    let (document, root) = tokio::join!(harness.service.read_acl(&target), async {
        tokio::time::sleep(Duration::from_millis(120)).await;
        harness.service.read_acl(&folder(1)).await
    });

    let (document, root) = (document.unwrap(), root.unwrap());
    assert_eq!(harness.store.reads_of(&folder(1)), 1);
    let ancestor = document.ancestors().last().unwrap();
    assert!(std::ptr::eq(ancestor, Arc::as_ptr(&root)));
}

#[tokio::test(start_paused = true)]
async fn test_siblings_share_common_ancestor_load() {
    let harness = TestHarness::with_store(slow_hierarchy());

    let (five_id, six_id) = (doc(5), doc(6));
    let (five, six) = tokio::join!(
        harness.service.read_acl(&five_id),
        harness.service.read_acl(&six_id),
    );

    let (five, six) = (five.unwrap(), six.unwrap());
    assert_eq!(harness.store.reads_of(&folder(1)), 1);
    assert_eq!(harness.store.reads_of(&folder(2)), 1);
    let shared = five.ancestors().last().unwrap();
    assert!(std::ptr::eq(shared, Arc::as_ptr(six.parent().unwrap())));
}

#[tokio::test(start_paused = true)]
async fn test_crossed_ancestor_waits_do_not_deadlock() {
    let store = MemoryStore::from_rows([
        AclRow::new(folder(1), admin()).with_parent(folder(2)),
        AclRow::new(folder(2), admin()).with_parent(folder(1)),
    ]);
    let harness =
        TestHarness::with_store(CountingStore::new(store).with_delay(Duration::from_millis(50)));

    let (first, second) = (folder(1), folder(2));
    let (a, b) = tokio::join!(
        harness.service.read_acl(&first),
        harness.service.read_acl(&second),
    );

    assert!(matches!(a.unwrap_err(), Error::DepthExceeded { .. }));
    assert!(matches!(b.unwrap_err(), Error::DepthExceeded { .. }));
    // One side waits on the other; the second reads the shared ancestor itself.
    let reads = harness.store.reads_of(&folder(1)) + harness.store.reads_of(&folder(2));
    assert_eq!(reads, 3);
}

#[tokio::test(start_paused = true)]
async fn test_spawned_callers_share_one_load() {
    let harness = Arc::new(TestHarness::with_store(slow_hierarchy()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let harness = Arc::clone(&harness);
            tokio::spawn(async move { harness.service.read_acl(&doc(6)).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(harness.store.reads_of(&doc(6)), 1);
}
