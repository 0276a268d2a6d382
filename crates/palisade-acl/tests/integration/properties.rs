//! Property tests for batch resolution.

use std::collections::BTreeSet;

use palisade_acl::{AclRow, Error, MemoryStore};
use proptest::prelude::*;

use crate::common::{CountingStore, TestHarness, admin, doc, folder};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Documents with the given ids, all under Folder(1).
fn store_with(present: &BTreeSet<i64>) -> MemoryStore {
    let mut rows = vec![AclRow::new(folder(1), admin())];
    rows.extend(
        present
            .iter()
            .map(|&id| AclRow::new(doc(id), admin()).with_parent(folder(1))),
    );
    MemoryStore::from_rows(rows)
}

proptest! {
    #[test]
    fn test_batch_is_all_or_first_missing(
        present in prop::collection::btree_set(0i64..20, 0..10),
        requested in prop::collection::vec(0i64..20, 1..12),
    ) {
        let harness = TestHarness::with_store(CountingStore::new(store_with(&present)));
        let objects: Vec<_> = requested.iter().map(|&id| doc(id)).collect();

        let result = runtime().block_on(harness.service.read_acls(&objects));

        match requested.iter().find(|id| !present.contains(id)) {
            Some(&missing) => {
                prop_assert_eq!(result.unwrap_err(), Error::not_found(&doc(missing)));
            }
            None => {
                let acls = result.unwrap();
                let distinct: BTreeSet<_> = requested.iter().collect();
                prop_assert_eq!(acls.len(), distinct.len());
                for acl in acls.values() {
                    prop_assert_eq!(acl.parent_hops(), 1);
                }
            }
        }
    }

    #[test]
    fn test_each_identity_read_once_per_cold_batch(
        present in prop::collection::btree_set(0i64..20, 1..10),
        batch_size in 1usize..5,
    ) {
        let mut config = palisade_acl::AclConfig::default();
        config.lookup.batch_size = batch_size;
        let harness = TestHarness::with_store_and_config(
            CountingStore::new(store_with(&present)),
            config,
        );
        let objects: Vec<_> = present.iter().map(|&id| doc(id)).collect();

        runtime().block_on(harness.service.read_acls(&objects)).unwrap();

        for object in &objects {
            prop_assert_eq!(harness.store.reads_of(object), 1);
        }
        prop_assert_eq!(harness.store.reads_of(&folder(1)), 1);
        let expected_calls = present.len().div_ceil(batch_size) + 1;
        prop_assert_eq!(harness.store.batch_calls(), expected_calls);
    }
}
