use super::*;
use crate::test_utils::setup_stores;
use crate::test_utils::TEST_COLLECTION;
use crate::Record;
use crate::SourceStore;

/// # Case 1: one lease is created per discovered partition, and a repeat run
/// with no new partitions creates zero additional leases
#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let fixture = setup_stores().await;
    let enumerator = PartitionEnumerator::new(
        fixture.source.clone(),
        fixture.lease_store.clone(),
        TEST_COLLECTION,
    );

    for (id, partition) in [("a", "p1"), ("b", "p2"), ("c", "p1")] {
        fixture
            .source
            .insert(TEST_COLLECTION, Record::new(id, partition))
            .await
            .expect("insert");
    }

    assert_eq!(enumerator.reconcile().await.expect("first run"), 2);
    assert_eq!(enumerator.reconcile().await.expect("second run"), 0);

    let leases = fixture.lease_store.list().await.expect("list leases");
    assert_eq!(leases.len(), 2);
    assert!(leases.iter().all(|l| l.owner.is_none()
        && l.continuation_token.is_none()
        && l.expires_at_ms == 0
        && l.version == 0));
}

/// # Case 2: newly appearing partitions get leases on the next run while
/// existing leases keep their state
#[tokio::test]
async fn test_reconcile_picks_up_new_partitions() {
    let fixture = setup_stores().await;
    let enumerator = PartitionEnumerator::new(
        fixture.source.clone(),
        fixture.lease_store.clone(),
        TEST_COLLECTION,
    );

    fixture
        .source
        .insert(TEST_COLLECTION, Record::new("a", "p1"))
        .await
        .expect("insert");
    assert_eq!(enumerator.reconcile().await.expect("first run"), 1);

    fixture
        .source
        .insert(TEST_COLLECTION, Record::new("b", "p2"))
        .await
        .expect("insert");
    assert_eq!(enumerator.reconcile().await.expect("second run"), 1);

    let partitions = enumerator
        .discover_partitions()
        .await
        .expect("discover")
        .into_iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>();
    assert_eq!(partitions, vec!["p1".to_string(), "p2".to_string()]);
}

/// # Case 3: discovery on an empty collection is an empty set, not an error
#[tokio::test]
async fn test_discover_empty_collection() {
    let fixture = setup_stores().await;
    let enumerator = PartitionEnumerator::new(
        fixture.source.clone(),
        fixture.lease_store.clone(),
        TEST_COLLECTION,
    );

    assert!(enumerator
        .discover_partitions()
        .await
        .expect("discover")
        .is_empty());
    assert_eq!(enumerator.reconcile().await.expect("reconcile"), 0);
}
