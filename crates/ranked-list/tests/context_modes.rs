//! # Execution Mode Tests
//!
//! Skip-persistence and avoid-collisions scopes across collections, error
//! exits, cancellation and concurrent tasks.

use ranked_list::{
    CollectionId, InMemoryRecordStore, MonotonicTimeSource, Rank, RankError, RankedList,
    RankedListConfig, RankedRecord, RankingApi, RecordId,
};
use std::sync::Arc;
use tokio::sync::Barrier;

type List = RankedList<InMemoryRecordStore>;

async fn list(collection: &str) -> (Arc<InMemoryRecordStore>, List) {
    let store = Arc::new(InMemoryRecordStore::new());
    let config = RankedListConfig {
        collection: collection.to_string(),
        ..Default::default()
    };
    let list = RankedList::builder(Arc::clone(&store), config)
        .clock(Arc::new(MonotonicTimeSource::starting_at(1)))
        .build()
        .await
        .unwrap();
    (store, list)
}

async fn create_at(list: &List, id: u64, rank: i32) {
    let mut record = RankedRecord::new(id).with_rank(rank);
    list.create(&mut record).await.unwrap();
}

#[tokio::test]
async fn test_inner_skip_scope_for_a_leaves_b_override_alone() {
    let (store_a, a) = list("todo_items").await;
    let (store_b, b) = list("todo_lists").await;

    b.with_avoid_collisions(false, async {
        let result: Result<(), RankError> = a
            .with_skip_persistence(&[], async {
                assert!(a.skips_persistence());
                assert!(!b.skips_persistence());
                assert!(!b.avoids_collisions());

                store_a.fail_next_saves(1);
                a.create(&mut RankedRecord::new(1)).await?;
                Ok::<(), RankError>(())
            })
            .await;

        assert!(result.is_err());
        assert!(!a.skips_persistence());
        assert!(!b.avoids_collisions());
        assert!(a.avoids_collisions());

        create_at(&b, 1, 100).await;
        create_at(&b, 2, 100).await;
    })
    .await;

    assert!(b.avoids_collisions());
    let ranks: Vec<_> = store_b.snapshot().iter().map(|r| r.current_rank()).collect();
    assert_eq!(ranks, vec![Some(Rank::from(100)); 2]);
}

#[tokio::test]
async fn test_skip_persistence_create_saves_without_placement() {
    let (store, a) = list("todo_items").await;

    let mut record = RankedRecord::new(1);
    a.with_skip_persistence(&[], async {
        a.create(&mut record).await.unwrap();
    })
    .await;

    let stored = store.get(RecordId(1)).unwrap();
    assert!(!stored.is_ranked());
    assert_eq!(stored.tiebreak, 0);
}

#[tokio::test]
async fn test_skip_persistence_covers_listed_collections() {
    let (_, a) = list("todo_items").await;
    let (_, b) = list("todo_lists").await;
    let (_, c) = list("todo_tags").await;

    a.with_skip_persistence(&[CollectionId::new("todo_lists")], async {
        assert!(a.skips_persistence());
        assert!(b.skips_persistence());
        assert!(!c.skips_persistence());
    })
    .await;

    assert!(!a.skips_persistence());
    assert!(!b.skips_persistence());
}

#[tokio::test]
async fn test_nested_skip_scopes_are_reentrant() {
    let (store, a) = list("todo_items").await;
    create_at(&a, 1, 1024).await;
    let mut record = store.get(RecordId(1)).unwrap();

    a.with_skip_persistence(&[], async {
        a.with_skip_persistence(&[], async {
            a.set_rank(&mut record, Some(Rank::from(7))).await.unwrap();
        })
        .await;
        // still skipping after the inner scope ends
        a.set_rank(&mut record, Some(Rank::from(9))).await.unwrap();
    })
    .await;

    assert_eq!(record.current_rank(), Some(Rank::from(9)));
    assert_eq!(store.get(RecordId(1)).unwrap().current_rank(), Some(Rank::from(1024)));
}

#[tokio::test]
async fn test_innermost_collision_override_wins() {
    let (_, a) = list("todo_items").await;

    a.with_avoid_collisions(false, async {
        a.with_avoid_collisions(true, async {
            assert!(a.avoids_collisions());
        })
        .await;
        assert!(!a.avoids_collisions());
    })
    .await;
}

#[tokio::test]
async fn test_cancelled_scope_restores_modes() {
    let (_, a) = list("todo_items").await;

    let pending = a.with_skip_persistence(&[], std::future::pending::<()>());
    tokio::select! {
        _ = pending => unreachable!("pending never resolves"),
        _ = tokio::task::yield_now() => {}
    }

    assert!(!a.skips_persistence());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_modes_do_not_leak_across_tasks() {
    let (_, a) = list("todo_items").await;
    let a = Arc::new(a);
    let barrier = Arc::new(Barrier::new(2));

    let inside = {
        let a = Arc::clone(&a);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            a.with_skip_persistence(&[], async {
                barrier.wait().await;
                barrier.wait().await;
                a.skips_persistence()
            })
            .await
        })
    };

    let outside = {
        let a = Arc::clone(&a);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            let seen = a.skips_persistence();
            barrier.wait().await;
            seen
        })
    };

    assert!(inside.await.unwrap());
    assert!(!outside.await.unwrap());
}
