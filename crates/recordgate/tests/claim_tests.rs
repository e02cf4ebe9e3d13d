//! Atomic claim operations and claim loops.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::*;
use recordgate::query::{Criteria, ModifyOptions, SortOrder, Update};
use recordgate::record::RecordId;
use recordgate::store::ReturnDocument;

fn pending() -> Criteria {
    Criteria::new().eq(WorkItem::STATE, "pending")
}

fn start() -> Update {
    Update::new()
        .set(WorkItem::STATE, "running")
        .inc(WorkItem::ATTEMPTS, 1)
}

#[tokio::test]
async fn test_find_one_and_modify_returns_updated_by_default() {
    let ctx = TestContext::new("claim_after");
    let items = ctx.gateway.manager::<WorkItem>().await.unwrap();
    items.batch_insert(vec![WorkItem::pending(1)]).await.unwrap();

    let claimed = items
        .find_one_and_modify(&pending(), &start(), &ModifyOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.state, "running");
    assert_eq!(claimed.attempts, 1);

    let none = items
        .find_one_and_modify(&pending(), &start(), &ModifyOptions::default())
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn test_find_one_and_modify_can_return_original() {
    let ctx = TestContext::new("claim_before");
    let items = ctx.gateway.manager::<WorkItem>().await.unwrap();
    items.batch_insert(vec![WorkItem::pending(1)]).await.unwrap();

    let options = ModifyOptions::new().return_document(ReturnDocument::Before);
    let original = items
        .find_one_and_modify(&pending(), &start(), &options)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(original.state, "pending");
    assert_eq!(original.attempts, 0);
}

#[tokio::test]
async fn test_sorted_claims_follow_priority() {
    let ctx = TestContext::new("claim_sorted");
    let items = ctx.gateway.manager::<WorkItem>().await.unwrap();
    items
        .batch_insert(vec![WorkItem::pending(2), WorkItem::pending(9), WorkItem::pending(5)])
        .await
        .unwrap();

    let options = ModifyOptions::new().sort(SortOrder::descending(WorkItem::PRIORITY));
    let order: Vec<i32> = items
        .enumerate_and_modify(&pending(), &start(), &options)
        .unwrap()
        .try_collect()
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.priority)
        .collect();
    assert_eq!(order, vec![9, 5, 2]);
}

#[tokio::test]
async fn test_find_one_and_remove_takes_lowest_first() {
    let ctx = TestContext::new("claim_remove");
    let items = ctx.gateway.manager::<WorkItem>().await.unwrap();
    items
        .batch_insert(vec![WorkItem::pending(3), WorkItem::pending(1)])
        .await
        .unwrap();

    let lowest = SortOrder::ascending(WorkItem::PRIORITY);
    let removed = items
        .find_one_and_remove(&pending(), Some(&lowest))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(removed.priority, 1);
    assert_eq!(items.count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_enumerate_and_remove_drains_matches() {
    let ctx = TestContext::new("claim_drain_remove");
    let items = ctx.gateway.manager::<WorkItem>().await.unwrap();
    let mut batch: Vec<WorkItem> = (0..4).map(WorkItem::pending).collect();
    batch.push(WorkItem {
        state: "done".to_string(),
        ..WorkItem::pending(0)
    });
    items.batch_insert(batch).await.unwrap();

    let mut cursor = items.enumerate_and_remove(&pending(), None).unwrap();
    let mut removed = 0;
    while let Some(item) = cursor.next().await.unwrap() {
        assert_eq!(item.state, "pending");
        removed += 1;
    }
    assert_eq!(removed, 4);
    assert_eq!(cursor.claimed(), 4);
    assert!(cursor.next().await.unwrap().is_none());
    assert_eq!(items.count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_empty_update_is_rejected_eagerly() {
    let ctx = TestContext::new("claim_empty_update");
    let items = ctx.gateway.manager::<WorkItem>().await.unwrap();

    let err = items
        .enumerate_and_modify(&pending(), &Update::new(), &ModifyOptions::default())
        .unwrap_err();
    assert!(err.is_invalid_argument());
    let err = items
        .find_one_and_modify(&pending(), &Update::new(), &ModifyOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());
}

#[tokio::test]
async fn test_non_terminating_claim_loop_is_capped() {
    let ctx = TestContext::new("claim_cap");
    let items = ctx.gateway.manager::<WorkItem>().await.unwrap();
    items
        .batch_insert(vec![WorkItem::pending(1), WorkItem::pending(2)])
        .await
        .unwrap();

    // Bumping attempts never makes an item stop matching.
    let bump = Update::new().inc(WorkItem::ATTEMPTS, 1);
    let claimed = items
        .enumerate_and_modify(&pending(), &bump, &ModifyOptions::default())
        .unwrap()
        .with_limit(10)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(claimed.len(), 10);

    let total: u32 = items
        .find_all()
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap()
        .iter()
        .map(|item| item.attempts)
        .sum();
    assert_eq!(total, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_workers_never_share_a_claim() {
    let ctx = TestContext::new("claim_concurrent");
    let items = ctx.gateway.manager::<WorkItem>().await.unwrap();
    let inserted = items
        .batch_insert((0..200).map(WorkItem::pending))
        .await
        .unwrap();
    let all_ids: HashSet<RecordId> = inserted.iter().filter_map(|item| item.id).collect();
    assert_eq!(all_ids.len(), 200);

    let items = Arc::new(items);
    let mut workers = Vec::new();
    for _ in 0..8 {
        let items = items.clone();
        workers.push(tokio::spawn(async move {
            let mut cursor = items
                .enumerate_and_modify(&pending(), &start(), &ModifyOptions::default())
                .unwrap();
            let mut mine = Vec::new();
            while let Some(item) = cursor.next().await.unwrap() {
                mine.push(item.id.unwrap());
                tokio::task::yield_now().await;
            }
            mine
        }));
    }

    let mut seen = HashSet::new();
    for worker in workers {
        for id in worker.await.unwrap() {
            assert!(seen.insert(id), "claimed twice: {}", id);
        }
    }
    assert_eq!(seen, all_ids);
    assert_eq!(items.count(Some(&pending())).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_removers_drain_each_item_once() {
    let ctx = TestContext::new("claim_concurrent_remove");
    let items = ctx.gateway.manager::<WorkItem>().await.unwrap();
    let inserted = items
        .batch_insert((0..200).map(WorkItem::pending))
        .await
        .unwrap();
    items
        .batch_insert(vec![WorkItem {
            state: "done".to_string(),
            ..WorkItem::pending(0)
        }])
        .await
        .unwrap();
    let all_ids: HashSet<RecordId> = inserted.iter().filter_map(|item| item.id).collect();
    assert_eq!(all_ids.len(), 200);

    let items = Arc::new(items);
    let mut workers = Vec::new();
    for _ in 0..8 {
        let items = items.clone();
        workers.push(tokio::spawn(async move {
            let mut cursor = items.enumerate_and_remove(&pending(), None).unwrap();
            let mut mine = Vec::new();
            while let Some(item) = cursor.next().await.unwrap() {
                mine.push(item.id.unwrap());
                tokio::task::yield_now().await;
            }
            mine
        }));
    }

    let mut seen = HashSet::new();
    for worker in workers {
        for id in worker.await.unwrap() {
            assert!(seen.insert(id), "removed twice: {}", id);
        }
    }
    assert_eq!(seen, all_ids);
    assert_eq!(items.count(Some(&pending())).await.unwrap(), 0);
    assert_eq!(items.count(None).await.unwrap(), 1);
}
