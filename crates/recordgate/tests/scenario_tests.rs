//! End-to-end flows across managers and decorators.

mod common;

use common::*;
use recordgate::query::{Criteria, IndexKeys, IndexOptions};
use recordgate::record::RecordId;

#[tokio::test]
async fn test_batch_count_fetch_delete_round() {
    let ctx = TestContext::new("scenario_round");
    let people = ctx.gateway.manager::<Person>().await.unwrap();

    let inserted = people.batch_insert(family()).await.unwrap();
    assert_eq!(inserted.len(), 3);
    assert_eq!(people.count(None).await.unwrap(), 3);

    let ids: Vec<RecordId> = inserted.iter().filter_map(|p| p.id).collect();
    let fetched = people
        .get_many_by_ids(&ids)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(fetched.len(), 3);

    assert_eq!(people.delete_many(&Criteria::everything()).await.unwrap(), 3);
    assert_eq!(people.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_archive_moves_record() {
    let ctx = TestContext::new("scenario_archive");
    let people = ctx.gateway.archiving_manager::<Person>().await.unwrap();
    let inserted = people.batch_insert(family()).await.unwrap();
    let ada = inserted[0].clone();

    assert!(people.archive(&ada).await.unwrap());
    assert_eq!(people.count(None).await.unwrap(), 2);

    let id = ada.id.unwrap();
    let archived = people.archived().get_by_id(&id).await.unwrap().unwrap();
    assert_eq!(archived, ada);
    assert!(ctx.store.collection_names().contains(&"Archived_Person".to_string()));
}

#[tokio::test]
async fn test_archive_requires_an_id() {
    let ctx = TestContext::new("scenario_archive_id");
    let people = ctx.gateway.archiving_manager::<Person>().await.unwrap();
    let err = people
        .archive(&Person::new("No", "Id", 1))
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());
}

#[tokio::test]
async fn test_archive_many_counts_removed() {
    let ctx = TestContext::new("scenario_archive_many");
    let people = ctx.gateway.archiving_manager::<Person>().await.unwrap();
    let inserted = people.batch_insert(family()).await.unwrap();

    assert_eq!(people.archive_many(&inserted).await.unwrap(), 3);
    assert_eq!(people.count(None).await.unwrap(), 0);
    assert_eq!(people.archived().count(None).await.unwrap(), 3);

    // A second pass finds nothing left to remove but rewrites the archive.
    assert_eq!(people.archive_many(&inserted).await.unwrap(), 0);
    assert_eq!(people.archived().count(None).await.unwrap(), 3);
}

#[tokio::test]
async fn test_unique_index_rejects_duplicates() {
    let ctx = TestContext::new("scenario_unique");
    let settings = ctx.gateway.manager::<Setting>().await.unwrap();
    settings
        .ensure_index(
            IndexKeys::ascending("Value"),
            IndexOptions {
                unique: true,
                ..IndexOptions::default()
            },
        )
        .await
        .unwrap();

    settings.save(&mut Setting::new("a", "same")).await.unwrap();
    let err = settings
        .save(&mut Setting::new("b", "same"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        recordgate::StorageError::Backend(recordgate::error::BackendError::DuplicateKey { .. })
    ));
    assert_eq!(settings.count(None).await.unwrap(), 1);
}
