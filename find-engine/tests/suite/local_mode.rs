use std::sync::Arc;

use find_engine_test_support::MockService;
use find_engine_test_support::ids;
use find_engine_test_support::params;
use find_engine_test_support::row;
use pagesync_find_engine::FindEngine;
use pagesync_find_engine::FindOptions;
use pagesync_find_engine::ItemStore;
use pretty_assertions::assert_eq;
use serde_json::json;

fn seeded_store(count: u64) -> Arc<ItemStore> {
    let store = Arc::new(ItemStore::default());
    store.upsert((1..=count).map(row));
    store
}

#[tokio::test(start_paused = true)]
async fn data_is_filtered_from_the_store() -> anyhow::Result<()> {
    let store = seeded_store(12);
    let service = MockService::numbered(Arc::clone(&store), 12);
    let engine = FindEngine::new(
        Arc::clone(&service),
        store,
        Some(params(json!({ "query": { "even": true } }))),
        FindOptions::default(),
    )?;

    assert_eq!(ids(&engine.data()), vec![2, 4, 6, 8, 10, 12]);
    assert_eq!(engine.total(), 6);
    assert_eq!(engine.page_count(), 1);
    assert_eq!(service.call_count(), 0);
    assert!(!engine.has_been_requested());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn operators_and_sorting_apply_locally() -> anyhow::Result<()> {
    let store = seeded_store(12);
    let service = MockService::numbered(Arc::clone(&store), 12);
    let engine = FindEngine::new(
        Arc::clone(&service),
        store,
        Some(params(json!({
            "query": { "n": { "$gt": 8 }, "$sort": { "n": -1 } }
        }))),
        FindOptions::default(),
    )?;

    assert_eq!(ids(&engine.data()), vec![12, 11, 10, 9]);
    assert_eq!(engine.total(), 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn query_limit_windows_local_results() -> anyhow::Result<()> {
    let store = seeded_store(12);
    let service = MockService::numbered(Arc::clone(&store), 12);
    let engine = FindEngine::new(
        Arc::clone(&service),
        store,
        Some(params(json!({ "query": { "even": true, "$limit": 2 } }))),
        FindOptions::default(),
    )?;

    assert_eq!(engine.limit(), 2);
    assert_eq!(ids(&engine.data()), vec![2, 4]);
    assert_eq!(engine.total(), 6);
    assert_eq!(engine.page_count(), 3);

    engine.next().await?;
    assert_eq!(engine.skip(), 2);
    assert_eq!(ids(&engine.data()), vec![6, 8]);

    engine.to_end().await?;
    assert_eq!(ids(&engine.data()), vec![10, 12]);
    assert!(!engine.can_next());

    engine.next().await?;
    assert_eq!(engine.current_page(), 3);

    engine.pagination().set_limit(4);
    engine.to_start().await?;
    assert_eq!(ids(&engine.data()), vec![2, 4, 6, 8]);
    assert_eq!(engine.page_count(), 2);
    assert_eq!(service.call_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn store_changes_republish_the_snapshot() -> anyhow::Result<()> {
    let store = seeded_store(12);
    let service = MockService::numbered(Arc::clone(&store), 12);
    let engine = FindEngine::new(
        Arc::clone(&service),
        Arc::clone(&store),
        Some(params(json!({ "query": { "even": true } }))),
        FindOptions::default(),
    )?;

    let mut snapshots = engine.subscribe();
    assert_eq!(snapshots.borrow_and_update().total, 6);

    store.upsert([row(14)]);
    snapshots.changed().await?;
    let snapshot = snapshots.borrow_and_update().clone();
    assert_eq!(snapshot.total, 7);
    assert_eq!(ids(&snapshot.data).last(), Some(&14));
    assert_eq!(snapshot.qid, "default");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn explicit_find_fills_the_store() -> anyhow::Result<()> {
    let store = Arc::new(ItemStore::default());
    let service = MockService::numbered(Arc::clone(&store), 12);
    let engine = FindEngine::new(
        Arc::clone(&service),
        Arc::clone(&store),
        Some(params(json!({ "query": {} }))),
        FindOptions::default(),
    )?;
    assert!(engine.data().is_empty());

    let response = engine.find(Some(params(json!({ "query": { "n": 3 } })))).await?;
    assert_eq!(ids(response.data()), vec![3]);
    assert_eq!(response.total(), None);
    assert_eq!(store.len(), 1);
    assert_eq!(ids(&engine.data()), vec![3]);
    assert!(engine.has_loaded());
    // Unpaginated responses do not enter the query history.
    assert_eq!(engine.latest_query(), None);

    engine.find(None).await?;
    assert_eq!(store.len(), 12);
    assert_eq!(engine.total(), 12);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn changing_params_recomputes_without_requests() -> anyhow::Result<()> {
    let store = seeded_store(6);
    let service = MockService::numbered(Arc::clone(&store), 6);
    let engine = FindEngine::new(
        Arc::clone(&service),
        store,
        Some(params(json!({ "query": { "even": true } }))),
        FindOptions::default(),
    )?;

    engine.set_params(Some(params(json!({ "query": { "even": false } }))));
    assert_eq!(ids(&engine.data()), vec![1, 3, 5]);
    engine.set_params(None);
    assert_eq!(engine.total(), 6);
    assert_eq!(service.call_count(), 0);
    Ok(())
}
