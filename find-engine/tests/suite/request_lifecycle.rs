use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use find_engine_test_support::MockService;
use find_engine_test_support::ids;
use find_engine_test_support::params;
use pagesync_find_engine::FindEngine;
use pagesync_find_engine::FindError;
use pagesync_find_engine::FindOptions;
use pagesync_find_engine::ItemStore;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::sleep;

fn quiet_server() -> FindOptions {
    FindOptions {
        immediate: false,
        watch_params: false,
        ..FindOptions::server()
    }
}

#[tokio::test(start_paused = true)]
async fn successful_find_settles_state() -> anyhow::Result<()> {
    let store = Arc::new(ItemStore::default());
    let service = MockService::numbered(Arc::clone(&store), 25);
    let engine = FindEngine::new(
        Arc::clone(&service),
        store,
        Some(params(json!({ "query": { "$limit": 10 } }))),
        quiet_server(),
    )?;
    assert!(!engine.has_been_requested());

    let response = engine.find(None).await?;
    assert_eq!(response.total(), Some(25));
    assert_eq!(response.data().len(), 10);

    let state = engine.request_state();
    assert!(!state.is_pending);
    assert!(state.has_loaded);
    assert!(state.has_been_requested);
    assert_eq!(state.error, None);
    assert_eq!(state.request_count, 1);
    assert_eq!(engine.store().len(), 10);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pending_while_fetch_is_in_flight() -> anyhow::Result<()> {
    let store = Arc::new(ItemStore::default());
    let service = MockService::numbered(Arc::clone(&store), 5);
    service.push_delay(Duration::from_millis(300));
    let engine = Arc::new(FindEngine::new(
        Arc::clone(&service),
        store,
        Some(params(json!({ "query": { "$limit": 10 } }))),
        quiet_server(),
    )?);

    let task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.find(None).await })
    };
    sleep(Duration::from_millis(50)).await;
    assert!(engine.is_pending());
    assert!(!engine.has_loaded());
    assert!(engine.subscribe().borrow().is_pending);

    task.await??;
    assert!(!engine.is_pending());
    assert!(engine.has_loaded());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_find_records_and_returns_error() -> anyhow::Result<()> {
    let store = Arc::new(ItemStore::default());
    let service = MockService::numbered(Arc::clone(&store), 5);
    let engine = FindEngine::new(
        Arc::clone(&service),
        store,
        Some(params(json!({ "query": { "$limit": 10 } }))),
        quiet_server(),
    )?;

    service.fail_next(1);
    let err = engine.find(None).await.unwrap_err();
    assert!(matches!(err, FindError::Service(_)));
    assert!(err.to_string().contains("server unavailable"));
    assert!(!engine.is_pending());
    assert!(!engine.has_loaded());
    assert_eq!(engine.error(), Some(err));

    engine.clear_error();
    assert_eq!(engine.error(), None);

    // Retrying is up to the caller.
    engine.find(None).await?;
    assert!(engine.has_loaded());
    assert_eq!(engine.request_count(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn new_request_clears_previous_error() -> anyhow::Result<()> {
    let store = Arc::new(ItemStore::default());
    let service = MockService::numbered(Arc::clone(&store), 5);
    service.push_delay(Duration::ZERO);
    service.push_delay(Duration::from_millis(100));
    let engine = Arc::new(FindEngine::new(
        Arc::clone(&service),
        store,
        Some(params(json!({ "query": { "$limit": 10 } }))),
        quiet_server(),
    )?);

    service.fail_next(1);
    assert!(engine.find(None).await.is_err());
    let task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.find(None).await })
    };
    sleep(Duration::from_millis(10)).await;
    assert_eq!(engine.error(), None);
    assert!(engine.is_pending());
    task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn query_when_gate_skips_the_request() -> anyhow::Result<()> {
    let store = Arc::new(ItemStore::default());
    let service = MockService::numbered(Arc::clone(&store), 5);
    let engine = FindEngine::new(
        Arc::clone(&service),
        store,
        Some(params(json!({ "query": { "$limit": 10 } }))),
        quiet_server(),
    )?;

    let open = Arc::new(AtomicBool::new(false));
    let gate = Arc::clone(&open);
    engine.query_when(move || gate.load(Ordering::SeqCst));

    let response = engine.find(None).await?;
    assert!(response.data().is_empty());
    assert_eq!(engine.request_count(), 0);
    assert_eq!(service.call_count(), 0);
    assert!(!engine.has_been_requested());
    assert!(!engine.is_pending());

    engine.make_request().await?;
    assert_eq!(service.call_count(), 0);
    assert!(!engine.is_pending());

    open.store(true, Ordering::SeqCst);
    engine.make_request().await?;
    assert_eq!(service.call_count(), 1);
    assert_eq!(ids(&engine.data()), (1..=5).collect::<Vec<u64>>());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn history_keeps_the_two_latest_totaled_responses() -> anyhow::Result<()> {
    let store = Arc::new(ItemStore::default());
    let service = MockService::numbered(Arc::clone(&store), 30);
    let engine = FindEngine::new(
        Arc::clone(&service),
        store,
        Some(params(json!({ "query": { "$limit": 10 } }))),
        quiet_server(),
    )?;

    assert_eq!(engine.latest_query(), None);
    engine.find(None).await?;
    assert_eq!(engine.previous_query(), None);

    engine.pagination().set_skip(10);
    engine.find(None).await?;
    let second = engine.latest_query();

    engine.pagination().set_skip(20);
    engine.find(None).await?;

    assert_eq!(engine.previous_query(), second);
    let latest = engine.latest_query().unwrap();
    assert_eq!(latest.info.page.map(|p| p.skip), Some(20));
    assert_eq!(latest.total, 30);
    let previous = engine.previous_query().unwrap();
    assert_eq!(previous.info.page.map(|p| p.skip), Some(10));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stale_response_does_not_overwrite_newer_page() -> anyhow::Result<()> {
    let store = Arc::new(ItemStore::default());
    let service = MockService::numbered(Arc::clone(&store), 3);
    service.push_delay(Duration::from_millis(500));
    service.push_delay(Duration::from_millis(10));
    let engine = Arc::new(FindEngine::new(
        Arc::clone(&service),
        store,
        Some(params(json!({ "query": { "$limit": 10 } }))),
        quiet_server(),
    )?);

    let slow = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.find(None).await })
    };
    sleep(Duration::from_millis(5)).await;
    service.prepend(json!({ "id": 99, "n": 99, "even": false }));
    engine.find(None).await?;
    assert!(engine.is_pending(), "slow request still in flight");

    slow.await??;
    assert!(!engine.is_pending());
    let current = engine.current_query().unwrap();
    assert_eq!(current.ids, vec!["99", "1", "2", "3"]);
    assert_eq!(current.total, 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn empty_result_is_not_kept_in_history() -> anyhow::Result<()> {
    let store = Arc::new(ItemStore::default());
    let service = MockService::numbered(Arc::clone(&store), 5);
    let engine = FindEngine::new(
        Arc::clone(&service),
        store,
        Some(params(json!({ "query": { "n": 999, "$limit": 10 } }))),
        quiet_server(),
    )?;

    let response = engine.find(None).await?;
    assert_eq!(response.total(), Some(0));
    assert_eq!(engine.latest_query(), None);
    assert!(engine.has_loaded());

    // The empty page is still cached, so the view reads as settled and empty.
    let current = engine.current_query().unwrap();
    assert_eq!(current.total, 0);
    assert!(current.ids.is_empty());
    assert_eq!(engine.total(), 0);
    assert_eq!(engine.page_count(), 1);
    Ok(())
}
