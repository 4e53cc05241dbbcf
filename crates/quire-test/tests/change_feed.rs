//! Change feed tests against the in-memory store.

use std::time::Duration;

use quire_client::{Criteria, FeedState};
use quire_common::ErrorCode;
use quire_driver::Driver;
use quire_test::utils::{
    after_id, collected, collector, is_quiet, next_event, next_item, record, wait_for_state,
    TestDb, FEED_WAIT, QUIET_WAIT,
};
use serde_json::json;

// =============================================================================
// Delivery
// =============================================================================

#[tokio::test]
async fn test_reports_update_wildcard() {
    let (test_db, table) = TestDb::with_table().await;
    let mut feed = table.changes(Criteria::Wildcard).await.unwrap();
    assert_eq!(feed.state(), FeedState::Active);

    table.insert(record(json!({ "id": 1, "a": 1 }))).await.unwrap();
    table.update(1, record(json!({ "a": 2 }))).await.unwrap();

    let first = next_event(&mut feed).await;
    assert!(first.before.is_none());
    assert_eq!(after_id(&first), json!(1));

    let second = next_event(&mut feed).await;
    assert_eq!(after_id(&second), json!(1));
    assert_eq!(second.before.unwrap()["a"], json!(1));
    assert_eq!(second.after.unwrap()["a"], json!(2));

    test_db.db.close().await.unwrap();
}

#[tokio::test]
async fn test_manually_closes_feed() {
    let (test_db, table) = TestDb::with_table().await;
    let mut feed = table.changes(Criteria::parse(json!("*")).unwrap()).await.unwrap();

    table.insert(record(json!({ "id": 1, "a": 1 }))).await.unwrap();
    table.update(1, record(json!({ "a": 2 }))).await.unwrap();
    assert_eq!(after_id(&next_event(&mut feed).await), json!(1));
    assert_eq!(after_id(&next_event(&mut feed).await), json!(1));

    feed.close();
    feed.close();
    assert!(feed.is_closed());

    table.insert(record(json!({ "id": 2 }))).await.unwrap();
    assert!(next_item(&mut feed).await.is_none());

    test_db.db.close().await.unwrap();
}

#[tokio::test]
async fn test_reports_update_by_id() {
    let (test_db, table) = TestDb::with_table().await;
    table.insert(record(json!({ "id": 1, "a": 1 }))).await.unwrap();

    let mut feed = table.changes(1).await.unwrap();
    table.update(1, record(json!({ "a": 2 }))).await.unwrap();
    table.insert(record(json!({ "id": 2, "a": 2 }))).await.unwrap();

    assert_eq!(after_id(&next_event(&mut feed).await), json!(1));
    assert!(is_quiet(&mut feed).await);

    test_db.db.close().await.unwrap();
}

#[tokio::test]
async fn test_reports_update_by_ids() {
    let (test_db, table) = TestDb::with_table().await;
    table.insert(record(json!({ "id": 1, "a": 1 }))).await.unwrap();

    let mut feed = table.changes(vec![1, 2]).await.unwrap();
    table.update(1, record(json!({ "a": 2 }))).await.unwrap();
    table.insert(record(json!({ "id": 2, "a": 2 }))).await.unwrap();

    assert_eq!(after_id(&next_event(&mut feed).await), json!(1));
    assert_eq!(after_id(&next_event(&mut feed).await), json!(2));

    test_db.db.close().await.unwrap();
}

#[tokio::test]
async fn test_reports_update_by_query() {
    let (test_db, table) = TestDb::with_table().await;
    table.insert(record(json!({ "id": 1, "a": 1 }))).await.unwrap();

    let mut feed = table.changes(record(json!({ "a": 2 }))).await.unwrap();
    table.update(1, record(json!({ "a": 2 }))).await.unwrap();
    table.insert(record(json!({ "id": 2, "a": 2 }))).await.unwrap();

    assert_eq!(after_id(&next_event(&mut feed).await), json!(1));
    assert_eq!(after_id(&next_event(&mut feed).await), json!(2));

    test_db.db.close().await.unwrap();
}

#[tokio::test]
async fn test_reports_delete() {
    let (test_db, table) = TestDb::with_table().await;
    table.insert(record(json!({ "id": 1, "a": 1 }))).await.unwrap();

    let mut feed = table.changes(1).await.unwrap();
    table.remove(1).await.unwrap();

    let event = next_event(&mut feed).await;
    assert_eq!(event.before.unwrap()["id"], json!(1));
    assert!(event.after.is_none());

    test_db.db.close().await.unwrap();
}

#[tokio::test]
async fn test_reports_insert_of_missing_id() {
    let (test_db, table) = TestDb::with_table().await;

    let mut feed = table.changes(1).await.unwrap();
    table.insert(record(json!({ "id": 1, "a": 1 }))).await.unwrap();

    assert_eq!(after_id(&next_event(&mut feed).await), json!(1));

    test_db.db.close().await.unwrap();
}

#[tokio::test]
async fn test_reports_in_emission_order() {
    let (test_db, table) = TestDb::with_table().await;
    let mut feed = table.changes(Criteria::Wildcard).await.unwrap();

    for id in 0..20 {
        table.insert(record(json!({ "id": id }))).await.unwrap();
    }
    for id in 0..20 {
        assert_eq!(after_id(&next_event(&mut feed).await), json!(id));
    }

    test_db.db.close().await.unwrap();
}

#[tokio::test]
async fn test_unread_feed_holds_one_event() {
    let (test_db, table) = TestDb::with_table().await;
    let mut feed = table.changes(Criteria::Wildcard).await.unwrap();

    for id in 0..3 {
        table.insert(record(json!({ "id": id }))).await.unwrap();
    }
    tokio::time::sleep(QUIET_WAIT).await;
    assert_eq!(test_db.driver_stats().events_fetched, 1);

    for id in 0..3 {
        assert_eq!(after_id(&next_event(&mut feed).await), json!(id));
    }
    assert!(is_quiet(&mut feed).await);
    assert_eq!(test_db.driver_stats().events_fetched, 3);

    test_db.db.close().await.unwrap();
}

#[tokio::test]
async fn test_unread_feed_skips_filtered_events() {
    let (test_db, table) = TestDb::with_table().await;
    let mut feed = table.changes(record(json!({ "a": 2 }))).await.unwrap();

    table.insert(record(json!({ "id": 1, "a": 1 }))).await.unwrap();
    table.insert(record(json!({ "id": 2, "a": 2 }))).await.unwrap();
    table.insert(record(json!({ "id": 3, "a": 2 }))).await.unwrap();
    tokio::time::sleep(QUIET_WAIT).await;
    assert_eq!(test_db.driver_stats().events_fetched, 1);

    assert_eq!(after_id(&next_event(&mut feed).await), json!(2));
    assert_eq!(after_id(&next_event(&mut feed).await), json!(3));

    test_db.db.close().await.unwrap();
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_errors_on_bad_cursor() {
    let (test_db, table) = TestDb::with_table().await;
    let mut feed = table.changes(Criteria::Wildcard).await.unwrap();

    test_db.faults().fail_next_feed_fetch();
    table.insert(record(json!({ "id": 1, "a": 1 }))).await.unwrap();

    let err = next_item(&mut feed).await.unwrap().unwrap_err();
    assert_eq!(err.to_string(), "Database error");
    assert_eq!(err.code(), ErrorCode::Database);

    assert!(next_item(&mut feed).await.is_none());
    assert!(feed.is_closed());
    assert_eq!(test_db.db.stats().feed_errors, 1);

    // The table itself is unaffected.
    assert!(table.get(1).await.unwrap().is_some());
}

#[tokio::test]
async fn test_errors_on_bad_cursor_callback() {
    let (test_db, table) = TestDb::with_table().await;
    let (callback, mut rx) = collector();
    let handle = table.watch(Criteria::Wildcard, callback).unwrap();
    wait_for_state(&handle, FeedState::Active).await;

    test_db.faults().fail_next_feed_fetch();
    table.insert(record(json!({ "id": 1, "a": 1 }))).await.unwrap();

    let err = collected(&mut rx).await.unwrap_err();
    assert_eq!(err.to_string(), "Database error");

    table.insert(record(json!({ "id": 2 }))).await.unwrap();
    tokio::time::sleep(QUIET_WAIT).await;
    assert!(rx.try_recv().is_err());
    assert!(handle.is_closed());
}

#[tokio::test]
async fn test_errors_on_invalid_table() {
    let test_db = TestDb::connect().await;
    let err = test_db.db.table("invalid").changes(Criteria::Wildcard).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::TableNotFound);
    assert_eq!(test_db.db.open_feeds(), 0);
}

#[tokio::test]
async fn test_errors_on_invalid_table_callback() {
    let test_db = TestDb::connect().await;
    let (callback, mut rx) = collector();
    let handle = test_db.db.table("invalid").watch(Criteria::Wildcard, callback).unwrap();

    assert!(collected(&mut rx).await.is_err());
    wait_for_state(&handle, FeedState::Closed).await;
}

#[tokio::test]
async fn test_errors_on_invalid_criteria() {
    let (_db, table) = TestDb::with_table().await;
    let err = table.changes(Criteria::IdentitySet(vec![json!(true)])).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidCriteria);

    let (callback, _rx) = collector();
    assert!(table.watch(Criteria::has_fields(Vec::<String>::new()), callback).is_err());
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_watch_delivers_to_callback() {
    let (test_db, table) = TestDb::with_table().await;
    let (callback, mut rx) = collector();
    let handle = table.watch(Criteria::Wildcard, callback).unwrap();
    wait_for_state(&handle, FeedState::Active).await;

    table.insert(record(json!({ "id": 1, "a": 1 }))).await.unwrap();
    table.update(1, record(json!({ "a": 2 }))).await.unwrap();

    assert_eq!(after_id(&collected(&mut rx).await.unwrap()), json!(1));
    assert_eq!(after_id(&collected(&mut rx).await.unwrap()), json!(1));

    handle.close();
    test_db.db.close().await.unwrap();
}

#[tokio::test]
async fn test_close_during_opening() {
    let (test_db, table) = TestDb::with_table().await;
    let (callback, mut rx) = collector();

    let handle = table.watch(Criteria::Wildcard, callback).unwrap();
    handle.close();
    handle.close();
    assert_eq!(handle.state(), FeedState::Closed);

    table.insert(record(json!({ "id": 1 }))).await.unwrap();
    tokio::time::sleep(QUIET_WAIT).await;
    assert!(rx.try_recv().is_err());

    wait_for_open_feeds(&test_db, 0).await;
    assert_eq!(test_db.driver_stats().cursors_open, 0);
}

#[tokio::test]
async fn test_connection_close_stops_feeds_silently() {
    let (test_db, table) = TestDb::with_table().await;
    let mut feed = table.changes(Criteria::Wildcard).await.unwrap();
    let (callback, mut rx) = collector();
    let handle = table.watch(1, callback).unwrap();
    wait_for_state(&handle, FeedState::Active).await;

    test_db.db.close().await.unwrap();

    assert!(next_item(&mut feed).await.is_none());
    assert!(feed.is_closed());
    assert!(handle.is_closed());
    tokio::time::sleep(QUIET_WAIT).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(test_db.db.stats().feed_errors, 0);

    // Closing again after the connection is gone is still fine.
    feed.close();
    handle.close();
}

#[tokio::test]
async fn test_driver_close_stops_feeds_silently() {
    let (test_db, table) = TestDb::with_table().await;
    let mut feed = table.changes(Criteria::Wildcard).await.unwrap();

    test_db.driver.close().await.unwrap();

    assert!(next_item(&mut feed).await.is_none());
    assert!(feed.is_closed());
    assert_eq!(test_db.db.stats().feed_errors, 0);
}

#[tokio::test]
async fn test_changes_after_close_fails() {
    let (test_db, table) = TestDb::with_table().await;
    test_db.db.close().await.unwrap();

    let err = table.changes(Criteria::Wildcard).await.unwrap_err();
    assert_eq!(err.to_string(), "Database error");
}

#[tokio::test]
async fn test_drop_releases_cursor() {
    let (test_db, table) = TestDb::with_table().await;
    let feed = table.changes(Criteria::Wildcard).await.unwrap();
    assert_eq!(test_db.db.open_feeds(), 1);
    assert_eq!(test_db.driver_stats().cursors_open, 1);

    drop(feed);
    wait_for_open_feeds(&test_db, 0).await;
    assert_eq!(test_db.driver_stats().cursors_open, 0);
}

#[tokio::test]
async fn test_feeds_are_independent() {
    let (test_db, table) = TestDb::with_table().await;
    let mut ones = table.changes(1).await.unwrap();
    let mut all = table.changes(Criteria::Wildcard).await.unwrap();

    ones.close();
    table.insert(record(json!({ "id": 1 }))).await.unwrap();

    assert_eq!(after_id(&next_event(&mut all).await), json!(1));
    assert!(next_item(&mut ones).await.is_none());
    assert_eq!(test_db.db.stats().feeds_opened, 2);

    test_db.db.close().await.unwrap();
}

async fn wait_for_open_feeds(test_db: &TestDb, expected: usize) {
    tokio::time::timeout(FEED_WAIT, async {
        while test_db.db.open_feeds() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for feeds to stop");
}
