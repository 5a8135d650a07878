use std::collections::HashSet;
use std::time::Duration;

use harvester_core::queue::UrlStatus;
use harvester_core::work_queue::WorkQueue;

use crate::integration::common::{setup_test_db, setup_test_queue, urls};

const LONG_LEASE: Duration = Duration::from_secs(900);

#[tokio::test]
async fn admit_lease_ack_lifecycle() {
    let (queue, _dir) = setup_test_queue().await;

    assert_eq!(queue.admit(&urls(&["x", "y", "x"])).await.unwrap(), 2);

    let leased: HashSet<String> =
        queue.lease(5, Duration::ZERO).await.unwrap().into_iter().collect();
    let expected: HashSet<String> = urls(&["x", "y"]).into_iter().collect();
    assert_eq!(leased, expected);

    queue.ack_success("x").await.unwrap();
    assert!(queue.is_processed("x").await.unwrap());

    queue.ack_fail("y", "boom", 2).await.unwrap();
    assert_eq!(queue.lease(1, Duration::ZERO).await.unwrap(), vec!["y"]);

    queue.ack_fail("y", "boom", 2).await.unwrap();
    assert!(queue.lease(1, Duration::ZERO).await.unwrap().is_empty());

    let failed = queue.get("y").await.unwrap().expect("y should exist");
    assert_eq!(failed.status, UrlStatus::Failed);
    assert_eq!(failed.attempts, 2);
    assert_eq!(failed.last_error.as_deref(), Some("boom"));

    // Re-admission resurrects a failed URL with a fresh budget.
    assert_eq!(queue.admit(&urls(&["y"])).await.unwrap(), 0);
    assert_eq!(queue.lease(1, Duration::ZERO).await.unwrap(), vec!["y"]);
    let revived = queue.get("y").await.unwrap().unwrap();
    assert_eq!(revived.attempts, 0);
    assert!(revived.last_error.is_none());
}

#[tokio::test]
async fn readmission_never_touches_processed_rows() {
    let (queue, _dir) = setup_test_queue().await;
    queue.admit(&urls(&["a", "b"])).await.unwrap();
    queue.lease(1, LONG_LEASE).await.unwrap();
    queue.ack_success("a").await.unwrap();

    assert_eq!(queue.admit(&urls(&["a", "b"])).await.unwrap(), 0);

    assert_eq!(queue.get("a").await.unwrap().unwrap().status, UrlStatus::Processed);
    assert_eq!(queue.lease(5, LONG_LEASE).await.unwrap(), vec!["b"]);
}

#[tokio::test]
async fn admit_empty_batch_is_noop() {
    let (queue, _dir) = setup_test_queue().await;
    assert_eq!(queue.admit(&[]).await.unwrap(), 0);
    assert_eq!(queue.stats().await.unwrap().total(), 0);
}

#[tokio::test]
async fn lease_hands_out_oldest_first() {
    let (queue, _dir) = setup_test_queue().await;
    queue.admit(&urls(&["first", "second", "third"])).await.unwrap();

    assert_eq!(
        queue.lease(2, LONG_LEASE).await.unwrap(),
        vec!["first", "second"]
    );
    assert_eq!(queue.lease(2, LONG_LEASE).await.unwrap(), vec!["third"]);
}

#[tokio::test]
async fn live_lease_is_not_reissued_until_expired() {
    let (queue, _dir) = setup_test_queue().await;
    queue.admit(&urls(&["only"])).await.unwrap();

    assert_eq!(queue.lease(1, LONG_LEASE).await.unwrap(), vec!["only"]);
    assert!(queue.lease(1, LONG_LEASE).await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let reclaimed = queue.lease(1, Duration::from_millis(10)).await.unwrap();
    assert_eq!(reclaimed, vec!["only"]);

    let record = queue.get("only").await.unwrap().unwrap();
    assert_eq!(record.status, UrlStatus::Leased);
    assert!(record.leased_at.is_some());
}

#[tokio::test]
async fn lease_with_zero_limit_returns_nothing() {
    let (queue, _dir) = setup_test_queue().await;
    queue.admit(&urls(&["a"])).await.unwrap();
    assert!(queue.lease(0, LONG_LEASE).await.unwrap().is_empty());
    assert_eq!(queue.stats().await.unwrap().pending, 1);
}

#[tokio::test]
async fn concurrent_leases_are_disjoint() {
    let (queue, _dir) = setup_test_queue().await;
    let all: Vec<String> = (0..40).map(|n| format!("https://1000.menu/cooking/{n}")).collect();
    queue.admit(&all).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let mut mine = Vec::new();
            loop {
                let batch = queue.lease(3, LONG_LEASE).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                mine.extend(batch);
            }
            mine
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for url in handle.await.unwrap() {
            total += 1;
            assert!(seen.insert(url.clone()), "{url} leased twice");
        }
    }
    assert_eq!(total, all.len());
}

#[tokio::test]
async fn ack_fail_below_limit_returns_to_pending() {
    let (queue, _dir) = setup_test_queue().await;
    queue.admit(&urls(&["flaky"])).await.unwrap();
    queue.lease(1, LONG_LEASE).await.unwrap();

    queue.ack_fail("flaky", "HTTP 503", 5).await.unwrap();

    let record = queue.get("flaky").await.unwrap().unwrap();
    assert_eq!(record.status, UrlStatus::Pending);
    assert_eq!(record.attempts, 1);
    assert!(record.leased_at.is_none());
    assert_eq!(record.last_error.as_deref(), Some("HTTP 503"));
}

#[tokio::test]
async fn stats_count_every_status() {
    let (queue, _dir) = setup_test_queue().await;
    queue.admit(&urls(&["a", "b", "c", "d"])).await.unwrap();
    queue.lease(3, LONG_LEASE).await.unwrap();
    queue.ack_success("a").await.unwrap();
    queue.ack_fail("b", "gone", 1).await.unwrap();

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.leased, 1);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.total(), 4);
}

#[tokio::test]
async fn unknown_url_lookups() {
    let (queue, _dir) = setup_test_queue().await;
    assert!(!queue.is_processed("missing").await.unwrap());
    assert!(queue.get("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn state_survives_reopen() {
    let (db, dir) = setup_test_db().await;
    db.queue().admit(&urls(&["kept"])).await.unwrap();
    db.pool().close().await;

    let config = harvester_db::QueueDbConfig::new(dir.path().join("state/workqueue.db"));
    let reopened = harvester_db::Database::connect(&config).await.unwrap();
    reopened.migrate().await.unwrap();

    assert_eq!(reopened.queue().stats().await.unwrap().pending, 1);
}

#[tokio::test]
async fn wal_journaling_follows_config() {
    let (db, dir) = setup_test_db().await;
    assert_eq!(db.journal_mode().await.unwrap(), "wal");

    let config = harvester_db::QueueDbConfig::new(dir.path().join("plain.db")).with_wal(false);
    let plain = harvester_db::Database::connect(&config).await.unwrap();
    assert_ne!(plain.journal_mode().await.unwrap(), "wal");
}
