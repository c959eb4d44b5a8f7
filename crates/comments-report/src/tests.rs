//! End-to-end exercise of the report pipeline: cache miss triggers a build,
//! concurrent waiters on the same stale request collapse to one build
//! (`spec.md` §8 property 9), and a cache hit skips the builder entirely.
//!
//! `ReportBuilder` and `DownloadOrchestrator` talk over
//! `comments_pubsub::Registry::global()`, a single process-wide registry —
//! exactly as the spec's single-builder-per-process model assumes. Since
//! Rust runs `#[test]` functions concurrently in one process, every test
//! here that spins up a builder holds `PUBSUB_LOCK` for its duration so two
//! builders never race on the same `xml-dl-request` channel.

use std::sync::{Arc, OnceLock};

use comments_core::{DlFormat, Timestamp, UserId};
use comments_db::Database;
use tokio::sync::Mutex as AsyncMutex;

use crate::blob_store::BlobStore;
use crate::builder::ReportBuilder;
use crate::orchestrator::{DownloadOrchestrator, DownloadOutcome, DownloadRequest};

fn pubsub_lock() -> &'static AsyncMutex<()> {
    static LOCK: OnceLock<AsyncMutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| AsyncMutex::new(()))
}

async fn fixture() -> (Arc<Database>, DownloadOrchestrator, Arc<ReportBuilder>) {
    let db = Arc::new(Database::new_in_memory().await.unwrap());
    let dir = tempfile::tempdir().unwrap();
    let blobs = BlobStore::open(dir.path()).await.unwrap();
    let orchestrator = DownloadOrchestrator::new(db.clone(), blobs.clone());
    let builder = ReportBuilder::with_capacity(db.clone(), blobs, 3);
    (db, orchestrator, builder)
}

fn request(i_id: i64) -> DownloadRequest {
    DownloadRequest {
        user_id: UserId::new(1),
        itype_id: 1,
        i_id: Some(i_id),
        author_id: None,
        start: None,
        end: None,
        fmt: DlFormat::Xml,
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn cache_miss_builds_and_cache_hit_skips_builder() {
    let _guard = pubsub_lock().lock().await;
    let (db, orchestrator, builder) = fixture().await;

    db.write_with(|tx| {
        Database::insert_comment_tx(tx, 1, 1, UserId::new(1), "hi".into(), Timestamp::from_millis(0))
    })
    .await
    .unwrap();

    let builder_task = {
        let builder = builder.clone();
        tokio::spawn(async move { builder.run().await })
    };

    let first = orchestrator.handle(request(1)).await.unwrap();
    assert!(matches!(first, DownloadOutcome::Built { .. }), "first request must trigger a live build");

    let second = orchestrator.handle(request(1)).await.unwrap();
    assert!(matches!(second, DownloadOutcome::Cached { .. }), "second request must hit the cache");

    let (DownloadOutcome::Built { bytes: built_bytes } | DownloadOutcome::Cached { bytes: built_bytes }) = first;
    let (DownloadOutcome::Built { bytes: cached_bytes } | DownloadOutcome::Cached { bytes: cached_bytes }) = second;
    assert_eq!(built_bytes, cached_bytes, "rebuilding must be byte-for-byte stable");

    builder.stop();
    builder_task.await.unwrap();
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn concurrent_downloads_of_same_stale_request_collapse_to_one_build() {
    let _guard = pubsub_lock().lock().await;
    let (db, orchestrator, builder) = fixture().await;

    db.write_with(|tx| {
        Database::insert_comment_tx(tx, 1, 1, UserId::new(1), "hi".into(), Timestamp::from_millis(0))
    })
    .await
    .unwrap();

    let builder_task = {
        let builder = builder.clone();
        tokio::spawn(async move { builder.run().await })
    };

    let orchestrator = Arc::new(orchestrator);
    let mut waiters = Vec::new();
    for _ in 0..8 {
        let orchestrator = orchestrator.clone();
        waiters.push(tokio::spawn(async move { orchestrator.handle(request(1)).await }));
    }

    let mut outcomes = Vec::new();
    for waiter in waiters {
        outcomes.push(waiter.await.unwrap().unwrap());
    }

    assert_eq!(outcomes.len(), 8);
    for outcome in &outcomes {
        assert!(matches!(outcome, DownloadOutcome::Built { bytes } if !bytes.is_empty()));
    }

    builder.stop();
    builder_task.await.unwrap();
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn mutation_outside_scope_does_not_invalidate_cached_report() {
    let _guard = pubsub_lock().lock().await;
    let (db, orchestrator, builder) = fixture().await;

    db.write_with(|tx| {
        Database::insert_comment_tx(tx, 1, 1, UserId::new(1), "tree one".into(), Timestamp::from_millis(0))
    })
    .await
    .unwrap();
    db.write_with(|tx| {
        Database::insert_comment_tx(tx, 1, 2, UserId::new(1), "tree two".into(), Timestamp::from_millis(1))
    })
    .await
    .unwrap();

    let builder_task = {
        let builder = builder.clone();
        tokio::spawn(async move { builder.run().await })
    };

    let _ = orchestrator.handle(request(1)).await.unwrap();
    let after_build = orchestrator.handle(request(1)).await.unwrap();
    assert!(matches!(after_build, DownloadOutcome::Cached { .. }));

    // A mutation in an unrelated tree (instance 2) must not invalidate the
    // cached report for instance 1.
    db.write_with(|tx| {
        Database::insert_comment_tx(tx, 0, 2, UserId::new(1), "reply in tree two".into(), Timestamp::from_millis(2))
    })
    .await
    .unwrap();

    let still_cached = orchestrator.handle(request(1)).await.unwrap();
    assert!(
        matches!(still_cached, DownloadOutcome::Cached { .. }),
        "mutation outside (tree, author, start, end) scope must not invalidate the report"
    );

    builder.stop();
    builder_task.await.unwrap();
}
