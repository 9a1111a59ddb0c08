//! End-to-end behavior of the synchronizer against in-memory collaborators.
//!
//! Pages come either from the in-memory backend or from a fetcher the test
//! answers by hand, which is how a live event is slipped in while a page is
//! in flight.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use rowsync::sync::memory::MemoryBackend;
use rowsync::sync::ChangeTypeRaw;
use rowsync::{
    ChangeEvent, FeedFrame, FetchOutcome, FetchStatus, LiveStatus, Synchronizer,
    SynchronizerConfig, SynchronizerError,
};
use rowsync_testkit::scenarios::all_scenarios;
use rowsync_testkit::{ids, init_tracing, name_backend, wait_for, ManualFetcher, TestRow};

type Backend = Arc<MemoryBackend<TestRow>>;
type ManualSync = Synchronizer<TestRow, ManualFetcher<TestRow>, Backend>;
type BackendSync = Synchronizer<TestRow, Backend, Backend>;

const COLLECTION: &str = "tickets";

fn config(page_size: usize) -> SynchronizerConfig {
    SynchronizerConfig::new(COLLECTION).with_page_size(page_size)
}

async fn open_backend(backend: &Backend, config: SynchronizerConfig) -> anyhow::Result<BackendSync> {
    let sync = Synchronizer::open(config, Arc::clone(backend), Arc::clone(backend)).await?;
    anyhow::ensure!(
        wait_for(|| sync.status() != FetchStatus::Loading).await,
        "first page never landed"
    );
    Ok(sync)
}

#[tokio::test]
async fn test_concrete_scenarios_end_to_end() -> anyhow::Result<()> {
    init_tracing();
    let backend = name_backend();
    backend.seed(COLLECTION, TestRow::many([1, 2]));
    let (fetcher, mut pending) = ManualFetcher::new();
    let sync: ManualSync = Synchronizer::open(config(2), fetcher.clone(), Arc::clone(&backend)).await?;

    let first = pending.next().await.context("first page request")?;
    assert_eq!(first.request.offset, 0);
    assert_eq!(first.request.limit, 2);
    first.respond(TestRow::many([1, 2]));
    assert!(wait_for(|| sync.status() == FetchStatus::Idle).await);
    assert_eq!(ids(&sync.rows()), vec![1, 2]);
    assert!(sync.snapshot().has_more);

    // Scenario 1
    backend.insert(COLLECTION, TestRow::new(3));
    assert!(wait_for(|| ids(&sync.rows()) == vec![3, 1, 2]).await);

    // Scenario 2
    assert!(backend.update(COLLECTION, TestRow::named(1, "X")));
    assert!(wait_for(|| sync.rows().get(1) == Some(&TestRow::named(1, "X"))).await);
    assert_eq!(ids(&sync.rows()), vec![3, 1, 2]);

    // Scenario 3
    backend.delete(COLLECTION, &2).context("row 2 seeded")?;
    assert!(wait_for(|| ids(&sync.rows()) == vec![3, 1]).await);

    // Scenario 4: a live insert lands while the page carrying it is in flight
    assert!(sync.request_more());
    let second = pending.next().await.context("second page request")?;
    assert_eq!(second.request.offset, 2);
    backend.insert(COLLECTION, TestRow::new(4));
    assert!(wait_for(|| ids(&sync.rows()) == vec![4, 3, 1]).await);
    second.respond(TestRow::many([4, 5]));
    assert!(wait_for(|| sync.status() == FetchStatus::Idle).await);

    let expected = &all_scenarios()[3].expected;
    assert_eq!(sync.rows().as_ref(), expected);
    assert!(sync.snapshot().has_more);
    assert_eq!(fetcher.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_fetch_failure_then_retry_starts_over() -> anyhow::Result<()> {
    init_tracing();
    let backend = name_backend();
    let (fetcher, mut pending) = ManualFetcher::new();
    let sync: ManualSync = Synchronizer::open(config(2), fetcher.clone(), Arc::clone(&backend)).await?;

    pending.next().await.context("first page")?.respond(TestRow::many([1, 2]));
    assert!(wait_for(|| sync.status() == FetchStatus::Idle).await);

    assert!(sync.request_more());
    let failing = pending.next().await.context("second page")?;
    assert_eq!(failing.request.offset, 2);
    failing.fail("network unreachable");
    assert!(wait_for(|| sync.status() == FetchStatus::Error).await);

    let snapshot = sync.snapshot();
    assert_eq!(snapshot.error.as_deref(), Some("fetch failed: network unreachable"));
    assert_eq!(ids(&snapshot.rows), vec![1, 2]);

    // Blocked until retry
    assert!(!sync.request_more());
    assert!(matches!(sync.fetch_next().await, FetchOutcome::Blocked { .. }));
    assert_eq!(fetcher.calls(), 2);

    let (outcome, ()) = tokio::join!(sync.retry(), async {
        let fetch = pending.next().await.expect("retry request");
        assert_eq!(fetch.request.offset, 0);
        assert_eq!(fetch.request.limit, 2);
        assert!(sync.rows().is_empty());
        fetch.respond(TestRow::many([7, 1]));
    });
    assert_eq!(
        outcome?,
        FetchOutcome::Loaded { appended: 2, discarded: 0, has_more: true }
    );
    assert_eq!(sync.status(), FetchStatus::Idle);
    assert_eq!(sync.snapshot().error, None);
    assert_eq!(ids(&sync.rows()), vec![7, 1]);
    Ok(())
}

#[tokio::test]
async fn test_resume_refetches_the_failed_page() -> anyhow::Result<()> {
    let backend = name_backend();
    backend.seed(COLLECTION, TestRow::many(1..=5));
    let sync = open_backend(&backend, config(2)).await?;

    backend.fail_next_fetch("timeout");
    assert_eq!(
        sync.fetch_next().await,
        FetchOutcome::Failed { error: "fetch failed: timeout".into() }
    );
    assert!(sync.resume().await.is_loaded());
    assert_eq!(ids(&sync.rows()), vec![5, 4, 3, 2]);
    Ok(())
}

#[tokio::test]
async fn test_only_one_request_in_flight() -> anyhow::Result<()> {
    let backend = name_backend();
    backend.seed(COLLECTION, TestRow::many(1..=10));
    let (fetcher, mut pending) = ManualFetcher::new();
    let sync: ManualSync = Synchronizer::open(config(2), fetcher.clone(), Arc::clone(&backend)).await?;

    assert_eq!(sync.status(), FetchStatus::Loading);
    for _ in 0..3 {
        assert!(!sync.request_more());
    }
    assert!(!sync.notify_viewport(0));
    assert_eq!(sync.fetch_next().await, FetchOutcome::AlreadyLoading);

    let first = pending.next().await.context("first page")?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(pending.try_next().is_none());
    assert_eq!(fetcher.calls(), 1);

    first.respond(TestRow::many([10, 9]));
    assert!(wait_for(|| sync.status() == FetchStatus::Idle).await);
    assert!(sync.request_more());
    assert_eq!(pending.next().await.context("second page")?.request.offset, 2);
    assert_eq!(fetcher.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_exhaustion_stops_requests() -> anyhow::Result<()> {
    let backend = name_backend();
    backend.seed(COLLECTION, TestRow::many(1..=3));
    let sync = open_backend(&backend, config(2)).await?;

    assert!(sync.fetch_next().await.is_loaded());
    let snapshot = sync.snapshot();
    assert_eq!(snapshot.status, FetchStatus::Exhausted);
    assert!(!snapshot.has_more);
    assert_eq!(ids(&snapshot.rows), vec![3, 2, 1]);

    assert!(!sync.request_more());
    assert_eq!(sync.fetch_next().await, FetchOutcome::NoMore);
    assert_eq!(backend.fetch_calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_teardown_discards_late_results() -> anyhow::Result<()> {
    let backend = name_backend();
    let (fetcher, mut pending) = ManualFetcher::new();
    let sync: ManualSync = Synchronizer::open(config(2), fetcher.clone(), Arc::clone(&backend)).await?;
    let first = pending.next().await.context("first page")?;
    assert!(wait_for(|| backend.subscriber_count() == 1).await);

    sync.close();
    first.respond(TestRow::many([1, 2]));
    backend.insert(COLLECTION, TestRow::new(3));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let snapshot = sync.snapshot();
    assert!(snapshot.is_empty());
    assert_eq!(snapshot.live, LiveStatus::Closed);
    assert!(wait_for(|| backend.subscriber_count() == 0).await);
    assert!(!sync.request_more());
    assert!(matches!(
        sync.set_filter(Some("name=a".into())).await,
        Err(SynchronizerError::Closed)
    ));
    Ok(())
}

#[tokio::test]
async fn test_drop_closes_the_subscription() -> anyhow::Result<()> {
    let backend = name_backend();
    let sync = open_backend(&backend, config(2)).await?;
    assert_eq!(backend.subscriber_count(), 1);
    drop(sync);
    assert!(wait_for(|| backend.subscriber_count() == 0).await);
    Ok(())
}

#[tokio::test]
async fn test_filter_change_resubscribes_and_reloads() -> anyhow::Result<()> {
    init_tracing();
    let backend = name_backend();
    backend.seed(
        COLLECTION,
        [
            TestRow::named(1, "a"),
            TestRow::named(2, "b"),
            TestRow::named(3, "a"),
            TestRow::named(4, "b"),
        ],
    );
    let sync = open_backend(&backend, config(10).with_filter("name=a")).await?;
    assert_eq!(ids(&sync.rows()), vec![3, 1]);

    let outcome = sync.set_filter(Some("name=b".into())).await?;
    assert_eq!(
        outcome,
        FetchOutcome::Loaded { appended: 2, discarded: 0, has_more: false }
    );
    assert_eq!(sync.filter().as_deref(), Some("name=b"));
    assert_eq!(ids(&sync.rows()), vec![4, 2]);
    assert!(wait_for(|| backend.subscriber_count() == 1).await);

    backend.insert(COLLECTION, TestRow::named(5, "a"));
    backend.insert(COLLECTION, TestRow::named(6, "b"));
    assert!(wait_for(|| ids(&sync.rows()) == vec![6, 4, 2]).await);
    Ok(())
}

#[tokio::test]
async fn test_filter_change_discards_pages_of_the_old_filter() -> anyhow::Result<()> {
    let backend = name_backend();
    let (fetcher, mut pending) = ManualFetcher::new();
    let sync: ManualSync =
        Synchronizer::open(config(2).with_filter("name=a"), fetcher.clone(), Arc::clone(&backend)).await?;
    let stale = pending.next().await.context("first page")?;
    assert_eq!(stale.request.filter.as_deref(), Some("name=a"));

    let (outcome, ()) = tokio::join!(sync.set_filter(Some("name=b".into())), async {
        let fresh = pending.next().await.expect("request under new filter");
        assert_eq!(fresh.request.filter.as_deref(), Some("name=b"));
        assert_eq!(fresh.request.offset, 0);
        stale.respond(vec![TestRow::named(1, "a"), TestRow::named(3, "a")]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        fresh.respond(vec![TestRow::named(2, "b")]);
    });

    assert!(outcome?.is_loaded());
    assert_eq!(ids(&sync.rows()), vec![2]);
    assert_eq!(sync.status(), FetchStatus::Exhausted);
    Ok(())
}

#[tokio::test]
async fn test_lost_feed_marks_the_view_stale() -> anyhow::Result<()> {
    let backend = name_backend();
    backend.seed(COLLECTION, TestRow::many(1..=2));
    let sync = open_backend(&backend, config(5)).await?;
    assert_eq!(sync.live_status(), LiveStatus::Live);
    assert!(!sync.snapshot().is_stale());

    backend.disconnect_all();
    assert!(wait_for(|| sync.snapshot().is_stale()).await);
    assert_eq!(
        sync.live_status(),
        LiveStatus::Disconnected { reason: "change feed disconnected: stream ended".into() }
    );
    assert_eq!(ids(&sync.rows()), vec![2, 1]);

    // Nothing reconnects on its own
    backend.insert(COLLECTION, TestRow::new(3));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(ids(&sync.rows()), vec![2, 1]);

    assert!(sync.retry().await?.is_loaded());
    assert_eq!(sync.live_status(), LiveStatus::Live);
    assert_eq!(ids(&sync.rows()), vec![3, 2, 1]);
    Ok(())
}

#[tokio::test]
async fn test_error_frame_disconnects() -> anyhow::Result<()> {
    let backend = name_backend();
    let sync = open_backend(&backend, config(5)).await?;

    backend.emit(COLLECTION, FeedFrame::Error { message: "permission revoked".into() });
    assert!(wait_for(|| sync.snapshot().is_stale()).await);
    assert_eq!(
        sync.live_status(),
        LiveStatus::Disconnected { reason: "subscription error: permission revoked".into() }
    );
    Ok(())
}

#[tokio::test]
async fn test_malformed_events_are_dropped() -> anyhow::Result<()> {
    let backend = name_backend();
    backend.seed(COLLECTION, TestRow::many(1..=2));
    let sync = open_backend(&backend, config(5)).await?;

    backend.emit(COLLECTION, FeedFrame::change(ChangeEvent::insert(TestRow::keyless("ghost"))));
    backend.emit(COLLECTION, FeedFrame::Change { change_type: ChangeTypeRaw::Insert, row: None });
    backend.emit(COLLECTION, FeedFrame::Change {
        change_type: ChangeTypeRaw::Unknown,
        row: Some(TestRow::new(8)),
    });
    backend.emit(COLLECTION, FeedFrame::Heartbeat);
    backend.emit(COLLECTION, FeedFrame::change(ChangeEvent::insert(TestRow::new(9))));

    assert!(wait_for(|| ids(&sync.rows()) == vec![9, 2, 1]).await);
    assert_eq!(sync.rows().len(), 3);
    assert_eq!(sync.live_status(), LiveStatus::Live);
    Ok(())
}

#[tokio::test]
async fn test_viewport_proximity_requests_more() -> anyhow::Result<()> {
    let backend = name_backend();
    backend.seed(COLLECTION, TestRow::many(1..=10));
    let sync = open_backend(&backend, config(2).with_prefetch_threshold(1)).await?;
    assert_eq!(sync.rows().len(), 2);

    assert!(sync.notify_viewport(0));
    assert!(wait_for(|| sync.rows().len() == 4 && sync.status() == FetchStatus::Idle).await);

    assert!(!sync.notify_viewport(1));
    assert!(sync.notify_viewport(3));
    assert!(wait_for(|| sync.rows().len() == 6).await);
    Ok(())
}

#[tokio::test]
async fn test_changes_fire_on_every_mutation() -> anyhow::Result<()> {
    let backend = name_backend();
    backend.seed(COLLECTION, TestRow::many(1..=2));
    let sync = open_backend(&backend, config(5)).await?;

    let mut changes = sync.changes();
    changes.borrow_and_update();
    let before = sync.snapshot().revision;

    backend.insert(COLLECTION, TestRow::new(3));
    tokio::time::timeout(Duration::from_secs(2), changes.changed()).await??;
    assert!(sync.snapshot().revision > before);
    assert_eq!(ids(&sync.rows()), vec![3, 2, 1]);
    Ok(())
}

#[tokio::test]
async fn test_live_and_paged_views_converge() -> anyhow::Result<()> {
    let backend = name_backend();
    backend.seed(COLLECTION, TestRow::many(1..=4));

    let early = open_backend(&backend, config(10)).await?;
    backend.insert(COLLECTION, TestRow::new(5));
    assert!(backend.update(COLLECTION, TestRow::named(2, "edited")));
    backend.delete(COLLECTION, &1).context("row 1 seeded")?;

    let late = open_backend(&backend, config(10)).await?;
    assert!(wait_for(|| early.rows().len() == 4 && early.rows().get(3) == Some(&TestRow::named(2, "edited"))).await);

    assert_eq!(early.fingerprint()?, late.fingerprint()?);
    assert_eq!(ids(&early.rows()), ids(&late.rows()));
    Ok(())
}

#[tokio::test]
async fn test_refused_subscription_still_pages() -> anyhow::Result<()> {
    let backend = name_backend();
    backend.seed(COLLECTION, TestRow::many(1..=3));
    backend.refuse_subscriptions(Some("quota exceeded".into()));

    let sync = open_backend(&backend, config(2)).await?;
    assert!(sync.snapshot().is_stale());
    assert_eq!(ids(&sync.rows()), vec![3, 2]);

    backend.refuse_subscriptions(None);
    assert!(sync.retry().await?.is_loaded());
    assert_eq!(sync.live_status(), LiveStatus::Live);
    Ok(())
}
