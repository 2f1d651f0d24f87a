//! Look-ahead warming: target choice, cancellation and cache substitution

mod helpers;

use helpers::*;
use std::path::PathBuf;
use std::time::Duration;
use tessera_player::controller::{ControllerOptions, Phase};
use tessera_player::media::{CachedMedia, PersistenceStore};
use tessera_player::prefetch::{PreFetcher, PrefetchOutcome};
use tessera_player::queue::QueueItem;
use tessera_player::sim::{MemoryCache, SimBehavior, SimResolver};
use tokio::sync::mpsc;

fn prefetch_options() -> ControllerOptions {
    let mut options = fast_options();
    options.playback.prefetch_lookahead = 3;
    options
}

fn remote(name: &str) -> QueueItem {
    QueueItem::remote(media(name))
}

#[tokio::test]
async fn test_next_page_is_resolved_and_downloaded_ahead() {
    let harness = Harness::new(SimBehavior::auto(Duration::from_millis(1)));
    let (controller, engine) = harness.spawn("left", prefetch_options());

    controller.set_queue(vec![remote("a"), QueueItem::remote(page("next"))]);
    wait_status(&controller, |s| s.phase == Phase::Playing && s.index == Some(0)).await;

    wait_for("prefetch download", || harness.cache.downloads_completed() == 1).await;
    // Give the outcome time to reach the controller
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.resolver.calls(), 1);

    let direct = SimResolver::direct_for(&page("next"));
    let headers = harness.cache.last_headers().unwrap();
    assert_eq!(headers.get("Referer"), Some(&page("next")));

    controller.play_next(false);
    let status = wait_status(&controller, |s| s.phase == Phase::Playing && s.index == Some(1)).await;
    assert_eq!(status.locator, Some(page("next")));

    let cached = harness.cache.path_for(&direct).to_string_lossy().to_string();
    assert_eq!(engine.last_open(), Some(cached));
    // The warmed result was reused
    assert_eq!(harness.resolver.calls(), 1);
}

#[tokio::test]
async fn test_forced_skip_cancels_running_download() {
    let harness = Harness::new(SimBehavior::auto(Duration::from_millis(1)))
        .with_cache(MemoryCache::new("/cache", Duration::from_secs(10)));
    let (controller, engine) = harness.spawn("left", prefetch_options());

    controller.set_queue(vec![remote("a"), remote("b"), remote("c")]);
    wait_status(&controller, |s| s.phase == Phase::Playing && s.index == Some(0)).await;
    wait_for("download start", || harness.cache.downloads_started() == 1).await;

    controller.play_next(true);
    wait_for("download cancelled", || harness.cache.downloads_cancelled() == 1).await;

    // Nothing was cached, so the item opens from its own locator
    wait_status(&controller, |s| s.phase == Phase::Playing && s.index == Some(1)).await;
    assert_eq!(engine.opens(), vec![media("a"), media("b")]);
    assert_eq!(harness.cache.downloads_completed(), 0);
}

#[tokio::test]
async fn test_choose_target_prefers_high_quality_within_lookahead() {
    let harness = Harness::new(SimBehavior::manual());
    let services = harness.services();
    let (tx, _rx) = mpsc::unbounded_channel();
    let prefetcher = PreFetcher::new("left", &services, 3, tx);

    let queue = vec![remote("a"), remote("b"), remote("c"), remote("d"), remote("e")];
    assert_eq!(prefetcher.choose_target(&queue, 0, |_| true), Some(1));

    harness.resolver.mark_high_quality(media("d"));
    assert_eq!(prefetcher.choose_target(&queue, 0, |_| true), Some(3));

    // Beyond the look-ahead window
    harness.resolver.mark_high_quality(media("e"));
    assert_eq!(prefetcher.choose_target(&queue, 0, |_| true), Some(3));

    // Wraps around and never picks the current index
    assert_eq!(prefetcher.choose_target(&queue, 4, |_| true), Some(0));
}

#[tokio::test]
async fn test_choose_target_skips_local_and_ineligible_items() {
    let harness = Harness::new(SimBehavior::manual());
    let services = harness.services();
    let (tx, _rx) = mpsc::unbounded_channel();
    let prefetcher = PreFetcher::new("left", &services, 3, tx);

    let queue = vec![
        remote("a"),
        QueueItem::local("/media/local.mp4"),
        remote("b"),
        remote("c"),
    ];
    assert_eq!(prefetcher.choose_target(&queue, 0, |_| true), Some(2));
    assert_eq!(
        prefetcher.choose_target(&queue, 0, |item| item.locator != media("b")),
        Some(3)
    );
    assert_eq!(prefetcher.choose_target(&queue[..1], 0, |_| true), None);
}

#[tokio::test]
async fn test_cached_target_completes_immediately() {
    let harness = Harness::new(SimBehavior::manual());
    let path = PathBuf::from("/cache/b.mp4");
    harness.cache.insert(
        media("b"),
        CachedMedia {
            path: path.clone(),
            partial: false,
        },
    );
    let services = harness.services();
    let (tx, mut rx) = mpsc::unbounded_channel::<PrefetchOutcome>();
    let mut prefetcher = PreFetcher::new("left", &services, 3, tx);

    let queue = vec![remote("a"), remote("b")];
    let id = prefetcher.schedule(&queue, 0, |_| true).unwrap();

    let outcome = rx.try_recv().unwrap();
    assert_eq!(outcome.ticket_id, id);
    assert_eq!(outcome.index, 1);
    assert_eq!(outcome.cache_path, path);
    assert!(outcome.resolved_locator.is_none());

    let ticket = prefetcher.ticket().unwrap();
    assert!(ticket.is_complete());
    assert_eq!(ticket.target_locator, media("b"));
    assert_eq!(harness.cache.downloads_started(), 0);
}

#[tokio::test]
async fn test_rescheduling_cancels_previous_ticket() {
    let harness = Harness::new(SimBehavior::manual())
        .with_cache(MemoryCache::new("/cache", Duration::from_secs(10)));
    let services = harness.services();
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut prefetcher = PreFetcher::new("left", &services, 1, tx);

    let queue = vec![remote("a"), remote("b"), remote("c")];
    let first = prefetcher.schedule(&queue, 0, |_| true).unwrap();
    wait_for("first download", || harness.cache.downloads_started() == 1).await;

    let second = prefetcher.schedule(&queue, 1, |_| true).unwrap();
    assert_ne!(first, second);
    assert_eq!(prefetcher.ticket().unwrap().target_index, 2);
    wait_for("first cancelled", || harness.cache.downloads_cancelled() == 1).await;

    // Superseded outcomes are rejected
    let stale = PrefetchOutcome {
        ticket_id: first,
        index: 1,
        source_locator: media("b"),
        resolved_locator: None,
        cache_path: PathBuf::from("/cache/b.mp4"),
    };
    assert!(!prefetcher.complete(&stale));

    prefetcher.cancel();
    assert!(prefetcher.ticket().is_none());
    wait_for("second cancelled", || harness.cache.downloads_cancelled() == 2).await;
}

#[tokio::test]
async fn test_partial_cache_entry_skipped_for_far_resume_position() {
    let harness = Harness::new(SimBehavior::auto(Duration::from_millis(1)));
    harness.cache.insert(
        media("a"),
        CachedMedia {
            path: PathBuf::from("/cache/partial-a.mp4"),
            partial: true,
        },
    );
    harness.store.set_position(&media("a"), 6000).await.unwrap();

    let mut options = fast_options();
    options.playback.remember_position = true;
    let (controller, engine) = harness.spawn("left", options);

    controller.set_queue(vec![remote("a")]);
    let status = wait_status(&controller, |s| s.phase == Phase::Playing).await;
    assert_eq!(engine.opens(), vec![media("a")]);
    assert_eq!(status.position_ms, 6000);
}

#[tokio::test]
async fn test_partial_cache_entry_used_for_near_resume_position() {
    let harness = Harness::new(SimBehavior::auto(Duration::from_millis(1)));
    harness.cache.insert(
        media("a"),
        CachedMedia {
            path: PathBuf::from("/cache/partial-a.mp4"),
            partial: true,
        },
    );
    harness.store.set_position(&media("a"), 1000).await.unwrap();

    let mut options = fast_options();
    options.playback.remember_position = true;
    let (controller, engine) = harness.spawn("left", options);

    controller.set_queue(vec![remote("a")]);
    wait_status(&controller, |s| s.phase == Phase::Playing).await;
    assert_eq!(engine.opens(), vec!["/cache/partial-a.mp4".to_string()]);
}
