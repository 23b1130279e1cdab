//! End-to-end scenarios against the public [`Cache`] surface (page_size=4,
//! page_count=2, downstream echoes offset-encoded bytes).

use bytes::Bytes;
use read_ahead::test_support::EchoDownstream;
use read_ahead::{Cache, Config};
use std::sync::Arc;
use std::time::Duration;

fn config() -> Config {
    Config {
        page_size: 4,
        page_count: 2,
    }
}

fn expected(offset: u64, len: usize) -> Bytes {
    Bytes::from(
        (0..len)
            .map(|i| ((offset + i as u64) % 251) as u8)
            .collect::<Vec<u8>>(),
    )
}

/// Scenario 1: open; read(0,4) on a cold cache demand-fetches (0,4) and
/// speculatively prefetches the rest of the window.
#[tokio::test]
async fn scenario_1_cold_read_demand_fetches_and_prefetches() {
    let downstream = EchoDownstream::new();
    let cache = Cache::new(downstream, config());
    let handle = cache.open("f", 0, 0).await.unwrap();

    let data = cache.readv(&handle, 4, 0).await.unwrap();
    assert_eq!(data, expected(0, 4));

    tokio::time::sleep(Duration::from_millis(20)).await;
    let offsets: Vec<u64> = cache.downstream().calls().into_iter().map(|(o, _)| o).collect();
    assert!(offsets.contains(&0));
    assert!(offsets.contains(&4));
    assert!(offsets.contains(&8));
}

/// Scenario 2: a sequential second read is served from the page the first
/// read's prefetch already warmed, and the window keeps extending ahead.
#[tokio::test]
async fn scenario_2_sequential_reads_ride_the_prefetch_window() {
    let downstream = EchoDownstream::new();
    let cache = Cache::new(downstream, config());
    let handle = cache.open("f", 0, 0).await.unwrap();

    let first = cache.readv(&handle, 4, 0).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = cache.readv(&handle, 4, 4).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(first, expected(0, 4));
    assert_eq!(second, expected(4, 4));

    let offsets: Vec<u64> = cache.downstream().calls().into_iter().map(|(o, _)| o).collect();
    assert!(offsets.contains(&12), "prefetch should have extended to offset 12");
}

/// Scenario 3: a write invalidates the cached page, so a re-read after the
/// write observes post-write bytes rather than the stale cached copy.
#[tokio::test]
async fn scenario_3_write_invalidates_then_refetches() {
    let downstream = EchoDownstream::new();
    let cache = Cache::new(downstream, config());
    let handle = cache.open("f", 0, 0).await.unwrap();

    let before = cache.readv(&handle, 4, 0).await.unwrap();
    assert_eq!(before, expected(0, 4));

    cache
        .writev(&handle, &[Bytes::from_static(b"ZZZZ")], 0)
        .await
        .unwrap();

    let calls_before_reread = cache.downstream().calls().into_iter().filter(|(o, _)| *o == 0).count();
    let after = cache.readv(&handle, 4, 0).await.unwrap();
    let calls_after_reread = cache.downstream().calls().into_iter().filter(|(o, _)| *o == 0).count();

    assert_eq!(after, expected(0, 4));
    assert!(
        calls_after_reread > calls_before_reread,
        "write must force a fresh downstream fetch rather than serving the stale page"
    );
}

/// Scenario 4: an unaligned single-byte read still rounds to page
/// boundaries for the fetch, but returns exactly the requested byte.
#[tokio::test]
async fn scenario_4_unaligned_read_returns_exact_bytes() {
    let downstream = EchoDownstream::new();
    let cache = Cache::new(downstream, config());
    let handle = cache.open("f", 0, 0).await.unwrap();

    let data = cache.readv(&handle, 1, 10).await.unwrap();
    assert_eq!(data, expected(10, 1));

    tokio::time::sleep(Duration::from_millis(20)).await;
    let offsets: Vec<u64> = cache.downstream().calls().into_iter().map(|(o, _)| o).collect();
    assert!(offsets.contains(&8));
    assert!(offsets.contains(&12));
    assert!(offsets.contains(&16));
}

/// Scenario 5: releasing a spare handle while a read's fetch is genuinely
/// still in flight must not crash — the fetch's own reference keeps the
/// file alive until it completes, and the read unwinds normally.
#[tokio::test]
async fn scenario_5_release_races_a_pending_fetch() {
    let downstream = EchoDownstream::new();
    downstream.delay_once_at(0, Duration::from_millis(50));
    let cache = Arc::new(Cache::new(downstream, config()));
    let handle = cache.open("f", 0, 0).await.unwrap();
    let extra = handle.clone();

    let read_cache = cache.clone();
    let read = tokio::spawn(async move { read_cache.readv(&handle, 4, 0).await });
    // Let the read actually dispatch its fetch before racing the release.
    tokio::task::yield_now().await;

    cache.release(extra).await.unwrap();

    let data = read.await.unwrap().unwrap();
    assert_eq!(data, expected(0, 4));
}

/// A page with no waiters (i.e. speculatively prefetched, not demanded by
/// any reader) can be evicted by a concurrent flush while its own fetch is
/// still in flight. When that fetch lands, it must find the page gone and
/// drop its result rather than resurrecting or crashing.
#[tokio::test]
async fn wasted_fetch_on_a_prefetched_page_evicted_while_in_flight() {
    let downstream = EchoDownstream::new();
    downstream.delay_once_at(4, Duration::from_millis(50));
    let cache = Cache::new(downstream, config());
    let handle = cache.open("f", 0, 0).await.unwrap();

    // read(0,4) demand-fetches page 0 and speculatively prefetches page 4,
    // whose downstream reply is delayed.
    cache.readv(&handle, 4, 0).await.unwrap();

    // The prefetch task runs detached from the read above; wait until it
    // has actually dispatched the downstream fetch for page 4 so the write
    // below provably races a fetch still in flight, not a page that was
    // never created.
    while !cache.downstream().calls().iter().any(|(o, _)| *o == 4) {
        tokio::task::yield_now().await;
    }

    // A write invalidates the whole cached range, including the still-
    // pending, waiter-less page 4 — evicting it before its fetch lands.
    cache
        .writev(&handle, &[Bytes::from_static(b"ZZZZ")], 0)
        .await
        .unwrap();

    // Give the delayed fetch for page 4 time to land on the now-evicted page.
    tokio::time::sleep(Duration::from_millis(80)).await;

    // The stale fetch was wasted: a fresh read at offset 4 must issue its
    // own downstream fetch rather than finding a resurrected cache entry.
    let calls_at_4_before = cache.downstream().calls().into_iter().filter(|(o, _)| *o == 4).count();
    cache.readv(&handle, 4, 4).await.unwrap();
    let calls_at_4_after = cache.downstream().calls().into_iter().filter(|(o, _)| *o == 4).count();
    assert!(calls_at_4_after > calls_at_4_before, "evicted page must be re-fetched");

    cache.release(handle).await.unwrap();
}

/// Scenario 6: two concurrent reads against the same cold page both unwind
/// with identical bytes, and only one downstream fetch is issued.
#[tokio::test]
async fn scenario_6_concurrent_cold_reads_share_one_fetch() {
    let downstream = EchoDownstream::new();
    downstream.delay_once_at(0, Duration::from_millis(40));
    let cache = Cache::new(downstream, config());
    let handle = cache.open("f", 0, 0).await.unwrap();

    let (a, b) = tokio::join!(cache.readv(&handle, 4, 0), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.readv(&handle, 4, 0).await
    });

    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a, expected(0, 4));
    assert_eq!(b, expected(0, 4));
    assert_eq!(a, b);

    let fetches_at_zero = cache.downstream().calls().into_iter().filter(|(o, _)| *o == 0).count();
    assert_eq!(fetches_at_zero, 1);
}

/// Property: across a page's lifetime, exactly one downstream `readv` is
/// issued for it, even when it is both demand-fetched and repeatedly
/// revisited by later reads while still pending or ready.
#[tokio::test]
async fn property_single_fetch_per_page_offset() {
    let downstream = EchoDownstream::new();
    let cache = Cache::new(downstream, config());
    let handle = cache.open("f", 0, 0).await.unwrap();

    for _ in 0..5 {
        cache.readv(&handle, 4, 0).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    let fetches_at_zero = cache.downstream().calls().into_iter().filter(|(o, _)| *o == 0).count();
    assert_eq!(fetches_at_zero, 1);
}

/// Property: steady state never retains pages strictly behind the current
/// reader offset (the window-cap / drop-behind guarantee).
#[tokio::test]
async fn property_drop_behind_caps_retained_pages() {
    let downstream = EchoDownstream::new();
    let cache = Cache::new(downstream, config());
    let handle = cache.open("f", 0, 0).await.unwrap();

    for offset in [0u64, 4, 8, 12, 16] {
        cache.readv(&handle, 4, offset).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Drive the handle back out through `release` isn't needed to observe
    // the invariant — inspect indirectly via another read at offset 16: a
    // read there must not have required re-fetching anything below it.
    let fetches_below_16 = cache
        .downstream()
        .calls()
        .into_iter()
        .filter(|(o, _)| *o < 16)
        .count();
    // each offset below 16 should have been fetched at most once despite
    // five sequential reads walking past it.
    assert!(fetches_below_16 <= 4, "offsets 0,4,8,12 each fetched at most once");

    cache.release(handle).await.unwrap();
}

/// Property: read correctness — for a sequence of non-overlapping reads,
/// the bytes returned through the cache equal what a direct (uncached)
/// downstream read would return.
#[tokio::test]
async fn property_read_correctness_matches_uncached_downstream() {
    let downstream = EchoDownstream::new();
    let cache = Cache::new(downstream, config());
    let handle = cache.open("f", 0, 0).await.unwrap();

    for (offset, len) in [(0u64, 4usize), (4, 4), (8, 2), (20, 4)] {
        let data = cache.readv(&handle, len, offset).await.unwrap();
        assert_eq!(data, expected(offset, len));
    }

    cache.release(handle).await.unwrap();
}
