//! Poll and frame loops.
//!
//! # Poll loop
//!
//! ```text
//! visible ──► poll ──► sleep(poll_interval) ──► poll ──► ...
//!    ▲                      │
//!    │                 hidden│
//!    └──── became visible ◄──┘   (polls immediately, no waiting out the interval)
//! ```
//!
//! A failed poll is logged and leaves the map untouched; the next tick retries
//! without backoff.
//!
//! # Frame loop
//!
//! Sleeps on the frame scheduler's waker while nothing moves, then ticks the
//! map at the frame interval until every tween has finished.
//!
//! The map mutex is held only for one reconcile or one frame tick, never
//! across an await.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::feed::{FeedError, SnapshotSource};
use crate::map::TransitMap;
use crate::reconciler::ReconcileReport;

/// Map shared between the poll and frame loops.
pub type SharedMap = Arc<Mutex<TransitMap>>;

/// Wall-clock instant from tokio's clock, so paused test time drives tweens.
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

/// Periodically fetches snapshots into the map.
pub struct Poller {
    source: Arc<dyn SnapshotSource>,
    map: SharedMap,
    interval: Duration,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("source", &self.source.describe())
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Poller {
    /// Poller using the map's configured poll interval.
    pub fn new(source: Arc<dyn SnapshotSource>, map: SharedMap) -> Self {
        let interval = map.lock().poll_interval();
        Self {
            source,
            map,
            interval,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Fetch once and apply the result. The map is not touched on error.
    pub async fn poll_once(&self) -> Result<ReconcileReport, FeedError> {
        let snapshots = self.source.fetch().await?;
        let report = self.map.lock().apply_snapshots(snapshots, now());
        Ok(report)
    }

    /// Run until `shutdown` is cancelled, polling only while `visible` is true.
    pub async fn run(self, mut visible: watch::Receiver<bool>, shutdown: CancellationToken) {
        info!(
            source = %self.source.describe(),
            interval_ms = self.interval.as_millis() as u64,
            "Poll loop started"
        );
        let mut visibility_open = true;

        loop {
            while visibility_open && !*visible.borrow_and_update() {
                debug!("Surface hidden, polling suspended");
                tokio::select! {
                    _ = shutdown.cancelled() => return self.stopped(),
                    changed = visible.changed() => visibility_open = changed.is_ok(),
                }
            }

            match self.poll_once().await {
                Ok(report) => debug!(
                    created = report.created.len(),
                    updated = report.updated.len(),
                    retired = report.retired.len(),
                    "Poll applied"
                ),
                Err(e) => warn!(error = %e, source = %self.source.describe(), "Poll failed"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => return self.stopped(),
                _ = sleep(self.interval) => {}
                changed = visible.changed(), if visibility_open => visibility_open = changed.is_ok(),
            }
        }
    }

    fn stopped(&self) {
        info!("Poll loop stopped");
    }
}

/// Drives animation frames while any tween is in flight.
#[derive(Debug)]
pub struct FrameLoop {
    map: SharedMap,
}

impl FrameLoop {
    pub fn new(map: SharedMap) -> Self {
        Self { map }
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let (waker, frame_interval) = {
            let map = self.map.lock();
            (map.frame_waker(), map.frame_interval())
        };

        loop {
            let animating = self.map.lock().is_animating();
            if !animating {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = waker.notified() => {}
                }
            }

            let mut ticker = interval(frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => {}
                }

                let still_animating = {
                    let mut map = self.map.lock();
                    map.tick(now());
                    map.is_animating()
                };
                if !still_animating {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use crate::feed::{HttpFeed, MockHttpClient, TripTable};
    use crate::map::{RecordingSink, RenderEvent};
    use crate::store::MemoryStore;

    const ONE: &[u8] = br#"[{"id":"t1","lat":59.334,"lon":18.060,"line":"14"}]"#;
    const MOVED: &[u8] = br#"[{"id":"t1","lat":59.335,"lon":18.061,"line":"14"}]"#;

    fn shared_map() -> (SharedMap, RecordingSink) {
        let sink = RecordingSink::new();
        let map = TransitMap::new(
            &MapConfig::default(),
            Box::new(MemoryStore::new()),
            Box::new(sink.clone()),
        )
        .unwrap();
        (Arc::new(Mutex::new(map)), sink)
    }

    fn poller(client: Arc<MockHttpClient>, map: SharedMap) -> Poller {
        let feed = HttpFeed::new(client, "http://feed.test", Arc::new(TripTable::new()));
        Poller::new(Arc::new(feed), map)
    }

    #[tokio::test]
    async fn test_poll_once_applies_snapshots() {
        let (map, _sink) = shared_map();
        let client = Arc::new(MockHttpClient::with_body(ONE.to_vec()));

        let report = poller(client, Arc::clone(&map)).poll_once().await.unwrap();

        assert_eq!(report.created.len(), 1);
        assert!(map.lock().entity("t1").is_some());
    }

    #[tokio::test]
    async fn test_failed_poll_leaves_state_untouched() {
        let (map, _sink) = shared_map();
        let client = Arc::new(MockHttpClient::new(vec![
            Ok(ONE.to_vec()),
            Err(FeedError::Status {
                status: 500,
                url: "http://feed.test".to_string(),
            }),
            Ok(b"not json".to_vec()),
        ]));
        let poller = poller(client, Arc::clone(&map));

        poller.poll_once().await.unwrap();
        assert!(poller.poll_once().await.is_err());
        assert!(matches!(poller.poll_once().await, Err(FeedError::Decode(_))));

        assert_eq!(map.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_respects_visibility() {
        let (map, _sink) = shared_map();
        let client = Arc::new(MockHttpClient::with_body(ONE.to_vec()));
        let poller = poller(Arc::clone(&client), map).with_interval(Duration::from_secs(3));

        let (visible_tx, visible_rx) = watch::channel(true);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(poller.run(visible_rx, shutdown.clone()));

        sleep(Duration::from_millis(100)).await;
        assert_eq!(client.calls(), 1, "polls immediately");

        sleep(Duration::from_secs(3)).await;
        assert_eq!(client.calls(), 2);

        visible_tx.send(false).unwrap();
        sleep(Duration::from_secs(10)).await;
        assert_eq!(client.calls(), 2, "no polling while hidden");

        visible_tx.send(true).unwrap();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(client.calls(), 3, "polls as soon as visible again");

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_keeps_polling_after_errors() {
        let (map, _sink) = shared_map();
        let client = Arc::new(MockHttpClient::with_error(FeedError::Http("down".to_string())));
        let poller = poller(Arc::clone(&client), map).with_interval(Duration::from_secs(3));

        let (_visible_tx, visible_rx) = watch::channel(true);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(poller.run(visible_rx, shutdown.clone()));

        sleep(Duration::from_millis(9100)).await;
        assert_eq!(client.calls(), 4);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_loop_animates_to_target() {
        let (map, sink) = shared_map();
        let client = Arc::new(MockHttpClient::new(vec![Ok(ONE.to_vec()), Ok(MOVED.to_vec())]));
        let poller = poller(client, Arc::clone(&map));

        let shutdown = CancellationToken::new();
        let frames = tokio::spawn(FrameLoop::new(Arc::clone(&map)).run(shutdown.clone()));

        poller.poll_once().await.unwrap();
        poller.poll_once().await.unwrap();
        assert!(map.lock().is_animating());
        sink.take();

        sleep(Duration::from_secs(3)).await;

        assert!(!map.lock().is_animating());
        let moves = sink
            .take()
            .into_iter()
            .filter(|e| matches!(e, RenderEvent::Moved(..)))
            .count();
        assert!(moves > 1, "expected several frames, got {}", moves);
        assert_eq!(
            map.lock().entity("t1").unwrap().rendered(),
            crate::coord::GeoPoint::new(59.335, 18.061)
        );

        shutdown.cancel();
        frames.await.unwrap();
    }
}
