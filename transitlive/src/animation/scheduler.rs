//! Frame pacing abstraction.
//!
//! A tween needs "call me every frame until I'm done or cancelled". The host
//! decides what a frame is (a display refresh, a tokio interval, a test loop);
//! the scheduler only hands out cancellation handles and tells the host when
//! frames are needed at all.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Cancellation handle for one scheduled tween.
///
/// Cloning shares the underlying token; cancelling through the scheduler is
/// visible to every clone.
#[derive(Debug, Clone)]
pub struct FrameHandle {
    id: u64,
    token: CancellationToken,
}

impl FrameHandle {
    /// Scheduler-unique id of this handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once the scheduler has cancelled this handle.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token that resolves when this handle is cancelled.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Schedules repeated frame ticks until explicitly cancelled.
pub trait FrameScheduler: Send {
    /// Begin delivering frames for a new tween.
    fn request(&mut self) -> FrameHandle;

    /// Stop delivering frames for `handle`. Cancelling twice is a no-op.
    fn cancel(&mut self, handle: &FrameHandle);

    /// Number of live (requested, not yet cancelled) handles.
    fn active(&self) -> usize;
}

/// [`FrameScheduler`] backed by cancellation tokens.
///
/// Wakes the host frame loop through a [`Notify`] whenever the first handle
/// becomes live, so the loop can sleep while nothing is moving.
#[derive(Debug)]
pub struct TokenFrameScheduler {
    next_id: u64,
    live: HashSet<u64>,
    root: CancellationToken,
    wake: Arc<Notify>,
}

impl Default for TokenFrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenFrameScheduler {
    /// Create a scheduler with no live handles.
    pub fn new() -> Self {
        Self {
            next_id: 0,
            live: HashSet::new(),
            root: CancellationToken::new(),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Notifier the host frame loop waits on while idle.
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }
}

impl FrameScheduler for TokenFrameScheduler {
    fn request(&mut self) -> FrameHandle {
        let id = self.next_id;
        self.next_id += 1;

        let was_idle = self.live.is_empty();
        self.live.insert(id);
        if was_idle {
            self.wake.notify_one();
        }

        FrameHandle {
            id,
            token: self.root.child_token(),
        }
    }

    fn cancel(&mut self, handle: &FrameHandle) {
        if self.live.remove(&handle.id) {
            handle.token.cancel();
        }
    }

    fn active(&self) -> usize {
        self.live.len()
    }
}

impl Drop for TokenFrameScheduler {
    fn drop(&mut self) {
        // Outstanding handles must not outlive their scheduler
        self.root.cancel();
    }
}
