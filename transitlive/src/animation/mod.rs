//! Two-point motion tweens for rendered vehicle positions.
//!
//! Each tracked entity owns at most one [`Tween`]. Starting a new tween for an
//! entity first cancels the one in its slot, so two tweens can never drive the
//! same position. Frames are pulled by the host through [`MotionAnimator::step`],
//! which reports every intermediate position and the final one.
//!
//! # Example
//!
//! ```ignore
//! let mut animator = MotionAnimator::new(DurationPolicy::default());
//! let mut slot = None;
//!
//! let duration = animator.duration_for(&projection, &from, &to);
//! animator.animate(&mut slot, from, to, duration, Instant::now());
//!
//! // once per frame
//! animator.step(&mut slot, Instant::now(), |pos| marker.set_position(pos));
//! ```

mod scheduler;
mod timing;

pub use scheduler::{FrameHandle, FrameScheduler, TokenFrameScheduler};
pub use timing::{
    ease_in_out_cubic, max_for_poll_interval, DurationPolicy, DEFAULT_MAX_DURATION_CAP,
    DEFAULT_MIN_DURATION, DEFAULT_MS_PER_PIXEL, DEFAULT_POLL_FRACTION,
};

use std::time::{Duration, Instant};

use crate::coord::{GeoPoint, Projection};

/// Default tolerance (degrees) below which a move commits without frames.
pub const DEFAULT_COMMIT_EPSILON_DEG: f64 = 1e-8;

/// An in-flight tween between two points.
#[derive(Debug)]
pub struct Tween {
    from: GeoPoint,
    to: GeoPoint,
    started: Instant,
    duration: Duration,
    handle: FrameHandle,
}

impl Tween {
    /// Start point.
    pub fn from(&self) -> GeoPoint {
        self.from
    }

    /// End point.
    pub fn to(&self) -> GeoPoint {
        self.to
    }

    /// Total duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Frame handle driving this tween.
    pub fn handle(&self) -> &FrameHandle {
        &self.handle
    }

    /// Normalized time fraction at `now`, clamped to `[0, 1]`.
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Eased position at `now`.
    pub fn position_at(&self, now: Instant) -> GeoPoint {
        let t = self.progress(now);
        if t >= 1.0 {
            return self.to;
        }
        self.from.lerp(&self.to, ease_in_out_cubic(t))
    }
}

/// How an `animate` call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationStart {
    /// The move was too small (or instant); the target is final immediately.
    Committed,
    /// A tween of this duration is now in the slot.
    Started(Duration),
}

/// A single frame produced by [`MotionAnimator::step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// Interpolated position.
    pub position: GeoPoint,
    /// True on the final frame; the tween has been released.
    pub finished: bool,
}

/// Starts, advances, and cancels tweens.
pub struct MotionAnimator {
    scheduler: Box<dyn FrameScheduler>,
    policy: DurationPolicy,
    commit_epsilon_deg: f64,
}

impl std::fmt::Debug for MotionAnimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionAnimator")
            .field("policy", &self.policy)
            .field("commit_epsilon_deg", &self.commit_epsilon_deg)
            .field("active", &self.scheduler.active())
            .finish()
    }
}

impl MotionAnimator {
    /// Create an animator with a [`TokenFrameScheduler`].
    pub fn new(policy: DurationPolicy) -> Self {
        Self::with_scheduler(policy, Box::new(TokenFrameScheduler::new()))
    }

    /// Create an animator with a custom frame scheduler.
    pub fn with_scheduler(policy: DurationPolicy, scheduler: Box<dyn FrameScheduler>) -> Self {
        Self {
            scheduler,
            policy,
            commit_epsilon_deg: DEFAULT_COMMIT_EPSILON_DEG,
        }
    }

    /// Override the commit tolerance.
    pub fn with_commit_epsilon(mut self, epsilon_deg: f64) -> Self {
        self.commit_epsilon_deg = epsilon_deg;
        self
    }

    /// Duration policy in use.
    pub fn policy(&self) -> &DurationPolicy {
        &self.policy
    }

    /// Duration for a move, measured in projected pixels.
    pub fn duration_for(&self, projection: &dyn Projection, from: &GeoPoint, to: &GeoPoint) -> Duration {
        self.policy
            .duration_for(&projection.project(from), &projection.project(to))
    }

    /// Start a tween in `slot`, cancelling whatever tween it held.
    ///
    /// Commits immediately (leaving `slot` empty) if `from` and `to` are equal
    /// within the commit tolerance or `duration` is zero.
    pub fn animate(
        &mut self,
        slot: &mut Option<Tween>,
        from: GeoPoint,
        to: GeoPoint,
        duration: Duration,
        now: Instant,
    ) -> AnimationStart {
        self.cancel(slot);

        if from.approx_eq(&to, self.commit_epsilon_deg) || duration.is_zero() {
            return AnimationStart::Committed;
        }

        let handle = self.scheduler.request();
        *slot = Some(Tween {
            from,
            to,
            started: now,
            duration,
            handle,
        });
        AnimationStart::Started(duration)
    }

    /// Cancel and release the tween in `slot`, if any.
    pub fn cancel(&mut self, slot: &mut Option<Tween>) {
        if let Some(tween) = slot.take() {
            self.scheduler.cancel(&tween.handle);
        }
    }

    /// Advance the tween in `slot` to `now`.
    ///
    /// Calls `on_frame` with the interpolated position and returns the frame.
    /// On the final frame the tween is released and `slot` emptied. Returns
    /// `None` if the slot is empty or its handle was cancelled elsewhere.
    pub fn step<F>(&mut self, slot: &mut Option<Tween>, now: Instant, mut on_frame: F) -> Option<Frame>
    where
        F: FnMut(GeoPoint),
    {
        let tween = slot.as_ref()?;
        if tween.handle.is_cancelled() {
            *slot = None;
            return None;
        }

        let position = tween.position_at(now);
        let finished = tween.progress(now) >= 1.0;
        on_frame(position);

        if finished {
            self.cancel(slot);
        }

        Some(Frame { position, finished })
    }

    /// True while any tween is in flight.
    pub fn is_animating(&self) -> bool {
        self.scheduler.active() > 0
    }

    /// Number of tweens in flight.
    pub fn active(&self) -> usize {
        self.scheduler.active()
    }
}
