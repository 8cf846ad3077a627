//! Easing curve and tween duration policy.

use std::time::Duration;

use crate::coord::ScreenPoint;

/// Default tween pace: milliseconds of animation per pixel travelled.
pub const DEFAULT_MS_PER_PIXEL: f64 = 7.0;

/// Default lower bound for a non-zero tween.
pub const DEFAULT_MIN_DURATION: Duration = Duration::from_millis(350);

/// Absolute upper bound for any tween, regardless of poll interval.
pub const DEFAULT_MAX_DURATION_CAP: Duration = Duration::from_millis(2500);

/// Fraction of the poll interval a tween may occupy.
pub const DEFAULT_POLL_FRACTION: f64 = 0.85;

/// Pixel distances at or below this are treated as "no movement".
const ZERO_DISTANCE_PX: f64 = 1e-6;

/// Ease-in-out cubic over `t` in `[0, 1]` (input is clamped).
#[inline]
pub fn ease_in_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// Maps a projected pixel distance to a tween duration.
///
/// Scaling by pixel distance keeps perceived speed roughly constant across
/// zoom levels; the upper bound keeps a tween from outliving the next poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationPolicy {
    ms_per_pixel: f64,
    min: Duration,
    max: Duration,
}

impl Default for DurationPolicy {
    fn default() -> Self {
        Self::for_poll_interval(crate::config::DEFAULT_POLL_INTERVAL)
    }
}

impl DurationPolicy {
    /// Create a policy with explicit bounds.
    ///
    /// If `min` exceeds `max`, `max` wins: a tween never runs longer than
    /// its upper bound.
    pub fn new(ms_per_pixel: f64, min: Duration, max: Duration) -> Self {
        Self {
            ms_per_pixel: ms_per_pixel.max(0.0),
            min: min.min(max),
            max,
        }
    }

    /// Default pace and minimum, with the maximum derived from the poll
    /// interval (85% of it, capped at 2.5 s).
    pub fn for_poll_interval(poll_interval: Duration) -> Self {
        Self::new(
            DEFAULT_MS_PER_PIXEL,
            DEFAULT_MIN_DURATION,
            max_for_poll_interval(poll_interval, DEFAULT_POLL_FRACTION),
        )
    }

    /// Lower bound for non-zero moves.
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound for any move.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Duration for a move between two projected points.
    ///
    /// Zero for a zero-distance move, otherwise `distance × pace` clamped to
    /// `[min, max]`.
    pub fn duration_for(&self, from: &ScreenPoint, to: &ScreenPoint) -> Duration {
        let distance = from.distance_to(to);
        if !distance.is_finite() {
            return self.max;
        }
        if distance <= ZERO_DISTANCE_PX {
            return Duration::ZERO;
        }

        let micros = (distance * self.ms_per_pixel * 1000.0).round();
        let raw = Duration::from_micros(micros.min(u64::MAX as f64) as u64);
        raw.clamp(self.min, self.max)
    }
}

/// Maximum tween duration for a poll interval: `fraction` of it, never more
/// than [`DEFAULT_MAX_DURATION_CAP`].
pub fn max_for_poll_interval(poll_interval: Duration, fraction: f64) -> Duration {
    let millis = (poll_interval.as_millis() as f64 * fraction.clamp(0.0, 1.0)).round();
    Duration::from_millis(millis as u64).min(DEFAULT_MAX_DURATION_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(x: f64, y: f64) -> ScreenPoint {
        ScreenPoint { x, y }
    }

    #[test]
    fn test_easing_endpoints_and_midpoint() {
        assert_eq!(ease_in_out_cubic(0.0), 0.0);
        assert_eq!(ease_in_out_cubic(1.0), 1.0);
        assert!((ease_in_out_cubic(0.5) - 0.5).abs() < 1e-12);
        assert!((ease_in_out_cubic(0.25) - 0.0625).abs() < 1e-12);
        assert!((ease_in_out_cubic(0.75) - 0.9375).abs() < 1e-12);
    }

    #[test]
    fn test_easing_clamps_input() {
        assert_eq!(ease_in_out_cubic(-3.0), 0.0);
        assert_eq!(ease_in_out_cubic(7.0), 1.0);
    }

    #[test]
    fn test_default_max_is_85_percent_of_poll() {
        let policy = DurationPolicy::for_poll_interval(Duration::from_millis(2000));
        assert_eq!(policy.max(), Duration::from_millis(1700));
    }

    #[test]
    fn test_max_capped_for_long_polls() {
        let policy = DurationPolicy::for_poll_interval(Duration::from_millis(3000));
        assert_eq!(policy.max(), DEFAULT_MAX_DURATION_CAP);

        let policy = DurationPolicy::for_poll_interval(Duration::from_secs(60));
        assert_eq!(policy.max(), DEFAULT_MAX_DURATION_CAP);
    }

    #[test]
    fn test_zero_distance_is_instant() {
        let policy = DurationPolicy::default();
        assert_eq!(
            policy.duration_for(&pt(10.0, 10.0), &pt(10.0, 10.0)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_short_move_uses_minimum() {
        let policy = DurationPolicy::default();
        // 2 px * 7 ms = 14 ms, below the 350 ms floor
        assert_eq!(
            policy.duration_for(&pt(0.0, 0.0), &pt(2.0, 0.0)),
            DEFAULT_MIN_DURATION
        );
    }

    #[test]
    fn test_mid_range_move_scales_with_distance() {
        let policy = DurationPolicy::default();
        // 3-4-5 triangle scaled to 100 px: 700 ms
        let d = policy.duration_for(&pt(0.0, 0.0), &pt(60.0, 80.0));
        assert_eq!(d.as_millis(), 700);
    }

    #[test]
    fn test_huge_move_clamped_to_max() {
        let poll = Duration::from_millis(3000);
        let policy = DurationPolicy::for_poll_interval(poll);
        let d = policy.duration_for(&pt(0.0, 0.0), &pt(1e7, 1e7));
        assert_eq!(d, policy.max());
        assert!(d.as_millis() as f64 <= 3000.0 * DEFAULT_POLL_FRACTION);
    }

    #[test]
    fn test_min_never_exceeds_max() {
        // 200 ms poll -> 170 ms max, below the 350 ms default floor
        let policy = DurationPolicy::for_poll_interval(Duration::from_millis(200));
        assert_eq!(policy.max(), Duration::from_millis(170));
        assert_eq!(policy.min(), policy.max());
        let d = policy.duration_for(&pt(0.0, 0.0), &pt(1.0, 0.0));
        assert_eq!(d, Duration::from_millis(170));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_easing_monotonic(a in 0.0..1.0_f64, b in 0.0..1.0_f64) {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                prop_assert!(ease_in_out_cubic(lo) <= ease_in_out_cubic(hi) + 1e-12);
            }

            #[test]
            fn test_duration_within_bounds(
                dx in -1e6..1e6_f64,
                dy in -1e6..1e6_f64,
                poll_ms in 500u64..10_000
            ) {
                let poll = Duration::from_millis(poll_ms);
                let policy = DurationPolicy::for_poll_interval(poll);
                let d = policy.duration_for(&pt(0.0, 0.0), &pt(dx, dy));
                prop_assert!(d <= policy.max());
                prop_assert!(d.as_millis() as f64 <= poll_ms as f64 * DEFAULT_POLL_FRACTION + 1.0);
                if d > Duration::ZERO {
                    prop_assert!(d >= policy.min());
                }
            }
        }
    }
}
