//! Heading estimation for vehicles whose feed bearing is missing or unreliable.
//!
//! # Priority
//!
//! 1. A reported bearing that is finite and strictly positive.
//! 2. The forward azimuth from the previous snapshot, if the vehicle moved
//!    more than the movement threshold.
//! 3. The cached bearing, if one was established earlier.
//! 4. Unknown.
//!
//! A reported bearing of exactly `0` is indistinguishable from "not reported"
//! for the feeds this crate targets, so it is treated as absent rather than
//! as due north.

use crate::coord::GeoPoint;

/// Default movement threshold in degrees (~2 m of latitude).
pub const DEFAULT_MOVEMENT_THRESHOLD_DEG: f64 = 2e-5;

/// Result of a heading estimate, also the cached per-entity heading state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Heading {
    /// Bearing in degrees clockwise from north, in `[0, 360)`.
    pub bearing: Option<f64>,
    /// Once true, a later snapshot without bearing reuses `bearing`.
    pub established: bool,
}

impl Heading {
    /// Heading with an established bearing.
    pub fn known(bearing: f64) -> Self {
        Self {
            bearing: Some(normalize_bearing(bearing)),
            established: true,
        }
    }

    /// Heading that has never been established.
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// Estimates headings from consecutive snapshots.
#[derive(Debug, Clone, Copy)]
pub struct HeadingEstimator {
    movement_threshold_deg: f64,
}

impl Default for HeadingEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_MOVEMENT_THRESHOLD_DEG)
    }
}

impl HeadingEstimator {
    /// Create an estimator with a custom movement threshold (degrees).
    pub fn new(movement_threshold_deg: f64) -> Self {
        Self {
            movement_threshold_deg,
        }
    }

    /// Estimate the heading for one entity.
    ///
    /// `reported` is the raw feed bearing, `previous` the position of the
    /// entity's previous snapshot, and `cached` its current heading state.
    pub fn estimate(
        &self,
        current: &GeoPoint,
        reported: Option<f64>,
        previous: Option<&GeoPoint>,
        cached: Heading,
    ) -> Heading {
        if let Some(bearing) = reported.filter(|b| b.is_finite() && *b > 0.0) {
            return Heading::known(bearing);
        }

        if let Some(prev) = previous {
            if self.has_moved(prev, current) {
                return Heading::known(forward_azimuth(prev, current));
            }
        }

        if cached.established {
            return cached;
        }

        Heading::unknown()
    }

    fn has_moved(&self, from: &GeoPoint, to: &GeoPoint) -> bool {
        (to.lat - from.lat).abs() > self.movement_threshold_deg
            || (to.lon - from.lon).abs() > self.movement_threshold_deg
    }
}

/// Initial great-circle bearing from `from` to `to` (spherical earth).
///
/// Returns degrees in `[0, 360)`, where 0 = north and 90 = east.
pub fn forward_azimuth(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let dlambda = (to.lon - from.lon).to_radians();

    let y = dlambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();

    normalize_bearing(y.atan2(x).to_degrees())
}

/// Wrap any finite angle into `[0, 360)`.
#[inline]
pub fn normalize_bearing(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}
