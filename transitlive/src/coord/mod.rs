//! Geographic points and Web Mercator projection.
//!
//! Vehicle positions arrive as WGS84 latitude/longitude. Animation timing is
//! measured in screen pixels, so points are projected into Web Mercator
//! "world pixel" space at the current map zoom (256 px tiles, as used by
//! slippy-map tile servers).

use std::f64::consts::PI;
use std::fmt;

use thiserror::Error;

/// Minimum latitude representable in Web Mercator, `-atan(sinh(π))`.
pub const MIN_LAT: f64 = -85.051_128_779_806_6;

/// Maximum latitude representable in Web Mercator, `atan(sinh(π))`.
pub const MAX_LAT: f64 = 85.051_128_779_806_6;

/// Tile edge length in pixels.
pub const TILE_SIZE: f64 = 256.0;

/// Maximum zoom level accepted by [`WebMercator`].
pub const MAX_ZOOM: f64 = 22.0;

/// Errors from coordinate validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    #[error("Invalid latitude: {0}")]
    InvalidLatitude(f64),

    #[error("Invalid longitude: {0}")]
    InvalidLongitude(f64),

    #[error("Invalid zoom: {0}")]
    InvalidZoom(f64),
}

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Latitude in degrees (north positive).
    pub lat: f64,
    /// Longitude in degrees (east positive).
    pub lon: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Create a point after checking both components are finite and in range.
    pub fn checked(lat: f64, lon: f64) -> Result<Self, CoordError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(CoordError::InvalidLatitude(lat));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(CoordError::InvalidLongitude(lon));
        }
        Ok(Self { lat, lon })
    }

    /// True if both components differ by at most `epsilon` degrees.
    #[inline]
    pub fn approx_eq(&self, other: &GeoPoint, epsilon: f64) -> bool {
        (self.lat - other.lat).abs() <= epsilon && (self.lon - other.lon).abs() <= epsilon
    }

    /// Linear interpolation in lat/lon space. `fraction` 0 gives `self`,
    /// 1 gives `to`.
    #[inline]
    pub fn lerp(&self, to: &GeoPoint, fraction: f64) -> GeoPoint {
        GeoPoint {
            lat: self.lat + (to.lat - self.lat) * fraction,
            lon: self.lon + (to.lon - self.lon) * fraction,
        }
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// A position on the projected map surface, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    /// Euclidean distance to another screen point.
    #[inline]
    pub fn distance_to(&self, other: &ScreenPoint) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Projects geographic points onto the map surface.
///
/// The map surface is an external collaborator; hosts supply the projection
/// their surface uses. [`WebMercator`] covers standard tile maps.
pub trait Projection {
    /// Project a geographic point to surface pixels.
    fn project(&self, point: &GeoPoint) -> ScreenPoint;
}

/// Web Mercator projection at a fixed (possibly fractional) zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WebMercator {
    zoom: f64,
}

impl WebMercator {
    /// Create a projection at the given zoom level.
    pub fn new(zoom: f64) -> Result<Self, CoordError> {
        if !zoom.is_finite() || !(0.0..=MAX_ZOOM).contains(&zoom) {
            return Err(CoordError::InvalidZoom(zoom));
        }
        Ok(Self { zoom })
    }

    /// Current zoom level.
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// World size in pixels at this zoom.
    fn world_size(&self) -> f64 {
        TILE_SIZE * 2.0_f64.powf(self.zoom)
    }

    /// Inverse projection: surface pixels back to a geographic point.
    pub fn unproject(&self, point: &ScreenPoint) -> GeoPoint {
        let size = self.world_size();
        let lon = point.x / size * 360.0 - 180.0;
        let y = point.y / size;
        let lat = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();
        GeoPoint { lat, lon }
    }
}

impl Projection for WebMercator {
    fn project(&self, point: &GeoPoint) -> ScreenPoint {
        let size = self.world_size();
        // Clamp to the Mercator limits so polar input cannot produce infinities
        let lat = point.lat.clamp(MIN_LAT, MAX_LAT);
        let lat_rad = lat.to_radians();

        let x = (point.lon + 180.0) / 360.0 * size;
        let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * size).clamp(0.0, size);

        ScreenPoint { x, y }
    }
}
