//! Per-poll vehicle state as delivered to the engine.

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, stable vehicle identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap a raw id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One vehicle's state in one poll, after trip enrichment.
///
/// Values are raw: coordinates are not range-checked and `line` is not
/// normalized. The reconciler validates both.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSnapshot {
    pub id: EntityId,
    pub lat: f64,
    pub lon: f64,
    /// Raw line identifier as reported or resolved from the trip.
    pub line: String,
    /// Degrees clockwise from north; `0` or `None` means unknown.
    pub bearing_deg: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Destination text.
    pub headsign: Option<String>,
}

impl VehicleSnapshot {
    /// Snapshot with only the required fields set.
    pub fn new(id: impl Into<String>, lat: f64, lon: f64, line: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(id),
            lat,
            lon,
            line: line.into(),
            bearing_deg: None,
            speed_kmh: None,
            timestamp: None,
            headsign: None,
        }
    }

    pub fn with_bearing(mut self, bearing_deg: f64) -> Self {
        self.bearing_deg = Some(bearing_deg);
        self
    }

    pub fn with_speed(mut self, speed_kmh: f64) -> Self {
        self.speed_kmh = Some(speed_kmh);
        self
    }

    pub fn with_headsign(mut self, headsign: impl Into<String>) -> Self {
        self.headsign = Some(headsign.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Speed if present, finite, and non-negative.
    pub fn valid_speed(&self) -> Option<f64> {
        self.speed_kmh.filter(|s| s.is_finite() && *s >= 0.0)
    }
}
