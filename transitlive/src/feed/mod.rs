//! Vehicle feed: wire format, validation, and trip enrichment.
//!
//! A feed body is a JSON array of vehicle objects:
//!
//! ```json
//! [
//!   {"id": "t1", "lat": 59.334, "lon": 18.060, "line": "14",
//!    "bearingDeg": 190, "speedKmh": 48, "headsign": "Fruängen"},
//!   {"id": "t2", "lat": 59.343, "lon": 18.020, "tripId": "55700000012345"}
//! ]
//! ```
//!
//! A body that is not a JSON array fails the whole poll. Individual entries
//! that are malformed, or whose line cannot be resolved, are dropped and
//! counted.

mod client;
mod demo;
mod trips;

pub use client::{BoxFuture, HttpClient, ReqwestClient};
pub use demo::DemoFeed;
pub use trips::{TripInfo, TripLookup, TripTable};

#[cfg(test)]
pub use client::tests::MockHttpClient;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::snapshot::{EntityId, VehicleSnapshot};

/// Errors fetching or decoding a feed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Malformed feed body: {0}")]
    Decode(String),

    #[error("Failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// A string or a bare number; feeds disagree on how ids and lines are typed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Number(n) => n.to_string(),
        }
    }
}

/// RFC 3339 text, or epoch seconds or milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum Timestamp {
    Text(String),
    Epoch(f64),
}

/// Epoch values above this are taken as milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

impl Timestamp {
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            Timestamp::Epoch(v) if v.is_finite() && *v >= EPOCH_MILLIS_THRESHOLD => {
                DateTime::from_timestamp_millis(*v as i64)
            }
            Timestamp::Epoch(v) if v.is_finite() => DateTime::from_timestamp(*v as i64, 0),
            Timestamp::Epoch(_) => None,
        }
    }
}

/// One vehicle entry as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    #[serde(default)]
    id: Option<Scalar>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    trip_id: Option<Scalar>,
    #[serde(default)]
    line: Option<Scalar>,
    #[serde(default, alias = "bearing")]
    bearing_deg: Option<f64>,
    #[serde(default)]
    speed_kmh: Option<f64>,
    #[serde(default)]
    timestamp: Option<Timestamp>,
    #[serde(default, alias = "dest")]
    headsign: Option<String>,
}

/// Result of decoding a feed body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub records: Vec<FeedRecord>,
    /// Array entries that could not be decoded as a vehicle.
    pub malformed: usize,
}

/// Decode a feed body. Fails only if the body is not a JSON array.
pub fn parse_feed(body: &[u8]) -> Result<ParsedFeed, FeedError> {
    let entries: Vec<serde_json::Value> =
        serde_json::from_slice(body).map_err(|e| FeedError::Decode(e.to_string()))?;

    let mut parsed = ParsedFeed::default();
    for entry in entries {
        match serde_json::from_value::<FeedRecord>(entry) {
            Ok(record) => parsed.records.push(record),
            Err(_) => parsed.malformed += 1,
        }
    }
    Ok(parsed)
}

/// Turn records into snapshots, resolving `tripId` through `trips` when no
/// line is given. Returns the snapshots and the number of records dropped.
pub fn enrich(records: Vec<FeedRecord>, trips: &dyn TripLookup) -> (Vec<VehicleSnapshot>, usize) {
    let mut snapshots = Vec::with_capacity(records.len());
    let mut dropped = 0;

    for record in records {
        match enrich_one(record, trips) {
            Some(snapshot) => snapshots.push(snapshot),
            None => dropped += 1,
        }
    }
    (snapshots, dropped)
}

fn enrich_one(record: FeedRecord, trips: &dyn TripLookup) -> Option<VehicleSnapshot> {
    let id = record.id.map(Scalar::into_string).filter(|s| !s.trim().is_empty())?;
    let lat = record.lat?;
    let lon = record.lon?;

    let direct_line = record
        .line
        .map(Scalar::into_string)
        .filter(|l| !l.trim().is_empty());

    let (line, trip_headsign) = match direct_line {
        Some(line) => (line, None),
        None => {
            let trip_id = record.trip_id.map(Scalar::into_string)?;
            let trip = trips.lookup(&trip_id)?;
            (trip.line, trip.headsign)
        }
    };

    Some(VehicleSnapshot {
        id: EntityId::new(id),
        lat,
        lon,
        line,
        bearing_deg: record.bearing_deg,
        speed_kmh: record.speed_kmh,
        timestamp: record.timestamp.as_ref().and_then(Timestamp::to_utc),
        headsign: record
            .headsign
            .filter(|h| !h.trim().is_empty())
            .or(trip_headsign),
    })
}

/// Anything that can produce one poll's worth of snapshots.
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current snapshot batch.
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<VehicleSnapshot>, FeedError>>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Feed fetched over HTTP.
pub struct HttpFeed {
    client: Arc<dyn HttpClient>,
    url: String,
    trips: Arc<dyn TripLookup>,
}

impl std::fmt::Debug for HttpFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFeed")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl HttpFeed {
    pub fn new(client: Arc<dyn HttpClient>, url: impl Into<String>, trips: Arc<dyn TripLookup>) -> Self {
        Self {
            client,
            url: url.into(),
            trips,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SnapshotSource for HttpFeed {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<VehicleSnapshot>, FeedError>> {
        Box::pin(async move {
            let body = self.client.get(&self.url).await?;
            let parsed = parse_feed(&body)?;
            let (snapshots, unresolved) = enrich(parsed.records, self.trips.as_ref());

            debug!(
                url = %self.url,
                vehicles = snapshots.len(),
                malformed = parsed.malformed,
                unresolved,
                "Feed fetched"
            );
            Ok(snapshots)
        })
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
