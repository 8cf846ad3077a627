//! Simulated feed around central Stockholm, for running without a network.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;

use super::{BoxFuture, FeedError, SnapshotSource};
use crate::coord::GeoPoint;
use crate::snapshot::VehicleSnapshot;

const KM_PER_DEG_LAT: f64 = 111.32;

struct DemoVehicle {
    id: &'static str,
    start: (f64, f64),
    line: &'static str,
    headsign: &'static str,
    speed_kmh: f64,
    bearing_deg: f64,
    /// Report the bearing in the feed; otherwise it must be inferred.
    reports_bearing: bool,
}

const VEHICLES: &[DemoVehicle] = &[
    DemoVehicle {
        id: "t1",
        start: (59.334, 18.060),
        line: "14",
        headsign: "Fruängen",
        speed_kmh: 48.0,
        bearing_deg: 190.0,
        reports_bearing: true,
    },
    DemoVehicle {
        id: "t2",
        start: (59.343, 18.020),
        line: "17",
        headsign: "Åkeshov",
        speed_kmh: 31.0,
        bearing_deg: 320.0,
        reports_bearing: true,
    },
    DemoVehicle {
        id: "t3",
        start: (59.310, 18.070),
        line: "19",
        headsign: "Hagsätra",
        speed_kmh: 55.0,
        bearing_deg: 10.0,
        reports_bearing: false,
    },
];

/// Vehicles that move in straight lines at constant speed.
///
/// Every `fetch` advances simulated time by one poll interval. Every fourth
/// poll `t2` drops out of the feed so retirement can be observed.
#[derive(Debug)]
pub struct DemoFeed {
    poll_interval: Duration,
    step: AtomicU64,
}

impl DemoFeed {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            step: AtomicU64::new(0),
        }
    }

    /// Snapshots at a given poll number.
    pub fn snapshots_at(&self, step: u64) -> Vec<VehicleSnapshot> {
        let hours = step as f64 * self.poll_interval.as_secs_f64() / 3600.0;

        VEHICLES
            .iter()
            .filter(|v| !(v.id == "t2" && step % 4 == 3))
            .map(|v| {
                let position = advance(GeoPoint::new(v.start.0, v.start.1), v.bearing_deg, v.speed_kmh * hours);
                let snapshot = VehicleSnapshot::new(v.id, position.lat, position.lon, v.line)
                    .with_speed(v.speed_kmh)
                    .with_headsign(v.headsign)
                    .with_timestamp(Utc::now());
                if v.reports_bearing {
                    snapshot.with_bearing(v.bearing_deg)
                } else {
                    snapshot.with_bearing(0.0)
                }
            })
            .collect()
    }
}

impl SnapshotSource for DemoFeed {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<VehicleSnapshot>, FeedError>> {
        let step = self.step.fetch_add(1, Ordering::SeqCst);
        let snapshots = self.snapshots_at(step);
        Box::pin(async move { Ok(snapshots) })
    }

    fn describe(&self) -> String {
        "demo (Stockholm)".to_string()
    }
}

/// Move `distance_km` along `bearing_deg` on a locally flat earth.
fn advance(from: GeoPoint, bearing_deg: f64, distance_km: f64) -> GeoPoint {
    let bearing = bearing_deg.to_radians();
    let dlat = distance_km * bearing.cos() / KM_PER_DEG_LAT;
    let dlon = distance_km * bearing.sin() / (KM_PER_DEG_LAT * from.lat.to_radians().cos());
    GeoPoint::new(from.lat + dlat, from.lon + dlon)
}
