//! transitlive - Live transit vehicle positions on a 2D map
//!
//! This library turns a low-frequency, unordered snapshot feed of vehicle
//! positions into a smooth, stable visualization: per-vehicle motion tweens
//! between polls, heading inference when the feed omits it, stable identity
//! across polls, line filtering, and hover/pin labels that never outlive
//! their vehicle.
//!
//! The drawing surface is abstract: a host implements [`map::RenderSink`] and
//! drives a [`map::TransitMap`] with snapshots, frame ticks, and pointer input.
//!
//! ```ignore
//! let mut map = TransitMap::new(&MapConfig::default(), Box::new(store), Box::new(sink))?;
//! map.apply_snapshots(feed.fetch().await?, Instant::now());
//! map.tick(Instant::now());
//! ```

pub mod animation;
pub mod config;
pub mod coord;
pub mod feed;
pub mod filter;
pub mod heading;
pub mod labels;
pub mod line;
pub mod logging;
pub mod map;
pub mod poller;
pub mod reconciler;
pub mod snapshot;
pub mod store;

pub use config::{ConfigFile, MapConfig};
pub use filter::{LineFilter, Selection};
pub use line::LineId;
pub use map::{RenderSink, TransitMap};
pub use snapshot::{EntityId, VehicleSnapshot};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
