//! Trip id to line resolution.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::FeedError;

/// What a trip resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TripInfo {
    pub line: String,
    #[serde(default)]
    pub headsign: Option<String>,
}

impl TripInfo {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            headsign: None,
        }
    }

    pub fn with_headsign(mut self, headsign: impl Into<String>) -> Self {
        self.headsign = Some(headsign.into());
        self
    }
}

/// Resolves a feed `tripId`.
pub trait TripLookup: Send + Sync {
    fn lookup(&self, trip_id: &str) -> Option<TripInfo>;
}

/// In-memory trip table, loadable from a JSON object
/// `{"<tripId>": {"line": "14", "headsign": "Fruängen"}, ...}`.
#[derive(Debug, Clone, Default)]
pub struct TripTable {
    trips: HashMap<String, TripInfo>,
}

impl TripTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from a JSON file.
    pub fn load(path: &Path) -> Result<Self, FeedError> {
        let text = fs::read_to_string(path).map_err(|e| FeedError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let table = Self::from_json(&text)?;
        info!(path = %path.display(), trips = table.len(), "Trip table loaded");
        Ok(table)
    }

    pub fn from_json(text: &str) -> Result<Self, FeedError> {
        let trips: HashMap<String, TripInfo> =
            serde_json::from_str(text).map_err(|e| FeedError::Decode(e.to_string()))?;
        Ok(Self { trips })
    }

    pub fn insert(&mut self, trip_id: impl Into<String>, info: TripInfo) {
        self.trips.insert(trip_id.into(), info);
    }

    pub fn len(&self) -> usize {
        self.trips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }
}

impl TripLookup for TripTable {
    fn lookup(&self, trip_id: &str) -> Option<TripInfo> {
        self.trips.get(trip_id.trim()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("trips.json");
        fs::write(
            &path,
            r#"{"a": {"line": "14", "headsign": "Fruängen"}, "b": {"line": "43X"}}"#,
        )
        .unwrap();

        let table = TripTable::load(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.lookup("a"),
            Some(TripInfo::new("14").with_headsign("Fruängen"))
        );
        assert_eq!(table.lookup(" b ").unwrap().headsign, None);
        assert!(table.lookup("c").is_none());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let err = TripTable::load(&temp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, FeedError::Io { .. }));
    }

    #[test]
    fn test_bad_json_is_decode_error() {
        assert!(matches!(TripTable::from_json("[1,2]"), Err(FeedError::Decode(_))));
    }
}
