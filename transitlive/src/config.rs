//! Configuration.
//!
//! [`MapConfig`] holds the engine tunables; [`ConfigFile`] is the on-disk
//! INI form read from `~/.config/transitlive/config.ini`:
//!
//! ```ini
//! [feed]
//! url = https://example.org/vehicles.json
//! trips = /path/to/trips.json
//! timeout_secs = 10
//!
//! [map]
//! zoom = 12
//! poll_interval_ms = 3000
//! state_dir = /path/to/state
//!
//! [animation]
//! ms_per_pixel = 7
//! min_duration_ms = 350
//! movement_threshold_deg = 0.00002
//! commit_epsilon_deg = 0.00000001
//! frame_interval_ms = 16
//!
//! [logging]
//! directory = /path/to/logs
//!
//! [mode.metro green]
//! color = 00A651
//! lines = 17, 18, 19
//! ```
//!
//! Colors may be written with or without a leading `#`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use crate::animation::{
    max_for_poll_interval, DurationPolicy, DEFAULT_COMMIT_EPSILON_DEG, DEFAULT_MIN_DURATION,
    DEFAULT_MS_PER_PIXEL, DEFAULT_POLL_FRACTION,
};
use crate::coord::CoordError;
use crate::heading::{HeadingEstimator, DEFAULT_MOVEMENT_THRESHOLD_DEG};
use crate::line::TransitMode;

/// Default time between feed polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Default map zoom used to measure moves in pixels.
pub const DEFAULT_ZOOM: f64 = 12.0;

/// Default frame pacing while tweens are in flight (~60 fps).
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Default HTTP timeout for one feed request.
pub const DEFAULT_FEED_TIMEOUT: Duration = Duration::from_secs(10);

const MODE_SECTION_PREFIX: &str = "mode.";

/// Errors loading, saving, or editing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("Invalid map projection: {0}")]
    Projection(#[from] CoordError),
}

/// Engine tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct MapConfig {
    pub poll_interval: Duration,
    pub zoom: f64,
    pub ms_per_pixel: f64,
    pub min_duration: Duration,
    pub movement_threshold_deg: f64,
    pub commit_epsilon_deg: f64,
    pub frame_interval: Duration,
    pub modes: Vec<TransitMode>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            zoom: DEFAULT_ZOOM,
            ms_per_pixel: DEFAULT_MS_PER_PIXEL,
            min_duration: DEFAULT_MIN_DURATION,
            movement_threshold_deg: DEFAULT_MOVEMENT_THRESHOLD_DEG,
            commit_epsilon_deg: DEFAULT_COMMIT_EPSILON_DEG,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            modes: Vec::new(),
        }
    }
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn with_ms_per_pixel(mut self, ms_per_pixel: f64) -> Self {
        self.ms_per_pixel = ms_per_pixel;
        self
    }

    pub fn with_min_duration(mut self, min: Duration) -> Self {
        self.min_duration = min;
        self
    }

    pub fn with_movement_threshold(mut self, degrees: f64) -> Self {
        self.movement_threshold_deg = degrees;
        self
    }

    pub fn with_commit_epsilon(mut self, degrees: f64) -> Self {
        self.commit_epsilon_deg = degrees;
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn with_mode(mut self, mode: TransitMode) -> Self {
        self.modes.push(mode);
        self
    }

    /// Duration policy: configured pace and minimum, maximum derived from
    /// the poll interval.
    pub fn duration_policy(&self) -> DurationPolicy {
        DurationPolicy::new(
            self.ms_per_pixel,
            self.min_duration,
            max_for_poll_interval(self.poll_interval, DEFAULT_POLL_FRACTION),
        )
    }

    pub fn heading_estimator(&self) -> HeadingEstimator {
        HeadingEstimator::new(self.movement_threshold_deg)
    }
}

/// Feed endpoint settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    pub url: Option<String>,
    /// JSON trip table used to resolve `tripId` to a line.
    pub trips_file: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: None,
            trips_file: None,
            timeout: DEFAULT_FEED_TIMEOUT,
        }
    }
}

/// Contents of `config.ini`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    pub feed: FeedSettings,
    pub map: MapConfig,
    /// Where the line selection is persisted; platform data dir if unset.
    pub state_dir: Option<PathBuf>,
    /// Where log files go; platform cache dir if unset.
    pub log_dir: Option<PathBuf>,
}

/// Path of the configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("transitlive")
        .join("config.ini")
}

impl ConfigFile {
    /// Load from [`config_file_path`]. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Parse INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<string>"),
            source: ini::Error::Parse(e),
        })?;
        Self::from_ini(&ini)
    }

    /// Save to [`config_file_path`].
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for key in ConfigKey::all() {
            if let Some(value) = ini.get_from(Some(key.section()), key.key_name()) {
                key.set(&mut config, value)?;
            }
        }

        for (section, props) in ini.iter() {
            let Some(name) = section.and_then(|s| s.strip_prefix(MODE_SECTION_PREFIX)) else {
                continue;
            };
            let raw_color = props.get("color").unwrap_or_default();
            let color = normalize_color(raw_color).ok_or_else(|| ConfigError::InvalidValue {
                key: format!("{}{}.color", MODE_SECTION_PREFIX, name),
                value: raw_color.to_string(),
            })?;
            let lines = props.get("lines").unwrap_or_default().split(',');
            config.map.modes.push(TransitMode::new(name.trim(), color, lines));
        }

        Ok(config)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section())).set(key.key_name(), value);
            }
        }

        for mode in &self.map.modes {
            let lines: Vec<&str> = mode.lines.iter().map(|l| l.as_str()).collect();
            ini.with_section(Some(format!("{}{}", MODE_SECTION_PREFIX, mode.name)))
                .set("color", mode.color.trim_start_matches('#'))
                .set("lines", lines.join(", "));
        }
        ini
    }
}

/// `#RRGGBB` or `#RGB`, with or without `#` or quotes, to uppercase `#...`.
fn normalize_color(raw: &str) -> Option<String> {
    let hex = raw.trim().trim_matches('"').trim_start_matches('#');
    let valid = matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit());
    valid.then(|| format!("#{}", hex.to_ascii_uppercase()))
}

/// A settable scalar key in `config.ini`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    FeedUrl,
    FeedTrips,
    FeedTimeout,
    MapZoom,
    MapPollInterval,
    MapStateDir,
    AnimationMsPerPixel,
    AnimationMinDuration,
    AnimationMovementThreshold,
    AnimationCommitEpsilon,
    AnimationFrameInterval,
    LoggingDirectory,
}

impl ConfigKey {
    pub fn all() -> &'static [ConfigKey] {
        use ConfigKey::*;
        &[
            FeedUrl,
            FeedTrips,
            FeedTimeout,
            MapZoom,
            MapPollInterval,
            MapStateDir,
            AnimationMsPerPixel,
            AnimationMinDuration,
            AnimationMovementThreshold,
            AnimationCommitEpsilon,
            AnimationFrameInterval,
            LoggingDirectory,
        ]
    }

    pub fn section(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            FeedUrl | FeedTrips | FeedTimeout => "feed",
            MapZoom | MapPollInterval | MapStateDir => "map",
            AnimationMsPerPixel
            | AnimationMinDuration
            | AnimationMovementThreshold
            | AnimationCommitEpsilon
            | AnimationFrameInterval => "animation",
            LoggingDirectory => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            FeedUrl => "url",
            FeedTrips => "trips",
            FeedTimeout => "timeout_secs",
            MapZoom => "zoom",
            MapPollInterval => "poll_interval_ms",
            MapStateDir => "state_dir",
            AnimationMsPerPixel => "ms_per_pixel",
            AnimationMinDuration => "min_duration_ms",
            AnimationMovementThreshold => "movement_threshold_deg",
            AnimationCommitEpsilon => "commit_epsilon_deg",
            AnimationFrameInterval => "frame_interval_ms",
            LoggingDirectory => "directory",
        }
    }

    /// `section.key`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as text; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        use ConfigKey::*;
        let path = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };
        match self {
            FeedUrl => config.feed.url.clone().unwrap_or_default(),
            FeedTrips => path(&config.feed.trips_file),
            FeedTimeout => config.feed.timeout.as_secs().to_string(),
            MapZoom => config.map.zoom.to_string(),
            MapPollInterval => config.map.poll_interval.as_millis().to_string(),
            MapStateDir => path(&config.state_dir),
            AnimationMsPerPixel => config.map.ms_per_pixel.to_string(),
            AnimationMinDuration => config.map.min_duration.as_millis().to_string(),
            AnimationMovementThreshold => config.map.movement_threshold_deg.to_string(),
            AnimationCommitEpsilon => config.map.commit_epsilon_deg.to_string(),
            AnimationFrameInterval => config.map.frame_interval.as_millis().to_string(),
            LoggingDirectory => path(&config.log_dir),
        }
    }

    /// Parse `value` and store it. An empty value clears optional keys.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        use ConfigKey::*;
        let value = value.trim();
        let optional_path = |v: &str| (!v.is_empty()).then(|| PathBuf::from(v));

        match self {
            FeedUrl => config.feed.url = (!value.is_empty()).then(|| value.to_string()),
            FeedTrips => config.feed.trips_file = optional_path(value),
            FeedTimeout => config.feed.timeout = Duration::from_secs(self.parse_positive(value)?),
            MapZoom => config.map.zoom = self.parse_number(value)?,
            MapPollInterval => {
                config.map.poll_interval = Duration::from_millis(self.parse_positive(value)?)
            }
            MapStateDir => config.state_dir = optional_path(value),
            AnimationMsPerPixel => config.map.ms_per_pixel = self.parse_number(value)?,
            AnimationMinDuration => {
                config.map.min_duration = Duration::from_millis(self.parse_integer(value)?)
            }
            AnimationMovementThreshold => {
                config.map.movement_threshold_deg = self.parse_number(value)?
            }
            AnimationCommitEpsilon => config.map.commit_epsilon_deg = self.parse_number(value)?,
            AnimationFrameInterval => {
                config.map.frame_interval = Duration::from_millis(self.parse_positive(value)?)
            }
            LoggingDirectory => config.log_dir = optional_path(value),
        }
        Ok(())
    }

    fn invalid(&self, value: &str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
        }
    }

    fn parse_number(&self, value: &str) -> Result<f64, ConfigError> {
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .ok_or_else(|| self.invalid(value))
    }

    fn parse_integer(&self, value: &str) -> Result<u64, ConfigError> {
        value.parse::<u64>().map_err(|_| self.invalid(value))
    }

    fn parse_positive(&self, value: &str) -> Result<u64, ConfigError> {
        self.parse_integer(value)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| self.invalid(value))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}
