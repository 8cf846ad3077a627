//! Line identifiers, transit modes, and line colors.
//!
//! Feeds report lines in many spellings ("14", " 43 x", "43X", "Line 4b").
//! Every line is reduced to a canonical [`LineId`] before it is compared,
//! filtered, or colored.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Color used when a line belongs to no configured mode and has no numeric
/// range color.
pub const DEFAULT_LINE_COLOR: &str = "#EB5757";

/// Canonical line identifier.
///
/// Normalization: uppercase, strip whitespace, keep the first
/// "digits optionally followed by letters" token. Lines with no digits keep
/// their stripped uppercase form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(String);

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[0-9]+[A-Z]*").unwrap())
}

impl LineId {
    /// Normalize a raw line string. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let compact: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_uppercase)
            .collect();

        if compact.is_empty() {
            return None;
        }

        match line_pattern().find(&compact) {
            Some(token) => Some(Self(token.as_str().to_string())),
            None => Some(Self(compact)),
        }
    }

    /// Canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading numeric part, if any ("43X" → 43).
    pub fn number(&self) -> Option<u32> {
        let digits: String = self.0.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named group of lines sharing one color (e.g. "metro red", "tram").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitMode {
    /// Display name.
    pub name: String,
    /// CSS-style color, e.g. `#2F80ED`.
    pub color: String,
    /// Lines in this mode.
    pub lines: BTreeSet<LineId>,
}

impl TransitMode {
    /// Create a mode from raw line strings; blank entries are skipped.
    pub fn new<I, S>(name: impl Into<String>, color: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.into(),
            color: color.into(),
            lines: lines
                .into_iter()
                .filter_map(|l| LineId::parse(l.as_ref()))
                .collect(),
        }
    }
}

/// Every line the system knows about: configured modes plus lines seen in
/// the feed.
///
/// Mode line lists are the source of truth for membership; a feed line is
/// never assigned to a mode by color or number.
#[derive(Debug, Clone, Default)]
pub struct LineCatalog {
    modes: Vec<TransitMode>,
    observed: BTreeSet<LineId>,
}

impl LineCatalog {
    /// Create a catalog from configured modes.
    pub fn new(modes: Vec<TransitMode>) -> Self {
        Self {
            modes,
            observed: BTreeSet::new(),
        }
    }

    /// Configured modes.
    pub fn modes(&self) -> &[TransitMode] {
        &self.modes
    }

    /// Look up a mode by name (case-insensitive).
    pub fn mode(&self, name: &str) -> Option<&TransitMode> {
        self.modes.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Record a line seen in the feed. Returns true if it was new.
    pub fn observe(&mut self, line: &LineId) -> bool {
        if self.is_defined(line) || self.observed.contains(line) {
            return false;
        }
        self.observed.insert(line.clone())
    }

    /// True if some mode defines `line`.
    pub fn is_defined(&self, line: &LineId) -> bool {
        self.modes.iter().any(|m| m.lines.contains(line))
    }

    /// Union of defined and observed lines.
    pub fn universe(&self) -> BTreeSet<LineId> {
        self.modes
            .iter()
            .flat_map(|m| m.lines.iter().cloned())
            .chain(self.observed.iter().cloned())
            .collect()
    }

    /// Color for a line: its mode's color, else a numeric-range fallback.
    pub fn color_for(&self, line: &LineId) -> &str {
        self.modes
            .iter()
            .find(|m| m.lines.contains(line))
            .map(|m| m.color.as_str())
            .unwrap_or_else(|| fallback_color(line))
    }
}

/// Color for lines outside every mode, by numeric range.
pub fn fallback_color(line: &LineId) -> &'static str {
    match line.number() {
        Some(10..=19) => "#2F80ED",
        Some(20..=29) => "#27AE60",
        _ => DEFAULT_LINE_COLOR,
    }
}
