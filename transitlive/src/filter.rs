//! Line selection filter.
//!
//! # Selection
//!
//! ```text
//! ShowAll ──toggle(L)──► ShowOnly(universe − {L})
//! ShowOnly(S) ──toggle(L)──► ShowOnly(S △ {L}), or ShowAll if S △ {L} is empty or ⊇ universe
//! ```
//!
//! "Show all" is its own variant rather than an empty set, so toggling one
//! line away from it means "everything except this line", and selecting
//! every known line again returns to `ShowAll` instead of a full set.
//! There is no "show none": deselecting the last line also returns to
//! `ShowAll`, matching how an empty selection is stored.
//!
//! # Persistence
//!
//! The selection is stored as a JSON array of line ids where an empty array
//! means show-all. Load and save failures are logged and otherwise ignored;
//! the filter then behaves as show-all.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::line::{LineCatalog, LineId};
use crate::store::KeyValueStore;

/// Storage key for the persisted selection.
pub const SELECTION_KEY: &str = "selected_lines";

/// Which lines are visible.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    /// No filtering.
    #[default]
    ShowAll,
    /// Only these lines. Never empty.
    ShowOnly(BTreeSet<LineId>),
}

impl Selection {
    /// Build a selection from its stored form (empty means show-all).
    pub fn from_stored(lines: BTreeSet<LineId>) -> Self {
        if lines.is_empty() {
            Selection::ShowAll
        } else {
            Selection::ShowOnly(lines)
        }
    }

    /// Stored form (show-all becomes the empty set).
    pub fn to_stored(&self) -> BTreeSet<LineId> {
        match self {
            Selection::ShowAll => BTreeSet::new(),
            Selection::ShowOnly(lines) => lines.clone(),
        }
    }

    /// True if `line` is visible under this selection.
    pub fn passes(&self, line: &LineId) -> bool {
        match self {
            Selection::ShowAll => true,
            Selection::ShowOnly(lines) => lines.contains(line),
        }
    }

    /// True for the show-all variant.
    pub fn is_show_all(&self) -> bool {
        matches!(self, Selection::ShowAll)
    }

    /// Selection with `line` flipped.
    ///
    /// `line` is treated as part of `universe` even if it is not yet in it.
    pub fn toggled(&self, line: &LineId, universe: &BTreeSet<LineId>) -> Selection {
        let mut universe = universe.clone();
        universe.insert(line.clone());

        let mut lines = self.materialize(&universe);
        if !lines.remove(line) {
            lines.insert(line.clone());
        }
        Self::collapse(lines, &universe)
    }

    /// Selection with every line in `lines` set to `selected`.
    pub fn with_lines<'a, I>(&self, lines: I, selected: bool, universe: &BTreeSet<LineId>) -> Selection
    where
        I: IntoIterator<Item = &'a LineId>,
    {
        let lines: Vec<&LineId> = lines.into_iter().collect();
        if lines.is_empty() {
            return self.clone();
        }

        let mut universe = universe.clone();
        universe.extend(lines.iter().map(|l| (*l).clone()));

        let mut current = self.materialize(&universe);
        for line in lines {
            if selected {
                current.insert(line.clone());
            } else {
                current.remove(line);
            }
        }
        Self::collapse(current, &universe)
    }

    fn materialize(&self, universe: &BTreeSet<LineId>) -> BTreeSet<LineId> {
        match self {
            Selection::ShowAll => universe.clone(),
            Selection::ShowOnly(lines) => lines.clone(),
        }
    }

    fn collapse(lines: BTreeSet<LineId>, universe: &BTreeSet<LineId>) -> Selection {
        if lines.is_empty() || lines.is_superset(universe) {
            Selection::ShowAll
        } else {
            Selection::ShowOnly(lines)
        }
    }
}

/// Line filter backed by a persisted [`Selection`].
pub struct LineFilter {
    selection: Selection,
    catalog: LineCatalog,
    store: Box<dyn KeyValueStore>,
}

impl std::fmt::Debug for LineFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineFilter")
            .field("selection", &self.selection)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

impl LineFilter {
    /// Create a filter, restoring the persisted selection from `store`.
    pub fn load(catalog: LineCatalog, store: Box<dyn KeyValueStore>) -> Self {
        let selection = match store.load(SELECTION_KEY) {
            Ok(Some(raw)) => parse_stored(&raw),
            Ok(None) => Selection::ShowAll,
            Err(e) => {
                warn!(error = %e, "Failed to load line selection, showing all lines");
                Selection::ShowAll
            }
        };
        debug!(?selection, "Line filter loaded");

        Self {
            selection,
            catalog,
            store,
        }
    }

    /// Current selection.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Known lines and modes.
    pub fn catalog(&self) -> &LineCatalog {
        &self.catalog
    }

    /// Record a line seen in the feed.
    pub fn observe(&mut self, line: &LineId) -> bool {
        self.catalog.observe(line)
    }

    /// True if `line` is visible.
    pub fn passes(&self, line: &LineId) -> bool {
        self.selection.passes(line)
    }

    /// Flip one line and persist the result.
    pub fn toggle(&mut self, line: &LineId) -> &Selection {
        self.catalog.observe(line);
        self.selection = self.selection.toggled(line, &self.catalog.universe());
        self.persist();
        &self.selection
    }

    /// Select or deselect every line of a mode. Returns `None` for an unknown
    /// mode, leaving the selection unchanged.
    pub fn set_mode(&mut self, mode: &str, selected: bool) -> Option<&Selection> {
        let lines = self.catalog.mode(mode)?.lines.clone();
        self.selection = self
            .selection
            .with_lines(lines.iter(), selected, &self.catalog.universe());
        self.persist();
        Some(&self.selection)
    }

    /// Clear all filtering.
    pub fn show_all(&mut self) {
        self.selection = Selection::ShowAll;
        self.persist();
    }

    fn persist(&mut self) {
        let stored: Vec<&str> = match &self.selection {
            Selection::ShowAll => Vec::new(),
            Selection::ShowOnly(lines) => lines.iter().map(LineId::as_str).collect(),
        };

        let encoded = match serde_json::to_string(&stored) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "Failed to encode line selection");
                return;
            }
        };

        if let Err(e) = self.store.save(SELECTION_KEY, &encoded) {
            warn!(error = %e, "Failed to persist line selection");
        }
    }
}

fn parse_stored(raw: &str) -> Selection {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(lines) => Selection::from_stored(lines.iter().filter_map(|l| LineId::parse(l)).collect()),
        Err(e) => {
            warn!(error = %e, "Stored line selection is malformed, showing all lines");
            Selection::ShowAll
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::TransitMode;
    use crate::store::tests::FailingStore;
    use crate::store::{FileStore, MemoryStore};
    use tempfile::TempDir;

    fn line(s: &str) -> LineId {
        LineId::parse(s).unwrap()
    }

    fn set(lines: &[&str]) -> BTreeSet<LineId> {
        lines.iter().map(|l| line(l)).collect()
    }

    fn catalog() -> LineCatalog {
        LineCatalog::new(vec![
            TransitMode::new("metro green", "#00A651", ["17", "18", "19"]),
            TransitMode::new("metro red", "#E3000F", ["13", "14"]),
        ])
    }

    #[test]
    fn test_toggle_from_show_all_excludes_only_that_line() {
        let mut filter = LineFilter::load(catalog(), Box::new(MemoryStore::new()));

        filter.toggle(&line("14"));

        assert!(!filter.passes(&line("14")));
        for other in ["13", "17", "18", "19"] {
            assert!(filter.passes(&line(other)), "line {} should pass", other);
        }
    }

    #[test]
    fn test_toggle_twice_restores_show_all() {
        let mut filter = LineFilter::load(catalog(), Box::new(MemoryStore::new()));
        filter.toggle(&line("14"));
        filter.toggle(&line("14"));
        assert_eq!(filter.selection(), &Selection::ShowAll);
    }

    #[test]
    fn test_selecting_every_line_collapses_to_show_all() {
        let universe = catalog().universe();
        let first = universe.iter().next().unwrap().clone();
        let mut selection = Selection::ShowOnly([first.clone()].into_iter().collect());

        for l in universe.iter().filter(|l| **l != first) {
            selection = selection.toggled(l, &universe);
        }

        assert_eq!(selection, Selection::ShowAll);
    }

    #[test]
    fn test_deselecting_every_line_returns_to_show_all() {
        let universe = set(&["13", "14"]);
        let selection = Selection::ShowAll
            .toggled(&line("13"), &universe)
            .toggled(&line("14"), &universe);

        assert_eq!(selection, Selection::ShowAll);
        assert!(selection.passes(&line("13")));
        assert_eq!(
            Selection::ShowAll.with_lines(&universe, false, &universe),
            Selection::ShowAll
        );
    }

    #[test]
    fn test_deselecting_every_line_survives_reload() {
        let temp = TempDir::new().unwrap();
        let mut filter = LineFilter::load(catalog(), Box::new(FileStore::new(temp.path())));
        for l in ["13", "14", "17", "18", "19"] {
            filter.toggle(&line(l));
        }
        let in_memory = filter.selection().clone();

        let reloaded = LineFilter::load(catalog(), Box::new(FileStore::new(temp.path())));

        assert_eq!(reloaded.selection(), &in_memory);
        assert_eq!(in_memory, Selection::ShowAll);
        assert!(reloaded.passes(&line("14")));
    }

    #[test]
    fn test_toggle_unknown_line_becomes_known() {
        let mut filter = LineFilter::load(catalog(), Box::new(MemoryStore::new()));
        filter.toggle(&line("99"));

        assert!(!filter.passes(&line("99")));
        assert!(filter.passes(&line("14")));
        assert!(filter.catalog().universe().contains(&line("99")));
    }

    #[test]
    fn test_set_mode() {
        let mut filter = LineFilter::load(catalog(), Box::new(MemoryStore::new()));

        filter.set_mode("metro green", false).unwrap();
        assert!(!filter.passes(&line("17")));
        assert!(filter.passes(&line("14")));

        filter.set_mode("Metro Green", true).unwrap();
        assert_eq!(filter.selection(), &Selection::ShowAll);

        assert!(filter.set_mode("ferry", false).is_none());
    }

    #[test]
    fn test_selection_persists_and_reloads() {
        let mut filter = LineFilter::load(catalog(), Box::new(MemoryStore::new()));
        filter.toggle(&line("14"));
        let expected = filter.selection().clone();

        let stored = filter.selection().to_stored();
        let raw = serde_json::to_string(&stored).unwrap();
        let reloaded = LineFilter::load(catalog(), Box::new(MemoryStore::with_value(SELECTION_KEY, raw)));

        assert_eq!(reloaded.selection(), &expected);
    }

    #[test]
    fn test_show_all_persisted_as_empty_array() {
        let mut store = MemoryStore::new();
        store.save(SELECTION_KEY, r#"["14"]"#).unwrap();
        let mut filter = LineFilter::load(catalog(), Box::new(store));
        assert!(!filter.passes(&line("17")));

        filter.show_all();
        assert!(filter.passes(&line("17")));
    }

    #[test]
    fn test_stored_lines_are_renormalized() {
        let store = MemoryStore::with_value(SELECTION_KEY, r#"[" 43 x", "14"]"#);
        let filter = LineFilter::load(catalog(), Box::new(store));
        assert_eq!(filter.selection(), &Selection::ShowOnly(set(&["43X", "14"])));
    }

    #[test]
    fn test_malformed_store_falls_back_to_show_all() {
        let store = MemoryStore::with_value(SELECTION_KEY, "{not json");
        let filter = LineFilter::load(catalog(), Box::new(store));
        assert_eq!(filter.selection(), &Selection::ShowAll);
    }

    #[test]
    fn test_failing_store_is_not_fatal() {
        let mut filter = LineFilter::load(catalog(), Box::new(FailingStore));
        assert_eq!(filter.selection(), &Selection::ShowAll);

        filter.toggle(&line("14"));
        assert!(!filter.passes(&line("14")));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn universe_strategy() -> impl Strategy<Value = Vec<u32>> {
            prop::collection::vec(1u32..60, 1..12)
        }

        proptest! {
            #[test]
            fn test_toggle_is_an_involution(
                nums in universe_strategy(),
                picks in prop::collection::vec(any::<bool>(), 12),
                start_all in any::<bool>(),
                target in 0usize..12
            ) {
                let universe: BTreeSet<LineId> =
                    nums.iter().map(|n| line(&n.to_string())).collect();
                let members: Vec<&LineId> = universe.iter().collect();

                let chosen: BTreeSet<LineId> = members
                    .iter()
                    .zip(picks.iter())
                    .filter(|(_, keep)| **keep)
                    .map(|(l, _)| (*l).clone())
                    .collect();

                // A single-line selection loses its line to the empty-set collapse.
                let start = if start_all || chosen.len() < 2 || chosen.is_superset(&universe) {
                    Selection::ShowAll
                } else {
                    Selection::ShowOnly(chosen)
                };

                let l = members[target % members.len()];
                let back = start.toggled(l, &universe).toggled(l, &universe);
                prop_assert_eq!(back, start);
            }

            #[test]
            fn test_toggle_changes_only_target(
                nums in universe_strategy(),
                target in 0usize..12
            ) {
                let universe: BTreeSet<LineId> =
                    nums.iter().map(|n| line(&n.to_string())).collect();
                prop_assume!(universe.len() >= 2);
                let members: Vec<&LineId> = universe.iter().collect();
                let l = members[target % members.len()];

                let toggled = Selection::ShowAll.toggled(l, &universe);
                for other in &universe {
                    prop_assert_eq!(toggled.passes(other), other != l);
                }
            }
        }
    }
}
