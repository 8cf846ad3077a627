//! Hover and pin label interaction.
//!
//! At most one hover label and one pinned label are visible. A hover label
//! never shares an entity with the pinned label; the pin wins.
//!
//! # State Machine
//!
//! ```text
//! Idle --[enter(A)]--> Hovering(A)
//! Hovering(A) --[enter(B)]--> Hovering(B)
//! Hovering(A) --[leave(A) | move(not over entity)]--> Idle
//! Hovering(A) --[click(A)]--> Pinned(A)
//! Pinned(A) --[enter(A)]--> Pinned(A)            (no-op)
//! Pinned(A) --[enter(B)]--> Pinned(A) + Hovering(B)
//! Pinned(A) --[click(A)]--> Idle
//! Pinned(A) --[click(B)]--> Pinned(B)
//! any --[click(background)]--> Idle
//! any --[retired(X)]--> state with every reference to X removed
//! ```
//!
//! Every input returns the [`LabelChange`]s the render surface must apply.
//! Inputs that name an entity the controller does not reference are no-ops.

use crate::coord::GeoPoint;
use crate::snapshot::EntityId;

/// Which slot a label occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelTier {
    Hover,
    Pinned,
}

/// What a label shows and where.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelContent {
    pub position: GeoPoint,
    pub text: String,
}

impl LabelContent {
    pub fn new(position: GeoPoint, text: impl Into<String>) -> Self {
        Self {
            position,
            text: text.into(),
        }
    }
}

/// A visible label.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub entity_id: EntityId,
    pub tier: LabelTier,
    pub content: LabelContent,
}

/// Instruction for the render surface.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelChange {
    /// Show the label, replacing any label in the same tier.
    Shown(Label),
    /// Move an already visible label.
    Moved {
        entity_id: EntityId,
        tier: LabelTier,
        position: GeoPoint,
    },
    /// Remove the label in this tier.
    Removed { entity_id: EntityId, tier: LabelTier },
}

#[derive(Debug, Clone)]
struct Slot {
    id: EntityId,
    content: LabelContent,
}

impl Slot {
    fn label(&self, tier: LabelTier) -> Label {
        Label {
            entity_id: self.id.clone(),
            tier,
            content: self.content.clone(),
        }
    }
}

/// Label interaction state machine.
#[derive(Debug, Clone, Default)]
pub struct LabelController {
    hovered: Option<Slot>,
    pinned: Option<Slot>,
    pointer_over_entity: bool,
}

impl LabelController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entity with a hover label.
    pub fn hovered(&self) -> Option<&EntityId> {
        self.hovered.as_ref().map(|s| &s.id)
    }

    /// Entity with the pinned label.
    pub fn pinned(&self) -> Option<&EntityId> {
        self.pinned.as_ref().map(|s| &s.id)
    }

    /// True if the last pointer input was over an entity.
    pub fn pointer_over_entity(&self) -> bool {
        self.pointer_over_entity
    }

    /// True if any label refers to `id`.
    pub fn references(&self, id: &EntityId) -> bool {
        self.hovered() == Some(id) || self.pinned() == Some(id)
    }

    /// Currently visible labels, pinned first.
    pub fn visible(&self) -> Vec<Label> {
        let mut labels = Vec::with_capacity(2);
        if let Some(pin) = &self.pinned {
            labels.push(pin.label(LabelTier::Pinned));
        }
        if let Some(hover) = &self.hovered {
            labels.push(hover.label(LabelTier::Hover));
        }
        labels
    }

    /// Pointer entered an entity's marker.
    pub fn pointer_enter(&mut self, id: &EntityId, content: LabelContent) -> Vec<LabelChange> {
        self.pointer_over_entity = true;

        if self.pinned() == Some(id) {
            return Vec::new();
        }

        let mut changes = Vec::new();
        if let Some(old) = self.hovered.take() {
            if &old.id == id {
                self.hovered = Some(old);
                return changes;
            }
            changes.push(removed(old.id, LabelTier::Hover));
        }

        let slot = Slot {
            id: id.clone(),
            content,
        };
        changes.push(LabelChange::Shown(slot.label(LabelTier::Hover)));
        self.hovered = Some(slot);
        changes
    }

    /// Pointer left an entity's marker.
    pub fn pointer_leave(&mut self, id: &EntityId) -> Vec<LabelChange> {
        self.pointer_over_entity = false;

        if self.pinned() == Some(id) || self.hovered() != Some(id) {
            return Vec::new();
        }
        self.clear_hover()
    }

    /// Pointer moved. Clears a stray hover label when not over any entity.
    pub fn pointer_move(&mut self, over_entity: bool) -> Vec<LabelChange> {
        self.pointer_over_entity = over_entity;
        if over_entity {
            return Vec::new();
        }
        self.clear_hover()
    }

    /// Click on an entity (`Some`) or the map background (`None`).
    pub fn click(&mut self, target: Option<(&EntityId, LabelContent)>) -> Vec<LabelChange> {
        let mut changes = self.clear_hover();

        match target {
            None => changes.extend(self.clear_pin()),
            Some((id, _)) if self.pinned() == Some(id) => changes.extend(self.clear_pin()),
            Some((id, content)) => {
                changes.extend(self.clear_pin());
                let slot = Slot {
                    id: id.clone(),
                    content,
                };
                changes.push(LabelChange::Shown(slot.label(LabelTier::Pinned)));
                self.pinned = Some(slot);
            }
        }
        changes
    }

    /// Entity was removed from the map.
    pub fn entity_retired(&mut self, id: &EntityId) -> Vec<LabelChange> {
        let mut changes = Vec::new();
        if self.hovered() == Some(id) {
            changes.extend(self.clear_hover());
        }
        if self.pinned() == Some(id) {
            changes.extend(self.clear_pin());
        }
        changes
    }

    /// Entity's rendered position changed.
    pub fn frame_update(&mut self, id: &EntityId, position: GeoPoint) -> Vec<LabelChange> {
        let mut changes = Vec::new();
        for (slot, tier) in [
            (&mut self.pinned, LabelTier::Pinned),
            (&mut self.hovered, LabelTier::Hover),
        ] {
            if let Some(slot) = slot.as_mut().filter(|s| &s.id == id) {
                slot.content.position = position;
                changes.push(LabelChange::Moved {
                    entity_id: id.clone(),
                    tier,
                    position,
                });
            }
        }
        changes
    }

    /// Entity was updated by a new snapshot; re-show its labels with `content`.
    pub fn refresh(&mut self, id: &EntityId, content: &LabelContent) -> Vec<LabelChange> {
        let mut changes = Vec::new();
        for (slot, tier) in [
            (&mut self.pinned, LabelTier::Pinned),
            (&mut self.hovered, LabelTier::Hover),
        ] {
            if let Some(slot) = slot.as_mut().filter(|s| &s.id == id) {
                if slot.content != *content {
                    slot.content = content.clone();
                    changes.push(LabelChange::Shown(slot.label(tier)));
                }
            }
        }
        changes
    }

    fn clear_hover(&mut self) -> Vec<LabelChange> {
        self.hovered
            .take()
            .map(|s| removed(s.id, LabelTier::Hover))
            .into_iter()
            .collect()
    }

    fn clear_pin(&mut self) -> Vec<LabelChange> {
        self.pinned
            .take()
            .map(|s| removed(s.id, LabelTier::Pinned))
            .into_iter()
            .collect()
    }
}

fn removed(entity_id: EntityId, tier: LabelTier) -> LabelChange {
    LabelChange::Removed { entity_id, tier }
}

/// Label text: `"{line} → {headsign}"` plus `" • {speed} km/h"` when known.
pub fn label_text(line: &str, headsign: Option<&str>, speed_kmh: Option<f64>) -> String {
    let dest = headsign.map(str::trim).filter(|h| !h.is_empty()).unwrap_or("?");
    match speed_kmh.filter(|s| s.is_finite()) {
        Some(speed) => format!("{} → {} • {} km/h", line, dest, speed.round()),
        None => format!("{} → {}", line, dest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EntityId {
        EntityId::from(s)
    }

    fn content(text: &str) -> LabelContent {
        LabelContent::new(GeoPoint::new(59.33, 18.06), text)
    }

    fn shown(changes: &[LabelChange]) -> Vec<(String, LabelTier)> {
        changes
            .iter()
            .filter_map(|c| match c {
                LabelChange::Shown(l) => Some((l.entity_id.to_string(), l.tier)),
                _ => None,
            })
            .collect()
    }

    fn removed_ids(changes: &[LabelChange]) -> Vec<(String, LabelTier)> {
        changes
            .iter()
            .filter_map(|c| match c {
                LabelChange::Removed { entity_id, tier } => Some((entity_id.to_string(), *tier)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_enter_shows_hover_label() {
        let mut labels = LabelController::new();
        let changes = labels.pointer_enter(&id("a"), content("14 → Fruängen"));

        assert_eq!(shown(&changes), vec![("a".to_string(), LabelTier::Hover)]);
        assert_eq!(labels.hovered(), Some(&id("a")));
        assert!(labels.pointer_over_entity());
    }

    #[test]
    fn test_enter_other_replaces_hover() {
        let mut labels = LabelController::new();
        labels.pointer_enter(&id("a"), content("a"));
        let changes = labels.pointer_enter(&id("b"), content("b"));

        assert_eq!(removed_ids(&changes), vec![("a".to_string(), LabelTier::Hover)]);
        assert_eq!(shown(&changes), vec![("b".to_string(), LabelTier::Hover)]);
    }

    #[test]
    fn test_enter_same_hover_is_noop() {
        let mut labels = LabelController::new();
        labels.pointer_enter(&id("a"), content("a"));
        assert!(labels.pointer_enter(&id("a"), content("a")).is_empty());
        assert_eq!(labels.hovered(), Some(&id("a")));
    }

    #[test]
    fn test_enter_on_pinned_is_noop() {
        let mut labels = LabelController::new();
        labels.click(Some((&id("a"), content("a"))));

        assert!(labels.pointer_enter(&id("a"), content("a")).is_empty());
        assert_eq!(labels.hovered(), None);
        assert_eq!(labels.visible().len(), 1);
    }

    #[test]
    fn test_hover_coexists_with_other_pin() {
        let mut labels = LabelController::new();
        labels.click(Some((&id("a"), content("a"))));
        labels.pointer_enter(&id("b"), content("b"));

        let tiers: Vec<_> = labels.visible().into_iter().map(|l| l.tier).collect();
        assert_eq!(tiers, vec![LabelTier::Pinned, LabelTier::Hover]);
    }

    #[test]
    fn test_leave_clears_hover() {
        let mut labels = LabelController::new();
        labels.pointer_enter(&id("a"), content("a"));
        let changes = labels.pointer_leave(&id("a"));

        assert_eq!(removed_ids(&changes), vec![("a".to_string(), LabelTier::Hover)]);
        assert!(labels.visible().is_empty());
    }

    #[test]
    fn test_leave_of_pinned_keeps_pin() {
        let mut labels = LabelController::new();
        labels.click(Some((&id("a"), content("a"))));
        assert!(labels.pointer_leave(&id("a")).is_empty());
        assert_eq!(labels.pinned(), Some(&id("a")));
    }

    #[test]
    fn test_stale_leave_is_noop() {
        let mut labels = LabelController::new();
        labels.pointer_enter(&id("b"), content("b"));
        assert!(labels.pointer_leave(&id("a")).is_empty());
        assert_eq!(labels.hovered(), Some(&id("b")));
    }

    #[test]
    fn test_click_hovered_pins_it() {
        let mut labels = LabelController::new();
        labels.pointer_enter(&id("a"), content("a"));
        let changes = labels.click(Some((&id("a"), content("a"))));

        assert_eq!(removed_ids(&changes), vec![("a".to_string(), LabelTier::Hover)]);
        assert_eq!(shown(&changes), vec![("a".to_string(), LabelTier::Pinned)]);
        assert_eq!(labels.hovered(), None);
        assert_eq!(labels.pinned(), Some(&id("a")));
    }

    #[test]
    fn test_click_pinned_unpins() {
        let mut labels = LabelController::new();
        labels.click(Some((&id("a"), content("a"))));
        let changes = labels.click(Some((&id("a"), content("a"))));

        assert_eq!(removed_ids(&changes), vec![("a".to_string(), LabelTier::Pinned)]);
        assert!(labels.visible().is_empty());
    }

    #[test]
    fn test_click_other_replaces_pin() {
        let mut labels = LabelController::new();
        labels.click(Some((&id("a"), content("a"))));
        let changes = labels.click(Some((&id("b"), content("b"))));

        assert_eq!(removed_ids(&changes), vec![("a".to_string(), LabelTier::Pinned)]);
        assert_eq!(labels.pinned(), Some(&id("b")));
    }

    #[test]
    fn test_background_click_clears_everything() {
        let mut labels = LabelController::new();
        labels.click(Some((&id("a"), content("a"))));
        labels.pointer_enter(&id("b"), content("b"));

        let changes = labels.click(None);

        assert_eq!(changes.len(), 2);
        assert!(labels.visible().is_empty());
    }

    #[test]
    fn test_retire_clears_hover_and_pin() {
        let mut labels = LabelController::new();
        labels.click(Some((&id("a"), content("a"))));
        labels.pointer_enter(&id("b"), content("b"));

        labels.entity_retired(&id("a"));
        assert!(!labels.references(&id("a")));
        assert_eq!(labels.hovered(), Some(&id("b")));

        labels.entity_retired(&id("b"));
        assert!(labels.visible().is_empty());
    }

    #[test]
    fn test_retire_unreferenced_is_noop() {
        let mut labels = LabelController::new();
        labels.pointer_enter(&id("a"), content("a"));
        assert!(labels.entity_retired(&id("z")).is_empty());
    }

    #[test]
    fn test_frame_update_moves_matching_labels() {
        let mut labels = LabelController::new();
        labels.click(Some((&id("a"), content("a"))));
        labels.pointer_enter(&id("b"), content("b"));

        let to = GeoPoint::new(59.4, 18.1);
        let changes = labels.frame_update(&id("a"), to);

        assert_eq!(
            changes,
            vec![LabelChange::Moved {
                entity_id: id("a"),
                tier: LabelTier::Pinned,
                position: to,
            }]
        );
        assert_eq!(labels.visible()[0].content.position, to);
        assert!(labels.frame_update(&id("z"), to).is_empty());
    }

    #[test]
    fn test_pointer_move_failsafe() {
        let mut labels = LabelController::new();
        labels.click(Some((&id("a"), content("a"))));
        labels.pointer_enter(&id("b"), content("b"));

        assert!(labels.pointer_move(true).is_empty());
        let changes = labels.pointer_move(false);

        assert_eq!(removed_ids(&changes), vec![("b".to_string(), LabelTier::Hover)]);
        assert_eq!(labels.pinned(), Some(&id("a")));
        assert!(!labels.pointer_over_entity());
    }

    #[test]
    fn test_refresh_reshows_only_on_change() {
        let mut labels = LabelController::new();
        labels.pointer_enter(&id("a"), content("14 → ?"));

        assert!(labels.refresh(&id("a"), &content("14 → ?")).is_empty());
        let changes = labels.refresh(&id("a"), &content("14 → Fruängen • 48 km/h"));
        assert_eq!(shown(&changes), vec![("a".to_string(), LabelTier::Hover)]);
        assert_eq!(labels.visible()[0].content.text, "14 → Fruängen • 48 km/h");
    }

    #[test]
    fn test_label_text() {
        assert_eq!(label_text("14", Some("Fruängen"), Some(47.6)), "14 → Fruängen • 48 km/h");
        assert_eq!(label_text("17", None, None), "17 → ?");
        assert_eq!(label_text("19", Some("  "), Some(f64::NAN)), "19 → ?");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Input {
            Enter(u8),
            Leave(u8),
            Click(Option<u8>),
            Retire(u8),
            Move(bool),
        }

        fn input() -> impl Strategy<Value = Input> {
            prop_oneof![
                (0u8..4).prop_map(Input::Enter),
                (0u8..4).prop_map(Input::Leave),
                prop::option::of(0u8..4).prop_map(Input::Click),
                (0u8..4).prop_map(Input::Retire),
                any::<bool>().prop_map(Input::Move),
            ]
        }

        proptest! {
            #[test]
            fn test_hover_never_duplicates_pin(inputs in prop::collection::vec(input(), 0..40)) {
                let mut labels = LabelController::new();
                for i in inputs {
                    match i {
                        Input::Enter(n) => { labels.pointer_enter(&id(&n.to_string()), content("x")); }
                        Input::Leave(n) => { labels.pointer_leave(&id(&n.to_string())); }
                        Input::Click(n) => {
                            let target = n.map(|n| id(&n.to_string()));
                            labels.click(target.as_ref().map(|t| (t, content("x"))));
                        }
                        Input::Retire(n) => {
                            let retired = id(&n.to_string());
                            labels.entity_retired(&retired);
                            prop_assert!(!labels.references(&retired));
                        }
                        Input::Move(over) => { labels.pointer_move(over); }
                    }
                    if let (Some(h), Some(p)) = (labels.hovered(), labels.pinned()) {
                        prop_assert_ne!(h, p);
                    }
                }
            }
        }
    }
}
