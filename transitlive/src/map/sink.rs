//! Render port and the sinks shipped with the crate.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::coord::GeoPoint;
use crate::labels::LabelChange;
use crate::snapshot::EntityId;

/// How a marker is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkerShape {
    /// Heading unknown.
    Dot,
    /// Rotated by `bearing` degrees clockwise from north.
    Arrow { bearing: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerStyle {
    pub color: String,
    pub shape: MarkerShape,
    /// Play the one-shot "heading acquired" transition.
    pub pop: bool,
}

/// Full marker state after a snapshot update.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRender {
    pub id: EntityId,
    pub position: GeoPoint,
    pub style: MarkerStyle,
}

/// The drawing surface.
pub trait RenderSink: Send {
    /// Marker created or restyled.
    fn entity_updated(&mut self, render: &EntityRender);

    /// Marker moved by an animation frame.
    fn entity_moved(&mut self, id: &EntityId, position: GeoPoint);

    /// Marker removed.
    fn entity_removed(&mut self, id: &EntityId);

    /// Label shown, moved, or removed.
    fn label_changed(&mut self, change: &LabelChange);
}

/// Sink that writes every render call to the log.
#[derive(Debug, Default)]
pub struct LoggingRenderSink;

impl RenderSink for LoggingRenderSink {
    fn entity_updated(&mut self, render: &EntityRender) {
        debug!(
            id = %render.id,
            position = %render.position,
            color = %render.style.color,
            shape = ?render.style.shape,
            pop = render.style.pop,
            "Marker updated"
        );
    }

    fn entity_moved(&mut self, id: &EntityId, position: GeoPoint) {
        trace!(id = %id, position = %position, "Marker moved");
    }

    fn entity_removed(&mut self, id: &EntityId) {
        debug!(id = %id, "Marker removed");
    }

    fn label_changed(&mut self, change: &LabelChange) {
        match change {
            LabelChange::Shown(label) => {
                debug!(id = %label.entity_id, tier = ?label.tier, text = %label.content.text, "Label shown")
            }
            LabelChange::Moved { entity_id, tier, position } => {
                trace!(id = %entity_id, tier = ?tier, position = %position, "Label moved")
            }
            LabelChange::Removed { entity_id, tier } => {
                debug!(id = %entity_id, tier = ?tier, "Label removed")
            }
        }
    }
}

/// One call received by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    Updated(EntityRender),
    Moved(EntityId, GeoPoint),
    Removed(EntityId),
    Label(LabelChange),
}

/// Sink that records every call, for hosts that batch drawing and for tests.
///
/// Clones share the same event buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<RenderEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<RenderEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl RenderSink for RecordingSink {
    fn entity_updated(&mut self, render: &EntityRender) {
        self.events.lock().push(RenderEvent::Updated(render.clone()));
    }

    fn entity_moved(&mut self, id: &EntityId, position: GeoPoint) {
        self.events.lock().push(RenderEvent::Moved(id.clone(), position));
    }

    fn entity_removed(&mut self, id: &EntityId) {
        self.events.lock().push(RenderEvent::Removed(id.clone()));
    }

    fn label_changed(&mut self, change: &LabelChange) {
        self.events.lock().push(RenderEvent::Label(change.clone()));
    }
}
