//! The map context: entities, labels, filter, and the render port.
//!
//! [`TransitMap`] is the one object a host drives. It owns all engine state;
//! there are no globals. Every input method pushes the resulting drawing
//! instructions to the [`RenderSink`] before returning.
//!
//! ```text
//! apply_snapshots ──► reconciler ──► sink.entity_updated / entity_removed
//!                                └─► labels.refresh / entity_retired ──► sink.label_changed
//! tick ──► reconciler.tick ──► sink.entity_moved
//!                          └─► labels.frame_update ──► sink.label_changed
//! ```

mod sink;

pub use sink::{
    EntityRender, LoggingRenderSink, MarkerShape, MarkerStyle, RecordingSink, RenderEvent,
    RenderSink,
};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::info;

use crate::animation::{MotionAnimator, TokenFrameScheduler};
use crate::config::{ConfigError, MapConfig};
use crate::coord::{Projection, WebMercator};
use crate::filter::{LineFilter, Selection};
use crate::labels::{label_text, LabelChange, LabelContent, LabelController};
use crate::line::{LineCatalog, LineId};
use crate::reconciler::{EntityReconciler, ReconcileReport, TrackedEntity};
use crate::snapshot::{EntityId, VehicleSnapshot};
use crate::store::KeyValueStore;

/// Live transit map state.
pub struct TransitMap {
    reconciler: EntityReconciler,
    labels: LabelController,
    filter: LineFilter,
    projection: Box<dyn Projection + Send>,
    sink: Box<dyn RenderSink>,
    frame_waker: Arc<Notify>,
    poll_interval: Duration,
    frame_interval: Duration,
}

impl std::fmt::Debug for TransitMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitMap")
            .field("entities", &self.reconciler.len())
            .field("labels", &self.labels)
            .field("selection", self.filter.selection())
            .finish_non_exhaustive()
    }
}

impl TransitMap {
    /// Build a map from configuration, restoring the line selection from `store`.
    pub fn new(
        config: &MapConfig,
        store: Box<dyn KeyValueStore>,
        sink: Box<dyn RenderSink>,
    ) -> Result<Self, ConfigError> {
        let projection = WebMercator::new(config.zoom)?;

        let scheduler = TokenFrameScheduler::new();
        let frame_waker = scheduler.waker();
        let animator = MotionAnimator::with_scheduler(config.duration_policy(), Box::new(scheduler))
            .with_commit_epsilon(config.commit_epsilon_deg);

        let filter = LineFilter::load(LineCatalog::new(config.modes.clone()), store);

        info!(
            zoom = config.zoom,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            modes = config.modes.len(),
            "Transit map ready"
        );

        Ok(Self {
            reconciler: EntityReconciler::new(config.heading_estimator(), animator),
            labels: LabelController::new(),
            filter,
            projection: Box::new(projection),
            sink,
            frame_waker,
            poll_interval: config.poll_interval,
            frame_interval: config.frame_interval,
        })
    }

    pub fn entity(&self, id: &str) -> Option<&TrackedEntity> {
        self.reconciler.get(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &TrackedEntity> {
        self.reconciler.entities()
    }

    pub fn len(&self) -> usize {
        self.reconciler.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reconciler.is_empty()
    }

    pub fn labels(&self) -> &LabelController {
        &self.labels
    }

    pub fn filter(&self) -> &LineFilter {
        &self.filter
    }

    pub fn is_animating(&self) -> bool {
        self.reconciler.is_animating()
    }

    /// Notified when the first tween starts after an idle period.
    pub fn frame_waker(&self) -> Arc<Notify> {
        Arc::clone(&self.frame_waker)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Apply one poll's snapshots.
    pub fn apply_snapshots(&mut self, snapshots: Vec<VehicleSnapshot>, now: Instant) -> ReconcileReport {
        let report = self
            .reconciler
            .reconcile(snapshots, now, self.projection.as_ref(), &mut self.filter);
        self.publish(&report);
        report
    }

    /// Advance animations to `now`. Returns the number of frames drawn.
    pub fn tick(&mut self, now: Instant) -> usize {
        let sink = &mut self.sink;
        let labels = &mut self.labels;
        self.reconciler.tick(now, |id, position, _finished| {
            sink.entity_moved(id, position);
            for change in labels.frame_update(id, position) {
                sink.label_changed(&change);
            }
        })
    }

    /// Flip one line in the filter and apply it to the current entities.
    ///
    /// Returns `None` if `line` is blank.
    pub fn toggle_line(&mut self, line: &str) -> Option<&Selection> {
        let line = LineId::parse(line)?;
        self.filter.toggle(&line);
        info!(line = %line, visible = self.filter.passes(&line), "Line toggled");
        self.refilter();
        Some(self.filter.selection())
    }

    /// Select or deselect every line of a mode. Returns false for an unknown mode.
    pub fn set_mode(&mut self, mode: &str, selected: bool) -> bool {
        if self.filter.set_mode(mode, selected).is_none() {
            return false;
        }
        info!(mode, selected, "Mode toggled");
        self.refilter();
        true
    }

    /// Remove all line filtering.
    pub fn show_all(&mut self) {
        self.filter.show_all();
        self.refilter();
    }

    /// Pointer entered a marker. Unknown ids are ignored.
    pub fn pointer_enter(&mut self, id: &str) {
        let Some((id, content)) = self.label_target(id) else {
            return;
        };
        let changes = self.labels.pointer_enter(&id, content);
        self.emit_labels(changes);
    }

    /// Pointer left a marker.
    pub fn pointer_leave(&mut self, id: &str) {
        let changes = self.labels.pointer_leave(&EntityId::from(id));
        self.emit_labels(changes);
    }

    /// Pointer moved over the map.
    pub fn pointer_move(&mut self, over_entity: bool) {
        let changes = self.labels.pointer_move(over_entity);
        self.emit_labels(changes);
    }

    /// Click on a marker (`Some`) or the background (`None`). Clicks on
    /// unknown ids are ignored.
    pub fn click(&mut self, id: Option<&str>) {
        let changes = match id {
            None => self.labels.click(None),
            Some(id) => {
                let Some((id, content)) = self.label_target(id) else {
                    return;
                };
                self.labels.click(Some((&id, content)))
            }
        };
        self.emit_labels(changes);
    }

    /// Retire every entity.
    pub fn clear(&mut self) {
        let retired = self.reconciler.clear();
        self.publish(&ReconcileReport {
            retired,
            ..Default::default()
        });
    }

    fn refilter(&mut self) {
        let report = self.reconciler.refilter(&mut self.filter);
        self.publish(&report);
    }

    fn publish(&mut self, report: &ReconcileReport) {
        for id in &report.retired {
            self.sink.entity_removed(id);
            for change in self.labels.entity_retired(id) {
                self.sink.label_changed(&change);
            }
        }

        for id in report.created.iter().chain(&report.updated) {
            let Some(entity) = self.reconciler.get(id.as_str()) else {
                continue;
            };
            self.sink.entity_updated(&render_for(entity, self.filter.catalog()));
            for change in self.labels.refresh(id, &label_content(entity)) {
                self.sink.label_changed(&change);
            }
        }
    }

    fn label_target(&self, id: &str) -> Option<(EntityId, LabelContent)> {
        let entity = self.reconciler.get(id)?;
        Some((entity.id().clone(), label_content(entity)))
    }

    fn emit_labels(&mut self, changes: Vec<LabelChange>) {
        for change in &changes {
            self.sink.label_changed(change);
        }
    }
}

fn render_for(entity: &TrackedEntity, catalog: &LineCatalog) -> EntityRender {
    let heading = entity.heading();
    let shape = match heading.bearing {
        Some(bearing) if heading.established => MarkerShape::Arrow { bearing },
        _ => MarkerShape::Dot,
    };

    EntityRender {
        id: entity.id().clone(),
        position: entity.rendered(),
        style: MarkerStyle {
            color: catalog.color_for(entity.line()).to_string(),
            shape,
            pop: entity.pop(),
        },
    }
}

fn label_content(entity: &TrackedEntity) -> LabelContent {
    let snapshot = entity.last_snapshot();
    LabelContent::new(
        entity.rendered(),
        label_text(
            entity.line().as_str(),
            snapshot.headsign.as_deref(),
            snapshot.valid_speed(),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelTier;
    use crate::line::TransitMode;
    use crate::store::MemoryStore;

    fn map() -> (TransitMap, RecordingSink) {
        let sink = RecordingSink::new();
        let config = MapConfig::default()
            .with_mode(TransitMode::new("metro blue", "#2F80ED", ["10", "11"]));
        let map = TransitMap::new(&config, Box::new(MemoryStore::new()), Box::new(sink.clone())).unwrap();
        (map, sink)
    }

    fn updates(events: &[RenderEvent]) -> Vec<&EntityRender> {
        events
            .iter()
            .filter_map(|e| match e {
                RenderEvent::Updated(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_invalid_zoom_rejected() {
        let config = MapConfig::default().with_zoom(40.0);
        let result = TransitMap::new(&config, Box::new(MemoryStore::new()), Box::new(RecordingSink::new()));
        assert!(matches!(result, Err(ConfigError::Projection(_))));
    }

    #[test]
    fn test_created_marker_is_dot_until_heading_known() {
        let (mut map, sink) = map();
        let t0 = Instant::now();

        map.apply_snapshots(vec![VehicleSnapshot::new("t1", 59.334, 18.060, "14")], t0);
        let events = sink.take();
        let first = updates(&events);
        assert_eq!(first[0].style.shape, MarkerShape::Dot);
        assert_eq!(first[0].style.color, "#2F80ED");
        assert!(!first[0].style.pop);

        map.apply_snapshots(vec![VehicleSnapshot::new("t1", 59.335, 18.061, "14")], t0);
        let events = sink.take();
        let second = updates(&events);
        assert!(matches!(second[0].style.shape, MarkerShape::Arrow { .. }));
        assert!(second[0].style.pop);
    }

    #[test]
    fn test_tick_moves_marker_and_pinned_label() {
        let (mut map, sink) = map();
        let t0 = Instant::now();

        map.apply_snapshots(vec![VehicleSnapshot::new("t1", 59.334, 18.060, "14")], t0);
        map.click(Some("t1"));
        map.apply_snapshots(vec![VehicleSnapshot::new("t1", 59.335, 18.061, "14")], t0);
        sink.take();

        let frames = map.tick(t0 + Duration::from_secs(5));
        assert_eq!(frames, 1);

        let events = sink.take();
        let target = crate::coord::GeoPoint::new(59.335, 18.061);
        assert!(events.contains(&RenderEvent::Moved(EntityId::from("t1"), target)));
        assert!(events.contains(&RenderEvent::Label(LabelChange::Moved {
            entity_id: EntityId::from("t1"),
            tier: LabelTier::Pinned,
            position: target,
        })));
    }

    #[test]
    fn test_retirement_removes_marker_and_labels() {
        let (mut map, sink) = map();
        let t0 = Instant::now();

        map.apply_snapshots(vec![VehicleSnapshot::new("t2", 59.343, 18.020, "17")], t0);
        map.pointer_enter("t2");
        sink.take();

        map.apply_snapshots(Vec::new(), t0);

        let events = sink.take();
        assert!(events.contains(&RenderEvent::Removed(EntityId::from("t2"))));
        assert!(events.contains(&RenderEvent::Label(LabelChange::Removed {
            entity_id: EntityId::from("t2"),
            tier: LabelTier::Hover,
        })));
        assert!(map.labels().visible().is_empty());
    }

    #[test]
    fn test_toggle_line_hides_entity_immediately() {
        let (mut map, sink) = map();
        map.apply_snapshots(
            vec![
                VehicleSnapshot::new("t1", 59.334, 18.060, "14"),
                VehicleSnapshot::new("t2", 59.343, 18.020, "17"),
            ],
            Instant::now(),
        );
        sink.take();

        map.toggle_line("14");

        assert!(map.entity("t1").is_none());
        assert!(map.entity("t2").is_some());
        assert_eq!(sink.take(), vec![RenderEvent::Removed(EntityId::from("t1"))]);

        map.toggle_line("14");
        assert!(map.entity("t1").is_some());
        assert!(map.toggle_line("  ").is_none());
    }

    #[test]
    fn test_set_mode_and_show_all() {
        let (mut map, _sink) = map();
        map.apply_snapshots(
            vec![
                VehicleSnapshot::new("b1", 59.3, 18.0, "10"),
                VehicleSnapshot::new("g1", 59.3, 18.1, "17"),
            ],
            Instant::now(),
        );

        assert!(map.set_mode("metro blue", false));
        assert!(map.entity("b1").is_none());
        assert!(map.entity("g1").is_some());
        assert!(!map.set_mode("ferry", false));

        map.show_all();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_label_text_refreshes_on_update() {
        let (mut map, sink) = map();
        let t0 = Instant::now();
        map.apply_snapshots(vec![VehicleSnapshot::new("t1", 59.334, 18.060, "14")], t0);
        map.pointer_enter("t1");
        assert_eq!(map.labels().visible()[0].content.text, "14 → ?");
        sink.take();

        map.apply_snapshots(
            vec![VehicleSnapshot::new("t1", 59.334, 18.060, "14")
                .with_headsign("Fruängen")
                .with_speed(48.0)],
            t0,
        );
        assert_eq!(map.labels().visible()[0].content.text, "14 → Fruängen • 48 km/h");
    }

    #[test]
    fn test_input_for_unknown_entity_is_ignored() {
        let (mut map, sink) = map();
        map.pointer_enter("ghost");
        map.click(Some("ghost"));
        map.pointer_leave("ghost");
        assert!(sink.is_empty());
        assert!(map.labels().visible().is_empty());
    }

    #[test]
    fn test_clear_removes_everything() {
        let (mut map, sink) = map();
        map.apply_snapshots(vec![VehicleSnapshot::new("t1", 59.334, 18.060, "14")], Instant::now());
        map.click(Some("t1"));
        sink.take();

        map.clear();
        assert!(map.is_empty());
        assert!(map.labels().pinned().is_none());
        assert_eq!(sink.take().len(), 2);
    }
}
