//! Entity reconciliation.
//!
//! Each poll delivers a complete, unordered list of vehicle snapshots. The
//! reconciler diffs it against the tracked entity table:
//!
//! - snapshots that are malformed or fail the line filter are discarded
//!   before anything else looks at them
//! - new ids are created at rest at their reported position
//! - known ids get a fresh heading estimate and a tween from wherever the
//!   marker is currently drawn to the new position
//! - tracked ids absent from the batch are retired and their tween cancelled
//!
//! Duplicate ids within one batch resolve to the last entry.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use tracing::debug;

use crate::animation::{AnimationStart, MotionAnimator, Tween};
use crate::coord::{GeoPoint, Projection};
use crate::filter::LineFilter;
use crate::heading::{Heading, HeadingEstimator};
use crate::line::LineId;
use crate::snapshot::{EntityId, VehicleSnapshot};

/// A vehicle currently on the map.
#[derive(Debug)]
pub struct TrackedEntity {
    id: EntityId,
    line: LineId,
    rendered: GeoPoint,
    target: GeoPoint,
    heading: Heading,
    pop: bool,
    tween: Option<Tween>,
    last_snapshot: VehicleSnapshot,
}

impl TrackedEntity {
    /// Feed id, stable across polls.
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Normalized line.
    pub fn line(&self) -> &LineId {
        &self.line
    }

    /// Position the marker is drawn at right now.
    pub fn rendered(&self) -> GeoPoint {
        self.rendered
    }

    /// Position from the latest snapshot.
    pub fn target(&self) -> GeoPoint {
        self.target
    }

    /// Reported or inferred heading; unknown until one is established.
    pub fn heading(&self) -> Heading {
        self.heading
    }

    /// True if the latest update established the heading for the first time.
    pub fn pop(&self) -> bool {
        self.pop
    }

    /// True while this marker has a tween in flight.
    pub fn is_animating(&self) -> bool {
        self.tween.is_some()
    }

    /// The in-flight tween, if any.
    pub fn tween(&self) -> Option<&Tween> {
        self.tween.as_ref()
    }

    /// Latest accepted snapshot; labels read from it.
    pub fn last_snapshot(&self) -> &VehicleSnapshot {
        &self.last_snapshot
    }

    fn last_position(&self) -> GeoPoint {
        GeoPoint::new(self.last_snapshot.lat, self.last_snapshot.lon)
    }
}

/// Outcome of one reconcile cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<EntityId>,
    pub updated: Vec<EntityId>,
    pub retired: Vec<EntityId>,
    /// Snapshots discarded as malformed.
    pub dropped: usize,
    /// Valid snapshots hidden by the line filter.
    pub filtered: usize,
}

impl ReconcileReport {
    /// True if no entity was touched.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.retired.is_empty()
    }
}

/// A snapshot that passed validation.
struct Accepted<'a> {
    snapshot: &'a VehicleSnapshot,
    position: GeoPoint,
    line: LineId,
}

/// Owns the tracked entity table.
#[derive(Debug)]
pub struct EntityReconciler {
    entities: BTreeMap<EntityId, TrackedEntity>,
    estimator: HeadingEstimator,
    animator: MotionAnimator,
    last_batch: Vec<VehicleSnapshot>,
}

impl EntityReconciler {
    /// Empty table.
    pub fn new(estimator: HeadingEstimator, animator: MotionAnimator) -> Self {
        Self {
            entities: BTreeMap::new(),
            estimator,
            animator,
            last_batch: Vec::new(),
        }
    }

    /// Looks up a tracked entity by id.
    pub fn get(&self, id: &str) -> Option<&TrackedEntity> {
        self.entities.get(id)
    }

    /// Tracked entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = &TrackedEntity> {
        self.entities.values()
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// True while any entity has a tween in flight.
    pub fn is_animating(&self) -> bool {
        self.animator.is_animating()
    }

    /// Apply one batch of snapshots.
    pub fn reconcile(
        &mut self,
        snapshots: Vec<VehicleSnapshot>,
        now: Instant,
        projection: &dyn Projection,
        filter: &mut LineFilter,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let accepted = accept(&snapshots, filter, &mut report);

        for (id, item) in &accepted {
            if self.entities.contains_key(id) {
                self.update(id, item, now, projection);
                report.updated.push(id.clone());
            } else {
                self.create(item);
                report.created.push(id.clone());
            }
        }

        let stale: Vec<EntityId> = self
            .entities
            .keys()
            .filter(|id| !accepted.contains_key(*id))
            .cloned()
            .collect();
        for id in stale {
            self.retire(&id);
            report.retired.push(id);
        }

        debug!(
            created = report.created.len(),
            updated = report.updated.len(),
            retired = report.retired.len(),
            dropped = report.dropped,
            filtered = report.filtered,
            "Reconciled snapshot batch"
        );

        drop(accepted);
        self.last_batch = snapshots;
        report
    }

    /// Re-apply the line filter to the last batch without a new poll.
    ///
    /// Entities now hidden are retired; entities now visible are created at
    /// rest. Entities that stay visible are left untouched.
    pub fn refilter(&mut self, filter: &mut LineFilter) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let batch = std::mem::take(&mut self.last_batch);
        let accepted = accept(&batch, filter, &mut report);

        let hidden: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| !filter.passes(&e.line))
            .map(|e| e.id.clone())
            .collect();
        for id in hidden {
            self.retire(&id);
            report.retired.push(id);
        }

        for (id, item) in &accepted {
            if !self.entities.contains_key(id) {
                self.create(item);
                report.created.push(id.clone());
            }
        }

        debug!(
            created = report.created.len(),
            retired = report.retired.len(),
            "Re-applied line filter"
        );

        drop(accepted);
        self.last_batch = batch;
        report
    }

    /// Advance every tween to `now`.
    ///
    /// Calls `on_frame(id, position, finished)` for each animating entity and
    /// returns how many frames were produced.
    pub fn tick<F>(&mut self, now: Instant, mut on_frame: F) -> usize
    where
        F: FnMut(&EntityId, GeoPoint, bool),
    {
        let mut frames = 0;
        for entity in self.entities.values_mut() {
            if let Some(frame) = self.animator.step(&mut entity.tween, now, |_| {}) {
                entity.rendered = frame.position;
                on_frame(&entity.id, frame.position, frame.finished);
                frames += 1;
            }
        }
        frames
    }

    /// Retire every entity.
    pub fn clear(&mut self) -> Vec<EntityId> {
        let ids: Vec<EntityId> = self.entities.keys().cloned().collect();
        for id in &ids {
            self.retire(id);
        }
        ids
    }

    fn create(&mut self, item: &Accepted<'_>) {
        let heading = self.estimator.estimate(
            &item.position,
            item.snapshot.bearing_deg,
            None,
            Heading::unknown(),
        );

        let entity = TrackedEntity {
            id: item.snapshot.id.clone(),
            line: item.line.clone(),
            rendered: item.position,
            target: item.position,
            heading,
            pop: false,
            tween: None,
            last_snapshot: item.snapshot.clone(),
        };
        self.entities.insert(entity.id.clone(), entity);
    }

    fn update(&mut self, id: &EntityId, item: &Accepted<'_>, now: Instant, projection: &dyn Projection) {
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };

        let previous = entity.last_position();
        let heading = self.estimator.estimate(
            &item.position,
            item.snapshot.bearing_deg,
            Some(&previous),
            entity.heading,
        );
        entity.pop = heading.established && !entity.heading.established;
        entity.heading = heading;

        // A superseded tween hands over wherever it is now, framed or not.
        let from = entity
            .tween
            .as_ref()
            .map_or(entity.rendered, |tween| tween.position_at(now));
        entity.rendered = from;
        let duration = self.animator.duration_for(projection, &from, &item.position);
        if let AnimationStart::Committed =
            self.animator
                .animate(&mut entity.tween, from, item.position, duration, now)
        {
            entity.rendered = item.position;
        }

        entity.target = item.position;
        entity.line = item.line.clone();
        entity.last_snapshot = item.snapshot.clone();
    }

    fn retire(&mut self, id: &EntityId) {
        if let Some(mut entity) = self.entities.remove(id) {
            self.animator.cancel(&mut entity.tween);
        }
    }
}

/// Validate, observe, and filter a batch. Later duplicates replace earlier ones.
fn accept<'a>(
    snapshots: &'a [VehicleSnapshot],
    filter: &mut LineFilter,
    report: &mut ReconcileReport,
) -> BTreeMap<EntityId, Accepted<'a>> {
    let mut accepted = BTreeMap::new();
    let mut hidden = BTreeSet::new();

    for snapshot in snapshots {
        let Some((position, line)) = validate(snapshot) else {
            report.dropped += 1;
            continue;
        };

        filter.observe(&line);
        if !filter.passes(&line) {
            hidden.insert(snapshot.id.clone());
            accepted.remove(&snapshot.id);
            continue;
        }

        hidden.remove(&snapshot.id);
        accepted.insert(
            snapshot.id.clone(),
            Accepted {
                snapshot,
                position,
                line,
            },
        );
    }

    report.filtered = hidden.len();
    accepted
}

fn validate(snapshot: &VehicleSnapshot) -> Option<(GeoPoint, LineId)> {
    if snapshot.id.as_str().trim().is_empty() {
        return None;
    }
    let position = GeoPoint::checked(snapshot.lat, snapshot.lon).ok()?;
    let line = LineId::parse(&snapshot.line)?;
    Some((position, line))
}
