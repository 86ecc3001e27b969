//! Translation of scene lifecycle events into navigation mesh regeneration

use crate::config::{DynamicObstacleConfig, MeshFilter};
use crate::jobs::MeshRegenerator;
use crate::lifecycle::LifecycleObserver;
use crate::registry::DynamicObstacleRegistry;
use crate::request::{UpdateKind, UpdateRequest};
use crate::scheduler::{CompletedRegeneration, EnqueueOutcome, RegenerationScheduler};
use crate::spatial_index::SpatialIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use walkabout_common::{Aabb, Error, MeshId, ObjectId, Result};
use web_time::Instant;

/// Routes dynamic obstacle changes to the navigation meshes they affect
///
/// The dispatcher owns the object registry, the mesh index and the
/// regeneration scheduler. Lifecycle entry points never fail: unknown objects
/// and other problems are logged and counted, and the call becomes a no-op.
pub struct NavMeshUpdateDispatcher {
    config: DynamicObstacleConfig,
    registry: DynamicObstacleRegistry,
    index: SpatialIndex,
    scheduler: RegenerationScheduler,
    regenerator: Box<dyn MeshRegenerator>,
    counters: EventCounters,
}

#[derive(Debug, Clone, Copy, Default)]
struct EventCounters {
    events: u64,
    requests: u64,
    cancelled: u64,
    not_registered: u64,
}

/// Result of one [`NavMeshUpdateDispatcher::update`] pump
#[derive(Debug, Default)]
pub struct UpdateSummary {
    pub completed: Vec<CompletedRegeneration>,
    /// Number of regenerations started during this update
    pub started: usize,
}

impl UpdateSummary {
    pub fn is_idle(&self) -> bool {
        self.completed.is_empty() && self.started == 0
    }
}

/// Statistics about the dispatcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStatistics {
    /// Live dynamic objects
    pub objects: usize,
    /// Objects whose current bounds are not yet in a finished regeneration
    pub dirty_objects: usize,
    pub meshes: usize,
    pub pending_meshes: usize,
    pub regenerating_meshes: usize,
    /// Lifecycle events received
    pub events: u64,
    /// Per-mesh requests handed to the scheduler
    pub requests: u64,
    /// Pending adds withdrawn by a removal
    pub cancelled: u64,
    /// Events for unknown objects
    pub not_registered: u64,
    pub regenerations_started: u64,
    pub regenerations_succeeded: u64,
    pub regenerations_failed: u64,
    /// Completions ignored because their mesh was unregistered or replaced
    pub stale_completions: u64,
}

impl NavMeshUpdateDispatcher {
    /// Create a new dispatcher
    pub fn new(config: DynamicObstacleConfig, regenerator: Box<dyn MeshRegenerator>) -> Result<Self> {
        config.validate().map_err(Error::InvalidConfig)?;

        let index = SpatialIndex::with_filter(config.grid_cell_size, config.mesh_filter);
        let scheduler = RegenerationScheduler::new(config.batch_window(), config.retry_interval());
        log::debug!(
            "Dynamic obstacle dispatcher created with {} (window {:?}, filter {:?})",
            regenerator.description(),
            config.batch_window(),
            config.mesh_filter
        );

        Ok(Self {
            config,
            registry: DynamicObstacleRegistry::new(),
            index,
            scheduler,
            regenerator,
            counters: EventCounters::default(),
        })
    }

    pub fn with_regenerator<R>(config: DynamicObstacleConfig, regenerator: R) -> Result<Self>
    where
        R: MeshRegenerator + 'static,
    {
        Self::new(config, Box::new(regenerator))
    }

    /// Registers a navigation mesh, replacing it if the id is already known.
    ///
    /// Replacing a mesh drops its pending batch; a regeneration still running
    /// for the old registration is ignored when it completes.
    pub fn register_mesh(&mut self, mesh: MeshId, bounds: Aabb) -> Result<()> {
        if !bounds.is_valid() {
            return Err(Error::InvalidBounds(format!(
                "{} has bounds {} which are not a finite, ordered box",
                mesh, bounds
            )));
        }

        if let Some(previous) = self.index.register(mesh, bounds) {
            log::info!("Re-registered {} ({} -> {})", mesh, previous, bounds);
        } else {
            log::info!("Registered {} over {}", mesh, bounds);
        }
        self.scheduler.add_mesh(mesh);
        Ok(())
    }

    pub fn unregister_mesh(&mut self, mesh: MeshId) -> Result<()> {
        self.index.unregister(mesh)?;
        if let Some(state) = self.scheduler.remove_mesh(mesh) {
            log::info!("Unregistered {} while {:?}", mesh, state);
        }
        Ok(())
    }

    /// Called by the scene when an object enters it
    pub fn object_added(&mut self, object: ObjectId, bounds: Aabb) {
        self.object_added_at(object, bounds, Instant::now());
    }

    /// Called by the scene before an object is purged
    pub fn object_will_be_removed(&mut self, object: ObjectId) {
        self.object_will_be_removed_at(object, Instant::now());
    }

    /// Called by the scene when a live object changes bounds
    pub fn object_moved(&mut self, object: ObjectId, bounds: Aabb) {
        self.object_moved_at(object, bounds, Instant::now());
    }

    pub fn object_added_at(&mut self, object: ObjectId, bounds: Aabb, now: Instant) {
        let result = self.handle_added(object, bounds, now);
        self.report(object, result);
    }

    pub fn object_will_be_removed_at(&mut self, object: ObjectId, now: Instant) {
        let result = self.handle_removing(object, now);
        self.report(object, result);
    }

    pub fn object_moved_at(&mut self, object: ObjectId, bounds: Aabb, now: Instant) {
        let result = self.handle_moved(object, bounds, now);
        self.report(object, result);
    }

    fn report(&mut self, object: ObjectId, result: Result<Vec<(MeshId, EnqueueOutcome)>>) {
        if let Err(e) = result {
            if e.is_not_registered() {
                self.counters.not_registered += 1;
                log::warn!("Ignoring lifecycle event for {}: {}", object, e);
            } else {
                log::error!("Failed to handle lifecycle event for {}: {}", object, e);
            }
        }
    }

    /// Registers the object and queues every mesh its bounds overlap.
    ///
    /// Returns what the scheduler did for each affected mesh.
    pub fn handle_added(
        &mut self,
        object: ObjectId,
        bounds: Aabb,
        now: Instant,
    ) -> Result<Vec<(MeshId, EnqueueOutcome)>> {
        self.counters.events += 1;
        let bounds = Aabb::try_new(bounds.min, bounds.max)?;

        self.registry.on_object_added(object, bounds);
        let region = self.padded(&bounds);
        let meshes = self.index.meshes_overlapping(&region);

        let outcomes = self.enqueue_all(&meshes, object, region, UpdateKind::Added, now);
        self.settle(object);
        Ok(outcomes)
    }

    pub fn handle_moved(
        &mut self,
        object: ObjectId,
        bounds: Aabb,
        now: Instant,
    ) -> Result<Vec<(MeshId, EnqueueOutcome)>> {
        self.counters.events += 1;
        let bounds = Aabb::try_new(bounds.min, bounds.max)?;

        let previous = self.registry.on_object_moved(object, bounds)?;
        if !self.config.track_moves {
            self.registry.mark_clean(object);
            return Ok(Vec::new());
        }

        let old_region = self.padded(&previous);
        let new_region = self.padded(&bounds);
        let mut meshes = self.index.meshes_overlapping(&old_region);
        meshes.extend(self.index.meshes_overlapping(&new_region));

        // Until a regeneration has read the object, no mesh contains it and
        // the move is still an add that a removal can withdraw
        let kind = if self.registry.is_built(object)
            || self.scheduler.is_regenerating_object(object)
        {
            UpdateKind::Moved
        } else {
            UpdateKind::Added
        };

        let region = old_region.union(&new_region);
        let outcomes = self.enqueue_all(&meshes, object, region, kind, now);
        self.settle(object);
        Ok(outcomes)
    }

    /// Purges the object and queues the meshes it covered.
    ///
    /// The region comes from the registry record, which still holds the
    /// bounds the object had before removal. Meshes with a pending change
    /// from the object are included so their contribution can be withdrawn.
    pub fn handle_removing(
        &mut self,
        object: ObjectId,
        now: Instant,
    ) -> Result<Vec<(MeshId, EnqueueOutcome)>> {
        self.counters.events += 1;

        let removed = self.registry.on_object_removing(object)?;
        let region = self.padded(&removed.bounds);
        let mut meshes = self.index.meshes_overlapping(&region);
        meshes.extend(self.scheduler.meshes_referencing(object));

        Ok(self.enqueue_all(&meshes, object, region, UpdateKind::PendingRemoval, now))
    }

    fn padded(&self, bounds: &Aabb) -> Aabb {
        if self.config.region_margin > 0.0 {
            bounds.expanded(self.config.region_margin)
        } else {
            *bounds
        }
    }

    fn enqueue_all(
        &mut self,
        meshes: &BTreeSet<MeshId>,
        object: ObjectId,
        region: Aabb,
        kind: UpdateKind,
        now: Instant,
    ) -> Vec<(MeshId, EnqueueOutcome)> {
        let mut outcomes = Vec::with_capacity(meshes.len());

        for &mesh in meshes {
            let request = UpdateRequest::new(mesh, region, object, kind);
            match self.scheduler.enqueue(request, now) {
                Ok(outcome) => {
                    if outcome == EnqueueOutcome::Cancelled {
                        self.counters.cancelled += 1;
                    } else {
                        self.counters.requests += 1;
                    }
                    outcomes.push((mesh, outcome));
                }
                Err(e) => log::warn!("Dropped {}: {}", request.description(), e),
            }
        }

        if outcomes.is_empty() {
            log::debug!("{:?} of object {} affects no navigation mesh", kind, object);
        }
        outcomes
    }

    /// Objects with nothing queued or running are already reflected in the
    /// meshes
    fn settle(&mut self, object: ObjectId) {
        if !self.scheduler.references_object(object) {
            self.registry.mark_clean(object);
        }
    }

    /// Per-frame pump using the current time
    pub fn update(&mut self) -> UpdateSummary {
        self.update_at(Instant::now())
    }

    /// Applies finished regenerations, then starts expired batches and due
    /// retries
    pub fn update_at(&mut self, now: Instant) -> UpdateSummary {
        let completed = self.scheduler.process_completions(now);
        for regeneration in &completed {
            for &object in &regeneration.objects {
                self.registry.mark_built(object);
            }
        }
        if !completed.is_empty() {
            self.settle_objects();
        }

        let started = self.scheduler.poll(now, self.regenerator.as_mut());
        UpdateSummary { completed, started }
    }

    fn settle_objects(&mut self) {
        let settled: Vec<ObjectId> = self
            .registry
            .objects()
            .filter(|object| object.dirty && !self.scheduler.references_object(object.id))
            .filter(|object| {
                !self
                    .index
                    .meshes_overlapping(&self.padded(&object.bounds))
                    .into_iter()
                    .any(|mesh| self.scheduler.has_retry_debt(mesh))
            })
            .map(|object| object.id)
            .collect();

        for id in settled {
            self.registry.mark_clean(id);
        }
    }

    /// Starts every pending batch now
    pub fn flush(&mut self) -> usize {
        self.flush_at(Instant::now())
    }

    pub fn flush_at(&mut self, now: Instant) -> usize {
        self.scheduler.flush(now, self.regenerator.as_mut())
    }

    pub fn set_mesh_filter(&mut self, filter: MeshFilter) {
        self.config.mesh_filter = filter;
        self.index.set_filter(filter);
    }

    pub fn has_pending_updates(&self) -> bool {
        self.scheduler.pending_count() > 0 || self.scheduler.regenerating_count() > 0
    }

    pub fn statistics(&self) -> DispatcherStatistics {
        let scheduler = self.scheduler.statistics();

        DispatcherStatistics {
            objects: self.registry.len(),
            dirty_objects: self.registry.dirty_count(),
            meshes: self.index.len(),
            pending_meshes: self.scheduler.pending_count(),
            regenerating_meshes: self.scheduler.regenerating_count(),
            events: self.counters.events,
            requests: self.counters.requests,
            cancelled: self.counters.cancelled,
            not_registered: self.counters.not_registered,
            regenerations_started: scheduler.started,
            regenerations_succeeded: scheduler.succeeded,
            regenerations_failed: scheduler.failed,
            stale_completions: scheduler.stale,
        }
    }

    pub fn config(&self) -> &DynamicObstacleConfig {
        &self.config
    }

    pub fn registry(&self) -> &DynamicObstacleRegistry {
        &self.registry
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn scheduler(&self) -> &RegenerationScheduler {
        &self.scheduler
    }
}

impl LifecycleObserver for NavMeshUpdateDispatcher {
    fn on_add(&mut self, object: ObjectId, bounds: Aabb) {
        self.object_added(object, bounds);
    }

    fn on_remove(&mut self, object: ObjectId) {
        self.object_will_be_removed(object);
    }

    fn on_move(&mut self, object: ObjectId, bounds: Aabb) {
        self.object_moved(object, bounds);
    }

    fn name(&self) -> &str {
        "navmesh update dispatcher"
    }
}

impl std::fmt::Debug for NavMeshUpdateDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavMeshUpdateDispatcher")
            .field("config", &self.config)
            .field("regenerator", &self.regenerator.description())
            .field("statistics", &self.statistics())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{flat, SharedRecorder};

    fn dispatcher() -> (NavMeshUpdateDispatcher, SharedRecorder) {
        let recorder = SharedRecorder::new();
        let dispatcher = NavMeshUpdateDispatcher::with_regenerator(
            DynamicObstacleConfig::default(),
            recorder.clone(),
        )
        .unwrap();
        (dispatcher, recorder)
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = DynamicObstacleConfig::default().with_grid_cell_size(0.0);
        let result = NavMeshUpdateDispatcher::with_regenerator(config, SharedRecorder::new());
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_register_rejects_inverted_bounds() {
        let (mut dispatcher, _) = dispatcher();
        let bounds = flat(10.0, 10.0, 0.0, 0.0);

        let err = dispatcher.register_mesh(MeshId(1), bounds).unwrap_err();
        assert!(matches!(err, Error::InvalidBounds(_)));
        assert_eq!(dispatcher.statistics().meshes, 0);
    }

    #[test]
    fn test_added_object_queues_overlapping_mesh() {
        let (mut dispatcher, _) = dispatcher();
        dispatcher.register_mesh(MeshId(1), flat(0.0, 0.0, 10.0, 10.0)).unwrap();
        dispatcher.register_mesh(MeshId(2), flat(50.0, 50.0, 60.0, 60.0)).unwrap();

        let outcomes = dispatcher
            .handle_added(ObjectId(1), flat(1.0, 1.0, 2.0, 2.0), Instant::now())
            .unwrap();

        assert_eq!(outcomes, vec![(MeshId(1), EnqueueOutcome::Opened)]);
        assert!(dispatcher.registry().is_dirty(ObjectId(1)));
        assert!(dispatcher.has_pending_updates());
    }

    #[test]
    fn test_object_outside_every_mesh_is_clean() {
        let (mut dispatcher, _) = dispatcher();
        dispatcher.register_mesh(MeshId(1), flat(0.0, 0.0, 10.0, 10.0)).unwrap();

        let outcomes = dispatcher
            .handle_added(ObjectId(1), flat(100.0, 100.0, 101.0, 101.0), Instant::now())
            .unwrap();

        assert!(outcomes.is_empty());
        assert!(!dispatcher.registry().is_dirty(ObjectId(1)));
    }

    #[test]
    fn test_move_covers_old_and_new_bounds() {
        let (mut dispatcher, recorder) = dispatcher();
        dispatcher.register_mesh(MeshId(1), flat(0.0, 0.0, 10.0, 10.0)).unwrap();
        dispatcher.register_mesh(MeshId(2), flat(20.0, 0.0, 30.0, 10.0)).unwrap();
        let now = Instant::now();

        dispatcher.handle_added(ObjectId(1), flat(1.0, 1.0, 2.0, 2.0), now).unwrap();
        dispatcher.flush_at(now);
        recorder.lock().complete_all();
        dispatcher.update_at(now);
        assert!(!dispatcher.registry().is_dirty(ObjectId(1)));

        let outcomes = dispatcher
            .handle_moved(ObjectId(1), flat(21.0, 1.0, 22.0, 2.0), now)
            .unwrap();
        assert_eq!(
            outcomes,
            vec![
                (MeshId(1), EnqueueOutcome::Opened),
                (MeshId(2), EnqueueOutcome::Opened)
            ]
        );
        assert_eq!(
            dispatcher.scheduler().pending_region(MeshId(1)),
            Some(flat(1.0, 1.0, 22.0, 2.0))
        );
    }

    #[test]
    fn test_untracked_moves_only_update_registry() {
        let recorder = SharedRecorder::new();
        let config = DynamicObstacleConfig::default().with_track_moves(false);
        let mut dispatcher = NavMeshUpdateDispatcher::with_regenerator(config, recorder).unwrap();
        dispatcher.register_mesh(MeshId(1), flat(0.0, 0.0, 10.0, 10.0)).unwrap();
        dispatcher.object_added(ObjectId(1), flat(1.0, 1.0, 2.0, 2.0));
        dispatcher.flush();

        let outcomes = dispatcher
            .handle_moved(ObjectId(1), flat(5.0, 5.0, 6.0, 6.0), Instant::now())
            .unwrap();

        assert!(outcomes.is_empty());
        assert_eq!(dispatcher.registry().bounds(ObjectId(1)), Some(flat(5.0, 5.0, 6.0, 6.0)));
    }

    #[test]
    fn test_move_of_unknown_object_is_reported() {
        let (mut dispatcher, _) = dispatcher();
        dispatcher.register_mesh(MeshId(1), flat(0.0, 0.0, 10.0, 10.0)).unwrap();

        let err = dispatcher
            .handle_moved(ObjectId(5), flat(1.0, 1.0, 2.0, 2.0), Instant::now())
            .unwrap_err();
        assert!(matches!(err, Error::ObjectNotRegistered(ObjectId(5))));

        dispatcher.object_moved(ObjectId(5), flat(1.0, 1.0, 2.0, 2.0));
        assert_eq!(dispatcher.statistics().not_registered, 1);
        assert!(!dispatcher.has_pending_updates());
    }

    #[test]
    fn test_region_margin_pads_requests() {
        let recorder = SharedRecorder::new();
        let config = DynamicObstacleConfig::default().with_region_margin(1.0);
        let mut dispatcher = NavMeshUpdateDispatcher::with_regenerator(config, recorder).unwrap();
        // Only reached through the margin
        dispatcher.register_mesh(MeshId(1), flat(0.0, 0.0, 10.0, 10.0)).unwrap();

        let outcomes = dispatcher
            .handle_added(ObjectId(1), flat(10.5, 2.0, 11.0, 3.0), Instant::now())
            .unwrap();

        assert_eq!(outcomes.len(), 1);
        let region = dispatcher.scheduler().pending_region(MeshId(1)).unwrap();
        assert_eq!(region.min.x, 9.5);
        assert_eq!(region.max.x, 12.0);
    }

    #[test]
    fn test_dispatcher_as_lifecycle_observer() {
        let (dispatcher, recorder) = dispatcher();
        let mut observer: Box<dyn LifecycleObserver> = Box::new(dispatcher);

        observer.on_add(ObjectId(1), flat(1.0, 1.0, 2.0, 2.0));
        observer.on_remove(ObjectId(1));
        observer.on_remove(ObjectId(1));

        assert_eq!(observer.name(), "navmesh update dispatcher");
        assert_eq!(recorder.call_count(), 0);
    }

    #[test]
    fn test_statistics() {
        let (mut dispatcher, recorder) = dispatcher();
        dispatcher.register_mesh(MeshId(1), flat(0.0, 0.0, 10.0, 10.0)).unwrap();
        let now = Instant::now();

        dispatcher.handle_added(ObjectId(1), flat(1.0, 1.0, 2.0, 2.0), now).unwrap();
        dispatcher.handle_added(ObjectId(2), flat(3.0, 3.0, 4.0, 4.0), now).unwrap();
        dispatcher.handle_removing(ObjectId(2), now).unwrap();
        dispatcher.object_will_be_removed(ObjectId(9));

        let stats = dispatcher.statistics();
        assert_eq!(stats.objects, 1);
        assert_eq!(stats.meshes, 1);
        assert_eq!(stats.events, 4);
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.not_registered, 1);
        assert_eq!(stats.pending_meshes, 1);

        dispatcher.flush_at(now);
        recorder.lock().complete_all();
        let summary = dispatcher.update_at(now);
        assert_eq!(summary.completed.len(), 1);

        let stats = dispatcher.statistics();
        assert_eq!(stats.regenerations_started, 1);
        assert_eq!(stats.regenerations_succeeded, 1);
        assert_eq!(stats.dirty_objects, 0);
    }
}
