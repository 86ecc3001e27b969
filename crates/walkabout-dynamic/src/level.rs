//! Process-wide dispatcher scoped to a loaded level
//!
//! Scene object classes have no handle to pass around, so the dispatcher for
//! the current level lives in a static slot. [`LevelNavigation::load`] fills
//! it when a level loads and [`LevelNavigation::unload`] empties it on
//! teardown. Everything in between goes through [`LevelNavigation::with`] or
//! the forwarding functions.

use crate::config::DynamicObstacleConfig;
use crate::dispatcher::{DispatcherStatistics, NavMeshUpdateDispatcher, UpdateSummary};
use crate::jobs::MeshRegenerator;
use crate::lifecycle::LifecycleObserver;
use std::cell::Cell;
use std::sync::{Mutex, PoisonError};
use walkabout_common::{Aabb, Error, ObjectId, Result};

/// Dispatcher of the currently loaded level
static LEVEL: Mutex<Option<NavMeshUpdateDispatcher>> = Mutex::new(None);

thread_local! {
    /// Set while this thread holds the level lock
    static HOLDING_LEVEL: Cell<bool> = const { Cell::new(false) };
}

struct HoldGuard;

impl Drop for HoldGuard {
    fn drop(&mut self) {
        HOLDING_LEVEL.with(|held| held.set(false));
    }
}

/// Runs `f` with the level slot locked.
///
/// Regenerators run synchronously under the lock, so a regenerator that
/// calls back into [`LevelNavigation`] on the same thread would block on
/// itself. Such calls fail with [`Error::Reentrant`] instead.
fn locked<R>(f: impl FnOnce(&mut Option<NavMeshUpdateDispatcher>) -> R) -> Result<R> {
    if HOLDING_LEVEL.with(|held| held.replace(true)) {
        return Err(Error::Reentrant);
    }
    let _guard = HoldGuard;

    // A panic inside `with` leaves the dispatcher itself consistent
    let mut slot = LEVEL.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(f(&mut slot))
}

/// Entry points for the level-scoped dispatcher
pub struct LevelNavigation;

impl LevelNavigation {
    /// Creates the dispatcher for a newly loaded level.
    ///
    /// `regenerator` is called with the level lock held. It must hand
    /// results back through the job's completion handle rather than by
    /// calling into `LevelNavigation`; such calls from its own thread
    /// return [`Error::Reentrant`].
    pub fn load(config: DynamicObstacleConfig, regenerator: Box<dyn MeshRegenerator>) -> Result<()> {
        locked(|slot| {
            if slot.is_some() {
                log::error!("Dynamic navigation loaded twice without an unload");
                return Err(Error::AlreadyInitialized);
            }

            *slot = Some(NavMeshUpdateDispatcher::new(config, regenerator)?);
            log::info!("Dynamic navigation loaded");
            Ok(())
        })?
    }

    /// Tears the dispatcher down and returns its final statistics.
    ///
    /// Regenerations still running report into a closed channel and are
    /// dropped.
    pub fn unload() -> Option<DispatcherStatistics> {
        let dispatcher = match locked(Option::take) {
            Ok(dispatcher) => dispatcher?,
            Err(e) => {
                log::error!("Dynamic navigation unload refused: {}", e);
                return None;
            }
        };
        let stats = dispatcher.statistics();
        log::info!(
            "Dynamic navigation unloaded ({} regenerations, {} failed)",
            stats.regenerations_started,
            stats.regenerations_failed
        );
        Some(stats)
    }

    /// Also true when asked from inside a dispatcher callback
    pub fn is_loaded() -> bool {
        locked(|slot| slot.is_some()).unwrap_or(true)
    }

    /// Runs `f` against the loaded dispatcher.
    ///
    /// The level lock is held while `f` runs, including any regenerator
    /// calls `f` triggers. Calling back into `LevelNavigation` from inside
    /// `f` or a regenerator returns [`Error::Reentrant`].
    pub fn with<R>(f: impl FnOnce(&mut NavMeshUpdateDispatcher) -> R) -> Result<R> {
        locked(|slot| slot.as_mut().map(f))?.ok_or(Error::NotInitialized)
    }

    pub fn object_added(object: ObjectId, bounds: Aabb) {
        Self::forward("add", |dispatcher| dispatcher.object_added(object, bounds));
    }

    pub fn object_will_be_removed(object: ObjectId) {
        Self::forward("remove", |dispatcher| {
            dispatcher.object_will_be_removed(object)
        });
    }

    pub fn object_moved(object: ObjectId, bounds: Aabb) {
        Self::forward("move", |dispatcher| dispatcher.object_moved(object, bounds));
    }

    /// Per-frame pump; a no-op while no level is loaded
    pub fn update() -> Option<UpdateSummary> {
        Self::with(|dispatcher| dispatcher.update()).ok()
    }

    pub fn flush() -> usize {
        Self::with(|dispatcher| dispatcher.flush()).unwrap_or(0)
    }

    fn forward(event: &str, f: impl FnOnce(&mut NavMeshUpdateDispatcher)) {
        if let Err(e) = Self::with(f) {
            log::warn!("Dropped {} event: {}", event, e);
        }
    }
}

/// Lifecycle observer that feeds the level-scoped dispatcher
#[derive(Debug, Default, Clone, Copy)]
pub struct LevelNavigationHook;

impl LifecycleObserver for LevelNavigationHook {
    fn on_add(&mut self, object: ObjectId, bounds: Aabb) {
        LevelNavigation::object_added(object, bounds);
    }

    fn on_remove(&mut self, object: ObjectId) {
        LevelNavigation::object_will_be_removed(object);
    }

    fn on_move(&mut self, object: ObjectId, bounds: Aabb) {
        LevelNavigation::object_moved(object, bounds);
    }

    fn name(&self) -> &str {
        "level navigation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleChain;
    use crate::jobs::RegenerationJob;
    use crate::test_support::{flat, SharedRecorder};
    use std::sync::Arc;
    use walkabout_common::MeshId;

    // The slot is process-wide, so the whole load/unload cycle lives in one test
    #[test]
    fn test_level_lifecycle() {
        assert!(!LevelNavigation::is_loaded());
        assert!(matches!(
            LevelNavigation::with(|_| ()),
            Err(Error::NotInitialized)
        ));
        // Forwarding while unloaded is logged, never fatal
        LevelNavigation::object_added(ObjectId(1), flat(1.0, 1.0, 2.0, 2.0));
        assert!(LevelNavigation::update().is_none());
        assert_eq!(LevelNavigation::unload(), None);

        let recorder = SharedRecorder::new();
        let config = DynamicObstacleConfig::default();
        LevelNavigation::load(config.clone(), Box::new(recorder.clone())).unwrap();
        assert!(LevelNavigation::is_loaded());
        assert!(matches!(
            LevelNavigation::load(config, Box::new(SharedRecorder::new())),
            Err(Error::AlreadyInitialized)
        ));

        LevelNavigation::with(|dispatcher| {
            dispatcher.register_mesh(MeshId(1), flat(0.0, 0.0, 10.0, 10.0))
        })
        .unwrap()
        .unwrap();

        let mut chain = LifecycleChain::new();
        chain.push(Box::new(LevelNavigationHook));
        chain.notify_added(ObjectId(1), flat(1.0, 1.0, 2.0, 2.0));
        chain.notify_added(ObjectId(2), flat(8.0, 8.0, 9.0, 9.0));

        assert_eq!(LevelNavigation::flush(), 1);
        assert_eq!(
            recorder.lock().calls,
            vec![(MeshId(1), flat(1.0, 1.0, 9.0, 9.0))]
        );

        let stats = LevelNavigation::unload().unwrap();
        assert_eq!(stats.objects, 2);
        assert_eq!(stats.regenerations_started, 1);
        assert!(!LevelNavigation::is_loaded());
        assert_eq!(LevelNavigation::flush(), 0);

        // A regenerator that calls back in gets an error instead of a deadlock
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        let regenerator = move |job: RegenerationJob| {
            let nested = LevelNavigation::with(|dispatcher| dispatcher.statistics());
            record
                .lock()
                .unwrap()
                .push(matches!(nested, Err(Error::Reentrant)));
            assert!(LevelNavigation::is_loaded());
            assert!(LevelNavigation::unload().is_none());
            job.complete(Ok(()));
        };
        LevelNavigation::load(DynamicObstacleConfig::default(), Box::new(regenerator)).unwrap();
        LevelNavigation::with(|dispatcher| {
            dispatcher.register_mesh(MeshId(1), flat(0.0, 0.0, 10.0, 10.0))
        })
        .unwrap()
        .unwrap();
        LevelNavigation::object_added(ObjectId(3), flat(1.0, 1.0, 2.0, 2.0));

        assert_eq!(LevelNavigation::flush(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![true]);
        let summary = LevelNavigation::update().unwrap();
        assert_eq!(summary.completed.len(), 1);

        // The guard is released once the outer call returns
        assert!(LevelNavigation::with(|_| ()).is_ok());
        assert!(LevelNavigation::unload().is_some());
    }
}
