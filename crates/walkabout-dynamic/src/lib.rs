//! Dynamic Obstacle Navigation Updates
//!
//! This crate keeps navigation meshes in sync with dynamic scene objects. When
//! an object enters, moves within or leaves the scene, the meshes it overlaps
//! are scheduled for regeneration over the affected region.
//!
//! # Features
//!
//! - **Spatial Filtering**: Only meshes overlapping an object's bounds are touched
//! - **Batching**: Bursts of changes collapse into one regeneration per mesh
//! - **Cancellation**: An add followed by a remove before the flush costs nothing
//! - **Async Workers**: Regenerate on a Tokio runtime or a blocking pool
//! - **Stale Result Guard**: Results for unregistered or replaced meshes are ignored
//! - **Level Scope**: A process-wide dispatcher tied to level load and unload
//!
//! # Example
//!
//! ```rust,no_run
//! use walkabout_common::{Aabb, MeshId, ObjectId, Vec3};
//! use walkabout_dynamic::{DynamicObstacleConfig, NavMeshUpdateDispatcher, RegenerationJob};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Regenerate synchronously and report success right away
//! let regenerator = |job: RegenerationJob| {
//!     println!("{}", job.description());
//!     job.complete(Ok(()));
//! };
//!
//! let config = DynamicObstacleConfig::default().with_batch_window_ms(50);
//! let mut dispatcher = NavMeshUpdateDispatcher::with_regenerator(config, regenerator)?;
//!
//! dispatcher.register_mesh(
//!     MeshId(1),
//!     Aabb::new(Vec3::new(0.0, -5.0, 0.0), Vec3::new(100.0, 20.0, 100.0)),
//! )?;
//!
//! // Scene lifecycle events
//! dispatcher.object_added(ObjectId(7), Aabb::new(Vec3::new(10.0, 0.0, 10.0), Vec3::new(12.0, 3.0, 12.0)));
//! dispatcher.object_will_be_removed(ObjectId(7));
//!
//! // Once per frame
//! let summary = dispatcher.update();
//! println!("{} regenerations started", summary.started);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod jobs;
pub mod level;
pub mod lifecycle;
pub mod registry;
pub mod request;
pub mod scheduler;
pub mod spatial_index;

#[cfg(test)]
mod test_support;


// Re-export main types
pub use config::{DynamicObstacleConfig, MeshFilter};
pub use dispatcher::{DispatcherStatistics, NavMeshUpdateDispatcher, UpdateSummary};
pub use level::{LevelNavigation, LevelNavigationHook};
pub use lifecycle::{LifecycleChain, LifecycleObserver};
pub use registry::{DynamicObject, DynamicObstacleRegistry};
pub use request::{UpdateKind, UpdateRequest};
pub use scheduler::{
    CompletedRegeneration, EnqueueOutcome, MeshState, RegenerationScheduler, SchedulerStatistics,
};
pub use spatial_index::SpatialIndex;

// Re-export job system
pub use jobs::{
    BlockingRegenerator, Completion, CompletionHandle, MeshRegenerator, RegenerationJob,
    RegenerationTicket, TokioRegenerator,
};
