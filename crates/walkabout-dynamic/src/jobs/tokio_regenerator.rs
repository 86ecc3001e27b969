//! Regenerators that run mesh builds on a tokio runtime

use super::{MeshRegenerator, RegenerationJob};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use walkabout_common::{Aabb, Error, MeshId, Result};

fn current_handle() -> Result<Handle> {
    Handle::try_current()
        .map_err(|e| Error::Regeneration(format!("no tokio runtime available: {}", e)))
}

/// Runs an async build function per job and reports its output
pub struct TokioRegenerator<F> {
    handle: Handle,
    build: Arc<F>,
}

impl<F, Fut> TokioRegenerator<F>
where
    F: Fn(MeshId, Aabb) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    pub fn new(handle: Handle, build: F) -> Self {
        Self {
            handle,
            build: Arc::new(build),
        }
    }

    /// Uses the runtime of the calling context
    pub fn current(build: F) -> Result<Self> {
        Ok(Self::new(current_handle()?, build))
    }
}

impl<F, Fut> MeshRegenerator for TokioRegenerator<F>
where
    F: Fn(MeshId, Aabb) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn regenerate(&mut self, job: RegenerationJob) {
        let build = Arc::clone(&self.build);
        let (mesh, region, completion) = job.into_parts();

        // A panicking build drops `completion`, which reports a failure
        self.handle.spawn(async move {
            let result = build(mesh, region).await;
            completion.complete(result);
        });
    }

    fn description(&self) -> String {
        "tokio async regenerator".to_string()
    }
}

/// Runs a synchronous build function on tokio's blocking thread pool
pub struct BlockingRegenerator<F> {
    handle: Handle,
    build: Arc<F>,
}

impl<F> BlockingRegenerator<F>
where
    F: Fn(MeshId, Aabb) -> Result<()> + Send + Sync + 'static,
{
    pub fn new(handle: Handle, build: F) -> Self {
        Self {
            handle,
            build: Arc::new(build),
        }
    }

    pub fn current(build: F) -> Result<Self> {
        Ok(Self::new(current_handle()?, build))
    }
}

impl<F> MeshRegenerator for BlockingRegenerator<F>
where
    F: Fn(MeshId, Aabb) -> Result<()> + Send + Sync + 'static,
{
    fn regenerate(&mut self, job: RegenerationJob) {
        let build = Arc::clone(&self.build);
        let (mesh, region, completion) = job.into_parts();

        self.handle.spawn_blocking(move || {
            log::info!("Starting blocking build for {}", mesh);
            completion.complete(build(mesh, region));
        });
    }

    fn description(&self) -> String {
        "tokio blocking regenerator".to_string()
    }
}
