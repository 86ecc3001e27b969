//! Regeneration jobs handed to the host navigation subsystem

mod completion;
mod regeneration_job;
mod tokio_regenerator;

pub use completion::{Completion, CompletionHandle};
pub use regeneration_job::{RegenerationJob, RegenerationTicket};
pub use tokio_regenerator::{BlockingRegenerator, TokioRegenerator};

/// Interface to whatever actually rebuilds navigation meshes.
///
/// `regenerate` is called on the dispatcher's thread and must not block on the
/// build. The job carries a [`CompletionHandle`] which the implementation
/// reports through once the build finishes, from any thread.
pub trait MeshRegenerator: Send {
    fn regenerate(&mut self, job: RegenerationJob);

    /// Get a description of this regenerator for debugging
    fn description(&self) -> String {
        "mesh regenerator".to_string()
    }
}

impl<F> MeshRegenerator for F
where
    F: FnMut(RegenerationJob) + Send,
{
    fn regenerate(&mut self, job: RegenerationJob) {
        self(job)
    }
}
