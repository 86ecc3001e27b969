use super::CompletionHandle;
use walkabout_common::{Aabb, MeshId, Result};

/// Identifies one regeneration of one mesh.
///
/// A completion is only applied if its ticket still matches the mesh's
/// in-flight job; anything else is a stale result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegenerationTicket {
    pub mesh: MeshId,
    /// Registration epoch of the mesh when the job started
    pub epoch: u64,
    /// Mesh generation the job builds on
    pub generation: u64,
    /// Scheduler-wide job sequence number
    pub sequence: u64,
}

/// A single `regenerate(mesh, region)` call
#[derive(Debug)]
pub struct RegenerationJob {
    ticket: RegenerationTicket,
    region: Aabb,
    completion: CompletionHandle,
}

impl RegenerationJob {
    pub fn new(ticket: RegenerationTicket, region: Aabb, completion: CompletionHandle) -> Self {
        RegenerationJob {
            ticket,
            region,
            completion,
        }
    }

    pub fn mesh(&self) -> MeshId {
        self.ticket.mesh
    }

    /// Union of every change batched into this job
    pub fn region(&self) -> Aabb {
        self.region
    }

    pub fn generation(&self) -> u64 {
        self.ticket.generation
    }

    pub fn ticket(&self) -> RegenerationTicket {
        self.ticket
    }

    /// Splits the job so the completion handle can move to a worker
    pub fn into_parts(self) -> (MeshId, Aabb, CompletionHandle) {
        (self.ticket.mesh, self.region, self.completion)
    }

    /// Reports the result right away
    pub fn complete(self, result: Result<()>) {
        self.completion.complete(result);
    }

    pub fn description(&self) -> String {
        format!(
            "Regenerate {} (generation {}) over {}",
            self.ticket.mesh, self.ticket.generation, self.region
        )
    }
}
