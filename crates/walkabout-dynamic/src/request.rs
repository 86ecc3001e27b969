use serde::{Deserialize, Serialize};
use walkabout_common::{Aabb, MeshId, ObjectId};

/// What happened to the object that caused an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateKind {
    /// Object entered the scene
    Added,
    /// Object changed bounds while live
    Moved,
    /// Object is about to leave the scene
    PendingRemoval,
}

/// Request to regenerate part of one navigation mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateRequest {
    pub mesh: MeshId,
    pub region: Aabb,
    pub object: ObjectId,
    pub kind: UpdateKind,
}

impl UpdateRequest {
    pub fn new(mesh: MeshId, region: Aabb, object: ObjectId, kind: UpdateKind) -> Self {
        Self {
            mesh,
            region,
            object,
            kind,
        }
    }

    pub fn description(&self) -> String {
        format!(
            "{:?} of object {} affects {} over {}",
            self.kind, self.object, self.mesh, self.region
        )
    }
}

/// Kind recorded when a second request from the same object reaches a
/// pending batch. Withdrawing a pending add is handled by the scheduler
/// before this is consulted.
pub(crate) fn merge_kind(existing: UpdateKind, incoming: UpdateKind) -> UpdateKind {
    match (existing, incoming) {
        (UpdateKind::Added, UpdateKind::Added) | (UpdateKind::Added, UpdateKind::Moved) => {
            UpdateKind::Added
        }
        // Re-added after a removal notice: the mesh must still see the change
        (_, UpdateKind::Added) => UpdateKind::Moved,
        (_, incoming) => incoming,
    }
}
