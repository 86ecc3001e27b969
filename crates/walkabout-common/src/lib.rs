//! Common utilities and data structures shared by the Walkabout crates

mod bounds;
mod coords;
mod geometry;
mod ids;

pub use bounds::*;
pub use coords::*;
pub use geometry::*;
pub use ids::*;

/// Represents a 3D position
pub type Vec3 = glam::Vec3;

/// Error types for the library
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("object {0} is not registered")]
    ObjectNotRegistered(ObjectId),

    #[error("navigation mesh {0} is not registered")]
    MeshNotRegistered(MeshId),

    #[error("invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("regeneration failed: {0}")]
    Regeneration(String),

    #[error("dynamic navigation has not been loaded for this level")]
    NotInitialized,

    #[error("dynamic navigation is already loaded")]
    AlreadyInitialized,

    /// A callback invoked under the level lock tried to take it again
    #[error("dynamic navigation was re-entered from one of its own callbacks")]
    Reentrant,
}

impl Error {
    /// True for the "unknown object or mesh" family of errors
    pub fn is_not_registered(&self) -> bool {
        matches!(
            self,
            Error::ObjectNotRegistered(_) | Error::MeshNotRegistered(_)
        )
    }
}

/// Result type for Walkabout operations
pub type Result<T> = std::result::Result<T, Error>;
