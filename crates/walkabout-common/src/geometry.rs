//! Geometric helpers on raw min/max triples
//!
//! These operate on `[f32; 3]` so they can be used directly on bounds coming
//! from host engine buffers without first building an [`Aabb`](crate::Aabb).

use super::Vec3;

/// Check if two axis-aligned bounding boxes overlap.
///
/// Touching faces count as overlapping.
#[inline]
pub fn overlap_bounds(amin: &[f32; 3], amax: &[f32; 3], bmin: &[f32; 3], bmax: &[f32; 3]) -> bool {
    amin[0] <= bmax[0]
        && amax[0] >= bmin[0]
        && amin[1] <= bmax[1]
        && amax[1] >= bmin[1]
        && amin[2] <= bmax[2]
        && amax[2] >= bmin[2]
}

/// Check if two 2D axis-aligned bounding boxes overlap (on XZ plane).
#[inline]
pub fn overlap_bounds_2d(amin: &[f32], amax: &[f32], bmin: &[f32], bmax: &[f32]) -> bool {
    amin[0] <= bmax[0] && amax[0] >= bmin[0] && amin[2] <= bmax[2] && amax[2] >= bmin[2]
}

/// Component-wise minimum
#[inline]
pub fn vmin(a: &Vec3, b: &Vec3) -> Vec3 {
    Vec3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z))
}

/// Component-wise maximum
#[inline]
pub fn vmax(a: &Vec3, b: &Vec3) -> Vec3 {
    Vec3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z))
}
