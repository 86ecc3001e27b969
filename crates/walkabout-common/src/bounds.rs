//! Axis-aligned bounding boxes in navigation space

use super::{overlap_bounds, overlap_bounds_2d, vmax, vmin, Error, Result, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// World-space axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Creates a box from its corners, which must already be ordered
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Creates a box from two arbitrary corners
    pub fn from_corners(a: Vec3, b: Vec3) -> Self {
        Self {
            min: vmin(&a, &b),
            max: vmax(&a, &b),
        }
    }

    /// Creates a box and rejects non-finite or inverted extents
    pub fn try_new(min: Vec3, max: Vec3) -> Result<Self> {
        let aabb = Self { min, max };
        if !aabb.is_valid() {
            return Err(Error::InvalidBounds(format!(
                "min {:?} / max {:?} is not a finite, ordered box",
                min, max
            )));
        }
        Ok(aabb)
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        let half = half_extents.abs();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Bounds in the `[minx, miny, minz, maxx, maxy, maxz]` layout
    pub fn from_array(bounds: [f32; 6]) -> Self {
        Self::from_corners(
            Vec3::new(bounds[0], bounds[1], bounds[2]),
            Vec3::new(bounds[3], bounds[4], bounds[5]),
        )
    }

    pub fn to_array(&self) -> [f32; 6] {
        [
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z,
        ]
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min.cmple(self.max).all()
    }

    /// Smallest box containing both boxes
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: vmin(&self.min, &other.min),
            max: vmax(&self.max, &other.max),
        }
    }

    /// Grows this box in place to contain `other`
    pub fn union_with(&mut self, other: &Aabb) {
        *self = self.union(other);
    }

    /// Inclusive overlap test; boxes sharing a face intersect
    pub fn intersects(&self, other: &Aabb) -> bool {
        overlap_bounds(
            &self.min.to_array(),
            &self.max.to_array(),
            &other.min.to_array(),
            &other.max.to_array(),
        )
    }

    /// Overlap test on the XZ plane only
    pub fn intersects_xz(&self, other: &Aabb) -> bool {
        overlap_bounds_2d(
            &self.min.to_array(),
            &self.max.to_array(),
            &other.min.to_array(),
            &other.max.to_array(),
        )
    }

    pub fn contains_point(&self, point: &Vec3) -> bool {
        self.min.cmple(*point).all() && point.cmple(self.max).all()
    }

    /// True if `other` lies entirely inside this box
    pub fn contains(&self, other: &Aabb) -> bool {
        self.contains_point(&other.min) && self.contains_point(&other.max)
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn expanded(&self, margin: f32) -> Aabb {
        let m = Vec3::splat(margin);
        Aabb::from_corners(self.min - m, self.max + m)
    }

    /// Union of a sequence of boxes, `None` when the sequence is empty
    pub fn union_all<'a, I>(boxes: I) -> Option<Aabb>
    where
        I: IntoIterator<Item = &'a Aabb>,
    {
        boxes
            .into_iter()
            .fold(None, |acc: Option<Aabb>, b| match acc {
                Some(a) => Some(a.union(b)),
                None => Some(*b),
            })
    }
}

impl fmt::Display for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}]-[{}, {}, {}]",
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z
        )
    }
}
