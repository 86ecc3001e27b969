//! Conversion between the engine's z-up world frame and the y-up navigation frame
//!
//! Scene objects report their bounds with Z pointing up and Y pointing forward.
//! Navigation meshes are built with Y up, so `(x, y, z)` in the engine becomes
//! `(x, z, -y)` in navigation space.

use super::{Aabb, Vec3};

/// Engine (z-up) point to navigation (y-up) point
#[inline]
pub fn z_up_to_y_up(point: Vec3) -> Vec3 {
    Vec3::new(point.x, point.z, -point.y)
}

/// Navigation (y-up) point to engine (z-up) point
#[inline]
pub fn y_up_to_z_up(point: Vec3) -> Vec3 {
    Vec3::new(point.x, -point.z, point.y)
}

impl Aabb {
    /// Converts an engine-space box into navigation space
    pub fn from_z_up(engine_box: &Aabb) -> Aabb {
        // Negating Y swaps which corner holds the minimum
        Aabb::new(
            Vec3::new(engine_box.min.x, engine_box.min.z, -engine_box.max.y),
            Vec3::new(engine_box.max.x, engine_box.max.z, -engine_box.min.y),
        )
    }

    /// Converts this navigation-space box back into engine space
    pub fn to_z_up(&self) -> Aabb {
        Aabb::new(
            Vec3::new(self.min.x, -self.max.z, self.min.y),
            Vec3::new(self.max.x, -self.min.z, self.max.y),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_conversion() {
        let engine = Vec3::new(1.0, 2.0, 3.0);
        let nav = z_up_to_y_up(engine);

        assert_eq!(nav, Vec3::new(1.0, 3.0, -2.0));
        assert_eq!(y_up_to_z_up(nav), engine);
    }

    #[test]
    fn test_box_conversion_keeps_ordering() {
        let engine = Aabb::new(Vec3::new(0.0, 2.0, -1.0), Vec3::new(4.0, 6.0, 1.0));
        let nav = Aabb::from_z_up(&engine);

        assert!(nav.is_valid());
        assert_eq!(nav.min, Vec3::new(0.0, -1.0, -6.0));
        assert_eq!(nav.max, Vec3::new(4.0, 1.0, -2.0));
        assert_eq!(nav.to_z_up(), engine);
    }
}
