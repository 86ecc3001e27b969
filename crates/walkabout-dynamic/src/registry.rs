//! Registry of live dynamic obstacles
//!
//! The registry is the dispatcher's memory of where every dynamic object was
//! last seen. The host engine invalidates its own object state during removal,
//! so the registry's copy is the only reliable source for the pre-removal
//! bounds.

use std::collections::HashMap;
use walkabout_common::{Aabb, Error, ObjectId, Result};

/// A scene object that can invalidate navigation meshes
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicObject {
    pub id: ObjectId,
    /// Current world-space bounds
    pub bounds: Aabb,
    /// Set while the current bounds are not yet reflected in a finished
    /// regeneration
    pub dirty: bool,
    /// Set once a regeneration that included the object has finished
    pub built: bool,
}

impl DynamicObject {
    pub fn new(id: ObjectId, bounds: Aabb) -> Self {
        Self {
            id,
            bounds,
            dirty: true,
            built: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct DynamicObstacleRegistry {
    objects: HashMap<ObjectId, DynamicObject>,
}

impl DynamicObstacleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly added object and returns its bounds.
    ///
    /// Adding an id that is already live replaces its bounds.
    pub fn on_object_added(&mut self, id: ObjectId, bounds: Aabb) -> Aabb {
        if let Some(previous) = self.objects.insert(id, DynamicObject::new(id, bounds)) {
            log::warn!(
                "Object {} added twice, replacing bounds {} with {}",
                id,
                previous.bounds,
                bounds
            );
        }
        bounds
    }

    /// Updates the bounds of a live object and returns the previous bounds
    pub fn on_object_moved(&mut self, id: ObjectId, bounds: Aabb) -> Result<Aabb> {
        let object = self
            .objects
            .get_mut(&id)
            .ok_or(Error::ObjectNotRegistered(id))?;
        let previous = std::mem::replace(&mut object.bounds, bounds);
        object.dirty = true;
        Ok(previous)
    }

    /// Purges an object that is about to leave the scene.
    ///
    /// The purged record is returned, so its bounds are the ones the object
    /// had before removal.
    pub fn on_object_removing(&mut self, id: ObjectId) -> Result<DynamicObject> {
        self.objects
            .remove(&id)
            .ok_or(Error::ObjectNotRegistered(id))
    }

    pub fn get(&self, id: ObjectId) -> Option<&DynamicObject> {
        self.objects.get(&id)
    }

    pub fn bounds(&self, id: ObjectId) -> Option<Aabb> {
        self.objects.get(&id).map(|object| object.bounds)
    }

    pub fn is_dirty(&self, id: ObjectId) -> bool {
        self.objects.get(&id).is_some_and(|object| object.dirty)
    }

    /// Clears the dirty flag; returns false for unknown objects
    pub fn mark_clean(&mut self, id: ObjectId) -> bool {
        match self.objects.get_mut(&id) {
            Some(object) => {
                object.dirty = false;
                true
            }
            None => false,
        }
    }

    pub fn is_built(&self, id: ObjectId) -> bool {
        self.objects.get(&id).is_some_and(|object| object.built)
    }

    /// Records that a finished regeneration read the object's geometry
    pub fn mark_built(&mut self, id: ObjectId) -> bool {
        match self.objects.get_mut(&id) {
            Some(object) => {
                object.built = true;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn dirty_count(&self) -> usize {
        self.objects.values().filter(|object| object.dirty).count()
    }

    pub fn objects(&self) -> impl Iterator<Item = &DynamicObject> {
        self.objects.values()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walkabout_common::Vec3;

    fn cube(min: f32, max: f32) -> Aabb {
        Aabb::new(Vec3::splat(min), Vec3::splat(max))
    }

    #[test]
    fn test_add_returns_bounds() {
        let mut registry = DynamicObstacleRegistry::new();

        let bounds = registry.on_object_added(ObjectId(1), cube(1.0, 2.0));
        assert_eq!(bounds, cube(1.0, 2.0));
        assert!(registry.contains(ObjectId(1)));
        assert!(registry.is_dirty(ObjectId(1)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_removing_returns_pre_removal_bounds() {
        let mut registry = DynamicObstacleRegistry::new();
        registry.on_object_added(ObjectId(1), cube(1.0, 2.0));
        registry.on_object_moved(ObjectId(1), cube(5.0, 6.0)).unwrap();

        let removed = registry.on_object_removing(ObjectId(1)).unwrap();
        assert_eq!(removed.bounds, cube(5.0, 6.0));
        assert!(!registry.contains(ObjectId(1)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_removing_unknown_object() {
        let mut registry = DynamicObstacleRegistry::new();

        let err = registry.on_object_removing(ObjectId(42)).unwrap_err();
        assert!(matches!(err, Error::ObjectNotRegistered(ObjectId(42))));
    }

    #[test]
    fn test_move_returns_previous_bounds() {
        let mut registry = DynamicObstacleRegistry::new();
        registry.on_object_added(ObjectId(1), cube(0.0, 1.0));
        registry.mark_clean(ObjectId(1));
        assert!(!registry.is_dirty(ObjectId(1)));

        let previous = registry.on_object_moved(ObjectId(1), cube(3.0, 4.0)).unwrap();
        assert_eq!(previous, cube(0.0, 1.0));
        assert_eq!(registry.bounds(ObjectId(1)), Some(cube(3.0, 4.0)));
        assert!(registry.is_dirty(ObjectId(1)));

        assert!(registry.on_object_moved(ObjectId(2), cube(0.0, 1.0)).is_err());
    }

    #[test]
    fn test_double_add_replaces() {
        let mut registry = DynamicObstacleRegistry::new();
        registry.on_object_added(ObjectId(1), cube(0.0, 1.0));
        registry.on_object_added(ObjectId(1), cube(2.0, 3.0));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.bounds(ObjectId(1)), Some(cube(2.0, 3.0)));
    }

    #[test]
    fn test_built_survives_moves() {
        let mut registry = DynamicObstacleRegistry::new();
        registry.on_object_added(ObjectId(1), cube(0.0, 1.0));
        assert!(!registry.is_built(ObjectId(1)));

        assert!(registry.mark_built(ObjectId(1)));
        registry.on_object_moved(ObjectId(1), cube(3.0, 4.0)).unwrap();
        assert!(registry.is_built(ObjectId(1)));
        assert!(!registry.mark_built(ObjectId(9)));

        // A fresh add starts over
        registry.on_object_added(ObjectId(1), cube(5.0, 6.0));
        assert!(!registry.is_built(ObjectId(1)));
    }

    #[test]
    fn test_dirty_count() {
        let mut registry = DynamicObstacleRegistry::new();
        registry.on_object_added(ObjectId(1), cube(0.0, 1.0));
        registry.on_object_added(ObjectId(2), cube(0.0, 1.0));
        assert_eq!(registry.dirty_count(), 2);

        assert!(registry.mark_clean(ObjectId(2)));
        assert!(!registry.mark_clean(ObjectId(3)));
        assert_eq!(registry.dirty_count(), 1);
    }
}
