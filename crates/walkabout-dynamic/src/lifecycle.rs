//! Ordered fan-out of scene lifecycle events
//!
//! A scene object class usually reacts to being added or removed and then
//! hands the event on to whatever else cares about it. [`LifecycleChain`]
//! makes that hand-off explicit: observers run in insertion order, and every
//! observer sees a removal while the object still exists.

use walkabout_common::{Aabb, ObjectId};

/// Something that reacts to objects entering and leaving the scene
pub trait LifecycleObserver: Send {
    fn on_add(&mut self, object: ObjectId, bounds: Aabb);

    /// Called before the object is purged from the scene
    fn on_remove(&mut self, object: ObjectId);

    fn on_move(&mut self, _object: ObjectId, _bounds: Aabb) {}

    fn name(&self) -> &str {
        "lifecycle observer"
    }
}

#[derive(Default)]
pub struct LifecycleChain {
    observers: Vec<Box<dyn LifecycleObserver>>,
}

impl LifecycleChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an observer that runs after every existing one
    pub fn push(&mut self, observer: Box<dyn LifecycleObserver>) {
        log::debug!("Lifecycle observer '{}' attached", observer.name());
        self.observers.push(observer);
    }

    /// Inserts an observer at `index`, clamped to the chain length
    pub fn insert(&mut self, index: usize, observer: Box<dyn LifecycleObserver>) {
        let index = index.min(self.observers.len());
        log::debug!(
            "Lifecycle observer '{}' attached at position {}",
            observer.name(),
            index
        );
        self.observers.insert(index, observer);
    }

    pub fn notify_added(&mut self, object: ObjectId, bounds: Aabb) {
        for observer in &mut self.observers {
            observer.on_add(object, bounds);
        }
    }

    pub fn notify_removing(&mut self, object: ObjectId) {
        for observer in &mut self.observers {
            observer.on_remove(object);
        }
    }

    pub fn notify_moved(&mut self, object: ObjectId, bounds: Aabb) {
        for observer in &mut self.observers {
            observer.on_move(object, bounds);
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.observers.iter().map(|observer| observer.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl std::fmt::Debug for LifecycleChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleChain")
            .field("observers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use walkabout_common::Vec3;

    struct Tracer {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl LifecycleObserver for Tracer {
        fn on_add(&mut self, object: ObjectId, _bounds: Aabb) {
            self.log.lock().unwrap().push(format!("{} add {}", self.name, object));
        }

        fn on_remove(&mut self, object: ObjectId) {
            self.log.lock().unwrap().push(format!("{} remove {}", self.name, object));
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn chain_with(names: &[&'static str], log: &Arc<Mutex<Vec<String>>>) -> LifecycleChain {
        let mut chain = LifecycleChain::new();
        for &name in names {
            chain.push(Box::new(Tracer {
                name,
                log: log.clone(),
            }));
        }
        chain
    }

    #[test]
    fn test_observers_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = chain_with(&["navigation", "parent"], &log);

        chain.notify_added(ObjectId(3), Aabb::new(Vec3::ZERO, Vec3::ONE));
        chain.notify_removing(ObjectId(3));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["navigation add #3", "parent add #3", "navigation remove #3", "parent remove #3"]
        );
    }

    #[test]
    fn test_insert_clamps_position() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = chain_with(&["b"], &log);

        chain.insert(0, Box::new(Tracer { name: "a", log: log.clone() }));
        chain.insert(99, Box::new(Tracer { name: "c", log: log.clone() }));

        assert_eq!(chain.names(), vec!["a", "b", "c"]);
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_move_defaults_to_noop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = chain_with(&["a"], &log);

        chain.notify_moved(ObjectId(1), Aabb::new(Vec3::ZERO, Vec3::ONE));
        assert!(log.lock().unwrap().is_empty());
    }
}
