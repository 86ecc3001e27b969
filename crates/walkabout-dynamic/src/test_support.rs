//! Shared helpers for unit and scenario tests

use crate::jobs::{MeshRegenerator, RegenerationJob};
use std::sync::{Arc, Mutex, MutexGuard};
use walkabout_common::{Aabb, MeshId, Vec3};

/// Box with the given XZ footprint and a fixed 0..1 height
pub fn flat(min_x: f32, min_z: f32, max_x: f32, max_z: f32) -> Aabb {
    Aabb::new(Vec3::new(min_x, 0.0, min_z), Vec3::new(max_x, 1.0, max_z))
}

/// Regenerator that keeps every job so the test decides when it completes
#[derive(Debug, Default)]
pub struct RecordingRegenerator {
    pub jobs: Vec<RegenerationJob>,
    /// Every (mesh, region) ever requested, in order
    pub calls: Vec<(MeshId, Aabb)>,
}

impl RecordingRegenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completes the oldest outstanding job
    pub fn complete_next(&mut self, success: bool) -> MeshId {
        let job = self.jobs.remove(0);
        let mesh = job.mesh();
        if success {
            job.complete(Ok(()));
        } else {
            job.complete(Err(walkabout_common::Error::Regeneration(
                "test failure".to_string(),
            )));
        }
        mesh
    }

    pub fn complete_all(&mut self) {
        for job in self.jobs.drain(..) {
            job.complete(Ok(()));
        }
    }
}

impl MeshRegenerator for RecordingRegenerator {
    fn regenerate(&mut self, job: RegenerationJob) {
        self.calls.push((job.mesh(), job.region()));
        self.jobs.push(job);
    }
}

/// Recorder that stays inspectable after being boxed into a dispatcher
#[derive(Debug, Clone, Default)]
pub struct SharedRecorder(pub Arc<Mutex<RecordingRegenerator>>);

impl SharedRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, RecordingRegenerator> {
        self.0.lock().unwrap()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }
}

impl MeshRegenerator for SharedRecorder {
    fn regenerate(&mut self, job: RegenerationJob) {
        self.lock().regenerate(job);
    }
}
