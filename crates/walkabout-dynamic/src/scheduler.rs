//! Per-mesh batching of regeneration requests
//!
//! Every mesh runs a small state machine:
//!
//! ```text
//! Idle --request--> Pending --window expiry / flush--> Regenerating --completion--> Idle
//!                                                           |
//!                                         requests while regenerating go to the
//!                                         next batch, opened on completion
//! ```
//!
//! A batch keeps one contribution per object, so a burst of changes from one
//! object (or many objects) collapses into a single `regenerate` call over the
//! union of their regions.

use crate::jobs::{
    Completion, CompletionHandle, MeshRegenerator, RegenerationJob, RegenerationTicket,
};
use crate::request::{merge_kind, UpdateKind, UpdateRequest};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;
use walkabout_common::{Aabb, Error, MeshId, ObjectId, Result};
use web_time::Instant;

/// Scheduling state of one navigation mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshState {
    Idle,
    /// Collecting requests until the batch window expires
    Pending,
    /// A regeneration job is in flight
    Regenerating,
}

/// What the scheduler did with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// First request since the last regeneration; a batch window opened
    Opened,
    /// Merged into the batch already pending for the mesh
    Merged,
    /// The mesh is regenerating; the request waits for the next batch
    Deferred,
    /// A removal withdrew an add that never reached the mesh
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
struct Contribution {
    kind: UpdateKind,
    region: Aabb,
}

#[derive(Debug, Default)]
struct PendingBatch {
    contributions: BTreeMap<ObjectId, Contribution>,
    /// Region carried over from a failed regeneration
    retry: Option<Aabb>,
    opened_at: Option<Instant>,
}

impl PendingBatch {
    fn is_empty(&self) -> bool {
        self.contributions.is_empty() && self.retry.is_none()
    }

    fn region(&self) -> Option<Aabb> {
        let union = Aabb::union_all(self.contributions.values().map(|c| &c.region));
        match (union, self.retry) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        }
    }

    fn add_retry(&mut self, region: Aabb) {
        self.retry = Some(match self.retry {
            Some(existing) => existing.union(&region),
            None => region,
        });
    }
}

#[derive(Debug)]
struct InFlight {
    ticket: RegenerationTicket,
    region: Aabb,
    objects: Vec<ObjectId>,
    started_at: Instant,
}

#[derive(Debug)]
struct MeshSchedule {
    epoch: u64,
    generation: u64,
    state: MeshState,
    batch: PendingBatch,
    in_flight: Option<InFlight>,
    /// Region owed after a failure that had nothing queued behind it
    retry_debt: Option<(Aabb, Instant)>,
}

impl MeshSchedule {
    fn new(epoch: u64) -> Self {
        Self {
            epoch,
            generation: 0,
            state: MeshState::Idle,
            batch: PendingBatch::default(),
            in_flight: None,
            retry_debt: None,
        }
    }

    fn in_flight_overlaps(&self, region: &Aabb) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|job| job.region.intersects(region))
    }

    fn open_window(&mut self, now: Instant) {
        self.state = MeshState::Pending;
        self.batch.opened_at = Some(now);
    }
}

/// A regeneration whose result has been applied
#[derive(Debug)]
pub struct CompletedRegeneration {
    pub mesh: MeshId,
    pub region: Aabb,
    /// Objects whose changes were part of the job
    pub objects: Vec<ObjectId>,
    /// Mesh generation after the completion was applied
    pub generation: u64,
    pub result: Result<()>,
    pub elapsed: Duration,
}

impl CompletedRegeneration {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatistics {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Completions ignored because their mesh was unregistered or replaced
    pub stale: u64,
}

pub struct RegenerationScheduler {
    meshes: HashMap<MeshId, MeshSchedule>,
    batch_window: Duration,
    retry_interval: Option<Duration>,
    next_epoch: u64,
    next_sequence: u64,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    stats: SchedulerStatistics,
}

impl RegenerationScheduler {
    pub fn new(batch_window: Duration, retry_interval: Option<Duration>) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel();

        Self {
            meshes: HashMap::new(),
            batch_window,
            retry_interval,
            next_epoch: 0,
            next_sequence: 0,
            completion_tx,
            completion_rx,
            stats: SchedulerStatistics::default(),
        }
    }

    /// Starts tracking a mesh. Re-adding a mesh resets its schedule; a job
    /// still running for the old registration becomes stale.
    pub fn add_mesh(&mut self, mesh: MeshId) -> bool {
        self.next_epoch += 1;
        let replaced = self.meshes.insert(mesh, MeshSchedule::new(self.next_epoch));

        if let Some(old) = &replaced {
            if old.in_flight.is_some() {
                log::debug!(
                    "{} re-registered while regenerating, its running job is now stale",
                    mesh
                );
            }
        }
        replaced.is_some()
    }

    /// Stops tracking a mesh and returns the state it was in
    pub fn remove_mesh(&mut self, mesh: MeshId) -> Option<MeshState> {
        let schedule = self.meshes.remove(&mesh)?;
        if schedule.state == MeshState::Regenerating {
            log::debug!(
                "{} removed while regenerating, its result will be ignored",
                mesh
            );
        }
        Some(schedule.state)
    }

    pub fn enqueue(&mut self, request: UpdateRequest, now: Instant) -> Result<EnqueueOutcome> {
        let schedule = self
            .meshes
            .get_mut(&request.mesh)
            .ok_or(Error::MeshNotRegistered(request.mesh))?;

        let existing = schedule.batch.contributions.get(&request.object).copied();

        if request.kind == UpdateKind::PendingRemoval {
            if let Some(existing) = existing {
                // The add never reached the mesh unless a running job may have
                // read the object's geometry
                if existing.kind == UpdateKind::Added
                    && !schedule.in_flight_overlaps(&existing.region.union(&request.region))
                {
                    schedule.batch.contributions.remove(&request.object);
                    if schedule.state == MeshState::Pending && schedule.batch.is_empty() {
                        schedule.state = MeshState::Idle;
                        schedule.batch.opened_at = None;
                    }
                    log::debug!(
                        "Withdrew pending add of object {} from {}",
                        request.object,
                        request.mesh
                    );
                    return Ok(EnqueueOutcome::Cancelled);
                }
            }
        }

        if let Some((debt, _)) = schedule.retry_debt.take() {
            schedule.batch.add_retry(debt);
        }

        let contribution = match existing {
            Some(existing) => Contribution {
                kind: merge_kind(existing.kind, request.kind),
                region: existing.region.union(&request.region),
            },
            None => Contribution {
                kind: request.kind,
                region: request.region,
            },
        };
        schedule
            .batch
            .contributions
            .insert(request.object, contribution);

        let outcome = match schedule.state {
            MeshState::Regenerating => EnqueueOutcome::Deferred,
            MeshState::Pending => EnqueueOutcome::Merged,
            MeshState::Idle => {
                schedule.open_window(now);
                EnqueueOutcome::Opened
            }
        };

        log::debug!("{} -> {:?}", request.description(), outcome);
        Ok(outcome)
    }

    /// Starts every batch whose window has expired and fires due retries.
    ///
    /// Returns the number of regenerations started.
    pub fn poll(&mut self, now: Instant, regenerator: &mut dyn MeshRegenerator) -> usize {
        if let Some(interval) = self.retry_interval {
            for (mesh, schedule) in self.meshes.iter_mut() {
                if schedule.state != MeshState::Idle {
                    continue;
                }
                if let Some((debt, failed_at)) = schedule.retry_debt {
                    if now.saturating_duration_since(failed_at) >= interval {
                        schedule.retry_debt = None;
                        schedule.batch.add_retry(debt);
                        schedule.open_window(now);
                        log::info!("Retrying failed regeneration of {} over {}", mesh, debt);
                    }
                }
            }
        }

        let window = self.batch_window;
        let due = self.meshes_where(|schedule| {
            schedule.state == MeshState::Pending
                && schedule
                    .batch
                    .opened_at
                    .map_or(true, |opened| now.saturating_duration_since(opened) >= window)
        });

        due.into_iter()
            .filter(|&mesh| self.start(mesh, now, regenerator))
            .count()
    }

    /// Starts every pending batch regardless of its window
    pub fn flush(&mut self, now: Instant, regenerator: &mut dyn MeshRegenerator) -> usize {
        let pending = self.meshes_where(|schedule| schedule.state == MeshState::Pending);

        pending
            .into_iter()
            .filter(|&mesh| self.start(mesh, now, regenerator))
            .count()
    }

    fn meshes_where(&self, predicate: impl Fn(&MeshSchedule) -> bool) -> Vec<MeshId> {
        let mut meshes: Vec<MeshId> = self
            .meshes
            .iter()
            .filter(|(_, schedule)| predicate(schedule))
            .map(|(&mesh, _)| mesh)
            .collect();
        meshes.sort();
        meshes
    }

    fn start(&mut self, mesh: MeshId, now: Instant, regenerator: &mut dyn MeshRegenerator) -> bool {
        let Some(schedule) = self.meshes.get_mut(&mesh) else {
            return false;
        };

        let batch = std::mem::take(&mut schedule.batch);
        let Some(region) = batch.region() else {
            schedule.state = MeshState::Idle;
            return false;
        };

        self.next_sequence += 1;
        let ticket = RegenerationTicket {
            mesh,
            epoch: schedule.epoch,
            generation: schedule.generation,
            sequence: self.next_sequence,
        };

        schedule.in_flight = Some(InFlight {
            ticket,
            region,
            objects: batch.contributions.keys().copied().collect(),
            started_at: now,
        });
        schedule.state = MeshState::Regenerating;
        self.stats.started += 1;

        let job = RegenerationJob::new(
            ticket,
            region,
            CompletionHandle::new(ticket, self.completion_tx.clone()),
        );
        log::info!("{}", job.description());
        regenerator.regenerate(job);
        true
    }

    /// Applies every completion reported so far
    pub fn process_completions(&mut self, now: Instant) -> Vec<CompletedRegeneration> {
        let mut completed = Vec::new();
        while let Ok(completion) = self.completion_rx.try_recv() {
            if let Some(done) = self.apply_completion(completion, now) {
                completed.push(done);
            }
        }
        completed
    }

    fn apply_completion(
        &mut self,
        completion: Completion,
        now: Instant,
    ) -> Option<CompletedRegeneration> {
        let ticket = completion.ticket;
        let schedule = match self.meshes.get_mut(&ticket.mesh) {
            Some(schedule)
                if schedule.epoch == ticket.epoch
                    && schedule.generation == ticket.generation
                    && schedule
                        .in_flight
                        .as_ref()
                        .is_some_and(|job| job.ticket == ticket) =>
            {
                schedule
            }
            _ => {
                self.stats.stale += 1;
                log::warn!(
                    "Ignoring stale regeneration result for {} (generation {})",
                    ticket.mesh,
                    ticket.generation
                );
                return None;
            }
        };

        let in_flight = schedule.in_flight.take()?;
        let elapsed = now.saturating_duration_since(in_flight.started_at);

        match &completion.result {
            Ok(()) => {
                schedule.generation += 1;
                self.stats.succeeded += 1;
                log::info!(
                    "Regenerated {} over {} in {:?} (generation {})",
                    ticket.mesh,
                    in_flight.region,
                    elapsed,
                    schedule.generation
                );
            }
            Err(e) => {
                self.stats.failed += 1;
                log::error!("Regeneration of {} failed: {}", ticket.mesh, e);
                schedule.retry_debt = Some((in_flight.region, now));
            }
        }

        if schedule.batch.is_empty() {
            schedule.state = MeshState::Idle;
        } else {
            if let Some((debt, _)) = schedule.retry_debt.take() {
                schedule.batch.add_retry(debt);
            }
            schedule.open_window(now);
        }

        Some(CompletedRegeneration {
            mesh: ticket.mesh,
            region: in_flight.region,
            objects: in_flight.objects,
            generation: schedule.generation,
            result: completion.result,
            elapsed,
        })
    }

    pub fn state(&self, mesh: MeshId) -> Option<MeshState> {
        self.meshes.get(&mesh).map(|schedule| schedule.state)
    }

    pub fn generation(&self, mesh: MeshId) -> Option<u64> {
        self.meshes.get(&mesh).map(|schedule| schedule.generation)
    }

    /// Union of everything waiting for the mesh's next regeneration
    pub fn pending_region(&self, mesh: MeshId) -> Option<Aabb> {
        self.meshes
            .get(&mesh)
            .and_then(|schedule| schedule.batch.region())
    }

    pub fn pending_objects(&self, mesh: MeshId) -> Vec<ObjectId> {
        self.meshes
            .get(&mesh)
            .map(|schedule| schedule.batch.contributions.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn in_flight_region(&self, mesh: MeshId) -> Option<Aabb> {
        self.meshes
            .get(&mesh)
            .and_then(|schedule| schedule.in_flight.as_ref())
            .map(|job| job.region)
    }

    pub fn has_retry_debt(&self, mesh: MeshId) -> bool {
        self.meshes.get(&mesh).is_some_and(|schedule| {
            schedule.retry_debt.is_some() || schedule.batch.retry.is_some()
        })
    }

    /// True while the mesh has queued, running or failed work
    pub fn is_dirty(&self, mesh: MeshId) -> bool {
        self.meshes.get(&mesh).is_some_and(|schedule| {
            !schedule.batch.is_empty()
                || schedule.in_flight.is_some()
                || schedule.retry_debt.is_some()
        })
    }

    /// Meshes with a pending batch that holds a change from `object`
    pub fn meshes_referencing(&self, object: ObjectId) -> Vec<MeshId> {
        self.meshes_where(|schedule| schedule.batch.contributions.contains_key(&object))
    }

    /// True if a running job includes `object`
    pub fn is_regenerating_object(&self, object: ObjectId) -> bool {
        self.meshes.values().any(|schedule| {
            schedule
                .in_flight
                .as_ref()
                .is_some_and(|job| job.objects.contains(&object))
        })
    }

    /// True if any pending or running job includes `object`
    pub fn references_object(&self, object: ObjectId) -> bool {
        self.meshes.values().any(|schedule| {
            schedule.batch.contributions.contains_key(&object)
                || schedule
                    .in_flight
                    .as_ref()
                    .is_some_and(|job| job.objects.contains(&object))
        })
    }

    pub fn contains(&self, mesh: MeshId) -> bool {
        self.meshes.contains_key(&mesh)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.count_in(MeshState::Pending)
    }

    pub fn regenerating_count(&self) -> usize {
        self.count_in(MeshState::Regenerating)
    }

    fn count_in(&self, state: MeshState) -> usize {
        self.meshes
            .values()
            .filter(|schedule| schedule.state == state)
            .count()
    }

    pub fn statistics(&self) -> SchedulerStatistics {
        self.stats
    }

    pub fn batch_window(&self) -> Duration {
        self.batch_window
    }

    /// Forgets every mesh; results of running jobs will be stale
    pub fn clear(&mut self) {
        self.meshes.clear();
    }
}

impl std::fmt::Debug for RegenerationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegenerationScheduler")
            .field("meshes", &self.meshes.len())
            .field("pending", &self.pending_count())
            .field("regenerating", &self.regenerating_count())
            .field("batch_window", &self.batch_window)
            .field("retry_interval", &self.retry_interval)
            .field("stats", &self.stats)
            .finish()
    }
}
