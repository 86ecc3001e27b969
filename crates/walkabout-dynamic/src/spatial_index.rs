//! Spatial index over navigation mesh bounds
//!
//! Meshes are bucketed into a uniform grid on the XZ plane. A query only
//! tests meshes found in the cells under the query region, instead of
//! checking every registered mesh on every scene change. Candidates are then
//! filtered with an exact 3D overlap test.

use crate::config::MeshFilter;
use std::collections::{BTreeSet, HashMap};
use walkabout_common::{Aabb, Error, MeshId, Result, Vec3};

/// Default cell size for the mesh grid (in world units)
const DEFAULT_CELL_SIZE: f32 = 32.0;

/// Meshes or queries spanning more cells than this skip the grid
const MAX_GRID_SPAN: i64 = 4096;

/// Grid cell coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GridCoord {
    x: i32,
    z: i32,
}

impl GridCoord {
    fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Converts world position to grid coordinates
    fn from_world_pos(pos: Vec3, cell_size: f32) -> Self {
        Self {
            x: (pos.x / cell_size).floor() as i32,
            z: (pos.z / cell_size).floor() as i32,
        }
    }
}

/// Inclusive rectangle of grid cells covered by a box
#[derive(Debug, Clone, Copy)]
struct CellRange {
    min: GridCoord,
    max: GridCoord,
}

impl CellRange {
    fn covering(bounds: &Aabb, cell_size: f32) -> Self {
        Self {
            min: GridCoord::from_world_pos(bounds.min, cell_size),
            max: GridCoord::from_world_pos(bounds.max, cell_size),
        }
    }

    fn cell_count(&self) -> i64 {
        let w = self.max.x as i64 - self.min.x as i64 + 1;
        let d = self.max.z as i64 - self.min.z as i64 + 1;
        w.max(0) * d.max(0)
    }

    fn cells(&self) -> impl Iterator<Item = GridCoord> + '_ {
        (self.min.z..=self.max.z)
            .flat_map(move |z| (self.min.x..=self.max.x).map(move |x| GridCoord::new(x, z)))
    }
}

#[derive(Debug, Clone)]
struct IndexedMesh {
    bounds: Aabb,
    /// `None` when the mesh is too large to bucket
    cells: Option<CellRange>,
}

/// Index answering "which navigation meshes overlap this region"
#[derive(Debug)]
pub struct SpatialIndex {
    cells: HashMap<GridCoord, Vec<MeshId>>,
    meshes: HashMap<MeshId, IndexedMesh>,
    /// Meshes that span too many cells; tested on every query
    oversized: BTreeSet<MeshId>,
    cell_size: f32,
    filter: MeshFilter,
}

impl SpatialIndex {
    pub fn new(cell_size: f32) -> Self {
        Self::with_filter(cell_size, MeshFilter::Spatial)
    }

    pub fn new_default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }

    pub fn with_filter(cell_size: f32, filter: MeshFilter) -> Self {
        Self {
            cells: HashMap::new(),
            meshes: HashMap::new(),
            oversized: BTreeSet::new(),
            cell_size: cell_size.max(0.1), // Minimum cell size to avoid division by zero
            filter,
        }
    }

    /// Adds a mesh, or replaces the bounds of an already indexed one.
    ///
    /// Returns the previous bounds when the mesh was already present.
    pub fn register(&mut self, mesh: MeshId, bounds: Aabb) -> Option<Aabb> {
        let previous = self.remove_entry(mesh);

        let range = CellRange::covering(&bounds, self.cell_size);
        let cells = if range.cell_count() <= MAX_GRID_SPAN {
            for coord in range.cells() {
                self.cells.entry(coord).or_default().push(mesh);
            }
            Some(range)
        } else {
            log::debug!(
                "Navigation mesh {} covers {} grid cells, indexing it unbucketed",
                mesh,
                range.cell_count()
            );
            self.oversized.insert(mesh);
            None
        };

        self.meshes.insert(mesh, IndexedMesh { bounds, cells });
        previous
    }

    /// Removes a mesh from the index.
    ///
    /// Unknown meshes are reported as `MeshNotRegistered`; the index is left
    /// unchanged.
    pub fn unregister(&mut self, mesh: MeshId) -> Result<Aabb> {
        match self.remove_entry(mesh) {
            Some(bounds) => Ok(bounds),
            None => {
                log::warn!("Cannot unregister {}: not in the spatial index", mesh);
                Err(Error::MeshNotRegistered(mesh))
            }
        }
    }

    fn remove_entry(&mut self, mesh: MeshId) -> Option<Aabb> {
        let entry = self.meshes.remove(&mesh)?;
        match entry.cells {
            Some(range) => {
                for coord in range.cells() {
                    if let Some(bucket) = self.cells.get_mut(&coord) {
                        bucket.retain(|&id| id != mesh);
                        // Remove empty cells to save memory
                        if bucket.is_empty() {
                            self.cells.remove(&coord);
                        }
                    }
                }
            }
            None => {
                self.oversized.remove(&mesh);
            }
        }
        Some(entry.bounds)
    }

    /// Every registered mesh whose bounds intersect `region`
    pub fn meshes_overlapping(&self, region: &Aabb) -> BTreeSet<MeshId> {
        if self.filter == MeshFilter::Broadcast {
            return self.meshes.keys().copied().collect();
        }

        let range = CellRange::covering(region, self.cell_size);
        if range.cell_count() > MAX_GRID_SPAN {
            return self
                .meshes
                .iter()
                .filter(|(_, entry)| entry.bounds.intersects(region))
                .map(|(&id, _)| id)
                .collect();
        }

        let mut result = BTreeSet::new();
        let candidates = range
            .cells()
            .filter_map(|coord| self.cells.get(&coord))
            .flatten()
            .chain(self.oversized.iter());

        for &mesh in candidates {
            if result.contains(&mesh) {
                continue;
            }
            if let Some(entry) = self.meshes.get(&mesh) {
                if entry.bounds.intersects(region) {
                    result.insert(mesh);
                }
            }
        }

        result
    }

    pub fn mesh_bounds(&self, mesh: MeshId) -> Option<Aabb> {
        self.meshes.get(&mesh).map(|entry| entry.bounds)
    }

    pub fn contains(&self, mesh: MeshId) -> bool {
        self.meshes.contains_key(&mesh)
    }

    pub fn mesh_ids(&self) -> impl Iterator<Item = MeshId> + '_ {
        self.meshes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn filter(&self) -> MeshFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: MeshFilter) {
        self.filter = filter;
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of occupied grid cells
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.meshes.clear();
        self.oversized.clear();
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new_default()
    }
}
