use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How lifecycle events are matched to navigation meshes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshFilter {
    /// Only meshes whose bounds overlap the affected region are updated
    #[default]
    Spatial,
    /// Every registered mesh is updated on every event
    Broadcast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicObstacleConfig {
    /// Time a mesh stays `Pending` collecting requests before it is regenerated
    pub batch_window_ms: u64,
    /// Delay before a failed regeneration is retried without new requests
    pub retry_interval_ms: Option<u64>,
    /// Edge length of the XZ buckets used by the spatial index
    pub grid_cell_size: f32,
    pub mesh_filter: MeshFilter,
    /// Whether move events queue regeneration work
    pub track_moves: bool,
    /// Padding added around object bounds before querying meshes
    pub region_margin: f32,
}

impl DynamicObstacleConfig {
    pub fn new(batch_window_ms: u64, grid_cell_size: f32) -> Self {
        DynamicObstacleConfig {
            batch_window_ms,
            retry_interval_ms: Some(1000),
            grid_cell_size,
            mesh_filter: MeshFilter::Spatial,
            track_moves: true,
            region_margin: 0.0,
        }
    }

    pub fn with_batch_window_ms(mut self, batch_window_ms: u64) -> Self {
        self.batch_window_ms = batch_window_ms;
        self
    }

    pub fn with_retry_interval_ms(mut self, retry_interval_ms: Option<u64>) -> Self {
        self.retry_interval_ms = retry_interval_ms;
        self
    }

    pub fn with_grid_cell_size(mut self, grid_cell_size: f32) -> Self {
        self.grid_cell_size = grid_cell_size;
        self
    }

    pub fn with_mesh_filter(mut self, mesh_filter: MeshFilter) -> Self {
        self.mesh_filter = mesh_filter;
        self
    }

    pub fn with_track_moves(mut self, track_moves: bool) -> Self {
        self.track_moves = track_moves;
        self
    }

    pub fn with_region_margin(mut self, region_margin: f32) -> Self {
        self.region_margin = region_margin;
        self
    }

    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    pub fn retry_interval(&self) -> Option<Duration> {
        self.retry_interval_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.grid_cell_size.is_finite() && self.grid_cell_size > 0.0) {
            return Err("Grid cell size must be positive".to_string());
        }
        if !self.region_margin.is_finite() || self.region_margin < 0.0 {
            return Err("Region margin cannot be negative".to_string());
        }
        if self.retry_interval_ms == Some(0) {
            return Err("Retry interval must be positive when set".to_string());
        }
        Ok(())
    }
}

impl Default for DynamicObstacleConfig {
    fn default() -> Self {
        Self::new(100, 32.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DynamicObstacleConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_window(), Duration::from_millis(100));
        assert_eq!(config.retry_interval(), Some(Duration::from_secs(1)));
        assert_eq!(config.mesh_filter, MeshFilter::Spatial);
    }

    #[test]
    fn test_validation_errors() {
        let config = DynamicObstacleConfig::default().with_grid_cell_size(0.0);
        assert!(config.validate().is_err());

        let config = DynamicObstacleConfig::default().with_region_margin(-1.0);
        assert!(config.validate().is_err());

        let config = DynamicObstacleConfig::default().with_retry_interval_ms(Some(0));
        assert!(config.validate().is_err());

        let config = DynamicObstacleConfig::default().with_retry_interval_ms(None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DynamicObstacleConfig =
            serde_json::from_str(r#"{ "batch_window_ms": 250, "mesh_filter": "broadcast" }"#)
                .unwrap();

        assert_eq!(config.batch_window_ms, 250);
        assert_eq!(config.mesh_filter, MeshFilter::Broadcast);
        assert_eq!(config.grid_cell_size, 32.0);
        assert!(config.track_moves);
    }
}
