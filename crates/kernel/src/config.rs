use cellspace_common::UniverseId;
use serde::{Deserialize, Serialize};

/// Setup-time geometry options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeometryConfig {
    /// Minimum number of distinct axis-aligned planes a universe needs before
    /// it gets a partitioner. Smaller universes are scanned linearly.
    pub partition_min_planes: usize,
    /// Slots per neighbor list.
    pub neighbor_capacity: usize,
    /// Temperature (K) for material cells that do not set one.
    pub default_temperature: f64,
    /// Universe to treat as all of space. When unset, the single universe
    /// not used as a fill is the root.
    pub root_universe: Option<UniverseId>,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            partition_min_planes: 5,
            neighbor_capacity: 8,
            default_temperature: 293.6,
            root_universe: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_config_defaults() {
        let config = GeometryConfig::default();
        assert_eq!(config.partition_min_planes, 5);
        assert_eq!(config.neighbor_capacity, 8);
        assert!((config.default_temperature - 293.6).abs() < 1e-12);
        assert_eq!(config.root_universe, None);
    }
}
