use crate::error::{PartitionError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for line network preparation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Endpoints closer than this collapse into one node (CRS units)
    pub snap_tolerance: f64,
    /// Extend dangling line ends until they hit the next line
    pub extend_dead_ends: bool,
    pub max_extension: f64,
    /// Hits closer than this to the dangling end are ignored
    pub min_ray_offset: f64,
    pub min_segment_length: f64,
    pub boundary: BoundaryConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            snap_tolerance: 1e-6,
            extend_dead_ends: false,
            max_extension: 200.0,
            min_ray_offset: 0.25,
            min_segment_length: 0.1,
            boundary: BoundaryConfig::default(),
        }
    }
}

/// Stitching line work to the area outline, used only when an area is given
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Nodes this close to the outline get a connector to it
    pub connect_distance: f64,
    /// Vertices this close to the outline are moved onto it
    pub snap_tolerance: f64,
    /// Width of the band inside the outline whose line work is replaced by joins
    pub strip_width: f64,
    /// Longest join from a strip endpoint to the outline
    pub join_tolerance: f64,
    /// Strip endpoints closer than this share one join
    pub dedup_distance: f64,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            connect_distance: 100.0,
            snap_tolerance: 3.0,
            strip_width: 10.0,
            join_tolerance: 12.0,
            dedup_distance: 1.0,
        }
    }
}

/// Configuration for sliver absorption
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SliverConfig {
    /// Polygons below this area (CRS units squared) are absorbed
    pub min_area: f64,
    pub max_steps: usize,
    /// Collinearity tolerance when measuring shared boundary length
    pub boundary_tolerance: f64,
}

impl Default for SliverConfig {
    fn default() -> Self {
        Self {
            min_area: 5000.0,
            max_steps: 20_000,
            boundary_tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BisectConfig {
    pub max_depth: usize,
}

impl Default for BisectConfig {
    fn default() -> Self {
        Self { max_depth: 25 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImputeConfig {
    /// Boundaries closer than this count as touching
    pub touch_tolerance: f64,
}

impl Default for ImputeConfig {
    fn default() -> Self {
        Self {
            touch_tolerance: 1e-6,
        }
    }
}

/// Configuration for fragment consolidation (tolerances in CRS units)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidateConfig {
    pub max_parts: usize,
    pub start_tolerance: f64,
    pub growth_factor: f64,
    pub max_tolerance: f64,
}

impl Default for ConsolidateConfig {
    fn default() -> Self {
        Self {
            max_parts: 1,
            start_tolerance: 0.1,
            growth_factor: 2.0,
            max_tolerance: 50.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub network: NetworkConfig,
    pub slivers: SliverConfig,
    pub bisect: BisectConfig,
    pub impute: ImputeConfig,
    pub consolidate: ConsolidateConfig,
}

fn check(ok: bool, message: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(PartitionError::InvalidConfig(message.to_string()))
    }
}

impl PipelineConfig {
    pub fn from_ron_str(s: &str) -> Result<Self> {
        let config: PipelineConfig = ron::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| PartitionError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        let n = &self.network;
        check(n.snap_tolerance > 0.0, "network.snap_tolerance must be positive")?;
        check(n.max_extension >= 0.0, "network.max_extension must not be negative")?;
        let b = &n.boundary;
        check(b.connect_distance >= 0.0, "network.boundary.connect_distance must not be negative")?;
        check(b.snap_tolerance >= 0.0, "network.boundary.snap_tolerance must not be negative")?;
        check(b.strip_width > 0.0, "network.boundary.strip_width must be positive")?;
        check(b.join_tolerance >= 0.0, "network.boundary.join_tolerance must not be negative")?;
        check(b.dedup_distance >= 0.0, "network.boundary.dedup_distance must not be negative")?;

        check(self.slivers.min_area >= 0.0, "slivers.min_area must not be negative")?;
        check(
            self.slivers.boundary_tolerance > 0.0,
            "slivers.boundary_tolerance must be positive",
        )?;

        check(self.impute.touch_tolerance >= 0.0, "impute.touch_tolerance must not be negative")?;

        let c = &self.consolidate;
        check(c.max_parts >= 1, "consolidate.max_parts must be at least 1")?;
        check(c.start_tolerance > 0.0, "consolidate.start_tolerance must be positive")?;
        check(c.growth_factor > 1.0, "consolidate.growth_factor must be greater than 1")?;
        check(
            c.max_tolerance >= c.start_tolerance,
            "consolidate.max_tolerance must be at least start_tolerance",
        )?;

        Ok(())
    }
}
