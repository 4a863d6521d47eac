//! Configuration types for the simulator.
//!
//! Mirrors the nested-sub-config pattern used across the workspace: one
//! struct per concern, each with its own `Default`, assembled into a single
//! root `Config`.

use serde::{Deserialize, Serialize};

/// Root configuration for a simulation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub run: RunConfig,
    pub topology: TopologyConfig,
    pub payload: PayloadConfig,
    pub code: CodeConfig,
    pub placement: PlacementConfig,
    pub network: NetworkConfig,
    pub power_outage: PowerOutageConfig,
    pub trace: TraceConfig,
    pub estimator: EstimatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            topology: TopologyConfig::default(),
            payload: PayloadConfig::default(),
            code: CodeConfig::default(),
            placement: PlacementConfig::default(),
            network: NetworkConfig::default(),
            power_outage: PowerOutageConfig::default(),
            trace: TraceConfig::default(),
            estimator: EstimatorConfig::default(),
        }
    }
}

impl Config {
    /// Validate the preconditions a misconfigured run would otherwise fail
    /// on mid-simulation. Called once, before any iteration is constructed.
    pub fn validate(&self) -> Result<(), String> {
        let total_capacity_mib = self.topology.num_racks as u64
            * self.topology.nodes_per_rack as u64
            * self.topology.disks_per_node as u64
            * self.topology.capacity_per_disk_mib;
        let required_mib =
            self.code.n as u64 * self.payload.num_stripes as u64 * self.payload.chunk_size_mib;
        if total_capacity_mib < required_mib {
            return Err(format!(
                "total capacity {total_capacity_mib} MiB is less than required {required_mib} MiB"
            ));
        }

        if self.code.k >= self.code.n {
            return Err(format!(
                "code_k ({}) must be less than code_n ({})",
                self.code.k, self.code.n
            ));
        }

        if self.network.enabled && self.network.cross_rack_bwth_mibps > self.network.intra_rack_bwth_mibps {
            return Err(
                "cross-rack bandwidth must be less than or equal to intra-rack bandwidth"
                    .to_string(),
            );
        }

        if matches!(self.placement.place_type, PlaceType::Hierarchical)
            && self.placement.chunk_rack_config.is_empty()
        {
            return Err("hierarchical placement requires chunk_rack_config".to_string());
        }

        if matches!(self.code.code_type, CodeType::Drc)
            && !matches!((self.code.n, self.code.k), (9, 6) | (9, 5))
        {
            return Err("DRC only supports (n=9,k=6) or (n=9,k=5)".to_string());
        }

        Ok(())
    }
}

/// Iteration/work-partitioning parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    /// Simulation horizon, in hours.
    pub mission_time_hours: f64,
    pub total_iterations: u64,
    pub num_processes: usize,
    /// Base PRNG seed; worker `i` seeds from `rseed_plus + i`.
    pub rseed_plus: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mission_time_hours: 87_600.0,
            total_iterations: 10_000,
            num_processes: 4,
            rseed_plus: 0,
        }
    }
}

/// Physical topology.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub num_racks: usize,
    pub nodes_per_rack: usize,
    pub disks_per_node: usize,
    pub capacity_per_disk_mib: u64,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            num_racks: 32,
            nodes_per_rack: 12,
            disks_per_node: 12,
            capacity_per_disk_mib: 8_000_000,
        }
    }
}

impl TopologyConfig {
    pub fn num_disks(&self) -> usize {
        self.num_racks * self.nodes_per_rack * self.disks_per_node
    }

    pub fn num_nodes(&self) -> usize {
        self.num_racks * self.nodes_per_rack
    }

    /// Rack index for a disk, by the fixed identity `disk / (nodes_per_rack * disks_per_node)`.
    pub fn rack_of_disk(&self, disk: usize) -> usize {
        disk / (self.nodes_per_rack * self.disks_per_node)
    }

    /// Node index for a disk, by the fixed identity `disk / disks_per_node`.
    pub fn node_of_disk(&self, disk: usize) -> usize {
        disk / self.disks_per_node
    }

    /// Rack index for a node, by the fixed identity `node / nodes_per_rack`.
    pub fn rack_of_node(&self, node: usize) -> usize {
        node / self.nodes_per_rack
    }

    /// Node indices belonging to `rack`.
    pub fn nodes_in_rack(&self, rack: usize) -> std::ops::Range<usize> {
        let start = rack * self.nodes_per_rack;
        start..start + self.nodes_per_rack
    }

    /// Disk indices belonging to `node`.
    pub fn disks_in_node(&self, node: usize) -> std::ops::Range<usize> {
        let start = node * self.disks_per_node;
        start..start + self.disks_per_node
    }

    /// Disk indices belonging to `rack`.
    pub fn disks_in_rack(&self, rack: usize) -> std::ops::Range<usize> {
        let start = rack * self.nodes_per_rack * self.disks_per_node;
        start..start + self.nodes_per_rack * self.disks_per_node
    }
}

/// Stripe/chunk payload parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PayloadConfig {
    pub chunk_size_mib: u64,
    pub num_stripes: usize,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            chunk_size_mib: 64,
            num_stripes: 1_000,
        }
    }
}

/// Erasure code family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeType {
    Rs,
    Lrc,
    Drc,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CodeConfig {
    pub code_type: CodeType,
    /// Stripe width.
    pub n: usize,
    /// Data chunks.
    pub k: usize,
    /// Local parity groups (LRC only).
    pub l: usize,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            code_type: CodeType::Rs,
            n: 14,
            k: 10,
            l: 0,
        }
    }
}

/// Chunk placement strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceType {
    Flat,
    Hierarchical,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlacementConfig {
    pub place_type: PlaceType,
    /// Chunks per rack, one entry per rack spanned by a stripe. Required by
    /// `Hierarchical` (and implied `[3, 3, 3]` for DRC).
    pub chunk_rack_config: Vec<usize>,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            place_type: PlaceType::Flat,
            chunk_rack_config: Vec::new(),
        }
    }
}

/// Cross-rack / intra-rack repair bandwidth budget.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub enabled: bool,
    pub cross_rack_bwth_mibps: u64,
    pub intra_rack_bwth_mibps: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cross_rack_bwth_mibps: 125,
            intra_rack_bwth_mibps: 1_000,
        }
    }
}

/// Correlated, per-rack power-outage failure mode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PowerOutageConfig {
    pub enabled: bool,
    /// Mean time between outages for a single rack, in hours.
    pub mean_outage_interval_hours: f64,
    /// Duration of an outage, in hours.
    pub outage_duration_hours: f64,
    /// Probability a node fails permanently during an outage it sits in.
    pub node_kill_probability: f64,
}

impl Default for PowerOutageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mean_outage_interval_hours: 4_380.0,
            outage_duration_hours: 2.0,
            node_kill_probability: 0.01,
        }
    }
}

/// Trace-replay mode, as an alternative to distribution-based draws.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceConfig {
    pub enabled: bool,
    pub trace_id: u32,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trace_id: 0,
        }
    }
}

/// Which simulator drives the run, and its importance-sampling parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimType {
    Regular,
    Unifbfb,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub sim_type: SimType,
    /// Balanced failure biasing probability.
    pub fb_prob: f64,
    /// Uniformization rate; must upper-bound the aggregate failure rate.
    pub beta: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            sim_type: SimType::Regular,
            fb_prob: 0.5,
            beta: 1.0e5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn undersized_capacity_is_rejected() {
        let mut cfg = Config::default();
        cfg.topology.capacity_per_disk_mib = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cross_rack_must_not_exceed_intra_rack_bandwidth() {
        let mut cfg = Config::default();
        cfg.network.cross_rack_bwth_mibps = 2_000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn hierarchical_placement_requires_chunk_rack_config() {
        let mut cfg = Config::default();
        cfg.placement.place_type = PlaceType::Hierarchical;
        assert!(cfg.validate().is_err());
        cfg.placement.chunk_rack_config = vec![3, 3, 3];
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn drc_rejects_unsupported_n_k() {
        let mut cfg = Config::default();
        cfg.code.code_type = CodeType::Drc;
        cfg.code.n = 9;
        cfg.code.k = 7;
        assert!(cfg.validate().is_err());
        cfg.code.k = 6;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn disk_rack_node_identities_match_fixed_formulas() {
        let topo = TopologyConfig {
            num_racks: 4,
            nodes_per_rack: 3,
            disks_per_node: 2,
            capacity_per_disk_mib: 1,
        };
        assert_eq!(topo.num_disks(), 24);
        assert_eq!(topo.node_of_disk(5), 2);
        assert_eq!(topo.rack_of_disk(7), 1);
        assert_eq!(topo.rack_of_node(4), 1);
    }
}
