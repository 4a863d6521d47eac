use std::collections::HashSet;

use edcsim_common::config::{CodeType, PlaceType, PlacementConfig, TopologyConfig};
use edcsim_common::{Error, Result};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::code::Code;
use crate::lrc::{ChunkRole, LrcLayout};

/// Per-stripe disk placement plus the reverse disk-to-stripes index, and
/// the code-aware data-loss/cross-rack-traffic oracle over them.
///
/// Built once per iteration from a fresh PRNG draw and never mutated
/// afterwards; both indices are immutable for the life of the placement.
pub struct Placement {
    code: Code,
    place_type: PlaceType,
    lrc_layout: Option<LrcLayout>,
    /// `stripes_location[s][i]` = disk id holding chunk `i` of stripe `s`.
    stripes_location: Vec<Vec<usize>>,
    /// `stripes_per_disk[d]` = every stripe touching disk `d`.
    stripes_per_disk: Vec<Vec<usize>>,
}

/// (# failed stripes, # lost chunks across those stripes).
pub type FailedStatus = (usize, usize);

/// Result of planning the repair of every stripe touching one disk.
pub struct RepairPlan {
    pub stripes: Vec<usize>,
    pub cross_rack_chunks: f64,
    pub single_chunk_repairs: usize,
    pub delayed_stripes: Vec<usize>,
}

impl Placement {
    pub fn generate<R: Rng + ?Sized>(
        code: Code,
        placement: &PlacementConfig,
        topology: &TopologyConfig,
        num_stripes: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let lrc_layout = matches!(code.kind, CodeType::Lrc)
            .then(|| LrcLayout::new(code.n, code.k, code.l));

        let place_type = if matches!(code.kind, CodeType::Drc) {
            PlaceType::Hierarchical
        } else {
            placement.place_type
        };

        let chunk_rack_config: Vec<usize> = if matches!(code.kind, CodeType::Drc) {
            vec![3, 3, 3]
        } else {
            placement.chunk_rack_config.clone()
        };

        if matches!(place_type, PlaceType::Flat) && topology.num_racks < code.n {
            return Err(Error::configuration(format!(
                "FLAT placement requires at least {} racks, topology has {}",
                code.n, topology.num_racks
            )));
        }
        if matches!(place_type, PlaceType::Hierarchical) {
            let sum: usize = chunk_rack_config.iter().sum();
            if sum != code.n {
                return Err(Error::configuration(format!(
                    "chunk_rack_config sums to {sum}, expected code width {}",
                    code.n
                )));
            }
        }

        let mut stripes_location = Vec::with_capacity(num_stripes);
        for _ in 0..num_stripes {
            let disks = match place_type {
                PlaceType::Flat => Self::place_flat(code.n, topology, rng)?,
                PlaceType::Hierarchical => {
                    Self::place_hierarchical(&chunk_rack_config, topology, rng)?
                }
            };
            stripes_location.push(disks);
        }

        let mut stripes_per_disk = vec![Vec::new(); topology.num_disks()];
        for (s, disks) in stripes_location.iter().enumerate() {
            for &d in disks {
                stripes_per_disk[d].push(s);
            }
        }

        Ok(Self {
            code,
            place_type,
            lrc_layout,
            stripes_location,
            stripes_per_disk,
        })
    }

    fn place_flat<R: Rng + ?Sized>(n: usize, topology: &TopologyConfig, rng: &mut R) -> Result<Vec<usize>> {
        let mut racks: Vec<usize> = (0..topology.num_racks).collect();
        racks.shuffle(rng);
        racks.truncate(n);

        let mut disks = Vec::with_capacity(n);
        for rack in racks {
            let rack_disks: Vec<usize> = topology.disks_in_rack(rack).collect();
            let disk = *rack_disks
                .choose(rng)
                .ok_or_else(|| Error::internal("rack has no disks"))?;
            disks.push(disk);
        }
        Ok(disks)
    }

    fn place_hierarchical<R: Rng + ?Sized>(
        config: &[usize],
        topology: &TopologyConfig,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        let mut racks: Vec<usize> = (0..topology.num_racks).collect();
        racks.shuffle(rng);
        racks.truncate(config.len());

        let mut disks = Vec::with_capacity(config.iter().sum());
        for (&rack, &count) in racks.iter().zip(config.iter()) {
            let mut nodes: Vec<usize> = topology.nodes_in_rack(rack).collect();
            nodes.shuffle(rng);
            nodes.truncate(count);
            for node in nodes {
                let node_disks: Vec<usize> = topology.disks_in_node(node).collect();
                let disk = *node_disks
                    .choose(rng)
                    .ok_or_else(|| Error::internal("node has no disks"))?;
                disks.push(disk);
            }
        }
        Ok(disks)
    }

    pub fn place_type(&self) -> PlaceType {
        self.place_type
    }

    pub fn code(&self) -> &Code {
        &self.code
    }

    pub fn stripes_location(&self, stripe: usize) -> &[usize] {
        &self.stripes_location[stripe]
    }

    pub fn stripes_per_disk(&self, disk: usize) -> &[usize] {
        &self.stripes_per_disk[disk]
    }

    pub fn num_stripes(&self) -> usize {
        self.stripes_location.len()
    }

    fn touched_stripes(&self, failed_disks: &[usize]) -> Vec<usize> {
        let mut touched: HashSet<usize> = HashSet::new();
        for &d in failed_disks {
            touched.extend(self.stripes_per_disk[d].iter().copied());
        }
        let mut touched: Vec<usize> = touched.into_iter().collect();
        touched.sort_unstable();
        touched
    }

    /// Whether any stripe touched by `failed_disks` has lost data.
    pub fn check_data_loss(&self, failed_disks: &[usize]) -> bool {
        let failed: HashSet<usize> = failed_disks.iter().copied().collect();
        self.touched_stripes(failed_disks)
            .into_iter()
            .any(|s| self.stripe_is_lost(s, &failed))
    }

    /// `(# failed stripes, # lost chunks across those stripes)`.
    pub fn get_num_failed_status(&self, failed_disks: &[usize]) -> FailedStatus {
        let failed: HashSet<usize> = failed_disks.iter().copied().collect();
        let mut failed_stripes = 0;
        let mut lost_chunks = 0;
        for s in self.touched_stripes(failed_disks) {
            if self.stripe_is_lost(s, &failed) {
                failed_stripes += 1;
                lost_chunks += self.stripes_location[s]
                    .iter()
                    .filter(|d| failed.contains(d))
                    .count();
            }
        }
        (failed_stripes, lost_chunks)
    }

    fn stripe_is_lost(&self, stripe: usize, failed: &HashSet<usize>) -> bool {
        let disks = &self.stripes_location[stripe];
        match self.code.kind {
            CodeType::Rs | CodeType::Drc => {
                let count = disks.iter().filter(|d| failed.contains(d)).count();
                count > self.code.n - self.code.k
            }
            CodeType::Lrc => {
                let layout = self.lrc_layout.as_ref().expect("lrc layout built for LRC code");
                let mut global_failures = 0usize;
                let mut group_failures = vec![0usize; layout.l];
                let mut local_parity_alive = vec![true; layout.l];
                for (pos, &disk) in disks.iter().enumerate() {
                    let failed_here = failed.contains(&disk);
                    match layout.role(pos) {
                        ChunkRole::Global => {
                            if failed_here {
                                global_failures += 1;
                            }
                        }
                        ChunkRole::LocalParity(g) => {
                            if failed_here {
                                local_parity_alive[g] = false;
                            }
                        }
                        ChunkRole::Data(g) => {
                            if failed_here {
                                group_failures[g] += 1;
                            }
                        }
                    }
                }
                let mut sum = global_failures;
                for g in 0..layout.l {
                    let mut remaining = group_failures[g];
                    if local_parity_alive[g] && remaining > 0 {
                        remaining -= 1;
                    }
                    sum += remaining;
                }
                sum > self.code.n - self.code.k - self.code.l
            }
        }
    }

    /// `n - k` for this code, the maximum tolerable number of unavailable
    /// chunks in any stripe before its repair must be delayed.
    pub fn tolerance(&self) -> usize {
        self.code.n - self.code.k
    }

    /// Whether stripe `s` currently has more unavailable chunks than this
    /// code's tolerance, counting both permanent and transient
    /// unavailability (`is_alive` should reflect both).
    pub fn stripe_needs_delay(&self, stripe: usize, is_alive: impl Fn(usize) -> bool) -> bool {
        let unavailable = self.stripes_location[stripe]
            .iter()
            .filter(|&&d| !is_alive(d))
            .count();
        unavailable > self.tolerance()
    }

    fn position_in_stripe(&self, stripe: usize, disk: usize) -> Option<usize> {
        self.stripes_location[stripe].iter().position(|&d| d == disk)
    }

    /// Cross-rack chunk-equivalents required to repair every stripe
    /// touching `disk_idx`, given a predicate for whether a disk is
    /// permanently failed (CRASHED). Transiently-unavailable disks still
    /// count as able to serve repair traffic here; see `plan_repair`.
    pub fn cross_rack_chunks(
        &self,
        disk_idx: usize,
        topology: &TopologyConfig,
        is_failed: impl Fn(usize) -> bool,
    ) -> Result<f64> {
        Ok(self
            .plan_repair(disk_idx, topology, &is_failed, &is_failed)?
            .cross_rack_chunks)
    }

    /// Full repair plan for every stripe touching `disk_idx`: the stripes
    /// themselves, the aggregate cross-rack traffic (§4.2), how many of
    /// them are single-chunk repairs, and which ones must be delayed
    /// because they currently have more than `n - k` unavailable chunks.
    ///
    /// Two distinct predicates, per the source's own split: `is_unavailable`
    /// (CRASHED or transiently UNAVAILABLE) drives only the delay test;
    /// `is_failed` (CRASHED only) drives the single-chunk count, the
    /// single-vs-multi-chunk branch, and every "alive" count fed into the
    /// cross-rack traffic rules, since a transiently-offline disk in the
    /// same rack can still serve repair traffic once it comes back online
    /// within the repair window.
    pub fn plan_repair(
        &self,
        disk_idx: usize,
        topology: &TopologyConfig,
        is_unavailable: impl Fn(usize) -> bool,
        is_failed: impl Fn(usize) -> bool,
    ) -> Result<RepairPlan> {
        let repair_rack = topology.rack_of_disk(disk_idx);
        let mut cross_rack_chunks = 0.0;
        let mut single_chunk_repairs = 0;
        let mut delayed_stripes = Vec::new();
        let stripes = self.stripes_per_disk[disk_idx].clone();

        for &s in &stripes {
            let disks = &self.stripes_location[s];
            let unavailable_count = disks.iter().filter(|&&d| is_unavailable(d)).count();
            if unavailable_count > self.code.n - self.code.k {
                delayed_stripes.push(s);
            }
            let failed_count = disks.iter().filter(|&&d| is_failed(d)).count();
            if failed_count == 1 {
                single_chunk_repairs += 1;
            }
            let pos = self
                .position_in_stripe(s, disk_idx)
                .ok_or_else(|| Error::internal("disk not found in its own stripe"))?;

            cross_rack_chunks += match self.code.kind {
                CodeType::Rs => self.rs_rule(disks, repair_rack, topology, &is_failed),
                CodeType::Drc => {
                    if failed_count <= 1 {
                        self.code.drc_single_chunk_cost()?
                    } else {
                        self.rs_rule(disks, repair_rack, topology, &is_failed)
                    }
                }
                CodeType::Lrc => {
                    if failed_count <= 1 {
                        self.lrc_single_chunk_rule(disks, pos, repair_rack, topology, &is_failed)
                    } else {
                        self.rs_rule(disks, repair_rack, topology, &is_failed)
                    }
                }
            };
        }

        Ok(RepairPlan {
            stripes,
            cross_rack_chunks,
            single_chunk_repairs,
            delayed_stripes,
        })
    }

    fn rs_rule(
        &self,
        disks: &[usize],
        repair_rack: usize,
        topology: &TopologyConfig,
        is_failed: &impl Fn(usize) -> bool,
    ) -> f64 {
        let alive_same_rack = disks
            .iter()
            .filter(|&&d| topology.rack_of_disk(d) == repair_rack && !is_failed(d))
            .count();
        if alive_same_rack < self.code.k {
            (self.code.k - alive_same_rack) as f64
        } else {
            0.0
        }
    }

    fn lrc_single_chunk_rule(
        &self,
        disks: &[usize],
        pos: usize,
        repair_rack: usize,
        topology: &TopologyConfig,
        is_failed: &impl Fn(usize) -> bool,
    ) -> f64 {
        let layout = self.lrc_layout.as_ref().expect("lrc layout built for LRC code");
        match layout.role(pos) {
            ChunkRole::Global => self.rs_rule(disks, repair_rack, topology, is_failed),
            ChunkRole::Data(g) | ChunkRole::LocalParity(g) => {
                let quota = layout.group_quota();
                let alive_in_group = layout.data_group[g]
                    .iter()
                    .chain(std::iter::once(&layout.local_parity[g]))
                    .filter(|&&p| {
                        let d = disks[p];
                        topology.rack_of_disk(d) == repair_rack && !is_failed(d)
                    })
                    .count();
                if alive_in_group < quota {
                    (quota - alive_in_group) as f64
                } else {
                    0.0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edcsim_common::config::CodeConfig;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn topo(racks: usize, nodes: usize, disks: usize) -> TopologyConfig {
        TopologyConfig {
            num_racks: racks,
            nodes_per_rack: nodes,
            disks_per_node: disks,
            capacity_per_disk_mib: 1,
        }
    }

    #[test]
    fn flat_placement_lands_on_distinct_racks() {
        let code = Code::from_config(&CodeConfig {
            code_type: CodeType::Rs,
            n: 6,
            k: 3,
            l: 0,
        })
        .unwrap();
        let topology = topo(8, 1, 1);
        let placement_cfg = PlacementConfig {
            place_type: PlaceType::Flat,
            chunk_rack_config: Vec::new(),
        };
        let mut rng = StdRng::seed_from_u64(1);
        let placement = Placement::generate(code, &placement_cfg, &topology, 10, &mut rng).unwrap();
        for s in 0..10 {
            let disks = placement.stripes_location(s);
            let racks: HashSet<usize> = disks.iter().map(|&d| topology.rack_of_disk(d)).collect();
            assert_eq!(racks.len(), 6);
        }
    }

    #[test]
    fn placement_is_deterministic_given_a_seed() {
        let code = Code::from_config(&CodeConfig {
            code_type: CodeType::Rs,
            n: 6,
            k: 3,
            l: 0,
        })
        .unwrap();
        let topology = topo(8, 2, 2);
        let placement_cfg = PlacementConfig {
            place_type: PlaceType::Flat,
            chunk_rack_config: Vec::new(),
        };
        let mut r1 = StdRng::seed_from_u64(99);
        let p1 = Placement::generate(code.clone(), &placement_cfg, &topology, 5, &mut r1).unwrap();
        let mut r2 = StdRng::seed_from_u64(99);
        let p2 = Placement::generate(code, &placement_cfg, &topology, 5, &mut r2).unwrap();
        for s in 0..5 {
            assert_eq!(p1.stripes_location(s), p2.stripes_location(s));
        }
    }

    #[test]
    fn rs_exactly_n_minus_k_failures_is_not_loss_one_more_is() {
        let code = Code::from_config(&CodeConfig {
            code_type: CodeType::Rs,
            n: 6,
            k: 3,
            l: 0,
        })
        .unwrap();
        let topology = topo(6, 1, 1);
        let placement_cfg = PlacementConfig {
            place_type: PlaceType::Flat,
            chunk_rack_config: Vec::new(),
        };
        let mut rng = StdRng::seed_from_u64(3);
        let placement = Placement::generate(code, &placement_cfg, &topology, 1, &mut rng).unwrap();
        let disks = placement.stripes_location(0).to_vec();

        assert!(!placement.check_data_loss(&disks[0..3]));
        assert!(placement.check_data_loss(&disks[0..4]));
        let (failed_stripes, lost_chunks) = placement.get_num_failed_status(&disks[0..4]);
        assert_eq!((failed_stripes, lost_chunks), (1, 4));
    }

    #[test]
    fn lrc_group_absorbs_one_failure_via_local_parity() {
        let code = Code::from_config(&CodeConfig {
            code_type: CodeType::Lrc,
            n: 16,
            k: 12,
            l: 2,
        })
        .unwrap();
        let topology = topo(16, 1, 1);
        let placement_cfg = PlacementConfig {
            place_type: PlaceType::Flat,
            chunk_rack_config: Vec::new(),
        };
        let mut rng = StdRng::seed_from_u64(5);
        let placement = Placement::generate(code, &placement_cfg, &topology, 1, &mut rng).unwrap();
        let disks = placement.stripes_location(0).to_vec();

        // Positions 0,1,2 are group-0 data chunks; local parity at 6 alive.
        let failed: Vec<usize> = vec![disks[0], disks[1], disks[2]];
        assert!(!placement.check_data_loss(&failed));

        let failed_four: Vec<usize> = vec![disks[0], disks[1], disks[2], disks[3]];
        assert!(placement.check_data_loss(&failed_four));
    }
}
