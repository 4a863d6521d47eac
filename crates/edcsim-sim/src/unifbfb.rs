use edcsim_common::config::{Config, TopologyConfig};
use edcsim_common::{Error, Result};
use edcsim_device::{DiskState, Fleet, NodeState};
use edcsim_distributions::PRECISION_BITS;
use edcsim_network::Network;
use edcsim_placement::{Code, Placement};
use edcsim_state::{SysState, SystemState};
use rand::Rng;
use rand_distr::{Distribution, Exp};
use rug::Float;

use crate::distributions;
use crate::sample::Sample;

/// The uniformization / balanced-failure-biasing simulator (§4.7). Unlike
/// the regular simulator, it never models node-transient or rack events:
/// the source this is based on only ever biases disk and node permanent
/// failures, so those are the only two device kinds this path schedules.
pub struct UnifbfbSimulator {
    config: Config,
    code: Code,
    fb_prob: f64,
    /// Uniformization rate, must upper-bound the aggregate failure rate
    /// encountered at any point in the run.
    beta: f64,
}

impl UnifbfbSimulator {
    pub fn new(config: Config) -> Result<Self> {
        let code = Code::from_config(&config.code)?;
        let fb_prob = config.estimator.fb_prob;
        let beta = config.estimator.beta;
        if !(fb_prob > 0.0 && fb_prob < 1.0) {
            return Err(Error::configuration("fb_prob must be in (0, 1)"));
        }
        if beta <= 0.0 {
            return Err(Error::configuration("beta (uniformization rate) must be positive"));
        }
        Ok(Self {
            config,
            code,
            fb_prob,
            beta,
        })
    }

    pub fn run_iteration<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Sample> {
        let mut run = Run::new(self, rng)?;
        run.simulate(rng)
    }
}

enum RepairTarget {
    Disk(usize),
    Node(usize),
}

struct PendingRepair {
    time: f64,
    target: RepairTarget,
}

enum StepOutcome {
    DiskFail(usize),
    NodeFail(usize),
    DiskRepair(usize),
    NodeRepair(usize),
    /// A candidate transition rejected by failure biasing; clocks advance
    /// but no device changes state, so the caller must not re-check loss.
    Pseudo,
}

struct Run<'a> {
    sim: &'a UnifbfbSimulator,
    topology: TopologyConfig,
    fleet: Fleet,
    state: SystemState,
    network: Option<Network>,
    placement: Placement,
    repair_queue: Vec<PendingRepair>,
    curr_time: f64,
    lr: Float,
}

impl<'a> Run<'a> {
    fn new<R: Rng + ?Sized>(sim: &'a UnifbfbSimulator, rng: &mut R) -> Result<Self> {
        let cfg = &sim.config;
        let topology = cfg.topology.clone();
        let fleet = Fleet::new(topology.num_racks, topology.nodes_per_rack, topology.disks_per_node);
        let state = SystemState::new(topology.num_disks(), topology.num_nodes());
        let network = cfg
            .network
            .enabled
            .then(|| Network::new(topology.num_racks, cfg.network.cross_rack_bwth_mibps as f64, cfg.network.intra_rack_bwth_mibps as f64));
        let placement = Placement::generate(
            sim.code.clone(),
            &cfg.placement,
            &topology,
            cfg.payload.num_stripes,
            rng,
        )?;

        Ok(Self {
            sim,
            topology,
            fleet,
            state,
            network,
            placement,
            repair_queue: Vec::new(),
            curr_time: 0.0,
            lr: Float::with_val(PRECISION_BITS, 1.0),
        })
    }

    fn mission_time(&self) -> f64 {
        self.sim.config.run.mission_time_hours
    }

    fn disk_failure_rate(&self) -> Float {
        let mut sum = Float::with_val(PRECISION_BITS, 0.0);
        for disk in &self.fleet.disks {
            if disk.state != DiskState::Crashed {
                sum += distributions::disk_fail().hazard_rate(disk.age(self.curr_time));
            }
        }
        sum
    }

    fn node_failure_rate(&self) -> Float {
        let mut sum = Float::with_val(PRECISION_BITS, 0.0);
        for node in &self.fleet.nodes {
            if node.state != NodeState::Crashed {
                sum += distributions::node_fail().hazard_rate(node.age(self.curr_time));
            }
        }
        sum
    }

    fn disk_repair_duration<R: Rng + ?Sized>(&self, disk: usize, rng: &mut R) -> Result<f64> {
        match &self.network {
            None => Ok(distributions::disk_repair_no_network().draw(rng)),
            Some(network) => {
                let chunks = self.placement.cross_rack_chunks(disk, &self.topology, |d| {
                    self.fleet.disks[d].state == DiskState::Crashed
                })?;
                Ok(Network::repair_duration_hours(
                    chunks,
                    self.sim.config.payload.chunk_size_mib as f64,
                    network.avail_cross_rack(),
                ))
            }
        }
    }

    /// The time the repair server becomes free: repairs here model a
    /// single shared channel, so a new job's completion stacks after every
    /// job already queued rather than running concurrently.
    fn latest_scheduled(&self) -> f64 {
        self.repair_queue
            .iter()
            .map(|r| r.time)
            .fold(self.curr_time, f64::max)
    }

    fn earliest_repair_index(&self) -> Option<usize> {
        self.repair_queue
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.time.total_cmp(&b.1.time))
            .map(|(i, _)| i)
    }

    fn schedule_disk_repair<R: Rng + ?Sized>(&mut self, disk: usize, rng: &mut R) -> Result<()> {
        let duration = self.disk_repair_duration(disk, rng)?;
        let time = self.latest_scheduled() + duration;
        self.repair_queue.push(PendingRepair {
            time,
            target: RepairTarget::Disk(disk),
        });
        Ok(())
    }

    /// A node-repair event restores every disk on the node at once; per
    /// the source this is based on, its duration is the sum of each
    /// disk's individual repair duration.
    fn schedule_node_repair<R: Rng + ?Sized>(&mut self, node: usize, rng: &mut R) -> Result<()> {
        let mut total = 0.0;
        for disk in self.topology.disks_in_node(node) {
            total += self.disk_repair_duration(disk, rng)?;
        }
        let time = self.latest_scheduled() + total;
        self.repair_queue.push(PendingRepair {
            time,
            target: RepairTarget::Node(node),
        });
        Ok(())
    }

    fn apply_disk_fail(&mut self, disk: usize, time: f64) {
        if self.fleet.fail_disk(disk, time) {
            self.state.mark_disk_failed(disk);
        }
    }

    fn apply_node_fail(&mut self, node: usize, time: f64) {
        let newly_crashed = self.fleet.fail_node(node, time);
        self.state.mark_node_failed(node);
        for disk in newly_crashed {
            self.state.mark_disk_failed(disk);
        }
    }

    fn apply_disk_repair(&mut self, disk: usize, time: f64) {
        self.fleet.repair_disk(disk, time);
        self.state.mark_disk_repaired(disk);
    }

    /// Restores every disk on `node` to NORMAL; does not touch unavailable-
    /// time bookkeeping, matching the source's UnifBFB path (blocked ratio
    /// is reported as a constant 0 for this estimator, per §4.7).
    fn apply_node_repair(&mut self, node: usize, time: f64) {
        for disk in self.topology.disks_in_node(node) {
            self.apply_disk_repair(disk, time);
        }
        self.fleet.maybe_repair_node(node, time);
        self.state.mark_node_repaired(node);
    }

    fn next_event<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(f64, StepOutcome)> {
        match self.state.sys_state() {
            SysState::Ok => {
                let mut best_time = f64::INFINITY;
                let mut best_is_node = false;
                let mut best_idx = 0usize;

                for disk in 0..self.topology.num_disks() {
                    let age = self.fleet.disks[disk].age(self.curr_time);
                    let t = distributions::disk_fail().draw_inverse_transform(rng, age) + self.curr_time;
                    if t < best_time {
                        best_time = t;
                        best_is_node = false;
                        best_idx = disk;
                    }
                }
                for node in 0..self.topology.num_nodes() {
                    let age = self.fleet.nodes[node].age(self.curr_time);
                    let t = distributions::node_fail().draw_inverse_transform(rng, age) + self.curr_time;
                    if t < best_time {
                        best_time = t;
                        best_is_node = true;
                        best_idx = node;
                    }
                }

                if best_time.is_infinite() {
                    return Err(Error::internal("no devices to draw a failure time from"));
                }

                if best_is_node {
                    self.apply_node_fail(best_idx, best_time);
                    self.schedule_node_repair(best_idx, rng)?;
                    Ok((best_time, StepOutcome::NodeFail(best_idx)))
                } else {
                    self.apply_disk_fail(best_idx, best_time);
                    self.schedule_disk_repair(best_idx, rng)?;
                    Ok((best_time, StepOutcome::DiskFail(best_idx)))
                }
            }

            SysState::Degraded => {
                let repair_idx = self
                    .earliest_repair_index()
                    .ok_or_else(|| Error::internal("repair_queue is empty while system is degraded"))?;

                let exp = Exp::new(self.sim.beta)
                    .map_err(|e| Error::internal(format!("invalid uniformization rate: {e}")))?;
                let candidate_time = self.curr_time + exp.sample(rng);
                let repair_time = self.repair_queue[repair_idx].time;

                if repair_time <= candidate_time {
                    let repair = self.repair_queue.remove(repair_idx);
                    return Ok(match repair.target {
                        RepairTarget::Disk(disk) => {
                            self.apply_disk_repair(disk, repair.time);
                            (repair.time, StepOutcome::DiskRepair(disk))
                        }
                        RepairTarget::Node(node) => {
                            self.apply_node_repair(node, repair.time);
                            (repair.time, StepOutcome::NodeRepair(node))
                        }
                    });
                }

                let disk_rate = self.disk_failure_rate();
                let node_rate = self.node_failure_rate();
                let lambda = disk_rate.clone() + node_rate.clone();
                let beta = Float::with_val(PRECISION_BITS, self.sim.beta);
                let one = Float::with_val(PRECISION_BITS, 1.0);

                let draw: f64 = rng.r#gen();
                if draw > self.sim.fb_prob {
                    let fb = Float::with_val(PRECISION_BITS, self.sim.fb_prob);
                    self.lr *= (one.clone() - lambda / &beta) / (one - fb);
                    Ok((candidate_time, StepOutcome::Pseudo))
                } else {
                    let fb = Float::with_val(PRECISION_BITS, self.sim.fb_prob);
                    self.lr *= (lambda.clone() / &beta) / fb;

                    let p_node = (node_rate / lambda).to_f64();
                    let pick_node: f64 = rng.r#gen();
                    if pick_node < p_node {
                        let avail = self.state.get_avail_nodes();
                        let node = avail[rng.gen_range(0..avail.len())];
                        self.apply_node_fail(node, candidate_time);
                        self.schedule_node_repair(node, rng)?;
                        Ok((candidate_time, StepOutcome::NodeFail(node)))
                    } else {
                        let avail = self.state.get_avail_disks();
                        let disk = avail[rng.gen_range(0..avail.len())];
                        self.apply_disk_fail(disk, candidate_time);
                        self.schedule_disk_repair(disk, rng)?;
                        Ok((candidate_time, StepOutcome::DiskFail(disk)))
                    }
                }
            }
        }
    }

    fn simulate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Sample> {
        let mission_time = self.mission_time();
        loop {
            let (event_time, outcome) = self.next_event(rng)?;
            self.curr_time = event_time;
            if event_time > mission_time {
                break;
            }

            if matches!(outcome, StepOutcome::DiskFail(_) | StepOutcome::NodeFail(_)) {
                let failed = self.state.get_failed_disks();
                if self.placement.check_data_loss(&failed) {
                    let (failed_stripes, lost_chunks) = self.placement.get_num_failed_status(&failed);
                    let one = Float::with_val(PRECISION_BITS, 1.0);
                    let weight = if self.lr > one { 1.0 } else { self.lr.to_f64() };
                    return Ok(Sample::loss(weight, failed_stripes, lost_chunks, 0.0, 0.0));
                }
            }
        }
        Ok(Sample::no_loss(0.0, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edcsim_common::config::{CodeConfig, CodeType, EstimatorConfig, PayloadConfig, PlaceType, PlacementConfig, RunConfig, SimType, TopologyConfig as Topo};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn small_config() -> Config {
        let mut cfg = Config::default();
        cfg.run = RunConfig {
            mission_time_hours: 100.0,
            total_iterations: 1,
            num_processes: 1,
            rseed_plus: 0,
        };
        cfg.topology = Topo {
            num_racks: 4,
            nodes_per_rack: 2,
            disks_per_node: 1,
            capacity_per_disk_mib: 1_000_000,
        };
        cfg.payload = PayloadConfig {
            chunk_size_mib: 64,
            num_stripes: 5,
        };
        cfg.code = CodeConfig {
            code_type: CodeType::Rs,
            n: 4,
            k: 2,
            l: 0,
        };
        cfg.placement = PlacementConfig {
            place_type: PlaceType::Flat,
            chunk_rack_config: Vec::new(),
        };
        cfg.network.enabled = false;
        cfg.estimator = EstimatorConfig {
            sim_type: SimType::Unifbfb,
            fb_prob: 0.5,
            beta: 1.0e5,
        };
        cfg
    }

    #[test]
    fn rejects_fb_prob_outside_open_unit_interval() {
        let mut cfg = small_config();
        cfg.estimator.fb_prob = 1.0;
        assert!(UnifbfbSimulator::new(cfg).is_err());
    }

    #[test]
    fn rejects_nonpositive_beta() {
        let mut cfg = small_config();
        cfg.estimator.beta = 0.0;
        assert!(UnifbfbSimulator::new(cfg).is_err());
    }

    #[test]
    fn an_iteration_returns_a_weight_in_zero_one() {
        let cfg = small_config();
        let sim = UnifbfbSimulator::new(cfg).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let sample = sim.run_iteration(&mut rng).unwrap();
        assert!(sample.weight >= 0.0 && sample.weight <= 1.0);
        assert_eq!(sample.blocked_ratio, 0.0);
        assert_eq!(sample.single_chunk_ratio, 0.0);
    }
}
