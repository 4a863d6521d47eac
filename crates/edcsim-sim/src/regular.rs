use std::collections::{HashMap, VecDeque};

use edcsim_common::config::{Config, TopologyConfig};
use edcsim_common::{Error, Result};
use edcsim_device::{DiskState, Fleet, NodeState, RackState};
use edcsim_network::Network;
use edcsim_placement::{Code, Placement};
use edcsim_state::SystemState;
use edcsim_trace::{EventKind as TraceKind, TraceReader};
use rand::Rng;
use rand_distr::{Distribution, Exp};

use crate::distributions::{self, FailureSource};
use crate::event::{EventKind, EventQueue};
use crate::sample::Sample;

/// The semi-Markov, event-queue-driven simulator (§4.6). Long-lived parts
/// (configuration, the erasure code, the trace reader) are built once;
/// `run_iteration` builds the per-iteration parts (placement, device
/// state, event queue) fresh from a supplied PRNG and runs one mission.
pub struct RegularSimulator {
    config: Config,
    code: Code,
    trace_reader: Option<TraceReader>,
    /// Node-transient and rack-transient events fire unless power-outage
    /// mode is active, which supplies its own correlated-failure model
    /// instead (see DESIGN.md for why this crate does not carry forward
    /// the source's permanently-disabled `enable_transient_failures` flag).
    transients_enabled: bool,
}

impl RegularSimulator {
    pub fn new(config: Config, trace_reader: Option<TraceReader>) -> Result<Self> {
        let code = Code::from_config(&config.code)?;
        let transients_enabled = !config.power_outage.enabled;
        Ok(Self {
            config,
            code,
            trace_reader,
            transients_enabled,
        })
    }

    pub fn run_iteration<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Sample> {
        let mut run = Run::new(self, rng)?;
        run.simulate(rng)
    }
}

struct Run<'a> {
    sim: &'a RegularSimulator,
    topology: TopologyConfig,
    fleet: Fleet,
    state: SystemState,
    network: Option<Network>,
    placement: Placement,
    queue: EventQueue,
    wait_repair_queue: VecDeque<usize>,
    delayed_repair: HashMap<usize, Vec<usize>>,
    node_sources: Vec<FailureSource>,
    curr_time: f64,
    num_stripes_repaired: usize,
    num_stripes_repaired_single_chunk: usize,
}

impl<'a> Run<'a> {
    fn new<R: Rng + ?Sized>(sim: &'a RegularSimulator, rng: &mut R) -> Result<Self> {
        let cfg = &sim.config;
        let topology = cfg.topology.clone();
        let num_disks = topology.num_disks();
        let num_nodes = topology.num_nodes();

        let fleet = Fleet::new(topology.num_racks, topology.nodes_per_rack, topology.disks_per_node);
        let state = SystemState::new(num_disks, num_nodes);
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

        let mut run = Self {
            sim,
            topology,
            fleet,
            state,
            network,
            placement,
            queue: EventQueue::new(),
            wait_repair_queue: VecDeque::new(),
            delayed_repair: HashMap::new(),
            node_sources: Vec::with_capacity(num_nodes),
            curr_time: 0.0,
            num_stripes_repaired: 0,
            num_stripes_repaired_single_chunk: 0,
        };
        run.seed_initial_events(rng)?;
        Ok(run)
    }

    fn mission_time(&self) -> f64 {
        self.sim.config.run.mission_time_hours
    }

    fn seed_initial_events<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        let mission_time = self.mission_time();

        for disk in 0..self.topology.num_disks() {
            let src = FailureSource::Distribution(distributions::disk_fail());
            for t in src.initial_times(rng, mission_time) {
                self.queue.push(crate::event::Event::new(t, EventKind::DiskFail, disk));
            }
        }

        let use_trace = self.sim.config.trace.enabled;
        for node in 0..self.topology.num_nodes() {
            let src = if use_trace {
                let reader = self
                    .sim
                    .trace_reader
                    .as_ref()
                    .ok_or_else(|| Error::configuration("use_trace is set but no trace reader was configured"))?;
                FailureSource::Trace(reader.read(self.sim.config.trace.trace_id, node, TraceKind::Permanent)?)
            } else {
                FailureSource::Distribution(distributions::node_fail())
            };
            for t in src.initial_times(rng, mission_time) {
                self.queue.push(crate::event::Event::new(t, EventKind::NodeFail, node));
            }
            self.node_sources.push(src);

            if use_trace {
                let reader = self.sim.trace_reader.as_ref().expect("checked above");
                let fails = reader.read(self.sim.config.trace.trace_id, node, TraceKind::Transient)?;
                let repairs = reader.read(self.sim.config.trace.trace_id, node, TraceKind::TransientRepair)?;
                for (&fail_t, &repair_t) in fails.iter().zip(repairs.iter()) {
                    if fail_t <= mission_time {
                        self.queue.push(crate::event::Event::new(fail_t, EventKind::NodeTransientFail, node));
                    }
                    if repair_t <= mission_time {
                        self.queue.push(crate::event::Event::new(repair_t, EventKind::NodeTransientRepair, node));
                    }
                }
            } else if self.sim.transients_enabled {
                let t = distributions::node_transient_fail().draw(rng);
                if t <= mission_time {
                    self.queue.push(crate::event::Event::new(t, EventKind::NodeTransientFail, node));
                }
            }
        }

        if !use_trace && self.sim.transients_enabled && !self.sim.config.power_outage.enabled {
            for rack in 0..self.topology.num_racks {
                let t = distributions::rack_fail().draw(rng);
                if t <= mission_time {
                    self.queue.push(crate::event::Event::new(t, EventKind::RackFail, rack));
                }
            }
        }

        if !use_trace && self.sim.config.power_outage.enabled {
            self.seed_power_outage_events(rng)?;
        }

        Ok(())
    }

    fn seed_power_outage_events<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        let mission_time = self.mission_time();
        let po = &self.sim.config.power_outage;
        let rate = Exp::new(1.0 / po.mean_outage_interval_hours)
            .map_err(|e| Error::internal(format!("invalid power-outage rate: {e}")))?;

        for rack in 0..self.topology.num_racks {
            let mut occur_time = rate.sample(rng);
            while occur_time < mission_time {
                self.queue
                    .push(crate::event::Event::new(occur_time, EventKind::RackFail, rack));
                let end_time = occur_time + po.outage_duration_hours;
                self.queue
                    .push(crate::event::Event::new(end_time, EventKind::RackRepair, rack));
                for node in self.topology.nodes_in_rack(rack) {
                    if rng.r#gen::<f64>() < po.node_kill_probability {
                        self.queue
                            .push(crate::event::Event::new(end_time, EventKind::NodeFail, node));
                    }
                }
                occur_time += rate.sample(rng);
            }
        }
        Ok(())
    }

    fn is_alive(&self, disk: usize) -> bool {
        self.state.is_disk_alive(disk)
    }

    /// Whether the stripes touched by a disk still exceed this code's
    /// repair tolerance, counting both permanent and transient
    /// unavailability.
    fn reconcile_delayed_repairs(&mut self) {
        if self.delayed_repair.is_empty() {
            return;
        }
        let mut empty_keys = Vec::new();
        let stale: Vec<usize> = self.delayed_repair.keys().copied().collect();
        for disk in stale {
            let stripes = self.delayed_repair.get(&disk).expect("key just listed").clone();
            let still_delayed: Vec<usize> = stripes
                .into_iter()
                .filter(|&s| self.placement.stripe_needs_delay(s, |d| self.is_alive(d)))
                .collect();
            if still_delayed.is_empty() {
                empty_keys.push(disk);
            } else {
                self.delayed_repair.insert(disk, still_delayed);
            }
        }
        for disk in empty_keys {
            self.delayed_repair.remove(&disk);
        }
    }

    fn dispatch_wait_repair_queue<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        loop {
            let Some(&disk) = self.wait_repair_queue.front() else {
                return Ok(());
            };
            let rack = self.topology.rack_of_disk(disk);
            let can_serve = self
                .network
                .as_ref()
                .is_some_and(|n| n.can_serve(rack))
                && self.fleet.racks[rack].state == RackState::Normal;
            if !can_serve {
                return Ok(());
            }
            self.wait_repair_queue.pop_front();
            self.schedule_disk_repair(disk, self.curr_time, rng)?;
        }
    }

    fn schedule_disk_repair<R: Rng + ?Sized>(&mut self, disk: usize, now: f64, rng: &mut R) -> Result<()> {
        let Some(network) = self.network.as_mut() else {
            let t = distributions::disk_repair_no_network().draw(rng) + now;
            self.queue
                .push(crate::event::Event::new(t, EventKind::DiskRepair, disk));
            return Ok(());
        };

        let rack = self.topology.rack_of_disk(disk);
        if !network.can_serve(rack) || self.fleet.racks[rack].state != RackState::Normal {
            self.wait_repair_queue.push_back(disk);
            return Ok(());
        }

        let plan = self.placement.plan_repair(
            disk,
            &self.topology,
            |d| !self.state.is_disk_alive(d),
            |d| self.state.is_disk_failed(d),
        )?;
        self.num_stripes_repaired += plan.stripes.len();
        self.num_stripes_repaired_single_chunk += plan.single_chunk_repairs;
        if !plan.delayed_stripes.is_empty() {
            self.delayed_repair.insert(disk, plan.delayed_stripes);
        }

        let reserved = network.reserve_cross_rack();
        let duration = Network::repair_duration_hours(
            plan.cross_rack_chunks,
            self.sim.config.payload.chunk_size_mib as f64,
            reserved,
        );
        self.queue
            .push(crate::event::Event::disk_repair(now + duration, disk, reserved));
        Ok(())
    }

    fn simulate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Sample> {
        let mission_time = self.mission_time();
        loop {
            self.reconcile_delayed_repairs();
            self.dispatch_wait_repair_queue(rng)?;

            let Some(peek) = self.queue.peek_time() else {
                break;
            };
            if peek > mission_time {
                break;
            }
            let batch = self.queue.pop_batch().expect("peeked above");
            self.curr_time = batch.time;
            let checks_data_loss = matches!(batch.kind, EventKind::DiskFail | EventKind::NodeFail);

            match batch.kind {
                EventKind::DiskFail => self.apply_disk_fail(&batch.targets, rng)?,
                EventKind::DiskRepair => self.apply_disk_repair(&batch.targets, &batch.reserved_bw, rng)?,
                EventKind::NodeFail => self.apply_node_fail(&batch.targets, rng)?,
                EventKind::NodeTransientFail => self.apply_node_transient_fail(&batch.targets, rng)?,
                EventKind::NodeTransientRepair => self.apply_node_transient_repair(&batch.targets),
                EventKind::RackFail => self.apply_rack_fail(&batch.targets, rng)?,
                EventKind::RackRepair => self.apply_rack_repair(&batch.targets),
            }

            if checks_data_loss {
                let failed = self.state.get_failed_disks();
                if self.placement.check_data_loss(&failed) {
                    return Ok(self.build_loss_sample(&failed));
                }
            }
        }
        Ok(Sample::no_loss(self.blocked_ratio(), self.single_chunk_ratio()))
    }

    fn apply_disk_fail<R: Rng + ?Sized>(&mut self, disks: &[usize], rng: &mut R) -> Result<()> {
        for &disk in disks {
            if self.fleet.disks[disk].state == DiskState::Crashed {
                continue;
            }
            self.delayed_repair.remove(&disk);
            self.fleet.fail_disk(disk, self.curr_time);
            self.state.mark_disk_failed(disk);
            self.schedule_disk_repair(disk, self.curr_time, rng)?;
        }
        Ok(())
    }

    fn apply_disk_repair<R: Rng + ?Sized>(&mut self, disks: &[usize], reserved_bw: &[f64], rng: &mut R) -> Result<()> {
        for (i, &disk) in disks.iter().enumerate() {
            self.fleet.repair_disk(disk, self.curr_time);
            self.state.mark_disk_repaired(disk);

            if let Some(network) = self.network.as_mut() {
                let amount = reserved_bw.get(i).copied().unwrap_or(0.0);
                network.release_cross_rack(amount)?;
            }

            let t = distributions::disk_fail().draw(rng) + self.curr_time;
            self.queue.push(crate::event::Event::new(t, EventKind::DiskFail, disk));

            let node = self.topology.node_of_disk(disk);
            if self.fleet.maybe_repair_node(node, self.curr_time) {
                self.state.mark_node_repaired(node);
                if !self.node_sources[node].is_trace() {
                    let t = distributions::node_fail().draw(rng) + self.curr_time;
                    self.queue.push(crate::event::Event::new(t, EventKind::NodeFail, node));
                }
            }
        }
        Ok(())
    }

    fn apply_node_fail<R: Rng + ?Sized>(&mut self, nodes: &[usize], rng: &mut R) -> Result<()> {
        for &node in nodes {
            if self.fleet.nodes[node].state == NodeState::Crashed {
                continue;
            }
            let newly_crashed = self.fleet.fail_node(node, self.curr_time);
            self.state.mark_node_failed(node);
            for &disk in &newly_crashed {
                self.delayed_repair.remove(&disk);
                self.state.mark_disk_failed(disk);
                self.schedule_disk_repair(disk, self.curr_time, rng)?;
            }
        }
        Ok(())
    }

    fn apply_node_transient_fail<R: Rng + ?Sized>(&mut self, nodes: &[usize], rng: &mut R) -> Result<()> {
        let use_trace = self.sim.config.trace.enabled;
        for &node in nodes {
            if self.fleet.nodes[node].state == NodeState::Normal {
                let affected = self.fleet.transient_fail_node(node, self.curr_time);
                self.state.mark_node_unavailable(node);
                for &disk in &affected {
                    self.state.mark_disk_unavailable(disk);
                }
            }
            if !use_trace {
                let t = distributions::node_transient_repair().draw(rng) + self.curr_time;
                self.queue
                    .push(crate::event::Event::new(t, EventKind::NodeTransientRepair, node));
            }
        }
        Ok(())
    }

    fn apply_node_transient_repair(&mut self, nodes: &[usize]) {
        for &node in nodes {
            if self.fleet.nodes[node].state == NodeState::Unavailable {
                let affected = self.fleet.transient_repair_node(node, self.curr_time);
                self.state.mark_node_available(node);
                for &disk in &affected {
                    self.state.mark_disk_available(disk);
                }
            }
        }
    }

    fn apply_rack_fail<R: Rng + ?Sized>(&mut self, racks: &[usize], rng: &mut R) -> Result<()> {
        let power_outage = self.sim.config.power_outage.enabled;
        for &rack in racks {
            if self.fleet.racks[rack].state == RackState::Unavailable {
                continue;
            }
            let (nodes, disks) = self.fleet.fail_rack(rack, self.curr_time);
            for &node in &nodes {
                self.state.mark_node_unavailable(node);
            }
            for &disk in &disks {
                self.state.mark_disk_unavailable(disk);
            }
            if !power_outage {
                let t = distributions::rack_repair().draw(rng) + self.curr_time;
                self.queue.push(crate::event::Event::new(t, EventKind::RackRepair, rack));
            }
        }
        Ok(())
    }

    fn apply_rack_repair(&mut self, racks: &[usize]) {
        for &rack in racks {
            if self.fleet.racks[rack].state == RackState::Normal {
                continue;
            }
            let (nodes, disks) = self.fleet.repair_rack(rack, self.curr_time);
            for &node in &nodes {
                self.state.mark_node_available(node);
            }
            for &disk in &disks {
                self.state.mark_disk_available(disk);
            }
        }
    }

    fn blocked_ratio(&self) -> f64 {
        if self.curr_time <= 0.0 {
            return 0.0;
        }
        let num_chunks_total = (self.placement.num_stripes() * self.sim.code.n) as f64;
        if num_chunks_total == 0.0 {
            return 0.0;
        }
        let sum: f64 = (0..self.topology.num_disks())
            .map(|d| {
                let chunks_on_d = self.placement.stripes_per_disk(d).len() as f64;
                self.fleet.disks[d].unavail_time(self.curr_time) * chunks_on_d
            })
            .sum();
        sum / (num_chunks_total * self.curr_time)
    }

    fn single_chunk_ratio(&self) -> f64 {
        if self.num_stripes_repaired == 0 {
            0.0
        } else {
            self.num_stripes_repaired_single_chunk as f64 / self.num_stripes_repaired as f64
        }
    }

    fn build_loss_sample(&self, failed: &[usize]) -> Sample {
        let (mut failed_stripes, mut lost_chunks) = self.placement.get_num_failed_status(failed);
        for stripes in self.delayed_repair.values() {
            failed_stripes += stripes.len();
            lost_chunks += stripes
                .iter()
                .map(|&s| {
                    self.placement
                        .stripes_location(s)
                        .iter()
                        .filter(|&&d| !self.is_alive(d))
                        .count()
                })
                .sum::<usize>();
        }
        Sample::loss(1.0, failed_stripes, lost_chunks, self.blocked_ratio(), self.single_chunk_ratio())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edcsim_common::config::{CodeConfig, CodeType, PayloadConfig, PlaceType, PlacementConfig, RunConfig, TopologyConfig as Topo};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn no_failure_config() -> Config {
        let mut cfg = Config::default();
        cfg.run = RunConfig {
            mission_time_hours: 1.0,
            total_iterations: 1,
            num_processes: 1,
            rseed_plus: 0,
        };
        cfg.topology = Topo {
            num_racks: 4,
            nodes_per_rack: 4,
            disks_per_node: 1,
            capacity_per_disk_mib: 1_000_000,
        };
        cfg.payload = PayloadConfig {
            chunk_size_mib: 64,
            num_stripes: 10,
        };
        cfg.code = CodeConfig {
            code_type: CodeType::Rs,
            n: 6,
            k: 3,
            l: 0,
        };
        cfg.placement = PlacementConfig {
            place_type: PlaceType::Flat,
            chunk_rack_config: Vec::new(),
        };
        cfg.network.enabled = false;
        cfg
    }

    #[test]
    fn mission_time_zero_produces_the_no_loss_sample() {
        let mut cfg = no_failure_config();
        cfg.run.mission_time_hours = 0.0;
        let sim = RegularSimulator::new(cfg, None).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let sample = sim.run_iteration(&mut rng).unwrap();
        assert_eq!(sample.weight, 0.0);
        assert_eq!(sample.failed_stripes, 0);
        assert_eq!(sample.lost_chunks, 0);
    }

    #[test]
    fn short_mission_with_a_resilient_code_rarely_loses_data() {
        let cfg = no_failure_config();
        let sim = RegularSimulator::new(cfg, None).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let sample = sim.run_iteration(&mut rng).unwrap();
        // Over a 1-hour mission against an 87600h-scale Weibull, failures
        // are exceedingly unlikely; this is a smoke test, not a proof.
        assert!(sample.weight == 0.0 || sample.weight == 1.0);
    }
}
