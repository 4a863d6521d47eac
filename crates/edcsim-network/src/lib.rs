//! Cross-rack and per-rack repair bandwidth budget.
//!
//! One repair at a time on the cross-rack link: a repair reserves the
//! entire remaining `avail_cross_rack` budget and releases it on
//! completion. A request that cannot reserve the full budget is deferred
//! by the caller (the simulator's wait-repair queue), not split
//! proportionally here.

use edcsim_common::{Error, Result};

/// Repair bandwidth budget for one iteration.
///
/// `avail_intra_rack` is tracked and range-checked but, matching the
/// design this is based on, is never decremented by the repair path — it
/// is a per-rack budget slot reserved for traffic-shaping policy that was
/// never wired up. Callers read it to decide whether a rack can currently
/// serve a repair; nothing here ever reserves against it.
pub struct Network {
    max_cross_rack: f64,
    avail_cross_rack: f64,
    max_intra_rack: Vec<f64>,
    avail_intra_rack: Vec<f64>,
}

impl Network {
    pub fn new(num_racks: usize, cross_rack_mibps: f64, intra_rack_mibps: f64) -> Self {
        Self {
            max_cross_rack: cross_rack_mibps,
            avail_cross_rack: cross_rack_mibps,
            max_intra_rack: vec![intra_rack_mibps; num_racks],
            avail_intra_rack: vec![intra_rack_mibps; num_racks],
        }
    }

    pub fn avail_cross_rack(&self) -> f64 {
        self.avail_cross_rack
    }

    pub fn avail_intra_rack(&self, rack: usize) -> f64 {
        self.avail_intra_rack[rack]
    }

    /// Whether a repair could be served right now: cross-rack budget is
    /// nonzero and the target rack's intra-rack budget is nonzero.
    pub fn can_serve(&self, rack: usize) -> bool {
        self.avail_cross_rack > 0.0 && self.avail_intra_rack[rack] > 0.0
    }

    /// Reserve the entire remaining cross-rack budget for a repair.
    /// Returns the amount reserved, so the caller can release exactly
    /// that much on completion.
    pub fn reserve_cross_rack(&mut self) -> f64 {
        let reserved = self.avail_cross_rack;
        self.avail_cross_rack = 0.0;
        reserved
    }

    /// Release a previously reserved amount back to the pool.
    pub fn release_cross_rack(&mut self, amount: f64) -> Result<()> {
        self.avail_cross_rack += amount;
        if self.avail_cross_rack > self.max_cross_rack + 1e-9 {
            return Err(Error::internal(format!(
                "cross-rack bandwidth {} exceeds max {} after release",
                self.avail_cross_rack, self.max_cross_rack
            )));
        }
        self.avail_cross_rack = self.avail_cross_rack.min(self.max_cross_rack);
        Ok(())
    }

    /// Repair duration in hours for `cross_rack_chunks` chunk-equivalents
    /// of traffic at `chunk_size_mib` each, over the reserved cross-rack
    /// bandwidth. `bandwidth_mibps` is the value reserved by
    /// `reserve_cross_rack`, not the live `avail_cross_rack` (which is
    /// zero by the time this is called).
    pub fn repair_duration_hours(
        cross_rack_chunks: f64,
        chunk_size_mib: f64,
        bandwidth_mibps: f64,
    ) -> f64 {
        if bandwidth_mibps <= 0.0 {
            return f64::INFINITY;
        }
        let seconds = cross_rack_chunks * chunk_size_mib / bandwidth_mibps;
        seconds / 3600.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_takes_the_entire_remaining_budget() {
        let mut net = Network::new(2, 125.0, 1000.0);
        let reserved = net.reserve_cross_rack();
        assert_eq!(reserved, 125.0);
        assert_eq!(net.avail_cross_rack(), 0.0);
    }

    #[test]
    fn release_restores_budget_and_caps_at_max() {
        let mut net = Network::new(1, 125.0, 1000.0);
        net.reserve_cross_rack();
        net.release_cross_rack(125.0).unwrap();
        assert_eq!(net.avail_cross_rack(), 125.0);
    }

    #[test]
    fn a_second_reservation_while_exhausted_gets_nothing() {
        let mut net = Network::new(1, 125.0, 1000.0);
        net.reserve_cross_rack();
        assert!(!net.can_serve(0));
        assert_eq!(net.reserve_cross_rack(), 0.0);
    }

    #[test]
    fn repair_duration_scales_with_traffic_and_bandwidth() {
        let hours = Network::repair_duration_hours(2.0, 64.0, 125.0);
        assert!((hours - (2.0 * 64.0 / 125.0 / 3600.0)).abs() < 1e-12);
    }
}
