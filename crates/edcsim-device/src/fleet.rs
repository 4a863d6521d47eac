use crate::{Disk, DiskState, Node, NodeState, Rack, RackState};

/// Owns every device for one iteration and applies cross-device cascades.
pub struct Fleet {
    pub disks: Vec<Disk>,
    pub nodes: Vec<Node>,
    pub racks: Vec<Rack>,
}

impl Fleet {
    pub fn new(num_racks: usize, nodes_per_rack: usize, disks_per_node: usize) -> Self {
        let mut racks = Vec::with_capacity(num_racks);
        let mut nodes = Vec::with_capacity(num_racks * nodes_per_rack);
        let mut disks = Vec::with_capacity(num_racks * nodes_per_rack * disks_per_node);

        let mut node_id = 0;
        let mut disk_id = 0;
        for rack_id in 0..num_racks {
            let mut rack_node_ids = Vec::with_capacity(nodes_per_rack);
            for _ in 0..nodes_per_rack {
                let mut node_disk_ids = Vec::with_capacity(disks_per_node);
                for _ in 0..disks_per_node {
                    disks.push(Disk::new(disk_id, node_id));
                    node_disk_ids.push(disk_id);
                    disk_id += 1;
                }
                nodes.push(Node::new(node_id, rack_id, node_disk_ids));
                rack_node_ids.push(node_id);
                node_id += 1;
            }
            racks.push(Rack::new(rack_id, rack_node_ids));
        }

        Self {
            disks,
            nodes,
            racks,
        }
    }

    /// Disk permanent failure. Returns true if the disk transitioned.
    pub fn fail_disk(&mut self, disk_id: usize, now: f64) -> bool {
        let disk = &mut self.disks[disk_id];
        if disk.state == DiskState::Crashed {
            return false;
        }
        disk.fail(now);
        true
    }

    pub fn repair_disk(&mut self, disk_id: usize, now: f64) {
        self.disks[disk_id].repair(now);
    }

    /// Node permanent failure: crashes the node and every disk on it that
    /// is not already crashed. Returns the disk ids newly crashed by the
    /// cascade (the caller must schedule their repairs).
    pub fn fail_node(&mut self, node_id: usize, now: f64) -> Vec<usize> {
        let node = &mut self.nodes[node_id];
        if node.state == NodeState::Crashed {
            return Vec::new();
        }
        node.state = NodeState::Crashed;
        let disk_ids = node.disk_ids.clone();
        let mut newly_crashed = Vec::new();
        for disk_id in disk_ids {
            if self.fail_disk(disk_id, now) {
                newly_crashed.push(disk_id);
            }
        }
        newly_crashed
    }

    /// A node is repaired only as a side effect of its last crashed disk
    /// being repaired; call this after `repair_disk` to check.
    pub fn maybe_repair_node(&mut self, node_id: usize, now: f64) -> bool {
        let node = &self.nodes[node_id];
        if node.state != NodeState::Crashed {
            return false;
        }
        let all_normal = node
            .disk_ids
            .iter()
            .all(|&d| self.disks[d].state == DiskState::Normal);
        if all_normal {
            let node = &mut self.nodes[node_id];
            node.state = NodeState::Normal;
            node.reset_age(now);
            true
        } else {
            false
        }
    }

    /// Node transient failure: node and its currently-NORMAL disks go
    /// UNAVAILABLE. Returns the disk ids that transitioned.
    pub fn transient_fail_node(&mut self, node_id: usize, now: f64) -> Vec<usize> {
        let node = &mut self.nodes[node_id];
        if node.state != NodeState::Normal {
            return Vec::new();
        }
        node.state = NodeState::Unavailable;
        let disk_ids = node.disk_ids.clone();
        let mut affected = Vec::new();
        for disk_id in disk_ids {
            let disk = &mut self.disks[disk_id];
            if disk.state == DiskState::Normal {
                disk.go_unavailable(now);
                affected.push(disk_id);
            }
        }
        affected
    }

    /// Reverse of `transient_fail_node` for disks still UNAVAILABLE.
    pub fn transient_repair_node(&mut self, node_id: usize, now: f64) -> Vec<usize> {
        let node = &mut self.nodes[node_id];
        if node.state != NodeState::Unavailable {
            return Vec::new();
        }
        node.state = NodeState::Normal;
        let disk_ids = node.disk_ids.clone();
        let mut affected = Vec::new();
        for disk_id in disk_ids {
            let disk = &mut self.disks[disk_id];
            if disk.state == DiskState::Unavailable {
                disk.come_online(now);
                affected.push(disk_id);
            }
        }
        affected
    }

    /// Rack failure cascades to every NORMAL node (and, through it, every
    /// NORMAL disk) in the rack. Returns (node ids, disk ids) affected.
    pub fn fail_rack(&mut self, rack_id: usize, now: f64) -> (Vec<usize>, Vec<usize>) {
        let rack = &mut self.racks[rack_id];
        if rack.state == RackState::Unavailable {
            return (Vec::new(), Vec::new());
        }
        rack.state = RackState::Unavailable;
        let node_ids = rack.node_ids.clone();
        let mut affected_nodes = Vec::new();
        let mut affected_disks = Vec::new();
        for node_id in node_ids {
            if self.nodes[node_id].state == NodeState::Normal {
                affected_nodes.push(node_id);
                affected_disks.extend(self.transient_fail_node(node_id, now));
            }
        }
        (affected_nodes, affected_disks)
    }

    pub fn repair_rack(&mut self, rack_id: usize, now: f64) -> (Vec<usize>, Vec<usize>) {
        let rack = &mut self.racks[rack_id];
        if rack.state == RackState::Normal {
            return (Vec::new(), Vec::new());
        }
        rack.state = RackState::Normal;
        let node_ids = rack.node_ids.clone();
        let mut affected_nodes = Vec::new();
        let mut affected_disks = Vec::new();
        for node_id in node_ids {
            if self.nodes[node_id].state == NodeState::Unavailable {
                affected_nodes.push(node_id);
                affected_disks.extend(self.transient_repair_node(node_id, now));
            }
        }
        (affected_nodes, affected_disks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rack_failure_cascades_to_nodes_and_disks() {
        let mut fleet = Fleet::new(2, 2, 2);
        let (nodes, disks) = fleet.fail_rack(0, 1.0);
        assert_eq!(nodes.len(), 2);
        assert_eq!(disks.len(), 4);
        assert_eq!(fleet.disks[0].state, DiskState::Unavailable);
    }

    #[test]
    fn rack_failure_does_not_touch_already_crashed_disks() {
        let mut fleet = Fleet::new(1, 1, 2);
        fleet.fail_disk(0, 0.0);
        let (_, disks) = fleet.fail_rack(0, 1.0);
        assert_eq!(disks, vec![1]);
        assert_eq!(fleet.disks[0].state, DiskState::Crashed);
    }

    #[test]
    fn node_is_repaired_only_once_every_disk_is_normal() {
        let mut fleet = Fleet::new(1, 1, 2);
        fleet.fail_node(0, 0.0);
        fleet.repair_disk(0, 1.0);
        assert!(!fleet.maybe_repair_node(0, 1.0));
        fleet.repair_disk(1, 2.0);
        assert!(fleet.maybe_repair_node(0, 2.0));
        assert_eq!(fleet.nodes[0].state, NodeState::Normal);
    }
}
