use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    DiskFail,
    DiskRepair,
    NodeFail,
    NodeTransientFail,
    NodeTransientRepair,
    RackFail,
    RackRepair,
}

/// One scheduled transition. `reserved_bw` is only meaningful for
/// `DiskRepair`: the cross-rack bandwidth that was reserved when the
/// repair was scheduled, to be released back to the `Network` on
/// completion.
#[derive(Clone, Copy, Debug)]
pub struct Event {
    pub time: f64,
    pub kind: EventKind,
    pub target: usize,
    pub reserved_bw: Option<f64>,
}

impl Event {
    pub fn new(time: f64, kind: EventKind, target: usize) -> Self {
        Self {
            time,
            kind,
            target,
            reserved_bw: None,
        }
    }

    pub fn disk_repair(time: f64, target: usize, reserved_bw: f64) -> Self {
        Self {
            time,
            kind: EventKind::DiskRepair,
            target,
            reserved_bw: Some(reserved_bw),
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.kind == other.kind && self.target == other.target
    }
}
impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    /// Reversed so `BinaryHeap` (a max-heap) pops the earliest time first;
    /// ties broken by `kind` then `target` so the ordering is total and
    /// deterministic.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.kind.cmp(&self.kind))
            .then_with(|| other.target.cmp(&self.target))
    }
}

/// Min-heap of scheduled events, plus batch coalescing: events sharing
/// `(time, kind)` are drained together so the caller applies their
/// aggregate effect as one unordered batch.
#[derive(Default)]
pub struct EventQueue {
    heap: BinaryHeap<Event>,
}

/// A batch of events that share `(time, kind)`.
pub struct Batch {
    pub time: f64,
    pub kind: EventKind,
    pub targets: Vec<usize>,
    pub reserved_bw: Vec<f64>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub fn push(&mut self, event: Event) {
        self.heap.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.time)
    }

    /// Pops the earliest event and every other event sharing its
    /// `(time, kind)`, returning them as a single batch.
    pub fn pop_batch(&mut self) -> Option<Batch> {
        let first = self.heap.pop()?;
        let mut targets = vec![first.target];
        let mut reserved_bw: Vec<f64> = first.reserved_bw.into_iter().collect();

        while let Some(next) = self.heap.peek() {
            if next.time == first.time && next.kind == first.kind {
                let next = self.heap.pop().expect("peeked element must be poppable");
                targets.push(next.target);
                reserved_bw.extend(next.reserved_bw);
            } else {
                break;
            }
        }

        Some(Batch {
            time: first.time,
            kind: first.kind,
            targets,
            reserved_bw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_events_in_time_order() {
        let mut q = EventQueue::new();
        q.push(Event::new(5.0, EventKind::DiskFail, 0));
        q.push(Event::new(1.0, EventKind::DiskFail, 1));
        q.push(Event::new(3.0, EventKind::DiskFail, 2));
        let b1 = q.pop_batch().unwrap();
        assert_eq!(b1.time, 1.0);
        let b2 = q.pop_batch().unwrap();
        assert_eq!(b2.time, 3.0);
    }

    #[test]
    fn coalesces_same_time_and_kind_into_one_batch() {
        let mut q = EventQueue::new();
        q.push(Event::new(2.0, EventKind::DiskFail, 0));
        q.push(Event::new(2.0, EventKind::DiskFail, 1));
        q.push(Event::new(2.0, EventKind::NodeFail, 2));
        let batch = q.pop_batch().unwrap();
        assert_eq!(batch.targets.len(), 2);
        assert!(batch.targets.contains(&0) && batch.targets.contains(&1));
    }
}
