//! Canonical LRC chunk-role layout.
//!
//! Partitions the `n` chunk positions of a stripe into `l` data groups (each
//! ending in its own local parity) plus `n - k - l` global parities,
//! distributed one per group in group order with any surplus appended at
//! the very end. For the canonical `(n=16, k=12, l=2)` layout this produces
//! exactly `data-group-0 = 0..5, local-parity-0 = 6, global = 7,
//! data-group-1 = 8..13, local-parity-1 = 14, global = 15`.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkRole {
    Data(usize),
    LocalParity(usize),
    Global,
}

#[derive(Clone, Debug)]
pub struct LrcLayout {
    pub n: usize,
    pub k: usize,
    pub l: usize,
    /// Chunk-position indices per data group.
    pub data_group: Vec<Vec<usize>>,
    /// The local-parity chunk position for each group.
    pub local_parity: Vec<usize>,
    /// Global-parity chunk positions.
    pub global: Vec<usize>,
    role_of: Vec<ChunkRole>,
}

impl LrcLayout {
    pub fn new(n: usize, k: usize, l: usize) -> Self {
        let base = k / l;
        let remainder = k % l;
        let num_globals = n - k - l;

        let mut data_group = Vec::with_capacity(l);
        let mut local_parity = Vec::with_capacity(l);
        let mut global = Vec::with_capacity(num_globals);
        let mut role_of = vec![ChunkRole::Global; n];

        let mut idx = 0usize;
        for g in 0..l {
            let size = base + usize::from(g < remainder);
            let group_positions: Vec<usize> = (idx..idx + size).collect();
            for &pos in &group_positions {
                role_of[pos] = ChunkRole::Data(g);
            }
            idx += size;

            role_of[idx] = ChunkRole::LocalParity(g);
            local_parity.push(idx);
            idx += 1;

            if global.len() < num_globals {
                role_of[idx] = ChunkRole::Global;
                global.push(idx);
                idx += 1;
            }
            data_group.push(group_positions);
        }
        while global.len() < num_globals {
            role_of[idx] = ChunkRole::Global;
            global.push(idx);
            idx += 1;
        }
        debug_assert_eq!(idx, n);

        Self {
            n,
            k,
            l,
            data_group,
            local_parity,
            global,
            role_of,
        }
    }

    /// Role of the chunk at stripe position `pos`.
    pub fn role(&self, pos: usize) -> ChunkRole {
        self.role_of[pos]
    }

    /// Size of the data quota for one group, per the source's `k / l`
    /// integer division (not fixed up when `l` does not evenly divide `k`).
    pub fn group_quota(&self) -> usize {
        self.k / self.l
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_16_12_2_layout_matches_the_documented_example() {
        let layout = LrcLayout::new(16, 12, 2);
        assert_eq!(layout.data_group[0], (0..6).collect::<Vec<_>>());
        assert_eq!(layout.local_parity[0], 6);
        assert_eq!(layout.global[0], 7);
        assert_eq!(layout.data_group[1], (8..14).collect::<Vec<_>>());
        assert_eq!(layout.local_parity[1], 14);
        assert_eq!(layout.global[1], 15);
    }

    #[test]
    fn every_position_has_exactly_one_role() {
        let layout = LrcLayout::new(16, 12, 2);
        assert!(matches!(layout.role(0), ChunkRole::Data(0)));
        assert!(matches!(layout.role(6), ChunkRole::LocalParity(0)));
        assert!(matches!(layout.role(7), ChunkRole::Global));
    }
}
