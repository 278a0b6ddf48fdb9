/////////////////////////////////////////////////////////////////////////////////////////////
//
// Derives scheduling priorities from operator kind and tree level.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

/// Scheduling hints for every operator, higher runs first.
///
/// Bands from highest to lowest: P2M, M2M, L2L, in-group M2L, M2L between groups,
/// L2P, in-group P2P, P2P between groups. Inside the level-dependent bands coarser
/// levels come first, since they sit on the longest dependency chains. Priorities never
/// affect results, only the order in which ready tasks are picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationPriorities {
    tree_height: usize,
    m2l_base: i64,
    m2l_in_group_base: i64,
    l2l_base: i64,
    m2m_base: i64,
    p2m: i64,
}

const P2P: i64 = 0;
const P2P_IN_GROUP: i64 = 1;
const L2P: i64 = 2;

impl OperationPriorities {
    pub fn new(tree_height: usize) -> Self {
        let height = tree_height as i64;
        let m2l_base = L2P + 1;
        let m2l_in_group_base = m2l_base + height;
        let l2l_base = m2l_in_group_base + height;
        let m2m_base = l2l_base + height;
        OperationPriorities {
            tree_height,
            m2l_base,
            m2l_in_group_base,
            l2l_base,
            m2m_base,
            p2m: m2m_base + height,
        }
    }

    /// Number of levels above `level`, the rank of a level inside its band.
    fn coarseness(&self, level: usize) -> i64 {
        assert!(level < self.tree_height, "level {level} is outside the tree");
        (self.tree_height - 1 - level) as i64
    }

    pub fn p2m(&self) -> i64 {
        self.p2m
    }

    /// Priority of the M2M tasks writing `level`.
    pub fn m2m(&self, level: usize) -> i64 {
        self.m2m_base + self.coarseness(level)
    }

    /// Priority of the L2L tasks reading `level`.
    pub fn l2l(&self, level: usize) -> i64 {
        self.l2l_base + self.coarseness(level)
    }

    pub fn m2l(&self, level: usize) -> i64 {
        self.m2l_base + self.coarseness(level)
    }

    pub fn m2l_in_group(&self, level: usize) -> i64 {
        self.m2l_in_group_base + self.coarseness(level)
    }

    pub fn l2p(&self) -> i64 {
        L2P
    }

    pub fn p2p(&self) -> i64 {
        P2P
    }

    pub fn p2p_in_group(&self) -> i64 {
        P2P_IN_GROUP
    }

    /// Largest priority handed out.
    pub fn max_priority(&self) -> i64 {
        self.p2m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_are_ordered() {
        let height = 8;
        let priorities = OperationPriorities::new(height);

        for level in 0..height - 1 {
            assert!(priorities.p2m() > priorities.m2m(level));
            assert!(priorities.m2m(height - 2) > priorities.l2l(level));
        }
        for level in 0..height {
            assert!(priorities.l2l(height - 1) > priorities.m2l_in_group(level));
            assert!(priorities.m2l_in_group(height - 1) > priorities.m2l(level));
            assert!(priorities.m2l(height - 1) > priorities.l2p());
        }
        assert!(priorities.l2p() > priorities.p2p_in_group());
        assert!(priorities.p2p_in_group() > priorities.p2p());
        assert_eq!(priorities.max_priority(), priorities.p2m());
    }

    #[test]
    fn coarser_levels_come_first() {
        let priorities = OperationPriorities::new(6);
        for level in 1..6 {
            assert!(priorities.m2l(level - 1) > priorities.m2l(level));
            assert!(priorities.m2l_in_group(level - 1) > priorities.m2l_in_group(level));
            assert!(priorities.m2m(level - 1) > priorities.m2m(level));
            assert!(priorities.l2l(level - 1) > priorities.l2l(level));
        }
    }

    #[test]
    #[should_panic(expected = "outside the tree")]
    fn levels_beyond_the_leaves_panic() {
        OperationPriorities::new(3).m2l(3);
    }
}
