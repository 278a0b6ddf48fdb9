/////////////////////////////////////////////////////////////////////////////////////////////
//
// Pairs the groups of two consecutive levels whose cells are related as parent and child.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::group::GroupRange;

/// Walks the groups of a coarse level and of the next finer level together and returns
/// every `(upper, lower)` pair of group positions where the upper group holds the parent
/// of at least one cell of the lower group.
///
/// A coarse group may parent several fine groups and a fine group may have parents in
/// several coarse groups. The lower position advances once every parent of the lower
/// group has been visited; the upper position advances otherwise. Both sequences must be
/// exhausted together, which holds whenever every fine cell has its parent on the coarse
/// level and every coarse cell has a child. Anything else means the two levels are out of
/// sync and panics.
pub fn partition_zipper<U, L, F>(upper: &[U], lower: &[L], parent_of: F) -> Vec<(usize, usize)>
where
    U: GroupRange,
    L: GroupRange,
    F: Fn(u64) -> u64,
{
    if upper.is_empty() || lower.is_empty() {
        assert!(
            upper.is_empty() && lower.is_empty(),
            "one level has groups while the other has none"
        );
        return Vec::new();
    }

    let mut pairs = Vec::with_capacity(upper.len() + lower.len());
    let (mut i, mut j) = (0, 0);

    while i < upper.len() && j < lower.len() {
        let lower_first_parent = parent_of(lower[j].first_index());
        let lower_last_parent = parent_of(lower[j].last_index());
        assert!(
            lower_first_parent <= upper[i].last_index() && upper[i].first_index() <= lower_last_parent,
            "group sequences desynchronized: upper group {i} covers [{}, {}], lower group {j} has parents [{}, {}]",
            upper[i].first_index(),
            upper[i].last_index(),
            lower_first_parent,
            lower_last_parent
        );

        pairs.push((i, j));

        if lower_last_parent <= upper[i].last_index() {
            j += 1;
            if j < lower.len() && upper[i].last_index() < parent_of(lower[j].first_index()) {
                i += 1;
            }
        } else {
            i += 1;
        }
    }

    assert!(
        j == lower.len() && i + 1 == upper.len(),
        "group sequences desynchronized: walk stopped at upper {i}/{}, lower {j}/{}",
        upper.len(),
        lower.len()
    );

    pairs
}
