/////////////////////////////////////////////////////////////////////////////////////////////
//
// Applies kernel operators to every cell of a group or pair of groups.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Group-level adapters between the task bodies and the cell-level [`FmmKernel`] operators.
//!
//! Callers hold the region guards and hand over the plain buffers; every adapter walks
//! the cells of its groups and slices out the expansions and particle rows of each cell.
use crate::group::{leaf_rows, leaf_rows_mut, CellGroup, GroupRange, ParticleGroup};
use crate::space_index::{Interaction, SpaceIndex};
use crate::traits::FmmKernel;
use crate::utils::BlockInteractions;
use faer::{reborrow::*, MatMut, MatRef};

/// Multipoles of the leaves of `cells` from the particles of the matching group.
pub fn p2m<K: FmmKernel>(
    kernel: &mut K,
    space_index: &SpaceIndex,
    leaf_level: usize,
    particles: &ParticleGroup,
    data: MatRef<'_, f64>,
    cells: &CellGroup,
    multipole: &mut [f64],
) {
    assert_eq!(
        particles.leaf_indices(),
        cells.indices(),
        "particle group and leaf cell group hold different leaves"
    );

    for position in 0..cells.nb_cells() {
        let geometry = space_index.cell_geometry(cells.element_index(position), leaf_level);
        let rows = particles.leaf_range(position);
        kernel.p2m(
            &geometry,
            leaf_rows(data, &rows),
            &mut multipole[cells.multipole_range(position)],
        );
    }
}

/// Accumulates the multipoles of the cells of `lower` into their parents held by `upper`.
pub fn m2m<K: FmmKernel>(
    kernel: &mut K,
    space_index: &SpaceIndex,
    upper_level: usize,
    upper: &CellGroup,
    upper_multipole: &mut [f64],
    lower: &CellGroup,
    lower_multipole: &[f64],
) {
    for child_position in 0..lower.nb_cells() {
        let child = lower.element_index(child_position);
        let Some(parent_position) = upper.position_of(space_index.parent_index(child)) else {
            continue;
        };
        kernel.m2m(
            upper_level,
            space_index.child_octant(child, upper_level + 1),
            &lower_multipole[lower.multipole_range(child_position)],
            &mut upper_multipole[upper.multipole_range(parent_position)],
        );
    }
}

/// Far-field contributions of the cells of one source group to a target group.
pub fn m2l_between_groups<K: FmmKernel>(
    kernel: &mut K,
    level: usize,
    target: &CellGroup,
    target_local: &mut [f64],
    source: &CellGroup,
    source_multipole: &[f64],
    block: &BlockInteractions,
) {
    for (interaction, &source_position) in block.interactions.iter().zip(&block.source_positions)
    {
        kernel.m2l(
            level,
            interaction.neighbor_slot,
            &source_multipole[source.multipole_range(source_position)],
            &mut target_local[target.local_range(interaction.target_position)],
        );
    }
}

/// Far-field contributions between cells of the same group.
pub fn m2l_in_group<K: FmmKernel>(
    kernel: &mut K,
    level: usize,
    group: &CellGroup,
    multipole: &[f64],
    local: &mut [f64],
    internal: &[Interaction],
) {
    for interaction in internal {
        let Some(source_position) = group.position_of(interaction.source_index) else {
            continue;
        };
        kernel.m2l(
            level,
            interaction.neighbor_slot,
            &multipole[group.multipole_range(source_position)],
            &mut local[group.local_range(interaction.target_position)],
        );
    }
}

/// Accumulates the locals of the parents held by `upper` into the cells of `lower`.
pub fn l2l<K: FmmKernel>(
    kernel: &mut K,
    space_index: &SpaceIndex,
    upper_level: usize,
    upper: &CellGroup,
    upper_local: &[f64],
    lower: &CellGroup,
    lower_local: &mut [f64],
) {
    for child_position in 0..lower.nb_cells() {
        let child = lower.element_index(child_position);
        let Some(parent_position) = upper.position_of(space_index.parent_index(child)) else {
            continue;
        };
        kernel.l2l(
            upper_level,
            space_index.child_octant(child, upper_level + 1),
            &upper_local[upper.local_range(parent_position)],
            &mut lower_local[lower.local_range(child_position)],
        );
    }
}

/// Evaluates the local expansion of every leaf of `cells` at its particles.
#[allow(clippy::too_many_arguments)]
pub fn l2p<K: FmmKernel>(
    kernel: &mut K,
    space_index: &SpaceIndex,
    leaf_level: usize,
    cells: &CellGroup,
    local: &[f64],
    particles: &ParticleGroup,
    data: MatRef<'_, f64>,
    mut rhs: MatMut<'_, f64>,
) {
    assert_eq!(
        particles.leaf_indices(),
        cells.indices(),
        "particle group and leaf cell group hold different leaves"
    );

    for position in 0..cells.nb_cells() {
        let geometry = space_index.cell_geometry(cells.element_index(position), leaf_level);
        let rows = particles.leaf_range(position);
        kernel.l2p(
            &geometry,
            &local[cells.local_range(position)],
            leaf_rows(data, &rows),
            leaf_rows_mut(rhs.rb_mut(), &rows),
        );
    }
}

/// Mutual direct interactions between adjacent leaves of two different groups.
#[allow(clippy::too_many_arguments)]
pub fn p2p_between_groups<K: FmmKernel>(
    kernel: &mut K,
    target: &ParticleGroup,
    target_data: MatRef<'_, f64>,
    mut target_rhs: MatMut<'_, f64>,
    source: &ParticleGroup,
    source_data: MatRef<'_, f64>,
    mut source_rhs: MatMut<'_, f64>,
    block: &BlockInteractions,
) {
    for (interaction, &source_position) in block.interactions.iter().zip(&block.source_positions)
    {
        let target_rows = target.leaf_range(interaction.target_position);
        let source_rows = source.leaf_range(source_position);
        kernel.p2p(
            leaf_rows(target_data, &target_rows),
            leaf_rows_mut(target_rhs.rb_mut(), &target_rows),
            leaf_rows(source_data, &source_rows),
            leaf_rows_mut(source_rhs.rb_mut(), &source_rows),
            interaction.neighbor_slot,
        );
    }
}

/// Mutual direct interactions between adjacent leaves of the same group.
///
/// Every source must precede its target, as the neighbor lists built with upper
/// exclusion guarantee, so both leaves are reached through one split of `rhs`.
pub fn p2p_in_group<K: FmmKernel>(
    kernel: &mut K,
    group: &ParticleGroup,
    data: MatRef<'_, f64>,
    mut rhs: MatMut<'_, f64>,
    internal: &[Interaction],
) {
    for interaction in internal {
        let Some(source_position) = group.position_of(interaction.source_index) else {
            continue;
        };
        let target_rows = group.leaf_range(interaction.target_position);
        let source_rows = group.leaf_range(source_position);
        assert!(
            source_rows.end <= target_rows.start,
            "in-group neighbor {} does not precede leaf {}",
            interaction.source_index,
            interaction.target_index
        );

        let (head, tail) = rhs.rb_mut().split_at_row_mut(target_rows.start);
        kernel.p2p(
            leaf_rows(data, &target_rows),
            tail.subrows_mut(0, target_rows.len()),
            leaf_rows(data, &source_rows),
            leaf_rows_mut(head, &source_rows),
            interaction.neighbor_slot,
        );
    }
}

/// Interactions of every leaf of `group` with itself.
pub fn p2p_inner<K: FmmKernel>(
    kernel: &mut K,
    group: &ParticleGroup,
    data: MatRef<'_, f64>,
    mut rhs: MatMut<'_, f64>,
    self_list: &[Interaction],
) {
    for interaction in self_list {
        let rows = group.leaf_range(interaction.target_position);
        kernel.p2p_inner(leaf_rows(data, &rows), leaf_rows_mut(rhs.rb_mut(), &rows));
    }
}
