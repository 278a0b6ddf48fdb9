/////////////////////////////////////////////////////////////////////////////////////////////
//
// Maps positions to curve indices and computes the far-field and near-field lists of a group.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::config::{CurveOrdering, SpatialConfiguration};
use crate::group::GroupRange;
use crate::morton;

/// Slot of the leaf-with-itself interaction in the near-field numbering.
pub const SELF_SLOT: usize = 13;

/// Number of far-field slots, one per offset in `[-3, 3]^3`.
pub const NB_FAR_FIELD_SLOTS: usize = 343;

/// Number of near-field slots, one per offset in `[-1, 1]^3`.
pub const NB_NEAR_FIELD_SLOTS: usize = 27;

/// Size of the interaction list of a cell away from the box boundary.
pub const MAX_INTERACTIONS_PER_CELL: usize = 189;

pub const MAX_NEIGHBORS_PER_CELL: usize = 26;

/// One block-level relationship consumed by a far-field or near-field operator.
///
/// `neighbor_slot` identifies the geometry of the pair independently of periodic
/// wrapping: see [`far_field_slot`] and [`near_field_slot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interaction {
    pub target_index: u64,
    pub source_index: u64,
    /// Position of the target inside its group.
    pub target_position: usize,
    pub neighbor_slot: usize,
}

/// Interactions of a group, split by where the source lives.
#[derive(Debug, Clone, Default)]
pub struct InteractionLists {
    /// Sources inside the group itself.
    pub internal: Vec<Interaction>,
    /// Sources in other groups of the same level.
    pub external: Vec<Interaction>,
}

/// Position and size of a cell in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGeometry {
    pub index: u64,
    pub level: usize,
    pub center: [f64; 3],
    pub width: [f64; 3],
}

/// Encodes the source-minus-target offset of a far-field pair, each component in `[-3, 3]`.
pub fn far_field_slot(offset: [i64; 3]) -> usize {
    offset
        .iter()
        .fold(0, |slot, &component| slot * 7 + (component + 3) as usize)
}

/// Inverse of [`far_field_slot`].
pub fn far_field_offset(slot: usize) -> [i64; 3] {
    [
        (slot / 49) as i64 - 3,
        ((slot / 7) % 7) as i64 - 3,
        (slot % 7) as i64 - 3,
    ]
}

/// Encodes the source-minus-target offset of a near-field pair, each component in `[-1, 1]`.
pub fn near_field_slot(offset: [i64; 3]) -> usize {
    offset
        .iter()
        .fold(0, |slot, &component| slot * 3 + (component + 1) as usize)
}

/// Inverse of [`near_field_slot`].
pub fn near_field_offset(slot: usize) -> [i64; 3] {
    [
        (slot / 9) as i64 - 1,
        ((slot / 3) % 3) as i64 - 1,
        (slot % 3) as i64 - 1,
    ]
}

/// The 26 offsets of the cells sharing a face, edge or corner with a cell.
fn neighbor_offsets() -> impl Iterator<Item = [i64; 3]> {
    (-1..=1)
        .flat_map(|x| (-1..=1).flat_map(move |y| (-1..=1).map(move |z| [x, y, z])))
        .filter(|offset| *offset != [0, 0, 0])
}

/// Pure index arithmetic for one spatial configuration.
///
/// Every method is reentrant; the engine copies the index into each task that needs it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceIndex {
    tree_height: usize,
    box_corner: [f64; 3],
    box_width: [f64; 3],
    periodic: bool,
    curve: CurveOrdering,
}

impl SpaceIndex {
    pub fn new(configuration: &SpatialConfiguration) -> Self {
        SpaceIndex {
            tree_height: configuration.tree_height(),
            box_corner: configuration.box_corner(),
            box_width: configuration.box_width(),
            periodic: configuration.periodic(),
            curve: configuration.curve(),
        }
    }

    pub fn tree_height(&self) -> usize {
        self.tree_height
    }

    pub fn periodic(&self) -> bool {
        self.periodic
    }

    pub fn curve(&self) -> CurveOrdering {
        self.curve
    }

    /// Index of the cell at grid coordinates `position` on `level`.
    pub fn index_from_box_pos(&self, position: [u64; 3], level: usize) -> u64 {
        let code = morton::encode_morton(position);
        match self.curve {
            CurveOrdering::Morton => code,
            CurveOrdering::Hilbert => morton::morton_to_hilbert(code, level),
        }
    }

    pub fn box_pos_from_index(&self, index: u64, level: usize) -> [u64; 3] {
        match self.curve {
            CurveOrdering::Morton => morton::decode_morton(index),
            CurveOrdering::Hilbert => {
                morton::decode_morton(morton::hilbert_to_morton(index, level))
            }
        }
    }

    /// Grid coordinates of the cell containing `position` on `level`.
    ///
    /// Panics if the position lies outside the box. A coordinate on the upper
    /// face of the box maps to the last cell.
    pub fn box_pos_from_position(&self, position: [f64; 3], level: usize) -> [u64; 3] {
        let nb_cells = 1u64 << level;
        std::array::from_fn(|axis| {
            let offset = position[axis] - self.box_corner[axis];
            assert!(
                offset >= 0.0 && offset <= self.box_width[axis],
                "coordinate {} on axis {} lies outside the box [{}, {}]",
                position[axis],
                axis,
                self.box_corner[axis],
                self.box_corner[axis] + self.box_width[axis]
            );
            let cell_width = self.box_width[axis] / nb_cells as f64;
            ((offset / cell_width) as u64).min(nb_cells - 1)
        })
    }

    pub fn index_from_position(&self, position: [f64; 3], level: usize) -> u64 {
        self.index_from_box_pos(self.box_pos_from_position(position, level), level)
    }

    #[inline(always)]
    pub fn parent_index(&self, index: u64) -> u64 {
        morton::parent_index(index)
    }

    #[inline(always)]
    pub fn child_index(&self, parent: u64, ordinal: usize) -> u64 {
        morton::child_index(parent, ordinal)
    }

    #[inline(always)]
    pub fn child_position_from_parent(&self, index: u64) -> usize {
        morton::child_position_from_parent(index)
    }

    pub fn upper_bound(&self, level: usize) -> u64 {
        morton::upper_bound(level)
    }

    /// Geometric octant of a child inside its parent, `x << 2 | y << 1 | z`, where
    /// each bit is set when the child lies in the upper half along that axis.
    ///
    /// Equal to the child ordinal for Morton order only.
    pub fn child_octant(&self, child: u64, level: usize) -> usize {
        let position = self.box_pos_from_index(child, level);
        (((position[0] & 1) << 2) | ((position[1] & 1) << 1) | (position[2] & 1)) as usize
    }

    pub fn cell_width(&self, level: usize) -> [f64; 3] {
        std::array::from_fn(|axis| self.box_width[axis] / ((1u64 << level) as f64))
    }

    pub fn cell_corner(&self, index: u64, level: usize) -> [f64; 3] {
        let position = self.box_pos_from_index(index, level);
        let width = self.cell_width(level);
        std::array::from_fn(|axis| self.box_corner[axis] + position[axis] as f64 * width[axis])
    }

    pub fn cell_geometry(&self, index: u64, level: usize) -> CellGeometry {
        let corner = self.cell_corner(index, level);
        let width = self.cell_width(level);
        CellGeometry {
            index,
            level,
            center: std::array::from_fn(|axis| corner[axis] + 0.5 * width[axis]),
            width,
        }
    }

    /// Well-separated sources of one cell: the children of its parent's neighbors
    /// that are not adjacent to the cell. Returns `(source_index, far_field_slot)`.
    ///
    /// Levels 0 and 1 are too coarse to hold any well-separated cell.
    pub fn far_field_sources(&self, index: u64, level: usize) -> Vec<(u64, usize)> {
        if level < 2 {
            return Vec::new();
        }

        let width = 1i64 << level;
        let parent_width = width / 2;
        let cell = self.box_pos_from_index(index, level).map(|c| c as i64);
        let parent = cell.map(|c| c >> 1);

        let mut sources = Vec::with_capacity(MAX_INTERACTIONS_PER_CELL);

        for parent_offset in std::iter::once([0, 0, 0]).chain(neighbor_offsets()) {
            let mut other_parent = [0i64; 3];
            let mut shift = [0i64; 3];
            let mut inside = true;

            for axis in 0..3 {
                let mut coordinate = parent[axis] + parent_offset[axis];
                if coordinate < 0 {
                    match self.periodic {
                        true => {
                            coordinate += parent_width;
                            shift[axis] = -width;
                        }
                        false => inside = false,
                    }
                } else if coordinate >= parent_width {
                    match self.periodic {
                        true => {
                            coordinate -= parent_width;
                            shift[axis] = width;
                        }
                        false => inside = false,
                    }
                }
                other_parent[axis] = coordinate;
            }

            if !inside {
                continue;
            }

            for octant in 0..morton::NB_CHILDREN as i64 {
                let child = [
                    2 * other_parent[0] + ((octant >> 2) & 1),
                    2 * other_parent[1] + ((octant >> 1) & 1),
                    2 * other_parent[2] + (octant & 1),
                ];
                let offset: [i64; 3] =
                    std::array::from_fn(|axis| child[axis] + shift[axis] - cell[axis]);

                if offset.iter().all(|component| component.abs() <= 1) {
                    continue;
                }

                let source = self.index_from_box_pos(child.map(|c| c as u64), level);
                sources.push((source, far_field_slot(offset)));
            }
        }

        sources
    }

    /// Adjacent cells of one cell, itself excluded. Returns `(source_index, near_field_slot)`.
    pub fn near_field_sources(&self, index: u64, level: usize) -> Vec<(u64, usize)> {
        let width = 1i64 << level;
        let cell = self.box_pos_from_index(index, level).map(|c| c as i64);

        neighbor_offsets()
            .filter_map(|offset| {
                let mut other = [0u64; 3];
                for axis in 0..3 {
                    let coordinate = cell[axis] + offset[axis];
                    other[axis] = match (coordinate < 0 || coordinate >= width, self.periodic) {
                        (false, _) => coordinate as u64,
                        (true, true) => coordinate.rem_euclid(width) as u64,
                        (true, false) => return None,
                    };
                }
                Some((self.index_from_box_pos(other, level), near_field_slot(offset)))
            })
            .collect()
    }

    /// Far-field interactions of every cell of `group` on `level`.
    ///
    /// A source whose index falls inside the group's span is internal. With
    /// `test_self_inclusion`, internal candidates naming no cell of the group are dropped;
    /// external sources are kept and resolved against the other groups later.
    pub fn interaction_list<G: GroupRange>(
        &self,
        group: &G,
        level: usize,
        test_self_inclusion: bool,
    ) -> InteractionLists {
        let mut lists = InteractionLists::default();
        if level < 2 {
            return lists;
        }

        for position in 0..group.nb_elements() {
            let target = group.element_index(position);
            for (source, slot) in self.far_field_sources(target, level) {
                classify(group, &mut lists, test_self_inclusion, Interaction {
                    target_index: target,
                    source_index: source,
                    target_position: position,
                    neighbor_slot: slot,
                });
            }
        }

        lists
    }

    /// Near-field interactions of every leaf of `group` on `level`.
    ///
    /// With `upper_exclusion` only sources with a strictly smaller index are returned,
    /// so every unordered pair of leaves appears once over the whole level.
    pub fn neighbor_list<G: GroupRange>(
        &self,
        group: &G,
        level: usize,
        upper_exclusion: bool,
        test_self_inclusion: bool,
    ) -> InteractionLists {
        let mut lists = InteractionLists::default();

        for position in 0..group.nb_elements() {
            let target = group.element_index(position);
            for (source, slot) in self.near_field_sources(target, level) {
                if upper_exclusion && source >= target {
                    continue;
                }
                classify(group, &mut lists, test_self_inclusion, Interaction {
                    target_index: target,
                    source_index: source,
                    target_position: position,
                    neighbor_slot: slot,
                });
            }
        }

        lists
    }

    /// The leaf-with-itself interaction of every element of `group`.
    pub fn self_list<G: GroupRange>(&self, group: &G) -> Vec<Interaction> {
        (0..group.nb_elements())
            .map(|position| {
                let index = group.element_index(position);
                Interaction {
                    target_index: index,
                    source_index: index,
                    target_position: position,
                    neighbor_slot: SELF_SLOT,
                }
            })
            .collect()
    }
}

fn classify<G: GroupRange>(
    group: &G,
    lists: &mut InteractionLists,
    test_self_inclusion: bool,
    interaction: Interaction,
) {
    match group.covers(interaction.source_index) {
        true => {
            if !test_self_inclusion || group.has_element_at_index(interaction.source_index) {
                lists.internal.push(interaction);
            }
        }
        false => lists.external.push(interaction),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::CellGroup;
    use std::collections::HashSet;

    fn space_index(height: usize, periodic: bool, curve: CurveOrdering) -> SpaceIndex {
        let configuration = SpatialConfiguration::new(height, [0.0; 3], [1.0; 3], periodic)
            .unwrap()
            .with_curve(curve);
        SpaceIndex::new(&configuration)
    }

    fn chebyshev_distance(a: [u64; 3], b: [u64; 3]) -> u64 {
        (0..3).map(|axis| a[axis].abs_diff(b[axis])).max().unwrap()
    }

    #[test]
    fn positions_map_to_cells() {
        let index = space_index(4, false, CurveOrdering::Morton);

        assert_eq!(index.box_pos_from_position([0.0, 0.0, 0.0], 3), [0, 0, 0]);
        assert_eq!(index.box_pos_from_position([1.0, 1.0, 1.0], 3), [7, 7, 7]);
        assert_eq!(index.box_pos_from_position([0.26, 0.5, 0.124], 2), [1, 2, 0]);
        assert_eq!(index.index_from_position([0.99, 0.01, 0.01], 1), 0b100);
    }

    #[test]
    #[should_panic(expected = "outside the box")]
    fn positions_outside_the_box_panic() {
        space_index(4, false, CurveOrdering::Morton).index_from_position([0.5, 1.01, 0.5], 3);
    }

    #[test]
    fn index_and_box_position_round_trip() {
        for curve in [CurveOrdering::Morton, CurveOrdering::Hilbert] {
            let index = space_index(5, false, curve);
            for level in 0..5 {
                for code in 0..index.upper_bound(level) {
                    let position = index.box_pos_from_index(code, level);
                    assert_eq!(index.index_from_box_pos(position, level), code);
                }
            }
        }
    }

    #[test]
    fn child_octant_follows_geometry() {
        for curve in [CurveOrdering::Morton, CurveOrdering::Hilbert] {
            let index = space_index(5, false, curve);
            for parent in 0..index.upper_bound(2) {
                let parent_position = index.box_pos_from_index(parent, 2);
                for ordinal in 0..8 {
                    let child = index.child_index(parent, ordinal);
                    let position = index.box_pos_from_index(child, 3);
                    let octant = index.child_octant(child, 3);
                    for (axis, bit) in [(0, 2), (1, 1), (2, 0)] {
                        assert_eq!(position[axis], 2 * parent_position[axis] + ((octant >> bit) & 1) as u64);
                    }
                    if curve == CurveOrdering::Morton {
                        assert_eq!(octant, ordinal);
                    }
                }
            }
        }
    }

    #[test]
    fn coarse_levels_have_no_far_field() {
        for periodic in [false, true] {
            let index = space_index(5, periodic, CurveOrdering::Morton);
            for level in 0..2 {
                for cell in 0..index.upper_bound(level) {
                    assert!(index.far_field_sources(cell, level).is_empty());
                }
                let group = CellGroup::new((0..index.upper_bound(level)).collect(), 1, 1);
                let lists = index.interaction_list(&group, level, true);
                assert!(lists.internal.is_empty() && lists.external.is_empty());
            }
        }
    }

    #[test]
    fn far_and_near_fields_partition_the_parent_neighborhood() {
        for curve in [CurveOrdering::Morton, CurveOrdering::Hilbert] {
            let index = space_index(6, false, curve);
            let level = 4;
            let positions: Vec<[u64; 3]> = (0..index.upper_bound(level))
                .map(|cell| index.box_pos_from_index(cell, level))
                .collect();
            for cell in 0..index.upper_bound(level) {
                let position = positions[cell as usize];
                let parent = position.map(|c| c / 2);

                let far: HashSet<u64> =
                    index.far_field_sources(cell, level).into_iter().map(|(s, _)| s).collect();
                let near: HashSet<u64> =
                    index.near_field_sources(cell, level).into_iter().map(|(s, _)| s).collect();

                assert!(far.is_disjoint(&near));
                assert!(!far.contains(&cell) && !near.contains(&cell));

                let mut expected: HashSet<u64> = positions
                    .iter()
                    .enumerate()
                    .filter(|(_, other)| chebyshev_distance(other.map(|c| c / 2), parent) <= 1)
                    .map(|(other, _)| other as u64)
                    .collect();
                expected.remove(&cell);

                let union: HashSet<u64> = far.union(&near).copied().collect();
                assert_eq!(union, expected);

                let interior = position.iter().all(|&c| c >= 2 && c < 14);
                if interior {
                    assert_eq!(far.len(), MAX_INTERACTIONS_PER_CELL);
                    assert_eq!(near.len(), MAX_NEIGHBORS_PER_CELL);
                }
            }
        }
    }

    #[test]
    fn slots_encode_the_source_offset() {
        let index = space_index(5, false, CurveOrdering::Hilbert);
        let level = 3;
        for cell in 0..index.upper_bound(level) {
            let position = index.box_pos_from_index(cell, level).map(|c| c as i64);
            for (source, slot) in index.far_field_sources(cell, level) {
                let source_position = index.box_pos_from_index(source, level).map(|c| c as i64);
                let offset = far_field_offset(slot);
                assert_eq!(far_field_slot(offset), slot);
                for axis in 0..3 {
                    assert_eq!(source_position[axis] - position[axis], offset[axis]);
                }
            }
            for (source, slot) in index.near_field_sources(cell, level) {
                let source_position = index.box_pos_from_index(source, level).map(|c| c as i64);
                let offset = near_field_offset(slot);
                for axis in 0..3 {
                    assert_eq!(source_position[axis] - position[axis], offset[axis]);
                }
            }
        }
    }

    #[test]
    fn neighbors_are_symmetric() {
        let index = space_index(5, false, CurveOrdering::Morton);
        let level = 3;
        for cell in 0..index.upper_bound(level) {
            for (source, slot) in index.near_field_sources(cell, level) {
                let back = index.near_field_sources(source, level);
                assert!(back.contains(&(cell, NB_NEAR_FIELD_SLOTS - 1 - slot)));
            }
        }
    }

    #[test]
    fn periodic_lists_are_complete_everywhere() {
        let index = space_index(5, true, CurveOrdering::Morton);
        let level = 3;
        let width = 1i64 << level;
        for cell in 0..index.upper_bound(level) {
            let position = index.box_pos_from_index(cell, level).map(|c| c as i64);

            let far = index.far_field_sources(cell, level);
            assert_eq!(far.len(), MAX_INTERACTIONS_PER_CELL);
            let slots: HashSet<usize> = far.iter().map(|&(_, slot)| slot).collect();
            assert_eq!(slots.len(), MAX_INTERACTIONS_PER_CELL);

            for &(source, slot) in &far {
                let offset = far_field_offset(slot);
                assert!(offset.iter().any(|c| c.abs() > 1));
                let source_position = index.box_pos_from_index(source, level).map(|c| c as i64);
                for axis in 0..3 {
                    assert_eq!((position[axis] + offset[axis]).rem_euclid(width), source_position[axis]);
                }
            }

            let near: HashSet<u64> =
                index.near_field_sources(cell, level).into_iter().map(|(s, _)| s).collect();
            assert_eq!(near.len(), MAX_NEIGHBORS_PER_CELL);
        }
    }

    #[test]
    fn group_lists_split_internal_and_external() {
        let index = space_index(5, false, CurveOrdering::Morton);
        let level = 3;
        // Cells 64..128 minus every fifth one.
        let indices: Vec<u64> = (64..128).filter(|i| i % 5 != 0).collect();
        let group = CellGroup::new(indices.clone(), 1, 1);

        let lists = index.interaction_list(&group, level, true);
        for interaction in &lists.internal {
            assert!(indices.contains(&interaction.source_index));
            assert_eq!(indices[interaction.target_position], interaction.target_index);
        }
        for interaction in &lists.external {
            assert!(interaction.source_index < 64 || interaction.source_index >= 128);
        }

        let expected: usize = indices
            .iter()
            .map(|&cell| {
                index
                    .far_field_sources(cell, level)
                    .into_iter()
                    .filter(|&(s, _)| !(64..128).contains(&s) || s % 5 != 0)
                    .count()
            })
            .sum();
        assert_eq!(lists.internal.len() + lists.external.len(), expected);

        let unfiltered = index.interaction_list(&group, level, false);
        assert!(unfiltered.internal.len() > lists.internal.len());
        assert_eq!(unfiltered.external.len(), lists.external.len());
    }

    #[test]
    fn upper_exclusion_visits_every_pair_once() {
        let index = space_index(4, false, CurveOrdering::Hilbert);
        let level = 3;
        let group = CellGroup::new((0..index.upper_bound(level)).collect(), 1, 1);

        let full = index.neighbor_list(&group, level, false, true);
        let half = index.neighbor_list(&group, level, true, true);

        assert!(full.external.is_empty() && half.external.is_empty());
        assert_eq!(half.internal.len() * 2, full.internal.len());
        assert!(half.internal.iter().all(|i| i.source_index < i.target_index));

        let self_list = index.self_list(&group);
        assert_eq!(self_list.len(), group.nb_cells());
        assert!(self_list
            .iter()
            .all(|i| i.source_index == i.target_index && i.neighbor_slot == SELF_SLOT));
    }
}
