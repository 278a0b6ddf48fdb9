/////////////////////////////////////////////////////////////////////////////////////////////
//
// Resolves external interactions to the groups holding their sources.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::group::GroupRange;
use crate::space_index::Interaction;
use itertools::Itertools;

/// External interactions of a target group whose sources live in one source group.
#[derive(Debug, Clone)]
pub struct BlockInteractions {
    /// Position of the source group in its level.
    pub source_group: usize,
    pub interactions: Vec<Interaction>,
    /// Position of each interaction's source inside the source group.
    pub source_positions: Vec<usize>,
}

/// Buckets `interactions` by the group holding their source.
///
/// Interactions are sorted by source index and matched against the sorted `groups` in a
/// single pass. Sources that fall in a gap between groups, or inside a group's span without
/// being one of its elements, name an empty cell and are dropped.
pub fn map_indexes_to_blocks<G: GroupRange>(
    mut interactions: Vec<Interaction>,
    groups: &[G],
) -> Vec<BlockInteractions> {
    interactions.sort_unstable_by_key(|interaction| {
        (interaction.source_index, interaction.target_index)
    });

    let mut cursor = 0;
    let located = interactions.into_iter().filter_map(|interaction| {
        while cursor < groups.len() && groups[cursor].last_index() < interaction.source_index {
            cursor += 1;
        }
        let group = groups.get(cursor)?;
        let position = group.position_of(interaction.source_index)?;
        Some((cursor, position, interaction))
    });

    let mut blocks = Vec::new();
    for (source_group, chunk) in &located.chunk_by(|(group, _, _)| *group) {
        let (source_positions, interactions): (Vec<usize>, Vec<Interaction>) = chunk
            .map(|(_, position, interaction)| (position, interaction))
            .unzip();
        blocks.push(BlockInteractions {
            source_group,
            interactions,
            source_positions,
        });
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::CellGroup;

    fn interaction(target_index: u64, source_index: u64) -> Interaction {
        Interaction {
            target_index,
            source_index,
            target_position: 0,
            neighbor_slot: 0,
        }
    }

    #[test]
    fn buckets_sources_by_group() {
        let groups = vec![
            CellGroup::new(vec![0, 2, 3], 1, 1),
            CellGroup::new(vec![8, 9], 1, 1),
            CellGroup::new(vec![20, 25, 30], 1, 1),
        ];
        let interactions = vec![
            interaction(100, 25),
            interaction(100, 1),
            interaction(100, 9),
            interaction(101, 3),
            interaction(100, 12),
            interaction(100, 40),
            interaction(101, 30),
            interaction(100, 3),
        ];

        let blocks = map_indexes_to_blocks(interactions, &groups);

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].source_group, 0);
        assert_eq!(blocks[0].source_positions, vec![2, 2]);
        assert_eq!(blocks[0].interactions[0].target_index, 100);
        assert_eq!(blocks[0].interactions[1].target_index, 101);
        assert_eq!(blocks[1].source_group, 1);
        assert_eq!(blocks[1].source_positions, vec![1]);
        assert_eq!(blocks[2].source_group, 2);
        assert_eq!(blocks[2].source_positions, vec![1, 2]);
    }

    #[test]
    fn empty_input_maps_to_nothing() {
        let groups = vec![CellGroup::new(vec![1], 1, 1)];
        assert!(map_indexes_to_blocks(Vec::new(), &groups).is_empty());
        assert!(map_indexes_to_blocks(vec![interaction(0, 5)], &groups).is_empty());
    }
}
