/////////////////////////////////////////////////////////////////////////////////////////////
//
// Builds the grouped octree: particles sorted by leaf, cells of every level cut into blocks.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::config::{BlockOptions, SpatialConfiguration};
use crate::error::FmmError;
use crate::group::{leaf_rows, CellGroup, GroupRange, ParticleGroup};
use crate::morton;
use crate::space_index::SpaceIndex;
use crate::traits::FmmKernel;
use faer::{Mat, MatRef};
use log::info;
use rayon::prelude::*;
use std::ops::Range;

/// Sizes of the buffers allocated for every cell and particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub multipole_len: usize,
    pub local_len: usize,
    /// Number of result columns per particle.
    pub nb_rhs: usize,
}

impl BufferLayout {
    pub fn new(multipole_len: usize, local_len: usize, nb_rhs: usize) -> Self {
        BufferLayout {
            multipole_len,
            local_len,
            nb_rhs,
        }
    }

    /// Layout matching the expansion sizes of `kernel`.
    pub fn for_kernel<K: FmmKernel>(kernel: &K, nb_rhs: usize) -> Self {
        Self::new(kernel.multipole_len(), kernel.local_len(), nb_rhs)
    }
}

/// Particles of one leaf, as handed to [`GroupedTree::apply_to_all_leaves`].
pub struct LeafRef<'t> {
    pub index: u64,
    /// Row of every particle in the matrix the tree was built from.
    pub original_indices: &'t [usize],
    pub data: MatRef<'t, f64>,
    pub rhs: MatRef<'t, f64>,
}

/// Grouped octree over a fixed particle set.
///
/// Every level holds its non-empty cells in increasing index order, cut into
/// [`CellGroup`]s. The leaf level also has one [`ParticleGroup`] per leaf cell group,
/// covering exactly the same leaves. Group boundaries never change after the build;
/// only the buffers are written.
#[derive(Debug)]
pub struct GroupedTree {
    configuration: SpatialConfiguration,
    space_index: SpaceIndex,
    layout: BufferLayout,
    cell_groups: Vec<Vec<CellGroup>>,
    particle_groups: Vec<ParticleGroup>,
    nb_particles: usize,
}

impl GroupedTree {
    /// Sorts `particles` into leaves and groups every level.
    ///
    /// `particles` holds one particle per row: `x, y, z` followed by any physical values.
    /// Panics if a particle lies outside the box of `configuration`.
    pub fn build(
        configuration: &SpatialConfiguration,
        particles: MatRef<'_, f64>,
        layout: BufferLayout,
        options: BlockOptions,
    ) -> Result<Self, FmmError> {
        configuration.validate()?;
        if options.elements_per_block == 0 {
            return Err(FmmError::EmptyBlockSize);
        }
        if particles.ncols() < 3 {
            return Err(FmmError::MissingPositionColumns {
                ncols: particles.ncols(),
            });
        }

        let space_index = SpaceIndex::new(configuration);
        let leaf_level = configuration.leaf_level();
        let nb_particles = particles.nrows();

        let leaf_of: Vec<u64> = (0..nb_particles)
            .into_par_iter()
            .map(|row| {
                let position = [particles[(row, 0)], particles[(row, 1)], particles[(row, 2)]];
                space_index.index_from_position(position, leaf_level)
            })
            .collect();

        let mut order: Vec<usize> = (0..nb_particles).collect();
        order.par_sort_by_key(|&row| (leaf_of[row], row));

        let mut leaf_indices: Vec<u64> = Vec::new();
        let mut leaf_offsets: Vec<usize> = Vec::new();
        for (sorted_row, &row) in order.iter().enumerate() {
            if leaf_indices.last() != Some(&leaf_of[row]) {
                leaf_indices.push(leaf_of[row]);
                leaf_offsets.push(sorted_row);
            }
        }
        leaf_offsets.push(nb_particles);

        let leaf_blocks = block_ranges(&leaf_indices, &options);

        let particle_groups: Vec<ParticleGroup> = leaf_blocks
            .iter()
            .map(|block| {
                let first_row = leaf_offsets[block.start];
                let last_row = leaf_offsets[block.end];
                let rows = &order[first_row..last_row];
                let data = Mat::from_fn(rows.len(), particles.ncols(), |i, j| {
                    particles[(rows[i], j)]
                });
                ParticleGroup::new(
                    leaf_indices[block.clone()].to_vec(),
                    leaf_offsets[block.start..=block.end]
                        .iter()
                        .map(|offset| offset - first_row)
                        .collect(),
                    rows.to_vec(),
                    data,
                    layout.nb_rhs,
                )
            })
            .collect();

        let mut cell_groups: Vec<Vec<CellGroup>> = Vec::with_capacity(configuration.tree_height());
        let mut level_indices = leaf_indices;
        for _level in (0..=leaf_level).rev() {
            let groups = block_ranges(&level_indices, &options)
                .into_iter()
                .map(|block| {
                    CellGroup::new(
                        level_indices[block].to_vec(),
                        layout.multipole_len,
                        layout.local_len,
                    )
                })
                .collect();
            cell_groups.push(groups);

            level_indices = level_indices.iter().map(|&i| morton::parent_index(i)).collect();
            level_indices.dedup();
        }
        cell_groups.reverse();

        info!(
            "built grouped tree: {} particles, {} leaves, {} particle groups, height {}",
            nb_particles,
            leaf_offsets.len() - 1,
            particle_groups.len(),
            configuration.tree_height()
        );

        Ok(GroupedTree {
            configuration: configuration.clone(),
            space_index,
            layout,
            cell_groups,
            particle_groups,
            nb_particles,
        })
    }

    pub fn configuration(&self) -> &SpatialConfiguration {
        &self.configuration
    }

    pub fn space_index(&self) -> &SpaceIndex {
        &self.space_index
    }

    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    pub fn height(&self) -> usize {
        self.configuration.tree_height()
    }

    pub fn nb_particles(&self) -> usize {
        self.nb_particles
    }

    /// Cell groups of `level`, sorted by index.
    pub fn cell_groups(&self, level: usize) -> &[CellGroup] {
        &self.cell_groups[level]
    }

    /// Particle groups, in lockstep with the leaf-level cell groups.
    pub fn particle_groups(&self) -> &[ParticleGroup] {
        &self.particle_groups
    }

    #[cfg(test)]
    pub(crate) fn particle_groups_mut(&mut self) -> &mut Vec<ParticleGroup> {
        &mut self.particle_groups
    }

    /// Calls `f` on every leaf in index order.
    pub fn apply_to_all_leaves<F>(&self, mut f: F)
    where
        F: FnMut(LeafRef<'_>),
    {
        for group in &self.particle_groups {
            let data = group.data().read();
            let data: &Mat<f64> = &data;
            let rhs = group.rhs().read();
            let rhs: &Mat<f64> = &rhs;

            for position in 0..group.nb_leaves() {
                let rows = group.leaf_range(position);
                f(LeafRef {
                    index: group.element_index(position),
                    original_indices: &group.original_indices()[rows.clone()],
                    data: leaf_rows(data.as_ref(), &rows),
                    rhs: leaf_rows(rhs.as_ref(), &rows),
                });
            }
        }
    }

    /// Results gathered back into the row order the tree was built from.
    pub fn rhs_in_original_order(&self) -> Mat<f64> {
        let mut gathered = Mat::<f64>::zeros(self.nb_particles, self.layout.nb_rhs);
        self.apply_to_all_leaves(|leaf| {
            for (i, &row) in leaf.original_indices.iter().enumerate() {
                for j in 0..leaf.rhs.ncols() {
                    gathered[(row, j)] = leaf.rhs[(i, j)];
                }
            }
        });
        gathered
    }

    /// Concatenated multipole buffers of every level, root first.
    pub fn multipole_snapshot(&self) -> Vec<f64> {
        self.cell_groups
            .iter()
            .flatten()
            .flat_map(|group| group.multipole().read().clone())
            .collect()
    }

    /// Concatenated local buffers of every level, root first.
    pub fn local_snapshot(&self) -> Vec<f64> {
        self.cell_groups
            .iter()
            .flatten()
            .flat_map(|group| group.local().read().clone())
            .collect()
    }

    pub fn reset_rhs(&mut self) {
        self.particle_groups.iter_mut().for_each(ParticleGroup::reset_rhs);
    }

    pub fn reset_far_field(&mut self) {
        self.cell_groups
            .iter_mut()
            .flatten()
            .for_each(CellGroup::reset);
    }
}

/// Cuts sorted cell indices into consecutive blocks.
fn block_ranges(indices: &[u64], options: &BlockOptions) -> Vec<Range<usize>> {
    let mut blocks = Vec::new();
    let mut start = 0;
    for end in 1..=indices.len() {
        let boundary = end == indices.len()
            || end - start == options.elements_per_block
            || (options.one_group_per_parent
                && morton::parent_index(indices[end]) != morton::parent_index(indices[end - 1]));
        if boundary {
            blocks.push(start..end);
            start = end;
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CurveOrdering;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_particles(nb_particles: usize, seed: u64) -> Mat<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let positions: Vec<f64> = (0..nb_particles * 3)
            .map(|_| rng.random_range(0.0..1.0))
            .collect();
        Mat::from_fn(nb_particles, 4, |i, j| match j {
            3 => 1.0,
            _ => positions[i * 3 + j],
        })
    }

    fn check_level_ordering(tree: &GroupedTree, options: &BlockOptions) {
        for level in 0..tree.height() {
            let groups = tree.cell_groups(level);
            for group in groups {
                assert!(group.nb_cells() <= options.elements_per_block);
            }
            for pair in groups.windows(2) {
                assert!(pair[0].last_index() < pair[1].first_index());
            }
        }
    }

    #[test]
    fn every_particle_lands_in_its_leaf() {
        let particles = random_particles(2000, 3);
        for curve in [CurveOrdering::Morton, CurveOrdering::Hilbert] {
            let configuration = SpatialConfiguration::new(5, [0.0; 3], [1.0; 3], false)
                .unwrap()
                .with_curve(curve);
            let options = BlockOptions::new(30);
            let tree = GroupedTree::build(
                &configuration,
                particles.as_ref(),
                BufferLayout::new(2, 3, 1),
                options,
            )
            .unwrap();

            check_level_ordering(&tree, &options);
            assert_eq!(tree.cell_groups(0).len(), 1);
            assert_eq!(tree.cell_groups(0)[0].indices(), &[0]);

            let mut seen = vec![false; 2000];
            tree.apply_to_all_leaves(|leaf| {
                for (i, &row) in leaf.original_indices.iter().enumerate() {
                    assert!(!seen[row]);
                    seen[row] = true;
                    let position = [leaf.data[(i, 0)], leaf.data[(i, 1)], leaf.data[(i, 2)]];
                    assert_eq!(tree.space_index().index_from_position(position, 4), leaf.index);
                    assert_eq!(leaf.data[(i, 0)], particles[(row, 0)]);
                }
            });
            assert!(seen.into_iter().all(|s| s));

            let leaves = tree.cell_groups(4);
            assert_eq!(leaves.len(), tree.particle_groups().len());
            for (cells, particles) in leaves.iter().zip(tree.particle_groups()) {
                assert_eq!(cells.indices(), particles.leaf_indices());
            }
        }
    }

    #[test]
    fn parents_exist_one_level_up() {
        let particles = random_particles(500, 11);
        let configuration = SpatialConfiguration::new(6, [0.0; 3], [1.0; 3], false).unwrap();
        let tree = GroupedTree::build(
            &configuration,
            particles.as_ref(),
            BufferLayout::new(1, 1, 1),
            BlockOptions::new(17),
        )
        .unwrap();

        for level in 1..tree.height() {
            for group in tree.cell_groups(level) {
                for &index in group.indices() {
                    let parent = morton::parent_index(index);
                    assert!(tree
                        .cell_groups(level - 1)
                        .iter()
                        .any(|upper| upper.has_element_at_index(parent)));
                }
            }
        }
    }

    #[test]
    fn one_group_per_parent_keeps_siblings_together() {
        let particles = random_particles(800, 5);
        let configuration = SpatialConfiguration::new(5, [0.0; 3], [1.0; 3], false).unwrap();
        let options = BlockOptions {
            elements_per_block: 64,
            one_group_per_parent: true,
        };
        let tree = GroupedTree::build(
            &configuration,
            particles.as_ref(),
            BufferLayout::new(1, 1, 1),
            options,
        )
        .unwrap();

        check_level_ordering(&tree, &options);
        for level in 1..tree.height() {
            for group in tree.cell_groups(level) {
                let parent = morton::parent_index(group.first_index());
                assert!(group.indices().iter().all(|&i| morton::parent_index(i) == parent));
            }
        }
    }

    #[test]
    fn rejects_bad_inputs() {
        let configuration = SpatialConfiguration::new(3, [0.0; 3], [1.0; 3], false).unwrap();
        let particles = random_particles(10, 1);

        assert!(matches!(
            GroupedTree::build(
                &configuration,
                particles.as_ref(),
                BufferLayout::new(1, 1, 1),
                BlockOptions::new(0)
            ),
            Err(FmmError::EmptyBlockSize)
        ));
        assert!(matches!(
            GroupedTree::build(
                &configuration,
                particles.as_ref().subcols(0, 2),
                BufferLayout::new(1, 1, 1),
                BlockOptions::new(4)
            ),
            Err(FmmError::MissingPositionColumns { ncols: 2 })
        ));
    }

    #[test]
    fn gathers_results_in_original_order() {
        let particles = random_particles(100, 9);
        let configuration = SpatialConfiguration::new(3, [0.0; 3], [1.0; 3], false).unwrap();
        let mut tree = GroupedTree::build(
            &configuration,
            particles.as_ref(),
            BufferLayout::new(1, 1, 2),
            BlockOptions::new(8),
        )
        .unwrap();

        for group in tree.particle_groups.iter_mut() {
            let originals = group.original_indices().to_vec();
            let rhs = group.rhs_mut();
            for (i, row) in originals.into_iter().enumerate() {
                rhs[(i, 1)] = row as f64;
            }
        }

        let gathered = tree.rhs_in_original_order();
        for row in 0..100 {
            assert_eq!(gathered[(row, 0)], 0.0);
            assert_eq!(gathered[(row, 1)], row as f64);
        }

        tree.reset_rhs();
        assert!(tree.rhs_in_original_order()[(99, 1)] == 0.0);
    }
}
