/////////////////////////////////////////////////////////////////////////////////////////////
//
// Emits the six FMM phases of a grouped tree as one task graph and runs it.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! The task-parallel FMM driver.
//!
//! [`FmmAlgorithm::execute`] turns every requested phase into group-level tasks, one per
//! group or pair of groups, submitted in phase order. Each task declares the buffers it
//! reads and the buffers it accumulates into; the task graph derives the dependencies
//! from those declarations, so P2M, M2M, M2L, L2L, L2P and P2P interleave freely wherever
//! their data allows.
use crate::config::{EngineParams, SpatialConfiguration};
use crate::executor::{ExecutionStats, TaskExecutor};
use crate::group::{CellGroup, GroupRange, ParticleGroup};
use crate::group_interface;
use crate::kernel_pool::KernelPool;
use crate::priorities::OperationPriorities;
use crate::region::{BufferField, RegionKey};
use crate::space_index::{InteractionLists, SpaceIndex};
use crate::task_graph::{Operation, TaskDescriptor, TaskGraph};
use crate::traits::FmmKernel;
use crate::tree::GroupedTree;
use crate::utils::map_indexes_to_blocks;
use crate::zipper::partition_zipper;
use faer::Mat;
use log::debug;
use rayon::prelude::*;
use std::ops::{BitOr, BitOrAssign};

/// Set of FMM phases to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Phases(u8);

impl Phases {
    pub const P2M: Phases = Phases(1);
    pub const M2M: Phases = Phases(1 << 1);
    pub const M2L: Phases = Phases(1 << 2);
    pub const L2L: Phases = Phases(1 << 3);
    pub const L2P: Phases = Phases(1 << 4);
    pub const P2P: Phases = Phases(1 << 5);
    pub const FAR_FIELD: Phases = Phases(0b01_1111);
    pub const NEAR_FIELD: Phases = Phases::P2P;
    pub const ALL: Phases = Phases(0b11_1111);

    pub const fn empty() -> Self {
        Phases(0)
    }

    pub const fn contains(self, other: Phases) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Phases {
    type Output = Phases;

    fn bitor(self, rhs: Phases) -> Phases {
        Phases(self.0 | rhs.0)
    }
}

impl BitOrAssign for Phases {
    fn bitor_assign(&mut self, rhs: Phases) {
        self.0 |= rhs.0;
    }
}

/// Runs FMM phases over grouped trees built for one spatial configuration.
///
/// The algorithm owns one kernel per executor worker, cloned from the kernel it was
/// created with, and keeps them across calls to [`FmmAlgorithm::execute`].
pub struct FmmAlgorithm<K: FmmKernel, E: TaskExecutor> {
    configuration: SpatialConfiguration,
    params: EngineParams,
    priorities: OperationPriorities,
    kernels: KernelPool<K>,
    executor: E,
}

impl<K: FmmKernel, E: TaskExecutor> FmmAlgorithm<K, E> {
    pub fn new(configuration: &SpatialConfiguration, kernel: K, executor: E) -> Self {
        Self::with_params(configuration, kernel, executor, EngineParams::default())
    }

    pub fn with_params(
        configuration: &SpatialConfiguration,
        kernel: K,
        executor: E,
        params: EngineParams,
    ) -> Self {
        FmmAlgorithm {
            configuration: configuration.clone(),
            params,
            priorities: OperationPriorities::new(configuration.tree_height()),
            kernels: KernelPool::new(kernel),
            executor,
        }
    }

    pub fn params(&self) -> EngineParams {
        self.params
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn kernels(&self) -> &KernelPool<K> {
        &self.kernels
    }

    /// Calls `f` on every kernel instance, e.g. to gather or reset per-worker state.
    pub fn apply_to_all_kernels<F>(&mut self, f: F)
    where
        F: FnMut(&mut K),
    {
        self.kernels.iter_mut().for_each(f);
    }

    /// Runs `phases` over `tree` and returns once every task completed.
    ///
    /// Results accumulate into the tree's buffers; reset them on the tree between
    /// independent runs.
    pub fn execute(&mut self, tree: &mut GroupedTree, phases: Phases) -> ExecutionStats {
        assert!(
            tree.configuration() == &self.configuration,
            "tree was built for another spatial configuration"
        );
        assert!(!phases.is_empty(), "no phase requested");
        if let Some(kernel) = self.kernels.iter().next() {
            let layout = tree.layout();
            assert!(
                layout.multipole_len == kernel.multipole_len()
                    && layout.local_len == kernel.local_len(),
                "tree buffers do not match the kernel expansion sizes"
            );
        }

        self.kernels.ensure_capacity(self.executor.num_workers());

        let tree: &GroupedTree = tree;
        let emitter = TaskEmitter {
            tree,
            space_index: *tree.space_index(),
            priorities: self.priorities,
            height: tree.height(),
            stop: self.params.stop_upper_level,
        };

        let mut graph = TaskGraph::new();
        let upward = emitter.height > emitter.stop;
        if phases.contains(Phases::P2M) && upward {
            emitter.p2m(&mut graph);
        }
        if phases.contains(Phases::M2M) {
            emitter.m2m(&mut graph);
        }
        if phases.contains(Phases::M2L) {
            emitter.m2l(&mut graph);
        }
        if phases.contains(Phases::L2L) {
            emitter.l2l(&mut graph);
        }
        if phases.contains(Phases::L2P) && upward {
            emitter.l2p(&mut graph);
        }
        if phases.contains(Phases::P2P) {
            emitter.p2p(&mut graph);
        }

        for (operation, count) in graph.operation_counts() {
            debug!("emitted {count} {operation} tasks");
        }
        debug!(
            "task graph holds {} tasks over {} regions",
            graph.len(),
            graph.nb_regions()
        );

        self.executor.run(graph, &self.kernels)
    }
}

struct TaskEmitter<'t> {
    tree: &'t GroupedTree,
    space_index: SpaceIndex,
    priorities: OperationPriorities,
    height: usize,
    stop: usize,
}

impl<'t> TaskEmitter<'t> {
    fn leaf_level(&self) -> usize {
        self.height - 1
    }

    /// Particle groups paired with the leaf cell groups, checked to hold the same leaves.
    fn leaf_pairs(&self) -> Vec<(&'t ParticleGroup, &'t CellGroup)> {
        let tree = self.tree;
        let particle_groups = tree.particle_groups();
        let leaf_groups = tree.cell_groups(self.leaf_level());
        assert_eq!(
            particle_groups.len(),
            leaf_groups.len(),
            "particle groups and leaf cell groups differ in number"
        );

        particle_groups
            .iter()
            .zip(leaf_groups)
            .map(|(particles, cells)| {
                assert_eq!(
                    particles.first_index(),
                    cells.first_index(),
                    "particle group and leaf cell group start at different leaves"
                );
                assert_eq!(
                    particles.last_index(),
                    cells.last_index(),
                    "particle group and leaf cell group end at different leaves"
                );
                assert_eq!(
                    particles.nb_leaves(),
                    cells.nb_cells(),
                    "particle group and leaf cell group hold different leaf counts"
                );
                (particles, cells)
            })
            .collect()
    }

    fn p2m<K: FmmKernel>(&self, graph: &mut TaskGraph<'t, K>) {
        let space_index = self.space_index;
        let leaf_level = self.leaf_level();

        for (position, (particles, cells)) in self.leaf_pairs().into_iter().enumerate() {
            graph.submit(TaskDescriptor {
                operation: Operation::P2M,
                priority: self.priorities.p2m(),
                reads: vec![RegionKey::particles(position, BufferField::Data)],
                commutes: vec![RegionKey::cells(leaf_level, position, BufferField::Multipole)],
                body: Box::new(move |kernel: &mut K| {
                    let data = particles.data().read();
                    let data: &Mat<f64> = &data;
                    let mut multipole = cells.multipole().write();
                    group_interface::p2m(
                        kernel,
                        &space_index,
                        leaf_level,
                        particles,
                        data.as_ref(),
                        cells,
                        &mut multipole,
                    );
                }),
            });
        }
    }

    fn m2m<K: FmmKernel>(&self, graph: &mut TaskGraph<'t, K>) {
        let tree = self.tree;
        let space_index = self.space_index;

        for level in (self.stop..self.height.saturating_sub(1)).rev() {
            let upper_groups = tree.cell_groups(level);
            let lower_groups = tree.cell_groups(level + 1);
            let pairs =
                partition_zipper(upper_groups, lower_groups, |index| space_index.parent_index(index));

            for (upper_position, lower_position) in pairs {
                let upper = &upper_groups[upper_position];
                let lower = &lower_groups[lower_position];
                graph.submit(TaskDescriptor {
                    operation: Operation::M2M,
                    priority: self.priorities.m2m(level),
                    reads: vec![RegionKey::cells(level + 1, lower_position, BufferField::Multipole)],
                    commutes: vec![RegionKey::cells(level, upper_position, BufferField::Multipole)],
                    body: Box::new(move |kernel: &mut K| {
                        let lower_multipole = lower.multipole().read();
                        let mut upper_multipole = upper.multipole().write();
                        group_interface::m2m(
                            kernel,
                            &space_index,
                            level,
                            upper,
                            &mut upper_multipole,
                            lower,
                            &lower_multipole,
                        );
                    }),
                });
            }
        }
    }

    fn m2l<K: FmmKernel>(&self, graph: &mut TaskGraph<'t, K>) {
        let tree = self.tree;
        let space_index = self.space_index;

        for level in self.stop..self.height {
            let groups = tree.cell_groups(level);
            let lists: Vec<InteractionLists> = groups
                .par_iter()
                .map(|group| space_index.interaction_list(group, level, true))
                .collect();

            for (target_position, (target, lists)) in groups.iter().zip(lists).enumerate() {
                for block in map_indexes_to_blocks(lists.external, groups) {
                    let source_position = block.source_group;
                    let source = &groups[source_position];
                    graph.submit(TaskDescriptor {
                        operation: Operation::M2LBetweenGroups,
                        priority: self.priorities.m2l(level),
                        reads: vec![RegionKey::cells(level, source_position, BufferField::Multipole)],
                        commutes: vec![RegionKey::cells(level, target_position, BufferField::Local)],
                        body: Box::new(move |kernel: &mut K| {
                            let multipole = source.multipole().read();
                            let mut local = target.local().write();
                            group_interface::m2l_between_groups(
                                kernel,
                                level,
                                target,
                                &mut local,
                                source,
                                &multipole,
                                &block,
                            );
                        }),
                    });
                }

                let internal = lists.internal;
                graph.submit(TaskDescriptor {
                    operation: Operation::M2LInGroup,
                    priority: self.priorities.m2l_in_group(level),
                    reads: vec![RegionKey::cells(level, target_position, BufferField::Multipole)],
                    commutes: vec![RegionKey::cells(level, target_position, BufferField::Local)],
                    body: Box::new(move |kernel: &mut K| {
                        let multipole = target.multipole().read();
                        let mut local = target.local().write();
                        group_interface::m2l_in_group(
                            kernel,
                            level,
                            target,
                            &multipole,
                            &mut local,
                            &internal,
                        );
                    }),
                });
            }
        }
    }

    fn l2l<K: FmmKernel>(&self, graph: &mut TaskGraph<'t, K>) {
        let tree = self.tree;
        let space_index = self.space_index;

        for level in self.stop..self.height.saturating_sub(1) {
            let upper_groups = tree.cell_groups(level);
            let lower_groups = tree.cell_groups(level + 1);
            let pairs =
                partition_zipper(upper_groups, lower_groups, |index| space_index.parent_index(index));

            for (upper_position, lower_position) in pairs {
                let upper = &upper_groups[upper_position];
                let lower = &lower_groups[lower_position];
                graph.submit(TaskDescriptor {
                    operation: Operation::L2L,
                    priority: self.priorities.l2l(level),
                    reads: vec![RegionKey::cells(level, upper_position, BufferField::Local)],
                    commutes: vec![RegionKey::cells(level + 1, lower_position, BufferField::Local)],
                    body: Box::new(move |kernel: &mut K| {
                        let upper_local = upper.local().read();
                        let mut lower_local = lower.local().write();
                        group_interface::l2l(
                            kernel,
                            &space_index,
                            level,
                            upper,
                            &upper_local,
                            lower,
                            &mut lower_local,
                        );
                    }),
                });
            }
        }
    }

    fn l2p<K: FmmKernel>(&self, graph: &mut TaskGraph<'t, K>) {
        let space_index = self.space_index;
        let leaf_level = self.leaf_level();

        for (position, (particles, cells)) in self.leaf_pairs().into_iter().enumerate() {
            graph.submit(TaskDescriptor {
                operation: Operation::L2P,
                priority: self.priorities.l2p(),
                reads: vec![
                    RegionKey::cells(leaf_level, position, BufferField::Local),
                    RegionKey::particles(position, BufferField::Data),
                ],
                commutes: vec![RegionKey::particles(position, BufferField::Rhs)],
                body: Box::new(move |kernel: &mut K| {
                    let local = cells.local().read();
                    let data = particles.data().read();
                    let data: &Mat<f64> = &data;
                    let mut rhs = particles.rhs().write();
                    let rhs: &mut Mat<f64> = &mut rhs;
                    group_interface::l2p(
                        kernel,
                        &space_index,
                        leaf_level,
                        cells,
                        &local,
                        particles,
                        data.as_ref(),
                        rhs.as_mut(),
                    );
                }),
            });
        }
    }

    fn p2p<K: FmmKernel>(&self, graph: &mut TaskGraph<'t, K>) {
        let tree = self.tree;
        let space_index = self.space_index;
        let leaf_level = self.leaf_level();

        let groups = tree.particle_groups();
        let lists: Vec<InteractionLists> = groups
            .par_iter()
            .map(|group| space_index.neighbor_list(group, leaf_level, true, true))
            .collect();

        for (target_position, (target, lists)) in groups.iter().zip(lists).enumerate() {
            for block in map_indexes_to_blocks(lists.external, groups) {
                let source_position = block.source_group;
                let source = &groups[source_position];
                graph.submit(TaskDescriptor {
                    operation: Operation::P2PBetweenGroups,
                    priority: self.priorities.p2p(),
                    reads: vec![
                        RegionKey::particles(target_position, BufferField::Data),
                        RegionKey::particles(source_position, BufferField::Data),
                    ],
                    commutes: vec![
                        RegionKey::particles(target_position, BufferField::Rhs),
                        RegionKey::particles(source_position, BufferField::Rhs),
                    ],
                    body: Box::new(move |kernel: &mut K| {
                        let target_data = target.data().read();
                        let target_data: &Mat<f64> = &target_data;
                        let source_data = source.data().read();
                        let source_data: &Mat<f64> = &source_data;
                        let mut target_rhs = target.rhs().write();
                        let target_rhs: &mut Mat<f64> = &mut target_rhs;
                        let mut source_rhs = source.rhs().write();
                        let source_rhs: &mut Mat<f64> = &mut source_rhs;
                        group_interface::p2p_between_groups(
                            kernel,
                            target,
                            target_data.as_ref(),
                            target_rhs.as_mut(),
                            source,
                            source_data.as_ref(),
                            source_rhs.as_mut(),
                            &block,
                        );
                    }),
                });
            }

            let internal = lists.internal;
            let self_list = space_index.self_list(target);
            graph.submit(TaskDescriptor {
                operation: Operation::P2PInGroup,
                priority: self.priorities.p2p_in_group(),
                reads: vec![RegionKey::particles(target_position, BufferField::Data)],
                commutes: vec![RegionKey::particles(target_position, BufferField::Rhs)],
                body: Box::new(move |kernel: &mut K| {
                    let data = target.data().read();
                    let data: &Mat<f64> = &data;
                    let mut rhs = target.rhs().write();
                    let rhs: &mut Mat<f64> = &mut rhs;
                    group_interface::p2p_in_group(kernel, target, data.as_ref(), rhs.as_mut(), &internal);
                    group_interface::p2p_inner(kernel, target, data.as_ref(), rhs.as_mut(), &self_list);
                }),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BlockOptions, CurveOrdering};
    use crate::executor::{RayonExecutor, SequentialExecutor};
    use crate::testing::TallyKernel;
    use crate::tree::BufferLayout;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_particles(nb_particles: usize, seed: u64) -> Mat<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let values: Vec<f64> = (0..3 * nb_particles)
            .map(|_| rng.random_range(0.0..1.0))
            .collect();
        Mat::from_fn(nb_particles, 3, |i, j| values[3 * i + j])
    }

    fn unit_box(height: usize, periodic: bool) -> SpatialConfiguration {
        SpatialConfiguration::new(height, [0.0; 3], [1.0; 3], periodic).unwrap()
    }

    fn build(configuration: &SpatialConfiguration, particles: &Mat<f64>, block: usize) -> GroupedTree {
        GroupedTree::build(
            configuration,
            particles.as_ref(),
            BufferLayout::new(1, 1, 1),
            BlockOptions::new(block),
        )
        .unwrap()
    }

    fn assert_counts(tree: &GroupedTree, expected: f64) {
        let rhs = tree.rhs_in_original_order();
        for i in 0..rhs.nrows() {
            assert_eq!(rhs[(i, 0)], expected, "particle {i}");
        }
    }

    #[test]
    fn every_particle_sees_every_other_once() {
        let _ = env_logger::builder().is_test(true).try_init();
        let configuration = unit_box(5, false);
        let particles = random_particles(400, 1);
        let mut tree = build(&configuration, &particles, 16);

        let mut algorithm =
            FmmAlgorithm::new(&configuration, TallyKernel::default(), SequentialExecutor::new());
        let stats = algorithm.execute(&mut tree, Phases::ALL);

        assert_counts(&tree, 399.0);
        assert_eq!(stats.tasks_executed, stats.per_operation.values().sum::<usize>());
        assert_eq!(stats.per_operation[&Operation::P2M], tree.particle_groups().len());
        assert_eq!(stats.per_operation[&Operation::L2P], tree.particle_groups().len());
        assert_eq!(stats.per_operation[&Operation::P2PInGroup], tree.particle_groups().len());
    }

    #[test]
    fn rayon_and_sequential_agree_on_hilbert_trees() {
        let configuration = unit_box(6, false).with_curve(CurveOrdering::Hilbert);
        let particles = random_particles(600, 2);

        let mut sequential_tree = build(&configuration, &particles, 12);
        FmmAlgorithm::new(&configuration, TallyKernel::default(), SequentialExecutor::new())
            .execute(&mut sequential_tree, Phases::ALL);

        let mut parallel_tree = build(&configuration, &particles, 12);
        let mut algorithm = FmmAlgorithm::new(
            &configuration,
            TallyKernel::default(),
            RayonExecutor::new(4).unwrap(),
        );
        let stats = algorithm.execute(&mut parallel_tree, Phases::ALL);

        assert_counts(&parallel_tree, 599.0);
        assert_eq!(
            sequential_tree.rhs_in_original_order(),
            parallel_tree.rhs_in_original_order()
        );
        assert_eq!(sequential_tree.multipole_snapshot(), parallel_tree.multipole_snapshot());
        assert_eq!(sequential_tree.local_snapshot(), parallel_tree.local_snapshot());

        let mut calls = 0;
        algorithm.apply_to_all_kernels(|kernel| {
            calls += kernel.calls;
            kernel.calls = 0;
        });
        assert!(calls >= stats.tasks_executed);
        assert!(algorithm.kernels().iter().all(|kernel| kernel.calls == 0));
    }

    #[test]
    fn shuffled_interleavings_give_identical_buffers() {
        let configuration = unit_box(5, false);
        let particles = random_particles(300, 3);

        let mut reference = build(&configuration, &particles, 8);
        FmmAlgorithm::new(&configuration, TallyKernel::default(), SequentialExecutor::new())
            .execute(&mut reference, Phases::ALL);

        for seed in [5, 17, 91] {
            let mut shuffled = build(&configuration, &particles, 8);
            FmmAlgorithm::new(
                &configuration,
                TallyKernel::default(),
                SequentialExecutor::with_shuffle(seed),
            )
            .execute(&mut shuffled, Phases::ALL);

            assert_eq!(reference.rhs_in_original_order(), shuffled.rhs_in_original_order());
            assert_eq!(reference.multipole_snapshot(), shuffled.multipole_snapshot());
            assert_eq!(reference.local_snapshot(), shuffled.local_snapshot());
        }
    }

    #[test]
    fn two_level_tree_runs_only_the_requested_phases() {
        let configuration = unit_box(2, false);
        let particles = random_particles(30, 9);
        let mut tree = build(&configuration, &particles, 1000);
        assert_eq!(tree.particle_groups().len(), 1);
        let mut algorithm =
            FmmAlgorithm::new(&configuration, TallyKernel::default(), SequentialExecutor::new());

        let stats = algorithm.execute(&mut tree, Phases::P2M | Phases::L2P);
        assert_eq!(stats.tasks_executed, 0);
        assert_counts(&tree, 0.0);

        algorithm.execute(&mut tree, Phases::P2M | Phases::L2P | Phases::P2P);
        assert!(tree.multipole_snapshot().iter().all(|&value| value == 0.0));
        assert!(tree.local_snapshot().iter().all(|&value| value == 0.0));
        assert_counts(&tree, 29.0);
    }

    #[test]
    fn far_and_near_fields_run_separately() {
        let configuration = unit_box(4, false);
        let particles = random_particles(250, 4);
        let mut tree = build(&configuration, &particles, 10);
        let mut algorithm =
            FmmAlgorithm::new(&configuration, TallyKernel::default(), SequentialExecutor::new());

        algorithm.execute(&mut tree, Phases::P2M | Phases::L2P);
        assert_counts(&tree, 0.0);
        assert!(tree.multipole_snapshot().iter().any(|&value| value > 0.0));

        tree.reset_far_field();
        algorithm.execute(&mut tree, Phases::FAR_FIELD);
        algorithm.execute(&mut tree, Phases::NEAR_FIELD);
        assert_counts(&tree, 249.0);
    }

    #[test]
    fn coarser_stop_levels_give_the_same_counts() {
        let configuration = unit_box(5, false);
        let particles = random_particles(300, 5);

        for stop in [0, 1] {
            let mut tree = build(&configuration, &particles, 20);
            let mut algorithm = FmmAlgorithm::with_params(
                &configuration,
                TallyKernel::default(),
                SequentialExecutor::new(),
                EngineParams::new_defaults().with_stop_upper_level(stop),
            );
            algorithm.execute(&mut tree, Phases::ALL);
            assert_counts(&tree, 299.0);
        }
    }

    #[test]
    fn stop_level_at_height_leaves_only_the_near_field() {
        let configuration = unit_box(3, false);
        let particles = random_particles(200, 6);

        let mut near_only = build(&configuration, &particles, 10);
        let mut algorithm = FmmAlgorithm::with_params(
            &configuration,
            TallyKernel::default(),
            SequentialExecutor::new(),
            EngineParams::new_defaults().with_stop_upper_level(3),
        );
        let stats = algorithm.execute(&mut near_only, Phases::ALL);
        assert!(!stats.per_operation.contains_key(&Operation::P2M));
        assert!(!stats.per_operation.contains_key(&Operation::L2P));
        assert!(!stats.per_operation.contains_key(&Operation::M2LBetweenGroups));

        let mut reference = build(&configuration, &particles, 10);
        FmmAlgorithm::new(&configuration, TallyKernel::default(), SequentialExecutor::new())
            .execute(&mut reference, Phases::NEAR_FIELD);
        assert_eq!(reference.rhs_in_original_order(), near_only.rhs_in_original_order());
    }

    /// With the far field stopping at level 2, a periodic particle sees the 3x3x3 block of
    /// level-1 cells around its own; along each axis the other half of the box appears twice.
    fn periodic_image_counts(particles: &Mat<f64>) -> Vec<f64> {
        let half = |i: usize, axis: usize| (particles[(i, axis)] * 2.0).floor() as i64;
        (0..particles.nrows())
            .map(|i| {
                let images: usize = (0..particles.nrows())
                    .map(|j| {
                        (0..3)
                            .map(|axis| if half(i, axis) == half(j, axis) { 1usize } else { 2 })
                            .product::<usize>()
                    })
                    .sum();
                (images - 1) as f64
            })
            .collect()
    }

    #[test]
    fn periodic_runs_agree_across_executors() {
        let configuration = unit_box(4, true);
        let particles = random_particles(200, 7);

        let mut sequential_tree = build(&configuration, &particles, 6);
        FmmAlgorithm::new(&configuration, TallyKernel::default(), SequentialExecutor::new())
            .execute(&mut sequential_tree, Phases::ALL);

        let mut parallel_tree = build(&configuration, &particles, 6);
        FmmAlgorithm::new(
            &configuration,
            TallyKernel::default(),
            RayonExecutor::new(3).unwrap(),
        )
        .execute(&mut parallel_tree, Phases::ALL);

        let rhs = parallel_tree.rhs_in_original_order();
        assert_eq!(sequential_tree.rhs_in_original_order(), rhs);
        for (i, expected) in periodic_image_counts(&particles).into_iter().enumerate() {
            assert_eq!(rhs[(i, 0)], expected, "particle {i}");
        }
    }

    #[test]
    fn periodic_counts_do_not_depend_on_the_height() {
        let particles = random_particles(120, 12);
        let expected = periodic_image_counts(&particles);

        for height in [3, 5] {
            let configuration = unit_box(height, true);
            let mut tree = build(&configuration, &particles, 9);
            FmmAlgorithm::new(&configuration, TallyKernel::default(), SequentialExecutor::new())
                .execute(&mut tree, Phases::ALL);

            let rhs = tree.rhs_in_original_order();
            for (i, &count) in expected.iter().enumerate() {
                assert_eq!(rhs[(i, 0)], count, "particle {i} at height {height}");
            }
        }
    }

    #[test]
    #[should_panic(expected = "particle groups and leaf cell groups differ in number")]
    fn missing_particle_group_is_rejected_before_running() {
        let configuration = unit_box(4, false);
        let particles = random_particles(200, 10);
        let mut tree = build(&configuration, &particles, 6);
        assert!(tree.particle_groups().len() > 1);
        tree.particle_groups_mut().pop();

        FmmAlgorithm::new(&configuration, TallyKernel::default(), SequentialExecutor::new())
            .execute(&mut tree, Phases::P2M | Phases::L2P);
    }

    #[test]
    #[should_panic(expected = "particle group and leaf cell group start at different leaves")]
    fn misaligned_particle_groups_are_rejected_before_running() {
        let configuration = unit_box(4, false);
        let particles = random_particles(200, 11);
        let mut tree = build(&configuration, &particles, 6);
        assert!(tree.particle_groups().len() > 1);
        tree.particle_groups_mut().reverse();

        FmmAlgorithm::new(&configuration, TallyKernel::default(), SequentialExecutor::new())
            .execute(&mut tree, Phases::L2P);
    }

    #[test]
    #[should_panic(expected = "another spatial configuration")]
    fn tree_of_another_box_is_rejected() {
        let particles = random_particles(50, 8);
        let mut tree = build(&unit_box(3, false), &particles, 10);
        FmmAlgorithm::new(&unit_box(4, false), TallyKernel::default(), SequentialExecutor::new())
            .execute(&mut tree, Phases::ALL);
    }

    #[test]
    fn phase_sets_combine() {
        let phases = Phases::P2M | Phases::M2M;
        assert!(phases.contains(Phases::P2M));
        assert!(!phases.contains(Phases::M2L));
        assert!(Phases::ALL.contains(Phases::FAR_FIELD | Phases::NEAR_FIELD));
        assert!(Phases::empty().is_empty());
    }
}
