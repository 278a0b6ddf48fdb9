/////////////////////////////////////////////////////////////////////////////////////////////
//
// Kernel that sums the values of every other particle, used to validate the engine.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::{MatMut, MatRef};
use ferreus_taskfmm::{CellGeometry, FmmKernel};

/// Sums, for every particle, the physical value of every other particle.
///
/// The value is column `3` of the particle matrix, or `1.0` when only positions are
/// given, in which case every rhs ends up holding the number of other particles. All
/// operators are plain additions, so integer-valued inputs give bit-identical results
/// under any task interleaving.
#[derive(Debug, Clone, Default)]
pub struct CountingKernel {
    calls: usize,
}

impl CountingKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operator calls this instance served.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn reset_calls(&mut self) {
        self.calls = 0;
    }
}

fn value(particles: MatRef<'_, f64>, row: usize) -> f64 {
    match particles.ncols() > 3 {
        true => particles[(row, 3)],
        false => 1.0,
    }
}

fn total(particles: MatRef<'_, f64>) -> f64 {
    (0..particles.nrows()).map(|row| value(particles, row)).sum()
}

impl FmmKernel for CountingKernel {
    fn multipole_len(&self) -> usize {
        1
    }

    fn local_len(&self) -> usize {
        1
    }

    fn p2m(&mut self, _cell: &CellGeometry, particles: MatRef<'_, f64>, multipole: &mut [f64]) {
        self.calls += 1;
        multipole[0] += total(particles);
    }

    fn m2m(
        &mut self,
        _level: usize,
        _child_octant: usize,
        child_multipole: &[f64],
        parent_multipole: &mut [f64],
    ) {
        self.calls += 1;
        parent_multipole[0] += child_multipole[0];
    }

    fn m2l(
        &mut self,
        _level: usize,
        _neighbor_slot: usize,
        source_multipole: &[f64],
        target_local: &mut [f64],
    ) {
        self.calls += 1;
        target_local[0] += source_multipole[0];
    }

    fn l2l(
        &mut self,
        _level: usize,
        _child_octant: usize,
        parent_local: &[f64],
        child_local: &mut [f64],
    ) {
        self.calls += 1;
        child_local[0] += parent_local[0];
    }

    fn l2p(
        &mut self,
        _cell: &CellGeometry,
        local: &[f64],
        particles: MatRef<'_, f64>,
        mut rhs: MatMut<'_, f64>,
    ) {
        self.calls += 1;
        for row in 0..particles.nrows() {
            rhs[(row, 0)] += local[0];
        }
    }

    fn p2p(
        &mut self,
        target: MatRef<'_, f64>,
        mut target_rhs: MatMut<'_, f64>,
        source: MatRef<'_, f64>,
        mut source_rhs: MatMut<'_, f64>,
        _neighbor_slot: usize,
    ) {
        self.calls += 1;
        let source_total = total(source);
        let target_total = total(target);
        for row in 0..target.nrows() {
            target_rhs[(row, 0)] += source_total;
        }
        for row in 0..source.nrows() {
            source_rhs[(row, 0)] += target_total;
        }
    }

    fn p2p_inner(&mut self, particles: MatRef<'_, f64>, mut rhs: MatMut<'_, f64>) {
        self.calls += 1;
        let leaf_total = total(particles);
        for row in 0..particles.nrows() {
            rhs[(row, 0)] += leaf_total - value(particles, row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;
    use ferreus_taskfmm::{
        BlockOptions, BufferLayout, CurveOrdering, FmmAlgorithm, GroupedTree, Operation, Phases,
        RayonExecutor, SequentialExecutor, SpatialConfiguration, TaskExecutor,
    };
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_particles(nb_particles: usize, nb_columns: usize, seed: u64) -> Mat<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let values: Vec<f64> = (0..nb_particles * nb_columns)
            .map(|k| match k % nb_columns < 3 {
                true => rng.random_range(0.0..1.0),
                false => rng.random_range(1..5) as f64,
            })
            .collect();
        Mat::from_fn(nb_particles, nb_columns, |i, j| values[i * nb_columns + j])
    }

    fn run<E: TaskExecutor>(
        configuration: &SpatialConfiguration,
        particles: &Mat<f64>,
        executor: E,
    ) -> (Mat<f64>, usize) {
        let kernel = CountingKernel::new();
        let mut tree = GroupedTree::build(
            configuration,
            particles.as_ref(),
            BufferLayout::for_kernel(&kernel, 1),
            BlockOptions::new(50),
        )
        .unwrap();

        let mut algorithm = FmmAlgorithm::new(configuration, kernel, executor);
        let stats = algorithm.execute(&mut tree, Phases::ALL);
        assert!(stats.per_operation[&Operation::M2LBetweenGroups] > 0);

        let mut calls = 0;
        algorithm.apply_to_all_kernels(|kernel| calls += kernel.calls());
        (tree.rhs_in_original_order(), calls)
    }

    #[test]
    fn thousand_particles_count_exactly_on_both_curves_and_executors() {
        let _ = env_logger::builder().is_test(true).try_init();
        let particles = random_particles(1000, 3, 42);

        for curve in [CurveOrdering::Morton, CurveOrdering::Hilbert] {
            let configuration = SpatialConfiguration::new(8, [0.0; 3], [1.0; 3], false)
                .unwrap()
                .with_curve(curve);

            let (sequential, sequential_calls) =
                run(&configuration, &particles, SequentialExecutor::new());
            let (parallel, parallel_calls) =
                run(&configuration, &particles, RayonExecutor::new(4).unwrap());

            for row in 0..1000 {
                assert_eq!(sequential[(row, 0)], 999.0, "{curve:?} particle {row}");
                assert_eq!(parallel[(row, 0)], 999.0, "{curve:?} particle {row}");
            }
            assert_eq!(sequential_calls, parallel_calls);
        }
    }

    #[test]
    fn weighted_values_sum_over_other_particles() {
        let particles = random_particles(300, 4, 7);
        let grand_total: f64 = (0..300).map(|row| particles[(row, 3)]).sum();
        let configuration = SpatialConfiguration::from_center(5, [0.5; 3], 1.0, false).unwrap();

        let (rhs, _) = run(&configuration, &particles, SequentialExecutor::with_shuffle(3));
        for row in 0..300 {
            assert_eq!(rhs[(row, 0)], grand_total - particles[(row, 3)]);
        }
    }
}
