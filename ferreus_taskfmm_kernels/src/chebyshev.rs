/////////////////////////////////////////////////////////////////////////////////////////////
//
// Chebyshev interpolation kernel for the 1/r potential.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::{Mat, MatMut, MatRef};
use ferreus_taskfmm::{
    far_field_offset, CellGeometry, FmmKernel, SpatialConfiguration, NB_FAR_FIELD_SLOTS,
};
use itertools::iproduct;
use log::debug;
use rayon::prelude::*;
use std::sync::Arc;

// # References
// [1] W. Fong, E. Darve, The black-box fast multipole method, Journal of Computational Physics 228 (23) (2009) 8712-8725.

/// Generates Chebyshev nodes between -1 and 1 of T_n(x) for the given interpolation order.
fn generate_chebyshev_nodes(interpolation_order: usize) -> Vec<f64> {
    (0..interpolation_order)
        .rev()
        .map(|i| {
            let theta = std::f64::consts::PI * (i as f64 + 0.5) / interpolation_order as f64;
            theta.cos()
        })
        .collect()
}

/// T_k(x) for every point and every k below the interpolation order.
///
///  T_0(x) = 1
///  T_1(x) = x
///  T_{n+1}(x) = 2xT_n(x) - T_{n-1}(x)
fn evaluate_chebyshev_polynomials(interpolation_order: usize, points: &[f64]) -> Mat<f64> {
    let mut tn_x = Mat::<f64>::zeros(points.len(), interpolation_order);

    for (i, &x) in points.iter().enumerate() {
        for j in 0..interpolation_order {
            tn_x[(i, j)] = match j {
                0 => 1.0,
                1 => x,
                _ => 2.0 * x * tn_x[(i, j - 1)] - tn_x[(i, j - 2)],
            };
        }
    }

    tn_x
}

/// Interpolation weights S(x, x_m) of every point against every Chebyshev node.
fn calculate_sn(tn_x: Mat<f64>, polynomial_nodes: &Mat<f64>, interpolation_order: usize) -> Mat<f64> {
    let mut sn = tn_x * &polynomial_nodes.transpose();

    sn.col_iter_mut().for_each(|col| {
        col.iter_mut().for_each(|element| {
            *element = (*element * 2.0 - 1.0) / interpolation_order as f64;
        });
    });
    sn
}

/// Operators shared by every instance of a [`ChebyshevKernel`].
#[derive(Debug)]
pub struct ChebyshevOperators {
    interpolation_order: usize,
    polynomial_nodes: Mat<f64>,
    /// Axis node of every coefficient, `x` varying slowest.
    multi_indices: Vec<[usize; 3]>,
    /// One per child octant, parent coefficients by child coefficients.
    m2m: Vec<Mat<f64>>,
    /// One per far-field slot, for unit-width cells; `None` for adjacent offsets.
    m2l: Vec<Option<Mat<f64>>>,
}

impl ChebyshevOperators {
    pub fn new(interpolation_order: usize) -> Self {
        assert!(interpolation_order >= 2, "interpolation order must be at least 2");

        let nodes = generate_chebyshev_nodes(interpolation_order);
        let polynomial_nodes = evaluate_chebyshev_polynomials(interpolation_order, &nodes);
        let multi_indices: Vec<[usize; 3]> =
            iproduct!(0..interpolation_order, 0..interpolation_order, 0..interpolation_order)
                .map(|(x, y, z)| [x, y, z])
                .collect();

        let m2m = get_m2m_transfer_matrices(interpolation_order, &nodes, &polynomial_nodes);
        let m2l = get_m2l_operators(&nodes, &multi_indices);

        ChebyshevOperators {
            interpolation_order,
            polynomial_nodes,
            multi_indices,
            m2m,
            m2l,
        }
    }

    pub fn interpolation_order(&self) -> usize {
        self.interpolation_order
    }

    /// Number of coefficients of an expansion.
    pub fn nb_coefficients(&self) -> usize {
        self.multi_indices.len()
    }

    pub fn nb_m2l_operators(&self) -> usize {
        self.m2l.iter().flatten().count()
    }

    /// Child-to-parent transfer of one octant; its transpose is the parent-to-child one.
    pub fn m2m_operator(&self, child_octant: usize) -> MatRef<'_, f64> {
        self.m2m[child_octant].as_ref()
    }

    /// Weights of `points`, already scaled to `[-1, 1]`, against the nodes of one axis.
    fn weights(&self, points: &[f64]) -> Mat<f64> {
        let tn_x = evaluate_chebyshev_polynomials(self.interpolation_order, points);
        calculate_sn(tn_x, &self.polynomial_nodes, self.interpolation_order)
    }
}

/// Transfers from the coefficients of a child in each octant to those of its parent.
fn get_m2m_transfer_matrices(
    interpolation_order: usize,
    cheb_nodes: &[f64],
    polynomial_nodes: &Mat<f64>,
) -> Vec<Mat<f64>> {
    // Nodes of the lower child followed by those of the upper child, in parent coordinates.
    let child_cheb_nodes: Vec<f64> = (0..2 * interpolation_order)
        .map(|i| match i < interpolation_order {
            true => (cheb_nodes[i] - 1.0) * 0.5,
            false => (cheb_nodes[i - interpolation_order] + 1.0) * 0.5,
        })
        .collect();

    let tn_x = evaluate_chebyshev_polynomials(interpolation_order, &child_cheb_nodes);
    let sn = calculate_sn(tn_x, polynomial_nodes, interpolation_order);
    let (lower, upper) = sn.split_at_row(interpolation_order);

    (0..8)
        .map(|octant: usize| {
            let half = |axis: usize| match (octant >> (2 - axis)) & 1 {
                0 => lower,
                _ => upper,
            };
            let transfer = half(0).to_owned().kron(half(1)).kron(half(2));
            transfer.transpose().to_owned()
        })
        .collect()
}

/// Kernel matrices between the nodes of two unit cells, one per well-separated offset.
fn get_m2l_operators(cheb_nodes: &[f64], multi_indices: &[[usize; 3]]) -> Vec<Option<Mat<f64>>> {
    let nb_coefficients = multi_indices.len();

    (0..NB_FAR_FIELD_SLOTS)
        .into_par_iter()
        .map(|slot| {
            let offset = far_field_offset(slot);
            if offset.iter().all(|component| component.abs() <= 1) {
                return None;
            }
            Some(Mat::from_fn(nb_coefficients, nb_coefficients, |t, s| {
                let distance = (0..3)
                    .map(|axis| {
                        let target = 0.5 * cheb_nodes[multi_indices[t][axis]];
                        let source = 0.5 * cheb_nodes[multi_indices[s][axis]] + offset[axis] as f64;
                        (target - source) * (target - source)
                    })
                    .sum::<f64>()
                    .sqrt();
                1.0 / distance
            }))
        })
        .collect()
}

fn assert_has_charges(particles: MatRef<'_, f64>) {
    assert!(
        particles.ncols() > 3,
        "the Chebyshev kernel reads particle charges from column 3, found {} columns",
        particles.ncols()
    );
}

fn inverse_distance(target: MatRef<'_, f64>, i: usize, source: MatRef<'_, f64>, j: usize) -> f64 {
    let distance = (0..3)
        .map(|axis| {
            let diff = target[(i, axis)] - source[(j, axis)];
            diff * diff
        })
        .sum::<f64>()
        .sqrt();
    match distance > 0.0 {
        true => 1.0 / distance,
        false => 0.0,
    }
}

/// Potential `sum_j q_j / |x_i - x_j|` through tensor Chebyshev interpolation.
///
/// Particles carry their charge in column `3`. The box must be cubic and non-periodic.
/// M2L operators are precomputed once for unit cells and rescaled per level, since the
/// kernel is homogeneous of degree -1.
#[derive(Debug, Clone)]
pub struct ChebyshevKernel {
    operators: Arc<ChebyshevOperators>,
    box_width: f64,
    scratch: Vec<f64>,
}

impl ChebyshevKernel {
    pub fn new(interpolation_order: usize, configuration: &SpatialConfiguration) -> Self {
        let width = configuration.box_width();
        assert!(
            width[0] == width[1] && width[0] == width[2],
            "the Chebyshev kernel needs a cubic box"
        );
        assert!(!configuration.periodic(), "the Chebyshev kernel does not handle periodic boxes");

        let operators = Arc::new(ChebyshevOperators::new(interpolation_order));
        debug!(
            "precomputed {} M2L operators with {} coefficients each",
            operators.nb_m2l_operators(),
            operators.nb_coefficients()
        );

        ChebyshevKernel {
            scratch: vec![0.0; operators.nb_coefficients()],
            operators,
            box_width: width[0],
        }
    }

    pub fn operators(&self) -> &ChebyshevOperators {
        &self.operators
    }

    /// Per-axis interpolation weights of the particles of one cell.
    fn cell_weights(&self, cell: &CellGeometry, particles: MatRef<'_, f64>) -> [Mat<f64>; 3] {
        std::array::from_fn(|axis| {
            let half_width = 0.5 * cell.width[axis];
            let scaled: Vec<f64> = (0..particles.nrows())
                .map(|i| (particles[(i, axis)] - cell.center[axis]) / half_width)
                .collect();
            self.operators.weights(&scaled)
        })
    }

    /// Fills the scratch buffer with the tensor weights of particle `i`.
    fn fill_tensor_weights(&mut self, weights: &[Mat<f64>; 3], i: usize) {
        for (value, [x, y, z]) in self.scratch.iter_mut().zip(&self.operators.multi_indices) {
            *value = weights[0][(i, *x)] * weights[1][(i, *y)] * weights[2][(i, *z)];
        }
    }
}

impl FmmKernel for ChebyshevKernel {
    fn multipole_len(&self) -> usize {
        self.operators.nb_coefficients()
    }

    fn local_len(&self) -> usize {
        self.operators.nb_coefficients()
    }

    fn p2m(&mut self, cell: &CellGeometry, particles: MatRef<'_, f64>, multipole: &mut [f64]) {
        assert_has_charges(particles);
        let weights = self.cell_weights(cell, particles);
        for i in 0..particles.nrows() {
            self.fill_tensor_weights(&weights, i);
            let charge = particles[(i, 3)];
            for (coefficient, weight) in multipole.iter_mut().zip(&self.scratch) {
                *coefficient += charge * weight;
            }
        }
    }

    fn m2m(
        &mut self,
        _level: usize,
        child_octant: usize,
        child_multipole: &[f64],
        parent_multipole: &mut [f64],
    ) {
        let transfer = &self.operators.m2m[child_octant];
        for (m, coefficient) in parent_multipole.iter_mut().enumerate() {
            *coefficient += child_multipole
                .iter()
                .enumerate()
                .map(|(l, value)| transfer[(m, l)] * value)
                .sum::<f64>();
        }
    }

    fn m2l(
        &mut self,
        level: usize,
        neighbor_slot: usize,
        source_multipole: &[f64],
        target_local: &mut [f64],
    ) {
        let Some(operator) = self.operators.m2l[neighbor_slot].as_ref() else {
            panic!("no M2L operator for adjacent slot {neighbor_slot}");
        };
        let scale = ((1u64 << level) as f64) / self.box_width;
        for (t, coefficient) in target_local.iter_mut().enumerate() {
            *coefficient += scale
                * source_multipole
                    .iter()
                    .enumerate()
                    .map(|(s, value)| operator[(t, s)] * value)
                    .sum::<f64>();
        }
    }

    fn l2l(
        &mut self,
        _level: usize,
        child_octant: usize,
        parent_local: &[f64],
        child_local: &mut [f64],
    ) {
        let transfer = &self.operators.m2m[child_octant];
        for (l, coefficient) in child_local.iter_mut().enumerate() {
            *coefficient += parent_local
                .iter()
                .enumerate()
                .map(|(m, value)| transfer[(m, l)] * value)
                .sum::<f64>();
        }
    }

    fn l2p(
        &mut self,
        cell: &CellGeometry,
        local: &[f64],
        particles: MatRef<'_, f64>,
        mut rhs: MatMut<'_, f64>,
    ) {
        let weights = self.cell_weights(cell, particles);
        for i in 0..particles.nrows() {
            self.fill_tensor_weights(&weights, i);
            rhs[(i, 0)] += local
                .iter()
                .zip(&self.scratch)
                .map(|(coefficient, weight)| coefficient * weight)
                .sum::<f64>();
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
        assert_has_charges(target);
        assert_has_charges(source);
        for i in 0..target.nrows() {
            for j in 0..source.nrows() {
                let weight = inverse_distance(target, i, source, j);
                target_rhs[(i, 0)] += source[(j, 3)] * weight;
                source_rhs[(j, 0)] += target[(i, 3)] * weight;
            }
        }
    }

    fn p2p_inner(&mut self, particles: MatRef<'_, f64>, mut rhs: MatMut<'_, f64>) {
        assert_has_charges(particles);
        for i in 0..particles.nrows() {
            for j in (i + 1)..particles.nrows() {
                let weight = inverse_distance(particles, i, particles, j);
                rhs[(i, 0)] += particles[(j, 3)] * weight;
                rhs[(j, 0)] += particles[(i, 3)] * weight;
            }
        }
    }
}
