/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares the cell-level operator trait implemented by FMM kernels.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::space_index::CellGeometry;
use faer::{MatMut, MatRef};

/// Cell-level operators of a hierarchical interaction method.
///
/// The engine keeps one instance per worker, cloned from a prototype, and hands each
/// task the instance of the worker running it. Implementations may therefore keep
/// mutable scratch state without any synchronisation.
///
/// Particle matrices have one row per particle: `x, y, z` followed by the physical
/// values. Result matrices have one row per particle and one column per result.
/// Every operator accumulates into its output and never overwrites it.
pub trait FmmKernel: Clone + Send {
    /// Number of values of a multipole expansion.
    fn multipole_len(&self) -> usize;

    /// Number of values of a local expansion.
    fn local_len(&self) -> usize;

    fn p2m(&mut self, cell: &CellGeometry, particles: MatRef<'_, f64>, multipole: &mut [f64]);

    /// Translates the multipole of a child in `child_octant` into its parent on `level`.
    fn m2m(
        &mut self,
        level: usize,
        child_octant: usize,
        child_multipole: &[f64],
        parent_multipole: &mut [f64],
    );

    /// Converts the multipole of a well-separated source on `level` into the local
    /// expansion of a target. `neighbor_slot` encodes the source offset.
    fn m2l(
        &mut self,
        level: usize,
        neighbor_slot: usize,
        source_multipole: &[f64],
        target_local: &mut [f64],
    );

    /// Translates the local expansion of a parent on `level` into its child in `child_octant`.
    fn l2l(
        &mut self,
        level: usize,
        child_octant: usize,
        parent_local: &[f64],
        child_local: &mut [f64],
    );

    fn l2p(
        &mut self,
        cell: &CellGeometry,
        local: &[f64],
        particles: MatRef<'_, f64>,
        rhs: MatMut<'_, f64>,
    );

    /// Direct interaction between two adjacent leaves, applied to both sides.
    fn p2p(
        &mut self,
        target: MatRef<'_, f64>,
        target_rhs: MatMut<'_, f64>,
        source: MatRef<'_, f64>,
        source_rhs: MatMut<'_, f64>,
        neighbor_slot: usize,
    );

    /// Direct interaction of a leaf with itself.
    fn p2p_inner(&mut self, particles: MatRef<'_, f64>, rhs: MatMut<'_, f64>);
}
