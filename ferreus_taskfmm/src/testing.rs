/////////////////////////////////////////////////////////////////////////////////////////////
//
// Counting kernel shared by the unit tests of this crate.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::space_index::CellGeometry;
use crate::traits::FmmKernel;
use faer::{MatMut, MatRef};

/// Every particle has a unit value; each rhs ends up counting the other particles.
#[derive(Debug, Clone, Default)]
pub(crate) struct TallyKernel {
    pub(crate) calls: usize,
}

impl FmmKernel for TallyKernel {
    fn multipole_len(&self) -> usize {
        1
    }

    fn local_len(&self) -> usize {
        1
    }

    fn p2m(&mut self, _cell: &CellGeometry, particles: MatRef<'_, f64>, multipole: &mut [f64]) {
        self.calls += 1;
        multipole[0] += particles.nrows() as f64;
    }

    fn m2m(&mut self, _level: usize, _octant: usize, child: &[f64], parent: &mut [f64]) {
        self.calls += 1;
        parent[0] += child[0];
    }

    fn m2l(&mut self, _level: usize, _slot: usize, source: &[f64], target: &mut [f64]) {
        self.calls += 1;
        target[0] += source[0];
    }

    fn l2l(&mut self, _level: usize, _octant: usize, parent: &[f64], child: &mut [f64]) {
        self.calls += 1;
        child[0] += parent[0];
    }

    fn l2p(
        &mut self,
        _cell: &CellGeometry,
        local: &[f64],
        particles: MatRef<'_, f64>,
        mut rhs: MatMut<'_, f64>,
    ) {
        self.calls += 1;
        for i in 0..particles.nrows() {
            rhs[(i, 0)] += local[0];
        }
    }

    fn p2p(
        &mut self,
        target: MatRef<'_, f64>,
        mut target_rhs: MatMut<'_, f64>,
        source: MatRef<'_, f64>,
        mut source_rhs: MatMut<'_, f64>,
        _slot: usize,
    ) {
        self.calls += 1;
        for i in 0..target.nrows() {
            target_rhs[(i, 0)] += source.nrows() as f64;
        }
        for i in 0..source.nrows() {
            source_rhs[(i, 0)] += target.nrows() as f64;
        }
    }

    fn p2p_inner(&mut self, particles: MatRef<'_, f64>, mut rhs: MatMut<'_, f64>) {
        self.calls += 1;
        for i in 0..particles.nrows() {
            rhs[(i, 0)] += (particles.nrows() - 1) as f64;
        }
    }
}
