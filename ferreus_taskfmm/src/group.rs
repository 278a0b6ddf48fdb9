/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares the cell and particle groups: contiguous blocks of a tree level and their buffers.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::region::RegionCell;
use faer::{Mat, MatMut, MatRef};
use std::ops::Range;

/// A block of cells or leaves covering a contiguous span of spatial indices.
///
/// Indices held by a group are sorted and unique. `first_index` and `last_index` are
/// both inclusive; the span may contain indices with no element (sparse trees).
pub trait GroupRange {
    fn first_index(&self) -> u64;

    fn last_index(&self) -> u64;

    fn nb_elements(&self) -> usize;

    /// Spatial index of the element stored at `position`.
    fn element_index(&self, position: usize) -> u64;

    /// Position of the element with spatial index `index`, if the group holds it.
    fn position_of(&self, index: u64) -> Option<usize>;

    fn has_element_at_index(&self, index: u64) -> bool {
        self.position_of(index).is_some()
    }

    /// Whether `index` falls inside the covered span, regardless of existence.
    fn covers(&self, index: u64) -> bool {
        self.first_index() <= index && index <= self.last_index()
    }
}

/// Cells of one tree level along with their multipole and local expansions.
///
/// Expansions are stored cell after cell in a flat buffer, `multipole_len`
/// (resp. `local_len`) values per cell.
#[derive(Debug)]
pub struct CellGroup {
    indices: Vec<u64>,
    multipole_len: usize,
    local_len: usize,
    multipole: RegionCell<Vec<f64>>,
    local: RegionCell<Vec<f64>>,
}

impl CellGroup {
    /// Creates a group holding the sorted, non-empty `indices`, with zeroed expansions.
    pub fn new(indices: Vec<u64>, multipole_len: usize, local_len: usize) -> Self {
        assert!(!indices.is_empty(), "a cell group needs at least one cell");
        assert!(
            indices.windows(2).all(|pair| pair[0] < pair[1]),
            "cell group indices must be strictly increasing"
        );
        let nb_cells = indices.len();
        CellGroup {
            indices,
            multipole_len,
            local_len,
            multipole: RegionCell::new(vec![0.0; nb_cells * multipole_len]),
            local: RegionCell::new(vec![0.0; nb_cells * local_len]),
        }
    }

    pub fn nb_cells(&self) -> usize {
        self.indices.len()
    }

    pub fn indices(&self) -> &[u64] {
        &self.indices
    }

    pub fn multipole_len(&self) -> usize {
        self.multipole_len
    }

    pub fn local_len(&self) -> usize {
        self.local_len
    }

    pub fn multipole(&self) -> &RegionCell<Vec<f64>> {
        &self.multipole
    }

    pub fn local(&self) -> &RegionCell<Vec<f64>> {
        &self.local
    }

    /// Range of the values of the cell at `position` inside the multipole buffer.
    pub fn multipole_range(&self, position: usize) -> Range<usize> {
        position * self.multipole_len..(position + 1) * self.multipole_len
    }

    pub fn local_range(&self, position: usize) -> Range<usize> {
        position * self.local_len..(position + 1) * self.local_len
    }

    /// Zeroes both expansions.
    pub fn reset(&mut self) {
        self.multipole.get_mut().fill(0.0);
        self.local.get_mut().fill(0.0);
    }
}

impl GroupRange for CellGroup {
    fn first_index(&self) -> u64 {
        self.indices[0]
    }

    fn last_index(&self) -> u64 {
        self.indices[self.indices.len() - 1]
    }

    fn nb_elements(&self) -> usize {
        self.indices.len()
    }

    fn element_index(&self, position: usize) -> u64 {
        self.indices[position]
    }

    fn position_of(&self, index: u64) -> Option<usize> {
        self.indices.binary_search(&index).ok()
    }
}

/// Particles of a run of leaves, sorted by leaf index.
///
/// `data` has one row per particle; columns `0..3` are the positions and any further
/// column is a physical value. `rhs` has one row per particle and one column per result.
#[derive(Debug)]
pub struct ParticleGroup {
    leaf_indices: Vec<u64>,
    leaf_offsets: Vec<usize>,
    original_indices: Vec<usize>,
    data: RegionCell<Mat<f64>>,
    rhs: RegionCell<Mat<f64>>,
}

impl ParticleGroup {
    /// Creates a group from sorted leaf indices and the particle offsets of each leaf.
    ///
    /// `leaf_offsets` has one more entry than `leaf_indices`; leaf `i` owns the rows
    /// `leaf_offsets[i]..leaf_offsets[i + 1]` of `data`.
    pub fn new(
        leaf_indices: Vec<u64>,
        leaf_offsets: Vec<usize>,
        original_indices: Vec<usize>,
        data: Mat<f64>,
        nb_rhs: usize,
    ) -> Self {
        assert!(!leaf_indices.is_empty(), "a particle group needs at least one leaf");
        assert_eq!(leaf_offsets.len(), leaf_indices.len() + 1);
        assert!(
            leaf_indices.windows(2).all(|pair| pair[0] < pair[1]),
            "leaf indices must be strictly increasing"
        );
        assert!(
            leaf_offsets.windows(2).all(|pair| pair[0] < pair[1]),
            "every leaf must hold at least one particle"
        );
        assert_eq!(leaf_offsets[0], 0);
        assert_eq!(leaf_offsets[leaf_indices.len()], data.nrows());
        assert_eq!(original_indices.len(), data.nrows());

        let nb_particles = data.nrows();
        ParticleGroup {
            leaf_indices,
            leaf_offsets,
            original_indices,
            data: RegionCell::new(data),
            rhs: RegionCell::new(Mat::zeros(nb_particles, nb_rhs)),
        }
    }

    pub fn nb_leaves(&self) -> usize {
        self.leaf_indices.len()
    }

    pub fn nb_particles(&self) -> usize {
        self.original_indices.len()
    }

    pub fn leaf_indices(&self) -> &[u64] {
        &self.leaf_indices
    }

    /// Rows of the particles of the leaf at `position`.
    pub fn leaf_range(&self, position: usize) -> Range<usize> {
        self.leaf_offsets[position]..self.leaf_offsets[position + 1]
    }

    /// Index of every particle in the caller's original ordering.
    pub fn original_indices(&self) -> &[usize] {
        &self.original_indices
    }

    pub fn data(&self) -> &RegionCell<Mat<f64>> {
        &self.data
    }

    pub fn rhs(&self) -> &RegionCell<Mat<f64>> {
        &self.rhs
    }

    pub fn rhs_mut(&mut self) -> &mut Mat<f64> {
        self.rhs.get_mut()
    }

    pub fn reset_rhs(&mut self) {
        let rhs = self.rhs.get_mut();
        *rhs = Mat::zeros(rhs.nrows(), rhs.ncols());
    }
}

impl GroupRange for ParticleGroup {
    fn first_index(&self) -> u64 {
        self.leaf_indices[0]
    }

    fn last_index(&self) -> u64 {
        self.leaf_indices[self.leaf_indices.len() - 1]
    }

    fn nb_elements(&self) -> usize {
        self.leaf_indices.len()
    }

    fn element_index(&self, position: usize) -> u64 {
        self.leaf_indices[position]
    }

    fn position_of(&self, index: u64) -> Option<usize> {
        self.leaf_indices.binary_search(&index).ok()
    }
}

/// Rows of one leaf in a particle buffer.
pub fn leaf_rows<'m>(matrix: MatRef<'m, f64>, rows: &Range<usize>) -> MatRef<'m, f64> {
    matrix.subrows(rows.start, rows.len())
}

/// Mutable rows of one leaf in a particle buffer.
pub fn leaf_rows_mut<'m>(matrix: MatMut<'m, f64>, rows: &Range<usize>) -> MatMut<'m, f64> {
    matrix.subrows_mut(rows.start, rows.len())
}
