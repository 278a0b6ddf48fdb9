/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares the spatial configuration, engine parameters and block options used by the engine.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Declares the spatial configuration, engine parameters and block options used by the engine.
use crate::error::FmmError;
use serde::{Deserialize, Serialize};

/// Largest supported tree height. A leaf index uses `3 * (height - 1)` bits.
pub const MAX_TREE_HEIGHT: usize = 21;

/// Space-filling curve used to order cells within a level.
#[derive(Debug, Default, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CurveOrdering {
    /// Plain Z-order interleaving of the grid coordinates.
    #[default]
    Morton,

    /// Morton codes remapped triplet by triplet onto a 3-D Hilbert curve.
    /// Consecutive cells along the curve are always face-adjacent.
    Hilbert,
}

/// Geometry of the simulation box shared by the tree and the engine.
///
/// The box is split into `2^level` cells per axis at every level, level `0`
/// being the root and `tree_height - 1` the leaves. A configuration is validated
/// once on construction and never changes afterwards; the engine asserts that a
/// tree it is asked to run on was built from an equal configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpatialConfiguration {
    tree_height: usize,
    box_corner: [f64; 3],
    box_width: [f64; 3],
    periodic: bool,
    curve: CurveOrdering,
}

impl SpatialConfiguration {
    /// Creates a Morton-ordered configuration from the lower corner and the widths of the box.
    pub fn new(
        tree_height: usize,
        box_corner: [f64; 3],
        box_width: [f64; 3],
        periodic: bool,
    ) -> Result<Self, FmmError> {
        let configuration = SpatialConfiguration {
            tree_height,
            box_corner,
            box_width,
            periodic,
            curve: CurveOrdering::Morton,
        };
        configuration.validate()?;
        Ok(configuration)
    }

    /// Creates a cubic configuration from the box center and a single width.
    pub fn from_center(
        tree_height: usize,
        box_center: [f64; 3],
        box_width: f64,
        periodic: bool,
    ) -> Result<Self, FmmError> {
        let half = box_width * 0.5;
        Self::new(
            tree_height,
            [box_center[0] - half, box_center[1] - half, box_center[2] - half],
            [box_width; 3],
            periodic,
        )
    }

    /// Returns the same configuration ordered along `curve`.
    pub fn with_curve(mut self, curve: CurveOrdering) -> Self {
        self.curve = curve;
        self
    }

    /// Checks the invariants a deserialized configuration may not hold.
    pub fn validate(&self) -> Result<(), FmmError> {
        if self.tree_height == 0 || self.tree_height > MAX_TREE_HEIGHT {
            return Err(FmmError::InvalidTreeHeight {
                height: self.tree_height,
            });
        }

        for axis in 0..3 {
            let width = self.box_width[axis];
            if !width.is_finite() || width <= 0.0 {
                return Err(FmmError::InvalidBoxWidth { axis, width });
            }
            let value = self.box_corner[axis];
            if !value.is_finite() {
                return Err(FmmError::InvalidBoxCorner { axis, value });
            }
        }

        if self.periodic
            && (self.box_width[0] != self.box_width[1] || self.box_width[0] != self.box_width[2])
        {
            return Err(FmmError::NonCubicPeriodicBox {
                widths: self.box_width,
            });
        }

        Ok(())
    }

    pub fn tree_height(&self) -> usize {
        self.tree_height
    }

    /// Level holding the leaves, `tree_height - 1`.
    pub fn leaf_level(&self) -> usize {
        self.tree_height - 1
    }

    pub fn box_corner(&self) -> [f64; 3] {
        self.box_corner
    }

    pub fn box_width(&self) -> [f64; 3] {
        self.box_width
    }

    pub fn box_center(&self) -> [f64; 3] {
        std::array::from_fn(|axis| self.box_corner[axis] + self.box_width[axis] * 0.5)
    }

    pub fn periodic(&self) -> bool {
        self.periodic
    }

    pub fn curve(&self) -> CurveOrdering {
        self.curve
    }

    /// Width of a cell at `level` along `axis`.
    pub fn cell_width(&self, level: usize, axis: usize) -> f64 {
        self.box_width[axis] / ((1u64 << level) as f64)
    }

    pub fn leaf_width(&self, axis: usize) -> f64 {
        self.cell_width(self.leaf_level(), axis)
    }
}

/// Parameters of the task-parallel engine.
///
/// ### Default Values
/// - `stop_upper_level`: `2`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct EngineParams {
    /// Coarsest level the far field recurses to. M2M stops and L2L starts here,
    /// and M2L runs on every level from here down to the leaves.
    pub stop_upper_level: usize,
}

impl EngineParams {
    pub fn new_defaults() -> Self {
        EngineParams {
            stop_upper_level: 2,
        }
    }

    pub fn with_stop_upper_level(mut self, stop_upper_level: usize) -> Self {
        self.stop_upper_level = stop_upper_level;
        self
    }
}

impl Default for EngineParams {
    fn default() -> Self {
        Self::new_defaults()
    }
}

/// Controls how the sorted cells of a level are cut into groups.
///
/// ### Default Values
/// - `elements_per_block`: `250`
/// - `one_group_per_parent`: `false`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct BlockOptions {
    /// Maximum number of cells (or leaves) held by one group.
    pub elements_per_block: usize,

    /// Starts a new group whenever the parent cell changes, so that no parent
    /// has its children spread over two groups.
    pub one_group_per_parent: bool,
}

impl BlockOptions {
    pub fn new(elements_per_block: usize) -> Self {
        BlockOptions {
            elements_per_block,
            one_group_per_parent: false,
        }
    }
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self::new(250)
    }
}
