/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares the error type returned by engine construction and tree building.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use thiserror::Error;

/// Recoverable errors raised while configuring the engine or building a tree.
///
/// Everything that goes wrong once `execute` has started is a broken precondition
/// and panics instead.
#[derive(Debug, Error)]
pub enum FmmError {
    /// The tree height must leave room for a 3-D leaf index in 63 bits.
    #[error("tree height {height} is outside the supported range 1..=21")]
    InvalidTreeHeight { height: usize },

    #[error("box width {width} along axis {axis} must be finite and positive")]
    InvalidBoxWidth { axis: usize, width: f64 },

    #[error("box corner {value} along axis {axis} is not finite")]
    InvalidBoxCorner { axis: usize, value: f64 },

    /// Periodic wrap is only defined for a cubic simulation box.
    #[error("a periodic configuration requires equal box widths, got {widths:?}")]
    NonCubicPeriodicBox { widths: [f64; 3] },

    #[error("a block must hold at least one element")]
    EmptyBlockSize,

    #[error("particle data needs at least 3 position columns, got {ncols}")]
    MissingPositionColumns { ncols: usize },

    #[error("failed to build the worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
