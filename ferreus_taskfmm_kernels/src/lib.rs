/////////////////////////////////////////////////////////////////////////////////////////////
//
// Exposes the kernels shipped with the task-parallel FMM engine.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Kernels for `ferreus_taskfmm`
//!
//! - [`CountingKernel`] sums the value of every other particle. With unit values every
//!   result equals the number of particles minus one, which makes it a cheap check that
//!   each pair of particles is visited exactly once.
//! - [`ChebyshevKernel`] evaluates the 1/r potential through tensor Chebyshev
//!   interpolation, in the manner of the black-box FMM.
//!
//! # Example: Counting Interactions
//!
//! ```
//! use faer::Mat;
//! use ferreus_taskfmm::{
//!     BlockOptions, BufferLayout, FmmAlgorithm, GroupedTree, Phases, RayonExecutor,
//!     SpatialConfiguration,
//! };
//! use ferreus_taskfmm_kernels::CountingKernel;
//! use rand::{Rng, SeedableRng};
//! use rand::rngs::StdRng;
//!
//! // Random particles in the unit cube, one row per particle.
//! let num_points = 500;
//! let mut rng = StdRng::seed_from_u64(42);
//! let coordinates: Vec<f64> = (0..3 * num_points).map(|_| rng.random_range(0.0..1.0)).collect();
//! let particles = Mat::from_fn(num_points, 3, |i, j| coordinates[3 * i + j]);
//!
//! let configuration = SpatialConfiguration::new(5, [0.0; 3], [1.0; 3], false).unwrap();
//! let kernel = CountingKernel::new();
//! let mut tree = GroupedTree::build(
//!     &configuration,
//!     particles.as_ref(),
//!     BufferLayout::for_kernel(&kernel, 1),
//!     BlockOptions::default(),
//! )
//! .unwrap();
//!
//! let mut algorithm = FmmAlgorithm::new(&configuration, kernel, RayonExecutor::new(0).unwrap());
//! algorithm.execute(&mut tree, Phases::ALL);
//!
//! let counts = tree.rhs_in_original_order();
//! assert!((0..num_points).all(|i| counts[(i, 0)] == (num_points - 1) as f64));
//! ```
mod chebyshev;
mod counting;

pub use chebyshev::{ChebyshevKernel, ChebyshevOperators};
pub use counting::CountingKernel;
