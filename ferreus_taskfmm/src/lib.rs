/////////////////////////////////////////////////////////////////////////////////////////////
//
// Exposes the public API of the task-parallel FMM execution engine.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Task-parallel FMM engine
//!
//! This crate runs the six phases of a fast multipole method (P2M, M2M, M2L, L2L, L2P
//! and P2P) over a grouped octree as one dependency graph of fine-grained tasks.
//!
//! Cells of every level are sorted along a Morton or Hilbert curve and cut into
//! groups of consecutive cells. Each task works on one group or on one pair of groups
//! and declares which group buffers it reads and which it accumulates into. Dependencies
//! follow from those declarations alone. Accumulations into the same buffer commute: they
//! may run in any order but never at the same time.
//!
//! The physics lives behind the [`FmmKernel`] trait. The engine clones the kernel once
//! per worker so that kernels may keep scratch state. Concurrency is provided by a
//! [`TaskExecutor`]: [`RayonExecutor`] on a dedicated thread pool, or
//! [`SequentialExecutor`] for debugging and reproducibility checks.
//!
//! # Features:
//! - Morton and Hilbert cell orderings
//! - Periodic and non-periodic boxes
//! - Any subset of phases per run, e.g. far and near field separately
//! - Multiple right-hand sides
//!
//! Typical use builds a [`GroupedTree`] from a particle matrix, creates an
//! [`FmmAlgorithm`] for the same [`SpatialConfiguration`], calls
//! [`FmmAlgorithm::execute`] and reads the results back with
//! [`GroupedTree::rhs_in_original_order`].
mod algorithm;
mod config;
mod error;
mod executor;
mod group;
pub mod group_interface;
mod kernel_pool;
pub mod morton;
mod morton_constants;
mod priorities;
mod region;
mod space_index;
mod task_graph;
mod traits;
mod tree;
mod utils;
mod zipper;

#[cfg(test)]
mod testing;

pub use algorithm::{FmmAlgorithm, Phases};
pub use config::{BlockOptions, CurveOrdering, EngineParams, SpatialConfiguration, MAX_TREE_HEIGHT};
pub use error::FmmError;
pub use executor::{ExecutionStats, RayonExecutor, SequentialExecutor, TaskExecutor};
pub use group::{leaf_rows, leaf_rows_mut, CellGroup, GroupRange, ParticleGroup};
pub use kernel_pool::{KernelGuard, KernelPool};
pub use priorities::OperationPriorities;
pub use region::{BufferField, GroupKey, RegionCell, RegionKey, RegionMut, RegionRef};
pub use space_index::{
    far_field_offset, far_field_slot, near_field_offset, near_field_slot, CellGeometry,
    Interaction, InteractionLists, SpaceIndex, MAX_INTERACTIONS_PER_CELL, MAX_NEIGHBORS_PER_CELL,
    NB_FAR_FIELD_SLOTS, NB_NEAR_FIELD_SLOTS, SELF_SLOT,
};
pub use task_graph::{Operation, TaskBody, TaskDescriptor, TaskGraph, TaskId, TaskMeta};
pub use traits::FmmKernel;
pub use tree::{BufferLayout, GroupedTree, LeafRef};
pub use utils::{map_indexes_to_blocks, BlockInteractions};
pub use zipper::partition_zipper;
