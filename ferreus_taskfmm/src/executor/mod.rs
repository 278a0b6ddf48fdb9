/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares the executor interface that runs a task graph to completion.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Executors drain a [`TaskGraph`] while honouring its dependencies and keeping
//! commutative writers of a region from running at the same time.
mod rayon_pool;
mod sequential;

pub use rayon_pool::RayonExecutor;
pub use sequential::SequentialExecutor;

use crate::kernel_pool::KernelPool;
use crate::task_graph::{Operation, TaskGraph, TaskMeta};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A concurrency backend able to run a task graph.
pub trait TaskExecutor {
    /// Number of workers, and therefore of kernels the pool must hold.
    fn num_workers(&self) -> usize;

    /// Runs every task of `graph` and returns once all of them completed.
    ///
    /// Worker `w` runs its tasks with the kernel in slot `w` of `kernels`.
    fn run<'a, K: Send>(&self, graph: TaskGraph<'a, K>, kernels: &KernelPool<K>) -> ExecutionStats;
}

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub tasks_executed: usize,
    pub per_operation: BTreeMap<Operation, usize>,
}

/// Entry of a ready queue, ordered by priority and then by submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadyTask {
    pub(crate) priority: i64,
    pub(crate) id: usize,
}

impl ReadyTask {
    pub(crate) fn new(meta: &[TaskMeta], id: usize) -> Self {
        ReadyTask {
            priority: meta[id].priority,
            id,
        }
    }
}

impl Ord for ReadyTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for ReadyTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Tasks without predecessors.
pub(crate) fn roots(meta: &[TaskMeta]) -> impl Iterator<Item = usize> + '_ {
    meta.iter()
        .enumerate()
        .filter(|(_, task)| task.nb_predecessors == 0)
        .map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn ready_tasks_pop_by_priority_then_submission() {
        let mut heap = BinaryHeap::new();
        heap.push(ReadyTask { priority: 1, id: 4 });
        heap.push(ReadyTask { priority: 5, id: 9 });
        heap.push(ReadyTask { priority: 1, id: 2 });
        heap.push(ReadyTask { priority: 5, id: 3 });

        let order: Vec<usize> = std::iter::from_fn(|| heap.pop().map(|t| t.id)).collect();
        assert_eq!(order, vec![3, 9, 2, 4]);
    }
}
