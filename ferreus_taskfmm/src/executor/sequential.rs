/////////////////////////////////////////////////////////////////////////////////////////////
//
// Runs a task graph on the calling thread, optionally in a shuffled order.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use super::{roots, ExecutionStats, ReadyTask, TaskExecutor};
use crate::kernel_pool::KernelPool;
use crate::task_graph::TaskGraph;
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BinaryHeap;

/// Single-worker executor.
///
/// Ready tasks run by priority. With [`SequentialExecutor::with_shuffle`] the next task is
/// instead drawn at random among the ready ones, which explores other valid interleavings
/// of unordered tasks, commutative writers in particular.
#[derive(Debug, Clone, Default)]
pub struct SequentialExecutor {
    shuffle_seed: Option<u64>,
}

impl SequentialExecutor {
    pub fn new() -> Self {
        SequentialExecutor { shuffle_seed: None }
    }

    pub fn with_shuffle(seed: u64) -> Self {
        SequentialExecutor {
            shuffle_seed: Some(seed),
        }
    }
}

enum ReadySet {
    Prioritized(BinaryHeap<ReadyTask>),
    Shuffled { tasks: Vec<usize>, rng: StdRng },
}

impl ReadySet {
    fn push(&mut self, task: ReadyTask) {
        match self {
            ReadySet::Prioritized(heap) => heap.push(task),
            ReadySet::Shuffled { tasks, .. } => tasks.push(task.id),
        }
    }

    fn pop(&mut self) -> Option<usize> {
        match self {
            ReadySet::Prioritized(heap) => heap.pop().map(|task| task.id),
            ReadySet::Shuffled { tasks, rng } => match tasks.is_empty() {
                true => None,
                false => {
                    let pick = rng.random_range(0..tasks.len());
                    Some(tasks.swap_remove(pick))
                }
            },
        }
    }
}

impl TaskExecutor for SequentialExecutor {
    fn num_workers(&self) -> usize {
        1
    }

    fn run<'a, K: Send>(&self, graph: TaskGraph<'a, K>, kernels: &KernelPool<K>) -> ExecutionStats {
        let per_operation = graph.operation_counts();
        let (meta, bodies, _) = graph.into_parts();
        let mut bodies: Vec<_> = bodies.into_iter().map(Some).collect();
        let mut remaining: Vec<usize> = meta.iter().map(|task| task.nb_predecessors).collect();

        let mut ready = match self.shuffle_seed {
            Some(seed) => ReadySet::Shuffled {
                tasks: Vec::new(),
                rng: StdRng::seed_from_u64(seed),
            },
            None => ReadySet::Prioritized(BinaryHeap::new()),
        };
        roots(&meta).for_each(|id| ready.push(ReadyTask::new(&meta, id)));

        let mut kernel = kernels.checkout(0);
        let mut executed = 0;

        while let Some(id) = ready.pop() {
            let Some(body) = bodies[id].take() else {
                continue;
            };
            trace!("running {} task {}", meta[id].operation, id);
            body(&mut *kernel);
            executed += 1;

            for &successor in &meta[id].successors {
                remaining[successor] -= 1;
                if remaining[successor] == 0 {
                    ready.push(ReadyTask::new(&meta, successor));
                }
            }
        }

        assert_eq!(
            executed,
            meta.len(),
            "dependency graph left tasks that never became ready"
        );
        debug!("sequential executor ran {executed} tasks");

        ExecutionStats {
            tasks_executed: executed,
            per_operation,
        }
    }
}
