/////////////////////////////////////////////////////////////////////////////////////////////
//
// Runs a task graph on a dedicated rayon thread pool with dependency tracking.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use super::{roots, ExecutionStats, ReadyTask, TaskExecutor};
use crate::error::FmmError;
use crate::kernel_pool::KernelPool;
use crate::task_graph::{TaskBody, TaskGraph, TaskMeta};
use log::{debug, trace};
use parking_lot::Mutex;
use rayon::{Scope, ThreadPool, ThreadPoolBuilder};
use std::collections::BinaryHeap;

/// Work-stealing executor on its own rayon pool.
///
/// Tasks whose predecessors completed wait in a priority queue. A task is dispatched
/// only when none of its commutatively written regions is held by a running task; it then
/// holds all of them until it completes. Tasks blocked that way are parked and requeued at
/// the next completion. Workers are identified by their index in the pool.
pub struct RayonExecutor {
    pool: ThreadPool,
}

impl RayonExecutor {
    /// Builds a pool of `num_threads` workers; `0` lets rayon pick one per core.
    pub fn new(num_threads: usize) -> Result<Self, FmmError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|index| format!("taskfmm-worker-{index}"))
            .build()?;
        Ok(RayonExecutor { pool })
    }
}

struct DispatchState<'a, K> {
    bodies: Vec<Option<TaskBody<'a, K>>>,
    remaining: Vec<usize>,
    ready: BinaryHeap<ReadyTask>,
    deferred: Vec<ReadyTask>,
    region_busy: Vec<bool>,
    /// Drain jobs spawned and not yet returned.
    active_jobs: usize,
    executed: usize,
}

impl<'a, K> DispatchState<'a, K> {
    /// Pops the best ready task whose exclusive regions are all free and takes them.
    fn pop_dispatchable(&mut self, meta: &[TaskMeta]) -> Option<(usize, TaskBody<'a, K>)> {
        while let Some(task) = self.ready.pop() {
            let regions = &meta[task.id].exclusive_regions;
            if regions.iter().any(|&region| self.region_busy[region]) {
                self.deferred.push(task);
                continue;
            }
            let Some(body) = self.bodies[task.id].take() else {
                continue;
            };
            for &region in regions {
                self.region_busy[region] = true;
            }
            return Some((task.id, body));
        }
        None
    }

    fn complete(&mut self, id: usize, meta: &[TaskMeta]) {
        for &region in &meta[id].exclusive_regions {
            self.region_busy[region] = false;
        }
        self.ready.extend(self.deferred.drain(..));

        for &successor in &meta[id].successors {
            self.remaining[successor] -= 1;
            if self.remaining[successor] == 0 {
                self.ready.push(ReadyTask::new(meta, successor));
            }
        }
        self.executed += 1;
    }
}

struct Dispatcher<'a, K> {
    meta: Vec<TaskMeta>,
    state: Mutex<DispatchState<'a, K>>,
    num_workers: usize,
}

/// Runs dispatchable tasks until none is left, spawning helpers when more become ready.
///
/// Whenever the ready queue is non-empty at least one drain job is alive: only a job that
/// completes a task fills the queue, and it keeps draining afterwards.
fn drain<'s, 'a: 's, K: Send + 's>(
    scope: &Scope<'s>,
    dispatcher: &'s Dispatcher<'a, K>,
    kernels: &'s KernelPool<K>,
) {
    loop {
        let next = {
            let mut state = dispatcher.state.lock();
            match state.pop_dispatchable(&dispatcher.meta) {
                Some(next) => next,
                None => {
                    state.active_jobs -= 1;
                    return;
                }
            }
        };
        let (id, body) = next;

        let worker = rayon::current_thread_index().unwrap_or(0);
        trace!(
            "worker {} running {} task {}",
            worker,
            dispatcher.meta[id].operation,
            id
        );
        {
            let mut kernel = kernels.checkout(worker);
            body(&mut *kernel);
        }

        let helpers = {
            let mut state = dispatcher.state.lock();
            state.complete(id, &dispatcher.meta);
            let wanted = state.ready.len().min(dispatcher.num_workers);
            let helpers = wanted.saturating_sub(state.active_jobs);
            state.active_jobs += helpers;
            helpers
        };
        for _ in 0..helpers {
            scope.spawn(move |scope| drain(scope, dispatcher, kernels));
        }
    }
}

impl TaskExecutor for RayonExecutor {
    fn num_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn run<'a, K: Send>(&self, graph: TaskGraph<'a, K>, kernels: &KernelPool<K>) -> ExecutionStats {
        let per_operation = graph.operation_counts();
        let (meta, bodies, nb_regions) = graph.into_parts();
        let nb_tasks = meta.len();
        let num_workers = self.num_workers();

        assert!(
            kernels.len() >= num_workers,
            "{} kernels for {} workers",
            kernels.len(),
            num_workers
        );

        let ready: BinaryHeap<ReadyTask> =
            roots(&meta).map(|id| ReadyTask::new(&meta, id)).collect();
        let dispatcher = Dispatcher {
            state: Mutex::new(DispatchState {
                bodies: bodies.into_iter().map(Some).collect(),
                remaining: meta.iter().map(|task| task.nb_predecessors).collect(),
                ready,
                deferred: Vec::new(),
                region_busy: vec![false; nb_regions],
                active_jobs: 0,
                executed: 0,
            }),
            meta,
            num_workers,
        };

        self.pool.scope(|scope| {
            let initial = {
                let mut state = dispatcher.state.lock();
                let initial = state.ready.len().min(num_workers);
                state.active_jobs = initial;
                initial
            };
            let dispatcher = &dispatcher;
            for _ in 0..initial {
                scope.spawn(move |scope| drain(scope, dispatcher, kernels));
            }
        });

        let state = dispatcher.state.into_inner();
        assert_eq!(
            state.executed, nb_tasks,
            "dependency graph left tasks that never became ready"
        );
        debug!("rayon executor ran {} tasks on {} workers", nb_tasks, num_workers);

        ExecutionStats {
            tasks_executed: nb_tasks,
            per_operation,
        }
    }
}
