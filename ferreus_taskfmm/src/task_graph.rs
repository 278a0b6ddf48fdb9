/////////////////////////////////////////////////////////////////////////////////////////////
//
// Builds the dependency graph of tasks from their declared read and commutative-write regions.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::region::RegionKey;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Kind of a task, used for statistics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    P2M,
    M2M,
    M2LBetweenGroups,
    M2LInGroup,
    L2L,
    L2P,
    P2PBetweenGroups,
    P2PInGroup,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::P2M => "p2m",
            Operation::M2M => "m2m",
            Operation::M2LBetweenGroups => "m2l-between-groups",
            Operation::M2LInGroup => "m2l-in-group",
            Operation::L2L => "l2l",
            Operation::L2P => "l2p",
            Operation::P2PBetweenGroups => "p2p-between-groups",
            Operation::P2PInGroup => "p2p-in-group",
        };
        f.write_str(name)
    }
}

/// Work of one task, run with the kernel of the worker executing it.
pub type TaskBody<'a, K> = Box<dyn FnOnce(&mut K) + Send + 'a>;

/// A unit of work as emitted by the algorithm.
pub struct TaskDescriptor<'a, K> {
    pub operation: Operation,
    pub priority: i64,
    /// Regions the body only reads.
    pub reads: Vec<RegionKey>,
    /// Regions the body accumulates into. Accumulations into one region may run in any
    /// order but never at the same time.
    pub commutes: Vec<RegionKey>,
    pub body: TaskBody<'a, K>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub usize);

/// Scheduling data of a submitted task.
#[derive(Debug, Clone)]
pub struct TaskMeta {
    pub operation: Operation,
    pub priority: i64,
    /// Dense ids of the commutatively written regions; held exclusively while running.
    pub exclusive_regions: Vec<usize>,
    pub successors: Vec<usize>,
    pub nb_predecessors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessMode {
    Read,
    Commute,
}

/// Access history of one region: the latest batch of readers or of commutative writers.
#[derive(Debug)]
struct RegionHistory {
    id: usize,
    mode: Option<AccessMode>,
    writers: Vec<usize>,
    /// Predecessors shared by every member of the current writer batch.
    writer_predecessors: Vec<usize>,
    readers: Vec<usize>,
}

/// Dependency graph derived at submission time.
///
/// For every region, consecutive reads form one batch that depends on the previous batch
/// of commutative writes, and consecutive commutative writes form one batch that depends on
/// the previous batch of reads. Members of a batch are unordered. Edges always go from an
/// earlier submission to a later one, so the graph is acyclic.
pub struct TaskGraph<'a, K> {
    meta: Vec<TaskMeta>,
    bodies: Vec<TaskBody<'a, K>>,
    regions: HashMap<RegionKey, RegionHistory>,
}

impl<'a, K> TaskGraph<'a, K> {
    pub fn new() -> Self {
        TaskGraph {
            meta: Vec::new(),
            bodies: Vec::new(),
            regions: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    /// Number of distinct regions named so far.
    pub fn nb_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn submit(&mut self, descriptor: TaskDescriptor<'a, K>) -> TaskId {
        let task = self.meta.len();
        let mut predecessors: Vec<usize> = Vec::new();
        let mut exclusive_regions = Vec::with_capacity(descriptor.commutes.len());

        for key in &descriptor.commutes {
            let history = self.history(*key);
            exclusive_regions.push(history.id);
            match history.mode {
                Some(AccessMode::Commute) => {}
                Some(AccessMode::Read) => {
                    history.writer_predecessors = std::mem::take(&mut history.readers);
                    history.writers.clear();
                }
                None => {}
            }
            history.mode = Some(AccessMode::Commute);
            predecessors.extend_from_slice(&history.writer_predecessors);
            history.writers.push(task);
        }

        // A region both read and written is covered by its write.
        for key in descriptor
            .reads
            .iter()
            .filter(|key| !descriptor.commutes.contains(*key))
        {
            let history = self.history(*key);
            if history.mode == Some(AccessMode::Commute) {
                history.readers.clear();
            }
            history.mode = Some(AccessMode::Read);
            predecessors.extend_from_slice(&history.writers);
            history.readers.push(task);
        }

        predecessors.sort_unstable();
        predecessors.dedup();
        exclusive_regions.sort_unstable();
        exclusive_regions.dedup();

        for &predecessor in &predecessors {
            self.meta[predecessor].successors.push(task);
        }

        self.meta.push(TaskMeta {
            operation: descriptor.operation,
            priority: descriptor.priority,
            exclusive_regions,
            successors: Vec::new(),
            nb_predecessors: predecessors.len(),
        });
        self.bodies.push(descriptor.body);

        TaskId(task)
    }

    fn history(&mut self, key: RegionKey) -> &mut RegionHistory {
        let next_id = self.regions.len();
        self.regions.entry(key).or_insert_with(|| RegionHistory {
            id: next_id,
            mode: None,
            writers: Vec::new(),
            writer_predecessors: Vec::new(),
            readers: Vec::new(),
        })
    }

    /// Direct predecessors of `task`, in submission order.
    pub fn predecessors(&self, task: TaskId) -> Vec<TaskId> {
        self.meta[..task.0]
            .iter()
            .enumerate()
            .filter(|(_, meta)| meta.successors.contains(&task.0))
            .map(|(id, _)| TaskId(id))
            .collect()
    }

    pub fn meta(&self, task: TaskId) -> &TaskMeta {
        &self.meta[task.0]
    }

    /// Number of tasks of every operation.
    pub fn operation_counts(&self) -> BTreeMap<Operation, usize> {
        let mut counts = BTreeMap::new();
        for meta in &self.meta {
            *counts.entry(meta.operation).or_insert(0) += 1;
        }
        counts
    }

    /// Splits the graph into scheduling data and bodies, indexed alike.
    pub fn into_parts(self) -> (Vec<TaskMeta>, Vec<TaskBody<'a, K>>, usize) {
        let nb_regions = self.regions.len();
        (self.meta, self.bodies, nb_regions)
    }
}

impl<K> Default for TaskGraph<'_, K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::BufferField;

    fn descriptor<'a>(reads: &[RegionKey], commutes: &[RegionKey]) -> TaskDescriptor<'a, ()> {
        TaskDescriptor {
            operation: Operation::M2M,
            priority: 0,
            reads: reads.to_vec(),
            commutes: commutes.to_vec(),
            body: Box::new(|_: &mut ()| {}),
        }
    }

    fn ids(tasks: &[usize]) -> Vec<TaskId> {
        tasks.iter().map(|&t| TaskId(t)).collect()
    }

    #[test]
    fn reads_wait_for_every_commutative_writer() {
        let a = RegionKey::cells(2, 0, BufferField::Local);
        let mut graph = TaskGraph::new();

        let w0 = graph.submit(descriptor(&[], &[a]));
        let w1 = graph.submit(descriptor(&[], &[a]));
        let r0 = graph.submit(descriptor(&[a], &[]));
        let r1 = graph.submit(descriptor(&[a], &[]));
        let w2 = graph.submit(descriptor(&[], &[a]));
        let r2 = graph.submit(descriptor(&[a], &[]));

        assert!(graph.predecessors(w0).is_empty());
        assert!(graph.predecessors(w1).is_empty());
        assert_eq!(graph.predecessors(r0), ids(&[0, 1]));
        assert_eq!(graph.predecessors(r1), ids(&[0, 1]));
        assert_eq!(graph.predecessors(w2), ids(&[2, 3]));
        assert_eq!(graph.predecessors(r2), ids(&[4]));
        assert_eq!(graph.meta(w0).exclusive_regions, graph.meta(w1).exclusive_regions);
        assert!(graph.meta(r0).exclusive_regions.is_empty());
    }

    #[test]
    fn writers_after_writers_share_predecessors() {
        let a = RegionKey::cells(3, 1, BufferField::Multipole);
        let b = RegionKey::cells(2, 0, BufferField::Multipole);
        let mut graph = TaskGraph::new();

        // Two upward translations into `b` both reading `a` after it was accumulated.
        let p0 = graph.submit(descriptor(&[], &[a]));
        let m0 = graph.submit(descriptor(&[a], &[b]));
        let m1 = graph.submit(descriptor(&[a], &[b]));

        assert_eq!(graph.predecessors(m0), ids(&[p0.0]));
        assert_eq!(graph.predecessors(m1), ids(&[p0.0]));
        assert_eq!(graph.nb_regions(), 2);
    }

    #[test]
    fn independent_regions_do_not_order_tasks() {
        let data = RegionKey::particles(0, BufferField::Data);
        let rhs = RegionKey::particles(0, BufferField::Rhs);
        let multipole = RegionKey::cells(4, 0, BufferField::Multipole);
        let mut graph = TaskGraph::new();

        graph.submit(descriptor(&[data], &[multipole]));
        let near = graph.submit(descriptor(&[data], &[rhs]));

        assert!(graph.predecessors(near).is_empty());
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn region_read_and_written_counts_as_written() {
        let a = RegionKey::particles(1, BufferField::Rhs);
        let mut graph = TaskGraph::new();

        let first = graph.submit(descriptor(&[a], &[a]));
        let second = graph.submit(descriptor(&[a], &[a]));
        let reader = graph.submit(descriptor(&[a], &[]));

        assert!(graph.predecessors(second).is_empty());
        assert_eq!(graph.predecessors(reader), vec![first, second]);
        assert_eq!(graph.meta(first).exclusive_regions.len(), 1);
    }

    #[test]
    fn counts_operations() {
        let a = RegionKey::particles(0, BufferField::Rhs);
        let mut graph: TaskGraph<'_, ()> = TaskGraph::new();
        graph.submit(descriptor(&[], &[a]));
        let mut p2p = descriptor(&[], &[a]);
        p2p.operation = Operation::P2PInGroup;
        graph.submit(p2p);

        let counts = graph.operation_counts();
        assert_eq!(counts[&Operation::M2M], 1);
        assert_eq!(counts[&Operation::P2PInGroup], 1);

        let (meta, bodies, nb_regions) = graph.into_parts();
        assert_eq!(meta.len(), bodies.len());
        assert_eq!(nb_regions, 1);
    }
}
