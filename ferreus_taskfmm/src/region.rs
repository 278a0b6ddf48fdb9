/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares typed region handles and the borrow-checked cells holding group buffers.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicIsize, Ordering};

/// Identifies the group owning a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKey {
    /// Group `group` of the cell groups at `level`.
    Cells { level: usize, group: usize },
    /// Group `group` of the leaf-level particle groups.
    Particles { group: usize },
}

/// Selects one of the buffers of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferField {
    /// Particle positions and physical values.
    Data,
    Multipole,
    Local,
    /// Per-particle results.
    Rhs,
}

/// A memory region as seen by the dependency engine: a group plus a field selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionKey {
    pub group: GroupKey,
    pub field: BufferField,
}

impl RegionKey {
    pub fn cells(level: usize, group: usize, field: BufferField) -> Self {
        RegionKey {
            group: GroupKey::Cells { level, group },
            field,
        }
    }

    pub fn particles(group: usize, field: BufferField) -> Self {
        RegionKey {
            group: GroupKey::Particles { group },
            field,
        }
    }
}

const WRITING: isize = -1;

/// Interior-mutable storage for one group buffer.
///
/// Tasks only touch a buffer through [`RegionCell::read`] and [`RegionCell::write`].
/// Any number of readers may coexist, a writer is exclusive. The scheduler is
/// responsible for never running conflicting tasks at the same time, so a conflict
/// here is a scheduling bug and panics instead of blocking.
pub struct RegionCell<T> {
    state: AtomicIsize,
    value: UnsafeCell<T>,
}

// Access to `value` is mediated by `state`.
unsafe impl<T: Send + Sync> Sync for RegionCell<T> {}

impl<T> RegionCell<T> {
    pub fn new(value: T) -> Self {
        RegionCell {
            state: AtomicIsize::new(0),
            value: UnsafeCell::new(value),
        }
    }

    /// Shared access. Panics if the region is being written.
    pub fn read(&self) -> RegionRef<'_, T> {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            assert!(
                current != WRITING,
                "region read while a commutative writer holds it"
            );
            match self.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return RegionRef { cell: self },
                Err(observed) => current = observed,
            }
        }
    }

    /// Exclusive access. Panics if the region is already read or written.
    pub fn write(&self) -> RegionMut<'_, T> {
        if let Err(observed) =
            self.state
                .compare_exchange(0, WRITING, Ordering::Acquire, Ordering::Relaxed)
        {
            panic!(
                "region written concurrently with {}",
                match observed {
                    WRITING => "another writer".to_string(),
                    readers => format!("{readers} reader(s)"),
                }
            );
        }
        RegionMut { cell: self }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for RegionCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionCell")
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Shared borrow of a [`RegionCell`].
pub struct RegionRef<'c, T> {
    cell: &'c RegionCell<T>,
}

impl<T> Deref for RegionRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.cell.value.get() }
    }
}

impl<T> Drop for RegionRef<'_, T> {
    fn drop(&mut self) {
        self.cell.state.fetch_sub(1, Ordering::Release);
    }
}

/// Exclusive borrow of a [`RegionCell`].
pub struct RegionMut<'c, T> {
    cell: &'c RegionCell<T>,
}

impl<T> Deref for RegionMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.cell.value.get() }
    }
}

impl<T> DerefMut for RegionMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.cell.value.get() }
    }
}

impl<T> Drop for RegionMut<'_, T> {
    fn drop(&mut self) {
        self.cell.state.store(0, Ordering::Release);
    }
}
