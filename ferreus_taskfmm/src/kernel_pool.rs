/////////////////////////////////////////////////////////////////////////////////////////////
//
// Holds one kernel instance per worker, replicated from a prototype.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

struct KernelSlot<K> {
    kernel: UnsafeCell<K>,
    checked_out: AtomicBool,
}

// A slot is only dereferenced through a `KernelGuard`, which `checked_out` keeps unique.
unsafe impl<K: Send> Sync for KernelSlot<K> {}

/// One kernel per worker slot, grown by cloning slot `0`.
///
/// Workers reach their own instance through [`KernelPool::checkout`] with the stable
/// ordinal their executor gives them, so no two workers ever share an instance. The pool
/// only grows, and only through `&mut self`, which keeps growth out of any concurrent run.
pub struct KernelPool<K> {
    slots: Vec<KernelSlot<K>>,
}

impl<K: Clone> KernelPool<K> {
    pub fn new(prototype: K) -> Self {
        KernelPool {
            slots: vec![KernelSlot {
                kernel: UnsafeCell::new(prototype),
                checked_out: AtomicBool::new(false),
            }],
        }
    }

    /// Clones slot `0` until the pool holds at least `capacity` kernels.
    pub fn ensure_capacity(&mut self, capacity: usize) {
        while self.slots.len() < capacity {
            let kernel = self.slots[0].kernel.get_mut().clone();
            self.slots.push(KernelSlot {
                kernel: UnsafeCell::new(kernel),
                checked_out: AtomicBool::new(false),
            });
        }
    }
}

impl<K> KernelPool<K> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Exclusive access to the kernel of `worker` for the duration of one task.
    ///
    /// Panics if the worker has no slot or the slot is already in use, which would mean
    /// the executor handed the same ordinal to two running tasks.
    pub fn checkout(&self, worker: usize) -> KernelGuard<'_, K> {
        assert!(
            worker < self.slots.len(),
            "worker {worker} has no kernel, the pool holds {}",
            self.slots.len()
        );
        let slot = &self.slots[worker];
        assert!(
            !slot.checked_out.swap(true, Ordering::Acquire),
            "kernel of worker {worker} is already in use"
        );
        KernelGuard { slot }
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> + '_ {
        self.slots.iter().map(|slot| {
            assert!(
                !slot.checked_out.load(Ordering::Acquire),
                "kernels cannot be inspected while tasks run"
            );
            unsafe { &*slot.kernel.get() }
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut K> + '_ {
        self.slots.iter_mut().map(|slot| slot.kernel.get_mut())
    }
}

/// Exclusive borrow of one worker's kernel.
pub struct KernelGuard<'p, K> {
    slot: &'p KernelSlot<K>,
}

impl<K> Deref for KernelGuard<'_, K> {
    type Target = K;

    fn deref(&self) -> &K {
        unsafe { &*self.slot.kernel.get() }
    }
}

impl<K> DerefMut for KernelGuard<'_, K> {
    fn deref_mut(&mut self) -> &mut K {
        unsafe { &mut *self.slot.kernel.get() }
    }
}

impl<K> Drop for KernelGuard<'_, K> {
    fn drop(&mut self) {
        self.slot.checked_out.store(false, Ordering::Release);
    }
}
