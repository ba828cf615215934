//! Explicit growth policy for the dynamic arrays the VM builds on.
//!
//! `Vec` already grows itself, but leaving the policy implicit makes it an
//! implementation detail of `std::vec::Vec` rather than a documented,
//! auditable property of a bytecode chunk. `GrowArray` makes the policy a
//! first-class, testable thing: start empty, jump to 8 on first write, then
//! double.

use std::ops::{Deref, DerefMut};

#[cfg(test)]
mod memory_test;

/// Capacity growth policy: 0 -> 8 -> 16 -> 32 -> ...
#[must_use]
pub const fn grow_capacity(capacity: usize) -> usize {
    if capacity < 8 { 8 } else { capacity * 2 }
}

/// A `Vec<T>` that grows strictly according to `grow_capacity`.
#[derive(Debug, Clone)]
pub struct GrowArray<T> {
    items: Vec<T>,
}

impl<T> GrowArray<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.items.capacity() {
            let target = grow_capacity(self.items.capacity());
            self.items.reserve_exact(target - self.items.len());
        }
        self.items.push(item);
    }
}

impl<T> Default for GrowArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for GrowArray<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> DerefMut for GrowArray<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items
    }
}
