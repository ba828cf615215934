//! Owned arena of every heap object the VM has allocated, plus the
//! string-interning set built on top of [`crate::table::Table`].
//!
//! This replaces the intrusive `next`-pointer linked list of the source
//! this crate is modeled on with a plain owned `Vec<Rc<Obj>>`: dropping
//! the `Heap` drops every `Rc` it holds, which is the bulk-free sweep the
//! spec calls for. No garbage collection is implemented.

use std::rc::Rc;

use crate::object::{fnv1a_hash, Obj, ObjString};
use crate::table::Table;

/// Owns the VM's string-interning set and the arena of every live heap
/// object.
#[derive(Default)]
pub struct Heap {
    strings: Table<()>,
    objects: Vec<Rc<Obj>>,
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            strings: Table::new(),
            objects: Vec::new(),
        }
    }

    /// Number of distinct objects currently owned by the arena.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Interns `text`, always copying it into a fresh allocation first.
    /// Mirrors the source's `copyString`: used when the caller doesn't
    /// already own a disposable buffer (e.g. a string literal's lexeme).
    pub fn copy_string(&mut self, text: &str) -> Rc<Obj> {
        let hash = fnv1a_hash(text.as_bytes());
        if let Some(existing) = self.strings.find_string(text, hash) {
            return existing;
        }
        self.intern_new(Box::from(text))
    }

    /// Interns `bytes`, adopting the caller's buffer. If an equal string
    /// is already interned, `bytes` is simply dropped (Rust's ownership
    /// model is the "take ownership, free on miss" primitive the source
    /// implements by hand). Mirrors `takeString`, used for strings built
    /// at runtime (e.g. concatenation results) that have no other owner.
    pub fn take_string(&mut self, bytes: Box<str>) -> Rc<Obj> {
        let hash = fnv1a_hash(bytes.as_bytes());
        if let Some(existing) = self.strings.find_string(&bytes, hash) {
            return existing;
        }
        self.intern_new(bytes)
    }

    fn intern_new(&mut self, bytes: Box<str>) -> Rc<Obj> {
        let obj = Rc::new(Obj::String(ObjString::new(bytes)));
        self.strings.set(Rc::clone(&obj), ());
        self.objects.push(Rc::clone(&obj));
        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_string_interns_equal_content_to_one_object() {
        let mut heap = Heap::new();
        let a = heap.copy_string("hello");
        let b = heap.copy_string("hello");
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(heap.object_count(), 1);
    }

    #[test]
    fn distinct_content_yields_distinct_objects() {
        let mut heap = Heap::new();
        let a = heap.copy_string("a");
        let b = heap.copy_string("b");
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(heap.object_count(), 2);
    }

    #[test]
    fn take_string_reuses_existing_interned_object() {
        let mut heap = Heap::new();
        let first = heap.copy_string("shared");
        let second = heap.take_string("shared".to_string().into_boxed_str());
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(heap.object_count(), 1);
    }
}
