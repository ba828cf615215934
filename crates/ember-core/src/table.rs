//! Open-addressed hash table, generic over the stored value type so it
//! backs both the VM's globals (`Table<Value>`) and the string-interning
//! set (`Table<()>`).
//!
//! Linear probing, power-of-two capacity, 0.75 load factor, tombstones on
//! delete. Keys are `Rc<Obj>` (always interned strings in this crate, but
//! the table itself only requires content hash + equality, not any
//! particular object kind).

use std::rc::Rc;

use crate::object::Obj;

const LOAD_FACTOR_MAX: f64 = 0.75;
const INITIAL_CAPACITY: usize = 8;

enum Slot<V> {
    Empty,
    Tombstone,
    Occupied(Rc<Obj>, V),
}

/// An open-addressed `key -> value` map keyed by interned object handles.
pub struct Table<V> {
    entries: Vec<Slot<V>>,
    /// Occupied slots plus tombstones; compared against capacity for the
    /// load-factor growth trigger (tombstones still occupy a probe slot).
    count: usize,
}

impl<V> Table<V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            count: 0,
        }
    }

    /// Current backing capacity (always 0 or a power of two).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Finds the slot a key with the given hash belongs in (or, once
    /// found to be equal, already occupies). Returns the first tombstone
    /// seen along the probe sequence if the key is absent, so inserts
    /// reuse tombstones instead of growing the probe chain further.
    fn find_slot(entries: &[Slot<V>], hash: u32, is_match: impl Fn(&Obj) -> bool) -> usize {
        let mask = entries.len() - 1;
        let mut index = hash as usize & mask;
        let mut tombstone: Option<usize> = None;
        loop {
            match &entries[index] {
                Slot::Empty => return tombstone.unwrap_or(index),
                Slot::Tombstone => {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Slot::Occupied(key, _) => {
                    if is_match(key) {
                        return index;
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    fn ensure_capacity(&mut self) {
        if self.entries.is_empty() {
            self.adjust_capacity(INITIAL_CAPACITY);
        } else if (self.count + 1) as f64 > self.entries.len() as f64 * LOAD_FACTOR_MAX {
            self.adjust_capacity(self.entries.len() * 2);
        }
    }

    /// Rebuilds the table at `new_capacity`, rehashing every live entry
    /// and dropping tombstones in the process.
    fn adjust_capacity(&mut self, new_capacity: usize) {
        let mut new_entries: Vec<Slot<V>> = (0..new_capacity).map(|_| Slot::Empty).collect();
        let mut new_count = 0;
        for slot in self.entries.drain(..) {
            if let Slot::Occupied(key, value) = slot {
                let hash = key.content_hash();
                let idx = Self::find_slot(&new_entries, hash, |k| k == key.as_ref());
                new_entries[idx] = Slot::Occupied(key, value);
                new_count += 1;
            }
        }
        self.entries = new_entries;
        self.count = new_count;
    }

    /// Inserts or updates `key -> value`. Returns `true` iff this created a
    /// brand-new entry (as opposed to overwriting one).
    pub fn set(&mut self, key: Rc<Obj>, value: V) -> bool {
        self.ensure_capacity();
        let hash = key.content_hash();
        let idx = Self::find_slot(&self.entries, hash, |k| k == key.as_ref());
        let was_empty = matches!(self.entries[idx], Slot::Empty);
        let was_occupied = matches!(self.entries[idx], Slot::Occupied(..));
        if was_empty {
            self.count += 1;
        }
        self.entries[idx] = Slot::Occupied(key, value);
        !was_occupied
    }

    /// Looks up a value by key.
    #[must_use]
    pub fn get(&self, key: &Obj) -> Option<&V> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = Self::find_slot(&self.entries, key.content_hash(), |k| k == key);
        match &self.entries[idx] {
            Slot::Occupied(_, value) => Some(value),
            _ => None,
        }
    }

    /// Removes a key, leaving a tombstone so later probes still skip past
    /// it. Returns `true` iff an entry was actually present.
    pub fn delete(&mut self, key: &Obj) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let idx = Self::find_slot(&self.entries, key.content_hash(), |k| k == key);
        if matches!(self.entries[idx], Slot::Occupied(..)) {
            self.entries[idx] = Slot::Tombstone;
            true
        } else {
            false
        }
    }

    /// Specialized probe used by string interning: compares `(hash,
    /// bytes)` directly, without needing an `Obj` wrapper to exist yet.
    #[must_use]
    pub fn find_string(&self, text: &str, hash: u32) -> Option<Rc<Obj>> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = Self::find_slot(&self.entries, hash, |k| {
            k.as_string()
                .is_some_and(|s| s.hash() == hash && s.as_str() == text)
        });
        match &self.entries[idx] {
            Slot::Occupied(key, _) => Some(Rc::clone(key)),
            _ => None,
        }
    }
}

impl<V> Default for Table<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjString;

    fn interned(text: &str) -> Rc<Obj> {
        Rc::new(Obj::String(ObjString::new(text.into())))
    }

    #[test]
    fn set_then_get_roundtrips() {
        let mut table: Table<i32> = Table::new();
        let key = interned("count");
        assert!(table.set(Rc::clone(&key), 42));
        assert_eq!(table.get(&key), Some(&42));
    }

    #[test]
    fn set_on_existing_key_overwrites_and_reports_not_new() {
        let mut table: Table<i32> = Table::new();
        let key = interned("x");
        assert!(table.set(Rc::clone(&key), 1));
        assert!(!table.set(Rc::clone(&key), 2));
        assert_eq!(table.get(&key), Some(&2));
    }

    #[test]
    fn delete_then_get_is_none_but_probe_continues() {
        let mut table: Table<i32> = Table::new();
        let a = interned("a");
        let b = interned("b");
        table.set(Rc::clone(&a), 1);
        table.set(Rc::clone(&b), 2);
        assert!(table.delete(&a));
        assert_eq!(table.get(&a), None);
        assert_eq!(table.get(&b), Some(&2));
    }

    #[test]
    fn delete_missing_key_returns_false() {
        let mut table: Table<i32> = Table::new();
        assert!(!table.delete(&interned("missing")));
    }

    #[test]
    fn find_string_locates_interned_content() {
        let mut table: Table<()> = Table::new();
        let key = interned("needle");
        table.set(Rc::clone(&key), ());
        let hash = key.content_hash();
        let found = table.find_string("needle", hash).expect("present");
        assert!(Rc::ptr_eq(&found, &key));
        assert!(table.find_string("haystack", hash).is_none());
    }

    #[test]
    fn grows_past_load_factor_and_preserves_entries() {
        let mut table: Table<i32> = Table::new();
        let keys: Vec<_> = (0..64).map(|i| interned(&format!("k{i}"))).collect();
        for (i, key) in keys.iter().enumerate() {
            table.set(Rc::clone(key), i as i32);
        }
        assert!(table.capacity() >= 64);
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(table.get(key), Some(&(i as i32)));
        }
    }
}
