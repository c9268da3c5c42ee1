/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! A hash table mapping keys to values.
//!
//! Open addressing with linear probing over an array of entries. An entry
//! whose key is `undefined` is not in use: a `false` value there means the
//! slot has never held anything, a `true` value marks a tombstone left by a
//! deletion. Probes continue past tombstones because the key being looked up
//! may have been displaced past them by an earlier collision; a resize
//! discards all tombstones by rehashing the live entries.

use crate::gc::ptr::Gc;
use crate::vm::object::{ObjHeader, ObjKind};
use crate::vm::range::ObjRange;
use crate::vm::value::{values_equal, Value};
use crate::vm::Runtime;

/// The load percentage that triggers growing the entry array.
const MAP_LOAD_PERCENT: usize = 75;

const GROW_FACTOR: usize = 2;

const MIN_CAPACITY: usize = 16;

#[derive(Copy, Clone)]
pub struct MapEntry {
    /// The entry's key, or `undefined` if the entry is not in use.
    pub key: Value,

    /// The value associated with the key. If the key is `undefined`, `true`
    /// here marks a tombstone and `false` an open slot.
    pub value: Value,
}

#[repr(C)]
pub struct ObjMap {
    pub obj: ObjHeader,
    pub capacity: usize,
    pub count: usize,
    pub entries: *mut MapEntry,
}

impl ObjMap {
    pub fn new(vm: &mut Runtime) -> Gc<ObjMap> {
        unsafe {
            let ptr = vm.allocate::<ObjMap>();
            (*ptr).capacity = 0;
            (*ptr).count = 0;
            (*ptr).entries = std::ptr::null_mut();
            let class = vm.map_class;
            vm.link_obj(ptr.cast::<ObjHeader>(), ObjKind::Map, class);
            Gc::from_raw(ptr)
        }
    }

    /// Looks up `key`, returning its value or `undefined` if absent.
    pub fn get(&self, key: Value) -> Value {
        match find_entry(self.entries, self.capacity, key) {
            Some(index) => unsafe {
                let entry = &*self.entries.add(index);
                if entry.key.is_undefined() {
                    Value::undefined()
                } else {
                    entry.value
                }
            },
            None => Value::undefined(),
        }
    }

    pub fn contains(&self, key: Value) -> bool {
        !self.get(key).is_undefined()
    }

    pub fn set(mut this: Gc<ObjMap>, vm: &mut Runtime, key: Value, value: Value) {
        // Grow before it hits the load factor so the insert always finds an
        // open slot.
        if this.count + 1 > this.capacity * MAP_LOAD_PERCENT / 100 {
            if key.is_obj() {
                vm.push_root(key.as_obj());
            }
            if value.is_obj() {
                vm.push_root(value.as_obj());
            }
            let capacity = (this.capacity * GROW_FACTOR).max(MIN_CAPACITY);
            Self::resize(this, vm, capacity);
            if value.is_obj() {
                vm.pop_root();
            }
            if key.is_obj() {
                vm.pop_root();
            }
        }

        if insert_entry(this.entries, this.capacity, key, value) {
            this.count += 1;
        }
    }

    /// Removes `key` if present, returning its value or `null`.
    pub fn remove(mut this: Gc<ObjMap>, vm: &mut Runtime, key: Value) -> Value {
        let index = match find_entry(this.entries, this.capacity, key) {
            Some(index) if unsafe { !(*this.entries.add(index)).key.is_undefined() } => index,
            _ => return Value::null(),
        };

        let value = unsafe {
            let entry = &mut *this.entries.add(index);
            let value = entry.value;
            // Leave a tombstone so later probes keep walking.
            entry.key = Value::undefined();
            entry.value = Value::true_();
            value
        };

        if value.is_obj() {
            vm.push_root(value.as_obj());
        }

        this.count -= 1;
        if this.count == 0 {
            Self::clear(this, vm);
        } else if this.capacity > MIN_CAPACITY
            && this.count < this.capacity / GROW_FACTOR * MAP_LOAD_PERCENT / 100
        {
            let capacity = (this.capacity / GROW_FACTOR).max(MIN_CAPACITY);
            Self::resize(this, vm, capacity);
        }

        if value.is_obj() {
            vm.pop_root();
        }
        value
    }

    pub fn clear(mut this: Gc<ObjMap>, vm: &mut Runtime) {
        unsafe {
            vm.reallocate(this.entries.cast::<u8>(), 0);
        }
        this.entries = std::ptr::null_mut();
        this.capacity = 0;
        this.count = 0;
    }

    fn resize(mut this: Gc<ObjMap>, vm: &mut Runtime, capacity: usize) {
        // Fresh array with every slot open.
        let entries = unsafe {
            let entries = vm
                .allocate_array::<MapEntry>(capacity);
            for i in 0..capacity {
                entries.add(i).write(MapEntry {
                    key: Value::undefined(),
                    value: Value::false_(),
                });
            }
            entries
        };

        // Rehash the live entries; tombstones are dropped on the floor.
        if this.capacity > 0 {
            for i in 0..this.capacity {
                let entry = unsafe { &*this.entries.add(i) };
                if entry.key.is_undefined() {
                    continue;
                }
                insert_entry(entries, capacity, entry.key, entry.value);
            }
        }
        unsafe {
            vm.reallocate(this.entries.cast::<u8>(), 0);
        }
        this.entries = entries;
        this.capacity = capacity;
    }
}

/// Probes for `key`. Returns the index of its entry, or of the slot an
/// insert should use (the first tombstone passed, else the open slot that
/// ended the probe). `None` only when the map has no storage at all.
fn find_entry(entries: *mut MapEntry, capacity: usize, key: Value) -> Option<usize> {
    if capacity == 0 {
        return None;
    }

    let start_index = hash_value(key) as usize % capacity;
    let mut index = start_index;
    let mut tombstone = None;

    loop {
        let entry = unsafe { &*entries.add(index) };

        if entry.key.is_undefined() {
            if entry.value.is_false() {
                // A truly open slot ends the probe; prefer a tombstone seen
                // on the way for inserts.
                return Some(tombstone.unwrap_or(index));
            } else if tombstone.is_none() {
                tombstone = Some(index);
            }
        } else if values_equal(entry.key, key) {
            return Some(index);
        }

        index = (index + 1) % capacity;
        if index == start_index {
            break;
        }
    }

    // Completely full of tombstones; the load factor keeps at least one of
    // them around.
    debug_assert!(tombstone.is_some(), "map should have tombstones or empty entries");
    tombstone
}

/// Writes `key`/`value` into the probe slot. Returns true when a brand new
/// entry was created.
fn insert_entry(entries: *mut MapEntry, capacity: usize, key: Value, value: Value) -> bool {
    let index = find_entry(entries, capacity, key).expect("map must have storage before insert");
    let entry = unsafe { &mut *entries.add(index) };
    if entry.key.is_undefined() {
        entry.key = key;
        entry.value = value;
        true
    } else {
        // Already present, so just replace the value.
        entry.value = value;
        false
    }
}

/// Mixes a 64-bit pattern down to the hash space. From Thomas Wang's
/// integer hash, via V8's ComputeLongHash.
fn hash_bits(mut hash: u64) -> u32 {
    hash = !hash.wrapping_add(hash << 18);
    hash ^= hash >> 31;
    hash = hash.wrapping_mul(21);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 6);
    hash ^= hash >> 22;
    (hash & 0x3fffffff) as u32
}

/// Hashes a map key. Only value types can be keys, so every kind here has a
/// stable content-based hash.
pub fn hash_value(value: Value) -> u32 {
    if value.is_num() {
        return hash_bits(value.to_double().to_bits());
    }
    if value.is_obj() {
        let obj = value.as_obj();
        return match obj.kind {
            ObjKind::String => value.as_string().hash,
            ObjKind::Range => {
                let range: Gc<ObjRange> = obj.cast();
                hash_bits(range.from.to_bits() ^ range.to.to_bits())
            }
            ObjKind::Class => value.as_class().name.hash,
            _ => 0,
        };
    }
    // Singletons hash their tag patterns.
    hash_bits(value.to_bits())
}
