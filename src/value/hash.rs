use crate::hashing::{eql_values, hash_value, HashCode};
use crate::*;
use arrayvec::ArrayVec;

const PACKED_CAPACITY: usize = RuntimeOptions::PACKED_CAPACITY;

/// Prime-plus-offset bucket counts, as used by MRI.
const CAPACITIES: [usize; 28] = [
    8 + 3,
    16 + 3,
    32 + 5,
    64 + 3,
    128 + 3,
    256 + 27,
    512 + 9,
    1024 + 9,
    2048 + 5,
    4096 + 3,
    8192 + 27,
    16384 + 43,
    32768 + 3,
    65536 + 45,
    131072 + 29,
    262144 + 3,
    524288 + 21,
    1048576 + 7,
    2097152 + 17,
    4194304 + 15,
    8388608 + 9,
    16777216 + 43,
    33554432 + 35,
    67108864 + 15,
    134217728 + 29,
    268435456 + 3,
    536870912 + 11,
    1073741824 + 85,
];

fn capacity_greater_than(size: usize) -> usize {
    for capacity in CAPACITIES {
        if capacity > size {
            return capacity;
        }
    }
    CAPACITIES[CAPACITIES.len() - 1]
}

#[inline(always)]
fn bucket_index(hashed: HashCode, bucket_count: usize) -> usize {
    (hashed as u32 as usize & 0x7fff_ffff) % bucket_count
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryIx(u32);

impl EntryIx {
    #[inline(always)]
    fn as_usize(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy)]
struct PackedEntry {
    hashed: HashCode,
    key: Value,
    value: Value,
}

#[derive(Debug, Clone)]
struct Entry {
    hashed: HashCode,
    key: Value,
    value: Value,
    live: bool,
    next_in_lookup: Option<EntryIx>,
    prev_in_sequence: Option<EntryIx>,
    next_in_sequence: Option<EntryIx>,
}

#[derive(Debug, Clone)]
struct BucketsStore {
    buckets: Vec<Option<EntryIx>>,
    entries: Vec<Entry>,
    free: Vec<EntryIx>,
}

#[derive(Debug, Clone)]
enum HashStore {
    Null,
    Packed(ArrayVec<PackedEntry, PACKED_CAPACITY>),
    Buckets(BucketsStore),
}

///
/// An insertion-ordered map over Ruby values.
///
/// Storage adapts between three physical representations: the null
/// sentinel while empty, a flat packed array of (hash, key, value)
/// triples for small maps, and open-addressed buckets threaded by a
/// doubly-linked insertion sequence beyond that.
///
#[derive(Debug, Clone)]
pub struct RubyHash {
    store: HashStore,
    size: usize,
    compare_by_identity: bool,
    pub default_value: Option<Value>,
    pub default_proc: Option<Value>,
    first_in_sequence: Option<EntryIx>,
    last_in_sequence: Option<EntryIx>,
}

impl Default for RubyHash {
    fn default() -> Self {
        RubyHash::new()
    }
}

/// Which physical representation a hash currently uses. Exposed for
/// representation-transition assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashVariant {
    Null,
    Packed,
    Buckets,
}

impl RubyHash {
    pub fn new() -> Self {
        RubyHash {
            store: HashStore::Null,
            size: 0,
            compare_by_identity: false,
            default_value: None,
            default_proc: None,
            first_in_sequence: None,
            last_in_sequence: None,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn variant(&self) -> HashVariant {
        match &self.store {
            HashStore::Null => HashVariant::Null,
            HashStore::Packed(_) => HashVariant::Packed,
            HashStore::Buckets(_) => HashVariant::Buckets,
        }
    }

    #[inline(always)]
    pub fn compare_by_identity_p(&self) -> bool {
        self.compare_by_identity
    }

    /// Switch to identity comparison. Existing entries are re-keyed.
    pub fn set_compare_by_identity(&mut self, vm: &mut VM) -> Result<(), RubyError> {
        if self.compare_by_identity {
            return Ok(());
        }
        self.compare_by_identity = true;
        self.rehash(vm)
    }

    /// A mutable-string key is replaced by a frozen, pool-interned
    /// duplicate so later mutation can not corrupt lookup.
    fn freeze_key_if_needed(&self, key: Value) -> Value {
        if self.compare_by_identity {
            return key;
        }
        match key.as_rstring() {
            Some(rs) if !rs.is_frozen() => Value::string_from_rstring(rs.frozen_dup()),
            _ => key,
        }
    }

    fn packed_max(vm: &VM) -> usize {
        vm.globals.options.hash_packed_max
    }

    fn bucket_count_for(vm: &VM, size: usize) -> usize {
        capacity_greater_than(size * vm.globals.options.hash_bucket_overallocate)
    }
}

// Lookup.
impl RubyHash {
    pub fn get(&mut self, vm: &mut VM, key: Value) -> Result<Option<Value>, RubyError> {
        let by_id = self.compare_by_identity;
        let hashed = hash_value(vm, key, by_id)?;
        match &self.store {
            HashStore::Null => Ok(None),
            HashStore::Packed(entries) => {
                let entries = entries.clone();
                for e in &entries {
                    if e.hashed == hashed && eql_values(vm, key, e.key, by_id)? {
                        return Ok(Some(e.value));
                    }
                }
                Ok(None)
            }
            HashStore::Buckets(store) => {
                let mut cur = store.buckets[bucket_index(hashed, store.buckets.len())];
                while let Some(ix) = cur {
                    let e = match &self.store {
                        HashStore::Buckets(s) => s.entries[ix.as_usize()].clone(),
                        _ => unreachable!(),
                    };
                    if e.hashed == hashed && eql_values(vm, key, e.key, by_id)? {
                        return Ok(Some(e.value));
                    }
                    cur = e.next_in_lookup;
                }
                Ok(None)
            }
        }
    }

    /// Return the bound value, else invoke `default` with the key.
    pub fn lookup_or_default(
        &mut self,
        vm: &mut VM,
        key: Value,
        default: impl FnOnce(&mut VM, Value) -> VMResult,
    ) -> VMResult {
        match self.get(vm, key)? {
            Some(v) => Ok(v),
            None => default(vm, key),
        }
    }

    pub fn contains_key(&mut self, vm: &mut VM, key: Value) -> Result<bool, RubyError> {
        Ok(self.get(vm, key)?.is_some())
    }
}

// Mutation.
impl RubyHash {
    /// Bind `key` to `value`. Returns true when a new entry was created,
    /// false when an existing binding was overwritten.
    pub fn set(&mut self, vm: &mut VM, key: Value, value: Value) -> Result<bool, RubyError> {
        let by_id = self.compare_by_identity;
        let key = self.freeze_key_if_needed(key);
        let hashed = hash_value(vm, key, by_id)?;
        let created = match self.variant() {
            HashVariant::Null => {
                let mut entries = ArrayVec::new();
                entries.push(PackedEntry { hashed, key, value });
                self.store = HashStore::Packed(entries);
                self.size = 1;
                true
            }
            HashVariant::Packed => self.packed_set(vm, hashed, key, value)?,
            HashVariant::Buckets => self.buckets_set(vm, hashed, key, value)?,
        };
        self.verify();
        Ok(created)
    }

    fn packed_set(
        &mut self,
        vm: &mut VM,
        hashed: HashCode,
        key: Value,
        value: Value,
    ) -> Result<bool, RubyError> {
        let by_id = self.compare_by_identity;
        let snapshot = match &self.store {
            HashStore::Packed(entries) => entries.clone(),
            _ => unreachable!(),
        };
        for (n, e) in snapshot.iter().enumerate() {
            if e.hashed == hashed && eql_values(vm, key, e.key, by_id)? {
                if let HashStore::Packed(entries) = &mut self.store {
                    entries[n].value = value;
                }
                return Ok(false);
            }
        }
        if self.size < Self::packed_max(vm) {
            if let HashStore::Packed(entries) = &mut self.store {
                entries.push(PackedEntry { hashed, key, value });
            }
            self.size += 1;
        } else {
            self.promote_to_buckets(vm);
            self.buckets_append_new(hashed, key, value);
            self.size += 1;
        }
        Ok(true)
    }

    /// packed -> buckets, preserving insertion order.
    fn promote_to_buckets(&mut self, vm: &VM) {
        let entries = match std::mem::replace(&mut self.store, HashStore::Null) {
            HashStore::Packed(entries) => entries,
            _ => unreachable!(),
        };
        let bucket_count = Self::bucket_count_for(vm, entries.len() + 1);
        self.store = HashStore::Buckets(BucketsStore {
            buckets: vec![None; bucket_count],
            entries: vec![],
            free: vec![],
        });
        self.first_in_sequence = None;
        self.last_in_sequence = None;
        for e in entries {
            self.buckets_append_new(e.hashed, e.key, e.value);
        }
    }

    /// Append a fresh entry: head of its bucket chain, tail of the
    /// insertion sequence.
    fn buckets_append_new(&mut self, hashed: HashCode, key: Value, value: Value) {
        let last = self.last_in_sequence;
        let store = match &mut self.store {
            HashStore::Buckets(s) => s,
            _ => unreachable!(),
        };
        let index = bucket_index(hashed, store.buckets.len());
        let entry = Entry {
            hashed,
            key,
            value,
            live: true,
            next_in_lookup: store.buckets[index],
            prev_in_sequence: last,
            next_in_sequence: None,
        };
        let ix = match store.free.pop() {
            Some(ix) => {
                store.entries[ix.as_usize()] = entry;
                ix
            }
            None => {
                store.entries.push(entry);
                EntryIx((store.entries.len() - 1) as u32)
            }
        };
        store.buckets[index] = Some(ix);
        match last {
            Some(last_ix) => store.entries[last_ix.as_usize()].next_in_sequence = Some(ix),
            None => self.first_in_sequence = Some(ix),
        }
        self.last_in_sequence = Some(ix);
    }

    fn buckets_set(
        &mut self,
        vm: &mut VM,
        hashed: HashCode,
        key: Value,
        value: Value,
    ) -> Result<bool, RubyError> {
        match self.buckets_lookup(vm, hashed, key)? {
            Some(ix) => {
                if let HashStore::Buckets(store) = &mut self.store {
                    store.entries[ix.as_usize()].value = value;
                }
                Ok(false)
            }
            None => {
                self.buckets_append_new(hashed, key, value);
                self.size += 1;
                let load_exceeded = match &self.store {
                    HashStore::Buckets(store) => {
                        self.size as f64 / store.buckets.len() as f64
                            > vm.globals.options.hash_load_factor
                    }
                    _ => unreachable!(),
                };
                if load_exceeded {
                    self.resize(vm);
                }
                Ok(true)
            }
        }
    }

    fn buckets_lookup(
        &mut self,
        vm: &mut VM,
        hashed: HashCode,
        key: Value,
    ) -> Result<Option<EntryIx>, RubyError> {
        let by_id = self.compare_by_identity;
        let mut cur = match &self.store {
            HashStore::Buckets(store) => store.buckets[bucket_index(hashed, store.buckets.len())],
            _ => unreachable!(),
        };
        while let Some(ix) = cur {
            let (e_hashed, e_key, e_next) = match &self.store {
                HashStore::Buckets(store) => {
                    let e = &store.entries[ix.as_usize()];
                    (e.hashed, e.key, e.next_in_lookup)
                }
                _ => unreachable!(),
            };
            if e_hashed == hashed && eql_values(vm, key, e_key, by_id)? {
                return Ok(Some(ix));
            }
            cur = e_next;
        }
        Ok(None)
    }

    /// Grow the bucket array and relink every live entry. The entry arena
    /// is kept, so indexes held by cursors stay valid.
    fn resize(&mut self, vm: &VM) {
        let bucket_count = Self::bucket_count_for(vm, self.size);
        let store = match &mut self.store {
            HashStore::Buckets(s) => s,
            _ => unreachable!(),
        };
        store.buckets = vec![None; bucket_count];
        let mut cur = self.first_in_sequence;
        while let Some(ix) = cur {
            let hashed = store.entries[ix.as_usize()].hashed;
            let index = bucket_index(hashed, bucket_count);
            store.entries[ix.as_usize()].next_in_lookup = store.buckets[index];
            store.buckets[index] = Some(ix);
            cur = store.entries[ix.as_usize()].next_in_sequence;
        }
    }

    /// Remove `key`. Returns the removed value, or None when not bound.
    pub fn delete(&mut self, vm: &mut VM, key: Value) -> Result<Option<Value>, RubyError> {
        let by_id = self.compare_by_identity;
        let hashed = hash_value(vm, key, by_id)?;
        let removed = match self.variant() {
            HashVariant::Null => None,
            HashVariant::Packed => {
                let snapshot = match &self.store {
                    HashStore::Packed(entries) => entries.clone(),
                    _ => unreachable!(),
                };
                let mut found = None;
                for (n, e) in snapshot.iter().enumerate() {
                    if e.hashed == hashed && eql_values(vm, key, e.key, by_id)? {
                        found = Some((n, e.value));
                        break;
                    }
                }
                match found {
                    Some((n, value)) => {
                        if let HashStore::Packed(entries) = &mut self.store {
                            entries.remove(n);
                        }
                        self.size -= 1;
                        if self.size == 0 {
                            self.store = HashStore::Null;
                        }
                        Some(value)
                    }
                    None => None,
                }
            }
            HashVariant::Buckets => match self.buckets_lookup(vm, hashed, key)? {
                Some(ix) => Some(self.buckets_remove(ix)),
                None => None,
            },
        };
        self.verify();
        Ok(removed)
    }

    fn buckets_remove(&mut self, ix: EntryIx) -> Value {
        self.unlink_from_sequence(ix);
        let store = match &mut self.store {
            HashStore::Buckets(s) => s,
            _ => unreachable!(),
        };
        let hashed = store.entries[ix.as_usize()].hashed;
        let index = bucket_index(hashed, store.buckets.len());
        // Splice out of the bucket chain.
        let mut cur = store.buckets[index];
        let mut prev: Option<EntryIx> = None;
        while let Some(c) = cur {
            if c == ix {
                let next = store.entries[c.as_usize()].next_in_lookup;
                match prev {
                    Some(p) => store.entries[p.as_usize()].next_in_lookup = next,
                    None => store.buckets[index] = next,
                }
                break;
            }
            prev = cur;
            cur = store.entries[c.as_usize()].next_in_lookup;
        }
        let e = &mut store.entries[ix.as_usize()];
        let value = e.value;
        e.live = false;
        e.next_in_lookup = None;
        e.next_in_sequence = None;
        e.prev_in_sequence = None;
        store.free.push(ix);
        self.size -= 1;
        self.demote_if_empty();
        value
    }

    /// size == 0 implies the null representation, whatever the history.
    fn demote_if_empty(&mut self) {
        if self.size == 0 {
            self.store = HashStore::Null;
            self.first_in_sequence = None;
            self.last_in_sequence = None;
        }
    }

    fn unlink_from_sequence(&mut self, ix: EntryIx) {
        let store = match &mut self.store {
            HashStore::Buckets(s) => s,
            _ => unreachable!(),
        };
        let prev = store.entries[ix.as_usize()].prev_in_sequence;
        let next = store.entries[ix.as_usize()].next_in_sequence;
        match prev {
            Some(p) => store.entries[p.as_usize()].next_in_sequence = next,
            None => {
                debug_assert_eq!(Some(ix), self.first_in_sequence);
                self.first_in_sequence = next;
            }
        }
        match next {
            Some(n) => store.entries[n.as_usize()].prev_in_sequence = prev,
            None => {
                debug_assert_eq!(Some(ix), self.last_in_sequence);
                self.last_in_sequence = prev;
            }
        }
    }

    /// Remove the tail entry. `key` must be the tail's key; the caller is
    /// expected to have just read it.
    pub fn delete_last(&mut self, key: Value) -> Value {
        let removed = match self.variant() {
            HashVariant::Null => {
                unreachable!("delete_last: the hash is empty.")
            }
            HashVariant::Packed => {
                let last = match &self.store {
                    HashStore::Packed(entries) => {
                        *entries.last().expect("delete_last: the hash is empty.")
                    }
                    _ => unreachable!(),
                };
                if last.key.id() != key.id() {
                    unreachable!(
                        "delete_last: the last key was not {:?} as expected but was {:?}",
                        key, last.key
                    );
                }
                if let HashStore::Packed(entries) = &mut self.store {
                    entries.pop();
                }
                self.size -= 1;
                if self.size == 0 {
                    self.store = HashStore::Null;
                }
                last.value
            }
            HashVariant::Buckets => {
                let last_ix = self
                    .last_in_sequence
                    .expect("delete_last: the hash is empty.");
                let last_key = match &self.store {
                    HashStore::Buckets(store) => store.entries[last_ix.as_usize()].key,
                    _ => unreachable!(),
                };
                if last_key.id() != key.id() {
                    unreachable!(
                        "delete_last: the last key was not {:?} as expected but was {:?}",
                        key, last_key
                    );
                }
                self.buckets_remove(last_ix)
            }
        };
        self.verify();
        removed
    }

    /// Remove and return the head entry as a [key, value] pair.
    pub fn shift(&mut self) -> Option<(Value, Value)> {
        let res = match self.variant() {
            HashVariant::Null => None,
            HashVariant::Packed => {
                let first = match &self.store {
                    HashStore::Packed(entries) => entries[0],
                    _ => unreachable!(),
                };
                if let HashStore::Packed(entries) = &mut self.store {
                    entries.remove(0);
                }
                self.size -= 1;
                if self.size == 0 {
                    self.store = HashStore::Null;
                }
                Some((first.key, first.value))
            }
            HashVariant::Buckets => {
                let first_ix = self.first_in_sequence?;
                let key = match &self.store {
                    HashStore::Buckets(store) => store.entries[first_ix.as_usize()].key,
                    _ => unreachable!(),
                };
                let value = self.buckets_remove(first_ix);
                Some((key, value))
            }
        };
        self.verify();
        res
    }

    pub fn clear(&mut self) {
        self.store = HashStore::Null;
        self.size = 0;
        self.first_in_sequence = None;
        self.last_in_sequence = None;
    }

    /// Deep-copy storage into `dest`, preserving insertion order and
    /// mode flags.
    pub fn replace_into(&self, dest: &mut RubyHash) {
        dest.store = HashStore::Null;
        dest.size = 0;
        dest.first_in_sequence = None;
        dest.last_in_sequence = None;
        dest.compare_by_identity = self.compare_by_identity;
        dest.default_value = self.default_value;
        dest.default_proc = self.default_proc;
        match &self.store {
            HashStore::Null => {}
            HashStore::Packed(entries) => {
                dest.store = HashStore::Packed(entries.clone());
                dest.size = self.size;
            }
            HashStore::Buckets(store) => {
                dest.store = HashStore::Buckets(BucketsStore {
                    buckets: vec![None; store.buckets.len()],
                    entries: vec![],
                    free: vec![],
                });
                let mut cur = self.first_in_sequence;
                while let Some(ix) = cur {
                    let e = &store.entries[ix.as_usize()];
                    dest.buckets_append_new(e.hashed, e.key, e.value);
                    cur = e.next_in_sequence;
                }
                dest.size = self.size;
            }
        }
        dest.verify();
    }

    /// Recompute every key's hash code. When two keys now collide as
    /// equal, the earlier insertion survives and the later one is
    /// dropped.
    pub fn rehash(&mut self, vm: &mut VM) -> Result<(), RubyError> {
        let by_id = self.compare_by_identity;
        match self.variant() {
            HashVariant::Null => {}
            HashVariant::Packed => {
                let mut entries = match std::mem::replace(&mut self.store, HashStore::Null) {
                    HashStore::Packed(entries) => entries,
                    _ => unreachable!(),
                };
                let mut n = 0;
                while n < entries.len() {
                    let key = entries[n].key;
                    let new_hash = hash_value(vm, key, by_id)?;
                    entries[n].hashed = new_hash;
                    let mut dropped = false;
                    for m in (0..n).rev() {
                        if entries[m].hashed == new_hash
                            && eql_values(vm, key, entries[m].key, by_id)?
                        {
                            entries.remove(n);
                            dropped = true;
                            break;
                        }
                    }
                    if !dropped {
                        n += 1;
                    }
                }
                self.size = entries.len();
                self.store = if entries.is_empty() {
                    HashStore::Null
                } else {
                    HashStore::Packed(entries)
                };
            }
            HashVariant::Buckets => {
                // Recompute hashes up front; key hashing may call back
                // into user code.
                let mut seq = vec![];
                let mut cur = self.first_in_sequence;
                while let Some(ix) = cur {
                    let (key, next) = match &self.store {
                        HashStore::Buckets(store) => {
                            let e = &store.entries[ix.as_usize()];
                            (e.key, e.next_in_sequence)
                        }
                        _ => unreachable!(),
                    };
                    seq.push((ix, key, hash_value(vm, key, by_id)?));
                    cur = next;
                }
                let bucket_count = match &mut self.store {
                    HashStore::Buckets(store) => {
                        for slot in store.buckets.iter_mut() {
                            *slot = None;
                        }
                        store.buckets.len()
                    }
                    _ => unreachable!(),
                };
                for (ix, key, new_hash) in seq {
                    let index = bucket_index(new_hash, bucket_count);
                    // Collision scan against entries already re-linked.
                    let mut collided = false;
                    let mut cur = match &self.store {
                        HashStore::Buckets(store) => store.buckets[index],
                        _ => unreachable!(),
                    };
                    while let Some(c) = cur {
                        let (c_hashed, c_key, c_next) = match &self.store {
                            HashStore::Buckets(store) => {
                                let e = &store.entries[c.as_usize()];
                                (e.hashed, e.key, e.next_in_lookup)
                            }
                            _ => unreachable!(),
                        };
                        if c_hashed == new_hash && eql_values(vm, key, c_key, by_id)? {
                            collided = true;
                            break;
                        }
                        cur = c_next;
                    }
                    if collided {
                        self.unlink_from_sequence(ix);
                        if let HashStore::Buckets(store) = &mut self.store {
                            let e = &mut store.entries[ix.as_usize()];
                            e.live = false;
                            e.next_in_lookup = None;
                            store.free.push(ix);
                        }
                        self.size -= 1;
                    } else if let HashStore::Buckets(store) = &mut self.store {
                        let e = &mut store.entries[ix.as_usize()];
                        e.hashed = new_hash;
                        e.next_in_lookup = store.buckets[index];
                        store.buckets[index] = Some(ix);
                    }
                }
                self.demote_if_empty();
            }
        }
        self.verify();
        Ok(())
    }
}

// Iteration.

///
/// A cursor over the insertion sequence.
///
/// The packed form iterates a snapshot; the bucketed form holds the
/// current arena index and reads its successor only after the caller
/// finished with the entry, so deleting the current entry is observed as
/// the iteration completing early.
///
#[derive(Debug, Clone)]
pub enum HashCursor {
    Packed {
        snapshot: Vec<(Value, Value)>,
        pos: usize,
    },
    Buckets {
        current: Option<EntryIx>,
    },
}

impl RubyHash {
    pub fn iter_start(&self) -> HashCursor {
        match &self.store {
            HashStore::Null => HashCursor::Packed {
                snapshot: vec![],
                pos: 0,
            },
            HashStore::Packed(entries) => HashCursor::Packed {
                snapshot: entries.iter().map(|e| (e.key, e.value)).collect(),
                pos: 0,
            },
            HashStore::Buckets(_) => HashCursor::Buckets {
                current: self.first_in_sequence,
            },
        }
    }

    pub fn iter_current(&self, cursor: &HashCursor) -> Option<(Value, Value)> {
        match cursor {
            HashCursor::Packed { snapshot, pos } => snapshot.get(*pos).cloned(),
            HashCursor::Buckets { current } => {
                let ix = (*current)?;
                match &self.store {
                    HashStore::Buckets(store) => {
                        let e = &store.entries[ix.as_usize()];
                        if e.live {
                            Some((e.key, e.value))
                        } else {
                            None
                        }
                    }
                    _ => None,
                }
            }
        }
    }

    pub fn iter_advance(&self, cursor: &mut HashCursor) {
        match cursor {
            HashCursor::Packed { pos, .. } => *pos += 1,
            HashCursor::Buckets { current } => {
                *current = current.and_then(|ix| match &self.store {
                    HashStore::Buckets(store) => {
                        let e = &store.entries[ix.as_usize()];
                        if e.live {
                            e.next_in_sequence
                        } else {
                            // The current entry was deleted under us.
                            None
                        }
                    }
                    _ => None,
                });
            }
        }
    }

    /// Walk the insertion sequence of the hash held by `hash_val`,
    /// invoking `cb(vm, index, key, value)`. Structural mutation from the
    /// callback is tolerated.
    pub fn each_entry_value(
        vm: &mut VM,
        hash_val: Value,
        mut cb: impl FnMut(&mut VM, usize, Value, Value) -> Result<(), RubyError>,
    ) -> Result<(), RubyError> {
        let mut cursor = hash_val
            .as_rhash()
            .expect("each_entry_value: not a hash.")
            .iter_start();
        let mut index = 0;
        loop {
            let current = hash_val.as_rhash().unwrap().iter_current(&cursor);
            let (k, v) = match current {
                Some(kv) => kv,
                None => break,
            };
            cb(vm, index, k, v)?;
            index += 1;
            hash_val.as_rhash().unwrap().iter_advance(&mut cursor);
        }
        Ok(())
    }

    /// An order-preserving snapshot of all entries.
    pub fn iter_pairs(&self) -> Vec<(Value, Value)> {
        let mut pairs = vec![];
        let mut cursor = self.iter_start();
        while let Some(kv) = self.iter_current(&cursor) {
            pairs.push(kv);
            self.iter_advance(&mut cursor);
        }
        pairs
    }

    pub fn keys(&self) -> Vec<Value> {
        self.iter_pairs().into_iter().map(|(k, _)| k).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.iter_pairs().into_iter().map(|(_, v)| v).collect()
    }
}

// Structural verification.
impl RubyHash {
    /// Invariants checked after every mutating op in debug builds: the
    /// entry set reachable from the buckets equals the set reachable from
    /// the sequence, sequence endpoints are consistent, and both counts
    /// equal `size`.
    fn verify(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        match &self.store {
            HashStore::Null => {
                assert_eq!(0, self.size);
            }
            HashStore::Packed(entries) => {
                assert_eq!(entries.len(), self.size);
            }
            HashStore::Buckets(store) => {
                let mut found_buckets = 0;
                for head in &store.buckets {
                    let mut cur = *head;
                    while let Some(ix) = cur {
                        let e = &store.entries[ix.as_usize()];
                        assert!(e.live);
                        found_buckets += 1;
                        cur = e.next_in_lookup;
                    }
                }
                assert_eq!(self.size, found_buckets);

                if let Some(first) = self.first_in_sequence {
                    assert!(store.entries[first.as_usize()].prev_in_sequence.is_none());
                }
                if let Some(last) = self.last_in_sequence {
                    assert!(store.entries[last.as_usize()].next_in_sequence.is_none());
                }
                let mut found_seq = 0;
                let mut cur = self.first_in_sequence;
                while let Some(ix) = cur {
                    let e = &store.entries[ix.as_usize()];
                    assert!(e.live);
                    found_seq += 1;
                    if let Some(next) = e.next_in_sequence {
                        assert_eq!(
                            Some(ix),
                            store.entries[next.as_usize()].prev_in_sequence
                        );
                    } else {
                        assert_eq!(Some(ix), self.last_in_sequence);
                    }
                    cur = e.next_in_sequence;
                }
                assert_eq!(self.size, found_seq);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Value {
        Value::symbol_from_str(name)
    }

    #[test]
    fn ordered_map_contract() {
        let mut vm = VM::new();
        let mut h = RubyHash::new();
        assert!(h.set(&mut vm, sym("a"), Value::integer(1)).unwrap());
        assert!(h.set(&mut vm, sym("b"), Value::integer(2)).unwrap());
        assert!(h.set(&mut vm, sym("c"), Value::integer(3)).unwrap());
        // Update does not move the key.
        assert!(!h.set(&mut vm, sym("a"), Value::integer(4)).unwrap());
        assert_eq!(3, h.len());
        let pairs = h.iter_pairs();
        assert_eq!(
            vec![
                (sym("a"), Value::integer(4)),
                (sym("b"), Value::integer(2)),
                (sym("c"), Value::integer(3)),
            ],
            pairs
        );
        assert_eq!(Some(Value::integer(2)), h.delete(&mut vm, sym("b")).unwrap());
        assert_eq!(
            vec![(sym("a"), Value::integer(4)), (sym("c"), Value::integer(3))],
            h.iter_pairs()
        );
    }

    #[test]
    fn representation_transitions() {
        let mut vm = VM::new();
        let mut h = RubyHash::new();
        assert_eq!(HashVariant::Null, h.variant());
        h.set(&mut vm, sym("a"), Value::integer(0)).unwrap();
        assert_eq!(HashVariant::Packed, h.variant());
        h.set(&mut vm, sym("b"), Value::integer(1)).unwrap();
        h.set(&mut vm, sym("c"), Value::integer(2)).unwrap();
        assert_eq!(HashVariant::Packed, h.variant());
        // K = 3 by default; the fourth insert promotes.
        h.set(&mut vm, sym("d"), Value::integer(3)).unwrap();
        assert_eq!(HashVariant::Buckets, h.variant());
        assert_eq!(
            Some(Value::integer(0)),
            h.get(&mut vm, sym("a")).unwrap()
        );
        assert_eq!(4, h.len());
        assert_eq!(
            vec![sym("a"), sym("b"), sym("c"), sym("d")],
            h.keys()
        );
    }

    #[test]
    fn set_is_idempotent_for_size() {
        let mut vm = VM::new();
        let mut h = RubyHash::new();
        assert!(h.set(&mut vm, sym("k"), Value::integer(7)).unwrap());
        assert!(!h.set(&mut vm, sym("k"), Value::integer(7)).unwrap());
        assert_eq!(1, h.len());
    }

    #[test]
    fn large_hash_keeps_order_through_resizes() {
        let mut vm = VM::new();
        let mut h = RubyHash::new();
        for i in 0..100 {
            h.set(&mut vm, Value::integer(i), Value::integer(i * 2))
                .unwrap();
        }
        assert_eq!(100, h.len());
        assert_eq!(HashVariant::Buckets, h.variant());
        let keys = h.keys();
        for i in 0..100 {
            assert_eq!(Value::integer(i), keys[i as usize]);
        }
        for i in 0..100 {
            assert_eq!(
                Some(Value::integer(i * 2)),
                h.get(&mut vm, Value::integer(i)).unwrap()
            );
        }
    }

    #[test]
    fn delete_from_buckets() {
        let mut vm = VM::new();
        let mut h = RubyHash::new();
        for i in 0..10 {
            h.set(&mut vm, Value::integer(i), Value::integer(i)).unwrap();
        }
        assert_eq!(
            Some(Value::integer(4)),
            h.delete(&mut vm, Value::integer(4)).unwrap()
        );
        assert_eq!(None, h.delete(&mut vm, Value::integer(4)).unwrap());
        assert_eq!(9, h.len());
        assert!(!h.keys().contains(&Value::integer(4)));
    }

    #[test]
    fn shift_returns_head() {
        let mut vm = VM::new();
        let mut h = RubyHash::new();
        h.set(&mut vm, sym("x"), Value::integer(1)).unwrap();
        h.set(&mut vm, sym("y"), Value::integer(2)).unwrap();
        assert_eq!(Some((sym("x"), Value::integer(1))), h.shift());
        assert_eq!(Some((sym("y"), Value::integer(2))), h.shift());
        assert_eq!(None, h.shift());
        assert_eq!(HashVariant::Null, h.variant());
    }

    #[test]
    fn delete_last_requires_tail_key() {
        let mut vm = VM::new();
        let mut h = RubyHash::new();
        for i in 0..6 {
            h.set(&mut vm, Value::integer(i), Value::integer(i * 10))
                .unwrap();
        }
        assert_eq!(Value::integer(50), h.delete_last(Value::integer(5)));
        assert_eq!(5, h.len());
        assert_eq!(Value::integer(40), h.delete_last(Value::integer(4)));
    }

    #[test]
    #[should_panic]
    fn delete_last_panics_on_mismatch() {
        let mut vm = VM::new();
        let mut h = RubyHash::new();
        h.set(&mut vm, sym("a"), Value::integer(1)).unwrap();
        h.set(&mut vm, sym("b"), Value::integer(2)).unwrap();
        h.delete_last(sym("a"));
    }

    #[test]
    fn mutable_string_keys_are_frozen_on_insert() {
        let mut vm = VM::new();
        let mut h = RubyHash::new();
        let key = Value::string("mutable");
        h.set(&mut vm, key, Value::integer(1)).unwrap();
        let stored = h.keys()[0];
        assert_ne!(key.id(), stored.id());
        assert!(stored.as_rstring().unwrap().is_frozen());
        // Lookup by content still works.
        assert_eq!(
            Some(Value::integer(1)),
            h.get(&mut vm, Value::string("mutable")).unwrap()
        );
    }

    #[test]
    fn identity_mode_skips_freezing_and_content_lookup() {
        let mut vm = VM::new();
        let mut h = RubyHash::new();
        h.set_compare_by_identity(&mut vm).unwrap();
        let key = Value::string("k");
        h.set(&mut vm, key, Value::integer(9)).unwrap();
        assert_eq!(key.id(), h.keys()[0].id());
        assert_eq!(None, h.get(&mut vm, Value::string("k")).unwrap());
        assert_eq!(Some(Value::integer(9)), h.get(&mut vm, key).unwrap());
    }

    #[test]
    fn replace_deep_copies_preserving_order() {
        let mut vm = VM::new();
        let mut src = RubyHash::new();
        for i in 0..8 {
            src.set(&mut vm, Value::integer(i), Value::integer(-i)).unwrap();
        }
        let mut dest = RubyHash::new();
        dest.set(&mut vm, sym("stale"), Value::nil()).unwrap();
        src.replace_into(&mut dest);
        assert_eq!(8, dest.len());
        assert_eq!(src.keys(), dest.keys());
        // Mutating the copy leaves the source alone.
        dest.delete(&mut vm, Value::integer(0)).unwrap();
        assert_eq!(8, src.len());
    }

    #[test]
    fn rehash_drops_later_duplicate() {
        let mut vm = VM::new();
        let mut h = RubyHash::new();
        h.set_compare_by_identity(&mut vm).unwrap();
        let s1 = Value::string("dup");
        let s2 = Value::string("dup");
        h.set(&mut vm, s1, Value::integer(1)).unwrap();
        h.set(&mut vm, s2, Value::integer(2)).unwrap();
        assert_eq!(2, h.len());
        // Under content comparison the two keys collide; the earlier
        // insertion survives.
        h.compare_by_identity = false;
        h.rehash(&mut vm).unwrap();
        assert_eq!(1, h.len());
        assert_eq!(Some(Value::integer(1)), h.get(&mut vm, s1).unwrap());
    }

    #[test]
    fn iteration_tolerates_delete_of_current_entry() {
        let mut vm = VM::new();
        let mut h = RubyHash::new();
        for i in 0..6 {
            h.set(&mut vm, Value::integer(i), Value::integer(i)).unwrap();
        }
        let hash_val = Value::hash_from(h);
        let mut seen = vec![];
        RubyHash::each_entry_value(&mut vm, hash_val, |vm, _idx, k, _v| {
            seen.push(k);
            if k == Value::integer(2) {
                let mut hv = hash_val;
                hv.as_mut_rhash().unwrap().delete(vm, k).unwrap();
            }
            Ok(())
        })
        .unwrap();
        // Deleting the current entry ends the walk early.
        assert_eq!(
            vec![Value::integer(0), Value::integer(1), Value::integer(2)],
            seen
        );
        assert_eq!(5, hash_val.as_rhash().unwrap().len());
    }

    #[test]
    fn iteration_packed_uses_snapshot() {
        let mut vm = VM::new();
        let mut h = RubyHash::new();
        h.set(&mut vm, sym("a"), Value::integer(1)).unwrap();
        h.set(&mut vm, sym("b"), Value::integer(2)).unwrap();
        let hash_val = Value::hash_from(h);
        let mut seen = 0;
        RubyHash::each_entry_value(&mut vm, hash_val, |vm, _idx, k, _v| {
            seen += 1;
            if k == sym("a") {
                let mut hv = hash_val;
                hv.as_mut_rhash().unwrap().delete(vm, sym("b")).unwrap();
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(2, seen);
    }

    #[test]
    fn capacity_table() {
        assert_eq!(11, capacity_greater_than(0));
        assert_eq!(11, capacity_greater_than(10));
        assert_eq!(19, capacity_greater_than(11));
        assert_eq!(37, capacity_greater_than(20));
        assert_eq!(1073741909, capacity_greater_than(usize::MAX / 2));
    }
}
