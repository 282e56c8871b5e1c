//! The map core: a chained-bucket hash table over raw byte cells.
//!
//! [`ByteMap`] stores keys and values as opaque byte blocks of sizes fixed at
//! construction. Compiler-generated code knows the real types; the map only
//! ever copies, hashes, and compares cells through the discipline bound at
//! construction. Every bucket row holds eight slots; a one-byte tag per slot
//! (the hash's high byte, never zero) pre-filters equality probes, and rows
//! that fill up chain into overflow rows rather than probing neighbours.
//!
//! ## Growth
//!
//! When the live count passes six entries per primary row (a 0.75 load
//! factor across eight-slot rows), the next insert rebuilds the table into a
//! twice-as-large generation under a fresh seed, stop-the-world, by walking
//! the old generation with a throwaway cursor. Growth stops at
//! `usize::BITS - 3` doublings; past that point chains just get longer.
//!
//! ## Cursor stability
//!
//! A [`MapIter`] pins the bucket generation it first observed by holding an
//! `Rc` to it, so a rebuild can abandon the old rows without invalidating
//! cursors that are still walking them. The cursor notices the swap by
//! pointer identity and re-reads values from the live table from then on:
//! positions come from the snapshot, values from the present. Entries
//! deleted mid-iteration disappear; entries updated mid-iteration are
//! reported with their current value.

use alloc::rc::Rc;
use alloc::vec;
use core::fmt::Debug;
use core::ptr;

use crate::bucket::BucketArray;
use crate::bucket::SLOTS;
use crate::bucket::header;
use crate::bucket::slot_key;
use crate::bucket::slot_value;
use crate::bucket::tophash;
use crate::discipline::Algorithm;
use crate::discipline::KeyEqualFn;
use crate::discipline::KeyHashFn;
use crate::hash::random_seed;

/// Whether another doubling keeps bucket-index arithmetic inside a `usize`.
fn has_space_to_grow(bucket_bits: u8) -> bool {
    u32::from(bucket_bits) <= usize::BITS - 3
}

/// Whether `count` live entries overload `1 << bucket_bits` primary rows.
///
/// The threshold is six entries per row: 0.75 load across eight slots.
fn over_load_factor(count: usize, bucket_bits: u8) -> bool {
    count > 6usize << bucket_bits
}

/// A hash map over raw byte cells with sizes fixed at construction.
///
/// All key and value traffic crosses the API as raw pointers to cells of the
/// declared sizes; the map copies bytes in and out and never interprets them
/// beyond the bound discipline's hash and equality. For the nullable-pointer
/// surface the surrounding runtime calls into, see [`crate::api`].
pub struct ByteMap {
    buckets: Rc<BucketArray>,
    seed: u64,
    count: usize,
    key_size: usize,
    value_size: usize,
    bucket_bits: u8,
    key_hash: KeyHashFn,
    key_equal: KeyEqualFn,
}

impl Debug for ByteMap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ByteMap")
            .field("len", &self.count)
            .field("buckets", &(1usize << self.bucket_bits))
            .field("key_size", &self.key_size)
            .field("value_size", &self.value_size)
            .finish_non_exhaustive()
    }
}

impl ByteMap {
    /// Creates an empty map for `key_size`-byte keys and `value_size`-byte
    /// values under the given discipline.
    ///
    /// # Panics
    ///
    /// Panics if the discipline dictates a key-cell size (`String`,
    /// `Dynamic`) and `key_size` disagrees with it.
    pub fn new(key_size: usize, value_size: usize, algorithm: Algorithm) -> ByteMap {
        ByteMap::with_capacity(key_size, value_size, 0, algorithm)
    }

    /// Creates an empty map pre-sized so that `capacity` inserts do not
    /// trigger a rebuild.
    ///
    /// # Panics
    ///
    /// Panics if the discipline dictates a key-cell size and `key_size`
    /// disagrees with it.
    pub fn with_capacity(
        key_size: usize,
        value_size: usize,
        capacity: usize,
        algorithm: Algorithm,
    ) -> ByteMap {
        if let Some(required) = algorithm.fixed_key_size() {
            assert!(
                key_size == required,
                "key size {key_size} does not fit a {algorithm:?} cell of {required} bytes"
            );
        }

        let mut bucket_bits = 0u8;
        while has_space_to_grow(bucket_bits) && over_load_factor(capacity, bucket_bits) {
            bucket_bits += 1;
        }

        ByteMap {
            buckets: Rc::new(BucketArray::new(bucket_bits, key_size, value_size)),
            seed: random_seed(),
            count: 0,
            key_size,
            value_size,
            bucket_bits,
            key_hash: algorithm.key_hash(),
            key_equal: algorithm.key_equal(),
        }
    }

    /// Number of live entries. Constant-time.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline(always)]
    fn bucket_index(&self, hash: u32) -> usize {
        hash as usize & ((1usize << self.bucket_bits) - 1)
    }

    /// Hashes a key cell with the map's own discipline and current seed.
    ///
    /// The seed changes on every rebuild, so a hash must not be carried
    /// across a call that can insert.
    ///
    /// # Safety
    ///
    /// `key` must be valid for `key_size` reads and hold a cell of this
    /// map's discipline (see [`Algorithm`] for what each discipline expects
    /// the cell to contain).
    pub unsafe fn hash_key(&self, key: *const u8) -> u32 {
        // SAFETY: forwarded caller contract.
        unsafe { (self.key_hash)(key, self.key_size, self.seed) }
    }

    /// Looks `key` up, copying its value into `out_value` on a hit.
    ///
    /// On a miss, `out_value` is zero-filled so the caller always observes a
    /// fully initialised cell. `hash` must have been computed with the map's
    /// current seed, normally via [`hash_key`](Self::hash_key).
    ///
    /// # Safety
    ///
    /// - `key` must be valid for `key_size` reads and hold a cell of this
    ///   map's discipline.
    /// - `out_value` must be valid for `value_size` writes and must not
    ///   overlap the map's storage.
    pub unsafe fn get(&self, key: *const u8, out_value: *mut u8, hash: u32) -> bool {
        let tag = tophash(hash);
        // SAFETY: chain pointers come from this map's arena, occupied slots
        // hold cells of the bound discipline, and the caller vouches for
        // `key` and `out_value`.
        unsafe {
            let mut bucket = self.buckets.bucket(self.bucket_index(hash));
            while !bucket.is_null() {
                for slot in 0..SLOTS {
                    if (*header(bucket)).tophash[slot] != tag {
                        continue;
                    }
                    let candidate = slot_key(bucket, self.key_size, slot);
                    if (self.key_equal)(key, candidate, self.key_size) {
                        ptr::copy_nonoverlapping(
                            slot_value(bucket, self.key_size, self.value_size, slot),
                            out_value,
                            self.value_size,
                        );
                        return true;
                    }
                }
                bucket = (*header(bucket)).next;
            }

            ptr::write_bytes(out_value, 0, self.value_size);
            false
        }
    }

    /// Inserts `key` with `value`, or overwrites the value in place when the
    /// key is already present.
    ///
    /// Crossing the load threshold rebuilds the table first; the rebuild
    /// reseeds the map, so `hash` is recomputed internally in that case.
    ///
    /// # Safety
    ///
    /// - `key` and `value` must be valid for `key_size` / `value_size` reads
    ///   and `key` must hold a cell of this map's discipline.
    /// - Cells referenced *through* the key cell (string contents, dynamic
    ///   values) must stay live for as long as the map may hold the entry.
    pub unsafe fn set(&mut self, key: *const u8, value: *const u8, hash: u32) {
        let mut hash = hash;
        if has_space_to_grow(self.bucket_bits) && over_load_factor(self.count, self.bucket_bits) {
            self.grow();
            // SAFETY: forwarded caller contract; the rebuild changed the seed.
            hash = unsafe { (self.key_hash)(key, self.key_size, self.seed) };
        }

        let tag = tophash(hash);
        // SAFETY: chain pointers come from this map's arena, occupied slots
        // hold cells of the bound discipline, and the caller vouches for the
        // input cells.
        unsafe {
            let mut bucket = self.buckets.bucket(self.bucket_index(hash));
            let mut last = ptr::null_mut::<u8>();
            let mut empty: Option<(*mut u8, usize)> = None;

            while !bucket.is_null() {
                for slot in 0..SLOTS {
                    let slot_tag = (*header(bucket)).tophash[slot];
                    if slot_tag == 0 && empty.is_none() {
                        // First free slot on the chain; reused if the key
                        // turns out not to be present.
                        empty = Some((bucket, slot));
                    }
                    if slot_tag == tag {
                        let candidate = slot_key(bucket, self.key_size, slot);
                        if (self.key_equal)(key, candidate, self.key_size) {
                            ptr::copy_nonoverlapping(
                                value,
                                slot_value(bucket, self.key_size, self.value_size, slot),
                                self.value_size,
                            );
                            return;
                        }
                    }
                }
                last = bucket;
                bucket = (*header(bucket)).next;
            }

            let (bucket, slot) = match empty {
                Some(free) => free,
                None => {
                    // Chain is wholly full: start a fresh overflow row at
                    // its tail.
                    let fresh = self.buckets.alloc_overflow();
                    (*header(last)).next = fresh;
                    (fresh, 0)
                }
            };

            ptr::copy_nonoverlapping(key, slot_key(bucket, self.key_size, slot), self.key_size);
            ptr::copy_nonoverlapping(
                value,
                slot_value(bucket, self.key_size, self.value_size, slot),
                self.value_size,
            );
            (*header(bucket)).tophash[slot] = tag;
            self.count += 1;
        }
    }

    /// Removes `key` if present. Removing an absent key is a no-op.
    ///
    /// The vacated cells are zero-filled: stale key bytes must not keep
    /// whatever they referenced alive for a scanner of the arena, and the
    /// slot becomes reusable by the next insert on this chain.
    ///
    /// # Safety
    ///
    /// `key` must be valid for `key_size` reads and hold a cell of this
    /// map's discipline.
    pub unsafe fn delete(&mut self, key: *const u8, hash: u32) {
        let tag = tophash(hash);
        // SAFETY: chain pointers come from this map's arena and occupied
        // slots hold cells of the bound discipline.
        unsafe {
            let mut bucket = self.buckets.bucket(self.bucket_index(hash));
            while !bucket.is_null() {
                for slot in 0..SLOTS {
                    if (*header(bucket)).tophash[slot] != tag {
                        continue;
                    }
                    let candidate = slot_key(bucket, self.key_size, slot);
                    if (self.key_equal)(key, candidate, self.key_size) {
                        (*header(bucket)).tophash[slot] = 0;
                        ptr::write_bytes(candidate, 0, self.key_size);
                        ptr::write_bytes(
                            slot_value(bucket, self.key_size, self.value_size, slot),
                            0,
                            self.value_size,
                        );
                        self.count -= 1;
                        return;
                    }
                }
                bucket = (*header(bucket)).next;
            }
        }
    }

    /// Removes every entry while keeping the bucket storage and the seed.
    ///
    /// Chains stay linked, so a cleared map re-fills without allocating
    /// until it outgrows its previous footprint.
    pub fn clear(&mut self) {
        self.count = 0;
        // SAFETY: chain pointers come from this map's arena; the zeroed
        // region starts past the header, so the chain links survive.
        unsafe {
            for index in 0..self.buckets.len() {
                let mut bucket = self.buckets.bucket(index);
                while !bucket.is_null() {
                    (*header(bucket)).tophash = [0; SLOTS];
                    ptr::write_bytes(
                        slot_key(bucket, self.key_size, 0),
                        0,
                        SLOTS * (self.key_size + self.value_size),
                    );
                    bucket = (*header(bucket)).next;
                }
            }
        }
    }

    /// Rebuilds the table one doubling bigger under a fresh seed.
    fn grow(&mut self) {
        let mut shadow = ByteMap {
            buckets: Rc::new(BucketArray::new(
                self.bucket_bits + 1,
                self.key_size,
                self.value_size,
            )),
            seed: random_seed(),
            count: 0,
            key_size: self.key_size,
            value_size: self.value_size,
            bucket_bits: self.bucket_bits + 1,
            key_hash: self.key_hash,
            key_equal: self.key_equal,
        };

        let mut key = vec![0u8; self.key_size];
        let mut value = vec![0u8; self.value_size];
        let mut cursor = MapIter::new();
        // SAFETY: the scratch buffers are sized for this map's cells, and
        // every key cell the cursor yields stays a valid cell of the shared
        // discipline.
        unsafe {
            while cursor.next(self, key.as_mut_ptr(), value.as_mut_ptr()) {
                let hash = (shadow.key_hash)(key.as_ptr(), shadow.key_size, shadow.seed);
                shadow.set(key.as_ptr(), value.as_ptr(), hash);
            }
        }

        // The old generation is abandoned, not freed: cursors that pinned it
        // keep it alive until they finish.
        *self = shadow;
    }
}

/// A cursor over a [`ByteMap`]'s entries.
///
/// Construction does not observe the map; the first [`next`](MapIter::next)
/// call snapshots the bucket generation and the walk proceeds in (bucket,
/// chain position, slot) order over that snapshot. The cursor stays usable
/// when the map grows mid-iteration: positions keep coming from the
/// snapshot, values are re-read from the live table.
pub struct MapIter {
    buckets: Option<Rc<BucketArray>>,
    num_buckets: usize,
    bucket_number: usize,
    bucket: *mut u8,
    slot: usize,
}

impl Default for MapIter {
    fn default() -> MapIter {
        MapIter::new()
    }
}

impl MapIter {
    /// Creates a cursor that has not yet observed any map.
    pub fn new() -> MapIter {
        MapIter {
            buckets: None,
            num_buckets: 0,
            bucket_number: 0,
            bucket: ptr::null_mut(),
            slot: 0,
        }
    }

    /// Advances to the next live entry, copying its key and current value
    /// into `out_key` and `out_value`. Returns `false` when exhausted.
    ///
    /// Entries deleted since the last call are skipped; entries updated
    /// since the last call are reported with their current value.
    ///
    /// # Safety
    ///
    /// - Every call must pass the same `m` the cursor was first advanced
    ///   over.
    /// - `out_key` / `out_value` must be valid for `key_size` /
    ///   `value_size` writes and must not overlap the map's storage.
    pub unsafe fn next(&mut self, m: &ByteMap, out_key: *mut u8, out_value: *mut u8) -> bool {
        let snapshot = match &self.buckets {
            Some(snapshot) => Rc::clone(snapshot),
            None => {
                self.num_buckets = 1usize << m.bucket_bits;
                self.buckets = Some(Rc::clone(&m.buckets));
                Rc::clone(&m.buckets)
            }
        };

        // SAFETY: the snapshot arena is kept alive by the `Rc` above, the
        // cursor only dereferences rows of that arena, and the caller
        // vouches for the out cells.
        unsafe {
            loop {
                if self.slot >= SLOTS {
                    // End of this row; follow the chain.
                    self.slot = 0;
                    self.bucket = (*header(self.bucket)).next;
                }
                if self.bucket.is_null() {
                    if self.bucket_number >= self.num_buckets {
                        return false;
                    }
                    self.bucket = snapshot.bucket(self.bucket_number);
                    self.bucket_number += 1;
                }
                if (*header(self.bucket)).tophash[self.slot] == 0 {
                    self.slot += 1;
                    continue;
                }

                ptr::copy_nonoverlapping(
                    slot_key(self.bucket, m.key_size, self.slot),
                    out_key,
                    m.key_size,
                );

                if Rc::ptr_eq(&snapshot, &m.buckets) {
                    // The snapshot is the live generation; the value can be
                    // read in place.
                    ptr::copy_nonoverlapping(
                        slot_value(self.bucket, m.key_size, m.value_size, self.slot),
                        out_value,
                        m.value_size,
                    );
                    self.slot += 1;
                } else {
                    self.slot += 1;
                    // The map grew since iteration began. Report the entry's
                    // current value, or skip it if it no longer exists.
                    let hash = (m.key_hash)(out_key as *const u8, m.key_size, m.seed);
                    if !m.get(out_key as *const u8, out_value, hash) {
                        continue;
                    }
                }

                return true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::collections::BTreeMap;
    use alloc::collections::BTreeSet;
    use alloc::vec::Vec;

    use super::*;

    fn u64_map() -> ByteMap {
        ByteMap::new(8, 8, Algorithm::Binary)
    }

    fn set_u64(m: &mut ByteMap, key: u64, value: u64) {
        let key = key.to_ne_bytes();
        let value = value.to_ne_bytes();
        // SAFETY: both cells are live 8-byte arrays matching the map's
        // declared sizes.
        unsafe {
            let hash = m.hash_key(key.as_ptr());
            m.set(key.as_ptr(), value.as_ptr(), hash);
        }
    }

    fn get_u64(m: &ByteMap, key: u64) -> Option<u64> {
        let key = key.to_ne_bytes();
        let mut out = [0xffu8; 8];
        // SAFETY: both cells are live 8-byte arrays matching the map's
        // declared sizes.
        unsafe {
            let hash = m.hash_key(key.as_ptr());
            if m.get(key.as_ptr(), out.as_mut_ptr(), hash) {
                Some(u64::from_ne_bytes(out))
            } else {
                None
            }
        }
    }

    fn delete_u64(m: &mut ByteMap, key: u64) {
        let key = key.to_ne_bytes();
        // SAFETY: the cell is a live 8-byte array matching the map's
        // declared key size.
        unsafe {
            let hash = m.hash_key(key.as_ptr());
            m.delete(key.as_ptr(), hash);
        }
    }

    fn collect_u64(m: &ByteMap) -> Vec<(u64, u64)> {
        let mut cursor = MapIter::new();
        let mut out_key = [0u8; 8];
        let mut out_value = [0u8; 8];
        let mut entries = Vec::new();
        // SAFETY: the out cells are live 8-byte arrays matching the map's
        // declared sizes.
        unsafe {
            while cursor.next(m, out_key.as_mut_ptr(), out_value.as_mut_ptr()) {
                entries.push((u64::from_ne_bytes(out_key), u64::from_ne_bytes(out_value)));
            }
        }
        entries
    }

    #[test]
    fn set_then_get() {
        let mut m = u64_map();
        set_u64(&mut m, 3, 30);
        set_u64(&mut m, 4, 40);
        assert_eq!(get_u64(&m, 3), Some(30));
        assert_eq!(get_u64(&m, 4), Some(40));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn miss_zero_fills_the_out_cell() {
        let m = u64_map();
        let key = 9u64.to_ne_bytes();
        let mut out = [0xffu8; 8];
        // SAFETY: both cells are live 8-byte arrays.
        unsafe {
            let hash = m.hash_key(key.as_ptr());
            assert!(!m.get(key.as_ptr(), out.as_mut_ptr(), hash));
        }
        assert_eq!(out, [0u8; 8]);
    }

    #[test]
    fn double_insert_overwrites_in_place() {
        let mut m = u64_map();
        set_u64(&mut m, 5, 1);
        assert_eq!(m.len(), 1);
        set_u64(&mut m, 5, 2);
        assert_eq!(m.len(), 1);
        assert_eq!(get_u64(&m, 5), Some(2));
    }

    #[test]
    fn delete_then_get_misses() {
        let mut m = u64_map();
        set_u64(&mut m, 7, 70);
        delete_u64(&mut m, 7);
        assert_eq!(get_u64(&m, 7), None);
        assert_eq!(m.len(), 0);
    }

    #[test]
    fn delete_is_idempotent() {
        let mut m = u64_map();
        set_u64(&mut m, 1, 10);
        set_u64(&mut m, 2, 20);
        delete_u64(&mut m, 1);
        let after_first = (m.len(), collect_u64(&m));
        delete_u64(&mut m, 1);
        assert_eq!((m.len(), collect_u64(&m)), after_first);
    }

    #[test]
    fn deleting_an_absent_key_is_a_no_op() {
        let mut m = u64_map();
        set_u64(&mut m, 1, 10);
        delete_u64(&mut m, 999);
        assert_eq!(m.len(), 1);
        assert_eq!(get_u64(&m, 1), Some(10));
    }

    #[test]
    fn len_tracks_live_entries() {
        let mut m = u64_map();
        for k in 0..40 {
            set_u64(&mut m, k, k);
        }
        assert_eq!(m.len(), 40);
        for k in 0..20 {
            delete_u64(&mut m, k);
        }
        assert_eq!(m.len(), 20);
        m.clear();
        assert_eq!(m.len(), 0);
        assert!(m.is_empty());
    }

    #[test]
    fn clear_keeps_capacity_and_seed() {
        let mut m = u64_map();
        for k in 0..500 {
            set_u64(&mut m, k, k);
        }
        let bits = m.bucket_bits;
        let seed = m.seed;
        m.clear();
        assert_eq!(m.len(), 0);
        assert_eq!(m.bucket_bits, bits);
        assert_eq!(m.seed, seed);
        for k in 0..500 {
            assert_eq!(get_u64(&m, k), None);
        }
        set_u64(&mut m, 3, 33);
        assert_eq!(get_u64(&m, 3), Some(33));
    }

    #[test]
    fn growth_preserves_contents() {
        let mut m = u64_map();
        let mut growths = 0;
        let mut bits = m.bucket_bits;
        for k in 0..1000u64 {
            set_u64(&mut m, k, k * 2);
            if m.bucket_bits > bits {
                assert_eq!(m.bucket_bits, bits + 1);
                growths += 1;
                bits = m.bucket_bits;
            }
            if k % 100 == 99 {
                assert_eq!(m.len(), (k + 1) as usize);
                for probe in 0..=k {
                    assert_eq!(get_u64(&m, probe), Some(probe * 2), "lost key {probe} of {k}");
                }
            }
        }
        assert!(growths >= 2, "expected at least two rebuilds, saw {growths}");
    }

    #[test]
    fn one_byte_keys_survive_dense_collisions() {
        let mut m = ByteMap::new(1, 1, Algorithm::Binary);
        for k in 0..=255u8 {
            let cell = [k];
            // SAFETY: both cells are live one-byte arrays.
            unsafe {
                let hash = m.hash_key(cell.as_ptr());
                m.set(cell.as_ptr(), cell.as_ptr(), hash);
            }
        }
        assert_eq!(m.len(), 256);

        let mut seen = BTreeMap::new();
        let mut cursor = MapIter::new();
        let mut out_key = [0u8; 1];
        let mut out_value = [0u8; 1];
        // SAFETY: the out cells are live one-byte arrays.
        unsafe {
            while cursor.next(&m, out_key.as_mut_ptr(), out_value.as_mut_ptr()) {
                *seen.entry(out_key[0]).or_insert(0u32) += 1;
                assert_eq!(out_value[0], out_key[0]);
            }
        }
        assert_eq!(seen.len(), 256);
        assert!(seen.values().all(|&n| n == 1));
    }

    #[test]
    fn cursor_rebuilds_the_same_multiset() {
        let mut m = u64_map();
        for k in 0..300u64 {
            set_u64(&mut m, k, k + 1);
        }
        for k in (0..300u64).step_by(3) {
            delete_u64(&mut m, k);
        }

        let mut rebuilt = u64_map();
        for (k, v) in collect_u64(&m) {
            set_u64(&mut rebuilt, k, v);
        }

        let as_set = |m: &ByteMap| collect_u64(m).into_iter().collect::<BTreeSet<_>>();
        assert_eq!(as_set(&m), as_set(&rebuilt));
        assert_eq!(m.len(), rebuilt.len());
    }

    // 385 entries is one past the load threshold at 64 primary rows, so the
    // very next insert rebuilds the table before touching the old rows.
    #[test]
    fn cursor_survives_growth_without_revisiting_or_inventing_keys() {
        let mut m = u64_map();
        for k in 0..385u64 {
            set_u64(&mut m, k, k);
        }
        assert_eq!(m.bucket_bits, 6);

        let mut cursor = MapIter::new();
        let mut out_key = [0u8; 8];
        let mut out_value = [0u8; 8];
        let mut seen = BTreeMap::new();

        // SAFETY: the out cells are live 8-byte arrays.
        unsafe {
            for _ in 0..100 {
                assert!(cursor.next(&m, out_key.as_mut_ptr(), out_value.as_mut_ptr()));
                *seen.entry(u64::from_ne_bytes(out_key)).or_insert(0u32) += 1;
            }
        }

        let old_bits = m.bucket_bits;
        for k in 10_000..11_000u64 {
            set_u64(&mut m, k, k);
        }
        assert!(m.bucket_bits >= old_bits + 2, "burst should rebuild twice");

        // SAFETY: the out cells are live 8-byte arrays.
        unsafe {
            while cursor.next(&m, out_key.as_mut_ptr(), out_value.as_mut_ptr()) {
                let key = u64::from_ne_bytes(out_key);
                *seen.entry(key).or_insert(0u32) += 1;
                assert_eq!(u64::from_ne_bytes(out_value), key);
            }
        }

        for k in 0..385u64 {
            assert_eq!(seen.get(&k), Some(&1), "key {k} not visited exactly once");
        }
        assert!(
            seen.keys().all(|&k| k < 385),
            "burst keys leaked into the iteration"
        );
    }

    #[test]
    fn cursor_reports_updates_made_during_iteration() {
        let mut m = u64_map();
        for k in 0..10u64 {
            set_u64(&mut m, k, 1);
        }

        let mut cursor = MapIter::new();
        let mut out_key = [0u8; 8];
        let mut out_value = [0u8; 8];
        // SAFETY: the out cells are live 8-byte arrays.
        unsafe {
            assert!(cursor.next(&m, out_key.as_mut_ptr(), out_value.as_mut_ptr()));
        }

        for k in 0..10u64 {
            set_u64(&mut m, k, 2);
        }

        // SAFETY: the out cells are live 8-byte arrays.
        unsafe {
            while cursor.next(&m, out_key.as_mut_ptr(), out_value.as_mut_ptr()) {
                assert_eq!(u64::from_ne_bytes(out_value), 2);
            }
        }
    }

    #[test]
    fn entries_deleted_during_iteration_disappear() {
        let mut m = u64_map();
        for k in 0..10u64 {
            set_u64(&mut m, k, k);
        }

        let mut cursor = MapIter::new();
        let mut out_key = [0u8; 8];
        let mut out_value = [0u8; 8];
        // SAFETY: the out cells are live 8-byte arrays.
        unsafe {
            assert!(cursor.next(&m, out_key.as_mut_ptr(), out_value.as_mut_ptr()));
        }
        let first = u64::from_ne_bytes(out_key);

        for k in 0..10u64 {
            if k != first {
                delete_u64(&mut m, k);
            }
        }

        // SAFETY: the out cells are live 8-byte arrays.
        let more = unsafe { cursor.next(&m, out_key.as_mut_ptr(), out_value.as_mut_ptr()) };
        assert!(!more, "deleted entries must not be yielded");
    }

    #[test]
    fn cursor_on_an_empty_map_is_immediately_exhausted() {
        let m = u64_map();
        let mut cursor = MapIter::new();
        let mut out_key = [0u8; 8];
        let mut out_value = [0u8; 8];
        // SAFETY: the out cells are live 8-byte arrays.
        let any = unsafe { cursor.next(&m, out_key.as_mut_ptr(), out_value.as_mut_ptr()) };
        assert!(!any);
    }

    #[test]
    fn zero_sized_cells_collapse_to_one_entry() {
        let mut m = ByteMap::new(0, 0, Algorithm::Binary);
        let cell: [u8; 0] = [];
        // SAFETY: zero-length reads and writes are valid for any non-null
        // pointer.
        unsafe {
            let hash = m.hash_key(cell.as_ptr());
            m.set(cell.as_ptr(), cell.as_ptr(), hash);
            let hash = m.hash_key(cell.as_ptr());
            m.set(cell.as_ptr(), cell.as_ptr(), hash);
            assert_eq!(m.len(), 1);

            let mut out: [u8; 0] = [];
            let hash = m.hash_key(cell.as_ptr());
            assert!(m.get(cell.as_ptr(), out.as_mut_ptr(), hash));

            let hash = m.hash_key(cell.as_ptr());
            m.delete(cell.as_ptr(), hash);
            assert_eq!(m.len(), 0);
        }
    }

    // Keys are hand-picked at run time to share primary row zero, so nine of
    // them force an overflow row without any rebuild (the map is pre-sized
    // for 50 entries).
    #[test]
    fn colliding_keys_chain_delete_and_reuse() {
        let mut m = ByteMap::with_capacity(8, 8, 50, Algorithm::Binary);
        let mask = (1u64 << m.bucket_bits) - 1;
        let mut colliders = Vec::new();
        let mut candidate = 0u64;
        while colliders.len() < 10 {
            let cell = candidate.to_ne_bytes();
            // SAFETY: the cell is a live 8-byte array.
            let hash = unsafe { m.hash_key(cell.as_ptr()) };
            if (u64::from(hash) & mask) == 0 {
                colliders.push(candidate);
            }
            candidate += 1;
        }

        for &k in colliders.iter().take(9) {
            set_u64(&mut m, k, k + 1);
        }
        assert_eq!(m.len(), 9);
        for &k in colliders.iter().take(9) {
            assert_eq!(get_u64(&m, k), Some(k + 1));
        }

        // Vacate a primary-row slot, then insert a tenth collider; the
        // emptied slot is reused ahead of any new overflow row.
        delete_u64(&mut m, colliders[0]);
        assert_eq!(m.len(), 8);
        set_u64(&mut m, colliders[9], colliders[9] + 1);
        assert_eq!(m.len(), 9);
        for &k in colliders.iter().skip(1) {
            assert_eq!(get_u64(&m, k), Some(k + 1));
        }
        assert_eq!(get_u64(&m, colliders[0]), None);

        let entries = collect_u64(&m);
        assert_eq!(entries.len(), 9);
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn string_discipline_rejects_wrong_cell_size() {
        let _ = ByteMap::new(4, 8, Algorithm::String);
    }
}
