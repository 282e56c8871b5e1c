//! Entry points for compiler-generated code.
//!
//! The surrounding runtime represents a map variable as a nullable pointer:
//! a variable that was never assigned holds null. The split in null-map
//! behaviour is deliberate and callers depend on it — reads, deletes,
//! clears, length queries, and iteration over a null map are well-defined
//! no-ops, while any write is the fatal error `assignment to entry in nil
//! map`. That split keeps the code the compiler emits around uninitialised
//! map variables branch-free.
//!
//! The base operations take a key hash the caller computed; the
//! per-discipline forms (`map_binary_*`, `map_string_*`, `map_dyn_*`) hash
//! internally with the map's own seed, for callers that cannot know it.
//!
//! [`map_free`] and [`map_iter_free`] are the reclamation edge: the runtime
//! releases a map or cursor exactly once when its collector decides the
//! value is dead.

use alloc::boxed::Box;
use core::ptr;

use crate::discipline::Algorithm;
use crate::discipline::StrRef;
use crate::map::ByteMap;
use crate::map::MapIter;
use crate::reflect::Dyn;

const NIL_MAP_WRITE: &str = "assignment to entry in nil map";

/// Allocates a fresh map for `key_size`-byte keys and `value_size`-byte
/// values, pre-sized for `size_hint` entries.
///
/// Returns an owning pointer; release it with [`map_free`].
pub fn map_make(
    key_size: usize,
    value_size: usize,
    size_hint: usize,
    algorithm: Algorithm,
) -> *mut ByteMap {
    Box::into_raw(Box::new(ByteMap::with_capacity(
        key_size, value_size, size_hint, algorithm,
    )))
}

/// Releases a map allocated by [`map_make`]. Null is ignored.
///
/// # Safety
///
/// `m` must be null or a pointer from [`map_make`] that has not been freed,
/// and no other pointer to the map may be used afterwards.
pub unsafe fn map_free(m: *mut ByteMap) {
    if m.is_null() {
        return;
    }
    // SAFETY: per contract, `m` owns the map.
    drop(unsafe { Box::from_raw(m) });
}

/// Number of live entries; zero for a null map.
///
/// # Safety
///
/// `m` must be null or point at a live map.
pub unsafe fn map_len(m: *const ByteMap) -> usize {
    if m.is_null() {
        return 0;
    }
    // SAFETY: per contract, `m` points at a live map.
    unsafe { (*m).len() }
}

/// Removes every entry, keeping capacity. A no-op on a null map.
///
/// # Safety
///
/// `m` must be null or point at a live map with no outstanding borrows.
pub unsafe fn map_clear(m: *mut ByteMap) {
    if m.is_null() {
        return;
    }
    // SAFETY: per contract, `m` points at a live, unaliased map.
    unsafe { (*m).clear() }
}

/// Inserts or updates an entry. Writing to a null map is fatal.
///
/// `hash` must come from the map's current seed (see
/// [`ByteMap::hash_key`]); the per-discipline forms below handle that for
/// callers that do not track seeds.
///
/// # Safety
///
/// - `m` must be null or point at a live map with no outstanding borrows.
/// - `key` / `value` must satisfy [`ByteMap::set`]'s contract for that map.
pub unsafe fn map_set(m: *mut ByteMap, key: *const u8, value: *const u8, hash: u32) {
    if m.is_null() {
        panic!("{}", NIL_MAP_WRITE);
    }
    // SAFETY: forwarded caller contract.
    unsafe { (*m).set(key, value, hash) }
}

/// Looks an entry up, copying the value into `out_value` on a hit.
///
/// A miss — including any probe of a null map — zero-fills `out_value` for
/// `value_size` bytes and returns `false`.
///
/// # Safety
///
/// - `m` must be null or point at a live map whose value size is
///   `value_size`.
/// - `out_value` must be valid for `value_size` writes; with a non-null map,
///   `key` must satisfy [`ByteMap::get`]'s contract.
pub unsafe fn map_get(
    m: *const ByteMap,
    key: *const u8,
    out_value: *mut u8,
    value_size: usize,
    hash: u32,
) -> bool {
    if m.is_null() {
        // A null map holds no keys; the out cell still gets a defined value.
        // SAFETY: the caller vouches for `out_value` and `value_size`.
        unsafe { ptr::write_bytes(out_value, 0, value_size) };
        return false;
    }
    // SAFETY: forwarded caller contract.
    unsafe { (*m).get(key, out_value, hash) }
}

/// Removes an entry if present. A no-op on a null map or an absent key.
///
/// # Safety
///
/// `m` must be null or point at a live map with no outstanding borrows;
/// with a non-null map, `key` must satisfy [`ByteMap::delete`]'s contract.
pub unsafe fn map_delete(m: *mut ByteMap, key: *const u8, hash: u32) {
    if m.is_null() {
        return;
    }
    // SAFETY: forwarded caller contract.
    unsafe { (*m).delete(key, hash) }
}

/// Allocates a cursor in its start state.
///
/// Release it with [`map_iter_free`].
pub fn map_iter_new() -> *mut MapIter {
    Box::into_raw(Box::new(MapIter::new()))
}

/// Releases a cursor allocated by [`map_iter_new`]. Null is ignored.
///
/// # Safety
///
/// `it` must be null or a pointer from [`map_iter_new`] that has not been
/// freed, and no other pointer to the cursor may be used afterwards.
pub unsafe fn map_iter_free(it: *mut MapIter) {
    if it.is_null() {
        return;
    }
    // SAFETY: per contract, `it` owns the cursor.
    drop(unsafe { Box::from_raw(it) });
}

/// Advances a cursor. A null map iterates zero times.
///
/// # Safety
///
/// - `m` must be null or point at a live map; `it` must point at a live
///   cursor only ever advanced over that map.
/// - `out_key` / `out_value` must satisfy [`MapIter::next`]'s contract.
pub unsafe fn map_next(
    m: *const ByteMap,
    it: *mut MapIter,
    out_key: *mut u8,
    out_value: *mut u8,
) -> bool {
    if m.is_null() {
        return false;
    }
    // SAFETY: forwarded caller contract.
    unsafe { (*it).next(&*m, out_key, out_value) }
}

/// [`map_set`] for a Binary-discipline map, hashing with the map's seed.
///
/// # Safety
///
/// As [`map_set`], for a map built with [`Algorithm::Binary`].
pub unsafe fn map_binary_set(m: *mut ByteMap, key: *const u8, value: *const u8) {
    if m.is_null() {
        panic!("{}", NIL_MAP_WRITE);
    }
    // SAFETY: forwarded caller contract.
    unsafe {
        let hash = (*m).hash_key(key);
        (*m).set(key, value, hash);
    }
}

/// [`map_get`] for a Binary-discipline map, hashing with the map's seed.
///
/// # Safety
///
/// As [`map_get`], for a map built with [`Algorithm::Binary`].
pub unsafe fn map_binary_get(
    m: *const ByteMap,
    key: *const u8,
    out_value: *mut u8,
    value_size: usize,
) -> bool {
    if m.is_null() {
        // SAFETY: the caller vouches for `out_value` and `value_size`.
        unsafe { ptr::write_bytes(out_value, 0, value_size) };
        return false;
    }
    // SAFETY: forwarded caller contract.
    unsafe {
        let hash = (*m).hash_key(key);
        (*m).get(key, out_value, hash)
    }
}

/// [`map_delete`] for a Binary-discipline map, hashing with the map's seed.
///
/// # Safety
///
/// As [`map_delete`], for a map built with [`Algorithm::Binary`].
pub unsafe fn map_binary_delete(m: *mut ByteMap, key: *const u8) {
    if m.is_null() {
        return;
    }
    // SAFETY: forwarded caller contract.
    unsafe {
        let hash = (*m).hash_key(key);
        (*m).delete(key, hash);
    }
}

/// [`map_set`] for a String-discipline map.
///
/// The map stores a [`StrRef`] header describing `key`'s bytes, not the
/// bytes themselves.
///
/// # Safety
///
/// - `m` must be null or point at a live String-discipline map with no
///   outstanding borrows; `value` must satisfy [`ByteMap::set`]'s contract.
/// - `key`'s bytes must stay live and unmoved for as long as the map may
///   hold the entry.
pub unsafe fn map_string_set(m: *mut ByteMap, key: &str, value: *const u8) {
    if m.is_null() {
        panic!("{}", NIL_MAP_WRITE);
    }
    let cell = StrRef::new(key);
    let cell = &cell as *const StrRef as *const u8;
    // SAFETY: `cell` is a live StrRef naming `key`'s live bytes.
    unsafe {
        let hash = (*m).hash_key(cell);
        (*m).set(cell, value, hash);
    }
}

/// [`map_get`] for a String-discipline map.
///
/// # Safety
///
/// As [`map_get`], for a map built with [`Algorithm::String`].
pub unsafe fn map_string_get(
    m: *const ByteMap,
    key: &str,
    out_value: *mut u8,
    value_size: usize,
) -> bool {
    if m.is_null() {
        // SAFETY: the caller vouches for `out_value` and `value_size`.
        unsafe { ptr::write_bytes(out_value, 0, value_size) };
        return false;
    }
    let cell = StrRef::new(key);
    let cell = &cell as *const StrRef as *const u8;
    // SAFETY: `cell` is a live StrRef naming `key`'s live bytes.
    unsafe {
        let hash = (*m).hash_key(cell);
        (*m).get(cell, out_value, hash)
    }
}

/// [`map_delete`] for a String-discipline map.
///
/// # Safety
///
/// As [`map_delete`], for a map built with [`Algorithm::String`].
pub unsafe fn map_string_delete(m: *mut ByteMap, key: &str) {
    if m.is_null() {
        return;
    }
    let cell = StrRef::new(key);
    let cell = &cell as *const StrRef as *const u8;
    // SAFETY: `cell` is a live StrRef naming `key`'s live bytes.
    unsafe {
        let hash = (*m).hash_key(cell);
        (*m).delete(cell, hash);
    }
}

/// [`map_set`] for a Dynamic-discipline map.
///
/// The map stores `key` — the pointer itself — as the key cell; null is the
/// nil dynamic value.
///
/// # Safety
///
/// - `m` must be null or point at a live Dynamic-discipline map with no
///   outstanding borrows; `value` must satisfy [`ByteMap::set`]'s contract.
/// - `key` must be null or point at a [`Dyn`] that stays live for as long
///   as the map may hold the entry.
///
/// # Panics
///
/// Panics if `key`'s kind has no equality.
pub unsafe fn map_dyn_set(m: *mut ByteMap, key: *const Dyn, value: *const u8) {
    if m.is_null() {
        panic!("{}", NIL_MAP_WRITE);
    }
    let cell = &key as *const *const Dyn as *const u8;
    // SAFETY: `cell` is a live pointer cell per the caller's contract.
    unsafe {
        let hash = (*m).hash_key(cell);
        (*m).set(cell, value, hash);
    }
}

/// [`map_get`] for a Dynamic-discipline map.
///
/// # Safety
///
/// As [`map_get`], for a map built with [`Algorithm::Dynamic`]; `key` must
/// be null or point at a live [`Dyn`].
pub unsafe fn map_dyn_get(
    m: *const ByteMap,
    key: *const Dyn,
    out_value: *mut u8,
    value_size: usize,
) -> bool {
    if m.is_null() {
        // SAFETY: the caller vouches for `out_value` and `value_size`.
        unsafe { ptr::write_bytes(out_value, 0, value_size) };
        return false;
    }
    let cell = &key as *const *const Dyn as *const u8;
    // SAFETY: `cell` is a live pointer cell per the caller's contract.
    unsafe {
        let hash = (*m).hash_key(cell);
        (*m).get(cell, out_value, hash)
    }
}

/// [`map_delete`] for a Dynamic-discipline map.
///
/// # Safety
///
/// As [`map_delete`], for a map built with [`Algorithm::Dynamic`]; `key`
/// must be null or point at a live [`Dyn`].
pub unsafe fn map_dyn_delete(m: *mut ByteMap, key: *const Dyn) {
    if m.is_null() {
        return;
    }
    let cell = &key as *const *const Dyn as *const u8;
    // SAFETY: `cell` is a live pointer cell per the caller's contract.
    unsafe {
        let hash = (*m).hash_key(cell);
        (*m).delete(cell, hash);
    }
}
