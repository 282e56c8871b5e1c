//! Bucket layout and the arena that owns bucket storage.
//!
//! A bucket is a fixed row of [`SLOTS`] entries: a header carrying one tag
//! byte per slot plus the overflow link, then the eight key cells packed
//! back-to-back, then the eight value cells. Packing keys and values in
//! separate runs keeps both regions naturally aligned even when the cell
//! sizes differ from the word size, and because each run is eight cells wide
//! every row stride is a multiple of eight bytes, so successive rows preserve
//! the header's alignment without padding.
//!
//! All rows of one map generation live in a single zeroed allocation owned by
//! [`BucketArray`]. Overflow rows are allocated one at a time with the same
//! stride and linked through the header's `next` pointer; they are reclaimed
//! by walking the chains when the arena drops. Nothing frees an individual
//! bucket earlier than its arena.

use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
use core::mem;
use core::ptr::NonNull;

/// Slots per bucket.
pub(crate) const SLOTS: usize = 8;

/// Fixed-size prefix of every bucket row.
#[repr(C)]
pub(crate) struct BucketHeader {
    /// One tag byte per slot; zero marks the slot empty.
    pub tophash: [u8; SLOTS],
    /// Next bucket in this chain, or null.
    pub next: *mut u8,
}

/// Byte size of one bucket row for the given cell sizes.
pub(crate) fn bucket_stride(key_size: usize, value_size: usize) -> usize {
    let cells = SLOTS
        .checked_mul(key_size)
        .and_then(|keys| SLOTS.checked_mul(value_size).and_then(|vals| keys.checked_add(vals)))
        .expect("allocation size overflow");
    mem::size_of::<BucketHeader>()
        .checked_add(cells)
        .expect("allocation size overflow")
}

/// Derives the one-byte slot tag from a key hash.
///
/// The tag is the hash's high byte; zero is reserved to mark empty slots, so
/// a hash landing there is nudged to 1. Every other value is a legal tag.
#[inline(always)]
pub(crate) fn tophash(hash: u32) -> u8 {
    let tag = (hash >> 24) as u8;
    if tag < 1 { tag + 1 } else { tag }
}

/// Views a bucket pointer as its header.
#[inline(always)]
pub(crate) fn header(bucket: *mut u8) -> *mut BucketHeader {
    bucket.cast()
}

/// Address of slot `slot`'s key cell.
///
/// # Safety
///
/// `bucket` must point at a live bucket row allocated for `key_size` keys,
/// and `slot` must be below [`SLOTS`].
#[inline(always)]
pub(crate) unsafe fn slot_key(bucket: *mut u8, key_size: usize, slot: usize) -> *mut u8 {
    debug_assert!(slot < SLOTS);
    // SAFETY: the caller guarantees the row is sized for SLOTS keys, so the
    // offset stays inside the row.
    unsafe { bucket.add(mem::size_of::<BucketHeader>() + key_size * slot) }
}

/// Address of slot `slot`'s value cell.
///
/// # Safety
///
/// `bucket` must point at a live bucket row allocated for `key_size` keys and
/// `value_size` values, and `slot` must be below [`SLOTS`].
#[inline(always)]
pub(crate) unsafe fn slot_value(
    bucket: *mut u8,
    key_size: usize,
    value_size: usize,
    slot: usize,
) -> *mut u8 {
    debug_assert!(slot < SLOTS);
    // SAFETY: the caller guarantees the row is sized for SLOTS keys and
    // SLOTS values, so the offset stays inside the row.
    unsafe { bucket.add(mem::size_of::<BucketHeader>() + key_size * SLOTS + value_size * slot) }
}

/// One generation of bucket storage: the primary row array plus every
/// overflow row that has been chained off it.
///
/// The map holds its arena behind an `Rc` so a cursor can pin the generation
/// it started on while the map moves to a bigger one.
pub(crate) struct BucketArray {
    base: NonNull<u8>,
    layout: Layout,
    stride: usize,
    len: usize,
}

impl BucketArray {
    /// Allocates a zeroed primary array of `1 << bucket_bits` rows.
    pub fn new(bucket_bits: u8, key_size: usize, value_size: usize) -> BucketArray {
        let stride = bucket_stride(key_size, value_size);
        let len = 1usize << bucket_bits;
        let size = stride.checked_mul(len).expect("allocation size overflow");
        let layout = Layout::from_size_align(size, mem::align_of::<BucketHeader>())
            .expect("allocation size overflow");

        // SAFETY: the layout is never zero-sized (a row is at least a
        // header), and a null return is routed to the allocation handler.
        let base = unsafe {
            let raw = alloc::alloc::alloc_zeroed(layout);
            if raw.is_null() {
                handle_alloc_error(layout);
            }
            NonNull::new_unchecked(raw)
        };

        BucketArray {
            base,
            layout,
            stride,
            len,
        }
    }

    /// Number of primary rows.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Pointer to primary row `index`.
    #[inline(always)]
    pub fn bucket(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.len);
        // SAFETY: `index` is a primary-row index, so the offset stays inside
        // the allocation.
        unsafe { self.base.as_ptr().add(self.stride * index) }
    }

    /// Allocates a fresh zeroed overflow row with this arena's geometry.
    ///
    /// The caller links it into a chain; the arena reclaims it by walking
    /// that chain on drop, so an unlinked row would leak.
    pub fn alloc_overflow(&self) -> *mut u8 {
        let layout = self.row_layout();
        // SAFETY: the row layout is never zero-sized, and a null return is
        // routed to the allocation handler.
        unsafe {
            let raw = alloc::alloc::alloc_zeroed(layout);
            if raw.is_null() {
                handle_alloc_error(layout);
            }
            raw
        }
    }

    fn row_layout(&self) -> Layout {
        // Validated once in `new`; a single row is never larger than the
        // primary array that already allocated successfully.
        Layout::from_size_align(self.stride, mem::align_of::<BucketHeader>())
            .expect("allocation size overflow")
    }
}

impl Drop for BucketArray {
    fn drop(&mut self) {
        let row_layout = self.row_layout();
        // SAFETY: every `next` pointer was produced by `alloc_overflow` and
        // linked exactly once, and chains are acyclic, so each overflow row
        // is freed exactly once before the primary allocation goes.
        unsafe {
            for index in 0..self.len {
                let mut row = (*header(self.bucket(index))).next;
                while !row.is_null() {
                    let next = (*header(row)).next;
                    alloc::alloc::dealloc(row, row_layout);
                    row = next;
                }
            }
            alloc::alloc::dealloc(self.base.as_ptr(), self.layout);
        }
    }
}
