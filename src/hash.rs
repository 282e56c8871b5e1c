//! Ambient hashing and seeding services.
//!
//! Every map owns a 64-bit seed drawn from [`random_seed`] at construction
//! (and redrawn on every rehash), and funnels all byte hashing through
//! [`byte_hash`]. The hash is non-cryptographic; the per-map seed exists so
//! bucket placement differs between maps and between generations of the same
//! map, not to resist adversarial keys.

use core::hash::BuildHasher;
use core::hash::Hasher;

use foldhash::fast::FixedState;
use rand::TryRngCore;
use rand::rngs::OsRng;

/// Hashes `data` to 32 bits under `seed`.
///
/// Deterministic for a given `(data, seed)` pair. The full 32-bit range is
/// meaningful to callers: the low bits select a bucket and the high byte
/// becomes the slot tag.
#[inline]
pub fn byte_hash(data: &[u8], seed: u64) -> u32 {
    let mut hasher = FixedState::with_seed(seed).build_hasher();
    hasher.write(data);
    hasher.finish() as u32
}

/// Hashes `len` raw bytes starting at `data`.
///
/// # Safety
///
/// `data` must be valid for `len` reads. A dangling (but non-null) pointer is
/// acceptable when `len` is zero.
#[inline]
pub(crate) unsafe fn byte_hash_raw(data: *const u8, len: usize, seed: u64) -> u32 {
    if len == 0 {
        return byte_hash(&[], seed);
    }
    // SAFETY: the caller guarantees `data` is valid for `len` reads.
    byte_hash(unsafe { core::slice::from_raw_parts(data, len) }, seed)
}

/// Draws a fresh map seed from the operating system.
///
/// OS entropy can be absent on bare-metal targets; maps fall back to a fixed
/// word there and still function, just with predictable bucket placement.
pub fn random_seed() -> u64 {
    OsRng.try_next_u64().unwrap_or(0x243f_6a88_85a3_08d3)
}
