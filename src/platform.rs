//! Endianness conversions and runtime dispatch between the portable and data-parallel compression
//! backends.

use crate::{portable, simd, BlockBytes, BlockWords, CVWords, IncrementCounter};
use core::mem;

/// The widest batch of chunks/parents the data-parallel backend can hash in one call.
///
/// This crate carries its own 4-lane backend (see [`crate::simd`]) rather than deferring
/// multi-lane work to an external dependency, so the degree is 4.
pub(crate) const MAX_SIMD_DEGREE: usize = 4;

// There are some places where we want a static size that's equal to the MAX_SIMD_DEGREE, but also
// at least 2. Constant contexts aren't currently allowed to use cmp::max, so we have to hardcode
// this additional constant value. Get rid of this once cmp::max is a const fn.
pub(crate) const MAX_SIMD_DEGREE_OR_2: usize = if MAX_SIMD_DEGREE < 2 {
    2
} else {
    MAX_SIMD_DEGREE
};

macro_rules! extract_u32_from_byte_chunks {
    ($src:ident, $chunk_index:literal) => {
        u32::from_le_bytes([
            $src[$chunk_index * 4],
            $src[$chunk_index * 4 + 1],
            $src[$chunk_index * 4 + 2],
            $src[$chunk_index * 4 + 3],
        ])
    };
}

/// Converts bytes into `u32` words, the size matches BLAKE3 hash
#[inline(always)]
pub const fn words_from_le_bytes_32(bytes: &[u8; 32]) -> [u32; 8] {
    let mut out = [0; 8];
    out[0] = extract_u32_from_byte_chunks!(bytes, 0);
    out[1] = extract_u32_from_byte_chunks!(bytes, 1);
    out[2] = extract_u32_from_byte_chunks!(bytes, 2);
    out[3] = extract_u32_from_byte_chunks!(bytes, 3);
    out[4] = extract_u32_from_byte_chunks!(bytes, 4);
    out[5] = extract_u32_from_byte_chunks!(bytes, 5);
    out[6] = extract_u32_from_byte_chunks!(bytes, 6);
    out[7] = extract_u32_from_byte_chunks!(bytes, 7);
    out
}

/// Converts bytes into `u32` words, the size matches BLAKE3 block
#[inline(always)]
pub const fn words_from_le_bytes_64(bytes: &BlockBytes) -> BlockWords {
    let mut out = [0; 16];
    out[0] = extract_u32_from_byte_chunks!(bytes, 0);
    out[1] = extract_u32_from_byte_chunks!(bytes, 1);
    out[2] = extract_u32_from_byte_chunks!(bytes, 2);
    out[3] = extract_u32_from_byte_chunks!(bytes, 3);
    out[4] = extract_u32_from_byte_chunks!(bytes, 4);
    out[5] = extract_u32_from_byte_chunks!(bytes, 5);
    out[6] = extract_u32_from_byte_chunks!(bytes, 6);
    out[7] = extract_u32_from_byte_chunks!(bytes, 7);
    out[8] = extract_u32_from_byte_chunks!(bytes, 8);
    out[9] = extract_u32_from_byte_chunks!(bytes, 9);
    out[10] = extract_u32_from_byte_chunks!(bytes, 10);
    out[11] = extract_u32_from_byte_chunks!(bytes, 11);
    out[12] = extract_u32_from_byte_chunks!(bytes, 12);
    out[13] = extract_u32_from_byte_chunks!(bytes, 13);
    out[14] = extract_u32_from_byte_chunks!(bytes, 14);
    out[15] = extract_u32_from_byte_chunks!(bytes, 15);
    out
}

/// Converts `u32` words into bytes, the size matches BLAKE3 hash
#[inline(always)]
pub const fn le_bytes_from_words_32(words: &[u32; 8]) -> &[u8; 32] {
    // SAFETY: All bit patterns are valid, output alignment is smaller (1 byte) than input
    unsafe { mem::transmute::<&[u32; 8], &[u8; 32]>(words) }
}

/// Selects between the portable scalar backend and the 4-lane data-parallel backend.
///
/// There is exactly one non-portable backend in this crate, so "detection" degenerates to a
/// fixed choice: [`Platform::detect`] always hands out [`Platform::Simd4`], since the 4-lane
/// backend is expressed in portable safe Rust (see [`crate::simd`]) and needs no runtime
/// target-feature probing to be safe to run. [`Platform::hash_many`] still falls back to
/// [`Platform::Portable`] internally for any batch remainder smaller than [`MAX_SIMD_DEGREE`]. A
/// multi-backend implementation (AVX2/AVX-512/NEON intrinsics with real runtime CPUID dispatch)
/// would plug into this same seam without changing any caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Platform {
    Portable,
    Simd4,
}

impl Platform {
    #[inline]
    pub(crate) fn detect() -> Self {
        Self::Simd4
    }

    /// Compresses a single block in place, updating `cv`.
    #[inline]
    pub(crate) fn compress_in_place(
        self,
        cv: &mut CVWords,
        block: &BlockBytes,
        block_len: u8,
        counter: u64,
        flags: u8,
    ) {
        let block_words = words_from_le_bytes_64(block);
        portable::compress_in_place(
            cv,
            &block_words,
            u32::from(block_len),
            counter,
            u32::from(flags),
        );
    }

    /// Hashes `inputs.len()` independent `N`-byte inputs, writing one [`crate::OUT_LEN`]-byte CV
    /// per input into `out`.
    ///
    /// Dispatches batches of [`MAX_SIMD_DEGREE`] or more inputs to [`simd`], and hashes any
    /// remainder with [`portable`]. The two backends agree bit-for-bit, so which one runs is an
    /// optimization, never an observable difference (see the scalar/parallel agreement test).
    #[inline]
    pub(crate) fn hash_many<const N: usize>(
        self,
        inputs: &[&[u8; N]],
        key: &CVWords,
        counter: u64,
        increment_counter: IncrementCounter,
        flags: u8,
        flags_start: u8,
        flags_end: u8,
        out: &mut [u8],
    ) {
        match self {
            Self::Portable => portable::hash_many(
                inputs,
                key,
                counter,
                increment_counter,
                flags,
                flags_start,
                flags_end,
                out,
            ),
            Self::Simd4 => simd::hash_many(
                inputs,
                key,
                counter,
                increment_counter,
                flags,
                flags_start,
                flags_end,
                out,
            ),
        }
    }
}
