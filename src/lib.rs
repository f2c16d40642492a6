//! An independent implementation of BLAKE3: a fixed compression primitive arranged over a binary
//! Merkle tree, producing an extendable-output digest of arbitrary requested length.
//!
//! The public surface is intentionally small: one-shot [`hash`], [`keyed_hash`] and
//! [`derive_key`], an incremental [`Hasher`], and an [`OutputReader`] for consuming extendable
//! output without committing to a length up front. `const fn` equivalents ([`const_hash`] and
//! friends) are available for use in `const` contexts.
//!
//! This crate does not implement hex encoding, a CLI, or WASM bindings; those are a thin layer on
//! top of [`Hash::as_bytes`] that callers are expected to bring themselves.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

mod const_fn;
mod hasher;
mod output;
mod platform;
mod portable;
mod simd;
mod single_block;
mod single_chunk;
mod subtree;

pub use const_fn::{const_derive_key, const_hash, const_keyed_hash};
pub use hasher::Hasher;
pub use output::OutputReader;
pub use platform::{le_bytes_from_words_32, words_from_le_bytes_32, words_from_le_bytes_64};
pub use single_block::{
    single_block_derive_key, single_block_hash, single_block_hash_many_exact,
    single_block_hash_portable_words, single_block_keyed_hash, single_block_keyed_hash_many_exact,
};
pub use single_chunk::{single_chunk_derive_key, single_chunk_hash, single_chunk_keyed_hash};

/// The number of bytes in a hash, 32.
pub const OUT_LEN: usize = 32;
/// The number of bytes in a key, 32.
pub const KEY_LEN: usize = 32;
/// The number of bytes in a block, 64.
pub const BLOCK_LEN: usize = 64;

/// The number of bytes in a chunk, 1024.
///
/// You don't usually need to think about this number, but it often comes up in the cost model,
/// because the maximum degree of parallelism used by the implementation equals the number of
/// chunks.
pub const CHUNK_LEN: usize = 1024;

// While iterating the compression function within a chunk, the CV is represented as words, to
// avoid doing two extra endianness conversions for each compression in the portable
// implementation. But the hash_many interface needs to hash both input bytes and parent nodes, so
// it's better for its output CVs to be represented as bytes.
pub(crate) type CVWords = [u32; 8];
pub(crate) type CVBytes = [u8; 32]; // little-endian
pub(crate) type BlockBytes = [u8; BLOCK_LEN];
pub(crate) type BlockWords = [u32; 16];

pub(crate) const IV: &CVWords = &[
    0x6A09_E667,
    0xBB67_AE85,
    0x3C6E_F372,
    0xA54F_F53A,
    0x510E_527F,
    0x9B05_688C,
    0x1F83_D9AB,
    0x5BE0_CD19,
];

pub(crate) const MSG_SCHEDULE: [[usize; 16]; 7] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [2, 6, 3, 10, 7, 0, 4, 13, 1, 11, 12, 5, 9, 14, 15, 8],
    [3, 4, 10, 12, 13, 2, 7, 14, 6, 5, 9, 0, 11, 15, 8, 1],
    [10, 7, 12, 9, 14, 3, 13, 15, 4, 0, 11, 2, 5, 8, 1, 6],
    [12, 13, 9, 11, 15, 10, 14, 8, 7, 2, 5, 3, 0, 1, 6, 4],
    [9, 14, 11, 5, 8, 12, 15, 1, 13, 3, 0, 10, 2, 6, 4, 7],
    [11, 15, 5, 0, 1, 9, 8, 6, 14, 10, 2, 12, 3, 4, 7, 13],
];

// These are the internal flags that domain-separate root/non-root, chunk/parent, and chunk
// beginning/middle/end. These get set at the high end of the block flags word in the compression
// function, so their values start high and go down.
pub(crate) const CHUNK_START: u8 = 1 << 0;
pub(crate) const CHUNK_END: u8 = 1 << 1;
pub(crate) const PARENT: u8 = 1 << 2;
pub(crate) const ROOT: u8 = 1 << 3;
pub(crate) const KEYED_HASH: u8 = 1 << 4;
pub(crate) const DERIVE_KEY_CONTEXT: u8 = 1 << 5;
pub(crate) const DERIVE_KEY_MATERIAL: u8 = 1 << 6;

/// Whether a batch compression should increment its counter per input, or hold it fixed.
///
/// Chunks within a subtree each get their own counter (their chunk index); parent nodes always
/// compress with counter zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IncrementCounter {
    Yes,
    No,
}

/// A 32-byte BLAKE3 output.
///
/// This is a thin wrapper, not a hex-printable type: formatting a [`Hash`] as a string is outside
/// this crate's scope (see the crate-level docs). Use [`Hash::as_bytes`] and a hex crate of your
/// choice.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash([u8; OUT_LEN]);

impl Hash {
    /// Returns the underlying bytes of the hash.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; OUT_LEN] {
        &self.0
    }
}

impl From<[u8; OUT_LEN]> for Hash {
    #[inline]
    fn from(bytes: [u8; OUT_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<Hash> for [u8; OUT_LEN] {
    #[inline]
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

impl AsRef<[u8]> for Hash {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Debug for Hash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Hash").field(&self.0).finish()
    }
}

/// Errors returned by this crate's fallible constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Blake3Error {
    /// A keyed-hash constructor was given a key that isn't exactly [`KEY_LEN`] bytes.
    #[error("invalid key length: expected {KEY_LEN} bytes, got {actual}")]
    InvalidKeyLength {
        /// The length, in bytes, of the key that was provided.
        actual: usize,
    },
    /// A requested output length exceeded an implementation-imposed maximum.
    ///
    /// This implementation does not impose a maximum (arbitrary-length output is supported), so
    /// this variant is never constructed by a reachable code path; it exists for API stability
    /// with implementations that do cap output length.
    #[error("requested output length {requested} exceeds maximum of {max}")]
    InvalidOutputLength {
        /// The number of bytes that were requested.
        requested: u64,
        /// The maximum number of bytes this implementation permits.
        max: u64,
    },
}

/// The default hash function.
#[inline]
#[must_use]
pub fn hash(input: &[u8]) -> Hash {
    Hash(subtree::hash_all_at_once(input, IV, 0).root_hash())
}

/// The keyed hash function.
///
/// This is suitable for use as a message authentication code. A 32-byte key is required. See also
/// [`Hasher::new_keyed`].
#[inline]
#[must_use]
pub fn keyed_hash(key: &[u8; KEY_LEN], input: &[u8]) -> Hash {
    let key_words = words_from_le_bytes_32(key);
    Hash(subtree::hash_all_at_once(input, &key_words, KEYED_HASH).root_hash())
}

/// The key derivation function.
///
/// Given cryptographic key material of any length and a context string of any length, this
/// deterministically derives a subkey of any length. The context string should be hardcoded,
/// globally unique, and application-specific. See also [`Hasher::new_derive_key`].
#[inline]
#[must_use]
pub fn derive_key(context: &[u8], key_material: &[u8]) -> [u8; OUT_LEN] {
    let context_key = subtree::hash_all_at_once(context, IV, DERIVE_KEY_CONTEXT).root_hash();
    let context_key_words = words_from_le_bytes_32(&context_key);
    subtree::hash_all_at_once(key_material, &context_key_words, DERIVE_KEY_MATERIAL).root_hash()
}

#[cfg(test)]
pub(crate) fn test_input(len: usize) -> alloc::vec::Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_hex(hex: &str) -> [u8; OUT_LEN] {
        let mut out = [0u8; OUT_LEN];
        for (i, byte) in out.iter_mut().enumerate() {
            let hi = hex.as_bytes()[i * 2] as char;
            let lo = hex.as_bytes()[i * 2 + 1] as char;
            *byte = ((hi.to_digit(16).unwrap() << 4) | lo.to_digit(16).unwrap()) as u8;
        }
        out
    }

    #[test]
    fn empty_input_matches_published_digest() {
        assert_eq!(
            hash(b"").as_bytes(),
            &decode_hex("af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262")
        );
    }

    #[test]
    fn one_byte_input_matches_published_digest() {
        assert_eq!(
            hash(&[0u8]).as_bytes(),
            &decode_hex("2d3adedff11b61f14c886e35afa036736dcd87a74d27b5c1510225d0f592e213")
        );
    }
}
