//! The incremental [`Hasher`].
//!
//! BLAKE3's tree shape (every left subtree is a complete, full power-of-two-chunk tree at least as
//! large as its sibling) is exactly the shape of a Merkle Mountain Range over 1024-byte chunks.
//! This `Hasher` is grounded on that equivalence: completed chunks are folded onto a stack using
//! the same trailing-zero/trailing-one bit trick an unbalanced-Merkle-tree root computation would
//! use to bag MMR peaks, substituting a BLAKE3 parent-node compression for a generic pairwise hash.
//! `finalize`/`finalize_xof` fold the stack down to a single root [`subtree::Output`] without
//! needing to know in advance whether more input is coming.

use crate::output::OutputReader;
use crate::platform::{words_from_le_bytes_32, Platform, MAX_SIMD_DEGREE};
use crate::subtree::{self, ChunkState};
use crate::{
    Blake3Error, CVBytes, CVWords, Hash, IncrementCounter, BLOCK_LEN, CHUNK_END, CHUNK_LEN,
    CHUNK_START, DERIVE_KEY_CONTEXT, DERIVE_KEY_MATERIAL, IV, KEYED_HASH, KEY_LEN, OUT_LEN, PARENT,
};
use core::mem::MaybeUninit;
use core::slice;

/// An upper bound on how many subtree roots can be live on [`Hasher`]'s stack at once.
///
/// BLAKE3 chunks are 1024 bytes, so a 64-bit input length spans at most `64 - 10 = 54` tree
/// levels; the stack never needs to hold more than one root per level.
const MAX_STACK_DEPTH: usize = 54;

/// An incremental BLAKE3 hasher.
///
/// Unlike [`crate::hash`] and friends, which hash a complete input with wide-subtree batching and
/// (optionally) `rayon` fan-out in one call, `Hasher` accepts input in arbitrarily many [`update`]
/// calls and can be [`reset`] and reused. Internally it still batches up to
/// [`crate::platform::MAX_SIMD_DEGREE`] complete, chunk-aligned chunks per `update()` call onto the
/// data-parallel backend before folding each chunk's chaining value onto the stack one at a time,
/// so large buffered writes are not meaningfully slower than the one-shot path.
///
/// [`update`]: Hasher::update
/// [`reset`]: Hasher::reset
#[derive(Debug, Clone)]
pub struct Hasher {
    key: CVWords,
    chunk_state: ChunkState,
    cv_stack: [CVBytes; MAX_STACK_DEPTH],
    cv_stack_len: u8,
    flags: u8,
    platform: Platform,
}

impl Hasher {
    fn new_internal(key: CVWords, flags: u8) -> Self {
        let platform = Platform::detect();
        tracing::trace!(flags, "constructing Hasher");
        Self {
            key,
            chunk_state: ChunkState::new(&key, 0, flags, platform),
            cv_stack: [[0; OUT_LEN]; MAX_STACK_DEPTH],
            cv_stack_len: 0,
            flags,
            platform,
        }
    }

    /// The default hasher, with no key and no key-derivation context.
    #[must_use]
    pub fn new() -> Self {
        Self::new_internal(*IV, 0)
    }

    /// A hasher suitable for use as a message authentication code, keyed with exactly
    /// [`KEY_LEN`] bytes. See also [`crate::keyed_hash`].
    #[must_use]
    pub fn new_keyed(key: &[u8; KEY_LEN]) -> Self {
        Self::new_internal(words_from_le_bytes_32(key), KEYED_HASH)
    }

    /// Like [`Hasher::new_keyed`], but for a key whose length is only known at runtime.
    ///
    /// # Errors
    /// Returns [`Blake3Error::InvalidKeyLength`] if `key` is not exactly [`KEY_LEN`] bytes.
    pub fn new_keyed_from_slice(key: &[u8]) -> Result<Self, Blake3Error> {
        let key: &[u8; KEY_LEN] = key
            .try_into()
            .map_err(|_| Blake3Error::InvalidKeyLength { actual: key.len() })?;
        Ok(Self::new_keyed(key))
    }

    /// A hasher for key derivation, given a hardcoded, globally unique, application-specific
    /// context string. See also [`crate::derive_key`].
    #[must_use]
    pub fn new_derive_key(context: &str) -> Self {
        let context_key =
            subtree::hash_all_at_once(context.as_bytes(), IV, DERIVE_KEY_CONTEXT).root_hash();
        let context_key_words = words_from_le_bytes_32(&context_key);
        Self::new_internal(context_key_words, DERIVE_KEY_MATERIAL)
    }

    /// The total number of bytes fed into this hasher so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.chunk_state.chunk_counter() * CHUNK_LEN as u64 + self.chunk_state.len() as u64
    }

    /// Pushes a newly completed chunk's chaining value onto the stack, merging it with however
    /// many already-complete sibling subtrees it closes out.
    ///
    /// `total_chunks` is the number of chunks hashed so far, counting this one. The number of
    /// trailing zero bits in `total_chunks` is the number of merges to perform: the standard
    /// trick for bagging Merkle Mountain Range peaks as they complete.
    fn add_chunk_chaining_value(&mut self, mut new_cv: CVBytes, mut total_chunks: u64) {
        while total_chunks & 1 == 0 {
            new_cv = self.parent_cv(self.pop_stack(), new_cv);
            total_chunks >>= 1;
        }
        self.push_stack(new_cv);
    }

    fn push_stack(&mut self, cv: CVBytes) {
        self.cv_stack[self.cv_stack_len as usize] = cv;
        self.cv_stack_len += 1;
    }

    fn pop_stack(&mut self) -> CVBytes {
        self.cv_stack_len -= 1;
        self.cv_stack[self.cv_stack_len as usize]
    }

    fn parent_cv(&self, left_cv: CVBytes, right_cv: CVBytes) -> CVBytes {
        Self::parent_output(left_cv, right_cv, &self.key, self.flags)
            .chaining_value(self.platform)
    }

    fn parent_output(
        left_cv: CVBytes,
        right_cv: CVBytes,
        key: &CVWords,
        flags: u8,
    ) -> subtree::Output {
        let mut block = [0u8; BLOCK_LEN];
        block[..OUT_LEN].copy_from_slice(&left_cv);
        block[OUT_LEN..].copy_from_slice(&right_cv);
        subtree::Output {
            input_chaining_value: *key,
            block,
            block_len: BLOCK_LEN as u8,
            counter: 0,
            flags: flags | PARENT,
        }
    }

    fn finish_chunk(&mut self) {
        let chunk_cv = self.chunk_state.output().chaining_value(self.platform);
        let total_chunks = self.chunk_state.chunk_counter() + 1;
        self.add_chunk_chaining_value(chunk_cv, total_chunks);
        self.chunk_state = ChunkState::new(&self.key, total_chunks, self.flags, self.platform);
    }

    /// Hashes up to [`MAX_SIMD_DEGREE`] complete, chunk-aligned chunks from the front of `input`
    /// through the data-parallel backend, folding each resulting chaining value onto the stack in
    /// order. At least one full chunk is always left behind so the caller never mistakes a
    /// chunk that happens to land on a batch boundary for the final chunk of the whole input.
    fn absorb_full_chunk_batch(&mut self, input: &mut &[u8]) {
        let available_chunks = input.len() / CHUNK_LEN;
        let is_exact = available_chunks * CHUNK_LEN == input.len();
        let num_chunks = if is_exact {
            available_chunks - 1
        } else {
            available_chunks
        }
        .clamp(1, MAX_SIMD_DEGREE);

        tracing::trace!(num_chunks, "hashing a batch of complete chunks");

        let counter_start = self.chunk_state.chunk_counter();
        let mut chunk_refs = [MaybeUninit::<&[u8; CHUNK_LEN]>::uninit(); MAX_SIMD_DEGREE];
        for (i, slot) in chunk_refs.iter_mut().take(num_chunks).enumerate() {
            let chunk: &[u8; CHUNK_LEN] = input[i * CHUNK_LEN..(i + 1) * CHUNK_LEN]
                .try_into()
                .expect("sliced to exactly CHUNK_LEN above");
            slot.write(chunk);
        }
        let mut cvs = [[0u8; OUT_LEN]; MAX_SIMD_DEGREE];
        self.platform.hash_many(
            // SAFETY: exactly `num_chunks` elements of `chunk_refs` were initialized above.
            unsafe {
                slice::from_raw_parts(chunk_refs.as_ptr().cast::<&[u8; CHUNK_LEN]>(), num_chunks)
            },
            &self.key,
            counter_start,
            IncrementCounter::Yes,
            self.flags,
            CHUNK_START,
            CHUNK_END,
            cvs[..num_chunks].as_flattened_mut(),
        );

        for (i, cv) in cvs.iter().take(num_chunks).enumerate() {
            self.add_chunk_chaining_value(*cv, counter_start + i as u64 + 1);
        }

        *input = &input[num_chunks * CHUNK_LEN..];
        self.chunk_state = ChunkState::new(
            &self.key,
            counter_start + num_chunks as u64,
            self.flags,
            self.platform,
        );
    }

    /// Adds input to the hash state. Can be called any number of times.
    pub fn update(&mut self, mut input: &[u8]) -> &mut Self {
        if self.chunk_state.len() > 0 {
            let want = CHUNK_LEN - self.chunk_state.len();
            let take = want.min(input.len());
            self.chunk_state.update(&input[..take]);
            input = &input[take..];
            if input.is_empty() {
                return self;
            }
            self.finish_chunk();
        }

        while input.len() > CHUNK_LEN {
            self.absorb_full_chunk_batch(&mut input);
        }

        self.chunk_state.update(input);
        self
    }

    fn finalize_internal(&self) -> subtree::Output {
        let mut output = self.chunk_state.output();
        let mut parent_nodes_remaining = self.cv_stack_len as usize;
        while parent_nodes_remaining > 0 {
            parent_nodes_remaining -= 1;
            output = Self::parent_output(
                self.cv_stack[parent_nodes_remaining],
                output.chaining_value(self.platform),
                &self.key,
                self.flags,
            );
        }
        output
    }

    /// Finalizes the hash state and returns the 32-byte output.
    ///
    /// This does not modify the hasher: it's possible to keep calling [`Hasher::update`] and get
    /// more output later if needed.
    #[must_use]
    pub fn finalize(&self) -> Hash {
        Hash::from(self.finalize_internal().root_hash())
    }

    /// Finalizes the hash state and returns an [`OutputReader`] for extendable output.
    #[must_use]
    pub fn finalize_xof(&self) -> OutputReader {
        OutputReader::new(self.finalize_internal())
    }

    /// Resets this hasher to its initial empty state, keeping the same key/context.
    pub fn reset(&mut self) -> &mut Self {
        tracing::trace!("resetting Hasher");
        self.chunk_state = ChunkState::new(&self.key, 0, self.flags, self.platform);
        self.cv_stack_len = 0;
        self
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_matches_one_shot_across_chunk_boundaries() {
        let lengths = [0, 1, 63, 64, 65, 1023, 1024, 1025, 3000, 5000, 10000];
        for &len in &lengths {
            let input = crate::test_input(len);
            let expected = crate::hash(&input);

            let mut hasher = Hasher::new();
            hasher.update(&input);
            assert_eq!(hasher.finalize(), expected, "one big update, len={len}");

            let mut hasher = Hasher::new();
            for byte in &input {
                hasher.update(core::slice::from_ref(byte));
            }
            assert_eq!(hasher.finalize(), expected, "byte at a time, len={len}");

            let mut hasher = Hasher::new();
            for chunk in input.chunks(513) {
                hasher.update(chunk);
            }
            assert_eq!(hasher.finalize(), expected, "513-byte chunks, len={len}");
        }
    }

    #[test]
    fn reset_returns_to_the_empty_state() {
        let mut hasher = Hasher::new();
        hasher.update(&crate::test_input(5000));
        hasher.reset();
        assert_eq!(hasher.finalize(), crate::hash(b""));
        assert_eq!(hasher.count(), 0);
    }

    #[test]
    fn keyed_and_derive_key_agree_with_one_shot() {
        let key = [7u8; KEY_LEN];
        let input = crate::test_input(4096);

        let mut hasher = Hasher::new_keyed(&key);
        hasher.update(&input);
        assert_eq!(hasher.finalize(), crate::keyed_hash(&key, &input));

        let context = "b3rs 2026 example context";
        let mut hasher = Hasher::new_derive_key(context);
        hasher.update(&input);
        assert_eq!(
            hasher.finalize().as_bytes(),
            &crate::derive_key(context.as_bytes(), &input)
        );
    }

    #[test]
    fn invalid_key_length_is_reported() {
        assert!(matches!(
            Hasher::new_keyed_from_slice(&[0u8; 31]),
            Err(Blake3Error::InvalidKeyLength { actual: 31 })
        ));
    }

    #[test]
    fn clone_is_independent_of_the_original() {
        let mut h = Hasher::new();
        h.update(&crate::test_input(2000));

        let mut g = h.clone();
        g.update(&crate::test_input(500));

        assert_ne!(g.finalize(), h.finalize());
        h.update(&crate::test_input(500));
        assert_eq!(g.finalize(), h.finalize());
    }

    #[test]
    fn extended_output_is_consistent_with_shorter_prefixes() {
        let input = crate::test_input(7000);
        let mut reader = Hasher::new().update(&input).finalize_xof();
        let mut long = [0u8; 300];
        reader.fill(&mut long);

        for &n in &[0usize, 1, 31, 32, 33, 63, 64, 65, 299, 300] {
            let mut reader = Hasher::new().update(&input).finalize_xof();
            let mut short = alloc::vec![0u8; n];
            reader.fill(&mut short);
            assert_eq!(short, long[..n], "n={n}");
        }
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(64))]

        /// Arbitrary partitions of the same input, including ones that split chunk, block, and
        /// subtree boundaries, must all finalize to the same digest (§8 incremental equivalence).
        #[test]
        fn incremental_equivalence_holds_for_arbitrary_partitions(
            input in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..6000),
            cut_points in proptest::collection::vec(0usize..6000, 0..8),
        ) {
            let expected = crate::hash(&input);

            let mut cuts: alloc::vec::Vec<usize> = cut_points
                .into_iter()
                .map(|c| c.min(input.len()))
                .collect();
            cuts.sort_unstable();
            cuts.push(input.len());

            let mut hasher = Hasher::new();
            let mut start = 0;
            for cut in cuts {
                hasher.update(&input[start..cut]);
                start = cut;
            }
            proptest::prop_assert_eq!(hasher.finalize(), expected);
        }

        /// Any prefix of a longer extendable-output run equals the output of asking for that
        /// prefix length directly (§8 output-length extensibility).
        #[test]
        fn output_length_extensibility_holds(
            input in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..2000),
            short_len in 0usize..200,
            extra in 0usize..200,
        ) {
            let long_len = short_len + extra;
            let mut long_reader = Hasher::new().update(&input).finalize_xof();
            let mut long = alloc::vec![0u8; long_len];
            long_reader.fill(&mut long);

            let mut short_reader = Hasher::new().update(&input).finalize_xof();
            let mut short = alloc::vec![0u8; short_len];
            short_reader.fill(&mut short);

            proptest::prop_assert_eq!(&short[..], &long[..short_len]);
        }
    }
}
