//! The runtime wide-subtree driver.
//!
//! This is the non-`const` counterpart of [`crate::const_fn`]: the same recursive binary-tree
//! algorithm, but able to dispatch through [`crate::platform::Platform`] (so batches of chunks or
//! parents can run on the 4-lane backend) and, behind the `rayon` feature, fan its left/right
//! recursion out onto a thread pool. [`crate::hasher::Hasher`] builds its incremental tree-stack
//! on top of [`ChunkState`] and [`compress_subtree_to_parent_node`].

use crate::const_fn::hazmat::left_subtree_len;
use crate::platform::{le_bytes_from_words_32, Platform, MAX_SIMD_DEGREE, MAX_SIMD_DEGREE_OR_2};
use crate::{
    BlockBytes, CHUNK_END, CHUNK_LEN, CHUNK_START, CVBytes, CVWords, IncrementCounter, OUT_LEN,
    PARENT, ROOT, BLOCK_LEN,
};
use core::mem::MaybeUninit;
use core::slice;

/// Below this many chunks, the wide subtree split no longer pays for the thread-hop overhead of
/// `rayon::join`; below it, recursion stays on the calling thread even with the `rayon` feature
/// enabled.
#[cfg(feature = "rayon")]
const RAYON_CHUNKS_THRESHOLD: usize = 2 * MAX_SIMD_DEGREE;

/// The still-unfinalized result of hashing a complete input (or a `DERIVE_KEY_CONTEXT`/
/// `DERIVE_KEY_MATERIAL` half of one): either a single chunk's chaining state, or the top parent
/// node of a multi-chunk tree. Call [`Output::root_hash`] for a fixed 32-byte digest or hand this
/// to [`crate::output::OutputReader`] for extendable output.
#[derive(Debug, Clone)]
pub(crate) struct Output {
    pub(crate) input_chaining_value: CVWords,
    pub(crate) block: BlockBytes,
    pub(crate) block_len: u8,
    pub(crate) counter: u64,
    pub(crate) flags: u8,
}

impl Output {
    pub(crate) fn chaining_value(&self, platform: Platform) -> CVBytes {
        let mut cv = self.input_chaining_value;
        platform.compress_in_place(&mut cv, &self.block, self.block_len, self.counter, self.flags);
        *le_bytes_from_words_32(&cv)
    }

    pub(crate) fn root_hash(&self) -> [u8; OUT_LEN] {
        debug_assert!(self.counter == 0);
        let mut cv = self.input_chaining_value;
        Platform::detect().compress_in_place(
            &mut cv,
            &self.block,
            self.block_len,
            0,
            self.flags | ROOT,
        );
        *le_bytes_from_words_32(&cv)
    }
}

/// The incremental compression state for a single, in-progress chunk (up to [`CHUNK_LEN`] bytes).
///
/// Grounded on `ConstChunkState` in [`crate::const_fn`], generalized off `const fn` so it can
/// dispatch single-block compressions through [`Platform`] and be driven across many `update()`
/// calls from [`crate::hasher::Hasher`] rather than a single whole-input slice.
#[derive(Debug, Clone)]
pub(crate) struct ChunkState {
    cv: CVWords,
    chunk_counter: u64,
    buf: BlockBytes,
    buf_len: u8,
    blocks_compressed: u8,
    flags: u8,
    platform: Platform,
}

impl ChunkState {
    pub(crate) fn new(key: &CVWords, chunk_counter: u64, flags: u8, platform: Platform) -> Self {
        Self {
            cv: *key,
            chunk_counter,
            buf: [0; BLOCK_LEN],
            buf_len: 0,
            blocks_compressed: 0,
            flags,
            platform,
        }
    }

    pub(crate) fn len(&self) -> usize {
        BLOCK_LEN * self.blocks_compressed as usize + self.buf_len as usize
    }

    pub(crate) fn chunk_counter(&self) -> u64 {
        self.chunk_counter
    }

    fn fill_buf(&mut self, input: &mut &[u8]) {
        let want = BLOCK_LEN - self.buf_len as usize;
        let take = want.min(input.len());
        self.buf[self.buf_len as usize..self.buf_len as usize + take]
            .copy_from_slice(&input[..take]);
        self.buf_len += take as u8;
        *input = &input[take..];
    }

    fn start_flag(&self) -> u8 {
        if self.blocks_compressed == 0 {
            CHUNK_START
        } else {
            0
        }
    }

    /// Feeds `input` into this chunk. The caller is responsible for never feeding more than
    /// [`CHUNK_LEN`] total bytes into a single `ChunkState`.
    pub(crate) fn update(&mut self, mut input: &[u8]) -> &mut Self {
        if self.buf_len > 0 {
            self.fill_buf(&mut input);
            if !input.is_empty() {
                debug_assert!(self.buf_len as usize == BLOCK_LEN);
                let block_flags = self.flags | self.start_flag();
                self.platform.compress_in_place(
                    &mut self.cv,
                    &self.buf,
                    BLOCK_LEN as u8,
                    self.chunk_counter,
                    block_flags,
                );
                self.buf_len = 0;
                self.buf = [0; BLOCK_LEN];
                self.blocks_compressed += 1;
            }
        }

        while input.len() > BLOCK_LEN {
            debug_assert!(self.buf_len == 0);
            let block_flags = self.flags | self.start_flag();
            let block: &BlockBytes = input[..BLOCK_LEN].try_into().expect("sliced above");
            self.platform.compress_in_place(
                &mut self.cv,
                block,
                BLOCK_LEN as u8,
                self.chunk_counter,
                block_flags,
            );
            self.blocks_compressed += 1;
            input = &input[BLOCK_LEN..];
        }

        self.fill_buf(&mut input);
        debug_assert!(input.is_empty());
        debug_assert!(self.len() <= CHUNK_LEN);
        self
    }

    pub(crate) fn output(&self) -> Output {
        let block_flags = self.flags | self.start_flag() | CHUNK_END;
        Output {
            input_chaining_value: self.cv,
            block: self.buf,
            block_len: self.buf_len,
            counter: self.chunk_counter,
            flags: block_flags,
        }
    }
}

/// Hashes up to `MAX_SIMD_DEGREE` chunks at once, writing each chunk's chaining value into `out`.
/// Returns the number of chunks hashed. Never called for the root chunk or an empty input.
fn compress_chunks_parallel(
    platform: Platform,
    input: &[u8],
    key: &CVWords,
    chunk_counter: u64,
    flags: u8,
    out: &mut [u8],
) -> usize {
    debug_assert!(!input.is_empty(), "empty chunks below the root");
    debug_assert!(input.len() <= MAX_SIMD_DEGREE * CHUNK_LEN);

    let mut chunks = input;
    let mut chunks_so_far = 0;
    let mut chunks_array = [MaybeUninit::<&[u8; CHUNK_LEN]>::uninit(); MAX_SIMD_DEGREE];
    while let Some(chunk) = chunks.first_chunk::<CHUNK_LEN>() {
        chunks = &chunks[CHUNK_LEN..];
        chunks_array[chunks_so_far].write(chunk);
        chunks_so_far += 1;
    }
    platform.hash_many(
        // SAFETY: exactly `chunks_so_far` elements of `chunks_array` were initialized above.
        unsafe {
            slice::from_raw_parts(
                chunks_array.as_ptr().cast::<&[u8; CHUNK_LEN]>(),
                chunks_so_far,
            )
        },
        key,
        chunk_counter,
        IncrementCounter::Yes,
        flags,
        CHUNK_START,
        CHUNK_END,
        out,
    );

    if !chunks.is_empty() {
        let counter = chunk_counter + chunks_so_far as u64;
        let mut chunk_state = ChunkState::new(key, counter, flags, platform);
        chunk_state.update(chunks);
        let cv = chunk_state.output().chaining_value(platform);
        out[chunks_so_far * OUT_LEN..chunks_so_far * OUT_LEN + OUT_LEN].copy_from_slice(&cv);
        chunks_so_far + 1
    } else {
        chunks_so_far
    }
}

/// Hashes up to `MAX_SIMD_DEGREE` parent nodes at once, writing each parent's chaining value into
/// `out`. Returns the number of parents hashed, plus one more if there was an odd child left over
/// (copied through unchanged, to become an output of the caller).
fn compress_parents_parallel(
    platform: Platform,
    child_chaining_values: &[u8],
    key: &CVWords,
    flags: u8,
    out: &mut [u8],
) -> usize {
    debug_assert!(
        child_chaining_values.len().is_multiple_of(OUT_LEN),
        "wacky hash bytes"
    );
    let num_children = child_chaining_values.len() / OUT_LEN;
    debug_assert!(num_children >= 2, "not enough children");
    debug_assert!(num_children <= 2 * MAX_SIMD_DEGREE_OR_2, "too many");

    let mut parents = child_chaining_values;
    let mut parents_so_far = 0;
    let mut parents_array = [MaybeUninit::<&BlockBytes>::uninit(); MAX_SIMD_DEGREE_OR_2];
    while let Some(parent) = parents.first_chunk::<BLOCK_LEN>() {
        parents = &parents[BLOCK_LEN..];
        parents_array[parents_so_far].write(parent);
        parents_so_far += 1;
    }
    platform.hash_many(
        // SAFETY: exactly `parents_so_far` elements of `parents_array` were initialized above.
        unsafe {
            slice::from_raw_parts(parents_array.as_ptr().cast::<&BlockBytes>(), parents_so_far)
        },
        key,
        0,
        IncrementCounter::No,
        flags | PARENT,
        0,
        0,
        out,
    );

    if !parents.is_empty() {
        out[parents_so_far * OUT_LEN..parents_so_far * OUT_LEN + OUT_LEN]
            .copy_from_slice(parents);
        parents_so_far + 1
    } else {
        parents_so_far
    }
}

/// Recursively hashes `input` into a (possibly wide) list of chaining values, writing them into
/// `out` and returning how many were written. At most `MAX_SIMD_DEGREE` chaining values are
/// returned, except that at least 2 are always returned (so the caller never accidentally
/// performs the root compression here). Not used for inputs of one chunk or less.
pub(crate) fn compress_subtree_wide(
    platform: Platform,
    input: &[u8],
    key: &CVWords,
    chunk_counter: u64,
    flags: u8,
    out: &mut [u8],
) -> usize {
    if input.len() <= CHUNK_LEN {
        return compress_chunks_parallel(platform, input, key, chunk_counter, flags, out);
    }

    let (left, right) = input.split_at(left_subtree_len(input.len() as u64) as usize);
    let right_chunk_counter = chunk_counter + (left.len() / CHUNK_LEN) as u64;

    let mut cv_array = [0u8; 2 * MAX_SIMD_DEGREE_OR_2 * OUT_LEN];
    let degree = if left.len() == CHUNK_LEN { 1 } else { 2 };
    let (left_out, right_out) = cv_array.split_at_mut(degree * OUT_LEN);

    let (left_n, right_n) = recurse_left_and_right(
        platform,
        left,
        right,
        key,
        chunk_counter,
        right_chunk_counter,
        flags,
        left_out,
        right_out,
    );

    debug_assert!(left_n == degree);
    debug_assert!(right_n >= 1 && right_n <= left_n);
    if left_n == 1 {
        out[..2 * OUT_LEN].copy_from_slice(&cv_array[..2 * OUT_LEN]);
        return 2;
    }

    let num_children = left_n + right_n;
    compress_parents_parallel(platform, &cv_array[..num_children * OUT_LEN], key, flags, out)
}

/// Hashes the left and right halves of a split subtree, fanning out onto `rayon::join` when the
/// `rayon` feature is enabled and the left half is wide enough to be worth the thread hop.
fn recurse_left_and_right(
    platform: Platform,
    left: &[u8],
    right: &[u8],
    key: &CVWords,
    chunk_counter: u64,
    right_chunk_counter: u64,
    flags: u8,
    left_out: &mut [u8],
    right_out: &mut [u8],
) -> (usize, usize) {
    #[cfg(feature = "rayon")]
    if left.len() / CHUNK_LEN >= RAYON_CHUNKS_THRESHOLD {
        return rayon::join(
            || compress_subtree_wide(platform, left, key, chunk_counter, flags, left_out),
            || compress_subtree_wide(platform, right, key, right_chunk_counter, flags, right_out),
        );
    }
    let left_n = compress_subtree_wide(platform, left, key, chunk_counter, flags, left_out);
    let right_n =
        compress_subtree_wide(platform, right, key, right_chunk_counter, flags, right_out);
    (left_n, right_n)
}

/// Hashes a subtree wider than one chunk down to the message bytes of its topmost parent node
/// (the concatenated chaining values of its two children), without compressing that parent. The
/// caller decides how to finish: as the root (if this is the whole input) or as one more message
/// block to feed into the rest of the tree (for incremental hashing and extendable output).
pub(crate) fn compress_subtree_to_parent_node(
    platform: Platform,
    input: &[u8],
    key: &CVWords,
    chunk_counter: u64,
    flags: u8,
) -> BlockBytes {
    debug_assert!(input.len() > CHUNK_LEN);
    let mut cv_array = [0u8; MAX_SIMD_DEGREE_OR_2 * OUT_LEN];
    let mut num_cvs =
        compress_subtree_wide(platform, input, key, chunk_counter, flags, &mut cv_array);
    debug_assert!(num_cvs >= 2);

    let mut out_array = [0u8; MAX_SIMD_DEGREE_OR_2 * OUT_LEN / 2];
    while num_cvs > 2 {
        let cv_slice = &cv_array[..num_cvs * OUT_LEN];
        num_cvs = compress_parents_parallel(platform, cv_slice, key, flags, &mut out_array);
        cv_array[..num_cvs * OUT_LEN].copy_from_slice(&out_array[..num_cvs * OUT_LEN]);
    }
    cv_array[..BLOCK_LEN].try_into().expect("cv_array is larger than BLOCK_LEN")
}

/// Hashes a complete input all at once. Handles the one-chunk (or shorter) case directly, unlike
/// [`compress_subtree_wide`] and [`compress_subtree_to_parent_node`].
pub(crate) fn hash_all_at_once(input: &[u8], key: &CVWords, flags: u8) -> Output {
    let platform = Platform::detect();
    if input.len() <= CHUNK_LEN {
        return ChunkState::new(key, 0, flags, platform)
            .update(input)
            .output();
    }

    Output {
        input_chaining_value: *key,
        block: compress_subtree_to_parent_node(platform, input, key, 0, flags),
        block_len: BLOCK_LEN as u8,
        counter: 0,
        flags: flags | PARENT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IV;

    #[test]
    fn agrees_with_const_fn_for_a_range_of_lengths() {
        let mut buf = [0u8; 4 * CHUNK_LEN + 17];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        for &len in &[0, 1, 63, 64, 65, 1023, 1024, 1025, 2048, 2049, buf.len()] {
            let input = &buf[..len];
            let runtime = hash_all_at_once(input, IV, 0).root_hash();
            let constant = crate::const_hash(input);
            assert_eq!(runtime, constant, "len={len}");
        }
    }
}
