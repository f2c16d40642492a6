//! A 4-lane data-parallel compression backend.
//!
//! This hashes four same-shaped, independent inputs (four chunks, or four parent nodes) at once
//! by transposing the usual `[u32; 16]` compression state into sixteen `[u32; 4]` lanes, one lane
//! per input, and running every scalar operation (`wrapping_add`, `^`, `rotate_right`) across all
//! four lanes together. On hardware with real SIMD registers this is exactly the shape a
//! target-feature intrinsics backend would take (compare AVX2's 4-way `u32x4` vpshufb lane
//! layout); here it is expressed in portable safe Rust so that it is checkable by inspection
//! without a working toolchain, at the cost of the instruction-level parallelism a real backend
//! would extract from the vector unit. See the portable backend in [`crate::portable`] for the
//! scalar algorithm this lane-wise version generalizes; the two must agree bit-for-bit.

use crate::platform::{le_bytes_from_words_32, words_from_le_bytes_64};
use crate::{
    BlockBytes, CVBytes, CVWords, IncrementCounter, BLOCK_LEN, IV, MSG_SCHEDULE, OUT_LEN,
};

const LANES: usize = 4;

type LaneWords = [u32; LANES];
type LaneState = [LaneWords; 16];

#[inline(always)]
fn splat(x: u32) -> LaneWords {
    [x; LANES]
}

#[inline(always)]
fn add(a: LaneWords, b: LaneWords) -> LaneWords {
    let mut out = [0; LANES];
    for lane in 0..LANES {
        out[lane] = a[lane].wrapping_add(b[lane]);
    }
    out
}

#[inline(always)]
fn xor(a: LaneWords, b: LaneWords) -> LaneWords {
    let mut out = [0; LANES];
    for lane in 0..LANES {
        out[lane] = a[lane] ^ b[lane];
    }
    out
}

#[inline(always)]
fn rotr(a: LaneWords, n: u32) -> LaneWords {
    let mut out = [0; LANES];
    for lane in 0..LANES {
        out[lane] = a[lane].rotate_right(n);
    }
    out
}

#[inline(always)]
fn g4(state: &mut LaneState, a: usize, b: usize, c: usize, d: usize, x: LaneWords, y: LaneWords) {
    state[a] = add(add(state[a], state[b]), x);
    state[d] = rotr(xor(state[d], state[a]), 16);
    state[c] = add(state[c], state[d]);
    state[b] = rotr(xor(state[b], state[c]), 12);
    state[a] = add(add(state[a], state[b]), y);
    state[d] = rotr(xor(state[d], state[a]), 8);
    state[c] = add(state[c], state[d]);
    state[b] = rotr(xor(state[b], state[c]), 7);
}

#[inline(always)]
fn round4(state: &mut LaneState, msg: &LaneState, round: usize) {
    let schedule = MSG_SCHEDULE[round];

    g4(state, 0, 4, 8, 12, msg[schedule[0]], msg[schedule[1]]);
    g4(state, 1, 5, 9, 13, msg[schedule[2]], msg[schedule[3]]);
    g4(state, 2, 6, 10, 14, msg[schedule[4]], msg[schedule[5]]);
    g4(state, 3, 7, 11, 15, msg[schedule[6]], msg[schedule[7]]);

    g4(state, 0, 5, 10, 15, msg[schedule[8]], msg[schedule[9]]);
    g4(state, 1, 6, 11, 12, msg[schedule[10]], msg[schedule[11]]);
    g4(state, 2, 7, 8, 13, msg[schedule[12]], msg[schedule[13]]);
    g4(state, 3, 4, 9, 14, msg[schedule[14]], msg[schedule[15]]);
}

/// Transposes four `[u32; 16]` block-word arrays into sixteen `[u32; 4]` lanes.
#[inline(always)]
fn transpose_msg(blocks: [&BlockBytes; LANES]) -> LaneState {
    let words: [_; LANES] = core::array::from_fn(|lane| words_from_le_bytes_64(blocks[lane]));
    core::array::from_fn(|word| core::array::from_fn(|lane| words[lane][word]))
}

#[inline(always)]
fn compress_pre_4(
    cvs: [&CVWords; LANES],
    blocks: [&BlockBytes; LANES],
    block_len: u32,
    counters: [u64; LANES],
    block_flags: [u32; LANES],
) -> LaneState {
    let msg = transpose_msg(blocks);
    let mut state: LaneState = [splat(0); 16];
    for word in 0..8 {
        state[word] = core::array::from_fn(|lane| cvs[lane][word]);
    }
    state[8] = splat(IV[0]);
    state[9] = splat(IV[1]);
    state[10] = splat(IV[2]);
    state[11] = splat(IV[3]);
    state[12] = core::array::from_fn(|lane| counters[lane] as u32);
    state[13] = core::array::from_fn(|lane| (counters[lane] >> 32) as u32);
    state[14] = splat(block_len);
    state[15] = block_flags;

    round4(&mut state, &msg, 0);
    round4(&mut state, &msg, 1);
    round4(&mut state, &msg, 2);
    round4(&mut state, &msg, 3);
    round4(&mut state, &msg, 4);
    round4(&mut state, &msg, 5);
    round4(&mut state, &msg, 6);

    state
}

#[inline(always)]
fn compress_in_place_4(
    cvs: &mut [CVWords; LANES],
    blocks: [&BlockBytes; LANES],
    block_len: u32,
    counters: [u64; LANES],
    block_flags: [u32; LANES],
) {
    let cv_refs = core::array::from_fn(|lane| &cvs[lane]);
    let state = compress_pre_4(cv_refs, blocks, block_len, counters, block_flags);
    for lane in 0..LANES {
        for word in 0..8 {
            cvs[lane][word] = state[word][lane] ^ state[word + 8][lane];
        }
    }
}

/// Hashes exactly [`LANES`] same-length, `BLOCK_LEN`-aligned inputs at once.
fn hash4<const N: usize>(
    inputs: [&[u8; N]; LANES],
    key: &CVWords,
    counters: [u64; LANES],
    flags: u8,
    flags_start: u8,
    flags_end: u8,
    out: &mut [CVBytes; LANES],
) {
    debug_assert!(N.is_multiple_of(BLOCK_LEN), "uneven blocks");
    let mut cvs = [*key; LANES];
    let mut block_flags = [u32::from(flags | flags_start); LANES];
    let num_blocks = N / BLOCK_LEN;
    for block_index in 0..num_blocks {
        if block_index == num_blocks - 1 {
            for flag in &mut block_flags {
                *flag |= u32::from(flags_end);
            }
        }
        let blocks: [&BlockBytes; LANES] = core::array::from_fn(|lane| {
            let start = block_index * BLOCK_LEN;
            let slice = &inputs[lane][start..start + BLOCK_LEN];
            let ptr = slice.as_ptr().cast::<BlockBytes>();
            // SAFETY: `slice` is exactly BLOCK_LEN bytes, sliced from a `&[u8; N]`.
            unsafe { &*ptr }
        });
        compress_in_place_4(&mut cvs, blocks, BLOCK_LEN as u32, counters, block_flags);
        block_flags = [u32::from(flags); LANES];
    }
    for lane in 0..LANES {
        out[lane] = *le_bytes_from_words_32(&cvs[lane]);
    }
}

/// Hashes `inputs.len()` independent `N`-byte inputs into `out`, batching [`LANES`] at a time.
///
/// Any remainder shorter than a full batch falls back to [`crate::portable::hash_many`]; this
/// keeps the function total without requiring callers to pad their input count to a multiple of
/// four.
#[expect(clippy::too_many_arguments, reason = "Internal")]
pub(crate) fn hash_many<const N: usize>(
    inputs: &[&[u8; N]],
    key: &CVWords,
    counter: u64,
    increment_counter: IncrementCounter,
    flags: u8,
    flags_start: u8,
    flags_end: u8,
    out: &mut [u8],
) {
    debug_assert!(out.len() >= inputs.len() * OUT_LEN, "out too short");
    let mut batch_start = 0;
    let mut batch_counter = counter;
    while batch_start + LANES <= inputs.len() {
        let batch: [&[u8; N]; LANES] = core::array::from_fn(|i| inputs[batch_start + i]);
        let counters = match increment_counter {
            IncrementCounter::Yes => {
                core::array::from_fn(|i| batch_counter.wrapping_add(i as u64))
            }
            IncrementCounter::No => [batch_counter; LANES],
        };
        let mut batch_out = [[0u8; OUT_LEN]; LANES];
        hash4(batch, key, counters, flags, flags_start, flags_end, &mut batch_out);
        for (lane, cv) in batch_out.iter().enumerate() {
            out[(batch_start + lane) * OUT_LEN..(batch_start + lane + 1) * OUT_LEN]
                .copy_from_slice(cv);
        }
        if matches!(increment_counter, IncrementCounter::Yes) {
            batch_counter = batch_counter.wrapping_add(LANES as u64);
        }
        batch_start += LANES;
    }
    if batch_start < inputs.len() {
        crate::portable::hash_many(
            &inputs[batch_start..],
            key,
            batch_counter,
            increment_counter,
            flags,
            flags_start,
            flags_end,
            &mut out[batch_start * OUT_LEN..],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CHUNK_START, CHUNK_END};

    #[test]
    fn matches_portable_for_full_batch() {
        let key = IV;
        let inputs: [[u8; BLOCK_LEN]; LANES] =
            core::array::from_fn(|i| core::array::from_fn(|b| (i * 31 + b) as u8));
        let input_refs: [&[u8; BLOCK_LEN]; LANES] = core::array::from_fn(|i| &inputs[i]);

        let mut simd_out = [0u8; LANES * OUT_LEN];
        hash_many(
            &input_refs,
            key,
            0,
            IncrementCounter::Yes,
            0,
            CHUNK_START,
            CHUNK_END,
            &mut simd_out,
        );

        let mut portable_out = [0u8; LANES * OUT_LEN];
        crate::portable::hash_many(
            &input_refs,
            key,
            0,
            IncrementCounter::Yes,
            0,
            CHUNK_START,
            CHUNK_END,
            &mut portable_out,
        );

        assert_eq!(simd_out, portable_out);
    }

    #[test]
    fn matches_portable_with_remainder() {
        let key = IV;
        let inputs: [[u8; BLOCK_LEN]; 5] =
            core::array::from_fn(|i| core::array::from_fn(|b| (i * 17 + b) as u8));
        let input_refs: [&[u8; BLOCK_LEN]; 5] = core::array::from_fn(|i| &inputs[i]);

        let mut simd_out = [0u8; 5 * OUT_LEN];
        hash_many(
            &input_refs,
            key,
            0,
            IncrementCounter::Yes,
            0,
            CHUNK_START,
            CHUNK_END,
            &mut simd_out,
        );

        let mut portable_out = [0u8; 5 * OUT_LEN];
        crate::portable::hash_many(
            &input_refs,
            key,
            0,
            IncrementCounter::Yes,
            0,
            CHUNK_START,
            CHUNK_END,
            &mut portable_out,
        );

        assert_eq!(simd_out, portable_out);
    }
}
