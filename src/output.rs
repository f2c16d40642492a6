//! Extendable output: [`OutputReader`] turns a finalized subtree root into an arbitrary-length
//! byte stream.

use crate::platform::words_from_le_bytes_64;
use crate::subtree::Output;
use crate::{BlockWords, CVWords, BLOCK_LEN, OUT_LEN, ROOT};

/// Runs the compression function in "extended" mode: instead of folding the 16-word post-round
/// state down to 8 words, it is doubled into 16 output words by feeding the original chaining
/// value back in. This is what lets BLAKE3 produce output longer than 32 bytes: each 64-byte
/// output block uses the same root node but a different `block_counter`.
///
/// Grounded on the shape of [`crate::const_fn`]'s `ConstOutput::root_hash`, which performs the
/// equivalent fold for a single, fixed 32-byte output (`block_counter` pinned to 0, only the
/// first half of the doubled state kept).
#[inline(always)]
fn compress_xof(cv: &CVWords, block_words: &BlockWords, block_len: u8, block_counter: u64, flags: u8) -> [u8; 64] {
    let mut state =
        crate::portable::compress_pre(cv, block_words, u32::from(block_len), block_counter, u32::from(flags));
    for i in 0..8 {
        state[i] ^= state[i + 8];
        state[i + 8] ^= cv[i];
    }
    let mut out = [0u8; 64];
    for (word, chunk) in state.iter().zip(out.chunks_exact_mut(4)) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    out
}

/// A cursor over a BLAKE3 output stream of unbounded length.
///
/// Every 64-byte block is produced by re-running the root compression with a different block
/// counter (see [`compress_xof`]), so output can be consumed incrementally without first
/// committing to a total length.
#[derive(Debug, Clone)]
pub struct OutputReader {
    output: Output,
    block: [u8; 64],
    block_counter: u64,
    position_within_block: u8,
}

impl OutputReader {
    pub(crate) fn new(output: Output) -> Self {
        Self {
            output,
            block: [0; 64],
            block_counter: 0,
            position_within_block: 64,
        }
    }

    /// Fills `buf` with the next `buf.len()` bytes of output.
    ///
    /// Can be called repeatedly; each call picks up where the last one left off. There is no
    /// upper bound on the total number of bytes that can be read this way short of `u64::MAX *
    /// 64`.
    pub fn fill(&mut self, mut buf: &mut [u8]) {
        let block_words = words_from_le_bytes_64(&self.output.block);
        while !buf.is_empty() {
            if self.position_within_block as usize == self.block.len() {
                self.block = compress_xof(
                    &self.output.input_chaining_value,
                    &block_words,
                    self.output.block_len,
                    self.block_counter,
                    self.output.flags | ROOT,
                );
                self.block_counter += 1;
                self.position_within_block = 0;
            }
            let available = &self.block[self.position_within_block as usize..];
            let take = available.len().min(buf.len());
            let (dst, rest) = buf.split_at_mut(take);
            dst.copy_from_slice(&available[..take]);
            buf = rest;
            self.position_within_block += take as u8;
        }
    }

    /// How many output bytes have been produced by [`OutputReader::fill`] so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        if self.block_counter == 0 {
            0
        } else {
            (self.block_counter - 1) * BLOCK_LEN as u64 + u64::from(self.position_within_block)
        }
    }
}

#[cfg(feature = "std")]
impl std::io::Read for OutputReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.fill(buf);
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_32_bytes_match_the_fixed_length_hash() {
        let input = crate::test_input(5000);
        let expected = crate::hash(&input);

        let mut reader = crate::hasher::Hasher::new().update(&input).finalize_xof();
        let mut extended = [0u8; 32];
        reader.fill(&mut extended);
        assert_eq!(extended, *expected.as_bytes());
    }

    #[test]
    fn output_is_stable_across_incremental_fill_granularity() {
        let input = crate::test_input(200);

        let mut one_shot = crate::hasher::Hasher::new().update(&input).finalize_xof();
        let mut whole = [0u8; 300];
        one_shot.fill(&mut whole);

        let mut piecemeal = crate::hasher::Hasher::new().update(&input).finalize_xof();
        let mut reassembled = [0u8; 300];
        for chunk in reassembled.chunks_mut(7) {
            piecemeal.fill(chunk);
        }

        assert_eq!(whole, reassembled);
    }
}
