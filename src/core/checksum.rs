//! Per-page checksum computation and validation.
//!
//! The page checksum is internal to this crate: it round-trips (a page
//! written with [`compute_page_checksum`] validates with the same
//! function) but is not claimed to match any particular external engine's
//! bit-exact algorithm. It follows the same fold-based shape the teacher
//! crate uses for its legacy InnoDB checksum (`ut_fold_ulint_pair`), split
//! over the header-excluded body and the header fields excluding the
//! checksum slot itself, then mixed with `crc32c` for a well-distributed
//! final value.

use crc32c::crc32c;

use super::constants::{BLOCK_SIZE, HEADER_SIZE, PD_CHECKSUM};

const UT_HASH_RANDOM_MASK: u32 = 1463735687;
const UT_HASH_RANDOM_MASK2: u32 = 1653893711;

fn ut_fold_ulint_pair(a: u32, b: u32) -> u32 {
    (((a ^ b ^ UT_HASH_RANDOM_MASK)
        .wrapping_mul(UT_HASH_RANDOM_MASK2)
        .wrapping_add(a))
        ^ UT_HASH_RANDOM_MASK2)
        .wrapping_add(b)
}

fn ut_fold_binary(data: &[u8]) -> u32 {
    let mut fold: u32 = 0;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        fold = ut_fold_ulint_pair(fold, word);
    }
    for &b in chunks.remainder() {
        fold = ut_fold_ulint_pair(fold, b as u32);
    }
    fold
}

/// Computes the page checksum over `page`, excluding the 2-byte checksum
/// slot itself. `page` must be exactly `BLOCK_SIZE` bytes.
pub fn compute_page_checksum(page: &[u8]) -> u16 {
    debug_assert_eq!(page.len(), BLOCK_SIZE);
    let header_tail = &page[PD_CHECKSUM + 2..HEADER_SIZE];
    let body = &page[HEADER_SIZE..];
    let folded = ut_fold_binary(header_tail) ^ ut_fold_binary(body);
    let mixed = crc32c(&folded.to_le_bytes());
    (mixed ^ (mixed >> 16)) as u16
}

/// `true` if `page`'s stored checksum (at [`PD_CHECKSUM`]) matches the
/// recomputed value.
pub fn validate_page_checksum(page: &[u8], stored: u16) -> bool {
    compute_page_checksum(page) == stored
}
