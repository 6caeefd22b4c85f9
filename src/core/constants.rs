//! Fixed layout constants for the page format and backup stream.
//!
//! These values mirror a relation engine whose on-disk page is a fixed-size
//! block with a small binary header (`PageHeaderData`-equivalent) and whose
//! backup stream frames a `BackupPageHeader`-equivalent record per block.

// ── Page layout ─────────────────────────────────────────────────────

/// Canonical page size in bytes.
pub const BLOCK_SIZE: usize = 8192;

/// Byte length of the page header described in [`crate::core::page`].
pub const HEADER_SIZE: usize = 24;

/// Fundamental alignment used to pad compressed frame payloads.
pub const MAXALIGN_OF: usize = 8;

/// Legal bits for `PageHeader::flags`; any other bit set is a header error.
pub const VALID_FLAGS: u16 = 0x0003;

/// `pagesize_version` field: low bits carry the page size, a fixed shift
/// carries a layout version tag the core does not otherwise interpret.
pub const PAGE_SIZE_MASK: u32 = 0x00FF_FFFF;

// ── PageHeader field offsets (within the first HEADER_SIZE bytes) ───

/// Offset of the 16-bit stored checksum.
pub const PD_CHECKSUM: usize = 0;
/// Offset of the 16-bit flags field.
pub const PD_FLAGS: usize = 2;
/// Offset of the 16-bit `lower` free-space boundary.
pub const PD_LOWER: usize = 4;
/// Offset of the 16-bit `upper` free-space boundary.
pub const PD_UPPER: usize = 6;
/// Offset of the 16-bit `special` area boundary.
pub const PD_SPECIAL: usize = 8;
/// Offset of the 32-bit pagesize/version field.
pub const PD_PAGESIZE_VERSION: usize = 10;
/// Offset of the 64-bit log sequence number.
pub const PD_LSN: usize = 14;

// ── Torn-read tolerance ─────────────────────────────────────────────

/// Maximum attempts `PageReader` makes to obtain a structurally valid page
/// before treating the block as corrupted.
pub const PAGE_READ_ATTEMPTS: u32 = 100;

// ── Backup stream framing ───────────────────────────────────────────

/// Legacy sentinel `compressed_size` meaning "truncate output here and stop".
pub const TRUNCATED_MARKER: i32 = -1;

/// `FileRecord::write_size` sentinel: reuse the parent backup's copy.
pub const BYTES_INVALID: i64 = -1;

/// `FileRecord::write_size` sentinel: the source file vanished during backup.
pub const FILE_NOT_FOUND: i64 = -2;

/// Rounds `n` up to the next multiple of [`MAXALIGN_OF`].
pub const fn maxalign(n: usize) -> usize {
    (n + MAXALIGN_OF - 1) & !(MAXALIGN_OF - 1)
}

/// Producer-version threshold at and above which the legacy
/// compressed-page-mis-recorded-as-exactly-`BLOCK_SIZE` bug no longer
/// applies. Encoded as `major * 10000 + minor * 100 + patch`.
pub const LEGACY_COMPRESSED_PAGE_CUTOFF: u32 = 20023;

/// Producer-version band that still uses the older rolling-checksum
/// polynomial. Versions in `(CRC_SWITCH_LOW, CRC_SWITCH_HIGH)` are the
/// transitional window that already moved to the newer polynomial.
pub const CRC_SWITCH_LOW: u32 = 20022;
pub const CRC_SWITCH_HIGH: u32 = 20024;
