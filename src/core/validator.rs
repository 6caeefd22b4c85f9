//! Page classification: the pure decision function at the center of both
//! backup (torn-read retry) and restore/validate (corruption detection).

use super::checksum::validate_page_checksum;
use super::constants::{BLOCK_SIZE, PD_CHECKSUM};
use super::page::{is_zeroed, PageHeader};

/// Outcome of validating one page image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStatus {
    /// The page buffer was empty (zero-length read).
    NotFound,
    /// Header is structurally sane but every byte is zero; legal.
    Zeroed,
    /// Header, checksum (if enabled), and LSN bound all pass.
    Valid,
    /// A header invariant failed; carries the diagnostic message.
    HeaderInvalid(String),
    /// Header passed but the stored checksum did not match; carries the
    /// diagnostic message with computed and stored values.
    ChecksumMismatch(String),
    /// Header and checksum passed, but the page's LSN is newer than the
    /// caller-supplied `stop_lsn`.
    LsnFromFuture,
}

/// Result of [`validate_page`]: the classification plus the LSN extracted
/// from the header, when a header could be parsed at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub status: PageStatus,
    pub lsn: Option<u64>,
}

/// Classifies `page` per §4.2. `page` shorter than `BLOCK_SIZE` is treated
/// as [`PageStatus::NotFound`] (a zero-length read at EOF).
pub fn validate_page(page: &[u8], stop_lsn: u64, checksums_enabled: bool) -> Validation {
    if page.is_empty() {
        return Validation {
            status: PageStatus::NotFound,
            lsn: None,
        };
    }
    if page.len() < BLOCK_SIZE {
        return Validation {
            status: PageStatus::HeaderInvalid(format!(
                "short read: got {} bytes, expected {}",
                page.len(),
                BLOCK_SIZE
            )),
            lsn: None,
        };
    }

    let header = match PageHeader::parse(page) {
        Some(h) => h,
        None => {
            return Validation {
                status: PageStatus::HeaderInvalid("page shorter than header".into()),
                lsn: None,
            }
        }
    };

    if let Err(invariant) = header.check_invariants() {
        if is_zeroed(page) {
            return Validation {
                status: PageStatus::Zeroed,
                lsn: Some(0),
            };
        }
        return Validation {
            status: PageStatus::HeaderInvalid(invariant.to_string()),
            lsn: Some(header.lsn),
        };
    }

    if checksums_enabled && !validate_page_checksum(page, header.checksum) {
        let computed = super::checksum::compute_page_checksum(page);
        return Validation {
            status: PageStatus::ChecksumMismatch(format!(
                "checksum mismatch: computed {:#06x} at offset {}, stored {:#06x}",
                computed, PD_CHECKSUM, header.checksum
            )),
            lsn: Some(header.lsn),
        };
    }

    if stop_lsn > 0 && header.lsn > stop_lsn {
        return Validation {
            status: PageStatus::LsnFromFuture,
            lsn: Some(header.lsn),
        };
    }

    Validation {
        status: PageStatus::Valid,
        lsn: Some(header.lsn),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::checksum::compute_page_checksum;

    fn valid_page(lsn: u64) -> [u8; BLOCK_SIZE] {
        let mut page = [0u8; BLOCK_SIZE];
        let mut header = PageHeader {
            checksum: 0,
            flags: 0,
            lower: super::super::constants::HEADER_SIZE as u16,
            upper: BLOCK_SIZE as u16,
            special: BLOCK_SIZE as u16,
            pagesize_version: BLOCK_SIZE as u32,
            lsn,
        };
        header.write_into(&mut page);
        header.checksum = compute_page_checksum(&page);
        header.write_into(&mut page);
        page
    }

    #[test]
    fn empty_read_is_not_found() {
        let v = validate_page(&[], 0, true);
        assert_eq!(v.status, PageStatus::NotFound);
    }

    #[test]
    fn all_zero_page_is_zeroed() {
        let page = [0u8; BLOCK_SIZE];
        let v = validate_page(&page, 0, true);
        assert_eq!(v.status, PageStatus::Zeroed);
    }

    #[test]
    fn well_formed_page_is_valid() {
        let page = valid_page(0x100);
        let v = validate_page(&page, 0, true);
        assert_eq!(v.status, PageStatus::Valid);
        assert_eq!(v.lsn, Some(0x100));
    }

    #[test]
    fn checksum_mismatch_detected() {
        let mut page = valid_page(0x100);
        page[super::super::constants::PD_CHECKSUM] ^= 0xFF;
        let v = validate_page(&page, 0, true);
        assert!(matches!(v.status, PageStatus::ChecksumMismatch(_)));
    }

    #[test]
    fn future_lsn_detected() {
        let page = valid_page(0x200);
        let v = validate_page(&page, 0x100, true);
        assert_eq!(v.status, PageStatus::LsnFromFuture);
    }

    #[test]
    fn checksums_disabled_skips_mismatch() {
        let mut page = valid_page(0x100);
        page[super::super::constants::PD_CHECKSUM] ^= 0xFF;
        let v = validate_page(&page, 0, false);
        assert_eq!(v.status, PageStatus::Valid);
    }
}
