//! Page header parsing and the structural invariants in §3 of the format.

use byteorder::{ByteOrder, LittleEndian};

use super::constants::{
    BLOCK_SIZE, HEADER_SIZE, PD_CHECKSUM, PD_FLAGS, PD_LOWER, PD_LSN, PD_PAGESIZE_VERSION,
    PD_SPECIAL, PD_UPPER, VALID_FLAGS,
};

/// Parsed view of the fixed header present at the front of every page.
///
/// `parse` never fails on a short buffer by returning `Option::None`; the
/// caller (`PageValidator`) decides what a missing header means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub checksum: u16,
    pub flags: u16,
    pub lower: u16,
    pub upper: u16,
    pub special: u16,
    pub pagesize_version: u32,
    pub lsn: u64,
}

impl PageHeader {
    /// Parses the header from the first `HEADER_SIZE` bytes of `page`.
    /// Returns `None` if `page` is shorter than `HEADER_SIZE`.
    pub fn parse(page: &[u8]) -> Option<Self> {
        if page.len() < HEADER_SIZE {
            return None;
        }
        Some(PageHeader {
            checksum: LittleEndian::read_u16(&page[PD_CHECKSUM..]),
            flags: LittleEndian::read_u16(&page[PD_FLAGS..]),
            lower: LittleEndian::read_u16(&page[PD_LOWER..]),
            upper: LittleEndian::read_u16(&page[PD_UPPER..]),
            special: LittleEndian::read_u16(&page[PD_SPECIAL..]),
            pagesize_version: LittleEndian::read_u32(&page[PD_PAGESIZE_VERSION..]),
            lsn: LittleEndian::read_u64(&page[PD_LSN..]),
        })
    }

    /// Writes this header's fields back into the first `HEADER_SIZE` bytes
    /// of `page`. Used by the change-tracker path to stamp a freshly
    /// computed checksum onto a fetched page.
    pub fn write_into(&self, page: &mut [u8]) {
        LittleEndian::write_u16(&mut page[PD_CHECKSUM..], self.checksum);
        LittleEndian::write_u16(&mut page[PD_FLAGS..], self.flags);
        LittleEndian::write_u16(&mut page[PD_LOWER..], self.lower);
        LittleEndian::write_u16(&mut page[PD_UPPER..], self.upper);
        LittleEndian::write_u16(&mut page[PD_SPECIAL..], self.special);
        LittleEndian::write_u32(&mut page[PD_PAGESIZE_VERSION..], self.pagesize_version);
        LittleEndian::write_u64(&mut page[PD_LSN..], self.lsn);
    }

    /// The page size encoded in `pagesize_version`, independent of layout
    /// version bits.
    pub fn encoded_page_size(&self) -> u32 {
        self.pagesize_version & 0x00FF_FFFF
    }

    /// Every structural invariant from §3 in one place. `Err` carries the
    /// specific failing invariant, matching the observable-message contract.
    pub fn check_invariants(&self) -> Result<(), HeaderInvariant> {
        if self.encoded_page_size() as usize != BLOCK_SIZE {
            return Err(HeaderInvariant::WrongPageSize {
                found: self.encoded_page_size(),
            });
        }
        if self.flags & !VALID_FLAGS != 0 {
            return Err(HeaderInvariant::IllegalFlags { flags: self.flags });
        }
        if (self.lower as usize) < HEADER_SIZE {
            return Err(HeaderInvariant::LowerBeforeHeader { lower: self.lower });
        }
        if self.lower > self.upper {
            return Err(HeaderInvariant::LowerAfterUpper {
                lower: self.lower,
                upper: self.upper,
            });
        }
        if self.upper > self.special {
            return Err(HeaderInvariant::UpperAfterSpecial {
                upper: self.upper,
                special: self.special,
            });
        }
        if self.special as usize > BLOCK_SIZE {
            return Err(HeaderInvariant::SpecialPastBlock {
                special: self.special,
            });
        }
        if self.special as usize != super::constants::maxalign(self.special as usize) {
            return Err(HeaderInvariant::SpecialMisaligned {
                special: self.special,
            });
        }
        Ok(())
    }
}

/// Which specific header invariant failed, with enough detail to produce
/// the human-readable message §4.2 requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderInvariant {
    WrongPageSize { found: u32 },
    IllegalFlags { flags: u16 },
    LowerBeforeHeader { lower: u16 },
    LowerAfterUpper { lower: u16, upper: u16 },
    UpperAfterSpecial { upper: u16, special: u16 },
    SpecialPastBlock { special: u16 },
    SpecialMisaligned { special: u16 },
}

impl std::fmt::Display for HeaderInvariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            HeaderInvariant::WrongPageSize { found } => {
                write!(f, "page size mismatch: header encodes {found}, expected {BLOCK_SIZE}")
            }
            HeaderInvariant::IllegalFlags { flags } => {
                write!(f, "illegal flag bits set: {flags:#06x} (valid mask {VALID_FLAGS:#06x})")
            }
            HeaderInvariant::LowerBeforeHeader { lower } => {
                write!(f, "lower ({lower}) is before end of header ({HEADER_SIZE})")
            }
            HeaderInvariant::LowerAfterUpper { lower, upper } => {
                write!(f, "lower ({lower}) is greater than upper ({upper})")
            }
            HeaderInvariant::UpperAfterSpecial { upper, special } => {
                write!(f, "upper ({upper}) is greater than special ({special})")
            }
            HeaderInvariant::SpecialPastBlock { special } => {
                write!(f, "special ({special}) exceeds block size ({BLOCK_SIZE})")
            }
            HeaderInvariant::SpecialMisaligned { special } => {
                write!(f, "special ({special}) is not maxaligned")
            }
        }
    }
}

/// `true` when every byte of `page` is zero.
pub fn is_zeroed(page: &[u8]) -> bool {
    page.iter().all(|&b| b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_valid_page() -> [u8; BLOCK_SIZE] {
        let mut page = [0u8; BLOCK_SIZE];
        let header = PageHeader {
            checksum: 0,
            flags: 0,
            lower: HEADER_SIZE as u16,
            upper: BLOCK_SIZE as u16,
            special: BLOCK_SIZE as u16,
            pagesize_version: BLOCK_SIZE as u32,
            lsn: 0x100,
        };
        header.write_into(&mut page);
        page
    }

    #[test]
    fn parses_header_fields() {
        let page = make_valid_page();
        let header = PageHeader::parse(&page).unwrap();
        assert_eq!(header.lsn, 0x100);
        assert_eq!(header.encoded_page_size() as usize, BLOCK_SIZE);
        assert!(header.check_invariants().is_ok());
    }

    #[test]
    fn short_buffer_yields_none() {
        assert!(PageHeader::parse(&[0u8; 4]).is_none());
    }

    #[test]
    fn zeroed_page_detected() {
        let page = [0u8; BLOCK_SIZE];
        assert!(is_zeroed(&page));
    }

    #[test]
    fn rejects_lower_after_upper() {
        let mut page = make_valid_page();
        let mut header = PageHeader::parse(&page).unwrap();
        header.lower = BLOCK_SIZE as u16;
        header.upper = HEADER_SIZE as u16;
        header.write_into(&mut page);
        let header = PageHeader::parse(&page).unwrap();
        assert!(matches!(
            header.check_invariants(),
            Err(HeaderInvariant::LowerAfterUpper { .. })
        ));
    }

    #[test]
    fn rejects_illegal_flags() {
        let mut page = make_valid_page();
        let mut header = PageHeader::parse(&page).unwrap();
        header.flags = 0xFF00;
        header.write_into(&mut page);
        let header = PageHeader::parse(&page).unwrap();
        assert!(matches!(
            header.check_invariants(),
            Err(HeaderInvariant::IllegalFlags { .. })
        ));
    }
}
