//! `PageReader`: bounded-retry block reads under a possibly-live writer
//! (§4.3), plus the `PTRACK` live-buffer substitution path.

use std::io::{Read, Seek, SeekFrom};

use log::{debug, trace, warn};

use crate::error::{CoreError, Result};

use super::cancel::CancelToken;
use super::change_tracker::{BlockRef, ChangeTracker};
use super::checksum::compute_page_checksum;
use super::constants::{BLOCK_SIZE, PAGE_READ_ATTEMPTS};
use super::page::PageHeader;
use super::validator::{validate_page, PageStatus};

/// Which incremental strategy selects blocks for this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupMode {
    Full,
    Delta,
    Page,
    Ptrack,
}

/// Outcome of attempting to read one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadState {
    /// `buf` holds a usable page (possibly all-zero).
    Ok,
    /// The source file ended before this block; stop iterating.
    Truncated,
    /// DELTA mode determined this block predates the parent backup.
    Skip,
    /// Retries were exhausted (strict mode raises instead of returning
    /// this; non-strict mode returns it).
    Corrupted,
}

/// Parameters that do not vary block-to-block within one file pass.
pub struct ReadOptions<'a> {
    pub mode: BackupMode,
    pub strict: bool,
    pub prev_start_lsn: u64,
    pub file_exists_in_prev: bool,
    pub checksums_enabled: bool,
    pub tracker_version: u32,
    pub block_ref_base: BlockRef,
    pub change_tracker: &'a dyn ChangeTracker,
    pub cancel: &'a CancelToken,
}

/// Reads one block from `source` into `buf` (which must be exactly
/// `BLOCK_SIZE` bytes), applying torn-read retry, the DELTA skip rule, and
/// the PTRACK live-buffer substitution.
pub fn read_block<R: Read + Seek>(
    source: &mut R,
    block_no: u32,
    buf: &mut [u8; BLOCK_SIZE],
    opts: &ReadOptions<'_>,
) -> Result<ReadState> {
    opts.cancel.check()?;

    let mut last_message = String::new();
    for attempt in 0..PAGE_READ_ATTEMPTS {
        opts.cancel.check()?;
        source.seek(SeekFrom::Start(block_no as u64 * BLOCK_SIZE as u64))?;
        let n = read_fully_or_short(source, buf)?;
        if n == 0 {
            return Ok(ReadState::Truncated);
        }
        if n < BLOCK_SIZE {
            warn!("short read of block {block_no}: got {n} of {BLOCK_SIZE} bytes, retrying");
            continue;
        }

        let validation = validate_page(buf, 0, opts.checksums_enabled);
        match validation.status {
            PageStatus::Zeroed => return finish_ptrack(block_no, buf, opts),
            PageStatus::Valid => {
                if opts.mode == BackupMode::Delta
                    && opts.file_exists_in_prev
                    && validation.lsn.unwrap_or(0) < opts.prev_start_lsn
                {
                    return Ok(ReadState::Skip);
                }
                return finish_ptrack(block_no, buf, opts);
            }
            PageStatus::HeaderInvalid(ref msg) | PageStatus::ChecksumMismatch(ref msg) => {
                last_message = msg.clone();
                trace!("block {block_no} attempt {attempt} failed validation: {msg}");
                continue;
            }
            PageStatus::NotFound => return Ok(ReadState::Truncated),
            PageStatus::LsnFromFuture => return finish_ptrack(block_no, buf, opts),
        }
    }

    if opts.strict {
        Err(CoreError::Corruption(format!(
            "block {block_no} failed to stabilize after {PAGE_READ_ATTEMPTS} attempts: {last_message}"
        )))
    } else {
        warn!(
            "block {block_no} failed to stabilize after {PAGE_READ_ATTEMPTS} attempts: {last_message}"
        );
        Ok(ReadState::Corrupted)
    }
}

fn finish_ptrack(
    block_no: u32,
    buf: &mut [u8; BLOCK_SIZE],
    opts: &ReadOptions<'_>,
) -> Result<ReadState> {
    if opts.mode != BackupMode::Ptrack {
        return Ok(ReadState::Ok);
    }
    let block_ref = BlockRef {
        block_no,
        ..opts.block_ref_base
    };
    match opts.change_tracker.get_block(block_ref, opts.tracker_version)? {
        None => Ok(ReadState::Truncated),
        Some(tracked) => {
            let validation = validate_page(&tracked, 0, false);
            match validation.status {
                PageStatus::HeaderInvalid(msg) => {
                    return Err(CoreError::Corruption(format!(
                        "change-tracker page for block {block_no} is invalid: {msg}"
                    )))
                }
                _ => {}
            }
            *buf = tracked;
            if opts.checksums_enabled {
                if let Some(mut header) = PageHeader::parse(buf) {
                    header.checksum = compute_page_checksum(buf);
                    header.write_into(buf);
                }
            }
            debug!("block {block_no} replaced from change tracker");
            Ok(ReadState::Ok)
        }
    }
}

fn read_fully_or_short<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match source.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CoreError::Io(e.to_string())),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::change_tracker::NullChangeTracker;
    use std::io::Cursor;

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

    fn base_opts<'a>(
        mode: BackupMode,
        cancel: &'a CancelToken,
        tracker: &'a dyn ChangeTracker,
    ) -> ReadOptions<'a> {
        ReadOptions {
            mode,
            strict: true,
            prev_start_lsn: 0,
            file_exists_in_prev: false,
            checksums_enabled: true,
            tracker_version: 2,
            block_ref_base: BlockRef {
                db_oid: 1,
                tablespace_oid: 1,
                relation_oid: 1,
                block_no: 0,
            },
            change_tracker: tracker,
            cancel,
        }
    }

    #[test]
    fn reads_valid_block() {
        let page = valid_page(0x10);
        let mut source = Cursor::new(page.to_vec());
        let cancel = CancelToken::new();
        let tracker = NullChangeTracker;
        let opts = base_opts(BackupMode::Full, &cancel, &tracker);
        let mut buf = [0u8; BLOCK_SIZE];
        let state = read_block(&mut source, 0, &mut buf, &opts).unwrap();
        assert_eq!(state, ReadState::Ok);
    }

    #[test]
    fn truncated_file_reports_truncated() {
        let mut source = Cursor::new(Vec::<u8>::new());
        let cancel = CancelToken::new();
        let tracker = NullChangeTracker;
        let opts = base_opts(BackupMode::Full, &cancel, &tracker);
        let mut buf = [0u8; BLOCK_SIZE];
        let state = read_block(&mut source, 0, &mut buf, &opts).unwrap();
        assert_eq!(state, ReadState::Truncated);
    }

    #[test]
    fn delta_skips_old_block() {
        let page = valid_page(0x10);
        let mut source = Cursor::new(page.to_vec());
        let cancel = CancelToken::new();
        let tracker = NullChangeTracker;
        let mut opts = base_opts(BackupMode::Delta, &cancel, &tracker);
        opts.prev_start_lsn = 0x100;
        opts.file_exists_in_prev = true;
        let mut buf = [0u8; BLOCK_SIZE];
        let state = read_block(&mut source, 0, &mut buf, &opts).unwrap();
        assert_eq!(state, ReadState::Skip);
    }

    struct FlakyThenValid {
        data_bad: Vec<u8>,
        data_good: Vec<u8>,
        calls: std::cell::Cell<u32>,
        flip_after: u32,
    }

    impl Read for &FlakyThenValid {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.calls.get();
            let src = if n < self.flip_after {
                &self.data_bad
            } else {
                &self.data_good
            };
            let len = buf.len().min(src.len());
            buf[..len].copy_from_slice(&src[..len]);
            Ok(len)
        }
    }

    impl Seek for &FlakyThenValid {
        fn seek(&mut self, _pos: SeekFrom) -> std::io::Result<u64> {
            self.calls.set(self.calls.get() + 1);
            Ok(0)
        }
    }

    #[test]
    fn torn_read_retries_then_succeeds() {
        let mut bad = vec![0u8; BLOCK_SIZE];
        bad[4] = 0xFF; // lower field garbage -> header invalid but not all-zero
        bad[5] = 0xFF;
        let good = valid_page(0x20).to_vec();
        let flaky = FlakyThenValid {
            data_bad: bad,
            data_good: good,
            calls: std::cell::Cell::new(0),
            flip_after: 5,
        };
        let cancel = CancelToken::new();
        let tracker = NullChangeTracker;
        let opts = base_opts(BackupMode::Full, &cancel, &tracker);
        let mut buf = [0u8; BLOCK_SIZE];
        let mut source = &flaky;
        let state = read_block(&mut source, 0, &mut buf, &opts).unwrap();
        assert_eq!(state, ReadState::Ok);
    }
}
