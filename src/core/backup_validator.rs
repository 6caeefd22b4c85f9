//! `BackupFileValidator`: an independent, write-free replay used by the
//! consistency-check path (§4.8).

use std::fs::File;
use std::io::BufReader;

use log::warn;

use crate::error::Result;

use super::codec::CompressAlg;
use super::constants::BLOCK_SIZE;
use super::framer::{read_frame_header, read_frame_payload, RollingChecksum};
use super::validator::{validate_page, PageStatus};

/// What the validator determined about one backup stream file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    pub blocks_checked: u32,
    pub problems: Vec<String>,
}

/// Replays `stream_path` without writing anywhere, recomputing the rolling
/// checksum with the version-appropriate polynomial and re-validating
/// every reconstructed page against `stop_lsn`.
pub fn check_file_pages<P: AsRef<std::path::Path>>(
    stream_path: P,
    expected_crc: u32,
    producer_version: u32,
    compress_alg: CompressAlg,
    stop_lsn: u64,
    checksums_enabled: bool,
) -> Result<ValidationReport> {
    let stream = File::open(stream_path)?;
    let mut reader = BufReader::with_capacity(64 * 1024, stream);
    let mut checksum = RollingChecksum::for_producer_version(producer_version);

    let mut problems = Vec::new();
    let mut blocks_checked = 0u32;
    let mut prev_block: Option<u32> = None;

    loop {
        let header = match read_frame_header(&mut reader)? {
            Some(h) => h,
            None => break,
        };

        if header.is_legacy_empty_marker() {
            warn!("skipping legacy empty marker frame");
            continue;
        }
        if header.is_truncation_marker() {
            break;
        }

        if let Some(prev) = prev_block {
            if header.block < prev {
                problems.push(format!(
                    "block {} out of order after {}",
                    header.block, prev
                ));
                return Ok(ValidationReport {
                    valid: false,
                    blocks_checked,
                    problems,
                });
            }
        }
        prev_block = Some(header.block);

        let payload = match read_frame_payload(&mut reader, &header) {
            Ok(p) => p,
            Err(e) => {
                problems.push(e.to_string());
                return Ok(ValidationReport {
                    valid: false,
                    blocks_checked,
                    problems,
                });
            }
        };

        checksum.update(&header.block.to_le_bytes());
        checksum.update(&header.compressed_size.to_le_bytes());
        let padded = super::constants::maxalign(payload.len());
        checksum.update(&payload);
        if padded > payload.len() {
            checksum.update(&vec![0u8; padded - payload.len()]);
        }

        let page = if header.compressed_size as usize == BLOCK_SIZE {
            payload
        } else {
            let mut out = Vec::new();
            match super::codec::decompress(&mut out, &payload, compress_alg, BLOCK_SIZE) {
                Ok(_) => out,
                Err(e) => {
                    problems.push(format!("block {}: {e}", header.block));
                    return Ok(ValidationReport {
                        valid: false,
                        blocks_checked,
                        problems,
                    });
                }
            }
        };

        let validation = validate_page(&page, stop_lsn, checksums_enabled);
        match validation.status {
            PageStatus::HeaderInvalid(msg) => {
                warn!("block {} header invalid: {msg}", header.block);
                problems.push(format!("block {}: {msg}", header.block));
            }
            PageStatus::ChecksumMismatch(msg) => {
                warn!("block {} checksum mismatch: {msg}", header.block);
                problems.push(format!("block {}: {msg}", header.block));
            }
            _ => {}
        }

        blocks_checked += 1;
    }

    let actual_crc = checksum.finalize();
    if actual_crc != expected_crc {
        problems.push(format!(
            "rolling checksum mismatch: computed {actual_crc:#010x}, recorded {expected_crc:#010x}"
        ));
    }

    Ok(ValidationReport {
        valid: problems.is_empty(),
        blocks_checked,
        problems,
    })
}
