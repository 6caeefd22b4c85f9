//! `RestoreFileReader`: replays a chain of backup stream files, oldest to
//! newest, into one destination file (§4.6, §4.7).

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};

use log::{debug, warn};

use crate::error::{CoreError, Result};

use super::cancel::CancelToken;
use super::codec::{decompress, looks_like_zlib_magic, CompressAlg};
use super::constants::{BLOCK_SIZE, LEGACY_COMPRESSED_PAGE_CUTOFF};
use super::framer::{read_frame_header, read_frame_payload};
use super::page::PageHeader;

/// One backup in a restore chain, oldest listed first.
pub struct ChainEntry<'a> {
    /// Path to this backup's stream file for the destination relation, or
    /// `None` if the file does not exist in this particular backup.
    pub stream_path: Option<&'a std::path::Path>,
    /// `write_size` sentinel/value recorded for this file in this backup.
    pub write_size: i64,
    pub compress_alg: CompressAlg,
    pub producer_version: u32,
}

/// Replays `chain` (oldest first) into `dest_path`, creating it if needed.
/// Later entries' frames overwrite earlier ones for the same block because
/// replay proceeds in chain order (§4.6).
pub fn restore_data_file<P: AsRef<std::path::Path>>(
    chain: &[ChainEntry<'_>],
    dest_path: P,
    dest_n_blocks: Option<u32>,
    cancel: &CancelToken,
) -> Result<()> {
    let dest_path = dest_path.as_ref();
    let mut dest = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dest_path)?;

    let mut cur_pos: u64 = 0;
    let n_blocks_known: Option<u32> = dest_n_blocks;

    for entry in chain {
        cancel.check()?;
        if entry.write_size == super::constants::BYTES_INVALID || entry.write_size == 0 {
            continue;
        }
        let path = match entry.stream_path {
            Some(p) => p,
            None => continue,
        };
        let stream = File::open(path)?;
        let mut reader = BufReader::with_capacity(64 * 1024, stream);

        let mut prev_block: Option<u32> = None;
        loop {
            cancel.check()?;
            let header = match read_frame_header(&mut reader)? {
                Some(h) => h,
                None => break,
            };

            if header.is_legacy_empty_marker() {
                warn!("skipping legacy empty marker frame");
                continue;
            }

            if header.is_truncation_marker() {
                dest.flush()?;
                let truncate_at = header.block as u64 * BLOCK_SIZE as u64;
                dest.set_len(truncate_at)?;
                debug!("truncation marker at block {}: truncated to {truncate_at} bytes", header.block);
                break;
            }

            if let Some(prev) = prev_block {
                if header.block < prev {
                    return Err(CoreError::Framing(format!(
                        "backup broken: block {} precedes previously seen block {}",
                        header.block, prev
                    )));
                }
            }
            prev_block = Some(header.block);

            if let Some(n_blocks) = n_blocks_known {
                if n_blocks > 0 && header.block >= n_blocks {
                    debug!("block {} beyond known file length, stopping this stream", header.block);
                    break;
                }
            }

            if header.compressed_size as usize > BLOCK_SIZE {
                return Err(CoreError::Framing(format!(
                    "block {} has compressed_size {} exceeding block size",
                    header.block, header.compressed_size
                )));
            }

            let payload = read_frame_payload(&mut reader, &header)?;
            let write_pos = header.block as u64 * BLOCK_SIZE as u64;

            let page = reconstruct_page(&payload, &header, entry.compress_alg, entry.producer_version)?;

            if cur_pos != write_pos {
                dest.seek(SeekFrom::Start(write_pos))?;
            }
            dest.write_all(&page)?;
            cur_pos = write_pos + BLOCK_SIZE as u64;
        }
    }

    dest.flush()?;
    Ok(())
}

fn reconstruct_page(
    payload: &[u8],
    header: &super::framer::FrameHeader,
    alg: CompressAlg,
    producer_version: u32,
) -> Result<Vec<u8>> {
    let claims_uncompressed = header.compressed_size as usize == BLOCK_SIZE;
    let is_compressed = if claims_uncompressed {
        producer_version < LEGACY_COMPRESSED_PAGE_CUTOFF && legacy_probe(payload, alg)
    } else {
        true
    };

    if !is_compressed {
        if payload.len() != BLOCK_SIZE {
            return Err(CoreError::Framing(format!(
                "block {} claims uncompressed but payload is {} bytes",
                header.block,
                payload.len()
            )));
        }
        return Ok(payload.to_vec());
    }

    let mut out = Vec::new();
    decompress(&mut out, payload, alg, BLOCK_SIZE)?;
    Ok(out)
}

/// §4.7: a page recorded as uncompressed (`compressed_size == BLOCK_SIZE`)
/// may in fact be a pre-2.0.23 mis-recording of a compressed page whose
/// compressed form happened to be exactly `BLOCK_SIZE` bytes.
fn legacy_probe(payload: &[u8], alg: CompressAlg) -> bool {
    if payload.len() != BLOCK_SIZE {
        return false;
    }
    let header_invalid = PageHeader::parse(payload)
        .map(|h| h.check_invariants().is_err())
        .unwrap_or(true);
    if !header_invalid {
        return false;
    }
    match alg {
        CompressAlg::Zlib => payload.first().map(|&b| looks_like_zlib_magic(b)).unwrap_or(false),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::checksum::compute_page_checksum;
    use crate::core::framer::write_frame;
    use std::fs;
    use tempfile::tempdir;

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
    fn single_stream_restores_exact_bytes() {
        let dir = tempdir().unwrap();
        let stream_path = dir.path().join("a.backup");
        let page = valid_page(0x10);
        let mut stream = Vec::new();
        write_frame(&mut stream, 0, &page).unwrap();
        fs::write(&stream_path, &stream).unwrap();

        let dest_path = dir.path().join("out.0");
        let chain = vec![ChainEntry {
            stream_path: Some(stream_path.as_path()),
            write_size: stream.len() as i64,
            compress_alg: CompressAlg::None,
            producer_version: 20030,
        }];
        let cancel = CancelToken::new();
        restore_data_file(&chain, &dest_path, None, &cancel).unwrap();

        let out = fs::read(&dest_path).unwrap();
        assert_eq!(&out[..], &page[..]);
    }

    #[test]
    fn later_backup_overwrites_earlier_block() {
        let dir = tempdir().unwrap();

        let full_path = dir.path().join("full.backup");
        let mut full_stream = Vec::new();
        let p0 = valid_page(0x01);
        let p1 = valid_page(0x02);
        let p2 = valid_page(0x03);
        write_frame(&mut full_stream, 0, &p0).unwrap();
        write_frame(&mut full_stream, 1, &p1).unwrap();
        write_frame(&mut full_stream, 2, &p2).unwrap();
        fs::write(&full_path, &full_stream).unwrap();

        let delta_path = dir.path().join("delta.backup");
        let mut delta_stream = Vec::new();
        let p1_new = valid_page(0x99);
        write_frame(&mut delta_stream, 1, &p1_new).unwrap();
        fs::write(&delta_path, &delta_stream).unwrap();

        let dest_path = dir.path().join("out.0");
        let chain = vec![
            ChainEntry {
                stream_path: Some(full_path.as_path()),
                write_size: full_stream.len() as i64,
                compress_alg: CompressAlg::None,
                producer_version: 20030,
            },
            ChainEntry {
                stream_path: Some(delta_path.as_path()),
                write_size: delta_stream.len() as i64,
                compress_alg: CompressAlg::None,
                producer_version: 20030,
            },
        ];
        let cancel = CancelToken::new();
        restore_data_file(&chain, &dest_path, None, &cancel).unwrap();

        let out = fs::read(&dest_path).unwrap();
        assert_eq!(&out[0..BLOCK_SIZE], &p0[..]);
        assert_eq!(&out[BLOCK_SIZE..2 * BLOCK_SIZE], &p1_new[..]);
        assert_eq!(&out[2 * BLOCK_SIZE..3 * BLOCK_SIZE], &p2[..]);
    }

    #[test]
    fn truncation_marker_truncates_destination() {
        let dir = tempdir().unwrap();
        let stream_path = dir.path().join("legacy.backup");
        let mut stream = Vec::new();
        let p0 = valid_page(0x01);
        write_frame(&mut stream, 0, &p0).unwrap();
        super::super::framer::write_truncation_marker(&mut stream, 5).unwrap();
        fs::write(&stream_path, &stream).unwrap();

        let dest_path = dir.path().join("out.0");
        fs::write(&dest_path, vec![0xAAu8; 100_000]).unwrap();

        let chain = vec![ChainEntry {
            stream_path: Some(stream_path.as_path()),
            write_size: stream.len() as i64,
            compress_alg: CompressAlg::None,
            producer_version: 20030,
        }];
        let cancel = CancelToken::new();
        restore_data_file(&chain, &dest_path, None, &cancel).unwrap();

        let meta = fs::metadata(&dest_path).unwrap();
        assert_eq!(meta.len(), 5 * BLOCK_SIZE as u64);
    }

    #[test]
    fn out_of_order_block_is_fatal() {
        let dir = tempdir().unwrap();
        let stream_path = dir.path().join("bad.backup");
        let mut stream = Vec::new();
        let p = valid_page(0x01);
        write_frame(&mut stream, 3, &p).unwrap();
        write_frame(&mut stream, 1, &p).unwrap();
        fs::write(&stream_path, &stream).unwrap();

        let dest_path = dir.path().join("out.0");
        let chain = vec![ChainEntry {
            stream_path: Some(stream_path.as_path()),
            write_size: stream.len() as i64,
            compress_alg: CompressAlg::None,
            producer_version: 20030,
        }];
        let cancel = CancelToken::new();
        let result = restore_data_file(&chain, &dest_path, None, &cancel);
        assert!(matches!(result, Err(CoreError::Framing(_))));
    }
}
