//! Byte-for-byte copy of non-data files, with mtime+CRC dedup against the
//! parent backup (§4.5, §4.9). Specified for interface completeness; it
//! carries none of the page-backup complexity.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::time::SystemTime;

use crate::error::Result;

use super::framer::RollingChecksum;

/// What the parent backup recorded for this file, if anything.
pub struct ParentCopy {
    pub crc: u32,
}

/// Outcome of a non-data file backup pass.
pub struct NonDataResult {
    pub write_size: i64,
    pub crc: u32,
}

/// Copies `source_path` to `dest_path` unless `parent` shows an identical
/// file (same mtime-or-older and matching CRC) and `always_copy` is false
/// (the engine's control-file equivalent sets `always_copy = true`).
pub fn backup_non_data_file<P: AsRef<std::path::Path>>(
    source_path: P,
    dest_path: P,
    backup_start: SystemTime,
    parent: Option<&ParentCopy>,
    producer_version: u32,
    always_copy: bool,
) -> Result<NonDataResult> {
    let source_path = source_path.as_ref();
    let dest_path = dest_path.as_ref();

    let metadata = fs::metadata(source_path)?;
    let mtime = metadata.modified()?;

    if !always_copy {
        if let Some(parent) = parent {
            if mtime <= backup_start {
                let crc = crc_whole_file(source_path, producer_version)?;
                if crc == parent.crc {
                    return Ok(NonDataResult {
                        write_size: super::constants::BYTES_INVALID,
                        crc,
                    });
                }
            }
        }
    }

    let crc = copy_with_checksum(source_path, dest_path, producer_version)?;
    let write_size = fs::metadata(dest_path)?.len() as i64;
    Ok(NonDataResult { write_size, crc })
}

fn copy_with_checksum(
    source_path: &std::path::Path,
    dest_path: &std::path::Path,
    producer_version: u32,
) -> Result<u32> {
    let src = File::open(source_path)?;
    let mut reader = BufReader::new(src);
    let dst = File::create(dest_path)?;
    let mut writer = BufWriter::new(dst);
    let mut checksum = RollingChecksum::for_producer_version(producer_version);

    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        checksum.update(&buf[..n]);
    }
    writer.flush()?;
    Ok(checksum.finalize())
}

fn crc_whole_file(path: &std::path::Path, producer_version: u32) -> Result<u32> {
    let src = File::open(path)?;
    let mut reader = BufReader::new(src);
    let mut checksum = RollingChecksum::for_producer_version(producer_version);
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        checksum.update(&buf[..n]);
    }
    Ok(checksum.finalize())
}

/// Restores one non-data file by walking the chain nearest-to-furthest
/// looking for the most recent full copy (§4.9).
pub fn restore_non_data_file<P: AsRef<std::path::Path>>(
    chain_newest_first: &[Option<(P, i64)>],
    dest_path: P,
) -> Result<()> {
    for entry in chain_newest_first {
        match entry {
            None => {
                return Err(crate::error::CoreError::Framing(
                    "backup broken: non-data file missing from an intermediate backup".into(),
                ))
            }
            Some((_path, write_size)) if *write_size == 0 => return Ok(()),
            Some((path, write_size)) if *write_size > 0 => {
                fs::copy(path, dest_path.as_ref())?;
                return Ok(());
            }
            Some(_) => continue,
        }
    }
    Ok(())
}
