//! The binary backup stream format (§6): per-block frames plus the
//! rolling per-file checksum that accompanies them out-of-band.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{CoreError, Result};

use super::constants::{maxalign, BLOCK_SIZE, TRUNCATED_MARKER};

/// One decoded frame header. `payload` is read separately by the caller
/// because its length depends on `compressed_size` and callers want to
/// stream straight into a reusable buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub block: u32,
    pub compressed_size: i32,
}

impl FrameHeader {
    pub const ON_DISK_SIZE: usize = 8;

    pub const fn is_truncation_marker(&self) -> bool {
        self.compressed_size == TRUNCATED_MARKER
    }

    /// The legacy "skip, nothing was ever written" tolerance frame: a
    /// writer never emits this, but restore/validate must not choke on it
    /// (§9 open question).
    pub const fn is_legacy_empty_marker(&self) -> bool {
        self.block == 0 && self.compressed_size == 0
    }
}

/// Writes one frame header followed by `payload`, padded to
/// `maxalign(payload.len())` with zero bytes. Returns the total bytes
/// written (header + padded payload).
pub fn write_frame<W: Write>(out: &mut W, block: u32, payload: &[u8]) -> Result<usize> {
    out.write_u32::<LittleEndian>(block)?;
    out.write_i32::<LittleEndian>(payload.len() as i32)?;
    out.write_all(payload)?;
    let pad = maxalign(payload.len()) - payload.len();
    if pad > 0 {
        out.write_all(&vec![0u8; pad])?;
    }
    Ok(FrameHeader::ON_DISK_SIZE + maxalign(payload.len()))
}

/// Writes a legacy truncation marker frame (§4.6).
pub fn write_truncation_marker<W: Write>(out: &mut W, block: u32) -> Result<usize> {
    out.write_u32::<LittleEndian>(block)?;
    out.write_i32::<LittleEndian>(TRUNCATED_MARKER)?;
    Ok(FrameHeader::ON_DISK_SIZE)
}

/// Reads one frame header. `Ok(None)` signals a clean EOF at a frame
/// boundary; a short read that lands mid-header is a framing error.
pub fn read_frame_header<R: Read>(input: &mut R) -> Result<Option<FrameHeader>> {
    let mut raw = [0u8; FrameHeader::ON_DISK_SIZE];
    let mut total = 0;
    while total < raw.len() {
        match input.read(&mut raw[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CoreError::Io(e.to_string())),
        }
    }
    if total == 0 {
        return Ok(None);
    }
    if total < raw.len() {
        return Err(CoreError::Framing(
            "backup stream ended mid frame header".into(),
        ));
    }
    let mut cursor = &raw[..];
    let block = cursor.read_u32::<LittleEndian>()?;
    let compressed_size = cursor.read_i32::<LittleEndian>()?;
    Ok(Some(FrameHeader {
        block,
        compressed_size,
    }))
}

/// Reads `maxalign(header.compressed_size)` payload bytes into a freshly
/// sized buffer. Callers must only call this for non-marker, non-empty
/// frames.
pub fn read_frame_payload<R: Read>(input: &mut R, header: &FrameHeader) -> Result<Vec<u8>> {
    if header.compressed_size < 0 || header.compressed_size as usize > BLOCK_SIZE {
        return Err(CoreError::Framing(format!(
            "block {} has invalid compressed_size {}",
            header.block, header.compressed_size
        )));
    }
    let padded = maxalign(header.compressed_size as usize);
    let mut buf = vec![0u8; padded];
    input
        .read_exact(&mut buf)
        .map_err(|_| CoreError::Framing(format!("truncated payload for block {}", header.block)))?;
    buf.truncate(header.compressed_size as usize);
    Ok(buf)
}

/// The rolling per-file checksum. Dispatches between the legacy and
/// current polynomials based on producer version (§4.8).
pub struct RollingChecksum {
    legacy: crc32fast::Hasher,
    modern: u32,
    use_legacy: bool,
}

impl RollingChecksum {
    pub fn for_producer_version(version: u32) -> Self {
        use super::constants::{CRC_SWITCH_HIGH, CRC_SWITCH_LOW};
        let use_legacy = version >= CRC_SWITCH_LOW && version <= CRC_SWITCH_HIGH;
        Self {
            legacy: crc32fast::Hasher::new(),
            modern: 0,
            use_legacy,
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        if self.use_legacy {
            self.legacy.update(bytes);
        } else {
            self.modern = crc32c::crc32c_append(self.modern, bytes);
        }
    }

    pub fn finalize(self) -> u32 {
        if self.use_legacy {
            self.legacy.finalize()
        } else {
            self.modern
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_round_trips() {
        let mut buf = Vec::new();
        let payload = vec![1u8, 2, 3, 4, 5];
        write_frame(&mut buf, 7, &payload).unwrap();
        assert_eq!(buf.len(), FrameHeader::ON_DISK_SIZE + maxalign(payload.len()));

        let mut cursor = Cursor::new(buf);
        let header = read_frame_header(&mut cursor).unwrap().unwrap();
        assert_eq!(header.block, 7);
        assert_eq!(header.compressed_size, 5);
        let read_payload = read_frame_payload(&mut cursor, &header).unwrap();
        assert_eq!(read_payload, payload);
    }

    #[test]
    fn eof_at_boundary_is_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_frame_header(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn mid_header_eof_is_framing_error() {
        let mut cursor = Cursor::new(vec![0u8, 1, 2]);
        assert!(matches!(
            read_frame_header(&mut cursor),
            Err(CoreError::Framing(_))
        ));
    }

    #[test]
    fn truncation_marker_round_trips() {
        let mut buf = Vec::new();
        write_truncation_marker(&mut buf, 42).unwrap();
        let mut cursor = Cursor::new(buf);
        let header = read_frame_header(&mut cursor).unwrap().unwrap();
        assert!(header.is_truncation_marker());
        assert_eq!(header.block, 42);
    }

    #[test]
    fn rolling_checksum_is_deterministic() {
        let mut a = RollingChecksum::for_producer_version(20030);
        let mut b = RollingChecksum::for_producer_version(20030);
        a.update(b"hello");
        b.update(b"hello");
        assert_eq!(a.finalize(), b.finalize());
    }

    #[test]
    fn legacy_and_modern_polynomials_differ() {
        // 20023 sits inside the transitional window (20022..=20024) and uses
        // the legacy polynomial; 20030 is past it and uses the modern one.
        let mut legacy = RollingChecksum::for_producer_version(20023);
        let mut modern = RollingChecksum::for_producer_version(20030);
        legacy.update(b"some backup bytes");
        modern.update(b"some backup bytes");
        assert_ne!(legacy.finalize(), modern.finalize());
    }

    #[test]
    fn versions_outside_window_both_use_modern_polynomial() {
        let mut low = RollingChecksum::for_producer_version(20021);
        let mut high = RollingChecksum::for_producer_version(20030);
        low.update(b"some backup bytes");
        high.update(b"some backup bytes");
        assert_eq!(low.finalize(), high.finalize());
    }
}
