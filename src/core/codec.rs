//! Per-block compression, mirroring the teacher crate's
//! `innodb::compression` detect/decompress split but adding a compress
//! path, since the backup core is a producer as well as a consumer.

use crate::error::{CoreError, Result};
use super::constants::BLOCK_SIZE;

/// Compression algorithms a block may be stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressAlg {
    /// Sentinel: never a valid choice, selecting it is a config error.
    None,
    /// Sentinel: unknown/unset algorithm read back from old metadata.
    Undefined,
    /// LZ4, tuned for speed over ratio.
    Lz4,
    /// zlib/deflate, only available when the `zlib` feature is enabled.
    Zlib,
}

/// Compresses `src` into `dst`, returning the number of bytes written.
/// Returns `Err(Config)` for `None`/`Undefined`, or for `Zlib` when the
/// `zlib` feature is not compiled in.
pub fn compress(dst: &mut Vec<u8>, src: &[u8], alg: CompressAlg, level: u32) -> Result<usize> {
    match alg {
        CompressAlg::None | CompressAlg::Undefined => {
            Err(CoreError::Config("invalid compression algorithm".into()))
        }
        CompressAlg::Lz4 => {
            let compressed = lz4_flex::compress(src);
            dst.clear();
            dst.extend_from_slice(&compressed);
            Ok(dst.len())
        }
        CompressAlg::Zlib => compress_zlib(dst, src, level),
    }
}

/// Decompresses `src` into `dst`, truncating/extending `dst` to exactly
/// `expected_len` bytes on success.
pub fn decompress(
    dst: &mut Vec<u8>,
    src: &[u8],
    alg: CompressAlg,
    expected_len: usize,
) -> Result<usize> {
    match alg {
        CompressAlg::None | CompressAlg::Undefined => {
            Err(CoreError::Config("invalid compression algorithm".into()))
        }
        CompressAlg::Lz4 => {
            let decompressed = lz4_flex::decompress(src, expected_len)
                .map_err(|e| CoreError::Framing(format!("lz4 decompress failed: {e}")))?;
            if decompressed.len() != expected_len {
                return Err(CoreError::Framing(format!(
                    "decompressed size {} does not match expected {}",
                    decompressed.len(),
                    expected_len
                )));
            }
            dst.clear();
            dst.extend_from_slice(&decompressed);
            Ok(dst.len())
        }
        CompressAlg::Zlib => decompress_zlib(dst, src, expected_len),
    }
}

#[cfg(feature = "zlib")]
fn compress_zlib(dst: &mut Vec<u8>, src: &[u8], level: u32) -> Result<usize> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(src)
        .map_err(|e| CoreError::Io(e.to_string()))?;
    let compressed = encoder.finish().map_err(|e| CoreError::Io(e.to_string()))?;
    dst.clear();
    dst.extend_from_slice(&compressed);
    Ok(dst.len())
}

#[cfg(not(feature = "zlib"))]
fn compress_zlib(_dst: &mut Vec<u8>, _src: &[u8], _level: u32) -> Result<usize> {
    Err(CoreError::Config(
        "zlib support not compiled into this build".into(),
    ))
}

#[cfg(feature = "zlib")]
fn decompress_zlib(dst: &mut Vec<u8>, src: &[u8], expected_len: usize) -> Result<usize> {
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    let mut decoder = ZlibDecoder::new(src);
    let mut buf = Vec::with_capacity(expected_len);
    decoder
        .read_to_end(&mut buf)
        .map_err(|e| CoreError::Framing(format!("zlib decompress failed: {e}")))?;
    if buf.len() != expected_len {
        return Err(CoreError::Framing(format!(
            "decompressed size {} does not match expected {}",
            buf.len(),
            expected_len
        )));
    }
    *dst = buf;
    Ok(dst.len())
}

#[cfg(not(feature = "zlib"))]
fn decompress_zlib(_dst: &mut Vec<u8>, _src: &[u8], _expected_len: usize) -> Result<usize> {
    Err(CoreError::Config(
        "zlib support not compiled into this build".into(),
    ))
}

/// True when a byte matching zlib's fixed first byte (`0x78`) for the
/// default window size is present; used only by the legacy heuristic in
/// [`crate::restore`].
pub fn looks_like_zlib_magic(first_byte: u8) -> bool {
    first_byte == 0x78
}

/// Returns the compressed form of `page` under `alg` if it is smaller than
/// `BLOCK_SIZE`, or `None` if compression did not help (caller should store
/// the page raw).
pub fn try_compress_page(page: &[u8; BLOCK_SIZE], alg: CompressAlg, level: u32) -> Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    compress(&mut buf, page, alg, level)?;
    if buf.len() < BLOCK_SIZE {
        Ok(Some(buf))
    } else {
        Ok(None)
    }
}
