//! Raw LZ4 block codec (requires the `compression` feature).
//!
//! UnityFS stores LZ4 blocks **without** a size prefix; the decompressed
//! size comes from the block table. This is the plain block format of
//! [`lz4_flex::block`], not the size-prepended or frame variants.

#![cfg(feature = "compression")]

use crate::{Error, Result};

/// Upper bound on LZ4 expansion: one 255-byte run per input byte, plus the
/// literal tail.
const MAX_EXPANSION: usize = 255;

/// Decompress a raw LZ4 block into exactly `uncompressed_size` bytes.
///
/// Returns [`Error::Lz4`] on any decompression failure or size mismatch. A
/// declared size no LZ4 block of `data.len()` bytes can reach is rejected
/// before the output buffer is allocated.
pub fn decompress_block(data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
    let reachable = data.len().saturating_mul(MAX_EXPANSION).saturating_add(16);
    if uncompressed_size > reachable {
        return Err(Error::Lz4);
    }
    let out = lz4_flex::block::decompress(data, uncompressed_size).map_err(|_| Error::Lz4)?;
    if out.len() != uncompressed_size {
        return Err(Error::Lz4);
    }
    Ok(out)
}

/// Compress `data` into a raw LZ4 block.
pub fn compress_block(data: &[u8]) -> Vec<u8> {
    lz4_flex::block::compress(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_round_trip() {
        let data = b"FSB5FSB5FSB5FSB5 repeated payload repeated payload".repeat(8);
        let packed = compress_block(&data);
        assert!(packed.len() < data.len());
        assert_eq!(decompress_block(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn wrong_size_is_an_error() {
        let data = vec![7u8; 256];
        let packed = compress_block(&data);
        assert!(decompress_block(&packed, 300).is_err());
    }

    #[test]
    fn impossible_size_is_rejected_up_front() {
        let packed = compress_block(&[0u8; 64]);
        assert!(matches!(
            decompress_block(&packed, u32::MAX as usize),
            Err(Error::Lz4)
        ));
    }

    #[test]
    fn highly_compressible_block_still_decodes() {
        let data = vec![0u8; 1 << 20];
        let packed = compress_block(&data);
        assert!(packed.len() * MAX_EXPANSION >= data.len());
        assert_eq!(decompress_block(&packed, data.len()).unwrap(), data);
    }
}
