//! Block compression used by UnityFS bundles.
//!
//! A bundle declares a compression kind per block (and one for its blocks
//! info table) in the low six bits of a flags field. LZ4 and LZ4HC share one
//! block format and one decoder; LZ4HC only differs on the encoder side.
//!
//! The LZ4 codec is gated behind the `compression` Cargo feature (enabled by
//! default). Without it, only uncompressed bundles can be read or written:
//!
//! ```toml
//! [dependencies]
//! clipswap = { version = "0.1", default-features = false }
//! ```

#[cfg(feature = "compression")]
pub mod lz4;

use crate::{Error, Result};

/// Bit mask selecting the compression kind from a flags field.
pub const COMPRESSION_MASK: u32 = 0x3F;

/// Compression kind of a UnityFS block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Lzma,
    Lz4,
    Lz4Hc,
}

impl Compression {
    /// Decode the compression kind from a flags field.
    pub fn from_flags(flags: u32) -> Result<Self> {
        match flags & COMPRESSION_MASK {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Lzma),
            2 => Ok(Compression::Lz4),
            3 => Ok(Compression::Lz4Hc),
            other => Err(Error::UnsupportedCompression(other)),
        }
    }

    /// The flags bits for this kind.
    pub fn bits(self) -> u32 {
        match self {
            Compression::None => 0,
            Compression::Lzma => 1,
            Compression::Lz4 => 2,
            Compression::Lz4Hc => 3,
        }
    }
}

/// Decompress one block whose decompressed size is known.
pub fn decompress(kind: Compression, data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
    match kind {
        Compression::None => {
            if data.len() != uncompressed_size {
                return Err(Error::Parse("stored block size mismatch"));
            }
            Ok(data.to_vec())
        }
        #[cfg(feature = "compression")]
        Compression::Lz4 | Compression::Lz4Hc => lz4::decompress_block(data, uncompressed_size),
        other => Err(Error::UnsupportedCompression(other.bits())),
    }
}

/// Compress one block.
///
/// Returns the kind actually used: a block that would not shrink is stored
/// as [`Compression::None`].
pub fn compress(kind: Compression, data: &[u8]) -> Result<(Compression, Vec<u8>)> {
    match kind {
        Compression::None => Ok((Compression::None, data.to_vec())),
        #[cfg(feature = "compression")]
        Compression::Lz4 | Compression::Lz4Hc => {
            let packed = lz4::compress_block(data);
            if packed.len() < data.len() {
                Ok((kind, packed))
            } else {
                Ok((Compression::None, data.to_vec()))
            }
        }
        other => Err(Error::UnsupportedCompression(other.bits())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_round_trip() {
        for kind in [
            Compression::None,
            Compression::Lzma,
            Compression::Lz4,
            Compression::Lz4Hc,
        ] {
            assert_eq!(Compression::from_flags(kind.bits() | 0x40).unwrap(), kind);
        }
        assert!(Compression::from_flags(9).is_err());
    }

    #[test]
    fn lzma_is_rejected() {
        let err = decompress(Compression::Lzma, &[0; 4], 4).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCompression(1)));
    }

    #[test]
    fn stored_blocks_are_copied() {
        let data = b"stored block".to_vec();
        assert_eq!(decompress(Compression::None, &data, data.len()).unwrap(), data);
        assert!(decompress(Compression::None, &data, 3).is_err());
    }

    #[cfg(feature = "compression")]
    #[test]
    fn incompressible_block_is_stored() {
        let data: Vec<u8> = (0..64u32).map(|i| (i * 151 % 251) as u8).collect();
        let (kind, out) = compress(Compression::Lz4, &data).unwrap();
        if kind == Compression::None {
            assert_eq!(out, data);
        } else {
            assert!(out.len() < data.len());
        }
    }
}
