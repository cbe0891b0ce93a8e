//! UnityFS asset bundle - the container holding an asset table and its
//! resource files.
//!
//! A bundle is a small header, a *blocks info* table and a run of data
//! blocks. Concatenating the decompressed data blocks yields one stream;
//! the directory nodes in the blocks info slice that stream into named
//! entries.
//!
//! ## Header (big endian)
//! ```text
//! Signature            "UnityFS\0"
//! FormatVersion        (u32)      6, 7 or 8
//! EngineVersion        (null-terminated string, e.g. "5.x.x")
//! EngineRevision       (null-terminated string, e.g. "2019.4.40f1")
//! TotalSize            (u64)
//! CompressedInfoSize   (u32)
//! UncompressedInfoSize (u32)
//! Flags                (u32)
//! -- align 16 when FormatVersion >= 7 --
//! ```
//!
//! ## Flags
//! ```text
//! 0x3F  compression of the blocks info
//! 0x40  directory info present
//! 0x80  blocks info stored at the end of the file
//! 0x200 align to 16 before the first data block
//! ```
//!
//! ## Blocks info (big endian, after decompression)
//! ```text
//! [0x00] UncompressedDataHash (16 bytes)
//! [0x10] BlockCount           (i32)
//!        Block × BlockCount:  UncompressedSize (u32), CompressedSize (u32), Flags (u16)
//!        NodeCount            (i32)
//!        Node × NodeCount:    Offset (u64), Size (u64), Flags (u32), Path (string)
//! ```
//! Node flag `0x4` marks a serialized file (an asset table).

use std::collections::HashSet;
use std::io::Cursor;

use log::debug;

use crate::compression::{self, COMPRESSION_MASK, Compression};
use crate::utils::{
    align, be_count, be_u16, be_u32, be_u64, bytesa, pad_to, put_null_string, put_u32, put_u64,
    read_null_string,
};
use crate::{Error, Result};

/// Bundle signature.
pub const SIGNATURE: &str = "UnityFS";

/// Uncompressed size of each data block written by [`Bundle::serialize`].
pub const BLOCK_SIZE: usize = 0x20000;

/// Directory node flag for serialized files.
pub const NODE_SERIALIZED_FILE: u32 = 0x4;

const FLAG_HAS_DIRECTORY_INFO: u32 = 0x40;
const FLAG_BLOCKS_INFO_AT_END: u32 = 0x80;
const FLAG_PADDING_AT_START: u32 = 0x200;

/// A named file inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Entry path, unique within the bundle.
    pub name: String,
    pub payload: Vec<u8>,
    /// Directory node flags.
    pub flags: u32,
}

impl DirectoryEntry {
    pub fn new(name: impl Into<String>, payload: Vec<u8>, flags: u32) -> Self {
        Self {
            name: name.into(),
            payload,
            flags,
        }
    }

    /// Whether this entry is an asset table.
    pub fn is_serialized_table(&self) -> bool {
        self.flags & NODE_SERIALIZED_FILE != 0
    }
}

/// In-memory bundle: header metadata plus fully decompressed entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub format_version: u32,
    pub unity_version: String,
    pub unity_revision: String,
    /// Compression applied to data blocks by [`Bundle::serialize`].
    pub compression: Compression,
    /// Entries in directory order.
    pub entries: Vec<DirectoryEntry>,
    flags: u32,
    hash: [u8; 16],
}

struct BlockInfo {
    uncompressed_size: u32,
    compressed_size: u32,
    flags: u16,
}

struct Node {
    offset: u64,
    size: u64,
    flags: u32,
    name: String,
}

impl Bundle {
    /// An empty format 6 bundle.
    pub fn new(unity_version: impl Into<String>, unity_revision: impl Into<String>) -> Self {
        Self {
            format_version: 6,
            unity_version: unity_version.into(),
            unity_revision: unity_revision.into(),
            compression: Compression::None,
            entries: Vec::new(),
            flags: 0,
            hash: [0; 16],
        }
    }

    /// Parse a bundle from its complete file contents.
    ///
    /// Every data block is decompressed; LZMA blocks are rejected with
    /// [`Error::UnsupportedCompression`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(data);

        let signature = bytesa::<8>(&mut r).map_err(|_| Error::BadMagic)?;
        if &signature[..7] != SIGNATURE.as_bytes() || signature[7] != 0 {
            return Err(Error::BadMagic);
        }
        let format_version = be_u32(&mut r)?;
        if !(6..=8).contains(&format_version) {
            return Err(Error::UnsupportedVersion(format_version));
        }
        let unity_version = read_null_string(&mut r)?;
        let unity_revision = read_null_string(&mut r)?;
        let total_size = be_u64(&mut r)?;
        let info_compressed = be_u32(&mut r)? as u64;
        let info_uncompressed = be_u32(&mut r)? as usize;
        let flags = be_u32(&mut r)?;
        if total_size > data.len() as u64 {
            return Err(Error::Parse("bundle is shorter than its declared size"));
        }
        if format_version >= 7 {
            align(&mut r, 16)?;
        }

        let info_raw = if flags & FLAG_BLOCKS_INFO_AT_END != 0 {
            let start = total_size
                .checked_sub(info_compressed)
                .ok_or(Error::InvalidRange)?;
            &data[start as usize..total_size as usize]
        } else {
            let start = r.position();
            let end = start + info_compressed;
            if end > total_size {
                return Err(Error::InvalidRange);
            }
            r.set_position(end);
            &data[start as usize..end as usize]
        };
        if flags & FLAG_PADDING_AT_START != 0 {
            align(&mut r, 16)?;
        }
        let data_start = r.position();

        let info = compression::decompress(Compression::from_flags(flags)?, info_raw, info_uncompressed)?;
        let (hash, blocks, nodes) = read_blocks_info(&info)?;

        let mut stream = Vec::new();
        let mut pos = data_start;
        let mut compression = Compression::None;
        for block in &blocks {
            let end = pos + block.compressed_size as u64;
            if end > total_size {
                return Err(Error::InvalidRange);
            }
            let kind = Compression::from_flags(block.flags as u32)?;
            if compression == Compression::None {
                compression = kind;
            }
            let raw = &data[pos as usize..end as usize];
            stream.extend(compression::decompress(kind, raw, block.uncompressed_size as usize)?);
            pos = end;
        }

        let mut names = HashSet::new();
        let mut entries = Vec::with_capacity(nodes.len());
        for node in nodes {
            let end = node.offset.checked_add(node.size).ok_or(Error::InvalidRange)?;
            let payload = stream
                .get(node.offset as usize..end as usize)
                .ok_or(Error::InvalidRange)?
                .to_vec();
            if !names.insert(node.name.clone()) {
                return Err(Error::Parse("duplicate directory entry name"));
            }
            debug!(
                "entry {} ({} bytes, flags {:#x})",
                node.name, node.size, node.flags
            );
            entries.push(DirectoryEntry::new(node.name, payload, node.flags));
        }

        debug!(
            "UnityFS v{} {} ({}), {} blocks, {:?}",
            format_version,
            unity_version,
            unity_revision,
            blocks.len(),
            compression
        );

        Ok(Self {
            format_version,
            unity_version,
            unity_revision,
            compression,
            entries,
            flags,
            hash,
        })
    }

    /// Find an entry by its exact name. Returns [`None`] if not found.
    pub fn entry_by_name(&self, name: &str) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// The asset table: the first entry flagged as a serialized file.
    pub fn asset_table(&self) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|e| e.is_serialized_table())
    }

    /// A copy of this bundle with whole entries substituted by name.
    ///
    /// Entries not named in `replacements` are untouched and the directory
    /// order is kept. Fails with [`Error::EntryNotFound`] if a replacement
    /// names an entry the bundle does not have.
    pub fn replaced(&self, replacements: impl IntoIterator<Item = DirectoryEntry>) -> Result<Self> {
        let mut bundle = self.clone();
        for replacement in replacements {
            let slot = bundle
                .entries
                .iter_mut()
                .find(|e| e.name == replacement.name)
                .ok_or_else(|| Error::EntryNotFound(replacement.name.clone()))?;
            *slot = replacement;
        }
        Ok(bundle)
    }

    /// Serialize the bundle.
    ///
    /// Entries are packed back-to-back into [`BLOCK_SIZE`] data blocks
    /// compressed with [`Bundle::compression`]; the blocks info follows the
    /// header directly. Output is deterministic for a given bundle.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut stream = Vec::new();
        let mut nodes = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            nodes.push((stream.len() as u64, entry));
            stream.extend_from_slice(&entry.payload);
        }

        let mut blocks = Vec::new();
        let mut block_data = Vec::new();
        for chunk in stream.chunks(BLOCK_SIZE) {
            let (kind, packed) = compression::compress(self.compression, chunk)?;
            blocks.push(BlockInfo {
                uncompressed_size: chunk.len() as u32,
                compressed_size: packed.len() as u32,
                flags: kind.bits() as u16,
            });
            block_data.extend_from_slice(&packed);
        }

        let mut info = Vec::new();
        info.extend_from_slice(&self.hash);
        put_u32(&mut info, blocks.len() as u32, false);
        for block in &blocks {
            put_u32(&mut info, block.uncompressed_size, false);
            put_u32(&mut info, block.compressed_size, false);
            info.extend_from_slice(&block.flags.to_be_bytes());
        }
        put_u32(&mut info, nodes.len() as u32, false);
        for (offset, entry) in &nodes {
            put_u64(&mut info, *offset, false);
            put_u64(&mut info, entry.payload.len() as u64, false);
            put_u32(&mut info, entry.flags, false);
            put_null_string(&mut info, &entry.name);
        }

        let info_kind = match self.compression {
            Compression::None => Compression::None,
            _ => Compression::Lz4,
        };
        let (info_kind, packed_info) = compression::compress(info_kind, &info)?;
        let flags = (self.flags & !(COMPRESSION_MASK | FLAG_BLOCKS_INFO_AT_END))
            | FLAG_HAS_DIRECTORY_INFO
            | info_kind.bits();

        let mut out = Vec::with_capacity(64 + packed_info.len() + block_data.len());
        put_null_string(&mut out, SIGNATURE);
        put_u32(&mut out, self.format_version, false);
        put_null_string(&mut out, &self.unity_version);
        put_null_string(&mut out, &self.unity_revision);
        let size_at = out.len();
        put_u64(&mut out, 0, false);
        put_u32(&mut out, packed_info.len() as u32, false);
        put_u32(&mut out, info.len() as u32, false);
        put_u32(&mut out, flags, false);
        if self.format_version >= 7 {
            pad_to(&mut out, 16);
        }
        out.extend_from_slice(&packed_info);
        if flags & FLAG_PADDING_AT_START != 0 {
            pad_to(&mut out, 16);
        }
        out.extend_from_slice(&block_data);

        let total_size = out.len() as u64;
        out[size_at..size_at + 8].copy_from_slice(&total_size.to_be_bytes());
        Ok(out)
    }
}

fn read_blocks_info(info: &[u8]) -> Result<([u8; 16], Vec<BlockInfo>, Vec<Node>)> {
    let mut r = Cursor::new(info);
    let hash = bytesa::<16>(&mut r)?;

    let block_count = be_count(&mut r)?;
    let mut blocks = Vec::new();
    for _ in 0..block_count {
        blocks.push(BlockInfo {
            uncompressed_size: be_u32(&mut r)?,
            compressed_size: be_u32(&mut r)?,
            flags: be_u16(&mut r)?,
        });
    }

    let node_count = be_count(&mut r)?;
    let mut nodes = Vec::new();
    for _ in 0..node_count {
        nodes.push(Node {
            offset: be_u64(&mut r)?,
            size: be_u64(&mut r)?,
            flags: be_u32(&mut r)?,
            name: read_null_string(&mut r)?,
        });
    }

    Ok((hash, blocks, nodes))
}
