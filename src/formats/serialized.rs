//! Unity SerializedFile - the asset table stored inside a bundle.
//!
//! Supported versions are 17 (Unity 5.5) through 22 (Unity 2020+). Only the
//! parts needed to locate and rewrite objects are decoded; everything after
//! the object table (script types, externals, reference types, user info) is
//! carried through unchanged.
//!
//! ## Layout
//! ```text
//! [0x00] Header (0x14 bytes, 0x30 for version 22; always big endian)
//! [....] Metadata (file endianness)
//!        EngineVersion     (null-terminated string)
//!        TargetPlatform    (i32)
//!        EnableTypeTree    (u8)
//!        TypeCount         (i32) + types
//!        ObjectCount       (i32) + object entries
//!        Tail              (opaque)
//! [DataOffset] Object payloads, each 8-byte aligned
//! ```
//!
//! ## Header
//! ```text
//! [0x00] MetadataSize  (u32)     0 for version 22
//! [0x04] FileSize      (u32)     0 for version 22
//! [0x08] Version       (u32)
//! [0x0C] DataOffset    (u32)     0 for version 22
//! [0x10] Endianness    (u8)      0 = little, 1 = big
//! [0x11] Reserved      (3 bytes)
//! -- version 22 only --
//! [0x14] MetadataSize  (u32)
//! [0x18] FileSize      (u64)
//! [0x20] DataOffset    (u64)
//! [0x28] Unknown       (u64)
//! ```
//!
//! ## Object entry (4-byte aligned)
//! ```text
//! PathId     (i64)
//! ByteStart  (u32; u64 for version 22) - relative to DataOffset
//! ByteSize   (u32)
//! TypeIndex  (i32) - index into the type list
//! ```

use std::io::Cursor;

use log::debug;

use crate::utils::{
    align, align_up, be_u32, be_u64, bytesa, end_count, end_i16, end_i32, end_i64, end_u32,
    end_u64, pad_to, put_i32, put_null_string, put_u32, put_u64, read_null_string, u8,
};
use crate::{Error, Result};

/// Oldest supported SerializedFile version.
pub const MIN_VERSION: u32 = 17;
/// Newest supported SerializedFile version.
pub const MAX_VERSION: u32 = 22;

/// Type entries for this class carry an extra 16-byte script id.
const MONO_BEHAVIOUR: i32 = 114;

/// Engine version a file was written with, reduced to `major.minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnityVersion {
    pub major: u32,
    pub minor: u32,
}

impl UnityVersion {
    /// Parse strings such as `2019.4.40f1` or `5.6.7f1`.
    ///
    /// Stripped builds write `0.0.0`; those yield [`None`].
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split('.');
        let major = leading_number(parts.next()?)?;
        let minor = leading_number(parts.next()?)?;
        if major == 0 {
            return None;
        }
        Some(Self { major, minor })
    }
}

fn leading_number(s: &str) -> Option<u32> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}

/// One entry of the type list.
///
/// The encoded entry (including any type tree) is kept verbatim so it can be
/// written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedType {
    pub class_id: i32,
    pub is_stripped: bool,
    pub script_type_index: i16,
    raw: Vec<u8>,
}

impl SerializedType {
    /// A type entry without type tree, for files with `enable_type_tree`
    /// off.
    pub fn new(class_id: i32, le: bool) -> Self {
        let mut raw = Vec::new();
        put_i32(&mut raw, class_id, le);
        raw.push(0);
        raw.extend_from_slice(&if le { (-1i16).to_le_bytes() } else { (-1i16).to_be_bytes() });
        if class_id == MONO_BEHAVIOUR {
            raw.extend_from_slice(&[0u8; 16]);
        }
        raw.extend_from_slice(&[0u8; 16]);
        Self {
            class_id,
            is_stripped: false,
            script_type_index: -1,
            raw,
        }
    }
}

/// One object of the asset table together with its serialized payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub path_id: i64,
    /// Index into [`SerializedFile::types`].
    pub type_index: i32,
    /// Class id resolved through the type list.
    pub class_id: i32,
    pub data: Vec<u8>,
}

/// Parsed asset table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedFile {
    pub version: u32,
    /// Whether metadata and object payloads are little endian.
    pub le: bool,
    /// Engine version string from the metadata.
    pub unity_version: String,
    pub target_platform: i32,
    pub enable_type_tree: bool,
    pub types: Vec<SerializedType>,
    /// Objects in object-table order.
    pub objects: Vec<ObjectInfo>,
    reserved: [u8; 3],
    tail: Vec<u8>,
    /// Data offset of the parsed file; rewritten files never start their
    /// data earlier than this.
    min_data_offset: u64,
    unknown: u64,
}

impl SerializedFile {
    /// An empty asset table without type trees.
    pub fn new(version: u32, unity_version: impl Into<String>, le: bool) -> Result<Self> {
        if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
            return Err(Error::UnsupportedVersion(version));
        }
        Ok(Self {
            version,
            le,
            unity_version: unity_version.into(),
            target_platform: 0,
            enable_type_tree: false,
            types: Vec::new(),
            objects: Vec::new(),
            reserved: [0; 3],
            // Script types, externals, reference types (v20+) and user info,
            // all empty.
            tail: empty_tail(version, le),
            min_data_offset: 0,
            unknown: 0,
        })
    }

    /// Parse an asset table from a directory entry payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(data);

        let mut metadata_size = be_u32(&mut r)? as u64;
        let mut file_size = be_u32(&mut r)? as u64;
        let version = be_u32(&mut r)?;
        let mut data_offset = be_u32(&mut r)? as u64;
        if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
            return Err(Error::UnsupportedVersion(version));
        }
        let le = match u8(&mut r)? {
            0 => true,
            1 => false,
            _ => return Err(Error::Parse("invalid SerializedFile endianness")),
        };
        let reserved = bytesa::<3>(&mut r)?;
        let mut unknown = 0;
        if version >= 22 {
            metadata_size = be_u32(&mut r)? as u64;
            file_size = be_u64(&mut r)?;
            data_offset = be_u64(&mut r)?;
            unknown = be_u64(&mut r)?;
        }

        let metadata_end = r.position() + metadata_size;
        if file_size > data.len() as u64 || metadata_end > data_offset || data_offset > file_size
        {
            return Err(Error::InvalidRange);
        }

        let unity_version = read_null_string(&mut r)?;
        let target_platform = end_i32(&mut r, le)?;
        let enable_type_tree = u8(&mut r)? != 0;

        let type_count = end_count(&mut r, le)?;
        let mut types = Vec::new();
        for _ in 0..type_count {
            types.push(read_type(&mut r, version, le, enable_type_tree)?);
        }

        let object_count = end_count(&mut r, le)?;
        let mut objects = Vec::new();
        for _ in 0..object_count {
            align(&mut r, 4)?;
            let path_id = end_i64(&mut r, le)?;
            let byte_start = if version >= 22 {
                end_u64(&mut r, le)?
            } else {
                end_u32(&mut r, le)? as u64
            };
            let byte_size = end_u32(&mut r, le)? as u64;
            let type_index = end_i32(&mut r, le)?;

            let class_id = usize::try_from(type_index)
                .ok()
                .and_then(|i| types.get(i))
                .map(|t| t.class_id)
                .ok_or(Error::Parse("object type index out of range"))?;

            let start = data_offset
                .checked_add(byte_start)
                .ok_or(Error::InvalidRange)?;
            let end = start.checked_add(byte_size).ok_or(Error::InvalidRange)?;
            if end > file_size {
                return Err(Error::InvalidRange);
            }
            objects.push(ObjectInfo {
                path_id,
                type_index,
                class_id,
                data: data[start as usize..end as usize].to_vec(),
            });
        }

        let pos = r.position();
        if pos > metadata_end {
            return Err(Error::Parse("object table overruns metadata"));
        }
        let tail = data[pos as usize..metadata_end as usize].to_vec();

        debug!(
            "SerializedFile v{} ({}), {} types, {} objects",
            version,
            unity_version,
            types.len(),
            objects.len()
        );

        Ok(Self {
            version,
            le,
            unity_version,
            target_platform,
            enable_type_tree,
            types,
            objects,
            reserved,
            tail,
            min_data_offset: data_offset,
            unknown,
        })
    }

    /// Engine version from the metadata, if it is not stripped.
    pub fn engine_version(&self) -> Option<UnityVersion> {
        UnityVersion::parse(&self.unity_version)
    }

    /// Objects of the given class, in object-table order.
    pub fn objects_of_class(&self, class_id: i32) -> impl Iterator<Item = &ObjectInfo> {
        self.objects.iter().filter(move |o| o.class_id == class_id)
    }

    /// Find an object by path id.
    pub fn object_mut(&mut self, path_id: i64) -> Option<&mut ObjectInfo> {
        self.objects.iter_mut().find(|o| o.path_id == path_id)
    }

    /// Append an object, registering its class in the type list if needed.
    ///
    /// New type entries carry no type tree, so this fails on files that
    /// have type trees enabled and lack the class.
    pub fn add_object(&mut self, path_id: i64, class_id: i32, data: Vec<u8>) -> Result<()> {
        let type_index = match self.types.iter().position(|t| t.class_id == class_id) {
            Some(i) => i,
            None if self.enable_type_tree => {
                return Err(Error::Parse("cannot add a type without its type tree"));
            }
            None => {
                self.types.push(SerializedType::new(class_id, self.le));
                self.types.len() - 1
            }
        };
        self.objects.push(ObjectInfo {
            path_id,
            type_index: type_index as i32,
            class_id,
            data,
        });
        Ok(())
    }

    fn header_size(&self) -> u64 {
        if self.version >= 22 { 0x30 } else { 0x14 }
    }

    /// Serialize the asset table.
    ///
    /// Object payloads are laid out in object-table order, 8-byte aligned.
    /// The output is deterministic for a given table.
    pub fn serialize(&self) -> Vec<u8> {
        let le = self.le;

        let mut body = Vec::new();
        let mut starts = Vec::with_capacity(self.objects.len());
        for object in &self.objects {
            pad_to(&mut body, 8);
            starts.push(body.len() as u64);
            body.extend_from_slice(&object.data);
        }

        // The header size is a multiple of 4, so aligning within the
        // metadata matches alignment from the start of the file.
        let mut meta = Vec::new();
        put_null_string(&mut meta, &self.unity_version);
        put_i32(&mut meta, self.target_platform, le);
        meta.push(self.enable_type_tree as u8);
        put_i32(&mut meta, self.types.len() as i32, le);
        for ty in &self.types {
            meta.extend_from_slice(&ty.raw);
        }
        put_i32(&mut meta, self.objects.len() as i32, le);
        for (object, &start) in self.objects.iter().zip(&starts) {
            pad_to(&mut meta, 4);
            put_u64(&mut meta, object.path_id as u64, le);
            if self.version >= 22 {
                put_u64(&mut meta, start, le);
            } else {
                put_u32(&mut meta, start as u32, le);
            }
            put_u32(&mut meta, object.data.len() as u32, le);
            put_i32(&mut meta, object.type_index, le);
        }
        meta.extend_from_slice(&self.tail);

        let data_offset =
            align_up(self.header_size() + meta.len() as u64, 16).max(self.min_data_offset);
        let file_size = data_offset + body.len() as u64;

        let mut out = Vec::with_capacity(file_size as usize);
        if self.version >= 22 {
            put_u32(&mut out, 0, false);
            put_u32(&mut out, 0, false);
            put_u32(&mut out, self.version, false);
            put_u32(&mut out, 0, false);
        } else {
            put_u32(&mut out, meta.len() as u32, false);
            put_u32(&mut out, file_size as u32, false);
            put_u32(&mut out, self.version, false);
            put_u32(&mut out, data_offset as u32, false);
        }
        out.push(if le { 0 } else { 1 });
        out.extend_from_slice(&self.reserved);
        if self.version >= 22 {
            put_u32(&mut out, meta.len() as u32, false);
            put_u64(&mut out, file_size, false);
            put_u64(&mut out, data_offset, false);
            put_u64(&mut out, self.unknown, false);
        }
        out.extend_from_slice(&meta);
        out.resize(data_offset as usize, 0);
        out.extend_from_slice(&body);
        out
    }
}

fn read_type(
    r: &mut Cursor<&[u8]>,
    version: u32,
    le: bool,
    type_tree: bool,
) -> Result<SerializedType> {
    let start = r.position() as usize;

    let class_id = end_i32(r, le)?;
    let is_stripped = u8(r)? != 0;
    let script_type_index = end_i16(r, le)?;
    if class_id == MONO_BEHAVIOUR {
        let _script_id = bytesa::<16>(r)?;
    }
    let _old_type_hash = bytesa::<16>(r)?;

    if type_tree {
        let node_count = end_count(r, le)? as u64;
        let string_size = end_count(r, le)? as u64;
        let node_size = if version >= 19 { 32 } else { 24 };
        skip(r, node_count * node_size + string_size)?;
        if version >= 21 {
            let dependencies = end_count(r, le)? as u64;
            skip(r, dependencies * 4)?;
        }
    }

    let end = r.position() as usize;
    Ok(SerializedType {
        class_id,
        is_stripped,
        script_type_index,
        raw: r.get_ref()[start..end].to_vec(),
    })
}

fn skip(r: &mut Cursor<&[u8]>, n: u64) -> Result<()> {
    let target = r.position().checked_add(n).ok_or(Error::InvalidRange)?;
    if target > r.get_ref().len() as u64 {
        return Err(Error::UnexpectedEof);
    }
    r.set_position(target);
    Ok(())
}

fn empty_tail(version: u32, le: bool) -> Vec<u8> {
    let mut tail = Vec::new();
    put_i32(&mut tail, 0, le);
    put_i32(&mut tail, 0, le);
    if version >= 20 {
        put_i32(&mut tail, 0, le);
    }
    tail.push(0);
    tail
}
