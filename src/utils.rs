//! Low-level I/O primitives shared by all parsers and writers.
//!
//! Each read function consumes exactly the bytes it promises or returns an
//! error - there is no partial-read ambiguity. Write helpers append to a
//! `Vec<u8>` and cannot fail.

use std::io::{Read, Seek, SeekFrom};

use crate::{Error, Result};

/// Read one byte.
#[inline]
pub(crate) fn u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

/// Read a big-endian `u16`.
#[inline]
pub(crate) fn be_u16<R: Read>(r: &mut R) -> Result<u16> {
    Ok(u16::from_be_bytes(bytesa(r)?))
}

/// Read a big-endian `u32`.
#[inline]
pub(crate) fn be_u32<R: Read>(r: &mut R) -> Result<u32> {
    Ok(u32::from_be_bytes(bytesa(r)?))
}

/// Read a big-endian `u64`.
#[inline]
pub(crate) fn be_u64<R: Read>(r: &mut R) -> Result<u64> {
    Ok(u64::from_be_bytes(bytesa(r)?))
}

/// Read a big-endian `i32` element count, rejecting negative values.
#[inline]
pub(crate) fn be_count<R: Read>(r: &mut R) -> Result<usize> {
    count(be_u32(r)? as i32)
}

/// Read an `i32` element count with caller-supplied endianness, rejecting
/// negative values.
#[inline]
pub(crate) fn end_count<R: Read>(r: &mut R, le: bool) -> Result<usize> {
    count(end_i32(r, le)?)
}

#[inline]
fn count(v: i32) -> Result<usize> {
    usize::try_from(v).map_err(|_| Error::Parse("negative element count"))
}

/// Read an `i16` with caller-supplied endianness.
#[inline]
pub(crate) fn end_i16<R: Read>(r: &mut R, le: bool) -> Result<i16> {
    let b = bytesa(r)?;
    Ok(if le { i16::from_le_bytes(b) } else { i16::from_be_bytes(b) })
}

/// Read a `u32` with caller-supplied endianness.
#[inline]
pub(crate) fn end_u32<R: Read>(r: &mut R, le: bool) -> Result<u32> {
    let b = bytesa(r)?;
    Ok(if le { u32::from_le_bytes(b) } else { u32::from_be_bytes(b) })
}

/// Read an `i32` with caller-supplied endianness.
#[inline]
pub(crate) fn end_i32<R: Read>(r: &mut R, le: bool) -> Result<i32> {
    Ok(end_u32(r, le)? as i32)
}

/// Read a `u64` with caller-supplied endianness.
#[inline]
pub(crate) fn end_u64<R: Read>(r: &mut R, le: bool) -> Result<u64> {
    let b = bytesa(r)?;
    Ok(if le { u64::from_le_bytes(b) } else { u64::from_be_bytes(b) })
}

/// Read an `i64` with caller-supplied endianness.
#[inline]
pub(crate) fn end_i64<R: Read>(r: &mut R, le: bool) -> Result<i64> {
    Ok(end_u64(r, le)? as i64)
}

/// Read an `f32` with caller-supplied endianness.
#[inline]
pub(crate) fn end_f32<R: Read>(r: &mut R, le: bool) -> Result<f32> {
    Ok(f32::from_bits(end_u32(r, le)?))
}

/// Read exactly `N` bytes into a fixed-size array.
#[inline]
pub(crate) fn bytesa<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut b = [0u8; N];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Read exactly `len` bytes into a `Vec`.
///
/// `len` comes from untrusted headers, so the buffer grows with the data
/// instead of being allocated up front.
#[inline]
pub(crate) fn bytesv<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut b = Vec::new();
    r.take(len as u64).read_to_end(&mut b)?;
    if b.len() != len {
        return Err(Error::UnexpectedEof);
    }
    Ok(b)
}

/// Read a null-terminated UTF-8 string byte-by-byte from a reader.
///
/// Invalid UTF-8 is rejected with [`Error::Parse`].
pub(crate) fn read_null_string<R: Read>(r: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let b = match u8(r) {
            Ok(b) => b,
            Err(Error::UnexpectedEof) => return Err(Error::UnterminatedName),
            Err(e) => return Err(e),
        };
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    utf8(bytes)
}

/// Read an `i32`-length-prefixed string followed by padding to 4 bytes.
///
/// Alignment is relative to the reader's origin.
pub(crate) fn read_aligned_string<R: Read + Seek>(r: &mut R, le: bool) -> Result<String> {
    let len = end_i32(r, le)?;
    let len = usize::try_from(len).map_err(|_| Error::InvalidRange)?;
    let bytes = bytesv(r, len)?;
    align(r, 4)?;
    utf8(bytes)
}

/// Strict UTF-8 decode; names are written back verbatim.
fn utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| Error::Parse("string is not valid UTF-8"))
}

/// Advance the reader to the next multiple of `n` from its origin.
pub(crate) fn align<R: Seek>(r: &mut R, n: u64) -> Result<()> {
    let pos = r.stream_position()?;
    let pad = (n - pos % n) % n;
    if pad != 0 {
        r.seek(SeekFrom::Current(pad as i64))?;
    }
    Ok(())
}

/// Round `v` up to the next multiple of `n`.
#[inline]
pub(crate) fn align_up(v: u64, n: u64) -> u64 {
    v.div_ceil(n) * n
}

/// Append zero bytes until `out.len()` is a multiple of `n`.
#[inline]
pub(crate) fn pad_to(out: &mut Vec<u8>, n: usize) {
    let target = out.len().div_ceil(n) * n;
    out.resize(target, 0);
}

/// Append a `u32` with caller-supplied endianness.
#[inline]
pub(crate) fn put_u32(out: &mut Vec<u8>, v: u32, le: bool) {
    out.extend_from_slice(&if le { v.to_le_bytes() } else { v.to_be_bytes() });
}

/// Append an `i32` with caller-supplied endianness.
#[inline]
pub(crate) fn put_i32(out: &mut Vec<u8>, v: i32, le: bool) {
    put_u32(out, v as u32, le);
}

/// Append a `u64` with caller-supplied endianness.
#[inline]
pub(crate) fn put_u64(out: &mut Vec<u8>, v: u64, le: bool) {
    out.extend_from_slice(&if le { v.to_le_bytes() } else { v.to_be_bytes() });
}

/// Append a null-terminated string.
#[inline]
pub(crate) fn put_null_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Append an `i32`-length-prefixed string padded to 4 bytes.
///
/// Padding is relative to the start of `out`.
pub(crate) fn put_aligned_string(out: &mut Vec<u8>, s: &str, le: bool) {
    put_i32(out, s.len() as i32, le);
    out.extend_from_slice(s.as_bytes());
    pad_to(out, 4);
}
