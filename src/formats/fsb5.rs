//! FSB5 sound-bank chunk detection.
//!
//! Unity stores audio clips as FMOD FSB5 sound banks inside `.resource`
//! directory entries. This module offers two deliberately different
//! searches over a raw byte buffer:
//!
//! * [`scan_headers`] is **chunk-aware**: it parses a header wherever the
//!   marker appears and then jumps over the whole declared chunk, so markers
//!   inside a chunk body are never reported.
//! * [`magic_positions`] is **literal**: every offset where the 4-byte
//!   marker occurs, including ones inside chunk bodies. [`sanitize`] builds
//!   on it.
//!
//! ## Header fields read by the scanner
//! ```text
//! [+0x00] Magic "FSB5"   (4 bytes)
//! [+0x04] ChunkSize      (u32 LE)
//! [+0x10] NumSamples     (u32 LE)
//! [+0x2C] SampleRate     (u32 LE)
//! [+0x30] NumChannels    (u32 LE)
//! ```

use std::borrow::Cow;

use log::{debug, warn};
use serde::Serialize;

use crate::{Error, Result};

/// The 4-byte marker opening every FSB5 chunk.
pub const FSB5_MAGIC: &[u8; 4] = b"FSB5";

/// Bytes a header needs past the marker offset to be readable.
pub const HEADER_LEN: usize = 0x34;

const SIZE_OFFSET: usize = 0x04;
const NUM_SAMPLES_OFFSET: usize = 0x10;
const SAMPLE_RATE_OFFSET: usize = 0x2C;
const NUM_CHANNELS_OFFSET: usize = 0x30;

/// One FSB5 header found by [`scan_headers`].
///
/// Serializes with the field names of the JSON diagnostics dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeaderRecord {
    /// Byte offset of the marker within the scanned buffer.
    pub offset: usize,
    /// Declared chunk size.
    #[serde(rename = "Size")]
    pub chunk_size: u32,
    pub num_samples: u32,
    pub sample_rate: u32,
    pub num_channels: u32,
}

/// Find every FSB5 chunk header in `data`, in ascending offset order.
///
/// After each header the scan resumes `chunk_size` bytes past the marker.
/// A declared size shorter than the marker itself resumes right after the
/// marker, so the scan always moves forward.
///
/// A buffer without any marker yields an empty list. A header that is cut
/// off, or whose declared chunk runs past the end of `data`, returns
/// [`Error::BufferBounds`].
pub fn scan_headers(data: &[u8]) -> Result<Vec<HeaderRecord>> {
    let mut headers = Vec::new();
    let mut index = 0usize;

    while index + FSB5_MAGIC.len() <= data.len() {
        if &data[index..index + FSB5_MAGIC.len()] != FSB5_MAGIC {
            index += 1;
            continue;
        }

        let available = data.len() - index;
        if available < HEADER_LEN {
            return Err(Error::BufferBounds {
                offset: index,
                size: HEADER_LEN as u64,
                available,
            });
        }

        let header = HeaderRecord {
            offset: index,
            chunk_size: le_u32_at(data, index + SIZE_OFFSET),
            num_samples: le_u32_at(data, index + NUM_SAMPLES_OFFSET),
            sample_rate: le_u32_at(data, index + SAMPLE_RATE_OFFSET),
            num_channels: le_u32_at(data, index + NUM_CHANNELS_OFFSET),
        };
        if header.chunk_size as usize > available {
            return Err(Error::BufferBounds {
                offset: index,
                size: header.chunk_size as u64,
                available,
            });
        }
        debug!(
            "FSB5 header at {:#x}: {} bytes, {} samples @ {} Hz x{}",
            header.offset,
            header.chunk_size,
            header.num_samples,
            header.sample_rate,
            header.num_channels
        );
        headers.push(header);

        index += (header.chunk_size as usize).max(FSB5_MAGIC.len());
    }

    Ok(headers)
}

/// Every offset at which the FSB5 marker literally occurs, ascending.
///
/// Overlapping and nested occurrences are all reported.
pub fn magic_positions(data: &[u8]) -> Vec<usize> {
    data.windows(FSB5_MAGIC.len())
        .enumerate()
        .filter(|(_, w)| *w == FSB5_MAGIC)
        .map(|(i, _)| i)
        .collect()
}

/// Collapse a payload with several FSB5 markers down to one logical chunk.
///
/// With zero or one marker the input is returned untouched. Otherwise the
/// bytes from the first marker up to (not including) the last marker are
/// cut out, so the result is `data[..first] ++ data[last..]`.
pub fn sanitize(data: &[u8]) -> Cow<'_, [u8]> {
    let positions = magic_positions(data);
    let (first, last) = match (positions.first(), positions.last()) {
        (Some(&first), Some(&last)) if first != last => (first, last),
        _ => return Cow::Borrowed(data),
    };

    if positions.len() > 2 {
        warn!(
            "{} FSB5 markers in payload; keeping only the one at {:#x}",
            positions.len(),
            last
        );
    }
    debug!("cutting {:#x}..{:#x} out of sound bank payload", first, last);

    let mut out = Vec::with_capacity(data.len() - (last - first));
    out.extend_from_slice(&data[..first]);
    out.extend_from_slice(&data[last..]);
    Cow::Owned(out)
}

/// Render header records as the indented JSON diagnostics document.
pub fn headers_to_json(headers: &[HeaderRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(headers)?)
}

fn le_u32_at(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}
