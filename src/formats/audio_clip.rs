//! AudioClip (class 83) - the asset-table record describing one sound.
//!
//! Since Unity 5 the encoded sound bank lives outside the record, in a
//! directory entry (usually `CAB-<hash>.resource`) named by the clip's
//! streamed resource.
//!
//! ## Layout (Unity 5.x - 2022)
//! ```text
//! Name               (aligned string)
//! LoadType           (i32)
//! Channels           (i32)
//! Frequency          (i32)
//! BitsPerSample      (i32)
//! Length             (f32, seconds)
//! IsTrackerFormat    (bool)
//! Ambisonic          (bool, 2017.1+)
//! -- align 4 --
//! SubsoundIndex      (i32)
//! PreloadAudioData   (bool)
//! LoadInBackground   (bool)
//! Legacy3D           (bool)
//! -- align 4 --
//! Resource.Source    (aligned string, e.g. "archive:/CAB-x/CAB-x.resource")
//! Resource.Offset    (u64)
//! Resource.Size      (u64)
//! CompressionFormat  (i32)
//! ```
//! Strings are an `i32` byte length followed by UTF-8 bytes.

use std::io::Cursor;

use log::warn;

use crate::audio::AudioMetadata;
use crate::formats::serialized::UnityVersion;
use crate::utils::{
    align, end_f32, end_i32, end_u64, pad_to, put_aligned_string, put_i32, put_u32, put_u64,
    read_aligned_string, u8,
};
use crate::{Error, Result};

/// Prefix of resource paths that point into the same bundle.
pub const ARCHIVE_PREFIX: &str = "archive:/";

/// Location of a clip's encoded audio.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamedResource {
    /// Path of the directory entry holding the audio.
    pub source: String,
    /// Byte offset of the sound bank within that entry.
    pub offset: u64,
    /// Sound-bank size in bytes.
    pub size: u64,
}

/// Decoded AudioClip record.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub name: String,
    pub load_type: i32,
    pub channels: i32,
    pub frequency: i32,
    pub bits_per_sample: i32,
    /// Length in seconds.
    pub length: f32,
    pub is_tracker_format: bool,
    /// Present for engine 2017.1 and newer.
    pub ambisonic: Option<bool>,
    pub subsound_index: i32,
    pub preload_audio_data: bool,
    pub load_in_background: bool,
    pub legacy_3d: bool,
    pub resource: StreamedResource,
    pub compression_format: i32,
    trailing: Vec<u8>,
}

impl AudioClip {
    /// Class id of AudioClip objects.
    pub const CLASS_ID: i32 = 83;

    /// A clip with default settings pointing at `source`.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            load_type: 0,
            channels: 0,
            frequency: 0,
            bits_per_sample: 16,
            length: 0.0,
            is_tracker_format: false,
            ambisonic: Some(false),
            subsound_index: 0,
            preload_audio_data: true,
            load_in_background: false,
            legacy_3d: true,
            resource: StreamedResource {
                source: source.into(),
                offset: 0,
                size: 0,
            },
            // Vorbis
            compression_format: 1,
            trailing: Vec::new(),
        }
    }

    /// Decode a clip from an object payload.
    ///
    /// `engine` decides whether the ambisonic flag is present; an unknown
    /// engine version is treated as 2017.1 or newer.
    pub fn read(data: &[u8], le: bool, engine: Option<UnityVersion>) -> Result<Self> {
        let mut r = Cursor::new(data);

        let name = read_aligned_string(&mut r, le)?;
        let load_type = end_i32(&mut r, le)?;
        let channels = end_i32(&mut r, le)?;
        let frequency = end_i32(&mut r, le)?;
        let bits_per_sample = end_i32(&mut r, le)?;
        let length = end_f32(&mut r, le)?;
        let is_tracker_format = u8(&mut r)? != 0;
        let ambisonic = if has_ambisonic(engine) {
            Some(u8(&mut r)? != 0)
        } else {
            None
        };
        align(&mut r, 4)?;
        let subsound_index = end_i32(&mut r, le)?;
        let preload_audio_data = u8(&mut r)? != 0;
        let load_in_background = u8(&mut r)? != 0;
        let legacy_3d = u8(&mut r)? != 0;
        align(&mut r, 4)?;
        let source = read_aligned_string(&mut r, le)?;
        let offset = end_u64(&mut r, le)?;
        let size = end_u64(&mut r, le)?;
        let compression_format = end_i32(&mut r, le)?;

        let trailing = data[r.position() as usize..].to_vec();

        Ok(Self {
            name,
            load_type,
            channels,
            frequency,
            bits_per_sample,
            length,
            is_tracker_format,
            ambisonic,
            subsound_index,
            preload_audio_data,
            load_in_background,
            legacy_3d,
            resource: StreamedResource {
                source,
                offset,
                size,
            },
            compression_format,
            trailing,
        })
    }

    /// Encode the clip as an object payload.
    pub fn to_bytes(&self, le: bool) -> Vec<u8> {
        let mut out = Vec::new();
        put_aligned_string(&mut out, &self.name, le);
        put_i32(&mut out, self.load_type, le);
        put_i32(&mut out, self.channels, le);
        put_i32(&mut out, self.frequency, le);
        put_i32(&mut out, self.bits_per_sample, le);
        put_u32(&mut out, self.length.to_bits(), le);
        out.push(self.is_tracker_format as u8);
        if let Some(ambisonic) = self.ambisonic {
            out.push(ambisonic as u8);
        }
        pad_to(&mut out, 4);
        put_i32(&mut out, self.subsound_index, le);
        out.push(self.preload_audio_data as u8);
        out.push(self.load_in_background as u8);
        out.push(self.legacy_3d as u8);
        pad_to(&mut out, 4);
        put_aligned_string(&mut out, &self.resource.source, le);
        put_u64(&mut out, self.resource.offset, le);
        put_u64(&mut out, self.resource.size, le);
        put_i32(&mut out, self.compression_format, le);
        out.extend_from_slice(&self.trailing);
        out
    }

    /// Name of the directory entry that holds this clip's audio.
    pub fn resource_entry_name(&self) -> &str {
        resource_file_name(&self.resource.source)
    }

    /// Point the clip at a new sound bank of `resource_size` bytes described
    /// by `metadata`. The bank fills its resource entry, so the offset is
    /// reset to 0.
    ///
    /// The clip is left untouched when `metadata` cannot be represented.
    pub fn set_stream(&mut self, resource_size: u64, metadata: &AudioMetadata) -> Result<()> {
        if metadata.sample_rate == 0 {
            return Err(Error::InvalidMetadata("sample rate is zero"));
        }
        if metadata.channels == 0 {
            return Err(Error::InvalidMetadata("channel count is zero"));
        }
        let frequency = i32::try_from(metadata.sample_rate)
            .map_err(|_| Error::InvalidMetadata("sample rate out of range"))?;
        let channels = i32::try_from(metadata.channels)
            .map_err(|_| Error::InvalidMetadata("channel count out of range"))?;

        if self.resource.offset != 0 {
            warn!(
                "{}: resetting resource offset {} to 0",
                self.name, self.resource.offset
            );
        }
        self.resource.offset = 0;
        self.resource.size = resource_size;
        self.length = metadata.duration_secs();
        self.frequency = frequency;
        self.channels = channels;
        Ok(())
    }
}

/// Directory entry name for a resource path: drop an `archive:/` prefix and
/// keep the last path component.
pub fn resource_file_name(source: &str) -> &str {
    let path = source.strip_prefix(ARCHIVE_PREFIX).unwrap_or(source);
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn has_ambisonic(engine: Option<UnityVersion>) -> bool {
    engine.is_none_or(|v| v >= UnityVersion { major: 2017, minor: 1 })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    const MODERN: Option<UnityVersion> = Some(UnityVersion {
        major: 2019,
        minor: 4,
    });
    const LEGACY: Option<UnityVersion> = Some(UnityVersion { major: 5, minor: 6 });

    fn clip() -> AudioClip {
        let mut clip = AudioClip::new("bgm_title", "archive:/CAB-abc/CAB-abc.resource");
        clip.channels = 2;
        clip.frequency = 44100;
        clip.length = 1.5;
        clip.resource.size = 4096;
        clip
    }

    #[test]
    fn round_trip_modern_layout() {
        let clip = clip();
        for le in [true, false] {
            let bytes = clip.to_bytes(le);
            assert_eq!(AudioClip::read(&bytes, le, MODERN).unwrap(), clip);
            assert_eq!(AudioClip::read(&bytes, le, None).unwrap(), clip);
        }
    }

    #[test]
    fn legacy_layout_has_no_ambisonic_flag() {
        let mut clip = clip();
        clip.ambisonic = None;
        let bytes = clip.to_bytes(true);
        let parsed = AudioClip::read(&bytes, true, LEGACY).unwrap();
        assert_eq!(parsed.ambisonic, None);
        assert_eq!(parsed.resource, clip.resource);
    }

    #[test]
    fn layout_offsets() {
        let bytes = clip().to_bytes(true);
        // name: 4 + 9 bytes, padded to 16
        assert_eq!(&bytes[0..4], &9i32.to_le_bytes());
        assert_eq!(&bytes[20..24], &2i32.to_le_bytes());
        assert_eq!(&bytes[24..28], &44100i32.to_le_bytes());
        assert_eq!(&bytes[32..36], &1.5f32.to_le_bytes());
    }

    #[test]
    fn trailing_bytes_survive() {
        let mut bytes = clip().to_bytes(true);
        bytes.extend_from_slice(&[0xEE; 6]);
        let parsed = AudioClip::read(&bytes, true, MODERN).unwrap();
        assert_eq!(parsed.to_bytes(true), bytes);
    }

    #[test]
    fn truncated_clip_is_an_error() {
        let bytes = clip().to_bytes(true);
        let err = AudioClip::read(&bytes[..bytes.len() - 2], true, MODERN).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof));
    }

    #[test]
    fn set_stream_updates_bookkeeping() {
        let mut clip = clip();
        let meta = AudioMetadata {
            channels: 1,
            sample_rate: 48000,
            samples: 24000,
            bits_per_sample: 16,
        };
        clip.set_stream(1234, &meta).unwrap();
        assert_eq!(clip.resource.size, 1234);
        assert_eq!(clip.frequency, 48000);
        assert_eq!(clip.channels, 1);
        assert_abs_diff_eq!(clip.length, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn set_stream_points_at_the_start_of_the_entry() {
        let mut clip = clip();
        clip.resource.offset = 0x2000;
        let meta = AudioMetadata {
            channels: 2,
            sample_rate: 48000,
            samples: 96000,
            bits_per_sample: 16,
        };
        clip.set_stream(512, &meta).unwrap();
        assert_eq!(clip.resource.offset, 0);
        assert_eq!(clip.resource.size, 512);
    }

    #[test]
    fn set_stream_rejects_unusable_metadata() {
        let mut clip = clip();
        let before = clip.clone();
        let meta = AudioMetadata {
            channels: 2,
            sample_rate: 0,
            samples: 1,
            bits_per_sample: 16,
        };
        assert!(matches!(
            clip.set_stream(1, &meta),
            Err(Error::InvalidMetadata(_))
        ));
        assert_eq!(clip, before);
    }

    #[test]
    fn resource_names() {
        assert_eq!(
            resource_file_name("archive:/CAB-abc/CAB-abc.resource"),
            "CAB-abc.resource"
        );
        assert_eq!(resource_file_name("CAB-abc.resS"), "CAB-abc.resS");
        assert_eq!(resource_file_name("Assets\\Audio\\bgm.resource"), "bgm.resource");
        assert_eq!(resource_file_name(""), "");
        assert_eq!(clip().resource_entry_name(), "CAB-abc.resource");
    }
}
