//! Read-only summaries of a bundle for the `inspect` command and for the
//! pipeline's header dump.

use serde::Serialize;

use crate::formats::audio_clip::AudioClip;
use crate::formats::bundle::Bundle;
use crate::formats::fsb5::{scan_headers, HeaderRecord};
use crate::formats::serialized::{SerializedFile, UnityVersion};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleReport {
    pub format_version: u32,
    pub unity_version: String,
    pub unity_revision: String,
    pub compression: String,
    pub entries: Vec<EntryReport>,
    /// Name of the entry decoded as asset table, if any.
    pub asset_table: Option<String>,
    pub clips: Vec<ClipReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryReport {
    pub name: String,
    pub size: usize,
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipReport {
    pub path_id: i64,
    pub name: String,
    pub channels: i32,
    pub frequency: i32,
    pub length: f32,
    pub source: String,
    pub offset: u64,
    pub size: u64,
    /// Directory entry the source resolves to.
    pub resource_entry: String,
    /// Whether that entry exists in the bundle.
    pub resolved: bool,
}

/// Summarize the entries and AudioClips of a bundle.
pub fn inspect(bundle: &Bundle) -> Result<BundleReport> {
    let entries = bundle
        .entries
        .iter()
        .map(|e| EntryReport {
            name: e.name.clone(),
            size: e.payload.len(),
            flags: e.flags,
        })
        .collect();

    let mut clips = Vec::new();
    let table_entry = bundle.asset_table();
    if let Some(table_entry) = table_entry {
        let table = SerializedFile::parse(&table_entry.payload)?;
        let engine = table
            .engine_version()
            .or_else(|| UnityVersion::parse(&bundle.unity_revision));
        for object in table.objects_of_class(AudioClip::CLASS_ID) {
            let clip = AudioClip::read(&object.data, table.le, engine)?;
            let resource_entry = clip.resource_entry_name().to_owned();
            clips.push(ClipReport {
                path_id: object.path_id,
                resolved: bundle.entry_by_name(&resource_entry).is_some(),
                resource_entry,
                name: clip.name,
                channels: clip.channels,
                frequency: clip.frequency,
                length: clip.length,
                source: clip.resource.source,
                offset: clip.resource.offset,
                size: clip.resource.size,
            });
        }
    }

    Ok(BundleReport {
        format_version: bundle.format_version,
        unity_version: bundle.unity_version.clone(),
        unity_revision: bundle.unity_revision.clone(),
        compression: format!("{:?}", bundle.compression),
        entries,
        asset_table: table_entry.map(|e| e.name.clone()),
        clips,
    })
}

/// FSB5 headers of the sound bank the first AudioClip currently streams.
///
/// Only the clip's `[offset, offset + size)` window of its resource entry is
/// scanned; the window is clamped to the entry.
pub fn current_bank_headers(bundle: &Bundle) -> Result<Vec<HeaderRecord>> {
    let report = inspect(bundle)?;
    let clip = report.clips.first().ok_or(Error::AssetNotFound {
        table: report.asset_table.clone(),
    })?;
    let entry = bundle
        .entry_by_name(&clip.resource_entry)
        .ok_or_else(|| Error::ResourceMismatch {
            clip: clip.name.clone(),
            resource: clip.source.clone(),
            entry: clip.resource_entry.clone(),
        })?;

    let len = entry.payload.len() as u64;
    let start = clip.offset.min(len) as usize;
    let end = clip.offset.saturating_add(clip.size).min(len) as usize;
    scan_headers(&entry.payload[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::bundle::DirectoryEntry;
    use crate::formats::fsb5::tests::chunk;
    use crate::testutil::clip_bundle;
    use crate::ErrorKind;

    #[test]
    fn lists_entries_and_clips() {
        let bundle = clip_bundle(&[
            ("intro", "archive:/CAB-abc/CAB-abc.resource"),
            ("lost", "archive:/CAB-abc/CAB-gone.resource"),
        ]);
        let report = inspect(&bundle).unwrap();

        assert_eq!(report.asset_table.as_deref(), Some("CAB-abc"));
        let names: Vec<_> = report.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["CAB-abc", "CAB-abc.resource", "CAB-abc.resS"]);
        assert_eq!(report.entries[2].size, 40);

        assert_eq!(report.clips.len(), 2);
        assert_eq!(report.clips[0].path_id, 100);
        assert_eq!(report.clips[0].resource_entry, "CAB-abc.resource");
        assert!(report.clips[0].resolved);
        assert!(!report.clips[1].resolved);
    }

    #[test]
    fn report_renders_as_json() {
        let bundle = clip_bundle(&[("bgm", "archive:/CAB-abc/CAB-abc.resource")]);
        let json = serde_json::to_value(inspect(&bundle).unwrap()).unwrap();
        assert_eq!(json["clips"][0]["name"], "bgm");
        assert_eq!(json["clips"][0]["frequency"], 44100);
        assert_eq!(json["compression"], "None");
    }

    #[test]
    fn bundle_without_table_has_no_clips() {
        let mut bundle = clip_bundle(&[("bgm", "archive:/CAB-abc/CAB-abc.resource")]);
        bundle.entries.retain(|e| !e.is_serialized_table());
        let report = inspect(&bundle).unwrap();
        assert_eq!(report.asset_table, None);
        assert!(report.clips.is_empty());
    }

    #[test]
    fn bank_headers_come_from_the_clip_window() {
        let mut bundle = clip_bundle(&[("bgm", "archive:/CAB-abc/CAB-abc.resource")]);
        let bank = chunk(64, 44100, 44100, 1);
        // The fixture clip streams 64 bytes from offset 0.
        bundle.entries[1] = DirectoryEntry::new("CAB-abc.resource", bank, 0);

        let headers = current_bank_headers(&bundle).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].offset, 0);
        assert_eq!(headers[0].sample_rate, 44100);
    }

    #[test]
    fn bank_headers_need_a_clip() {
        let bundle = clip_bundle(&[]);
        let err = current_bank_headers(&bundle).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AssetNotFound);
    }
}
