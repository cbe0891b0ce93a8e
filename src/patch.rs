//! Sound-bank replacement for a bundle's audio clip.
//!
//! Patching never touches the input bundle: it decodes the asset table,
//! rewrites the first AudioClip record, and returns a new [`Bundle`] in which
//! exactly two entries differ - the asset table and the clip's resource
//! file.

use log::info;

use crate::audio::AudioMetadata;
use crate::formats::audio_clip::AudioClip;
use crate::formats::bundle::{Bundle, DirectoryEntry};
use crate::formats::serialized::{SerializedFile, UnityVersion};
use crate::{Error, Result};

/// Replace the sound bank of the first AudioClip in `bundle`.
///
/// Only the first clip in object-table order is considered, even when the
/// asset table holds several.
///
/// # Errors
/// * [`Error::AssetNotFound`] - no asset table, or no AudioClip in it.
/// * [`Error::ResourceMismatch`] - the clip's resource path does not name
///   a resource entry of the bundle.
/// * [`Error::InvalidMetadata`] - `metadata` cannot be stored in a clip.
/// * format errors from decoding the asset table or the clip.
pub fn patch(bundle: &Bundle, payload: &[u8], metadata: &AudioMetadata) -> Result<Bundle> {
    let table_entry = bundle
        .asset_table()
        .ok_or(Error::AssetNotFound { table: None })?;
    info!("Loading asset table {}...", table_entry.name);
    let mut table = SerializedFile::parse(&table_entry.payload)?;
    let engine = table
        .engine_version()
        .or_else(|| UnityVersion::parse(&bundle.unity_revision));
    let le = table.le;

    let object = table
        .objects
        .iter_mut()
        .find(|o| o.class_id == AudioClip::CLASS_ID)
        .ok_or_else(|| Error::AssetNotFound {
            table: Some(table_entry.name.clone()),
        })?;
    let mut clip = AudioClip::read(&object.data, le, engine)?;
    info!("Found AudioClip {} (path id {})", clip.name, object.path_id);

    let resource_name = clip.resource_entry_name().to_owned();
    let resource_entry = bundle
        .entry_by_name(&resource_name)
        .filter(|e| e.name != table_entry.name)
        .ok_or_else(|| Error::ResourceMismatch {
            clip: clip.name.clone(),
            resource: clip.resource.source.clone(),
            entry: resource_name.clone(),
        })?;

    clip.set_stream(payload.len() as u64, metadata)?;
    object.data = clip.to_bytes(le);
    info!(
        "Updated {}: {} bytes, {:.3}s, {} Hz, {} channel(s)",
        clip.name, clip.resource.size, clip.length, clip.frequency, clip.channels
    );

    let table_bytes = table.serialize();
    bundle.replaced([
        DirectoryEntry::new(table_entry.name.clone(), table_bytes, table_entry.flags),
        DirectoryEntry::new(resource_name, payload.to_vec(), resource_entry.flags),
    ])
}
