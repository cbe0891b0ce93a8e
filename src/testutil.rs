//! Fixtures shared by unit tests.

use crate::formats::audio_clip::AudioClip;
use crate::formats::bundle::{Bundle, DirectoryEntry, NODE_SERIALIZED_FILE};
use crate::formats::serialized::SerializedFile;

/// A bundle with asset table `CAB-abc` holding one AudioClip per
/// `(name, resource path)` pair (44.1 kHz mono, 1 s), plus the entries
/// `CAB-abc.resource` and `CAB-abc.resS`.
pub(crate) fn clip_bundle(clips: &[(&str, &str)]) -> Bundle {
    let mut table = SerializedFile::new(21, "2019.4.40f1", true).unwrap();
    table.add_object(1, 142, vec![0; 12]).unwrap();
    for (i, (name, source)) in clips.iter().enumerate() {
        let mut clip = AudioClip::new(*name, *source);
        clip.channels = 1;
        clip.frequency = 44100;
        clip.length = 1.0;
        clip.resource.size = 64;
        table
            .add_object(100 + i as i64, AudioClip::CLASS_ID, clip.to_bytes(true))
            .unwrap();
    }

    let mut bundle = Bundle::new("5.x.x", "2019.4.40f1");
    bundle.entries = vec![
        DirectoryEntry::new("CAB-abc", table.serialize(), NODE_SERIALIZED_FILE),
        DirectoryEntry::new("CAB-abc.resource", b"FSB5 old bank".to_vec(), 0),
        DirectoryEntry::new("CAB-abc.resS", vec![0xCD; 40], 0),
    ];
    bundle
}

/// Decode the first AudioClip of a bundle.
pub(crate) fn first_clip(bundle: &Bundle) -> AudioClip {
    let table = SerializedFile::parse(&bundle.asset_table().unwrap().payload).unwrap();
    let object = table.objects_of_class(AudioClip::CLASS_ID).next().unwrap();
    AudioClip::read(&object.data, table.le, table.engine_version()).unwrap()
}
