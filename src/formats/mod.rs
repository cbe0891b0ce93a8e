//! Parsers and writers for the binary formats involved in a clip swap.
//!
//! All of them work on complete in-memory buffers: bundles are small enough
//! to decompress fully, and replacing an entry means rewriting the whole
//! container anyway.
//!
//! | Module         | Format |
//! |----------------|--------|
//! | [`bundle`]     | UnityFS asset bundle, LZ4 or uncompressed blocks |
//! | [`serialized`] | SerializedFile asset table inside a bundle |
//! | [`audio_clip`] | AudioClip (class 83) object payload |
//! | [`fsb5`]       | FSB5 sound-bank chunk headers |

pub mod audio_clip;
pub mod bundle;
pub mod fsb5;
pub mod serialized;
