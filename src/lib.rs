//! **clipswap** - replace the FSB5 sound bank streamed by a Unity
//! AudioClip and keep the clip's bookkeeping consistent.
//!
//! # Layers
//! | Module | Role |
//! |--------|------|
//! | [`formats::bundle`]     | UnityFS container: parse, replace entries, serialize |
//! | [`formats::serialized`] | Asset table (SerializedFile v17-22) |
//! | [`formats::audio_clip`] | AudioClip record |
//! | [`formats::fsb5`]       | FSB5 header scanner and payload sanitizer |
//! | [`patch`]               | Payload and metadata replacement on a bundle |
//! | [`tools`]               | External probe, converter and muxer |
//! | [`pipeline`]            | Track-to-bundle job driving all of the above |
//! | [`report`]              | Read-only bundle summaries |
//!
//! The core never touches the filesystem; only [`pipeline`] and [`tools`]
//! do.

pub mod audio;
pub mod compression;
pub mod config;
pub mod error;
pub mod formats;
pub mod patch;
pub mod pipeline;
pub mod report;
pub mod tools;
pub(crate) mod utils;

#[cfg(test)]
mod testutil;

pub use audio::{AudioMetadata, LoopPoints};
pub use config::ToolConfig;
pub use error::{Error, ErrorKind, Result};
pub use formats::bundle::{Bundle, DirectoryEntry};
pub use patch::patch;
