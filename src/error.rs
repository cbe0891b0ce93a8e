//! Library-wide error and result types.

use std::io;

use thiserror::Error;

/// Result alias used throughout clipswap.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// Low-level parse failures are kept terse; the patch-level variants carry
/// the entry and clip names needed to explain what went wrong.
#[derive(Error, Debug)]
pub enum Error {
    /// A magic/signature field did not match the expected value.
    #[error("bad magic value")]
    BadMagic,
    /// A format version is present in the data but not supported.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u32),
    /// A compression scheme is declared that this build cannot handle.
    #[error("unsupported compression type: {0}")]
    UnsupportedCompression(u32),
    /// The buffer ended before all expected bytes could be read.
    #[error("unexpected end of data")]
    UnexpectedEof,
    /// A null-terminated string had no null terminator within the buffer.
    #[error("unterminated string")]
    UnterminatedName,
    /// An offset or size field would read outside the valid region.
    #[error("invalid offset or size")]
    InvalidRange,
    /// A structural constraint was violated (message describes which one).
    #[error("parse error: {0}")]
    Parse(&'static str),
    /// A sound-bank chunk declares more bytes than the buffer holds.
    #[error("chunk at {offset:#x} declares {size} bytes but only {available} remain")]
    BufferBounds {
        offset: usize,
        size: u64,
        available: usize,
    },
    /// The asset table holds no audio clip.
    #[error("no AudioClip found in asset table {table:?}")]
    AssetNotFound { table: Option<String> },
    /// An audio clip points at a directory entry the bundle does not have.
    #[error("AudioClip '{clip}' references '{resource}' but the bundle has no usable entry '{entry}'")]
    ResourceMismatch {
        clip: String,
        resource: String,
        entry: String,
    },
    /// A replacement named an entry that is not in the bundle.
    #[error("no directory entry named '{0}'")]
    EntryNotFound(String),
    /// Audio metadata cannot be written into a clip.
    #[error("invalid audio metadata: {0}")]
    InvalidMetadata(&'static str),
    /// An external program failed or produced nothing.
    #[error("`{program}` failed: {reason}")]
    Tool { program: String, reason: String },
    /// A probe tool's output lacked a field.
    #[error("could not read {0} from probe output")]
    ProbeOutput(&'static str),
    /// LZ4 decompression failed.
    #[cfg(feature = "compression")]
    #[error("lz4 decompression failed")]
    Lz4,
    /// An underlying I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
    /// Diagnostics could not be rendered.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of an [`Error`], for callers that only need to
/// decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Magic absent, structure unparsable, or unsupported encoding.
    Format,
    /// No audio clip in the asset table.
    AssetNotFound,
    /// Clip resource and directory disagree.
    ResourceMismatch,
    /// A chunk would run past the end of its buffer.
    BufferBounds,
    /// Probe results unusable for patching.
    InvalidMetadata,
    /// An external collaborator failed.
    Tool,
    /// Filesystem or rendering failure.
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadMagic
            | Error::UnsupportedVersion(_)
            | Error::UnsupportedCompression(_)
            | Error::UnexpectedEof
            | Error::UnterminatedName
            | Error::InvalidRange
            | Error::Parse(_) => ErrorKind::Format,
            #[cfg(feature = "compression")]
            Error::Lz4 => ErrorKind::Format,
            Error::BufferBounds { .. } => ErrorKind::BufferBounds,
            Error::AssetNotFound { .. } => ErrorKind::AssetNotFound,
            Error::ResourceMismatch { .. } | Error::EntryNotFound(_) => {
                ErrorKind::ResourceMismatch
            }
            Error::InvalidMetadata(_) => ErrorKind::InvalidMetadata,
            Error::Tool { .. } | Error::ProbeOutput(_) => ErrorKind::Tool,
            Error::Io(_) | Error::Json(_) => ErrorKind::Io,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        // Short reads only happen on in-memory cursors, i.e. truncated data.
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(e)
        }
    }
}
