//! Settings for the external tools and the replacement pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Pipeline settings, loadable from a JSON file.
///
/// Missing keys take their [`Default`] values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Sample rate every track is converted to before muxing.
    pub target_sample_rate: u32,
    /// SoX executable used for probing and conversion.
    pub sox: PathBuf,
    /// FSB5 muxer executable.
    pub muxer: PathBuf,
    /// Cut duplicated FSB5 markers out of the muxed payload.
    pub sanitize_payload: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 48000,
            sox: PathBuf::from("sox"),
            muxer: PathBuf::from("oggvorbis2fsb5"),
            sanitize_payload: true,
        }
    }
}

impl ToolConfig {
    /// Read a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "target_sample_rate": 44100, "sox": "tools/sox.exe" }}"#).unwrap();

        let config = ToolConfig::load(file.path()).unwrap();
        assert_eq!(config.target_sample_rate, 44100);
        assert_eq!(config.sox, PathBuf::from("tools/sox.exe"));
        assert_eq!(config.muxer, PathBuf::from("oggvorbis2fsb5"));
        assert!(config.sanitize_payload);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "target_sample_rate = 44100").unwrap();
        assert!(ToolConfig::load(file.path()).is_err());
    }
}
