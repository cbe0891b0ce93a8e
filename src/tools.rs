//! Ports to the external programs that prepare a sound bank, and the
//! process-backed adapters used by the command-line tool.
//!
//! The patch engine never calls these; they only feed it. Each port returns
//! an explicit [`Result`] and shares no state with the others.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use log::{debug, info};
use regex::Regex;

use crate::audio::{AudioMetadata, LoopPoints};
use crate::{Error, Result};

/// Reads stream properties from an audio file.
pub trait AudioProbe {
    fn probe(&self, path: &Path) -> Result<AudioMetadata>;
}

/// Re-encodes a track at a given sample rate in a format the muxer accepts.
pub trait FormatConverter {
    fn convert(&self, input: &Path, output: &Path, target_sample_rate: u32) -> Result<()>;
}

/// Wraps an encoded track into an FSB5 sound bank.
pub trait SoundBankMuxer {
    fn mux(&self, input: &Path, output: &Path, loop_points: Option<LoopPoints>) -> Result<()>;
}

/// SoX, used both as probe (`sox --i`) and as converter.
#[derive(Debug, Clone)]
pub struct Sox {
    program: PathBuf,
}

impl Sox {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl AudioProbe for Sox {
    fn probe(&self, path: &Path) -> Result<AudioMetadata> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--i").arg(path);
        parse_sox_info(&run(cmd)?)
    }
}

impl FormatConverter for Sox {
    fn convert(&self, input: &Path, output: &Path, target_sample_rate: u32) -> Result<()> {
        let original = self.probe(input)?;
        let is_ogg = input
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("ogg"));
        if original.sample_rate == target_sample_rate && is_ogg {
            debug!("{} is already Ogg at {} Hz", input.display(), target_sample_rate);
            fs::copy(input, output)?;
            return Ok(());
        }

        info!(
            "Converting {} ({} Hz) to {} Hz...",
            input.display(),
            original.sample_rate,
            target_sample_rate
        );
        let mut cmd = Command::new(&self.program);
        cmd.arg(input)
            .arg("-r")
            .arg(target_sample_rate.to_string())
            .arg(output);
        run(cmd)?;
        expect_output(&self.program, output)
    }
}

/// An `oggvorbis2fsb5`-style muxer: `<program> <in> <out> [start end]`.
#[derive(Debug, Clone)]
pub struct Fsb5Muxer {
    program: PathBuf,
}

impl Fsb5Muxer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl SoundBankMuxer for Fsb5Muxer {
    fn mux(&self, input: &Path, output: &Path, loop_points: Option<LoopPoints>) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(input).arg(output);
        if let Some(lp) = loop_points {
            cmd.arg(lp.start.to_string()).arg(lp.end.to_string());
        }
        run(cmd)?;
        expect_output(&self.program, output)
    }
}

/// Run a command to completion and return its standard output.
fn run(mut cmd: Command) -> Result<String> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    debug!("running {:?}", cmd);
    let output = cmd.output().map_err(|e| Error::Tool {
        program: program.clone(),
        reason: e.to_string(),
    })?;
    if !output.status.success() {
        return Err(Error::Tool {
            program,
            reason: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn expect_output(program: &Path, output: &Path) -> Result<()> {
    if output.is_file() {
        Ok(())
    } else {
        Err(Error::Tool {
            program: program.display().to_string(),
            reason: format!("no output written to {}", output.display()),
        })
    }
}

static CHANNELS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Channels\s*:\s*(\d+)").expect("valid regex"));
static SAMPLE_RATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Sample Rate\s*:\s*(\d+)").expect("valid regex"));
static PRECISION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Precision\s*:\s*(\d+)-bit").expect("valid regex"));
static SAMPLES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"=\s*(\d+)\s+samples").expect("valid regex"));

/// Parse the report printed by `sox --i`.
///
/// Channels, sample rate and sample count are required; a missing
/// precision line (lossy formats) yields `bits_per_sample == 0`.
pub fn parse_sox_info(text: &str) -> Result<AudioMetadata> {
    fn field<T: std::str::FromStr>(re: &Regex, text: &str) -> Option<T> {
        re.captures(text)?.get(1)?.as_str().parse().ok()
    }

    Ok(AudioMetadata {
        channels: field(&CHANNELS, text).ok_or(Error::ProbeOutput("channel count"))?,
        sample_rate: field(&SAMPLE_RATE, text).ok_or(Error::ProbeOutput("sample rate"))?,
        samples: field(&SAMPLES, text).ok_or(Error::ProbeOutput("sample count"))?,
        bits_per_sample: field(&PRECISION, text).unwrap_or(0),
    })
}
