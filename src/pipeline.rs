//! End-to-end track replacement: convert and mux a track with the external
//! tools, then patch it into a bundle file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use crate::audio::{AudioMetadata, LoopPoints};
use crate::config::ToolConfig;
use crate::formats::bundle::Bundle;
use crate::formats::fsb5::{headers_to_json, sanitize};
use crate::patch::patch;
use crate::report::current_bank_headers;
use crate::tools::{AudioProbe, FormatConverter, SoundBankMuxer};
use crate::Result;

/// One replacement job.
#[derive(Debug, Clone)]
pub struct TrackRequest {
    pub bundle: PathBuf,
    pub track: PathBuf,
    pub output: PathBuf,
    /// `(start, end)` in samples of the input track; `end` may be
    /// [`LoopPoints::TRACK_END`].
    pub loop_points: Option<(i64, i64)>,
    /// Where to write the FSB5 headers of the bank being replaced.
    pub headers_json: Option<PathBuf>,
}

/// The external collaborators a job runs with.
#[derive(Clone, Copy)]
pub struct Tools<'a> {
    pub probe: &'a dyn AudioProbe,
    pub converter: &'a dyn FormatConverter,
    pub muxer: &'a dyn SoundBankMuxer,
}

/// Outcome of a successful job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchReport {
    pub output: PathBuf,
    pub metadata: AudioMetadata,
    pub loop_points: Option<LoopPoints>,
    /// Size of the sound bank written into the bundle.
    pub payload_size: usize,
    /// Bytes cut from the muxed bank by sanitizing.
    pub removed_bytes: usize,
}

/// Replace the first AudioClip's sound bank in `request.bundle` with
/// `request.track` and write the result to `request.output`.
///
/// Intermediate files go to `work_dir`. Nothing is written to the output
/// path unless every step succeeds.
pub fn replace_track(
    config: &ToolConfig,
    tools: Tools<'_>,
    request: &TrackRequest,
    work_dir: &Path,
) -> Result<PatchReport> {
    info!("Reading bundle {}...", request.bundle.display());
    let bundle = Bundle::parse(&fs::read(&request.bundle)?)?;

    if let Some(path) = &request.headers_json {
        let headers = current_bank_headers(&bundle)?;
        info!(
            "Writing {} FSB5 header(s) to {}",
            headers.len(),
            path.display()
        );
        write_atomic(path, headers_to_json(&headers)?.as_bytes())?;
    }

    let loop_points = match request.loop_points {
        Some((start, end)) => {
            let original = tools.probe.probe(&request.track)?;
            let lp = LoopPoints::resolve(start, end, &original, config.target_sample_rate)?;
            info!("Loop points: {} - {}", lp.start, lp.end);
            Some(lp)
        }
        None => None,
    };

    let converted = work_dir.join("track.ogg");
    let muxed = work_dir.join("track.fsb");
    tools
        .converter
        .convert(&request.track, &converted, config.target_sample_rate)?;
    tools.muxer.mux(&converted, &muxed, loop_points)?;
    let metadata = tools.probe.probe(&converted)?;

    let bank = fs::read(&muxed)?;
    let payload = if config.sanitize_payload {
        sanitize(&bank)
    } else {
        bank.as_slice().into()
    };
    let removed_bytes = bank.len() - payload.len();
    if removed_bytes > 0 {
        info!("Removed {} duplicated bytes from the sound bank", removed_bytes);
    }

    let patched = patch(&bundle, &payload, &metadata)?;
    write_atomic(&request.output, &patched.serialize()?)?;
    info!("Wrote {}", request.output.display());

    Ok(PatchReport {
        output: request.output.clone(),
        metadata,
        loop_points,
        payload_size: payload.len(),
        removed_bytes,
    })
}

/// Write `data` to `path` through a temporary file in the same directory.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(data)?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::formats::fsb5::tests::chunk;
    use crate::testutil::{clip_bundle, first_clip};
    use crate::{Error, ErrorKind};

    const ORIGINAL: AudioMetadata = AudioMetadata {
        channels: 2,
        sample_rate: 44100,
        samples: 441000,
        bits_per_sample: 16,
    };
    const CONVERTED: AudioMetadata = AudioMetadata {
        channels: 2,
        sample_rate: 48000,
        samples: 480000,
        bits_per_sample: 0,
    };

    /// Reports the original track for `.wav` and the converted one for
    /// everything else.
    struct FakeProbe;

    impl AudioProbe for FakeProbe {
        fn probe(&self, path: &Path) -> Result<AudioMetadata> {
            if path.extension().is_some_and(|e| e == "wav") {
                Ok(ORIGINAL)
            } else {
                Ok(CONVERTED)
            }
        }
    }

    struct CopyConverter;

    impl FormatConverter for CopyConverter {
        fn convert(&self, input: &Path, output: &Path, _rate: u32) -> Result<()> {
            fs::copy(input, output)?;
            Ok(())
        }
    }

    struct FakeMuxer {
        bank: Vec<u8>,
        loops: RefCell<Vec<Option<LoopPoints>>>,
    }

    impl FakeMuxer {
        fn new(bank: Vec<u8>) -> Self {
            Self {
                bank,
                loops: RefCell::new(Vec::new()),
            }
        }
    }

    impl SoundBankMuxer for FakeMuxer {
        fn mux(&self, _input: &Path, output: &Path, loop_points: Option<LoopPoints>) -> Result<()> {
            self.loops.borrow_mut().push(loop_points);
            fs::write(output, &self.bank)?;
            Ok(())
        }
    }

    struct FailingMuxer;

    impl SoundBankMuxer for FailingMuxer {
        fn mux(&self, _input: &Path, _output: &Path, _lp: Option<LoopPoints>) -> Result<()> {
            Err(Error::Tool {
                program: "oggvorbis2fsb5".into(),
                reason: "exit status: 1".into(),
            })
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        request: TrackRequest,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let bundle = clip_bundle(&[("bgm", "archive:/CAB-abc/CAB-abc.resource")]);
        let bundle_path = dir.path().join("in.bundle");
        fs::write(&bundle_path, bundle.serialize().unwrap()).unwrap();
        let track = dir.path().join("track.wav");
        fs::write(&track, b"RIFF").unwrap();
        fs::create_dir(dir.path().join("work")).unwrap();

        let request = TrackRequest {
            bundle: bundle_path,
            track,
            output: dir.path().join("out").join("patched.bundle"),
            loop_points: None,
            headers_json: None,
        };
        Fixture { dir, request }
    }

    fn run(fx: &Fixture, config: &ToolConfig, muxer: &dyn SoundBankMuxer) -> Result<PatchReport> {
        let tools = Tools {
            probe: &FakeProbe,
            converter: &CopyConverter,
            muxer,
        };
        replace_track(config, tools, &fx.request, &fx.dir.path().join("work"))
    }

    #[test]
    fn replaces_track_end_to_end() {
        let fx = fixture();
        let muxer = FakeMuxer::new(b"FSB5 fresh bank".to_vec());
        let report = run(&fx, &ToolConfig::default(), &muxer).unwrap();

        assert_eq!(report.payload_size, 15);
        assert_eq!(report.removed_bytes, 0);
        assert_eq!(report.metadata, CONVERTED);

        let out = Bundle::parse(&fs::read(&fx.request.output).unwrap()).unwrap();
        assert_eq!(
            out.entry_by_name("CAB-abc.resource").unwrap().payload,
            b"FSB5 fresh bank"
        );
        let clip = first_clip(&out);
        assert_eq!(clip.frequency, 48000);
        assert_eq!(clip.resource.size, 15);
        assert_abs_diff_eq!(clip.length, 10.0, epsilon = 1e-5);
        assert_eq!(*muxer.loops.borrow(), vec![None]);
    }

    #[test]
    fn duplicated_markers_are_cut() {
        let fx = fixture();
        let muxer = FakeMuxer::new(b"FSB5aaaaFSB5bbbb".to_vec());
        let report = run(&fx, &ToolConfig::default(), &muxer).unwrap();
        assert_eq!(report.removed_bytes, 8);

        let out = Bundle::parse(&fs::read(&fx.request.output).unwrap()).unwrap();
        assert_eq!(
            out.entry_by_name("CAB-abc.resource").unwrap().payload,
            b"FSB5bbbb"
        );
    }

    #[test]
    fn sanitizing_can_be_disabled() {
        let fx = fixture();
        let config = ToolConfig {
            sanitize_payload: false,
            ..ToolConfig::default()
        };
        let muxer = FakeMuxer::new(b"FSB5aaaaFSB5bbbb".to_vec());
        let report = run(&fx, &config, &muxer).unwrap();
        assert_eq!(report.payload_size, 16);
        assert_eq!(report.removed_bytes, 0);
    }

    #[test]
    fn loop_points_are_resolved_and_rescaled() {
        let mut fx = fixture();
        fx.request.loop_points = Some((44100, LoopPoints::TRACK_END));
        let muxer = FakeMuxer::new(b"FSB5".to_vec());
        let report = run(&fx, &ToolConfig::default(), &muxer).unwrap();

        let expected = LoopPoints {
            start: 48000,
            end: 432000,
        };
        assert_eq!(report.loop_points, Some(expected));
        assert_eq!(*muxer.loops.borrow(), vec![Some(expected)]);
    }

    #[test]
    fn headers_of_the_old_bank_are_dumped() {
        let mut fx = fixture();
        let bundle = {
            let mut b = clip_bundle(&[("bgm", "archive:/CAB-abc/CAB-abc.resource")]);
            b.entries[1].payload = chunk(64, 1000, 44100, 1);
            b
        };
        fs::write(&fx.request.bundle, bundle.serialize().unwrap()).unwrap();
        let json_path = fx.dir.path().join("headers.json");
        fx.request.headers_json = Some(json_path.clone());

        run(&fx, &ToolConfig::default(), &FakeMuxer::new(b"FSB5".to_vec())).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(json[0]["Offset"], 0);
        assert_eq!(json[0]["Size"], 64);
        assert_eq!(json[0]["NumSamples"], 1000);
    }

    #[test]
    fn tool_failure_leaves_no_output() {
        let fx = fixture();
        let err = run(&fx, &ToolConfig::default(), &FailingMuxer).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Tool);
        assert!(!fx.request.output.exists());
    }

    #[test]
    fn broken_bundle_fails_before_tools_run() {
        let fx = fixture();
        fs::write(&fx.request.bundle, b"NotUnity").unwrap();
        let muxer = FakeMuxer::new(b"FSB5".to_vec());
        let err = run(&fx, &ToolConfig::default(), &muxer).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(muxer.loops.borrow().is_empty());
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
