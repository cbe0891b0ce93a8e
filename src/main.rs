//! clipswap CLI
//!
//! Swap the sound bank of a Unity audio bundle, or look inside one.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;

use clipswap::formats::fsb5::{headers_to_json, scan_headers};
use clipswap::pipeline::{self, Tools, TrackRequest};
use clipswap::tools::{Fsb5Muxer, Sox};
use clipswap::{Bundle, ToolConfig, report};

/// Replace the FSB5 sound bank streamed by a Unity AudioClip
#[derive(Parser, Debug)]
#[command(name = "clipswap")]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON tool configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the FSB5 headers found in a file as JSON
    Headers {
        file: PathBuf,

        /// Write the JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the entries and audio clips of a bundle as JSON
    Inspect { bundle: PathBuf },

    /// Convert a track and patch it into a bundle
    Patch {
        #[arg(short, long)]
        bundle: PathBuf,

        /// Audio file to put into the bundle
        #[arg(short, long)]
        track: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Loop start, in samples of the input track
        #[arg(long, requires = "loop_end")]
        loop_start: Option<i64>,

        /// Loop end, in samples of the input track; -1 means one second
        /// before the end
        #[arg(long, requires = "loop_start", allow_negative_numbers = true)]
        loop_end: Option<i64>,

        /// Overrides the configured target sample rate
        #[arg(long)]
        target_sample_rate: Option<u32>,

        /// Dump the headers of the bank being replaced to this file
        #[arg(long)]
        headers_json: Option<PathBuf>,

        /// Do not cut duplicated FSB5 markers from the muxed bank
        #[arg(long)]
        keep_duplicate_headers: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        let kind = e
            .downcast_ref::<clipswap::Error>()
            .map(|e| format!(" ({:?})", e.kind()))
            .unwrap_or_default();
        eprintln!("error{kind}: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ToolConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ToolConfig::default(),
    };

    match cli.command {
        Commands::Headers { file, output } => {
            let data = fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let json = headers_to_json(&scan_headers(&data)?)?;
            emit(&json, output.as_deref())
        }
        Commands::Inspect { bundle } => {
            let data =
                fs::read(&bundle).with_context(|| format!("failed to read {}", bundle.display()))?;
            let report = report::inspect(&Bundle::parse(&data)?)?;
            emit(&serde_json::to_string_pretty(&report)?, None)
        }
        Commands::Patch {
            bundle,
            track,
            output,
            loop_start,
            loop_end,
            target_sample_rate,
            headers_json,
            keep_duplicate_headers,
        } => {
            if let Some(rate) = target_sample_rate {
                config.target_sample_rate = rate;
            }
            if keep_duplicate_headers {
                config.sanitize_payload = false;
            }

            let sox = Sox::new(&config.sox);
            let muxer = Fsb5Muxer::new(&config.muxer);
            let tools = Tools {
                probe: &sox,
                converter: &sox,
                muxer: &muxer,
            };
            let request = TrackRequest {
                bundle,
                track,
                output,
                loop_points: loop_start.zip(loop_end),
                headers_json,
            };
            let work_dir = tempfile::tempdir().context("failed to create work directory")?;

            let report = pipeline::replace_track(&config, tools, &request, work_dir.path())
                .with_context(|| format!("failed to patch {}", request.bundle.display()))?;
            info!(
                "Done: {} bytes, {} Hz, {} channel(s)",
                report.payload_size, report.metadata.sample_rate, report.metadata.channels
            );
            Ok(())
        }
    }
}

fn emit(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => pipeline::write_atomic(path, text.as_bytes())
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}
