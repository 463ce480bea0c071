// src/main.rs
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;

use skeleton_depth::data::{read_frames, DataExporter};
use skeleton_depth::{DepthTracker, FilterConfig};

const USAGE: &str =
    "usage: skeleton_depth <input.csv|input.jsonl|input.json> [--config file.json] [--output out.csv] [--angles]";

struct Args {
    input: PathBuf,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    features: bool,
}

fn parse_args() -> Result<Args> {
    let mut input = None;
    let mut config = None;
    let mut output = None;
    let mut features = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(args.next().context("--config needs a path")?.into()),
            "--output" => output = Some(args.next().context("--output needs a path")?.into()),
            "--angles" | "--features" => features = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => bail!("unknown option `{flag}`\n{USAGE}"),
            path if input.is_none() => input = Some(PathBuf::from(path)),
            extra => bail!("unexpected argument `{extra}`\n{USAGE}"),
        }
    }

    Ok(Args {
        input: input.context(USAGE)?,
        config,
        output,
        features,
    })
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => FilterConfig::load(path)?,
        None => FilterConfig::default(),
    };

    let frames = read_frames(&args.input)?;
    info!(frames = frames.len(), input = %args.input.display(), "loaded recording");

    let mut tracker = DepthTracker::new(&config)?.with_features(args.features);
    let mut exporter = DataExporter::new(args.features);
    for recorded in &frames {
        let mut result = tracker.process_frame(recorded.measurement.as_ref(), recorded.timestamp);
        result.frame = recorded.frame;
        exporter.add_frame(result);
    }

    let output = args.output.unwrap_or_else(|| DataExporter::default_path("."));
    let written = exporter.export_csv(&output)?;

    let metrics = tracker.metrics();
    info!(
        processed = metrics.frames_processed,
        lost = metrics.frames_lost,
        skipped = metrics.updates_skipped,
        avg_ms = metrics.avg_processing_time * 1000.0,
        "replay finished"
    );
    println!("Wrote {} frames to {}", exporter.results().len(), written.display());
    Ok(())
}
