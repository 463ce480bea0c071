// src/data.rs
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use csv::{StringRecord, Writer};
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::features::{PoseFeatures, FEATURE_COUNT};
use crate::mediapipe_bridge::PosePacket;
use crate::skeleton::{Joint, JOINT_COUNT};
use crate::tracking::TrackingResult;
use crate::transition::{JointObservation, MeasurementFrame};

struct JointColumns {
    x: String,
    y: String,
    z: String,
    reference: String,
    depth: String,
}

static JOINT_COLUMNS: Lazy<Vec<JointColumns>> = Lazy::new(|| {
    Joint::ALL
        .iter()
        .map(|joint| JointColumns {
            x: format!("{joint}_x"),
            y: format!("{joint}_y"),
            z: format!("{joint}_z"),
            reference: format!("{joint}_ref"),
            depth: format!("{joint}_depth"),
        })
        .collect()
});

/// One recorded input frame. `measurement` is `None` when the detector found
/// no skeleton in that frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub frame: u64,
    pub timestamp: f64,
    pub measurement: Option<MeasurementFrame>,
}

/// Picks the reader from the file extension: `.jsonl` for one pose packet
/// per line, `.json` for an array of packets, anything else as CSV.
pub fn read_frames(path: impl AsRef<Path>) -> Result<Vec<RecordedFrame>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("jsonl") => read_packets(BufReader::new(file)),
        Some("json") => read_packet_array(BufReader::new(file)),
        _ => read_csv(file),
    }
}

/// Reads `frame,timestamp,{joint}_x,{joint}_y,{joint}_z[,{joint}_ref]` rows.
/// Without a `_ref` column the raw depth doubles as the reference; a row with
/// empty joint cells is a frame without a skeleton.
pub fn read_csv<R: Read>(input: R) -> Result<Vec<RecordedFrame>> {
    let mut reader = csv::Reader::from_reader(input);
    let headers = reader.headers().context("Missing CSV header")?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let required = |name: &str| column(name).with_context(|| format!("Missing column `{name}`"));

    let frame_col = column("frame");
    let timestamp_col = column("timestamp");
    let mut layout = Vec::with_capacity(JOINT_COUNT);
    for columns in JOINT_COLUMNS.iter() {
        layout.push((
            required(&columns.x)?,
            required(&columns.y)?,
            required(&columns.z)?,
            column(&columns.reference),
        ));
    }

    let mut frames = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Bad CSV row {}", row + 1))?;
        let frame = match frame_col {
            Some(i) => frame_number(cell(&record, i, row)?, row)?,
            None => row as u64,
        };
        let timestamp = match timestamp_col {
            Some(i) => cell(&record, i, row)?.unwrap_or(0.0),
            None => 0.0,
        };

        let mut joints = [JointObservation::new(0.0, 0.0, 0.0, 0.0); JOINT_COUNT];
        let mut complete = true;
        for (joint, &(x, y, z, reference)) in joints.iter_mut().zip(layout.iter()) {
            match (cell(&record, x, row)?, cell(&record, y, row)?, cell(&record, z, row)?) {
                (Some(x), Some(y), Some(z)) => {
                    let reference = match reference {
                        Some(i) => cell(&record, i, row)?.unwrap_or(z),
                        None => z,
                    };
                    *joint = JointObservation::new(x, y, z, reference);
                }
                _ => complete = false,
            }
        }

        frames.push(RecordedFrame {
            frame,
            timestamp,
            measurement: complete.then(|| MeasurementFrame::new(joints)),
        });
    }
    Ok(frames)
}

fn cell(record: &StringRecord, index: usize, row: usize) -> Result<Option<f64>> {
    match record.get(index).map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse::<f64>()
            .map(Some)
            .with_context(|| format!("Row {}: `{text}` is not a number", row + 1)),
    }
}

fn frame_number(value: Option<f64>, row: usize) -> Result<u64> {
    match value {
        None => Ok(row as u64),
        Some(v) if v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 => Ok(v as u64),
        Some(v) => bail!("Row {}: frame `{v}` is not a non-negative integer", row + 1),
    }
}

#[derive(Deserialize)]
struct PacketLine {
    #[serde(default)]
    frame: Option<u64>,
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(flatten)]
    packet: PosePacket,
}

/// Reads one pose packet per line. An empty `coords` list is a frame
/// without a skeleton; blank lines are skipped.
pub fn read_packets<R: BufRead>(input: R) -> Result<Vec<RecordedFrame>> {
    let mut frames = Vec::new();
    for (line_no, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: PacketLine = serde_json::from_str(&line)
            .with_context(|| format!("Malformed pose packet on line {}", line_no + 1))?;
        let index = frames.len();
        frames.push(recorded_packet(parsed, index).with_context(|| format!("Line {}", line_no + 1))?);
    }
    Ok(frames)
}

/// Reads a JSON array of pose packets, the same objects [`read_packets`]
/// takes one per line.
pub fn read_packet_array<R: Read>(input: R) -> Result<Vec<RecordedFrame>> {
    let packets: Vec<PacketLine> =
        serde_json::from_reader(input).context("Malformed pose packet array")?;
    packets
        .into_iter()
        .enumerate()
        .map(|(index, packet)| {
            recorded_packet(packet, index).with_context(|| format!("Packet {index}"))
        })
        .collect()
}

fn recorded_packet(parsed: PacketLine, index: usize) -> Result<RecordedFrame> {
    let measurement = if parsed.packet.coords.is_empty() {
        None
    } else {
        Some(parsed.packet.to_frame()?)
    };
    Ok(RecordedFrame {
        frame: parsed.frame.unwrap_or(index as u64),
        timestamp: parsed.timestamp.unwrap_or(0.0),
        measurement,
    })
}

/// Collects filtered frames and writes them out as CSV.
pub struct DataExporter {
    include_features: bool,
    results: Vec<TrackingResult>,
}

impl DataExporter {
    /// With `include_features` every row also carries the normalised
    /// coordinates and joint angles, left empty on lost frames.
    pub fn new(include_features: bool) -> Self {
        Self { include_features, results: Vec::new() }
    }

    /// `filtered_<date>_<time>.csv` in `output_dir`.
    pub fn default_path(output_dir: impl AsRef<Path>) -> PathBuf {
        output_dir
            .as_ref()
            .join(format!("filtered_{}.csv", Local::now().format("%Y%m%d_%H%M%S")))
    }

    pub fn add_frame(&mut self, result: TrackingResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[TrackingResult] {
        &self.results
    }

    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        self.write_csv(file)?;
        Ok(path.to_path_buf())
    }

    pub fn write_csv<W: Write>(&self, output: W) -> Result<()> {
        let mut writer = Writer::from_writer(output);

        let mut header: Vec<String> = vec![
            "frame".into(),
            "timestamp".into(),
            "tracking_lost".into(),
            "update_skipped".into(),
        ];
        header.extend(JOINT_COLUMNS.iter().map(|c| c.depth.clone()));
        if self.include_features {
            header.extend(PoseFeatures::column_names());
        }
        writer.write_record(&header)?;

        for result in &self.results {
            let mut row: Vec<String> = vec![
                result.frame.to_string(),
                result.timestamp.to_string(),
                result.tracking_lost.to_string(),
                result.update_skipped.to_string(),
            ];
            row.extend(result.depths.iter().map(|d| d.to_string()));
            if self.include_features {
                match &result.features {
                    Some(features) => row.extend(features.values().iter().map(|v| v.to_string())),
                    None => row.extend(std::iter::repeat(String::new()).take(FEATURE_COUNT)),
                }
            }
            writer.write_record(&row)?;
        }

        writer.flush()?;
        Ok(())
    }
}
