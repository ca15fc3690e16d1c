// src/capture.rs
//
// Recorded-frame source. A capture is a JSONL file of ranging records, one
// frame per line; the first frame is the calibration baseline (recorded
// with the doorway confirmed empty). Readiness and timing live entirely on
// this side of the boundary; the counting core never waits on anything.

use crate::types::{PixelFrame, NO_TARGET_MM, PIXEL_COUNT};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

/// One recorded ranging frame.
///
/// `targets` carries the per-pixel detected-target count; a pixel with no
/// targets has no valid distance and reads as the far sentinel. Captures
/// without target counts treat every distance as valid.
#[derive(Debug, Deserialize)]
pub struct CaptureRecord {
    pub timestamp_ms: f64,
    pub distances: Vec<i32>,
    #[serde(default)]
    pub targets: Option<Vec<u8>>,
}

pub fn find_capture_files(input_dir: &str) -> Result<Vec<PathBuf>> {
    let mut captures = Vec::new();

    for entry in WalkDir::new(input_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
            captures.push(path.to_path_buf());
        }
    }

    captures.sort();
    info!("Found {} capture file(s)", captures.len());
    Ok(captures)
}

pub struct CaptureReader {
    lines: Lines<BufReader<File>>,
    path: PathBuf,
    pub current_frame: u64,
}

impl CaptureReader {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening capture: {}", path.display());
        let file = File::open(path)
            .with_context(|| format!("failed to open capture {}", path.display()))?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            path: path.to_path_buf(),
            current_frame: 0,
        })
    }

    /// Next frame, or `None` at end of capture. Blank lines are skipped.
    pub fn read_frame(&mut self) -> Result<Option<PixelFrame>> {
        loop {
            let line = match self.lines.next() {
                Some(line) => line
                    .with_context(|| format!("failed to read {}", self.path.display()))?,
                None => return Ok(None),
            };
            if line.trim().is_empty() {
                continue;
            }

            let record: CaptureRecord = serde_json::from_str(&line).with_context(|| {
                format!(
                    "bad record at frame {} in {}",
                    self.current_frame,
                    self.path.display()
                )
            })?;
            self.current_frame += 1;
            return Ok(Some(frame_from_record(&record)?));
        }
    }
}

fn frame_from_record(record: &CaptureRecord) -> Result<PixelFrame> {
    if record.distances.len() != PIXEL_COUNT {
        anyhow::bail!(
            "expected {} distances per frame, got {}",
            PIXEL_COUNT,
            record.distances.len()
        );
    }
    if let Some(targets) = &record.targets {
        if targets.len() != PIXEL_COUNT {
            anyhow::bail!(
                "expected {} target counts per frame, got {}",
                PIXEL_COUNT,
                targets.len()
            );
        }
    }

    let mut distances = [NO_TARGET_MM; PIXEL_COUNT];
    for (i, d) in record.distances.iter().enumerate() {
        let has_target = record.targets.as_ref().map(|t| t[i] > 0).unwrap_or(true);
        distances[i] = if has_target { *d } else { NO_TARGET_MM };
    }

    Ok(PixelFrame::from_distances(distances, record.timestamp_ms))
}
