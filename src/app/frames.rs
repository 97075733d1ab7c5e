//! Frame sources standing in for the camera and QR decoder.
//!
//! The live system gets one `DecodedFrame` per captured frame from an
//! external detector. `ReplayFrames` reads frames that were decoded ahead of
//! time, one per line:
//!
//! ```text
//! {"text": "https://www.amazon.in/dp/B0D12345IP", "polygon": [[10,10],[90,10],[90,90],[10,90]], "repeat": 30}
//! https://www.flipkart.com/p/itm42
//!
//! ```
//!
//! A JSON object carries text, polygon and how many frames it is held for; a
//! bare line is a frame whose decoded text is the line; a blank line is a
//! frame with no code in it.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use super::types::{DecodedFrame, Point};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("failed to read frames: {0}")]
    Io(#[from] io::Error),
    #[error("invalid frame on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Per-frame capture + decode capability.
pub trait FrameSource {
    /// The next frame, or `None` once the source has nothing left.
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, FrameError>;
}

#[derive(Debug, Deserialize)]
struct FrameRecord {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    polygon: Option<Vec<[f32; 2]>>,
    #[serde(default = "default_repeat")]
    repeat: usize,
}

fn default_repeat() -> usize {
    1
}

pub struct ReplayFrames<R> {
    reader: R,
    line_no: usize,
    held: Option<(DecodedFrame, usize)>,
}

impl ReplayFrames<Box<dyn BufRead>> {
    /// Open a frame file, or stdin for `-`.
    pub fn open(path: &str) -> Result<Self, FrameError> {
        let reader: Box<dyn BufRead> = if path == "-" {
            Box::new(BufReader::new(io::stdin()))
        } else {
            Box::new(BufReader::new(File::open(Path::new(path))?))
        };
        Ok(Self::new(reader))
    }
}

impl<R: BufRead> ReplayFrames<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            held: None,
        }
    }

    fn read_record(&mut self) -> Result<Option<(DecodedFrame, usize)>, FrameError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Some((DecodedFrame::empty(), 1)));
        }
        if !trimmed.starts_with('{') {
            return Ok(Some((DecodedFrame::with_text(trimmed), 1)));
        }

        let record: FrameRecord =
            serde_json::from_str(trimmed).map_err(|source| FrameError::Json {
                line: self.line_no,
                source,
            })?;
        let frame = DecodedFrame {
            text: record.text.filter(|text| !text.is_empty()),
            polygon: record
                .polygon
                .map(|points| points.into_iter().map(|[x, y]| Point { x, y }).collect()),
        };
        Ok(Some((frame, record.repeat)))
    }
}

impl<R: BufRead> FrameSource for ReplayFrames<R> {
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, FrameError> {
        loop {
            if let Some((frame, remaining)) = self.held.take() {
                if remaining > 1 {
                    self.held = Some((frame.clone(), remaining - 1));
                }
                return Ok(Some(frame));
            }
            match self.read_record()? {
                // repeat: 0 drops the frame entirely.
                Some((_, 0)) => continue,
                Some(record) => self.held = Some(record),
                None => return Ok(None),
            }
        }
    }
}
