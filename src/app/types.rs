use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "qrtrust",
    version,
    about = "Score product QR codes as likely real, likely fake or uncertain"
)]
pub struct Cli {
    /// Score this URL once and print the verdict.
    #[arg(value_name = "URL", required_unless_present = "frames")]
    pub url: Option<String>,

    /// Pre-decoded frames to scan (JSON or text lines, `-` for stdin).
    #[arg(long, value_name = "FILE", conflicts_with = "url")]
    pub frames: Option<String>,

    #[arg(long, value_name = "MS", default_value_t = 2000)]
    pub timeout_ms: u64,

    #[arg(long, value_name = "MS", default_value_t = 1200)]
    pub cooldown_ms: u64,

    #[arg(long, value_name = "MS", default_value_t = 16)]
    pub frame_interval_ms: u64,

    /// Extra URL shortener domain to resolve before scoring.
    #[arg(long = "shortener", value_name = "DOMAIN")]
    pub shorteners: Vec<String>,

    #[arg(long, value_name = "UA")]
    pub user_agent: Option<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[arg(long, default_value_t = false)]
    pub no_tui: bool,

    #[arg(long, default_value_t = false)]
    pub auto_close: bool,

    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn timeout(&self) -> Duration {
        millis_at_least_one(self.timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        millis_at_least_one(self.cooldown_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        millis_at_least_one(self.frame_interval_ms)
    }
}

fn millis_at_least_one(ms: u64) -> Duration {
    Duration::from_millis(ms.max(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Real,
    Fake,
    Uncertain,
}

impl Verdict {
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Verdict::Real,
            0..=40 => Verdict::Fake,
            _ => Verdict::Uncertain,
        }
    }

    pub fn headline(self) -> &'static str {
        match self {
            Verdict::Real => "Likely REAL ✅",
            Verdict::Fake => "Likely FAKE ❌",
            Verdict::Uncertain => "Uncertain ⚠️",
        }
    }
}

/// Outcome of one scoring run. Built once, never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreResult {
    pub label: Verdict,
    pub score: u8,
    pub reasons: Vec<String>,
    pub resolved_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// What the capture/decode collaborator yields for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedFrame {
    pub text: Option<String>,
    pub polygon: Option<Vec<Point>>,
}

impl DecodedFrame {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            polygon: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub payload: String,
    #[serde(flatten)]
    pub result: ScoreResult,
    pub scored_at: String,
}

/// Notifications from the scan pipeline to whatever renders it.
#[derive(Debug, Clone)]
pub enum ScanUpdate {
    Detected { payload: String },
    Scored(ScanReport),
    Failed { payload: String, error: String },
    Waiting,
}
