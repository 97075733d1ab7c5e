use std::io;

use thiserror::Error;

use super::frames::FrameError;
use super::probe::ProbeError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("network setup failed: {0}")]
    Transport(#[from] ProbeError),
    #[error(transparent)]
    Frames(#[from] FrameError),
    #[error("output encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}
