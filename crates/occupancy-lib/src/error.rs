//! Error taxonomy for sources, cameras and configuration

use serde::Serialize;
use thiserror::Error;

/// Invalid or unreadable camera topology. Fatal to source construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load topology: {0}")]
    Load(#[from] config::ConfigError),

    #[error("topology defines no locations")]
    NoLocations,

    #[error("location #{index} has an empty name")]
    EmptyName { index: usize },

    #[error("location {location:?} has no cameras")]
    NoCameras { location: String },

    #[error("location {location:?} camera #{camera} has invalid url {url:?}: {source}")]
    InvalidUrl {
        location: String,
        camera: usize,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("location {location:?} camera #{camera} spot #{spot} has zero area")]
    EmptyRegion {
        location: String,
        camera: usize,
        spot: usize,
    },

    #[error("location {location:?} polygon needs at least 3 vertices, got {vertices}")]
    DegeneratePolygon { location: String, vertices: usize },

    #[error("locations {first:?} and {second:?} resolve to the same identity {id}")]
    DuplicateIdentity {
        first: String,
        second: String,
        id: String,
    },
}

/// Failure to obtain a frame from one camera
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("camera responded with status {0}")]
    Status(u16),

    #[error("camera did not respond in time")]
    Timeout,

    #[error("failed to read frame: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode frame: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to start ffmpeg: {0}")]
    StreamUnavailable(#[source] std::io::Error),

    #[error("ffmpeg exited with code {exit_code:?}: {stderr}")]
    StreamFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("unsupported url scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("capture cancelled")]
    Cancelled,
}

/// Failure of the vacancy classifier
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("failed to load model: {0}")]
    Model(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("model checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("failed to read model: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure localized to one camera within one round
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("classification failed: {0}")]
    Classify(#[from] ClassifyError),

    #[error("spot #{index} lies outside the {width}x{height} frame")]
    EmptyRegion {
        index: usize,
        width: u32,
        height: u32,
    },

    #[error("classifier returned {got} scores for {expected} regions")]
    ScoreCount { expected: usize, got: usize },

    #[error("camera did not finish within {0:?}")]
    Timeout(std::time::Duration),

    #[error("camera work cancelled")]
    Cancelled,

    #[error("camera worker panicked or was aborted: {0}")]
    Worker(String),
}

/// Step of camera processing at which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Capture,
    Classification,
    Timeout,
    Cancelled,
    Worker,
}

impl CameraError {
    pub fn stage(&self) -> FailureStage {
        match self {
            CameraError::Capture(_) | CameraError::EmptyRegion { .. } => FailureStage::Capture,
            CameraError::Classify(_) | CameraError::ScoreCount { .. } => {
                FailureStage::Classification
            }
            CameraError::Timeout(_) => FailureStage::Timeout,
            CameraError::Cancelled => FailureStage::Cancelled,
            CameraError::Worker(_) => FailureStage::Worker,
        }
    }
}

/// Failure of a whole `Source` call
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot enumerate locations: {0}")]
    Enumeration(String),

    #[error("source call cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
