//! Vision-based occupancy aggregation
//!
//! Captures one frame per camera, classifies every configured spot region
//! and combines per-camera vacant counts into one snapshot per location.
//! Frame capture and vacancy classification are consumed through the
//! `FrameCapture` and `SpotClassifier` traits so any backend can be plugged in.

mod aggregator;
mod capture;
mod classifier;
mod source;
mod worker;


pub use aggregator::{Aggregator, AggregatorConfig, CameraFailure, RoundOutcome};
pub use capture::UrlFrameCapture;
pub use classifier::{ClassifierConfig, InferenceStats, OnnxSpotClassifier};
pub use source::VisionSource;
pub use worker::CameraWorker;

use crate::error::{CaptureError, ClassifyError};
use image::RgbImage;
use tokio_util::sync::CancellationToken;
use url::Url;

pub use async_trait::async_trait;

/// Scores at or above this are vacant
pub const VACANCY_THRESHOLD: f32 = 0.5;

/// Whether a vacancy score means the spot is free
pub fn is_vacant(score: f32) -> bool {
    score >= VACANCY_THRESHOLD
}

/// Source of camera frames
#[async_trait]
pub trait FrameCapture: Send + Sync {
    /// Read the current frame of the camera at `url`.
    ///
    /// Implementations must return promptly with `CaptureError::Cancelled`
    /// once `cancel` fires.
    async fn read_frame(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<RgbImage, CaptureError>;
}

/// Vacancy classifier for cropped spot images
pub trait SpotClassifier: Send + Sync {
    /// One score in `[0, 1]` per input image, in input order
    fn predict(&self, batch: &[RgbImage]) -> Result<Vec<f32>, ClassifyError>;
}
