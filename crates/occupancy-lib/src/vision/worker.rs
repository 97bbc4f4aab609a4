//! Per-camera processing: capture, crop, classify, count

use super::{is_vacant, FrameCapture, SpotClassifier};
use crate::error::CameraError;
use crate::models::SpotCounts;
use crate::topology::{Camera, SpotRegion};
use image::{imageops, RgbImage};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Turns one camera frame into vacant counts per spot type
pub struct CameraWorker {
    capture: Arc<dyn FrameCapture>,
    classifier: Arc<dyn SpotClassifier>,
}

impl CameraWorker {
    pub fn new(capture: Arc<dyn FrameCapture>, classifier: Arc<dyn SpotClassifier>) -> Self {
        Self {
            capture,
            classifier,
        }
    }

    /// Process one camera once. No retries: any capture or classification
    /// failure is returned to the caller.
    pub async fn process(
        &self,
        camera: &Camera,
        cancel: &CancellationToken,
    ) -> Result<SpotCounts, CameraError> {
        let frame = self.capture.read_frame(&camera.url, cancel).await?;
        let crops = extract_regions(&frame, &camera.spots)?;
        drop(frame);

        if crops.is_empty() {
            return Ok(SpotCounts::new());
        }

        // Inference is CPU bound, keep it off the async workers
        let classifier = Arc::clone(&self.classifier);
        let inference = tokio::task::spawn_blocking(move || classifier.predict(&crops));
        let scores = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CameraError::Cancelled),
            joined = inference => joined.map_err(|e| CameraError::Worker(e.to_string()))??,
        };

        let counts = count_vacant(&camera.spots, &scores)?;
        debug!(
            camera = camera.index,
            url = %camera.url,
            regions = camera.spots.len(),
            vacant = counts.total(),
            "Camera processed"
        );
        Ok(counts)
    }
}

/// Crop every region out of the frame, preserving region order. Regions are
/// clamped to the frame; one that ends up empty fails the camera.
pub(crate) fn extract_regions(
    frame: &RgbImage,
    spots: &[SpotRegion],
) -> Result<Vec<RgbImage>, CameraError> {
    let (width, height) = frame.dimensions();
    spots
        .iter()
        .enumerate()
        .map(|(index, spot)| {
            if spot.x >= width || spot.y >= height || spot.width == 0 || spot.height == 0 {
                return Err(CameraError::EmptyRegion {
                    index,
                    width,
                    height,
                });
            }
            Ok(imageops::crop_imm(frame, spot.x, spot.y, spot.width, spot.height).to_image())
        })
        .collect()
}

/// Threshold scores and count vacant spots per type. Every spot type the
/// camera observes is present in the result, with zero if none is vacant.
pub(crate) fn count_vacant(spots: &[SpotRegion], scores: &[f32]) -> Result<SpotCounts, CameraError> {
    if scores.len() != spots.len() {
        return Err(CameraError::ScoreCount {
            expected: spots.len(),
            got: scores.len(),
        });
    }

    let mut counts = SpotCounts::new();
    for (spot, score) in spots.iter().zip(scores) {
        counts.observe(spot.spot_type);
        if is_vacant(*score) {
            counts.increment(spot.spot_type);
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SpotType;
    use image::Rgb;

    fn spots() -> Vec<SpotRegion> {
        vec![
            SpotRegion::new(0, 0, 4, 4, SpotType::Car),
            SpotRegion::new(4, 0, 4, 4, SpotType::Car),
            SpotRegion::new(0, 4, 4, 4, SpotType::CarHandicap),
        ]
    }

    #[test]
    fn test_count_vacant_thresholds_scores() {
        let counts = count_vacant(&spots(), &[0.9, 0.3, 0.6]).unwrap();
        assert_eq!(counts.get(SpotType::Car), Some(1));
        assert_eq!(counts.get(SpotType::CarHandicap), Some(1));
        assert_eq!(counts.get(SpotType::Motorcycle), None);
    }

    #[test]
    fn test_count_vacant_keeps_observed_types_at_zero() {
        let counts = count_vacant(&spots(), &[0.1, 0.2, 0.49]).unwrap();
        assert_eq!(counts.get(SpotType::Car), Some(0));
        assert_eq!(counts.get(SpotType::CarHandicap), Some(0));
    }

    #[test]
    fn test_count_vacant_rejects_score_mismatch() {
        let result = count_vacant(&spots(), &[0.9]);
        assert!(matches!(
            result,
            Err(CameraError::ScoreCount {
                expected: 3,
                got: 1
            })
        ));
    }

    #[test]
    fn test_extract_regions_preserves_order() {
        let mut frame = RgbImage::new(8, 8);
        frame.put_pixel(0, 0, Rgb([255, 0, 0]));
        frame.put_pixel(4, 0, Rgb([0, 255, 0]));
        frame.put_pixel(0, 4, Rgb([0, 0, 255]));

        let crops = extract_regions(&frame, &spots()).unwrap();
        assert_eq!(crops.len(), 3);
        assert_eq!(crops[0].get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(crops[1].get_pixel(0, 0), &Rgb([0, 255, 0]));
        assert_eq!(crops[2].get_pixel(0, 0), &Rgb([0, 0, 255]));
        assert!(crops.iter().all(|c| c.dimensions() == (4, 4)));
    }

    #[test]
    fn test_extract_regions_clamps_to_frame() {
        let frame = RgbImage::new(8, 8);
        let crops =
            extract_regions(&frame, &[SpotRegion::new(6, 6, 10, 10, SpotType::Car)]).unwrap();
        assert_eq!(crops[0].dimensions(), (2, 2));
    }

    #[test]
    fn test_extract_regions_outside_frame_fails() {
        let frame = RgbImage::new(8, 8);
        let result = extract_regions(&frame, &[SpotRegion::new(8, 0, 2, 2, SpotType::Car)]);
        assert!(matches!(result, Err(CameraError::EmptyRegion { index: 0, .. })));
    }
}
