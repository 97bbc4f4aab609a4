//! ONNX vacancy classifier using tract
//!
//! Loads a binary spot classifier and scores cropped spot images. Every crop
//! is resized to the model input, scaled to `[0, 1]` and laid out NCHW; the
//! first output value is read as the vacancy probability.

use super::SpotClassifier;
use crate::error::ClassifyError;
use crate::observability::OccupancyMetrics;
use image::{imageops, imageops::FilterType, RgbImage};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

/// Batch latency above which a warning is logged
const MAX_BATCH_INFERENCE_MS: u128 = 250;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Classifier model settings
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Model input width in pixels (default: 128)
    pub input_width: u32,
    /// Model input height in pixels (default: 128)
    pub input_height: u32,
    /// Expected hex SHA-256 of the model file, verified before loading
    pub expected_sha256: Option<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            input_width: 128,
            input_height: 128,
            expected_sha256: None,
        }
    }
}

/// Inference statistics
#[derive(Debug, Clone)]
pub struct InferenceStats {
    pub total_images: u64,
    pub total_batches: u64,
    pub slow_batches: u64,
}

/// Vacancy classifier backed by an ONNX model
pub struct OnnxSpotClassifier {
    model: TractModel,
    config: ClassifierConfig,
    model_version: String,
    metrics: OccupancyMetrics,
    image_count: AtomicU64,
    batch_count: AtomicU64,
    slow_batch_count: AtomicU64,
}

impl OnnxSpotClassifier {
    /// Load a model file
    pub fn from_file(path: impl AsRef<Path>, config: ClassifierConfig) -> Result<Self, ClassifyError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes, config)
    }

    /// Load a model from bytes, verifying the checksum when one is configured
    pub fn from_bytes(model_bytes: &[u8], config: ClassifierConfig) -> Result<Self, ClassifyError> {
        let digest = hex::encode(Sha256::digest(model_bytes));
        if let Some(expected) = &config.expected_sha256 {
            if !expected.eq_ignore_ascii_case(&digest) {
                return Err(ClassifyError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual: digest,
                });
            }
        }

        let model = Self::load_model(model_bytes, &config)?;
        let model_version = digest[..12].to_string();
        info!(
            model_version = %model_version,
            input_width = config.input_width,
            input_height = config.input_height,
            "Vacancy model loaded"
        );

        Ok(Self::with_model(model, config, model_version))
    }

    fn with_model(model: TractModel, config: ClassifierConfig, model_version: String) -> Self {
        Self {
            model,
            config,
            model_version,
            metrics: OccupancyMetrics::new(),
            image_count: AtomicU64::new(0),
            batch_count: AtomicU64::new(0),
            slow_batch_count: AtomicU64::new(0),
        }
    }

    /// Parse and optimize the model for a single-image input
    fn load_model(model_bytes: &[u8], config: &ClassifierConfig) -> Result<TractModel, ClassifyError> {
        let shape = [
            1,
            3,
            config.input_height as usize,
            config.input_width as usize,
        ];
        tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .map_err(|e| ClassifyError::Model(format!("failed to parse ONNX model: {e}")))?
            .with_input_fact(0, f32::fact(shape).into())
            .map_err(|e| ClassifyError::Model(format!("failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| ClassifyError::Model(format!("failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| ClassifyError::Model(format!("failed to create runnable model: {e}")))
    }

    /// Short checksum prefix identifying the loaded model
    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    fn score(&self, crop: &RgbImage) -> Result<f32, ClassifyError> {
        let input = crop_to_tensor(crop, self.config.input_width, self.config.input_height);
        let result = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;
        let output = result
            .first()
            .ok_or_else(|| ClassifyError::Inference("no output from model".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;
        vacancy_score(view.iter().copied())
    }

    fn record_batch(&self, images: usize, elapsed: Duration) {
        self.batch_count.fetch_add(1, Ordering::Relaxed);
        self.image_count.fetch_add(images as u64, Ordering::Relaxed);
        self.metrics.observe_inference_latency(elapsed.as_secs_f64());

        if elapsed.as_millis() > MAX_BATCH_INFERENCE_MS {
            self.slow_batch_count.fetch_add(1, Ordering::Relaxed);
            warn!(
                elapsed_ms = elapsed.as_millis(),
                images,
                "Inference exceeded {}ms target",
                MAX_BATCH_INFERENCE_MS
            );
        } else {
            debug!(elapsed_us = elapsed.as_micros(), images, "Inference completed");
        }
    }

    /// Get inference statistics
    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_images: self.image_count.load(Ordering::Relaxed),
            total_batches: self.batch_count.load(Ordering::Relaxed),
            slow_batches: self.slow_batch_count.load(Ordering::Relaxed),
        }
    }
}

impl SpotClassifier for OnnxSpotClassifier {
    fn predict(&self, batch: &[RgbImage]) -> Result<Vec<f32>, ClassifyError> {
        let start = Instant::now();
        let scores = batch
            .iter()
            .map(|crop| self.score(crop))
            .collect::<Result<Vec<_>, _>>()?;
        self.record_batch(batch.len(), start.elapsed());
        Ok(scores)
    }
}

/// Resize a crop to `width`x`height` and lay it out as a `[1, 3, H, W]`
/// tensor scaled to `[0, 1]`
pub fn crop_to_tensor(crop: &RgbImage, width: u32, height: u32) -> Tensor {
    let resized = imageops::resize(crop, width, height, FilterType::Triangle);
    tract_ndarray::Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
    )
    .into()
}

/// Read the vacancy probability from the first model output value
pub fn vacancy_score(output: impl IntoIterator<Item = f32>) -> Result<f32, ClassifyError> {
    let score = output
        .into_iter()
        .next()
        .ok_or_else(|| ClassifyError::Inference("empty model output".to_string()))?;
    if score.is_nan() {
        return Err(ClassifyError::Inference("model produced NaN".to_string()));
    }
    Ok(score.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_mismatch_rejected_before_parsing() {
        let config = ClassifierConfig {
            expected_sha256: Some("00".repeat(32)),
            ..ClassifierConfig::default()
        };
        let result = OnnxSpotClassifier::from_bytes(b"not a model", config);
        assert!(matches!(result, Err(ClassifyError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_invalid_model_bytes() {
        let result = OnnxSpotClassifier::from_bytes(b"not a model", ClassifierConfig::default());
        assert!(matches!(result, Err(ClassifyError::Model(_))));
    }

    #[test]
    fn test_checksum_accepts_any_case() {
        let bytes = b"not a model";
        let digest = hex::encode(Sha256::digest(bytes)).to_uppercase();
        let config = ClassifierConfig {
            expected_sha256: Some(digest),
            ..ClassifierConfig::default()
        };
        // Checksum passes, parsing then fails
        let result = OnnxSpotClassifier::from_bytes(bytes, config);
        assert!(matches!(result, Err(ClassifyError::Model(_))));
    }

    /// Runnable plan whose output is its own `[1, 3, H, W]` input
    fn passthrough_classifier(width: u32, height: u32) -> OnnxSpotClassifier {
        let mut model = TypedModel::default();
        let input = model
            .add_source("input", f32::fact([1, 3, height as usize, width as usize]))
            .unwrap();
        model.set_output_outlets(&[input]).unwrap();
        let config = ClassifierConfig {
            input_width: width,
            input_height: height,
            expected_sha256: None,
        };
        OnnxSpotClassifier::with_model(model.into_runnable().unwrap(), config, "test".to_string())
    }

    #[test]
    fn test_crop_to_tensor_layout_is_nchw() {
        let mut crop = RgbImage::new(3, 2);
        for (x, y, pixel) in crop.enumerate_pixels_mut() {
            *pixel = image::Rgb([(10 * x + y) as u8, (100 + x) as u8, (200 + y) as u8]);
        }

        let tensor = crop_to_tensor(&crop, 3, 2);
        assert_eq!(tensor.shape(), &[1, 3, 2, 3]);

        let view = tensor
            .to_array_view::<f32>()
            .unwrap()
            .into_dimensionality::<tract_ndarray::Ix4>()
            .unwrap();
        for y in 0..2usize {
            for x in 0..3usize {
                let pixel = crop.get_pixel(x as u32, y as u32);
                for channel in 0..3usize {
                    let expected = pixel[channel] as f32 / 255.0;
                    assert!(
                        (view[[0, channel, y, x]] - expected).abs() < 1e-6,
                        "mismatch at channel {channel}, y {y}, x {x}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_crop_to_tensor_resizes_to_input() {
        let crop = RgbImage::from_pixel(40, 10, image::Rgb([255, 0, 51]));
        let tensor = crop_to_tensor(&crop, 8, 4);
        assert_eq!(tensor.shape(), &[1, 3, 4, 8]);

        let view = tensor
            .to_array_view::<f32>()
            .unwrap()
            .into_dimensionality::<tract_ndarray::Ix4>()
            .unwrap();
        assert!((view[[0, 0, 3, 7]] - 1.0).abs() < 1e-6);
        assert!(view[[0, 1, 0, 0]].abs() < 1e-6);
        assert!((view[[0, 2, 2, 5]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_vacancy_score_post_processing() {
        assert_eq!(vacancy_score([0.25, 0.9]).unwrap(), 0.25);
        assert_eq!(vacancy_score([1.7]).unwrap(), 1.0);
        assert_eq!(vacancy_score([-0.3]).unwrap(), 0.0);
        assert!(matches!(
            vacancy_score([f32::NAN]),
            Err(ClassifyError::Inference(_))
        ));
        assert!(matches!(
            vacancy_score(std::iter::empty()),
            Err(ClassifyError::Inference(_))
        ));
    }

    #[test]
    fn test_predict_scores_each_crop_in_order() {
        let classifier = passthrough_classifier(4, 4);
        let batch = vec![
            RgbImage::from_pixel(6, 6, image::Rgb([204, 0, 0])),
            RgbImage::from_pixel(2, 3, image::Rgb([51, 255, 255])),
            RgbImage::from_pixel(4, 4, image::Rgb([0, 255, 255])),
        ];

        let scores = classifier.predict(&batch).unwrap();
        assert_eq!(scores.len(), 3);
        assert!((scores[0] - 0.8).abs() < 1e-6);
        assert!((scores[1] - 0.2).abs() < 1e-6);
        assert_eq!(scores[2], 0.0);

        let stats = classifier.stats();
        assert_eq!(stats.total_batches, 1);
        assert_eq!(stats.total_images, 3);
    }

    #[test]
    fn test_empty_batch_still_counted() {
        let classifier = passthrough_classifier(2, 2);
        assert!(classifier.predict(&[]).unwrap().is_empty());
        let stats = classifier.stats();
        assert_eq!(stats.total_batches, 1);
        assert_eq!(stats.total_images, 0);
    }

    #[test]
    fn test_slow_batches_counted() {
        let classifier = passthrough_classifier(2, 2);
        classifier.record_batch(4, Duration::from_millis(10));
        classifier.record_batch(4, Duration::from_millis(MAX_BATCH_INFERENCE_MS as u64 + 50));

        let stats = classifier.stats();
        assert_eq!(stats.total_batches, 2);
        assert_eq!(stats.total_images, 8);
        assert_eq!(stats.slow_batches, 1);
    }

    #[test]
    fn test_missing_model_file() {
        let result =
            OnnxSpotClassifier::from_file("/nonexistent/model.onnx", ClassifierConfig::default());
        assert!(matches!(result, Err(ClassifyError::Io(_))));
    }
}
