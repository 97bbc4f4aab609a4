//! Frame capture from camera snapshot URLs and live streams

use super::FrameCapture;
use crate::error::CaptureError;
use async_trait::async_trait;
use image::RgbImage;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Schemes read by grabbing one frame from a video stream
const STREAM_SCHEMES: [&str; 4] = ["rtsp", "rtsps", "rtmp", "srt"];

/// Reads still frames from `http`/`https` snapshot endpoints, `file` URLs,
/// or the current frame of an `rtsp`/`rtmp`/`srt` stream via ffmpeg
#[derive(Debug, Clone)]
pub struct UrlFrameCapture {
    client: reqwest::Client,
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl UrlFrameCapture {
    /// Create a capture whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            ffmpeg: PathBuf::from("ffmpeg"),
            timeout,
        })
    }

    /// Use a specific ffmpeg binary for stream URLs
    pub fn with_ffmpeg(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    /// Grab a single PNG-encoded frame from a stream.
    ///
    /// The child is killed when this future is dropped, so cancellation
    /// through `select!` also stops ffmpeg.
    async fn grab_stream_frame(&self, url: &Url) -> Result<Vec<u8>, CaptureError> {
        let output = tokio::process::Command::new(&self.ffmpeg)
            .args(["-nostdin", "-loglevel", "error", "-i", url.as_str()])
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| CaptureError::Timeout)?
            .map_err(CaptureError::StreamUnavailable)?;

        if !output.status.success() {
            return Err(CaptureError::StreamFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, CaptureError> {
        match url.scheme() {
            "http" | "https" => {
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(http_error)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(CaptureError::Status(status.as_u16()));
                }
                Ok(response.bytes().await.map_err(http_error)?.to_vec())
            }
            "file" => {
                let path = url.to_file_path().map_err(|_| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("not a local path: {url}"),
                    )
                })?;
                Ok(tokio::fs::read(path).await?)
            }
            scheme if STREAM_SCHEMES.contains(&scheme) => self.grab_stream_frame(url).await,
            other => Err(CaptureError::UnsupportedScheme(other.to_string())),
        }
    }
}

fn http_error(e: reqwest::Error) -> CaptureError {
    if e.is_timeout() {
        CaptureError::Timeout
    } else {
        CaptureError::Http(e)
    }
}

#[async_trait]
impl FrameCapture for UrlFrameCapture {
    async fn read_frame(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<RgbImage, CaptureError> {
        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CaptureError::Cancelled),
            bytes = self.fetch(url) => bytes?,
        };

        let frame = image::load_from_memory(&bytes)?.to_rgb8();
        debug!(
            url = %url,
            width = frame.width(),
            height = frame.height(),
            "Frame captured"
        );
        Ok(frame)
    }
}
