use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Pixel-space rectangle around a detected object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// JPEG-encoded frame with the detected regions drawn on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedImage(Bytes);

impl AnnotatedImage {
    pub fn new(jpeg: impl Into<Bytes>) -> Self {
        Self(jpeg.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub image: AnnotatedImage,
    pub regions: Vec<Region>,
}

impl Detection {
    pub fn has_regions(&self) -> bool {
        !self.regions.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Failed to decode uploaded image")]
    Undecodable,
    #[error("Classifier failed: {0}")]
    Classifier(String),
    #[error("Failed to encode annotated image: {0}")]
    Encode(String),
}

/// Synchronous, CPU-bound object detection over raw upload bytes.
///
/// Implementations are shared across worker threads and must not keep
/// per-call state between invocations.
pub trait Detector: Send + Sync + 'static {
    fn detect(&self, image_data: &[u8]) -> Result<Detection, DetectorError>;
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error("Detection task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Detection worker is shutting down")]
    Closed,
}

/// Runs detections on the blocking thread pool, at most `max_concurrent` at a time.
#[derive(Clone)]
pub struct DetectionWorker {
    detector: Arc<dyn Detector>,
    permits: Arc<Semaphore>,
}

impl DetectionWorker {
    pub fn new(detector: Arc<dyn Detector>, max_concurrent: usize) -> Self {
        Self {
            detector,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub async fn run(&self, image_data: Bytes) -> Result<Detection, WorkerError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::Closed)?;
        let detector = self.detector.clone();

        let detection = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            detector.detect(&image_data)
        })
        .await??;

        Ok(detection)
    }
}
