use crate::{
    config::DetectorConfig,
    detector::{AnnotatedImage, Detection, Detector, DetectorError, Region},
};
use opencv::{
    core::{Mat, Rect, Scalar, Size, Vector},
    imgcodecs, imgproc,
    objdetect::CascadeClassifier,
    prelude::*,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CascadeLoadError {
    #[error("Invalid detector configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to load cascade: {0}")]
    Load(#[from] opencv::Error),
    #[error("Cascade file {0} contains no classifier")]
    Empty(String),
}

#[derive(Debug, Clone, Copy)]
struct Tuning {
    scale_factor: f64,
    min_neighbors: i32,
    min_size: Size,
}

/// Haar-cascade detector backed by a small pool of OpenCV classifiers.
#[derive(Clone)]
pub struct CascadeDetector {
    classifiers: Arc<Vec<Arc<Mutex<CascadeClassifier>>>>,
    counter: Arc<AtomicUsize>,
    tuning: Tuning,
}

impl CascadeDetector {
    pub fn new(detector_config: &DetectorConfig) -> Result<Self, CascadeLoadError> {
        detector_config
            .validate()
            .map_err(CascadeLoadError::InvalidConfig)?;

        let path = detector_config.get_path().to_string_lossy().into_owned();
        let num_instances = detector_config.num_instances.max(1);
        let classifiers = (0..num_instances)
            .map(|_| {
                let classifier = CascadeClassifier::new(&path)?;
                if classifier.empty()? {
                    return Err(CascadeLoadError::Empty(path.clone()));
                }
                Ok(Arc::new(Mutex::new(classifier)))
            })
            .collect::<Result<Vec<_>, CascadeLoadError>>()?;

        tracing::info!("Loaded {} cascade classifiers from {}", num_instances, path);

        Ok(Self {
            classifiers: Arc::new(classifiers),
            counter: Arc::new(AtomicUsize::new(0)),
            tuning: Tuning {
                scale_factor: detector_config.scale_factor,
                min_neighbors: detector_config.min_neighbors,
                min_size: Size::new(detector_config.min_size, detector_config.min_size),
            },
        })
    }

    fn detect_regions(&self, gray: &Mat) -> Result<Vector<Rect>, DetectorError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.classifiers.len();
        let mut classifier = self.classifiers[index]
            .lock()
            .map_err(|e| DetectorError::Classifier(format!("classifier mutex poisoned: {}", e)))?;

        tracing::debug!("Running detection with classifier {}", index);
        let mut objects = Vector::<Rect>::new();
        classifier
            .detect_multi_scale(
                gray,
                &mut objects,
                self.tuning.scale_factor,
                self.tuning.min_neighbors,
                0,
                self.tuning.min_size,
                Size::default(),
            )
            .map_err(|e| DetectorError::Classifier(e.to_string()))?;

        Ok(objects)
    }
}

fn decode(image_data: &[u8], flags: i32) -> Result<Mat, DetectorError> {
    let mat = imgcodecs::imdecode(&Vector::<u8>::from_slice(image_data), flags)
        .map_err(|_| DetectorError::Undecodable)?;
    if mat.empty() {
        return Err(DetectorError::Undecodable);
    }
    Ok(mat)
}

fn annotate(mat: &mut Mat, objects: &Vector<Rect>) -> Result<(), DetectorError> {
    for rect in objects.iter() {
        imgproc::rectangle(
            mat,
            rect,
            Scalar::new(0.0, 255.0, 0.0, 0.0),
            2,
            imgproc::LINE_8,
            0,
        )
        .map_err(|e| DetectorError::Encode(e.to_string()))?;
    }
    Ok(())
}

fn to_jpg(mat: &Mat) -> Result<Vec<u8>, DetectorError> {
    let mut buf = Vector::<u8>::new();
    imgcodecs::imencode(".jpg", mat, &mut buf, &Vector::new())
        .map_err(|e| DetectorError::Encode(e.to_string()))?;
    Ok(buf.into())
}

impl Detector for CascadeDetector {
    fn detect(&self, image_data: &[u8]) -> Result<Detection, DetectorError> {
        let gray = decode(image_data, imgcodecs::IMREAD_GRAYSCALE)?;
        let mut color = decode(image_data, imgcodecs::IMREAD_COLOR)?;

        let objects = self.detect_regions(&gray)?;
        annotate(&mut color, &objects)?;

        let regions: Vec<Region> = objects
            .iter()
            .map(|rect| Region {
                x: rect.x,
                y: rect.y,
                w: rect.width,
                h: rect.height,
            })
            .collect();
        for region in &regions {
            tracing::debug!(
                "Detected region ({}, {}, {}, {})",
                region.x,
                region.y,
                region.w,
                region.h
            );
        }

        Ok(Detection {
            image: AnnotatedImage::new(to_jpg(&color)?),
            regions,
        })
    }
}
