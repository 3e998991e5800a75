#[cfg(feature = "opencv")]
mod cascade;
mod routes;
mod telemetry;

pub mod app;
pub mod config;
pub mod detector;
pub mod frame_buffer;
pub mod server;

#[cfg(feature = "opencv")]
pub use app::start_app;
#[cfg(feature = "opencv")]
pub use cascade::{CascadeDetector, CascadeLoadError};
pub use app::run_app;
pub use detector::{AnnotatedImage, Detection, Detector, DetectorError, Region};
pub use frame_buffer::FrameBuffer;
pub use routes::{DetectFaceError, FetchFrameError, IMAGE_FIELD};
pub use server::HttpServer;
