mod detect_face;
mod health;
mod latest_frame;
mod metrics;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub use detect_face::{DetectFaceError, IMAGE_FIELD};
pub use latest_frame::FetchFrameError;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(latest_frame::latest_frame))
        .route("/detectface", post(detect_face::detect_face))
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
}
