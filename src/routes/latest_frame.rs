use crate::server::SharedState;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum FetchFrameError {
    #[error("No image with a recognized object is buffered right now")]
    BufferEmpty,
    #[error("HTTP builder failed: {0}")]
    HttpBuilder(String),
}

impl IntoResponse for FetchFrameError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Hands out the oldest buffered annotated frame, or fails at once when there is none.
#[instrument(skip(state))]
pub async fn latest_frame(State(state): State<SharedState>) -> Result<Response, FetchFrameError> {
    let image = state.frames.try_get();
    state.metrics.record_fetch(image.is_some());

    let image = image.ok_or_else(|| {
        tracing::debug!("Frame buffer is empty");
        FetchFrameError::BufferEmpty
    })?;

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "image/jpeg")
        .body(Body::from(image.into_bytes()))
        .map_err(|e| FetchFrameError::HttpBuilder(e.to_string()))?;

    Ok(response)
}
