use crate::{
    detector::{Detection, Region, WorkerError},
    server::SharedState,
};
use axum::{
    body::Bytes,
    extract::{
        multipart::{Multipart, MultipartError},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

pub const IMAGE_FIELD: &str = "img";

#[derive(Error, Debug)]
pub enum DetectFaceError {
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Upload has no `img` field")]
    MissingImage,
    #[error("Uploaded `img` field is empty")]
    EmptyImage,
    #[error("Detection failed: {0}")]
    Detection(#[from] WorkerError),
}

impl IntoResponse for DetectFaceError {
    fn into_response(self) -> Response {
        let status = match &self {
            DetectFaceError::Multipart(e) => e.status(),
            DetectFaceError::MissingImage | DetectFaceError::EmptyImage => StatusCode::BAD_REQUEST,
            DetectFaceError::Detection(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_client_error() {
            tracing::warn!("Rejected upload: {}", self);
        } else {
            tracing::error!("Detection request failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

async fn read_image_field(multipart: &mut Multipart) -> Result<Bytes, DetectFaceError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let image_data = field.bytes().await?;
        if image_data.is_empty() {
            return Err(DetectFaceError::EmptyImage);
        }
        return Ok(image_data);
    }
    Err(DetectFaceError::MissingImage)
}

#[instrument(skip(state, multipart))]
pub async fn detect_face(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<Region>>, DetectFaceError> {
    let image_data = read_image_field(&mut multipart).await?;
    tracing::debug!("Received {} bytes for detection", image_data.len());

    let start = Instant::now();
    let result = state.worker.run(image_data).await;
    state.metrics.record_detection_duration(
        start.elapsed().as_millis() as u64,
        if result.is_ok() { "ok" } else { "error" },
    );
    let Detection { image, regions } = result?;

    // Frames without any region are not worth one of the few buffer slots.
    if !regions.is_empty() {
        let accepted = state.frames.try_put(image);
        state.metrics.record_buffered(accepted);
        tracing::debug!(
            "Annotated frame with {} regions {}",
            regions.len(),
            if accepted { "buffered" } else { "dropped, buffer full" }
        );
    }

    Ok(Json(regions))
}
