//! Text-to-speech route. Returns raw MP3 audio rather than JSON.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::app::App;
use crate::infrastructure::ports::SpeechError;

#[derive(Deserialize)]
pub struct SynthesizeRequest {
    pub text: Option<String>,
}

pub async fn synthesize_speech(
    State(app): State<Arc<App>>,
    Json(body): Json<SynthesizeRequest>,
) -> Result<Response, ApiError> {
    let text = body
        .text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Validation("Text is required".to_string()))?;

    let audio = app
        .speech
        .synthesize(&text)
        .await
        .map_err(|e: SpeechError| ApiError::Internal(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (
                header::CONTENT_DISPOSITION,
                "inline; filename=speech.mp3",
            ),
        ],
        audio,
    )
        .into_response())
}
