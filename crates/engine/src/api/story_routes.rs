//! Solo story generation route.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use taleloom_domain::{LobbyCode, UserId};

use crate::api::error::ApiError;
use crate::api::responses::PrettyJson;
use crate::app::App;
use crate::use_cases::story::StoryRequest;

#[derive(Deserialize)]
pub struct GenerateStoryRequest {
    pub message: Option<String>,
    #[serde(rename = "eventsRemaining")]
    pub events_remaining: Option<u32>,
    pub lobby_id: Option<String>,
    pub user_id: Option<String>,
}

pub async fn generate_story(
    State(app): State<Arc<App>>,
    Json(body): Json<GenerateStoryRequest>,
) -> Result<Response, ApiError> {
    let message = body
        .message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::Validation("Message is required".to_string()))?;

    let lobby_code = body
        .lobby_id
        .as_deref()
        .map(LobbyCode::parse)
        .filter(|c| !c.is_empty());
    let user_id = body
        .user_id
        .as_deref()
        .map(|raw| {
            raw.parse::<UserId>()
                .map_err(|_| ApiError::Validation("Invalid user ID".to_string()))
        })
        .transpose()?;

    let response = app
        .story
        .execute(StoryRequest {
            message,
            events_remaining: body.events_remaining,
            lobby_code,
            user_id,
        })
        .await?;

    Ok(PrettyJson(response).into_response())
}
