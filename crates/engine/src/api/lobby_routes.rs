//! Lobby lifecycle and round-trigger routes.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use taleloom_domain::{LobbyCode, LobbyView, PlayerOptions, UserId};

use crate::api::error::ApiError;
use crate::api::responses::PrettyJson;
use crate::app::App;
use crate::infrastructure::registry::LeaveOutcome;
use crate::use_cases::round::{prompts, ChoiceOutcome, CommittedRound, StartOutcome};

fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::Validation("Invalid user ID".to_string()))
}

fn required_username(username: Option<String>) -> Result<String, ApiError> {
    username
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::Validation("Username is required".to_string()))
}

// =============================================================================
// Create / join / get / leave
// =============================================================================

#[derive(Deserialize)]
pub struct CreateLobbyRequest {
    pub username: Option<String>,
}

#[derive(Serialize)]
struct CreateLobbyResponse {
    success: bool,
    lobby_id: LobbyCode,
    user_id: String,
    lobby: LobbyView,
}

pub async fn create_lobby(
    State(app): State<Arc<App>>,
    Json(body): Json<CreateLobbyRequest>,
) -> Result<Response, ApiError> {
    let username = required_username(body.username)?;
    let (lobby_id, user_id, lobby) = app.registry.create(&username, Utc::now());
    Ok(PrettyJson(CreateLobbyResponse {
        success: true,
        lobby_id,
        user_id: user_id.to_string(),
        lobby,
    })
    .into_response())
}

#[derive(Deserialize)]
pub struct JoinLobbyRequest {
    pub lobby_id: Option<String>,
    pub username: Option<String>,
}

#[derive(Serialize)]
struct JoinLobbyResponse {
    success: bool,
    user_id: String,
    lobby_id: LobbyCode,
    lobby: LobbyView,
}

pub async fn join_lobby(
    State(app): State<Arc<App>>,
    Json(body): Json<JoinLobbyRequest>,
) -> Result<Response, ApiError> {
    let code = body
        .lobby_id
        .as_deref()
        .map(LobbyCode::parse)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::Validation("Lobby ID and username are required".to_string()))?;
    let username = body
        .username
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::Validation("Lobby ID and username are required".to_string()))?;

    let (user_id, lobby) = app.registry.join(&code, &username, Utc::now()).await?;
    Ok(PrettyJson(JoinLobbyResponse {
        success: true,
        user_id: user_id.to_string(),
        lobby_id: code,
        lobby,
    })
    .into_response())
}

#[derive(Serialize)]
struct LobbyResponse {
    success: bool,
    lobby: LobbyView,
}

pub async fn get_lobby(
    State(app): State<Arc<App>>,
    Path(lobby_id): Path<String>,
) -> Result<Response, ApiError> {
    let lobby = app.registry.get_view(&LobbyCode::parse(&lobby_id)).await?;
    Ok(PrettyJson(LobbyResponse {
        success: true,
        lobby,
    })
    .into_response())
}

#[derive(Deserialize)]
pub struct LeaveLobbyRequest {
    pub user_id: Option<String>,
    pub lobby_id: Option<String>,
}

#[derive(Serialize)]
struct LobbyDeletedResponse {
    success: bool,
    lobby_deleted: bool,
}

pub async fn leave_lobby(
    State(app): State<Arc<App>>,
    Json(body): Json<LeaveLobbyRequest>,
) -> Result<Response, ApiError> {
    let user_id = body
        .user_id
        .as_deref()
        .ok_or_else(|| ApiError::Validation("User ID is required".to_string()))?;
    let user_id = parse_user_id(user_id)?;
    let code = body.lobby_id.as_deref().map(LobbyCode::parse);

    match app.registry.leave(user_id, code).await? {
        LeaveOutcome::LobbyDeleted => Ok(PrettyJson(LobbyDeletedResponse {
            success: true,
            lobby_deleted: true,
        })
        .into_response()),
        LeaveOutcome::Left(lobby) => Ok(PrettyJson(LobbyResponse {
            success: true,
            lobby,
        })
        .into_response()),
    }
}

// =============================================================================
// Ready / start / choice
// =============================================================================

#[derive(Deserialize)]
pub struct SetReadyRequest {
    pub user_id: Option<String>,
    pub lobby_id: Option<String>,
    #[serde(default)]
    pub ready: bool,
}

#[derive(Serialize)]
struct SetReadyResponse {
    success: bool,
    lobby: LobbyView,
    can_start: bool,
}

pub async fn set_ready(
    State(app): State<Arc<App>>,
    Json(body): Json<SetReadyRequest>,
) -> Result<Response, ApiError> {
    let user_id = body
        .user_id
        .as_deref()
        .ok_or_else(|| ApiError::Validation("User ID is required".to_string()))?;
    let user_id = parse_user_id(user_id)?;
    let code = body
        .lobby_id
        .as_deref()
        .map(LobbyCode::parse)
        .filter(|c| !c.is_empty())
        .or_else(|| app.registry.lobby_code_for(user_id))
        .ok_or_else(|| ApiError::NotFound("Lobby not found".to_string()))?;

    let lobby = app.registry.lobby(&code)?;
    let mut guard = lobby.lock().await;
    guard.set_ready(user_id, body.ready)?;
    let can_start = guard.all_ready();
    let view = guard.to_view();
    drop(guard);

    Ok(PrettyJson(SetReadyResponse {
        success: true,
        lobby: view,
        can_start,
    })
    .into_response())
}

#[derive(Deserialize)]
pub struct StartLobbyRequest {
    pub lobby_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Serialize)]
struct RoundResponse {
    success: bool,
    story: String,
    summary50: Option<String>,
    player_options: BTreeMap<String, PlayerOptions>,
    scene_image: Option<String>,
    #[serde(rename = "eventsRemaining")]
    events_remaining: u32,
    #[serde(rename = "storyComplete")]
    story_complete: bool,
    lobby: LobbyView,
}

impl From<CommittedRound> for RoundResponse {
    fn from(round: CommittedRound) -> Self {
        Self {
            success: true,
            story: round.story,
            summary50: round.summary50,
            player_options: round.player_options,
            scene_image: round.scene_image,
            events_remaining: round.events_remaining,
            story_complete: round.story_complete,
            lobby: round.lobby,
        }
    }
}

pub async fn start_lobby(
    State(app): State<Arc<App>>,
    Json(body): Json<StartLobbyRequest>,
) -> Result<Response, ApiError> {
    let code = body
        .lobby_id
        .as_deref()
        .map(LobbyCode::parse)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::Validation("Lobby ID is required".to_string()))?;
    let requester = body
        .user_id
        .as_deref()
        .map(parse_user_id)
        .transpose()?;

    match app.rounds.start_game(&code, requester).await? {
        StartOutcome::AlreadyPlaying(lobby) => Ok(PrettyJson(LobbyResponse {
            success: true,
            lobby,
        })
        .into_response()),
        StartOutcome::Started(round) => {
            Ok(PrettyJson(RoundResponse::from(round)).into_response())
        }
    }
}

#[derive(Deserialize)]
pub struct SubmitChoiceRequest {
    pub user_id: Option<String>,
    pub lobby_id: Option<String>,
    pub choice: Option<String>,
}

#[derive(Serialize)]
struct ChoiceWaitingResponse {
    success: bool,
    waiting_for_others: bool,
    choices_submitted: usize,
    total_users: usize,
    lobby: LobbyView,
}

pub async fn submit_choice(
    State(app): State<Arc<App>>,
    Json(body): Json<SubmitChoiceRequest>,
) -> Result<Response, ApiError> {
    let (user_id, choice) = match (body.user_id.as_deref(), body.choice.as_deref()) {
        (Some(user_id), Some(choice)) if !choice.is_empty() => (user_id, choice),
        _ => {
            return Err(ApiError::Validation(
                "User ID and choice are required".to_string(),
            ))
        }
    };
    let user_id = parse_user_id(user_id)?;
    let code = body
        .lobby_id
        .as_deref()
        .map(LobbyCode::parse)
        .filter(|c| !c.is_empty())
        .or_else(|| app.registry.lobby_code_for(user_id))
        .ok_or_else(|| ApiError::NotFound("Lobby not found".to_string()))?;

    match app.rounds.submit_choice(&code, user_id, choice).await? {
        ChoiceOutcome::Waiting {
            choices_submitted,
            total_users,
            lobby,
        } => Ok(PrettyJson(ChoiceWaitingResponse {
            success: true,
            waiting_for_others: true,
            choices_submitted,
            total_users,
            lobby,
        })
        .into_response()),
        ChoiceOutcome::StoryComplete { lobby } => Ok(PrettyJson(RoundResponse {
            success: true,
            story: prompts::END_STORY_COLLABORATIVE.to_string(),
            summary50: Some(prompts::END_SUMMARY_COLLABORATIVE.to_string()),
            player_options: BTreeMap::new(),
            scene_image: None,
            events_remaining: 0,
            story_complete: true,
            lobby,
        })
        .into_response()),
        ChoiceOutcome::Committed(round) => {
            Ok(PrettyJson(RoundResponse::from(round)).into_response())
        }
    }
}
