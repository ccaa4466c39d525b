//! API error taxonomy and HTTP mapping.
//!
//! Validation and lookup failures are detected before any collaborator
//! call; collaborator failures are absorbed into fallback content by
//! the use cases and never reach this type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use taleloom_domain::DomainError;

use crate::api::responses::PrettyJson;
use crate::infrastructure::registry::RegistryError;
use crate::use_cases::round::RoundError;
use crate::use_cases::story::StoryError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed request fields.
    #[error("{0}")]
    Validation(String),
    /// Unknown lobby.
    #[error("{0}")]
    NotFound(String),
    /// Request conflicts with current lobby state.
    #[error("{0}")]
    Conflict(String),
    /// Unexpected failure during round generation or synthesis.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            PrettyJson(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::LobbyNotFound => Self::NotFound(err.to_string()),
            RegistryError::Domain(domain) => domain.into(),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        // Lobby full / already joined / not a member are all state
        // conflicts, reported as 400s.
        Self::Conflict(err.to_string())
    }
}

impl From<RoundError> for ApiError {
    fn from(err: RoundError) -> Self {
        match err {
            RoundError::LobbyNotFound => Self::NotFound(err.to_string()),
            RoundError::NotAMember
            | RoundError::RoundAlreadyInProgress
            | RoundError::NotEnoughPlayers
            | RoundError::NotAllReady => Self::Conflict(err.to_string()),
        }
    }
}

impl From<StoryError> for ApiError {
    fn from(err: StoryError) -> Self {
        match err {
            StoryError::LobbyNotFound => Self::NotFound(err.to_string()),
            StoryError::NotAMember => Self::Conflict(err.to_string()),
        }
    }
}
