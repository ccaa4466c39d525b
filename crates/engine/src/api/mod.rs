//! HTTP surface: route table and shared response machinery.

pub mod error;
pub mod lobby_routes;
pub mod responses;
pub mod speech_routes;
pub mod story_routes;

use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;

use crate::app::App;
use responses::PrettyJson;

/// Full route table for the engine.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/lobby/create", post(lobby_routes::create_lobby))
        .route("/lobby/join", post(lobby_routes::join_lobby))
        .route("/lobby/{lobby_id}", get(lobby_routes::get_lobby))
        .route("/lobby/leave", post(lobby_routes::leave_lobby))
        .route("/lobby/ready", post(lobby_routes::set_ready))
        .route("/lobby/start", post(lobby_routes::start_lobby))
        .route("/lobby/choice", post(lobby_routes::submit_choice))
        .route("/story", post(story_routes::generate_story))
        .route("/text-to-speech", post(speech_routes::synthesize_speech))
}

#[derive(Serialize)]
struct IndexResponse {
    status: &'static str,
    message: &'static str,
    endpoints: Vec<&'static str>,
}

async fn index() -> Response {
    PrettyJson(IndexResponse {
        status: "ok",
        message: "Taleloom engine is running",
        endpoints: vec![
            "POST /lobby/create",
            "POST /lobby/join",
            "GET /lobby/{lobby_id}",
            "POST /lobby/leave",
            "POST /lobby/ready",
            "POST /lobby/start",
            "POST /lobby/choice",
            "POST /story",
            "POST /text-to-speech",
            "GET /health",
        ],
    })
    .into_response()
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Response {
    PrettyJson(HealthResponse { status: "ok" }).into_response()
}
