//! Solo story continuation, with optional lobby context.
//!
//! `/story` serves two shapes of request: a pure solo continuation
//! driven by a client-held event counter, and a lobby-validated
//! continuation that appends to the lobby's story log. Both share the
//! solo prompt and the terminal "THE END" short-circuits.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use taleloom_domain::{LobbyCode, LobbyView, UserId, TOTAL_EVENTS};

use crate::infrastructure::ports::{IllustrationPort, NarrativePort};
use crate::infrastructure::registry::LobbyRegistry;
use crate::use_cases::round::extract::extract_story_payload;
use crate::use_cases::round::prompts;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoryError {
    #[error("Lobby not found")]
    LobbyNotFound,
    #[error("User not in lobby")]
    NotAMember,
}

#[derive(Debug, Clone)]
pub struct StoryRequest {
    pub message: String,
    pub events_remaining: Option<u32>,
    pub lobby_code: Option<LobbyCode>,
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoryResponse {
    pub story: String,
    pub summary50: Option<String>,
    pub options: Vec<String>,
    pub scene_image: Option<String>,
    #[serde(rename = "eventsRemaining")]
    pub events_remaining: u32,
    #[serde(rename = "storyComplete")]
    pub story_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lobby: Option<LobbyView>,
}

pub struct StoryFlow {
    registry: Arc<LobbyRegistry>,
    narrative: Arc<dyn NarrativePort>,
    illustrator: Arc<dyn IllustrationPort>,
}

impl StoryFlow {
    pub fn new(
        registry: Arc<LobbyRegistry>,
        narrative: Arc<dyn NarrativePort>,
        illustrator: Arc<dyn IllustrationPort>,
    ) -> Self {
        Self {
            registry,
            narrative,
            illustrator,
        }
    }

    pub async fn execute(&self, request: StoryRequest) -> Result<StoryResponse, StoryError> {
        let lobby_context = match (&request.lobby_code, request.user_id) {
            (Some(code), Some(user_id)) if !code.is_empty() => Some((code.clone(), user_id)),
            _ => None,
        };

        // Lobby mode: validate membership and read the authoritative counter.
        let (events_remaining, lobby) = match &lobby_context {
            Some((code, user_id)) => {
                let lobby = self
                    .registry
                    .lobby(code)
                    .map_err(|_| StoryError::LobbyNotFound)?;
                let guard = lobby.lock().await;
                if !guard.is_member(*user_id) {
                    return Err(StoryError::NotAMember);
                }
                if guard.story_complete() {
                    return Ok(StoryResponse {
                        story: prompts::END_STORY_COLLABORATIVE.to_string(),
                        summary50: Some(prompts::END_SUMMARY_COLLABORATIVE.to_string()),
                        options: vec![],
                        scene_image: None,
                        events_remaining: 0,
                        story_complete: true,
                        lobby: Some(guard.to_view()),
                    });
                }
                let events = guard.events_remaining();
                drop(guard);
                (events, Some(lobby))
            }
            // The client-supplied counter is untrusted; clamp it so the
            // prompt arithmetic and the returned counter stay in range.
            None => (
                request.events_remaining.unwrap_or(TOTAL_EVENTS).min(TOTAL_EVENTS),
                None,
            ),
        };

        if events_remaining == 0 {
            return Ok(StoryResponse {
                story: prompts::END_STORY_SOLO.to_string(),
                summary50: Some(prompts::END_SUMMARY_SOLO.to_string()),
                options: vec![],
                scene_image: None,
                events_remaining: 0,
                story_complete: true,
                lobby: None,
            });
        }

        let prompt = prompts::solo_prompt(events_remaining, &request.message);
        let raw_text = match self.narrative.generate(&prompt).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Narrative generation failed for story continuation");
                None
            }
        };

        // Unlike the round protocol, a failed extraction here keeps the
        // raw text as the story rather than substituting canned content.
        let (story, summary50, options) = match raw_text {
            Some(text) => match extract_story_payload(&text) {
                Some(payload) => (
                    payload
                        .story
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| prompts::SOLO_TROUBLE_STORY.to_string()),
                    payload.summary50,
                    payload.options,
                ),
                None => (text, None, vec![]),
            },
            None => (prompts::SOLO_TROUBLE_STORY.to_string(), None, vec![]),
        };

        let scene_image = match &summary50 {
            Some(summary) if !summary.is_empty() => {
                let correlation = request
                    .user_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "solo_player".to_string());
                match self.illustrator.illustrate(summary, &correlation).await {
                    Ok(image) => image,
                    Err(e) => {
                        tracing::warn!(error = %e, "Scene illustration failed");
                        None
                    }
                }
            }
            _ => None,
        };

        let new_events_remaining = events_remaining.saturating_sub(1);

        let lobby_view = match (&lobby, &lobby_context) {
            (Some(lobby), Some((_, user_id))) => {
                let mut guard = lobby.lock().await;
                guard
                    .commit_solo(
                        *user_id,
                        story.clone(),
                        options.clone(),
                        scene_image.clone(),
                        Utc::now(),
                    )
                    .map_err(|_| StoryError::NotAMember)?;
                Some(guard.to_view())
            }
            _ => None,
        };

        Ok(StoryResponse {
            story,
            summary50,
            options,
            scene_image,
            events_remaining: new_events_remaining,
            story_complete: new_events_remaining == 0,
            lobby: lobby_view,
        })
    }
}
