//! The `Lobby` entity and its invariants.
//!
//! A lobby groups 2-3 players around a shared evolving story. Membership,
//! readiness, per-round choices and the bounded event counter all live
//! here; orchestration (prompting, generation, commit ordering) lives in
//! the engine's round coordinator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{LobbyCode, UserId};

/// Hard cap on lobby membership.
pub const MAX_MEMBERS: usize = 3;

/// Every story runs exactly this many events.
pub const TOTAL_EVENTS: u32 = 10;

/// Lifecycle status, informational only.
///
/// `events_remaining` + `story_complete` are the authoritative
/// termination state; `Completed` is reachable but the game keeps
/// lobbies at `Playing` with `story_complete = true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LobbyStatus {
    Waiting,
    Playing,
    Completed,
}

/// One player in a lobby.
#[derive(Debug, Clone)]
pub struct LobbyMember {
    pub user_id: UserId,
    pub username: String,
    pub joined_at: DateTime<Utc>,
    pub ready: bool,
    pub choice: Option<String>,
}

/// Option list assigned to one player for the upcoming round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerOptions {
    pub username: String,
    pub options: Vec<String>,
}

/// One record in a lobby's append-only story log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoryEntry {
    /// A committed collaborative round.
    Collaborative {
        content: String,
        timestamp: DateTime<Utc>,
        user_choices: BTreeMap<String, String>,
        summary50: Option<String>,
        player_options: BTreeMap<String, PlayerOptions>,
        scene_image: Option<String>,
    },
    /// A solo continuation submitted by one member via `/story`.
    Solo {
        user_id: String,
        username: String,
        content: String,
        timestamp: DateTime<Utc>,
        options: Vec<String>,
        scene_image: Option<String>,
    },
}

/// Everything the round coordinator commits at the end of a round.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub story: String,
    pub summary50: Option<String>,
    pub user_choices: BTreeMap<String, String>,
    pub player_options: BTreeMap<String, PlayerOptions>,
    pub scene_image: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A single game session's full state.
///
/// Members are kept in insertion order; that order is what makes host
/// reassignment and the per-player option rotation deterministic.
#[derive(Debug, Clone)]
pub struct Lobby {
    code: LobbyCode,
    host_user_id: UserId,
    host_username: String,
    members: Vec<LobbyMember>,
    story_messages: Vec<StoryEntry>,
    events_remaining: u32,
    story_complete: bool,
    current_round: u32,
    created_at: DateTime<Utc>,
    status: LobbyStatus,
}

impl Lobby {
    pub fn new(code: LobbyCode, host_user_id: UserId, host_username: &str, now: DateTime<Utc>) -> Self {
        Self {
            code,
            host_user_id,
            host_username: host_username.to_string(),
            members: vec![LobbyMember {
                user_id: host_user_id,
                username: host_username.to_string(),
                joined_at: now,
                ready: false,
                choice: None,
            }],
            story_messages: Vec::new(),
            events_remaining: TOTAL_EVENTS,
            story_complete: false,
            current_round: 0,
            created_at: now,
            status: LobbyStatus::Waiting,
        }
    }

    pub fn code(&self) -> &LobbyCode {
        &self.code
    }

    pub fn host_user_id(&self) -> UserId {
        self.host_user_id
    }

    pub fn members(&self) -> &[LobbyMember] {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member(&self, user_id: UserId) -> Option<&LobbyMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn is_member(&self, user_id: UserId) -> bool {
        self.member(user_id).is_some()
    }

    pub fn events_remaining(&self) -> u32 {
        self.events_remaining
    }

    pub fn story_complete(&self) -> bool {
        self.story_complete
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn status(&self) -> LobbyStatus {
        self.status
    }

    /// Narrative text of the most recent story entry, used as prompt
    /// context for the next round.
    pub fn last_story_content(&self) -> Option<&str> {
        self.story_messages.last().map(|entry| match entry {
            StoryEntry::Collaborative { content, .. } | StoryEntry::Solo { content, .. } => {
                content.as_str()
            }
        })
    }

    pub fn story_len(&self) -> usize {
        self.story_messages.len()
    }

    pub fn add_member(&mut self, user_id: UserId, username: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.members.len() >= MAX_MEMBERS {
            return Err(DomainError::LobbyFull);
        }
        if self.is_member(user_id) {
            return Err(DomainError::AlreadyMember);
        }
        self.members.push(LobbyMember {
            user_id,
            username: username.to_string(),
            joined_at: now,
            ready: false,
            choice: None,
        });
        Ok(())
    }

    /// Remove a member; if the host left and members remain, the first
    /// remaining member (insertion order) becomes the new host.
    pub fn remove_member(&mut self, user_id: UserId) -> Result<(), DomainError> {
        let index = self
            .members
            .iter()
            .position(|m| m.user_id == user_id)
            .ok_or(DomainError::NotAMember)?;
        self.members.remove(index);
        if user_id == self.host_user_id {
            if let Some(next_host) = self.members.first() {
                self.host_user_id = next_host.user_id;
                self.host_username = next_host.username.clone();
            }
        }
        Ok(())
    }

    pub fn set_ready(&mut self, user_id: UserId, ready: bool) -> Result<(), DomainError> {
        let member = self
            .members
            .iter_mut()
            .find(|m| m.user_id == user_id)
            .ok_or(DomainError::NotAMember)?;
        member.ready = ready;
        Ok(())
    }

    pub fn set_choice(&mut self, user_id: UserId, choice: &str) -> Result<(), DomainError> {
        let member = self
            .members
            .iter_mut()
            .find(|m| m.user_id == user_id)
            .ok_or(DomainError::NotAMember)?;
        member.choice = Some(choice.to_string());
        Ok(())
    }

    /// True iff at least two members are present and every one is ready.
    /// A solo member can never trigger round start.
    pub fn all_ready(&self) -> bool {
        self.members.len() >= 2 && self.members.iter().all(|m| m.ready)
    }

    /// True iff every member has a submitted choice.
    ///
    /// Vacuously true with zero members; round-trigger callers must
    /// guard against empty lobbies before consulting this.
    pub fn all_chosen(&self) -> bool {
        self.members.iter().all(|m| m.choice.is_some())
    }

    pub fn reset_choices(&mut self) {
        for member in &mut self.members {
            member.choice = None;
        }
    }

    /// Atomically commit a generated round.
    ///
    /// Decrements `events_remaining` (floor 0), recomputes
    /// `story_complete`, bumps the round counter, appends the story
    /// entry, and clears every member's ready flag and choice.
    pub fn commit_round(&mut self, outcome: RoundOutcome) {
        self.events_remaining = self.events_remaining.saturating_sub(1);
        self.story_complete = self.events_remaining == 0;
        self.current_round += 1;
        self.status = LobbyStatus::Playing;
        self.story_messages.push(StoryEntry::Collaborative {
            content: outcome.story,
            timestamp: outcome.timestamp,
            user_choices: outcome.user_choices,
            summary50: outcome.summary50,
            player_options: outcome.player_options,
            scene_image: outcome.scene_image,
        });
        self.reset_choices();
        for member in &mut self.members {
            member.ready = false;
        }
    }

    /// Commit a solo `/story` continuation made inside a lobby.
    ///
    /// Advances the event counter and round number but leaves ready
    /// flags and choices untouched; solo continuations sit outside the
    /// collaborative ready/choice cycle.
    pub fn commit_solo(
        &mut self,
        user_id: UserId,
        story: String,
        options: Vec<String>,
        scene_image: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let username = self
            .member(user_id)
            .ok_or(DomainError::NotAMember)?
            .username
            .clone();
        self.events_remaining = self.events_remaining.saturating_sub(1);
        self.story_complete = self.events_remaining == 0;
        self.current_round += 1;
        self.story_messages.push(StoryEntry::Solo {
            user_id: user_id.to_string(),
            username,
            content: story,
            timestamp: now,
            options,
            scene_image,
        });
        Ok(())
    }

    /// Serializable snapshot for API responses.
    pub fn to_view(&self) -> LobbyView {
        LobbyView {
            id: self.code.clone(),
            host_user_id: self.host_user_id.to_string(),
            host_username: self.host_username.clone(),
            users: self
                .members
                .iter()
                .map(|m| {
                    (
                        m.user_id.to_string(),
                        MemberView {
                            username: m.username.clone(),
                            joined_at: m.joined_at,
                            ready: m.ready,
                            choice: m.choice.clone(),
                        },
                    )
                })
                .collect(),
            max_users: MAX_MEMBERS,
            story_messages: self.story_messages.clone(),
            events_remaining: self.events_remaining,
            story_complete: self.story_complete,
            current_round: self.current_round,
            created_at: self.created_at,
            status: self.status,
        }
    }
}

/// JSON view of a lobby, shaped for the HTTP surface.
///
/// Users are keyed by user id in a `BTreeMap` so serialized key order
/// is stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyView {
    pub id: LobbyCode,
    pub host_user_id: String,
    pub host_username: String,
    pub users: BTreeMap<String, MemberView>,
    pub max_users: usize,
    pub story_messages: Vec<StoryEntry>,
    pub events_remaining: u32,
    pub story_complete: bool,
    pub current_round: u32,
    pub created_at: DateTime<Utc>,
    pub status: LobbyStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberView {
    pub username: String,
    pub joined_at: DateTime<Utc>,
    pub ready: bool,
    pub choice: Option<String>,
}
