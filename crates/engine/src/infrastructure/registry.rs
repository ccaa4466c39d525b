//! Lobby registry: process-wide lobby and user-session state.
//!
//! Owns the lobby-code -> lobby map, the user -> lobby index, and the
//! round-in-progress marker. All mutation of one lobby's fields happens
//! under that lobby's own mutex so unrelated lobbies never block each
//! other; the registry maps themselves are concurrent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use tokio::sync::Mutex;

use taleloom_domain::{DomainError, Lobby, LobbyCode, LobbyView, UserId};

/// Registry operation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Lobby not found")]
    LobbyNotFound,
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Result of leaving a lobby.
#[derive(Debug, Clone)]
pub enum LeaveOutcome {
    /// The lobby still has members; here is its updated view.
    Left(LobbyView),
    /// The leaving user was the last member and the lobby was destroyed.
    LobbyDeleted,
}

/// Manages all active lobbies.
pub struct LobbyRegistry {
    /// Active lobbies by lobby code.
    lobbies: DashMap<LobbyCode, Arc<Mutex<Lobby>>>,
    /// Maps user ids to their current lobby.
    user_lobbies: DashMap<UserId, LobbyCode>,
    /// Lobby codes with a round generation currently in flight.
    rounds_in_progress: DashSet<LobbyCode>,
}

impl LobbyRegistry {
    pub fn new() -> Self {
        Self {
            lobbies: DashMap::new(),
            user_lobbies: DashMap::new(),
            rounds_in_progress: DashSet::new(),
        }
    }

    /// Create a lobby with a fresh code and host user id.
    pub fn create(&self, host_username: &str, now: DateTime<Utc>) -> (LobbyCode, UserId, LobbyView) {
        let host_id = UserId::new();
        // Codes are 8 hex chars; regenerate on the off chance of a clash.
        let code = loop {
            let candidate = LobbyCode::random();
            if !self.lobbies.contains_key(&candidate) {
                break candidate;
            }
        };

        let lobby = Lobby::new(code.clone(), host_id, host_username, now);
        let view = lobby.to_view();
        self.lobbies.insert(code.clone(), Arc::new(Mutex::new(lobby)));
        self.user_lobbies.insert(host_id, code.clone());

        tracing::info!(lobby = %code, host = %host_id, "Created lobby");
        (code, host_id, view)
    }

    /// Join an existing lobby, generating a fresh user id.
    pub async fn join(
        &self,
        code: &LobbyCode,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<(UserId, LobbyView), RegistryError> {
        let lobby = self.lobby(code)?;
        let user_id = UserId::new();

        let view = {
            let mut guard = lobby.lock().await;
            guard.add_member(user_id, username, now)?;
            guard.to_view()
        };
        self.user_lobbies.insert(user_id, code.clone());

        tracing::info!(lobby = %code, user = %user_id, username, "User joined lobby");
        Ok((user_id, view))
    }

    /// Remove a user from a lobby, destroying the lobby when it empties.
    ///
    /// When `code` is `None` the lobby is resolved through the
    /// user -> lobby index.
    pub async fn leave(
        &self,
        user_id: UserId,
        code: Option<LobbyCode>,
    ) -> Result<LeaveOutcome, RegistryError> {
        let code = code
            .filter(|c| !c.is_empty())
            .or_else(|| self.user_lobbies.get(&user_id).map(|e| e.value().clone()))
            .ok_or(RegistryError::LobbyNotFound)?;
        let lobby = self.lobby(&code)?;

        let (now_empty, view) = {
            let mut guard = lobby.lock().await;
            guard.remove_member(user_id)?;
            (guard.is_empty(), guard.to_view())
        };
        self.user_lobbies.remove(&user_id);

        if now_empty {
            self.lobbies.remove(&code);
            self.rounds_in_progress.remove(&code);
            tracing::info!(lobby = %code, "Last member left, lobby deleted");
            return Ok(LeaveOutcome::LobbyDeleted);
        }

        tracing::info!(lobby = %code, user = %user_id, "User left lobby");
        Ok(LeaveOutcome::Left(view))
    }

    /// Read-only lookup of a lobby's current view.
    pub async fn get_view(&self, code: &LobbyCode) -> Result<LobbyView, RegistryError> {
        let lobby = self.lobby(code)?;
        let guard = lobby.lock().await;
        Ok(guard.to_view())
    }

    /// Handle to a lobby for callers that need its mutex directly.
    pub fn lobby(&self, code: &LobbyCode) -> Result<Arc<Mutex<Lobby>>, RegistryError> {
        self.lobbies
            .get(code)
            .map(|entry| entry.value().clone())
            .ok_or(RegistryError::LobbyNotFound)
    }

    /// The lobby a user currently belongs to, if any.
    pub fn lobby_code_for(&self, user_id: UserId) -> Option<LobbyCode> {
        self.user_lobbies.get(&user_id).map(|e| e.value().clone())
    }

    /// Atomically mark a round generation as in progress for a lobby.
    ///
    /// Returns `None` if a generation is already in flight. The guard
    /// clears the marker on drop, so every exit path releases it.
    pub fn begin_round(&self, code: &LobbyCode) -> Option<RoundGuard<'_>> {
        self.rounds_in_progress.insert(code.clone()).then(|| RoundGuard {
            rounds_in_progress: &self.rounds_in_progress,
            code: code.clone(),
        })
    }

    #[cfg(test)]
    pub fn round_in_progress(&self, code: &LobbyCode) -> bool {
        self.rounds_in_progress.contains(code)
    }
}

impl Default for LobbyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII round-in-progress marker.
pub struct RoundGuard<'a> {
    rounds_in_progress: &'a DashSet<LobbyCode>,
    code: LobbyCode,
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        self.rounds_in_progress.remove(&self.code);
    }
}
