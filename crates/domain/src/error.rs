//! Unified error type for domain operations.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Lobby is at capacity.
    #[error("Lobby is full")]
    LobbyFull,

    /// User is already a member of the lobby.
    #[error("User already in lobby")]
    AlreadyMember,

    /// User is not a member of the lobby.
    #[error("User not in lobby")]
    NotAMember,
}
