//! Taleloom domain layer.
//!
//! Pure types and invariants for the collaborative storytelling game:
//! lobby membership, readiness and choice tracking, round records, and
//! the bounded event counter that drives story completion. No IO here.

pub mod error;
pub mod ids;
pub mod lobby;

pub use error::DomainError;
pub use ids::{LobbyCode, UserId};
pub use lobby::{
    Lobby, LobbyMember, LobbyStatus, LobbyView, MemberView, PlayerOptions, RoundOutcome,
    StoryEntry, MAX_MEMBERS, TOTAL_EVENTS,
};
