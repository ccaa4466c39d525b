//! Round coordinator: the collaborative round-progression protocol.
//!
//! Drives the bounded event sequence for a lobby and guarantees each
//! round transition happens exactly once. Two triggers share the same
//! generation protocol: "start game" (all members ready) and "all
//! players chosen" (last choice submitted). Both race-prone paths are
//! serialized by the registry's round-in-progress marker; the lobby
//! mutex is held only to snapshot and to commit, never across the
//! collaborator calls.

pub mod extract;
pub mod prompts;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use taleloom_domain::{
    Lobby, LobbyCode, LobbyStatus, LobbyView, PlayerOptions, RoundOutcome, UserId,
};

use crate::infrastructure::ports::{IllustrationPort, NarrativePort};
use crate::infrastructure::registry::{LobbyRegistry, RegistryError};

use extract::extract_story_payload;

/// Round-trigger errors, detected before any collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoundError {
    #[error("Lobby not found")]
    LobbyNotFound,
    #[error("User not in lobby")]
    NotAMember,
    #[error("Lobby is already starting")]
    RoundAlreadyInProgress,
    #[error("Need at least 2 players to start")]
    NotEnoughPlayers,
    #[error("All players must be ready to start")]
    NotAllReady,
}

impl From<RegistryError> for RoundError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::LobbyNotFound => Self::LobbyNotFound,
            RegistryError::Domain(_) => Self::NotAMember,
        }
    }
}

/// A committed round, returned to the triggering caller.
#[derive(Debug, Clone)]
pub struct CommittedRound {
    pub story: String,
    pub summary50: Option<String>,
    pub player_options: BTreeMap<String, PlayerOptions>,
    pub scene_image: Option<String>,
    pub events_remaining: u32,
    pub story_complete: bool,
    pub lobby: LobbyView,
}

/// Outcome of the "start game" trigger.
#[derive(Debug, Clone)]
pub enum StartOutcome {
    Started(CommittedRound),
    /// The game is already running; no generation happened.
    AlreadyPlaying(LobbyView),
}

/// Outcome of a choice submission.
#[derive(Debug, Clone)]
pub enum ChoiceOutcome {
    /// Choice recorded; other players still deciding.
    Waiting {
        choices_submitted: usize,
        total_users: usize,
        lobby: LobbyView,
    },
    /// The story is over; nothing was generated or mutated.
    StoryComplete { lobby: LobbyView },
    /// This was the last outstanding choice; a round was generated.
    Committed(CommittedRound),
}

/// Consistent snapshot of lobby state taken under the lobby lock,
/// carried across the (slow) collaborator calls.
struct RoundSnapshot {
    members: Vec<(String, String)>,
    choice_pairs: Vec<(String, String)>,
    user_choices: BTreeMap<String, String>,
    events_remaining: u32,
    previous_story: Option<String>,
}

impl RoundSnapshot {
    fn of(lobby: &Lobby) -> Self {
        Self {
            members: lobby
                .members()
                .iter()
                .map(|m| (m.user_id.to_string(), m.username.clone()))
                .collect(),
            choice_pairs: lobby
                .members()
                .iter()
                .filter_map(|m| m.choice.clone().map(|c| (m.username.clone(), c)))
                .collect(),
            user_choices: lobby
                .members()
                .iter()
                .filter_map(|m| m.choice.clone().map(|c| (m.user_id.to_string(), c)))
                .collect(),
            events_remaining: lobby.events_remaining(),
            previous_story: lobby.last_story_content().map(|s| s.to_string()),
        }
    }
}

/// Orchestrates round generation against the narrative and illustration
/// collaborators.
pub struct RoundCoordinator {
    registry: Arc<LobbyRegistry>,
    narrative: Arc<dyn NarrativePort>,
    illustrator: Arc<dyn IllustrationPort>,
}

impl RoundCoordinator {
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

    /// Generate the opening round once every member has readied up.
    pub async fn start_game(
        &self,
        code: &LobbyCode,
        requester: Option<UserId>,
    ) -> Result<StartOutcome, RoundError> {
        let lobby = self
            .registry
            .lobby(code)
            .map_err(|_| RoundError::LobbyNotFound)?;

        let guard = lobby.lock().await;
        if let Some(user_id) = requester {
            if !guard.is_member(user_id) {
                return Err(RoundError::NotAMember);
            }
        }
        let Some(_round_guard) = self.registry.begin_round(code) else {
            return Err(RoundError::RoundAlreadyInProgress);
        };
        if guard.member_count() < 2 {
            return Err(RoundError::NotEnoughPlayers);
        }
        if guard.status() == LobbyStatus::Playing {
            // Idempotent no-op: the opening round already happened.
            return Ok(StartOutcome::AlreadyPlaying(guard.to_view()));
        }
        if !guard.all_ready() {
            return Err(RoundError::NotAllReady);
        }

        let snapshot = RoundSnapshot::of(&guard);
        drop(guard);

        tracing::info!(lobby = %code, players = snapshot.members.len(), "Starting game");
        let committed = self.generate_and_commit(&lobby, code, snapshot, true).await;
        Ok(StartOutcome::Started(committed))
    }

    /// Record one player's choice; generates the next round when this
    /// was the last outstanding choice.
    pub async fn submit_choice(
        &self,
        code: &LobbyCode,
        user_id: UserId,
        choice: &str,
    ) -> Result<ChoiceOutcome, RoundError> {
        let lobby = self
            .registry
            .lobby(code)
            .map_err(|_| RoundError::LobbyNotFound)?;

        let guard = lobby.lock().await;
        // Membership doubles as the zero-member guard: the trigger path
        // below can only run with at least this one member present.
        if !guard.is_member(user_id) {
            return Err(RoundError::NotAMember);
        }
        if guard.story_complete() {
            // Terminal state: no generation, no mutation.
            return Ok(ChoiceOutcome::StoryComplete {
                lobby: guard.to_view(),
            });
        }
        let mut guard = guard;
        guard
            .set_choice(user_id, choice)
            .map_err(|_| RoundError::NotAMember)?;

        if !guard.all_chosen() {
            let submitted = guard
                .members()
                .iter()
                .filter(|m| m.choice.is_some())
                .count();
            return Ok(ChoiceOutcome::Waiting {
                choices_submitted: submitted,
                total_users: guard.member_count(),
                lobby: guard.to_view(),
            });
        }

        let Some(_round_guard) = self.registry.begin_round(code) else {
            return Err(RoundError::RoundAlreadyInProgress);
        };
        let snapshot = RoundSnapshot::of(&guard);
        drop(guard);

        tracing::info!(lobby = %code, "All players chose, generating round");
        let committed = self.generate_and_commit(&lobby, code, snapshot, false).await;
        Ok(ChoiceOutcome::Committed(committed))
    }

    /// Round generation protocol steps 2-6: prompt, narrative call,
    /// extraction with deterministic fallback, synchronous illustration,
    /// atomic commit. Collaborator failures never fail the round.
    async fn generate_and_commit(
        &self,
        lobby: &tokio::sync::Mutex<Lobby>,
        code: &LobbyCode,
        snapshot: RoundSnapshot,
        opening: bool,
    ) -> CommittedRound {
        let prompt = if opening {
            prompts::opening_prompt(snapshot.members.len())
        } else {
            prompts::continuation_prompt(
                snapshot.members.len(),
                snapshot.events_remaining,
                &snapshot.choice_pairs,
                snapshot.previous_story.as_deref(),
            )
        };

        let raw_text = match self.narrative.generate(&prompt).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(lobby = %code, error = %e, "Narrative generation failed, using fallback");
                None
            }
        };

        let payload = raw_text
            .as_deref()
            .and_then(extract_story_payload)
            .unwrap_or_default();

        let (story, summary50) = match payload.story.filter(|s| !s.is_empty()) {
            Some(story) => (story, payload.summary50),
            None => (
                prompts::FALLBACK_STORY.to_string(),
                Some(prompts::FALLBACK_SUMMARY.to_string()),
            ),
        };

        let player_options = prompts::assign_player_options(&snapshot.members, opening);

        let scene_image = match &summary50 {
            Some(summary) if !summary.is_empty() => {
                match self.illustrator.illustrate(summary, code.as_str()).await {
                    Ok(image) => image,
                    Err(e) => {
                        tracing::warn!(lobby = %code, error = %e, "Scene illustration failed");
                        None
                    }
                }
            }
            _ => None,
        };

        let mut guard = lobby.lock().await;
        guard.commit_round(RoundOutcome {
            story: story.clone(),
            summary50: summary50.clone(),
            user_choices: snapshot.user_choices,
            player_options: player_options.clone(),
            scene_image: scene_image.clone(),
            timestamp: Utc::now(),
        });
        let view = guard.to_view();
        drop(guard);

        tracing::info!(
            lobby = %code,
            round = view.current_round,
            events_remaining = view.events_remaining,
            "Round committed"
        );

        CommittedRound {
            story,
            summary50,
            player_options,
            scene_image,
            events_remaining: view.events_remaining,
            story_complete: view.story_complete,
            lobby: view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    use crate::infrastructure::ports::{
        IllustrationError, MockIllustrationPort, MockNarrativePort, NarrativeError, NarrativePort,
    };

    fn coordinator(
        narrative: MockNarrativePort,
        illustrator: MockIllustrationPort,
    ) -> (Arc<LobbyRegistry>, RoundCoordinator) {
        let registry = Arc::new(LobbyRegistry::new());
        let coordinator = RoundCoordinator::new(
            registry.clone(),
            Arc::new(narrative),
            Arc::new(illustrator),
        );
        (registry, coordinator)
    }

    async fn ready_pair(registry: &LobbyRegistry) -> (LobbyCode, UserId, UserId) {
        let (code, alice, _) = registry.create("Alice", Utc::now());
        let (bob, _) = registry.join(&code, "Bob", Utc::now()).await.expect("join");
        let lobby = registry.lobby(&code).expect("lobby");
        {
            let mut guard = lobby.lock().await;
            guard.set_ready(alice, true).expect("ready");
            guard.set_ready(bob, true).expect("ready");
        }
        (code, alice, bob)
    }

    fn no_illustration() -> MockIllustrationPort {
        let mut illustrator = MockIllustrationPort::new();
        illustrator.expect_illustrate().returning(|_, _| Ok(None));
        illustrator
    }

    #[tokio::test]
    async fn start_commits_opening_round_from_model_output() {
        let mut narrative = MockNarrativePort::new();
        narrative.expect_generate().times(1).returning(|_| {
            Ok("```json\n{\"story\":\"S\",\"summary50\":\"X\",\"options\":[\"a\"]}\n```".to_string())
        });
        let mut illustrator = MockIllustrationPort::new();
        illustrator
            .expect_illustrate()
            .times(1)
            .returning(|_, _| Ok(Some("https://img.example/scene.png".to_string())));

        let (registry, coordinator) = coordinator(narrative, illustrator);
        let (code, alice, _) = ready_pair(&registry).await;

        let outcome = coordinator
            .start_game(&code, Some(alice))
            .await
            .expect("start");
        let StartOutcome::Started(round) = outcome else {
            panic!("expected a committed round");
        };
        assert_eq!(round.story, "S");
        assert_eq!(round.summary50.as_deref(), Some("X"));
        assert_eq!(round.scene_image.as_deref(), Some("https://img.example/scene.png"));
        assert_eq!(round.events_remaining, 9);
        assert!(!round.story_complete);
        assert_eq!(round.player_options.len(), 2);
        assert_eq!(round.lobby.status, LobbyStatus::Playing);
        assert_eq!(round.lobby.story_messages.len(), 1);
        assert!(round.lobby.users.values().all(|u| !u.ready));
    }

    #[tokio::test]
    async fn narrative_failure_degrades_to_deterministic_fallback() {
        let mut narrative = MockNarrativePort::new();
        narrative
            .expect_generate()
            .returning(|_| Err(NarrativeError::RequestFailed("timeout".to_string())));
        let mut illustrator = MockIllustrationPort::new();
        illustrator
            .expect_illustrate()
            .withf(|summary, _| summary == prompts::FALLBACK_SUMMARY)
            .returning(|_, _| Err(IllustrationError::GenerationFailed("down".to_string())));

        let (registry, coordinator) = coordinator(narrative, illustrator);
        let (code, alice, _) = ready_pair(&registry).await;

        let outcome = coordinator
            .start_game(&code, Some(alice))
            .await
            .expect("degrades, never errors");
        let StartOutcome::Started(round) = outcome else {
            panic!("expected a committed round");
        };
        assert_eq!(round.story, prompts::FALLBACK_STORY);
        assert_eq!(round.summary50.as_deref(), Some(prompts::FALLBACK_SUMMARY));
        assert_eq!(round.scene_image, None);
        for options in round.player_options.values() {
            assert_eq!(options.options.len(), 4);
        }
        assert_eq!(round.events_remaining, 9);
    }

    #[tokio::test]
    async fn start_validates_players_and_readiness() {
        let narrative = MockNarrativePort::new();
        let illustrator = MockIllustrationPort::new();
        let (registry, coordinator) = coordinator(narrative, illustrator);

        let (code, alice, _) = registry.create("Alice", Utc::now());
        assert!(matches!(
            coordinator.start_game(&code, Some(alice)).await,
            Err(RoundError::NotEnoughPlayers)
        ));

        let (bob, _) = registry.join(&code, "Bob", Utc::now()).await.expect("join");
        assert!(matches!(
            coordinator.start_game(&code, Some(bob)).await,
            Err(RoundError::NotAllReady)
        ));

        assert!(matches!(
            coordinator.start_game(&code, Some(UserId::new())).await,
            Err(RoundError::NotAMember)
        ));
        assert!(matches!(
            coordinator
                .start_game(&LobbyCode::parse("MISSING1"), None)
                .await,
            Err(RoundError::LobbyNotFound)
        ));
    }

    #[tokio::test]
    async fn restart_while_playing_is_an_idempotent_noop() {
        let mut narrative = MockNarrativePort::new();
        narrative
            .expect_generate()
            .times(1)
            .returning(|_| Err(NarrativeError::NotConfigured));
        let (registry, coordinator) = coordinator(narrative, no_illustration());
        let (code, alice, _) = ready_pair(&registry).await;

        coordinator
            .start_game(&code, Some(alice))
            .await
            .expect("first start");

        let outcome = coordinator
            .start_game(&code, Some(alice))
            .await
            .expect("second start is a no-op");
        let StartOutcome::AlreadyPlaying(view) = outcome else {
            panic!("expected idempotent no-op");
        };
        assert_eq!(view.story_messages.len(), 1, "no duplicate round");
        assert_eq!(view.events_remaining, 9);
    }

    /// Narrative fake that stalls long enough for a duplicate trigger
    /// to land while generation is in flight.
    struct SlowNarrative(Duration);

    #[async_trait]
    impl NarrativePort for SlowNarrative {
        async fn generate(&self, _request: &str) -> Result<String, NarrativeError> {
            tokio::time::sleep(self.0).await;
            Ok(r#"{"story":"slow","summary50":"slow","options":[]}"#.to_string())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_duplicate_trigger_generates_exactly_once() {
        let registry = Arc::new(LobbyRegistry::new());
        let coordinator = Arc::new(RoundCoordinator::new(
            registry.clone(),
            Arc::new(SlowNarrative(Duration::from_millis(250))),
            Arc::new({
                let mut illustrator = MockIllustrationPort::new();
                illustrator.expect_illustrate().returning(|_, _| Ok(None));
                illustrator
            }),
        ));
        let (code, alice, bob) = ready_pair(&registry).await;

        let first = {
            let coordinator = coordinator.clone();
            let code = code.clone();
            tokio::spawn(async move { coordinator.start_game(&code, Some(alice)).await })
        };
        // Give the first trigger time to take the marker and enter generation.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = coordinator.start_game(&code, Some(bob)).await;

        assert!(matches!(second, Err(RoundError::RoundAlreadyInProgress)));
        let first = first.await.expect("join").expect("first trigger wins");
        assert!(matches!(first, StartOutcome::Started(_)));

        let view = registry.get_view(&code).await.expect("view");
        assert_eq!(view.story_messages.len(), 1, "exactly one round committed");
        assert_eq!(view.events_remaining, 9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_final_choices_commit_exactly_once() {
        let registry = Arc::new(LobbyRegistry::new());
        let coordinator = Arc::new(RoundCoordinator::new(
            registry.clone(),
            Arc::new(SlowNarrative(Duration::from_millis(250))),
            Arc::new({
                let mut illustrator = MockIllustrationPort::new();
                illustrator.expect_illustrate().returning(|_, _| Ok(None));
                illustrator
            }),
        ));
        let (code, alice, bob) = ready_pair(&registry).await;

        let outcome = coordinator
            .submit_choice(&code, alice, "Open the door")
            .await
            .expect("first choice");
        assert!(matches!(outcome, ChoiceOutcome::Waiting { .. }));

        // Bob's submission completes the set and enters generation.
        let first = {
            let coordinator = coordinator.clone();
            let code = code.clone();
            tokio::spawn(
                async move { coordinator.submit_choice(&code, bob, "Light a torch").await },
            )
        };
        // Give the final trigger time to take the marker and enter generation.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = coordinator
            .submit_choice(&code, alice, "Open the door")
            .await;

        assert!(matches!(second, Err(RoundError::RoundAlreadyInProgress)));
        let first = first.await.expect("join").expect("final trigger wins");
        assert!(matches!(first, ChoiceOutcome::Committed(_)));

        let view = registry.get_view(&code).await.expect("view");
        assert_eq!(view.story_messages.len(), 1, "exactly one round committed");
        assert_eq!(view.events_remaining, 9);
        assert!(
            !registry.round_in_progress(&code),
            "marker released after commit"
        );
    }

    #[tokio::test]
    async fn choice_waits_until_everyone_has_chosen() {
        let mut narrative = MockNarrativePort::new();
        narrative.expect_generate().times(1).returning(|request| {
            assert!(request.contains("Alice: Open the door"));
            assert!(request.contains("Bob: Light a torch"));
            Ok(r#"{"story":"Next","summary50":"N","options":[]}"#.to_string())
        });
        let (registry, coordinator) = coordinator(narrative, no_illustration());
        let (code, alice, bob) = ready_pair(&registry).await;

        let outcome = coordinator
            .submit_choice(&code, alice, "Open the door")
            .await
            .expect("first choice");
        let ChoiceOutcome::Waiting {
            choices_submitted,
            total_users,
            ..
        } = outcome
        else {
            panic!("expected waiting");
        };
        assert_eq!((choices_submitted, total_users), (1, 2));

        let outcome = coordinator
            .submit_choice(&code, bob, "Light a torch")
            .await
            .expect("last choice triggers the round");
        let ChoiceOutcome::Committed(round) = outcome else {
            panic!("expected a committed round");
        };
        assert_eq!(round.story, "Next");
        assert_eq!(round.events_remaining, 9);
        assert!(round.lobby.users.values().all(|u| u.choice.is_none()));

        // The committed entry carries everyone's choice.
        match &round.lobby.story_messages[0] {
            taleloom_domain::StoryEntry::Collaborative { user_choices, .. } => {
                assert_eq!(user_choices[&alice.to_string()], "Open the door");
                assert_eq!(user_choices[&bob.to_string()], "Light a torch");
            }
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[tokio::test]
    async fn final_round_completes_the_story() {
        let mut narrative = MockNarrativePort::new();
        narrative
            .expect_generate()
            .returning(|_| Ok(r#"{"story":"End","summary50":"E","options":[]}"#.to_string()));
        let (registry, coordinator) = coordinator(narrative, no_illustration());
        let (code, alice, bob) = ready_pair(&registry).await;

        // Drive the lobby to its last event.
        let lobby = registry.lobby(&code).expect("lobby");
        {
            let mut guard = lobby.lock().await;
            for _ in 0..9 {
                guard.commit_round(RoundOutcome {
                    story: "...".to_string(),
                    summary50: None,
                    user_choices: BTreeMap::new(),
                    player_options: BTreeMap::new(),
                    scene_image: None,
                    timestamp: Utc::now(),
                });
            }
            assert_eq!(guard.events_remaining(), 1);
        }

        coordinator
            .submit_choice(&code, alice, "a")
            .await
            .expect("choice");
        let outcome = coordinator
            .submit_choice(&code, bob, "b")
            .await
            .expect("final round");
        let ChoiceOutcome::Committed(round) = outcome else {
            panic!("expected a committed round");
        };
        assert_eq!(round.events_remaining, 0);
        assert!(round.story_complete);
        assert_eq!(round.lobby.story_messages.len(), 10);
    }

    #[tokio::test]
    async fn completed_story_short_circuits_without_collaborators() {
        // Mocks with no expectations: any collaborator call would panic.
        let (registry, coordinator) =
            coordinator(MockNarrativePort::new(), MockIllustrationPort::new());
        let (code, alice, _) = ready_pair(&registry).await;

        let lobby = registry.lobby(&code).expect("lobby");
        {
            let mut guard = lobby.lock().await;
            for _ in 0..10 {
                guard.commit_round(RoundOutcome {
                    story: "...".to_string(),
                    summary50: None,
                    user_choices: BTreeMap::new(),
                    player_options: BTreeMap::new(),
                    scene_image: None,
                    timestamp: Utc::now(),
                });
            }
        }

        let before = registry.get_view(&code).await.expect("view");
        let outcome = coordinator
            .submit_choice(&code, alice, "again")
            .await
            .expect("terminal response");
        let ChoiceOutcome::StoryComplete { lobby: view } = outcome else {
            panic!("expected terminal short-circuit");
        };
        assert_eq!(view.events_remaining, 0);
        assert_eq!(view.current_round, before.current_round);
        assert_eq!(view.story_messages.len(), before.story_messages.len());
    }
}
