//! Application state and composition.

use std::sync::Arc;

use crate::infrastructure::ports::{IllustrationPort, NarrativePort, SpeechPort};
use crate::infrastructure::registry::LobbyRegistry;
use crate::use_cases::round::RoundCoordinator;
use crate::use_cases::story::StoryFlow;

/// Main application state.
///
/// Holds the lobby registry and use cases. Passed to HTTP handlers via
/// Axum state.
pub struct App {
    pub registry: Arc<LobbyRegistry>,
    pub rounds: RoundCoordinator,
    pub story: StoryFlow,
    pub speech: Arc<dyn SpeechPort>,
}

impl App {
    pub fn new(
        narrative: Arc<dyn NarrativePort>,
        illustrator: Arc<dyn IllustrationPort>,
        speech: Arc<dyn SpeechPort>,
    ) -> Self {
        let registry = Arc::new(LobbyRegistry::new());
        let rounds = RoundCoordinator::new(registry.clone(), narrative.clone(), illustrator.clone());
        let story = StoryFlow::new(registry.clone(), narrative, illustrator);
        Self {
            registry,
            rounds,
            story,
            speech,
        }
    }
}
