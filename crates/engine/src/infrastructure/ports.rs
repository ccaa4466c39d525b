//! External service port traits (narrative, illustration, speech).

use async_trait::async_trait;

/// Errors from the narrative pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NarrativeError {
    #[error("Narrative request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Narrative pipeline not configured")]
    NotConfigured,
}

/// Errors from the scene illustrator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IllustrationError {
    #[error("Illustration failed: {0}")]
    GenerationFailed(String),
}

/// Errors from the text-to-speech service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SpeechError {
    #[error("ElevenLabs API key not configured. Add ELEVENLABS_API_KEY to .env")]
    NotConfigured,
    #[error("Speech synthesis failed: {0}")]
    RequestFailed(String),
}

/// The external LLM-backed pipeline producing story text.
///
/// The contract is deliberately narrow: one prompt in, raw text out.
/// Callers treat any failure as "no output" and degrade to fallback
/// content rather than surfacing the error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NarrativePort: Send + Sync {
    async fn generate(&self, request: &str) -> Result<String, NarrativeError>;
}

/// The external image-generation service keyed by scene summary text.
///
/// Returns an image URL when the provider produced one; `Ok(None)` when
/// the provider is unconfigured or its response carried no usable URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IllustrationPort: Send + Sync {
    async fn illustrate(
        &self,
        summary: &str,
        correlation_key: &str,
    ) -> Result<Option<String>, IllustrationError>;
}

/// Text-to-speech synthesis for narrated audio.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechPort: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
}
