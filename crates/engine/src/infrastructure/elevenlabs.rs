//! ElevenLabs text-to-speech client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::infrastructure::ports::{SpeechError, SpeechPort};

/// Default ElevenLabs API base URL.
pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

/// George - British narrator. All narration uses this single voice;
/// per-character dialogue voices are out of scope.
pub const NARRATOR_VOICE_ID: &str = "JBFqnCBsd6RMkjVDRZzb";

const MODEL_ID: &str = "eleven_turbo_v2_5";
const OUTPUT_FORMAT: &str = "mp3_44100_128";

/// Client for the ElevenLabs text-to-speech API.
#[derive(Clone)]
pub struct ElevenLabsClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ElevenLabsClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    /// Create client from the `ELEVENLABS_API_KEY` environment variable.
    pub fn from_env() -> Self {
        Self::new(
            DEFAULT_ELEVENLABS_BASE_URL,
            std::env::var("ELEVENLABS_API_KEY").ok(),
        )
    }
}

#[async_trait]
impl SpeechPort for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let Some(api_key) = &self.api_key else {
            return Err(SpeechError::NotConfigured);
        };

        let response = self
            .client
            .post(format!(
                "{}/v1/text-to-speech/{NARRATOR_VOICE_ID}",
                self.base_url
            ))
            .query(&[("output_format", OUTPUT_FORMAT)])
            .header("xi-api-key", api_key)
            .json(&SpeechRequest {
                text,
                model_id: MODEL_ID,
            })
            .send()
            .await
            .map_err(|e| SpeechError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SpeechError::RequestFailed(format!(
                "{status}: {error_text}"
            )));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| SpeechError::RequestFailed(e.to_string()))
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}
