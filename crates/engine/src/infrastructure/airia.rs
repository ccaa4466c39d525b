//! Airia pipeline client (narrative generation)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use uuid::Uuid;

use crate::infrastructure::ports::{NarrativeError, NarrativePort};

/// Default Airia pipeline execution endpoint.
pub const DEFAULT_AIRIA_PIPELINE_URL: &str =
    "https://api.airia.ai/v2/PipelineExecution/74d3e775-1b60-42f2-be75-e3fb963a5e02";

/// Client for the Airia pipeline-execution API.
#[derive(Clone)]
pub struct AiriaClient {
    client: Client,
    pipeline_url: String,
    api_key: Option<String>,
    user_id: String,
}

impl AiriaClient {
    pub fn new(pipeline_url: &str, api_key: Option<String>, user_id: &str) -> Self {
        // Pipeline executions can be slow; match the 90 second budget
        // the round protocol allows for a narrative call.
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            pipeline_url: pipeline_url.trim_end_matches('/').to_string(),
            api_key,
            user_id: user_id.to_string(),
        }
    }

    /// Create client from environment variables.
    ///
    /// Uses `AIRIA_PIPELINE_URL`, `AIRIA_API_KEY` and `AIRIA_USER_ID`,
    /// falling back to the default pipeline and a random user id.
    pub fn from_env() -> Self {
        let pipeline_url = std::env::var("AIRIA_PIPELINE_URL")
            .unwrap_or_else(|_| DEFAULT_AIRIA_PIPELINE_URL.to_string());
        let api_key = std::env::var("AIRIA_API_KEY").ok().filter(|k| !k.is_empty());
        let user_id =
            std::env::var("AIRIA_USER_ID").unwrap_or_else(|_| Uuid::new_v4().to_string());
        Self::new(&pipeline_url, api_key, &user_id)
    }
}

#[async_trait]
impl NarrativePort for AiriaClient {
    async fn generate(&self, request: &str) -> Result<String, NarrativeError> {
        let Some(api_key) = &self.api_key else {
            return Err(NarrativeError::NotConfigured);
        };

        let payload = PipelineRequest {
            user_id: &self.user_id,
            request,
            async_output: false,
        };

        let response = self
            .client
            .post(&self.pipeline_url)
            .header("X-API-KEY", api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NarrativeError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(NarrativeError::RequestFailed(format!(
                "{status}: {error_text}"
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NarrativeError::InvalidResponse(e.to_string()))?;

        Ok(extract_pipeline_output(&body))
    }
}

/// Pull the generated text out of Airia's response envelope.
///
/// The pipeline wraps its text in one of a few fields depending on the
/// agent configuration; fall back to the raw body as a string.
fn extract_pipeline_output(body: &serde_json::Value) -> String {
    if let Some(object) = body.as_object() {
        for field in ["output", "result", "response"] {
            if let Some(text) = object.get(field).and_then(|v| v.as_str()) {
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
        return body.to_string();
    }
    match body.as_str() {
        Some(text) => text.to_string(),
        None => body.to_string(),
    }
}

#[derive(Serialize)]
struct PipelineRequest<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    request: &'a str,
    #[serde(rename = "asyncOutput")]
    async_output: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_field_wins() {
        let body = json!({"output": "a tale", "result": "ignored"});
        assert_eq!(extract_pipeline_output(&body), "a tale");
    }

    #[test]
    fn falls_through_known_fields() {
        let body = json!({"response": "from response"});
        assert_eq!(extract_pipeline_output(&body), "from response");
    }

    #[test]
    fn unknown_shape_stringifies() {
        let body = json!({"weird": 1});
        assert_eq!(extract_pipeline_output(&body), r#"{"weird":1}"#);
        assert_eq!(extract_pipeline_output(&json!("plain")), "plain");
    }

    #[tokio::test]
    async fn unconfigured_client_reports_not_configured() {
        let client = AiriaClient::new(DEFAULT_AIRIA_PIPELINE_URL, None, "tester");
        let err = client.generate("prompt").await.expect_err("no key");
        assert!(matches!(err, NarrativeError::NotConfigured));
    }
}
