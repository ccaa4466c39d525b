//! Stack-AI image generation client (scene illustration)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::infrastructure::ports::{IllustrationError, IllustrationPort};

/// Client for the Stack-AI image-generation flow.
///
/// Left unconfigured (no URL or key) the client is a no-op that yields
/// no image, so rounds still commit without illustrations.
#[derive(Clone)]
pub struct StackAiClient {
    client: Client,
    api_url: Option<String>,
    api_key: Option<String>,
}

impl StackAiClient {
    pub fn new(api_url: Option<String>, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_url: api_url.filter(|u| !u.is_empty()),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    /// Create client from `STACK_AI_API_URL` and `STACK_AI_API_KEY`.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("STACK_AI_API_URL").ok(),
            std::env::var("STACK_AI_API_KEY").ok(),
        )
    }
}

#[async_trait]
impl IllustrationPort for StackAiClient {
    async fn illustrate(
        &self,
        summary: &str,
        correlation_key: &str,
    ) -> Result<Option<String>, IllustrationError> {
        let (Some(api_url), Some(api_key)) = (&self.api_url, &self.api_key) else {
            tracing::debug!("Stack-AI URL or key not configured, skipping illustration");
            return Ok(None);
        };

        let payload = FlowRequest {
            user_id: correlation_key,
            prompt: summary,
        };

        let response = self
            .client
            .post(api_url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| IllustrationError::GenerationFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(IllustrationError::GenerationFailed(format!(
                "{status}: {error_text}"
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| IllustrationError::GenerationFailed(e.to_string()))?;

        Ok(extract_image_url(&body))
    }
}

#[derive(Serialize)]
struct FlowRequest<'a> {
    user_id: &'a str,
    #[serde(rename = "in-0")]
    prompt: &'a str,
}

/// Best-effort extraction of an image URL from the flow response.
///
/// The usual shape is `{"outputs": {"out-0": "{'image_url': '...'}"}}`
/// where `out-0` is a Python-repr string, but lists and flat fields
/// have been observed too.
fn extract_image_url(body: &serde_json::Value) -> Option<String> {
    if let Some(text) = body.as_str() {
        return text.starts_with("http").then(|| text.to_string());
    }
    let object = body.as_object()?;

    if let Some(outputs) = object.get("outputs") {
        if let Some(out0) = outputs.get("out-0") {
            if let Some(url) = url_from_output_value(out0) {
                return Some(url);
            }
        }
        if let Some(list) = outputs.as_array() {
            if let Some(first) = list.first() {
                if let Some(url) = url_from_output_value(first) {
                    return Some(url);
                }
            }
        }
    }

    for field in ["image_url", "url", "output", "result", "image"] {
        if let Some(url) = object.get(field).and_then(|v| v.as_str()) {
            if !url.is_empty() {
                return Some(url.to_string());
            }
        }
    }
    None
}

fn url_from_output_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) => {
            // The flow returns a Python dict repr; normalizing quotes is
            // usually enough to make it valid JSON.
            let normalized = text.replace('\'', "\"");
            if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&normalized) {
                if let Some(url) = parsed.get("image_url").and_then(|v| v.as_str()) {
                    return Some(url.to_string());
                }
            }
            text.starts_with("http").then(|| text.clone())
        }
        serde_json::Value::Object(map) => {
            for field in ["image_url", "url", "output", "value"] {
                if let Some(url) = map.get(field).and_then(|v| v.as_str()) {
                    return Some(url.to_string());
                }
            }
            None
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_url_from_python_repr_out0() {
        let body = json!({
            "outputs": {"out-0": "{'image_url': 'https://img.example/scene.png'}"}
        });
        assert_eq!(
            extract_image_url(&body).as_deref(),
            Some("https://img.example/scene.png")
        );
    }

    #[test]
    fn extracts_url_from_object_out0() {
        let body = json!({"outputs": {"out-0": {"image_url": "https://img.example/a.png"}}});
        assert_eq!(
            extract_image_url(&body).as_deref(),
            Some("https://img.example/a.png")
        );
    }

    #[test]
    fn extracts_bare_url_out0() {
        let body = json!({"outputs": {"out-0": "https://img.example/b.png"}});
        assert_eq!(
            extract_image_url(&body).as_deref(),
            Some("https://img.example/b.png")
        );
    }

    #[test]
    fn falls_back_to_direct_fields() {
        let body = json!({"url": "https://img.example/c.png"});
        assert_eq!(
            extract_image_url(&body).as_deref(),
            Some("https://img.example/c.png")
        );
    }

    #[test]
    fn unusable_response_yields_none() {
        assert_eq!(extract_image_url(&json!({"outputs": {}})), None);
        assert_eq!(extract_image_url(&json!("not a url")), None);
        assert_eq!(extract_image_url(&json!(42)), None);
    }

    #[tokio::test]
    async fn unconfigured_client_yields_no_image() {
        let client = StackAiClient::new(None, None);
        let result = client
            .illustrate("a misty forest", "LOBBY123")
            .await
            .expect("no-op");
        assert_eq!(result, None);
    }
}
