//! Best-effort extraction of structured story data from model output.
//!
//! The pipeline is asked for strict JSON but routinely wraps it in code
//! fences or surrounding prose. This is a pure function so the
//! heuristic stays independently testable.

/// Structured fields recovered from the model's free-form output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoryPayload {
    pub story: Option<String>,
    pub summary50: Option<String>,
    pub options: Vec<String>,
}

/// Try to extract a JSON story object from arbitrary text.
///
/// Strips a leading code fence, then parses the outermost `{`..`}`
/// slice, then the whole text. Returns `None` when no JSON object can
/// be decoded.
pub fn extract_story_payload(text: &str) -> Option<StoryPayload> {
    if text.is_empty() {
        return None;
    }
    let mut stripped = text.trim();

    let without_fence;
    if stripped.starts_with("```") {
        let mut lines: Vec<&str> = stripped.lines().collect();
        // Drop the opening fence line (``` or ```json).
        lines.remove(0);
        if lines
            .last()
            .is_some_and(|line| line.trim().starts_with("```"))
        {
            lines.pop();
        }
        without_fence = lines.join("\n");
        stripped = without_fence.trim();
    }

    if let (Some(start), Some(end)) = (stripped.find('{'), stripped.rfind('}')) {
        if end > start {
            if let Some(payload) = parse_object(&stripped[start..=end]) {
                return Some(payload);
            }
        }
    }

    parse_object(stripped)
}

fn parse_object(candidate: &str) -> Option<StoryPayload> {
    let value: serde_json::Value = serde_json::from_str(candidate).ok()?;
    let object = value.as_object()?;

    let field = |name: &str| {
        object
            .get(name)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };

    Some(StoryPayload {
        story: field("story"),
        summary50: field("summary50"),
        options: object
            .get("options")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default(),
    })
}
