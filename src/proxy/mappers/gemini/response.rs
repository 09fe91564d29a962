// 响应解析
use super::models::GenerateContentResponse;
use crate::proxy::common::RelayError;

/// Returns the text of the first part of the first candidate.
///
/// Anything else (unparseable JSON, no candidates, empty parts, a part
/// without text) is reported with the raw upstream body attached.
pub fn extract_text(raw_body: &str) -> Result<String, RelayError> {
    let invalid = || RelayError::Upstream(format!("Invalid response from Vertex AI: {}", raw_body));

    let response: GenerateContentResponse = serde_json::from_str(raw_body).map_err(|e| {
        tracing::debug!("Vertex AI response is not valid JSON: {}", e);
        invalid()
    })?;

    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .ok_or_else(invalid)
}
