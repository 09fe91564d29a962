// 请求构建: prompt 拆分 + generation_config 合并
use serde_json::{json, Map, Value};

use super::models::{Content, GenerateContentRequest, Part, SystemInstruction};

/// Separates the system instructions from the user's question in the
/// prompt the extension sends.
pub const USER_REQUEST_MARKER: &str = "User Request\n      ----------\n";

pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1200;
pub const DEFAULT_TOP_P: f64 = 0.8;
pub const DEFAULT_TOP_K: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptParts<'a> {
    pub system_prompt: &'a str,
    pub user_request: &'a str,
}

/// Splits a prompt on [`USER_REQUEST_MARKER`].
///
/// Everything before the first marker is the system prompt. The segment
/// after it, up to a further marker if one exists, is the user request with
/// surrounding whitespace trimmed. Without a marker the user request is empty.
pub fn split_prompt(contents: &str) -> PromptParts<'_> {
    let mut segments = contents.split(USER_REQUEST_MARKER);
    let system_prompt = segments.next().unwrap_or_default();
    let user_request = segments.next().map(str::trim).unwrap_or_default();
    PromptParts {
        system_prompt,
        user_request,
    }
}

/// Default generation config with the caller's overrides merged on top.
///
/// Caller keys win; unknown keys are passed through untouched.
pub fn generation_config(temperature: f64, overrides: Option<&Map<String, Value>>) -> Map<String, Value> {
    let mut config = Map::new();
    config.insert("temperature".to_string(), json!(temperature));
    config.insert("maxOutputTokens".to_string(), json!(DEFAULT_MAX_OUTPUT_TOKENS));
    config.insert("topP".to_string(), json!(DEFAULT_TOP_P));
    config.insert("topK".to_string(), json!(DEFAULT_TOP_K));

    if let Some(overrides) = overrides {
        for (key, value) in overrides {
            config.insert(key.clone(), value.clone());
        }
    }
    config
}

/// Stateless request: the whole original prompt as a single user turn.
pub fn anonymous_request(contents: &str, generation_config: Map<String, Value>) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content::user(contents)],
        generation_config,
        system_instruction: None,
    }
}

/// Conversational request: the system prompt goes into `system_instruction`
/// and only the user request is appended to the prior turns.
pub fn conversation_request(
    contents: &str,
    history: &[Content],
    generation_config: Map<String, Value>,
) -> GenerateContentRequest {
    let parts = split_prompt(contents);

    let mut turns = Vec::with_capacity(history.len() + 1);
    turns.extend_from_slice(history);
    turns.push(Content::user(parts.user_request));

    GenerateContentRequest {
        contents: turns,
        generation_config,
        system_instruction: Some(SystemInstruction {
            parts: vec![Part {
                text: parts.system_prompt.to_string(),
            }],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::mappers::gemini::models::Role;

    #[test]
    fn test_split_with_marker() {
        let prompt = "sys\n      User Request\n      ----------\n  find sales";
        let parts = split_prompt(prompt);
        assert_eq!(parts.system_prompt, "sys\n      ");
        assert_eq!(parts.user_request, "find sales");
    }

    #[test]
    fn test_split_without_marker() {
        let prompt = "Generate an explore URL for total revenue";
        let parts = split_prompt(prompt);
        assert_eq!(parts.system_prompt, prompt);
        assert_eq!(parts.user_request, "");
    }

    #[test]
    fn test_split_marker_at_start() {
        let prompt = format!("{}  top 10 customers \n", USER_REQUEST_MARKER);
        let parts = split_prompt(&prompt);
        assert_eq!(parts.system_prompt, "");
        assert_eq!(parts.user_request, "top 10 customers");
    }

    #[test]
    fn test_split_repeated_marker() {
        let prompt = format!("ctx\n{m}first\n{m}second", m = USER_REQUEST_MARKER);
        let parts = split_prompt(&prompt);
        assert_eq!(parts.system_prompt, "ctx\n");
        assert_eq!(parts.user_request, "first");
    }

    #[test]
    fn test_generation_config_defaults() {
        let config = generation_config(0.2, None);
        assert_eq!(config["temperature"], json!(0.2));
        assert_eq!(config["maxOutputTokens"], json!(1200));
        assert_eq!(config["topP"], json!(0.8));
        assert_eq!(config["topK"], json!(1));
        assert_eq!(config.len(), 4);
    }

    #[test]
    fn test_generation_config_overrides() {
        let overrides = json!({"temperature": 0.9, "candidateCount": 2});
        let config = generation_config(0.2, overrides.as_object());
        assert_eq!(config["temperature"], json!(0.9));
        assert_eq!(config["candidateCount"], json!(2));
        assert_eq!(config["maxOutputTokens"], json!(1200));
        assert_eq!(config["topP"], json!(0.8));
        assert_eq!(config["topK"], json!(1));
    }

    #[test]
    fn test_anonymous_request_keeps_full_prompt() {
        let prompt = "sys\n      User Request\n      ----------\n  find sales";
        let request = anonymous_request(prompt, generation_config(0.2, None));
        assert_eq!(request.contents, vec![Content::user(prompt)]);
        assert!(request.system_instruction.is_none());

        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("system_instruction").is_none());
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], prompt);
        assert_eq!(body["generation_config"]["topK"], 1);
    }

    #[test]
    fn test_conversation_request_appends_user_turn() {
        let history = vec![Content::user("find sales"), Content::model("/explore/sales")];
        let prompt = format!("sys\n{}by region", USER_REQUEST_MARKER);
        let request = conversation_request(&prompt, &history, generation_config(0.2, None));

        assert_eq!(request.contents.len(), 3);
        assert_eq!(request.contents[0], history[0]);
        assert_eq!(request.contents[1].role, Role::Model);
        assert_eq!(request.contents[2], Content::user("by region"));

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["system_instruction"]["parts"][0]["text"], "sys\n");
        assert_eq!(body["contents"][1]["role"], "model");
    }
}
