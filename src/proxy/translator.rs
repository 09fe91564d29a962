use serde_json::{Map, Value};
use std::sync::Arc;

use crate::proxy::common::RelayError;
use crate::proxy::history::HistoryStore;
use crate::proxy::mappers::gemini::{
    anonymous_request, conversation_request, extract_text, generation_config, Content,
    GenerateContentRequest,
};
use crate::proxy::token_manager::TokenManager;
use crate::proxy::upstream::UpstreamClient;

/// Turns an inbound prompt into a Vertex AI call and the reply into text.
pub struct QueryTranslator {
    upstream: Arc<UpstreamClient>,
    token_manager: Arc<TokenManager>,
    histories: Arc<HistoryStore>,
    temperature: f64,
}

impl QueryTranslator {
    pub fn new(
        upstream: Arc<UpstreamClient>,
        token_manager: Arc<TokenManager>,
        histories: Arc<HistoryStore>,
        temperature: f64,
    ) -> Self {
        Self {
            upstream,
            token_manager,
            histories,
            temperature,
        }
    }

    /// Runs one round trip.
    ///
    /// Without a user id the full prompt is sent as a single user turn and
    /// no history is touched. With one, the system prompt is sent as
    /// `system_instruction`, only the user request joins the history, and
    /// the history is stored again once the model has answered.
    pub async fn translate(
        &self,
        user_id: Option<&str>,
        contents: &str,
        parameters: Option<&Map<String, Value>>,
    ) -> Result<String, RelayError> {
        let config = generation_config(self.temperature, parameters);

        let Some(user_id) = user_id else {
            let request = anonymous_request(contents, config);
            return self.dispatch(&request).await;
        };

        let mut history = self.histories.lock(user_id).await;
        let request = conversation_request(contents, history.turns(), config);
        let result = self.dispatch(&request).await;

        if let Ok(response_text) = &result {
            let mut turns = request.contents;
            turns.push(Content::model(response_text.as_str()));
            history.replace(turns);
            tracing::debug!("History for user {} updated", user_id);
        }
        self.histories.release(user_id, history);

        result
    }

    async fn dispatch(&self, request: &GenerateContentRequest) -> Result<String, RelayError> {
        let access_token = self
            .token_manager
            .get_token()
            .await
            .ok_or_else(|| RelayError::Auth("Could not generate access token".to_string()))?;

        tracing::debug!(
            "Outbound payload: {}",
            serde_json::to_string(request).unwrap_or_default()
        );

        let raw = self.upstream.generate_content(&access_token, request).await?;
        extract_text(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::mappers::gemini::Role;
    use crate::proxy::tests::{test_config, vertex_reply, StaticTokenSource};
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn translator(server: &MockServer, token: Option<&str>) -> (QueryTranslator, Arc<HistoryStore>) {
        let config = test_config(&server.uri());
        let upstream = Arc::new(UpstreamClient::new(&config).unwrap());
        let tokens = Arc::new(TokenManager::new(Arc::new(StaticTokenSource::new(token))));
        let histories = Arc::new(HistoryStore::new(None));
        (
            QueryTranslator::new(upstream, tokens, histories.clone(), config.temperature),
            histories,
        )
    }

    #[tokio::test]
    async fn test_identified_scenario_history() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vertex_reply("stub response")))
            .mount(&server)
            .await;

        let (translator, histories) = translator(&server, Some("ya29.test"));
        let text = translator
            .translate(
                Some("u1"),
                "sys\n      User Request\n      ----------\n  find sales",
                None,
            )
            .await
            .unwrap();
        assert_eq!(text, "stub response");

        let history = histories.get("u1").await;
        assert_eq!(
            history,
            vec![Content::user("find sales"), Content::model("stub response")]
        );

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["system_instruction"]["parts"][0]["text"], "sys\n      ");
    }

    #[tokio::test]
    async fn test_anonymous_does_not_touch_history() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vertex_reply("ok")))
            .mount(&server)
            .await;

        let (translator, histories) = translator(&server, Some("ya29.test"));
        translator.translate(None, "just a prompt", None).await.unwrap();
        assert!(histories.is_empty());
    }

    #[tokio::test]
    async fn test_failed_round_trip_leaves_history_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
            .mount(&server)
            .await;

        let (translator, histories) = translator(&server, Some("ya29.test"));
        histories
            .put("u1", vec![Content::user("earlier"), Content::model("reply")])
            .await;

        let err = translator
            .translate(Some("u1"), "sys\nUser Request\n      ----------\nagain", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Upstream(_)));

        let history = histories.get("u1").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Model);
    }

    #[tokio::test]
    async fn test_failed_first_round_trip_creates_no_history() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
            .mount(&server)
            .await;

        let (translator, histories) = translator(&server, Some("ya29.test"));
        let result = translator
            .translate(Some("ghost"), "sys\nUser Request\n      ----------\nhi", None)
            .await;
        assert!(result.is_err());
        assert!(histories.is_empty());
        assert!(histories.get("ghost").await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vertex_reply("unused")))
            .expect(0)
            .mount(&server)
            .await;

        let (translator, _) = translator(&server, None);
        let err = translator
            .translate(None, "prompt", Some(json!({"topK": 3}).as_object().unwrap()))
            .await
            .unwrap_err();
        match err {
            RelayError::Auth(msg) => assert_eq!(msg, "Could not generate access token"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
