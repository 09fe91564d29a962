// 测试公共工具
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{AppError, AppResult};
use crate::models::RelayConfig;
use crate::modules::oauth::{AccessToken, TokenSource};


/// Config pointing the relay at a local Vertex AI stub.
pub(crate) fn test_config(base_url: &str) -> RelayConfig {
    RelayConfig {
        project: "demo".to_string(),
        region: "us-central1".to_string(),
        model_name: "gemini-1.0-pro-001".to_string(),
        vertex_base_url: base_url.to_string(),
        request_timeout: 5,
        ..RelayConfig::default()
    }
}

/// Minimal successful `generateContent` body.
pub(crate) fn vertex_reply(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{"text": text}]
            }
        }]
    })
}

/// Hands out a fixed token, or fails every time when built with `None`.
pub(crate) struct StaticTokenSource {
    token: Option<String>,
    calls: AtomicUsize,
}

impl StaticTokenSource {
    pub(crate) fn new(token: Option<&str>) -> Self {
        Self {
            token: token.map(str::to_string),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch_token(&self) -> AppResult<AccessToken> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.token {
            Some(token) => Ok(AccessToken {
                token: token.clone(),
                expires_in: 3600,
            }),
            None => Err(AppError::OAuth("no credentials available".to_string())),
        }
    }
}
