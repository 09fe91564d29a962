// 上游客户端实现
// Vertex AI generateContent 调用

use reqwest::{header, Client};
use tokio::time::Duration;

use crate::error::AppResult;
use crate::models::RelayConfig;
use crate::proxy::common::RelayError;
use crate::proxy::mappers::gemini::GenerateContentRequest;

const USER_AGENT: &str = concat!("explore-assistant-relay/", env!("CARGO_PKG_VERSION"));

pub struct UpstreamClient {
    http_client: Client,
    endpoint: String,
}

impl UpstreamClient {
    pub fn new(config: &RelayConfig) -> AppResult<Self> {
        let mut builder = Client::builder()
            // Connection settings (优化连接复用，减少建立开销)
            .connect_timeout(Duration::from_secs(20))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(config.request_timeout))
            .user_agent(USER_AGENT);

        let proxy_config = &config.upstream_proxy;
        if proxy_config.enabled && !proxy_config.url.is_empty() {
            match reqwest::Proxy::all(&proxy_config.url) {
                Ok(proxy) => {
                    builder = builder.proxy(proxy);
                    tracing::info!("UpstreamClient enabled proxy: {}", proxy_config.url);
                }
                Err(e) => {
                    tracing::error!("Invalid upstream proxy {}: {}", proxy_config.url, e);
                }
            }
        }

        Ok(Self {
            http_client: builder.build()?,
            endpoint: config.generate_content_url(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 调用 generateContent
    ///
    /// Returns the raw response body on 2xx. Any other status becomes an
    /// upstream error carrying the status and body; nothing is retried.
    pub async fn generate_content(
        &self,
        access_token: &str,
        body: &GenerateContentRequest,
    ) -> Result<String, RelayError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", access_token))
                .map_err(|e| RelayError::Internal(format!("Invalid access token: {}", e)))?,
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| RelayError::Internal(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RelayError::Internal(format!("Failed to read upstream body: {}", e)))?;

        if !status.is_success() {
            tracing::warn!("Vertex AI returned {} at {}", status, self.endpoint);
            return Err(RelayError::Upstream(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }

        tracing::debug!("Upstream request succeeded, status {}", status);
        Ok(text)
    }
}
