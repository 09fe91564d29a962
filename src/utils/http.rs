use reqwest::{Client, Proxy};

use crate::models::UpstreamProxyConfig;

/// 创建带指定代理配置的 HTTP 客户端
pub fn create_client_with_proxy(
    timeout_secs: u64,
    proxy_config: Option<&UpstreamProxyConfig>,
) -> Client {
    let mut builder = Client::builder().timeout(std::time::Duration::from_secs(timeout_secs));

    if let Some(config) = proxy_config {
        if config.enabled && !config.url.is_empty() {
            match Proxy::all(&config.url) {
                Ok(proxy) => {
                    builder = builder.proxy(proxy);
                    tracing::info!("HTTP client using upstream proxy: {}", config.url);
                }
                Err(e) => {
                    tracing::error!("Invalid upstream proxy {}: {}", config.url, e);
                }
            }
        }
    }

    builder.build().unwrap_or_else(|_| Client::new())
}
