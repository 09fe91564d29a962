use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{AppError, AppResult};
use crate::models::{RelayConfig, UpstreamProxyConfig};

/// 加载中继配置
///
/// Reads an optional `.env` file first, then the process environment.
pub fn load_relay_config() -> AppResult<RelayConfig> {
    if let Ok(path) = dotenv::dotenv() {
        tracing::debug!("Loaded environment overrides from {:?}", path);
    }
    relay_config_from_lookup(|key| std::env::var(key).ok())
}

/// Builds the configuration from an arbitrary variable lookup.
pub fn relay_config_from_lookup<F>(lookup: F) -> AppResult<RelayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    // Empty values are treated the same as unset ones.
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let defaults = RelayConfig::default();

    let project = get("PROJECT")
        .ok_or_else(|| AppError::Config("PROJECT environment variable is required".to_string()))?;

    let upstream_proxy = match get("UPSTREAM_PROXY_URL") {
        Some(url) => UpstreamProxyConfig { enabled: true, url },
        None => UpstreamProxyConfig::default(),
    };

    Ok(RelayConfig {
        project,
        region: get("REGION").unwrap_or(defaults.region),
        model_name: get("MODEL_NAME").unwrap_or(defaults.model_name),
        temperature: parse_var(&get, "TEMPERATURE")?.unwrap_or(defaults.temperature),
        host: get("HOST").unwrap_or(defaults.host),
        port: parse_var(&get, "PORT")?.unwrap_or(defaults.port),
        request_timeout: parse_var(&get, "REQUEST_TIMEOUT")?.unwrap_or(defaults.request_timeout),
        vertex_base_url: get("VERTEX_BASE_URL").unwrap_or(defaults.vertex_base_url),
        upstream_proxy,
        history_max_turns: parse_var(&get, "HISTORY_MAX_TURNS")?,
        log_dir: get("LOG_DIR").map(PathBuf::from),
        log_json: parse_var(&get, "LOG_JSON")?.unwrap_or(false),
    })
}

fn parse_var<T, G>(get: &G, key: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::Config(format!("invalid {} value {:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}
