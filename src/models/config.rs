use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 中继服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// GCP project hosting the Vertex AI endpoint
    pub project: String,

    /// Vertex AI location, e.g. `us-central1`
    #[serde(default = "default_region")]
    pub region: String,

    /// Publisher model id, e.g. `gemini-1.0-pro-001`
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// 默认生成温度 (可被请求中的 parameters 覆盖)
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// 上游请求超时时间(秒)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Vertex AI API host. Overridable so the relay can target a regional
    /// host or a local stub.
    #[serde(default = "default_vertex_base_url")]
    pub vertex_base_url: String,

    /// 上游代理配置
    #[serde(default)]
    pub upstream_proxy: UpstreamProxyConfig,

    /// Per-user history cap in turns. `None` keeps every turn for the
    /// lifetime of the process.
    #[serde(default)]
    pub history_max_turns: Option<usize>,

    /// Directory for daily rolling log files. Console only when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Emit console logs as JSON lines instead of the human format.
    #[serde(default)]
    pub log_json: bool,
}

/// 上游代理配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpstreamProxyConfig {
    /// 是否启用
    pub enabled: bool,
    /// 代理地址 (http://, https://, socks5://)
    pub url: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            region: default_region(),
            model_name: default_model_name(),
            temperature: default_temperature(),
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            vertex_base_url: default_vertex_base_url(),
            upstream_proxy: UpstreamProxyConfig::default(),
            history_max_turns: None,
            log_dir: None,
            log_json: false,
        }
    }
}

pub(crate) fn default_region() -> String {
    "us-central1".to_string()
}

pub(crate) fn default_model_name() -> String {
    "gemini-1.0-pro-001".to_string()
}

pub(crate) fn default_temperature() -> f64 {
    0.2
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8080
}

pub(crate) fn default_request_timeout() -> u64 {
    60
}

pub(crate) fn default_vertex_base_url() -> String {
    "https://aiplatform.googleapis.com".to_string()
}

impl RelayConfig {
    /// 获取实际的监听地址
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full `generateContent` URL for the configured project, region and model.
    pub fn generate_content_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.vertex_base_url.trim_end_matches('/'),
            self.project,
            self.region,
            self.model_name
        )
    }
}
