pub mod config;

pub use config::{RelayConfig, UpstreamProxyConfig};
