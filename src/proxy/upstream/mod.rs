// Upstream 模块 - 上游客户端

pub mod client;

pub use client::UpstreamClient;
