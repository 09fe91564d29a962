// proxy 模块 - Explore Assistant 中继服务

pub mod common;            // 公共错误类型
pub mod handlers;          // API 端点处理器
pub mod history;           // 按用户保存的对话历史
pub mod mappers;           // 协议转换器
pub mod middleware;        // Axum 中间件
pub mod server;
pub mod token_manager;
pub mod translator;
pub mod upstream;          // 上游客户端

pub use common::RelayError;
pub use history::HistoryStore;
pub use server::{build_router, AppState, AxumServer};
pub use token_manager::TokenManager;
pub use translator::QueryTranslator;

#[cfg(test)]
pub mod tests;
