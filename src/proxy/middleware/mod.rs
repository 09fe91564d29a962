// Middleware 模块 - Axum 中间件

pub mod cors;

pub use cors::{cors_layer, options_no_content};
