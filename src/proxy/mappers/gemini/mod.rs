// Gemini mapper 模块
// 负责 generateContent 请求构建 / 响应解析

pub mod models;
pub mod request;
pub mod response;

pub use models::{Content, GenerateContentRequest, Role};
pub use request::{anonymous_request, conversation_request, generation_config, split_prompt};
pub use response::extract_text;
