// Mappers 模块 - 协议转换器

pub mod gemini;
