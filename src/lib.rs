//! Jarvis - 对话助手核心
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 输入分类、回复生成、偏好抽取、批处理编排、流式分发
//! - **llm**: LLM 客户端抽象与实现（Ollama / OpenAI 兼容 / Mock）
//! - **memory**: 对话转录、偏好、搜索缓存与会话持久化
//! - **observability**: tracing 初始化
//! - **tools**: 网页检索（抽取规则、分页）与应用启动

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;

pub use crate::core::{Assistant, AssistantBuilder, AssistantError};
