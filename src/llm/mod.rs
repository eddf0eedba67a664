//! LLM 层：客户端抽象与实现（Ollama / OpenAI 兼容 / Mock）

pub mod mock;
pub mod ollama;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::AppConfig;

pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use ollama::{OllamaClient, DEFAULT_OLLAMA_URL};
pub use openai::OpenAiClient;
pub use traits::{LlmClient, LlmError, TokenStream};

/// 根据配置选择生成后端（Ollama / OpenAI 兼容 / Mock）；HTTP 客户端构建失败时返回错误
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    let provider = cfg.llm.provider.to_lowercase();
    let llm: Arc<dyn LlmClient> = match provider.as_str() {
        "ollama" => {
            let base = cfg.llm.base_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
            tracing::info!("Using Ollama LLM ({} @ {})", cfg.llm.model, base);
            Arc::new(OllamaClient::new(base, &cfg.llm.model, cfg.llm.timeouts.request)?)
        }
        "openai" if std::env::var("OPENAI_API_KEY").is_ok() => {
            tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                None,
            ))
        }
        "mock" => Arc::new(MockLlmClient),
        other => {
            tracing::warn!(provider = %other, "No API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    };
    Ok(llm)
}
