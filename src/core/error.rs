//! 编排层错误类型
//!
//! 核心内任何错误都不终止进程：每种错误都能转成一条固定的 pt-BR 提示，
//! 由编排器放到该条输入在回复列表中的位置上。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::StoreError;
use crate::tools::RetrievalError;

#[derive(Error, Debug)]
pub enum AssistantError {
    /// 搜索的网络或解析失败（本地恢复，回复一条提示）
    #[error("Retrieval failed: {0}")]
    RetrievalFailed(#[from] RetrievalError),

    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Generation timed out after {0}s")]
    GenerationTimeout(u64),

    /// 存储写入失败（已重试一次）
    #[error("Persistence failed: {0}")]
    PersistenceFailed(#[from] StoreError),

    /// 打开应用路径收到无法解析的动作描述（记录日志，按无操作处理）
    #[error("Malformed action response: {0}")]
    MalformedActionResponse(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<LlmError> for AssistantError {
    fn from(e: LlmError) -> Self {
        AssistantError::GenerationUnavailable(e.to_string())
    }
}

impl AssistantError {
    /// 面向用户的固定提示
    pub fn user_message(&self) -> String {
        match self {
            AssistantError::RetrievalFailed(e) => e.user_message().to_string(),
            AssistantError::GenerationUnavailable(_) => {
                "Desculpe, o serviço de geração de respostas está indisponível no momento.".to_string()
            }
            AssistantError::GenerationTimeout(_) => {
                "Desculpe, o serviço de geração de respostas demorou demais para responder.".to_string()
            }
            AssistantError::PersistenceFailed(_) => {
                "Aviso: não foi possível salvar a memória da conversa.".to_string()
            }
            AssistantError::MalformedActionResponse(_) => String::new(),
            AssistantError::Config(e) => format!("Erro de configuração: {}", e),
        }
    }
}
