//! 回复生成：包装生成服务
//!
//! 以「完整转录 + 新的 user 消息」为上下文调用模型，把增量片段累积成整段文本，
//! 成功后依次追加 user 与 assistant 消息并返回。调用返回后转录已被修改。整个调用有超时上限。

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;

use crate::core::AssistantError;
use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Transcript};

pub struct ResponseGenerator {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    /// 成功后才写入转录；失败时转录保持调用前的样子
    pub async fn generate(
        &self,
        transcript: &mut Transcript,
        prompt: &str,
    ) -> Result<String, AssistantError> {
        let mut context = transcript.messages().to_vec();
        context.push(Message::user(prompt));

        let text = match tokio::time::timeout(self.timeout, self.collect(&context)).await {
            Ok(Ok(text)) => text,
            Ok(Err(LlmError::Timeout)) | Err(_) => {
                tracing::warn!(llm = %self.llm.name(), timeout_secs = self.timeout.as_secs(), "generation timed out");
                return Err(AssistantError::GenerationTimeout(self.timeout.as_secs()));
            }
            Ok(Err(e)) => {
                tracing::warn!(llm = %self.llm.name(), error = %e, "generation failed");
                return Err(e.into());
            }
        };

        transcript.push(Message::user(prompt));
        transcript.push(Message::assistant(text.clone()));
        Ok(text)
    }

    async fn collect(&self, messages: &[Message]) -> Result<String, LlmError> {
        let mut stream = self.llm.complete_stream(messages).await?;
        let mut full_text = String::new();
        while let Some(fragment) = stream.next().await {
            full_text.push_str(&fragment?);
        }
        Ok(full_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::Role;

    #[tokio::test]
    async fn test_generate_appends_user_and_assistant() {
        let llm = Arc::new(ScriptedLlmClient::new(["Paris é a capital."]));
        let generator = ResponseGenerator::new(llm.clone(), Duration::from_secs(5));
        let mut transcript = Transcript::new("sys", 100);

        let out = generator
            .generate(&mut transcript, "Qual a capital da França?")
            .await
            .unwrap();

        assert_eq!(out, "Paris é a capital.");
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.messages()[1], Message::user("Qual a capital da França?"));
        assert_eq!(transcript.messages()[2], Message::assistant("Paris é a capital."));

        // 模型收到的上下文以 system 开头、以新 user 消息结尾
        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].first().map(|m| m.role), Some(Role::System));
        assert_eq!(calls[0].last(), Some(&Message::user("Qual a capital da França?")));
    }

    #[tokio::test]
    async fn test_failure_rolls_back_user_turn() {
        let llm = Arc::new(ScriptedLlmClient::with_results([Err(LlmError::Unavailable(
            "connection refused".to_string(),
        ))]));
        let generator = ResponseGenerator::new(llm, Duration::from_secs(5));
        let mut transcript = Transcript::new("sys", 100);

        let err = generator.generate(&mut transcript, "oi").await.unwrap_err();
        assert!(matches!(err, AssistantError::GenerationUnavailable(_)));
        assert_eq!(transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_typed() {
        let llm = Arc::new(ScriptedLlmClient::new(["tarde demais"]).with_delay(Duration::from_millis(200)));
        let generator = ResponseGenerator::new(llm, Duration::from_millis(20));
        let mut transcript = Transcript::new("sys", 100);

        let err = generator.generate(&mut transcript, "oi").await.unwrap_err();
        assert!(matches!(err, AssistantError::GenerationTimeout(_)));
        assert_eq!(transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_at_cap_keeps_older_turns() {
        let llm = Arc::new(ScriptedLlmClient::with_results([Err(LlmError::Unavailable(
            "connection refused".to_string(),
        ))]));
        let generator = ResponseGenerator::new(llm, Duration::from_secs(5));
        let mut transcript = Transcript::new("sys", 3);
        transcript.push(Message::user("u1"));
        transcript.push(Message::assistant("a1"));
        let before = transcript.messages().to_vec();

        assert!(generator.generate(&mut transcript, "u2").await.is_err());
        assert_eq!(transcript.messages(), before.as_slice());
    }

    #[tokio::test]
    async fn test_success_at_cap_evicts_oldest_pair() {
        let llm = Arc::new(ScriptedLlmClient::new(["a2"]));
        let generator = ResponseGenerator::new(llm.clone(), Duration::from_secs(5));
        let mut transcript = Transcript::new("sys", 3);
        transcript.push(Message::user("u1"));
        transcript.push(Message::assistant("a1"));

        generator.generate(&mut transcript, "u2").await.unwrap();

        assert_eq!(
            transcript.messages(),
            &[Message::system("sys"), Message::user("u2"), Message::assistant("a2")]
        );
        // 模型仍然看到完整的历史
        assert_eq!(llm.calls()[0].len(), 4);
    }
}
