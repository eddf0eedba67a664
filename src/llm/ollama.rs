//! Ollama 客户端（本地模型，默认后端）
//!
//! POST {base_url}/api/chat；流式模式下 Ollama 返回 NDJSON，每行一个片段，`done: true` 为最后一行。

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm::{LlmClient, LlmError, TokenStream};
use crate::memory::Message;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

pub struct OllamaClient {
    base_url: String,
    model: String,
    client: Client,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(LlmError::from_reqwest)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        })
    }

    fn to_ollama_messages(messages: &[Message]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .map(|m| OllamaMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    async fn send(&self, messages: &[Message], stream: bool) -> Result<reqwest::Response, LlmError> {
        let request = OllamaRequest {
            model: &self.model,
            messages: Self::to_ollama_messages(messages),
            stream,
        };
        tracing::debug!(model = %self.model, messages = messages.len(), stream, "ollama request");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Http { status, body });
        }
        Ok(response)
    }
}

fn parse_line(line: &[u8]) -> Result<OllamaChunk, LlmError> {
    serde_json::from_slice(line).map_err(|e| LlmError::Parse(e.to_string()))
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let response = self.send(messages, false).await?;
        let chunk: OllamaChunk = response.json().await.map_err(LlmError::from_reqwest)?;
        Ok(chunk.message.content)
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        let response = self.send(messages, true).await?;
        let bytes = Box::pin(response.bytes_stream());

        // 状态：(字节流, 未成行的缓冲, 是否结束)
        let fragments = stream::unfold((bytes, Vec::<u8>::new(), false), |(mut bytes, mut buf, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    if line.iter().all(|b| b.is_ascii_whitespace()) {
                        continue;
                    }
                    return Some(match parse_line(&line) {
                        Ok(chunk) => (Ok(chunk.message.content), (bytes, buf, chunk.done)),
                        Err(e) => (Err(e), (bytes, buf, true)),
                    });
                }
                match bytes.next().await {
                    Some(Ok(b)) => buf.extend_from_slice(&b),
                    Some(Err(e)) => return Some((Err(LlmError::from_reqwest(e)), (bytes, buf, true))),
                    None => {
                        if buf.iter().all(|b| b.is_ascii_whitespace()) {
                            return None;
                        }
                        let line = std::mem::take(&mut buf);
                        return Some(match parse_line(&line) {
                            Ok(chunk) => (Ok(chunk.message.content), (bytes, buf, true)),
                            Err(e) => (Err(e), (bytes, buf, true)),
                        });
                    }
                }
            }
        });
        Ok(Box::pin(fragments))
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
}
