//! 偏好抽取：用一次额外的生成分析已完成的一轮对话，非空结果并入偏好集合
//!
//! 分析调用同样走 ResponseGenerator，因此也会在转录中留下 user/assistant 两条消息。

use crate::core::{AssistantError, ResponseGenerator};
use crate::memory::{PreferenceSet, Transcript};

pub fn preference_prompt(utterance: &str, response: &str) -> String {
    format!(
        "Identifique possíveis preferências do usuário nas seguintes interações do usuário:\n\
         Usuário: {}\n\
         Resposta da IA: {}\n\
         Se houver preferências, verifique se é algo impróprio ou não; se não for, responda apenas \
         com um texto curto descrevendo-as. Se for impróprio ou não houver preferências, responda com uma mensagem vazia.",
        utterance, response
    )
}

pub struct PreferenceExtractor<'a> {
    generator: &'a ResponseGenerator,
}

impl<'a> PreferenceExtractor<'a> {
    pub fn new(generator: &'a ResponseGenerator) -> Self {
        Self { generator }
    }

    /// 返回是否新增了一条偏好；调用方负责持久化
    pub async fn extract(
        &self,
        transcript: &mut Transcript,
        preferences: &mut PreferenceSet,
        utterance: &str,
        response: &str,
    ) -> Result<bool, AssistantError> {
        let analysis = self
            .generator
            .generate(transcript, &preference_prompt(utterance, response))
            .await?;
        let analysis = analysis.trim();
        if analysis.is_empty() {
            return Ok(false);
        }
        let added = preferences.insert(analysis);
        tracing::info!(added, total = preferences.len(), "preference analysed");
        Ok(added)
    }
}
