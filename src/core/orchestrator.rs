//! 编排器：会话上下文 Assistant 与批处理主流程
//!
//! 一个进程持有一个 Assistant（转录、偏好、搜索缓存与各协作方），所有操作都显式经过它。
//! 每条输入依次：分类 → 检索 / 打开应用 / 生成（+偏好抽取）→ 追加 (输入, 回复) → 持久化，
//! 完成后才处理下一条；任何错误都降级为该位置上的一条提示，批内顺序与条数不变。

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::core::action::{open_app_prompt, parse_action, AppAction};
use crate::core::{AssistantError, Category, Classifier, PreferenceExtractor, ResponseGenerator};
use crate::memory::{
    Message, PreferenceSet, SearchCache, SessionRecord, SessionStore, StoreError, Transcript,
};
use crate::tools::{AppLauncher, WebRetriever};

/// 构建 Assistant 所需的协作方（由 AssistantBuilder 组装）
pub struct Collaborators {
    pub classifier: Classifier,
    pub generator: ResponseGenerator,
    pub retriever: WebRetriever,
    pub launcher: Arc<dyn AppLauncher>,
    pub store: Arc<dyn SessionStore>,
    pub session_key: String,
}

/// 会话上下文
pub struct Assistant {
    classifier: Classifier,
    generator: ResponseGenerator,
    retriever: WebRetriever,
    launcher: Arc<dyn AppLauncher>,
    store: Arc<dyn SessionStore>,
    session_key: String,
    transcript: Transcript,
    preferences: PreferenceSet,
    search_cache: SearchCache,
}

impl Assistant {
    /// 用已加载的记录（可能不存在）恢复会话；转录首条总是当前 system prompt
    pub fn restore(
        parts: Collaborators,
        system_prompt: &str,
        max_turns: usize,
        record: Option<SessionRecord>,
    ) -> Self {
        let (transcript, preferences, search_cache) = match record {
            Some(record) => {
                tracing::info!(
                    turns = record.transcript.len(),
                    preferences = record.preferences.len(),
                    cached_queries = record.search_cache.len(),
                    "session restored"
                );
                (
                    Transcript::restore(system_prompt, max_turns, record.transcript),
                    record.preferences,
                    SearchCache::from_entries(record.search_cache),
                )
            }
            None => {
                tracing::info!("no stored session, starting fresh");
                (
                    Transcript::new(system_prompt, max_turns),
                    PreferenceSet::new(),
                    SearchCache::new(),
                )
            }
        };

        Self {
            classifier: parts.classifier,
            generator: parts.generator,
            retriever: parts.retriever,
            launcher: parts.launcher,
            store: parts.store,
            session_key: parts.session_key,
            transcript,
            preferences,
            search_cache,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn preferences(&self) -> &PreferenceSet {
        &self.preferences
    }

    pub fn search_cache(&self) -> &SearchCache {
        &self.search_cache
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    /// 当前状态的快照
    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            id: self.session_key.clone(),
            transcript: self.transcript.messages().to_vec(),
            preferences: self.preferences.clone(),
            search_cache: self.search_cache.entries().clone(),
            updated_at: None,
        }
    }

    /// 按顺序处理一批输入，每条输入对应一条回复
    pub async fn process_batch(&mut self, utterances: Vec<String>) -> Vec<String> {
        let batch_id = Uuid::new_v4();
        let span = tracing::info_span!("batch", %batch_id, size = utterances.len());

        async {
            let mut responses = Vec::with_capacity(utterances.len());
            for utterance in &utterances {
                responses.push(self.process_one(utterance).await);
            }
            tracing::info!(responses = responses.len(), "batch done");
            responses
        }
        .instrument(span)
        .await
    }

    async fn process_one(&mut self, utterance: &str) -> String {
        let category = self.classifier.classify(utterance);
        tracing::info!(?category, "utterance classified");

        let response = match category {
            Category::Search => {
                self.retriever
                    .retrieve(&mut self.search_cache, utterance)
                    .await
                    .message
            }
            Category::OpenApp => self.open_app(utterance).await,
            Category::Preference => self.answer_and_learn(utterance).await,
            Category::Normal => self.answer(utterance).await,
        };

        self.transcript.push(Message::user(utterance));
        self.transcript.push(Message::assistant(response.clone()));

        match self.persist().await {
            Ok(()) => response,
            Err(e) => {
                let warning = e.user_message();
                if response.is_empty() {
                    warning
                } else {
                    format!("{}\n{}", response, warning)
                }
            }
        }
    }

    async fn answer(&mut self, utterance: &str) -> String {
        match self.generator.generate(&mut self.transcript, utterance).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "generation degraded to error message");
                e.user_message()
            }
        }
    }

    /// 先回答，再从这一轮中抽取偏好；新偏好随本条输入一起持久化
    async fn answer_and_learn(&mut self, utterance: &str) -> String {
        let response = match self.generator.generate(&mut self.transcript, utterance).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "generation degraded to error message");
                return e.user_message();
            }
        };

        let extractor = PreferenceExtractor::new(&self.generator);
        if let Err(e) = extractor
            .extract(&mut self.transcript, &mut self.preferences, utterance, &response)
            .await
        {
            tracing::warn!(error = %e, "preference extraction skipped");
        }
        response
    }

    async fn open_app(&mut self, utterance: &str) -> String {
        let raw = match self
            .generator
            .generate(&mut self.transcript, &open_app_prompt(utterance))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "generation degraded to error message");
                return e.user_message();
            }
        };

        match parse_action(&raw) {
            Ok(AppAction::Open(app)) => match self.launcher.launch(&app) {
                Ok(()) => format!("Aplicativo {} aberto com sucesso.", app),
                Err(e) => {
                    tracing::warn!(app = %app, error = %e, "application launch failed");
                    format!("Não foi possível abrir o aplicativo {}.", app)
                }
            },
            Ok(AppAction::Nothing) => {
                tracing::info!("no application to open");
                String::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "action response ignored");
                e.user_message()
            }
        }
    }

    /// 写入整条 SessionRecord，失败时重试一次
    pub async fn persist(&self) -> Result<(), AssistantError> {
        let record = self.record();
        let first = match self.store.upsert(&self.session_key, &record).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        tracing::warn!(error = %first, "session save failed, retrying once");

        self.store
            .upsert(&self.session_key, &record)
            .await
            .map_err(|e: StoreError| {
                tracing::error!(error = %e, "session save failed after retry");
                AssistantError::PersistenceFailed(e)
            })
    }
}
