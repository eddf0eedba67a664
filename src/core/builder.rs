//! Assistant 构建器：统一的初始化逻辑
//!
//! 控制台与 HTTP 两种接入共用同一套组装：按配置选择 LLM 后端、存储后端、抽取规则，
//! 加载已保存的会话记录后得到 Assistant。测试可替换任一协作方。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::{Assistant, AssistantError, Classifier, Collaborators, ResponseGenerator};
use crate::llm::{create_llm_from_config, LlmClient};
use crate::memory::{JsonFileSessionStore, MemorySessionStore, SessionStore, SqliteSessionStore};
use crate::tools::{AppLauncher, HttpPageFetcher, PageFetcher, RuleSet, SystemLauncher, WebRetriever};

pub struct AssistantBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    fetcher: Option<Arc<dyn PageFetcher>>,
    launcher: Option<Arc<dyn AppLauncher>>,
    store: Option<Arc<dyn SessionStore>>,
}

impl AssistantBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            fetcher: None,
            launcher: None,
            store: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn AppLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 按 [storage] backend 打开存储：sqlite / json / memory
    pub fn build_store(&self) -> Result<Arc<dyn SessionStore>, AssistantError> {
        let storage = &self.config.storage;
        let store: Arc<dyn SessionStore> = match storage.backend.to_lowercase().as_str() {
            "sqlite" => Arc::new(SqliteSessionStore::open(&storage.path)?),
            "json" => Arc::new(JsonFileSessionStore::new(&storage.path)),
            "memory" => Arc::new(MemorySessionStore::new()),
            other => {
                return Err(AssistantError::Config(format!(
                    "unknown storage backend {:?}",
                    other
                )))
            }
        };
        tracing::info!(backend = %storage.backend, path = %storage.path.display(), "session store opened");
        Ok(store)
    }

    /// 内置规则，或 [search] rules_path 指向的 TOML 文件
    pub fn build_rules(&self) -> Result<RuleSet, AssistantError> {
        match &self.config.search.rules_path {
            Some(path) => RuleSet::load(path).map_err(|e| {
                AssistantError::Config(format!("rules {}: {}", path.display(), e))
            }),
            None => Ok(RuleSet::default()),
        }
    }

    pub async fn build(self) -> Result<Assistant, AssistantError> {
        let store = match &self.store {
            Some(store) => store.clone(),
            None => self.build_store()?,
        };
        let rules = self.build_rules()?;

        let cfg = &self.config;
        let llm = match &self.llm {
            Some(llm) => llm.clone(),
            None => create_llm_from_config(cfg)
                .map_err(|e| AssistantError::Config(format!("llm client: {}", e)))?,
        };
        let fetcher: Arc<dyn PageFetcher> = match &self.fetcher {
            Some(fetcher) => fetcher.clone(),
            None => Arc::new(
                HttpPageFetcher::new(cfg.search.user_agents.clone(), cfg.search.timeout_secs)
                    .map_err(|e| AssistantError::Config(format!("search client: {}", e)))?,
            ),
        };
        let launcher = self
            .launcher
            .clone()
            .unwrap_or_else(|| Arc::new(SystemLauncher));

        let classifier = Classifier::from_config(&cfg.classifier);
        let retriever = WebRetriever::new(fetcher, &cfg.search, &rules, classifier.search_triggers())
            .map_err(|e| AssistantError::Config(e.to_string()))?;
        let generator = ResponseGenerator::new(llm, Duration::from_secs(cfg.llm.timeouts.request));

        let session_key = cfg.storage.session_key.clone();
        let record = store.load(&session_key).await?;

        let first_load = record.is_none();

        let assistant = Assistant::restore(
            Collaborators {
                classifier,
                generator,
                retriever,
                launcher,
                store,
                session_key,
            },
            &cfg.app.system_prompt,
            cfg.app.max_transcript_turns,
            record,
        );
        // 首次加载即创建记录
        if first_load {
            assistant.persist().await?;
        }
        Ok(assistant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::{Message, SessionRecord};

    fn config(backend: &str) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.storage.backend = backend.to_string();
        cfg
    }

    #[tokio::test]
    async fn test_unknown_backend_is_config_error() {
        let err = AssistantBuilder::new(config("redis")).build().await.err();
        assert!(matches!(err, Some(AssistantError::Config(_))));
    }

    #[tokio::test]
    async fn test_restores_stored_record() {
        let store = Arc::new(MemorySessionStore::new());
        let mut record = SessionRecord::new(
            "default",
            vec![Message::system("antigo"), Message::user("oi"), Message::assistant("olá")],
        );
        record.preferences.insert("Gosta de jazz");
        store.upsert("default", &record).await.unwrap();

        let assistant = AssistantBuilder::new(config("memory"))
            .with_store(store)
            .with_llm(Arc::new(ScriptedLlmClient::new(Vec::<String>::new())))
            .build()
            .await
            .unwrap();

        let msgs = assistant.transcript().messages();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].content, crate::config::DEFAULT_SYSTEM_PROMPT);
        assert!(assistant.preferences().contains("Gosta de jazz"));
    }

    #[tokio::test]
    async fn test_first_load_creates_record() {
        let store = Arc::new(MemorySessionStore::new());
        let assistant = AssistantBuilder::new(config("memory"))
            .with_store(store.clone())
            .with_llm(Arc::new(ScriptedLlmClient::new(Vec::<String>::new())))
            .build()
            .await
            .unwrap();

        let stored = store.load("default").await.unwrap().unwrap();
        assert_eq!(stored.transcript, assistant.transcript().messages());
        assert_eq!(stored.transcript.len(), 1);
        assert!(stored.preferences.is_empty());
        assert!(stored.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_sqlite_backend_from_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut cfg = config("sqlite");
        cfg.storage.path = dir.path().join("nested").join("memoria.db");
        AssistantBuilder::new(cfg.clone())
            .with_llm(Arc::new(ScriptedLlmClient::new(["ok"])))
            .build()
            .await
            .unwrap();
        assert!(cfg.storage.path.exists());
        let reopened = SqliteSessionStore::open(&cfg.storage.path).unwrap();
        assert!(reopened.load("default").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rules_file_is_loaded() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(&path, "version = 7\n\n[[rules]]\ntag = \"p\"\n").unwrap();
        let mut cfg = config("memory");
        cfg.search.rules_path = Some(path);
        let rules = AssistantBuilder::new(cfg).build_rules().unwrap();
        assert_eq!(rules.version, 7);
    }
}
