//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `JARVIS__*` 覆盖（双下划线表示嵌套，如 `JARVIS__LLM__PROVIDER=openai`）。
//! 所有字段都有默认值，没有配置文件也能启动。

use std::path::PathBuf;

use serde::Deserialize;

use crate::memory::{DEFAULT_MAX_TURNS, DEFAULT_SESSION_KEY};

/// 固定的 system prompt（pt-BR，回复会交给 TTS 朗读）
pub const DEFAULT_SYSTEM_PROMPT: &str = "Você é um modelo de linguagem chamado Jarvis criado por Panubiin. Responda às perguntas feitas com quantos caracteres for necessário. Não use asteriscos, pois isso será passado para um serviço de texto para fala. Sempre responda em português do Brasil. Quando te pedirem para fazer alguma coisa, faça por completo!";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub search: SearchSection,
    pub storage: StorageSection,
    pub stream: StreamSection,
    pub classifier: ClassifierSection,
}

/// [app] 段：名称、system prompt、转录上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub system_prompt: String,
    pub max_transcript_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "Jarvis".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_transcript_turns: DEFAULT_MAX_TURNS,
        }
    }
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：ollama / openai / mock
    pub provider: String,
    pub model: String,
    /// Ollama 默认 http://localhost:11434；openai 时为可选的兼容端点
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3".to_string(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次生成的最长等待（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 120 }
    }
}

/// [search] 段：搜索引擎地址、超时、翻页上限、摘要长度、UA 轮换、抽取规则文件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub base_url: String,
    pub timeout_secs: u64,
    /// 翻页硬上限，防止「下一页」链接成环
    pub max_pages: usize,
    pub summary_chars: usize,
    pub user_agents: Vec<String>,
    /// 「下一页」链接的 aria-label
    pub next_page_label: String,
    /// 可选：TOML 抽取规则文件，未设置时用内置规则
    pub rules_path: Option<PathBuf>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            base_url: "https://www.google.com".to_string(),
            timeout_secs: 15,
            max_pages: 10,
            summary_chars: 1500,
            user_agents: default_user_agents(),
            next_page_label: "Próxima".to_string(),
            rules_path: None,
        }
    }
}

fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".into(),
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15".into(),
        "Mozilla/5.0 (X11; Linux x86_64; rv:132.0) Gecko/20100101 Firefox/132.0".into(),
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:132.0) Gecko/20100101 Firefox/132.0".into(),
    ]
}

/// [storage] 段：后端（sqlite / json / memory）、路径、session key
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: String,
    pub path: PathBuf,
    pub session_key: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            path: PathBuf::from("data/memoria_usuario.db"),
            session_key: DEFAULT_SESSION_KEY.to_string(),
        }
    }
}

/// [stream] 段：逐字回放的间隔与结束标记
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    pub char_delay_ms: u64,
    pub end_marker: String,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            char_delay_ms: 20,
            end_marker: crate::core::dispatcher::END_MARKER.to_string(),
        }
    }
}

/// [classifier] 段：各类别的触发短语（大小写不敏感的子串匹配）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierSection {
    pub search_triggers: Vec<String>,
    pub open_app_triggers: Vec<String>,
    /// 默认为空：默认配置下分类器不会产出 preference
    pub preference_triggers: Vec<String>,
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            search_triggers: crate::core::classifier::DEFAULT_SEARCH_TRIGGERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            open_app_triggers: crate::core::classifier::DEFAULT_OPEN_APP_TRIGGERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            preference_triggers: Vec::new(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 JARVIS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 JARVIS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("JARVIS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
