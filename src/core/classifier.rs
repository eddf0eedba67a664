//! 输入分类：大小写不敏感的子串匹配，搜索优先于打开应用，无匹配为 normal
//!
//! preference 类别只在配置了 preference_triggers 时可达（默认为空）。

use crate::config::ClassifierSection;

pub const DEFAULT_SEARCH_TRIGGERS: &[&str] = &[
    "faça uma pesquisa",
    "pesquise",
    "pesquise sobre",
    "pesquisa sobre",
];

pub const DEFAULT_OPEN_APP_TRIGGERS: &[&str] = &["abra", "inicie", "abrir", "abrir site"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Search,
    OpenApp,
    Preference,
    Normal,
}

/// 纯函数分类器，触发短语在构造时统一转小写
#[derive(Debug, Clone)]
pub struct Classifier {
    search: Vec<String>,
    open_app: Vec<String>,
    preference: Vec<String>,
}

fn lowered(triggers: &[String]) -> Vec<String> {
    triggers
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

impl Default for Classifier {
    fn default() -> Self {
        Self::from_config(&ClassifierSection::default())
    }
}

impl Classifier {
    pub fn from_config(cfg: &ClassifierSection) -> Self {
        Self {
            search: lowered(&cfg.search_triggers),
            open_app: lowered(&cfg.open_app_triggers),
            preference: lowered(&cfg.preference_triggers),
        }
    }

    pub fn classify(&self, text: &str) -> Category {
        let text = text.to_lowercase();
        let hit = |triggers: &[String]| triggers.iter().any(|t| text.contains(t.as_str()));
        if hit(&self.search) {
            Category::Search
        } else if hit(&self.open_app) {
            Category::OpenApp
        } else if hit(&self.preference) {
            Category::Preference
        } else {
            Category::Normal
        }
    }

    pub fn search_triggers(&self) -> &[String] {
        &self.search
    }
}
