//! 搜索结果页的抽取规则：有序的 {定位器, 抽取方式} 列表，带版本号
//!
//! 站点标记变化时只需换一份 TOML 规则文件，不用改代码。规则按顺序执行，越具体越靠前，通用的 `p` 放最后。

use std::path::Path;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("invalid locator {0:?}")]
    InvalidLocator(String),

    #[error("selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("rule file: {0}")]
    Io(#[from] std::io::Error),

    #[error("rule file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// 抽取方式
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Extractor {
    /// 所有后代文本节点各自去空白后拼接
    #[default]
    Text,
    /// 取某个属性值
    Attr { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub tag: String,
    /// 元素需同时具备的 class
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub extractor: Extractor,
}

impl ExtractionRule {
    pub fn new(tag: &str, classes: &[&str]) -> Self {
        Self {
            tag: tag.to_string(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            extractor: Extractor::Text,
        }
    }

    fn css(&self) -> Result<String, RuleError> {
        let ident_ok = |s: &str| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        };
        if !ident_ok(&self.tag) {
            return Err(RuleError::InvalidLocator(self.tag.clone()));
        }
        let mut css = self.tag.clone();
        for class in &self.classes {
            if !ident_ok(class) {
                return Err(RuleError::InvalidLocator(class.clone()));
            }
            css.push('.');
            css.push_str(class);
        }
        Ok(css)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: u32,
    pub rules: Vec<ExtractionRule>,
}

impl Default for RuleSet {
    /// 版本 1：Google 基础 HTML 结果页
    fn default() -> Self {
        Self {
            version: 1,
            rules: vec![
                ExtractionRule::new("div", &["BNeawe", "iBp4i", "AP7Wnd"]),
                ExtractionRule::new("span", &["BNeawe", "s3v9rd", "AP7Wnd"]),
                ExtractionRule::new("a", &["BVG0Nb"]),
                ExtractionRule::new("div", &["kCrYT"]),
                ExtractionRule::new("h3", &["zBAuLc"]),
                ExtractionRule::new("div", &["BNeawe", "UPmit", "AP7Wnd"]),
                ExtractionRule::new("div", &["BNeawe", "s3v9rd", "AP7Wnd"]),
                ExtractionRule::new("p", &[]),
            ],
        }
    }
}

impl RuleSet {
    pub fn from_toml_str(s: &str) -> Result<Self, RuleError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn compile(&self) -> Result<CompiledRuleSet, RuleError> {
        let rules = self
            .rules
            .iter()
            .map(|rule| {
                let css = rule.css()?;
                let selector = Selector::parse(&css).map_err(|e| RuleError::Selector {
                    selector: css.clone(),
                    reason: e.to_string(),
                })?;
                Ok((selector, rule.extractor.clone()))
            })
            .collect::<Result<Vec<_>, RuleError>>()?;
        Ok(CompiledRuleSet {
            version: self.version,
            rules,
        })
    }
}

/// 编译好的规则（选择器已解析）
#[derive(Debug)]
pub struct CompiledRuleSet {
    version: u32,
    rules: Vec<(Selector, Extractor)>,
}

fn extract_one(element: ElementRef<'_>, extractor: &Extractor) -> Option<String> {
    let text = match extractor {
        Extractor::Text => element.text().map(str::trim).collect::<String>(),
        Extractor::Attr { name } => element.value().attr(name)?.trim().to_string(),
    };
    (!text.is_empty()).then_some(text)
}

impl CompiledRuleSet {
    pub fn version(&self) -> u32 {
        self.version
    }

    /// 按规则顺序、规则内按文档顺序收集非空片段；不同规则命中的重复片段全部保留
    pub fn extract(&self, document: &Html) -> Vec<String> {
        let mut out = Vec::new();
        for (selector, extractor) in &self.rules {
            out.extend(
                document
                    .select(selector)
                    .filter_map(|el| extract_one(el, extractor)),
            );
        }
        out
    }
}
