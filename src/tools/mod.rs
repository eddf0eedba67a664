//! 外部能力：网页检索（含抽取规则）与本机应用启动

pub mod launcher;
pub mod rules;
pub mod search;

pub use launcher::{AppLauncher, RecordingLauncher, SystemLauncher};
pub use rules::{CompiledRuleSet, ExtractionRule, Extractor, RuleError, RuleSet};
pub use search::{HttpPageFetcher, PageFetcher, Retrieval, RetrievalError, WebRetriever};
