//! 核心编排层：输入分类、回复生成、偏好抽取、批处理编排、流式分发

pub mod action;
pub mod builder;
pub mod classifier;
pub mod dispatcher;
pub mod error;
pub mod generator;
pub mod orchestrator;
pub mod preference;

pub use action::{parse_action, AppAction};
pub use builder::AssistantBuilder;
pub use classifier::{Category, Classifier};
pub use dispatcher::{StreamEvent, StreamingDispatcher, END_MARKER};
pub use error::AssistantError;
pub use generator::ResponseGenerator;
pub use orchestrator::{Assistant, Collaborators};
pub use preference::PreferenceExtractor;
