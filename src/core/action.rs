//! 打开应用路径的动作契约
//!
//! 让模型只返回一个 JSON 对象 `{"action": "open" | "none", "target": "..."}`，
//! 用 schemars 生成的 Schema 注入 prompt；解析严格，任何偏差都返回 MalformedActionResponse。

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;

use crate::core::AssistantError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// 打开一个应用
    Open,
    /// 普通消息，不做任何事
    None,
}

/// 模型需返回的结构
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ActionResponse {
    pub action: ActionKind,
    /// 要打开的应用名（单个词，如 spotify、calc）
    #[serde(default)]
    pub target: Option<String>,
}

/// 解析结果：打开某个应用，或无操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    Open(String),
    Nothing,
}

pub fn action_schema_json() -> String {
    let schema = schema_for!(ActionResponse);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 打开应用的分析 prompt（嵌入用户原话与 Schema）
pub fn open_app_prompt(utterance: &str) -> String {
    format!(
        "Analise o seguinte texto do usuário: \"{}\"\n\n\
         1. Determine se é uma mensagem normal ou uma solicitação de abrir um app.\n\
         2. Se for, determine o nome do aplicativo que deve ser aberto.\n\n\
         Responda SOMENTE com um objeto JSON válido conforme este JSON Schema, sem texto adicional:\n{}",
        utterance,
        action_schema_json()
    )
}

/// 去掉可选的 ```json 围栏
fn strip_fence(raw: &str) -> &str {
    let s = raw.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

pub fn parse_action(raw: &str) -> Result<AppAction, AssistantError> {
    let body = strip_fence(raw);
    let parsed: ActionResponse = serde_json::from_str(body)
        .map_err(|e| AssistantError::MalformedActionResponse(format!("{}: {}", e, raw.trim())))?;

    match (parsed.action, parsed.target) {
        (ActionKind::None, _) => Ok(AppAction::Nothing),
        (ActionKind::Open, Some(target)) => {
            let target = target.trim();
            let valid = !target.is_empty()
                && target
                    .chars()
                    .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'));
            if valid {
                Ok(AppAction::Open(target.to_string()))
            } else {
                Err(AssistantError::MalformedActionResponse(format!(
                    "invalid target: {:?}",
                    target
                )))
            }
        }
        (ActionKind::Open, None) => Err(AssistantError::MalformedActionResponse(
            "open without target".to_string(),
        )),
    }
}
