//! 短期记忆：对话转录（Transcript）
//!
//! 首条永远是固定的 system 消息；超过上限时逐条丢弃最旧的非 system 消息，其余顺序不变。
//! 转录即生成上下文，每次变更后由编排器镜像到持久化存储。

use serde::{Deserialize, Serialize};

/// 转录默认上限（条）
pub const DEFAULT_MAX_TURNS: usize = 1000;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// 单条消息（一个 Turn）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 有界对话转录
#[derive(Clone, Debug)]
pub struct Transcript {
    messages: Vec<Message>,
    max_turns: usize,
}

impl Transcript {
    /// 新建只含 system 消息的转录；max_turns 至少为 1
    pub fn new(system_prompt: impl Into<String>, max_turns: usize) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            max_turns: max_turns.max(1),
        }
    }

    /// 由持久化的消息恢复：丢弃开头已有的 system 消息，换成当前 system prompt，再按上限剪枝
    pub fn restore(
        system_prompt: impl Into<String>,
        max_turns: usize,
        turns: impl IntoIterator<Item = Message>,
    ) -> Self {
        let mut transcript = Self::new(system_prompt, max_turns);
        let mut leading = true;
        for turn in turns {
            if leading && turn.role == Role::System {
                continue;
            }
            leading = false;
            transcript.push(turn);
        }
        transcript
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
        self.prune();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn system_prompt(&self) -> &str {
        &self.messages[0].content
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 超出上限时从下标 1 开始丢弃（FIFO），system 消息保留在首位
    fn prune(&mut self) {
        if self.messages.len() > self.max_turns {
            let excess = self.messages.len() - self.max_turns;
            let excess = excess.min(self.messages.len() - 1);
            self.messages.drain(1..1 + excess);
        }
    }
}
