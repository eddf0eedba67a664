//! 流式分发：把已算好的回复列表逐字回放成事件流
//!
//! 每条回复按字符顺序各产生一个 Delta 事件，随后一个 End 事件，再进入下一条。
//! 流是惰性、有限、不可重启的；字符之间的固定间隔只是打字效果。
//! 持久化在编排阶段已完成，消费者提前停止不会影响已保存的状态。

use std::pin::Pin;
use std::time::Duration;

use futures_util::{stream, Stream, StreamExt};
use serde::Serialize;

/// 默认的消息结束标记
pub const END_MARKER: &str = "[END]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// 回复中的一个字符
    Delta { text: char },
    /// 一条回复结束
    End,
}

impl StreamEvent {
    /// 事件的传输文本：Delta 为字符本身，End 为结束标记
    pub fn data(&self, end_marker: &str) -> String {
        match self {
            StreamEvent::Delta { text } => text.to_string(),
            StreamEvent::End => end_marker.to_string(),
        }
    }
}

/// SSE 字段不允许 `\r`：逐字符事件中的回车变为空事件，`\n` 由传输层按行拆分
pub fn sse_safe(data: &str) -> String {
    data.replace('\r', "")
}

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

#[derive(Debug, Clone)]
pub struct StreamingDispatcher {
    char_delay: Duration,
    end_marker: String,
}

impl Default for StreamingDispatcher {
    fn default() -> Self {
        Self::new(Duration::from_millis(20), END_MARKER)
    }
}

impl StreamingDispatcher {
    pub fn new(char_delay: Duration, end_marker: impl Into<String>) -> Self {
        Self {
            char_delay,
            end_marker: end_marker.into(),
        }
    }

    pub fn end_marker(&self) -> &str {
        &self.end_marker
    }

    pub fn dispatch(&self, responses: Vec<String>) -> EventStream {
        let delay = self.char_delay;
        let events = responses.into_iter().flat_map(|response| {
            response
                .chars()
                .map(|c| StreamEvent::Delta { text: c })
                .chain(std::iter::once(StreamEvent::End))
                .collect::<Vec<_>>()
        });

        Box::pin(stream::iter(events).then(move |event| async move {
            if matches!(event, StreamEvent::Delta { .. }) && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            event
        }))
    }

    /// 直接得到传输文本序列（结束标记已替换）
    pub fn dispatch_data(&self, responses: Vec<String>) -> Pin<Box<dyn Stream<Item = String> + Send>> {
        let end_marker = self.end_marker.clone();
        Box::pin(
            self.dispatch(responses)
                .map(move |event| event.data(&end_marker)),
        )
    }
}
