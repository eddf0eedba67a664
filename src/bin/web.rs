//! Jarvis HTTP 前端（SSE）
//!
//! 启动: cargo run --bin jarvis-web --features web
//! GET /get-response-stream?message=oi&message=pesquise+gatos
//! 每个字符一个 `data:` 事件，每条回复后一个 `data: [END]`。

#![cfg(feature = "web")]

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde_json::json;
use tokio::sync::Mutex;

use jarvis::config::load_config;
use jarvis::core::dispatcher::sse_safe;
use jarvis::core::{Assistant, AssistantBuilder, StreamingDispatcher};

struct AppState {
    assistant: Mutex<Assistant>,
    dispatcher: StreamingDispatcher,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jarvis::observability::init();

    let config_path = std::env::var("JARVIS_CONFIG").ok().map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let dispatcher = StreamingDispatcher::new(
        Duration::from_millis(cfg.stream.char_delay_ms),
        cfg.stream.end_marker.clone(),
    );
    let assistant = AssistantBuilder::new(cfg)
        .build()
        .await
        .context("Failed to create assistant")?;

    let state = Arc::new(AppState {
        assistant: Mutex::new(assistant),
        dispatcher,
    });

    let app = Router::new()
        .route("/get-response-stream", get(response_stream))
        .route("/api/health", get(health))
        .with_state(state);

    let port = std::env::var("JARVIS_WEB_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(5000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Jarvis web: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// 一个字符（或结束标记）对应一个 `data:` 事件
fn sse_event(data: &str) -> Event {
    Event::default().data(sse_safe(data))
}

/// GET /get-response-stream：整批处理（含持久化）完成后再开始回放
async fn response_stream(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let utterances: Vec<String> = params
        .into_iter()
        .filter(|(k, _)| k == "message")
        .map(|(_, v)| v)
        .collect();

    let responses = {
        let mut assistant = state.assistant.lock().await;
        assistant.process_batch(utterances).await
    };

    let events = state
        .dispatcher
        .dispatch_data(responses)
        .map(|data| Ok(sse_event(&data)));

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crlf_characters_do_not_break_events() {
        for data in ["\r", "\n", "a", "[END]"] {
            let _ = sse_event(data);
        }
    }
}
