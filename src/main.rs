//! Jarvis 控制台前端
//!
//! 每行输入作为一个单条批次交给 Assistant，回复逐字打印，遇到结束标记换行。
//! 用法: jarvis [config.toml]

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use futures_util::StreamExt;
use jarvis::config::load_config;
use jarvis::core::{AssistantBuilder, StreamEvent, StreamingDispatcher};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jarvis::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let dispatcher = StreamingDispatcher::new(
        Duration::from_millis(cfg.stream.char_delay_ms),
        cfg.stream.end_marker.clone(),
    );
    let name = cfg.app.name.clone();

    let mut assistant = AssistantBuilder::new(cfg)
        .build()
        .await
        .context("Failed to create assistant")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();
    print!("você> ");
    stdout.flush()?;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            print!("você> ");
            stdout.flush()?;
            continue;
        }
        if matches!(line, "sair" | "exit" | "quit") {
            break;
        }

        let responses = assistant.process_batch(vec![line.to_string()]).await;
        print!("{}> ", name.to_lowercase());
        let mut events = dispatcher.dispatch(responses);
        while let Some(event) = events.next().await {
            match event {
                StreamEvent::Delta { text } => print!("{}", text),
                StreamEvent::End => println!(),
            }
            stdout.flush()?;
        }
        print!("você> ");
        stdout.flush()?;
    }

    Ok(())
}
