use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

/// Discord rejects message content longer than this.
pub const MAX_MESSAGE_CHARS: usize = 2000;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, destination: &str, text: &str) -> Result<()>;
}

pub struct StdoutSink;

#[async_trait]
impl NotificationSink for StdoutSink {
    async fn send(&self, destination: &str, text: &str) -> Result<()> {
        println!("[{destination}]\n{text}");
        Ok(())
    }
}

/// Posts to the webhook URL named by the destination.
pub struct WebhookSink {
    client: Client,
}

impl WebhookSink {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gradebook-watch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, destination: &str, text: &str) -> Result<()> {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            debug!("posting {} chars to webhook", chunk.chars().count());
            self.client
                .post(destination)
                .json(&serde_json::json!({ "content": chunk }))
                .send()
                .await
                .context("webhook request failed")?
                .error_for_status()?;
        }
        Ok(())
    }
}

/// Splits on line boundaries so that no piece exceeds `limit` characters.
/// Lines longer than the limit are cut mid-line.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.lines() {
        let mut rest: Vec<char> = line.chars().collect();
        loop {
            let separator = usize::from(current_len > 0);
            if current_len + separator + rest.len() <= limit {
                if separator == 1 {
                    current.push('\n');
                }
                current.extend(rest.iter());
                current_len += separator + rest.len();
                break;
            }
            if current_len > 0 {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
                continue;
            }
            let tail = rest.split_off(limit);
            chunks.push(rest.into_iter().collect());
            rest = tail;
        }
    }
    if current_len > 0 || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}
