//! Telegram transport - long polling, command routing, reply delivery

use anyhow::Result;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::agent::ChatAgent;
use crate::llm::LlmClient;

/// Telegram caps messages around 4096 characters
const MAX_MESSAGE_LEN: usize = 3900;

/// Long-poll timeout for getUpdates
const POLL_TIMEOUT_SECS: u64 = 30;

const HELP_TEXT: &str = "📋 **Команды бота:**\n\n\
/balance — баланс и позиции\n\
/confirm — подтвердить действие\n\
/cancel — отменить действие\n\
/help — список команд\n\n\
💡 **Естественный язык:**\n\
\"AAVE SOL BTC - купить по 10 долларов\"\n\
\"докупи ETH до $50 учитывая купленные\"\n\
\"продай все XRP\"";

/// Chat transport for one operator conversation
pub struct TelegramChannel {
    client: Client,
    base_url: String,
    chat_id: String,
}

impl TelegramChannel {
    pub fn new(bot_token: &str, chat_id: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("https://api.telegram.org/bot{}", bot_token),
            chat_id: chat_id.to_string(),
        })
    }

    /// Poll updates and feed operator messages to the agent until the
    /// process is stopped.
    pub async fn run(&self, mut agent: ChatAgent, llm: Option<LlmClient>) -> Result<()> {
        info!("Telegram channel polling started for chat {}", self.chat_id);
        let mut offset: i64 = 0;

        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    error!("getUpdates failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);

                let Some(message) = update.message else { continue };
                let Some(text) = message.text else { continue };

                if message.chat.id.to_string() != self.chat_id {
                    debug!("Ignoring message from foreign chat {}", message.chat.id);
                    continue;
                }

                info!("INCOMING text: {}", text.chars().take(100).collect::<String>());

                let reply = self.dispatch(&mut agent, llm.as_ref(), &text).await;
                self.send_message(&reply).await;
            }
        }
    }

    /// Route one inbound text: slash commands, then the agent, then the
    /// generative fallback.
    async fn dispatch(&self, agent: &mut ChatAgent, llm: Option<&LlmClient>, text: &str) -> String {
        match text.trim() {
            "/help" | "/start" => return HELP_TEXT.to_string(),
            "/balance" => return agent.balance_summary().await,
            // Aliases into the confirmation vocabulary
            "/confirm" => return self.agent_or_ack(agent, llm, "confirm").await,
            "/cancel" => return self.agent_or_ack(agent, llm, "cancel").await,
            _ => {}
        }

        self.agent_or_ack(agent, llm, text).await
    }

    async fn agent_or_ack(&self, agent: &mut ChatAgent, llm: Option<&LlmClient>, text: &str) -> String {
        if let Some(reply) = agent.handle_message(text).await {
            return reply;
        }

        // Not a trading instruction - hand it to the assistant
        if let Some(llm) = llm {
            match llm.chat(agent.context()).await {
                Ok(reply) => return reply,
                Err(e) => {
                    error!("LLM fallback error: {}", e);
                    return format!("❌ Ошибка LLM: {}", e);
                }
            }
        }

        format!("✅ Принял: {}", text.chars().take(50).collect::<String>())
    }

    /// Deliver a reply, splitting to respect the message size cap.
    /// Failures are logged, never propagated.
    pub async fn send_message(&self, text: &str) {
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            if let Err(e) = self.send_chunk(&chunk).await {
                error!("Telegram send failed: {}", e);
            }
        }
    }

    async fn send_chunk(&self, text: &str) -> Result<()> {
        let url = format!("{}/sendMessage", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": text,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("sendMessage returned {}: {}", status, body);
        }

        Ok(())
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let url = format!(
            "{}/getUpdates?offset={}&timeout={}",
            self.base_url, offset, POLL_TIMEOUT_SECS
        );

        let response: UpdatesResponse = self.client.get(&url).send().await?.json().await?;

        if !response.ok {
            anyhow::bail!("getUpdates returned ok=false");
        }

        Ok(response.result)
    }
}

/// Split text into chunks that fit the transport's message cap
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();

    for line in text.split_inclusive('\n') {
        if current.len() + line.len() > max_len && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        // A single oversized line is split hard
        if line.len() > max_len {
            let mut rest = line;
            while rest.len() > max_len {
                let split_at = (0..=max_len).rev().find(|i| rest.is_char_boundary(*i)).unwrap_or(0);
                let (head, tail) = rest.split_at(split_at);
                parts.push(head.to_string());
                rest = tail;
            }
            current.push_str(rest);
        } else {
            current.push_str(line);
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

// Wire types

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}
