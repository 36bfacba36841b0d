//! Generative fallback assistant (OpenAI-compatible chat completions)

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::context::{DialogContext, Role};

/// How many recent dialog entries accompany a fallback request
const HISTORY_WINDOW: usize = 80;

const DEFAULT_SYSTEM_PROMPT: &str = "Ты AI-ассистент криптовалютного торгового бота.\n\
Помогаешь оператору: объясняешь состояние портфеля, отвечаешь на вопросы \
о монетах и рисках, подсказываешь формулировки торговых команд.\n\
Торговые инструкции ты НЕ исполняешь — их обрабатывает сам бот; если \
пользователь хочет купить или продать, подскажи точную команду, например \
'BTC ETH - купить по $10' или 'продай все XRP'.\n\
Отвечай кратко и структурированно.";

/// Chat-completions client consulted only when the agent returns "not
/// handled". The core never depends on its output.
pub struct LlmClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
}

impl LlmClient {
    pub fn new(api_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        })
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// Answer from the recent dialog history
    pub async fn chat(&self, context: &DialogContext) -> Result<String> {
        let mut messages = vec![ChatMessage {
            role: "system",
            content: self.system_prompt.clone(),
        }];

        let history: Vec<_> = context.history().collect();
        let skip = history.len().saturating_sub(HISTORY_WINDOW);
        for entry in history.into_iter().skip(skip) {
            messages.push(ChatMessage {
                role: match entry.role {
                    Role::User => "user",
                    Role::Bot => "assistant",
                },
                content: entry.text.clone(),
            });
        }

        debug!("LLM fallback with {} messages", messages.len());

        let request = CompletionRequest {
            model: self.model.clone(),
            messages,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM API error {}: {}", status, body));
        }

        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("LLM returned no choices"))
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}
