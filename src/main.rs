//! Chat Trader - natural-language trading agent
//!
//! Wires the pieces together:
//! 1. Loads configuration (file + environment)
//! 2. Connects the Gate.io spot client
//! 3. Builds the chat agent (classifier, context, ledger, planner)
//! 4. Polls Telegram and routes operator messages through the agent,
//!    falling back to the LLM assistant for anything unhandled

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use chat_trader::{
    AppConfig, ChatAgent, DialogContext, GateClient, LlmClient, TelegramChannel, TradeExecutor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Starting Chat Trader...");

    let config = AppConfig::load()?;

    if config.exchange.dry_run {
        info!("📝 Running in DRY RUN mode - orders are simulated");
    } else {
        warn!("💰 Running in LIVE mode - REAL MONEY AT RISK");
    }

    let executor: Arc<dyn TradeExecutor> = Arc::new(GateClient::new(
        &config.exchange.api_key,
        &config.exchange.api_secret,
        config.exchange.dry_run,
    )?);

    let context = DialogContext::with_limits(
        config.dialog.max_history,
        Duration::from_secs(config.dialog.context_ttl_secs),
    );
    let agent = ChatAgent::new(executor, config.exchange.dry_run).with_context(context);

    let llm = match &config.llm {
        Some(llm) => Some(LlmClient::new(&llm.api_url, &llm.api_key, &llm.model)?),
        None => {
            info!("No LLM configured, generative fallback disabled");
            None
        }
    };

    let channel = TelegramChannel::new(&config.telegram.bot_token, &config.telegram.chat_id)?;
    channel.run(agent, llm).await
}
