//! Chat agent - per-conversation orchestration of classifier, context,
//! ledger and planner

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::context::{classify_reply, ConfirmationReply, DialogContext, Role};
use crate::executor::{normalize_pair, OrderSide, TradeExecutor};
use crate::intent::{IntentClassifier, IntentKind, ParsedIntent};
use crate::ledger::PositionLedger;
use crate::planner::BatchPlanner;

/// Fallback per-coin spend when the operator names no amount
const DEFAULT_AMOUNT_USDT: u32 = 10;

/// Confirmation policy: more symbols than this requires a yes/no
const CONFIRM_SYMBOL_LIMIT: usize = 3;

/// Confirmation policy: aggregate spend above this requires a yes/no
const CONFIRM_TOTAL_LIMIT: u32 = 50;

/// How far back "rebalance those" may reach for symbols
const RECENT_SYMBOLS_LOOKBACK_SECS: u64 = 300;

/// One operator's trading conversation.
///
/// Processes messages strictly sequentially: each inbound text is fully
/// classified, context-updated and (unless deferred to confirmation)
/// executed before the next is accepted. `handle_message` returns `None`
/// when the message is not a trading instruction - the caller's signal to
/// fall back to generative assistance.
pub struct ChatAgent {
    executor: Arc<dyn TradeExecutor>,
    classifier: IntentClassifier,
    planner: BatchPlanner,
    ledger: PositionLedger,
    context: DialogContext,
    dry_run: bool,
}

impl ChatAgent {
    pub fn new(executor: Arc<dyn TradeExecutor>, dry_run: bool) -> Self {
        Self {
            classifier: IntentClassifier::new(),
            planner: BatchPlanner::new(executor.clone()),
            ledger: PositionLedger::new(executor.clone()),
            context: DialogContext::new(),
            executor,
            dry_run,
        }
    }

    /// Replace the dialog context (shorter limits in tests)
    pub fn with_context(mut self, context: DialogContext) -> Self {
        self.context = context;
        self
    }

    pub fn context(&self) -> &DialogContext {
        &self.context
    }

    /// Handle one inbound message; `None` means "not handled here".
    pub async fn handle_message(&mut self, text: &str) -> Option<String> {
        // Step 0: a still-valid pending action absorbs yes/no replies first
        if let Some(reply) = self.resolve_pending(text).await {
            self.context.add_message(Role::Bot, &reply, None);
            return Some(reply);
        }

        // Step 1: classify and record
        let intent = self.classifier.classify(text);
        self.context.add_message(Role::User, text, Some(intent.clone()));

        // A new trade instruction supersedes a stale pending proposal
        if is_trade_intent(&intent) && self.context.pending_action().is_some() {
            info!("New trade intent supersedes pending action, clearing it");
            self.context.clear_pending();
        }

        // Step 2: dispatch by kind
        let reply = match intent.kind {
            IntentKind::BatchBuy | IntentKind::SingleBuy | IntentKind::Rebalance => {
                Some(self.handle_buy(&intent).await)
            }
            IntentKind::Sell => Some(self.handle_sell(&intent).await),
            IntentKind::BalanceCheck => Some(self.handle_balance_check(&intent).await),
            // "rebalance those" with no symbols restated: the flag is set even
            // when the kind fell through to Unknown for lack of symbols
            IntentKind::Unknown if intent.rebalance => Some(self.handle_buy(&intent).await),
            IntentKind::Unknown => None,
        };

        if let Some(reply) = &reply {
            self.context.add_message(Role::Bot, reply, None);
        }

        reply
    }

    /// Refresh positions and render the full summary (used by /balance)
    pub async fn balance_summary(&mut self) -> String {
        if let Err(e) = self.ledger.refresh().await {
            warn!("Balance refresh failed: {}", e);
            return format!("❌ Ошибка получения баланса: {}", e);
        }
        self.ledger.format_summary()
    }

    async fn resolve_pending(&mut self, text: &str) -> Option<String> {
        self.context.pending_action()?;

        match classify_reply(text) {
            ConfirmationReply::Affirm => {
                let pending = self.context.take_pending()?;
                info!(
                    "Pending action confirmed: {} symbols, ${} each, rebalance={}",
                    pending.symbols.len(),
                    pending.amount,
                    pending.rebalance
                );
                Some(
                    self.execute_batch(&pending.symbols, pending.amount, pending.rebalance)
                        .await,
                )
            }
            ConfirmationReply::Deny => {
                self.context.clear_pending();
                Some("🚫 Действие отменено".to_string())
            }
            ConfirmationReply::Unrelated => None,
        }
    }

    async fn handle_buy(&mut self, intent: &ParsedIntent) -> String {
        let mut symbols = intent.symbols.clone();

        // "rebalance those" - borrow symbols from recent context
        if symbols.is_empty() && intent.rebalance {
            symbols = self
                .context
                .recent_symbols(Duration::from_secs(RECENT_SYMBOLS_LOOKBACK_SECS));
        }

        if symbols.is_empty() {
            return "❌ Не найдены символы монет в запросе. \
                    Пример: 'BTC ETH - докупи до $50 каждую'"
                .to_string();
        }

        let amount = effective_amount(intent.target_amount);
        let total = amount * Decimal::from(symbols.len() as u64);

        let needs_confirmation = intent.rebalance
            || symbols.len() > CONFIRM_SYMBOL_LIMIT
            || total > Decimal::from(CONFIRM_TOTAL_LIMIT);

        if needs_confirmation {
            let preview = if intent.rebalance {
                self.rebalance_preview(&symbols, amount).await
            } else {
                batch_preview(&symbols, amount, total)
            };
            self.context.set_pending(symbols, amount, intent.rebalance);
            return preview;
        }

        self.execute_batch(&symbols, amount, false).await
    }

    async fn execute_batch(&mut self, symbols: &[String], amount: Decimal, rebalance: bool) -> String {
        if rebalance {
            if let Err(e) = self.ledger.refresh().await {
                warn!("Position refresh failed before rebalance: {}", e);
                return format!("❌ Не удалось обновить позиции: {}", e);
            }
        }

        let (_, report) = self
            .planner
            .plan(&self.ledger, symbols, amount, rebalance, self.dry_run)
            .await;
        report
    }

    async fn rebalance_preview(&mut self, symbols: &[String], amount: Decimal) -> String {
        if let Err(e) = self.ledger.refresh().await {
            warn!("Position refresh failed for preview: {}", e);
        }

        let mut lines = vec!["📊 **Rebalance Preview:**".to_string(), String::new()];

        for symbol in symbols {
            let current = self.ledger.value_of(symbol);
            let to_buy = (amount - current).max(Decimal::ZERO);
            let status = if current >= amount {
                "✅".to_string()
            } else {
                format!("➡️ +${:.2}", to_buy)
            };
            lines.push(format!("• {}: ${:.2} → ${:.2} {}", symbol, current, amount, status));
        }

        lines.push(String::new());
        lines.push("**Выполнить?** (да/нет)".to_string());
        lines.join("\n")
    }

    async fn handle_sell(&mut self, intent: &ParsedIntent) -> String {
        let Some(symbol) = intent.symbols.first() else {
            return "❌ Не указана монета для продажи".to_string();
        };

        if !intent.sell_all {
            return format!(
                "❌ Продажа части позиции не поддерживается. \
                 Скажите 'продай все {}'",
                symbol
            );
        }

        if let Err(e) = self.ledger.refresh().await {
            warn!("Position refresh failed before sell: {}", e);
            return format!("❌ Не удалось обновить позиции: {}", e);
        }

        let pair = normalize_pair(symbol);
        let quantity = self.ledger.quantity_of(&pair);
        if quantity <= Decimal::ZERO {
            return format!("❌ Нет {} для продажи", symbol);
        }

        match self.executor.place_order(&pair, OrderSide::Sell, quantity).await {
            Ok(receipt) if receipt.success => {
                format!("✅ SELL {}: {:.6}", pair, quantity)
            }
            Ok(receipt) => format!(
                "❌ Ошибка: {}",
                receipt.error.unwrap_or_else(|| "unknown".to_string())
            ),
            Err(e) => format!("❌ Ошибка: {}", e),
        }
    }

    async fn handle_balance_check(&mut self, intent: &ParsedIntent) -> String {
        if let Err(e) = self.ledger.refresh().await {
            warn!("Balance refresh failed: {}", e);
            return format!("❌ Ошибка получения баланса: {}", e);
        }

        if intent.symbols.is_empty() {
            return self.ledger.format_summary();
        }

        let mut lines = vec!["💰 **Баланс:**".to_string(), String::new()];
        for symbol in &intent.symbols {
            lines.push(format!("• {}: ${:.2}", symbol, self.ledger.value_of(symbol)));
        }
        lines.join("\n")
    }
}

fn is_trade_intent(intent: &ParsedIntent) -> bool {
    matches!(
        intent.kind,
        IntentKind::BatchBuy | IntentKind::SingleBuy | IntentKind::Rebalance | IntentKind::Sell
    ) && !intent.symbols.is_empty()
}

/// Zero means "not specified"; substitute the default
fn effective_amount(target: Decimal) -> Decimal {
    if target > Decimal::ZERO {
        target
    } else {
        Decimal::from(DEFAULT_AMOUNT_USDT)
    }
}

fn batch_preview(symbols: &[String], amount: Decimal, total: Decimal) -> String {
    [
        format!("🔍 **Batch Buy** — {} монет по ${:.2}", symbols.len(), amount),
        String::new(),
        format!("Монеты: {}", symbols.join(", ")),
        format!("Общая сумма: ${:.2}", total),
        String::new(),
        "**Подтвердить?** (да/нет)".to_string(),
    ]
    .join("\n")
}
