//! Position ledger - last-known holdings, prices and valuations

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::executor::{normalize_pair, ExchangeError, TradeExecutor, QUOTE_CURRENCY};

/// One held asset with its last observed price
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    /// Canonical trading pair, e.g. `BTC_USDT`
    pub symbol: String,
    /// Base currency, e.g. `BTC`
    pub currency: String,
    pub quantity: Decimal,
    pub price: Decimal,
    /// Always `quantity * price` as of the refresh, never carried forward
    pub value: Decimal,
}

/// Read-only projection for reporting
#[derive(Debug, Clone)]
pub struct LedgerSummary {
    pub count: usize,
    pub total_value: Decimal,
    /// Positions sorted by value, largest first
    pub positions: Vec<Position>,
}

/// Caches per-asset quantity, price and quote-currency value.
///
/// The map is fully replaced on each refresh; entries without a live balance
/// disappear. Only `refresh` mutates state.
pub struct PositionLedger {
    executor: Arc<dyn TradeExecutor>,
    positions: HashMap<String, Position>,
    refreshed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl PositionLedger {
    pub fn new(executor: Arc<dyn TradeExecutor>) -> Self {
        Self {
            executor,
            positions: HashMap::new(),
            refreshed_at: None,
        }
    }

    /// Replace the whole snapshot from live balances.
    ///
    /// Assets whose price lookup fails are logged and skipped; the rest of
    /// the refresh proceeds. A balance fetch failure leaves the ledger empty
    /// and is returned to the caller.
    pub async fn refresh(&mut self) -> Result<usize, ExchangeError> {
        self.positions.clear();

        let balances = self.executor.get_all_balances().await?;

        for (currency, quantity) in balances {
            if currency == QUOTE_CURRENCY || quantity <= Decimal::ZERO {
                continue;
            }

            let symbol = normalize_pair(&currency);
            match self.executor.get_ticker_price(&symbol).await {
                Ok(price) => {
                    self.positions.insert(
                        symbol.clone(),
                        Position {
                            symbol,
                            currency,
                            quantity,
                            price,
                            value: quantity * price,
                        },
                    );
                }
                Err(e) => {
                    warn!("Failed to get price for {}: {}", symbol, e);
                }
            }
        }

        self.refreshed_at = Some(chrono::Utc::now());
        info!("Refreshed {} positions", self.positions.len());

        Ok(self.positions.len())
    }

    /// Quote-currency value of a position, 0 if absent
    pub fn value_of(&self, symbol: &str) -> Decimal {
        let pair = normalize_pair(symbol);
        self.positions
            .get(&pair)
            .map(|p| p.value)
            .unwrap_or(Decimal::ZERO)
    }

    /// Held base-asset quantity, 0 if absent
    pub fn quantity_of(&self, symbol: &str) -> Decimal {
        let pair = normalize_pair(symbol);
        self.positions
            .get(&pair)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// How much more quote currency is needed to reach `target`
    pub fn additional_needed(&self, symbol: &str, target: Decimal) -> Decimal {
        (target - self.value_of(symbol)).max(Decimal::ZERO)
    }

    /// Cached price, falling back to a live lookup for assets not held
    pub async fn price_of(&self, symbol: &str) -> Option<Decimal> {
        let pair = normalize_pair(symbol);

        if let Some(position) = self.positions.get(&pair) {
            return Some(position.price);
        }

        self.executor.get_ticker_price(&pair).await.ok()
    }

    pub fn refreshed_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.refreshed_at
    }

    /// Read-only projection, sorted by value descending
    pub fn summary(&self) -> LedgerSummary {
        let mut positions: Vec<Position> = self.positions.values().cloned().collect();
        positions.sort_by(|a, b| b.value.cmp(&a.value));

        let total_value = positions.iter().map(|p| p.value).sum();

        LedgerSummary {
            count: positions.len(),
            total_value,
            positions,
        }
    }

    /// Chat-ready summary of current positions, top ten by value
    pub fn format_summary(&self) -> String {
        let summary = self.summary();

        if summary.positions.is_empty() {
            return format!("📭 Нет открытых позиций (кроме {})", QUOTE_CURRENCY);
        }

        let mut lines = vec![
            "💼 **ТЕКУЩИЕ ПОЗИЦИИ**".to_string(),
            format!("Всего: {} монет", summary.count),
            format!("Общая стоимость: ${:.2}", summary.total_value),
            String::new(),
        ];

        for p in summary.positions.iter().take(10) {
            lines.push(format!("• {}: {:.6} (${:.2})", p.symbol, p.quantity, p.value));
        }

        lines.join("\n")
    }
}
