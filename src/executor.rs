//! Trade executor capability - the exchange seam

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

/// Quote currency for all trading pairs
pub const QUOTE_CURRENCY: &str = "USDT";

/// Normalize a bare ticker or pair into the canonical `BASE_USDT` form
pub fn normalize_pair(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    if upper.ends_with("_USDT") {
        upper
    } else {
        format!("{}_USDT", upper)
    }
}

/// Base currency of a canonical pair (`BTC_USDT` -> `BTC`)
pub fn base_currency(pair: &str) -> &str {
    pair.strip_suffix("_USDT").unwrap_or(pair)
}

/// Failures at the exchange boundary
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exchange api error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("pair not found: {0}")]
    PairNotFound(String),

    #[error("order rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// Outcome of a submitted order
#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub success: bool,
    pub order_id: Option<String>,
    pub error: Option<String>,
}

impl OrderReceipt {
    pub fn filled(order_id: impl Into<String>) -> Self {
        Self {
            success: true,
            order_id: Some(order_id.into()),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            order_id: None,
            error: Some(error.into()),
        }
    }
}

/// Exchange capability consumed by the ledger and the planner.
///
/// Implementations own retries, auth and transport; callers only see the
/// three operations below and must degrade gracefully when they fail.
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// Per-currency free balances, quote currency included
    async fn get_all_balances(&self) -> Result<HashMap<String, Decimal>, ExchangeError>;

    /// Last traded price for a canonical pair
    async fn get_ticker_price(&self, pair: &str) -> Result<Decimal, ExchangeError>;

    /// Submit a spot order for `quantity` of the base asset
    async fn place_order(
        &self,
        pair: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<OrderReceipt, ExchangeError>;
}
