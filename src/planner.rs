//! Rebalancing batch-buy planner

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info};

use crate::executor::{base_currency, normalize_pair, ExchangeError, OrderSide, TradeExecutor};
use crate::ledger::PositionLedger;

/// Sentinel order id for simulated fills
pub const DRY_RUN_ORDER_ID: &str = "DRY_RUN";

/// Per-symbol planning result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOutcome {
    Success,
    /// Held value already covers the target
    SkippedAlreadyFunded,
    /// Computed spend is under the exchange minimum
    SkippedBelowMinimum,
    Failed,
    PairNotFound,
}

/// One symbol's slice of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPlan {
    /// Canonical pair, e.g. `BTC_USDT`
    pub symbol: String,
    pub outcome: OrderOutcome,
    pub spend: Decimal,
    pub quantity: Decimal,
    pub price: Decimal,
    /// Current position value; meaningful when rebalancing
    pub held_value: Decimal,
    pub order_id: Option<String>,
    pub error: Option<String>,
}

impl OrderPlan {
    fn empty(symbol: String) -> Self {
        Self {
            symbol,
            outcome: OrderOutcome::Failed,
            spend: Decimal::ZERO,
            quantity: Decimal::ZERO,
            price: Decimal::ZERO,
            held_value: Decimal::ZERO,
            order_id: None,
            error: None,
        }
    }
}

/// Sizes and submits a batch of buys, one symbol at a time, in input order.
///
/// No failure of a single symbol aborts its siblings; every requested symbol
/// gets an outcome.
pub struct BatchPlanner {
    executor: Arc<dyn TradeExecutor>,
    min_order: Decimal,
}

impl BatchPlanner {
    /// Exchange minimum order value in quote currency
    pub const MIN_ORDER_USDT: u32 = 3;

    pub fn new(executor: Arc<dyn TradeExecutor>) -> Self {
        Self {
            executor,
            min_order: Decimal::from(Self::MIN_ORDER_USDT),
        }
    }

    /// Override the minimum order value
    pub fn with_min_order(mut self, min_order: Decimal) -> Self {
        self.min_order = min_order;
        self
    }

    /// Plan and (unless `dry_run`) execute one buy per symbol.
    ///
    /// The ledger snapshot passed in is held fixed for the whole call; the
    /// caller refreshes it beforehand when rebalancing.
    pub async fn plan(
        &self,
        ledger: &PositionLedger,
        symbols: &[String],
        per_asset_target: Decimal,
        rebalance: bool,
        dry_run: bool,
    ) -> (Vec<OrderPlan>, String) {
        let mut plans = Vec::with_capacity(symbols.len());

        for symbol in symbols {
            let plan = self
                .process_symbol(ledger, symbol, per_asset_target, rebalance, dry_run)
                .await;
            plans.push(plan);
        }

        let report = format_report(&plans, rebalance);

        info!(
            "Batch planned: {} symbols, rebalance={}, dry_run={}",
            plans.len(),
            rebalance,
            dry_run
        );

        (plans, report)
    }

    async fn process_symbol(
        &self,
        ledger: &PositionLedger,
        symbol: &str,
        target: Decimal,
        rebalance: bool,
        dry_run: bool,
    ) -> OrderPlan {
        let pair = normalize_pair(symbol);
        let mut plan = OrderPlan::empty(pair.clone());

        let price = match self.executor.get_ticker_price(&pair).await {
            Ok(price) => price,
            Err(ExchangeError::PairNotFound(_)) => {
                plan.outcome = OrderOutcome::PairNotFound;
                plan.error = Some("пара не найдена на бирже".to_string());
                return plan;
            }
            Err(e) => {
                error!("Price lookup failed for {}: {}", pair, e);
                plan.error = Some(e.to_string());
                return plan;
            }
        };
        plan.price = price;

        let spend = if rebalance {
            let held = ledger.value_of(&pair);
            plan.held_value = held;

            if held >= target {
                plan.outcome = OrderOutcome::SkippedAlreadyFunded;
                plan.error = Some(format!("Уже ${:.2} >= ${:.2}", held, target));
                return plan;
            }
            target - held
        } else {
            target
        };

        if spend < self.min_order {
            plan.outcome = OrderOutcome::SkippedBelowMinimum;
            plan.error = Some(format!(
                "Мин. ордер ${}, запрошено ${:.2}",
                self.min_order, spend
            ));
            return plan;
        }

        plan.spend = spend;
        plan.quantity = spend / price;

        if dry_run {
            plan.outcome = OrderOutcome::Success;
            plan.order_id = Some(DRY_RUN_ORDER_ID.to_string());
            return plan;
        }

        match self
            .executor
            .place_order(&pair, OrderSide::Buy, plan.quantity)
            .await
        {
            Ok(receipt) if receipt.success => {
                plan.outcome = OrderOutcome::Success;
                plan.order_id = receipt.order_id;
            }
            Ok(receipt) => {
                plan.outcome = OrderOutcome::Failed;
                plan.error = Some(receipt.error.unwrap_or_else(|| "Unknown error".to_string()));
            }
            Err(e) => {
                error!("Order failed for {}: {}", pair, e);
                plan.outcome = OrderOutcome::Failed;
                plan.error = Some(e.to_string());
            }
        }

        plan
    }
}

/// Render the execution report. Pure function of the outcome sequence.
pub fn format_report(plans: &[OrderPlan], rebalance: bool) -> String {
    let mode = if rebalance { "Rebalance" } else { "Batch Buy" };

    let mut lines = vec![format!("📦 **{}** — {} монет", mode, plans.len()), String::new()];

    let mut success_count = 0;
    let mut skip_count = 0;
    let mut fail_count = 0;
    let mut total_spent = Decimal::ZERO;

    for plan in plans {
        let short = base_currency(&plan.symbol);

        match plan.outcome {
            OrderOutcome::Success => {
                success_count += 1;
                total_spent += plan.spend;
                let action = if rebalance && plan.held_value > Decimal::ZERO {
                    "Докуплено"
                } else {
                    "Куплено"
                };
                lines.push(format!(
                    "✅ {}: {} ${:.2} ({:.6} @ ${:.2})",
                    short, action, plan.spend, plan.quantity, plan.price
                ));
            }
            OrderOutcome::SkippedAlreadyFunded => {
                skip_count += 1;
                lines.push(format!("➡️ {}: уже достаточно (${:.2})", short, plan.held_value));
            }
            OrderOutcome::SkippedBelowMinimum => {
                skip_count += 1;
                lines.push(format!(
                    "⚠️ {}: {}",
                    short,
                    plan.error.as_deref().unwrap_or("ниже минимума")
                ));
            }
            OrderOutcome::PairNotFound => {
                fail_count += 1;
                lines.push(format!("❌ {}: не найдена на бирже", short));
            }
            OrderOutcome::Failed => {
                fail_count += 1;
                lines.push(format!(
                    "❌ {}: ошибка — {}",
                    short,
                    plan.error.as_deref().unwrap_or("unknown")
                ));
            }
        }
    }

    lines.push(String::new());
    lines.push("📊 **ИТОГ:**".to_string());
    lines.push(format!("• Успешно: {}", success_count));
    lines.push(format!("• Пропущено: {}", skip_count));
    lines.push(format!("• Ошибок: {}", fail_count));
    lines.push(format!("• Потрачено: ${:.2}", total_spent));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::Mutex;

    use crate::executor::OrderReceipt;

    /// Scripted exchange: fixed prices, optional rejection, recorded orders
    struct ScriptedExchange {
        prices: HashMap<String, Decimal>,
        balances: HashMap<String, Decimal>,
        reject_pairs: Vec<String>,
        orders: Mutex<Vec<(String, OrderSide, Decimal)>>,
    }

    impl ScriptedExchange {
        fn new(prices: &[(&str, &str)]) -> Self {
            Self {
                prices: prices
                    .iter()
                    .map(|(p, v)| (p.to_string(), Decimal::from_str(v).unwrap()))
                    .collect(),
                balances: HashMap::new(),
                reject_pairs: Vec::new(),
                orders: Mutex::new(Vec::new()),
            }
        }

        fn with_balances(mut self, balances: &[(&str, &str)]) -> Self {
            self.balances = balances
                .iter()
                .map(|(c, q)| (c.to_string(), Decimal::from_str(q).unwrap()))
                .collect();
            self
        }

        fn rejecting(mut self, pair: &str) -> Self {
            self.reject_pairs.push(pair.to_string());
            self
        }
    }

    #[async_trait]
    impl TradeExecutor for ScriptedExchange {
        async fn get_all_balances(&self) -> Result<HashMap<String, Decimal>, ExchangeError> {
            Ok(self.balances.clone())
        }

        async fn get_ticker_price(&self, pair: &str) -> Result<Decimal, ExchangeError> {
            self.prices
                .get(pair)
                .copied()
                .ok_or_else(|| ExchangeError::PairNotFound(pair.to_string()))
        }

        async fn place_order(
            &self,
            pair: &str,
            side: OrderSide,
            quantity: Decimal,
        ) -> Result<OrderReceipt, ExchangeError> {
            if self.reject_pairs.iter().any(|p| p == pair) {
                return Ok(OrderReceipt::rejected("insufficient funds"));
            }
            self.orders
                .lock()
                .unwrap()
                .push((pair.to_string(), side, quantity));
            Ok(OrderReceipt::filled(format!("order-{}", pair)))
        }
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn empty_ledger(exchange: Arc<ScriptedExchange>) -> PositionLedger {
        let mut ledger = PositionLedger::new(exchange);
        ledger.refresh().await.unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_plain_batch_buys_full_target() {
        let exchange = Arc::new(ScriptedExchange::new(&[
            ("BTC_USDT", "50000"),
            ("ETH_USDT", "2500"),
        ]));
        let ledger = empty_ledger(exchange.clone()).await;
        let planner = BatchPlanner::new(exchange.clone());

        let (plans, _) = planner
            .plan(&ledger, &symbols(&["BTC", "ETH"]), Decimal::from(10), false, false)
            .await;

        assert_eq!(plans.len(), 2);
        for plan in &plans {
            assert_eq!(plan.outcome, OrderOutcome::Success);
            assert_eq!(plan.spend, Decimal::from(10));
        }
        assert_eq!(plans[0].quantity, Decimal::from_str("0.0002").unwrap());
        assert_eq!(exchange.orders.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rebalance_already_funded_and_partial() {
        // Held: BTC $12, ETH $4; target $10 each
        let exchange = Arc::new(
            ScriptedExchange::new(&[("BTC_USDT", "60000"), ("ETH_USDT", "2000")]).with_balances(
                &[("BTC", "0.0002"), ("ETH", "0.002")],
            ),
        );
        let mut ledger = PositionLedger::new(exchange.clone());
        ledger.refresh().await.unwrap();
        let planner = BatchPlanner::new(exchange.clone());

        let (plans, _) = planner
            .plan(&ledger, &symbols(&["BTC", "ETH"]), Decimal::from(10), true, false)
            .await;

        assert_eq!(plans[0].outcome, OrderOutcome::SkippedAlreadyFunded);
        assert_eq!(plans[0].spend, Decimal::ZERO);
        assert_eq!(plans[0].held_value, Decimal::from(12));

        assert_eq!(plans[1].outcome, OrderOutcome::Success);
        assert_eq!(plans[1].spend, Decimal::from(6));
        assert_eq!(plans[1].quantity, Decimal::from(6) / Decimal::from(2000));
    }

    #[tokio::test]
    async fn test_below_minimum_skipped_even_without_rebalance() {
        let exchange = Arc::new(ScriptedExchange::new(&[("BTC_USDT", "50000")]));
        let ledger = empty_ledger(exchange.clone()).await;
        let planner = BatchPlanner::new(exchange.clone());

        let (plans, _) = planner
            .plan(&ledger, &symbols(&["BTC"]), Decimal::from(2), false, false)
            .await;

        assert_eq!(plans[0].outcome, OrderOutcome::SkippedBelowMinimum);
        assert!(exchange.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_pair_does_not_abort_batch() {
        let exchange = Arc::new(ScriptedExchange::new(&[("BTC_USDT", "50000")]));
        let ledger = empty_ledger(exchange.clone()).await;
        let planner = BatchPlanner::new(exchange.clone());

        let (plans, report) = planner
            .plan(
                &ledger,
                &symbols(&["NOPE", "BTC"]),
                Decimal::from(10),
                false,
                false,
            )
            .await;

        assert_eq!(plans[0].outcome, OrderOutcome::PairNotFound);
        assert_eq!(plans[1].outcome, OrderOutcome::Success);
        assert!(report.contains("не найдена"));
    }

    #[tokio::test]
    async fn test_rejected_order_reported_not_propagated() {
        let exchange = Arc::new(
            ScriptedExchange::new(&[("BTC_USDT", "50000"), ("ETH_USDT", "2500")])
                .rejecting("BTC_USDT"),
        );
        let ledger = empty_ledger(exchange.clone()).await;
        let planner = BatchPlanner::new(exchange.clone());

        let (plans, report) = planner
            .plan(&ledger, &symbols(&["BTC", "ETH"]), Decimal::from(10), false, false)
            .await;

        assert_eq!(plans[0].outcome, OrderOutcome::Failed);
        assert_eq!(plans[0].error.as_deref(), Some("insufficient funds"));
        assert_eq!(plans[1].outcome, OrderOutcome::Success);
        assert!(report.contains("insufficient funds"));
    }

    #[tokio::test]
    async fn test_dry_run_is_idempotent_and_places_nothing() {
        let exchange = Arc::new(ScriptedExchange::new(&[
            ("BTC_USDT", "50000"),
            ("ETH_USDT", "2500"),
        ]));
        let ledger = empty_ledger(exchange.clone()).await;
        let planner = BatchPlanner::new(exchange.clone());

        let (first, first_report) = planner
            .plan(&ledger, &symbols(&["BTC", "ETH"]), Decimal::from(10), false, true)
            .await;
        let (second, second_report) = planner
            .plan(&ledger, &symbols(&["BTC", "ETH"]), Decimal::from(10), false, true)
            .await;

        assert_eq!(first, second);
        assert_eq!(first_report, second_report);
        assert_eq!(first[0].order_id.as_deref(), Some(DRY_RUN_ORDER_ID));
        assert!(exchange.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_report_totals_count_only_successes() {
        let exchange = Arc::new(ScriptedExchange::new(&[
            ("BTC_USDT", "50000"),
            ("ETH_USDT", "2500"),
        ]));
        let ledger = empty_ledger(exchange.clone()).await;
        let planner = BatchPlanner::new(exchange.clone());

        let (_, report) = planner
            .plan(
                &ledger,
                &symbols(&["BTC", "ETH", "NOPE"]),
                Decimal::from(10),
                false,
                true,
            )
            .await;

        assert!(report.contains("Batch Buy"));
        assert!(report.contains("• Успешно: 2"));
        assert!(report.contains("• Ошибок: 1"));
        assert!(report.contains("• Потрачено: $20.00"));
    }
}
