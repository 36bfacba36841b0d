//! Intent classification for free-form trading instructions

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::extract::{extract_amount, extract_symbols};

/// What the operator asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    /// Buy several coins at a per-coin target
    BatchBuy,
    /// Buy one coin
    SingleBuy,
    /// Top up to a target accounting for holdings
    Rebalance,
    /// Sell a coin
    Sell,
    /// Show balances or positions
    BalanceCheck,
    Unknown,
}

/// Immutable result of classifying one inbound message
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIntent {
    pub kind: IntentKind,
    /// Unique tickers in first-occurrence order
    pub symbols: Vec<String>,
    /// Target spend per coin; `Decimal::ZERO` means "not specified"
    pub target_amount: Decimal,
    /// Existing holdings offset the buy
    pub rebalance: bool,
    pub sell_all: bool,
    /// Advisory score in [0, 1]; never gates execution
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Buy,
    Sell,
    Rebalance,
    BalanceCheck,
}

/// Declarative keyword table: category -> match patterns, compiled once.
/// Localization is a data change here, not a logic change.
static KEYWORD_TABLE: Lazy<Vec<(Category, Vec<Regex>)>> = Lazy::new(|| {
    let compile = |patterns: &[&str]| {
        patterns
            .iter()
            .map(|p| Regex::new(p).expect("Invalid keyword regex"))
            .collect::<Vec<_>>()
    };

    vec![
        (
            Category::Buy,
            compile(&[
                r"куп[ий]", r"купить", r"докуп[ий]", r"докупить", r"buy", r"приобрести",
                r"взять", r"добавь", r"добавить", r"возьми", r"бери", r"набери", r"закупи",
                r"top\s*up", r"purchase",
            ]),
        ),
        (
            Category::Sell,
            compile(&[
                r"прода[йм]", r"продать", r"sell", r"слей", r"слить", r"избавься", r"скинь",
                r"выведи", r"ликвидируй", r"dump", r"liquidate",
            ]),
        ),
        (
            Category::Rebalance,
            compile(&[
                r"учитыва[яй]", r"уже куплен", r"докуп[ий].*до", r"доведи.*до", r"ребаланс",
                r"rebalance", r"чтобы.*было.*по", r"до.*каждой", r"каждую.*до",
                r"accounting\s+for", r"top\s*up.*to", r"already\s+(?:hold|own|bought)",
            ]),
        ),
        (
            Category::BalanceCheck,
            compile(&[
                r"скольк[ои]", r"баланс", r"balance", r"позици[яи]", r"что у меня",
                r"мои монеты", r"портфель", r"how\s+much", r"portfolio", r"positions",
            ]),
        ),
    ]
});

/// Marker that a sell applies to the whole held quantity
static SELL_ALL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"все|всё|\ball\b").expect("Invalid sell-all regex"));

/// Keyword-category classifier over raw message text.
///
/// Confidence is telemetry only; a low-confidence `Unknown` intent is still
/// returned and is the caller's signal to fall back to generative assistance.
#[derive(Debug, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str) -> ParsedIntent {
        let normalized = text.trim();
        let lower = normalized.to_lowercase();

        let is_buy = self.matches(Category::Buy, &lower);
        let is_sell = self.matches(Category::Sell, &lower);
        let is_rebalance = self.matches(Category::Rebalance, &lower);
        let is_balance = self.matches(Category::BalanceCheck, &lower);

        let symbols = extract_symbols(normalized);
        let target_amount = extract_amount(&lower);

        let mut intent = ParsedIntent {
            kind: IntentKind::Unknown,
            symbols,
            target_amount,
            rebalance: false,
            sell_all: false,
            confidence: 0.0,
        };

        if is_balance {
            intent.kind = IntentKind::BalanceCheck;
            intent.confidence = 0.8;
        } else if is_sell {
            intent.kind = IntentKind::Sell;
            intent.sell_all = SELL_ALL_PATTERN.is_match(&lower);
            intent.confidence = 0.85;
        } else if is_buy || is_rebalance {
            match intent.symbols.len() {
                n if n >= 2 => {
                    intent.kind = IntentKind::BatchBuy;
                    intent.confidence = 0.9;
                }
                1 => {
                    intent.kind = IntentKind::SingleBuy;
                    intent.confidence = 0.85;
                }
                _ => {
                    intent.kind = IntentKind::Unknown;
                    intent.confidence = 0.3;
                }
            }

            intent.rebalance = is_rebalance;
            if is_rebalance {
                intent.confidence = (intent.confidence + 0.05).min(1.0);
            }
        }

        // Symbols plus an explicit amount is stronger evidence
        if !intent.symbols.is_empty() && intent.target_amount > Decimal::ZERO {
            intent.confidence = (intent.confidence + 0.1).min(1.0);
        }

        debug!(
            "Classified intent: {:?}, symbols={:?}, amount={}, rebalance={}",
            intent.kind, intent.symbols, intent.target_amount, intent.rebalance
        );

        intent
    }

    /// Quick pre-filter: does the text look like a trading command at all?
    pub fn is_trading_command(&self, text: &str) -> bool {
        let lower = text.to_lowercase();

        if self.matches(Category::Buy, &lower) || self.matches(Category::Sell, &lower) {
            return true;
        }

        !extract_symbols(text).is_empty() && extract_amount(&lower) > Decimal::ZERO
    }

    fn matches(&self, category: Category, text: &str) -> bool {
        KEYWORD_TABLE
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, patterns)| patterns.iter().any(|p| p.is_match(text)))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn classify(text: &str) -> ParsedIntent {
        IntentClassifier::new().classify(text)
    }

    #[test]
    fn test_batch_buy_english() {
        let intent = classify("BTC ETH SOL - buy at $10 each");
        assert_eq!(intent.kind, IntentKind::BatchBuy);
        assert_eq!(intent.symbols, vec!["BTC", "ETH", "SOL"]);
        assert_eq!(intent.target_amount, Decimal::from(10));
        assert!(intent.confidence >= 0.9);
    }

    #[test]
    fn test_batch_buy_russian() {
        let intent = classify("AAVE SOL - купить по 10 долларов");
        assert_eq!(intent.kind, IntentKind::BatchBuy);
        assert_eq!(intent.symbols, vec!["AAVE", "SOL"]);
        assert_eq!(intent.target_amount, Decimal::from(10));
    }

    #[test]
    fn test_rebalance_flagged_buy() {
        let intent = classify("top up ETH to $50 accounting for holdings");
        assert_eq!(intent.kind, IntentKind::SingleBuy);
        assert_eq!(intent.symbols, vec!["ETH"]);
        assert!(intent.rebalance);
        assert_eq!(intent.target_amount, Decimal::from(50));
    }

    #[test]
    fn test_rebalance_flagged_batch() {
        let intent = classify("докупи BTC ETH до 50 долларов учитывая уже купленные");
        assert_eq!(intent.kind, IntentKind::BatchBuy);
        assert!(intent.rebalance);
        assert_eq!(intent.target_amount, Decimal::from(50));
    }

    #[test]
    fn test_sell_all() {
        let intent = classify("sell all XRP");
        assert_eq!(intent.kind, IntentKind::Sell);
        assert!(intent.sell_all);
        assert_eq!(intent.symbols, vec!["XRP"]);

        let intent = classify("продай все XRP");
        assert_eq!(intent.kind, IntentKind::Sell);
        assert!(intent.sell_all);
    }

    #[test]
    fn test_sell_without_all_marker() {
        let intent = classify("продай XRP");
        assert_eq!(intent.kind, IntentKind::Sell);
        assert!(!intent.sell_all);
    }

    #[test]
    fn test_balance_check_beats_other_categories() {
        // "сколько" wins even though a coin is mentioned
        let intent = classify("сколько у меня BTC?");
        assert_eq!(intent.kind, IntentKind::BalanceCheck);
        assert_eq!(intent.symbols, vec!["BTC"]);
    }

    #[test]
    fn test_buy_without_symbols_is_unknown() {
        let intent = classify("купи что-нибудь");
        assert_eq!(intent.kind, IntentKind::Unknown);
        assert!((intent.confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_boost_for_symbols_and_amount() {
        // 0.9 (batch) + 0.1 (symbols + amount), capped at 1.0
        let intent = classify("BTC ETH - купить по 20 баксов каждую");
        assert!((intent.confidence - 1.0).abs() < 1e-9);
        assert_eq!(intent.target_amount, Decimal::from(20));
    }

    #[test]
    fn test_unrelated_text_is_unknown() {
        let intent = classify("привет, как дела?");
        assert_eq!(intent.kind, IntentKind::Unknown);
        assert_eq!(intent.confidence, 0.0);
    }

    #[test]
    fn test_is_trading_command() {
        let classifier = IntentClassifier::new();
        assert!(classifier.is_trading_command("купи BTC"));
        assert!(classifier.is_trading_command("sell XRP"));
        assert!(classifier.is_trading_command("BTC на $10"));
        assert!(!classifier.is_trading_command("привет"));
    }

    #[test]
    fn test_amount_comma_decimal_flows_through() {
        let intent = classify("купи BTC на $10,5");
        assert_eq!(intent.target_amount, Decimal::from_str("10.5").unwrap());
    }
}
