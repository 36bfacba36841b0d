//! Symbol and amount extraction from raw message text

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;

/// Bare ticker: 2-10 uppercase letters, optional quote suffix which is stripped
static TICKER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]{2,10})(?:_USDT)?\b").expect("Invalid ticker regex"));

/// Amount patterns in fixed priority order. The first pattern that matches
/// wins; within a pattern the first match wins.
static AMOUNT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // $10, $ 10.5
        r"\$\s*(\d+(?:[.,]\d+)?)",
        // 10 долларов, 10 usdt, 10 usd
        r"(\d+(?:[.,]\d+)?)\s*(?:долл|usdt|usd|\$)",
        // 10 баксов
        r"(\d+(?:[.,]\d+)?)\s*(?:бакс|баксов)",
        // по 10
        r"по\s+(\d+(?:[.,]\d+)?)",
        // на 10 долларов
        r"на\s+(\d+(?:[.,]\d+)?)\s*(?:долл|usdt|usd|\$)?",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid amount regex"))
    .collect()
});

/// Tokens that look like tickers but are not coins: quote currencies,
/// command verbs, prepositions, filler words.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Quote currencies
        "USDT", "USD",
        // Russian command verbs and filler
        "КУПИТЬ", "ПРОДАТЬ", "ДОЛЛАРОВ", "КАЖДУЮ", "МОНЕТ", "МНЕ", "НУЖНО", "ХОЧУ", "НАДО",
        "ВСЕ", "ВСЁ", "ПО", "НА", "ДО", "ЗА", "ОТ", "ИЗ", "ДЛЯ", "БЕЗ", "СЕЙЧАС", "СРОЧНО",
        "БЫСТРО", "ТИХО", "МОЖЕШЬ", "ПОЖАЛУЙСТА",
        // English command verbs and filler
        "BUY", "SELL", "REBALANCE", "BALANCE", "ALL", "EACH", "PER", "TOP", "UP", "TO", "AT",
        "FOR", "THE", "AND", "MY", "ME", "OF", "IN", "ON", "IT", "IS", "DO", "GO", "NOW",
        "WHAT", "HAVE", "OWN", "HOLD", "HOLDINGS", "ACCOUNTING", "ALREADY", "PLEASE", "THOSE",
        "COINS",
    ]
    .into_iter()
    .collect()
});

/// Extract unique tickers from text, preserving first-occurrence order.
pub fn extract_symbols(text: &str) -> Vec<String> {
    let upper = text.to_uppercase();

    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for cap in TICKER_PATTERN.captures_iter(&upper) {
        let symbol = &cap[1];
        if !STOP_WORDS.contains(symbol) && seen.insert(symbol.to_string()) {
            result.push(symbol.to_string());
        }
    }

    result
}

/// Extract a quote-currency amount from text.
///
/// Returns `Decimal::ZERO` when no pattern matches — callers must treat zero
/// as "not specified", not as a real zero-amount instruction.
pub fn extract_amount(text: &str) -> Decimal {
    let lower = text.to_lowercase();

    for pattern in AMOUNT_PATTERNS.iter() {
        if let Some(cap) = pattern.captures(&lower) {
            let normalized = cap[1].replace(',', ".");
            match Decimal::from_str(&normalized) {
                Ok(amount) => return amount,
                Err(_) => continue,
            }
        }
    }

    Decimal::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_symbols_order_and_dedup() {
        let symbols = extract_symbols("AAVE SOL BTC SOL - buy at $10 each");
        assert_eq!(symbols, vec!["AAVE", "SOL", "BTC"]);
    }

    #[test]
    fn test_extract_symbols_strips_quote_suffix() {
        let symbols = extract_symbols("AAVE_USDT ZEC_USDT NMR_USDT");
        assert_eq!(symbols, vec!["AAVE", "ZEC", "NMR"]);
    }

    #[test]
    fn test_extract_symbols_filters_stop_words() {
        let symbols = extract_symbols("купи BTC на 10 USDT для меня");
        assert_eq!(symbols, vec!["BTC"]);
        for s in extract_symbols("SELL ALL PER EACH USD") {
            assert!(!STOP_WORDS.contains(s.as_str()), "stop word leaked: {}", s);
        }
    }

    #[test]
    fn test_extract_amount_dollar_prefix() {
        assert_eq!(extract_amount("купи BTC на $50"), Decimal::from(50));
        assert_eq!(
            extract_amount("buy at $ 10.5"),
            Decimal::from_str("10.5").unwrap()
        );
    }

    #[test]
    fn test_extract_amount_currency_word_suffix() {
        assert_eq!(extract_amount("докупи ETH до 100 долларов"), Decimal::from(100));
        assert_eq!(extract_amount("возьми SOL на 25 usdt"), Decimal::from(25));
    }

    #[test]
    fn test_extract_amount_per_coin() {
        assert_eq!(extract_amount("BTC ETH - по 20 баксов каждую"), Decimal::from(20));
    }

    #[test]
    fn test_extract_amount_comma_decimal() {
        assert_eq!(
            extract_amount("купи BTC на $10,5"),
            Decimal::from_str("10.5").unwrap()
        );
    }

    #[test]
    fn test_extract_amount_precedence_is_fixed() {
        // Dollar-prefixed beats "по N" regardless of position in the text
        assert_eq!(extract_amount("по 5 монет, на $20 каждую"), Decimal::from(20));
    }

    #[test]
    fn test_extract_amount_missing_is_zero() {
        assert_eq!(extract_amount("продай все XRP"), Decimal::ZERO);
    }
}
