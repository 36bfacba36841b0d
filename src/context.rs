//! Dialog context - bounded history, intent recency and the
//! pending-confirmation state machine

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::intent::ParsedIntent;

/// Exact-match vocabulary for confirming a pending action.
/// Matched against the trimmed, lower-cased message; no partial matching.
static AFFIRMATIVE_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["да", "yes", "подтвердить", "confirm", "ок", "ok", "делай", "do", "go"]
        .into_iter()
        .collect()
});

/// Exact-match vocabulary for aborting a pending action
static NEGATIVE_WORDS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["нет", "no", "отмена", "cancel", "стоп", "stop"].into_iter().collect());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Bot,
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
    pub intent: Option<ParsedIntent>,
    pub at: Instant,
}

/// What kind of action is awaiting confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    BatchBuy,
}

/// A snapshotted instruction awaiting yes/no
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub kind: PendingKind,
    pub symbols: Vec<String>,
    pub amount: Decimal,
    pub rebalance: bool,
    pub created_at: Instant,
}

/// How an inbound message relates to a pending action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationReply {
    Affirm,
    Deny,
    Unrelated,
}

/// Classify a reply against the confirmation vocabulary
pub fn classify_reply(text: &str) -> ConfirmationReply {
    let normalized = text.trim().to_lowercase();

    if AFFIRMATIVE_WORDS.contains(normalized.as_str()) {
        ConfirmationReply::Affirm
    } else if NEGATIVE_WORDS.contains(normalized.as_str()) {
        ConfirmationReply::Deny
    } else {
        ConfirmationReply::Unrelated
    }
}

/// Session-scoped conversational state for one operator.
///
/// Holds a bounded message log (FIFO truncation), the most recent classified
/// intent, and at most one pending action. Expiry is lazy: an aged-out
/// pending action or intent is discarded on next access, there is no
/// background sweep.
pub struct DialogContext {
    history: VecDeque<HistoryEntry>,
    max_history: usize,
    ttl: Duration,
    pending: Option<PendingAction>,
    last_intent: Option<(ParsedIntent, Instant)>,
}

impl DialogContext {
    pub const DEFAULT_MAX_HISTORY: usize = 20;
    pub const DEFAULT_TTL_SECS: u64 = 300;

    pub fn new() -> Self {
        Self::with_limits(
            Self::DEFAULT_MAX_HISTORY,
            Duration::from_secs(Self::DEFAULT_TTL_SECS),
        )
    }

    pub fn with_limits(max_history: usize, ttl: Duration) -> Self {
        Self {
            history: VecDeque::new(),
            max_history,
            ttl,
            pending: None,
            last_intent: None,
        }
    }

    /// Append a message; oldest entries are evicted past the size cap
    pub fn add_message(&mut self, role: Role, text: &str, intent: Option<ParsedIntent>) {
        let now = Instant::now();

        if let Some(intent) = &intent {
            self.last_intent = Some((intent.clone(), now));
        }

        self.history.push_back(HistoryEntry {
            role,
            text: text.to_string(),
            intent,
            at: now,
        });

        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    /// Most recent classified intent, if still within the TTL
    pub fn last_intent(&self) -> Option<&ParsedIntent> {
        match &self.last_intent {
            Some((intent, at)) if at.elapsed() < self.ttl => Some(intent),
            _ => None,
        }
    }

    /// Snapshot an instruction pending confirmation
    pub fn set_pending(&mut self, symbols: Vec<String>, amount: Decimal, rebalance: bool) {
        self.pending = Some(PendingAction {
            kind: PendingKind::BatchBuy,
            symbols,
            amount,
            rebalance,
            created_at: Instant::now(),
        });
    }

    /// The pending action, if any and not expired. Expired actions are
    /// dropped here, transparently.
    pub fn pending_action(&mut self) -> Option<&PendingAction> {
        if let Some(pending) = &self.pending {
            if pending.created_at.elapsed() > self.ttl {
                debug!("Pending action expired, discarding");
                self.pending = None;
            }
        }
        self.pending.as_ref()
    }

    /// Remove and return the pending action, honoring expiry
    pub fn take_pending(&mut self) -> Option<PendingAction> {
        self.pending_action();
        self.pending.take()
    }

    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    /// Symbols mentioned in recent messages, newest first, deduplicated.
    ///
    /// Walks history newest-to-oldest and stops at the first entry older
    /// than the lookback window.
    pub fn recent_symbols(&self, lookback: Duration) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut symbols = Vec::new();

        for entry in self.history.iter().rev() {
            if entry.at.elapsed() > lookback {
                break;
            }

            if let Some(intent) = &entry.intent {
                for symbol in &intent.symbols {
                    if seen.insert(symbol.clone()) {
                        symbols.push(symbol.clone());
                    }
                }
            }
        }

        symbols
    }
}

impl Default for DialogContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{IntentClassifier, IntentKind};

    fn intent_for(text: &str) -> ParsedIntent {
        IntentClassifier::new().classify(text)
    }

    #[test]
    fn test_classify_reply_exact_match_only() {
        assert_eq!(classify_reply("да"), ConfirmationReply::Affirm);
        assert_eq!(classify_reply("  YES  "), ConfirmationReply::Affirm);
        assert_eq!(classify_reply("ok"), ConfirmationReply::Affirm);
        assert_eq!(classify_reply("нет"), ConfirmationReply::Deny);
        assert_eq!(classify_reply("cancel"), ConfirmationReply::Deny);
        // No partial-match fuzziness
        assert_eq!(classify_reply("да, но позже"), ConfirmationReply::Unrelated);
        assert_eq!(classify_reply("okay"), ConfirmationReply::Unrelated);
    }

    #[test]
    fn test_history_fifo_truncation() {
        let mut ctx = DialogContext::with_limits(3, Duration::from_secs(300));

        for i in 0..5 {
            ctx.add_message(Role::User, &format!("msg {}", i), None);
        }

        let texts: Vec<&str> = ctx.history().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["msg 2", "msg 3", "msg 4"]);
    }

    #[test]
    fn test_pending_action_ttl_expiry() {
        let mut ctx = DialogContext::with_limits(20, Duration::from_millis(10));
        ctx.set_pending(vec!["BTC".to_string()], Decimal::from(10), false);

        assert!(ctx.pending_action().is_some());

        std::thread::sleep(Duration::from_millis(25));

        // Expired action reports absent and leaves the context idle
        assert!(ctx.pending_action().is_none());
        assert!(ctx.take_pending().is_none());
    }

    #[test]
    fn test_take_pending_clears_slot() {
        let mut ctx = DialogContext::new();
        ctx.set_pending(vec!["BTC".to_string()], Decimal::from(10), true);

        let pending = ctx.take_pending().unwrap();
        assert_eq!(pending.kind, PendingKind::BatchBuy);
        assert!(pending.rebalance);
        assert!(ctx.pending_action().is_none());
    }

    #[test]
    fn test_last_intent_respects_ttl() {
        let mut ctx = DialogContext::with_limits(20, Duration::from_millis(10));
        ctx.add_message(Role::User, "купи BTC", Some(intent_for("купи BTC на $10")));

        assert!(ctx.last_intent().is_some());
        std::thread::sleep(Duration::from_millis(25));
        assert!(ctx.last_intent().is_none());
    }

    #[test]
    fn test_recent_symbols_deduped_newest_first() {
        let mut ctx = DialogContext::new();
        ctx.add_message(
            Role::User,
            "купи BTC ETH",
            Some(intent_for("купи BTC ETH на $10")),
        );
        ctx.add_message(
            Role::User,
            "купи SOL BTC",
            Some(intent_for("купи SOL BTC на $10")),
        );

        let symbols = ctx.recent_symbols(Duration::from_secs(300));
        assert_eq!(symbols, vec!["SOL", "BTC", "ETH"]);
    }

    #[test]
    fn test_recent_symbols_stops_at_cutoff() {
        let mut ctx = DialogContext::new();
        ctx.add_message(Role::User, "купи BTC", Some(intent_for("купи BTC на $10")));

        std::thread::sleep(Duration::from_millis(30));

        let symbols = ctx.recent_symbols(Duration::from_millis(10));
        assert!(symbols.is_empty());

        let intent = intent_for("купи SOL на $10");
        ctx.add_message(Role::User, "купи SOL", Some(intent));
        let symbols = ctx.recent_symbols(Duration::from_millis(10));
        assert_eq!(symbols, vec!["SOL"]);
    }

    #[test]
    fn test_batch_intent_recorded_with_message() {
        let mut ctx = DialogContext::new();
        let intent = intent_for("BTC ETH SOL - buy at $10 each");
        assert_eq!(intent.kind, IntentKind::BatchBuy);

        ctx.add_message(Role::User, "BTC ETH SOL - buy at $10 each", Some(intent));
        assert_eq!(ctx.last_intent().unwrap().kind, IntentKind::BatchBuy);
    }
}
