//! Gate.io spot API client

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::{Digest, Sha512};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::executor::{ExchangeError, OrderReceipt, OrderSide, TradeExecutor};

type HmacSha512 = Hmac<Sha512>;

const DEFAULT_BASE_URL: &str = "https://api.gateio.ws";
const API_PREFIX: &str = "/api/v4";

/// Spot trading client for Gate.io API v4.
///
/// Public endpoints (tickers) go unsigned; account and order endpoints carry
/// the KEY/Timestamp/SIGN header triple with an HMAC-SHA512 signature.
/// With `dry_run` set, orders are acknowledged locally and never submitted.
pub struct GateClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    dry_run: bool,
}

impl GateClient {
    pub fn new(api_key: &str, api_secret: &str, dry_run: bool) -> Result<Self, ExchangeError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            dry_run,
        })
    }

    /// Point the client at a different host (tests, mirrors)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Gate.io v4 signature over method, path, query, body hash and timestamp
    fn sign(&self, method: &str, path: &str, query: &str, body: &str, timestamp: &str) -> String {
        let body_hash = hex::encode(Sha512::digest(body.as_bytes()));
        let payload = format!(
            "{}\n{}\n{}\n{}\n{}",
            method, path, query, body_hash, timestamp
        );

        let mut mac = HmacSha512::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn send_signed(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &str,
        body: Option<String>,
    ) -> Result<reqwest::Response, ExchangeError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let body = body.unwrap_or_default();
        let signature = self.sign(method.as_str(), path, query, &body, &timestamp);

        let mut url = format!("{}{}", self.base_url, path);
        if !query.is_empty() {
            url = format!("{}?{}", url, query);
        }

        let mut request = self
            .client
            .request(method, &url)
            .header("KEY", &self.api_key)
            .header("Timestamp", &timestamp)
            .header("SIGN", signature)
            .header("Content-Type", "application/json");

        if !body.is_empty() {
            request = request.body(body);
        }

        Ok(request.send().await?)
    }
}

#[async_trait]
impl TradeExecutor for GateClient {
    async fn get_all_balances(&self) -> Result<HashMap<String, Decimal>, ExchangeError> {
        let path = format!("{}/spot/accounts", API_PREFIX);
        let response = self
            .send_signed(reqwest::Method::GET, &path, "", None)
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Api { status, body });
        }

        let accounts: Vec<SpotAccount> = response.json().await?;

        let mut balances = HashMap::new();
        for account in accounts {
            if let Ok(available) = Decimal::from_str(&account.available) {
                if available > Decimal::ZERO {
                    balances.insert(account.currency, available);
                }
            }
        }

        debug!("Fetched {} non-zero balances", balances.len());
        Ok(balances)
    }

    async fn get_ticker_price(&self, pair: &str) -> Result<Decimal, ExchangeError> {
        let url = format!(
            "{}{}/spot/tickers?currency_pair={}",
            self.base_url, API_PREFIX, pair
        );

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            if body.contains("CURRENCY_PAIR") || body.contains("INVALID_CURRENCY") {
                return Err(ExchangeError::PairNotFound(pair.to_string()));
            }
            return Err(ExchangeError::Api { status, body });
        }

        let tickers: Vec<Ticker> = response.json().await?;
        let ticker = tickers
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::PairNotFound(pair.to_string()))?;

        Decimal::from_str(&ticker.last)
            .map_err(|_| ExchangeError::Rejected(format!("unparsable price: {}", ticker.last)))
    }

    async fn place_order(
        &self,
        pair: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<OrderReceipt, ExchangeError> {
        if self.dry_run {
            let order_id = format!("DRY-{}", Uuid::new_v4());
            info!(
                "DRY RUN order: {} {} {:.8} ({})",
                side.as_str(),
                pair,
                quantity,
                order_id
            );
            return Ok(OrderReceipt::filled(order_id));
        }

        // Executable limit at last price; Gate.io market buys are priced in
        // quote currency, which does not fit a base-quantity order.
        let price = self.get_ticker_price(pair).await?;

        let body = serde_json::json!({
            "currency_pair": pair,
            "side": side.as_str(),
            "type": "limit",
            "time_in_force": "ioc",
            "price": price.to_string(),
            "amount": quantity.to_string(),
        })
        .to_string();

        let path = format!("{}/spot/orders", API_PREFIX);
        let response = self
            .send_signed(reqwest::Method::POST, &path, "", Some(body))
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!("Order rejected for {}: {} - {}", pair, status, body);
            return Ok(OrderReceipt::rejected(format!("{}: {}", status, body)));
        }

        let order: SpotOrder = response.json().await?;
        info!(
            "Order placed: {} {} {:.8} @ {} (id {})",
            side.as_str(),
            pair,
            quantity,
            price,
            order.id
        );

        Ok(OrderReceipt::filled(order.id))
    }
}

// Wire types

#[derive(Debug, Deserialize)]
struct SpotAccount {
    currency: String,
    available: String,
}

#[derive(Debug, Deserialize)]
struct Ticker {
    #[allow(dead_code)]
    currency_pair: String,
    last: String,
}

#[derive(Debug, Deserialize)]
struct SpotOrder {
    id: String,
}
