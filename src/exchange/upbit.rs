//! Upbit REST client
//!
//! Covers what the trading loop needs from Upbit:
//! - Paged candle history (minutes, days, weeks)
//! - Tickers and the market list for universe selection
//! - Account balance and market orders (JWT-authenticated)
//!
//! Every request goes through a shared token bucket. HTTP 429 is retried
//! exactly once after a short pause; anything else is surfaced to the caller.

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use super::auth::Credentials;
use super::rate_limiter::{RateLimiter, RateLimiterConfig};
use super::{Exchange, ExchangeError, OrderAck, OrderRequest, Ticker, Timeframe};
use crate::{Candle, Symbol};

pub const API_BASE_URL: &str = "https://api.upbit.com/v1";

/// Upbit returns at most 200 candles per request
const CANDLE_PAGE_SIZE: usize = 200;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Timeout for market data and account requests
    pub timeout: Duration,
    pub order_timeout: Duration,
    pub rate_limiter: RateLimiterConfig,
    /// Pause before the single 429 retry
    pub retry_delay: Duration,
    /// Pause between candle pages
    pub page_delay: Duration,
    pub quote_currency: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: API_BASE_URL.to_string(),
            timeout: Duration::from_secs(5),
            order_timeout: Duration::from_secs(10),
            rate_limiter: RateLimiterConfig::default(),
            retry_delay: Duration::from_millis(500),
            page_delay: Duration::from_millis(100),
            quote_currency: "KRW".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_order_timeout(mut self, timeout: Duration) -> Self {
        self.order_timeout = timeout;
        self
    }

    /// Set rate limit (requests per second)
    pub fn with_rate_limit(mut self, requests_per_second: usize) -> Self {
        self.rate_limiter = self.rate_limiter.with_rate(requests_per_second);
        self
    }

    pub fn with_quote_currency(mut self, quote: impl Into<String>) -> Self {
        self.quote_currency = quote.into();
        self
    }
}

// ==================== WIRE TYPES ====================

#[derive(Debug, Deserialize)]
struct UpbitCandle {
    candle_date_time_utc: String,
    opening_price: f64,
    high_price: f64,
    low_price: f64,
    trade_price: f64,
    candle_acc_trade_volume: f64,
    #[serde(default)]
    candle_acc_trade_price: f64,
}

impl UpbitCandle {
    fn into_candle(self) -> Option<Candle> {
        let datetime =
            NaiveDateTime::parse_from_str(&self.candle_date_time_utc, "%Y-%m-%dT%H:%M:%S")
                .ok()?
                .and_utc();
        let candle = Candle::new_unchecked(
            datetime,
            self.opening_price,
            self.high_price,
            self.low_price,
            self.trade_price,
            self.candle_acc_trade_volume,
        )
        .with_turnover(self.candle_acc_trade_price);
        candle.is_valid().then_some(candle)
    }
}

#[derive(Debug, Deserialize)]
struct UpbitTicker {
    market: String,
    trade_price: f64,
    acc_trade_price_24h: f64,
    #[serde(default)]
    signed_change_rate: f64,
}

#[derive(Debug, Deserialize)]
struct UpbitMarket {
    market: String,
}

#[derive(Debug, Deserialize)]
struct UpbitAccount {
    currency: String,
    balance: String,
}

fn candle_path(timeframe: Timeframe) -> String {
    match timeframe {
        Timeframe::Day => "candles/days".to_string(),
        Timeframe::Week => "candles/weeks".to_string(),
        other => format!("candles/minutes/{}", other.minutes().unwrap_or(1)),
    }
}

/// Upbit exchange client
#[derive(Clone)]
pub struct UpbitClient {
    credentials: Credentials,
    http_client: Client,
    rate_limiter: RateLimiter,
    config: ClientConfig,
}

impl UpbitClient {
    pub fn new(credentials: Credentials, config: ClientConfig) -> Result<Self, ExchangeError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            credentials,
            http_client,
            rate_limiter: RateLimiter::new(config.rate_limiter.clone()),
            config,
        })
    }

    /// Public-data client; private endpoints will fail with `MissingCredentials`
    pub fn public(config: ClientConfig) -> Result<Self, ExchangeError> {
        Self::new(Credentials::default(), config)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Send with rate limiting, retrying once on HTTP 429
    async fn execute_with_retry<F>(&self, build: F) -> Result<String, ExchangeError>
    where
        F: Fn() -> Result<RequestBuilder, ExchangeError>,
    {
        self.rate_limiter.acquire().await;
        let mut response = build()?.send().await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            debug!(
                "Rate limited, retrying after {}ms",
                self.config.retry_delay.as_millis()
            );
            sleep(self.config.retry_delay).await;
            self.rate_limiter.acquire().await;
            response = build()?.send().await?;
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                return Err(ExchangeError::RateLimited);
            }
        }

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ExchangeError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let url = self.url(path);
        let text = self
            .execute_with_retry(|| Ok(self.http_client.get(&url).query(params)))
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    // ==================== PUBLIC ENDPOINTS ====================

    /// One page of candles ending before `to`, newest first
    async fn candle_page(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        to: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let params = [
            ("market", symbol.to_string()),
            ("count", count.to_string()),
            ("to", to.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        ];
        let raw: Vec<UpbitCandle> = self.get_public(&candle_path(timeframe), &params).await?;
        Ok(raw.into_iter().filter_map(UpbitCandle::into_candle).collect())
    }

    /// Candle history between `start` and `end`, oldest first
    pub async fn get_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, ExchangeError> {
        if end <= start {
            return Ok(vec![]);
        }

        let span = (end - start).num_seconds().max(0) as usize;
        let expected = span / timeframe.duration().num_seconds().max(1) as usize + 1;
        let max_pages = expected / CANDLE_PAGE_SIZE + 2;

        let mut all: Vec<Candle> = Vec::with_capacity(expected.min(4 * CANDLE_PAGE_SIZE));
        // `to` is exclusive on Upbit; step one second past the end candle
        let mut to = end + chrono::Duration::seconds(1);

        for page_no in 0..max_pages {
            if page_no > 0 {
                sleep(self.config.page_delay).await;
            }
            let page = self
                .candle_page(symbol, timeframe, to, CANDLE_PAGE_SIZE)
                .await?;
            let page_len = page.len();
            let oldest = match page.iter().map(|c| c.datetime).min() {
                Some(t) => t,
                None => break,
            };
            all.extend(page);
            if oldest <= start || page_len < CANDLE_PAGE_SIZE {
                break;
            }
            to = oldest;
        }

        all.retain(|c| c.datetime >= start && c.datetime <= end);
        all.sort_by_key(|c| c.datetime);
        all.dedup_by_key(|c| c.datetime);
        Ok(all)
    }

    pub async fn get_tickers(&self, symbols: &[Symbol]) -> Result<Vec<Ticker>, ExchangeError> {
        if symbols.is_empty() {
            return Ok(vec![]);
        }
        let markets = symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let raw: Vec<UpbitTicker> = self.get_public("ticker", &[("markets", markets)]).await?;
        Ok(raw
            .into_iter()
            .map(|t| Ticker {
                symbol: Symbol::new(&t.market),
                trade_price: t.trade_price,
                acc_trade_price_24h: t.acc_trade_price_24h,
                signed_change_rate: t.signed_change_rate,
            })
            .collect())
    }

    pub async fn get_markets(&self) -> Result<Vec<Symbol>, ExchangeError> {
        let raw: Vec<UpbitMarket> = self
            .get_public("market/all", &[("isDetails", "false".to_string())])
            .await?;
        let prefix = format!("{}-", self.config.quote_currency);
        Ok(raw
            .into_iter()
            .filter(|m| m.market.starts_with(&prefix))
            .map(|m| Symbol::new(m.market))
            .collect())
    }

    // ==================== AUTHENTICATED ENDPOINTS ====================

    pub async fn get_account_balance(&self, currency: &str) -> Result<f64, ExchangeError> {
        let url = self.url("accounts");
        let text = self
            .execute_with_retry(|| {
                let auth = self.credentials.authorization(&[])?;
                Ok(self.http_client.get(&url).header("Authorization", auth))
            })
            .await?;
        let accounts: Vec<UpbitAccount> = serde_json::from_str(&text)?;
        Ok(accounts
            .iter()
            .find(|a| a.currency == currency)
            .and_then(|a| a.balance.parse().ok())
            .unwrap_or(0.0))
    }

    pub async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        order.validate()?;
        let params = order.params();
        let body: serde_json::Map<String, serde_json::Value> = params
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
            .collect();
        let url = self.url("orders");

        let text = self
            .execute_with_retry(|| {
                let auth = self.credentials.authorization(&params)?;
                Ok(self
                    .http_client
                    .post(&url)
                    .timeout(self.config.order_timeout)
                    .header("Authorization", auth)
                    .json(&body))
            })
            .await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait::async_trait]
impl Exchange for UpbitClient {
    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Candle> {
        match self.get_candles(symbol, timeframe, start, end).await {
            Ok(candles) => candles,
            Err(e) => {
                error!("Candle fetch failed for {} ({}): {}", symbol, timeframe, e);
                vec![]
            }
        }
    }

    async fn get_current_price(&self, symbol: &Symbol) -> f64 {
        match self.get_tickers(std::slice::from_ref(symbol)).await {
            Ok(tickers) => tickers.first().map(|t| t.trade_price).unwrap_or(0.0),
            Err(e) => {
                error!("Failed to get price for {}: {}", symbol, e);
                0.0
            }
        }
    }

    async fn get_balance(&self) -> f64 {
        match self.get_account_balance(&self.config.quote_currency).await {
            Ok(balance) => balance,
            Err(e) => {
                error!(
                    "Failed to get balance for {}: {}",
                    self.config.quote_currency, e
                );
                0.0
            }
        }
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        self.submit_order(order).await
    }

    async fn quote_markets(&self) -> Vec<Symbol> {
        match self.get_markets().await {
            Ok(markets) => markets,
            Err(e) => {
                error!("Failed to fetch market list: {}", e);
                vec![]
            }
        }
    }

    async fn tickers(&self, symbols: &[Symbol]) -> Vec<Ticker> {
        match self.get_tickers(symbols).await {
            Ok(tickers) => tickers,
            Err(e) => {
                warn!("Ticker fetch failed for {} markets: {}", symbols.len(), e);
                vec![]
            }
        }
    }
}
