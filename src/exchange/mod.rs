//! Exchange boundary
//!
//! The decision core only talks to the market through [`Exchange`]. Market
//! data methods never fail: they degrade to an empty/zero answer and log,
//! so a single bad symbol cannot abort a tick. Only order placement reports
//! an error, because the caller must leave position state untouched when
//! it fails.

pub mod auth;
pub mod rate_limiter;
pub mod upbit;

pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use upbit::{ClientConfig, UpbitClient};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{Candle, Symbol};

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("rate limited after retry")]
    RateLimited,

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed to sign request: {0}")]
    Auth(#[from] jsonwebtoken::errors::Error),

    #[error("API credentials are missing")]
    MissingCredentials,

    #[error("invalid order: {0}")]
    InvalidOrder(String),
}

/// Candle interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "3m")]
    Minute3,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day,
    #[serde(rename = "1w")]
    Week,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Minute1 => "1m",
            Timeframe::Minute3 => "3m",
            Timeframe::Minute5 => "5m",
            Timeframe::Minute15 => "15m",
            Timeframe::Minute30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day => "1d",
            Timeframe::Week => "1w",
        }
    }

    /// Minute unit for minute-based candles, `None` for day/week
    pub fn minutes(&self) -> Option<u32> {
        match self {
            Timeframe::Minute1 => Some(1),
            Timeframe::Minute3 => Some(3),
            Timeframe::Minute5 => Some(5),
            Timeframe::Minute15 => Some(15),
            Timeframe::Minute30 => Some(30),
            Timeframe::Hour1 => Some(60),
            Timeframe::Hour4 => Some(240),
            Timeframe::Day | Timeframe::Week => None,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::Day => Duration::days(1),
            Timeframe::Week => Duration::weeks(1),
            other => Duration::minutes(other.minutes().map(i64::from).unwrap_or(1)),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy
    Bid,
    /// Sell
    Ask,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Bid => "bid",
            OrderSide::Ask => "ask",
        }
    }
}

/// Market order.
///
/// Buys are placed by notional (`ord_type=price`), sells by quantity
/// (`ord_type=market`).
#[derive(Debug, Clone, PartialEq)]
pub enum OrderRequest {
    MarketBuy { symbol: Symbol, notional: f64 },
    MarketSell { symbol: Symbol, volume: f64 },
}

impl OrderRequest {
    pub fn market_buy(symbol: Symbol, notional: f64) -> Self {
        OrderRequest::MarketBuy { symbol, notional }
    }

    pub fn market_sell(symbol: Symbol, volume: f64) -> Self {
        OrderRequest::MarketSell { symbol, volume }
    }

    pub fn symbol(&self) -> &Symbol {
        match self {
            OrderRequest::MarketBuy { symbol, .. } | OrderRequest::MarketSell { symbol, .. } => {
                symbol
            }
        }
    }

    pub fn side(&self) -> OrderSide {
        match self {
            OrderRequest::MarketBuy { .. } => OrderSide::Bid,
            OrderRequest::MarketSell { .. } => OrderSide::Ask,
        }
    }

    /// Ordered request parameters as sent to the exchange
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            OrderRequest::MarketBuy { symbol, notional } => vec![
                ("market", symbol.to_string()),
                ("side", OrderSide::Bid.as_str().to_string()),
                ("ord_type", "price".to_string()),
                // KRW notional is whole won
                ("price", format!("{}", notional.floor() as i64)),
            ],
            OrderRequest::MarketSell { symbol, volume } => vec![
                ("market", symbol.to_string()),
                ("side", OrderSide::Ask.as_str().to_string()),
                ("ord_type", "market".to_string()),
                ("volume", format!("{}", volume)),
            ],
        }
    }

    pub fn validate(&self) -> Result<(), ExchangeError> {
        match self {
            OrderRequest::MarketBuy { notional, .. } if !(*notional >= 1.0) => Err(
                ExchangeError::InvalidOrder(format!("notional must be >= 1, got {}", notional)),
            ),
            OrderRequest::MarketSell { volume, .. } if !(*volume > 0.0) => Err(
                ExchangeError::InvalidOrder(format!("volume must be > 0, got {}", volume)),
            ),
            _ => Ok(()),
        }
    }
}

/// Exchange acknowledgement of an accepted order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub uuid: String,
    pub market: String,
    pub side: String,
    #[serde(default)]
    pub state: String,
}

/// 24h market snapshot used for universe selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: Symbol,
    pub trade_price: f64,
    /// Quote-currency traded value over the last 24 hours
    pub acc_trade_price_24h: f64,
    pub signed_change_rate: f64,
}

#[async_trait]
pub trait Exchange: Send + Sync {
    /// Candles with `start <= datetime <= end`, oldest first. Empty on failure.
    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Candle>;

    /// Last trade price, `0.0` on failure
    async fn get_current_price(&self, symbol: &Symbol) -> f64;

    /// Available quote-currency balance, `0.0` on failure
    async fn get_balance(&self) -> f64;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ExchangeError>;

    /// All tradable markets in the configured quote currency
    async fn quote_markets(&self) -> Vec<Symbol>;

    /// Ticker snapshots for the given markets; missing entries are skipped
    async fn tickers(&self, symbols: &[Symbol]) -> Vec<Ticker>;
}
